//! Command-line interface

use clap::{Parser, Subcommand};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::engine::run_extraction_observed;
use crate::error::Result;
use crate::events::{EventObserver, ExtractionEvent, TracingObserver};
use crate::session::AuthState;

#[derive(Parser, Debug)]
#[command(name = "whatsapp-digest")]
#[command(version = "0.1.0")]
#[command(about = "Extract recent WhatsApp Web conversations into a text digest", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in (if needed) and extract the latest messages of each chat
    Run {
        /// Messages to keep per chat (defaults to extraction.messages_per_chat)
        #[arg(short, long)]
        messages: Option<usize>,

        /// Only visit the first N chats of the chat list
        #[arg(long)]
        chats: Option<usize>,

        /// Keep only the K longest messages of each chat and render them ranked
        #[arg(long)]
        top: Option<usize>,

        /// Write the digest to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Run Chrome without a window (only works with an already logged-in profile)
        #[arg(long)]
        headless: bool,
    },

    /// Generate example configuration file
    InitConfig {
        /// Path to create config file
        #[arg(short, long, default_value = "config.toml")]
        output: PathBuf,

        /// Overwrite existing file
        #[arg(long)]
        force: bool,
    },
}

/// Truncate a string to max_len characters, adding "..." if truncated
fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max_len.saturating_sub(3)).collect::<String>())
    }
}

/// Progress reporter using indicatif
pub struct ProgressReporter {
    multi: Arc<MultiProgress>,
    spinner_style: ProgressStyle,
}

impl ProgressReporter {
    pub fn new() -> Self {
        Self::with_multi(Arc::new(MultiProgress::new()))
    }

    /// Draw on an existing display, e.g. the one log output is routed through
    pub fn with_multi(multi: Arc<MultiProgress>) -> Self {
        let spinner_style = ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed:>6}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ");

        Self {
            multi,
            spinner_style,
        }
    }

    pub fn multi(&self) -> &Arc<MultiProgress> {
        &self.multi
    }

    pub fn add_spinner(&self, msg: &str) -> ProgressBar {
        let pb = self.multi.add(ProgressBar::new_spinner());
        pb.set_style(self.spinner_style.clone());
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    }

    /// Finish a spinner and clear it from the multi-progress display
    pub fn finish_spinner(&self, pb: &ProgressBar, msg: &str) {
        pb.finish_and_clear();
        let _ = self.multi.println(format!("  ✓ {}", msg));
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Mirrors run events onto a spinner and still logs them
pub struct ProgressObserver {
    spinner: ProgressBar,
    total: std::sync::atomic::AtomicUsize,
    done: std::sync::atomic::AtomicUsize,
}

impl ProgressObserver {
    pub fn new(spinner: ProgressBar) -> Self {
        Self {
            spinner,
            total: std::sync::atomic::AtomicUsize::new(0),
            done: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn advance(&self, label: &str) {
        use std::sync::atomic::Ordering;
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        let total = self.total.load(Ordering::SeqCst);
        self.spinner
            .set_message(format!("[{}/{}] {}", done, total, truncate_string(label, 40)));
    }
}

impl EventObserver for ProgressObserver {
    fn on_event(&self, event: ExtractionEvent) {
        match &event {
            ExtractionEvent::AuthStateChanged {
                to: AuthState::AwaitingAuth,
                ..
            } => {
                self.spinner
                    .set_message("Waiting for the login code to be scanned...");
            }
            ExtractionEvent::AuthStateChanged {
                to: AuthState::Authenticated,
                ..
            } => {
                self.spinner.set_message("Logged in, reading chat list...");
            }
            ExtractionEvent::ConversationsEnumerated { count } => {
                self.total
                    .store(*count, std::sync::atomic::Ordering::SeqCst);
                self.spinner.set_message(format!("Found {} chats", count));
            }
            ExtractionEvent::ConversationHarvested { title, .. } => {
                self.advance(title.as_deref().unwrap_or("untitled"));
            }
            ExtractionEvent::ConversationSkipped { title, .. } => {
                self.advance(&format!("skipped {}", title.as_deref().unwrap_or("untitled")));
            }
            _ => {}
        }
        TracingObserver.on_event(event);
    }
}

/// Resolved arguments of the `run` command
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub messages: Option<usize>,
    pub chats: Option<usize>,
    pub top: Option<usize>,
    pub headless: bool,
}

/// Load the config, apply command-line overrides and run one extraction.
///
/// Spinners are drawn on `multi` so they interleave cleanly with log lines written through
/// it. Returns the text to print: the digest or the single user-facing failure message.
pub async fn run_pipeline(
    cli: &Cli,
    options: &RunOptions,
    multi: Arc<MultiProgress>,
) -> Result<String> {
    let reporter = ProgressReporter::with_multi(multi);

    let config_spinner = reporter.add_spinner("Loading configuration...");
    let mut config = Config::load(&cli.config).await?;
    apply_overrides(&mut config, options);
    config.validate()?;
    reporter.finish_spinner(&config_spinner, &format!("Configuration loaded from {:?}", cli.config));

    let messages = options
        .messages
        .unwrap_or(config.extraction.messages_per_chat);

    let run_spinner = reporter.add_spinner("Starting Chrome...");
    let observer = ProgressObserver::new(run_spinner.clone());
    let digest = run_extraction_observed(&config, messages, config.extraction.chat_limit, &observer).await;
    reporter.finish_spinner(&run_spinner, "Extraction finished");

    digest
}

/// Command-line values take precedence over the config file
pub fn apply_overrides(config: &mut Config, options: &RunOptions) {
    if options.chats.is_some() {
        config.extraction.chat_limit = options.chats;
    }
    if options.top.is_some() {
        config.extraction.top_k = options.top;
    }
    if options.headless {
        config.browser.headless = true;
    }
}
