use anyhow::Result;
use clap::Parser;
use indicatif::MultiProgress;
use std::io::Write;
use std::process;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;
use whatsapp_digest::cli::{self, Cli, Commands, RunOptions};
use whatsapp_digest::config::Config;
use whatsapp_digest::error::DigestError;

/// A writer that prints through MultiProgress to avoid progress bar conflicts
#[derive(Clone)]
struct MultiProgressWriter {
    multi: Arc<MultiProgress>,
    buffer: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl MultiProgressWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self {
            multi,
            buffer: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }
}

impl Write for MultiProgressWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut buffer = self
            .buffer
            .lock()
            .map_err(|_| std::io::Error::new(std::io::ErrorKind::Other, "log buffer poisoned"))?;
        if !buffer.is_empty() {
            let msg = String::from_utf8_lossy(&buffer);
            let msg = msg.trim_end_matches('\n');
            if !msg.is_empty() {
                let _ = self.multi.println(msg);
            }
            buffer.clear();
        }
        Ok(())
    }
}

impl Drop for MultiProgressWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// MakeWriter implementation for tracing
#[derive(Clone)]
struct MultiProgressMakeWriter {
    multi: Arc<MultiProgress>,
}

impl MultiProgressMakeWriter {
    fn new(multi: Arc<MultiProgress>) -> Self {
        Self { multi }
    }
}

impl<'a> MakeWriter<'a> for MultiProgressMakeWriter {
    type Writer = MultiProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        MultiProgressWriter::new(Arc::clone(&self.multi))
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        eprintln!("\nFor help, run: whatsapp-digest --help");
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("whatsapp_digest=debug,info"))
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("whatsapp_digest=info,warn,error"))
    };

    let multi_progress = Arc::new(MultiProgress::new());
    let make_writer = MultiProgressMakeWriter::new(Arc::clone(&multi_progress));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(make_writer)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    match &cli.command {
        Commands::Run {
            messages,
            chats,
            top,
            output,
            headless,
        } => {
            let options = RunOptions {
                messages: *messages,
                chats: *chats,
                top: *top,
                headless: *headless,
            };
            let digest =
                cli::run_pipeline(&cli, &options, Arc::clone(&multi_progress)).await?;

            match output {
                Some(path) => {
                    tokio::fs::write(path, &digest).await?;
                    println!("Digest written to {:?}", path);
                }
                None => println!("\n{}", digest),
            }
            Ok(())
        }

        Commands::InitConfig { output, force } => {
            tracing::info!("Generating example configuration file");

            if output.exists() && !force {
                return Err(DigestError::ConfigError(format!(
                    "Configuration file already exists at {:?}. Use --force to overwrite.",
                    output
                ))
                .into());
            }

            Config::create_example(output).await?;

            println!("Created example configuration file at: {:?}", output);
            println!("\nPlease edit this file to customize your settings.");
            println!("Key settings to review:");
            println!("  - browser.user_data_dir: keep the WhatsApp login between runs");
            println!("  - login.auth_timeout_secs: how long to wait for the login code scan");
            println!("  - extraction.messages_per_chat: messages kept per chat");
            println!("  - extraction.chat_limit: how many chats to visit");

            Ok(())
        }
    }
}
