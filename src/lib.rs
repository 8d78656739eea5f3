//! WhatsApp Web digest extraction
//!
//! Drives a logged-in (or logging-in) WhatsApp Web page and turns the latest messages of
//! each chat into a plain-text digest, grouped into group chats and individual chats.
//!
//! # Overview
//!
//! The page's markup changes often and without notice, so every lookup is a cascade of
//! selectors and in-page heuristics tried in order:
//! - **Session**: detect whether the page is logged in, wait for the login code to be
//!   scanned, verify the chat list
//! - **Chats**: enumerate the visible chat list
//! - **Harvesting**: open each chat and collect its most recent message nodes
//! - **Normalization**: read body, sender and timestamp from each node
//! - **Digest**: deduplicate, optionally rank, and render the text digest
//!
//! # Example Usage
//!
//! ```no_run
//! use whatsapp_digest::{config::Config, engine::run_extraction};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     // Last 10 messages of the first 5 chats
//!     let digest = run_extraction(&config, 10, Some(5)).await?;
//!     println!("{}", digest);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`browser`] - Chrome session implementing [`driver::PageDriver`]
//! - [`chats`] - Chat list enumeration
//! - [`classifier`] - Group / individual classification
//! - [`cli`] - Command-line interface
//! - [`config`] - Configuration management
//! - [`digest`] - Deduplication, top-K selection and rendering
//! - [`driver`] - Live page abstraction
//! - [`engine`] - Run orchestration and the boundary call
//! - [`error`] - Error types and result aliases
//! - [`events`] - Typed progress events and observers
//! - [`harvester`] - Opening chats and collecting message nodes
//! - [`locator`] - Cascading element lookup
//! - [`mail`] - Outbound mail composition
//! - [`models`] - Core data structures
//! - [`normalizer`] - Message field extraction
//! - [`retry`] - Bounded retry policies
//! - [`scripts`] - In-page JavaScript heuristics
//! - [`selectors`] - Selector cascades
//! - [`session`] - Login state machine

pub mod browser;
pub mod chats;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod digest;
pub mod driver;
pub mod engine;
pub mod error;
pub mod events;
pub mod harvester;
pub mod locator;
pub mod mail;
pub mod models;
pub mod normalizer;
pub mod retry;
pub mod scripts;
pub mod selectors;
pub mod session;

// Re-export commonly used types for convenience
pub use error::{DigestError, Result};

// Core data models
pub use models::{ChatDigest, Conversation, ConversationKind, MessageRecord, RunResult};

// Config types
pub use config::{BrowserSettings, Config, ExtractionConfig, LoginConfig};

// Page access
pub use browser::ChromiumDriver;
pub use driver::{NodeHandle, PageDriver, PageScript, ScrollEdge, Selector, SelectorKind, Strategy};

// Components
pub use chats::ChatEnumerator;
pub use digest::{DigestBuilder, DigestFormat};
pub use harvester::MessageHarvester;
pub use locator::ElementLocator;
pub use normalizer::ContentNormalizer;
pub use session::{AuthState, SessionMonitor};

// Boundary
pub use engine::{run_extraction, run_with_driver, ExtractionEngine, ExtractionRequest};
pub use events::{EventObserver, ExtractionEvent, RecordingObserver, TracingObserver};
pub use mail::{MailTransport, OutgoingMail};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
