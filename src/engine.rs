//! One extraction run: login, enumerate, then harvest chat by chat
//!
//! [`run_extraction`] is the boundary call. Apart from request validation it always
//! resolves to a string: the digest, the "no messages" explanation, or a single
//! user-facing failure message. The browser is released on every path.

use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::browser::ChromiumDriver;
use crate::chats::ChatEnumerator;
use crate::classifier::ConversationClassifier;
use crate::config::Config;
use crate::digest::{DigestBuilder, DigestFormat};
use crate::driver::PageDriver;
use crate::error::{DigestError, Result, NO_MESSAGES_MESSAGE};
use crate::events::{EventObserver, ExtractionEvent, SkipReason, TracingObserver};
use crate::harvester::MessageHarvester;
use crate::locator::ElementLocator;
use crate::models::{ChatDigest, Conversation, RunResult};
use crate::normalizer::{system_clock, Clock, ContentNormalizer};
use crate::session::SessionMonitor;

/// Validated arguments of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRequest {
    pub messages_per_chat: usize,
    /// Number of chat-list entries to visit, in list order; `None` visits all
    pub chat_limit: Option<usize>,
    /// Reduce every chat to its `k` longest messages and render them ranked
    pub top_k: Option<usize>,
}

impl ExtractionRequest {
    pub fn new(
        messages_per_chat: usize,
        chat_limit: Option<usize>,
        top_k: Option<usize>,
        max_messages_per_chat: usize,
    ) -> Result<Self> {
        if messages_per_chat == 0 || messages_per_chat > max_messages_per_chat {
            return Err(DigestError::InvalidRequest(format!(
                "messages_per_chat must be between 1 and {}, got {}",
                max_messages_per_chat, messages_per_chat
            )));
        }
        if top_k == Some(0) {
            return Err(DigestError::InvalidRequest(
                "top_k must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            messages_per_chat,
            chat_limit,
            top_k,
        })
    }

    pub fn format(&self) -> DigestFormat {
        if self.top_k.is_some() {
            DigestFormat::Ranked
        } else {
            DigestFormat::Plain
        }
    }
}

pub struct ExtractionEngine<'a> {
    driver: &'a dyn PageDriver,
    config: &'a Config,
    observer: &'a dyn EventObserver,
    clock: Clock,
}

impl<'a> ExtractionEngine<'a> {
    pub fn new(
        driver: &'a dyn PageDriver,
        config: &'a Config,
        observer: &'a dyn EventObserver,
    ) -> Self {
        Self {
            driver,
            config,
            observer,
            clock: system_clock(),
        }
    }

    /// Replace the clock used to date time-only message labels
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Run against an already navigated page.
    ///
    /// Per-chat and per-message problems are logged and skipped; only session-level
    /// failures and an empty chat list are returned as errors.
    pub async fn run(&self, request: &ExtractionRequest) -> Result<RunResult> {
        let run_id = Uuid::new_v4();
        let span = info_span!("extraction", %run_id);
        self.run_inner(request).instrument(span).await
    }

    async fn run_inner(&self, request: &ExtractionRequest) -> Result<RunResult> {
        if request.chat_limit == Some(0) {
            info!("Chat limit is 0, nothing to extract");
            return Ok(RunResult::default());
        }

        let locator = ElementLocator::from_config(self.driver, self.observer, &self.config.extraction);

        if let Err(e) = SessionMonitor::new(locator, &self.config.login)
            .establish()
            .await
        {
            self.ensure_alive()?;
            return Err(e);
        }
        self.ensure_alive()?;

        let conversations = ChatEnumerator::new(locator, self.config.extraction.list_probe())
            .enumerate()
            .await;
        if conversations.is_empty() {
            self.ensure_alive()?;
            return Err(DigestError::NoConversationsFound);
        }

        let normalizer = ContentNormalizer::with_clock(locator, self.clock.clone());
        let harvester = MessageHarvester::new(locator, &normalizer, &self.config.extraction);
        let classifier = ConversationClassifier::new(locator);
        let mut builder = DigestBuilder::new();

        let limit = request.chat_limit.unwrap_or(conversations.len());
        info!(
            "Processing {} of {} chats, last {} messages each",
            limit.min(conversations.len()),
            conversations.len(),
            request.messages_per_chat
        );

        for conversation in conversations.into_iter().take(limit) {
            self.ensure_alive()?;
            let position = conversation.position;
            let title = conversation.title.clone();

            match self
                .process(conversation, request, &builder, &harvester, &normalizer, &classifier)
                .await
            {
                Ok(Some(digest)) => {
                    builder.record(digest);
                }
                Ok(None) => {}
                Err(e) if e.is_session_fatal() => return Err(e),
                Err(e) => {
                    warn!("Error processing chat {}: {}", position + 1, e);
                    self.skip(position, title, SkipReason::Failed);
                }
            }
        }

        let result = builder.finish();
        info!(
            "Run complete: {} group chats, {} individual chats, {} messages",
            result.groups.len(),
            result.individuals.len(),
            result.message_count()
        );
        Ok(result)
    }

    /// Harvest one chat; `Ok(None)` when it was skipped
    async fn process(
        &self,
        mut conversation: Conversation,
        request: &ExtractionRequest,
        builder: &DigestBuilder,
        harvester: &MessageHarvester<'_>,
        normalizer: &ContentNormalizer<'_>,
        classifier: &ConversationClassifier<'_>,
    ) -> Result<Option<ChatDigest>> {
        let position = conversation.position;
        if builder.is_processed(conversation.title.as_deref()) {
            self.skip(position, conversation.title, SkipReason::Duplicate);
            return Ok(None);
        }

        if let Err(e) = harvester.open(&conversation).await {
            self.ensure_alive()?;
            warn!("Could not open chat {}: {}", position + 1, e);
            self.skip(position, conversation.title, SkipReason::ActivationFailed);
            return Ok(None);
        }

        if conversation.title.is_none() {
            conversation.title = harvester.resolve_title().await;
            if builder.is_processed(conversation.title.as_deref()) {
                self.skip(position, conversation.title, SkipReason::Duplicate);
                return Ok(None);
            }
        }

        conversation.kind = classifier.classify(conversation.display_title()).await;

        let nodes = harvester.harvest(request.messages_per_chat).await;
        if nodes.is_empty() {
            self.ensure_alive()?;
            let exhausted = DigestError::HarvestExhausted {
                title: conversation.display_title().to_string(),
            };
            warn!("{}", exhausted);
            self.skip(position, conversation.title, SkipReason::HarvestExhausted);
            return Ok(None);
        }

        let mut records = Vec::with_capacity(nodes.len());
        for (ordinal, node) in nodes.iter().enumerate() {
            if let Some(record) = normalizer
                .normalize(node, ordinal, conversation.kind, conversation.title.as_deref())
                .await
            {
                records.push(record);
            }
        }

        self.observer.on_event(ExtractionEvent::ConversationHarvested {
            title: conversation.title.clone(),
            kind: conversation.kind,
            nodes: nodes.len(),
            records: records.len(),
        });

        if records.is_empty() {
            self.skip(position, conversation.title, SkipReason::NoUsableMessages);
            return Ok(None);
        }

        Ok(Some(ChatDigest::new(
            conversation.title,
            conversation.kind,
            records,
        )))
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.driver.is_alive() {
            Ok(())
        } else {
            Err(DigestError::SessionTerminated(
                "browser is no longer reachable".to_string(),
            ))
        }
    }

    fn skip(&self, position: usize, title: Option<String>, reason: SkipReason) {
        self.observer.on_event(ExtractionEvent::ConversationSkipped {
            position,
            title,
            reason,
        });
    }
}

/// Turn the outcome of a run into the text handed back to the caller
pub fn render_outcome(outcome: Result<RunResult>, top_k: Option<usize>) -> String {
    match outcome {
        Ok(result) if result.is_empty() => NO_MESSAGES_MESSAGE.to_string(),
        Ok(result) => match top_k {
            Some(k) => result.ranked(k).render(DigestFormat::Ranked),
            None => result.render(DigestFormat::Plain),
        },
        Err(e) => {
            warn!("Extraction failed: {}", e);
            e.user_message()
        }
    }
}

/// Run against a driver the caller already opened, then release it
pub async fn run_with_driver(
    driver: &dyn PageDriver,
    config: &Config,
    request: &ExtractionRequest,
    observer: &dyn EventObserver,
) -> String {
    let outcome = ExtractionEngine::new(driver, config, observer)
        .run(request)
        .await;

    if let Err(e) = driver.close().await {
        warn!("Failed to close browser session: {}", e);
    }

    render_outcome(outcome, request.top_k)
}

/// Launch a browser, extract the digest and close the browser again.
///
/// Only an out-of-range request is returned as an error, before anything is launched.
pub async fn run_extraction(
    config: &Config,
    messages_per_chat: usize,
    chat_limit: Option<usize>,
) -> Result<String> {
    run_extraction_observed(config, messages_per_chat, chat_limit, &TracingObserver).await
}

/// [`run_extraction`] reporting progress to `observer` instead of the log only
pub async fn run_extraction_observed(
    config: &Config,
    messages_per_chat: usize,
    chat_limit: Option<usize>,
    observer: &dyn EventObserver,
) -> Result<String> {
    let request = ExtractionRequest::new(
        messages_per_chat,
        chat_limit,
        config.extraction.top_k,
        config.extraction.max_messages_per_chat,
    )?;

    let driver = match ChromiumDriver::launch(&config.browser).await {
        Ok(driver) => driver,
        Err(e) => {
            warn!("Could not start browser: {}", e);
            return Ok(e.user_message());
        }
    };

    Ok(run_with_driver(&driver, config, &request, observer).await)
}
