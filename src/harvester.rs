//! Opening a conversation and collecting its most recent message nodes

use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::driver::{NodeHandle, PageDriver, ScrollEdge};
use crate::error::{DigestError, Result};
use crate::locator::ElementLocator;
use crate::models::Conversation;
use crate::normalizer::ContentNormalizer;
use crate::retry::RetryPolicy;
use crate::scripts;
use crate::selectors::{
    CONVERSATION_PANEL_CASCADE, ENTRY_FOCUSABLE_CASCADE, HEADER_TITLE_CASCADE,
    MESSAGE_HEURISTIC_CASCADE, MESSAGE_PANE_CASCADE, PRIMARY_MESSAGE_CASCADE,
    SECONDARY_MESSAGE_CASCADE,
};

const SCROLL_INTO_VIEW_SETTLE: Duration = Duration::from_secs(1);
const ACTIVATION_BACKOFF: Duration = Duration::from_millis(500);
const SCROLL_BOUNCE: Duration = Duration::from_millis(500);

/// Ways of making a chat-list entry the open conversation, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationStrategy {
    /// Native click on the entry
    Direct,
    /// `click()` dispatched from inside the page
    Scripted,
    /// Native click on a focusable descendant of the entry
    NestedFocusable,
}

impl ActivationStrategy {
    pub const ORDER: [ActivationStrategy; 3] = [
        ActivationStrategy::Direct,
        ActivationStrategy::Scripted,
        ActivationStrategy::NestedFocusable,
    ];

    /// Strategy for a 1-based attempt number, cycling through [`Self::ORDER`]
    pub fn for_attempt(attempt: u32) -> Self {
        let index = (attempt.max(1) - 1) as usize % Self::ORDER.len();
        Self::ORDER[index]
    }
}

pub struct MessageHarvester<'a> {
    locator: ElementLocator<'a>,
    normalizer: &'a ContentNormalizer<'a>,
    config: &'a ExtractionConfig,
}

impl<'a> MessageHarvester<'a> {
    pub fn new(
        locator: ElementLocator<'a>,
        normalizer: &'a ContentNormalizer<'a>,
        config: &'a ExtractionConfig,
    ) -> Self {
        Self {
            locator,
            normalizer,
            config,
        }
    }

    /// Make `conversation` the open chat, trying each activation strategy in turn
    pub async fn open(&self, conversation: &Conversation) -> Result<ActivationStrategy> {
        let driver = self.locator.driver();
        if let Err(e) = driver
            .run_script(&conversation.handle, &scripts::SCROLL_INTO_VIEW)
            .await
        {
            debug!("Could not scroll chat {} into view: {}", conversation.position + 1, e);
        }
        tokio::time::sleep(SCROLL_INTO_VIEW_SETTLE).await;

        let policy = RetryPolicy::fixed(self.config.activation_attempts, ACTIVATION_BACKOFF);
        let strategy = policy
            .retry("activate_chat", self.locator.observer(), move |attempt| {
                self.activate(conversation, ActivationStrategy::for_attempt(attempt))
            })
            .await?;

        debug!(
            "Opened chat {} via {:?}",
            conversation.position + 1,
            strategy
        );
        tokio::time::sleep(self.config.open_settle()).await;
        Ok(strategy)
    }

    async fn activate(
        &self,
        conversation: &Conversation,
        strategy: ActivationStrategy,
    ) -> Result<ActivationStrategy> {
        let driver = self.locator.driver();
        match strategy {
            ActivationStrategy::Direct => driver.click(&conversation.handle).await?,
            ActivationStrategy::Scripted => {
                driver
                    .run_script(&conversation.handle, &scripts::CLICK)
                    .await?
            }
            ActivationStrategy::NestedFocusable => {
                let target = self
                    .locator
                    .locate(
                        &ENTRY_FOCUSABLE_CASCADE,
                        Some(&conversation.handle),
                        Duration::ZERO,
                    )
                    .await
                    .ok_or_else(|| {
                        DigestError::Driver("entry has no focusable descendant".to_string())
                    })?;
                driver.click(&target).await?
            }
        }
        Ok(strategy)
    }

    /// Title of the open conversation from its header: every header selector in turn,
    /// then the in-page heuristic
    pub async fn resolve_title(&self) -> Option<String> {
        let driver = self.locator.driver();
        if self
            .locator
            .exists(&HEADER_TITLE_CASCADE, None, self.config.probe_timeout())
            .await
        {
            for header in self.locator.collect_all(&HEADER_TITLE_CASCADE, None).await {
                if let Some(title) = header_title(driver, &header).await {
                    return Some(title);
                }
            }
        }

        match driver.script_text(None, &scripts::HEADER_TITLE).await {
            Ok(Some(title)) if !title.trim().is_empty() => Some(title.trim().to_string()),
            Ok(_) => None,
            Err(e) => {
                debug!("Header title script failed: {}", e);
                None
            }
        }
    }

    /// Up to `target` message nodes of the open conversation, most recent last.
    ///
    /// Retried with a fixed backoff while the result is empty; empty after the last
    /// attempt means the conversation had nothing readable.
    pub async fn harvest(&self, target: usize) -> Vec<NodeHandle> {
        let policy =
            RetryPolicy::fixed(self.config.harvest_attempts, self.config.harvest_backoff());
        let nodes = policy
            .retry_until(
                "harvest",
                self.locator.observer(),
                |nodes: &Vec<NodeHandle>| !nodes.is_empty(),
                move |attempt| self.harvest_once(target, attempt),
            )
            .await;

        if nodes.is_empty() {
            warn!(
                "No messages found after {} attempts",
                self.config.harvest_attempts
            );
        }
        nodes
    }

    async fn harvest_once(&self, target: usize, attempt: u32) -> Vec<NodeHandle> {
        let panel = self
            .locator
            .locate(&CONVERSATION_PANEL_CASCADE, None, self.config.collect_probe())
            .await;
        let scope = panel.as_ref();

        self.load_pane(scope).await;

        let mut candidates = self
            .locator
            .locate_all(&PRIMARY_MESSAGE_CASCADE, scope, self.config.collect_probe())
            .await;

        if candidates.is_empty() {
            for node in self.locator.collect_all(&SECONDARY_MESSAGE_CASCADE, scope).await {
                if self.normalizer.has_extractable_content(&node).await {
                    candidates.push(node);
                }
            }
            if !candidates.is_empty() {
                debug!("Secondary cascade accepted {} candidates", candidates.len());
            }
        }

        if candidates.is_empty() {
            candidates = self
                .locator
                .locate_all(&MESSAGE_HEURISTIC_CASCADE, scope, Duration::ZERO)
                .await;
        }

        let messages = last_unique(candidates, target);
        info!(
            "Harvest attempt {}: {} message nodes (requested {})",
            attempt,
            messages.len(),
            target
        );
        messages
    }

    /// Bounce the message list to the bottom and back so lazily rendered rows load
    async fn load_pane(&self, scope: Option<&NodeHandle>) {
        let Some(pane) = self
            .locator
            .locate(&MESSAGE_PANE_CASCADE, scope, self.config.pane_probe())
            .await
        else {
            debug!("Message pane not found, collecting without scrolling");
            return;
        };

        let driver = self.locator.driver();
        if let Err(e) = driver.scroll(&pane, ScrollEdge::Bottom).await {
            debug!("Could not scroll message pane: {}", e);
            return;
        }
        tokio::time::sleep(SCROLL_BOUNCE).await;
        if let Err(e) = driver.scroll(&pane, ScrollEdge::Top).await {
            debug!("Could not scroll message pane back: {}", e);
        }
        tokio::time::sleep(self.config.scroll_settle()).await;
    }
}

/// Drop repeated handles (first occurrence wins), then keep the last `target`
pub fn last_unique(candidates: Vec<NodeHandle>, target: usize) -> Vec<NodeHandle> {
    let mut unique: Vec<NodeHandle> = Vec::with_capacity(candidates.len());
    for node in candidates {
        if !unique.contains(&node) {
            unique.push(node);
        }
    }
    let skip = unique.len().saturating_sub(target);
    unique.split_off(skip)
}

/// Visible text of a header element, or its `title` attribute when the text is blank
async fn header_title(driver: &dyn PageDriver, header: &NodeHandle) -> Option<String> {
    if let Ok(Some(text)) = driver.text(header).await {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }
    match driver.attribute(header, "title").await {
        Ok(Some(title)) if !title.trim().is_empty() => Some(title.trim().to_string()),
        _ => None,
    }
}
