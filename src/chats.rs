//! Enumeration of the chat list

use std::time::Duration;
use tracing::{debug, info};

use crate::driver::{NodeHandle, ScrollEdge};
use crate::events::ExtractionEvent;
use crate::locator::ElementLocator;
use crate::models::Conversation;
use crate::selectors::{CHAT_ENTRY_CASCADE, CHAT_PANE_CASCADE, ENTRY_TITLE_CASCADE};

const LIST_SETTLE: Duration = Duration::from_secs(1);
const TITLE_ATTRIBUTE: &str = "title";

pub struct ChatEnumerator<'a> {
    locator: ElementLocator<'a>,
    list_probe: Duration,
}

impl<'a> ChatEnumerator<'a> {
    pub fn new(locator: ElementLocator<'a>, list_probe: Duration) -> Self {
        Self {
            locator,
            list_probe,
        }
    }

    /// Conversations in chat-list order; empty when no entry could be found
    pub async fn enumerate(&self) -> Vec<Conversation> {
        self.scroll_list_to_top().await;

        let entries = self
            .locator
            .locate_all(&CHAT_ENTRY_CASCADE, None, self.list_probe)
            .await;

        let mut conversations = Vec::with_capacity(entries.len());
        for (position, handle) in entries.into_iter().enumerate() {
            let title = self.entry_title(&handle).await;
            debug!(
                "Chat {}: {}",
                position + 1,
                title.as_deref().unwrap_or("(title resolved on open)")
            );
            conversations.push(Conversation::new(handle, position, title));
        }

        info!("Enumerated {} chats", conversations.len());
        self.locator
            .observer()
            .on_event(ExtractionEvent::ConversationsEnumerated {
                count: conversations.len(),
            });
        conversations
    }

    async fn scroll_list_to_top(&self) {
        let Some(pane) = self
            .locator
            .locate(&CHAT_PANE_CASCADE, None, Duration::ZERO)
            .await
        else {
            debug!("Chat pane not found, enumerating without scrolling");
            return;
        };

        if let Err(e) = self.locator.driver().scroll(&pane, ScrollEdge::Top).await {
            debug!("Could not scroll chat list: {}", e);
            return;
        }
        tokio::time::sleep(LIST_SETTLE).await;
    }

    /// Titled span inside the entry, by its `title` attribute and then by text
    async fn entry_title(&self, entry: &NodeHandle) -> Option<String> {
        let span = self
            .locator
            .locate(&ENTRY_TITLE_CASCADE, Some(entry), Duration::ZERO)
            .await?;
        let driver = self.locator.driver();

        if let Ok(Some(title)) = driver.attribute(&span, TITLE_ATTRIBUTE).await {
            let title = title.trim();
            if !title.is_empty() {
                return Some(title.to_string());
            }
        }
        match driver.text(&span).await {
            Ok(Some(text)) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        }
    }
}
