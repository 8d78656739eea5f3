use serde::{Deserialize, Serialize};

use crate::driver::NodeHandle;

/// Display title used when a chat title could never be resolved
pub const UNKNOWN_TITLE: &str = "Unknown";

/// Sender used when no sender cascade produced a name
pub const UNKNOWN_SENDER: &str = "Unknown";

/// Sender used for self-authored messages in individual chats
pub const SELF_SENDER: &str = "You";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConversationKind {
    Group,
    Individual,
    Unknown,
}

/// One entry of the chat list.
///
/// `handle` points into the live page and is only valid until the next navigation
/// or reload; it must never be cached across runs or compared after the page changed.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub handle: NodeHandle,
    pub position: usize,
    pub title: Option<String>,
    pub kind: ConversationKind,
}

impl Conversation {
    pub fn new(handle: NodeHandle, position: usize, title: Option<String>) -> Self {
        Self {
            handle,
            position,
            title,
            kind: ConversationKind::Unknown,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TITLE)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageRecord {
    pub ordinal: usize,
    pub sender: String,
    pub body: String,
    pub raw_length: usize,
    pub timestamp: Option<String>,
}

impl MessageRecord {
    pub fn new(ordinal: usize, sender: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            ordinal,
            sender: sender.into(),
            raw_length: body.chars().count(),
            body,
            timestamp: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: Option<String>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Harvested messages of one chat, in harvest (page) order
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatDigest {
    pub title: Option<String>,
    pub kind: ConversationKind,
    pub records: Vec<MessageRecord>,
}

impl ChatDigest {
    pub fn new(title: Option<String>, kind: ConversationKind, records: Vec<MessageRecord>) -> Self {
        Self {
            title,
            kind,
            records,
        }
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or(UNKNOWN_TITLE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunResult {
    pub groups: Vec<ChatDigest>,
    pub individuals: Vec<ChatDigest>,
}

impl RunResult {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty() && self.individuals.is_empty()
    }

    /// Groups first, then individual chats, each in enumeration order
    pub fn chats(&self) -> impl Iterator<Item = &ChatDigest> {
        self.groups.iter().chain(self.individuals.iter())
    }

    pub fn message_count(&self) -> usize {
        self.chats().map(|chat| chat.records.len()).sum()
    }
}
