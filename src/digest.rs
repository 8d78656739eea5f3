//! Digest assembly: per-run deduplication, top-K selection and text rendering

use std::collections::HashSet;
use tracing::debug;

use crate::models::{ChatDigest, ConversationKind, RunResult};

/// Line format of a rendered chat block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestFormat {
    /// `sender: body`
    Plain,
    /// `Message<ordinal>: body`
    Ranked,
}

const RANKED_PREFIX: &str = "Message";

/// Collects the chats of one run, groups and individual chats apart.
///
/// Titles are remembered only once a chat was recorded, so a chat that failed part-way
/// can still be picked up again if it shows up later in the list.
#[derive(Debug, Default)]
pub struct DigestBuilder {
    processed: HashSet<String>,
    groups: Vec<ChatDigest>,
    individuals: Vec<ChatDigest>,
}

impl DigestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a chat with this title was already recorded; unresolved titles never are
    pub fn is_processed(&self, title: Option<&str>) -> bool {
        title.is_some_and(|title| self.processed.contains(title))
    }

    /// Add a harvested chat; returns false (and drops it) when its title was recorded
    /// before
    pub fn record(&mut self, digest: ChatDigest) -> bool {
        if let Some(title) = &digest.title {
            if !self.processed.insert(title.clone()) {
                debug!("Dropping duplicate chat '{}'", title);
                return false;
            }
        }

        match digest.kind {
            ConversationKind::Group => self.groups.push(digest),
            ConversationKind::Individual | ConversationKind::Unknown => {
                self.individuals.push(digest)
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.groups.len() + self.individuals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn finish(self) -> RunResult {
        RunResult {
            groups: self.groups,
            individuals: self.individuals,
        }
    }
}

/// The `k` longest records of a chat, in their original order.
///
/// Ties on length go to the earlier message. Chats with at most `k` records come back
/// unchanged.
pub fn select_top_k(digest: &ChatDigest, k: usize) -> ChatDigest {
    if digest.records.len() <= k {
        return digest.clone();
    }

    let mut ranked = digest.records.clone();
    ranked.sort_by(|a, b| {
        b.raw_length
            .cmp(&a.raw_length)
            .then_with(|| a.ordinal.cmp(&b.ordinal))
    });
    ranked.truncate(k);
    ranked.sort_by_key(|record| record.ordinal);

    ChatDigest::new(digest.title.clone(), digest.kind, ranked)
}

impl RunResult {
    /// Same run with every chat reduced to its top `k` records
    pub fn ranked(&self, k: usize) -> RunResult {
        RunResult {
            groups: self.groups.iter().map(|d| select_top_k(d, k)).collect(),
            individuals: self.individuals.iter().map(|d| select_top_k(d, k)).collect(),
        }
    }

    pub fn render(&self, format: DigestFormat) -> String {
        self.chats().map(|chat| render_chat(chat, format)).collect()
    }
}

/// Title line, one line per record, then a blank separator line
pub fn render_chat(digest: &ChatDigest, format: DigestFormat) -> String {
    let mut out = format!("{}:\n", digest.display_title());
    for record in &digest.records {
        match format {
            DigestFormat::Plain => {
                out.push_str(&format!("{}: {}\n", record.sender, record.body));
            }
            DigestFormat::Ranked => {
                out.push_str(&format!("{}{}: {}\n", RANKED_PREFIX, record.ordinal, record.body));
            }
        }
    }
    out.push('\n');
    out
}

/// A chat block of a ranked digest read back from text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChat {
    pub title: String,
    pub messages: Vec<(usize, String)>,
}

/// Read a ranked digest back into `(title, [(ordinal, body)])` blocks.
///
/// Chat blocks are separated by blank lines; lines without a `Message<N>: ` prefix are
/// ignored.
pub fn parse_ranked_digest(text: &str) -> Vec<ParsedChat> {
    let mut chats = Vec::new();
    for block in text.split("\n\n") {
        let mut lines = block.lines().filter(|line| !line.is_empty());
        let Some(title_line) = lines.next() else {
            continue;
        };
        let title = title_line.strip_suffix(':').unwrap_or(title_line).to_string();

        let messages = lines.filter_map(parse_ranked_line).collect();
        chats.push(ParsedChat { title, messages });
    }
    chats
}

fn parse_ranked_line(line: &str) -> Option<(usize, String)> {
    let rest = line.strip_prefix(RANKED_PREFIX)?;
    let (ordinal, body) = rest.split_once(": ")?;
    let ordinal = ordinal.parse().ok()?;
    Some((ordinal, body.to_string()))
}
