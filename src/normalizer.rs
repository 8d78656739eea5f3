//! Turns raw message nodes into [`MessageRecord`]s
//!
//! Body, sender and timestamp each come from their own ordered list of [`FieldProbe`]s;
//! the first probe producing a value wins. Sender names are cleaned of contact metadata
//! and timestamps are normalised to `%I:%M %p, %m/%d/%Y`.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::driver::{NodeHandle, PageDriver, PageScript, Selector, SelectorKind};
use crate::error::MessageField;
use crate::events::ExtractionEvent;
use crate::locator::ElementLocator;
use crate::models::{ConversationKind, MessageRecord, SELF_SENDER, UNKNOWN_SENDER};
use crate::scripts;
use crate::selectors::{self, READ_MORE_CASCADE};

/// Rendering format of every extracted timestamp
pub const TIMESTAMP_FORMAT: &str = "%I:%M %p, %m/%d/%Y";

/// Formats tried against the bracketed metadata prefix, most specific first
const DATETIME_FORMATS: &[&str] = &[
    "%I:%M %p, %m/%d/%Y",
    "%I:%M %p, %d/%m/%Y",
    "%d/%m/%Y %I:%M %p",
    "%m/%d/%Y %I:%M %p",
    "%d/%m/%Y, %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%H:%M, %m/%d/%Y",
    "%H:%M, %d/%m/%Y",
];

/// Time-only formats, combined with the current date
const TIME_FORMATS: &[&str] = &["%I:%M %p", "%H:%M"];

const READ_MORE_SETTLE: Duration = Duration::from_millis(300);

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\([^)]*\)").unwrap());

static PHONE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\+?\d[\d\s\-().]{6,}\d").unwrap());

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Source of "now" for resolving time-only labels
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| Local::now().naive_local())
}

/// One way of reading a field out of a message node
#[async_trait]
pub trait FieldProbe: Send + Sync {
    fn name(&self) -> &'static str;

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String>;
}

/// Text of every descendant matching one selector, joined with single spaces
struct JoinedText {
    selector: &'static str,
}

#[async_trait]
impl FieldProbe for JoinedText {
    fn name(&self) -> &'static str {
        self.selector
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let selector = Selector {
            kind: SelectorKind::Css,
            value: self.selector,
        };
        let elements = driver.query(Some(node), &selector).await.ok()?;

        let mut fragments = Vec::new();
        for element in &elements {
            if let Ok(Some(text)) = driver.text(element).await {
                let text = text.trim();
                if !text.is_empty() {
                    fragments.push(text.to_string());
                }
            }
        }
        non_empty(fragments.join(" "))
    }
}

/// Text produced by an in-page script run against the node
struct ScriptText {
    script: PageScript,
}

#[async_trait]
impl FieldProbe for ScriptText {
    fn name(&self) -> &'static str {
        self.script.name
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let text = driver.script_text(Some(node), &self.script).await.ok()??;
        non_empty(text)
    }
}

/// Sender name from the `[time, date] Sender: ` metadata attribute
struct MetadataSender;

#[async_trait]
impl FieldProbe for MetadataSender {
    fn name(&self) -> &'static str {
        "metadata-sender"
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let metadata = metadata_attribute(driver, node).await?;
        let sender = parse_metadata(&metadata).1?;
        non_empty(clean_sender_name(&sender))
    }
}

/// Author label text, falling back to its aria-label
struct AuthorLabel {
    selector: &'static str,
}

#[async_trait]
impl FieldProbe for AuthorLabel {
    fn name(&self) -> &'static str {
        self.selector
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let selector = Selector {
            kind: SelectorKind::Css,
            value: self.selector,
        };
        let label = driver.query(Some(node), &selector).await.ok()?.into_iter().next()?;

        let text = match driver.text(&label).await {
            Ok(Some(text)) if !text.trim().is_empty() => text,
            _ => driver.attribute(&label, "aria-label").await.ok()??,
        };
        non_empty(clean_sender_name(text.trim().trim_end_matches(':')))
    }
}

/// Bracketed timestamp of the metadata attribute
struct MetadataTimestamp {
    clock: Clock,
}

#[async_trait]
impl FieldProbe for MetadataTimestamp {
    fn name(&self) -> &'static str {
        "metadata-timestamp"
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let metadata = metadata_attribute(driver, node).await?;
        let stamp = parse_metadata(&metadata).0?;
        parse_timestamp(&stamp, (self.clock)()).map(format_timestamp)
    }
}

/// Visible clock label such as `9:41 PM` or `21:41`
struct ClockLabel {
    selector: &'static str,
    clock: Clock,
}

#[async_trait]
impl FieldProbe for ClockLabel {
    fn name(&self) -> &'static str {
        self.selector
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let selector = Selector {
            kind: SelectorKind::Css,
            value: self.selector,
        };
        let label = driver.query(Some(node), &selector).await.ok()?.into_iter().next()?;
        let text = driver.text(&label).await.ok()??;
        if !text.contains(':') {
            return None;
        }
        parse_clock_label(&text, (self.clock)()).map(format_timestamp)
    }
}

/// Epoch milliseconds attribute on the node itself
struct EpochAttribute;

#[async_trait]
impl FieldProbe for EpochAttribute {
    fn name(&self) -> &'static str {
        selectors::EPOCH_ATTRIBUTE
    }

    async fn try_extract(&self, driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
        let raw = driver.attribute(node, selectors::EPOCH_ATTRIBUTE).await.ok()??;
        let millis: i64 = raw.trim().parse().ok()?;
        let utc = DateTime::from_timestamp_millis(millis)?;
        Some(format_timestamp(utc.with_timezone(&Local).naive_local()))
    }
}

pub struct ContentNormalizer<'a> {
    locator: ElementLocator<'a>,
    body_probes: Vec<Box<dyn FieldProbe>>,
    sender_probes: Vec<Box<dyn FieldProbe>>,
    timestamp_probes: Vec<Box<dyn FieldProbe>>,
}

impl<'a> ContentNormalizer<'a> {
    pub fn new(locator: ElementLocator<'a>) -> Self {
        Self::with_clock(locator, system_clock())
    }

    pub fn with_clock(locator: ElementLocator<'a>, clock: Clock) -> Self {
        let mut body_probes: Vec<Box<dyn FieldProbe>> = selectors::BODY_TEXT_SELECTORS
            .iter()
            .map(|&selector| Box::new(JoinedText { selector }) as Box<dyn FieldProbe>)
            .collect();
        body_probes.push(Box::new(ScriptText {
            script: scripts::TEXT_WALKER,
        }));

        let mut sender_probes: Vec<Box<dyn FieldProbe>> = vec![Box::new(MetadataSender)];
        sender_probes.extend(
            selectors::AUTHOR_SELECTORS
                .iter()
                .map(|&selector| Box::new(AuthorLabel { selector }) as Box<dyn FieldProbe>),
        );

        let mut timestamp_probes: Vec<Box<dyn FieldProbe>> = vec![Box::new(MetadataTimestamp {
            clock: Arc::clone(&clock),
        })];
        timestamp_probes.extend(selectors::TIME_LABEL_SELECTORS.iter().map(|&selector| {
            Box::new(ClockLabel {
                selector,
                clock: Arc::clone(&clock),
            }) as Box<dyn FieldProbe>
        }));
        timestamp_probes.push(Box::new(EpochAttribute));

        Self {
            locator,
            body_probes,
            sender_probes,
            timestamp_probes,
        }
    }

    /// Build a record for one message node; `None` when it has no body text
    pub async fn normalize(
        &self,
        node: &NodeHandle,
        ordinal: usize,
        kind: ConversationKind,
        title: Option<&str>,
    ) -> Option<MessageRecord> {
        let body = match self.extract_body(node).await {
            Some(body) => body,
            None => {
                self.report_gap(ordinal, MessageField::Body);
                return None;
            }
        };

        let sender = match self.try_sender(node, kind, title).await {
            Some(sender) => sender,
            None => {
                self.report_gap(ordinal, MessageField::Sender);
                UNKNOWN_SENDER.to_string()
            }
        };

        let timestamp = self.extract_timestamp(node).await;
        if timestamp.is_none() {
            self.report_gap(ordinal, MessageField::Timestamp);
        }

        Some(MessageRecord::new(ordinal, sender, body).with_timestamp(timestamp))
    }

    /// Message text after expanding any "read more" control, on a single line
    pub async fn extract_body(&self, node: &NodeHandle) -> Option<String> {
        self.expand_truncated(node).await;
        self.first_match(&self.body_probes, node)
            .await
            .and_then(|text| non_empty(collapse_whitespace(&text)))
    }

    pub async fn extract_sender(
        &self,
        node: &NodeHandle,
        kind: ConversationKind,
        title: Option<&str>,
    ) -> String {
        self.try_sender(node, kind, title)
            .await
            .unwrap_or_else(|| UNKNOWN_SENDER.to_string())
    }

    pub async fn extract_timestamp(&self, node: &NodeHandle) -> Option<String> {
        self.first_match(&self.timestamp_probes, node).await
    }

    /// Whether a loosely matched container carries text, metadata or an author label
    pub async fn has_extractable_content(&self, node: &NodeHandle) -> bool {
        let driver = self.locator.driver();
        if metadata_attribute(driver, node).await.is_some() {
            return true;
        }
        if self.first_match(&self.body_probes, node).await.is_some() {
            return true;
        }
        self.first_match(&self.sender_probes[1..], node).await.is_some()
    }

    async fn try_sender(
        &self,
        node: &NodeHandle,
        kind: ConversationKind,
        title: Option<&str>,
    ) -> Option<String> {
        if kind == ConversationKind::Individual {
            let outgoing = self
                .locator
                .driver()
                .query_script(Some(node), &scripts::OUTGOING_MARKER)
                .await
                .map(|found| !found.is_empty())
                .unwrap_or(false);
            if outgoing {
                return Some(SELF_SENDER.to_string());
            }
            return title.map(str::to_string);
        }

        self.first_match(&self.sender_probes, node).await
    }

    async fn expand_truncated(&self, node: &NodeHandle) {
        let Some(control) = self
            .locator
            .locate(&READ_MORE_CASCADE, Some(node), Duration::ZERO)
            .await
        else {
            return;
        };

        match self.locator.driver().click(&control).await {
            Ok(()) => tokio::time::sleep(READ_MORE_SETTLE).await,
            Err(e) => debug!("Could not expand truncated message: {}", e),
        }
    }

    async fn first_match(&self, probes: &[Box<dyn FieldProbe>], node: &NodeHandle) -> Option<String> {
        let driver = self.locator.driver();
        for probe in probes {
            if let Some(value) = probe.try_extract(driver, node).await {
                debug!("Probe '{}' matched", probe.name());
                return Some(value);
            }
        }
        None
    }

    fn report_gap(&self, ordinal: usize, field: MessageField) {
        self.locator
            .observer()
            .on_event(ExtractionEvent::NormalizationGap { ordinal, field });
    }
}

/// Metadata attribute of the node itself or of its first metadata-bearing descendant
async fn metadata_attribute(driver: &dyn PageDriver, node: &NodeHandle) -> Option<String> {
    if let Ok(Some(value)) = driver.attribute(node, selectors::METADATA_ATTRIBUTE).await {
        if !value.trim().is_empty() {
            return Some(value);
        }
    }

    for &selector in selectors::METADATA_SELECTORS {
        let selector = Selector {
            kind: SelectorKind::Css,
            value: selector,
        };
        let Ok(found) = driver.query(Some(node), &selector).await else {
            continue;
        };
        for element in found {
            if let Ok(Some(value)) = driver.attribute(&element, selectors::METADATA_ATTRIBUTE).await {
                if !value.trim().is_empty() {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Split `[10:30 AM, 3/21/2024] Alice: ` into its timestamp and sender parts
pub fn parse_metadata(metadata: &str) -> (Option<String>, Option<String>) {
    let trimmed = metadata.trim();
    let Some(rest) = trimmed.strip_prefix('[') else {
        return (None, None);
    };
    let Some((stamp, after)) = rest.split_once(']') else {
        return (None, None);
    };

    let stamp = non_empty(stamp.trim().to_string());
    let sender = after.trim();
    let sender = sender
        .strip_suffix(':')
        .unwrap_or(sender)
        .trim()
        .to_string();
    (stamp, non_empty(sender))
}

/// Strip contact metadata from a displayed sender name.
///
/// Removes parenthetical annotations, anything from an `@` on, phone numbers and the
/// leading `~` shown for unsaved contacts.
pub fn clean_sender_name(raw: &str) -> String {
    let without_notes = PARENTHETICAL.replace_all(raw, "");
    let without_handle = without_notes.split('@').next().unwrap_or_default();
    let without_phone = PHONE_NUMBER.replace_all(without_handle, "");
    let trimmed = without_phone.trim().trim_start_matches('~');
    collapse_whitespace(trimmed)
}

/// Parse a metadata timestamp; time-only values are placed on `now`'s date (or the day
/// before when that would lie in the future)
pub fn parse_timestamp(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = text.trim().trim_start_matches('[').trim_end_matches(']').trim();

    for format in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(text, format) {
            return Some(parsed);
        }
    }
    for format in TIME_FORMATS {
        if let Ok(time) = NaiveTime::parse_from_str(text, format) {
            return Some(on_or_before(now, time));
        }
    }
    None
}

/// Parse a visible clock label as 12-hour when it carries AM/PM, 24-hour otherwise
pub fn parse_clock_label(text: &str, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let text = collapse_whitespace(text);
    let upper = text.to_uppercase();
    let format = if upper.contains("AM") || upper.contains("PM") {
        "%I:%M %p"
    } else {
        "%H:%M"
    };
    let time = NaiveTime::parse_from_str(&text, format).ok()?;
    Some(on_or_before(now, time))
}

pub fn format_timestamp(timestamp: NaiveDateTime) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

fn on_or_before(now: NaiveDateTime, time: NaiveTime) -> NaiveDateTime {
    let candidate = now.date().and_time(time);
    if candidate > now {
        candidate - ChronoDuration::days(1)
    } else {
        candidate
    }
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text.trim(), " ").into_owned()
}

fn non_empty(text: String) -> Option<String> {
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}
