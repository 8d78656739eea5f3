//! Typed events emitted while a run progresses
//!
//! Components report through an injected [`EventObserver`] instead of printing. The
//! default observer forwards everything to `tracing`; tests record events to assert on
//! what happened.

use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{DigestError, MessageField};
use crate::models::ConversationKind;
use crate::session::AuthState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Title already processed in this run
    Duplicate,
    /// None of the activation strategies opened the chat
    ActivationFailed,
    /// Every harvest cascade and retry came back empty
    HarvestExhausted,
    /// Messages were found but none had a body
    NoUsableMessages,
    /// A recoverable error interrupted processing
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionEvent {
    StrategyAttempted {
        cascade: &'static str,
        strategy: String,
        matched: usize,
    },
    AuthStateChanged {
        from: AuthState,
        to: AuthState,
    },
    PageReloaded {
        reason: &'static str,
    },
    ConversationsEnumerated {
        count: usize,
    },
    ConversationSkipped {
        position: usize,
        title: Option<String>,
        reason: SkipReason,
    },
    ConversationHarvested {
        title: Option<String>,
        kind: ConversationKind,
        nodes: usize,
        records: usize,
    },
    NormalizationGap {
        ordinal: usize,
        field: MessageField,
    },
    RetryScheduled {
        operation: &'static str,
        attempt: u32,
        delay: Duration,
    },
}

impl ExtractionEvent {
    /// The recoverable error an event stands for; the run carries on after it
    pub fn as_error(&self) -> Option<DigestError> {
        match self {
            ExtractionEvent::NormalizationGap { ordinal, field } => {
                Some(DigestError::NormalizationGap {
                    field: *field,
                    ordinal: *ordinal,
                })
            }
            _ => None,
        }
    }
}

/// Receiver of extraction events
pub trait EventObserver: Send + Sync {
    fn on_event(&self, event: ExtractionEvent);
}

/// Forwards events to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EventObserver for TracingObserver {
    fn on_event(&self, event: ExtractionEvent) {
        if let Some(error) = event.as_error() {
            debug!("{}", error);
            return;
        }
        match event {
            ExtractionEvent::StrategyAttempted {
                cascade,
                strategy,
                matched,
            } => {
                debug!("[{}] {} matched {} element(s)", cascade, strategy, matched);
            }
            ExtractionEvent::AuthStateChanged { from, to } => {
                info!("Session state {:?} -> {:?}", from, to);
            }
            ExtractionEvent::PageReloaded { reason } => {
                warn!("Reloading page: {}", reason);
            }
            ExtractionEvent::ConversationsEnumerated { count } => {
                info!("Found {} chats to process", count);
            }
            ExtractionEvent::ConversationSkipped {
                position,
                title,
                reason,
            } => {
                warn!(
                    "Skipping chat {} ({}): {:?}",
                    position + 1,
                    title.as_deref().unwrap_or("untitled"),
                    reason
                );
            }
            ExtractionEvent::ConversationHarvested {
                title,
                kind,
                nodes,
                records,
            } => {
                info!(
                    "Chat '{}' ({:?}): {} message nodes, {} records kept",
                    title.as_deref().unwrap_or("untitled"),
                    kind,
                    nodes,
                    records
                );
            }
            ExtractionEvent::NormalizationGap { .. } => {}
            ExtractionEvent::RetryScheduled {
                operation,
                attempt,
                delay,
            } => {
                warn!(
                    "{} attempt {} came back empty, retrying in {:?}",
                    operation, attempt, delay
                );
            }
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<ExtractionEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ExtractionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// Sequence of auth states entered, in order
    pub fn auth_transitions(&self) -> Vec<AuthState> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExtractionEvent::AuthStateChanged { to, .. } => Some(to),
                _ => None,
            })
            .collect()
    }

    pub fn skips(&self) -> Vec<SkipReason> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExtractionEvent::ConversationSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect()
    }
}

impl EventObserver for RecordingObserver {
    fn on_event(&self, event: ExtractionEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_observer_filters() {
        let observer = RecordingObserver::new();
        observer.on_event(ExtractionEvent::AuthStateChanged {
            from: AuthState::Unknown,
            to: AuthState::AwaitingAuth,
        });
        observer.on_event(ExtractionEvent::ConversationSkipped {
            position: 0,
            title: Some("Team".to_string()),
            reason: SkipReason::Duplicate,
        });
        observer.on_event(ExtractionEvent::AuthStateChanged {
            from: AuthState::AwaitingAuth,
            to: AuthState::Authenticated,
        });

        assert_eq!(observer.events().len(), 3);
        assert_eq!(
            observer.auth_transitions(),
            vec![AuthState::AwaitingAuth, AuthState::Authenticated]
        );
        assert_eq!(observer.skips(), vec![SkipReason::Duplicate]);
    }

    #[test]
    fn test_gap_event_maps_to_error() {
        let gap = ExtractionEvent::NormalizationGap {
            ordinal: 2,
            field: MessageField::Sender,
        };
        let error = gap.as_error().unwrap();
        assert!(matches!(
            error,
            DigestError::NormalizationGap {
                field: MessageField::Sender,
                ordinal: 2
            }
        ));
        assert!(!error.is_session_fatal());

        assert!(ExtractionEvent::PageReloaded { reason: "test" }.as_error().is_none());
    }

    #[test]
    fn test_tracing_observer_accepts_all_events() {
        let observer = TracingObserver;
        observer.on_event(ExtractionEvent::PageReloaded { reason: "test" });
        observer.on_event(ExtractionEvent::NormalizationGap {
            ordinal: 1,
            field: MessageField::Body,
        });
    }
}
