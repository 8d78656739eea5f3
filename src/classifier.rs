//! Group versus individual classification of the open conversation

use std::time::Duration;
use tracing::debug;

use crate::locator::ElementLocator;
use crate::models::ConversationKind;
use crate::selectors::GROUP_INDICATOR_CASCADE;

const INDICATOR_WAIT: Duration = Duration::from_millis(500);

pub struct ConversationClassifier<'a> {
    locator: ElementLocator<'a>,
    wait: Duration,
}

impl<'a> ConversationClassifier<'a> {
    pub fn new(locator: ElementLocator<'a>) -> Self {
        Self {
            locator,
            wait: INDICATOR_WAIT,
        }
    }

    /// `Group` when any group indicator is present on the page, `Individual` otherwise
    pub async fn classify(&self, title: &str) -> ConversationKind {
        let kind = if self
            .locator
            .exists(&GROUP_INDICATOR_CASCADE, None, self.wait)
            .await
        {
            ConversationKind::Group
        } else {
            ConversationKind::Individual
        };
        debug!("Classified '{}' as {:?}", title, kind);
        kind
    }
}
