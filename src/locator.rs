//! Cascading element lookup with bounded waits

use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::driver::{NodeHandle, PageDriver, Strategy};
use crate::events::{EventObserver, ExtractionEvent};
use crate::selectors::Cascade;

const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Finds elements by trying every strategy of a [`Cascade`] in order.
///
/// A lookup runs in rounds: each round tries the strategies in cascade order and returns
/// the first non-empty result. Rounds repeat every `poll_interval` until `wait` has
/// elapsed; a zero `wait` means exactly one round. Each driver call is bounded by
/// `probe_timeout` so a hung strategy cannot starve the ones after it. Driver errors
/// are logged and treated as "no match".
#[derive(Clone, Copy)]
pub struct ElementLocator<'a> {
    driver: &'a dyn PageDriver,
    observer: &'a dyn EventObserver,
    probe_timeout: Duration,
    poll_interval: Duration,
}

impl<'a> ElementLocator<'a> {
    pub fn new(driver: &'a dyn PageDriver, observer: &'a dyn EventObserver) -> Self {
        Self {
            driver,
            observer,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn from_config(
        driver: &'a dyn PageDriver,
        observer: &'a dyn EventObserver,
        config: &ExtractionConfig,
    ) -> Self {
        Self::new(driver, observer).with_timing(config.probe_timeout(), config.poll_interval())
    }

    pub fn with_timing(mut self, probe_timeout: Duration, poll_interval: Duration) -> Self {
        self.probe_timeout = probe_timeout.max(Duration::from_millis(1));
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    pub fn driver(&self) -> &'a dyn PageDriver {
        self.driver
    }

    pub fn observer(&self) -> &'a dyn EventObserver {
        self.observer
    }

    /// First element of the first matching strategy
    pub async fn locate(
        &self,
        cascade: &Cascade,
        scope: Option<&NodeHandle>,
        wait: Duration,
    ) -> Option<NodeHandle> {
        self.locate_all(cascade, scope, wait).await.into_iter().next()
    }

    /// All elements of the first matching strategy, empty when nothing matched in time
    pub async fn locate_all(
        &self,
        cascade: &Cascade,
        scope: Option<&NodeHandle>,
        wait: Duration,
    ) -> Vec<NodeHandle> {
        let deadline = Instant::now() + wait;
        loop {
            for strategy in cascade.strategies {
                let found = self.attempt(cascade, strategy, scope).await;
                if !found.is_empty() {
                    return found;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                debug!("[{}] exhausted after {:?}", cascade.name, wait);
                return Vec::new();
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Union of every strategy's matches, deduplicated, in cascade then document order.
    ///
    /// Single round; used where several weak strategies are combined and filtered.
    pub async fn collect_all(&self, cascade: &Cascade, scope: Option<&NodeHandle>) -> Vec<NodeHandle> {
        let mut collected: Vec<NodeHandle> = Vec::new();
        for strategy in cascade.strategies {
            for node in self.attempt(cascade, strategy, scope).await {
                if !collected.contains(&node) {
                    collected.push(node);
                }
            }
        }
        collected
    }

    pub async fn exists(&self, cascade: &Cascade, scope: Option<&NodeHandle>, wait: Duration) -> bool {
        self.locate(cascade, scope, wait).await.is_some()
    }

    async fn attempt(
        &self,
        cascade: &Cascade,
        strategy: &Strategy,
        scope: Option<&NodeHandle>,
    ) -> Vec<NodeHandle> {
        let lookup = async {
            match strategy {
                Strategy::Selector(selector) => self.driver.query(scope, selector).await,
                Strategy::Script(script) => self.driver.query_script(scope, script).await,
            }
        };

        let found = match timeout(self.probe_timeout, lookup).await {
            Ok(Ok(nodes)) => nodes,
            Ok(Err(e)) => {
                debug!("[{}] {} failed: {}", cascade.name, strategy.describe(), e);
                Vec::new()
            }
            Err(_) => {
                debug!(
                    "[{}] {} timed out after {:?}",
                    cascade.name,
                    strategy.describe(),
                    self.probe_timeout
                );
                Vec::new()
            }
        };

        self.observer.on_event(ExtractionEvent::StrategyAttempted {
            cascade: cascade.name,
            strategy: strategy.describe(),
            matched: found.len(),
        });
        found
    }
}
