//! Login state machine against the in-memory page

mod common;

use std::time::Duration;
use tokio::time::Instant;

use common::{FakeNode, FakePage};
use whatsapp_digest::config::Config;
use whatsapp_digest::error::DigestError;
use whatsapp_digest::events::{ExtractionEvent, RecordingObserver};
use whatsapp_digest::locator::ElementLocator;
use whatsapp_digest::selectors;
use whatsapp_digest::session::{AuthState, SessionMonitor};

#[tokio::test(start_paused = true)]
async fn test_already_logged_in() {
    let page = FakePage::new();
    page.add(FakeNode::tagged(selectors::CHAT_PANE));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    monitor.establish().await.unwrap();

    assert_eq!(monitor.state(), AuthState::Authenticated);
    assert_eq!(observer.auth_transitions(), vec![AuthState::Authenticated]);
    assert_eq!(page.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_code_then_scan() {
    let page = FakePage::new();
    let scanned_at = Duration::from_secs(40);
    page.add(FakeNode::tagged(selectors::LOGIN_CODE).visible_until(scanned_at));
    page.add(FakeNode::tagged(selectors::CHAT_LIST).visible_after(scanned_at));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);
    let start = Instant::now();

    let mut monitor = SessionMonitor::new(locator, &config.login);
    monitor.establish().await.unwrap();

    assert_eq!(
        observer.auth_transitions(),
        vec![AuthState::AwaitingAuth, AuthState::Authenticated]
    );
    assert!(start.elapsed() >= scanned_at);
    assert_eq!(page.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_code_never_scanned_times_out() {
    let page = FakePage::new();
    page.add(FakeNode::tagged(selectors::LOGIN_CANVAS));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);
    let start = Instant::now();

    let mut monitor = SessionMonitor::new(locator, &config.login);
    let result = monitor.establish().await;

    assert!(matches!(result, Err(DigestError::AuthTimeout(_))));
    assert_eq!(monitor.state(), AuthState::AuthTimeout);
    assert_eq!(
        observer.auth_transitions(),
        vec![AuthState::AwaitingAuth, AuthState::AuthTimeout]
    );
    assert!(start.elapsed() >= config.login.auth_timeout());
}

#[tokio::test(start_paused = true)]
async fn test_blank_page_reloads_once_then_times_out() {
    let page = FakePage::new();
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    let result = monitor.establish().await;

    assert!(matches!(result, Err(DigestError::AuthTimeout(_))));
    assert_eq!(page.reloads(), 1);
    assert_eq!(observer.auth_transitions(), vec![AuthState::AuthTimeout]);
}

#[tokio::test(start_paused = true)]
async fn test_reload_brings_up_login_code() {
    let page = FakePage::new();
    let scanned_at = Duration::from_secs(60);
    page.add(
        FakeNode::tagged(selectors::LOGIN_CODE)
            .after_reloads(1)
            .visible_until(scanned_at),
    );
    page.add(
        FakeNode::tagged(selectors::CHAT_PANE)
            .after_reloads(1)
            .visible_after(scanned_at),
    );
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    monitor.establish().await.unwrap();

    assert_eq!(page.reloads(), 1);
    assert_eq!(
        observer.auth_transitions(),
        vec![AuthState::AwaitingAuth, AuthState::Authenticated]
    );
}

#[tokio::test(start_paused = true)]
async fn test_late_chat_list_counts_as_logged_in() {
    let page = FakePage::new();
    page.add(FakeNode::tagged(selectors::DEFAULT_USER).visible_after(Duration::from_secs(22)));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    monitor.establish().await.unwrap();

    assert_eq!(observer.auth_transitions(), vec![AuthState::Authenticated]);
    assert_eq!(page.reloads(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_verification_reloads_once_to_recover_chat_list() {
    let page = FakePage::new();
    page.add(FakeNode::tagged(selectors::CHAT_PANE).visible_for_queries(1));
    page.add(FakeNode::tagged(selectors::CHAT_PANE).after_reloads(1));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    monitor.establish().await.unwrap();

    assert_eq!(monitor.state(), AuthState::Authenticated);
    assert_eq!(observer.auth_transitions(), vec![AuthState::Authenticated]);
    assert_eq!(page.reloads(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_verification_times_out() {
    let page = FakePage::new();
    page.add(FakeNode::tagged(selectors::CHAT_PANE).visible_for_queries(1));
    let config = Config::default();
    let observer = RecordingObserver::new();
    let locator = ElementLocator::from_config(&page, &observer, &config.extraction);

    let mut monitor = SessionMonitor::new(locator, &config.login);
    let result = monitor.establish().await;

    assert!(matches!(result, Err(DigestError::AuthTimeout(_))));
    assert_eq!(monitor.state(), AuthState::AuthTimeout);
    assert_eq!(
        observer.auth_transitions(),
        vec![AuthState::Authenticated, AuthState::AuthTimeout]
    );
    assert_eq!(page.reloads(), 1);
    let reloads: Vec<&str> = observer
        .events()
        .into_iter()
        .filter_map(|event| match event {
            ExtractionEvent::PageReloaded { reason } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reloads, vec!["login verification keeps failing"]);
}
