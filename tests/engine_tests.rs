//! Whole runs through the engine and the boundary call against the in-memory page

mod common;

use common::{add_chat, add_conversation, incoming, logged_in_page, outgoing, FakeNode, FakePage};
use whatsapp_digest::config::Config;
use whatsapp_digest::digest::parse_ranked_digest;
use whatsapp_digest::engine::{run_with_driver, ExtractionEngine, ExtractionRequest};
use whatsapp_digest::error::{
    DigestError, AUTH_TIMEOUT_MESSAGE, NO_MESSAGES_MESSAGE, SESSION_TERMINATED_MESSAGE,
};
use whatsapp_digest::events::{RecordingObserver, SkipReason};
use whatsapp_digest::models::ConversationKind;
use whatsapp_digest::selectors;

fn request(messages: usize, chats: Option<usize>) -> ExtractionRequest {
    ExtractionRequest::new(messages, chats, None, 50).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_group_chat_with_fewer_messages_than_requested() {
    let (page, pane) = logged_in_page();
    add_chat(
        &page,
        pane,
        "team",
        "Team",
        true,
        &[
            incoming("Bob", "Standup moved"),
            incoming("Ann", "Ok"),
            outgoing("Thanks"),
        ],
    );
    let config = Config::default();
    let observer = RecordingObserver::new();

    let result = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert!(result.individuals.is_empty());
    let team = &result.groups[0];
    assert_eq!(team.kind, ConversationKind::Group);
    assert_eq!(team.records.len(), 3);
    let ordinals: Vec<usize> = team.records.iter().map(|r| r.ordinal).collect();
    assert_eq!(ordinals, vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_digest_lists_groups_before_individuals() {
    let (page, pane) = logged_in_page();
    add_chat(&page, pane, "mum", "Mum", false, &[incoming("Mum", "Call me")]);
    add_chat(
        &page,
        pane,
        "team",
        "Team",
        true,
        &[incoming("Bob", "Standup moved"), outgoing("Thanks")],
    );
    let config = Config::default();
    let observer = RecordingObserver::new();

    let digest = run_with_driver(&page, &config, &request(10, None), &observer).await;

    assert_eq!(
        digest,
        "Team:\nBob: Standup moved\nYou: Thanks\n\nMum:\nMum: Call me\n\n"
    );
    assert_eq!(page.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ranked_digest_keeps_longest_messages() {
    let (page, pane) = logged_in_page();
    add_chat(
        &page,
        pane,
        "team",
        "Team",
        true,
        &[
            incoming("Bob", "short"),
            incoming("Ann", "the longest message of them all"),
            incoming("Bob", "tiny"),
            incoming("Ann", "a fairly long message"),
        ],
    );
    let config = Config::default();
    let observer = RecordingObserver::new();
    let ranked = ExtractionRequest::new(10, None, Some(2), 50).unwrap();

    let digest = run_with_driver(&page, &config, &ranked, &observer).await;

    let parsed = parse_ranked_digest(&digest);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0].title, "Team");
    assert_eq!(
        parsed[0].messages,
        vec![
            (1, "the longest message of them all".to_string()),
            (3, "a fairly long message".to_string())
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_chat_limit_zero_skips_everything() {
    let (page, pane) = logged_in_page();
    add_chat(&page, pane, "team", "Team", true, &[incoming("Bob", "hi")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let digest = run_with_driver(&page, &config, &request(5, Some(0)), &observer).await;

    assert_eq!(digest, NO_MESSAGES_MESSAGE);
    assert!(page.clicks().is_empty());
    assert!(observer.auth_transitions().is_empty());
    assert_eq!(page.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_empty_chat_list_reports_no_messages() {
    let (page, _pane) = logged_in_page();
    let config = Config::default();
    let observer = RecordingObserver::new();

    let outcome = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await;
    assert!(matches!(outcome, Err(DigestError::NoConversationsFound)));

    let digest = run_with_driver(&page, &config, &request(5, None), &observer).await;
    assert_eq!(digest, NO_MESSAGES_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn test_chat_limit_counts_list_entries() {
    let (page, pane) = logged_in_page();
    add_chat(&page, pane, "a", "Alpha", true, &[incoming("Al", "one")]);
    add_chat(&page, pane, "b", "Beta", true, &[incoming("Bo", "two")]);
    add_chat(&page, pane, "c", "Gamma", true, &[incoming("Ga", "three")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let result = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, Some(2)))
        .await
        .unwrap();

    let titles: Vec<&str> = result.chats().map(|c| c.display_title()).collect();
    assert_eq!(titles, vec!["Alpha", "Beta"]);
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_titles_are_harvested_once() {
    let (page, pane) = logged_in_page();
    add_chat(&page, pane, "family-1", "Family", true, &[incoming("Dad", "Dinner at 7")]);
    let second = add_chat(&page, pane, "family-2", "Family", true, &[incoming("Mum", "Bring wine")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let result = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await
        .unwrap();

    assert_eq!(result.groups.len(), 1);
    assert_eq!(result.groups[0].records[0].body, "Dinner at 7");
    assert_eq!(observer.skips(), vec![SkipReason::Duplicate]);
    assert!(!page.clicks().contains(&second));
}

#[tokio::test(start_paused = true)]
async fn test_chat_without_messages_is_skipped() {
    let (page, pane) = logged_in_page();
    add_chat(&page, pane, "quiet", "Quiet", false, &[]);
    add_chat(&page, pane, "mum", "Mum", false, &[incoming("Mum", "Call me")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let result = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await
        .unwrap();

    assert_eq!(observer.skips(), vec![SkipReason::HarvestExhausted]);
    assert_eq!(result.individuals.len(), 1);
    assert_eq!(result.individuals[0].display_title(), "Mum");
}

#[tokio::test(start_paused = true)]
async fn test_unopenable_chat_is_skipped() {
    let (page, pane) = logged_in_page();
    let broken = page.add(
        FakeNode::tagged(selectors::ENTRY_CELL_FRAME)
            .under(pane)
            .unclickable(),
    );
    page.add(
        FakeNode::tagged(selectors::ENTRY_TITLE)
            .under(broken)
            .attr("title", "Broken")
            .unclickable(),
    );
    add_chat(&page, pane, "mum", "Mum", false, &[incoming("Mum", "Call me")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let result = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await
        .unwrap();

    assert_eq!(observer.skips(), vec![SkipReason::ActivationFailed]);
    assert_eq!(result.individuals.len(), 1);
    assert_eq!(result.individuals[0].display_title(), "Mum");
}

#[tokio::test(start_paused = true)]
async fn test_untitled_chat_gets_header_title() {
    let (page, pane) = logged_in_page();
    page.add(
        FakeNode::tagged(selectors::ENTRY_CELL_FRAME)
            .under(pane)
            .opens("x"),
    );
    add_conversation(&page, "x", "Book Club", true, &[incoming("Eve", "Chapter 3")]);
    let config = Config::default();
    let observer = RecordingObserver::new();

    let digest = run_with_driver(&page, &config, &request(5, None), &observer).await;
    assert_eq!(digest, "Book Club:\nEve: Chapter 3\n\n");
}

#[tokio::test(start_paused = true)]
async fn test_login_timeout_returns_fixed_message() {
    let page = FakePage::new();
    let config = Config::default();
    let observer = RecordingObserver::new();

    let digest = run_with_driver(&page, &config, &request(5, None), &observer).await;

    assert_eq!(digest, AUTH_TIMEOUT_MESSAGE);
    assert_eq!(page.reloads(), 1);
    assert_eq!(page.closes(), 1);
}

/// The first chat takes the browser down when clicked
fn dying_page() -> FakePage {
    let (page, pane) = logged_in_page();
    let fatal = page.add(
        FakeNode::tagged(selectors::ENTRY_CELL_FRAME)
            .under(pane)
            .ends_session(),
    );
    page.add(
        FakeNode::tagged(selectors::ENTRY_TITLE)
            .under(fatal)
            .attr("title", "Team"),
    );
    add_chat(&page, pane, "mum", "Mum", false, &[incoming("Mum", "Call me")]);
    page
}

#[tokio::test(start_paused = true)]
async fn test_browser_dying_mid_run_ends_the_run() {
    let config = Config::default();
    let observer = RecordingObserver::new();

    let page = dying_page();
    let outcome = ExtractionEngine::new(&page, &config, &observer)
        .run(&request(5, None))
        .await;
    assert!(matches!(outcome, Err(DigestError::SessionTerminated(_))));

    let page = dying_page();
    let digest = run_with_driver(&page, &config, &request(5, None), &observer).await;
    assert_eq!(digest, SESSION_TERMINATED_MESSAGE);
    assert_eq!(page.closes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_browser_gone_before_login() {
    let page = FakePage::new();
    page.kill();
    let config = Config::default();
    let observer = RecordingObserver::new();

    let digest = run_with_driver(&page, &config, &request(5, None), &observer).await;
    assert_eq!(digest, SESSION_TERMINATED_MESSAGE);
}
