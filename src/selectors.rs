//! Selector cascades for WhatsApp Web
//!
//! The page markup is undocumented and changes without notice, so every lookup is an
//! ordered list of candidates. Adding a fallback is a data change here.

use crate::driver::Strategy;
use crate::scripts;

/// Named, ordered list of strategies
#[derive(Debug, Clone, Copy)]
pub struct Cascade {
    pub name: &'static str,
    pub strategies: &'static [Strategy],
}

// Chat list / login state
pub const CHAT_LIST: &str = r#"div[data-testid="chat-list"]"#;
pub const CHAT_PANE: &str = "div#pane-side";
pub const CHAT_GRID: &str = r#"div#side div[role="grid"]"#;
pub const CELL_FRAME: &str = r#"[data-testid="cell-frame-container"]"#;
pub const PANE_GRIDCELL: &str = r#"div#pane-side div[role="gridcell"]"#;
pub const DEFAULT_USER: &str = r#"div[data-testid="default-user"]"#;
pub const DEFAULT_GROUP: &str = r#"div[data-testid="default-group"]"#;

pub const LOGIN_CODE: &str = r#"div[data-testid="qrcode"]"#;
pub const LOGIN_CANVAS: &str = r#"canvas[aria-label*="Scan me"]"#;
pub const LOGIN_DATA_REF: &str = "div[data-ref]";

// Chat entries
pub const ENTRY_CELL_FRAME: &str = r#"div[data-testid="cell-frame-container"]"#;
pub const ENTRY_ROW: &str = r#"div#pane-side div[role="row"]"#;
pub const ENTRY_LIST_ITEM: &str = r#"div#pane-side div[data-testid="chat-list-item"]"#;
pub const ENTRY_TITLE: &str = "span[title]";
pub const ENTRY_FOCUSABLE: &str = r#"div[tabindex="-1"]"#;

// Conversation header
pub const HEADER_INFO_TITLE: &str = r#"div[data-testid="conversation-info-header-chat-title"]"#;
pub const HEADER_CHAT_TITLE: &str = r#"div[data-testid="chat-title"]"#;
pub const HEADER_SPAN_TITLE: &str = "header span[title]";

// Message pane
pub const CONVERSATION_PANEL: &str = "div#main";
pub const MESSAGE_PANEL: &str = r#"div[data-testid="conversation-panel-messages"]"#;
pub const MESSAGE_CONTAINER: &str = r#"div[data-testid="msg-container"]"#;
pub const MESSAGE_BUBBLE: &str = "div.message-in, div.message-out";
pub const MESSAGE_ROW: &str = r#"div[role="row"]"#;
pub const COPYABLE_TEXT: &str = "div.copyable-text";

// Message content
pub const SELECTABLE_TEXT: &str = "span.selectable-text.copyable-text";
pub const METADATA: &str = "div[data-pre-plain-text]";
pub const METADATA_ATTRIBUTE: &str = "data-pre-plain-text";
pub const EPOCH_ATTRIBUTE: &str = "data-timestamp";
pub const MESSAGE_TIME: &str = r#"span[data-testid="msg-time"]"#;
pub const AUTHOR_LABEL: &str = r#"span[data-testid="author"]"#;
pub const READ_MORE: &str = r#"div[role="button"].read-more-button"#;

// Group indicators
pub const GROUP_DRAWER_SUBJECT: &str = r#"span[data-testid="group-info-drawer-subject-input"]"#;
pub const GROUP_DRAWER: &str = r#"div[data-testid="group-info-drawer"]"#;
pub const GROUP_ICON: &str = r#"span[data-icon="groups"]"#;
pub const GROUP_DEFAULT_ICON: &str = r#"header span[data-icon="default-group"]"#;

/// Evidence of a logged-in session
pub const CHAT_LIST_CASCADE: Cascade = Cascade {
    name: "chat-list",
    strategies: &[
        Strategy::css(CHAT_LIST),
        Strategy::css(CHAT_PANE),
        Strategy::css(CHAT_GRID),
        Strategy::css(CELL_FRAME),
        Strategy::css(PANE_GRIDCELL),
        Strategy::css(DEFAULT_USER),
        Strategy::css(DEFAULT_GROUP),
    ],
};

/// Pending-authentication marker (the scannable code)
pub const LOGIN_MARKER_CASCADE: Cascade = Cascade {
    name: "login-marker",
    strategies: &[
        Strategy::css(LOGIN_CODE),
        Strategy::css(LOGIN_CANVAS),
        Strategy::css(LOGIN_DATA_REF),
        Strategy::css(r#"div[class*="landing-wrapper"] canvas"#),
        Strategy::css(r#"div[class*="landing-window"] canvas"#),
        Strategy::css(r#"div[class*="qr-container"] canvas"#),
        Strategy::script(scripts::FIND_LOGIN_CODE),
    ],
};

/// Cheap presence check used while polling for the marker to go away
pub const LOGIN_MARKER_PRESENT: Cascade = Cascade {
    name: "login-marker-present",
    strategies: &[Strategy::css(LOGIN_CODE), Strategy::css(LOGIN_CANVAS)],
};

pub const CHAT_PANE_CASCADE: Cascade = Cascade {
    name: "chat-pane",
    strategies: &[Strategy::css(CHAT_PANE), Strategy::css(CHAT_LIST)],
};

pub const CHAT_ENTRY_CASCADE: Cascade = Cascade {
    name: "chat-entries",
    strategies: &[
        Strategy::css(ENTRY_CELL_FRAME),
        Strategy::css(ENTRY_ROW),
        Strategy::css(PANE_GRIDCELL),
        Strategy::css(ENTRY_LIST_ITEM),
        Strategy::xpath(r#"//div[@id="pane-side"]//div[@role="row"]"#),
        Strategy::xpath(r#"//div[@id="pane-side"]//div[contains(@class, "focusable-list-item")]"#),
        Strategy::script(scripts::FIND_CHAT_ENTRIES),
    ],
};

/// Title span inside a chat-list entry
pub const ENTRY_TITLE_CASCADE: Cascade = Cascade {
    name: "entry-title",
    strategies: &[Strategy::css(ENTRY_TITLE)],
};

/// Focusable descendant of a chat-list entry, the last activation resort
pub const ENTRY_FOCUSABLE_CASCADE: Cascade = Cascade {
    name: "entry-focusable",
    strategies: &[
        Strategy::css(ENTRY_FOCUSABLE),
        Strategy::css(r#"div[role="gridcell"]"#),
        Strategy::css(ENTRY_TITLE),
    ],
};

/// Title of the open conversation; the script tier is handled separately since it
/// yields text rather than elements
pub const HEADER_TITLE_CASCADE: Cascade = Cascade {
    name: "header-title",
    strategies: &[
        Strategy::css(HEADER_INFO_TITLE),
        Strategy::css(HEADER_CHAT_TITLE),
        Strategy::css(r#"span[data-testid="conversation-info-header-chat-title"]"#),
        Strategy::css(HEADER_SPAN_TITLE),
        Strategy::css(r#"header span[dir="auto"]"#),
        Strategy::xpath("//header//span[@title]"),
        Strategy::xpath("//header//div[@title]"),
    ],
};

/// Conversation panel, used to scope message searches away from the chat list
pub const CONVERSATION_PANEL_CASCADE: Cascade = Cascade {
    name: "conversation-panel",
    strategies: &[
        Strategy::css(CONVERSATION_PANEL),
        Strategy::css(r#"div[data-testid="conversation-panel-wrapper"]"#),
    ],
};

/// Scrollable message list
pub const MESSAGE_PANE_CASCADE: Cascade = Cascade {
    name: "message-pane",
    strategies: &[
        Strategy::css(MESSAGE_PANEL),
        Strategy::css("div.message-list"),
        Strategy::css(r#"div[role="region"][aria-label*="Message list"]"#),
        Strategy::css(MESSAGE_CONTAINER),
    ],
};

/// Direct message containers
pub const PRIMARY_MESSAGE_CASCADE: Cascade = Cascade {
    name: "messages-primary",
    strategies: &[
        Strategy::css(MESSAGE_CONTAINER),
        Strategy::css(MESSAGE_BUBBLE),
        Strategy::css(METADATA),
    ],
};

/// Broader containers; candidates must prove they carry message content
pub const SECONDARY_MESSAGE_CASCADE: Cascade = Cascade {
    name: "messages-secondary",
    strategies: &[
        Strategy::css(MESSAGE_ROW),
        Strategy::css("div.focusable-list-item"),
        Strategy::css(COPYABLE_TEXT),
        Strategy::css(r#"div[class*="message"]"#),
        Strategy::css("div[data-id]"),
        Strategy::css(r#"div[tabindex="-1"]"#),
    ],
};

/// Structural heuristics, tried once both selector cascades came back empty
pub const MESSAGE_HEURISTIC_CASCADE: Cascade = Cascade {
    name: "messages-heuristic",
    strategies: &[
        Strategy::script(scripts::FIND_MESSAGES),
        Strategy::script(scripts::FIND_ANY_MESSAGE),
    ],
};

pub const READ_MORE_CASCADE: Cascade = Cascade {
    name: "read-more",
    strategies: &[
        Strategy::css(READ_MORE),
        Strategy::css(r#"span[role="button"][class*="read-more"]"#),
        Strategy::xpath(r#".//div[@role="button" and contains(., "Read more")]"#),
    ],
};

/// Text-bearing element shapes inside a message
pub const BODY_TEXT_SELECTORS: &[&str] = &[
    SELECTABLE_TEXT,
    r#"span[data-testid="msg-container"] span.selectable-text"#,
    "div.copyable-text span.selectable-text",
    "div._21Ahp",
    "div[data-pre-plain-text] span.selectable-text",
    r#"div[class*="message-text"] span.selectable-text"#,
    r#"div[class*="text-message"] span.selectable-text"#,
];

/// Elements carrying the `[time, date] Sender: ` metadata attribute
pub const METADATA_SELECTORS: &[&str] = &[METADATA, "div.copyable-text[data-pre-plain-text]"];

pub const AUTHOR_SELECTORS: &[&str] = &[
    AUTHOR_LABEL,
    r#"div[data-testid="msg-meta"] span[dir="auto"]"#,
    r#"span[aria-label$=":"]"#,
];

pub const TIME_LABEL_SELECTORS: &[&str] = &[MESSAGE_TIME, "div.message-info span.message-time"];

pub const GROUP_INDICATOR_CASCADE: Cascade = Cascade {
    name: "group-indicators",
    strategies: &[
        Strategy::css(GROUP_DRAWER_SUBJECT),
        Strategy::css(GROUP_DRAWER),
        Strategy::css(GROUP_ICON),
        Strategy::css(GROUP_DEFAULT_ICON),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::Strategy;

    #[test]
    fn test_script_tier_is_last() {
        for cascade in [LOGIN_MARKER_CASCADE, CHAT_ENTRY_CASCADE] {
            let last = cascade.strategies.last().unwrap();
            assert!(matches!(last, Strategy::Script(_)), "{}", cascade.name);
            let scripts = cascade
                .strategies
                .iter()
                .filter(|s| matches!(s, Strategy::Script(_)))
                .count();
            assert_eq!(scripts, 1, "{}", cascade.name);
        }
    }

    #[test]
    fn test_cascades_are_not_empty() {
        for cascade in [
            CHAT_LIST_CASCADE,
            LOGIN_MARKER_PRESENT,
            CHAT_PANE_CASCADE,
            ENTRY_TITLE_CASCADE,
            HEADER_TITLE_CASCADE,
            MESSAGE_PANE_CASCADE,
            PRIMARY_MESSAGE_CASCADE,
            SECONDARY_MESSAGE_CASCADE,
            MESSAGE_HEURISTIC_CASCADE,
            GROUP_INDICATOR_CASCADE,
        ] {
            assert!(!cascade.strategies.is_empty(), "{}", cascade.name);
        }
    }
}
