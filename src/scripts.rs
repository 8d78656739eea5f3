//! In-page JavaScript used as the last tier of the selector cascades

use crate::driver::PageScript;

/// Visible scannable login code anywhere on the landing page
pub const FIND_LOGIN_CODE: PageScript = PageScript {
    name: "find-login-code",
    source: r#"(root) => {
        const selectors = [
            'div[data-testid="qrcode"]',
            'canvas[aria-label*="Scan me"]',
            'div[data-ref]',
            'div[class*="landing-wrapper"] canvas',
            'div[class*="qr-container"] canvas',
            'div[class*="landing"] canvas'
        ];
        for (const selector of selectors) {
            const el = root.querySelector(selector);
            if (el && el.offsetParent !== null) {
                return [el];
            }
        }
        return [];
    }"#,
};

/// Rows of the chat list
pub const FIND_CHAT_ENTRIES: PageScript = PageScript {
    name: "find-chat-entries",
    source: r#"(root) => Array.from(
        root.querySelectorAll('#pane-side [role="row"], #pane-side [role="gridcell"]')
    )"#,
};

/// Title of the open conversation from its header
pub const HEADER_TITLE: PageScript = PageScript {
    name: "header-title",
    source: r#"(root) => {
        const el = root.querySelector('header span[title]') ||
            root.querySelector('header div[title]') ||
            root.querySelector('[data-testid="conversation-info-header-chat-title"]');
        if (!el) return null;
        const title = (el.getAttribute('title') || el.textContent || '').trim();
        return title.length ? title : null;
    }"#,
};

/// Elements that look like messages: known containers first, then any div with
/// text-bearing content plus a timestamp or metadata attribute
pub const FIND_MESSAGES: PageScript = PageScript {
    name: "find-messages",
    source: r#"(root) => {
        const found = new Set();
        const selectors = [
            'div[data-testid="msg-container"]',
            '.message-in, .message-out',
            'div[data-pre-plain-text]',
            'div.copyable-text'
        ];
        for (const selector of selectors) {
            root.querySelectorAll(selector).forEach(el => found.add(el));
        }
        if (found.size === 0) {
            root.querySelectorAll('div').forEach(el => {
                const text = el.querySelector('span.selectable-text, span[dir="ltr"], span[dir="auto"]');
                const time = el.querySelector('span[data-testid="msg-time"]');
                const meta = el.getAttribute('data-pre-plain-text');
                if (((text && time) || meta) && text && text.textContent.trim()) {
                    found.add(el);
                }
            });
        }
        return Array.from(found);
    }"#,
};

/// Broadest message search: any div with a span and text plus a message-like attribute
pub const FIND_ANY_MESSAGE: PageScript = PageScript {
    name: "find-any-message",
    source: r#"(root) => {
        const found = [];
        root.querySelectorAll('div').forEach(el => {
            const hasText = el.querySelector('span') && el.textContent.trim();
            const hasAttr = el.getAttribute('data-id') ||
                el.getAttribute('data-pre-plain-text') ||
                el.querySelector('span[data-testid="msg-time"]');
            if (hasText && hasAttr) {
                found.push(el);
            }
        });
        return found;
    }"#,
};

/// Plain text of an element, skipping script and style contents
pub const TEXT_WALKER: PageScript = PageScript {
    name: "text-walker",
    source: r#"(root) => {
        const walker = document.createTreeWalker(root, NodeFilter.SHOW_TEXT, null, false);
        const parts = [];
        let node;
        while ((node = walker.nextNode())) {
            const parent = node.parentElement;
            if (parent && ['SCRIPT', 'STYLE'].includes(parent.tagName)) continue;
            const text = node.textContent.trim();
            if (text) parts.push(text);
        }
        return parts.length ? parts.join(' ') : null;
    }"#,
};

/// The element itself when it sits inside an outgoing message bubble
pub const OUTGOING_MARKER: PageScript = PageScript {
    name: "outgoing-marker",
    source: r#"(root) => {
        const bubble = root.closest('.message-out') || root.querySelector('.message-out');
        return bubble ? [root] : [];
    }"#,
};

/// Click dispatched from inside the page
pub const CLICK: PageScript = PageScript {
    name: "click",
    source: r#"(root) => { root.click(); }"#,
};

pub const SCROLL_INTO_VIEW: PageScript = PageScript {
    name: "scroll-into-view",
    source: r#"(root) => { root.scrollIntoView(true); }"#,
};
