//! Abstraction over the live page the engine reads from
//!
//! Every DOM read and write goes through [`PageDriver`], so the extraction components can
//! run against a real browser ([`crate::browser::ChromiumDriver`]) or an in-memory fixture.

use async_trait::async_trait;

use crate::error::Result;

/// Opaque reference to one element of the live page.
///
/// Two handles are equal when they refer to the same DOM node. Handles are only meaningful
/// for the driver that produced them and become invalid after a reload or navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Css,
    XPath,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selector {
    pub kind: SelectorKind,
    pub value: &'static str,
}

/// A piece of JavaScript evaluated inside the page.
///
/// `source` is a function expression taking the search root (`document` or the scoped
/// element). Node-finding scripts return an array of elements, text scripts return a
/// string or null, action scripts return nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageScript {
    pub name: &'static str,
    pub source: &'static str,
}

/// One step of a locator cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Selector(Selector),
    Script(PageScript),
}

impl Strategy {
    pub const fn css(value: &'static str) -> Self {
        Strategy::Selector(Selector {
            kind: SelectorKind::Css,
            value,
        })
    }

    pub const fn xpath(value: &'static str) -> Self {
        Strategy::Selector(Selector {
            kind: SelectorKind::XPath,
            value,
        })
    }

    pub const fn script(script: PageScript) -> Self {
        Strategy::Script(script)
    }

    /// Short human-readable form used in logs and events
    pub fn describe(&self) -> String {
        match self {
            Strategy::Selector(Selector {
                kind: SelectorKind::Css,
                value,
            }) => format!("css:{}", value),
            Strategy::Selector(Selector {
                kind: SelectorKind::XPath,
                value,
            }) => format!("xpath:{}", value),
            Strategy::Script(script) => format!("script:{}", script.name),
        }
    }
}

/// Where a scroll container should be moved to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEdge {
    Top,
    Bottom,
}

/// Operations the extraction engine needs from a live page
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// All elements matching `selector` below `scope` (the whole document when `None`),
    /// in document order
    async fn query(&self, scope: Option<&NodeHandle>, selector: &Selector) -> Result<Vec<NodeHandle>>;

    /// Elements returned by a node-finding script run against `scope`
    async fn query_script(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Vec<NodeHandle>>;

    /// String produced by a text script run against `scope`
    async fn script_text(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Option<String>>;

    /// Run an action script against one element
    async fn run_script(&self, node: &NodeHandle, script: &PageScript) -> Result<()>;

    /// Rendered text of an element
    async fn text(&self, node: &NodeHandle) -> Result<Option<String>>;

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>>;

    /// Native click (scroll into view, then a real mouse click)
    async fn click(&self, node: &NodeHandle) -> Result<()>;

    async fn scroll(&self, node: &NodeHandle, edge: ScrollEdge) -> Result<()>;

    /// Reload the page; every handle obtained before is invalid afterwards
    async fn reload(&self) -> Result<()>;

    /// False once the underlying browser went away
    fn is_alive(&self) -> bool;

    /// Release the browser session
    async fn close(&self) -> Result<()>;
}
