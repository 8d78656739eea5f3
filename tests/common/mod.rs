//! Common test utilities and fixtures
//!
//! [`FakePage`] is an in-memory stand-in for the live page. Nodes carry "tags": the
//! exact selector strings (or `script:<name>` for in-page scripts) they answer to. A
//! node can be tied to a conversation view that only shows while that chat is open, to
//! a time window measured from page creation, to the number of reloads so far, or to
//! how many times it has been returned by a query.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

use whatsapp_digest::driver::{NodeHandle, PageDriver, PageScript, ScrollEdge, Selector};
use whatsapp_digest::error::{DigestError, Result};
use whatsapp_digest::scripts;
use whatsapp_digest::selectors;

#[derive(Debug, Clone, Default)]
pub struct FakeNode {
    tags: Vec<String>,
    text: Option<String>,
    attrs: HashMap<String, String>,
    parent: Option<i64>,
    view: Option<String>,
    opens: Option<String>,
    visible_from: Duration,
    visible_until: Option<Duration>,
    min_reloads: u32,
    max_reloads: Option<u32>,
    query_budget: Option<u32>,
    hangs: bool,
    click_fails: bool,
    unclickable: bool,
    ends_session: bool,
}

impl FakeNode {
    pub fn tagged(tag: &str) -> Self {
        Self {
            tags: vec![tag.to_string()],
            ..Self::default()
        }
    }

    /// Node found by an in-page script of that name
    pub fn scripted(script: &PageScript) -> Self {
        Self::tagged(&script_tag(script))
    }

    pub fn also(mut self, tag: &str) -> Self {
        self.tags.push(tag.to_string());
        self
    }

    pub fn under(mut self, parent: NodeHandle) -> Self {
        self.parent = Some(parent.0);
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    /// Only visible while the conversation `view` is open
    pub fn in_view(mut self, view: &str) -> Self {
        self.view = Some(view.to_string());
        self
    }

    /// Clicking this node opens the conversation `view`
    pub fn opens(mut self, view: &str) -> Self {
        self.opens = Some(view.to_string());
        self
    }

    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_from = delay;
        self
    }

    pub fn visible_until(mut self, until: Duration) -> Self {
        self.visible_until = Some(until);
        self
    }

    pub fn after_reloads(mut self, reloads: u32) -> Self {
        self.min_reloads = reloads;
        self
    }

    pub fn until_reload(mut self) -> Self {
        self.max_reloads = Some(0);
        self
    }

    /// Gone once it has been returned by `queries` lookups
    pub fn visible_for_queries(mut self, queries: u32) -> Self {
        self.query_budget = Some(queries);
        self
    }

    /// Any lookup for this node's tags never completes
    pub fn hangs(mut self) -> Self {
        self.hangs = true;
        self
    }

    /// Native clicks fail; in-page clicks still work
    pub fn failing_click(mut self) -> Self {
        self.click_fails = true;
        self
    }

    /// Every kind of click fails
    pub fn unclickable(mut self) -> Self {
        self.unclickable = true;
        self
    }

    /// Clicking this node takes the browser down
    pub fn ends_session(mut self) -> Self {
        self.ends_session = true;
        self
    }
}

fn script_tag(script: &PageScript) -> String {
    format!("script:{}", script.name)
}

#[derive(Debug, Default)]
struct PageState {
    open_view: Option<String>,
    reloads: u32,
    queried: HashMap<i64, u32>,
    clicks: Vec<i64>,
    scripted_clicks: Vec<i64>,
    scrolls: Vec<(i64, ScrollEdge)>,
    closes: u32,
    alive: bool,
}

pub struct FakePage {
    started: Instant,
    nodes: Mutex<Vec<FakeNode>>,
    state: Mutex<PageState>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            nodes: Mutex::new(Vec::new()),
            state: Mutex::new(PageState {
                alive: true,
                ..PageState::default()
            }),
        }
    }

    pub fn add(&self, node: FakeNode) -> NodeHandle {
        let mut nodes = self.nodes.lock().unwrap();
        nodes.push(node);
        NodeHandle(nodes.len() as i64 - 1)
    }

    pub fn reloads(&self) -> u32 {
        self.state.lock().unwrap().reloads
    }

    pub fn closes(&self) -> u32 {
        self.state.lock().unwrap().closes
    }

    pub fn clicks(&self) -> Vec<NodeHandle> {
        self.state.lock().unwrap().clicks.iter().map(|id| NodeHandle(*id)).collect()
    }

    pub fn scripted_clicks(&self) -> Vec<NodeHandle> {
        self.state
            .lock()
            .unwrap()
            .scripted_clicks
            .iter()
            .map(|id| NodeHandle(*id))
            .collect()
    }

    pub fn scrolls(&self) -> Vec<(NodeHandle, ScrollEdge)> {
        self.state
            .lock()
            .unwrap()
            .scrolls
            .iter()
            .map(|(id, edge)| (NodeHandle(*id), *edge))
            .collect()
    }

    pub fn open_view(&self) -> Option<String> {
        self.state.lock().unwrap().open_view.clone()
    }

    pub fn kill(&self) {
        self.state.lock().unwrap().alive = false;
    }

    fn visible(&self, nodes: &[FakeNode], state: &PageState, id: i64) -> bool {
        let Some(node) = usize::try_from(id).ok().and_then(|i| nodes.get(i)) else {
            return false;
        };
        let elapsed = self.started.elapsed();
        if elapsed < node.visible_from {
            return false;
        }
        if node.visible_until.is_some_and(|until| elapsed >= until) {
            return false;
        }
        if state.reloads < node.min_reloads {
            return false;
        }
        if node.max_reloads.is_some_and(|max| state.reloads > max) {
            return false;
        }
        let queried = state.queried.get(&id).copied().unwrap_or(0);
        if node.query_budget.is_some_and(|budget| queried >= budget) {
            return false;
        }
        if let Some(view) = &node.view {
            if state.open_view.as_deref() != Some(view.as_str()) {
                return false;
            }
        }
        match node.parent {
            Some(parent) => self.visible(nodes, state, parent),
            None => true,
        }
    }

    fn is_descendant(nodes: &[FakeNode], id: i64, ancestor: i64) -> bool {
        let mut current = nodes[id as usize].parent;
        while let Some(parent) = current {
            if parent == ancestor {
                return true;
            }
            current = nodes[parent as usize].parent;
        }
        false
    }

    fn matching(&self, scope: Option<&NodeHandle>, tag: &str) -> Result<Vec<NodeHandle>> {
        let nodes = self.nodes.lock().unwrap();
        let mut state = self.state.lock().unwrap();
        if !state.alive {
            return Err(DigestError::Driver("browser is gone".to_string()));
        }
        if let Some(scope) = scope {
            if !self.visible(&nodes, &state, scope.0) {
                return Err(DigestError::Driver(format!("stale node {}", scope.0)));
            }
        }

        let found: Vec<i64> = (0..nodes.len() as i64)
            .filter(|&id| nodes[id as usize].tags.iter().any(|t| t == tag))
            .filter(|&id| scope.map_or(true, |s| Self::is_descendant(&nodes, id, s.0)))
            .filter(|&id| self.visible(&nodes, &state, id))
            .collect();
        for id in &found {
            *state.queried.entry(*id).or_insert(0) += 1;
        }
        Ok(found.into_iter().map(NodeHandle).collect())
    }

    fn hangs_on(&self, tag: &str) -> bool {
        self.nodes
            .lock()
            .unwrap()
            .iter()
            .any(|node| node.hangs && node.tags.iter().any(|t| t == tag))
    }

    fn with_node<T>(&self, node: &NodeHandle, f: impl FnOnce(&FakeNode) -> T) -> Result<T> {
        let nodes = self.nodes.lock().unwrap();
        let state = self.state.lock().unwrap();
        if !state.alive {
            return Err(DigestError::Driver("browser is gone".to_string()));
        }
        if !self.visible(&nodes, &state, node.0) {
            return Err(DigestError::Driver(format!("stale node {}", node.0)));
        }
        Ok(f(&nodes[node.0 as usize]))
    }

    fn activate(&self, node: &NodeHandle, native: bool) -> Result<()> {
        let (opens, fails, ends) = self.with_node(node, |n| {
            (n.opens.clone(), n.unclickable || (native && n.click_fails), n.ends_session)
        })?;
        if fails {
            return Err(DigestError::Driver("element is not clickable".to_string()));
        }

        let mut state = self.state.lock().unwrap();
        if native {
            state.clicks.push(node.0);
        } else {
            state.scripted_clicks.push(node.0);
        }
        if ends {
            state.alive = false;
        }
        if let Some(view) = opens {
            state.open_view = Some(view);
        }
        Ok(())
    }

    /// Text of the node and its visible descendants, joined with spaces
    fn walk_text(&self, node: &NodeHandle) -> Result<Option<String>> {
        let nodes = self.nodes.lock().unwrap();
        let state = self.state.lock().unwrap();
        let parts: Vec<String> = (0..nodes.len() as i64)
            .filter(|&id| id == node.0 || Self::is_descendant(&nodes, id, node.0))
            .filter(|&id| self.visible(&nodes, &state, id))
            .filter_map(|id| nodes[id as usize].text.clone())
            .collect();
        Ok(if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        })
    }
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn query(&self, scope: Option<&NodeHandle>, selector: &Selector) -> Result<Vec<NodeHandle>> {
        if self.hangs_on(selector.value) {
            std::future::pending::<()>().await;
        }
        self.matching(scope, selector.value)
    }

    async fn query_script(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Vec<NodeHandle>> {
        let tag = script_tag(script);
        if self.hangs_on(&tag) {
            std::future::pending::<()>().await;
        }
        self.matching(scope, &tag)
    }

    async fn script_text(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Option<String>> {
        if script.name == scripts::TEXT_WALKER.name {
            return match scope {
                Some(node) => self.walk_text(node),
                None => Ok(None),
            };
        }
        let found = self.matching(scope, &script_tag(script))?;
        match found.first() {
            Some(node) => self.with_node(node, |n| n.text.clone()),
            None => Ok(None),
        }
    }

    async fn run_script(&self, node: &NodeHandle, script: &PageScript) -> Result<()> {
        if script.name == scripts::CLICK.name {
            return self.activate(node, false);
        }
        self.with_node(node, |_| ())
    }

    async fn text(&self, node: &NodeHandle) -> Result<Option<String>> {
        self.with_node(node, |n| n.text.clone())
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        self.with_node(node, |n| n.attrs.get(name).cloned())
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        self.activate(node, true)
    }

    async fn scroll(&self, node: &NodeHandle, edge: ScrollEdge) -> Result<()> {
        self.with_node(node, |_| ())?;
        self.state.lock().unwrap().scrolls.push((node.0, edge));
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.reloads += 1;
        state.open_view = None;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.state.lock().unwrap().alive
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closes += 1;
        state.alive = false;
        Ok(())
    }
}

/// One message of a fixture chat
#[derive(Debug, Clone, Copy)]
pub struct Msg<'a> {
    pub sender: &'a str,
    pub body: &'a str,
    pub outgoing: bool,
}

pub fn incoming<'a>(sender: &'a str, body: &'a str) -> Msg<'a> {
    Msg {
        sender,
        body,
        outgoing: false,
    }
}

pub fn outgoing(body: &str) -> Msg<'_> {
    Msg {
        sender: "You",
        body,
        outgoing: true,
    }
}

/// Logged-in landing page: the chat pane, without any chats yet
pub fn logged_in_page() -> (FakePage, NodeHandle) {
    let page = FakePage::new();
    let pane = page.add(FakeNode::tagged(selectors::CHAT_PANE));
    (page, pane)
}

/// Add a chat-list entry plus the conversation it opens.
///
/// `view` identifies the conversation so two entries can share a title.
pub fn add_chat(
    page: &FakePage,
    pane: NodeHandle,
    view: &str,
    title: &str,
    group: bool,
    messages: &[Msg<'_>],
) -> NodeHandle {
    let entry = add_entry(page, pane, view, title);
    add_conversation(page, view, title, group, messages);
    entry
}

/// Chat-list entry with a titled span, opening `view` when clicked
pub fn add_entry(page: &FakePage, pane: NodeHandle, view: &str, title: &str) -> NodeHandle {
    let entry = page.add(
        FakeNode::tagged(selectors::ENTRY_CELL_FRAME)
            .under(pane)
            .opens(view),
    );
    page.add(
        FakeNode::tagged(selectors::ENTRY_TITLE)
            .under(entry)
            .attr("title", title)
            .text(title),
    );
    entry
}

/// Header, group indicator and message list of a conversation view
pub fn add_conversation(
    page: &FakePage,
    view: &str,
    title: &str,
    group: bool,
    messages: &[Msg<'_>],
) -> NodeHandle {
    let main = page.add(FakeNode::tagged(selectors::CONVERSATION_PANEL).in_view(view));
    page.add(
        FakeNode::tagged(selectors::HEADER_INFO_TITLE)
            .in_view(view)
            .text(title),
    );
    if group {
        page.add(FakeNode::tagged(selectors::GROUP_ICON).in_view(view));
    }

    let list = page.add(FakeNode::tagged(selectors::MESSAGE_PANEL).under(main));
    for message in messages {
        add_message(page, list, message);
    }
    list
}

pub fn add_message(page: &FakePage, list: NodeHandle, message: &Msg<'_>) -> NodeHandle {
    let container = page.add(
        FakeNode::tagged(selectors::MESSAGE_CONTAINER)
            .under(list)
            .attr(
                selectors::METADATA_ATTRIBUTE,
                &format!("[10:30 AM, 3/21/2024] {}: ", message.sender),
            ),
    );
    page.add(
        FakeNode::tagged(selectors::SELECTABLE_TEXT)
            .under(container)
            .text(message.body),
    );
    if message.outgoing {
        page.add(FakeNode::scripted(&scripts::OUTGOING_MARKER).under(container));
    }
    container
}
