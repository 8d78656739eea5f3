//! [`PageDriver`] backed by a real Chrome instance over the DevTools protocol

use async_trait::async_trait;
use chromiumoxide::{Browser, BrowserConfig, Element, Page};
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BrowserSettings;
use crate::driver::{NodeHandle, PageDriver, PageScript, ScrollEdge, Selector, SelectorKind};
use crate::error::{DigestError, Result};

const MARK_ATTRIBUTE: &str = "data-digest-mark";

const LAUNCH_ARGS: &[&str] = &[
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-notifications",
    "--disable-popup-blocking",
    "--start-maximized",
];

pub struct ChromiumDriver {
    browser: Mutex<Browser>,
    page: Page,
    elements: StdMutex<HashMap<NodeHandle, Arc<Element>>>,
    closed: Arc<AtomicBool>,
    handler_task: JoinHandle<()>,
}

impl ChromiumDriver {
    /// Start Chrome, open the configured url and wait for the page to settle
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let mut builder = BrowserConfig::builder()
            .args(LAUNCH_ARGS.iter().copied())
            .window_size(settings.window_width, settings.window_height)
            .request_timeout(settings.launch_timeout())
            .launch_timeout(settings.launch_timeout());
        if !settings.headless {
            builder = builder.with_head();
        }
        if let Some(dir) = &settings.user_data_dir {
            builder = builder.user_data_dir(dir);
        }
        if let Some(executable) = &settings.chrome_executable {
            builder = builder.chrome_executable(executable);
        }
        let browser_config = builder.build().map_err(DigestError::SessionUnavailable)?;

        let (browser, handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DigestError::SessionUnavailable(e.to_string()))?;

        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = match browser.new_page(settings.url.as_str()).await {
            Ok(page) => page,
            Err(e) => {
                handler_task.abort();
                return Err(DigestError::SessionUnavailable(e.to_string()));
            }
        };
        info!("Opened {}", settings.url);
        tokio::time::sleep(settings.page_load_settle()).await;

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            elements: StdMutex::new(HashMap::new()),
            closed,
            handler_task,
        })
    }

    fn remember(&self, elements: Vec<Element>) -> Vec<NodeHandle> {
        let mut known = match self.elements.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        elements
            .into_iter()
            .map(|element| {
                let handle = NodeHandle(*element.backend_node_id.inner());
                known.insert(handle, Arc::new(element));
                handle
            })
            .collect()
    }

    fn element(&self, node: &NodeHandle) -> Result<Arc<Element>> {
        let known = match self.elements.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        known
            .get(node)
            .cloned()
            .ok_or_else(|| DigestError::Driver(format!("unknown node {}", node.0)))
    }

    fn forget_all(&self) {
        if let Ok(mut known) = self.elements.lock() {
            known.clear();
        }
    }

    /// Evaluate a function body with `root` bound to the scope element or the document
    async fn evaluate_in(
        &self,
        scope: Option<&NodeHandle>,
        body: &str,
    ) -> Result<Option<serde_json::Value>> {
        match scope {
            None => {
                let expression = format!("(function(root) {{ {} }})(document)", body);
                let result = self.page.evaluate_expression(expression).await?;
                Ok(result.value().cloned())
            }
            Some(node) => {
                let element = self.element(node)?;
                let function = format!("function() {{ const root = this; {} }}", body);
                let returns = element.call_js_fn(function, false).await?;
                Ok(returns.result.value)
            }
        }
    }

    /// Tag the nodes a JS expression yields, fetch them by the tag, then drop the tag.
    ///
    /// `nodes` must evaluate to an array (or array-like) of elements with `root` in scope.
    async fn collect_marked(
        &self,
        scope: Option<&NodeHandle>,
        nodes: &str,
    ) -> Result<Vec<NodeHandle>> {
        let token = Uuid::new_v4().simple().to_string();
        let body = format!(
            "const found = Array.from(({}) || []).filter(n => n && n.nodeType === 1); \
             found.forEach(n => n.setAttribute('{}', '{}')); \
             return found.length;",
            nodes, MARK_ATTRIBUTE, token
        );
        let marked = self
            .evaluate_in(scope, &body)
            .await?
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        if marked == 0 {
            return Ok(Vec::new());
        }

        let selector = format!("[{}=\"{}\"]", MARK_ATTRIBUTE, token);
        let found = self.page.find_elements(selector.as_str()).await;

        let cleanup = format!(
            "document.querySelectorAll('[{}=\"{}\"]').forEach(n => n.removeAttribute('{}'));",
            MARK_ATTRIBUTE, token, MARK_ATTRIBUTE
        );
        if let Err(e) = self.page.evaluate_expression(cleanup).await {
            debug!("Failed to clear node marks: {}", e);
        }

        Ok(self.remember(found?))
    }
}

fn spawn_handler_task(
    mut handler: chromiumoxide::Handler,
    closed: Arc<AtomicBool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                warn!("Browser handler error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn query(&self, scope: Option<&NodeHandle>, selector: &Selector) -> Result<Vec<NodeHandle>> {
        match (selector.kind, scope) {
            (SelectorKind::Css, None) => {
                let found = self.page.find_elements(selector.value).await?;
                Ok(self.remember(found))
            }
            (SelectorKind::Css, Some(node)) => {
                let found = self.element(node)?.find_elements(selector.value).await?;
                Ok(self.remember(found))
            }
            (SelectorKind::XPath, None) => {
                let found = self.page.find_xpaths(selector.value).await?;
                Ok(self.remember(found))
            }
            (SelectorKind::XPath, Some(node)) => {
                let xpath = serde_json::to_string(selector.value)?;
                let nodes = format!(
                    "(() => {{ const r = document.evaluate({}, root, null, \
                     XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null); \
                     const out = []; \
                     for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i)); \
                     return out; }})()",
                    xpath
                );
                self.collect_marked(Some(node), &nodes).await
            }
        }
    }

    async fn query_script(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Vec<NodeHandle>> {
        self.collect_marked(scope, &format!("({})(root)", script.source))
            .await
    }

    async fn script_text(
        &self,
        scope: Option<&NodeHandle>,
        script: &PageScript,
    ) -> Result<Option<String>> {
        let body = format!("return ({})(root);", script.source);
        let value = self.evaluate_in(scope, &body).await?;
        Ok(value.and_then(|v| v.as_str().map(str::to_string)))
    }

    async fn run_script(&self, node: &NodeHandle, script: &PageScript) -> Result<()> {
        let body = format!("({})(root);", script.source);
        self.evaluate_in(Some(node), &body).await?;
        Ok(())
    }

    async fn text(&self, node: &NodeHandle) -> Result<Option<String>> {
        Ok(self.element(node)?.inner_text().await?)
    }

    async fn attribute(&self, node: &NodeHandle, name: &str) -> Result<Option<String>> {
        Ok(self.element(node)?.attribute(name).await?)
    }

    async fn click(&self, node: &NodeHandle) -> Result<()> {
        self.element(node)?.click().await?;
        Ok(())
    }

    async fn scroll(&self, node: &NodeHandle, edge: ScrollEdge) -> Result<()> {
        let body = match edge {
            ScrollEdge::Top => "root.scrollTop = 0;",
            ScrollEdge::Bottom => "root.scrollTop = root.scrollHeight;",
        };
        self.evaluate_in(Some(node), body).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<()> {
        self.forget_all();
        self.page.reload().await?;
        Ok(())
    }

    fn is_alive(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    async fn close(&self) -> Result<()> {
        self.forget_all();
        let result = self.browser.lock().await.close().await;
        self.handler_task.abort();
        self.closed.store(true, Ordering::SeqCst);
        result.map(|_| ()).map_err(|e| DigestError::SessionTerminated(e.to_string()))
    }
}
