//! Real browser control over the Chrome DevTools Protocol.
//!
//! This module adapts a live Chromium page to the [`UiDriver`] capability
//! via chromiumoxide. Element identity is kept in a page-side registry:
//! `resolve` stores the matched node under a generated key and every later
//! operation looks the node up again, throwing (and thus surfacing a
//! backend fault) when the node has detached. Native activation and pointer
//! moves go through the CDP Input domain; everything else is expressed as
//! script evaluation over [`Locator::to_query`] renderings.

use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::driver::{ElementHandle, UiDriver};
use crate::locator::Locator;
use crate::result::{SondarError, SondarResult};

/// Browser configuration
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode
    pub headless: bool,
    /// Path to chromium binary (None = auto-detect)
    pub chromium_path: Option<String>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl BrowserConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<String>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox (for containers/CI)
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Browser instance with a live CDP connection
#[derive(Debug)]
pub struct Browser {
    inner: Arc<Mutex<CdpBrowser>>,
    #[allow(dead_code)]
    handle: tokio::task::JoinHandle<()>,
}

impl Browser {
    /// Launch a new browser instance
    ///
    /// # Errors
    ///
    /// Returns [`SondarError::BrowserLaunch`] if the browser cannot be
    /// launched
    pub async fn launch(config: BrowserConfig) -> SondarResult<Self> {
        let mut builder = CdpConfig::builder();

        if !config.headless {
            builder = builder.with_head();
        }
        if !config.sandbox {
            builder = builder.no_sandbox();
        }
        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder.build().map_err(|e| SondarError::BrowserLaunch {
            message: e.to_string(),
        })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| SondarError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        // Drive the CDP message loop until the connection drops
        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        Ok(Self {
            inner: Arc::new(Mutex::new(browser)),
            handle,
        })
    }

    /// Open a new page and wrap it as a [`CdpDriver`]
    ///
    /// # Errors
    ///
    /// Returns [`SondarError::Backend`] if the page cannot be created
    pub async fn new_page(&self) -> SondarResult<CdpDriver> {
        let browser = self.inner.lock().await;
        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| SondarError::backend(e.to_string()))?;
        Ok(CdpDriver {
            page: Arc::new(Mutex::new(page)),
        })
    }

    /// Close the browser
    pub async fn close(self) -> SondarResult<()> {
        let mut browser = self.inner.lock().await;
        browser
            .close()
            .await
            .map_err(|e| SondarError::backend(e.to_string()))?;
        Ok(())
    }
}

/// Element center coordinates reported by the page
#[derive(Debug, Deserialize)]
struct Center {
    x: f64,
    y: f64,
}

/// Node descriptor returned by the resolve script
#[derive(Debug, Deserialize)]
struct ResolvedNode {
    id: String,
    tag: Option<String>,
}

/// A Chromium page adapted to the [`UiDriver`] capability
#[derive(Debug, Clone)]
pub struct CdpDriver {
    page: Arc<Mutex<CdpPage>>,
}

impl CdpDriver {
    /// Navigate the page to a URL
    ///
    /// # Errors
    ///
    /// Returns [`SondarError::Backend`] if navigation fails
    pub async fn goto(&self, url: &str) -> SondarResult<()> {
        let page = self.page.lock().await;
        page.goto(url)
            .await
            .map_err(|e| SondarError::backend(format!("navigation to {url} failed: {e}")))?;
        Ok(())
    }

    async fn eval<T: serde::de::DeserializeOwned>(&self, script: String) -> SondarResult<T> {
        let page = self.page.lock().await;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| SondarError::backend(e.to_string()))?;
        result
            .into_value()
            .map_err(|e| SondarError::backend(e.to_string()))
    }

    /// Script that looks the element up in the page-side registry and
    /// throws on a detached node
    fn with_element(id: &str, body: &str) -> String {
        format!(
            "(() => {{ \
                const reg = window.__sondar || {{ els: {{}} }}; \
                const el = reg.els[{id:?}]; \
                if (!el || !el.isConnected) throw new Error('stale element handle: ' + {id:?}); \
                {body} \
            }})()"
        )
    }

    async fn center_of(&self, handle: &ElementHandle) -> SondarResult<Center> {
        let script = Self::with_element(
            &handle.id,
            "el.scrollIntoView({ block: 'center', inline: 'nearest' }); \
             const r = el.getBoundingClientRect(); \
             return { x: r.left + r.width / 2, y: r.top + r.height / 2 };",
        );
        self.eval(script).await
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        center: &Center,
        with_button: bool,
    ) -> SondarResult<()> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(center.x)
            .y(center.y);
        if with_button {
            builder = builder.button(MouseButton::Left).click_count(1);
        }
        let params = builder
            .build()
            .map_err(|e| SondarError::backend(e.to_string()))?;
        let page = self.page.lock().await;
        page.execute(params)
            .await
            .map_err(|e| SondarError::backend(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl UiDriver for CdpDriver {
    async fn resolve(&self, locator: &Locator) -> SondarResult<Option<ElementHandle>> {
        let script = format!(
            "(() => {{ \
                const el = {query}; \
                if (!el) return null; \
                const reg = (window.__sondar = window.__sondar || {{ seq: 0, els: {{}} }}); \
                const id = 'el-' + (++reg.seq); \
                reg.els[id] = el; \
                return {{ id: id, tag: el.tagName.toLowerCase() }}; \
            }})()",
            query = locator.to_query()
        );
        let node: Option<ResolvedNode> = self.eval(script).await?;
        Ok(node.map(|n| {
            let mut handle = ElementHandle::new(n.id);
            handle.tag_name = n.tag;
            handle
        }))
    }

    async fn is_present(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let script = format!(
            "(() => {{ \
                const reg = window.__sondar || {{ els: {{}} }}; \
                const el = reg.els[{id:?}]; \
                return !!(el && el.isConnected); \
            }})()",
            id = handle.id
        );
        self.eval(script).await
    }

    async fn is_visible(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let script = Self::with_element(
            &handle.id,
            "const r = el.getBoundingClientRect(); \
             const style = window.getComputedStyle(el); \
             return r.width > 0 && r.height > 0 \
                 && style.visibility !== 'hidden' && style.display !== 'none';",
        );
        self.eval(script).await
    }

    async fn is_clickable(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let script = Self::with_element(
            &handle.id,
            "const r = el.getBoundingClientRect(); \
             if (r.width === 0 || r.height === 0) return false; \
             const style = window.getComputedStyle(el); \
             if (style.visibility === 'hidden' || style.display === 'none') return false; \
             const hit = document.elementFromPoint(r.left + r.width / 2, r.top + r.height / 2); \
             return !!hit && (hit === el || el.contains(hit) || hit.contains(el));",
        );
        self.eval(script).await
    }

    async fn is_enabled(&self, handle: &ElementHandle) -> SondarResult<bool> {
        let script = Self::with_element(
            &handle.id,
            "return !el.disabled && !el.hasAttribute('disabled');",
        );
        self.eval(script).await
    }

    async fn attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> SondarResult<Option<String>> {
        let script = Self::with_element(&handle.id, &format!("return el.getAttribute({name:?});"));
        self.eval(script).await
    }

    async fn activate(&self, handle: &ElementHandle) -> SondarResult<()> {
        let center = self.center_of(handle).await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, &center, false)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MousePressed, &center, true)
            .await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseReleased, &center, true)
            .await?;
        Ok(())
    }

    async fn synthetic_activate(&self, handle: &ElementHandle) -> SondarResult<()> {
        let script = Self::with_element(&handle.id, "el.click(); return true;");
        let _: bool = self.eval(script).await?;
        Ok(())
    }

    async fn type_text(&self, handle: &ElementHandle, text: &str) -> SondarResult<()> {
        let script = Self::with_element(
            &handle.id,
            &format!(
                "el.focus(); \
                 if ('value' in el) {{ \
                     el.value = el.value + {text:?}; \
                     el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                     el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                 }} \
                 return true;"
            ),
        );
        let _: bool = self.eval(script).await?;
        Ok(())
    }

    async fn set_scroll_offset(&self, handle: &ElementHandle, offset: f64) -> SondarResult<()> {
        // The browser clamps scrollTop to the scrollable extent, so an
        // oversized offset lands at the end of the list.
        let script = Self::with_element(
            &handle.id,
            &format!("el.scrollTop = {offset}; return el.scrollTop;"),
        );
        let landed: f64 = self.eval(script).await?;
        debug!(id = %handle.id, offset, landed, "scroll offset assigned");
        Ok(())
    }

    async fn scroll_by(&self, handle: &ElementHandle, delta: f64) -> SondarResult<()> {
        let script = Self::with_element(
            &handle.id,
            &format!(
                "if (typeof el.scrollBy === 'function') {{ el.scrollBy(0, {delta}); }} \
                 else {{ el.scrollTop = el.scrollTop + {delta}; }} \
                 return true;"
            ),
        );
        let _: bool = self.eval(script).await?;
        Ok(())
    }

    async fn move_pointer_to(&self, handle: &ElementHandle) -> SondarResult<()> {
        let center = self.center_of(handle).await?;
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, &center, false)
            .await
    }

    async fn evaluate(&self, expression: &str) -> SondarResult<Value> {
        self.eval(expression.to_string()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_browser_config_builder() {
        let config = BrowserConfig::default()
            .with_headless(false)
            .with_chromium_path("/usr/bin/chromium")
            .with_no_sandbox();
        assert!(!config.headless);
        assert_eq!(config.chromium_path.as_deref(), Some("/usr/bin/chromium"));
        assert!(!config.sandbox);
    }

    #[test]
    fn test_element_lookup_script_names_handle() {
        let script = CdpDriver::with_element("el-7", "return true;");
        assert!(script.contains("\"el-7\""));
        assert!(script.contains("isConnected"));
    }

    #[test]
    fn test_resolve_script_embeds_locator_query() {
        let locator = Locator::css("button.primary");
        assert!(locator.to_query().contains("querySelector"));
    }
}
