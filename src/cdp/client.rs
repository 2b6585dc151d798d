//! DevTools page driver
//!
//! Implements `PageDriver` over a `CdpConnection`. Element operations are
//! expressed as injected `querySelector` scripts; pointer interactions go
//! through `Input.dispatchMouseEvent` along a humanized cursor path.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use super::connection::CdpConnection;
use super::types::EvaluateResponse;
use crate::session::traits::{DriverFactory, PageDriver, SelectOption};
use crate::stealth::PacingPolicy;
use crate::{Error, Result};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Embed a string into generated JavaScript as a quoted literal.
fn js_str(s: &str) -> String {
    serde_json::Value::String(s.to_string()).to_string()
}

/// One DevTools-attached page.
#[derive(Debug)]
pub struct CdpPage {
    connection: Arc<CdpConnection>,
    browser_endpoint: String,
    target_id: String,
    pacing: Arc<dyn PacingPolicy>,
    command_timeout: Duration,
}

impl CdpPage {
    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .connection
            .send_command(
                "Runtime.evaluate",
                serde_json::json!({
                    "expression": script,
                    "returnByValue": true,
                }),
            )
            .await?;

        let response: EvaluateResponse = serde_json::from_value(result)?;
        if let Some(details) = response.exception_details {
            let description = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .unwrap_or("unknown exception");
            return Err(Error::script(description.to_string()));
        }
        Ok(response.result.value.unwrap_or(serde_json::Value::Null))
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        Ok(self.eval(script).await?.as_bool().unwrap_or(false))
    }

    /// Center of the element's bounding box, if it has layout.
    async fn element_center(&self, selector: &str) -> Result<Option<(f64, f64)>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const r = el.getBoundingClientRect();
                if (r.width === 0 && r.height === 0) return null;
                return JSON.stringify({{ x: r.x + r.width / 2, y: r.y + r.height / 2 }});
            }})()"#,
            sel = js_str(selector)
        );

        match self.eval(&script).await? {
            serde_json::Value::String(json) => {
                let point: serde_json::Value = serde_json::from_str(&json)?;
                Ok(point
                    .get("x")
                    .and_then(|x| x.as_f64())
                    .zip(point.get("y").and_then(|y| y.as_f64())))
            }
            _ => Ok(None),
        }
    }

    /// Move the pointer along a humanized path and click.
    async fn pointer_click(&self, x: f64, y: f64) -> Result<()> {
        let path = self.pacing.cursor_path((0.0, 0.0), (x, y));
        for (px, py) in path {
            self.connection
                .send_command(
                    "Input.dispatchMouseEvent",
                    serde_json::json!({ "type": "mouseMoved", "x": px, "y": py }),
                )
                .await?;
        }

        for event_type in ["mousePressed", "mouseReleased"] {
            self.connection
                .send_command(
                    "Input.dispatchMouseEvent",
                    serde_json::json!({
                        "type": event_type,
                        "x": x,
                        "y": y,
                        "button": "left",
                        "clickCount": 1,
                    }),
                )
                .await?;
        }
        Ok(())
    }

    async fn wait_for_load(&self, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if let serde_json::Value::String(state) = self.eval("document.readyState").await? {
                if state == "complete" {
                    return Ok(());
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::navigation("page load did not complete in time"));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    #[instrument(skip(self))]
    async fn navigate(&self, url: &str, wait_for_load: bool, timeout: Duration) -> Result<()> {
        let result = self
            .connection
            .send_command("Page.navigate", serde_json::json!({ "url": url }))
            .await?;

        if let Some(error_text) = result.get("errorText").and_then(|e| e.as_str()) {
            if !error_text.is_empty() {
                return Err(Error::navigation(format!("{}: {}", url, error_text)));
            }
        }

        if wait_for_load {
            self.wait_for_load(timeout).await?;
        }
        Ok(())
    }

    async fn reload(&self, wait_for_load: bool, timeout: Duration) -> Result<()> {
        self.connection
            .send_command("Page.reload", serde_json::json!({ "ignoreCache": false }))
            .await?;
        if wait_for_load {
            self.wait_for_load(timeout).await?;
        }
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        match self.eval("window.location.href").await? {
            serde_json::Value::String(href) => Ok(href),
            other => Err(Error::cdp(format!("unexpected location value: {}", other))),
        }
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_present(selector).await? {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::selector_not_found(selector));
            }
            tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
        }
    }

    async fn is_present(&self, selector: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return !!(el && (el.offsetParent !== null || el.getClientRects().length > 0));
            }})()"#,
            sel = js_str(selector)
        );
        self.eval_bool(&script).await
    }

    #[instrument(skip(self))]
    async fn click(&self, selector: &str) -> Result<()> {
        match self.element_center(selector).await? {
            Some((x, y)) => self.pointer_click(x, y).await,
            None => {
                // No layout box; a scripted click still reaches handlers.
                debug!("No bounding box for {}, falling back to scripted click", selector);
                let script = format!(
                    r#"(() => {{
                        const el = document.querySelector({sel});
                        if (!el) return false;
                        el.scrollIntoView({{ block: 'center' }});
                        el.click();
                        return true;
                    }})()"#,
                    sel = js_str(selector)
                );
                if !self.eval_bool(&script).await? {
                    return Err(Error::selector_not_found(selector));
                }
                Ok(())
            }
        }
    }

    async fn set_value(&self, selector: &str, value: &str, clear_first: bool) -> Result<()> {
        let focus = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return false;
                el.focus();
                {clear}
                return true;
            }})()"#,
            sel = js_str(selector),
            clear = if clear_first { "el.value = '';" } else { "" },
        );
        if !self.eval_bool(&focus).await? {
            return Err(Error::selector_not_found(selector));
        }

        // Character by character, pacing each keystroke, so per-key listeners
        // see a plausible typing rhythm.
        for ch in value.chars() {
            let script = format!(
                r#"(() => {{
                    const el = document.querySelector({sel});
                    el.value += {ch};
                    el.dispatchEvent(new Event('input', {{ bubbles: true }}));
                }})()"#,
                sel = js_str(selector),
                ch = js_str(&ch.to_string()),
            );
            self.eval(&script).await?;
            let delay = self.pacing.typing_delay();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        let finish = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            }})()"#,
            sel = js_str(selector)
        );
        self.eval(&finish).await?;
        Ok(())
    }

    async fn read_value(&self, selector: &str) -> Result<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? String(el.value) : null;
            }})()"#,
            sel = js_str(selector)
        );
        match self.eval(&script).await? {
            serde_json::Value::String(value) => Ok(value),
            _ => Err(Error::selector_not_found(selector)),
        }
    }

    async fn select_by_value(&self, selector: &str, value: &str) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const options = Array.from(el.options || []);
                const match = options.find(o => o.value === {val});
                if (!match) return false;
                el.value = match.value;
                el.dispatchEvent(new Event('change', {{ bubbles: true }}));
                return true;
            }})()"#,
            sel = js_str(selector),
            val = js_str(value),
        );
        match self.eval(&script).await? {
            serde_json::Value::Bool(matched) => Ok(matched),
            _ => Err(Error::selector_not_found(selector)),
        }
    }

    async fn option_list(&self, selector: &str) -> Result<Vec<SelectOption>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                if (!el) return null;
                const options = Array.from(el.options || []);
                return JSON.stringify(options.map(o => ({{ value: o.value, label: o.text.trim() }})));
            }})()"#,
            sel = js_str(selector)
        );
        match self.eval(&script).await? {
            serde_json::Value::String(json) => {
                #[derive(serde::Deserialize)]
                struct RawOption {
                    value: String,
                    label: String,
                }
                let raw: Vec<RawOption> = serde_json::from_str(&json)?;
                Ok(raw
                    .into_iter()
                    .map(|o| SelectOption {
                        value: o.value,
                        label: o.label,
                    })
                    .collect())
            }
            _ => Err(Error::selector_not_found(selector)),
        }
    }

    async fn text_content(&self, selector: &str) -> Result<String> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.textContent : null;
            }})()"#,
            sel = js_str(selector)
        );
        match self.eval(&script).await? {
            serde_json::Value::String(text) => Ok(text),
            _ => Err(Error::selector_not_found(selector)),
        }
    }

    async fn attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({sel});
                return el ? el.getAttribute({attr}) : null;
            }})()"#,
            sel = js_str(selector),
            attr = js_str(name),
        );
        match self.eval(&script).await? {
            serde_json::Value::String(value) => Ok(Some(value)),
            _ => Ok(None),
        }
    }

    async fn blur(&self, selector: Option<&str>) -> Result<()> {
        let script = match selector {
            Some(selector) => format!(
                r#"(() => {{
                    const el = document.querySelector({sel});
                    if (el) el.blur();
                }})()"#,
                sel = js_str(selector)
            ),
            None => "(() => { document.activeElement?.blur(); })()".to_string(),
        };
        self.eval(&script).await?;
        Ok(())
    }

    async fn run_element_script(&self, selector: &str, script: &str) -> Result<()> {
        if !self.is_present(selector).await? {
            return Err(Error::selector_not_found(selector));
        }
        // The script sees exactly one binding: the selected element as `el`.
        let wrapped = format!(
            r#"(function(el) {{ {body} }})(document.querySelector({sel}))"#,
            body = script,
            sel = js_str(selector),
        );
        self.eval(&wrapped).await?;
        Ok(())
    }

    async fn inject_init_script(&self, script: &str) -> Result<()> {
        self.connection
            .send_command(
                "Page.addScriptToEvaluateOnNewDocument",
                serde_json::json!({ "source": script }),
            )
            .await?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.connection
            .send_command(
                "Network.setUserAgentOverride",
                serde_json::json!({ "userAgent": user_agent }),
            )
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Closing the target needs the browser-level connection; the page
        // socket dies with the target.
        if let Ok(browser) =
            CdpConnection::connect(&self.browser_endpoint, self.command_timeout).await
        {
            let _ = browser
                .send_command(
                    "Target.closeTarget",
                    serde_json::json!({ "targetId": self.target_id }),
                )
                .await;
            let _ = browser.close().await;
        }
        self.connection.close().await
    }

    fn is_alive(&self) -> bool {
        self.connection.is_alive()
    }
}

/// Opens DevTools pages against a running browser.
pub struct CdpDriverFactory {
    browser_endpoint: String,
    pacing: Arc<dyn PacingPolicy>,
    command_timeout: Duration,
}

impl CdpDriverFactory {
    pub fn new(
        browser_endpoint: String,
        pacing: Arc<dyn PacingPolicy>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            browser_endpoint,
            pacing,
            command_timeout,
        }
    }

    fn page_ws_url(&self, target_id: &str) -> Result<String> {
        let parsed = Url::parse(&self.browser_endpoint)
            .map_err(|e| Error::config_invalid(format!("invalid CDP endpoint: {}", e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::config_invalid("CDP endpoint without host"))?;
        let port = parsed.port().unwrap_or(9222);
        Ok(format!("ws://{}:{}/devtools/page/{}", host, port, target_id))
    }
}

#[async_trait]
impl DriverFactory for CdpDriverFactory {
    async fn open(&self, domain: &str) -> Result<Arc<dyn PageDriver>> {
        debug!("Opening DevTools page for {}", domain);

        let browser = CdpConnection::connect(&self.browser_endpoint, self.command_timeout).await?;
        let created = browser
            .send_command(
                "Target.createTarget",
                serde_json::json!({ "url": "about:blank" }),
            )
            .await?;
        let target_id = created
            .get("targetId")
            .and_then(|id| id.as_str())
            .ok_or_else(|| Error::cdp("Target.createTarget returned no targetId"))?
            .to_string();
        let _ = browser.close().await;

        let page_url = self.page_ws_url(&target_id)?;
        let connection = CdpConnection::connect(&page_url, self.command_timeout).await?;

        for domain_name in ["Page", "Runtime", "Network"] {
            connection
                .send_command(&format!("{}.enable", domain_name), serde_json::json!({}))
                .await?;
        }

        Ok(Arc::new(CdpPage {
            connection,
            browser_endpoint: self.browser_endpoint.clone(),
            target_id,
            pacing: self.pacing.clone(),
            command_timeout: self.command_timeout,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stealth::NoPacing;

    #[test]
    fn test_js_str_escapes_quotes() {
        assert_eq!(js_str("a'b\"c"), r#""a'b\"c""#);
    }

    #[test]
    fn test_page_ws_url_derivation() {
        let factory = CdpDriverFactory::new(
            "ws://localhost:9222".to_string(),
            Arc::new(NoPacing),
            Duration::from_secs(5),
        );
        assert_eq!(
            factory.page_ws_url("ABC123").unwrap(),
            "ws://localhost:9222/devtools/page/ABC123"
        );
    }

    #[test]
    fn test_page_ws_url_rejects_garbage() {
        let factory = CdpDriverFactory::new(
            "not a url".to_string(),
            Arc::new(NoPacing),
            Duration::from_secs(5),
        );
        assert!(factory.page_ws_url("ABC").is_err());
    }
}
