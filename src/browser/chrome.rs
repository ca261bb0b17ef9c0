//! chromiumoxide-backed [`Driver`]
//!
//! Frames are reached through same-origin script evaluation from the top
//! page (`window.frames[i]...`), so every primitive is a small script run via
//! `Page::evaluate`. Located elements are tagged with a `data-harvest-ref`
//! attribute whose value becomes the [`ElementHandle`] token.

use crate::browser::driver::{
    ClickMode, Driver, DriverError, DriverResult, ElementHandle, FrameHandle, FramePath,
};
use crate::config::BrowserConfig;
use async_trait::async_trait;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

const REF_ATTRIBUTE: &str = "data-harvest-ref";

/// Browser session driving a single tab
pub struct ChromeDriver {
    browser: Browser,
    page: Page,
    handler_task: JoinHandle<()>,
}

#[derive(Debug, Deserialize)]
struct ScriptReply {
    #[serde(default)]
    ok: Value,
    #[serde(default)]
    err: Option<String>,
    #[serde(default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    path: Vec<usize>,
    name: String,
    url: String,
}

impl ChromeDriver {
    /// Launches a browser and opens the working tab
    pub async fn launch(config: &BrowserConfig) -> DriverResult<Self> {
        let mut builder = chromiumoxide::BrowserConfig::builder()
            .window_size(config.window_width, config.window_height)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg(format!("--lang={}", config.locale));

        if !config.headless {
            builder = builder.with_head();
        }
        if let Some(path) = &config.chrome_path {
            builder = builder.chrome_executable(path);
        }
        if let Some(user_agent) = &config.user_agent {
            builder = builder.arg(format!("--user-agent={}", user_agent));
        }
        for arg in &config.extra_args {
            builder = builder.arg(arg.clone());
        }

        let browser_config = builder.build().map_err(DriverError::Launch)?;
        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    tracing::warn!("CDP handler event error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| DriverError::Launch(e.to_string()))?;

        tracing::info!(
            headless = config.headless,
            "Browser launched ({}x{})",
            config.window_width,
            config.window_height
        );

        Ok(Self {
            browser,
            page,
            handler_task,
        })
    }

    /// Closes the browser process and stops the CDP handler
    pub async fn close(mut self) -> DriverResult<()> {
        let result = self
            .browser
            .close()
            .await
            .map(|_| ())
            .map_err(|e| DriverError::Protocol(e.to_string()));
        self.handler_task.abort();
        result
    }

    /// Runs `body` with `win`/`doc` bound to the frame at `path`
    ///
    /// The body must `return` a JSON-serializable value. Failures come back as
    /// `{err, kind}` objects and are mapped onto [`DriverError`] variants.
    async fn run_in_frame(&self, path: &FramePath, body: &str) -> DriverResult<Value> {
        let indices = serde_json::to_string(path.indices())
            .map_err(|e| DriverError::Script(e.to_string()))?;
        let script = format!(
            r#"(() => {{
                let win = window;
                try {{
                    for (const i of {indices}) {{
                        win = win.frames[i];
                        if (!win) return {{ err: 'frame index ' + i + ' missing', kind: 'detached' }};
                    }}
                    const doc = win.document;
                    if (!doc) return {{ err: 'frame has no document', kind: 'detached' }};
                    const byRef = (token) => doc.querySelector('[{attr}="' + token + '"]');
                    const tag = (el) => {{
                        if (!el.hasAttribute('{attr}')) {{
                            const top = window.top;
                            top.__harvestSeq = (top.__harvestSeq || Date.now() * 1000) + 1;
                            el.setAttribute('{attr}', String(top.__harvestSeq));
                        }}
                        return Number(el.getAttribute('{attr}'));
                    }};
                    const visible = (el) => {{
                        const style = win.getComputedStyle(el);
                        if (style.display === 'none' || style.visibility === 'hidden') return false;
                        return !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
                    }};
                    const result = (() => {{ {body} }})();
                    return {{ ok: result === undefined ? null : result }};
                }} catch (e) {{
                    return {{ err: String(e), kind: 'script' }};
                }}
            }})()"#,
            indices = indices,
            attr = REF_ATTRIBUTE,
            body = body,
        );

        let raw: Value = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| DriverError::Protocol(e.to_string()))?
            .into_value()
            .unwrap_or_default();

        let reply: ScriptReply =
            serde_json::from_value(raw).map_err(|e| DriverError::Script(e.to_string()))?;

        match (reply.err, reply.kind.as_deref()) {
            (None, _) => Ok(reply.ok),
            (Some(message), Some("detached")) => Err(DriverError::Detached(message)),
            (Some(message), Some("not_found")) => Err(DriverError::NotFound(message)),
            (Some(message), Some("not_interactable")) => Err(DriverError::NotInteractable(message)),
            (Some(message), _) => Err(DriverError::Script(message)),
        }
    }

    /// Runs `body` with `el` bound to the referenced element
    async fn run_on_element(&self, element: &ElementHandle, body: &str) -> DriverResult<Value> {
        let wrapped = format!(
            r#"const el = byRef({token});
               if (!el) return {{ __missing: true }};
               {body}"#,
            token = element.token,
            body = body,
        );
        let value = self.run_in_frame(&element.frame, &wrapped).await?;
        if value.get("__missing").and_then(Value::as_bool) == Some(true) {
            return Err(DriverError::NotFound(format!(
                "element ref {} in frame {}",
                element.token, element.frame
            )));
        }
        Ok(value)
    }

    fn to_handles(frame: &FramePath, value: Value) -> Vec<ElementHandle> {
        value
            .as_array()
            .map(|tokens| {
                tokens
                    .iter()
                    .filter_map(Value::as_u64)
                    .map(|token| ElementHandle::new(frame.clone(), token))
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl Driver for ChromeDriver {
    async fn navigate(&self, url: &str, timeout: Duration) -> DriverResult<()> {
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(DriverError::Navigation(format!(
                "Failed to navigate to {}: {}",
                url, e
            ))),
            Err(_) => Err(DriverError::timeout(format!("navigation to {}", url), timeout)),
        }
    }

    async fn frames(&self) -> DriverResult<Vec<FrameHandle>> {
        let body = r#"
            const out = [];
            const walk = (w, path) => {
                for (let i = 0; i < w.frames.length; i++) {
                    const child = w.frames[i];
                    const childPath = path.concat([i]);
                    let name = '', url = '';
                    try { name = child.name || ''; url = child.location.href; } catch (e) { continue; }
                    out.push({ path: childPath, name: name, url: url });
                    walk(child, childPath);
                }
            };
            walk(win, []);
            return out;
        "#;
        let value = self.run_in_frame(&FramePath::top(), body).await?;
        let raw: Vec<RawFrame> =
            serde_json::from_value(value).map_err(|e| DriverError::Script(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|frame| FrameHandle {
                path: FramePath::new(frame.path),
                name: frame.name,
                url: frame.url,
            })
            .collect())
    }

    async fn query_all(&self, frame: &FramePath, selector: &str) -> DriverResult<Vec<ElementHandle>> {
        let body = format!(
            "return Array.from(doc.querySelectorAll({})).map(tag);",
            js_string(selector)
        );
        let value = self.run_in_frame(frame, &body).await?;
        Ok(Self::to_handles(frame, value))
    }

    async fn query_within(
        &self,
        element: &ElementHandle,
        selector: &str,
    ) -> DriverResult<Vec<ElementHandle>> {
        let body = format!(
            "return Array.from(el.querySelectorAll({})).map(tag);",
            js_string(selector)
        );
        let value = self.run_on_element(element, &body).await?;
        Ok(Self::to_handles(&element.frame, value))
    }

    async fn is_visible(&self, element: &ElementHandle) -> DriverResult<bool> {
        let value = self.run_on_element(element, "return visible(el);").await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn attribute(&self, element: &ElementHandle, name: &str) -> DriverResult<Option<String>> {
        let body = format!("return el.getAttribute({});", js_string(name));
        let value = self.run_on_element(element, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn inner_text(&self, element: &ElementHandle) -> DriverResult<String> {
        let value = self
            .run_on_element(element, "return el.innerText || el.textContent || '';")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn text_content(&self, frame: &FramePath) -> DriverResult<String> {
        let value = self
            .run_in_frame(frame, "return doc.body ? (doc.body.innerText || '') : '';")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn click(&self, element: &ElementHandle, mode: ClickMode) -> DriverResult<()> {
        let body = match mode {
            ClickMode::Normal => {
                r#"
                if (!visible(el)) return { __blocked: true };
                el.scrollIntoView({ block: 'center' });
                for (const type of ['mousedown', 'mouseup']) {
                    el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: win }));
                }
                el.click();
                return true;
                "#
            }
            ClickMode::Force => "el.click(); return true;",
        };
        let value = self.run_on_element(element, body).await?;
        if value.get("__blocked").and_then(Value::as_bool) == Some(true) {
            return Err(DriverError::NotInteractable(format!(
                "element ref {} is not visible",
                element.token
            )));
        }
        Ok(())
    }

    async fn hover(&self, element: &ElementHandle) -> DriverResult<()> {
        let body = r#"
            for (const type of ['mouseover', 'mouseenter', 'mousemove']) {
                el.dispatchEvent(new MouseEvent(type, { bubbles: true, cancelable: true, view: win }));
            }
            return true;
        "#;
        self.run_on_element(element, body).await.map(|_| ())
    }

    async fn scroll_into_view(&self, element: &ElementHandle) -> DriverResult<()> {
        self.run_on_element(element, "el.scrollIntoView({ block: 'center' }); return true;")
            .await
            .map(|_| ())
    }

    async fn press_key(&self, key: &str) -> DriverResult<()> {
        let body = format!(
            r#"
            const target = doc.activeElement || doc.body;
            for (const type of ['keydown', 'keyup']) {{
                target.dispatchEvent(new KeyboardEvent(type, {{ key: {key}, bubbles: true }}));
            }}
            return true;
            "#,
            key = js_string(key)
        );
        self.run_in_frame(&FramePath::top(), &body).await.map(|_| ())
    }

    async fn evaluate(&self, frame: &FramePath, script: &str) -> DriverResult<Value> {
        // `script` is a function expression; `window` and `document` resolve to the frame's
        let body = format!(
            "return (function (window, document) {{ return ({}).call(window); }})(win, doc);",
            script
        );
        self.run_in_frame(frame, &body).await
    }

    async fn go_back(&self) -> DriverResult<()> {
        self.run_in_frame(&FramePath::top(), "history.back(); return true;")
            .await
            .map(|_| ())
    }

    async fn wait_for_network_idle(&self, timeout: Duration) -> DriverResult<()> {
        const IDLE_WINDOW: Duration = Duration::from_millis(1000);
        const INTERVAL: Duration = Duration::from_millis(250);

        let body = r#"
            let count = 0;
            try { count = performance.getEntriesByType('resource').length; } catch (e) {}
            return { ready: doc.readyState === 'complete', count: count };
        "#;
        let deadline = Instant::now() + timeout;
        let mut last_count: Option<u64> = None;
        let mut stable = Duration::ZERO;

        while Instant::now() < deadline {
            sleep(INTERVAL).await;
            let Ok(value) = self.run_in_frame(&FramePath::top(), body).await else {
                stable = Duration::ZERO;
                continue;
            };
            let ready = value.get("ready").and_then(Value::as_bool).unwrap_or(false);
            let count = value.get("count").and_then(Value::as_u64);
            if ready && count == last_count {
                stable += INTERVAL;
                if stable >= IDLE_WINDOW {
                    return Ok(());
                }
            } else {
                stable = Duration::ZERO;
            }
            last_count = count;
        }

        Err(DriverError::timeout("network idle", timeout))
    }

    async fn content(&self, frame: &FramePath) -> DriverResult<String> {
        let value = self
            .run_in_frame(frame, "return doc.documentElement.outerHTML;")
            .await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn frame_url(&self, frame: &FramePath) -> DriverResult<String> {
        let value = self.run_in_frame(frame, "return win.location.href;").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }
}
