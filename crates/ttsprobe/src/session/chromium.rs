//! Chromium session over the DevTools Protocol.
//!
//! All DOM interaction goes through `Runtime.evaluate` against element ids.
//! After every navigation a small hook is installed in the page that buffers
//! console output and records each `/generate` response as a
//! [`GENERATE_MARKER`](super::GENERATE_MARKER) entry.

use super::{BrowserSession, ConsoleEntry};
use crate::result::{ProbeError, ProbeResult};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Buffers console calls and `/generate` responses into
/// `window.__ttsprobeConsole`. Idempotent per document.
const HOOK_SCRIPT: &str = r#"(() => {
  if (window.__ttsprobeHooked) { return true; }
  window.__ttsprobeHooked = true;
  window.__ttsprobeConsole = window.__ttsprobeConsole || [];
  const push = (level, text) => window.__ttsprobeConsole.push({ level, text: String(text) });
  for (const level of ['log', 'info', 'warn', 'error', 'debug']) {
    const orig = console[level].bind(console);
    console[level] = (...args) => {
      try {
        push(level, args.map(a => typeof a === 'string' ? a : JSON.stringify(a)).join(' '));
      } catch (e) {}
      orig(...args);
    };
  }
  window.addEventListener('error', ev => push('error', ev.message));
  window.addEventListener('unhandledrejection', ev => push('error', String(ev.reason)));
  const origFetch = window.fetch.bind(window);
  window.fetch = async (input, init) => {
    const resp = await origFetch(input, init);
    try {
      const url = typeof input === 'string' ? input : (input && input.url) || '';
      if (url.indexOf('/generate') !== -1) {
        const body = await resp.clone().json().catch(() => null);
        let request = null;
        try { request = init && init.body ? JSON.parse(init.body) : null; } catch (e) {}
        push('info', 'ttsprobe:generate ' + JSON.stringify({ status: resp.status, body, request }));
      }
    } catch (e) {}
    return resp;
  };
  return true;
})()"#;

const DRAIN_SCRIPT: &str = r"(() => {
  const entries = window.__ttsprobeConsole || [];
  window.__ttsprobeConsole = [];
  return entries;
})()";

/// Browser launch configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Run without a visible window
    pub headless: bool,
    /// Window width
    pub viewport_width: u32,
    /// Window height
    pub viewport_height: u32,
    /// Path to the chromium binary (None = auto-detect)
    pub chromium_path: Option<PathBuf>,
    /// Sandbox mode (disable for containers)
    pub sandbox: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1280,
            viewport_height: 1024,
            chromium_path: None,
            sandbox: true,
        }
    }
}

impl SessionConfig {
    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Set chromium path
    #[must_use]
    pub fn with_chromium_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.chromium_path = Some(path.into());
        self
    }

    /// Disable sandbox
    #[must_use]
    pub const fn with_no_sandbox(mut self) -> Self {
        self.sandbox = false;
        self
    }
}

/// Result of an element-scoped script
#[derive(Debug, Deserialize)]
struct ElementReply {
    #[serde(default)]
    missing: bool,
    #[serde(default)]
    value: serde_json::Value,
}

/// A single chromium page driven over CDP
#[derive(Debug)]
pub struct ChromiumSession {
    browser: CdpBrowser,
    page: CdpPage,
    handler: tokio::task::JoinHandle<()>,
    closed: bool,
}

impl ChromiumSession {
    /// Launch chromium and open a blank page
    ///
    /// # Errors
    ///
    /// Returns error if the browser cannot be launched or connected to
    pub async fn launch(config: SessionConfig) -> ProbeResult<Self> {
        let mut builder =
            CdpConfig::builder().window_size(config.viewport_width, config.viewport_height);

        if !config.headless {
            builder = builder.with_head();
        }

        if !config.sandbox {
            builder = builder.no_sandbox();
        }

        if let Some(ref path) = config.chromium_path {
            builder = builder.chrome_executable(path);
        }

        let cdp_config = builder
            .build()
            .map_err(|message| ProbeError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| ProbeError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| ProbeError::ConnectionFailed {
                message: e.to_string(),
            })?;

        tracing::debug!(headless = config.headless, "chromium session launched");

        Ok(Self {
            browser,
            page,
            handler,
            closed: false,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, expression: String) -> ProbeResult<T> {
        let result = self
            .page
            .evaluate(expression)
            .await
            .map_err(|e| ProbeError::browser_fault(e.to_string()))?;
        result.into_value().map_err(|e| ProbeError::Script {
            message: e.to_string(),
        })
    }

    /// Run `body` with `el` bound to the element; a vanished element is stale
    async fn on_element<T: DeserializeOwned>(&self, selector: &str, body: &str) -> ProbeResult<T> {
        let id = js_string(selector);
        let reply: ElementReply = self
            .eval(format!(
                "(() => {{ const el = document.getElementById({id}); \
                 if (el === null) {{ return {{ missing: true }}; }} \
                 return {{ value: (() => {{ {body} }})() }}; }})()"
            ))
            .await?;
        if reply.missing {
            return Err(ProbeError::StaleElement {
                selector: selector.to_string(),
            });
        }
        serde_json::from_value(reply.value).map_err(|e| ProbeError::Script {
            message: format!("#{selector}: {e}"),
        })
    }
}

/// Encode a Rust string as a JavaScript string literal
fn js_string(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn navigate(&mut self, url: &str) -> ProbeResult<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| ProbeError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let _: bool = self.eval(HOOK_SCRIPT.to_string()).await?;
        Ok(())
    }

    async fn element_exists(&mut self, selector: &str) -> ProbeResult<bool> {
        let id = js_string(selector);
        self.eval(format!("document.getElementById({id}) !== null"))
            .await
    }

    async fn select_option(&mut self, selector: &str, value: &str) -> ProbeResult<()> {
        let v = js_string(value);
        let found: bool = self
            .on_element(
                selector,
                &format!(
                    "if (!Array.from(el.options).some(o => o.value === {v})) {{ return false; }} \
                     el.value = {v}; \
                     el.dispatchEvent(new Event('change', {{ bubbles: true }})); \
                     return true;"
                ),
            )
            .await?;
        if found {
            Ok(())
        } else {
            Err(ProbeError::Script {
                message: format!("option {value:?} not present in #{selector}"),
            })
        }
    }

    async fn type_text(&mut self, selector: &str, text: &str) -> ProbeResult<()> {
        let t = js_string(text);
        self.on_element(
            selector,
            &format!(
                "el.value = {t}; \
                 el.dispatchEvent(new Event('input', {{ bubbles: true }})); \
                 return null;"
            ),
        )
        .await
    }

    async fn click(&mut self, selector: &str) -> ProbeResult<()> {
        self.on_element(selector, "el.click(); return null;").await
    }

    async fn read_text(&mut self, selector: &str) -> ProbeResult<String> {
        self.on_element(selector, "return el.textContent || '';")
            .await
    }

    async fn read_attribute(&mut self, selector: &str, name: &str) -> ProbeResult<Option<String>> {
        let n = js_string(name);
        self.on_element(selector, &format!("return el.getAttribute({n});"))
            .await
    }

    async fn option_values(&mut self, selector: &str) -> ProbeResult<Vec<String>> {
        self.on_element(
            selector,
            "return el.options ? Array.from(el.options).map(o => o.value) : [];",
        )
        .await
    }

    async fn screenshot(&mut self, path: &Path) -> ProbeResult<()> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();

        let screenshot = self
            .page
            .execute(params)
            .await
            .map_err(|e| ProbeError::Screenshot {
                message: e.to_string(),
            })?;

        use base64::Engine;
        let png = base64::engine::general_purpose::STANDARD
            .decode(&screenshot.data)
            .map_err(|e| ProbeError::Screenshot {
                message: e.to_string(),
            })?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, png).await?;
        Ok(())
    }

    async fn read_console_log(&mut self) -> ProbeResult<Vec<ConsoleEntry>> {
        self.eval(DRAIN_SCRIPT.to_string()).await
    }

    async fn evaluate_json(&mut self, expression: &str) -> ProbeResult<serde_json::Value> {
        self.eval(expression.to_string()).await
    }

    async fn close(&mut self) -> ProbeResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let result = self
            .browser
            .close()
            .await
            .map_err(|e| ProbeError::browser_fault(e.to_string()));
        if let Err(e) = self.browser.wait().await {
            tracing::debug!(error = %e, "browser process did not exit cleanly");
        }
        self.handler.abort();
        tracing::debug!("chromium session closed");
        result.map(|_| ())
    }
}
