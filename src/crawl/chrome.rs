//! [`BrowserSession`] over headless Chrome via the DevTools protocol.
//!
//! `chromiumoxide` is async; the session keeps a private `tokio` runtime and
//! blocks on it so the walker stays synchronous.

use std::fmt;
use std::time::Duration;

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use futures_util::StreamExt;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use super::session::{BrowserSession, SessionError};
use crate::user_agent::BROWSER_USER_AGENT;

/// Interval between element lookups while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Browser launch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChromeOptions {
    pub headless: bool,
    /// Bound on each DevTools request.
    pub request_timeout: Duration,
}

impl Default for ChromeOptions {
    fn default() -> Self {
        Self {
            headless: true,
            request_timeout: Duration::from_secs(20),
        }
    }
}

/// One Chrome process with a single tab.
pub struct ChromeSession {
    runtime: Runtime,
    browser: Option<Browser>,
    page: Page,
    handler: JoinHandle<()>,
}

impl fmt::Debug for ChromeSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChromeSession")
            .field("open", &self.browser.is_some())
            .finish_non_exhaustive()
    }
}

impl ChromeSession {
    /// Starts Chrome and opens a blank tab.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Driver`] if the runtime cannot be built or
    /// Chrome cannot be launched (for example when it is not installed).
    #[instrument(level = "debug")]
    pub fn launch(options: ChromeOptions) -> Result<Self, SessionError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(SessionError::driver)?;

        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(1920, 1080)
            .request_timeout(options.request_timeout)
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-blink-features=AutomationControlled")
            .arg(format!("--user-agent={BROWSER_USER_AGENT}"));
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder.build().map_err(SessionError::Driver)?;

        let (browser, page, handler) = runtime.block_on(async {
            let (browser, mut handler) = Browser::launch(config).await.map_err(map_cdp)?;
            let handler = tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(error) = event {
                        debug!(error = %error, "browser handler event error");
                    }
                }
            });
            let page = browser.new_page("about:blank").await.map_err(map_cdp)?;
            Ok::<_, SessionError>((browser, page, handler))
        })?;

        info!(headless = options.headless, "browser session started");
        Ok(Self {
            runtime,
            browser: Some(browser),
            page,
            handler,
        })
    }
}

impl BrowserSession for ChromeSession {
    type Element = Element;

    fn navigate(&mut self, url: &str) -> Result<(), SessionError> {
        let page = &self.page;
        self.runtime
            .block_on(async { page.goto(url).await.map(|_| ()) })
            .map_err(map_cdp)
    }

    fn wait_for(&mut self, selector: &str, timeout: Duration) -> Result<(), SessionError> {
        self.find(selector, timeout).map(|_| ())
    }

    fn page_source(&mut self) -> Result<String, SessionError> {
        self.runtime
            .block_on(self.page.content())
            .map_err(map_cdp)
    }

    fn find(&mut self, selector: &str, timeout: Duration) -> Result<Element, SessionError> {
        let page = &self.page;
        self.runtime.block_on(async {
            let deadline = Instant::now() + timeout;
            loop {
                match page.find_element(selector).await {
                    Ok(element) => return Ok(element),
                    Err(_) if Instant::now() >= deadline => {
                        return Err(if timeout.is_zero() {
                            SessionError::not_found(selector)
                        } else {
                            SessionError::timeout(selector, timeout)
                        });
                    }
                    Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
                }
            }
        })
    }

    fn find_all(&mut self, selector: &str) -> Result<Vec<Element>, SessionError> {
        self.runtime
            .block_on(self.page.find_elements(selector))
            .map_err(map_cdp)
    }

    fn attribute(&mut self, element: &Element, name: &str) -> Result<Option<String>, SessionError> {
        self.runtime
            .block_on(element.attribute(name))
            .map_err(map_cdp)
    }

    fn parent_attribute(
        &mut self,
        element: &Element,
        name: &str,
    ) -> Result<Option<String>, SessionError> {
        let quoted = serde_json::to_string(name).map_err(SessionError::driver)?;
        let function = format!(
            "function() {{ const p = this.parentElement; return p ? p.getAttribute({quoted}) : null; }}"
        );
        let returns = self
            .runtime
            .block_on(element.call_js_fn(function, false))
            .map_err(map_cdp)?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_str().map(str::to_string)))
    }

    fn is_displayed(&mut self, element: &Element) -> Result<bool, SessionError> {
        let returns = self
            .runtime
            .block_on(element.call_js_fn(
                "function() { const s = getComputedStyle(this); \
                 return this.getClientRects().length > 0 && s.visibility !== 'hidden' \
                 && s.display !== 'none'; }",
                false,
            ))
            .map_err(map_cdp)?;
        Ok(returns
            .result
            .value
            .and_then(|value| value.as_bool())
            .unwrap_or(false))
    }

    fn script_click(&mut self, element: &Element) -> Result<(), SessionError> {
        self.runtime
            .block_on(element.call_js_fn("function() { this.click(); }", false))
            .map(|_| ())
            .map_err(map_cdp)
    }

    fn close(&mut self) -> Result<(), SessionError> {
        let Some(mut browser) = self.browser.take() else {
            return Ok(());
        };
        let result: Result<(), SessionError> = self.runtime.block_on(async {
            browser.close().await.map_err(map_cdp)?;
            browser.wait().await.map_err(SessionError::driver)?;
            Ok(())
        });
        self.handler.abort();
        result
    }
}

/// Maps a DevTools error, recognizing detached-node failures as staleness.
fn map_cdp(error: CdpError) -> SessionError {
    classify_driver_message(&error.to_string())
}

fn classify_driver_message(message: &str) -> SessionError {
    let lower = message.to_ascii_lowercase();
    if lower.contains("no node with given id")
        || lower.contains("could not find node")
        || lower.contains("node is detached")
    {
        SessionError::StaleElement
    } else {
        SessionError::Driver(message.to_string())
    }
}
