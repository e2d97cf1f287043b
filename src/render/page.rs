//! Per-page rendering: wait-strategy selection, AJAX quiescence detection,
//! resource blocking, and stealth injection.
//!
//! `apply_stealth` removes `navigator.webdriver` and spoofs
//! plugin/WebGL-vendor fingerprints. AJAX quiescence detection is
//! implemented as a CDP `page.evaluate` poll rather than a Playwright
//! route-based wait, since chromiumoxide's page API has no
//! `page.waitForFunction` with a promise directly awaited from the Rust
//! side.

use super::RenderError;
use chromiumoxide::Page;
use std::time::Duration;
use tracing::{info, warn};

/// Strategy for deciding when a navigated page is "ready".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WaitStrategy {
    #[default]
    Auto,
    Load,
    DomContentLoaded,
    NetworkIdle,
    SelectorPresent(String),
    CustomFn(String),
}

#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub wait_strategy: WaitStrategy,
    pub timeout: Duration,
    pub block_resources: Vec<String>,
    pub ajax_timeout: Duration,
    pub apply_stealth: bool,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            wait_strategy: WaitStrategy::Auto,
            timeout: Duration::from_secs(30),
            block_resources: vec!["font".to_string(), "image".to_string(), "media".to_string()],
            ajax_timeout: Duration::from_secs(5),
            apply_stealth: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub html: String,
    pub final_url: String,
    pub ajax: Option<AjaxReport>,
}

#[derive(Debug, Clone, Default)]
pub struct AjaxReport {
    pub quiesced: bool,
    pub waited: Duration,
}

/// Navigate `page` to `url`, apply the resolved wait strategy, and return
/// the resulting document plus AJAX-quiescence telemetry.
pub async fn render(
    page: &Page,
    url: &str,
    options: &RenderOptions,
) -> Result<RenderedPage, RenderError> {
    if options.apply_stealth {
        if let Err(e) = apply_stealth(page).await {
            warn!(url, error = %e, "stealth injection failed, continuing unstealthed");
        }
    }

    if !options.block_resources.is_empty() {
        if let Err(e) = block_resources(page, &options.block_resources).await {
            warn!(url, error = %e, "resource blocking setup failed, continuing unblocked");
        }
    }

    page.goto(url)
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?;

    let strategy = resolve_strategy(page, &options.wait_strategy).await;
    apply_wait_strategy(page, &strategy, options.timeout).await?;

    let ajax = if matches!(strategy, WaitStrategy::NetworkIdle) {
        Some(wait_for_ajax_quiescence(page, options.ajax_timeout).await)
    } else {
        None
    };

    let html = page
        .content()
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?;
    let final_url = page
        .url()
        .await
        .ok()
        .flatten()
        .unwrap_or_else(|| url.to_string());

    Ok(RenderedPage { html, final_url, ajax })
}

/// Resolve `Auto` into a concrete strategy by sniffing the initial document
/// for SPA framework markers.
async fn resolve_strategy(page: &Page, requested: &WaitStrategy) -> WaitStrategy {
    if *requested != WaitStrategy::Auto {
        return requested.clone();
    }
    let Ok(content) = page.content().await else {
        return WaitStrategy::Load;
    };
    let lower = content.to_ascii_lowercase();
    const SPA_MARKERS: &[&str] = &[
        "react", "angular", "ng-app", "vue", "ember", "knockout", "data-reactroot",
    ];
    if SPA_MARKERS.iter().any(|m| lower.contains(m)) {
        info!("detected SPA framework marker, using NetworkIdle wait strategy");
        WaitStrategy::NetworkIdle
    } else {
        WaitStrategy::Load
    }
}

async fn apply_wait_strategy(
    page: &Page,
    strategy: &WaitStrategy,
    timeout: Duration,
) -> Result<(), RenderError> {
    let wait = async {
        match strategy {
            WaitStrategy::Load | WaitStrategy::Auto => page
                .wait_for_navigation()
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            WaitStrategy::DomContentLoaded => page
                .evaluate("document.readyState !== 'loading'")
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            WaitStrategy::NetworkIdle => page
                .wait_for_navigation()
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
            WaitStrategy::SelectorPresent(selector) => {
                let selector = selector.clone();
                let deadline = tokio::time::Instant::now() + timeout;
                loop {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        return Ok(());
                    }
                    if tokio::time::Instant::now() >= deadline {
                        return Err(format!("selector '{selector}' never appeared"));
                    }
                    tokio::time::sleep(Duration::from_millis(200)).await;
                }
            }
            WaitStrategy::CustomFn(script) => page
                .evaluate(script.as_str())
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    };

    tokio::time::timeout(timeout, wait)
        .await
        .map_err(|_| RenderError::Navigation(format!("wait strategy timed out after {timeout:?}")))?
        .map_err(RenderError::Navigation)
}

/// Instruments `window.fetch`/`XMLHttpRequest` to track in-flight requests
/// and polls until none have been active for 500ms or `timeout` elapses.
async fn wait_for_ajax_quiescence(page: &Page, timeout: Duration) -> AjaxReport {
    let started = std::time::Instant::now();
    let script = format!(
        r#"
        (() => {{
            if (window.__ajaxMonitorInstalled) return;
            window.__ajaxMonitorInstalled = true;
            window.__pendingRequests = 0;
            window.__lastActivity = Date.now();
            const origFetch = window.fetch;
            window.fetch = function(...args) {{
                window.__pendingRequests++;
                window.__lastActivity = Date.now();
                return origFetch.apply(this, args).finally(() => {{
                    window.__pendingRequests--;
                    window.__lastActivity = Date.now();
                }});
            }};
            const origOpen = XMLHttpRequest.prototype.open;
            XMLHttpRequest.prototype.open = function(...args) {{
                this.addEventListener('loadstart', () => {{
                    window.__pendingRequests++;
                    window.__lastActivity = Date.now();
                }});
                this.addEventListener('loadend', () => {{
                    window.__pendingRequests--;
                    window.__lastActivity = Date.now();
                }});
                return origOpen.apply(this, args);
            }};
        }})();
        "#
    );
    if page.evaluate(script.as_str()).await.is_err() {
        return AjaxReport { quiesced: false, waited: started.elapsed() };
    }

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        let quiet = page
            .evaluate("window.__pendingRequests === 0 && (Date.now() - window.__lastActivity) > 500")
            .await
            .ok()
            .and_then(|v| v.into_value::<bool>().ok())
            .unwrap_or(false);
        if quiet {
            return AjaxReport { quiesced: true, waited: started.elapsed() };
        }
        if tokio::time::Instant::now() >= deadline {
            return AjaxReport { quiesced: false, waited: started.elapsed() };
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Block the given resource type classes by translating them into URL glob
/// patterns via CDP's `Network.setBlockedURLs`, which operates on URL
/// patterns rather than resource types directly.
async fn block_resources(page: &Page, resource_types: &[String]) -> Result<(), RenderError> {
    use chromiumoxide::cdp::browser_protocol::network::SetBlockedUrLsParams;

    let mut patterns = Vec::new();
    for kind in resource_types {
        let exts: &[&str] = match kind.as_str() {
            "image" => &["*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.svg", "*.ico"],
            "font" => &["*.woff", "*.woff2", "*.ttf", "*.otf", "*.eot"],
            "media" => &["*.mp4", "*.webm", "*.mp3", "*.wav", "*.ogg", "*.avi"],
            "stylesheet" => &["*.css"],
            _ => &[],
        };
        patterns.extend(exts.iter().map(|s| s.to_string()));
    }
    if patterns.is_empty() {
        return Ok(());
    }

    page.execute(SetBlockedUrLsParams { urls: patterns })
        .await
        .map_err(|e| RenderError::Navigation(e.to_string()))?;
    Ok(())
}

/// Inject navigator/WebGL spoofing to reduce automation fingerprinting.
pub async fn apply_stealth(page: &Page) -> Result<(), RenderError> {
    const WEBDRIVER_JS: &str = "Object.defineProperty(navigator, 'webdriver', { get: () => false });";
    const LANGUAGES_JS: &str =
        "Object.defineProperty(navigator, 'languages', { get: () => ['en-US', 'en'] });";
    const WEBGL_JS: &str = r"
        const handler = {
            apply: function(target, ctx, args) {
                const param = args && args[0];
                if (param === 37445) return 'Intel Inc.';
                if (param === 37446) return 'Intel Iris OpenGL Engine';
                return Reflect.apply(target, ctx, args);
            }
        };
        if (window.WebGLRenderingContext) {
            const getParameter = WebGLRenderingContext.prototype.getParameter;
            WebGLRenderingContext.prototype.getParameter = new Proxy(getParameter, handler);
        }
    ";

    for script in [WEBDRIVER_JS, LANGUAGES_JS, WEBGL_JS] {
        page.evaluate(script)
            .await
            .map_err(|e| RenderError::Navigation(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_is_default_strategy() {
        assert_eq!(RenderOptions::default().wait_strategy, WaitStrategy::Auto);
    }

    #[test]
    fn default_blocks_font_image_media() {
        let opts = RenderOptions::default();
        assert!(opts.block_resources.contains(&"image".to_string()));
        assert!(opts.block_resources.contains(&"font".to_string()));
        assert!(opts.block_resources.contains(&"media".to_string()));
    }
}
