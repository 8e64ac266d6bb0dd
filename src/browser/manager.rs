use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventLoadEventFired,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::Page;
use futures_util::StreamExt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::timeout;

use crate::config::Config;
use crate::error::{EngineError, Result};

/// Manages the browser lifecycle and the single driven page.
pub struct PageManager {
    config: Config,
    browser: Mutex<Option<Browser>>,
    page: Mutex<Option<Page>>,
    /// Prevents concurrent launches racing into two Chrome instances.
    launch_lock: Mutex<()>,
}

impl PageManager {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            browser: Mutex::new(None),
            page: Mutex::new(None),
            launch_lock: Mutex::new(()),
        }
    }

    /// Launch Chromium and open the start page.
    pub async fn launch(&self) -> Result<()> {
        let _launch_guard = self.launch_lock.lock().await;
        self.close().await.ok();

        let mut builder = BrowserConfig::builder()
            .window_size(self.config.viewport_width, self.config.viewport_height);
        if !self.config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-default-apps")
            .arg("--disable-extensions");

        let browser_config = builder
            .build()
            .map_err(|e| EngineError::Browser(format!("Failed to build browser config: {}", e)))?;

        let (browser, mut handler) = timeout(
            Duration::from_secs(self.config.launch_timeout_secs),
            Browser::launch(browser_config),
        )
        .await
        .map_err(|_| {
            EngineError::Browser(format!(
                "Browser launch timeout ({}s), Chrome may not be installed or is unresponsive",
                self.config.launch_timeout_secs
            ))
        })?
        .map_err(|e| EngineError::Browser(format!("Failed to launch browser: {}", e)))?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                tracing::trace!("Browser event: {:?}", event);
            }
        });

        // Brief pause for Chrome to finish initializing.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let default_pages = browser
            .pages()
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to list pages: {}", e)))?;

        let page = browser
            .new_page(self.config.start_url.as_str())
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to create page: {}", e)))?;

        // Close the default blank pages after the target page exists, so the
        // user never sees extra windows.
        for default_page in default_pages {
            if let Err(e) = default_page.close().await {
                tracing::warn!("Failed to close default page: {}", e);
            }
        }

        let metrics = SetDeviceMetricsOverrideParams::builder()
            .width(self.config.viewport_width as i64)
            .height(self.config.viewport_height as i64)
            .device_scale_factor(1.0)
            .mobile(false)
            .build()
            .map_err(|e| EngineError::Browser(format!("Failed to build viewport params: {}", e)))?;
        page.execute(metrics)
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to set viewport: {}", e)))?;

        *self.browser.lock().await = Some(browser);
        *self.page.lock().await = Some(page);

        tracing::info!("Browser launched, page at {}", self.config.start_url);
        Ok(())
    }

    async fn page(&self) -> Result<Page> {
        self.page
            .lock()
            .await
            .clone()
            .ok_or_else(|| EngineError::Browser("No page available".to_string()))
    }

    pub async fn current_url(&self) -> Result<String> {
        let page = self.page().await?;
        page.url()
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to get URL: {}", e)))?
            .ok_or_else(|| EngineError::Browser("URL is None".to_string()))
    }

    pub async fn navigate(&self, url: &str) -> Result<()> {
        let page = self.page().await?;
        page.goto(url)
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;
        Ok(())
    }

    /// Execute JavaScript in the page and return the JSON result.
    pub async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let page = self.page().await?;
        let result = page
            .evaluate(script)
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to evaluate script: {}", e)))?;
        result
            .into_value()
            .map_err(|e| EngineError::Browser(format!("Failed to parse script result: {}", e)))
    }

    /// Register a CDP binding the page can call, and return the stream of
    /// calls made to it.
    pub async fn setup_event_binding(
        &self,
        binding_name: &str,
    ) -> Result<EventStream<EventBindingCalled>> {
        let page = self.page().await?;
        page.execute(AddBindingParams::new(binding_name))
            .await
            .map_err(|e| {
                EngineError::Browser(format!("Failed to add binding '{}': {}", binding_name, e))
            })?;
        let stream = page
            .event_listener::<EventBindingCalled>()
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to create event listener: {}", e)))?;
        tracing::debug!("CDP binding '{}' registered", binding_name);
        Ok(stream)
    }

    /// Register a script evaluated on every new document, so it survives
    /// navigations.
    pub async fn add_script_on_new_document(&self, source: &str) -> Result<()> {
        let page = self.page().await?;
        let params = AddScriptToEvaluateOnNewDocumentParams::builder()
            .source(source)
            .build()
            .map_err(|e| EngineError::Browser(format!("Failed to build script params: {}", e)))?;
        page.execute(params)
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to register script: {}", e)))?;
        Ok(())
    }

    /// Stream of main-document load completions, one per navigation.
    pub async fn load_events(&self) -> Result<EventStream<EventLoadEventFired>> {
        let page = self.page().await?;
        page.event_listener::<EventLoadEventFired>()
            .await
            .map_err(|e| EngineError::Browser(format!("Failed to watch load events: {}", e)))
    }

    pub async fn close(&self) -> Result<()> {
        let mut page_guard = self.page.lock().await;
        let mut browser_guard = self.browser.lock().await;
        if let Some(page) = page_guard.take() {
            let _ = page.close().await;
        }
        if let Some(mut browser) = browser_guard.take() {
            let _ = browser.close().await;
        }
        tracing::info!("Browser closed");
        Ok(())
    }
}
