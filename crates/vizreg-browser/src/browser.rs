//! Browser lifecycle management using Chrome DevTools Protocol

use crate::driver::{DriverCapability, PageDriver};
use crate::error::Result;
use crate::scripts;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use vizreg_core::VizregError;

/// Configuration for browser launch
#[derive(Debug, Clone)]
pub struct BrowserConfig {
    /// Run in headless mode (default: true)
    pub headless: bool,
    /// Browser window width
    pub window_width: u32,
    /// Browser window height
    pub window_height: u32,
    /// User agent string
    pub user_agent: Option<String>,
    /// Navigation timeout in seconds
    pub timeout_seconds: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1280,
            window_height: 1024,
            user_agent: None,
            timeout_seconds: 30,
        }
    }
}

/// Active browser session with Chrome DevTools Protocol
pub struct BrowserSession {
    /// Underlying browser instance (kept alive for tab lifetime)
    #[allow(dead_code)]
    browser: Browser,
    tab: Arc<Tab>,
    config: BrowserConfig,
}

impl BrowserSession {
    /// Launch a new browser instance
    ///
    /// # Example
    /// ```no_run
    /// use vizreg_browser::browser::BrowserSession;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let session = BrowserSession::launch().await.unwrap();
    ///     session.navigate("http://localhost:3000/").await.unwrap();
    /// }
    /// ```
    pub async fn launch() -> Result<Self> {
        Self::launch_with_config(BrowserConfig::default()).await
    }

    /// Launch browser with custom configuration
    pub async fn launch_with_config(config: BrowserConfig) -> Result<Self> {
        info!(
            "Launching browser (headless: {}, size: {}x{})",
            config.headless, config.window_width, config.window_height
        );

        let mut launch_options = LaunchOptions::default_builder()
            .headless(config.headless)
            .window_size(Some((config.window_width, config.window_height)))
            .idle_browser_timeout(Duration::from_secs(config.timeout_seconds.max(30) * 4))
            .build()
            .map_err(|e| VizregError::Browser(format!("Failed to launch browser: {}", e)))?;

        let user_agent_arg: Option<String> = config
            .user_agent
            .as_ref()
            .map(|ua| format!("--user-agent={}", ua));
        if let Some(ref ua_arg) = user_agent_arg {
            launch_options.args.push(OsStr::new(ua_arg));
        }

        let browser = Browser::new(launch_options)
            .map_err(|e| VizregError::Browser(format!("Failed to launch browser: {}", e)))?;

        let tab = browser
            .new_tab()
            .map_err(|e| VizregError::Browser(format!("Failed to create tab: {}", e)))?;
        tab.set_default_timeout(Duration::from_secs(config.timeout_seconds));

        info!("Browser launched successfully");

        Ok(Self {
            browser,
            tab,
            config,
        })
    }

    /// Navigate to a URL and wait for the load to finish
    pub async fn navigate(&self, url: &str) -> Result<()> {
        debug!("Navigating to {}", url);

        self.tab
            .navigate_to(url)
            .map_err(|e| VizregError::Browser(format!("Failed to navigate to {}: {}", url, e)))?;

        self.tab.wait_until_navigated().map_err(|e| {
            VizregError::Browser(format!(
                "Navigation timeout for {} after {}s: {}",
                url, self.config.timeout_seconds, e
            ))
        })?;

        info!("Successfully navigated to {}", url);
        Ok(())
    }

    /// Raw CDP evaluation; the value is whatever the protocol hands back
    async fn evaluate_raw(&self, script: &str) -> Result<Option<serde_json::Value>> {
        let result = self
            .tab
            .evaluate(script, false)
            .map_err(|e| VizregError::Browser(format!("JavaScript evaluation failed: {}", e)))?;
        Ok(result.value)
    }

    /// Close the browser session
    pub async fn close(self) -> Result<()> {
        info!("Closing browser session");
        Ok(())
    }
}

#[async_trait]
impl PageDriver for BrowserSession {
    fn capability(&self) -> DriverCapability {
        DriverCapability::Evaluating
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.tab.get_url())
    }

    async fn html(&self) -> Result<String> {
        self.tab
            .get_content()
            .map_err(|e| VizregError::Browser(format!("Failed to read page content: {}", e)))
    }

    /// Arrays and objects do not survive CDP by value, so the result is
    /// stringified in the page and parsed here.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        debug!("Evaluating script ({} bytes)", script.len());

        let wrapped = format!("JSON.stringify({})", script);
        match self.evaluate_raw(&wrapped).await? {
            Some(serde_json::Value::String(json)) => Ok(serde_json::from_str(&json)?),
            // JSON.stringify(undefined) is undefined
            _ => Ok(serde_json::Value::Null),
        }
    }

    async fn element_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<Option<String>>> {
        let value = self
            .evaluate(&scripts::element_attributes_source(selector, attribute))
            .await?;
        if value.is_null() {
            return Ok(Vec::new());
        }
        serde_json::from_value(value).map_err(|e| VizregError::ScriptResult {
            script: "element_attributes".to_string(),
            message: e.to_string(),
        })
    }
}

impl Drop for BrowserSession {
    fn drop(&mut self) {
        debug!("BrowserSession dropped, browser will be cleaned up");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BrowserConfig::default();
        assert!(config.headless);
        assert_eq!(config.window_width, 1280);
        assert_eq!(config.window_height, 1024);
        assert_eq!(config.timeout_seconds, 30);
    }

    #[test]
    fn test_custom_config() {
        let config = BrowserConfig {
            headless: false,
            window_width: 375,
            window_height: 812,
            user_agent: Some("vizreg-test/1.0".to_string()),
            timeout_seconds: 60,
        };

        assert!(!config.headless);
        assert_eq!(config.window_width, 375);
        assert!(config.user_agent.is_some());
    }
}
