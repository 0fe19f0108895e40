//! The page driver seam
//!
//! Resource discovery talks to "the browser" only through [`PageDriver`]. A
//! driver either evaluates scripts and hands back their JSON result, or only
//! serves the page HTML and element attributes; the latter loses stylesheet,
//! background image and iframe discovery.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::{Result, VizregError};
use crate::scripts::PageScript;

/// What a driver can do with a script
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCapability {
    /// Scripts run and their return values come back as JSON
    Evaluating,
    /// Scripts run but their return values are not available
    ExecutingOnly,
}

impl DriverCapability {
    pub fn can_evaluate(self) -> bool {
        matches!(self, Self::Evaluating)
    }
}

/// A live page that resources can be discovered from
#[async_trait]
pub trait PageDriver: Send + Sync {
    fn capability(&self) -> DriverCapability;

    /// Absolute URL of the current page
    async fn current_url(&self) -> Result<String>;

    /// Serialized HTML of the current page as the driver sees it
    async fn html(&self) -> Result<String>;

    /// Evaluate a script expression and return its JSON value
    ///
    /// Executing-only drivers return an error; callers check
    /// [`capability`](Self::capability) first.
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// The `attribute` of every element matching `selector`, in document order
    async fn element_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<Option<String>>>;
}

/// Mock page driver for testing
///
/// Script results are keyed by the exact script source, so responses are
/// registered with [`PageScript::source`](crate::scripts::PageScript::source).
#[derive(Debug, Clone)]
pub struct MockPageDriver {
    capability: DriverCapability,
    url: String,
    html: String,
    responses: HashMap<String, serde_json::Value>,
    attributes: HashMap<(String, String), Vec<Option<String>>>,
}

impl MockPageDriver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            capability: DriverCapability::Evaluating,
            url: url.into(),
            html: String::new(),
            responses: HashMap::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn executing_only(mut self) -> Self {
        self.capability = DriverCapability::ExecutingOnly;
        self
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = html.into();
        self
    }

    pub fn with_response(mut self, script: &PageScript, value: serde_json::Value) -> Self {
        self.responses.insert(script.source(), value);
        self
    }

    pub fn with_attributes(
        mut self,
        selector: &str,
        attribute: &str,
        values: Vec<Option<String>>,
    ) -> Self {
        self.attributes
            .insert((selector.to_string(), attribute.to_string()), values);
        self
    }
}

#[async_trait]
impl PageDriver for MockPageDriver {
    fn capability(&self) -> DriverCapability {
        self.capability
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.url.clone())
    }

    async fn html(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        if !self.capability.can_evaluate() {
            return Err(VizregError::Browser(
                "driver cannot evaluate scripts".to_string(),
            ));
        }
        self.responses
            .get(script)
            .cloned()
            .ok_or_else(|| VizregError::Browser("No mock response for script".to_string()))
    }

    async fn element_attributes(
        &self,
        selector: &str,
        attribute: &str,
    ) -> Result<Vec<Option<String>>> {
        Ok(self
            .attributes
            .get(&(selector.to_string(), attribute.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scripts::ROOT_HTML;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_answers_registered_script() {
        let driver = MockPageDriver::new("http://localhost:3000/")
            .with_response(&ROOT_HTML, json!("<html></html>"));

        let value = driver.evaluate(&ROOT_HTML.source()).await.unwrap();
        assert_eq!(value, json!("<html></html>"));
        assert!(driver.evaluate("1 + 1").await.is_err());
    }

    #[tokio::test]
    async fn test_executing_only_mock_refuses_evaluation() {
        let driver = MockPageDriver::new("http://localhost:3000/")
            .executing_only()
            .with_response(&ROOT_HTML, json!("<html></html>"));

        assert_eq!(driver.capability(), DriverCapability::ExecutingOnly);
        assert!(driver.evaluate(&ROOT_HTML.source()).await.is_err());
    }

    #[tokio::test]
    async fn test_mock_element_attributes() {
        let driver = MockPageDriver::new("http://localhost:3000/").with_attributes(
            "img",
            "src",
            vec![Some("/a.png".to_string()), None],
        );

        let srcs = driver.element_attributes("img", "src").await.unwrap();
        assert_eq!(srcs, vec![Some("/a.png".to_string()), None]);
        assert!(driver
            .element_attributes("img", "srcset")
            .await
            .unwrap()
            .is_empty());
    }
}
