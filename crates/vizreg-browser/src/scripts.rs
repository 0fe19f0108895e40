//! In-page scripts used for resource discovery
//!
//! Each [`PageScript`] is a fixed function body plus the JSON shape it
//! returns. Drivers only ever see the wrapped source from
//! [`PageScript::source`], so a test double can answer a script by comparing
//! that string.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::error::{Result, VizregError};

/// A fixed script template and its expected return shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageScript {
    pub name: &'static str,
    body: &'static str,
}

impl PageScript {
    /// The script as a self-invoking function expression
    pub fn source(&self) -> String {
        format!("(function() {{\n{}\n}})()", self.body)
    }

    /// Decode an evaluation result into the script's return type
    pub fn decode<T: DeserializeOwned>(&self, value: serde_json::Value) -> Result<T> {
        serde_json::from_value(value).map_err(|e| VizregError::ScriptResult {
            script: self.name.to_string(),
            message: e.to_string(),
        })
    }
}

/// Returns `string`: the outer HTML of the document element.
pub const ROOT_HTML: PageScript = PageScript {
    name: "root_html",
    body: r#"
  var htmlElement = document.getElementsByTagName('html')[0];
  return htmlElement.outerHTML;
"#,
};

/// Returns `string[]`: hrefs of every external stylesheet, depth first.
///
/// Rules of cross-origin sheets cannot be read, so their nested `@import`s are
/// not followed; the sheet itself is still listed for fetching.
pub const STYLESHEET_URLS: PageScript = PageScript {
    name: "stylesheet_urls",
    body: r#"
  function findStylesRecursively(stylesheet, cssUrls) {
    if (stylesheet.href) {
      cssUrls.push(stylesheet.href);
      var parser = document.createElement('a');
      parser.href = stylesheet.href;
      if (parser.host != window.location.host) {
        return;
      }
    }
    var rules;
    try {
      rules = stylesheet.cssRules;
    } catch (e) {
      return;
    }
    if (!rules) {
      return;
    }
    for (var i = 0; i < rules.length; i++) {
      if (rules[i].styleSheet) {
        findStylesRecursively(rules[i].styleSheet, cssUrls);
      }
    }
  }

  var cssUrls = [];
  for (var i = 0; i < document.styleSheets.length; i++) {
    findStylesRecursively(document.styleSheets[i], cssUrls);
  }
  return cssUrls;
"#,
};

/// Returns `string[]`: every computed `background-image` value other than `none`.
pub const BACKGROUND_IMAGES: PageScript = PageScript {
    name: "background_images",
    body: r#"
  var rawImageUrls = [];
  var tags = document.getElementsByTagName('*');
  for (var i = 0; i < tags.length; i++) {
    var el = tags[i];
    var rawValue = null;
    if (el.currentStyle) {
      rawValue = el.currentStyle['backgroundImage'];
    } else if (window.getComputedStyle) {
      rawValue = window.getComputedStyle(el).getPropertyValue('background-image');
    }
    if (rawValue && rawValue !== 'none') {
      rawImageUrls.push(rawValue);
    }
  }
  return rawImageUrls;
"#,
};

/// Returns `{src: string, html: string|null}[]`, one entry per `<iframe>`.
///
/// `html` is null when the frame's document cannot be read (cross-origin).
pub const IFRAME_DOCUMENTS: PageScript = PageScript {
    name: "iframe_documents",
    body: r#"
  var frames = [];
  var tags = document.getElementsByTagName('iframe');
  for (var i = 0; i < tags.length; i++) {
    var el = tags[i];
    var src = el.getAttribute('src');
    if (!src) {
      continue;
    }
    var html = null;
    try {
      html = el.contentWindow.document.getElementsByTagName('html')[0].outerHTML;
    } catch (e) {
      html = null;
    }
    frames.push({ src: src, html: html });
  }
  return frames;
"#,
};

/// One entry of the [`IFRAME_DOCUMENTS`] result
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FrameDocument {
    pub src: String,
    pub html: Option<String>,
}

/// Script that returns `(string|null)[]`: `attribute` of every match of `selector`
pub fn element_attributes_source(selector: &str, attribute: &str) -> String {
    // serde_json string literals are valid JS string literals
    let selector = serde_json::Value::String(selector.to_string());
    let attribute = serde_json::Value::String(attribute.to_string());
    format!(
        "(function() {{\n  return Array.prototype.map.call(document.querySelectorAll({}), function(el) {{ return el.getAttribute({}); }});\n}})()",
        selector, attribute
    )
}
