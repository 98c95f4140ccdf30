//! Resolution of email template references.
//!
//! A template is an HTML file below the configured template directory.
//! `{{ key }}` placeholders are replaced with scalar values from the request's
//! template data, HTML-escaped; anything richer is out of scope for this
//! service.

use crate::error::DeliveryError;
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Loads templates from a root directory.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    root: PathBuf,
}

impl TemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Reads the template behind `reference` and fills in its placeholders.
    pub async fn render(
        &self,
        reference: &str,
        data: &Map<String, Value>,
    ) -> Result<String, DeliveryError> {
        let path = self.resolve(reference)?;
        debug!(template = %path.display(), "Loading email template");
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| DeliveryError::InvalidTemplate(format!("{reference}: {e}")))?;
        Ok(substitute(&source, data))
    }

    fn resolve(&self, reference: &str) -> Result<PathBuf, DeliveryError> {
        let relative = Path::new(reference);
        let escapes_root = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if reference.is_empty() || escapes_root {
            return Err(DeliveryError::InvalidTemplate(format!(
                "{reference}: must be a relative path inside the template directory"
            )));
        }
        Ok(self.root.join(relative))
    }
}

/// Replaces every `{{ key }}` whose key is present in `data`. Values are
/// inserted as text, never as markup.
pub fn substitute(template: &str, data: &Map<String, Value>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        let Some(len) = rest[start + 2..].find("}}") else {
            break;
        };
        let end = start + 2 + len;
        let key = rest[start + 2..end].trim();

        out.push_str(&rest[..start]);
        match data.get(key) {
            Some(value) => escape_html(&scalar_to_string(value), &mut out),
            None => out.push_str(&rest[start..end + 2]),
        }
        rest = &rest[end + 2..];
    }

    out.push_str(rest);
    out
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
}
