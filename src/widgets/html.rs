//! Static markup.

use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct HtmlWidget {
    pub source: String,
}

impl HtmlWidget {
    pub fn new(source: String) -> Self {
        Self { source }
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}
