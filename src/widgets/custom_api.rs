//! Arbitrary JSON endpoint.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;

use super::UpdateContext;
use crate::error::FetchError;
use crate::http::decode_json;
use crate::refresh::RefreshState;

#[derive(Debug, Clone, Serialize)]
pub struct CustomApiWidget {
    #[serde(skip)]
    url: String,
    #[serde(skip)]
    headers: BTreeMap<String, String>,
    #[serde(skip)]
    body: Option<serde_json::Value>,
    /// Last decoded document.
    pub document: Option<serde_json::Value>,
}

impl CustomApiWidget {
    pub fn from_config(
        url: &str,
        headers: &BTreeMap<String, String>,
        body: Option<&serde_json::Value>,
    ) -> Result<Self, String> {
        if url.trim().is_empty() {
            return Err("url is required".to_string());
        }

        Ok(Self {
            url: url.to_string(),
            headers: headers.clone(),
            body: body.cloned(),
            document: None,
        })
    }

    pub async fn update(&mut self, refresh: &mut RefreshState, ctx: &UpdateContext) {
        let client = &ctx.clients.default;
        let mut request = match &self.body {
            Some(body) => client.post(&self.url).json(body),
            None => client.get(&self.url),
        };
        for (name, value) in &self.headers {
            request = request.header(name, value);
        }

        let result = tokio::select! {
            result = decode_json::<serde_json::Value>(request) => result,
            _ = ctx.cancel.cancelled() => {
                Err(FetchError::NoContent("update cancelled".to_string()))
            }
        };

        match result {
            Ok(document) => {
                if refresh.report_result(Ok(()), Utc::now()) {
                    self.document = Some(document);
                }
            }
            Err(err) => {
                refresh.report_result(Err(err), Utc::now());
            }
        }
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requires_url() {
        assert!(CustomApiWidget::from_config("", &BTreeMap::new(), None).is_err());
        assert!(CustomApiWidget::from_config("http://x.test", &BTreeMap::new(), None).is_ok());
    }

    #[test]
    fn data_hides_request_details() {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), "Bearer secret".to_string());
        let widget = CustomApiWidget::from_config("http://x.test", &headers, None).unwrap();

        let data = widget.data();
        assert!(data.get("headers").is_none());
        assert!(data["document"].is_null());
    }
}
