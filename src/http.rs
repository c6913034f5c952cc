//! Shared HTTP plumbing for widget fetchers.

use std::time::Duration;

use serde::de::DeserializeOwned;

use crate::error::FetchError;

/// Longest response excerpt kept in a status error.
const ERROR_BODY_LIMIT: usize = 256;

/// HTTP clients shared by all widgets.
#[derive(Debug, Clone)]
pub struct HttpClients {
    /// Verifies certificates.
    pub default: reqwest::Client,
    /// Accepts invalid certificates, for sites that opt in.
    pub insecure: reqwest::Client,
}

impl HttpClients {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let user_agent = concat!("feedboard/", env!("CARGO_PKG_VERSION"));

        let default = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .pool_max_idle_per_host(10)
            .build()?;

        let insecure = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .danger_accept_invalid_certs(true)
            .build()?;

        Ok(Self { default, insecure })
    }

    pub fn pick(&self, allow_insecure: bool) -> &reqwest::Client {
        if allow_insecure {
            &self.insecure
        } else {
            &self.default
        }
    }
}

/// Send `request` and decode a JSON body, failing on any non-200 status.
pub async fn decode_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, FetchError> {
    let (client, request) = request.build_split();
    let request = request.map_err(|e| FetchError::Request {
        url: e.url().map(|u| u.to_string()).unwrap_or_default(),
        reason: e.to_string(),
    })?;
    let url = request.url().to_string();

    let response = client
        .execute(request)
        .await
        .map_err(|e| FetchError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;

    let status = response.status();
    let body = response.text().await.map_err(|e| FetchError::Request {
        url: url.clone(),
        reason: e.to_string(),
    })?;

    if status != reqwest::StatusCode::OK {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url,
            body: body_excerpt(&body, ERROR_BODY_LIMIT),
        });
    }

    serde_json::from_str(&body).map_err(|e| FetchError::Decode {
        url,
        reason: e.to_string(),
    })
}

/// First `max` bytes of a response body, cut on a char boundary and
/// trimmed, with `...` appended when anything was dropped.
pub(crate) fn body_excerpt(body: &str, max: usize) -> String {
    let body = body.trim();
    if body.len() <= max {
        return body.to_string();
    }

    let end = (0..=max)
        .rev()
        .find(|&i| body.is_char_boundary(i))
        .unwrap_or(0);
    format!("{}...", body[..end].trim_end())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_body_kept_whole() {
        assert_eq!(body_excerpt("  not found\n", ERROR_BODY_LIMIT), "not found");
    }

    #[test]
    fn long_body_cut_on_char_boundary() {
        assert_eq!(body_excerpt("héllo wörld", 2), "h...");
        assert_eq!(body_excerpt("bad gateway", 4), "bad...");
    }

    #[test]
    fn clients_build() {
        let clients = HttpClients::new(Duration::from_secs(1)).unwrap();
        let _ = clients.pick(true);
        let _ = clients.pick(false);
    }

    #[tokio::test]
    async fn unreachable_host_is_request_error() {
        let clients = HttpClients::new(Duration::from_millis(500)).unwrap();
        let result: Result<serde_json::Value, _> =
            decode_json(clients.default.get("http://127.0.0.1:1/nothing")).await;
        assert!(matches!(result, Err(FetchError::Request { .. })));
    }
}
