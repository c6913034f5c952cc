//! Site status monitor.
//!
//! Every site is checked concurrently through the worker pool. A site that
//! is down is content (it shows as failing), not a fetch failure; only an
//! interrupted batch counts against the widget.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::UpdateContext;
use crate::config::{BasicAuth, SiteConfig};
use crate::error::FetchError;
use crate::pool::Job;
use crate::refresh::RefreshState;

const MONITOR_WORKERS: usize = 20;
const DEFAULT_SITE_TIMEOUT: Duration = Duration::from_secs(3);

/// Result of checking one site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SiteStatus {
    pub code: Option<u16>,
    pub timed_out: bool,
    pub response_time_ms: u64,
    pub error: Option<String>,
}

/// One monitored site with its latest status.
#[derive(Debug, Clone, Serialize)]
pub struct Site {
    pub title: String,
    /// Link target: the site URL, or `error_url` while the check errors.
    pub url: String,
    pub status: Option<SiteStatus>,
    pub status_text: String,
    pub status_style: &'static str,
    #[serde(skip)]
    config: SiteConfig,
}

/// What a worker needs to check one site.
#[derive(Debug, Clone)]
struct SiteRequest {
    url: String,
    allow_insecure: bool,
    timeout: Duration,
    basic_auth: Option<BasicAuth>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorWidget {
    pub sites: Vec<Site>,
    pub show_failing_only: bool,
    pub has_failing: bool,
}

impl MonitorWidget {
    pub fn from_config(sites: &[SiteConfig], show_failing_only: bool) -> Result<Self, String> {
        let sites = sites
            .iter()
            .map(|config| {
                if config.url.trim().is_empty() {
                    return Err(format!("site `{}` has no url", config.title));
                }
                Ok(Site {
                    title: config.title.clone(),
                    url: config.url.clone(),
                    status: None,
                    status_text: String::new(),
                    status_style: "",
                    config: config.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            sites,
            show_failing_only,
            has_failing: false,
        })
    }

    pub async fn update(&mut self, refresh: &mut RefreshState, ctx: &UpdateContext) {
        let requests: Vec<SiteRequest> = self
            .sites
            .iter()
            .map(|site| SiteRequest {
                url: site.config.check_url.clone().unwrap_or_else(|| site.config.url.clone()),
                allow_insecure: site.config.allow_insecure,
                timeout: site
                    .config
                    .timeout
                    .map(|t| t.as_duration())
                    .filter(|t| !t.is_zero())
                    .unwrap_or(DEFAULT_SITE_TIMEOUT),
                basic_auth: site.config.basic_auth.clone(),
            })
            .collect();

        let clients = ctx.clients.clone();
        let batch = Job::new(
            move |request: SiteRequest| {
                let client = clients.pick(request.allow_insecure).clone();
                check_site(client, request)
            },
            requests,
        )
        .with_workers(MONITOR_WORKERS)
        .with_cancellation(ctx.cancel.clone())
        .execute()
        .await;

        let status = batch.classify("site checks");
        if !refresh.report_result(status, Utc::now()) {
            return;
        }

        let mut has_failing = false;
        for (index, result) in batch.into_results() {
            let site = &mut self.sites[index];
            let status = match result {
                Ok(status) => status,
                Err(err) => SiteStatus {
                    code: None,
                    timed_out: false,
                    response_time_ms: 0,
                    error: Some(err.to_string()),
                },
            };

            let alt = &site.config.alt_status_codes;
            has_failing |= is_failing(&status, alt);

            site.url = match (&status.error, &site.config.error_url) {
                (Some(_), Some(error_url)) => error_url.clone(),
                _ => site.config.url.clone(),
            };
            site.status_text = status_text(&status, alt);
            site.status_style = status_style(&status, alt);
            site.status = Some(status);
        }

        self.has_failing = has_failing;
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

async fn check_site(
    client: reqwest::Client,
    request: SiteRequest,
) -> Result<SiteStatus, FetchError> {
    let mut builder = client.get(&request.url).timeout(request.timeout);
    if let Some(auth) = &request.basic_auth {
        builder = builder.basic_auth(&auth.username, Some(&auth.password));
    }

    let started = Instant::now();
    let result = builder.send().await;
    let response_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    let status = match result {
        Ok(response) => SiteStatus {
            code: Some(response.status().as_u16()),
            timed_out: false,
            response_time_ms,
            error: None,
        },
        Err(err) => {
            debug!(url = %request.url, error = %err, "Site check failed");
            SiteStatus {
                code: None,
                timed_out: err.is_timeout(),
                response_time_ms,
                error: Some(err.to_string()),
            }
        }
    };

    Ok(status)
}

fn is_ok(status: &SiteStatus, alt_status_codes: &[u16]) -> bool {
    matches!(status.code, Some(code) if code == 200 || alt_status_codes.contains(&code))
}

fn is_failing(status: &SiteStatus, alt_status_codes: &[u16]) -> bool {
    if status.error.is_some() {
        return true;
    }
    match status.code {
        Some(code) => code >= 400 && !alt_status_codes.contains(&code),
        None => true,
    }
}

fn status_text(status: &SiteStatus, alt_status_codes: &[u16]) -> String {
    if is_ok(status, alt_status_codes) {
        return "OK".to_string();
    }

    match status.code {
        None if status.timed_out => "Timed Out".to_string(),
        None => "Error".to_string(),
        Some(404) => "Not Found".to_string(),
        Some(403) => "Forbidden".to_string(),
        Some(401) => "Unauthorized".to_string(),
        Some(code) if code >= 500 => "Server Error".to_string(),
        Some(code) if code >= 400 => "Client Error".to_string(),
        Some(code) => code.to_string(),
    }
}

fn status_style(status: &SiteStatus, alt_status_codes: &[u16]) -> &'static str {
    if is_ok(status, alt_status_codes) {
        "ok"
    } else {
        "error"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_code(code: u16) -> SiteStatus {
        SiteStatus {
            code: Some(code),
            timed_out: false,
            response_time_ms: 12,
            error: None,
        }
    }

    #[test]
    fn status_texts() {
        assert_eq!(status_text(&with_code(200), &[]), "OK");
        assert_eq!(status_text(&with_code(401), &[401]), "OK");
        assert_eq!(status_text(&with_code(401), &[]), "Unauthorized");
        assert_eq!(status_text(&with_code(404), &[]), "Not Found");
        assert_eq!(status_text(&with_code(418), &[]), "Client Error");
        assert_eq!(status_text(&with_code(502), &[]), "Server Error");
        assert_eq!(status_text(&with_code(301), &[]), "301");

        let timed_out = SiteStatus {
            code: None,
            timed_out: true,
            response_time_ms: 3000,
            error: Some("timeout".into()),
        };
        assert_eq!(status_text(&timed_out, &[]), "Timed Out");
    }

    #[test]
    fn failing_respects_alt_codes() {
        assert!(!is_failing(&with_code(200), &[]));
        assert!(!is_failing(&with_code(301), &[]));
        assert!(is_failing(&with_code(503), &[]));
        assert!(!is_failing(&with_code(503), &[503]));
        assert_eq!(status_style(&with_code(503), &[503]), "ok");
    }

    #[test]
    fn empty_url_rejected() {
        let site = SiteConfig {
            title: "Broken".into(),
            url: " ".into(),
            check_url: None,
            error_url: None,
            allow_insecure: false,
            timeout: None,
            basic_auth: None,
            alt_status_codes: Vec::new(),
        };
        assert!(MonitorWidget::from_config(&[site], false).is_err());
    }
}
