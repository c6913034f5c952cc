//! Latest release per repository.
//!
//! Repositories are written as `[source:]path`, where `source` is one of
//! `github` (the default), `gitlab`, `codeberg` or `dockerhub`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::UpdateContext;
use crate::error::FetchError;
use crate::http::decode_json;
use crate::pool::Job;
use crate::refresh::RefreshState;

const RELEASES_WORKERS: usize = 20;
const DEFAULT_LIMIT: usize = 10;
const DOCKER_HUB_WEB_URL: &str = "https://hub.docker.com";

/// Where a release is looked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSource {
    Github,
    Gitlab,
    Codeberg,
    Dockerhub,
}

impl ReleaseSource {
    const ALL: [Self; 4] = [Self::Github, Self::Gitlab, Self::Codeberg, Self::Dockerhub];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Github => "github",
            Self::Gitlab => "gitlab",
            Self::Codeberg => "codeberg",
            Self::Dockerhub => "dockerhub",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Github => "https://api.github.com",
            Self::Gitlab => "https://gitlab.com",
            Self::Codeberg => "https://codeberg.org",
            Self::Dockerhub => "https://hub.docker.com",
        }
    }
}

impl fmt::Display for ReleaseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReleaseSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|source| source.as_str() == s)
            .ok_or_else(|| format!("unknown release source `{s}`"))
    }
}

/// One `[source:]path` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRequest {
    pub source: ReleaseSource,
    pub repository: String,
}

impl FromStr for ReleaseRequest {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (source, repository) = match raw.split_once(':') {
            Some((prefix, rest)) => match prefix.parse::<ReleaseSource>() {
                Ok(source) => (source, rest),
                Err(_) => (ReleaseSource::Github, raw),
            },
            None => (ReleaseSource::Github, raw),
        };

        let segments: Vec<&str> = repository.split('/').collect();
        let non_empty = segments.iter().all(|s| !s.is_empty());
        let valid = match source {
            ReleaseSource::Github | ReleaseSource::Codeberg => {
                segments.len() == 2 && non_empty && !repository.contains(':')
            }
            ReleaseSource::Gitlab => segments.len() >= 2 && non_empty,
            ReleaseSource::Dockerhub => segments.len() <= 2 && non_empty,
        };
        if !valid {
            return Err(format!("repository `{raw}` is not a valid {source} repository"));
        }

        Ok(Self {
            source,
            repository: repository.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct GithubRelease {
    tag_name: String,
    html_url: String,
    #[serde(default)]
    published_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct GitlabLinks {
    #[serde(rename = "self")]
    self_url: String,
}

#[derive(Debug, Deserialize)]
struct GitlabRelease {
    tag_name: String,
    #[serde(default)]
    released_at: Option<DateTime<Utc>>,
    #[serde(rename = "_links")]
    links: GitlabLinks,
}

#[derive(Debug, Deserialize)]
struct DockerHubTag {
    name: String,
    #[serde(default)]
    tag_last_pushed: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct DockerHubTags {
    results: Vec<DockerHubTag>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Release {
    pub source: ReleaseSource,
    pub repository: String,
    pub version: String,
    pub url: String,
    pub published_at: Option<DateTime<Utc>>,
}

/// API roots and credentials shared by every fetch of one widget.
#[derive(Debug)]
struct Endpoints {
    base_urls: BTreeMap<ReleaseSource, String>,
    github_token: Option<SecretString>,
    gitlab_token: Option<SecretString>,
}

impl Endpoints {
    fn base_url(&self, source: ReleaseSource) -> &str {
        self.base_urls
            .get(&source)
            .map(String::as_str)
            .unwrap_or_else(|| source.default_base_url())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReleasesWidget {
    #[serde(skip)]
    requests: Vec<ReleaseRequest>,
    #[serde(skip)]
    endpoints: Arc<Endpoints>,
    #[serde(skip)]
    limit: usize,
    pub releases: Vec<Release>,
}

impl ReleasesWidget {
    pub fn from_config(
        repositories: &[String],
        github_token: Option<&str>,
        gitlab_token: Option<&str>,
        base_urls: &BTreeMap<String, String>,
        limit: Option<usize>,
    ) -> Result<Self, String> {
        if repositories.is_empty() {
            return Err("at least one repository is required".to_string());
        }

        let requests = repositories
            .iter()
            .map(|raw| raw.parse::<ReleaseRequest>())
            .collect::<Result<Vec<_>, _>>()?;

        let base_urls = base_urls
            .iter()
            .map(|(source, url)| {
                let source = source.parse::<ReleaseSource>()?;
                Ok((source, url.trim_end_matches('/').to_string()))
            })
            .collect::<Result<BTreeMap<_, _>, String>>()?;

        let limit = limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 {
            return Err("limit must be greater than zero".to_string());
        }

        let secret = |token: Option<&str>| {
            token
                .filter(|t| !t.is_empty())
                .map(|t| SecretString::from(t.to_string()))
        };

        Ok(Self {
            requests,
            endpoints: Arc::new(Endpoints {
                base_urls,
                github_token: secret(github_token),
                gitlab_token: secret(gitlab_token),
            }),
            limit,
            releases: Vec::new(),
        })
    }

    pub async fn update(&mut self, refresh: &mut RefreshState, ctx: &UpdateContext) {
        let client = ctx.clients.default.clone();
        let endpoints = Arc::clone(&self.endpoints);

        let batch = Job::new(
            move |request: ReleaseRequest| {
                fetch_latest_release(client.clone(), Arc::clone(&endpoints), request)
            },
            self.requests.clone(),
        )
        .with_workers(RELEASES_WORKERS)
        .with_cancellation(ctx.cancel.clone())
        .execute()
        .await;

        for (request, err) in self.requests.iter().zip(&batch.errors) {
            if let Some(err) = err {
                warn!(
                    source = %request.source,
                    repository = %request.repository,
                    error = %err,
                    "Failed to fetch latest release"
                );
            }
        }

        let status = batch.classify("releases");
        if !refresh.report_result(status, Utc::now()) {
            return;
        }

        let mut releases = batch.into_outputs();
        releases.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        releases.truncate(self.limit);
        self.releases = releases;
    }

    pub fn data(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Lowercase a tag and make sure it starts with `v`.
fn normalize_version(tag: &str) -> String {
    let version = tag.trim().to_lowercase();
    if version.is_empty() || version.starts_with('v') {
        version
    } else {
        format!("v{version}")
    }
}

/// `base` with `segments` appended, each percent-encoded as a single segment.
fn api_url<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url, FetchError> {
    let invalid = |reason: String| FetchError::Request {
        url: base.to_string(),
        reason,
    };

    let mut url = Url::parse(base).map_err(|e| invalid(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| invalid("base URL cannot have a path".to_string()))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn fetch_latest_release(
    client: reqwest::Client,
    endpoints: Arc<Endpoints>,
    request: ReleaseRequest,
) -> Result<Release, FetchError> {
    let base = endpoints.base_url(request.source);

    match request.source {
        ReleaseSource::Github | ReleaseSource::Codeberg => {
            let (owner, name) = request
                .repository
                .split_once('/')
                .unwrap_or((request.repository.as_str(), ""));
            let url = match request.source {
                ReleaseSource::Github => {
                    api_url(base, ["repos", owner, name, "releases", "latest"])?
                }
                _ => api_url(
                    base,
                    ["api", "v1", "repos", owner, name, "releases", "latest"],
                )?,
            };

            let mut builder = client.get(url).header("Accept", "application/json");
            if request.source == ReleaseSource::Github
                && let Some(token) = &endpoints.github_token
            {
                builder = builder.bearer_auth(token.expose_secret());
            }

            let release: GithubRelease = decode_json(builder).await?;
            Ok(Release {
                source: request.source,
                version: normalize_version(&release.tag_name),
                url: release.html_url,
                published_at: release.published_at,
                repository: request.repository,
            })
        }
        ReleaseSource::Gitlab => {
            let url = api_url(
                base,
                [
                    "api",
                    "v4",
                    "projects",
                    request.repository.as_str(),
                    "releases",
                    "permalink",
                    "latest",
                ],
            )?;

            let mut builder = client.get(url);
            if let Some(token) = &endpoints.gitlab_token {
                builder = builder.header("PRIVATE-TOKEN", token.expose_secret());
            }

            let release: GitlabRelease = decode_json(builder).await?;
            Ok(Release {
                source: request.source,
                version: normalize_version(&release.tag_name),
                url: release.links.self_url,
                published_at: release.released_at,
                repository: request.repository,
            })
        }
        ReleaseSource::Dockerhub => fetch_latest_docker_tag(&client, base, request).await,
    }
}

async fn fetch_latest_docker_tag(
    client: &reqwest::Client,
    base: &str,
    request: ReleaseRequest,
) -> Result<Release, FetchError> {
    let (namespace, image) = match request.repository.split_once('/') {
        Some((namespace, image)) => (namespace, image),
        None => ("library", request.repository.as_str()),
    };
    let (name, pinned_tag) = match image.split_once(':') {
        Some((name, tag)) => (name, Some(tag)),
        None => (image, None),
    };

    let mut segments = vec!["v2", "namespaces", namespace, "repositories", name, "tags"];
    let tag = match pinned_tag {
        Some(tag) => {
            segments.push(tag);
            decode_json::<DockerHubTag>(client.get(api_url(base, segments)?)).await?
        }
        None => {
            let url = api_url(base, segments)?;
            let tags: DockerHubTags = decode_json(client.get(url.clone())).await?;
            tags.results
                .into_iter()
                .next()
                .ok_or_else(|| FetchError::NoContent(format!("no tags found for {url}")))?
        }
    };

    let (display_name, url) = if namespace == "library" {
        (
            name.to_string(),
            format!("{DOCKER_HUB_WEB_URL}/_/{name}/tags?name={}", tag.name),
        )
    } else {
        let display_name = format!("{namespace}/{name}");
        let url = format!("{DOCKER_HUB_WEB_URL}/r/{display_name}/tags?name={}", tag.name);
        (display_name, url)
    };

    Ok(Release {
        source: ReleaseSource::Dockerhub,
        repository: display_name,
        version: tag.name,
        url,
        published_at: tag.tag_last_pushed,
    })
}
