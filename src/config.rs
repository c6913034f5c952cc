//! Configuration types.
//!
//! Process settings come from the environment; the dashboard itself is
//! described in a TOML file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;

/// `None` only if the literal below fails to compile, which the tests rule out.
static DURATION_PATTERN: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d+)(s|m|h|d)$").ok());

/// A duration written as `<number><unit>`, unit one of `s`, `m`, `h`, `d`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DurationField(pub Duration);

impl DurationField {
    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl FromStr for DurationField {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: "duration".to_string(),
            message,
        };

        let captures = DURATION_PATTERN
            .as_ref()
            .and_then(|pattern| pattern.captures(value))
            .ok_or_else(|| invalid(format!("invalid duration format for value `{value}`")))?;

        let amount: u64 = captures[1]
            .parse()
            .map_err(|_| invalid(format!("invalid duration value: {}", &captures[1])))?;

        let unit_secs = match &captures[2] {
            "s" => 1,
            "m" => 60,
            "h" => 3600,
            _ => 24 * 3600,
        };

        let secs = amount
            .checked_mul(unit_secs)
            .ok_or_else(|| invalid(format!("duration `{value}` is too large")))?;

        Ok(Self(Duration::from_secs(secs)))
    }
}

impl<'de> Deserialize<'de> for DurationField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Settings read from the process environment.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Path of the dashboard TOML file.
    pub config_path: PathBuf,
    /// Directory for rolling log files; stderr only when unset.
    pub log_dir: Option<PathBuf>,
    /// Run a single update sweep and exit.
    pub once: bool,
}

impl Settings {
    pub fn from_env() -> Self {
        let config_path = std::env::var("FEEDBOARD_CONFIG")
            .unwrap_or_else(|_| "feedboard.toml".to_string())
            .into();

        let log_dir = std::env::var("FEEDBOARD_LOG_DIR")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .map(PathBuf::from);

        let once = std::env::var("FEEDBOARD_ONCE")
            .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Self {
            config_path,
            log_dir,
            once,
        }
    }
}

fn default_tick_interval() -> DurationField {
    DurationField(Duration::from_secs(30))
}

fn default_request_timeout() -> DurationField {
    DurationField(Duration::from_secs(5))
}

/// Dashboard definition.
#[derive(Debug, Clone, Deserialize)]
pub struct DashboardConfig {
    /// How often the orchestrator looks for due widgets.
    #[serde(default = "default_tick_interval")]
    pub tick_interval: DurationField,
    /// Timeout applied to every outgoing HTTP request.
    #[serde(default = "default_request_timeout")]
    pub request_timeout: DurationField,
    #[serde(default)]
    pub widgets: Vec<WidgetConfig>,
}

impl DashboardConfig {
    /// Read and validate a dashboard file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::parse(&raw)
    }

    /// Parse and validate a dashboard definition.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_interval.0.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "tick_interval".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.request_timeout.0.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "request_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.widgets.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "widgets".to_string(),
                hint: "Add at least one [[widgets]] entry.".to_string(),
            });
        }

        Ok(())
    }
}

/// One `[[widgets]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct WidgetConfig {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(flatten)]
    pub kind: WidgetKindConfig,
}

/// Fields shared by every widget type.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommonConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub title_url: Option<String>,
    #[serde(default)]
    pub hide_header: bool,
    #[serde(default)]
    pub css_class: Option<String>,
    /// Overrides the default fixed cache duration.
    #[serde(default)]
    pub cache: Option<DurationField>,
}

/// Type-specific widget fields, selected by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WidgetKindConfig {
    Html {
        source: String,
    },
    Calendar {
        #[serde(default)]
        start_sunday: bool,
    },
    Monitor {
        #[serde(default)]
        sites: Vec<SiteConfig>,
        #[serde(default)]
        show_failing_only: bool,
    },
    CustomApi {
        url: String,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        /// JSON body; its presence turns the request into a POST.
        #[serde(default)]
        body: Option<serde_json::Value>,
    },
    Releases {
        /// `[source:]path` entries; source defaults to `github`.
        repositories: Vec<String>,
        /// GitHub token.
        #[serde(default)]
        token: Option<String>,
        #[serde(default)]
        gitlab_token: Option<String>,
        /// API root per source name, for mirrors and self-hosted instances.
        #[serde(default)]
        base_urls: BTreeMap<String, String>,
        #[serde(default)]
        limit: Option<usize>,
    },
    Group {
        widgets: Vec<WidgetConfig>,
    },
}

impl WidgetKindConfig {
    /// The `type` tag as written in the config file.
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Html { .. } => "html",
            Self::Calendar { .. } => "calendar",
            Self::Monitor { .. } => "monitor",
            Self::CustomApi { .. } => "custom-api",
            Self::Releases { .. } => "releases",
            Self::Group { .. } => "group",
        }
    }
}

/// One site checked by a monitor widget.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    pub title: String,
    pub url: String,
    /// Checked instead of `url` when set.
    #[serde(default)]
    pub check_url: Option<String>,
    /// Linked instead of `url` when the check errors.
    #[serde(default)]
    pub error_url: Option<String>,
    #[serde(default)]
    pub allow_insecure: bool,
    #[serde(default)]
    pub timeout: Option<DurationField>,
    #[serde(default)]
    pub basic_auth: Option<BasicAuth>,
    /// Status codes treated as healthy in addition to 200.
    #[serde(default)]
    pub alt_status_codes: Vec<u16>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default)]
    pub password: String,
}
