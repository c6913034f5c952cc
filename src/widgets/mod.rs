//! Widgets — one shared base record plus a closed set of source variants.
//!
//! - `html` — static markup
//! - `calendar` — day grid around today, refreshed on the hour
//! - `monitor` — HTTP status checks of a list of sites
//! - `custom_api` — one JSON document from an arbitrary endpoint
//! - `releases` — latest GitHub release per repository
//! - `group` — container of child widgets

pub mod calendar;
pub mod custom_api;
pub mod group;
pub mod html;
pub mod monitor;
pub mod releases;

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{CommonConfig, DurationField, WidgetConfig, WidgetKindConfig};
use crate::error::ConfigError;
use crate::http::HttpClients;
use crate::refresh::{CachePolicy, RefreshState};

pub use calendar::CalendarWidget;
pub use custom_api::CustomApiWidget;
pub use group::GroupWidget;
pub use html::HtmlWidget;
pub use monitor::MonitorWidget;
pub use releases::ReleasesWidget;

/// Stable identity of a widget, assigned from its configuration position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct WidgetId(pub u64);

impl fmt::Display for WidgetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out widget ids in configuration order, starting at 1.
#[derive(Debug, Default)]
pub struct IdAllocator {
    last: u64,
}

impl IdAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> WidgetId {
        self.last += 1;
        WidgetId(self.last)
    }
}

/// Everything a widget update may need from the outside world.
#[derive(Debug, Clone)]
pub struct UpdateContext {
    pub clients: HttpClients,
    /// Cancelled on shutdown; batches stop dispatching when it fires.
    pub cancel: CancellationToken,
}

/// Fields shared by every widget.
#[derive(Debug, Clone)]
pub struct WidgetBase {
    pub id: WidgetId,
    pub title: String,
    pub title_url: Option<String>,
    pub hide_header: bool,
    pub css_class: Option<String>,
    pub refresh: RefreshState,
}

/// Source-specific part of a widget.
#[derive(Debug)]
pub enum WidgetKind {
    Html(HtmlWidget),
    Calendar(CalendarWidget),
    Monitor(MonitorWidget),
    CustomApi(CustomApiWidget),
    Releases(ReleasesWidget),
    Group(GroupWidget),
}

impl WidgetKind {
    pub fn type_tag(&self) -> &'static str {
        match self {
            Self::Html(_) => "html",
            Self::Calendar(_) => "calendar",
            Self::Monitor(_) => "monitor",
            Self::CustomApi(_) => "custom-api",
            Self::Releases(_) => "releases",
            Self::Group(_) => "group",
        }
    }
}

/// A configured dashboard widget.
#[derive(Debug)]
pub struct Widget {
    pub base: WidgetBase,
    pub kind: WidgetKind,
}

/// Serializable view of a widget handed to the rendering layer.
#[derive(Debug, Clone, Serialize)]
pub struct WidgetSnapshot {
    pub id: WidgetId,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub title: String,
    pub title_url: Option<String>,
    pub hide_header: bool,
    pub css_class: Option<String>,
    pub content_available: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
    pub next_update: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub data: serde_json::Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<WidgetSnapshot>,
}

/// Apply a user `cache` override to a widget's default policy.
///
/// Only fixed-duration policies can be overridden.
fn resolve_policy(default: CachePolicy, custom: Option<DurationField>) -> CachePolicy {
    match (default, custom) {
        (CachePolicy::FixedDuration(_), Some(custom)) if !custom.0.is_zero() => {
            CachePolicy::FixedDuration(custom.0)
        }
        (policy, _) => policy,
    }
}

impl Widget {
    /// Build a widget from its configuration entry.
    ///
    /// `position` is the entry's index, used in error messages.
    pub fn from_config(
        config: &WidgetConfig,
        position: usize,
        ids: &mut IdAllocator,
    ) -> Result<Self, ConfigError> {
        let id = ids.allocate();
        let tag = config.kind.type_tag();
        let invalid = |message: String| ConfigError::InvalidWidget {
            position,
            kind: tag.to_string(),
            message,
        };

        let (kind, default_title, default_policy) = match &config.kind {
            WidgetKindConfig::Html { source } => (
                WidgetKind::Html(HtmlWidget::new(source.clone())),
                "",
                CachePolicy::Infinite,
            ),
            WidgetKindConfig::Calendar { start_sunday } => (
                WidgetKind::Calendar(CalendarWidget::new(*start_sunday)),
                "Calendar",
                CachePolicy::AlignedHourly,
            ),
            WidgetKindConfig::Monitor {
                sites,
                show_failing_only,
            } => (
                WidgetKind::Monitor(
                    MonitorWidget::from_config(sites, *show_failing_only).map_err(invalid)?,
                ),
                "Monitor",
                CachePolicy::FixedDuration(Duration::from_secs(5 * 60)),
            ),
            WidgetKindConfig::CustomApi { url, headers, body } => (
                WidgetKind::CustomApi(
                    CustomApiWidget::from_config(url, headers, body.as_ref()).map_err(invalid)?,
                ),
                "Custom API",
                CachePolicy::FixedDuration(Duration::from_secs(60 * 60)),
            ),
            WidgetKindConfig::Releases {
                repositories,
                token,
                gitlab_token,
                base_urls,
                limit,
            } => (
                WidgetKind::Releases(
                    ReleasesWidget::from_config(
                        repositories,
                        token.as_deref(),
                        gitlab_token.as_deref(),
                        base_urls,
                        *limit,
                    )
                    .map_err(invalid)?,
                ),
                "Releases",
                CachePolicy::FixedDuration(Duration::from_secs(2 * 60 * 60)),
            ),
            WidgetKindConfig::Group { widgets } => (
                WidgetKind::Group(GroupWidget::from_config(widgets, ids).map_err(invalid)?),
                "",
                CachePolicy::Infinite,
            ),
        };

        let mut refresh = RefreshState::new(resolve_policy(default_policy, config.common.cache));
        if matches!(kind, WidgetKind::Html(_) | WidgetKind::Group(_)) {
            refresh = refresh.with_content_available();
        }

        let CommonConfig {
            title,
            title_url,
            hide_header,
            css_class,
            ..
        } = &config.common;

        debug!(widget_id = %id, kind = tag, policy = ?refresh.policy(), "Widget created");

        Ok(Self {
            base: WidgetBase {
                id,
                title: title.clone().unwrap_or_else(|| default_title.to_string()),
                title_url: title_url.clone(),
                hide_header: *hide_header || matches!(kind, WidgetKind::Group(_)),
                css_class: css_class.clone(),
                refresh,
            },
            kind,
        })
    }

    pub fn id(&self) -> WidgetId {
        self.base.id
    }

    pub fn type_tag(&self) -> &'static str {
        self.kind.type_tag()
    }

    /// Whether this widget, or any child of it, should update at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match &self.kind {
            WidgetKind::Group(group) => group.is_due(now),
            _ => self.base.refresh.is_due(now),
        }
    }

    /// Run one update cycle.
    ///
    /// Every cycle ends with exactly one outcome reported to the widget's
    /// refresh state (groups delegate to their children).
    pub fn update<'a>(&'a mut self, ctx: &'a UpdateContext) -> BoxFuture<'a, ()> {
        async move {
            let id = self.base.id;
            let refresh = &mut self.base.refresh;

            match &mut self.kind {
                WidgetKind::Html(_) => {}
                WidgetKind::Calendar(widget) => widget.update(refresh),
                WidgetKind::Monitor(widget) => widget.update(refresh, ctx).await,
                WidgetKind::CustomApi(widget) => widget.update(refresh, ctx).await,
                WidgetKind::Releases(widget) => widget.update(refresh, ctx).await,
                WidgetKind::Group(widget) => widget.update(ctx).await,
            }

            if let Some(err) = refresh.last_error() {
                warn!(
                    widget_id = %id,
                    error = %err,
                    retry_count = refresh.retry_count(),
                    "Widget update failed"
                );
            } else if let Some(notice) = refresh.last_notice() {
                info!(widget_id = %id, notice = %notice, "Widget updated with missing content");
            } else {
                debug!(widget_id = %id, next_update = ?refresh.next_update(), "Widget updated");
            }
        }
        .boxed()
    }

    pub fn snapshot(&self) -> WidgetSnapshot {
        let refresh = &self.base.refresh;

        let (data, children) = match &self.kind {
            WidgetKind::Html(widget) => (widget.data(), Vec::new()),
            WidgetKind::Calendar(widget) => (widget.data(), Vec::new()),
            WidgetKind::Monitor(widget) => (widget.data(), Vec::new()),
            WidgetKind::CustomApi(widget) => (widget.data(), Vec::new()),
            WidgetKind::Releases(widget) => (widget.data(), Vec::new()),
            WidgetKind::Group(widget) => (
                serde_json::Value::Null,
                widget.widgets.iter().map(Widget::snapshot).collect(),
            ),
        };

        WidgetSnapshot {
            id: self.base.id,
            kind: self.type_tag(),
            title: self.base.title.clone(),
            title_url: self.base.title_url.clone(),
            hide_header: self.base.hide_header,
            css_class: self.base.css_class.clone(),
            content_available: refresh.content_available(),
            error: refresh.last_error().map(ToString::to_string),
            notice: refresh.last_notice().map(ToString::to_string),
            next_update: refresh.next_update(),
            last_updated: refresh.last_updated(),
            data,
            children,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DashboardConfig;

    fn build(raw: &str) -> Result<Vec<Widget>, ConfigError> {
        let config = DashboardConfig::parse(raw)?;
        let mut ids = IdAllocator::new();
        config
            .widgets
            .iter()
            .enumerate()
            .map(|(i, w)| Widget::from_config(w, i, &mut ids))
            .collect()
    }

    #[test]
    fn ids_follow_configuration_order() {
        let widgets = build(
            r#"
[[widgets]]
type = "html"
source = "a"

[[widgets]]
type = "group"
[[widgets.widgets]]
type = "calendar"

[[widgets]]
type = "calendar"
"#,
        )
        .unwrap();

        assert_eq!(widgets[0].id(), WidgetId(1));
        assert_eq!(widgets[1].id(), WidgetId(2));
        match &widgets[1].kind {
            WidgetKind::Group(g) => assert_eq!(g.widgets[0].id(), WidgetId(3)),
            _ => panic!("expected group"),
        }
        assert_eq!(widgets[2].id(), WidgetId(4));
    }

    #[test]
    fn default_policies_and_titles() {
        let widgets = build(
            r#"
[[widgets]]
type = "html"
source = "<b>x</b>"

[[widgets]]
type = "calendar"
cache = "5m"

[[widgets]]
type = "custom-api"
url = "http://example.test"
cache = "10m"

[[widgets]]
type = "releases"
repositories = ["rust-lang/rust"]
"#,
        )
        .unwrap();

        assert_eq!(widgets[0].base.refresh.policy(), CachePolicy::Infinite);
        assert!(widgets[0].base.refresh.content_available());
        // Hourly widgets ignore the override.
        assert_eq!(widgets[1].base.refresh.policy(), CachePolicy::AlignedHourly);
        assert_eq!(widgets[1].base.title, "Calendar");
        assert_eq!(
            widgets[2].base.refresh.policy(),
            CachePolicy::FixedDuration(Duration::from_secs(600))
        );
        assert_eq!(
            widgets[3].base.refresh.policy(),
            CachePolicy::FixedDuration(Duration::from_secs(7200))
        );
    }

    #[test]
    fn static_widget_is_never_due() {
        let widgets = build("[[widgets]]\ntype = \"html\"\nsource = \"x\"").unwrap();
        assert!(!widgets[0].is_due(Utc::now()));
    }

    #[test]
    fn nested_group_is_rejected() {
        let err = build(
            r#"
[[widgets]]
type = "group"
[[widgets.widgets]]
type = "group"
[[widgets.widgets.widgets]]
type = "calendar"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidWidget { position: 0, .. }));
    }

    #[test]
    fn invalid_repository_is_rejected() {
        let err = build(
            r#"
[[widgets]]
type = "releases"
repositories = ["not-a-repo"]
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("not-a-repo"));
    }

    #[test]
    fn snapshot_reports_state() {
        let widgets =
            build("[[widgets]]\ntype = \"html\"\ntitle = \"Note\"\nsource = \"hi\"").unwrap();
        let snap = widgets[0].snapshot();
        assert_eq!(snap.kind, "html");
        assert_eq!(snap.title, "Note");
        assert!(snap.content_available);
        assert!(snap.error.is_none());

        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["type"], "html");
        assert_eq!(json["data"]["source"], "hi");
        assert!(json.get("children").is_none());
    }
}
