//! Update orchestrator.
//!
//! Each sweep looks at every top-level widget and spawns one update task per
//! widget that is due. A widget whose previous update still holds its lock
//! is skipped until a later sweep, so no widget ever runs two updates at
//! once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::DashboardConfig;
use crate::error::{ConfigError, Error};
use crate::http::HttpClients;
use crate::widgets::{IdAllocator, UpdateContext, Widget, WidgetSnapshot};

pub struct Dashboard {
    widgets: Vec<Arc<Mutex<Widget>>>,
    ctx: UpdateContext,
    tick_interval: Duration,
}

impl Dashboard {
    /// Build every configured widget. Ids follow configuration order.
    pub fn from_config(config: &DashboardConfig, cancel: CancellationToken) -> Result<Self, Error> {
        let clients = HttpClients::new(config.request_timeout.as_duration()).map_err(|e| {
            ConfigError::InvalidValue {
                key: "request_timeout".to_string(),
                message: format!("failed to build HTTP client: {e}"),
            }
        })?;

        let mut ids = IdAllocator::new();
        let widgets = config
            .widgets
            .iter()
            .enumerate()
            .map(|(position, w)| {
                Widget::from_config(w, position, &mut ids).map(|w| Arc::new(Mutex::new(w)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        info!(widgets = widgets.len(), "Dashboard ready");

        Ok(Self {
            widgets,
            ctx: UpdateContext {
                clients,
                cancel,
            },
            tick_interval: config.tick_interval.as_duration(),
        })
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn len(&self) -> usize {
        self.widgets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.widgets.is_empty()
    }

    /// Spawn an update for every idle widget that is due at `now`.
    fn dispatch_due(&self, now: DateTime<Utc>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        for widget in &self.widgets {
            let Ok(mut guard) = Arc::clone(widget).try_lock_owned() else {
                debug!("Widget still updating, skipping");
                continue;
            };
            if !guard.is_due(now) {
                continue;
            }

            let ctx = self.ctx.clone();
            handles.push(tokio::spawn(async move {
                guard.update(&ctx).await;
            }));
        }

        handles
    }

    /// Update every due widget and wait for all of them.
    ///
    /// Returns the number of widgets that were updated.
    pub async fn update_outdated(&self, now: DateTime<Utc>) -> usize {
        let handles = self.dispatch_due(now);
        let dispatched = handles.len();

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Widget update task failed");
            }
        }

        if dispatched > 0 {
            debug!(dispatched, "Update sweep finished");
        }
        dispatched
    }

    /// Serializable view of every widget, in configuration order.
    ///
    /// Waits for in-flight updates of the widgets it visits.
    pub async fn snapshots(&self) -> Vec<WidgetSnapshot> {
        let mut snapshots = Vec::with_capacity(self.widgets.len());
        for widget in &self.widgets {
            snapshots.push(widget.lock().await.snapshot());
        }
        snapshots
    }

    /// Run an update sweep every `interval` until `cancel` fires.
    pub fn spawn_ticker(
        self: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // Skip immediate first tick
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!("Ticker stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.update_outdated(Utc::now()).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dashboard(raw: &str) -> Dashboard {
        let config = DashboardConfig::parse(raw).unwrap();
        Dashboard::from_config(&config, CancellationToken::new()).unwrap()
    }

    const CALENDAR_AND_NOTE: &str = r#"
tick_interval = "1s"

[[widgets]]
type = "calendar"

[[widgets]]
type = "html"
source = "note"
"#;

    #[tokio::test]
    async fn sweeps_only_due_widgets() {
        let dashboard = dashboard(CALENDAR_AND_NOTE);
        assert_eq!(dashboard.len(), 2);
        assert_eq!(dashboard.tick_interval(), Duration::from_secs(1));

        assert_eq!(dashboard.update_outdated(Utc::now()).await, 1);
        // Calendar is now scheduled for the next hour.
        assert_eq!(dashboard.update_outdated(Utc::now()).await, 0);

        let snapshots = dashboard.snapshots().await;
        assert_eq!(snapshots[0].kind, "calendar");
        assert!(snapshots[0].content_available);
        assert!(snapshots[0].next_update.is_some());
        assert!(snapshots[1].content_available);
    }

    #[tokio::test]
    async fn busy_widget_is_skipped() {
        let dashboard = dashboard(CALENDAR_AND_NOTE);

        let held = dashboard.widgets[0].lock().await;
        assert_eq!(dashboard.update_outdated(Utc::now()).await, 0);
        drop(held);

        assert_eq!(dashboard.update_outdated(Utc::now()).await, 1);
    }

    #[tokio::test]
    async fn ticker_stops_on_cancel() {
        let dashboard = Arc::new(dashboard(CALENDAR_AND_NOTE));
        let cancel = CancellationToken::new();

        let handle = Arc::clone(&dashboard).spawn_ticker(Duration::from_millis(10), cancel.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        handle.await.unwrap();

        let snapshots = dashboard.snapshots().await;
        assert!(snapshots[0].content_available);
    }

    #[test]
    fn invalid_widget_fails_construction() {
        let config = DashboardConfig::parse(
            r#"
[[widgets]]
type = "releases"
repositories = ["nope"]
"#,
        )
        .unwrap();
        let err = Dashboard::from_config(&config, CancellationToken::new()).err().unwrap();
        assert!(matches!(err, Error::Config(ConfigError::InvalidWidget { position: 0, .. })));
    }
}
