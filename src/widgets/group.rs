//! Container of child widgets.

use chrono::{DateTime, Utc};
use futures::future::join_all;

use super::{IdAllocator, UpdateContext, Widget};
use crate::config::{WidgetConfig, WidgetKindConfig};

#[derive(Debug)]
pub struct GroupWidget {
    pub widgets: Vec<Widget>,
}

impl GroupWidget {
    pub fn from_config(configs: &[WidgetConfig], ids: &mut IdAllocator) -> Result<Self, String> {
        let mut widgets = Vec::with_capacity(configs.len());

        for (position, config) in configs.iter().enumerate() {
            if let WidgetKindConfig::Group { .. } = config.kind {
                return Err("nested groups are not supported".to_string());
            }

            let mut widget = Widget::from_config(config, position, ids).map_err(|e| e.to_string())?;
            widget.base.hide_header = true;
            widgets.push(widget);
        }

        Ok(Self { widgets })
    }

    /// Due when any child is due.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.widgets.iter().any(|w| w.is_due(now))
    }

    /// Update every due child concurrently.
    pub async fn update(&mut self, ctx: &UpdateContext) {
        let now = Utc::now();
        let updates = self
            .widgets
            .iter_mut()
            .filter(|w| w.is_due(now))
            .map(|w| w.update(ctx));

        join_all(updates).await;
    }
}
