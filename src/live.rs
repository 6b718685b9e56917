use crate::error::StoreError;
use crate::model::{self, DeviceRecord, Snapshot, UserRecord};
use crate::store::{self, LiveStore, Subscription};
use crate::ui;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ViewKind {
    Devices,
    Users,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RenderedView {
    pub view: ViewKind,
    pub html: String,
}

/// Snapshot in, markup out. Holds nothing between renders.
#[derive(Clone)]
pub struct ViewRenderer {
    devices: Arc<Vec<String>>,
}

impl ViewRenderer {
    pub fn new(permission_devices: Vec<String>) -> Self {
        Self {
            devices: Arc::new(permission_devices),
        }
    }

    pub fn render(&self, kind: ViewKind, snapshot: &Value) -> RenderedView {
        let html = match kind {
            ViewKind::Devices => {
                let snapshot = Snapshot::<DeviceRecord>::from_value(snapshot);
                ui::render_device_view(model::device_cards(&snapshot))
            }
            ViewKind::Users => {
                let snapshot = Snapshot::<UserRecord>::from_value(snapshot);
                let rows = model::user_rows(&snapshot, &self.devices);
                ui::render_user_view(self.devices.as_ref().clone(), rows)
            }
        };
        RenderedView { view: kind, html }
    }
}

/// The two collection subscriptions of one admin session. Dropping the feed
/// stops both watchers and releases their store listeners.
pub struct AdminFeed {
    rx: mpsc::Receiver<RenderedView>,
    watchers: Vec<JoinHandle<()>>,
}

impl AdminFeed {
    pub async fn attach(
        store: &dyn LiveStore,
        renderer: ViewRenderer,
    ) -> Result<Self, StoreError> {
        let alarms = store.subscribe(store::ALARMS).await?;
        let users = store.subscribe(store::USERS).await?;
        let (tx, rx) = mpsc::channel(16);
        let watchers = vec![
            tokio::spawn(watch_collection(
                alarms,
                ViewKind::Devices,
                renderer.clone(),
                tx.clone(),
            )),
            tokio::spawn(watch_collection(users, ViewKind::Users, renderer, tx)),
        ];
        tracing::debug!("Admin feed attached");
        Ok(Self { rx, watchers })
    }

    /// Next re-rendered view from either collection, in arrival order.
    pub async fn next(&mut self) -> Option<RenderedView> {
        self.rx.recv().await
    }
}

impl Drop for AdminFeed {
    fn drop(&mut self) {
        for watcher in &self.watchers {
            watcher.abort();
        }
        tracing::debug!("Admin feed released");
    }
}

async fn watch_collection(
    mut subscription: Subscription,
    kind: ViewKind,
    renderer: ViewRenderer,
    tx: mpsc::Sender<RenderedView>,
) {
    while let Some(snapshot) = subscription.next().await {
        let view = renderer.render(kind, &snapshot);
        if tx.send(view).await.is_err() {
            break;
        }
    }
    tracing::debug!("{kind:?} watcher finished");
}
