use crate::error::{ConsoleError, StoreError};
use crate::store::{self, LiveStore};
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;

/// A permission switch flipped in the browser.
#[derive(Clone, Debug, Deserialize)]
pub struct ToggleEvent {
    pub uid: String,
    pub device: String,
    #[serde(default)]
    pub value: Value,
}

impl ToggleEvent {
    pub fn granted(&self) -> bool {
        truthy(&self.value)
    }
}

/// Loose boolean coercion matching what browsers send for form state.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[derive(Clone)]
pub struct PermissionWriter {
    store: Arc<dyn LiveStore>,
}

impl PermissionWriter {
    pub fn new(store: Arc<dyn LiveStore>) -> Self {
        Self { store }
    }

    /// Fire-and-forget. The next users snapshot corrects the display if the
    /// write is lost.
    pub fn submit(&self, event: ToggleEvent) {
        let writer = self.clone();
        tokio::spawn(async move {
            if let Err(err) = writer.apply(&event).await {
                tracing::warn!("Permission update lost: {err:?}");
            }
        });
    }

    pub async fn apply(&self, event: &ToggleEvent) -> Result<(), ConsoleError> {
        let path = store::permission_path(&event.uid, &event.device);
        if !store::is_valid_key(&event.uid) || !store::is_valid_key(&event.device) {
            return Err(ConsoleError::WriteFailure {
                source: StoreError::InvalidPath { path: path.clone() },
                path,
            });
        }
        let granted = event.granted();
        tracing::debug!("Writing {granted} to {path}");
        self.store
            .write(&path, Value::Bool(granted))
            .await
            .map_err(|source| ConsoleError::WriteFailure { path, source })
    }
}
