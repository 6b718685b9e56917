use crate::error::StoreError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub const ALARMS: &str = "alarms";
pub const USERS: &str = "users";

pub fn role_path(uid: &str) -> String {
    format!("{USERS}/{uid}/role")
}

pub fn permission_path(uid: &str, device: &str) -> String {
    format!("{USERS}/{uid}/permissions/{device}")
}

/// Remote key-value tree with realtime subscriptions.
#[async_trait]
pub trait LiveStore: Send + Sync {
    /// Single point-in-time fetch. Missing paths read as `null`.
    async fn read_once(&self, path: &str) -> Result<Value, StoreError>;

    /// Whole value at `path` on attach and after every change, until dropped.
    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    /// Unconditional overwrite; `null` deletes.
    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError>;
}

/// Scoped listener. Dropping it releases the underlying watch receiver and
/// stops any stream task feeding it.
pub struct Subscription {
    rx: watch::Receiver<Option<Value>>,
    projection: Vec<String>,
    primed: bool,
    last: Option<Value>,
    feeder: Option<JoinHandle<()>>,
}

impl Subscription {
    /// `projection` selects a subtree of the watched value.
    pub fn new(rx: watch::Receiver<Option<Value>>, projection: Vec<String>) -> Self {
        Self {
            rx,
            projection,
            primed: false,
            last: None,
            feeder: None,
        }
    }

    pub fn with_feeder(mut self, task: JoinHandle<()>) -> Self {
        self.feeder = Some(task);
        self
    }

    /// Next distinct snapshot; `None` once the source is gone.
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            if self.primed {
                self.rx.changed().await.ok()?;
            }
            self.primed = true;
            let current = self
                .rx
                .borrow_and_update()
                .as_ref()
                .map(|root| value_at(root, &self.projection).clone());
            let Some(current) = current else {
                continue;
            };
            if self.last.as_ref() != Some(&current) {
                self.last = Some(current.clone());
                return Some(current);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.feeder.take() {
            task.abort();
        }
    }
}

/// Splits `a/b/c` into segments, ignoring empty ones so `/` is the root.
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
        .collect()
}

/// Store keys may not contain these characters.
pub fn is_valid_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| matches!(c, '/' | '.' | '#' | '$' | '[' | ']') || c.is_control())
}

pub fn value_at<'a>(root: &'a Value, segments: &[String]) -> &'a Value {
    let mut node = root;
    for segment in segments {
        match node.get(segment) {
            Some(child) => node = child,
            None => return &Value::Null,
        }
    }
    node
}

/// Replaces the value at `segments`, creating parents. Writing `null`
/// removes the key and prunes parents left empty.
pub fn set_at(root: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *root = value;
        return;
    };
    if value.is_null() {
        remove_at(root, segments);
        return;
    }
    if !root.is_object() {
        *root = Value::Object(Map::new());
    }
    if let Value::Object(map) = root {
        let child = map.entry(head.clone()).or_insert(Value::Null);
        set_at(child, rest, value);
    }
}

fn remove_at(root: &mut Value, segments: &[String]) {
    let Some((head, rest)) = segments.split_first() else {
        *root = Value::Null;
        return;
    };
    let Value::Object(map) = root else {
        return;
    };
    if rest.is_empty() {
        map.remove(head);
    } else if let Some(child) = map.get_mut(head) {
        remove_at(child, rest);
        if child.is_null() || child.as_object().is_some_and(Map::is_empty) {
            map.remove(head);
        }
    }
    if map.is_empty() {
        *root = Value::Null;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segs(path: &str) -> Vec<String> {
        split_path(path)
    }

    #[test]
    fn split_ignores_leading_and_trailing_slashes() {
        assert_eq!(segs("/users/u1/"), vec!["users", "u1"]);
        assert!(segs("/").is_empty());
    }

    #[test]
    fn missing_paths_read_as_null() {
        let tree = json!({"users": {"u1": {"role": "admin"}}});
        assert_eq!(value_at(&tree, &segs("users/u1/role")), &json!("admin"));
        assert_eq!(value_at(&tree, &segs("users/u2/role")), &Value::Null);
    }

    #[test]
    fn set_creates_parents() {
        let mut tree = Value::Null;
        set_at(&mut tree, &segs("users/u1/permissions/Donosti"), json!(true));
        assert_eq!(tree, json!({"users": {"u1": {"permissions": {"Donosti": true}}}}));
    }

    #[test]
    fn null_write_prunes_empty_parents() {
        let mut tree = json!({
            "users": {"u1": {"permissions": {"Donosti": true}}, "u2": {"email": "b"}}
        });
        set_at(&mut tree, &segs("users/u1/permissions/Donosti"), Value::Null);
        assert_eq!(tree, json!({"users": {"u2": {"email": "b"}}}));
    }

    #[test]
    fn root_write_replaces_everything() {
        let mut tree = json!({"a": 1});
        set_at(&mut tree, &[], json!({"b": 2}));
        assert_eq!(tree, json!({"b": 2}));
    }

    #[test]
    fn key_validation_rejects_path_characters() {
        assert!(is_valid_key("Donosti"));
        assert!(is_valid_key("uid-123_x"));
        assert!(!is_valid_key(""));
        assert!(!is_valid_key("a/b"));
        assert!(!is_valid_key("a.b"));
        assert!(!is_valid_key("$x"));
    }

    #[test]
    fn schema_paths() {
        assert_eq!(role_path("u1"), "users/u1/role");
        assert_eq!(permission_path("u1", "Lasarte"), "users/u1/permissions/Lasarte");
    }

    #[tokio::test]
    async fn subscription_emits_initial_value_then_only_changes() {
        let tx = watch::Sender::new(Some(json!({"alarms": {"a": 1}, "users": {}})));
        let mut sub = Subscription::new(tx.subscribe(), segs("alarms"));
        assert_eq!(sub.next().await, Some(json!({"a": 1})));

        tx.send_modify(|root| {
            if let Some(root) = root {
                set_at(root, &segs("users/u1/email"), json!("x"));
            }
        });
        tx.send_modify(|root| {
            if let Some(root) = root {
                set_at(root, &segs("alarms/a"), json!(2));
            }
        });
        assert_eq!(sub.next().await, Some(json!({"a": 2})));
    }

    #[tokio::test]
    async fn subscription_waits_until_loaded_and_ends_with_source() {
        let tx = watch::Sender::new(None);
        let mut sub = Subscription::new(tx.subscribe(), Vec::new());
        tx.send_replace(Some(json!({"x": true})));
        assert_eq!(sub.next().await, Some(json!({"x": true})));
        drop(tx);
        assert_eq!(sub.next().await, None);
    }
}
