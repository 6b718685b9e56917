use crate::permissions::truthy;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// A collection member decoded field by field. Values written by devices and
/// older consoles are loosely typed, so fields coerce instead of failing.
pub trait Record: Sized {
    fn from_fields(fields: &Map<String, Value>) -> Self;
}

/// Live telemetry for one alarm device, written by the devices themselves.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceRecord {
    pub is_online: bool,
    pub ringring: bool,
    pub wifi_rssi: Option<f64>,
}

impl Record for DeviceRecord {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            is_online: fields.get("is_online").is_some_and(truthy),
            ringring: fields.get("ringring").is_some_and(truthy),
            wifi_rssi: fields.get("wifi_rssi").and_then(numeric),
        }
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct UserRecord {
    pub alias: Option<String>,
    pub email: String,
    pub permissions: HashMap<String, Value>,
}

impl Record for UserRecord {
    fn from_fields(fields: &Map<String, Value>) -> Self {
        Self {
            alias: fields
                .get("alias")
                .and_then(Value::as_str)
                .filter(|alias| !alias.is_empty())
                .map(str::to_string),
            email: fields
                .get("email")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            permissions: fields
                .get("permissions")
                .and_then(Value::as_object)
                .map(|map| map.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
                .unwrap_or_default(),
        }
    }
}

impl UserRecord {
    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.email)
    }

    pub fn allows(&self, device: &str) -> bool {
        self.permissions.get(device).is_some_and(truthy)
    }
}

/// Whole-collection value keyed by record id, in the store's key order.
#[derive(Clone, Debug, PartialEq)]
pub struct Snapshot<T> {
    entries: BTreeMap<String, T>,
}

impl<T: Record> Snapshot<T> {
    /// Members that are not objects are skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut entries = BTreeMap::new();
        if let Value::Object(map) = value {
            for (id, raw) in map {
                match raw.as_object() {
                    Some(fields) => {
                        entries.insert(id.clone(), T::from_fields(fields));
                    }
                    None => tracing::warn!("Skipping malformed record {id}: {raw}"),
                }
            }
        } else if !value.is_null() {
            tracing::warn!("Expected an object snapshot, got {value}");
        }
        Self { entries }
    }
}

impl<T> Snapshot<T> {
    pub fn iter(&self) -> impl Iterator<Item = (&String, &T)> {
        self.entries.iter()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Indicator {
    Ringing,
    Online,
    Offline,
}

impl Indicator {
    pub fn of(device: &DeviceRecord) -> Self {
        if device.ringring {
            Indicator::Ringing
        } else if device.is_online {
            Indicator::Online
        } else {
            Indicator::Offline
        }
    }

    pub fn css_class(self) -> &'static str {
        match self {
            Indicator::Ringing => "ringing",
            Indicator::Online => "online",
            Indicator::Offline => "offline",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeviceCard {
    pub name: String,
    pub indicator: Indicator,
    pub signal: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PermissionToggle {
    pub device: String,
    pub checked: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserRow {
    pub uid: String,
    pub label: String,
    pub toggles: Vec<PermissionToggle>,
}

pub fn signal_text(device: &DeviceRecord) -> String {
    if !device.is_online {
        return "---".to_string();
    }
    match device.wifi_rssi {
        Some(rssi) => format!("{rssi} dBm"),
        None => "N/A dBm".to_string(),
    }
}

pub fn device_cards(snapshot: &Snapshot<DeviceRecord>) -> Vec<DeviceCard> {
    snapshot
        .iter()
        .map(|(name, device)| DeviceCard {
            name: name.clone(),
            indicator: Indicator::of(device),
            signal: signal_text(device),
        })
        .collect()
}

pub fn user_rows(snapshot: &Snapshot<UserRecord>, devices: &[String]) -> Vec<UserRow> {
    snapshot
        .iter()
        .map(|(uid, user)| UserRow {
            uid: uid.clone(),
            label: user.label().to_string(),
            toggles: devices
                .iter()
                .map(|device| PermissionToggle {
                    device: device.clone(),
                    checked: user.allows(device),
                })
                .collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn roster() -> Vec<String> {
        vec!["Donosti".to_string(), "Lasarte".to_string()]
    }

    #[test]
    fn ringing_wins_over_online_and_offline() {
        for online in [true, false] {
            let device = DeviceRecord {
                is_online: online,
                ringring: true,
                wifi_rssi: Some(-60.0),
            };
            assert_eq!(Indicator::of(&device), Indicator::Ringing);
        }
    }

    #[test]
    fn online_device_shows_signal_or_placeholder() {
        let mut device = DeviceRecord {
            is_online: true,
            ringring: false,
            wifi_rssi: Some(-42.0),
        };
        assert_eq!(Indicator::of(&device), Indicator::Online);
        assert_eq!(signal_text(&device), "-42 dBm");
        device.wifi_rssi = None;
        assert_eq!(signal_text(&device), "N/A dBm");
    }

    #[test]
    fn zero_signal_is_a_reading() {
        let device = DeviceRecord {
            is_online: true,
            ringring: false,
            wifi_rssi: Some(0.0),
        };
        assert_eq!(signal_text(&device), "0 dBm");
    }

    #[test]
    fn offline_device_hides_signal_even_when_ringing() {
        let device = DeviceRecord {
            is_online: false,
            ringring: true,
            wifi_rssi: Some(-30.0),
        };
        assert_eq!(signal_text(&device), "---");
    }

    #[test]
    fn donosti_online_snapshot_yields_one_card() {
        let snapshot = Snapshot::from_value(&json!({
            "Donosti": {"is_online": true, "ringring": false, "wifi_rssi": -42}
        }));
        let cards = device_cards(&snapshot);
        assert_eq!(
            cards,
            vec![DeviceCard {
                name: "Donosti".into(),
                indicator: Indicator::Online,
                signal: "-42 dBm".into(),
            }]
        );
    }

    #[test]
    fn lasarte_offline_snapshot_yields_one_card() {
        let snapshot = Snapshot::from_value(&json!({"Lasarte": {"is_online": false}}));
        let cards = device_cards(&snapshot);
        assert_eq!(cards.len(), 1);
        assert_eq!(cards[0].indicator, Indicator::Offline);
        assert_eq!(cards[0].signal, "---");
    }

    #[test]
    fn devices_keep_store_key_order() {
        let snapshot = Snapshot::<DeviceRecord>::from_value(&json!({
            "Zarautz": {}, "Azpeitia": {}, "Lasarte": {}
        }));
        let names: Vec<_> = device_cards(&snapshot).into_iter().map(|c| c.name).collect();
        assert_eq!(names, vec!["Azpeitia", "Lasarte", "Zarautz"]);
    }

    #[test]
    fn alias_wins_over_email() {
        let mut user = UserRecord {
            alias: Some("Miren".into()),
            email: "miren@x.com".into(),
            ..UserRecord::default()
        };
        assert_eq!(user.label(), "Miren");
        user.alias = None;
        assert_eq!(user.label(), "miren@x.com");
    }

    #[test]
    fn empty_or_non_string_alias_falls_back_to_email() {
        let snapshot = Snapshot::<UserRecord>::from_value(&json!({
            "u1": {"email": "a@x.com", "alias": ""},
            "u2": {"email": "b@x.com", "alias": 7}
        }));
        let labels: Vec<_> = snapshot.iter().map(|(_, user)| user.label()).collect();
        assert_eq!(labels, vec!["a@x.com", "b@x.com"]);
    }

    #[test]
    fn sparse_permissions_default_to_unchecked() {
        let snapshot = Snapshot::from_value(&json!({
            "u1": {"email": "a@x.com", "permissions": {"Donosti": true}}
        }));
        let rows = user_rows(&snapshot, &roster());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].label, "a@x.com");
        assert_eq!(
            rows[0].toggles,
            vec![
                PermissionToggle {
                    device: "Donosti".into(),
                    checked: true,
                },
                PermissionToggle {
                    device: "Lasarte".into(),
                    checked: false,
                },
            ]
        );
    }

    #[test]
    fn loose_permission_values_keep_the_row() {
        let snapshot = Snapshot::from_value(&json!({
            "u1": {"email": "a@x.com", "permissions": {"Donosti": true, "Old": "yes"}},
            "u2": {"email": "b@x.com", "permissions": {"Donosti": 1, "Lasarte": 0}},
            "u3": {"email": "c@x.com", "permissions": "none"}
        }));
        let rows = user_rows(&snapshot, &roster());
        let checked: Vec<Vec<bool>> = rows
            .iter()
            .map(|row| row.toggles.iter().map(|t| t.checked).collect())
            .collect();
        assert_eq!(
            checked,
            vec![vec![true, false], vec![true, false], vec![false, false]]
        );
    }

    #[test]
    fn loose_device_fields_are_coerced() {
        let snapshot = Snapshot::<DeviceRecord>::from_value(&json!({
            "Donosti": {"is_online": true, "wifi_rssi": "-42"},
            "Lasarte": {"is_online": 1, "ringring": "", "wifi_rssi": "weak"}
        }));
        let cards = device_cards(&snapshot);
        assert_eq!(cards.len(), 2);
        assert_eq!(cards[0].signal, "-42 dBm");
        assert_eq!(cards[1].indicator, Indicator::Online);
        assert_eq!(cards[1].signal, "N/A dBm");
    }

    #[test]
    fn non_object_members_are_skipped() {
        let snapshot = Snapshot::<DeviceRecord>::from_value(&json!({
            "Donosti": 5,
            "Lasarte": {"is_online": true},
            "Zarautz": null
        }));
        let names: Vec<_> = snapshot.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["Lasarte"]);
    }

    #[test]
    fn null_collection_is_empty() {
        let snapshot = Snapshot::<UserRecord>::from_value(&Value::Null);
        assert_eq!(snapshot.iter().count(), 0);
    }
}
