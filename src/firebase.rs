use crate::auth::{AuthProvider, Identity};
use crate::config::FirebaseConfig;
use crate::error::{AuthError, StoreError};
use crate::store::{self, LiveStore, Subscription};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tokio::sync::watch;

/// Realtime Database over its REST and event-stream endpoints.
#[derive(Clone)]
pub struct RealtimeDatabase {
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
    retry: Duration,
}

impl RealtimeDatabase {
    pub fn new(config: &FirebaseConfig, retry: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.database_url.trim_end_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
            retry,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}.json", self.base_url, store::split_path(path).join("/"));
        let builder = self.client.request(method, url);
        match &self.auth_token {
            Some(token) => builder.query(&[("auth", token)]),
            None => builder,
        }
    }

    async fn send(
        &self,
        path: &str,
        builder: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, StoreError> {
        let response = builder.send().await.map_err(|source| StoreError::Request {
            path: path.to_string(),
            source,
        })?;
        if !response.status().is_success() {
            return Err(StoreError::Status {
                path: path.to_string(),
                status: response.status().as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl LiveStore for RealtimeDatabase {
    async fn read_once(&self, path: &str) -> Result<Value, StoreError> {
        let response = self
            .send(path, self.request(reqwest::Method::GET, path))
            .await?;
        response.json().await.map_err(|source| StoreError::Request {
            path: path.to_string(),
            source,
        })
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let (tx, rx) = watch::channel(None);
        let task = tokio::spawn(follow(self.clone(), path.to_string(), tx));
        Ok(Subscription::new(rx, Vec::new()).with_feeder(task))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let builder = self.request(reqwest::Method::PUT, path).json(&value);
        self.send(path, builder).await?;
        Ok(())
    }
}

enum StreamEnd {
    Closed,
    Revoked,
}

/// Keeps `tx` holding the latest value at `path`, reconnecting after
/// transport failures until every receiver is gone.
async fn follow(db: RealtimeDatabase, path: String, tx: watch::Sender<Option<Value>>) {
    loop {
        let builder = db
            .request(reqwest::Method::GET, &path)
            .header(ACCEPT, "text/event-stream");
        match db.send(&path, builder).await {
            Ok(response) => match pump(response, &tx).await {
                Ok(StreamEnd::Revoked) => {
                    tracing::warn!("Stream for {path} cancelled by the database");
                    return;
                }
                Ok(StreamEnd::Closed) => {
                    tracing::warn!("Stream for {path} closed, reconnecting");
                }
                Err(err) => {
                    tracing::warn!("Stream for {path} failed: {err}, reconnecting");
                }
            },
            Err(err) => {
                tracing::warn!("Unable to open stream for {path}: {err:?}");
            }
        }
        if tx.is_closed() {
            return;
        }
        tokio::time::sleep(db.retry).await;
    }
}

async fn pump(
    response: reqwest::Response,
    tx: &watch::Sender<Option<Value>>,
) -> Result<StreamEnd, reqwest::Error> {
    let mut stream = response.bytes_stream();
    let mut parser = EventStreamParser::default();
    let mut tree = Value::Null;
    let mut loaded = false;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        for event in parser.feed(&chunk) {
            match event.name.as_str() {
                "put" | "patch" => {
                    let change = match serde_json::from_str::<StreamChange>(&event.data) {
                        Ok(change) => change,
                        Err(err) => {
                            tracing::warn!("Discarding malformed {} event: {err}", event.name);
                            continue;
                        }
                    };
                    apply_change(&mut tree, &event.name, change);
                    loaded = true;
                }
                "keep-alive" => continue,
                "cancel" | "auth_revoked" => return Ok(StreamEnd::Revoked),
                other => {
                    tracing::debug!("Ignoring stream event {other}");
                    continue;
                }
            }
            if loaded {
                tx.send_replace(Some(tree.clone()));
            }
        }
        if tx.is_closed() {
            break;
        }
    }
    Ok(StreamEnd::Closed)
}

#[derive(Debug, Deserialize)]
struct StreamChange {
    path: String,
    #[serde(default)]
    data: Value,
}

fn apply_change(tree: &mut Value, kind: &str, change: StreamChange) {
    let base = store::split_path(&change.path);
    if kind == "patch" {
        if let Value::Object(children) = change.data {
            for (key, value) in children {
                let mut target = base.clone();
                target.push(key);
                store::set_at(tree, &target, value);
            }
        }
    } else {
        store::set_at(tree, &base, change.data);
    }
}

#[derive(Debug, PartialEq)]
pub struct ServerEvent {
    pub name: String,
    pub data: String,
}

/// Incremental `text/event-stream` decoder. Buffers raw bytes so multi-byte
/// characters split across chunks survive.
#[derive(Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    name: Option<String>,
    data: Vec<String>,
}

impl EventStreamParser {
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<ServerEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                if let Some(event) = self.dispatch() {
                    events.push(event);
                }
            } else if let Some(name) = line.strip_prefix("event:") {
                self.name = Some(name.trim().to_string());
            } else if let Some(data) = line.strip_prefix("data:") {
                self.data.push(data.strip_prefix(' ').unwrap_or(data).to_string());
            }
            // comments, id: and retry: carry nothing we use
        }
        events
    }

    fn dispatch(&mut self) -> Option<ServerEvent> {
        let name = self.name.take();
        if self.data.is_empty() && name.is_none() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(ServerEvent {
            name: name.unwrap_or_else(|| "message".to_string()),
            data,
        })
    }
}

/// Email/password sign-in against the Identity Toolkit REST API.
pub struct IdentityToolkit {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
}

impl IdentityToolkit {
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: format!(
                "{}/v1/accounts:signInWithPassword",
                config.auth_url.trim_end_matches('/')
            ),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl AuthProvider for IdentityToolkit {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", &self.api_key)])
            .json(&json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .send()
            .await?;
        if !response.status().is_success() {
            tracing::debug!("Identity Toolkit rejected sign-in with {}", response.status());
            return Err(AuthError::Rejected);
        }
        let body: SignInResponse = response.json().await?;
        Ok(Identity {
            uid: body.local_id,
            email: body.email.unwrap_or_else(|| email.to_string()),
        })
    }

    async fn sign_out(&self, identity: &Identity) {
        // Password sessions have no server-side revocation; the token is dropped with the session.
        tracing::debug!("Discarding Identity Toolkit token for {}", identity.uid);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parser_handles_events_split_across_chunks() {
        let mut parser = EventStreamParser::default();
        assert!(parser.feed(b"event: put\ndata: {\"path\":\"/\",").is_empty());
        let events = parser.feed(b"\"data\":{\"a\":1}}\n\nevent: keep-alive\ndata: null\n\n");
        assert_eq!(
            events,
            vec![
                ServerEvent {
                    name: "put".into(),
                    data: "{\"path\":\"/\",\"data\":{\"a\":1}}".into(),
                },
                ServerEvent {
                    name: "keep-alive".into(),
                    data: "null".into(),
                },
            ]
        );
    }

    #[test]
    fn parser_keeps_multibyte_text_intact() {
        let mut parser = EventStreamParser::default();
        let payload = "event: put\r\ndata: {\"path\":\"/a\",\"data\":\"Administración\"}\r\n\r\n";
        let bytes = payload.as_bytes();
        let split = payload.find('ó').unwrap() + 1;
        assert!(parser.feed(&bytes[..split]).is_empty());
        let events = parser.feed(&bytes[split..]);
        assert_eq!(events.len(), 1);
        assert!(events[0].data.contains("Administración"));
    }

    #[test]
    fn put_replaces_and_patch_merges() {
        let mut tree = Value::Null;
        apply_change(
            &mut tree,
            "put",
            StreamChange {
                path: "/".into(),
                data: json!({"Donosti": {"is_online": true}, "Lasarte": {"is_online": false}}),
            },
        );
        apply_change(
            &mut tree,
            "patch",
            StreamChange {
                path: "/Donosti".into(),
                data: json!({"ringring": true}),
            },
        );
        apply_change(
            &mut tree,
            "put",
            StreamChange {
                path: "/Lasarte".into(),
                data: Value::Null,
            },
        );
        assert_eq!(tree, json!({"Donosti": {"is_online": true, "ringring": true}}));
    }

    #[test]
    fn requests_target_json_endpoints_with_auth_token() {
        let db = RealtimeDatabase::new(
            &FirebaseConfig {
                database_url: "https://alarms.firebaseio.com/".into(),
                api_key: "key".into(),
                auth_token: Some("tok".into()),
                auth_url: "https://identitytoolkit.googleapis.com".into(),
            },
            Duration::from_secs(1),
        );
        let request = db
            .request(reqwest::Method::PUT, "users/u1/permissions/Donosti")
            .build()
            .unwrap();
        assert_eq!(
            request.url().as_str(),
            "https://alarms.firebaseio.com/users/u1/permissions/Donosti.json?auth=tok"
        );
    }
}
