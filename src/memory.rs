use crate::auth::{AuthProvider, Identity};
use crate::error::{AuthError, StoreError};
use crate::store::{self, LiveStore, Subscription};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::watch;

pub const DEMO_SEED: &str = include_str!("../demo/seed.json");

#[derive(Clone, Debug, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
    pub uid: String,
}

/// Accounts plus the initial database tree for the in-process backend.
#[derive(Debug, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub data: Value,
}

impl Seed {
    pub fn parse(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Invalid seed document")
    }

    pub fn load(path: Option<&str>) -> Result<Self> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Unable to read seed file {path}"))?;
                Self::parse(&raw)
            }
            None => Self::parse(DEMO_SEED),
        }
    }
}

/// Database tree held in a single watch channel; every write publishes a new
/// root and subscribers project their own path out of it.
pub struct MemoryStore {
    tree: watch::Sender<Option<Value>>,
}

impl MemoryStore {
    pub fn new(data: Value) -> Self {
        Self {
            tree: watch::Sender::new(Some(data)),
        }
    }

    #[cfg(test)]
    pub fn listener_count(&self) -> usize {
        self.tree.receiver_count()
    }
}

#[async_trait]
impl LiveStore for MemoryStore {
    async fn read_once(&self, path: &str) -> Result<Value, StoreError> {
        let segments = store::split_path(path);
        let tree = self.tree.borrow();
        Ok(tree
            .as_ref()
            .map(|root| store::value_at(root, &segments).clone())
            .unwrap_or(Value::Null))
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        Ok(Subscription::new(self.tree.subscribe(), store::split_path(path)))
    }

    async fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = store::split_path(path);
        self.tree.send_modify(|root| {
            let root = root.get_or_insert(Value::Null);
            store::set_at(root, &segments, value);
        });
        Ok(())
    }
}

/// Password accounts from the seed. Each uid counts its open sign-ins so one
/// session signing out leaves the others alone.
pub struct MemoryAuth {
    accounts: HashMap<String, Account>,
    signed_in: RwLock<HashMap<String, usize>>,
}

impl MemoryAuth {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self {
            accounts: accounts
                .into_iter()
                .map(|account| (account.email.to_ascii_lowercase(), account))
                .collect(),
            signed_in: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub fn is_signed_in(&self, uid: &str) -> bool {
        self.signed_in
            .read()
            .expect("memory auth poisoned")
            .contains_key(uid)
    }
}

#[async_trait]
impl AuthProvider for MemoryAuth {
    async fn sign_in(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let account = self
            .accounts
            .get(&email.trim().to_ascii_lowercase())
            .filter(|account| account.password == password)
            .ok_or(AuthError::Rejected)?;
        self.signed_in
            .write()
            .expect("memory auth poisoned")
            .entry(account.uid.clone())
            .and_modify(|count| *count += 1)
            .or_insert(1);
        Ok(Identity {
            uid: account.uid.clone(),
            email: account.email.clone(),
        })
    }

    async fn sign_out(&self, identity: &Identity) {
        let mut signed_in = self.signed_in.write().expect("memory auth poisoned");
        if let Some(count) = signed_in.get_mut(&identity.uid) {
            *count -= 1;
            if *count == 0 {
                signed_in.remove(&identity.uid);
            }
        }
    }
}
