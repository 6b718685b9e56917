use anyhow::{Context, Result, bail};
use std::env;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Backend {
    Memory,
    Firebase,
}

#[derive(Clone, Debug)]
pub struct FirebaseConfig {
    pub database_url: String,
    pub api_key: String,
    pub auth_token: Option<String>,
    pub auth_url: String,
}

pub struct AppConfig {
    pub http_bind: String,
    pub backend: Backend,
    pub seed_file: Option<String>,
    pub firebase: Option<FirebaseConfig>,
    pub admin_role: String,
    pub permission_devices: Vec<String>,
    pub stream_retry: Duration,
    pub session_ttl: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let backend = parse_backend(&env_var("BACKEND", "memory"))?;
        let firebase = match backend {
            Backend::Firebase => Some(FirebaseConfig {
                database_url: required("FIREBASE_DATABASE_URL")?,
                api_key: required("FIREBASE_API_KEY")?,
                auth_token: env::var("FIREBASE_AUTH_TOKEN").ok().filter(|t| !t.is_empty()),
                auth_url: env_var(
                    "FIREBASE_AUTH_URL",
                    "https://identitytoolkit.googleapis.com",
                ),
            }),
            Backend::Memory => None,
        };
        Ok(Self {
            http_bind: env_var("HTTP_BIND", "0.0.0.0:8080"),
            backend,
            seed_file: env::var("SEED_FILE").ok().filter(|p| !p.is_empty()),
            firebase,
            admin_role: env_var("ADMIN_ROLE", "admin"),
            permission_devices: parse_devices(&env_var("PERMISSION_DEVICES", "Donosti,Lasarte")),
            stream_retry: Duration::from_secs(
                env_var("STREAM_RETRY_SECS", "5").parse().unwrap_or(5),
            ),
            session_ttl: Duration::from_secs(
                env_var("SESSION_TTL_SECS", "43200").parse().unwrap_or(43200),
            ),
        })
    }
}

fn env_var(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn required(key: &str) -> Result<String> {
    env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .with_context(|| format!("{key} must be set when BACKEND=firebase"))
}

fn parse_backend(raw: &str) -> Result<Backend> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "memory" => Ok(Backend::Memory),
        "firebase" => Ok(Backend::Firebase),
        other => bail!("unknown BACKEND {other:?} (expected memory or firebase)"),
    }
}

fn parse_devices(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
