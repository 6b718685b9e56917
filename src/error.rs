use thiserror::Error;

/// Failures the console itself distinguishes. None of them end the process.
#[derive(Debug, Error)]
pub enum ConsoleError {
    /// Credentials were rejected or the provider was unreachable.
    #[error("sign-in failed")]
    AuthFailure {
        #[source]
        source: AuthError,
    },
    /// Signed in, but the role lookup did not yield the admin role.
    #[error("identity {uid} is not allowed into the admin console")]
    AuthorizationDenied { uid: String },
    /// A permission write was rejected or lost.
    #[error("permission write to {path} failed")]
    WriteFailure {
        path: String,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("request for {path} failed")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("store answered {status} for {path}")]
    Status { path: String, status: u16 },
    #[error("invalid path {path:?}")]
    InvalidPath { path: String },
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("credentials rejected")]
    Rejected,
    #[error("auth provider unreachable")]
    Transport(#[from] reqwest::Error),
}
