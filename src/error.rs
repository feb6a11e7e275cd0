use std::path::PathBuf;

/// Fatal errors that stop a test before or during startup.
///
/// Per-request failures (transport errors, timeouts, status mismatches) are
/// never represented here; they travel as values on
/// [`RequestEvent`](crate::metrics::RequestEvent) so a failing request can
/// never unwind a worker loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read script {path:?}: {source}")]
    ScriptRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse script {path:?}: {source}")]
    ScriptParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("script {path:?} contains no actions")]
    ScriptEmpty { path: PathBuf },

    #[error("action {action:?}: invalid duration {value:?} in field {field}")]
    InvalidDuration {
        action: String,
        field: &'static str,
        value: String,
    },

    #[error("failed to read credentials {path:?}: {source}")]
    CredentialsRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("credentials {path:?}, line {line}: {reason}")]
    CredentialsParse {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("login to {url} failed: {source}")]
    LoginRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("login to {url} failed with status {status}")]
    LoginStatus { url: String, status: u16 },

    #[error("failed to write report {path:?}: {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
