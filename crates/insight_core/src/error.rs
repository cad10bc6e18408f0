use std::path::PathBuf;
use thiserror::Error;

/// Fatal bootstrap failures. Everything downstream of a loaded store
/// degrades instead of erroring.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("data directory {} is not readable", .0.display())]
    DataDirUnreadable(PathBuf),
    #[error("failed to load dataset {name} from {}: {source}", .path.display())]
    Dataset {
        name: &'static str,
        path: PathBuf,
        #[source]
        source: duckdb::Error,
    },
    #[error("tabular engine error: {0}")]
    Engine(#[from] duckdb::Error),
}

/// Failures talking to the LLM backend. Carried verbatim into fallback
/// answers, never retried automatically.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("request to LLM backend failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LLM backend returned {status}: {body}")]
    Backend { status: u16, body: String },
    #[error("malformed completion response: {0}")]
    Malformed(String),
}
