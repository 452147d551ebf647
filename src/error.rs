use std::time::Duration;
use thiserror::Error;

/// Result type for everything that talks to the external tool.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("`{command}` failed ({}): {stderr}", exit_label(.status))]
    ExternalTool {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("Invalid image file")]
    InvalidImage,

    #[error("Unable to parse identify output: {output}")]
    Parse { output: String },

    #[error("Output exceeded max buffer of {limit} bytes")]
    MaxBufferExceeded { limit: usize },

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit code {code}"),
        None => "killed by signal".to_string(),
    }
}
