use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Missing configuration key '{key}' in command template")]
    Render { key: String },

    #[error("No hosts found for role: {0}")]
    UnknownRole(String),

    #[error("Hook cycle detected: {0}")]
    Cycle(String),

    #[error("Unknown task: {0}")]
    UnknownTask(String),

    #[error("Invalid deployment profile: {0}")]
    Profile(String),

    #[error("Command failed on {host} with exit code {exit_code}")]
    RemoteCommand { host: String, exit_code: i32 },

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),
}

impl Error {
    /// Process exit code reported by the CLI, one distinct code per
    /// failure kind so scripts can branch on the reason a run stopped.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Render { .. } => 2,
            Error::UnknownRole(_) => 3,
            Error::Cycle(_) => 4,
            Error::RemoteCommand { .. } => 5,
            Error::Timeout(_) => 6,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
