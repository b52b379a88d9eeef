use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DotKitError {
    #[error("Source tree not found: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Source tree has no plugins: {path}")]
    EmptySourceTree { path: PathBuf },

    #[error("Target directory does not exist: {path}")]
    TargetNotFound { path: PathBuf },

    #[error("Profile not found: {name}")]
    ProfileNotFound { name: String },

    #[error("Profile '{profile}' references unknown plugin '{plugin}'")]
    ProfileReferencesMissingPlugin { profile: String, plugin: String },

    #[error("Plugin not found: {name}")]
    PluginNotFound { name: String },

    #[error("Plugin manifest missing: {path}")]
    ManifestMissing { path: PathBuf },

    #[error("Invalid plugin manifest {path}: {message}")]
    ManifestInvalid { path: PathBuf, message: String },

    #[error("Invalid fragment {path}: {message}")]
    FragmentInvalid { path: PathBuf, message: String },

    #[error("Conflict detected - destination exists and is not a dot-kit reference: {path}")]
    Conflict { path: PathBuf },

    #[error("Failed to parse {path}: {message}")]
    DocumentParse { path: PathBuf, message: String },

    #[error("Unexpected document shape in {path}: {message}")]
    DocumentShape { path: PathBuf, message: String },

    #[error("Another dot-kit process is modifying {path}")]
    Locked { path: PathBuf },

    #[error("Config parse error in {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Unknown config key: {key}")]
    ConfigKeyNotFound { key: String },

    #[error("Git error: {0}")]
    Git(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, DotKitError>;

impl DotKitError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ProfileNotFound { .. }
            | Self::ProfileReferencesMissingPlugin { .. }
            | Self::PluginNotFound { .. } => 2,
            Self::TargetNotFound { .. } | Self::SourceNotFound { .. } => 3,
            Self::EmptySourceTree { .. } => 4,
            Self::Locked { .. } => 5,
            Self::Conflict { .. } => 6,
            _ => 1,
        }
    }
}
