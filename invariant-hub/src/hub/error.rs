//! Error types for hub operations.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur while managing projects.
#[derive(Debug, Error)]
pub enum HubError {
    /// The hosting API could not be reached or answered unusably.
    #[error("Network error: {message}")]
    Network { message: String },

    /// The repository, owner or project does not exist.
    #[error("{what} not found")]
    NotFound { what: String },

    /// The repository exists but has published no releases.
    #[error("No releases found for repository '{repo}'")]
    NoReleases { repo: String },

    /// The newest release carries no installable package.
    #[error("Release '{tag}' has no package asset ({expected})")]
    NoPackageAsset { tag: String, expected: String },

    /// Fetching a release asset failed.
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    /// Unpacking a downloaded package failed.
    #[error("Failed to extract {path}: {message}")]
    Extract { path: String, message: String },

    /// The project has no complete installation.
    #[error("Project '{project_id}' is not installed")]
    NotInstalled { project_id: String },

    /// The entry point could not be started.
    #[error("Failed to launch {}: {source}", path.display())]
    Launch {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Removing installed files failed.
    #[error("Failed to uninstall {}: {source}", path.display())]
    Uninstall {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A project with this id is already registered.
    #[error("Project '{id}' already exists")]
    DuplicateId { id: String },

    /// A project descriptor failed validation.
    #[error("Invalid project: {reason}")]
    InvalidDescriptor { reason: String },

    /// The configuration document is not valid JSON for this schema.
    #[error("Failed to parse config at {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Reading or writing the configuration document failed.
    #[error("Config error: {message}")]
    Config { message: String },

    /// Any other filesystem failure.
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

/// Machine-readable category of a [`HubError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HubErrorKind {
    Network,
    NotFound,
    NoReleases,
    NoPackageAsset,
    Download,
    Extract,
    NotInstalled,
    Launch,
    Uninstall,
    DuplicateId,
    InvalidDescriptor,
    ConfigParse,
    Config,
    Io,
}

impl HubError {
    /// Category of this error.
    pub fn kind(&self) -> HubErrorKind {
        match self {
            Self::Network { .. } => HubErrorKind::Network,
            Self::NotFound { .. } => HubErrorKind::NotFound,
            Self::NoReleases { .. } => HubErrorKind::NoReleases,
            Self::NoPackageAsset { .. } => HubErrorKind::NoPackageAsset,
            Self::Download { .. } => HubErrorKind::Download,
            Self::Extract { .. } => HubErrorKind::Extract,
            Self::NotInstalled { .. } => HubErrorKind::NotInstalled,
            Self::Launch { .. } => HubErrorKind::Launch,
            Self::Uninstall { .. } => HubErrorKind::Uninstall,
            Self::DuplicateId { .. } => HubErrorKind::DuplicateId,
            Self::InvalidDescriptor { .. } => HubErrorKind::InvalidDescriptor,
            Self::ConfigParse { .. } => HubErrorKind::ConfigParse,
            Self::Config { .. } => HubErrorKind::Config,
            Self::Io { .. } => HubErrorKind::Io,
        }
    }

    pub(crate) fn project_not_found(id: &str) -> Self {
        Self::NotFound {
            what: format!("Project '{id}'"),
        }
    }

    pub(crate) fn extract(path: &std::path::Path, err: impl std::fmt::Display) -> Self {
        Self::Extract {
            path: path.display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Result type for hub operations.
pub type Result<T> = std::result::Result<T, HubError>;
