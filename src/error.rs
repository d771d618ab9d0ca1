/// Error types for railyard
use std::path::PathBuf;

use thiserror::Error;

use crate::config::Diagnostics;
use crate::utils::polling::UnhealthyEntity;

/// Result alias used across the library
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Main error type for orchestration runs
#[derive(Debug, Error)]
pub enum Error {
    /// Decoding or validation failed; carries every problem found
    #[error("invalid configuration:\n{0}")]
    Configuration(Diagnostics),

    #[error("platform {name:?} is unknown (known platforms: {})", .known.join(", "))]
    UnknownPlatform { name: String, known: Vec<String> },

    /// Infrastructure input could not be rendered or written
    #[error(transparent)]
    Render(#[from] RenderError),

    /// The infrastructure tool exited non-zero or could not be started
    #[error("terraform {step} failed ({}):\n{output}", describe_status(.status))]
    InfrastructureTool {
        step: String,
        status: Option<i32>,
        output: String,
    },

    /// Another live executor holds the asset directory lock
    #[error(
        "asset directory is locked by {} (lock file {path}); remove the lock file if that process is gone",
        describe_owner(.owner)
    )]
    AssetDirLocked { path: PathBuf, owner: Option<u32> },

    /// A poll exhausted its attempt budget
    #[error("{check}: not ready after {attempts} attempts: {cause}")]
    ReadinessTimeout {
        check: String,
        attempts: u32,
        cause: String,
        unhealthy: Vec<UnhealthyEntity>,
    },

    #[error("installing component {component:?} failed")]
    ComponentInstall {
        component: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("kubeconfig {path}: {reason}")]
    Kubeconfig { path: PathBuf, reason: String },

    #[error("{context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Wrap an I/O error with a description of what was being attempted
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Unhealthy entities attached to a readiness timeout, empty otherwise
    pub fn unhealthy(&self) -> &[UnhealthyEntity] {
        match self {
            Self::ReadinessTimeout { unhealthy, .. } => unhealthy,
            _ => &[],
        }
    }
}

fn describe_status(status: &Option<i32>) -> String {
    match status {
        Some(code) => format!("exit status {}", code),
        None => "process did not run to completion".to_string(),
    }
}

fn describe_owner(owner: &Option<u32>) -> String {
    match owner {
        Some(pid) => format!("process {}", pid),
        None => "another operation".to_string(),
    }
}

/// Failures while turning a platform configuration into the tool's input file.
///
/// Every step of writing the file has its own variant so callers and tests can
/// tell a bad template apart from a full disk.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to parse template {name}")]
    Template {
        name: String,
        #[source]
        source: Box<handlebars::TemplateError>,
    },

    #[error("failed to execute template {name}")]
    Execute {
        name: String,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("at least one worker pool is required to render the cluster definition")]
    MissingDefaultPool,

    #[error("cannot expand asset directory {path:?}: {reason}")]
    AssetDir { path: String, reason: String },

    #[error("failed to create directory {path}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create file {path}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write template to file {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed closing file {path}")]
    Close {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
