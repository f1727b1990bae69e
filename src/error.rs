use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::download::DownloadFailure;

#[derive(Debug, Error, Diagnostic)]
pub enum DownloaderError {
    #[error("output directory is not set")]
    #[diagnostic(help("pass the output directory as the first positional argument"))]
    MissingOutputDirectory,

    #[error("required input is missing: {0}")]
    MissingInput(&'static str),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to read table {path}: {message}")]
    Table { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("gene service request failed: {0}")]
    GeneQueryHttp(String),

    #[error("gene service returned status {status}: {message}")]
    GeneQueryStatus { status: u16, message: String },

    #[error("image request failed: {0}")]
    DownloadHttp(String),

    #[error("{} image downloads still failing after {retries} retries", .failures.len())]
    DownloadsExhausted {
        retries: usize,
        failures: Vec<DownloadFailure>,
    },
}

impl DownloaderError {
    pub fn exit_code(&self) -> u8 {
        match self {
            DownloaderError::MissingOutputDirectory
            | DownloaderError::MissingInput(_)
            | DownloaderError::InvalidConfig(_)
            | DownloaderError::ConfigRead(_)
            | DownloaderError::ConfigParse(_) => 2,
            DownloaderError::GeneQueryHttp(_)
            | DownloaderError::GeneQueryStatus { .. }
            | DownloaderError::DownloadHttp(_)
            | DownloaderError::DownloadsExhausted { .. } => 3,
            DownloaderError::Table { .. } | DownloaderError::Filesystem(_) => 1,
        }
    }
}
