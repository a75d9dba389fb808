use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::fits::DecodeError;

#[derive(Debug, Error, Diagnostic)]
pub enum SpectraError {
    #[error("invalid Gaia source id: {0}")]
    InvalidGaiaId(String),

    #[error("unknown survey: {0}")]
    UnknownSurvey(String),

    #[error("object could not be resolved: {0}")]
    #[diagnostic(help("check the spelling or pass a Gaia DR3 id, e.g. \"Gaia DR3 1234567890\""))]
    ResolutionFailed(String),

    #[error("spectrum not found in any source for {0}")]
    NotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("SIMBAD request failed: {0}")]
    SimbadHttp(String),

    #[error("SIMBAD returned status {status}: {message}")]
    SimbadStatus { status: u16, message: String },

    #[error("SIMBAD: {0}")]
    SimbadQuery(String),

    #[error("Gaia archive request failed: {0}")]
    GaiaHttp(String),

    #[error("Gaia archive returned status {status}: {message}")]
    GaiaStatus { status: u16, message: String },

    #[error("LAMOST request failed: {0}")]
    LamostHttp(String),

    #[error("LAMOST returned status {status}: {message}")]
    LamostStatus { status: u16, message: String },

    #[error("GALAH request failed: {0}")]
    GalahHttp(String),

    #[error("RAVE request failed: {0}")]
    RaveHttp(String),

    #[error("RAVE returned status {status}: {message}")]
    RaveStatus { status: u16, message: String },

    #[error("RAVE TAP job {phase}: {message}")]
    TapJob { phase: String, message: String },

    #[error("malformed table payload: {0}")]
    Table(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("{0} adapter stopped unexpectedly")]
    AdapterPanicked(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
