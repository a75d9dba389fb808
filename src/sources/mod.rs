//! Archive adapters. Each one turns an [`ObjectIdentity`] into zero or more
//! CSV artifacts and never lets a failure escape to its siblings.

use camino::Utf8PathBuf;
use tracing::{info, warn};

use crate::domain::{ObjectIdentity, SourceName};
use crate::error::SpectraError;
use crate::store::ArtifactStore;

pub mod gaia;
pub mod galah;
pub mod lamost;
pub mod rave;

pub use gaia::{GaiaClient, GaiaDataLinkClient, GaiaRvsSource};
pub use galah::{GalahClient, GalahFilter, GalahHttpClient, GalahSource};
pub use lamost::{LamostClient, LamostHttpClient, LamostSource};
pub use rave::{ConeSearch, RaveClient, RaveSource, RaveTapClient};

pub trait SpectrumSource: Send + Sync {
    fn name(&self) -> SourceName;
    fn fetch(&self, identity: &ObjectIdentity, store: &ArtifactStore) -> SourceOutcome;
}

/// What a single adapter produced for one identity.
#[derive(Debug)]
pub enum SourceOutcome {
    Found(Vec<Utf8PathBuf>),
    /// Nothing to report, with the reason.
    Empty(String),
    Failed(SpectraError),
}

impl SourceOutcome {
    /// Folds an adapter's internal result, logging the outcome once.
    pub fn from_result(
        source: SourceName,
        result: Result<Vec<Utf8PathBuf>, SpectraError>,
        empty_reason: &str,
    ) -> Self {
        match result {
            Ok(paths) if paths.is_empty() => {
                info!(source = %source, "{empty_reason}");
                SourceOutcome::Empty(empty_reason.to_string())
            }
            Ok(paths) => {
                info!(source = %source, artifacts = paths.len(), "spectra written");
                SourceOutcome::Found(paths)
            }
            Err(err) => {
                warn!(source = %source, "source failed: {err}");
                SourceOutcome::Failed(err)
            }
        }
    }

    pub fn empty(source: SourceName, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        info!(source = %source, "{reason}");
        SourceOutcome::Empty(reason)
    }

    pub fn artifacts(&self) -> &[Utf8PathBuf] {
        match self {
            SourceOutcome::Found(paths) => paths,
            SourceOutcome::Empty(_) | SourceOutcome::Failed(_) => &[],
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            SourceOutcome::Found(_) => "found",
            SourceOutcome::Empty(_) => "empty",
            SourceOutcome::Failed(_) => "failed",
        }
    }

    pub fn detail(&self) -> Option<String> {
        match self {
            SourceOutcome::Found(_) => None,
            SourceOutcome::Empty(reason) => Some(reason.clone()),
            SourceOutcome::Failed(err) => Some(err.to_string()),
        }
    }
}

/// Result of streaming one remote file to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadStatus {
    Saved,
    /// The archive answered with a non-success status.
    Missing(u16),
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn empty_success_is_reported_as_empty() {
        let outcome = SourceOutcome::from_result(SourceName::Lamost, Ok(Vec::new()), "no match");
        assert_matches!(outcome, SourceOutcome::Empty(ref reason) if reason == "no match");
        assert!(outcome.artifacts().is_empty());
    }

    #[test]
    fn failures_contribute_no_artifacts() {
        let outcome = SourceOutcome::from_result(
            SourceName::Rave,
            Err(SpectraError::RaveHttp("offline".to_string())),
            "unused",
        );
        assert_eq!(outcome.status(), "failed");
        assert!(outcome.artifacts().is_empty());
        assert_eq!(outcome.detail().as_deref(), Some("RAVE request failed: offline"));
    }
}
