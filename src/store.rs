use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::domain::SpectrumSeries;
use crate::error::SpectraError;

/// Output and scratch locations for one pipeline run.
///
/// Artifacts land in `output_root`; transient downloads live in
/// `scratch_root` only for as long as their [`NamedTempFile`] handle.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_root: Utf8PathBuf,
    scratch_root: Utf8PathBuf,
}

impl ArtifactStore {
    pub fn new_with_paths(output_root: Utf8PathBuf, scratch_root: Utf8PathBuf) -> Self {
        Self {
            output_root,
            scratch_root,
        }
    }

    /// `<data dir>/spectrator/spectra_csv` and `<data dir>/spectrator/scratch`.
    pub fn default_root() -> Result<Utf8PathBuf, SpectraError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_local_dir().join("spectrator")).ok()
            })
            .ok_or_else(|| SpectraError::Filesystem("unable to resolve data directory".to_string()))
    }

    pub fn output_root(&self) -> &Utf8Path {
        &self.output_root
    }

    pub fn scratch_root(&self) -> &Utf8Path {
        &self.scratch_root
    }

    pub fn ensure_roots(&self) -> Result<(), SpectraError> {
        for root in [&self.output_root, &self.scratch_root] {
            fs::create_dir_all(root.as_std_path())
                .map_err(|err| SpectraError::Filesystem(format!("create {root}: {err}")))?;
        }
        Ok(())
    }

    pub fn artifact_path(&self, file_name: &str) -> Utf8PathBuf {
        self.output_root.join(sanitize_file_name(file_name))
    }

    pub fn write_series(
        &self,
        file_name: &str,
        series: &SpectrumSeries,
    ) -> Result<Utf8PathBuf, SpectraError> {
        let path = self.artifact_path(file_name);
        write_bytes_atomic(&path, series.to_csv().as_bytes())?;
        Ok(path)
    }

    pub fn write_text(&self, file_name: &str, content: &str) -> Result<Utf8PathBuf, SpectraError> {
        let path = self.artifact_path(file_name);
        write_bytes_atomic(&path, content.as_bytes())?;
        Ok(path)
    }

    pub fn write_json<T: Serialize>(
        &self,
        file_name: &str,
        value: &T,
    ) -> Result<Utf8PathBuf, SpectraError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        let path = self.artifact_path(file_name);
        write_bytes_atomic(&path, &content)?;
        Ok(path)
    }

    /// A transient file in the scratch root, removed when the handle drops.
    pub fn scratch_file(&self, prefix: &str, suffix: &str) -> Result<NamedTempFile, SpectraError> {
        fs::create_dir_all(self.scratch_root.as_std_path())
            .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
        Builder::new()
            .prefix(prefix)
            .suffix(suffix)
            .tempfile_in(self.scratch_root.as_std_path())
            .map_err(|err| SpectraError::Filesystem(err.to_string()))
    }
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SpectraError> {
    let parent = path
        .parent()
        .ok_or_else(|| SpectraError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
    let mut temp = Builder::new()
        .prefix(".spectrator-write")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SpectraError::Filesystem(err.to_string()))?;
    Ok(())
}

/// Keeps remote-supplied ids from escaping the output root.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned = name
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || matches!(ch, '.' | '_' | '-') {
                ch
            } else {
                '-'
            }
        })
        .collect::<String>();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}
