use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How a catalog line is matched against a survey id.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogMatch {
    /// The id must equal one comma-delimited field of the line.
    #[default]
    Field,
    /// The id may appear anywhere in the line.
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    pub key: String,
    pub line: String,
}

/// Maps a survey-native id to an archive-internal record key.
pub trait CatalogLookup: Send + Sync {
    fn lookup(&self, survey_native_id: &str) -> Option<CatalogRecord>;
}

/// Flat, comma-delimited reference catalog whose first field is the record key.
///
/// Every lookup rescans the file; nothing is kept in memory between calls.
#[derive(Debug, Clone)]
pub struct FileCatalog {
    path: Utf8PathBuf,
    mode: CatalogMatch,
}

impl FileCatalog {
    pub fn new(path: impl Into<Utf8PathBuf>, mode: CatalogMatch) -> Self {
        Self {
            path: path.into(),
            mode,
        }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl CatalogLookup for FileCatalog {
    fn lookup(&self, survey_native_id: &str) -> Option<CatalogRecord> {
        lookup(survey_native_id, &self.path, self.mode)
    }
}

pub fn lookup(
    survey_native_id: &str,
    catalog_path: &Utf8Path,
    mode: CatalogMatch,
) -> Option<CatalogRecord> {
    let needle = survey_native_id.trim();
    if needle.is_empty() {
        return None;
    }
    let file = match File::open(catalog_path.as_std_path()) {
        Ok(file) => file,
        Err(err) => {
            warn!(catalog = %catalog_path, "cannot open catalog: {err}");
            return None;
        }
    };
    for line in BufReader::new(file).lines() {
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!(catalog = %catalog_path, "catalog read failed: {err}");
                return None;
            }
        };
        if line_matches(&line, needle, mode) {
            let key = line.split(',').next().unwrap_or_default().trim().to_string();
            if key.is_empty() {
                continue;
            }
            debug!(catalog = %catalog_path, id = needle, key = %key, "catalog hit");
            return Some(CatalogRecord { key, line });
        }
    }
    warn!(catalog = %catalog_path, id = needle, "id not found in catalog");
    None
}

fn line_matches(line: &str, needle: &str, mode: CatalogMatch) -> bool {
    match mode {
        CatalogMatch::Substring => line.contains(needle),
        CatalogMatch::Field => line
            .split(',')
            .any(|field| field.trim().trim_matches('"') == needle),
    }
}
