use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::catalog::CatalogMatch;
use crate::domain::SourceName;
use crate::error::SpectraError;
use crate::simbad::DEFAULT_SIMBAD_URL;
use crate::sources::gaia::DEFAULT_GAIA_URL;
use crate::sources::galah::DEFAULT_GALAH_URL;
use crate::sources::lamost::DEFAULT_LAMOST_URL;
use crate::sources::rave::{DEFAULT_RAVE_URL, RaveOptions};
use crate::store::ArtifactStore;

pub const DEFAULT_CONFIG_FILE: &str = "spectrator.json";
pub const RAVE_TOKEN_ENV: &str = "RAVE_TOKEN";
pub const OUTPUT_DIR_ENV: &str = "SPECTRATOR_OUTPUT_DIR";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub scratch_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub artifact_base_url: Option<String>,
    /// Enabled subset, e.g. `["gaia", "rave"]`. All sources when absent.
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub catalogs: CatalogSection,
    #[serde(default)]
    pub rave: RaveSection,
    #[serde(default)]
    pub endpoints: EndpointSection,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CatalogSection {
    #[serde(default)]
    pub lamost: Option<Utf8PathBuf>,
    #[serde(default)]
    pub galah: Option<Utf8PathBuf>,
    #[serde(default, rename = "match")]
    pub match_mode: Option<CatalogMatch>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RaveSection {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub search_radius_deg: Option<f64>,
    #[serde(default)]
    pub job_timeout_secs: Option<u64>,
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct EndpointSection {
    #[serde(default)]
    pub simbad: Option<String>,
    #[serde(default)]
    pub gaia: Option<String>,
    #[serde(default)]
    pub lamost: Option<String>,
    #[serde(default)]
    pub galah: Option<String>,
    #[serde(default)]
    pub rave: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub simbad: String,
    pub gaia: String,
    pub lamost: String,
    pub galah: String,
    pub rave: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            simbad: DEFAULT_SIMBAD_URL.to_string(),
            gaia: DEFAULT_GAIA_URL.to_string(),
            lamost: DEFAULT_LAMOST_URL.to_string(),
            galah: DEFAULT_GALAH_URL.to_string(),
            rave: DEFAULT_RAVE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub schema_version: u32,
    pub output_root: Utf8PathBuf,
    pub scratch_root: Utf8PathBuf,
    pub parallel: bool,
    pub artifact_base_url: Option<String>,
    pub sources: Vec<SourceName>,
    pub lamost_catalog: Option<Utf8PathBuf>,
    pub galah_catalog: Option<Utf8PathBuf>,
    pub catalog_match: CatalogMatch,
    pub rave: RaveOptions,
    pub endpoints: Endpoints,
}

impl Settings {
    pub fn store(&self) -> ArtifactStore {
        ArtifactStore::new_with_paths(self.output_root.clone(), self.scratch_root.clone())
    }

    pub fn is_enabled(&self, source: SourceName) -> bool {
        self.sources.contains(&source)
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `spectrator.json` when present, then applies the
    /// environment overrides. A missing default file means all defaults.
    pub fn resolve(path: Option<&str>) -> Result<Settings, SpectraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        let config = if path.is_none() && !config_path.exists() {
            Config::default()
        } else {
            let content = fs::read_to_string(&config_path)
                .map_err(|_| SpectraError::ConfigRead(config_path.clone()))?;
            serde_json::from_str(&content)
                .map_err(|err| SpectraError::ConfigParse(err.to_string()))?
        };

        let mut settings = Self::resolve_config(config)?;
        Self::apply_env(&mut settings);
        Ok(settings)
    }

    pub fn resolve_config(config: Config) -> Result<Settings, SpectraError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let default_root = match (&config.output_dir, &config.scratch_dir) {
            (Some(_), Some(_)) => None,
            _ => Some(ArtifactStore::default_root()?),
        };
        let output_root = match config.output_dir {
            Some(dir) => dir,
            None => default_root
                .as_ref()
                .map(|root| root.join("spectra_csv"))
                .unwrap_or_default(),
        };
        let scratch_root = match config.scratch_dir {
            Some(dir) => dir,
            None => default_root
                .as_ref()
                .map(|root| root.join("scratch"))
                .unwrap_or_default(),
        };

        let sources = match config.sources {
            Some(names) => parse_sources(&names)?,
            None => SourceName::ALL.to_vec(),
        };

        let defaults = RaveOptions::default();
        let rave = RaveOptions {
            token: config.rave.token.filter(|token| !token.trim().is_empty()),
            search_radius_deg: config
                .rave
                .search_radius_deg
                .unwrap_or(defaults.search_radius_deg),
            job_timeout: config
                .rave
                .job_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_timeout),
            poll_interval: config
                .rave
                .poll_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
        };

        let fallback = Endpoints::default();
        let endpoints = Endpoints {
            simbad: config.endpoints.simbad.unwrap_or(fallback.simbad),
            gaia: config.endpoints.gaia.unwrap_or(fallback.gaia),
            lamost: config.endpoints.lamost.unwrap_or(fallback.lamost),
            galah: config.endpoints.galah.unwrap_or(fallback.galah),
            rave: config.endpoints.rave.unwrap_or(fallback.rave),
        };

        Ok(Settings {
            schema_version,
            output_root,
            scratch_root,
            parallel: config.parallel.unwrap_or(false),
            artifact_base_url: config
                .artifact_base_url
                .map(|url| url.trim_end_matches('/').to_string()),
            sources,
            lamost_catalog: config.catalogs.lamost,
            galah_catalog: config.catalogs.galah,
            catalog_match: config.catalogs.match_mode.unwrap_or_default(),
            rave,
            endpoints,
        })
    }

    fn apply_env(settings: &mut Settings) {
        if let Ok(token) = env::var(RAVE_TOKEN_ENV) {
            if !token.trim().is_empty() {
                settings.rave.token = Some(token);
            }
        }
        if let Ok(dir) = env::var(OUTPUT_DIR_ENV) {
            if !dir.trim().is_empty() {
                settings.output_root = Utf8PathBuf::from(dir);
            }
        }
    }
}

pub fn parse_sources(names: &[String]) -> Result<Vec<SourceName>, SpectraError> {
    let mut sources = names
        .iter()
        .map(|name| {
            SourceName::from_str(name, true)
                .map_err(|_| SpectraError::UnknownSurvey(name.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;
    sources.sort();
    sources.dedup();
    Ok(sources)
}
