use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use camino::{Utf8Path, Utf8PathBuf};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::SpectraError;
use crate::fits::DecodeError;

/// Archives a spectrum can come from, in the order they are queried.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
pub enum SourceName {
    #[serde(rename = "Gaia_RVS")]
    #[value(name = "gaia")]
    GaiaRvs,
    #[serde(rename = "LAMOST")]
    #[value(name = "lamost")]
    Lamost,
    #[serde(rename = "GALAH")]
    #[value(name = "galah")]
    Galah,
    #[serde(rename = "RAVE")]
    #[value(name = "rave")]
    Rave,
}

impl SourceName {
    pub const ALL: [SourceName; 4] = [
        SourceName::GaiaRvs,
        SourceName::Lamost,
        SourceName::Galah,
        SourceName::Rave,
    ];

    pub fn label(self) -> &'static str {
        match self {
            SourceName::GaiaRvs => "Gaia_RVS",
            SourceName::Lamost => "LAMOST",
            SourceName::Galah => "GALAH",
            SourceName::Rave => "RAVE",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            SourceName::GaiaRvs => "Gaia DR3 RVS",
            SourceName::Lamost => "LAMOST DR7",
            SourceName::Galah => "GALAH DR3",
            SourceName::Rave => "RAVE DR6",
        }
    }

    pub fn wavelength_unit(self) -> &'static str {
        match self {
            SourceName::GaiaRvs => "nm",
            SourceName::Lamost | SourceName::Galah | SourceName::Rave => "Angstrom",
        }
    }
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Catalogs whose identifiers can key a record lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Survey {
    #[serde(rename = "Gaia DR2")]
    GaiaDr2,
    #[serde(rename = "Gaia DR3")]
    GaiaDr3,
}

impl Survey {
    pub fn prefix(self) -> &'static str {
        match self {
            Survey::GaiaDr2 => "Gaia DR2",
            Survey::GaiaDr3 => "Gaia DR3",
        }
    }

    /// Matches the case-sensitive literal prefix of a catalog-style identifier.
    pub fn from_identifier(identifier: &str) -> Option<Survey> {
        [Survey::GaiaDr3, Survey::GaiaDr2]
            .into_iter()
            .find(|survey| identifier.starts_with(survey.prefix()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GaiaSourceId(String);

impl GaiaSourceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GaiaSourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for GaiaSourceId {
    type Err = SpectraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value
            .trim()
            .rsplit(char::is_whitespace)
            .next()
            .unwrap_or_default()
            .to_string();
        let is_valid =
            !normalized.is_empty() && normalized.chars().all(|ch| ch.is_ascii_digit());
        if !is_valid {
            return Err(SpectraError::InvalidGaiaId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SkyPosition {
    pub ra_deg: f64,
    pub dec_deg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectIdentity {
    pub raw_identifier: String,
    pub position: Option<SkyPosition>,
    pub survey_ids: BTreeMap<Survey, String>,
    pub all_known_ids: Vec<String>,
}

impl ObjectIdentity {
    pub fn new(raw_identifier: impl Into<String>) -> Self {
        Self {
            raw_identifier: raw_identifier.into(),
            position: None,
            survey_ids: BTreeMap::new(),
            all_known_ids: Vec::new(),
        }
    }

    pub fn right_ascension(&self) -> Option<f64> {
        self.position.map(|pos| pos.ra_deg)
    }

    pub fn declination(&self) -> Option<f64> {
        self.position.map(|pos| pos.dec_deg)
    }

    /// Gaia source id used to key the direct-ID and catalog archives.
    pub fn record_key(&self) -> Option<&str> {
        self.survey_ids
            .get(&Survey::GaiaDr3)
            .or_else(|| self.survey_ids.get(&Survey::GaiaDr2))
            .map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSeries {
    wavelength: Vec<f64>,
    flux: Vec<f64>,
    error: Option<Vec<f64>>,
}

impl SpectrumSeries {
    pub fn new(
        wavelength: Vec<f64>,
        flux: Vec<f64>,
        error: Option<Vec<f64>>,
    ) -> Result<Self, DecodeError> {
        if wavelength.len() != flux.len() {
            return Err(DecodeError::LengthMismatch {
                expected: wavelength.len(),
                actual: flux.len(),
            });
        }
        if let Some(error) = &error {
            if error.len() != flux.len() {
                return Err(DecodeError::LengthMismatch {
                    expected: flux.len(),
                    actual: error.len(),
                });
            }
        }
        Ok(Self {
            wavelength,
            flux,
            error,
        })
    }

    /// `wavelength[i] = ref_value + (i + 1 - ref_pixel) * increment`
    pub fn linear_axis(ref_value: f64, increment: f64, ref_pixel: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| ref_value + ((i + 1) as f64 - ref_pixel) * increment)
            .collect()
    }

    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    pub fn flux(&self) -> &[f64] {
        &self.flux
    }

    pub fn error(&self) -> Option<&[f64]> {
        self.error.as_deref()
    }

    pub fn len(&self) -> usize {
        self.flux.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flux.is_empty()
    }

    /// Single-array spectra use `Wavelength,Flux`; spectra with an error
    /// column use `wavelength,flux,error`.
    pub fn to_csv(&self) -> String {
        let mut out = String::with_capacity(self.len() * 32);
        match &self.error {
            Some(error) => {
                out.push_str("wavelength,flux,error\n");
                for ((w, f), e) in self.wavelength.iter().zip(&self.flux).zip(error) {
                    out.push_str(&format!("{w},{f},{e}\n"));
                }
            }
            None => {
                out.push_str("Wavelength,Flux\n");
                for (w, f) in self.wavelength.iter().zip(&self.flux) {
                    out.push_str(&format!("{w},{f}\n"));
                }
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceResult {
    pub source_name: SourceName,
    pub artifact_paths: Vec<Utf8PathBuf>,
    pub filter_label: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregatedResponse {
    pub entries: Vec<SourceResult>,
}

impl AggregatedResponse {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Trailing `_`-delimited token of the file stem, e.g. `galah-131216_B.csv` -> `B`.
pub fn filter_label_from_path(path: &Utf8Path) -> Option<String> {
    let stem = path.file_stem()?;
    let (_, label) = stem.rsplit_once('_')?;
    if label.is_empty() {
        return None;
    }
    Some(label.to_string())
}
