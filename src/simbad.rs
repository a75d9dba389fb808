use std::time::Duration;

use reqwest::blocking::Client;
use serde::Serialize;

use crate::error::SpectraError;
use crate::http;

pub const DEFAULT_SIMBAD_URL: &str = "https://simbad.cds.unistra.fr/simbad";

/// Raw ICRS coordinates as SIMBAD prints them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimbadCoordinates {
    pub ra_hms: String,
    pub dec_dms: String,
}

pub trait SimbadClient: Send + Sync {
    /// `Ok(None)` when SIMBAD does not know the identifier.
    fn query_object(&self, identifier: &str) -> Result<Option<SimbadCoordinates>, SpectraError>;
    fn query_object_ids(&self, identifier: &str) -> Result<Vec<String>, SpectraError>;
}

#[derive(Clone)]
pub struct SimbadHttpClient {
    client: Client,
    base_url: String,
}

impl SimbadHttpClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, SpectraError> {
        let client = http::client(Duration::from_secs(30))
            .map_err(|err| SpectraError::SimbadHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn run_script(&self, script: &str) -> Result<String, SpectraError> {
        let url = format!("{}/sim-script", self.base_url);
        let response = self
            .client
            .post(&url)
            .form(&[("script", script)])
            .send()
            .map_err(|err| SpectraError::SimbadHttp(err.to_string()))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "SIMBAD request failed".to_string());
            return Err(SpectraError::SimbadStatus { status, message });
        }
        response
            .text()
            .map_err(|err| SpectraError::SimbadHttp(err.to_string()))
    }
}

impl SimbadClient for SimbadHttpClient {
    fn query_object(&self, identifier: &str) -> Result<Option<SimbadCoordinates>, SpectraError> {
        let text = self.run_script(&build_script(identifier, "%COO(A)|%COO(D)"))?;
        let Some(lines) = parse_script_output(&text)? else {
            return Ok(None);
        };
        Ok(lines.first().and_then(|line| parse_coordinates(line)))
    }

    fn query_object_ids(&self, identifier: &str) -> Result<Vec<String>, SpectraError> {
        let text = self.run_script(&build_script(identifier, "%IDLIST"))?;
        let lines = parse_script_output(&text)?.unwrap_or_default();
        Ok(parse_identifiers(&lines))
    }
}

pub fn build_script(identifier: &str, format: &str) -> String {
    let identifier = identifier.replace(['\r', '\n'], " ");
    format!(
        "output console=off script=off\nformat object \"{format}\"\nquery id {}\n",
        identifier.trim()
    )
}

/// Returns the data lines of a sim-script response, `None` when SIMBAD
/// reports an unknown identifier.
pub fn parse_script_output(text: &str) -> Result<Option<Vec<String>>, SpectraError> {
    if let Some((_, error)) = text.split_once("::error::") {
        let message = error
            .lines()
            .skip(1)
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("unknown SIMBAD error")
            .to_string();
        if message.to_ascii_lowercase().contains("not found") {
            return Ok(None);
        }
        return Err(SpectraError::SimbadQuery(message));
    }

    let body = match text.split_once("::data::") {
        Some((_, rest)) => rest.split_once('\n').map(|(_, data)| data).unwrap_or(""),
        None => text,
    };
    let lines = body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect::<Vec<_>>();
    Ok(Some(lines))
}

pub fn parse_coordinates(line: &str) -> Option<SimbadCoordinates> {
    let (ra, dec) = line.split_once('|')?;
    let (ra, dec) = (ra.trim(), dec.trim());
    if ra.is_empty() || dec.is_empty() || ra == "~" || dec == "~" {
        return None;
    }
    Some(SimbadCoordinates {
        ra_hms: ra.to_string(),
        dec_dms: dec.to_string(),
    })
}

/// Splits an `%IDLIST` dump into identifiers with collapsed inner spacing.
pub fn parse_identifiers(lines: &[String]) -> Vec<String> {
    let mut ids = Vec::new();
    for line in lines {
        for raw in line.split('|') {
            let id = raw.split_whitespace().collect::<Vec<_>>().join(" ");
            if !id.is_empty() && !ids.contains(&id) {
                ids.push(id);
            }
        }
    }
    ids
}
