use regex::Regex;
use tracing::{debug, warn};

use crate::coords;
use crate::domain::{ObjectIdentity, Survey};
use crate::error::SpectraError;
use crate::simbad::SimbadClient;

/// Resolves free-text names and Gaia-prefixed ids into an [`ObjectIdentity`].
pub struct IdentityResolver<S: SimbadClient> {
    simbad: S,
    cross_id: Regex,
}

impl<S: SimbadClient> IdentityResolver<S> {
    pub fn new(simbad: S) -> Self {
        Self {
            simbad,
            cross_id: Regex::new(r"^Gaia DR3\s+(\d+)$").expect("static regex"),
        }
    }

    /// `None` means resolution failed; the cause is logged, never retried.
    pub fn resolve(&self, identifier: &str) -> Option<ObjectIdentity> {
        match self.try_resolve(identifier) {
            Ok(identity) => identity,
            Err(err) => {
                warn!(identifier, "resolution failed: {err}");
                None
            }
        }
    }

    pub fn try_resolve(&self, identifier: &str) -> Result<Option<ObjectIdentity>, SpectraError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        let mut identity = ObjectIdentity::new(identifier);

        let prefixed = Survey::from_identifier(identifier);
        if let Some(survey) = prefixed {
            let record_key = identifier
                .strip_prefix(survey.prefix())
                .filter(|rest| !rest.trim().is_empty())
                .and_then(|_| trailing_token(identifier))
                .ok_or_else(|| {
                    SpectraError::ResolutionFailed(format!("no id after prefix: {identifier}"))
                })?;
            identity.survey_ids.insert(survey, record_key.to_string());
        }

        let Some(coordinates) = self.simbad.query_object(identifier)? else {
            debug!(identifier, "SIMBAD has no entry");
            return Ok(None);
        };
        identity.position = Some(coords::parse_icrs(
            &coordinates.ra_hms,
            &coordinates.dec_dms,
        )?);

        identity.all_known_ids = self.simbad.query_object_ids(identifier)?;
        if prefixed.is_none() {
            if let Some(gaia_id) = self.gaia_dr3_from_ids(&identity.all_known_ids) {
                identity.survey_ids.insert(Survey::GaiaDr3, gaia_id);
            }
        }

        debug!(
            identifier,
            ra = identity.right_ascension(),
            dec = identity.declination(),
            record_key = identity.record_key(),
            "identity resolved"
        );
        Ok(Some(identity))
    }

    fn gaia_dr3_from_ids(&self, ids: &[String]) -> Option<String> {
        ids.iter()
            .find(|id| self.cross_id.is_match(id))
            .and_then(|id| trailing_token(id))
            .map(str::to_string)
    }
}

/// Token after the last run of whitespace.
pub fn trailing_token(identifier: &str) -> Option<&str> {
    identifier.split_whitespace().last()
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use assert_matches::assert_matches;

    use super::*;
    use crate::simbad::SimbadCoordinates;

    #[derive(Default)]
    struct MockSimbad {
        coordinates: Option<(String, String)>,
        ids: Vec<String>,
        fail: bool,
        queried: Mutex<Vec<String>>,
    }

    impl SimbadClient for MockSimbad {
        fn query_object(
            &self,
            identifier: &str,
        ) -> Result<Option<SimbadCoordinates>, SpectraError> {
            self.queried.lock().unwrap().push(identifier.to_string());
            if self.fail {
                return Err(SpectraError::SimbadHttp("connection refused".to_string()));
            }
            Ok(self.coordinates.clone().map(|(ra, dec)| SimbadCoordinates {
                ra_hms: ra,
                dec_dms: dec,
            }))
        }

        fn query_object_ids(&self, _identifier: &str) -> Result<Vec<String>, SpectraError> {
            Ok(self.ids.clone())
        }
    }

    fn vega() -> MockSimbad {
        MockSimbad {
            coordinates: Some(("18 36 56.33635".to_string(), "+38 47 01.2802".to_string())),
            ids: vec![
                "HD 172167".to_string(),
                "Gaia DR2 2095938467921591552".to_string(),
                "Gaia DR3 2095938467921591552".to_string(),
            ],
            ..MockSimbad::default()
        }
    }

    #[test]
    fn prefixed_id_uses_trailing_token_and_still_queries_simbad() {
        let resolver = IdentityResolver::new(vega());
        let identity = resolver.resolve("Gaia DR3 1234567890").unwrap();
        assert_eq!(identity.record_key(), Some("1234567890"));
        assert!(identity.position.is_some());
        assert_eq!(
            resolver.simbad.queried.lock().unwrap().as_slice(),
            ["Gaia DR3 1234567890"]
        );
    }

    #[test]
    fn name_is_cross_matched_to_gaia_dr3() {
        let resolver = IdentityResolver::new(vega());
        let identity = resolver.resolve("Vega").unwrap();
        assert_eq!(identity.record_key(), Some("2095938467921591552"));
        assert_eq!(identity.survey_ids.get(&Survey::GaiaDr2), None);
        assert_eq!(identity.all_known_ids.len(), 3);
    }

    #[test]
    fn name_without_gaia_cross_id_resolves_without_record_key() {
        let simbad = MockSimbad {
            ids: vec!["HD 1".to_string()],
            ..vega()
        };
        let identity = IdentityResolver::new(simbad).resolve("HD 1").unwrap();
        assert!(identity.record_key().is_none());
        assert!(identity.position.is_some());
    }

    #[test]
    fn service_failure_is_resolution_failure() {
        let simbad = MockSimbad {
            fail: true,
            ..MockSimbad::default()
        };
        assert!(IdentityResolver::new(simbad).resolve("Vega").is_none());
    }

    #[test]
    fn unknown_name_is_resolution_failure() {
        assert!(IdentityResolver::new(MockSimbad::default()).resolve("Nope").is_none());
    }

    #[test]
    fn unknown_prefixed_id_is_resolution_failure() {
        let resolver = IdentityResolver::new(MockSimbad::default());
        assert!(resolver.resolve("Gaia DR2 42").is_none());
        assert_eq!(
            resolver.simbad.queried.lock().unwrap().as_slice(),
            ["Gaia DR2 42"]
        );
    }

    #[test]
    fn bare_prefix_is_rejected_before_querying() {
        let resolver = IdentityResolver::new(vega());
        let err = resolver.try_resolve("Gaia DR3").unwrap_err();
        assert_matches!(err, SpectraError::ResolutionFailed(_));
        assert!(resolver.resolve("Gaia DR3  ").is_none());
        assert!(resolver.simbad.queried.lock().unwrap().is_empty());

        let glued = resolver.resolve("Gaia DR3123").unwrap();
        assert_eq!(glued.record_key(), Some("DR3123"));
    }

    #[test]
    fn unparseable_coordinates_fail_without_partial_position() {
        let simbad = MockSimbad {
            coordinates: Some(("18 36 56".to_string(), "north".to_string())),
            ..MockSimbad::default()
        };
        assert!(IdentityResolver::new(simbad).resolve("Vega").is_none());
    }

    #[test]
    fn trailing_token_of_prefixed_identifiers() {
        for id in ["Gaia DR3 1", "Gaia DR2   98765", "Gaia DR3 4\t77"] {
            let expected = id.split_whitespace().last();
            assert_eq!(trailing_token(id), expected);
        }
    }
}
