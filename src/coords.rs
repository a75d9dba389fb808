use crate::domain::SkyPosition;
use crate::error::SpectraError;

/// Converts SIMBAD's ICRS sexagesimal pair (`hh mm ss.s`, `±dd mm ss.s`)
/// into decimal degrees.
pub fn parse_icrs(ra_hms: &str, dec_dms: &str) -> Result<SkyPosition, SpectraError> {
    let ra_deg = sexagesimal_to_decimal(ra_hms)? * 15.0;
    let dec_deg = sexagesimal_to_decimal(dec_dms)?;
    if !(0.0..360.0).contains(&ra_deg) {
        return Err(SpectraError::SimbadQuery(format!(
            "right ascension out of range: {ra_hms}"
        )));
    }
    if !(-90.0..=90.0).contains(&dec_deg) {
        return Err(SpectraError::SimbadQuery(format!(
            "declination out of range: {dec_dms}"
        )));
    }
    Ok(SkyPosition { ra_deg, dec_deg })
}

/// `"-60 50 02.3"` -> `-60.834`. Accepts space- or colon-separated fields
/// and truncated forms such as `"12 30"`.
pub fn sexagesimal_to_decimal(value: &str) -> Result<f64, SpectraError> {
    let trimmed = value.trim();
    let negative = trimmed.starts_with('-');
    let unsigned = trimmed.trim_start_matches(['+', '-']);
    let parts = unsigned
        .split(|ch: char| ch.is_whitespace() || ch == ':')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    if parts.is_empty() || parts.len() > 3 {
        return Err(SpectraError::SimbadQuery(format!(
            "invalid sexagesimal value: {value}"
        )));
    }
    let mut total = 0.0;
    let mut divisor = 1.0;
    for part in parts {
        let component = part.parse::<f64>().map_err(|_| {
            SpectraError::SimbadQuery(format!("invalid sexagesimal value: {value}"))
        })?;
        if component < 0.0 || (divisor > 1.0 && component >= 60.0) {
            return Err(SpectraError::SimbadQuery(format!(
                "invalid sexagesimal value: {value}"
            )));
        }
        total += component / divisor;
        divisor *= 60.0;
    }
    Ok(if negative { -total } else { total })
}
