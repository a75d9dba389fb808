//! Minimal FITS reader for one-dimensional spectra.
//!
//! Only what the survey archives actually ship is supported: a primary HDU
//! and any number of `IMAGE` extensions, integer or IEEE floating point
//! samples, and an optional gzip wrapper around the whole file.

use std::borrow::Cow;
use std::io::Read;
use std::ops::Range;

use flate2::read::GzDecoder;
use thiserror::Error;

use crate::domain::SpectrumSeries;

const BLOCK_LEN: usize = 2880;
const CARD_LEN: usize = 80;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("payload is not a FITS file")]
    NotFits,

    #[error("truncated FITS payload: {0}")]
    Truncated(String),

    #[error("missing header keyword {0}")]
    MissingKeyword(&'static str),

    #[error("invalid value for header keyword {keyword}: {value}")]
    InvalidKeyword { keyword: String, value: String },

    #[error("unsupported BITPIX {0}")]
    UnsupportedBitpix(i64),

    #[error("HDU {0} has no data array")]
    EmptyData(String),

    #[error("array length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("failed to inflate gzip payload: {0}")]
    Gzip(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HeaderValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    cards: Vec<(String, HeaderValue)>,
}

impl Header {
    pub fn get(&self, keyword: &str) -> Option<&HeaderValue> {
        self.cards
            .iter()
            .find(|(key, _)| key == keyword)
            .map(|(_, value)| value)
    }

    pub fn get_f64(&self, keyword: &str) -> Option<f64> {
        match self.get(keyword)? {
            HeaderValue::Int(value) => Some(*value as f64),
            HeaderValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_i64(&self, keyword: &str) -> Option<i64> {
        match self.get(keyword)? {
            HeaderValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn get_str(&self, keyword: &str) -> Option<&str> {
        match self.get(keyword)? {
            HeaderValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    fn require_i64(&self, keyword: &'static str) -> Result<i64, DecodeError> {
        match self.get(keyword) {
            Some(HeaderValue::Int(value)) => Ok(*value),
            Some(other) => Err(DecodeError::InvalidKeyword {
                keyword: keyword.to_string(),
                value: format!("{other:?}"),
            }),
            None => Err(DecodeError::MissingKeyword(keyword)),
        }
    }

    fn require_f64(&self, keyword: &'static str) -> Result<f64, DecodeError> {
        let value = self
            .get(keyword)
            .ok_or(DecodeError::MissingKeyword(keyword))?;
        self.get_f64(keyword)
            .ok_or_else(|| DecodeError::InvalidKeyword {
                keyword: keyword.to_string(),
                value: format!("{value:?}"),
            })
    }
}

#[derive(Debug, Clone)]
pub struct Hdu {
    index: usize,
    header: Header,
    data: Range<usize>,
}

impl Hdu {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn name(&self) -> String {
        match self.header.get_str("EXTNAME") {
            Some(name) => name.to_string(),
            None if self.index == 0 => "PRIMARY".to_string(),
            None => format!("HDU{}", self.index),
        }
    }
}

/// A parsed FITS container borrowing the raw bytes.
#[derive(Debug)]
pub struct FitsFile<'a> {
    bytes: &'a [u8],
    hdus: Vec<Hdu>,
}

impl<'a> FitsFile<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self, DecodeError> {
        if bytes.len() < CARD_LEN || !bytes.starts_with(b"SIMPLE") {
            return Err(DecodeError::NotFits);
        }
        let mut hdus = Vec::new();
        let mut offset = 0usize;
        while offset < bytes.len() {
            if !hdus.is_empty() && !bytes[offset..].starts_with(b"XTENSION") {
                break;
            }
            let (header, data_start) = parse_header(bytes, offset)?;
            let data_len = data_byte_len(&header)?;
            let data_end = data_start
                .checked_add(data_len)
                .filter(|end| *end <= bytes.len())
                .ok_or_else(|| {
                    DecodeError::Truncated(format!(
                        "HDU {} declares {data_len} data bytes, {} available",
                        hdus.len(),
                        bytes.len().saturating_sub(data_start)
                    ))
                })?;
            hdus.push(Hdu {
                index: hdus.len(),
                header,
                data: data_start..data_end,
            });
            offset = padded(data_end).min(bytes.len());
        }
        Ok(Self { bytes, hdus })
    }

    pub fn hdus(&self) -> &[Hdu] {
        &self.hdus
    }

    pub fn primary(&self) -> &Hdu {
        &self.hdus[0]
    }

    /// Looks up an extension by `EXTNAME`, ignoring case.
    pub fn hdu(&self, name: &str) -> Option<&Hdu> {
        self.hdus.iter().find(|hdu| {
            hdu.header
                .get_str("EXTNAME")
                .map(|value| value.eq_ignore_ascii_case(name))
                .unwrap_or(false)
        })
    }

    /// Samples of an image HDU with `BSCALE`/`BZERO` applied.
    pub fn image_data(&self, hdu: &Hdu) -> Result<Vec<f64>, DecodeError> {
        let count = sample_count(&hdu.header)?;
        let bitpix = hdu.header.require_i64("BITPIX")?;
        let width = bitpix_width(bitpix)?;
        let raw = self.bytes.get(hdu.data.clone()).unwrap_or_default();
        let byte_len = count
            .checked_mul(width)
            .filter(|len| *len <= raw.len())
            .ok_or_else(|| {
                DecodeError::Truncated(format!("{} expects {count} samples", hdu.name()))
            })?;
        let scale = hdu.header.get_f64("BSCALE").unwrap_or(1.0);
        let zero = hdu.header.get_f64("BZERO").unwrap_or(0.0);
        let values = raw[..byte_len]
            .chunks_exact(width)
            .map(|chunk| read_sample(bitpix, chunk) * scale + zero)
            .collect();
        Ok(values)
    }
}

/// Decodes a spectrum from a FITS payload.
///
/// Files carrying `SPECTRUM` and `ERROR` extensions yield a series with an
/// error column; anything else is read from the primary array.
pub fn decode(payload: &[u8]) -> Result<SpectrumSeries, DecodeError> {
    let bytes = inflate(payload)?;
    let file = FitsFile::parse(&bytes)?;

    if let (Some(spectrum), Some(error)) = (file.hdu("SPECTRUM"), file.hdu("ERROR")) {
        let axis = LinearAxis::from_header(spectrum.header())?;
        let flux = take_row(&file, spectrum, axis.len)?;
        let error = take_row(&file, error, axis.len)?;
        return SpectrumSeries::new(axis.wavelengths(), flux, Some(error));
    }

    let primary = file.primary();
    let axis = LinearAxis::from_header(primary.header())?;
    let flux = take_row(&file, primary, axis.len)?;
    SpectrumSeries::new(axis.wavelengths(), flux, None)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearAxis {
    ref_value: f64,
    increment: f64,
    ref_pixel: f64,
    len: usize,
}

impl LinearAxis {
    fn from_header(header: &Header) -> Result<Self, DecodeError> {
        let ref_value = header.require_f64("CRVAL1")?;
        let increment = header.require_f64("CDELT1")?;
        let ref_pixel = header.get_f64("CRPIX1").unwrap_or(1.0);
        let len = header.require_i64("NAXIS1")?;
        let len = usize::try_from(len).map_err(|_| DecodeError::InvalidKeyword {
            keyword: "NAXIS1".to_string(),
            value: len.to_string(),
        })?;
        Ok(Self {
            ref_value,
            increment,
            ref_pixel,
            len,
        })
    }

    fn wavelengths(&self) -> Vec<f64> {
        SpectrumSeries::linear_axis(self.ref_value, self.increment, self.ref_pixel, self.len)
    }
}

fn take_row(file: &FitsFile<'_>, hdu: &Hdu, len: usize) -> Result<Vec<f64>, DecodeError> {
    let mut data = file.image_data(hdu)?;
    if data.is_empty() || len == 0 {
        return Err(DecodeError::EmptyData(hdu.name()));
    }
    if data.len() < len {
        return Err(DecodeError::LengthMismatch {
            expected: len,
            actual: data.len(),
        });
    }
    data.truncate(len);
    Ok(data)
}

fn inflate(payload: &[u8]) -> Result<Cow<'_, [u8]>, DecodeError> {
    if !payload.starts_with(&GZIP_MAGIC) {
        return Ok(Cow::Borrowed(payload));
    }
    let mut decoder = GzDecoder::new(payload);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|err| DecodeError::Gzip(err.to_string()))?;
    Ok(Cow::Owned(out))
}

fn parse_header(bytes: &[u8], start: usize) -> Result<(Header, usize), DecodeError> {
    let mut header = Header::default();
    let mut offset = start;
    loop {
        let block_end = offset + BLOCK_LEN;
        if block_end > bytes.len() {
            return Err(DecodeError::Truncated(
                "header ends before END card".to_string(),
            ));
        }
        for card in bytes[offset..block_end].chunks_exact(CARD_LEN) {
            let card: String = card
                .iter()
                .map(|&byte| if byte.is_ascii() { byte as char } else { '?' })
                .collect();
            let keyword = card[..8].trim_end();
            if keyword == "END" {
                return Ok((header, block_end));
            }
            // Cards we cannot type (complex numbers, vendor quirks) are dropped;
            // a required one then surfaces as a missing keyword.
            if let Ok(Some(value)) = parse_card_value(&card) {
                header.cards.push((keyword.to_string(), value));
            }
        }
        offset = block_end;
    }
}

fn parse_card_value(card: &str) -> Result<Option<HeaderValue>, DecodeError> {
    if card.len() < 10 || &card[8..10] != "= " {
        return Ok(None);
    }
    let keyword = card[..8].trim_end();
    let field = card[10..].trim_start();
    if let Some(rest) = field.strip_prefix('\'') {
        let mut text = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(ch) = chars.next() {
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    text.push('\'');
                    chars.next();
                    continue;
                }
                return Ok(Some(HeaderValue::Text(text.trim_end().to_string())));
            }
            text.push(ch);
        }
        return Err(DecodeError::InvalidKeyword {
            keyword: keyword.to_string(),
            value: field.to_string(),
        });
    }

    let token = field.split('/').next().unwrap_or_default().trim();
    if token.is_empty() {
        return Ok(None);
    }
    let value = match token {
        "T" => HeaderValue::Bool(true),
        "F" => HeaderValue::Bool(false),
        _ => {
            if let Ok(value) = token.parse::<i64>() {
                HeaderValue::Int(value)
            } else if let Ok(value) = token.replace(['D', 'd'], "E").parse::<f64>() {
                HeaderValue::Float(value)
            } else {
                return Err(DecodeError::InvalidKeyword {
                    keyword: keyword.to_string(),
                    value: token.to_string(),
                });
            }
        }
    };
    Ok(Some(value))
}

fn sample_count(header: &Header) -> Result<usize, DecodeError> {
    let naxis = header.require_i64("NAXIS")?;
    if naxis <= 0 {
        return Ok(0);
    }
    if naxis > 999 {
        return Err(DecodeError::InvalidKeyword {
            keyword: "NAXIS".to_string(),
            value: naxis.to_string(),
        });
    }
    let mut count = 1usize;
    for axis in 1..=naxis {
        let keyword = format!("NAXIS{axis}");
        let len = header.get_i64(&keyword).unwrap_or(0);
        count = usize::try_from(len)
            .ok()
            .and_then(|len| count.checked_mul(len))
            .ok_or_else(|| DecodeError::InvalidKeyword {
                keyword: keyword.clone(),
                value: len.to_string(),
            })?;
    }
    Ok(count)
}

fn data_byte_len(header: &Header) -> Result<usize, DecodeError> {
    let width = bitpix_width(header.require_i64("BITPIX")?)?;
    let count = sample_count(header)?;
    if count == 0 {
        return Ok(0);
    }
    let pcount = usize::try_from(header.get_i64("PCOUNT").unwrap_or(0).max(0)).unwrap_or(0);
    let gcount = usize::try_from(header.get_i64("GCOUNT").unwrap_or(1).max(1)).unwrap_or(1);
    pcount
        .checked_add(count)
        .and_then(|len| len.checked_mul(gcount))
        .and_then(|len| len.checked_mul(width))
        .ok_or_else(|| DecodeError::Truncated(format!("data size overflows: {count} samples")))
}

fn bitpix_width(bitpix: i64) -> Result<usize, DecodeError> {
    match bitpix {
        8 => Ok(1),
        16 => Ok(2),
        32 | -32 => Ok(4),
        64 | -64 => Ok(8),
        other => Err(DecodeError::UnsupportedBitpix(other)),
    }
}

fn read_sample(bitpix: i64, chunk: &[u8]) -> f64 {
    match bitpix {
        8 => chunk[0] as f64,
        16 => i16::from_be_bytes([chunk[0], chunk[1]]) as f64,
        32 => i32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
        -32 => f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
        64 => i64::from_be_bytes(to_array8(chunk)) as f64,
        _ => f64::from_be_bytes(to_array8(chunk)),
    }
}

fn to_array8(chunk: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&chunk[..8]);
    buf
}

fn padded(len: usize) -> usize {
    len.div_ceil(BLOCK_LEN) * BLOCK_LEN
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn card(text: &str) -> String {
        format!("{text:<80}")
    }

    #[test]
    fn parses_card_values() {
        let value = parse_card_value(&card("CRVAL1  =               4718.0 / start")).unwrap();
        assert_eq!(value, Some(HeaderValue::Float(4718.0)));
        let value = parse_card_value(&card("NAXIS1  =                 4096")).unwrap();
        assert_eq!(value, Some(HeaderValue::Int(4096)));
        let value = parse_card_value(&card("EXTNAME = 'SPECTRUM'           / name")).unwrap();
        assert_eq!(value, Some(HeaderValue::Text("SPECTRUM".to_string())));
        let value = parse_card_value(&card("OBJECT  = 'O''Brien '")).unwrap();
        assert_eq!(value, Some(HeaderValue::Text("O'Brien".to_string())));
        let value = parse_card_value(&card("SIMPLE  =                    T")).unwrap();
        assert_eq!(value, Some(HeaderValue::Bool(true)));
        let value = parse_card_value(&card("CDELT1  =             1.5D-01")).unwrap();
        assert_eq!(value, Some(HeaderValue::Float(0.15)));
    }

    #[test]
    fn commentary_cards_are_skipped() {
        assert_eq!(parse_card_value(&card("COMMENT a note")).unwrap(), None);
        assert_eq!(parse_card_value(&card("HISTORY  = not a value")).unwrap(), None);
    }

    #[test]
    fn rejects_non_fits_payload() {
        let err = decode(b"<html>not found</html>").unwrap_err();
        assert_matches!(err, DecodeError::NotFits);
    }

    #[test]
    fn padding_rounds_up_to_block() {
        assert_eq!(padded(0), 0);
        assert_eq!(padded(1), BLOCK_LEN);
        assert_eq!(padded(BLOCK_LEN), BLOCK_LEN);
        assert_eq!(padded(BLOCK_LEN + 1), 2 * BLOCK_LEN);
    }
}
