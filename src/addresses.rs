use thiserror::Error;
use tracing::debug;

use crate::model::{AddressParse, AddressParts};

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("unparseable address: {0:?}")]
    Unparseable(String),
    #[error("normalization failed for {0:?}")]
    Normalization(String),
}

/// External address-normalization collaborator. Unlike name classification,
/// failure here is tolerable: the record keeps the raw string and drops the
/// structured parts.
pub trait AddressNormalizer {
    fn normalize(&self, full: &str) -> Result<AddressParts, NormalizeError>;
}

/// Comma-tail reader for the `STREET, CITY, ST ZIP` shape the portal emits.
/// The last segment must be a two-letter state followed by a ZIP; everything
/// before the city joins back into the street.
#[derive(Debug, Default)]
pub struct TailAddressNormalizer;

impl AddressNormalizer for TailAddressNormalizer {
    fn normalize(&self, full: &str) -> Result<AddressParts, NormalizeError> {
        let segments: Vec<&str> = full.split(',').map(str::trim).collect();
        if segments.len() < 3 {
            return Err(NormalizeError::Unparseable(full.to_string()));
        }
        let tail = segments[segments.len() - 1];
        let city = segments[segments.len() - 2];
        let street = segments[..segments.len() - 2].join(", ");

        let mut words = tail.split_whitespace();
        let state = words.next().unwrap_or_default();
        let zip: String = words.collect::<Vec<_>>().join(" ");
        if state.len() != 2 || !state.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(NormalizeError::Unparseable(full.to_string()));
        }
        let zip_digits = zip.chars().filter(|c| c.is_ascii_digit()).count();
        if !(zip_digits == 5 || zip_digits == 9) {
            return Err(NormalizeError::Normalization(full.to_string()));
        }
        if street.is_empty() || city.is_empty() {
            return Err(NormalizeError::Unparseable(full.to_string()));
        }

        Ok(AddressParts {
            street,
            city: city.to_string(),
            state: state.to_string(),
            zip,
        })
    }
}

/// Normalize with graceful degradation: any failure keeps the raw string.
pub fn resolve(normalizer: &dyn AddressNormalizer, raw: &str) -> AddressParse {
    let full = raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    if full.is_empty() {
        return AddressParse::raw_only(full);
    }
    match normalizer.normalize(&full) {
        Ok(parts) => AddressParse {
            full,
            parts: Some(parts),
        },
        Err(err) => {
            debug!("Keeping raw address: {err}");
            AddressParse::raw_only(full)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_segment_address() {
        let parts = TailAddressNormalizer
            .normalize("123 MAIN ST, PIERRE, SD 57501")
            .unwrap();
        assert_eq!(parts.street, "123 MAIN ST");
        assert_eq!(parts.city, "PIERRE");
        assert_eq!(parts.state, "SD");
        assert_eq!(parts.zip, "57501");
    }

    #[test]
    fn extra_segments_join_into_street() {
        let parts = TailAddressNormalizer
            .normalize("PO BOX 1, SUITE 200, SIOUX FALLS, SD 57104-1234")
            .unwrap();
        assert_eq!(parts.street, "PO BOX 1, SUITE 200");
        assert_eq!(parts.city, "SIOUX FALLS");
        assert_eq!(parts.zip, "57104-1234");
    }

    #[test]
    fn failures_keep_raw_string() {
        let got = resolve(&TailAddressNormalizer, "  123   Main St  ");
        assert_eq!(got.full, "123 MAIN ST");
        assert!(got.parts.is_none());

        let got = resolve(&TailAddressNormalizer, "123 MAIN ST, PIERRE, SOUTH DAKOTA");
        assert!(got.parts.is_none());

        let got = resolve(&TailAddressNormalizer, "123 MAIN ST, PIERRE, SD 5750");
        assert!(got.parts.is_none(), "bad zip is a normalization failure");
    }

    #[test]
    fn resolve_uppercases_and_collapses() {
        let got = resolve(&TailAddressNormalizer, "123 main st,  pierre , sd 57501");
        assert_eq!(got.full, "123 MAIN ST, PIERRE , SD 57501");
        let parts = got.parts.unwrap();
        assert_eq!(parts.city, "PIERRE");
    }
}
