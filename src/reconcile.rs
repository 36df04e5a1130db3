//! Coverage gate between the canonical PDF export and the scraped detail
//! pages. The export is ground truth; any lobbyist-year it lists that the
//! detail scrape missed means the crawl was incomplete, and nothing gets
//! published.

use std::collections::{BTreeMap, BTreeSet};

use tracing::info;

use crate::corrections::Corrections;
use crate::error::{PipelineError, Result};
use crate::model::{PrivateRecord, Registration};

pub type Coverage = BTreeMap<String, BTreeSet<u16>>;

pub fn coverage_from_canonical(records: &[PrivateRecord]) -> Coverage {
    let mut map = Coverage::new();
    for record in records {
        map.entry(record.coverage_key()).or_default().insert(record.year);
    }
    map
}

pub fn coverage_from_scraped(registrations: &[Registration]) -> Coverage {
    let mut map = Coverage::new();
    for registration in registrations {
        map.entry(registration.coverage_key())
            .or_default()
            .insert(registration.year);
    }
    map
}

fn join_years(years: &BTreeSet<u16>) -> String {
    years
        .iter()
        .map(u16::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Require set-equal year coverage for every canonical name, except those on
/// the corrections exemption list. Fails on the first mismatch.
pub fn verify(canonical: &Coverage, scraped: &Coverage, corrections: &Corrections) -> Result<()> {
    let empty = BTreeSet::new();
    let mut checked = 0usize;
    for (name, years) in canonical {
        if corrections.is_reconcile_exempt(name) {
            continue;
        }
        let scraped_years = scraped.get(name).unwrap_or(&empty);
        if years != scraped_years {
            return Err(PipelineError::ReconciliationMismatch {
                name: name.clone(),
                canonical: join_years(years),
                scraped: join_years(scraped_years),
            });
        }
        checked += 1;
    }
    info!("Reconciliation passed: {} names verified", checked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical_record(last: &str, first: &str, year: u16) -> PrivateRecord {
        PrivateRecord {
            year,
            name_last: last.to_string(),
            name_first: first.to_string(),
            employer: "EMPLOYER".to_string(),
            expense_flag: "NO".to_string(),
            status: "ACTIVE".to_string(),
        }
    }

    fn scraped_coverage(entries: &[(&str, u16)]) -> Coverage {
        let mut map = Coverage::new();
        for (name, year) in entries {
            map.entry(name.to_string()).or_default().insert(*year);
        }
        map
    }

    #[test]
    fn matching_coverage_passes() {
        let canonical = coverage_from_canonical(&[
            canonical_record("SMITH", "JOHN", 2023),
            canonical_record("SMITH", "JOHN", 2024),
        ]);
        let scraped = scraped_coverage(&[("SMITH, JOHN", 2023), ("SMITH, JOHN", 2024)]);
        verify(&canonical, &scraped, &Corrections::default()).unwrap();
    }

    #[test]
    fn missing_year_names_the_lobbyist_and_both_lists() {
        let canonical = coverage_from_canonical(&[
            canonical_record("ADAMS", "ANN", 2023),
            canonical_record("ADAMS", "ANN", 2024),
        ]);
        let scraped = scraped_coverage(&[("ADAMS, ANN", 2023)]);
        let err = verify(&canonical, &scraped, &Corrections::default()).unwrap_err();
        match err {
            PipelineError::ReconciliationMismatch {
                name,
                canonical,
                scraped,
            } => {
                assert_eq!(name, "ADAMS, ANN");
                assert_eq!(canonical, "2023, 2024");
                assert_eq!(scraped, "2023");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn record_order_does_not_change_the_outcome() {
        let forward = coverage_from_canonical(&[
            canonical_record("ADAMS", "ANN", 2023),
            canonical_record("BAKER", "BOB", 2024),
            canonical_record("ADAMS", "ANN", 2024),
        ]);
        let reversed = coverage_from_canonical(&[
            canonical_record("ADAMS", "ANN", 2024),
            canonical_record("BAKER", "BOB", 2024),
            canonical_record("ADAMS", "ANN", 2023),
        ]);
        assert_eq!(forward, reversed);

        let scraped = scraped_coverage(&[("ADAMS, ANN", 2023), ("BAKER, BOB", 2024)]);
        let a = verify(&forward, &scraped, &Corrections::default()).unwrap_err();
        let b = verify(&reversed, &scraped, &Corrections::default()).unwrap_err();
        assert_eq!(a.to_string(), b.to_string());
    }

    #[test]
    fn name_entirely_absent_from_scrape_fails_with_empty_list() {
        let canonical = coverage_from_canonical(&[canonical_record("SMITH", "JOHN", 2024)]);
        let err = verify(&canonical, &Coverage::new(), &Corrections::default()).unwrap_err();
        match err {
            PipelineError::ReconciliationMismatch { scraped, .. } => assert_eq!(scraped, ""),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn exempt_names_are_skipped() {
        let canonical = coverage_from_canonical(&[canonical_record("SMITH", "JOHN", 2024)]);
        let corrections: Corrections =
            serde_json::from_str(r#"{"reconcile_exempt": ["SMITH, JOHN"]}"#).unwrap();
        verify(&canonical, &Coverage::new(), &corrections).unwrap();
    }

    #[test]
    fn extra_scraped_names_do_not_fail_the_gate() {
        let canonical = coverage_from_canonical(&[canonical_record("SMITH", "JOHN", 2024)]);
        let scraped = scraped_coverage(&[("SMITH, JOHN", 2024), ("GHOST, GUY", 2024)]);
        verify(&canonical, &scraped, &Corrections::default()).unwrap();
    }
}
