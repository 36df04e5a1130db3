use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;

/// Operator-maintained side table of known data problems. Loaded once at
/// pipeline start and never mutated at runtime.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Corrections {
    /// Misspelled name, as exported, to its fixed spelling. Applied before
    /// every cache lookup so cache keys stay stable across typos.
    #[serde(default)]
    pub name_fixes: BTreeMap<String, String>,

    /// Registration guid to corrected ISO registration date.
    #[serde(default)]
    pub date_fixes: BTreeMap<String, String>,

    /// Guids registered as private but known to be public lobbyists; they
    /// are skipped in the private dataset and expected in the public one.
    #[serde(default)]
    pub public_guids: BTreeSet<String>,

    /// Coverage keys with known data-entry anomalies, exempt from the
    /// canonical/scraped reconciliation check.
    #[serde(default)]
    pub reconcile_exempt: BTreeSet<String>,
}

impl Corrections {
    /// Load from disk; a missing file means no corrections yet.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        let c: Self = serde_json::from_str(&text)?;
        info!(
            "Loaded corrections: {} name fixes, {} date fixes, {} public guids, {} exemptions",
            c.name_fixes.len(),
            c.date_fixes.len(),
            c.public_guids.len(),
            c.reconcile_exempt.len()
        );
        Ok(c)
    }

    pub fn fix_name<'a>(&'a self, raw: &'a str) -> &'a str {
        self.name_fixes.get(raw).map(String::as_str).unwrap_or(raw)
    }

    pub fn date_fix(&self, guid: &str) -> Option<&str> {
        self.date_fixes.get(guid).map(String::as_str)
    }

    pub fn is_public_guid(&self, guid: &str) -> bool {
        self.public_guids.contains(guid)
    }

    pub fn is_reconcile_exempt(&self, key: &str) -> bool {
        self.reconcile_exempt.contains(key)
    }
}
