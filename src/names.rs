use std::collections::BTreeMap;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::corrections::Corrections;
use crate::error::{PipelineError, Result};
use crate::model::NameParse;
use crate::store::atomic_write;

/// What the classification collaborator decided a string is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Person(NameParse),
    Organization,
}

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("ambiguous name: {0:?}")]
    Ambiguous(String),
}

/// External name-classification collaborator. The built-in implementation is
/// a conservative reader of the portal's `LAST, FIRST MIDDLE (NICK) SUFFIX`
/// shape; anything it cannot commit to is ambiguous, which the cache treats
/// as fatal.
pub trait NameClassifier {
    fn classify(&self, full: &str) -> std::result::Result<Classification, ClassifyError>;
}

const PREFIXES: &[&str] = &["MR", "MRS", "MS", "DR", "REV", "HON"];
const SUFFIXES: &[&str] = &["JR", "SR", "II", "III", "IV", "V", "MD", "ESQ", "PHD"];
const ORG_MARKERS: &[&str] = &[
    "INC", "LLC", "LLP", "LTD", "CORP", "COMPANY", "ASSN", "ASSOCIATION",
    "COALITION", "COUNCIL", "LEAGUE", "FEDERATION", "SOCIETY", "ALLIANCE",
    "BUREAU", "COMMITTEE", "FOUNDATION",
];

#[derive(Debug, Default)]
pub struct CommaNameClassifier;

impl NameClassifier for CommaNameClassifier {
    fn classify(&self, full: &str) -> std::result::Result<Classification, ClassifyError> {
        let tokens: Vec<&str> = full
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(|t| t.trim_end_matches('.'))
            .collect();
        if tokens.iter().any(|t| ORG_MARKERS.contains(t)) {
            return Ok(Classification::Organization);
        }

        let Some((last_part, rest)) = full.split_once(',') else {
            return Err(ClassifyError::Ambiguous(full.to_string()));
        };
        let last = last_part.trim();
        if last.is_empty() || last.chars().any(|c| c.is_ascii_digit()) {
            return Err(ClassifyError::Ambiguous(full.to_string()));
        }

        let mut given = None;
        let mut middle_parts = Vec::new();
        let mut nickname = None;
        let mut prefix = None;
        let mut suffix = None;

        for word in rest.split_whitespace() {
            let bare = word.trim_end_matches('.');
            if given.is_none() && PREFIXES.contains(&bare) {
                prefix = Some(bare.to_string());
            } else if word.starts_with('(') {
                nickname = Some(word.trim_matches(|c| c == '(' || c == ')').to_string());
            } else if given.is_some() && SUFFIXES.contains(&bare) {
                suffix = Some(bare.to_string());
            } else if given.is_none() {
                given = Some(bare.to_string());
            } else {
                middle_parts.push(bare.to_string());
            }
        }

        let Some(given) = given else {
            return Err(ClassifyError::Ambiguous(full.to_string()));
        };
        if given.chars().any(|c| c.is_ascii_digit()) {
            return Err(ClassifyError::Ambiguous(full.to_string()));
        }

        Ok(Classification::Person(NameParse {
            full: full.to_string(),
            last: last.to_string(),
            given,
            middle: (!middle_parts.is_empty()).then(|| middle_parts.join(" ")),
            nickname,
            prefix,
            suffix,
        }))
    }
}

/// Collapse whitespace runs and uppercase; the canonical cache-key form.
pub fn normalize_name(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}

/// Persistent full-name → parse mapping. One entry per normalized name;
/// entries are never mutated once written within a run.
pub struct NameCache {
    entries: BTreeMap<String, NameParse>,
    classifier: Box<dyn NameClassifier>,
    misses: usize,
}

impl NameCache {
    pub fn load(path: &Path, classifier: Box<dyn NameClassifier>) -> Result<Self> {
        let entries = if path.exists() {
            let text = std::fs::read_to_string(path)?;
            serde_json::from_str(&text)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            entries,
            classifier,
            misses: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Classifier invocations this run; cache hits do not count.
    pub fn misses(&self) -> usize {
        self.misses
    }

    fn key(corrections: &Corrections, raw: &str) -> String {
        normalize_name(corrections.fix_name(normalize_name(raw).as_str()))
    }

    /// Look up, classifying on miss. A non-person or ambiguous result is a
    /// fatal data-quality failure, not a recoverable condition.
    pub fn resolve(&mut self, corrections: &Corrections, raw: &str) -> Result<NameParse> {
        let key = Self::key(corrections, raw);
        if let Some(parse) = self.entries.get(&key) {
            return Ok(parse.clone());
        }
        self.misses += 1;
        match self.classifier.classify(&key) {
            Ok(Classification::Person(parse)) => {
                debug!("Classified {:?} as person", key);
                self.entries.insert(key.clone(), parse.clone());
                Ok(parse)
            }
            Ok(Classification::Organization) => Err(PipelineError::UnparseableName(key)),
            Err(ClassifyError::Ambiguous(_)) => Err(PipelineError::UnparseableName(key)),
        }
    }

    /// Cache-only lookup for the detail-parse pass. A miss means the
    /// extraction pass has not run: fail fast instead of classifying.
    pub fn lookup(&self, corrections: &Corrections, raw: &str) -> Result<NameParse> {
        let key = Self::key(corrections, raw);
        self.entries
            .get(&key)
            .cloned()
            .ok_or(PipelineError::OrderingViolation { name: key })
    }

    /// One atomic write after a full extraction pass.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(&self.entries)?;
        atomic_write(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn cache() -> NameCache {
        NameCache {
            entries: BTreeMap::new(),
            classifier: Box::new(CommaNameClassifier),
            misses: 0,
        }
    }

    /// Classifier that counts invocations and accepts everything.
    struct Counting(Rc<Cell<usize>>);

    impl NameClassifier for Counting {
        fn classify(&self, full: &str) -> std::result::Result<Classification, ClassifyError> {
            self.0.set(self.0.get() + 1);
            CommaNameClassifier.classify(full)
        }
    }

    #[test]
    fn full_person_parse() {
        let got = CommaNameClassifier.classify("SMITH, JOHN A (JACK) JR").unwrap();
        let Classification::Person(p) = got else {
            panic!("expected person")
        };
        assert_eq!(p.last, "SMITH");
        assert_eq!(p.given, "JOHN");
        assert_eq!(p.middle.as_deref(), Some("A"));
        assert_eq!(p.nickname.as_deref(), Some("JACK"));
        assert_eq!(p.suffix.as_deref(), Some("JR"));
        assert_eq!(p.full, "SMITH, JOHN A (JACK) JR");
    }

    #[test]
    fn prefix_and_compound_surname() {
        let got = CommaNameClassifier.classify("VAN DER BERG, DR ANNA").unwrap();
        let Classification::Person(p) = got else {
            panic!("expected person")
        };
        assert_eq!(p.last, "VAN DER BERG");
        assert_eq!(p.prefix.as_deref(), Some("DR"));
        assert_eq!(p.given, "ANNA");
    }

    #[test]
    fn organization_markers() {
        for s in ["ACME LOBBYING, LLC", "SD BANKERS ASSN", "PRAIRIE COALITION"] {
            assert_eq!(
                CommaNameClassifier.classify(s).unwrap(),
                Classification::Organization,
                "{s}"
            );
        }
    }

    #[test]
    fn ambiguous_shapes() {
        assert!(CommaNameClassifier.classify("JOHN SMITH").is_err());
        assert!(CommaNameClassifier.classify("SMITH,").is_err());
        assert!(CommaNameClassifier.classify("R2, D2 3").is_err());
    }

    #[test]
    fn resolve_caches_and_never_reclassifies() {
        let count = Rc::new(Cell::new(0));
        let mut cache = NameCache {
            entries: BTreeMap::new(),
            classifier: Box::new(Counting(Rc::clone(&count))),
            misses: 0,
        };
        let corrections = Corrections::default();
        let first = cache.resolve(&corrections, "smith,  john a").unwrap();
        assert_eq!(count.get(), 1);
        let second = cache.resolve(&corrections, "SMITH, JOHN A").unwrap();
        assert_eq!(count.get(), 1, "second resolve must be a pure cache hit");
        assert_eq!(first, second);
        assert_eq!(cache.misses(), 1);
    }

    #[test]
    fn name_fix_applies_before_lookup() {
        let corrections: Corrections =
            serde_json::from_str(r#"{"name_fixes": {"SMIHT, JOHN": "SMITH, JOHN"}}"#).unwrap();
        let mut cache = cache();
        cache.resolve(&corrections, "Smiht, John").unwrap();
        // Both spellings reach the same single entry.
        assert_eq!(cache.len(), 1);
        let parse = cache.lookup(&corrections, "SMITH, JOHN").unwrap();
        assert_eq!(parse.last, "SMITH");
    }

    #[test]
    fn unparseable_is_fatal_and_uncached() {
        let mut cache = cache();
        let corrections = Corrections::default();
        let err = cache.resolve(&corrections, "PRAIRIE COALITION").unwrap_err();
        assert!(matches!(err, PipelineError::UnparseableName(_)));
        assert!(cache.is_empty());
    }

    #[test]
    fn lookup_miss_is_ordering_violation() {
        let cache = cache();
        let err = cache.lookup(&Corrections::default(), "NOBODY, KNOWN").unwrap_err();
        assert!(matches!(err, PipelineError::OrderingViolation { name } if name == "NOBODY, KNOWN"));
    }

    #[test]
    fn persist_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("name-cache.json");
        let corrections = Corrections::default();

        let mut cache = cache();
        cache.resolve(&corrections, "SMITH, JOHN").unwrap();
        cache.resolve(&corrections, "DOE, JANE B").unwrap();
        cache.persist(&path).unwrap();

        let reloaded = NameCache::load(&path, Box::new(CommaNameClassifier)).unwrap();
        assert_eq!(reloaded.len(), 2);
        let parse = reloaded.lookup(&corrections, "DOE, JANE B").unwrap();
        assert_eq!(parse.middle.as_deref(), Some("B"));
    }
}
