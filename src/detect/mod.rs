//! Detection layer: scan units, entity matches, and the detector bank.
//!
//! Detection has two sources. The [`DetectorBank`] runs a data-driven table of
//! regex detectors over a scan unit's text. The [`NerCapability`] trait is the
//! seam for an external named-entity model; the engine consumes it as a black
//! box and degrades to rules-only detection when it times out or is missing.

pub mod reconcile;
pub mod rules;

pub use reconcile::reconcile;

use crate::error::{MaskerError, MaskerResult};
use regex::Regex;
use std::time::Duration;
use tracing::warn;

/// Source of a candidate detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchSource {
    /// Deterministic pattern rule.
    Rule,
    /// External named-entity capability.
    Ner,
}

impl MatchSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Ner => "ner",
        }
    }
}

/// The atomic text region a detector operates on.
///
/// For plain text input this is the whole document; for PDF input it is one
/// extracted text span. Offsets in an [`EntityMatch`] are byte offsets into
/// this unit's text.
#[derive(Debug, Clone)]
pub struct ScanUnit {
    /// Stable identifier, unique within one invocation.
    pub id: String,
    /// The text owned by this unit.
    pub text: String,
    /// Page number for PDF-extracted spans.
    pub page: Option<u32>,
}

impl ScanUnit {
    /// Creates a scan unit covering a whole text document.
    pub fn document(text: impl Into<String>) -> Self {
        Self {
            id: "doc".to_string(),
            text: text.into(),
            page: None,
        }
    }

    /// Creates a scan unit for one PDF-extracted text span.
    pub fn pdf_span(id: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            page: Some(page),
        }
    }
}

/// A detected candidate sensitive-data span.
#[derive(Debug, Clone)]
pub struct EntityMatch {
    /// Entity type, e.g. `email`, `credentials`.
    pub entity_type: String,
    /// Byte offset into the scan unit's text (inclusive).
    pub start: usize,
    /// Byte offset into the scan unit's text (exclusive). Always > `start`.
    pub end: usize,
    /// Detection confidence in `[0, 1]`.
    pub confidence: f64,
    /// Which detection source produced this candidate.
    pub source: MatchSource,
    /// Id of the scan unit the offsets refer to.
    pub unit_id: String,
    /// Registration ordinal of the producing detector. Used as the
    /// deterministic tie-break during reconciliation; NER candidates rank
    /// after every table detector.
    pub detector_rank: usize,
}

impl EntityMatch {
    /// Length of the matched span in bytes.
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Returns true if this match overlaps `other` (half-open intervals).
    pub fn overlaps(&self, other: &EntityMatch) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// A detector failure, recorded by entity type only — never by content.
#[derive(Debug, Clone)]
pub struct DetectionWarning {
    pub entity_type: String,
    pub reason: String,
}

/// Result of scanning one unit: partial results survive detector failures.
#[derive(Debug, Default)]
pub struct ScanOutcome {
    pub matches: Vec<EntityMatch>,
    pub warnings: Vec<DetectionWarning>,
}

/// One compiled table detector.
#[derive(Debug)]
struct Detector {
    entity_type: String,
    regex: Regex,
    confidence: f64,
    rank: usize,
}

/// Data-driven bank of deterministic pattern detectors.
///
/// Built from `(entity_type, pattern, base_confidence)` rows; new entity types
/// are added via table entries, not code changes. A malformed pattern fails
/// fast at load time as a configuration error. At scan time each detector is
/// isolated: one misbehaving detector is skipped and recorded as a warning
/// while the others still produce results.
#[derive(Debug)]
pub struct DetectorBank {
    detectors: Vec<Detector>,
}

impl DetectorBank {
    /// Compiles a bank from a declarative table. Row order defines the
    /// detector registration rank used for reconciliation tie-breaks.
    pub fn from_table(rows: &[rules::TableRow]) -> MaskerResult<Self> {
        let mut detectors = Vec::with_capacity(rows.len());
        for (rank, row) in rows.iter().enumerate() {
            if !(0.0..=1.0).contains(&row.confidence) {
                return Err(MaskerError::config(
                    row.entity_type,
                    format!("base confidence {} outside [0, 1]", row.confidence),
                ));
            }
            let regex = Regex::new(row.pattern).map_err(|e| MaskerError::Configuration {
                subject: row.entity_type.to_string(),
                reason: e.to_string(),
            })?;
            detectors.push(Detector {
                entity_type: row.entity_type.to_string(),
                regex,
                confidence: row.confidence,
                rank,
            });
        }
        Ok(Self { detectors })
    }

    /// Compiles the built-in detector table.
    pub fn builtin() -> MaskerResult<Self> {
        Self::from_table(rules::BUILTIN_TABLE)
    }

    /// Number of registered detectors.
    pub fn len(&self) -> usize {
        self.detectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detectors.is_empty()
    }

    /// Rank value strictly greater than every table detector's rank.
    /// Assigned to NER candidates so table rules win exact ties.
    pub fn ner_rank(&self) -> usize {
        self.detectors.len()
    }

    /// Scans one unit with every detector. Each detector returns
    /// non-overlapping matches for its own type; overlaps across detectors
    /// are resolved later by [`reconcile`].
    pub fn scan(&self, unit: &ScanUnit) -> ScanOutcome {
        let mut outcome = ScanOutcome::default();
        for det in &self.detectors {
            match det.run(unit) {
                Ok(matches) => outcome.matches.extend(matches),
                Err(MaskerError::Detection {
                    entity_type,
                    reason,
                }) => {
                    warn!(entity_type = %entity_type, "detector failed, continuing");
                    outcome.warnings.push(DetectionWarning {
                        entity_type,
                        reason,
                    });
                }
                Err(other) => {
                    warn!(entity_type = %det.entity_type, "detector failed, continuing");
                    outcome.warnings.push(DetectionWarning {
                        entity_type: det.entity_type.clone(),
                        reason: other.to_string(),
                    });
                }
            }
        }
        outcome
    }
}

impl Detector {
    fn run(&self, unit: &ScanUnit) -> MaskerResult<Vec<EntityMatch>> {
        let mut matches = Vec::new();
        for m in self.regex.find_iter(&unit.text) {
            if m.start() >= m.end() {
                continue;
            }
            // A produced span outside the unit or off a char boundary means
            // the detector itself is broken; isolate it.
            if m.end() > unit.text.len()
                || !unit.text.is_char_boundary(m.start())
                || !unit.text.is_char_boundary(m.end())
            {
                return Err(MaskerError::Detection {
                    entity_type: self.entity_type.clone(),
                    reason: "detector produced an out-of-bounds span".to_string(),
                });
            }
            matches.push(EntityMatch {
                entity_type: self.entity_type.clone(),
                start: m.start(),
                end: m.end(),
                confidence: self.confidence,
                source: MatchSource::Rule,
                unit_id: unit.id.clone(),
                detector_rank: self.rank,
            });
        }
        Ok(matches)
    }
}

/// A span returned by the external named-entity capability.
#[derive(Debug, Clone)]
pub struct NerSpan {
    /// Model label, e.g. `PERSON`. Mapped to a policy entity type by
    /// [`ner_label_to_entity_type`].
    pub label: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

/// Failure modes of the NER capability.
#[derive(Debug, thiserror::Error)]
pub enum NerError {
    /// The capability did not answer within the caller-supplied timeout.
    #[error("NER capability timed out")]
    Timeout,
    /// The capability is not available in this process.
    #[error("NER capability unavailable")]
    Unavailable,
    /// Any other backend failure. The message must not contain input text.
    #[error("NER backend error: {0}")]
    Backend(String),
}

/// Pluggable named-entity capability.
///
/// Constructed once by the caller and passed explicitly into every engine
/// call; the engine holds no ambient model instance. This is the only
/// component permitted to block, bounded by the caller-supplied timeout.
pub trait NerCapability: Send + Sync {
    /// Scans `text` and returns candidate spans, or an error. Offsets are
    /// byte offsets into `text` on char boundaries.
    fn scan(&self, text: &str, timeout: Duration) -> Result<Vec<NerSpan>, NerError>;

    /// Human-readable capability name for logs and reports.
    fn name(&self) -> &str {
        "ner"
    }
}

/// Maps a model label to a policy entity type.
///
/// `PERSON`-like labels become `person_name`; anything else is passed through
/// lowercased so policies can address custom model labels directly.
pub fn ner_label_to_entity_type(label: &str) -> String {
    match label.to_ascii_uppercase().as_str() {
        "PERSON" | "PER" => "person_name".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reduced_bank() -> DetectorBank {
        DetectorBank::from_table(&[
            rules::TableRow {
                entity_type: "email",
                pattern: r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
                confidence: 0.85,
            },
            rules::TableRow {
                entity_type: "word",
                pattern: r"\bhello\b",
                confidence: 0.5,
            },
        ])
        .unwrap()
    }

    #[test]
    fn test_scan_finds_typed_matches() {
        let bank = reduced_bank();
        let unit = ScanUnit::document("hello a@b.com");
        let outcome = bank.scan(&unit);
        assert_eq!(outcome.matches.len(), 2);
        assert!(outcome.warnings.is_empty());
        let email = outcome
            .matches
            .iter()
            .find(|m| m.entity_type == "email")
            .unwrap();
        assert_eq!(&unit.text[email.start..email.end], "a@b.com");
        assert_eq!(email.source, MatchSource::Rule);
    }

    #[test]
    fn test_malformed_pattern_fails_at_load() {
        let err = DetectorBank::from_table(&[rules::TableRow {
            entity_type: "broken",
            pattern: "(unclosed",
            confidence: 0.5,
        }])
        .unwrap_err();
        assert!(matches!(err, MaskerError::Configuration { .. }));
    }

    #[test]
    fn test_confidence_out_of_range_fails_at_load() {
        let err = DetectorBank::from_table(&[rules::TableRow {
            entity_type: "bad",
            pattern: "x",
            confidence: 1.5,
        }])
        .unwrap_err();
        assert!(matches!(err, MaskerError::Configuration { .. }));
    }

    #[test]
    fn test_detector_rank_follows_table_order() {
        let bank = reduced_bank();
        let unit = ScanUnit::document("hello a@b.com");
        let outcome = bank.scan(&unit);
        let email = outcome
            .matches
            .iter()
            .find(|m| m.entity_type == "email")
            .unwrap();
        let word = outcome
            .matches
            .iter()
            .find(|m| m.entity_type == "word")
            .unwrap();
        assert_eq!(email.detector_rank, 0);
        assert_eq!(word.detector_rank, 1);
        assert_eq!(bank.ner_rank(), 2);
    }

    #[test]
    fn test_ner_label_mapping() {
        assert_eq!(ner_label_to_entity_type("PERSON"), "person_name");
        assert_eq!(ner_label_to_entity_type("per"), "person_name");
        assert_eq!(ner_label_to_entity_type("ORG"), "org");
    }
}
