//! Leak-free structured reporting.
//!
//! Reports describe what was detected and what was done about it — type,
//! offsets, confidence, action, and the truncated keyed digest — and never
//! the matched text itself. Three representations are produced from the same
//! data: structured JSON, flattened per-match CSV rows, and per-type summary
//! rows. Ordering is deterministic: by (scan unit id, start offset).

use crate::detect::{DetectionWarning, EntityMatch, ScanUnit};
use crate::error::{MaskerError, MaskerResult};
use crate::redaction::apply::MaskedSpan;
use serde::Serialize;
use std::collections::BTreeMap;

/// Audit tag for a match whose confidence fell below the resolved threshold.
pub const ACTION_BELOW_THRESHOLD: &str = "below_threshold";
/// Audit tag for a match whose type has no policy entry and no default.
pub const ACTION_NONE: &str = "none";

/// One per-match report row. Never contains the matched substring.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRecord {
    pub unit_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    pub entity_type: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
    pub source: String,
    /// Applied action name, or an audit tag for matches that were not masked.
    pub action: String,
    /// True only when the document was actually rewritten for this match.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash_used: Option<String>,
}

/// A detection failure surfaced to the caller, by type only.
#[derive(Debug, Clone, Serialize)]
pub struct WarningRecord {
    pub entity_type: String,
    pub reason: String,
}

/// Structured processing report for one engine invocation.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub document_id: String,
    pub mode: String,
    pub generated_at: String,
    /// The NER capability timed out or was unavailable; detection ran
    /// rules-only.
    pub degraded_ner: bool,
    /// Cancellation was observed between scan units; results are partial.
    pub cancelled: bool,
    pub units_scanned: usize,
    /// Units skipped due to adapter failures or cancellation. A caller must
    /// treat a document with skipped units as still containing unmasked
    /// content.
    pub skipped_units: Vec<String>,
    pub entity_counts: BTreeMap<String, usize>,
    /// Per entity type, how many matches received each action/audit tag.
    pub actions_by_type: BTreeMap<String, BTreeMap<String, usize>>,
    pub matches: Vec<MatchRecord>,
    pub warnings: Vec<WarningRecord>,
}

impl Report {
    /// Structured JSON representation.
    pub fn to_json(&self) -> MaskerResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| MaskerError::config("report", e.to_string()))
    }

    /// Flattened per-match rows: `type,start,end,confidence,action,hash`.
    pub fn flattened_csv(&self) -> MaskerResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["type", "start", "end", "confidence", "action", "hash"])
            .map_err(|e| MaskerError::config("report", e.to_string()))?;
        for m in &self.matches {
            writer
                .write_record([
                    m.entity_type.as_str(),
                    &m.start.to_string(),
                    &m.end.to_string(),
                    &format!("{:.2}", m.confidence),
                    m.action.as_str(),
                    m.hash_used.as_deref().unwrap_or(""),
                ])
                .map_err(|e| MaskerError::config("report", e.to_string()))?;
        }
        finish_csv(writer)
    }

    /// Per-type summary rows: `type,count`.
    pub fn summary_csv(&self) -> MaskerResult<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(["type", "count"])
            .map_err(|e| MaskerError::config("report", e.to_string()))?;
        for (entity_type, count) in &self.entity_counts {
            writer
                .write_record([entity_type.as_str(), &count.to_string()])
                .map_err(|e| MaskerError::config("report", e.to_string()))?;
        }
        finish_csv(writer)
    }
}

fn finish_csv(writer: csv::Writer<Vec<u8>>) -> MaskerResult<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| MaskerError::config("report", e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| MaskerError::config("report", e.to_string()))
}

/// Accumulates per-unit results into a [`Report`].
#[derive(Debug)]
pub struct ReportBuilder {
    document_id: String,
    mode: String,
    degraded_ner: bool,
    cancelled: bool,
    units_scanned: usize,
    skipped_units: Vec<String>,
    matches: Vec<MatchRecord>,
    warnings: Vec<WarningRecord>,
}

impl ReportBuilder {
    pub fn new(document_id: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            document_id: document_id.into(),
            mode: mode.into(),
            degraded_ner: false,
            cancelled: false,
            units_scanned: 0,
            skipped_units: Vec::new(),
            matches: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn unit_scanned(&mut self) {
        self.units_scanned += 1;
    }

    /// Records a match that was masked.
    pub fn record_applied(&mut self, unit: &ScanUnit, span: &MaskedSpan) {
        self.matches.push(MatchRecord {
            unit_id: unit.id.clone(),
            page: unit.page,
            entity_type: span.entity_match.entity_type.clone(),
            start: span.entity_match.start,
            end: span.entity_match.end,
            confidence: span.entity_match.confidence,
            source: span.entity_match.source.as_str().to_string(),
            action: span.action.as_str().to_string(),
            applied: true,
            hash_used: span.hash_used.clone(),
        });
    }

    /// Records a match that was detected but not masked, with its audit tag
    /// ([`ACTION_BELOW_THRESHOLD`] or [`ACTION_NONE`]).
    pub fn record_audit(&mut self, unit: &ScanUnit, m: &EntityMatch, tag: &str) {
        self.matches.push(MatchRecord {
            unit_id: unit.id.clone(),
            page: unit.page,
            entity_type: m.entity_type.clone(),
            start: m.start,
            end: m.end,
            confidence: m.confidence,
            source: m.source.as_str().to_string(),
            action: tag.to_string(),
            applied: false,
            hash_used: None,
        });
    }

    pub fn add_warnings(&mut self, warnings: &[DetectionWarning]) {
        for w in warnings {
            self.warnings.push(WarningRecord {
                entity_type: w.entity_type.clone(),
                reason: w.reason.clone(),
            });
        }
    }

    pub fn add_warning(&mut self, entity_type: impl Into<String>, reason: impl Into<String>) {
        self.warnings.push(WarningRecord {
            entity_type: entity_type.into(),
            reason: reason.into(),
        });
    }

    pub fn mark_degraded_ner(&mut self) {
        self.degraded_ner = true;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn skip_unit(&mut self, unit_id: impl Into<String>) {
        self.skipped_units.push(unit_id.into());
    }

    /// Finalizes the report: sorts rows by (unit id, start) and derives the
    /// count tables.
    pub fn build(mut self) -> Report {
        self.matches
            .sort_by(|a, b| a.unit_id.cmp(&b.unit_id).then(a.start.cmp(&b.start)));

        let mut entity_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut actions_by_type: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();
        for m in &self.matches {
            *entity_counts.entry(m.entity_type.clone()).or_insert(0) += 1;
            *actions_by_type
                .entry(m.entity_type.clone())
                .or_default()
                .entry(m.action.clone())
                .or_insert(0) += 1;
        }

        Report {
            document_id: self.document_id,
            mode: self.mode,
            generated_at: chrono::Utc::now().to_rfc3339(),
            degraded_ner: self.degraded_ner,
            cancelled: self.cancelled,
            units_scanned: self.units_scanned,
            skipped_units: self.skipped_units,
            entity_counts,
            actions_by_type,
            matches: self.matches,
            warnings: self.warnings,
        }
    }
}
