//! Masking engine: orchestrates detection, policy, tokens, and adapters.
//!
//! The pipeline is synchronous and single-threaded per scan unit, and no
//! mutable state crosses unit boundaries: independent units (PDF pages,
//! batched documents) can run on separate workers without locking. The only
//! component permitted to block is the injected NER capability, bounded by a
//! caller-supplied timeout; when it times out or is unavailable the engine
//! degrades to rules-only detection and records that in the report instead of
//! failing the document.

pub mod apply;
pub mod pdf;
pub mod text;

pub use apply::{apply_all, mask_match, DocumentAdapter, MaskedSpan};
pub use pdf::PdfSpanAdapter;
pub use text::TextAdapter;

use crate::detect::{
    ner_label_to_entity_type, DetectorBank, EntityMatch, MatchSource, NerCapability, NerError,
    ScanUnit,
};
use crate::error::{MaskerError, MaskerResult};
use crate::policy::{Disposition, Policy};
use crate::report::{Report, ReportBuilder, ACTION_BELOW_THRESHOLD, ACTION_NONE};
use crate::token::{KeyScope, TokenEngine};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Whether to rewrite the document or only report what would happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Redact,
    DryRun,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redact => "redact",
            Self::DryRun => "dry_run",
        }
    }
}

/// Masked output for one scan unit.
#[derive(Debug, Clone)]
pub struct MaskedUnit {
    pub id: String,
    pub page: Option<u32>,
    pub text: String,
}

/// Result of one engine invocation: masked units (empty in dry-run mode) and
/// the report.
#[derive(Debug)]
pub struct EngineOutcome {
    pub masked_units: Vec<MaskedUnit>,
    pub report: Report,
}

/// The policy engine's entry point.
///
/// Holds only immutable, process-lifetime pieces: the detector bank and the
/// optionally injected NER capability. Policy and key material are explicit
/// per-call parameters; nothing is retained between calls.
pub struct MaskingEngine<'a> {
    bank: &'a DetectorBank,
    ner: Option<&'a dyn NerCapability>,
    ner_timeout: Duration,
}

impl<'a> MaskingEngine<'a> {
    pub fn new(bank: &'a DetectorBank) -> Self {
        Self {
            bank,
            ner: None,
            ner_timeout: Duration::from_secs(5),
        }
    }

    /// Injects the NER capability with its per-call timeout. The capability
    /// is constructed once by the caller; the engine never owns a model.
    pub fn with_ner(mut self, ner: &'a dyn NerCapability, timeout: Duration) -> Self {
        self.ner = Some(ner);
        self.ner_timeout = timeout;
        self
    }

    /// Runs the full pipeline over the given scan units.
    ///
    /// Cancellation is checked at scan-unit boundaries only: a cancellation
    /// observed between units yields partial results with a cancellation
    /// marker, never a half-masked unit. A unit whose adapter fails is
    /// skipped and flagged while the remaining units are still processed.
    pub fn run(
        &self,
        document_id: &str,
        units: &[ScanUnit],
        policy: &Policy,
        key_scope: KeyScope,
        mode: Mode,
        cancel: Option<&AtomicBool>,
    ) -> MaskerResult<EngineOutcome> {
        // Nothing is processed on a bad policy.
        policy.validate()?;

        let mut tokens = TokenEngine::new(key_scope);
        let mut builder = ReportBuilder::new(document_id, mode.as_str());
        let mut masked_units = Vec::new();
        // Once the capability times out or reports itself unavailable, the
        // whole document runs rules-only rather than paying the timeout per
        // unit.
        let mut ner_down = false;

        for (idx, unit) in units.iter().enumerate() {
            if cancel.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
                builder.mark_cancelled();
                for remaining in &units[idx..] {
                    builder.skip_unit(remaining.id.clone());
                }
                break;
            }
            builder.unit_scanned();

            let outcome = self.bank.scan(unit);
            builder.add_warnings(&outcome.warnings);
            let mut candidates = outcome.matches;

            if let Some(ner) = self.ner.filter(|_| !ner_down) {
                match ner.scan(&unit.text, self.ner_timeout) {
                    Ok(spans) => {
                        for span in spans {
                            if span.start >= span.end
                                || span.end > unit.text.len()
                                || !unit.text.is_char_boundary(span.start)
                                || !unit.text.is_char_boundary(span.end)
                            {
                                builder.add_warning(
                                    ner_label_to_entity_type(&span.label),
                                    "NER span out of bounds, dropped",
                                );
                                continue;
                            }
                            candidates.push(EntityMatch {
                                entity_type: ner_label_to_entity_type(&span.label),
                                start: span.start,
                                end: span.end,
                                confidence: span.confidence.clamp(0.0, 1.0),
                                source: MatchSource::Ner,
                                unit_id: unit.id.clone(),
                                detector_rank: self.bank.ner_rank(),
                            });
                        }
                    }
                    Err(err @ (NerError::Timeout | NerError::Unavailable)) => {
                        warn!(capability = ner.name(), %err, "degrading to rules-only detection");
                        builder.mark_degraded_ner();
                        builder.add_warning("ner", err.to_string());
                        ner_down = true;
                    }
                    Err(err) => {
                        warn!(capability = ner.name(), %err, "NER scan failed for one unit");
                        builder.add_warning("ner", err.to_string());
                    }
                }
            }

            let accepted = crate::detect::reconcile(candidates);
            debug!(unit = %unit.id, accepted = accepted.len(), "reconciled matches");

            // Audit rows for detected-but-unmasked matches, in both modes.
            let mut actionable = Vec::new();
            for m in &accepted {
                match policy.disposition(m) {
                    Disposition::Apply(_) => actionable.push(m.clone()),
                    Disposition::BelowThreshold => {
                        builder.record_audit(unit, m, ACTION_BELOW_THRESHOLD);
                    }
                    Disposition::Unconfigured => builder.record_audit(unit, m, ACTION_NONE),
                }
            }

            match mode {
                Mode::Redact => {
                    let result = if unit.page.is_some() {
                        apply_all(PdfSpanAdapter::new(unit), unit, &actionable, policy, &mut tokens)
                    } else {
                        apply_all(TextAdapter::new(unit), unit, &actionable, policy, &mut tokens)
                    };
                    match result {
                        Ok((text, spans)) => {
                            for span in &spans {
                                builder.record_applied(unit, span);
                            }
                            masked_units.push(MaskedUnit {
                                id: unit.id.clone(),
                                page: unit.page,
                                text,
                            });
                        }
                        Err(MaskerError::Adapter { unit_id, reason }) => {
                            warn!(unit = %unit_id, "adapter failed, unit skipped");
                            builder.add_warning("adapter", reason);
                            builder.skip_unit(unit_id);
                        }
                        Err(other) => return Err(other),
                    }
                }
                Mode::DryRun => {
                    for m in &actionable {
                        if let Disposition::Apply(rule) = policy.disposition(m) {
                            let span = mask_match(unit, m, rule, &mut tokens)?;
                            builder.record_applied(unit, &span);
                        }
                    }
                }
            }
        }

        Ok(EngineOutcome {
            masked_units,
            report: builder.build(),
        })
    }
}
