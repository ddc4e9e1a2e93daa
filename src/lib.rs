//! PII detection-and-redaction policy engine.
//!
//! Scans documents (plain text, and PDF text-layer spans) for sensitive-data
//! entities using deterministic pattern rules plus a pluggable named-entity
//! capability, reconciles overlapping candidates into a disjoint accepted
//! set, and rewrites the document according to a per-entity-type policy.
//!
//! # Features
//!
//! - **Data-driven detection**: a declarative (type, pattern, confidence)
//!   table covering emails, phones, postal codes, SSN-shaped ids,
//!   credentials (JWT, PEM, cloud key shapes), and card/IBAN shapes
//! - **Confidence-weighted reconciliation**: overlapping candidates resolve
//!   deterministically, never randomized
//! - **Keyed pseudonymization**: HMAC-SHA256 tokens with a template language
//!   (`{hashN}`, `{index}`, `{date:FORMAT}`, `{shape}`)
//! - **Two document adapters**: direct text substitution, and coarse
//!   PDF-span masking behind an offset-based contract
//! - **Leak-free reporting**: dry-run reports carry offsets, types, and
//!   digests — never matched text
//!
//! # Architecture
//!
//! - [`detect`]: scan units, the detector bank, NER seam, reconciliation
//! - [`policy`]: per-entity-type actions, thresholds, templates
//! - [`token`]: deterministic pseudonymization and template expansion
//! - [`redaction`]: the masking engine, applicator, and document adapters
//! - [`report`]: structured, flattened, and summary reports
//! - [`error`]: error taxonomy
//!
//! # Quick start
//!
//! ```
//! use docmask::{
//!     Action, DetectorBank, EntityRule, KeyScope, MaskingEngine, Mode, Policy, ScanUnit,
//! };
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bank = DetectorBank::builtin()?;
//! let engine = MaskingEngine::new(&bank);
//!
//! let policy = Policy::default()
//!     .with_entity("email", EntityRule::new(Action::Pseudonymize)
//!         .with_template("EMAIL_{hash6}@mask.local"));
//!
//! let units = vec![ScanUnit::document("Contact: a@b.com")];
//! let outcome = engine.run(
//!     "example",
//!     &units,
//!     &policy,
//!     KeyScope::ephemeral(),
//!     Mode::Redact,
//!     None,
//! )?;
//! assert!(!outcome.masked_units[0].text.contains("a@b.com"));
//! # Ok(())
//! # }
//! ```

// Public API
pub mod detect;
pub mod error;
pub mod policy;
pub mod redaction;
pub mod report;
pub mod token;

// Re-exports for convenient access
pub use detect::{
    reconcile, DetectorBank, EntityMatch, MatchSource, NerCapability, NerError, NerSpan, ScanUnit,
};
pub use error::{MaskerError, MaskerResult};
pub use policy::{Action, EntityRule, Policy};
pub use redaction::{
    apply_all, DocumentAdapter, EngineOutcome, MaskedSpan, MaskedUnit, MaskingEngine, Mode,
    PdfSpanAdapter, TextAdapter,
};
pub use report::{Report, ReportBuilder};
pub use token::{KeyScope, KeyScopeKind, TokenEngine};
