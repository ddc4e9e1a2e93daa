//! Redaction applicator and the document adapter seam.
//!
//! The applicator turns reconciled, policy-filtered matches into replacement
//! text and hands range substitutions to a [`DocumentAdapter`]. Replacements
//! are computed in ascending document order (so `{index}` counts naturally)
//! but applied right-to-left, so variable-length replacements never
//! invalidate offsets that have not been processed yet.
//!
//! No disk or network I/O happens here; callers own all file access.

use crate::detect::{EntityMatch, ScanUnit};
use crate::error::MaskerResult;
use crate::policy::{Action, Disposition, EntityRule, Policy};
use crate::token::{self, TokenEngine};

/// Hex chars of the keyed digest recorded in reports for pseudonymized
/// matches.
const REPORT_HASH_LEN: usize = 8;

/// One applied replacement.
#[derive(Debug, Clone)]
pub struct MaskedSpan {
    pub entity_match: EntityMatch,
    pub action: Action,
    pub replacement: String,
    /// Truncated keyed digest, present only for pseudonymized matches.
    pub hash_used: Option<String>,
}

/// Applies offset-range replacements to one scan unit.
///
/// Adapters expose per-offset substitution even when their current masking
/// policy is coarser (see [`PdfSpanAdapter`](super::PdfSpanAdapter)), so a
/// more precise adapter can slot in without touching reconciliation, policy,
/// or token logic.
pub trait DocumentAdapter {
    /// Substitutes `[start, end)` of the unit's original text. Ranges must be
    /// applied in descending start order and must not overlap.
    fn replace_range(&mut self, start: usize, end: usize, replacement: &str) -> MaskerResult<()>;

    /// Consumes the adapter and returns the unit's output text.
    fn into_output(self) -> String
    where
        Self: Sized;
}

/// Computes the replacement for one match under one rule.
///
/// The returned [`MaskedSpan`] upholds the leakage invariants: `remove`
/// shares nothing with the original; `pseudonymize` derives only from the
/// keyed digest and template; `format_preserve` retains original characters
/// only within the configured keep head/tail.
pub fn mask_match(
    unit: &ScanUnit,
    entity_match: &EntityMatch,
    rule: &EntityRule,
    engine: &mut TokenEngine,
) -> MaskerResult<MaskedSpan> {
    let value = &unit.text[entity_match.start..entity_match.end];
    let (replacement, hash_used) = match rule.action {
        Action::Remove => (String::new(), None),
        Action::Pseudonymize => {
            let template = rule
                .template
                .clone()
                .unwrap_or_else(|| token::default_template(&entity_match.entity_type));
            let replacement = engine.tokenize(value, &entity_match.entity_type, &template)?;
            let digest = engine.digest_hex(value, &entity_match.entity_type);
            (replacement, Some(digest[..REPORT_HASH_LEN].to_string()))
        }
        Action::FormatPreserve => (
            TokenEngine::format_preserve(value, rule.keep_head, rule.keep_tail),
            None,
        ),
        Action::Placeholder => {
            let replacement = rule
                .template
                .clone()
                .unwrap_or_else(|| format!("[{}]", entity_match.entity_type));
            (replacement, None)
        }
    };
    Ok(MaskedSpan {
        entity_match: entity_match.clone(),
        action: rule.action,
        replacement,
        hash_used,
    })
}

/// Applies policy-accepted matches to one scan unit.
///
/// `matches` must be the reconciled, disjoint set for this unit in ascending
/// start order. Returns the masked text and the spans that were applied;
/// below-threshold and unconfigured matches are left to the caller's audit
/// trail.
pub fn apply_all<A: DocumentAdapter>(
    mut adapter: A,
    unit: &ScanUnit,
    matches: &[EntityMatch],
    policy: &Policy,
    engine: &mut TokenEngine,
) -> MaskerResult<(String, Vec<MaskedSpan>)> {
    // Phase 1, ascending: compute replacements so {index} counts in document
    // order.
    let mut spans = Vec::new();
    for entity_match in matches {
        if let Disposition::Apply(rule) = policy.disposition(entity_match) {
            spans.push(mask_match(unit, entity_match, rule, engine)?);
        }
    }

    // Phase 2, descending: substitute right to left.
    for span in spans.iter().rev() {
        adapter.replace_range(
            span.entity_match.start,
            span.entity_match.end,
            &span.replacement,
        )?;
    }

    Ok((adapter.into_output(), spans))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::MatchSource;
    use crate::redaction::{PdfSpanAdapter, TextAdapter};
    use crate::token::KeyScope;

    fn m(entity_type: &str, start: usize, end: usize) -> EntityMatch {
        EntityMatch {
            entity_type: entity_type.to_string(),
            start,
            end,
            confidence: 0.9,
            source: MatchSource::Rule,
            unit_id: "doc".to_string(),
            detector_rank: 0,
        }
    }

    fn engine() -> TokenEngine {
        TokenEngine::new(KeyScope::environment(b"test-key".to_vec()))
    }

    #[test]
    fn test_right_to_left_substitution() {
        let unit = ScanUnit::document("call 555-123-4567 now, SSN 123-45-6789");
        let policy = Policy::default()
            .with_entity("phone", EntityRule::new(Action::Remove))
            .with_entity("government_id", EntityRule::new(Action::Placeholder));
        let matches = vec![m("phone", 5, 17), m("government_id", 27, 38)];
        let (masked, spans) = apply_all(
            TextAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        assert_eq!(masked, "call  now, SSN [government_id]");
        assert_eq!(spans.len(), 2);
    }

    #[test]
    fn test_variable_length_replacements_keep_offsets_valid() {
        let unit = ScanUnit::document("a@b.com and c@d.com");
        let policy = Policy::default().with_entity(
            "email",
            EntityRule::new(Action::Pseudonymize).with_template("EMAIL_{hash4}_{index}"),
        );
        let matches = vec![m("email", 0, 7), m("email", 12, 19)];
        let (masked, spans) = apply_all(
            TextAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        // {index} follows document order despite right-to-left substitution.
        assert!(spans[0].replacement.ends_with("_1"));
        assert!(spans[1].replacement.ends_with("_2"));
        assert!(masked.contains(" and "));
        assert!(!masked.contains("a@b.com"));
        assert!(!masked.contains("c@d.com"));
    }

    #[test]
    fn test_below_threshold_matches_not_applied() {
        let unit = ScanUnit::document("maybe 12345 here");
        let policy = Policy::default().with_entity(
            "postal_code",
            EntityRule::new(Action::Remove).with_threshold(0.95),
        );
        let matches = vec![m("postal_code", 6, 11)];
        let (masked, spans) = apply_all(
            TextAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        assert_eq!(masked, unit.text);
        assert!(spans.is_empty());
    }

    #[test]
    fn test_remove_shares_no_substring_with_original() {
        let unit = ScanUnit::document("token eyJaaa.bbb.ccc end");
        let policy = Policy::default().with_entity("credentials", EntityRule::new(Action::Remove));
        let matches = vec![m("credentials", 6, 20)];
        let (masked, spans) = apply_all(
            TextAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        assert_eq!(spans[0].replacement, "");
        assert!(!masked.contains("eyJ"));
    }

    #[test]
    fn test_format_preserve_keeps_configured_tail_only() {
        let unit = ScanUnit::document("card 4111111111111111");
        let policy = Policy::default().with_entity(
            "financial",
            EntityRule::new(Action::FormatPreserve).with_keep_tail(4),
        );
        let matches = vec![m("financial", 5, 21)];
        let (masked, spans) = apply_all(
            TextAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        assert_eq!(masked, "card xxxxxxxxxxxx1111");
        assert_eq!(spans[0].replacement.len(), 16);
    }

    #[test]
    fn test_pdf_adapter_masks_whole_span() {
        let unit = ScanUnit::pdf_span("p1-s0", 1, "Email: a@b.com (work)");
        let policy = Policy::default().with_entity("email", EntityRule::new(Action::Remove));
        let matches = vec![m("email", 7, 14)];
        let (masked, _) = apply_all(
            PdfSpanAdapter::new(&unit),
            &unit,
            &matches,
            &policy,
            &mut engine(),
        )
        .unwrap();
        assert_eq!(masked, "xxxxx: x@x.xxx (xxxx)");
    }
}
