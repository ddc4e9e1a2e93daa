//! Per-entity-type masking policy.
//!
//! A policy maps entity types to an action, a confidence threshold, an
//! optional template, and optional keep-head/keep-tail counts, with a
//! `default` entry for unconfigured types. The engine never merges policy
//! sources: the caller supplies one fully-resolved effective policy per call,
//! and it is immutable for the duration of that call.
//!
//! Validation happens at load time — bad actions, out-of-range thresholds and
//! unsupported template placeholders are configuration errors before any text
//! is processed.

use crate::detect::EntityMatch;
use crate::error::{MaskerError, MaskerResult};
use crate::token;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to do with an accepted match of a given type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Replace with nothing. Templates are ignored; never recoverable.
    Remove,
    /// Replace with a keyed, deterministic token expanded from a template.
    Pseudonymize,
    /// Replace with a same-length mask; `keep_head`/`keep_tail` may retain
    /// original characters, and only here.
    FormatPreserve,
    /// Replace with a fixed configured constant regardless of value.
    Placeholder,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remove => "remove",
            Self::Pseudonymize => "pseudonymize",
            Self::FormatPreserve => "format_preserve",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Policy entry for one entity type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRule {
    pub action: Action,
    /// Matches with confidence below this are not masked (kept in the audit
    /// trail tagged below-threshold). Defaults to 0.
    #[serde(default)]
    pub threshold: f64,
    /// Template for `pseudonymize` (expanded) and `placeholder` (literal).
    #[serde(default)]
    pub template: Option<String>,
    /// Original characters copied verbatim at the head (`format_preserve`
    /// only).
    #[serde(default)]
    pub keep_head: usize,
    /// Original characters copied verbatim at the tail (`format_preserve`
    /// only).
    #[serde(default)]
    pub keep_tail: usize,
}

impl EntityRule {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            threshold: 0.0,
            template: None,
            keep_head: 0,
            keep_tail: 0,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = Some(template.into());
        self
    }

    pub fn with_keep_tail(mut self, keep_tail: usize) -> Self {
        self.keep_tail = keep_tail;
        self
    }

    pub fn with_keep_head(mut self, keep_head: usize) -> Self {
        self.keep_head = keep_head;
        self
    }

    fn validate(&self, entity_type: &str) -> MaskerResult<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(MaskerError::config(
                entity_type,
                format!("threshold {} outside [0, 1]", self.threshold),
            ));
        }
        if (self.keep_head > 0 || self.keep_tail > 0) && self.action != Action::FormatPreserve {
            return Err(MaskerError::config(
                entity_type,
                format!(
                    "keep_head/keep_tail are only permitted with format_preserve, not {}",
                    self.action.as_str()
                ),
            ));
        }
        // Placeholder templates are literal constants; everything else with a
        // template must expand cleanly.
        if self.action == Action::Pseudonymize {
            if let Some(template) = &self.template {
                token::validate_template(template)
                    .map_err(|e| MaskerError::config(entity_type, e.to_string()))?;
            }
        }
        Ok(())
    }
}

/// The effective policy for one engine call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Policy {
    /// Per-entity-type entries.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityRule>,
    /// Fallback entry for types not listed in `entities`. Absent means
    /// unconfigured types are no-ops.
    #[serde(default, rename = "default", skip_serializing_if = "Option::is_none")]
    pub default_rule: Option<EntityRule>,
}

/// How the policy disposes of one reconciled match.
#[derive(Debug, Clone, Copy)]
pub enum Disposition<'p> {
    /// Mask it with this rule.
    Apply(&'p EntityRule),
    /// Confidence below the resolved threshold: audit only, never actioned.
    BelowThreshold,
    /// No entry and no default: no-op.
    Unconfigured,
}

impl Policy {
    /// Parses and validates a policy from its JSON wire shape.
    pub fn from_json(raw: &str) -> MaskerResult<Self> {
        let policy: Self = serde_json::from_str(raw)
            .map_err(|e| MaskerError::config("policy", e.to_string()))?;
        policy.validate()?;
        Ok(policy)
    }

    /// Validates every entry. Called by [`Policy::from_json`]; callers
    /// building policies in code should call it before use.
    pub fn validate(&self) -> MaskerResult<()> {
        for (entity_type, rule) in &self.entities {
            rule.validate(entity_type)?;
        }
        if let Some(rule) = &self.default_rule {
            rule.validate("default")?;
        }
        Ok(())
    }

    /// Resolves the rule for an entity type: its own entry, else the
    /// `default` entry, else `None` (no-op).
    pub fn resolve(&self, entity_type: &str) -> Option<&EntityRule> {
        self.entities
            .get(entity_type)
            .or(self.default_rule.as_ref())
    }

    /// Applies the threshold filter to one reconciled match.
    pub fn disposition(&self, m: &EntityMatch) -> Disposition<'_> {
        match self.resolve(&m.entity_type) {
            None => Disposition::Unconfigured,
            Some(rule) if m.confidence < rule.threshold => Disposition::BelowThreshold,
            Some(rule) => Disposition::Apply(rule),
        }
    }

    /// Adds or replaces one entity entry (builder-style, mainly for tests
    /// and embedding callers).
    pub fn with_entity(mut self, entity_type: impl Into<String>, rule: EntityRule) -> Self {
        self.entities.insert(entity_type.into(), rule);
        self
    }

    pub fn with_default(mut self, rule: EntityRule) -> Self {
        self.default_rule = Some(rule);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{EntityMatch, MatchSource};

    fn match_with(entity_type: &str, confidence: f64) -> EntityMatch {
        EntityMatch {
            entity_type: entity_type.to_string(),
            start: 0,
            end: 5,
            confidence,
            source: MatchSource::Rule,
            unit_id: "doc".to_string(),
            detector_rank: 0,
        }
    }

    #[test]
    fn test_wire_shape_round_trip() {
        let raw = r#"{
            "entities": {
                "email": {"action": "pseudonymize", "threshold": 0.5, "template": "EMAIL_{hash6}@mask.local"},
                "phone": {"action": "format_preserve", "keep_tail": 4}
            },
            "default": {"action": "remove", "threshold": 0.9}
        }"#;
        let policy = Policy::from_json(raw).unwrap();
        assert_eq!(policy.entities.len(), 2);
        assert_eq!(policy.entities["phone"].action, Action::FormatPreserve);
        assert_eq!(policy.entities["phone"].keep_tail, 4);
        assert_eq!(policy.default_rule.as_ref().unwrap().action, Action::Remove);
    }

    #[test]
    fn test_unknown_action_is_configuration_error() {
        let raw = r#"{"entities": {"email": {"action": "shred"}}}"#;
        let err = Policy::from_json(raw).unwrap_err();
        assert!(matches!(err, MaskerError::Configuration { .. }));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let raw = r#"{"entities": {"email": {"action": "remove", "threshold": 1.5}}}"#;
        assert!(Policy::from_json(raw).is_err());
    }

    #[test]
    fn test_unsupported_placeholder_fails_at_validation() {
        let raw = r#"{"entities": {"email": {"action": "pseudonymize", "template": "X_{orig}"}}}"#;
        let err = Policy::from_json(raw).unwrap_err();
        assert!(err.to_string().contains("orig"));
    }

    #[test]
    fn test_keep_parts_require_format_preserve() {
        let raw = r#"{"entities": {"email": {"action": "remove", "keep_tail": 4}}}"#;
        assert!(Policy::from_json(raw).is_err());
    }

    #[test]
    fn test_resolve_falls_back_to_default_then_noop() {
        let policy = Policy::default()
            .with_entity("email", EntityRule::new(Action::Remove))
            .with_default(EntityRule::new(Action::Placeholder));
        assert_eq!(policy.resolve("email").unwrap().action, Action::Remove);
        assert_eq!(policy.resolve("phone").unwrap().action, Action::Placeholder);

        let bare = Policy::default().with_entity("email", EntityRule::new(Action::Remove));
        assert!(bare.resolve("phone").is_none());
    }

    #[test]
    fn test_disposition_threshold_filter() {
        let policy = Policy::default()
            .with_entity("email", EntityRule::new(Action::Remove).with_threshold(0.8));
        assert!(matches!(
            policy.disposition(&match_with("email", 0.9)),
            Disposition::Apply(_)
        ));
        assert!(matches!(
            policy.disposition(&match_with("email", 0.7)),
            Disposition::BelowThreshold
        ));
        assert!(matches!(
            policy.disposition(&match_with("phone", 0.99)),
            Disposition::Unconfigured
        ));
    }
}
