//! Deterministic pseudonymization and template expansion.
//!
//! Tokens are derived from an HMAC-SHA256 digest keyed by the caller's
//! [`KeyScope`], computed over the entity type and the normalized value.
//! Identical `(value, type, key)` always yields the identical token, within
//! and across runs; different keys make tokens for the same value
//! computationally unlinkable.
//!
//! Template placeholders: `{hashN}` (N hex chars of the keyed digest),
//! `{index}` (1-based per-type occurrence counter within the document),
//! `{date:FORMAT}` (redaction date, strftime), `{shape}` (digit→9, letter→A,
//! else unchanged). Everything else is literal text. Unsupported placeholders
//! are rejected by [`validate_template`], which the policy store runs at load
//! time.

use crate::error::{MaskerError, MaskerResult};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use once_cell::sync::Lazy;
use regex::Regex;
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Filler character used by format-preserving masks.
const FILLER: char = 'x';

// Separator between entity type and value in the HMAC message, so that
// ("ab", "c") and ("a", "bc") digest differently.
const HMAC_FIELD_SEPARATOR: char = '\u{241F}';

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("valid placeholder regex"));
static HASH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^hash([0-9]+)$").expect("valid hash placeholder regex"));

/// Who supplies the pseudonymization key and how long it lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScopeKind {
    /// Ephemeral per invocation unless the caller persists it.
    Document,
    /// Caller-supplied and stable across invocations.
    Environment,
}

/// The key material for one engine call.
#[derive(Clone)]
pub struct KeyScope {
    pub kind: KeyScopeKind,
    key: Vec<u8>,
}

impl KeyScope {
    /// Wraps caller-supplied, cross-invocation key material.
    pub fn environment(key: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: KeyScopeKind::Environment,
            key: key.into(),
        }
    }

    /// Wraps a document-scoped key.
    pub fn document(key: impl Into<Vec<u8>>) -> Self {
        Self {
            kind: KeyScopeKind::Document,
            key: key.into(),
        }
    }

    /// Generates a fresh random document-scoped key. Tokens from different
    /// invocations are unlinkable unless the caller persists the key.
    pub fn ephemeral() -> Self {
        use rand::RngCore;
        let mut key = vec![0u8; 32];
        rand::thread_rng().fill_bytes(&mut key);
        Self::document(key)
    }

    pub fn key_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for KeyScope {
    // Key bytes never appear in debug output.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyScope")
            .field("kind", &self.kind)
            .field("key_len", &self.key.len())
            .finish()
    }
}

/// Validates that every `{...}` reference in a template is supported.
pub fn validate_template(template: &str) -> MaskerResult<()> {
    for caps in PLACEHOLDER_RE.captures_iter(template) {
        let inner = &caps[1];
        if let Some(hash) = HASH_RE.captures(inner) {
            let n: usize = hash[1]
                .parse()
                .map_err(|_| unsupported_placeholder(inner))?;
            if n == 0 || n > 64 {
                return Err(MaskerError::config(
                    "template",
                    format!("{{hash{n}}} must request between 1 and 64 hex chars"),
                ));
            }
            continue;
        }
        if inner == "index" || inner == "shape" {
            continue;
        }
        if let Some(fmt) = inner.strip_prefix("date:") {
            if StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error)) {
                return Err(MaskerError::config(
                    "template",
                    format!("invalid date format '{fmt}'"),
                ));
            }
            continue;
        }
        return Err(unsupported_placeholder(inner));
    }
    Ok(())
}

fn unsupported_placeholder(inner: &str) -> MaskerError {
    MaskerError::config(
        "template",
        format!("unsupported placeholder '{{{inner}}}'"),
    )
}

/// Default pseudonymization template for an entity type, used when the
/// policy entry supplies none.
pub fn default_template(entity_type: &str) -> String {
    match entity_type {
        "person_name" => "NAME_{hash8}".to_string(),
        "address" => "ADDRESS_{hash6}".to_string(),
        "email" => "EMAIL_{hash6}@mask.local".to_string(),
        "postal_code" => "ZIP_{hash4}".to_string(),
        other => format!("{}_{{hash6}}", other.to_ascii_uppercase()),
    }
}

/// Character-class skeleton of a value: digit→9, letter→A, else unchanged.
pub fn shape(value: &str) -> String {
    value
        .chars()
        .map(|c| {
            if c.is_ascii_digit() {
                '9'
            } else if c.is_alphabetic() {
                'A'
            } else {
                c
            }
        })
        .collect()
}

/// Keyed token engine for one document invocation.
///
/// Holds the per-type occurrence counters backing `{index}` and the redaction
/// date backing `{date:FORMAT}`; both reset with each new engine value, so a
/// `TokenEngine` must not be shared across documents.
pub struct TokenEngine {
    scope: KeyScope,
    counters: HashMap<String, u64>,
    redaction_date: DateTime<Utc>,
}

impl TokenEngine {
    pub fn new(scope: KeyScope) -> Self {
        Self {
            scope,
            counters: HashMap::new(),
            redaction_date: Utc::now(),
        }
    }

    /// Pins the redaction date, for reproducible output in tests.
    pub fn with_redaction_date(mut self, date: DateTime<Utc>) -> Self {
        self.redaction_date = date;
        self
    }

    /// Lower-cases and whitespace-collapses a value before digesting, so
    /// formatting variants of the same value map to the same token.
    pub fn normalize(value: &str) -> String {
        value
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }

    /// Full keyed digest (64 hex chars) over the normalized value.
    pub fn digest_hex(&self, value: &str, entity_type: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.scope.key_bytes())
            .expect("HMAC accepts any key length");
        mac.update(entity_type.as_bytes());
        mac.update(HMAC_FIELD_SEPARATOR.to_string().as_bytes());
        mac.update(Self::normalize(value).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Expands `template` for one occurrence of `value`, advancing the
    /// per-type `{index}` counter.
    pub fn tokenize(
        &mut self,
        value: &str,
        entity_type: &str,
        template: &str,
    ) -> MaskerResult<String> {
        validate_template(template)?;
        let digest = self.digest_hex(value, entity_type);
        let index = self.next_index(entity_type);
        let normalized = Self::normalize(value);

        let mut out = String::with_capacity(template.len());
        let mut last = 0;
        for caps in PLACEHOLDER_RE.captures_iter(template) {
            let whole = caps.get(0).expect("capture 0 always present");
            out.push_str(&template[last..whole.start()]);
            let inner = &caps[1];
            if let Some(hash) = HASH_RE.captures(inner) {
                let n: usize = hash[1].parse().expect("validated above");
                out.push_str(&digest[..n]);
            } else if inner == "index" {
                out.push_str(&index.to_string());
            } else if inner == "shape" {
                out.push_str(&shape(&normalized));
            } else if let Some(fmt) = inner.strip_prefix("date:") {
                out.push_str(&self.redaction_date.format(fmt).to_string());
            }
            last = whole.end();
        }
        out.push_str(&template[last..]);
        Ok(out)
    }

    /// Same-length mask: `keep_head`/`keep_tail` original characters are
    /// copied verbatim (the only literal retention, by explicit
    /// configuration) and the remainder becomes a fixed filler.
    ///
    /// Keep counts exceeding the value are clamped, head first.
    pub fn format_preserve(value: &str, keep_head: usize, keep_tail: usize) -> String {
        let chars: Vec<char> = value.chars().collect();
        let head = keep_head.min(chars.len());
        let tail = keep_tail.min(chars.len() - head);
        let mut out = String::with_capacity(value.len());
        out.extend(&chars[..head]);
        out.extend(std::iter::repeat(FILLER).take(chars.len() - head - tail));
        out.extend(&chars[chars.len() - tail..]);
        out
    }

    /// 1-based per-type occurrence counter.
    fn next_index(&mut self, entity_type: &str) -> u64 {
        let counter = self.counters.entry(entity_type.to_string()).or_insert(0);
        *counter += 1;
        *counter
    }
}
