//! Shared helpers for integration tests.

use docmask::{
    Action, DetectorBank, EntityRule, KeyScope, MaskingEngine, Mode, Policy, Report, ScanUnit,
};

/// Deterministic environment-scoped key for tests.
pub fn test_key() -> KeyScope {
    KeyScope::environment(b"integration-test-key".to_vec())
}

/// Policy used by most scenarios: pseudonymized emails, tail-preserving
/// phones.
pub fn email_phone_policy() -> Policy {
    Policy::default()
        .with_entity(
            "email",
            EntityRule::new(Action::Pseudonymize).with_template("EMAIL_{hash6}@mask.local"),
        )
        .with_entity(
            "phone",
            EntityRule::new(Action::FormatPreserve).with_keep_tail(4),
        )
}

/// Runs a full redact pass over one text document with the builtin bank.
pub fn redact_text(text: &str, policy: &Policy, key: KeyScope) -> (String, Report) {
    let bank = DetectorBank::builtin().expect("builtin table compiles");
    let engine = MaskingEngine::new(&bank);
    let units = vec![ScanUnit::document(text)];
    let outcome = engine
        .run("test-doc", &units, policy, key, Mode::Redact, None)
        .expect("engine run succeeds");
    let masked = outcome
        .masked_units
        .first()
        .map(|u| u.text.clone())
        .unwrap_or_default();
    (masked, outcome.report)
}

/// Runs a dry-run pass over one text document with the builtin bank.
pub fn dry_run_text(text: &str, policy: &Policy, key: KeyScope) -> Report {
    let bank = DetectorBank::builtin().expect("builtin table compiles");
    let engine = MaskingEngine::new(&bank);
    let units = vec![ScanUnit::document(text)];
    engine
        .run("test-doc", &units, policy, key, Mode::DryRun, None)
        .expect("engine run succeeds")
        .report
}
