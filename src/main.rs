//! Document masking CLI.
//!
//! This binary drives the docmask library: it reads a document (plain text,
//! or a JSON list of PDF-extracted text spans), an effective policy, and key
//! material, then either rewrites the document or produces a dry-run report.
//!
//! All file and environment access lives here — the engine itself does no
//! I/O. The environment key, if used, is read from `DOCMASK_KEY` once at this
//! boundary and threaded through as an explicit value.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use docmask::{DetectorBank, KeyScope, MaskingEngine, Mode, Policy, Report, ScanUnit};

/// Environment variable holding the hex-encoded environment-scoped key.
const ENV_KEY_VAR: &str = "DOCMASK_KEY";

/// Document Masking Tool
///
/// Detects and masks sensitive-data entities in text documents and
/// PDF-extracted text spans, driven by a per-entity-type policy.
#[derive(Parser)]
#[command(name = "docmask")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Input file: plain text, or a .json list of extracted PDF spans
    #[arg(short, long, value_name = "FILE")]
    input: PathBuf,

    /// Output file for the masked document (required unless --dry-run)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Policy file (JSON wire shape)
    #[arg(short, long, value_name = "FILE")]
    policy: PathBuf,

    /// Detect and report only; the document is not rewritten
    #[arg(long)]
    dry_run: bool,

    /// Report output file (defaults to stdout in dry-run mode)
    #[arg(short, long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Report representation
    #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
    format: ReportFormat,

    /// Key scope for deterministic pseudonymization
    #[arg(long, value_enum, default_value_t = KeyScopeArg::Document)]
    key_scope: KeyScopeArg,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    /// Structured report
    Json,
    /// Flattened per-match rows
    Csv,
    /// Per-type counts
    Summary,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KeyScopeArg {
    /// Fresh random key for this invocation; tokens are unlinkable across runs
    Document,
    /// Stable key from the DOCMASK_KEY environment variable (hex)
    Environment,
}

/// One extracted PDF span on the CLI boundary. Extraction itself is an
/// external capability; the engine never parses PDF bytes.
#[derive(Debug, Serialize, Deserialize)]
struct ExtractedSpan {
    span_id: String,
    page: u32,
    text: String,
}

/// Command handler owning the process-wide detector bank.
struct MaskingHandler {
    bank: DetectorBank,
    verbose: bool,
}

impl MaskingHandler {
    fn new(verbose: bool) -> Result<Self> {
        let bank = DetectorBank::builtin().context("Failed to load detector table")?;
        Ok(Self { bank, verbose })
    }

    fn run(&self, cli: &Cli) -> Result<()> {
        let policy_raw = std::fs::read_to_string(&cli.policy)
            .with_context(|| format!("Failed to read policy {}", cli.policy.display()))?;
        let policy = Policy::from_json(&policy_raw)?;

        let key_scope = build_key_scope(cli.key_scope)?;
        let (units, spans_input) = load_units(&cli.input)?;
        let mode = if cli.dry_run { Mode::DryRun } else { Mode::Redact };

        if self.verbose {
            println!("Input:  {}", cli.input.display());
            println!("Units:  {} scan unit(s)", units.len());
            println!("Mode:   {}", mode.as_str());
        }

        let document_id = cli
            .input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());

        let engine = MaskingEngine::new(&self.bank);
        let outcome = engine.run(&document_id, &units, &policy, key_scope, mode, None)?;

        if mode == Mode::Redact {
            let output = cli
                .output
                .as_ref()
                .context("--output is required unless --dry-run is set")?;
            write_masked(output, &outcome.masked_units, spans_input)?;
            if self.verbose {
                println!(
                    "Matches masked: {}",
                    outcome.report.matches.iter().filter(|m| m.applied).count()
                );
            }
            println!(
                "✓ Masked {} scan unit(s) → {}",
                outcome.masked_units.len(),
                output.display()
            );
            if !outcome.report.skipped_units.is_empty() {
                println!(
                    "⚠ {} unit(s) skipped and may still contain sensitive content",
                    outcome.report.skipped_units.len()
                );
            }
        }

        emit_report(&outcome.report, cli.format, cli.report.as_deref(), cli.dry_run)?;
        Ok(())
    }
}

/// Builds key material at the process boundary, the only place environment
/// variables are consulted.
fn build_key_scope(arg: KeyScopeArg) -> Result<KeyScope> {
    match arg {
        KeyScopeArg::Document => Ok(KeyScope::ephemeral()),
        KeyScopeArg::Environment => {
            let raw = std::env::var(ENV_KEY_VAR)
                .with_context(|| format!("{ENV_KEY_VAR} must be set for --key-scope environment"))?;
            let key = hex::decode(raw.trim())
                .with_context(|| format!("{ENV_KEY_VAR} must be hex-encoded"))?;
            anyhow::ensure!(!key.is_empty(), "{ENV_KEY_VAR} must not be empty");
            Ok(KeyScope::environment(key))
        }
    }
}

/// Loads scan units from the input file. JSON inputs are treated as
/// PDF-extracted span lists; everything else is UTF-8 text.
fn load_units(input: &Path) -> Result<(Vec<ScanUnit>, bool)> {
    let is_spans = input
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let raw = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    if is_spans {
        let spans: Vec<ExtractedSpan> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid span list in {}", input.display()))?;
        let units = spans
            .into_iter()
            .map(|s| ScanUnit::pdf_span(s.span_id, s.page, s.text))
            .collect();
        Ok((units, true))
    } else {
        Ok((vec![ScanUnit::document(raw)], false))
    }
}

/// Writes masked output: span-list inputs round-trip as a span list for the
/// external PDF writer, text inputs as plain text.
fn write_masked(
    output: &Path,
    masked: &[docmask::MaskedUnit],
    spans_input: bool,
) -> Result<()> {
    let rendered = if spans_input {
        let spans: Vec<ExtractedSpan> = masked
            .iter()
            .map(|u| ExtractedSpan {
                span_id: u.id.clone(),
                page: u.page.unwrap_or(0),
                text: u.text.clone(),
            })
            .collect();
        serde_json::to_string_pretty(&spans)?
    } else {
        masked
            .first()
            .map(|u| u.text.clone())
            .unwrap_or_default()
    };
    std::fs::write(output, rendered)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    Ok(())
}

fn emit_report(
    report: &Report,
    format: ReportFormat,
    path: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    // In redact mode the report is only written when a destination is given.
    if path.is_none() && !dry_run {
        return Ok(());
    }
    let rendered = match format {
        ReportFormat::Json => report.to_json()?,
        ReportFormat::Csv => report.flattened_csv()?,
        ReportFormat::Summary => report.summary_csv()?,
    };
    match path {
        Some(p) => {
            std::fs::write(p, &rendered)
                .with_context(|| format!("Failed to write {}", p.display()))?;
            println!("✓ Report → {}", p.display());
        }
        None => println!("{rendered}"),
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let handler = MaskingHandler::new(cli.verbose)?;
    handler.run(&cli)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_units_text_vs_spans() {
        let dir = tempfile::tempdir().unwrap();
        let text_path = dir.path().join("doc.txt");
        std::fs::write(&text_path, "hello").unwrap();
        let (units, spans_input) = load_units(&text_path).unwrap();
        assert!(!spans_input);
        assert_eq!(units.len(), 1);
        assert!(units[0].page.is_none());

        let spans_path = dir.path().join("doc.json");
        std::fs::write(
            &spans_path,
            r#"[{"span_id": "p1-s0", "page": 1, "text": "hi"}]"#,
        )
        .unwrap();
        let (units, spans_input) = load_units(&spans_path).unwrap();
        assert!(spans_input);
        assert_eq!(units[0].page, Some(1));
    }

    #[test]
    fn test_environment_key_scope_requires_var() {
        // Runs without DOCMASK_KEY set in the test environment.
        if std::env::var(ENV_KEY_VAR).is_err() {
            assert!(build_key_scope(KeyScopeArg::Environment).is_err());
        }
        assert!(build_key_scope(KeyScopeArg::Document).is_ok());
    }
}
