//! PDF span adapter.
//!
//! The engine never parses PDF byte structure; an external extraction
//! capability supplies per-span text, and an external writer puts the masked
//! span text back. This adapter's current policy is coarse: if any accepted
//! match falls inside a span, the whole span is masked. That is a documented
//! interim limitation — the [`DocumentAdapter`] contract stays per-offset so
//! a bounding-box-precise adapter can replace only the matched sub-range
//! without touching reconciliation, policy, or token logic.

use super::apply::DocumentAdapter;
use crate::detect::ScanUnit;
use crate::error::{MaskerError, MaskerResult};

/// Adapter for one PDF-extracted text span.
#[derive(Debug)]
pub struct PdfSpanAdapter {
    unit_id: String,
    original: String,
    touched: bool,
}

impl PdfSpanAdapter {
    pub fn new(unit: &ScanUnit) -> Self {
        Self {
            unit_id: unit.id.clone(),
            original: unit.text.clone(),
            touched: false,
        }
    }

    /// Whole-span mask preserving layout: every alphanumeric becomes `x`,
    /// whitespace and punctuation survive.
    fn mask_span(text: &str) -> String {
        text.chars()
            .map(|c| if c.is_alphanumeric() { 'x' } else { c })
            .collect()
    }
}

impl DocumentAdapter for PdfSpanAdapter {
    fn replace_range(&mut self, start: usize, end: usize, _replacement: &str) -> MaskerResult<()> {
        if start >= end
            || end > self.original.len()
            || !self.original.is_char_boundary(start)
            || !self.original.is_char_boundary(end)
        {
            return Err(MaskerError::Adapter {
                unit_id: self.unit_id.clone(),
                reason: format!("replacement range {start}..{end} out of bounds"),
            });
        }
        self.touched = true;
        Ok(())
    }

    fn into_output(self) -> String {
        if self.touched {
            Self::mask_span(&self.original)
        } else {
            self.original
        }
    }
}
