//! Text document adapter: direct range substitution over the whole document.

use super::apply::DocumentAdapter;
use crate::detect::ScanUnit;
use crate::error::{MaskerError, MaskerResult};

/// Adapter for plain text input, where the scan unit is the entire document
/// and substitution is direct.
#[derive(Debug)]
pub struct TextAdapter {
    unit_id: String,
    original_len: usize,
    text: String,
}

impl TextAdapter {
    pub fn new(unit: &ScanUnit) -> Self {
        Self {
            unit_id: unit.id.clone(),
            original_len: unit.text.len(),
            text: unit.text.clone(),
        }
    }
}

impl DocumentAdapter for TextAdapter {
    fn replace_range(&mut self, start: usize, end: usize, replacement: &str) -> MaskerResult<()> {
        // Ranges arrive in descending start order, so the prefix holding this
        // range is still untouched and original offsets remain valid.
        if start >= end || end > self.original_len || end > self.text.len() {
            return Err(MaskerError::Adapter {
                unit_id: self.unit_id.clone(),
                reason: format!("replacement range {start}..{end} out of bounds"),
            });
        }
        if !self.text.is_char_boundary(start) || !self.text.is_char_boundary(end) {
            return Err(MaskerError::Adapter {
                unit_id: self.unit_id.clone(),
                reason: format!("replacement range {start}..{end} splits a character"),
            });
        }
        self.text.replace_range(start..end, replacement);
        Ok(())
    }

    fn into_output(self) -> String {
        self.text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_substitution() {
        let unit = ScanUnit::document("hello world");
        let mut adapter = TextAdapter::new(&unit);
        adapter.replace_range(6, 11, "there").unwrap();
        assert_eq!(adapter.into_output(), "hello there");
    }

    #[test]
    fn test_out_of_bounds_range_rejected() {
        let unit = ScanUnit::document("short");
        let mut adapter = TextAdapter::new(&unit);
        assert!(adapter.replace_range(2, 99, "x").is_err());
        assert!(adapter.replace_range(3, 3, "x").is_err());
    }

    #[test]
    fn test_char_boundary_enforced() {
        let unit = ScanUnit::document("héllo");
        let mut adapter = TextAdapter::new(&unit);
        // 'é' occupies bytes 1..3; splitting it is an adapter error.
        assert!(adapter.replace_range(1, 2, "x").is_err());
    }
}
