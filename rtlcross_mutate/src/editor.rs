//! Low-level byte edits over a parsed source.

use tree_sitter::Point;

use crate::mutator::MutationError;

/// Replace `data[start_byte..end_byte]` with the substitute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// First replaced byte.
    pub start_byte: usize,
    /// One past the last replaced byte.
    pub end_byte: usize,
    /// The replacement bytes.
    pub substitute: Vec<u8>,
}

impl Replacement {
    /// A replacement of the given range.
    #[must_use]
    pub fn new(start_byte: usize, end_byte: usize, substitute: impl Into<Vec<u8>>) -> Self {
        Self {
            start_byte,
            end_byte,
            substitute: substitute.into(),
        }
    }

    /// An insertion at one byte offset.
    #[must_use]
    pub fn insert(at: usize, substitute: impl Into<Vec<u8>>) -> Self {
        Self::new(at, at, substitute)
    }
}

/// Applies a sorted, non-overlapping batch of replacements atomically.
#[derive(Debug)]
pub struct BytesEditor {
    data: Vec<u8>,
    replacements: Vec<Replacement>,
    /// First byte touched by the batch.
    pub start_byte: usize,
    /// One past the last byte touched (updated by [`BytesEditor::apply`]).
    pub end_byte: usize,
}

impl BytesEditor {
    /// Prepares a batch. Overlapping replacements are a caller bug and are
    /// rejected.
    pub fn new(
        data: Vec<u8>,
        replacements: impl IntoIterator<Item = Replacement>,
    ) -> Result<Self, MutationError> {
        let mut replacements: Vec<Replacement> = replacements.into_iter().collect();
        replacements.sort_by_key(|r| (r.start_byte, r.end_byte));
        if replacements.is_empty() {
            return Err(MutationError::Generator("empty replacement batch".into()));
        }
        for pair in replacements.windows(2) {
            if pair[0].end_byte > pair[1].start_byte {
                return Err(MutationError::Generator(format!(
                    "overlapping replacements at {}..{} and {}..{}",
                    pair[0].start_byte, pair[0].end_byte, pair[1].start_byte, pair[1].end_byte,
                )));
            }
        }
        let start_byte = replacements[0].start_byte;
        let end_byte = replacements[replacements.len() - 1].end_byte;
        Ok(Self {
            data,
            replacements,
            start_byte,
            end_byte,
        })
    }

    /// `(row, column)` of a byte offset.
    #[must_use]
    pub fn calculate_point(data: &[u8], offset: usize) -> Point {
        let offset = offset.min(data.len());
        let row = data[..offset].iter().filter(|&&b| b == b'\n').count();
        let line_start = data[..offset]
            .iter()
            .rposition(|&b| b == b'\n')
            .map_or(0, |p| p + 1);
        Point::new(row, offset - line_start)
    }

    /// Applies all scheduled replacements simultaneously, updating the data
    /// and the end offset.
    pub fn apply(&mut self) {
        let mut new_data = Vec::with_capacity(self.data.len());
        let mut cursor = 0usize;
        for replacement in &self.replacements {
            new_data.extend_from_slice(&self.data[cursor..replacement.start_byte]);
            new_data.extend_from_slice(&replacement.substitute);
            cursor = replacement.end_byte;
        }
        new_data.extend_from_slice(&self.data[cursor..]);

        self.end_byte = self
            .end_byte
            .wrapping_add(new_data.len().wrapping_sub(self.data.len()));
        self.data = new_data;
        self.replacements.clear();
    }

    /// The (possibly edited) data.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consumes the editor, returning the data.
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applies_batches_in_one_pass() {
        let mut editor = BytesEditor::new(
            b"abcdef".to_vec(),
            [
                Replacement::new(1, 2, "XY"),
                Replacement::insert(4, "_"),
            ],
        )
        .unwrap();
        editor.apply();

        assert_eq!(editor.data(), b"aXYcd_ef");
        assert_eq!(editor.end_byte, 6);
    }

    #[test]
    fn rejects_overlaps() {
        let result = BytesEditor::new(
            b"abcdef".to_vec(),
            [Replacement::new(1, 3, "X"), Replacement::new(2, 4, "Y")],
        );
        assert!(result.is_err());
    }

    #[test]
    fn points_count_rows_and_columns() {
        let data = b"one\ntwo\nthree";
        assert_eq!(BytesEditor::calculate_point(data, 0), Point::new(0, 0));
        assert_eq!(BytesEditor::calculate_point(data, 5), Point::new(1, 1));
        assert_eq!(BytesEditor::calculate_point(data, 8), Point::new(2, 0));
    }
}
