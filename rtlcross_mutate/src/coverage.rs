//! Byte coverage over a mutation seed.

use crate::editor::Replacement;

/// A boolean vector marking which seed bytes mutations have touched.
#[derive(Debug, Clone)]
pub struct ByteCoverage {
    covered: Vec<bool>,
}

impl ByteCoverage {
    /// Fresh coverage over `len` bytes, all untouched.
    #[must_use]
    pub fn new(len: usize) -> Self {
        Self {
            covered: vec![false; len],
        }
    }

    fn clamp(&self, offset: usize) -> usize {
        offset.min(self.covered.len())
    }

    /// Scores a candidate: bytes it would newly touch times bytes already
    /// covered.
    #[must_use]
    pub fn query(&self, replacements: &[Replacement]) -> f64 {
        let newly_touched: i64 = replacements
            .iter()
            .map(|r| {
                let fresh = self.covered[self.clamp(r.start_byte)..self.clamp(r.end_byte)]
                    .iter()
                    .filter(|&&b| !b)
                    .count() as i64;
                fresh + r.substitute.len() as i64 - (r.end_byte as i64 - r.start_byte as i64)
            })
            .sum();
        let already_covered = self.covered.iter().filter(|&&b| b).count() as i64;
        (newly_touched * already_covered) as f64
    }

    /// Marks every byte inside the replacements as covered and returns the
    /// covered fraction.
    pub fn update(&mut self, replacements: &[Replacement]) -> f64 {
        for replacement in replacements {
            let start = self.clamp(replacement.start_byte);
            let end = self.clamp(replacement.end_byte);
            for byte in &mut self.covered[start..end] {
                *byte = true;
            }
        }
        self.covered_ratio()
    }

    /// The fraction of covered bytes.
    #[must_use]
    pub fn covered_ratio(&self) -> f64 {
        if self.covered.is_empty() {
            return 0.0;
        }
        self.covered.iter().filter(|&&b| b).count() as f64 / self.covered.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_never_uncovers() {
        let mut cov = ByteCoverage::new(10);
        let first = cov.update(&[Replacement::new(2, 5, "xyz")]);
        let second = cov.update(&[Replacement::new(4, 6, "ab")]);

        assert!((first - 0.3).abs() < 1e-9);
        assert!(second >= first);
    }

    #[test]
    fn query_multiplies_fresh_by_covered() {
        let mut cov = ByteCoverage::new(10);
        cov.update(&[Replacement::new(0, 2, "..")]);

        // 3 fresh bytes, 2 already covered.
        let score = cov.query(&[Replacement::new(5, 8, "...")]);
        assert!((score - 6.0).abs() < 1e-9);

        // Nothing covered yet means every candidate scores zero.
        let fresh = ByteCoverage::new(10);
        assert!((fresh.query(&[Replacement::new(0, 4, "....")]) - 0.0).abs() < 1e-9);
    }

    #[test]
    fn out_of_range_replacements_are_clamped() {
        let mut cov = ByteCoverage::new(4);
        cov.update(&[Replacement::new(2, 9, "")]);
        assert!((cov.covered_ratio() - 0.5).abs() < 1e-9);
    }
}
