//! Command-line flag domains of the translators.

use rand::Rng;
use rand::seq::SliceRandom;

/// One configurable flag of a translator: a template like `"-x {}"` (or a
/// bare `"-x"`) with a finite value domain. Omitting the flag entirely is
/// always part of the space, hence the `+ 1` in [`CmdlineOption::count`].
#[derive(Debug, Clone)]
pub struct CmdlineOption {
    template: &'static str,
    domain: Vec<String>,
}

impl CmdlineOption {
    /// A bare flag without a value.
    #[must_use]
    pub const fn flag(template: &'static str) -> Self {
        Self {
            template,
            domain: Vec::new(),
        }
    }

    /// A flag with an explicit value domain.
    pub fn values<I, S>(template: &'static str, domain: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            template,
            domain: domain.into_iter().map(Into::into).collect(),
        }
    }

    /// A flag whose domain is a numeric range with a step.
    #[must_use]
    pub fn int_range(template: &'static str, start: i64, end: i64, step: i64) -> Self {
        Self {
            template,
            domain: (start..end)
                .step_by(step.unsigned_abs() as usize)
                .map(|v| v.to_string())
                .collect(),
        }
    }

    /// Number of distinct instantiations, counting the absent case.
    #[must_use]
    pub fn count(&self) -> usize {
        self.domain.len().max(1) + 1
    }

    /// Draws one concrete rendering of this flag.
    pub fn sample(&self, rng: &mut impl Rng) -> String {
        match self.domain.choose(rng) {
            Some(value) => self.template.replace("{}", value),
            None => self.template.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn bare_flags_count_present_and_absent() {
        assert_eq!(CmdlineOption::flag("--trace").count(), 2);
    }

    #[test]
    fn domains_count_every_value_plus_absent() {
        let option = CmdlineOption::values("--compiler {}", ["clang", "gcc", "msvc"]);
        assert_eq!(option.count(), 4);
    }

    #[test]
    fn ranges_enumerate_with_step() {
        let option = CmdlineOption::int_range("--converge-limit {}", 10, 100, 10);
        assert_eq!(option.count(), 10);
    }

    #[test]
    fn samples_render_the_template() {
        let mut rng = StdRng::seed_from_u64(7);
        let flag = CmdlineOption::flag("--trace");
        assert_eq!(flag.sample(&mut rng), "--trace");

        let valued = CmdlineOption::values("-j {}", ["4"]);
        assert_eq!(valued.sample(&mut rng), "-j 4");
    }
}
