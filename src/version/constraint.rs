//! Version constraint expressions
//!
//! Supports the constraint syntax used by module sources:
//! - `1.2.3` or `= 1.2.3` - exact
//! - `!= 1.2.3` - exclusion
//! - `> 1.2.3`, `>= 1.2.3`, `< 1.2.3`, `<= 1.2.3` - comparisons
//! - `~> 1.2` - pessimistic: `>= 1.2.0, < 1.3.0`
//! - `~> 1` - pessimistic on the major only: `>= 1.0.0, < 2.0.0`
//! - `a, b` - all terms must hold
//!
//! Versions inside a constraint may be partial (`1`, `1.2`) and are padded with
//! zeros. An empty constraint or `*` matches everything.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::Version;

use crate::version::error::VersionError;
use crate::version::semver::{compare, parse_partial};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    Exact,
    NotEqual,
    Greater,
    GreaterEq,
    Less,
    LessEq,
    Pessimistic,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Term {
    operator: Operator,
    version: Version,
    /// Number of version components written explicitly
    precision: usize,
}

impl Term {
    fn parse(term: &str) -> Option<Self> {
        let term = term.trim();

        // Longest operators first so ">=" is not read as ">"
        let (operator, rest) = if let Some(rest) = term.strip_prefix("~>") {
            (Operator::Pessimistic, rest)
        } else if let Some(rest) = term.strip_prefix(">=") {
            (Operator::GreaterEq, rest)
        } else if let Some(rest) = term.strip_prefix("<=") {
            (Operator::LessEq, rest)
        } else if let Some(rest) = term.strip_prefix("!=") {
            (Operator::NotEqual, rest)
        } else if let Some(rest) = term.strip_prefix('>') {
            (Operator::Greater, rest)
        } else if let Some(rest) = term.strip_prefix('<') {
            (Operator::Less, rest)
        } else if let Some(rest) = term.strip_prefix('=') {
            (Operator::Exact, rest)
        } else {
            (Operator::Exact, term)
        };

        let (version, precision) = parse_partial(rest.trim())?;
        Some(Term {
            operator,
            version,
            precision,
        })
    }

    fn matches(&self, version: &Version) -> bool {
        let v = &self.version;
        let ordering = compare(version, v);
        match self.operator {
            Operator::Exact => ordering == Ordering::Equal,
            Operator::NotEqual => ordering != Ordering::Equal,
            Operator::Greater => ordering == Ordering::Greater,
            Operator::GreaterEq => ordering != Ordering::Less,
            Operator::Less => ordering == Ordering::Less,
            Operator::LessEq => ordering != Ordering::Greater,
            Operator::Pessimistic => {
                if ordering == Ordering::Less {
                    return false;
                }
                // The upper bound is compared on the numeric core so that
                // pre-releases of the next series (e.g. 1.3.0-beta for ~> 1.2)
                // stay excluded. A bound past u64::MAX leaves the series open.
                let core = (version.major, version.minor, version.patch);
                let next_major = v.major.checked_add(1).map(|major| (major, 0, 0));
                let upper = if self.precision <= 1 {
                    next_major
                } else {
                    match v.minor.checked_add(1) {
                        Some(minor) => Some((v.major, minor, 0)),
                        None => next_major,
                    }
                };
                upper.is_none_or(|upper| core < upper)
            }
        }
    }
}

/// A parsed version constraint: a conjunction of terms
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Constraint {
    raw: String,
    terms: Vec<Term>,
}

impl Constraint {
    /// A constraint that every version satisfies
    pub fn any() -> Self {
        Self::default()
    }

    pub fn parse(spec: &str) -> Result<Self, VersionError> {
        let trimmed = spec.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let terms = trimmed
            .split(',')
            .map(|part| {
                Term::parse(part).ok_or_else(|| VersionError::InvalidConstraint {
                    constraint: spec.to_string(),
                    reason: format!("cannot parse term '{}'", part.trim()),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            raw: trimmed.to_string(),
            terms,
        })
    }

    /// Check if a version satisfies every term
    pub fn matches(&self, version: &Version) -> bool {
        self.terms.iter().all(|term| term.matches(version))
    }

    pub fn is_any(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether any term names a pre-release version explicitly
    pub fn targets_prerelease(&self) -> bool {
        self.terms.iter().any(|term| !term.version.pre.is_empty())
    }
}

impl FromStr for Constraint {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_any() {
            f.write_str("*")
        } else {
            f.write_str(&self.raw)
        }
    }
}

/// Check whether `version` satisfies `constraint`
pub fn satisfies(version: &Version, constraint: &Constraint) -> bool {
    constraint.matches(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[rstest]
    #[case("1.2.3", "1.2.3", true)]
    #[case("1.2.3", "1.2.4", false)]
    #[case("= 1.2.3", "1.2.3", true)]
    #[case("!= 1.2.3", "1.2.3", false)]
    #[case("!= 1.2.3", "1.2.4", true)]
    #[case(">= 1.2.0", "1.2.0", true)]
    #[case(">= 1.2.0", "1.1.9", false)]
    #[case("> 1.2.0", "1.2.0", false)]
    #[case("<= 1.2.0", "1.2.0", true)]
    #[case("< 1.2.0", "1.2.0", false)]
    #[case(">=1.0.0, <2.0.0", "1.9.9", true)]
    #[case(">=1.0.0, <2.0.0", "2.0.0", false)]
    #[case("~> 1.2", "1.2.0", true)]
    #[case("~> 1.2", "1.2.5", true)]
    #[case("~> 1.2", "1.3.0", false)]
    #[case("~> 1.2", "1.3.0-beta", false)]
    #[case("~> 1.2", "2.0.0", false)]
    #[case("~> 1.2.3", "1.2.2", false)]
    #[case("~> 1.2.3", "1.2.9", true)]
    #[case("~> 1.2.3", "1.3.0", false)]
    #[case("~> 1", "1.9.0", true)]
    #[case("~> 1", "2.0.0", false)]
    #[case("~>1.2", "1.2.5", true)] // no space after operator
    #[case("~> 18446744073709551615", "18446744073709551615.3.0", true)] // no next major
    #[case("~> 1.18446744073709551615", "1.18446744073709551615.7", true)]
    #[case("~> 1.18446744073709551615", "2.0.0", false)]
    #[case("1.2.3", "1.2.3+build.5", true)] // build metadata is ignored
    #[case("> 1.2.3", "1.2.3+build.5", false)]
    #[case("", "0.0.1", true)]
    #[case("*", "5.0.0", true)]
    fn constraint_matches_expected(
        #[case] spec: &str,
        #[case] version: &str,
        #[case] expected: bool,
    ) {
        let constraint = Constraint::parse(spec).unwrap();
        assert_eq!(satisfies(&v(version), &constraint), expected);
    }

    #[rstest]
    #[case(">= banana")]
    #[case("~>")]
    #[case("1.0.0,")]
    #[case("^1.0.0")]
    #[case("1.2.3.4")]
    fn parse_rejects_malformed_constraints(#[case] spec: &str) {
        assert!(matches!(
            Constraint::parse(spec),
            Err(VersionError::InvalidConstraint { .. })
        ));
    }

    #[rstest]
    #[case(">= 1.0.0-beta", true)]
    #[case(">= 1.0.0", false)]
    #[case("", false)]
    fn targets_prerelease_detects_explicit_prerelease(
        #[case] spec: &str,
        #[case] expected: bool,
    ) {
        assert_eq!(
            Constraint::parse(spec).unwrap().targets_prerelease(),
            expected
        );
    }

    #[test]
    fn display_round_trips_the_expression() {
        assert_eq!(Constraint::parse(" ~> 1.2 ").unwrap().to_string(), "~> 1.2");
        assert_eq!(Constraint::any().to_string(), "*");
        assert_eq!(Constraint::parse(" >= 1.0.0 ").unwrap().to_string(), ">= 1.0.0");
    }
}
