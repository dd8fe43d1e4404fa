//! Latest-version selection
//!
//! Picks the greatest version satisfying a constraint, with explicit rules for
//! when pre-release versions may be chosen.

use semver::Version;

use crate::version::constraint::{Constraint, satisfies};
use crate::version::semver::compare;

/// Policy controlling whether pre-release versions may be selected
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrereleasePolicy {
    /// Select the greatest pre-release when no stable version satisfies
    pub allow_fallback: bool,
}

impl PrereleasePolicy {
    pub fn new(allow_fallback: bool) -> Self {
        Self { allow_fallback }
    }
}

/// Return the greatest version satisfying `constraint`
///
/// Pre-release versions are excluded unless
/// - the constraint names a pre-release version explicitly, or
/// - no stable version satisfies and the policy allows fallback.
///
/// The result depends only on the set of input versions: duplicates and input
/// order do not change it. An empty input yields `None`.
pub fn latest_satisfying<'a, I>(
    versions: I,
    constraint: &Constraint,
    policy: PrereleasePolicy,
) -> Option<Version>
where
    I: IntoIterator<Item = &'a Version>,
{
    let candidates: Vec<&Version> = versions
        .into_iter()
        .filter(|v| satisfies(v, constraint))
        .collect();

    if constraint.targets_prerelease() {
        return greatest(candidates.iter().copied());
    }

    if let Some(stable) = greatest(candidates.iter().copied().filter(|v| v.pre.is_empty())) {
        return Some(stable);
    }

    if policy.allow_fallback {
        greatest(candidates.iter().copied())
    } else {
        None
    }
}

fn greatest<'a>(versions: impl Iterator<Item = &'a Version>) -> Option<Version> {
    versions.max_by(|a, b| compare(a, b)).cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn versions(list: &[&str]) -> Vec<Version> {
        list.iter().map(|v| Version::parse(v).unwrap()).collect()
    }

    fn latest(list: &[&str], spec: &str, allow_fallback: bool) -> Option<String> {
        let set = versions(list);
        let constraint = Constraint::parse(spec).unwrap();
        latest_satisfying(&set, &constraint, PrereleasePolicy::new(allow_fallback))
            .map(|v| v.to_string())
    }

    #[rstest]
    #[case(&["1.0.0", "1.2.0", "2.0.0-beta"], "", false, Some("1.2.0"))]
    #[case(&["1.0.0", "1.2.0", "2.0.0-beta"], "", true, Some("1.2.0"))] // stable wins even with fallback
    #[case(&["1.0.0-beta", "1.0.0-rc.1"], "", false, None)]
    #[case(&["1.0.0-beta", "1.0.0-rc.1"], "", true, Some("1.0.0-rc.1"))]
    #[case(&["1.2.0", "1.2.5", "1.3.0", "2.0.0"], "~>1.2", false, Some("1.2.5"))]
    #[case(&["1.2.0", "1.2.5", "1.3.0", "2.0.0"], ">= 3.0.0", false, None)]
    #[case(&["1.0.0", "2.0.0-beta"], ">= 2.0.0-alpha", false, Some("2.0.0-beta"))] // explicit pre-release
    #[case(&[], "", true, None)]
    fn latest_satisfying_returns_expected(
        #[case] list: &[&str],
        #[case] spec: &str,
        #[case] allow_fallback: bool,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(
            latest(list, spec, allow_fallback),
            expected.map(|s| s.to_string())
        );
    }

    #[test]
    fn latest_satisfying_is_idempotent_and_order_invariant() {
        let constraint = Constraint::parse(">= 1.0.0, < 3.0.0").unwrap();
        let policy = PrereleasePolicy::default();

        let forward = versions(&["1.0.0", "1.5.0", "2.9.9", "3.0.0", "2.9.9-rc.1"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        let mut duplicated = forward.clone();
        duplicated.extend(forward.clone());

        let expected = Some(Version::new(2, 9, 9));
        assert_eq!(latest_satisfying(&forward, &constraint, policy), expected);
        assert_eq!(latest_satisfying(&reversed, &constraint, policy), expected);
        assert_eq!(latest_satisfying(&duplicated, &constraint, policy), expected);
    }
}
