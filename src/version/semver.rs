use std::cmp::Ordering;

use semver::Version;

use crate::version::error::VersionError;

/// Parse a published version string.
///
/// Only full `major.minor.patch` versions with optional pre-release and build
/// metadata are accepted. A leading `v` or a partial version is rejected.
pub fn parse(version: &str) -> Result<Version, VersionError> {
    Version::parse(version).map_err(|e| VersionError::InvalidVersion {
        version: version.to_string(),
        reason: e.to_string(),
    })
}

/// Parse a version written inside a constraint, normalizing partial versions.
///
/// Returns the parsed version together with the number of components that were
/// written explicitly (used by the pessimistic operator).
///
/// Examples:
/// - "1" -> (1.0.0, 1)
/// - "1.2" -> (1.2.0, 2)
/// - "1.2.3-beta" -> (1.2.3-beta, 3)
pub(crate) fn parse_partial(version: &str) -> Option<(Version, usize)> {
    let core_end = version.find(['-', '+']).unwrap_or(version.len());
    let components = version[..core_end].split('.').count();

    let normalized = match components {
        1 if core_end == version.len() => format!("{}.0.0", version),
        2 if core_end == version.len() => format!("{}.0", version),
        3 => version.to_string(),
        _ => return None,
    };

    Version::parse(&normalized).ok().map(|v| (v, components))
}

/// Semantic-version precedence.
///
/// The numeric core decides first, then pre-release identifiers field by
/// field, a pre-release sorting before its release. Build metadata is ignored,
/// so `1.0.0+a` and `1.0.0+b` compare `Equal` and cannot both be published.
pub fn compare(a: &Version, b: &Version) -> Ordering {
    a.cmp_precedence(b)
}
