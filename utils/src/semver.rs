use std::str::FromStr;

use miette::bail;

/// A leniently parsed tool version such as `v1.7` or `1.9.1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version(semver::Version);

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Version {
    type Err = miette::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let Ok(parsed_ver) = lenient_semver::parse(s.trim()) else {
            bail!("Failed to parse version {s}");
        };
        Ok(Self(parsed_ver))
    }
}

impl Version {
    /// Checks whether `version` is older than `minimum`.
    ///
    /// Pre-releases sort before their release. A version that
    /// cannot be parsed is treated as older so callers fall back
    /// to the most compatible behavior.
    #[must_use]
    pub fn is_below(version: &str, minimum: &str) -> bool {
        match (version.parse::<Self>(), minimum.parse::<Self>()) {
            (Ok(version), Ok(minimum)) => version < minimum,
            _ => true,
        }
    }
}
