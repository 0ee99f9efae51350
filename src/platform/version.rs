//! Platform version and edition.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::SonarError;

/// A `major.minor.patch` platform version, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// The first `digits` components joined with dots.
    pub fn to_string_digits(&self, digits: usize) -> String {
        [self.major, self.minor, self.patch]
            .iter()
            .take(digits.clamp(1, 3))
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(".")
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl FromStr for Version {
    type Err = SonarError;

    /// Parse `9.9.0.65466` or `10.2`; components past the third are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.trim().split('.').map(|p| p.parse::<u32>());
        let mut next = |required: bool| match parts.next() {
            Some(Ok(n)) => Ok(n),
            None if !required => Ok(0),
            _ => Err(SonarError::InvalidData(format!("invalid version '{s}'"))),
        };
        Ok(Self::new(next(true)?, next(false)?, next(false)?))
    }
}

/// Platform license tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edition {
    Community,
    Developer,
    Enterprise,
    #[serde(alias = "data center")]
    Datacenter,
}

impl Edition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Edition::Community => "community",
            Edition::Developer => "developer",
            Edition::Enterprise => "enterprise",
            Edition::Datacenter => "datacenter",
        }
    }

    /// Portfolios and project zip import only exist in the upper tiers.
    pub fn is_enterprise_or_above(&self) -> bool {
        matches!(self, Edition::Enterprise | Edition::Datacenter)
    }
}

impl fmt::Display for Edition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Edition {
    type Err = SonarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "").as_str() {
            "community" => Ok(Edition::Community),
            "developer" => Ok(Edition::Developer),
            "enterprise" => Ok(Edition::Enterprise),
            "datacenter" => Ok(Edition::Datacenter),
            other => Err(SonarError::InvalidData(format!("unknown edition '{other}'"))),
        }
    }
}

/// Which upgrade recommendation applies to a version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionBand {
    BelowLts,
    BelowLatest,
    Current,
}

/// LTS used as the lower upgrade boundary.
pub const LTS: Version = Version::new(8, 9, 0);
/// Oldest version considered current.
pub const LATEST: Version = Version::new(9, 2, 0);

impl VersionBand {
    /// Partition the version space into exactly three bands.
    pub fn of(version: Version) -> Self {
        if version < LTS {
            VersionBand::BelowLts
        } else if version < LATEST {
            VersionBand::BelowLatest
        } else {
            VersionBand::Current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_build_number_is_ignored() {
        let v: Version = "9.9.0.65466".parse().unwrap();
        assert_eq!(v, Version::new(9, 9, 0));
        assert_eq!(v.to_string_digits(2), "9.9");
    }

    #[test]
    fn test_parse_short_version() {
        assert_eq!("10.2".parse::<Version>().unwrap(), Version::new(10, 2, 0));
        assert!("x.y".parse::<Version>().is_err());
    }

    #[test]
    fn test_version_ordering_is_lexicographic() {
        assert!(Version::new(8, 9, 10) < Version::new(9, 0, 0));
        assert!(Version::new(9, 10, 0) > Version::new(9, 9, 5));
    }

    #[test]
    fn test_version_bands_partition_the_space() {
        let samples = [
            Version::new(7, 9, 6),
            Version::new(8, 8, 99),
            Version::new(8, 9, 0),
            Version::new(9, 1, 9),
            Version::new(9, 2, 0),
            Version::new(10, 0, 0),
        ];
        for v in samples {
            let below_lts = v < LTS;
            let below_latest = !below_lts && v < LATEST;
            let current = v >= LATEST;
            assert_eq!(
                [below_lts, below_latest, current].iter().filter(|b| **b).count(),
                1,
                "version {v}"
            );
            let expected = if below_lts {
                VersionBand::BelowLts
            } else if below_latest {
                VersionBand::BelowLatest
            } else {
                VersionBand::Current
            };
            assert_eq!(VersionBand::of(v), expected);
        }
    }

    #[test]
    fn test_edition_parse() {
        assert_eq!("Data Center".parse::<Edition>().unwrap(), Edition::Datacenter);
        assert!(Edition::Enterprise.is_enterprise_or_above());
        assert!(!Edition::Developer.is_enterprise_or_above());
    }
}
