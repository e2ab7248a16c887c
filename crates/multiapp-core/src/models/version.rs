//! Numeric dot-separated plugin versions.
//!
//! A version is exactly three components. Parsing never fails: a component
//! that is missing or not a plain non-negative integer counts as zero, and
//! anything after the third component is ignored. This keeps comparison total
//! for whatever a remote catalog or a hand-edited marker file contains.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// A `major.minor.patch` version.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl Version {
    pub const ZERO: Version = Version::new(0, 0, 0);

    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse with coercion: `"1.x"` is `1.0.0`, `"abc"` is `0.0.0`.
    ///
    /// A segment is numeric only if it is all ASCII digits and fits in a
    /// `u64`; anything else, signs included, counts as 0.
    pub fn parse(input: &str) -> Self {
        let mut parts = input.trim().split('.').map(parse_segment);

        Self {
            major: parts.next().unwrap_or(0),
            minor: parts.next().unwrap_or(0),
            patch: parts.next().unwrap_or(0),
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

fn parse_segment(segment: &str) -> u64 {
    let segment = segment.trim();
    if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    segment.parse().unwrap_or(0)
}

impl FromStr for Version {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Version::parse(s))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Version::parse(&raw))
    }
}

/// Compare two version strings.
///
/// `Less` means `a` is older than `b`.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    Version::parse(a).cmp(&Version::parse(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_coerces_bad_segments() {
        assert_eq!(Version::parse("1.2.3"), Version::new(1, 2, 3));
        assert_eq!(Version::parse("1.2"), Version::new(1, 2, 0));
        assert_eq!(Version::parse("1.x.3"), Version::new(1, 0, 3));
        assert_eq!(Version::parse("abc"), Version::ZERO);
        assert_eq!(Version::parse(""), Version::ZERO);
        assert_eq!(Version::parse("-1.2.3"), Version::new(0, 2, 3));
        assert_eq!(Version::parse("1.2.3.4.5"), Version::new(1, 2, 3));
        assert_eq!(Version::parse(" 2.0.1\n"), Version::new(2, 0, 1));
    }

    #[test]
    fn test_parse_rejects_signs_and_overflow() {
        assert_eq!(Version::parse("+5.1.0"), Version::new(0, 1, 0));
        assert_eq!(Version::parse("1.+2.3"), Version::new(1, 0, 3));
        assert_eq!(
            Version::parse("99999999999999999999.2.3"),
            Version::new(0, 2, 3)
        );
        assert_eq!(
            Version::parse("18446744073709551615.0.1"),
            Version::new(u64::MAX, 0, 1)
        );
    }

    #[test]
    fn test_compare_examples() {
        assert_eq!(compare_versions("1.2.3", "1.2.3"), Ordering::Equal);
        assert_eq!(compare_versions("1.10.0", "1.2.0"), Ordering::Greater);
        assert_eq!(compare_versions("abc", "0.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("1.0", "1.0.0"), Ordering::Equal);
        assert_eq!(compare_versions("0.9.9", "1.0.0"), Ordering::Less);
    }

    #[test]
    fn test_compare_is_antisymmetric_and_transitive() {
        let samples = [
            "1.2.3", "1.10.0", "1.2.0", "abc", "0.0.0", "2", "2.0.0.9", "1..3", "x.1.y", "10.0.1",
        ];

        for a in samples {
            for b in samples {
                assert_eq!(compare_versions(a, b), compare_versions(b, a).reverse());
                for c in samples {
                    if compare_versions(a, b) != Ordering::Greater
                        && compare_versions(b, c) != Ordering::Greater
                    {
                        assert_ne!(compare_versions(a, c), Ordering::Greater, "{a} {b} {c}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_serde_uses_dotted_string() {
        let json = serde_json::to_string(&Version::new(1, 1, 0)).unwrap();
        assert_eq!(json, "\"1.1.0\"");
        let parsed: Version = serde_json::from_str("\"3.beta\"").unwrap();
        assert_eq!(parsed, Version::new(3, 0, 0));
    }
}
