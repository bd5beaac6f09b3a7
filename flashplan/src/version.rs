//! Release numbers reported by compilers and frameworks.

use crate::error::PlanError;
use serde::{Serialize, Serializer};
use std::cmp::Ordering;
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// A `major.minor[.patch]` release number.
///
/// Comparison is by numeric field with a missing patch treated as `0`, so
/// `9.0 < 11.0` and `11.8 == 11.8.0`. `Display` keeps the number of
/// components the value was written with.
#[derive(Clone, Copy, Debug)]
pub struct ToolchainVersion {
    major: u32,
    minor: u32,
    patch: Option<u32>,
}

impl ToolchainVersion {
    pub const fn new(major: u32, minor: u32) -> Self {
        Self {
            major,
            minor,
            patch: None,
        }
    }

    pub const fn with_patch(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch: Some(patch),
        }
    }

    pub fn major(&self) -> u32 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn patch(&self) -> Option<u32> {
        self.patch
    }

    /// Parses the version at the start of `text`, ignoring whatever follows.
    ///
    /// Tool banners glue punctuation and build tags onto the number
    /// (`11.8,`, `5.7.31921-d1770ee1b`, `2.1.0+cu118`); only the leading run
    /// of digits and dots is kept. Returns `None` when that run is not a
    /// two- or three-component version.
    pub fn parse_leading(text: &str) -> Option<Self> {
        let end = text
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(text.len());
        let token = text[..end].trim_end_matches('.');
        // Framework builds such as `2.1.0.dev20230801` carry a fourth component.
        let token = match token.match_indices('.').nth(2) {
            Some((idx, _)) => &token[..idx],
            None => token,
        };
        token.parse().ok()
    }

    fn key(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch.unwrap_or(0))
    }
}

impl PartialEq for ToolchainVersion {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ToolchainVersion {}

impl Hash for ToolchainVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl PartialOrd for ToolchainVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ToolchainVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl FromStr for ToolchainVersion {
    type Err = PlanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PlanError::InvalidVersion {
            input: s.to_string(),
        };
        let fields = s
            .trim()
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(invalid());
                }
                part.parse::<u32>().map_err(|_| invalid())
            })
            .collect::<Result<Vec<_>, _>>()?;

        match fields[..] {
            [major, minor] => Ok(Self::new(major, minor)),
            [major, minor, patch] => Ok(Self::with_patch(major, minor, patch)),
            _ => Err(invalid()),
        }
    }
}

impl Display for ToolchainVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)?;
        if let Some(patch) = self.patch {
            write!(f, ".{patch}")?;
        }
        Ok(())
    }
}

impl Serialize for ToolchainVersion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of a version-gated policy table: `items` become available once
/// the toolchain reaches `since`.
#[derive(Clone, Copy, Debug)]
pub struct VersionGate<T: 'static> {
    pub since: ToolchainVersion,
    pub items: &'static [T],
}

impl<T: 'static> VersionGate<T> {
    pub const fn new(since: ToolchainVersion, items: &'static [T]) -> Self {
        Self { since, items }
    }
}

/// Everything `table` unlocks at or below `version`, in table order.
///
/// Tables are sorted by `since`, so this is a prefix fold: a newer version
/// only ever adds items.
pub fn unlocked<'t, T: 'static>(
    table: &'t [VersionGate<T>],
    version: &ToolchainVersion,
) -> impl Iterator<Item = &'t T> + 't {
    let version = *version;
    table
        .iter()
        .take_while(move |gate| gate.since <= version)
        .flat_map(|gate| gate.items.iter())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn v(s: &str) -> ToolchainVersion {
        s.parse().expect("valid version")
    }

    #[test]
    fn numeric_not_lexicographic() {
        assert!(v("9.0") < v("11.0"));
        assert!(v("11.2") < v("11.10"));
        assert!("9.0" > "11.0", "sanity: string order disagrees");
    }

    #[test]
    fn missing_patch_equals_zero() {
        assert_eq!(v("11.8"), v("11.8.0"));
        assert!(v("11.8") < v("11.8.1"));
    }

    #[test]
    fn display_keeps_component_count() {
        assert_eq!(v("10.2").to_string(), "10.2");
        assert_eq!(v("5.7.31921").to_string(), "5.7.31921");
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "11", "11.", ".8", "11.8.0.1", "v11.8", "11.x", "1 1.8"] {
            assert!(bad.parse::<ToolchainVersion>().is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_leading_strips_suffixes() {
        assert_eq!(ToolchainVersion::parse_leading("11.8,"), Some(v("11.8")));
        assert_eq!(
            ToolchainVersion::parse_leading("5.7.31921-d1770ee1b"),
            Some(v("5.7.31921"))
        );
        assert_eq!(ToolchainVersion::parse_leading("2.1.0+cu118"), Some(v("2.1.0")));
        assert_eq!(
            ToolchainVersion::parse_leading("2.1.0.dev20230801"),
            Some(v("2.1.0"))
        );
        assert_eq!(ToolchainVersion::parse_leading("V11.8.89"), None);
        assert_eq!(ToolchainVersion::parse_leading("release"), None);
    }

    #[test]
    fn unlocked_is_a_prefix_fold() {
        static TABLE: &[VersionGate<u32>] = &[
            VersionGate::new(ToolchainVersion::new(1, 0), &[1]),
            VersionGate::new(ToolchainVersion::new(2, 0), &[2, 3]),
            VersionGate::new(ToolchainVersion::new(3, 0), &[4]),
        ];
        let got: Vec<u32> = unlocked(TABLE, &v("2.5")).copied().collect();
        assert_eq!(got, vec![1, 2, 3]);
        assert_eq!(unlocked(TABLE, &v("0.9")).count(), 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 512,
            .. ProptestConfig::default()
        })]

        #[test]
        fn parsed_order_matches_numeric_order(
            a in (0u32..200, 0u32..200, proptest::option::of(0u32..200)),
            b in (0u32..200, 0u32..200, proptest::option::of(0u32..200)),
        ) {
            let render = |(major, minor, patch): (u32, u32, Option<u32>)| match patch {
                Some(p) => format!("{major}.{minor}.{p}"),
                None => format!("{major}.{minor}"),
            };
            let va: ToolchainVersion = render(a).parse().unwrap();
            let vb: ToolchainVersion = render(b).parse().unwrap();

            let ka = (a.0, a.1, a.2.unwrap_or(0));
            let kb = (b.0, b.1, b.2.unwrap_or(0));
            prop_assert_eq!(va.cmp(&vb), ka.cmp(&kb));
            prop_assert_eq!(va.to_string(), render(a));
        }
    }
}
