use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

use crate::error::{Error, PlatformReason, Result};

/// An `os/architecture[/variant]` triple identifying one image variant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct Platform {
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub architecture: String,
    #[serde(default, deserialize_with = "non_empty")]
    pub variant: Option<String>,
}

fn non_empty<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|v| !v.is_empty()))
}

impl Platform {
    pub fn new(os: &str, architecture: &str, variant: Option<&str>) -> Self {
        Self {
            os: os.to_string(),
            architecture: architecture.to_string(),
            variant: variant.filter(|v| !v.is_empty()).map(str::to_string),
        }
    }

    /// Parse `os/arch` or `os/arch/variant`.
    pub fn parse(spec: &str) -> Result<Self> {
        let parts: Vec<&str> = spec.split('/').collect();
        match parts.as_slice() {
            [os, arch] => Ok(Self::new(os, arch, None)),
            [os, arch, variant] => Ok(Self::new(os, arch, Some(variant))),
            [_] => Err(Error::MalformedPlatform {
                spec: spec.to_string(),
                reason: PlatformReason::TooFewSegments,
            }),
            _ => Err(Error::MalformedPlatform {
                spec: spec.to_string(),
                reason: PlatformReason::TooManySegments,
            }),
        }
    }

    /// Whether `candidate` satisfies this platform. The variant only takes part
    /// when this platform names one.
    pub fn matches(&self, candidate: &Platform) -> bool {
        if self.os != candidate.os || self.architecture != candidate.architecture {
            return false;
        }
        match self.variant.as_deref().filter(|v| !v.is_empty()) {
            Some(variant) => candidate.variant.as_deref() == Some(variant),
            None => true,
        }
    }
}

impl fmt::Display for Platform {
    /// Empty when os or architecture is missing, so a partially populated
    /// index entry renders as a blank cell.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.os.is_empty() || self.architecture.is_empty() {
            return Ok(());
        }
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(variant) = self.variant.as_deref().filter(|v| !v.is_empty()) {
            write!(f, "/{variant}")?;
        }
        Ok(())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_two_and_three_segments() {
        let p = Platform::parse("linux/amd64").unwrap();
        assert_eq!(p, Platform::new("linux", "amd64", None));

        let p: Platform = "linux/arm/v7".parse().unwrap();
        assert_eq!(p.variant.as_deref(), Some("v7"));
    }

    #[test]
    fn rejects_bad_segment_counts() {
        match Platform::parse("linux") {
            Err(Error::MalformedPlatform { spec, reason }) => {
                assert_eq!(spec, "linux");
                assert_eq!(reason, PlatformReason::TooFewSegments);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        match Platform::parse("linux/arm/v7/extra") {
            Err(Error::MalformedPlatform { reason, .. }) => {
                assert_eq!(reason, PlatformReason::TooManySegments);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(Platform::parse("").is_err());
    }

    #[test]
    fn formats_only_complete_platforms() {
        assert_eq!(Platform::new("linux", "amd64", None).to_string(), "linux/amd64");
        assert_eq!(Platform::new("linux", "arm64", Some("v8")).to_string(), "linux/arm64/v8");
        assert_eq!(Platform::new("", "amd64", Some("v8")).to_string(), "");
        assert_eq!(Platform::new("linux", "", None).to_string(), "");
    }

    #[test]
    fn format_then_parse_round_trips() {
        let cases = [
            Platform::new("linux", "amd64", None),
            Platform::new("linux", "arm", Some("v6")),
            Platform::new("windows", "amd64", None),
            Platform::new("linux", "riscv64", Some("")),
        ];
        for p in cases {
            assert_eq!(Platform::parse(&p.to_string()).unwrap(), p);
        }
    }

    #[test]
    fn empty_variant_segment_means_no_variant() {
        let p = Platform::parse("linux/arm64/").unwrap();
        assert_eq!(p.variant, None);
    }

    #[test]
    fn only_the_segment_count_is_checked() {
        let p = Platform::parse("/amd64").unwrap();
        assert_eq!(p, Platform::new("", "amd64", None));
        assert_eq!(p.to_string(), "");
    }

    #[test]
    fn matching_ignores_variant_unless_requested() {
        let any_arm = Platform::new("linux", "arm", None);
        let v7 = Platform::new("linux", "arm", Some("v7"));
        let v6 = Platform::new("linux", "arm", Some("v6"));

        assert!(any_arm.matches(&v7));
        assert!(v7.matches(&v7));
        assert!(!v7.matches(&v6));
        assert!(!v7.matches(&any_arm));
        assert!(!any_arm.matches(&Platform::new("linux", "arm64", None)));
    }

    #[test]
    fn deserializes_index_platform() {
        let p: Platform =
            serde_json::from_str(r#"{"architecture":"arm64","os":"linux","variant":"v8"}"#).unwrap();
        assert_eq!(p.to_string(), "linux/arm64/v8");

        let p: Platform =
            serde_json::from_str(r#"{"architecture":"amd64","os":"linux","variant":""}"#).unwrap();
        assert_eq!(p.variant, None);
        assert_eq!(Platform::parse(&p.to_string()).unwrap(), p);
    }
}
