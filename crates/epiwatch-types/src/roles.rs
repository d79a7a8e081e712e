//! The three simulation roles.
//!
//! Roles are fixed for the lifetime of a process. The wire carries the
//! role as a snake_case tag inside registration requests; the overseer
//! validates incoming tags against this enum and excludes anything it
//! does not recognize.

use serde::{Deserialize, Serialize};

/// The role a node plays in the surveillance network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Generates disease occurrences and reports them to one aggregator.
    RecordSource,
    /// Collects notifications from record sources into daily counts and
    /// feeds them to outbreak analyzers.
    DistrictAggregator,
    /// Watches daily counts across districts and raises outbreak alerts
    /// when a threshold is crossed.
    OutbreakAnalyzer,
}

impl Role {
    /// The snake_case wire tag for this role.
    pub const fn tag(self) -> &'static str {
        match self {
            Self::RecordSource => "record_source",
            Self::DistrictAggregator => "district_aggregator",
            Self::OutbreakAnalyzer => "outbreak_analyzer",
        }
    }

    /// Parse a wire tag into a role, if it names one of the three known
    /// roles.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "record_source" => Some(Self::RecordSource),
            "district_aggregator" => Some(Self::DistrictAggregator),
            "outbreak_analyzer" => Some(Self::OutbreakAnalyzer),
            _ => None,
        }
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for role in [
            Role::RecordSource,
            Role::DistrictAggregator,
            Role::OutbreakAnalyzer,
        ] {
            assert_eq!(Role::from_tag(role.tag()), Some(role));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(Role::from_tag("pharmacy"), None);
        assert_eq!(Role::from_tag(""), None);
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Role::DistrictAggregator).unwrap();
        assert_eq!(json, "\"district_aggregator\"");
    }
}
