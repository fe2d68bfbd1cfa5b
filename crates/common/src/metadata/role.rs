use std::fmt;
use std::str::FromStr;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::KeyId;

/// Name of a metadata role.
///
/// The four top-level roles have fixed names; anything else is a delegated
/// custom role. Names are their canonical lowercase string forms on the
/// wire and in metadata filenames (`<name>.json`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleName {
    Root,
    Targets,
    Snapshot,
    Timestamp,
    Delegated(String),
}

impl RoleName {
    /// The four top-level roles in validation order.
    pub const TOP_LEVEL: [RoleName; 4] = [
        RoleName::Root,
        RoleName::Targets,
        RoleName::Snapshot,
        RoleName::Timestamp,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            RoleName::Root => "root",
            RoleName::Targets => "targets",
            RoleName::Snapshot => "snapshot",
            RoleName::Timestamp => "timestamp",
            RoleName::Delegated(name) => name,
        }
    }

    /// Filename of this role's document inside the metadata directory.
    pub fn metadata_filename(&self) -> String {
        format!("{}.json", self.as_str())
    }

    /// Whether this role's document carries a target-file manifest.
    pub fn is_targets_like(&self) -> bool {
        matches!(self, RoleName::Targets | RoleName::Delegated(_))
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "root" => RoleName::Root,
            "targets" => RoleName::Targets,
            "snapshot" => RoleName::Snapshot,
            "timestamp" => RoleName::Timestamp,
            other => RoleName::Delegated(other.to_string()),
        })
    }
}

impl Serialize for RoleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for RoleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        if s.is_empty() {
            return Err(D::Error::custom("empty role name"));
        }
        Ok(s.parse().expect("role name parsing is infallible"))
    }
}

/// A role's authorized key set and signature threshold.
///
/// Invariant, checked at parse time by the root content loader:
/// `1 <= threshold <= keyids.len()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    /// Ordered set of authorized key identifiers.
    pub keyids: Vec<KeyId>,
    /// Number of distinct authorized keys that must sign.
    pub threshold: u32,
}

impl Role {
    /// Check the threshold invariant.
    pub fn is_well_formed(&self) -> bool {
        self.threshold >= 1 && (self.threshold as usize) <= self.keyids.len()
    }

    /// Whether the given key is authorized for this role.
    pub fn authorizes(&self, keyid: &KeyId) -> bool {
        self.keyids.contains(keyid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_round_trip() {
        for name in RoleName::TOP_LEVEL {
            let parsed: RoleName = name.as_str().parse().unwrap();
            assert_eq!(parsed, name);
        }
        let delegated: RoleName = "releases".parse().unwrap();
        assert_eq!(delegated, RoleName::Delegated("releases".to_string()));
        assert_eq!(delegated.metadata_filename(), "releases.json");
    }

    #[test]
    fn test_role_threshold_invariant() {
        let role = Role {
            keyids: vec![KeyId::from("a".to_string()), KeyId::from("b".to_string())],
            threshold: 2,
        };
        assert!(role.is_well_formed());

        let too_high = Role {
            keyids: vec![KeyId::from("a".to_string())],
            threshold: 2,
        };
        assert!(!too_high.is_well_formed());

        let zero = Role {
            keyids: vec![KeyId::from("a".to_string())],
            threshold: 0,
        };
        assert!(!zero.is_well_formed());
    }
}
