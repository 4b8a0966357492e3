use std::fmt;
use std::str::FromStr;

use crate::errors::GroupsError;

/// Academic level, in canonical order.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize)]
pub enum Level {
    L1,
    L2,
    L3,
    M1,
    M2,
}

impl Level {
    pub const ALL: [Level; 5] = [Level::L1, Level::L2, Level::L3, Level::M1, Level::M2];

    pub fn as_str(self) -> &'static str {
        match self {
            Level::L1 => "L1",
            Level::L2 => "L2",
            Level::L3 => "L3",
            Level::M1 => "M1",
            Level::M2 => "M2",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = GroupsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Level::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| GroupsError::InvalidLevel(s.to_owned()))
    }
}

/// Deduplicate and sort levels in canonical order.
pub fn normalize_levels(levels: &[Level]) -> Vec<Level> {
    let mut levels = levels.to_vec();
    levels.sort_unstable();
    levels.dedup();
    levels
}

/// Storage form of a level set, e.g. `L1,L3`.
pub fn encode_levels(levels: &[Level]) -> String {
    levels
        .iter()
        .map(|l| l.as_str())
        .collect::<Vec<_>>()
        .join(",")
}

pub fn decode_levels(s: &str) -> Result<Vec<Level>, GroupsError> {
    s.split(',')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(Level::from_str)
        .collect()
}
