use serde::{Deserialize, Serialize};
use std::fmt;

/// Market-condition label assigned to a trade at entry time.
///
/// Used to segment performance statistics; the engine never changes a
/// trade's regime after entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Regime {
    Trending,
    MeanReverting,
    Volatile,
    Quiet,
    Unknown,
}

impl Default for Regime {
    fn default() -> Self {
        Regime::Unknown
    }
}

impl fmt::Display for Regime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Regime::Trending => "trending",
            Regime::MeanReverting => "mean_reverting",
            Regime::Volatile => "volatile",
            Regime::Quiet => "quiet",
            Regime::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}
