//! Queue lanes (priority tiers).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TurnstileError;

/// Which of the two queues a job is admitted into.
///
/// Workers drain `High` completely before touching `Default`; within a lane
/// order is FIFO.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lane {
    Default,
    High,
}

impl Lane {
    pub const ALL: [Lane; 2] = [Lane::Default, Lane::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Lane::Default => "default",
            Lane::High => "high",
        }
    }
}

impl fmt::Display for Lane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lane {
    type Err = TurnstileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "default" => Ok(Lane::Default),
            "high" => Ok(Lane::High),
            other => Err(TurnstileError::UnknownQueue(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::default(Lane::Default, "default")]
    #[case::high(Lane::High, "high")]
    fn lane_name_roundtrips(#[case] lane: Lane, #[case] name: &str) {
        assert_eq!(lane.as_str(), name);
        assert_eq!(name.parse::<Lane>().unwrap(), lane);
    }

    #[test]
    fn unknown_lane_is_rejected() {
        let err = "urgent".parse::<Lane>().unwrap_err();
        assert!(err.to_string().contains("urgent"));
    }

    #[test]
    fn serde_uses_snake_case() {
        assert_eq!(serde_json::to_string(&Lane::High).unwrap(), "\"high\"");
        let lane: Lane = serde_json::from_str("\"default\"").unwrap();
        assert_eq!(lane, Lane::Default);
    }
}
