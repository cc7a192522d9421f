//! Heuristic selection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::OptimizerConfig;
use crate::error::DispatchError;

/// Which heuristic sequences a vehicle's stops.
///
/// Parsed once at the boundary (`"2opt"`, `"genetic_2opt"`, ...); `Auto`
/// resolves by stop count through [`Strategy::resolve`].
///
/// # Examples
///
/// ```
/// use u_dispatch::config::OptimizerConfig;
/// use u_dispatch::optimizer::Strategy;
///
/// let s: Strategy = "2opt".parse().unwrap();
/// assert_eq!(s, Strategy::TwoOpt);
///
/// let cfg = OptimizerConfig::default();
/// assert_eq!(Strategy::Auto.resolve(3, &cfg), Strategy::NearestNeighbor);
/// assert_eq!(Strategy::Auto.resolve(12, &cfg), Strategy::TwoOpt);
/// assert_eq!(Strategy::Auto.resolve(40, &cfg), Strategy::Genetic2Opt);
/// assert_eq!(Strategy::Auto.resolve(200, &cfg), Strategy::SimulatedAnnealing);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    NearestNeighbor,
    #[serde(rename = "2opt")]
    TwoOpt,
    #[serde(rename = "3opt")]
    ThreeOpt,
    #[serde(rename = "genetic_2opt")]
    Genetic2Opt,
    SimulatedAnnealing,
    #[default]
    Auto,
}

impl Strategy {
    pub const ALL: [Strategy; 6] = [
        Strategy::NearestNeighbor,
        Strategy::TwoOpt,
        Strategy::ThreeOpt,
        Strategy::Genetic2Opt,
        Strategy::SimulatedAnnealing,
        Strategy::Auto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::NearestNeighbor => "nearest_neighbor",
            Strategy::TwoOpt => "2opt",
            Strategy::ThreeOpt => "3opt",
            Strategy::Genetic2Opt => "genetic_2opt",
            Strategy::SimulatedAnnealing => "simulated_annealing",
            Strategy::Auto => "auto",
        }
    }

    /// The concrete strategy for `num_stops` stops. Never returns `Auto`.
    pub fn resolve(self, num_stops: usize, config: &OptimizerConfig) -> Strategy {
        if self != Strategy::Auto {
            return self;
        }
        if num_stops <= config.auto_nearest_neighbor_max {
            Strategy::NearestNeighbor
        } else if num_stops <= config.auto_two_opt_max {
            Strategy::TwoOpt
        } else if num_stops <= config.auto_genetic_max {
            Strategy::Genetic2Opt
        } else {
            Strategy::SimulatedAnnealing
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = DispatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|st| st.as_str() == s)
            .ok_or_else(|| DispatchError::malformed(format!("unknown strategy '{s}'")))
    }
}

/// How an optimization request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolveStatus {
    /// The heuristic ran to completion.
    Converged,
    /// The wall-clock budget ran out; the result is the best found so far.
    Timeout,
    /// The improvement step produced nothing usable; the construction is returned.
    FellBack,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_display() {
        for s in Strategy::ALL {
            assert_eq!(s.to_string().parse::<Strategy>(), Ok(s));
        }
    }

    #[test]
    fn test_parse_unknown() {
        assert!(matches!(
            "tabu".parse::<Strategy>(),
            Err(DispatchError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(serde_json::to_string(&Strategy::TwoOpt).unwrap(), "\"2opt\"");
        assert_eq!(
            serde_json::from_str::<Strategy>("\"simulated_annealing\"").unwrap(),
            Strategy::SimulatedAnnealing
        );
        assert_eq!(serde_json::to_string(&SolveStatus::FellBack).unwrap(), "\"fell_back\"");
    }

    #[test]
    fn test_auto_boundaries() {
        let cfg = OptimizerConfig::default();
        assert_eq!(Strategy::Auto.resolve(0, &cfg), Strategy::NearestNeighbor);
        assert_eq!(Strategy::Auto.resolve(4, &cfg), Strategy::TwoOpt);
        assert_eq!(Strategy::Auto.resolve(15, &cfg), Strategy::TwoOpt);
        assert_eq!(Strategy::Auto.resolve(16, &cfg), Strategy::Genetic2Opt);
        assert_eq!(Strategy::Auto.resolve(60, &cfg), Strategy::Genetic2Opt);
        assert_eq!(Strategy::Auto.resolve(61, &cfg), Strategy::SimulatedAnnealing);
        assert_eq!(Strategy::ThreeOpt.resolve(2, &cfg), Strategy::ThreeOpt);
    }
}
