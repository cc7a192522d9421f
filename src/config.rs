//! Engine tuning.
//!
//! Every threshold the engine uses lives here. All sections default, so a
//! TOML file only needs the keys it overrides:
//!
//! ```
//! use u_dispatch::config::EngineConfig;
//!
//! let cfg = EngineConfig::from_toml_str(r#"
//!     [optimizer]
//!     auto_two_opt_max = 20
//!
//!     [reroute]
//!     disruption_threshold = 0.4
//! "#).unwrap();
//! assert_eq!(cfg.optimizer.auto_two_opt_max, 20);
//! assert_eq!(cfg.optimizer.auto_nearest_neighbor_max, 3);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::models::ServiceLevel;
use crate::optimizer::Strategy;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub optimizer: OptimizerConfig,
    pub assignment: AssignmentConfig,
    pub reroute: RerouteConfig,
    pub hub: HubConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// `auto` uses nearest neighbor up to this many stops.
    pub auto_nearest_neighbor_max: usize,
    /// `auto` uses 2-opt up to this many stops.
    pub auto_two_opt_max: usize,
    /// `auto` uses the genetic search up to this many stops, annealing above.
    pub auto_genetic_max: usize,
    pub lateness_penalty_per_minute: f64,
    pub seed: u64,
    pub genetic: GeneticConfig,
    pub annealing: AnnealingConfig,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            auto_nearest_neighbor_max: 3,
            auto_two_opt_max: 15,
            auto_genetic_max: 60,
            lateness_penalty_per_minute: 10.0,
            seed: 42,
            genetic: GeneticConfig::default(),
            annealing: AnnealingConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneticConfig {
    pub population_size: usize,
    pub max_generations: usize,
    pub mutation_rate: f64,
    /// Probability that a child gets a 2-opt descent step.
    pub local_search_rate: f64,
    pub time_budget_ms: u64,
}

impl Default for GeneticConfig {
    fn default() -> Self {
        Self {
            population_size: 30,
            max_generations: 120,
            mutation_rate: 0.3,
            local_search_rate: 0.5,
            time_budget_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnealingConfig {
    pub iterations: usize,
    pub initial_temperature: f64,
    pub minimum_temperature: f64,
    /// Geometric factor applied once per temperature step.
    pub cooling_factor: f64,
    /// Neighbors tried at each temperature.
    pub iterations_per_temperature: usize,
    pub time_budget_ms: u64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            iterations: 20_000,
            initial_temperature: 50.0,
            minimum_temperature: 0.01,
            cooling_factor: 0.999,
            iterations_per_temperature: 4,
            time_budget_ms: 2_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Destinations within this radius of a cluster's seed join the cluster.
    pub cluster_radius_km: f64,
    /// Workload rebalancing stops once max−min utilization is this small.
    pub workload_gap_threshold: f64,
    pub rebalance_max_moves: usize,
    /// Selections retried when the chosen driver's plan changed underneath.
    pub commit_attempts: usize,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            cluster_radius_km: 5.0,
            workload_gap_threshold: 0.1,
            rebalance_max_moves: 50,
            commit_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerouteConfig {
    /// Marginal cost, as a fraction of the route objective, above which an
    /// incremental patch is replaced by a full re-solve.
    pub disruption_threshold: f64,
    pub strategy: Strategy,
}

impl Default for RerouteConfig {
    fn default() -> Self {
        Self {
            disruption_threshold: 0.25,
            strategy: Strategy::Auto,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Transfer hubs above this post-commit utilization are skipped.
    pub utilization_ceiling: f64,
    /// Total transfer cost a rebalance may add.
    pub rebalance_cost_tolerance: f64,
    pub rebalance_spread_threshold: f64,
    pub rebalance_max_moves: usize,
    pub rebalance_service_level: ServiceLevel,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            utilization_ceiling: 0.9,
            rebalance_cost_tolerance: 1_000.0,
            rebalance_spread_threshold: 0.1,
            rebalance_max_moves: 20,
            rebalance_service_level: ServiceLevel::Standard,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> DispatchResult<Self> {
        let config: EngineConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> DispatchResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Checks every section.
    pub fn validate(&self) -> DispatchResult<()> {
        self.optimizer.validate()?;
        self.assignment.validate()?;
        self.reroute.validate()?;
        self.hub.validate()
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.auto_nearest_neighbor_max > self.auto_two_opt_max
            || self.auto_two_opt_max > self.auto_genetic_max
        {
            return Err(DispatchError::config(
                "auto strategy thresholds must be non-decreasing",
            ));
        }
        non_negative(
            "optimizer.lateness_penalty_per_minute",
            self.lateness_penalty_per_minute,
        )?;
        self.genetic.validate()?;
        self.annealing.validate()
    }
}

impl GeneticConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.population_size < 2 {
            return Err(DispatchError::config(
                "optimizer.genetic.population_size must be at least 2",
            ));
        }
        if self.max_generations == 0 {
            return Err(DispatchError::config(
                "optimizer.genetic.max_generations must be at least 1",
            ));
        }
        unit_interval("optimizer.genetic.mutation_rate", self.mutation_rate)?;
        unit_interval("optimizer.genetic.local_search_rate", self.local_search_rate)
    }
}

impl AnnealingConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !(self.cooling_factor > 0.0 && self.cooling_factor < 1.0) {
            return Err(DispatchError::config(
                "optimizer.annealing.cooling_factor must be in (0, 1)",
            ));
        }
        if !(self.minimum_temperature > 0.0
            && self.minimum_temperature < self.initial_temperature
            && self.initial_temperature.is_finite())
        {
            return Err(DispatchError::config(
                "optimizer.annealing temperatures must satisfy 0 < minimum < initial",
            ));
        }
        if self.iterations_per_temperature == 0 {
            return Err(DispatchError::config(
                "optimizer.annealing.iterations_per_temperature must be at least 1",
            ));
        }
        Ok(())
    }
}

impl AssignmentConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        non_negative("assignment.cluster_radius_km", self.cluster_radius_km)?;
        non_negative("assignment.workload_gap_threshold", self.workload_gap_threshold)?;
        if self.commit_attempts == 0 {
            return Err(DispatchError::config(
                "assignment.commit_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

impl RerouteConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        non_negative("reroute.disruption_threshold", self.disruption_threshold)
    }
}

impl HubConfig {
    pub fn validate(&self) -> DispatchResult<()> {
        if !(self.utilization_ceiling > 0.0 && self.utilization_ceiling <= 1.0) {
            return Err(DispatchError::config(
                "hub.utilization_ceiling must be in (0, 1]",
            ));
        }
        non_negative("hub.rebalance_cost_tolerance", self.rebalance_cost_tolerance)?;
        non_negative("hub.rebalance_spread_threshold", self.rebalance_spread_threshold)
    }
}

fn non_negative(key: &str, value: f64) -> DispatchResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(DispatchError::config(format!("{key} must be a non-negative number")))
    }
}

fn unit_interval(key: &str, value: f64) -> DispatchResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(DispatchError::config(format!("{key} must be within [0, 1]")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let cfg = EngineConfig::from_toml_str(
            r#"
            [optimizer.genetic]
            population_size = 12

            [hub]
            utilization_ceiling = 0.8
            rebalance_service_level = "express"

            [reroute]
            strategy = "simulated_annealing"
            "#,
        )
        .expect("valid config");
        assert_eq!(cfg.optimizer.genetic.population_size, 12);
        assert_eq!(cfg.optimizer.genetic.max_generations, 120);
        assert_eq!(cfg.hub.utilization_ceiling, 0.8);
        assert_eq!(cfg.hub.rebalance_service_level, ServiceLevel::Express);
        assert_eq!(cfg.reroute.strategy, Strategy::SimulatedAnnealing);
        assert_eq!(cfg.assignment, AssignmentConfig::default());
    }

    #[test]
    fn test_rejects_bad_values() {
        let err = EngineConfig::from_toml_str("[hub]\nutilization_ceiling = 1.5\n");
        assert!(matches!(err, Err(DispatchError::Config(_))));

        let err = EngineConfig::from_toml_str(
            "[optimizer]\nauto_two_opt_max = 2\nauto_nearest_neighbor_max = 5\n",
        );
        assert!(matches!(err, Err(DispatchError::Config(_))));

        let err = EngineConfig::from_toml_str("[optimizer.genetic]\nmutation_rate = 2.0\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_sections_validate_on_their_own() {
        let hub = HubConfig {
            utilization_ceiling: 0.0,
            ..HubConfig::default()
        };
        assert!(matches!(hub.validate(), Err(DispatchError::Config(_))));

        let annealing = AnnealingConfig {
            minimum_temperature: 50.0,
            ..AnnealingConfig::default()
        };
        assert!(annealing.validate().is_err());
        let optimizer = OptimizerConfig {
            annealing,
            ..OptimizerConfig::default()
        };
        assert!(optimizer.validate().is_err());

        let reroute = RerouteConfig {
            disruption_threshold: f64::NAN,
            ..RerouteConfig::default()
        };
        assert!(reroute.validate().is_err());
        assert!(AssignmentConfig::default().validate().is_ok());
    }

    #[test]
    fn test_unparseable_toml() {
        let err = EngineConfig::from_toml_str("[optimizer\nseed = ");
        assert!(matches!(err, Err(DispatchError::Config(_))));
    }
}
