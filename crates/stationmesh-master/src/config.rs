//! Master configuration, read from the environment.

use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use stationmesh_layout::SolverConfig;

use crate::error::{Error, Result};

/// Default reconciliation period.
pub const DEFAULT_CYCLE_PERIOD: Duration = Duration::from_secs(60);

/// Default HTTP query listen address.
pub const DEFAULT_API_ADDR: &str = "0.0.0.0:5000";

/// Settings for the periodic reconciliation cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleConfig {
    /// Time between cycle ticks.
    pub period: Duration,
    /// Solver parameters; the seed is replaced per cycle unless fixed.
    pub solver: SolverConfig,
    /// Reuse this seed every cycle instead of drawing a fresh one.
    pub fixed_seed: Option<u64>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            period: DEFAULT_CYCLE_PERIOD,
            solver: SolverConfig::default(),
            fixed_seed: None,
        }
    }
}

impl CycleConfig {
    #[must_use]
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    #[must_use]
    pub fn with_fixed_seed(mut self, seed: u64) -> Self {
        self.fixed_seed = Some(seed);
        self
    }

    #[must_use]
    pub fn with_solver(mut self, solver: SolverConfig) -> Self {
        self.solver = solver;
        self
    }

    /// Solver settings for one cycle.
    pub fn solver_for_cycle(&self) -> SolverConfig {
        let seed = self.fixed_seed.unwrap_or_else(rand::random);
        self.solver.clone().with_seed(seed)
    }
}

/// Configuration for a station master.
#[derive(Debug, Clone, PartialEq)]
pub struct MasterConfig {
    pub cycle: CycleConfig,
    /// HTTP query API listen address
    pub api_addr: SocketAddr,
}

impl MasterConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// | Variable | Default |
    /// |---|---|
    /// | `STATIONMESH_CYCLE_SECS` | 60 |
    /// | `STATIONMESH_API_ADDR` | `0.0.0.0:5000` |
    /// | `STATIONMESH_MAX_ITERATIONS` | 500 |
    /// | `STATIONMESH_LEARNING_RATE` | 0.01 |
    /// | `STATIONMESH_SOLVER_SEED` | unset (fresh seed per cycle) |
    /// | `STATIONMESH_SOLVER_DEADLINE_MS` | unset |
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with a custom variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cycle = CycleConfig::default();

        if let Some(secs) = parse::<u64, _>(&lookup, "STATIONMESH_CYCLE_SECS")? {
            if secs == 0 {
                return Err(Error::Config("STATIONMESH_CYCLE_SECS must be positive".into()));
            }
            cycle.period = Duration::from_secs(secs);
        }
        if let Some(max) = parse::<usize, _>(&lookup, "STATIONMESH_MAX_ITERATIONS")? {
            cycle.solver = cycle.solver.with_max_iterations(max);
        }
        if let Some(rate) = parse::<f64, _>(&lookup, "STATIONMESH_LEARNING_RATE")? {
            if !rate.is_finite() || rate <= 0.0 {
                return Err(Error::Config(format!(
                    "STATIONMESH_LEARNING_RATE must be positive, got {rate}"
                )));
            }
            cycle.solver = cycle.solver.with_learning_rate(rate);
        }
        if let Some(ms) = parse::<u64, _>(&lookup, "STATIONMESH_SOLVER_DEADLINE_MS")? {
            cycle.solver = cycle.solver.with_deadline(Duration::from_millis(ms));
        }
        cycle.fixed_seed = parse(&lookup, "STATIONMESH_SOLVER_SEED")?;

        let api_addr = match parse(&lookup, "STATIONMESH_API_ADDR")? {
            Some(addr) => addr,
            None => DEFAULT_API_ADDR
                .parse()
                .map_err(|e| Error::Config(format!("invalid default API address: {e}")))?,
        };

        Ok(Self { cycle, api_addr })
    }
}

fn parse<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid {key}={raw:?}: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<MasterConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        MasterConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_variables() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.cycle.period, Duration::from_secs(60));
        assert_eq!(config.cycle.solver.max_iterations, 500);
        assert_eq!(config.cycle.solver.learning_rate, 0.01);
        assert_eq!(config.cycle.fixed_seed, None);
        assert_eq!(config.api_addr, "0.0.0.0:5000".parse().unwrap());
    }

    #[test]
    fn variables_override_defaults() {
        let config = config_from(&[
            ("STATIONMESH_CYCLE_SECS", "5"),
            ("STATIONMESH_API_ADDR", "127.0.0.1:9090"),
            ("STATIONMESH_MAX_ITERATIONS", "200"),
            ("STATIONMESH_LEARNING_RATE", "0.05"),
            ("STATIONMESH_SOLVER_SEED", "17"),
            ("STATIONMESH_SOLVER_DEADLINE_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.cycle.period, Duration::from_secs(5));
        assert_eq!(config.api_addr, "127.0.0.1:9090".parse().unwrap());
        assert_eq!(config.cycle.solver.max_iterations, 200);
        assert_eq!(config.cycle.solver.learning_rate, 0.05);
        assert_eq!(config.cycle.solver.deadline, Some(Duration::from_millis(250)));
        assert_eq!(config.cycle.solver_for_cycle().seed, 17);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(matches!(config_from(&[("STATIONMESH_CYCLE_SECS", "soon")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("STATIONMESH_CYCLE_SECS", "0")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("STATIONMESH_LEARNING_RATE", "-1")]), Err(Error::Config(_))));
        assert!(matches!(config_from(&[("STATIONMESH_API_ADDR", "nowhere")]), Err(Error::Config(_))));
    }
}
