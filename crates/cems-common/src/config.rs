//! ---
//! ems_section: "01-core-functionality"
//! ems_subsection: "module"
//! ems_type: "source"
//! ems_scope: "code"
//! ems_description: "Configuration loading and validation."
//! ems_version: "v0.0.0-prealpha"
//! ems_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_tick_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_external_classrooms() -> Vec<i64> {
    vec![1]
}

fn default_base_load_w() -> f64 {
    500.0
}

fn default_min_power_w() -> u32 {
    100
}

fn default_nominal_voltage_v() -> f64 {
    230.0
}

fn default_voltage_jitter_v() -> f64 {
    5.0
}

fn default_emission_factor() -> f64 {
    0.5
}

fn default_seed_multiplier() -> f64 {
    12345.0
}

fn default_classroom_count() -> u32 {
    30
}

fn default_unit_price() -> f64 {
    7.72
}

fn default_currency() -> String {
    "BDT".to_owned()
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9899))
}

/// Primary configuration object for the monitoring core.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub building: BuildingConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where an [`AppConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedAppConfig {
    pub config: AppConfig,
    /// `None` when no file was found and built-in defaults apply.
    pub source: Option<PathBuf>,
}

impl AppConfig {
    pub const ENV_CONFIG_PATH: &str = "CEMS_CONFIG";

    /// Load configuration from disk, respecting the `CEMS_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration together with the effective source path.
    ///
    /// An explicit `CEMS_CONFIG` path must exist. Candidate paths are tried in
    /// order; when none exists the defaults are used.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedAppConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path),
                });
            }
        }

        for candidate in candidates {
            let path = candidate.as_ref();
            if path.exists() {
                let config = Self::from_path(path)?;
                return Ok(LoadedAppConfig {
                    config,
                    source: Some(path.to_path_buf()),
                });
            }
        }

        debug!(
            inspected = %candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", "),
            "no configuration file found; using defaults"
        );
        Ok(LoadedAppConfig {
            config: Self::default(),
            source: None,
        })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<AppConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        self.bus.validate()?;
        self.generator.validate()?;
        self.building.validate()?;
        self.billing.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for AppConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Whether an explicit "off" re-emits an offline sample when already stopped.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OfflinePolicy {
    /// Offline sample only on a real running -> stopped transition.
    #[default]
    OnTransition,
    /// Offline sample on every "off" call.
    Always,
}

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_tick_interval")]
    #[serde_as(as = "DurationSeconds<u64>")]
    pub tick_interval: Duration,
    /// Classrooms fed by an external source; the bus never drives them.
    #[serde(default = "default_external_classrooms")]
    pub external_classrooms: Vec<i64>,
    #[serde(default)]
    pub offline_policy: OfflinePolicy,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            external_classrooms: default_external_classrooms(),
            offline_policy: OfflinePolicy::default(),
        }
    }
}

impl BusConfig {
    pub fn validate(&self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("bus.tick_interval must be greater than zero"));
        }
        if let Some(bad) = self.external_classrooms.iter().find(|id| **id <= 0) {
            return Err(anyhow!(
                "bus.external_classrooms contains non-positive id {}",
                bad
            ));
        }
        Ok(())
    }
}

/// Constants shaping the synthetic readings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_base_load_w")]
    pub base_load_w: f64,
    #[serde(default = "default_min_power_w")]
    pub min_power_w: u32,
    #[serde(default = "default_nominal_voltage_v")]
    pub nominal_voltage_v: f64,
    #[serde(default = "default_voltage_jitter_v")]
    pub voltage_jitter_v: f64,
    /// kg CO2 per kWh.
    #[serde(default = "default_emission_factor")]
    pub emission_factor: f64,
    #[serde(default = "default_seed_multiplier")]
    pub seed_multiplier: f64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_load_w: default_base_load_w(),
            min_power_w: default_min_power_w(),
            nominal_voltage_v: default_nominal_voltage_v(),
            voltage_jitter_v: default_voltage_jitter_v(),
            emission_factor: default_emission_factor(),
            seed_multiplier: default_seed_multiplier(),
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_power_w == 0 {
            return Err(anyhow!("generator.min_power_w must be greater than zero"));
        }
        if !(self.nominal_voltage_v > 0.0) {
            return Err(anyhow!("generator.nominal_voltage_v must be positive"));
        }
        if !(self.base_load_w >= 0.0) {
            return Err(anyhow!("generator.base_load_w must not be negative"));
        }
        if !(self.voltage_jitter_v >= 0.0) {
            return Err(anyhow!("generator.voltage_jitter_v must not be negative"));
        }
        if !(self.emission_factor >= 0.0) {
            return Err(anyhow!("generator.emission_factor must not be negative"));
        }
        if !self.seed_multiplier.is_finite() {
            return Err(anyhow!("generator.seed_multiplier must be finite"));
        }
        Ok(())
    }
}

/// Switch state applied to every classroom when the daemon starts.
#[derive(Debug, Copy, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InitialSwitch {
    #[default]
    Off,
    /// Even-numbered classrooms start switched on.
    EvenOn,
}

impl InitialSwitch {
    pub fn state_for(&self, classroom: u32) -> bool {
        match self {
            InitialSwitch::Off => false,
            InitialSwitch::EvenOn => classroom % 2 == 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingConfig {
    #[serde(default = "default_classroom_count")]
    pub classroom_count: u32,
    #[serde(default)]
    pub initial_switch: InitialSwitch,
}

impl Default for BuildingConfig {
    fn default() -> Self {
        Self {
            classroom_count: default_classroom_count(),
            initial_switch: InitialSwitch::default(),
        }
    }
}

impl BuildingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.classroom_count == 0 {
            return Err(anyhow!("building.classroom_count must be greater than zero"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Price per kWh in `currency`.
    #[serde(default = "default_unit_price")]
    pub unit_price: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            unit_price: default_unit_price(),
            currency: default_currency(),
        }
    }
}

impl BillingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.unit_price >= 0.0) {
            return Err(anyhow!("billing.unit_price must not be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: LogFormat::default(),
            file_prefix: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}
