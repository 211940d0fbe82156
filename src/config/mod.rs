use std::collections::BTreeMap;
use std::env;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, TickError};
use crate::model::{decompose_urn, Feature, Side};
use crate::ticks::LengthUnit;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub network: NetworkConfig,
    pub ticks: TickConfig,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Default tick mark calibration settings
#[derive(Debug, Clone, PartialEq)]
pub struct TickConfig {
    /// Distance between two consecutive tick marks, in `unit`.
    pub spacing: f64,
    pub unit: LengthUnit,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            spacing: 1.0,
            unit: LengthUnit::Meter,
        }
    }
}

/// Function an equipment type performs on the signal passing through it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EquipFunction {
    /// Combines all inputs onto a single output.
    Mux,
    /// Fans one input out to every output.
    Splitter,
    /// Passes each input straight through to the same-numbered output.
    Connector,
    /// Holds coiled cable slack.
    Slack,
}

impl std::str::FromStr for EquipFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mux" => Ok(EquipFunction::Mux),
            "splitter" => Ok(EquipFunction::Splitter),
            "connector" => Ok(EquipFunction::Connector),
            "slack" => Ok(EquipFunction::Slack),
            _ => Err(format!("Unknown equipment function: {}", s)),
        }
    }
}

/// Feature types and field names for one network technology
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkType {
    pub tech: String,
    pub segment_type: String,
    pub slack_type: String,
    pub connection_type: String,
    pub cable_n_pins_field: String,
    pub equip_n_pins_field: String,
    pub equip_n_in_pins_field: String,
    pub equip_n_out_pins_field: String,
}

impl NetworkType {
    /// Standard field layout for `tech` (`fiber`, `copper`, `coax`, ...).
    pub fn standard(tech: &str) -> Self {
        Self {
            tech: tech.to_string(),
            segment_type: format!("mywcom_{}_segment", tech),
            slack_type: format!("mywcom_{}_slack", tech),
            connection_type: format!("mywcom_{}_connection", tech),
            cable_n_pins_field: format!("{}_count", tech),
            equip_n_pins_field: format!("n_{}_ports", tech),
            equip_n_in_pins_field: format!("n_{}_in_ports", tech),
            equip_n_out_pins_field: format!("n_{}_out_ports", tech),
        }
    }
}

/// Feature type registry passed to every builder
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkConfig {
    pub network_types: Vec<NetworkType>,
    /// Equipment function keyed by feature type.
    pub equipment_functions: BTreeMap<String, EquipFunction>,
    /// Conduit feature types (ducts, blown fiber tubes).
    pub conduit_types: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            network_types: ["fiber", "copper", "coax"]
                .into_iter()
                .map(NetworkType::standard)
                .collect(),
            equipment_functions: BTreeMap::new(),
            conduit_types: vec!["conduit".to_string(), "blown_fiber_tube".to_string()],
        }
    }
}

impl NetworkConfig {
    /// Builder: declare the function of an equipment type.
    pub fn with_function(mut self, feature_type: &str, function: EquipFunction) -> Self {
        self.equipment_functions
            .insert(feature_type.to_string(), function);
        self
    }

    /// Load from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, AppError> {
        let mut config = Self::default();

        if let Ok(json) = env::var("COMMS_NETWORK_TYPES") {
            config.network_types =
                serde_json::from_str(&json).map_err(|e| AppError::Config {
                    message: format!("COMMS_NETWORK_TYPES is not valid JSON: {}", e),
                })?;
        }

        if let Ok(json) = env::var("COMMS_EQUIPMENT_FUNCTIONS") {
            config.equipment_functions =
                serde_json::from_str(&json).map_err(|e| AppError::Config {
                    message: format!("COMMS_EQUIPMENT_FUNCTIONS is not valid JSON: {}", e),
                })?;
        }

        if let Ok(json) = env::var("COMMS_CONDUIT_TYPES") {
            config.conduit_types = serde_json::from_str(&json).map_err(|e| AppError::Config {
                message: format!("COMMS_CONDUIT_TYPES is not valid JSON: {}", e),
            })?;
        }

        Ok(config)
    }

    /// Segment feature types for all technologies.
    pub fn segment_types(&self) -> Vec<&str> {
        self.network_types
            .iter()
            .map(|t| t.segment_type.as_str())
            .collect()
    }

    /// Connection feature types for all technologies.
    pub fn connection_types(&self) -> Vec<&str> {
        self.network_types
            .iter()
            .map(|t| t.connection_type.as_str())
            .collect()
    }

    /// Slack feature types for all technologies.
    pub fn slack_types(&self) -> Vec<&str> {
        self.network_types
            .iter()
            .map(|t| t.slack_type.as_str())
            .collect()
    }

    /// True if `urn` identifies a cable segment.
    pub fn is_segment(&self, urn: &str) -> bool {
        let (feature_type, _) = decompose_urn(urn);
        self.network_types
            .iter()
            .any(|t| t.segment_type == feature_type)
    }

    /// True if `urn` identifies a conduit.
    pub fn is_conduit(&self, urn: &str) -> bool {
        let (feature_type, _) = decompose_urn(urn);
        self.conduit_types.iter().any(|t| t == feature_type)
    }

    /// True if `urn` identifies a connection record.
    pub fn is_connection(&self, urn: &str) -> bool {
        let (feature_type, _) = decompose_urn(urn);
        self.network_types
            .iter()
            .any(|t| t.connection_type == feature_type)
    }

    /// Number of pins (fibers, pairs) in `cable`.
    pub fn cable_pin_count(&self, cable: &Feature) -> Option<u32> {
        self.network_types
            .iter()
            .find_map(|t| cable.int_prop(&t.cable_n_pins_field))
            .and_then(positive)
    }

    /// Number of ports on `side` of `equip`.
    ///
    /// Side-specific port counts take precedence over the shared count,
    /// technologies are tried in configuration order.
    pub fn equip_port_count(&self, equip: &Feature, side: Side) -> Option<u32> {
        self.network_types
            .iter()
            .find_map(|t| {
                let side_field = match side {
                    Side::In => &t.equip_n_in_pins_field,
                    Side::Out => &t.equip_n_out_pins_field,
                };
                equip
                    .int_prop(side_field)
                    .or_else(|| equip.int_prop(&t.equip_n_pins_field))
            })
            .and_then(positive)
    }

    /// Number of dedicated output ports on `equip` (no shared count fallback).
    pub fn equip_out_ports(&self, equip: &Feature) -> Option<u32> {
        self.network_types
            .iter()
            .find_map(|t| equip.int_prop(&t.equip_n_out_pins_field))
            .and_then(positive)
    }

    /// Function performed by `equip`, if any is declared.
    ///
    /// Looked up by feature type first, then from the `function` property.
    /// Slack feature types always report [`EquipFunction::Slack`].
    pub fn defined_function(&self, equip: &Feature) -> Option<EquipFunction> {
        let feature_type = equip.feature_type();
        if let Some(function) = self.equipment_functions.get(feature_type) {
            return Some(*function);
        }
        if self.slack_types().contains(&feature_type) {
            return Some(EquipFunction::Slack);
        }
        equip.str_prop("function").and_then(|f| f.parse().ok())
    }
}

fn positive(n: i64) -> Option<u32> {
    u32::try_from(n).ok().filter(|n| *n > 0)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let ticks = TickConfig {
            spacing: env::var("TICK_SPACING")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|s: &f64| s.is_finite() && *s > 0.0)
                .unwrap_or(1.0),
            unit: match env::var("TICK_UNIT") {
                Ok(unit) => unit
                    .parse::<LengthUnit>()
                    .map_err(|e: TickError| AppError::Config {
                        message: format!("TICK_UNIT: {}", e),
                    })?,
                Err(_) => LengthUnit::Meter,
            },
        };

        Ok(Config {
            logging,
            network: NetworkConfig::from_env()?,
            ticks,
        })
    }
}
