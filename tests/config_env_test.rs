//! Config environment variable tests
//!
//! These tests verify that Config::from_env() correctly reads and applies
//! environment variable overrides. Config::from_env() also loads a .env
//! file via dotenvy, so each test sets the variables it checks.
//!
//! Tests use #[serial] to prevent race conditions with shared env vars.

use comms_model::config::{Config, EquipFunction, LogFormat};
use comms_model::ticks::LengthUnit;
use comms_model::Feature;
use serial_test::serial;
use std::env;

#[test]
#[serial]
fn test_config_from_env_defaults() {
    env::remove_var("COMMS_NETWORK_TYPES");
    env::remove_var("COMMS_EQUIPMENT_FUNCTIONS");
    env::remove_var("COMMS_CONDUIT_TYPES");
    env::remove_var("TICK_SPACING");
    env::remove_var("TICK_UNIT");

    let config = Config::from_env().unwrap();
    assert_eq!(config.network.segment_types().len(), 3);
    assert_eq!(config.ticks.spacing, 1.0);
    assert_eq!(config.ticks.unit, LengthUnit::Meter);
}

#[test]
#[serial]
fn test_config_from_env_json_log_format() {
    env::set_var("LOG_FORMAT", "json");

    let config = Config::from_env().unwrap();
    assert_eq!(config.logging.format, LogFormat::Json);

    // Restore default
    env::set_var("LOG_FORMAT", "pretty");
}

#[test]
#[serial]
fn test_config_from_env_tick_settings() {
    env::set_var("TICK_SPACING", "0.5");
    env::set_var("TICK_UNIT", "ft");

    let config = Config::from_env().unwrap();
    assert_eq!(config.ticks.spacing, 0.5);
    assert_eq!(config.ticks.unit, LengthUnit::Foot);

    env::remove_var("TICK_SPACING");
    env::remove_var("TICK_UNIT");
}

#[test]
#[serial]
fn test_config_from_env_invalid_spacing_falls_back() {
    env::set_var("TICK_SPACING", "-3");

    let config = Config::from_env().unwrap();
    assert_eq!(config.ticks.spacing, 1.0);

    env::remove_var("TICK_SPACING");
}

#[test]
#[serial]
fn test_config_from_env_unknown_unit_is_rejected() {
    env::set_var("TICK_UNIT", "furlong");

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result.unwrap_err().to_string().contains("furlong"));

    env::remove_var("TICK_UNIT");
}

#[test]
#[serial]
fn test_config_from_env_equipment_functions() {
    env::set_var(
        "COMMS_EQUIPMENT_FUNCTIONS",
        r#"{"fiber_splitter": "splitter", "fiber_mux": "mux"}"#,
    );

    let config = Config::from_env().unwrap();
    let splitter = Feature::new("fiber_splitter/1");
    assert_eq!(
        config.network.defined_function(&splitter),
        Some(EquipFunction::Splitter)
    );
    assert_eq!(
        config.network.defined_function(&Feature::new("fiber_mux/3")),
        Some(EquipFunction::Mux)
    );

    env::remove_var("COMMS_EQUIPMENT_FUNCTIONS");
}

#[test]
#[serial]
fn test_config_from_env_network_types() {
    env::set_var(
        "COMMS_NETWORK_TYPES",
        r#"[{
            "tech": "fiber",
            "segment_type": "fiber_segment",
            "slack_type": "fiber_slack",
            "connection_type": "fiber_connection",
            "cable_n_pins_field": "fiber_count",
            "equip_n_pins_field": "n_fiber_ports",
            "equip_n_in_pins_field": "n_fiber_in_ports",
            "equip_n_out_pins_field": "n_fiber_out_ports"
        }]"#,
    );

    let config = Config::from_env().unwrap();
    assert_eq!(config.network.segment_types(), vec!["fiber_segment"]);
    assert!(config.network.is_segment("fiber_segment/4"));
    assert!(!config.network.is_segment("mywcom_fiber_segment/4"));

    env::remove_var("COMMS_NETWORK_TYPES");
}

#[test]
#[serial]
fn test_config_from_env_conduit_types() {
    env::set_var("COMMS_CONDUIT_TYPES", r#"["duct"]"#);

    let config = Config::from_env().unwrap();
    assert!(config.network.is_conduit("duct/1"));
    assert!(!config.network.is_conduit("conduit/1"));

    env::remove_var("COMMS_CONDUIT_TYPES");
}

#[test]
#[serial]
fn test_config_from_env_malformed_json_is_rejected() {
    env::set_var("COMMS_EQUIPMENT_FUNCTIONS", "{not json");

    let result = Config::from_env();
    assert!(result.is_err());
    assert!(result
        .unwrap_err()
        .to_string()
        .contains("COMMS_EQUIPMENT_FUNCTIONS"));

    env::remove_var("COMMS_EQUIPMENT_FUNCTIONS");
}
