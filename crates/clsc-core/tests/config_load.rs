//! Configuration file loading tests

use clsc_core::{ClscConfig, DcId, FacilityRef, RcId};
use std::io::Write;

const YAML: &str = r#"
manufacturing_capacity: 200.0
remanufacturing_capacity: 100.0
dc_fixed_costs: [1000.0, 1200.0]
rc_fixed_costs: [500.0]
plant_dc_costs: [1.0, 2.0]
dc_customer_costs:
  - [1.0, 2.0]
  - [2.0, 1.0]
customer_rc_costs:
  - [0.5]
  - [0.7]
rc_plant_costs: [1.0]
demand_density: [30.0, 10.0]
pins:
  - facility: { kind: dc, index: 1 }
    open: false
"#;

fn write_temp(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_load_yaml_normalizes_demand_and_defaults() {
    let file = write_temp(".yaml", YAML);
    let config = ClscConfig::load(file.path()).expect("valid yaml config");

    assert_eq!(config.demand_density, vec![0.75, 0.25]);
    assert_eq!(config.min_return_centers, 1);
    assert_eq!(config.economics.reservation_price_upper, 600.0);
    assert_eq!(config.pin_for(FacilityRef::Dc(DcId(1))), Some(false));
    assert_eq!(config.pin_for(FacilityRef::Rc(RcId(0))), None);
}

#[test]
fn test_load_json_round_trips_builder_output() {
    let from_yaml = ClscConfig::from_yaml_str(YAML).expect("valid yaml");
    let json = serde_json::to_string(&from_yaml).expect("serialize");
    let file = write_temp(".json", &json);
    let from_json = ClscConfig::load(file.path()).expect("valid json config");
    assert_eq!(from_yaml, from_json);
}

#[test]
fn test_load_reports_dimension_errors() {
    let broken = YAML.replace("plant_dc_costs: [1.0, 2.0]", "plant_dc_costs: [1.0]");
    let file = write_temp(".yml", &broken);
    let err = ClscConfig::load(file.path()).unwrap_err();
    let message = format!("{:#}", err);
    assert!(message.contains("plant_dc_costs"), "unexpected error: {}", message);
}

#[test]
fn test_missing_file_has_context() {
    let err = ClscConfig::load(std::path::Path::new("/nonexistent/clsc.yaml")).unwrap_err();
    assert!(format!("{:#}", err).contains("reading configuration"));
}
