//! Immutable problem configuration.
//!
//! A [`ClscConfig`] holds everything that is fixed across scenarios: economic
//! constants, plant capacities, facility fixed costs, per-unit flow costs on
//! the four network tiers, the customer demand density and the static master
//! side constraints. It is built once (via [`ClscConfigBuilder`] or
//! [`ClscConfig::load`]), validated, and then shared by reference with every
//! component.
//!
//! ```text
//!            plant ──(new / reman)──▶ DC ──(new / reman)──▶ customer
//!              ▲                                               │
//!              └──────────── RC ◀──────── returns ─────────────┘
//! ```

use crate::error::ConfigError;
use crate::facility::{DcId, FacilityDecision, FacilityPin, FacilityRef, RcId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Price and unit-cost constants of the product and its remanufactured variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EconomicParams {
    /// Highest reservation price in the market
    #[serde(default = "default_price_upper")]
    pub reservation_price_upper: f64,
    /// Lowest reservation price in the market
    #[serde(default = "default_price_lower")]
    pub reservation_price_lower: f64,
    /// Relative valuation of a remanufactured unit (0, 1]
    #[serde(default = "default_depreciation")]
    pub reman_depreciation: f64,
    #[serde(default = "default_manufacturing_cost")]
    pub manufacturing_cost: f64,
    #[serde(default = "default_remanufacturing_cost")]
    pub remanufacturing_cost: f64,
    #[serde(default = "default_holding_cost")]
    pub holding_cost: f64,
    /// Cost avoided for every returned unit that is remanufactured
    #[serde(default = "default_disposal_cost")]
    pub disposal_cost: f64,
}

fn default_price_upper() -> f64 {
    600.0
}

fn default_price_lower() -> f64 {
    370.0
}

fn default_depreciation() -> f64 {
    0.7
}

fn default_manufacturing_cost() -> f64 {
    370.0
}

fn default_remanufacturing_cost() -> f64 {
    225.0
}

fn default_holding_cost() -> f64 {
    10.0
}

fn default_disposal_cost() -> f64 {
    50.0
}

impl Default for EconomicParams {
    fn default() -> Self {
        Self {
            reservation_price_upper: default_price_upper(),
            reservation_price_lower: default_price_lower(),
            reman_depreciation: default_depreciation(),
            manufacturing_cost: default_manufacturing_cost(),
            remanufacturing_cost: default_remanufacturing_cost(),
            holding_cost: default_holding_cost(),
            disposal_cost: default_disposal_cost(),
        }
    }
}

impl EconomicParams {
    /// Slope of the inverse demand curve, `(upper − lower) / market_size`.
    pub fn price_slope(&self, market_size: f64) -> f64 {
        (self.reservation_price_upper - self.reservation_price_lower) / market_size
    }

    /// Linear revenue coefficient of a newly manufactured unit.
    pub fn new_margin(&self) -> f64 {
        self.reservation_price_upper - self.manufacturing_cost - self.holding_cost
    }

    /// Linear revenue coefficient of a remanufactured unit.
    pub fn reman_margin(&self) -> f64 {
        self.reman_depreciation * self.reservation_price_upper - self.remanufacturing_cost
            - self.holding_cost
            + self.disposal_cost
    }

    /// Per returned unit cost when it is held and disposed of.
    pub fn return_handling_cost(&self) -> f64 {
        self.holding_cost + self.disposal_cost
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let scalars = [
            ("reservation_price_upper", self.reservation_price_upper),
            ("reservation_price_lower", self.reservation_price_lower),
            ("manufacturing_cost", self.manufacturing_cost),
            ("remanufacturing_cost", self.remanufacturing_cost),
            ("holding_cost", self.holding_cost),
            ("disposal_cost", self.disposal_cost),
        ];
        for (field, value) in scalars {
            check_scalar(field, value)?;
        }
        if self.reservation_price_upper <= self.reservation_price_lower {
            return Err(ConfigError::Economics(format!(
                "reservation price band is empty ({} <= {})",
                self.reservation_price_upper, self.reservation_price_lower
            )));
        }
        // Revenue stays concave only for depreciation in (0, 1].
        if !(self.reman_depreciation > 0.0 && self.reman_depreciation <= 1.0) {
            return Err(ConfigError::Economics(format!(
                "remanufacture depreciation must lie in (0, 1], got {}",
                self.reman_depreciation
            )));
        }
        Ok(())
    }
}

fn default_min_return_centers() -> usize {
    1
}

/// Complete deterministic data of a closed-loop supply chain instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClscConfig {
    #[serde(default)]
    pub economics: EconomicParams,
    /// Manufacturing capacity of the plant
    pub manufacturing_capacity: f64,
    /// Remanufacturing capacity of the plant
    pub remanufacturing_capacity: f64,
    /// Fixed cost of opening each DC
    pub dc_fixed_costs: Vec<f64>,
    /// Fixed cost of opening each RC
    pub rc_fixed_costs: Vec<f64>,
    /// Unit cost plant → DC, indexed by DC
    pub plant_dc_costs: Vec<f64>,
    /// Unit cost DC → customer, `[dc][customer]`
    pub dc_customer_costs: Vec<Vec<f64>>,
    /// Unit cost customer → RC, `[customer][rc]`
    pub customer_rc_costs: Vec<Vec<f64>>,
    /// Unit cost RC → plant, indexed by RC
    pub rc_plant_costs: Vec<f64>,
    /// Share of demand (and of returns) at each customer; sums to one
    pub demand_density: Vec<f64>,
    /// Lower bound on the number of open RCs
    #[serde(default = "default_min_return_centers")]
    pub min_return_centers: usize,
    /// Facilities forced open or closed
    #[serde(default)]
    pub pins: Vec<FacilityPin>,
}

impl ClscConfig {
    /// Load a configuration from YAML (`.yaml`/`.yml`) or JSON (`.json`).
    ///
    /// Demand weights in the file are normalized into a density before
    /// validation, so raw population counts can be used directly.
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading configuration {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let config = if is_json {
            Self::from_json_str(&text)
        } else {
            Self::from_yaml_str(&text)
        };
        config.with_context(|| format!("parsing configuration {}", path.display()))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: ClscConfig = serde_yaml::from_str(text).context("invalid YAML configuration")?;
        Ok(raw.finish()?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: ClscConfig = serde_json::from_str(text).context("invalid JSON configuration")?;
        Ok(raw.finish()?)
    }

    fn finish(mut self) -> Result<Self, ConfigError> {
        self.demand_density = normalize(&self.demand_density)?;
        self.validate()?;
        Ok(self)
    }

    pub fn num_dcs(&self) -> usize {
        self.dc_fixed_costs.len()
    }

    pub fn num_rcs(&self) -> usize {
        self.rc_fixed_costs.len()
    }

    pub fn num_customers(&self) -> usize {
        self.demand_density.len()
    }

    /// Pinned status of a facility, if any.
    pub fn pin_for(&self, facility: FacilityRef) -> Option<bool> {
        self.pins
            .iter()
            .find(|p| p.facility == facility)
            .map(|p| p.open)
    }

    /// Total fixed cost of the facilities a decision opens.
    pub fn fixed_cost(&self, decision: &FacilityDecision) -> f64 {
        let dc: f64 = decision
            .dcs()
            .filter(|s| s.is_open)
            .map(|s| self.dc_fixed_costs[s.id.0])
            .sum();
        let rc: f64 = decision
            .rcs()
            .filter(|s| s.is_open)
            .map(|s| self.rc_fixed_costs[s.id.0])
            .sum();
        dc + rc
    }

    /// Copy of this configuration with a different disposal cost.
    pub fn with_disposal_cost(&self, disposal_cost: f64) -> Self {
        let mut next = self.clone();
        next.economics.disposal_cost = disposal_cost;
        next
    }

    /// Check every dimension and value; run before any decomposition.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let n_dc = self.num_dcs();
        let n_rc = self.num_rcs();
        let n_cust = self.num_customers();
        if n_dc == 0 {
            return Err(ConfigError::Empty("distribution center"));
        }
        if n_rc == 0 {
            return Err(ConfigError::Empty("return center"));
        }
        if n_cust == 0 {
            return Err(ConfigError::Empty("customer"));
        }

        self.economics.validate()?;
        check_scalar("manufacturing_capacity", self.manufacturing_capacity)?;
        check_scalar("remanufacturing_capacity", self.remanufacturing_capacity)?;

        check_vector("dc_fixed_costs", &self.dc_fixed_costs, n_dc)?;
        check_vector("rc_fixed_costs", &self.rc_fixed_costs, n_rc)?;
        check_vector("plant_dc_costs", &self.plant_dc_costs, n_dc)?;
        check_vector("rc_plant_costs", &self.rc_plant_costs, n_rc)?;
        check_matrix("dc_customer_costs", &self.dc_customer_costs, n_dc, n_cust)?;
        check_matrix("customer_rc_costs", &self.customer_rc_costs, n_cust, n_rc)?;
        check_vector("demand_density", &self.demand_density, n_cust)?;

        let total: f64 = self.demand_density.iter().sum();
        if (total - 1.0).abs() > 1e-6 {
            return Err(ConfigError::DegenerateDemand(total));
        }

        self.validate_pins()
    }

    fn validate_pins(&self) -> Result<(), ConfigError> {
        for (i, pin) in self.pins.iter().enumerate() {
            let in_range = match pin.facility {
                FacilityRef::Dc(DcId(d)) => d < self.num_dcs(),
                FacilityRef::Rc(RcId(r)) => r < self.num_rcs(),
            };
            if !in_range {
                return Err(ConfigError::PinOutOfRange(pin.facility.to_string()));
            }
            if self.pins[..i]
                .iter()
                .any(|p| p.facility == pin.facility && p.open != pin.open)
            {
                return Err(ConfigError::ContradictoryPin(pin.facility.to_string()));
            }
        }

        let closed_rcs = (0..self.num_rcs())
            .filter(|r| self.pin_for(FacilityRef::Rc(RcId(*r))) == Some(false))
            .count();
        let available = self.num_rcs() - closed_rcs;
        if self.min_return_centers > available {
            return Err(ConfigError::ReturnCenterMinimum {
                required: self.min_return_centers,
                available,
            });
        }
        Ok(())
    }
}

fn check_scalar(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field: field.to_string(),
            value,
        })
    }
}

fn check_vector(table: &'static str, values: &[f64], expected: usize) -> Result<(), ConfigError> {
    if values.len() != expected {
        return Err(ConfigError::DimensionMismatch {
            table,
            expected,
            found: values.len(),
        });
    }
    for (i, v) in values.iter().enumerate() {
        check_scalar(&format!("{}[{}]", table, i), *v)?;
    }
    Ok(())
}

fn check_matrix(
    table: &'static str,
    rows: &[Vec<f64>],
    expected_rows: usize,
    expected_cols: usize,
) -> Result<(), ConfigError> {
    if rows.len() != expected_rows {
        return Err(ConfigError::DimensionMismatch {
            table,
            expected: expected_rows,
            found: rows.len(),
        });
    }
    for row in rows {
        check_vector(table, row, expected_cols)?;
    }
    Ok(())
}

fn normalize(weights: &[f64]) -> Result<Vec<f64>, ConfigError> {
    let total: f64 = weights.iter().sum();
    if !(total.is_finite() && total > 0.0) || weights.iter().any(|w| *w < 0.0) {
        return Err(ConfigError::DegenerateDemand(total));
    }
    Ok(weights.iter().map(|w| w / total).collect())
}

/// Builder for [`ClscConfig`].
///
/// Starts from zero costs, uniform demand and default economics; every
/// setter replaces one table. `build` normalizes the demand weights and
/// validates the result.
pub struct ClscConfigBuilder {
    config: ClscConfig,
    demand_weights: Vec<f64>,
}

impl ClscConfigBuilder {
    pub fn new(num_dcs: usize, num_rcs: usize, num_customers: usize) -> Self {
        Self {
            config: ClscConfig {
                economics: EconomicParams::default(),
                manufacturing_capacity: 0.0,
                remanufacturing_capacity: 0.0,
                dc_fixed_costs: vec![0.0; num_dcs],
                rc_fixed_costs: vec![0.0; num_rcs],
                plant_dc_costs: vec![0.0; num_dcs],
                dc_customer_costs: vec![vec![0.0; num_customers]; num_dcs],
                customer_rc_costs: vec![vec![0.0; num_rcs]; num_customers],
                rc_plant_costs: vec![0.0; num_rcs],
                demand_density: Vec::new(),
                min_return_centers: default_min_return_centers(),
                pins: Vec::new(),
            },
            demand_weights: vec![1.0; num_customers],
        }
    }

    pub fn economics(mut self, economics: EconomicParams) -> Self {
        self.config.economics = economics;
        self
    }

    /// Set manufacturing and remanufacturing capacity.
    pub fn capacities(mut self, manufacturing: f64, remanufacturing: f64) -> Self {
        self.config.manufacturing_capacity = manufacturing;
        self.config.remanufacturing_capacity = remanufacturing;
        self
    }

    pub fn dc_fixed_costs(mut self, costs: Vec<f64>) -> Self {
        self.config.dc_fixed_costs = costs;
        self
    }

    pub fn rc_fixed_costs(mut self, costs: Vec<f64>) -> Self {
        self.config.rc_fixed_costs = costs;
        self
    }

    pub fn plant_dc_costs(mut self, costs: Vec<f64>) -> Self {
        self.config.plant_dc_costs = costs;
        self
    }

    pub fn dc_customer_costs(mut self, costs: Vec<Vec<f64>>) -> Self {
        self.config.dc_customer_costs = costs;
        self
    }

    pub fn customer_rc_costs(mut self, costs: Vec<Vec<f64>>) -> Self {
        self.config.customer_rc_costs = costs;
        self
    }

    pub fn rc_plant_costs(mut self, costs: Vec<f64>) -> Self {
        self.config.rc_plant_costs = costs;
        self
    }

    /// Raw (unnormalized) demand weights per customer.
    pub fn demand_weights(mut self, weights: Vec<f64>) -> Self {
        self.demand_weights = weights;
        self
    }

    pub fn min_return_centers(mut self, count: usize) -> Self {
        self.config.min_return_centers = count;
        self
    }

    pub fn pin(mut self, pin: FacilityPin) -> Self {
        self.config.pins.push(pin);
        self
    }

    pub fn build(mut self) -> Result<ClscConfig, ConfigError> {
        self.config.demand_density = normalize(&self.demand_weights)?;
        self.config.validate()?;
        Ok(self.config)
    }
}
