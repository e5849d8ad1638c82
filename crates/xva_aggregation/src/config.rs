//! Post-processing configuration.
//!
//! Handles loading of the aggregation settings from TOML files with
//! environment variable override support.
//!
//! # Example
//!
//! ```
//! use xva_aggregation::config::{AggregationConfig, AllocationMethod};
//!
//! let config = AggregationConfig::from_toml_str(r#"
//!     base_currency = "USD"
//!     quantile = 0.99
//!     allocation_method = "RelativeFairValueNet"
//!
//!     [kva]
//!     alpha = 1.4
//! "#).unwrap();
//!
//! assert_eq!(config.allocation_method, AllocationMethod::RelativeFairValueNet);
//! assert!(config.validate().is_ok());
//! ```

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Policy used to distribute netting-set exposure back to trades.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub enum AllocationMethod {
    /// No allocation, allocated slots are zero.
    #[default]
    None,
    /// Delegated to an external marginal allocator.
    Marginal,
    /// Pro rata to trade NPV over the positive netting-set NPV.
    RelativeFairValueGross,
    /// Positive and negative trade NPV parts over the positive netting-set NPV.
    RelativeFairValueNet,
    /// Pro rata to trade NPV relative to standalone trade CVA.
    RelativeXVA,
}

impl AllocationMethod {
    /// Configuration name of the method.
    pub fn name(&self) -> &'static str {
        match self {
            AllocationMethod::None => "None",
            AllocationMethod::Marginal => "Marginal",
            AllocationMethod::RelativeFairValueGross => "RelativeFairValueGross",
            AllocationMethod::RelativeFairValueNet => "RelativeFairValueNet",
            AllocationMethod::RelativeXVA => "RelativeXVA",
        }
    }
}

impl FromStr for AllocationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "None" => Ok(AllocationMethod::None),
            "Marginal" => Ok(AllocationMethod::Marginal),
            "RelativeFairValueGross" => Ok(AllocationMethod::RelativeFairValueGross),
            "RelativeFairValueNet" => Ok(AllocationMethod::RelativeFairValueNet),
            "RelativeXVA" => Ok(AllocationMethod::RelativeXVA),
            other => Err(ConfigError::UnknownValue {
                field: "allocation_method",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for AllocationMethod {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Which side of the margin period of risk the collateral model lags.
///
/// `NoLag` values exposure on default values; all other types use the
/// close-out values of the valuation cube.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "String")]
pub enum CollateralCalculationType {
    /// Lag applied to both posting and receiving.
    #[default]
    Symmetric,
    /// Lag applied when we receive collateral.
    AsymmetricCVA,
    /// Lag applied when we post collateral.
    AsymmetricDVA,
    /// No margin period of risk.
    NoLag,
}

impl CollateralCalculationType {
    /// Configuration name of the calculation type.
    pub fn name(&self) -> &'static str {
        match self {
            CollateralCalculationType::Symmetric => "Symmetric",
            CollateralCalculationType::AsymmetricCVA => "AsymmetricCVA",
            CollateralCalculationType::AsymmetricDVA => "AsymmetricDVA",
            CollateralCalculationType::NoLag => "NoLag",
        }
    }
}

impl FromStr for CollateralCalculationType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Symmetric" => Ok(CollateralCalculationType::Symmetric),
            "AsymmetricCVA" => Ok(CollateralCalculationType::AsymmetricCVA),
            "AsymmetricDVA" => Ok(CollateralCalculationType::AsymmetricDVA),
            "NoLag" => Ok(CollateralCalculationType::NoLag),
            other => Err(ConfigError::UnknownValue {
                field: "calculation_type",
                value: other.to_string(),
            }),
        }
    }
}

impl TryFrom<String> for CollateralCalculationType {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for CollateralCalculationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Analytics switched on for the run.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AnalyticsFlags {
    /// Dynamic initial margin reduces exposure.
    pub dim: bool,
    /// Margin valuation adjustment (requires a DIM provider).
    pub mva: bool,
    /// Capital valuation adjustment.
    pub kva: bool,
    /// Funding valuation adjustment.
    pub fva: bool,
}

impl Default for AnalyticsFlags {
    fn default() -> Self {
        Self {
            dim: false,
            mva: false,
            kva: true,
            fva: false,
        }
    }
}

/// Regulatory capital parameters.
///
/// The `our_*` and `their_*` pairs follow the naming of the regulatory
/// capital desk; see [`RegulatoryCapitalEngine`](crate::kva::RegulatoryCapitalEngine)
/// for which side each one feeds.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq)]
#[serde(default)]
pub struct KvaParams {
    /// Annual rate used to discount future capital.
    pub capital_discount_rate: f64,
    /// Basel alpha multiplier on EEPE.
    pub alpha: f64,
    /// Capital to RWA conversion (e.g. 12.5).
    pub regulatory_adjustment: f64,
    /// Cost of capital charged per year.
    pub capital_hurdle: f64,
    /// PD floor labelled "our".
    pub our_pd_floor: f64,
    /// PD floor labelled "their".
    pub their_pd_floor: f64,
    /// CVA capital risk weight labelled "our".
    pub our_cva_risk_weight: f64,
    /// CVA capital risk weight labelled "their".
    pub their_cva_risk_weight: f64,
}

impl Default for KvaParams {
    fn default() -> Self {
        Self {
            capital_discount_rate: 0.10,
            alpha: 1.4,
            regulatory_adjustment: 12.5,
            capital_hurdle: 0.012,
            our_pd_floor: 0.03,
            their_pd_floor: 0.03,
            our_cva_risk_weight: 0.05,
            their_cva_risk_weight: 0.05,
        }
    }
}

/// Funding spreads over the discount curve.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct FundingParams {
    /// Spread paid when funding positive exposure.
    pub borrowing_spread: f64,
    /// Spread earned on negative exposure.
    pub lending_spread: f64,
}

/// Post-processing configuration.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AggregationConfig {
    /// Reporting currency of the cube values.
    #[serde(default = "default_base_currency")]
    pub base_currency: String,

    /// PFE quantile in [0, 1].
    #[serde(default = "default_quantile")]
    pub quantile: f64,

    /// Collateral lag convention.
    #[serde(default)]
    pub calculation_type: CollateralCalculationType,

    /// Exposure allocation policy.
    #[serde(default)]
    pub allocation_method: AllocationMethod,

    /// Limit passed to the marginal allocator.
    #[serde(default = "default_marginal_allocation_limit")]
    pub marginal_allocation_limit: f64,

    /// Assume collateral fully offsets today's netting-set value.
    #[serde(default)]
    pub full_initial_collateralisation: bool,

    /// Keep per-sample exposures in the cubes instead of sample means.
    #[serde(default = "default_multi_path")]
    pub multi_path: bool,

    /// Own credit name used for DVA and "their" capital.
    #[serde(default)]
    pub dva_name: Option<String>,

    /// Enabled analytics.
    #[serde(default)]
    pub analytics: AnalyticsFlags,

    /// Regulatory capital parameters.
    #[serde(default)]
    pub kva: KvaParams,

    /// Funding spreads.
    #[serde(default)]
    pub funding: FundingParams,
}

fn default_base_currency() -> String {
    "EUR".to_string()
}

fn default_quantile() -> f64 {
    0.95
}

fn default_marginal_allocation_limit() -> f64 {
    1.0
}

fn default_multi_path() -> bool {
    true
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            base_currency: default_base_currency(),
            quantile: default_quantile(),
            calculation_type: CollateralCalculationType::default(),
            allocation_method: AllocationMethod::default(),
            marginal_allocation_limit: default_marginal_allocation_limit(),
            full_initial_collateralisation: false,
            multi_path: default_multi_path(),
            dva_name: None,
            analytics: AnalyticsFlags::default(),
            kva: KvaParams::default(),
            funding: FundingParams::default(),
        }
    }
}

impl AggregationConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Apply environment variable overrides
    ///
    /// Recognised variables: `XVA_AGG_BASE_CURRENCY`, `XVA_AGG_QUANTILE`,
    /// `XVA_AGG_ALLOCATION_METHOD`, `XVA_AGG_KVA_ENABLED`.
    pub fn with_env_override(mut self) -> Result<Self, ConfigError> {
        if let Ok(ccy) = std::env::var("XVA_AGG_BASE_CURRENCY") {
            self.base_currency = ccy;
        }

        if let Ok(quantile) = std::env::var("XVA_AGG_QUANTILE") {
            self.quantile = quantile.parse().map_err(|_| ConfigError::InvalidOverride {
                variable: "XVA_AGG_QUANTILE",
                value: quantile.clone(),
            })?;
        }

        if let Ok(method) = std::env::var("XVA_AGG_ALLOCATION_METHOD") {
            self.allocation_method = method.parse()?;
        }

        if let Ok(kva) = std::env::var("XVA_AGG_KVA_ENABLED") {
            self.analytics.kva = match kva.to_lowercase().as_str() {
                "1" | "true" | "yes" | "y" => true,
                "0" | "false" | "no" | "n" => false,
                _ => {
                    return Err(ConfigError::InvalidOverride {
                        variable: "XVA_AGG_KVA_ENABLED",
                        value: kva,
                    })
                }
            };
        }

        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.base_currency.trim().is_empty() {
            errors.push("base_currency cannot be empty".to_string());
        }

        if !(0.0..=1.0).contains(&self.quantile) {
            errors.push(format!("quantile {} must lie in [0, 1]", self.quantile));
        }

        if self.marginal_allocation_limit <= 0.0 {
            errors.push(format!(
                "marginal_allocation_limit {} must be positive",
                self.marginal_allocation_limit
            ));
        }

        let kva = &self.kva;
        for (name, value) in [
            ("kva.alpha", kva.alpha),
            ("kva.regulatory_adjustment", kva.regulatory_adjustment),
            ("kva.capital_hurdle", kva.capital_hurdle),
            ("kva.our_cva_risk_weight", kva.our_cva_risk_weight),
            ("kva.their_cva_risk_weight", kva.their_cva_risk_weight),
        ] {
            if value < 0.0 {
                errors.push(format!("{} {} must be non-negative", name, value));
            }
        }

        if kva.capital_discount_rate <= -1.0 {
            errors.push(format!(
                "kva.capital_discount_rate {} must exceed -1",
                kva.capital_discount_rate
            ));
        }

        for (name, value) in [
            ("kva.our_pd_floor", kva.our_pd_floor),
            ("kva.their_pd_floor", kva.their_pd_floor),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(format!("{} {} must lie in [0, 1]", name, value));
            }
        }

        if let Some(name) = &self.dva_name {
            if name.trim().is_empty() {
                errors.push("dva_name cannot be blank when set".to_string());
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Load from file with environment overrides and validate
    pub fn load_with_env_and_validate(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::load(path)?.with_env_override()?;
        config.validate()?;
        Ok(config)
    }
}

/// Configuration error type
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// IO error reading config file
    #[error("IO error: {0}")]
    Io(String),

    /// Parse error in config file
    #[error("Parse error: {0}")]
    Parse(String),

    /// Validation error
    #[error("Validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Unrecognised enumeration value
    #[error("Unknown {field} '{value}'")]
    UnknownValue {
        /// Field being parsed
        field: &'static str,
        /// Rejected value
        value: String,
    },

    /// Environment variable with an unusable value
    #[error("Invalid value '{value}' for environment variable {variable}")]
    InvalidOverride {
        /// Variable name
        variable: &'static str,
        /// Rejected value
        value: String,
    },
}
