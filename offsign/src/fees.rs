//! Fee policy engine.
//!
//! Pure computation of `{gas_limit, gas_fee_cap, gas_premium}` from a node
//! estimate, an optional previous premium (replace-by-fee), caller overrides
//! and a total-spend ceiling. No I/O happens here; the node is queried by the
//! workflow and its answer handed in as a [`FeeParameters`] value.
//!
//! Caller-supplied gas prices are always integer attoFIL. They are never
//! rescaled; anything above [`FeePolicyConfig::max_gas_fee_cap`] is refused.

use std::fmt;

use crate::config::FeePolicyConfig;
use crate::types::{ParseError, TokenAmount, UnsignedMessage};

/// Gas parameters of a message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeeParameters {
    pub gas_limit: i64,
    pub gas_fee_cap: TokenAmount,
    pub gas_premium: TokenAmount,
}

impl FeeParameters {
    pub fn of(message: &UnsignedMessage) -> Self {
        Self {
            gas_limit: message.gas_limit,
            gas_fee_cap: message.gas_fee_cap.clone(),
            gas_premium: message.gas_premium.clone(),
        }
    }

    /// Copies these parameters into `message`.
    pub fn apply_to(&self, message: &mut UnsignedMessage) {
        message.gas_limit = self.gas_limit;
        message.gas_fee_cap = self.gas_fee_cap.clone();
        message.gas_premium = self.gas_premium.clone();
    }

    /// `gas_limit * gas_fee_cap`, the most this message can spend on gas.
    pub fn max_cost(&self) -> TokenAmount {
        &self.gas_fee_cap * self.gas_limit
    }
}

/// Optional caller overrides, as entered on the command line.
///
/// `gas_fee_cap` and `gas_premium` are integer attoFIL strings; `max_fee` is a
/// decimal FIL amount (units accepted, see [`TokenAmount::parse_fil`]).
#[derive(Clone, Debug, Default)]
pub struct FeeOverrides {
    pub gas_limit: Option<i64>,
    pub gas_fee_cap: Option<String>,
    pub gas_premium: Option<String>,
    pub max_fee: Option<String>,
}

/// Reasons a fee computation is refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeeError {
    /// An override could not be parsed.
    Unparsable { field: &'static str, reason: String },
    /// Manual replacement needs this field.
    Missing(&'static str),
    /// Gas limit must be strictly positive.
    NonPositiveGasLimit(i64),
    /// Caller-supplied fee cap exceeds the configured ceiling.
    FeeCapAboveCeiling {
        fee_cap: TokenAmount,
        ceiling: TokenAmount,
    },
    /// Fee cap would be lower than the premium.
    FeeCapBelowPremium {
        fee_cap: TokenAmount,
        premium: TokenAmount,
    },
    /// A replacement premium below the pool's minimum bump.
    PremiumBelowReplaceFloor {
        premium: TokenAmount,
        floor: TokenAmount,
    },
}

impl fmt::Display for FeeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeeError::Unparsable { field, reason } => write!(f, "cannot parse {field}: {reason}"),
            FeeError::Missing(field) => write!(f, "{field} is required in manual mode"),
            FeeError::NonPositiveGasLimit(limit) => {
                write!(f, "gas limit must be positive, got {limit}")
            }
            FeeError::FeeCapAboveCeiling { fee_cap, ceiling } => write!(
                f,
                "gas fee cap {fee_cap} attoFIL exceeds the ceiling of {ceiling} attoFIL"
            ),
            FeeError::FeeCapBelowPremium { fee_cap, premium } => write!(
                f,
                "gas fee cap {fee_cap} is lower than gas premium {premium}"
            ),
            FeeError::PremiumBelowReplaceFloor { premium, floor } => write!(
                f,
                "gas premium {premium} is below the replace-by-fee minimum {floor}"
            ),
        }
    }
}

impl std::error::Error for FeeError {}

fn unparsable(field: &'static str) -> impl FnOnce(ParseError) -> FeeError {
    move |e| FeeError::Unparsable {
        field,
        reason: e.to_string(),
    }
}

/// Fee policy configured once per invocation.
#[derive(Clone, Debug)]
pub struct FeePolicy {
    config: FeePolicyConfig,
}

impl FeePolicy {
    pub fn new(config: FeePolicyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FeePolicyConfig {
        &self.config
    }

    /// Smallest premium the pool accepts for a message replacing one with
    /// premium `previous`.
    pub fn min_rbf_premium(&self, previous: &TokenAmount) -> TokenAmount {
        let bumped = &(previous * self.config.rbf_numerator) / self.config.rbf_denominator;
        &bumped + &TokenAmount::from(1u64)
    }

    /// Parses a `max_fee` override, falling back to the configured default.
    /// A zero ceiling also means "use the default".
    pub fn max_fee(&self, raw: Option<&str>) -> Result<TokenAmount, FeeError> {
        match raw {
            Some(s) => {
                let fee = TokenAmount::parse_fil(s).map_err(unparsable("max fee"))?;
                if fee.is_zero() {
                    Ok(self.config.default_max_fee.clone())
                } else {
                    Ok(fee)
                }
            }
            None => Ok(self.config.default_max_fee.clone()),
        }
    }

    /// Lowers the fee cap so that `gas_limit * fee_cap <= max_fee`, clamping
    /// the premium to the new cap. Leaves `params` untouched if it already
    /// fits.
    pub fn cap_gas_fee(&self, params: &mut FeeParameters, max_fee: &TokenAmount) {
        if params.gas_limit <= 0 || params.max_cost() <= *max_fee {
            return;
        }
        params.gas_fee_cap = max_fee / params.gas_limit;
        if params.gas_premium > params.gas_fee_cap {
            params.gas_premium = params.gas_fee_cap.clone();
        }
    }

    fn parse_fee_cap(&self, raw: &str) -> Result<TokenAmount, FeeError> {
        let fee_cap = TokenAmount::parse_atto(raw).map_err(unparsable("gas fee cap"))?;
        if fee_cap > self.config.max_gas_fee_cap {
            return Err(FeeError::FeeCapAboveCeiling {
                fee_cap,
                ceiling: self.config.max_gas_fee_cap.clone(),
            });
        }
        Ok(fee_cap)
    }

    /// Computes the final fee parameters for a message.
    ///
    /// Without `previous_premium` the node's estimate is used as is. With it,
    /// the premium is raised to at least the replace-by-fee minimum and the
    /// fee cap to at least the premium. Overrides are applied next, then the
    /// total-spend ceiling.
    pub fn compute_fees(
        &self,
        estimate: &FeeParameters,
        previous_premium: Option<&TokenAmount>,
        overrides: &FeeOverrides,
    ) -> Result<FeeParameters, FeeError> {
        let mut params = estimate.clone();

        let floor = previous_premium.map(|p| self.min_rbf_premium(p));
        if let Some(floor) = &floor {
            if params.gas_premium < *floor {
                params.gas_premium = floor.clone();
            }
            if params.gas_fee_cap < params.gas_premium {
                params.gas_fee_cap = params.gas_premium.clone();
            }
        }

        if let Some(limit) = overrides.gas_limit {
            if limit <= 0 {
                return Err(FeeError::NonPositiveGasLimit(limit));
            }
            params.gas_limit = limit;
        }
        if let Some(raw) = overrides.gas_premium.as_deref() {
            params.gas_premium = TokenAmount::parse_atto(raw).map_err(unparsable("gas premium"))?;
        }
        if let Some(raw) = overrides.gas_fee_cap.as_deref() {
            params.gas_fee_cap = self.parse_fee_cap(raw)?;
        }

        let max_fee = self.max_fee(overrides.max_fee.as_deref())?;
        self.cap_gas_fee(&mut params, &max_fee);

        self.check(&params, floor.as_ref())?;
        Ok(params)
    }

    /// Fee parameters for a manual replacement: the caller names premium and
    /// fee cap explicitly, the gas limit is kept unless overridden.
    pub fn manual_replacement(
        &self,
        previous: &FeeParameters,
        overrides: &FeeOverrides,
    ) -> Result<FeeParameters, FeeError> {
        let premium_raw = overrides
            .gas_premium
            .as_deref()
            .ok_or(FeeError::Missing("gas premium"))?;
        let fee_cap_raw = overrides
            .gas_fee_cap
            .as_deref()
            .ok_or(FeeError::Missing("gas fee cap"))?;

        let gas_limit = match overrides.gas_limit {
            Some(limit) if limit <= 0 => return Err(FeeError::NonPositiveGasLimit(limit)),
            Some(limit) => limit,
            None => previous.gas_limit,
        };
        let params = FeeParameters {
            gas_limit,
            gas_fee_cap: self.parse_fee_cap(fee_cap_raw)?,
            gas_premium: TokenAmount::parse_atto(premium_raw)
                .map_err(unparsable("gas premium"))?,
        };

        let floor = self.min_rbf_premium(&previous.gas_premium);
        self.check(&params, Some(&floor))?;
        Ok(params)
    }

    fn check(&self, params: &FeeParameters, floor: Option<&TokenAmount>) -> Result<(), FeeError> {
        if params.gas_limit <= 0 {
            return Err(FeeError::NonPositiveGasLimit(params.gas_limit));
        }
        if params.gas_fee_cap < params.gas_premium {
            return Err(FeeError::FeeCapBelowPremium {
                fee_cap: params.gas_fee_cap.clone(),
                premium: params.gas_premium.clone(),
            });
        }
        if let Some(floor) = floor {
            if params.gas_premium < *floor {
                return Err(FeeError::PremiumBelowReplaceFloor {
                    premium: params.gas_premium.clone(),
                    floor: floor.clone(),
                });
            }
        }
        Ok(())
    }
}
