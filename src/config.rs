use std::env;
use std::str::FromStr;
use std::time::Duration;

use rust_decimal::Decimal;

use crate::error::ConfigError;

pub const FEE_RATE_VAR: &str = "LEDGER_FEE_RATE";
pub const DELIMITER_VAR: &str = "LEDGER_PARTICIPANT_DELIMITER";
pub const LOCK_TIMEOUT_VAR: &str = "LEDGER_LOCK_TIMEOUT_MS";

/// Tunables of the ledger core
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerConfig {
    /// Fraction of the amount charged as fee on fee-bearing payments
    pub fee_rate: Decimal,
    /// Separator between account id and bank id in participant identifiers
    pub participant_delimiter: char,
    /// How long an operation may wait for the ledger lock
    /// `None` waits indefinitely
    pub lock_timeout: Option<Duration>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            fee_rate: Decimal::new(1, 4),
            participant_delimiter: '@',
            lock_timeout: Some(Duration::from_secs(5)),
        }
    }
}

impl LedgerConfig {
    /// Build a configuration from environment variables, falling back to the
    /// defaults for anything unset
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(FEE_RATE_VAR) {
            config.fee_rate = parse_fee_rate(&raw)?;
        }

        if let Some(raw) = lookup(DELIMITER_VAR) {
            let mut chars = raw.chars();
            config.participant_delimiter = match (chars.next(), chars.next()) {
                (Some(c), None) if !c.is_whitespace() => c,
                _ => {
                    return Err(invalid(
                        DELIMITER_VAR,
                        &raw,
                        "expected a single non-whitespace character",
                    ))
                }
            };
        }

        if let Some(raw) = lookup(LOCK_TIMEOUT_VAR) {
            let millis = u64::from_str(raw.trim())
                .map_err(|e| invalid(LOCK_TIMEOUT_VAR, &raw, &e.to_string()))?;
            config.lock_timeout = match millis {
                0 => None,
                ms => Some(Duration::from_millis(ms)),
            };
        }

        Ok(config)
    }

    pub fn with_fee_rate(mut self, fee_rate: Decimal) -> Self {
        self.fee_rate = fee_rate;
        self
    }

    pub fn with_lock_timeout(mut self, lock_timeout: Option<Duration>) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }
}

fn parse_fee_rate(raw: &str) -> Result<Decimal, ConfigError> {
    let rate =
        Decimal::from_str(raw.trim()).map_err(|e| invalid(FEE_RATE_VAR, raw, &e.to_string()))?;
    if rate < Decimal::ZERO || rate >= Decimal::ONE {
        return Err(invalid(FEE_RATE_VAR, raw, "must be in [0, 1)"));
    }
    Ok(rate)
}

fn invalid(key: &'static str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = LedgerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, LedgerConfig::default());
        assert_eq!(config.fee_rate, dec!(0.0001));
    }

    #[test]
    fn test_overrides() {
        let config = LedgerConfig::from_lookup(lookup(&[
            (FEE_RATE_VAR, "0.01"),
            (DELIMITER_VAR, "#"),
            (LOCK_TIMEOUT_VAR, "0"),
        ]))
        .unwrap();
        assert_eq!(config.fee_rate, dec!(0.01));
        assert_eq!(config.participant_delimiter, '#');
        assert_eq!(config.lock_timeout, None);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(LedgerConfig::from_lookup(lookup(&[(FEE_RATE_VAR, "1.5")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[(FEE_RATE_VAR, "-0.1")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[(DELIMITER_VAR, "::")])).is_err());
        assert!(LedgerConfig::from_lookup(lookup(&[(LOCK_TIMEOUT_VAR, "soon")])).is_err());
    }
}
