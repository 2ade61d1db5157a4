use async_trait::async_trait;
use haven_core::repository::ExchangeRateSource;
use haven_core::StoreResult;
use std::collections::HashMap;

/// Display rates quoted against a single base currency, loaded from config.
#[derive(Debug, Clone)]
pub struct StaticRates {
    base: String,
    /// Units of the keyed currency per one unit of `base`.
    rates: HashMap<String, f64>,
}

impl StaticRates {
    pub fn new(base: &str, rates: HashMap<String, f64>) -> Self {
        Self {
            base: base.to_uppercase(),
            rates: rates
                .into_iter()
                .filter(|(_, rate)| *rate > 0.0)
                .map(|(code, rate)| (code.to_uppercase(), rate))
                .collect(),
        }
    }

    fn per_base(&self, code: &str) -> Option<f64> {
        if code == self.base {
            Some(1.0)
        } else {
            self.rates.get(code).copied()
        }
    }
}

#[async_trait]
impl ExchangeRateSource for StaticRates {
    async fn rate(&self, from: &str, to: &str) -> StoreResult<Option<f64>> {
        let from = from.to_uppercase();
        let to = to.to_uppercase();
        if from == to {
            return Ok(Some(1.0));
        }
        Ok(match (self.per_base(&from), self.per_base(&to)) {
            (Some(f), Some(t)) => Some(t / f),
            _ => None,
        })
    }
}
