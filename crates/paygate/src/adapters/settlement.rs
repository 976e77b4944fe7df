//! Settlement deciders.
//!
//! Settlement is simulated: nothing here talks to a payment network.

use rand::Rng;
use tracing::debug;

use crate::domain::types::{SettlementOutcome, TransactionRecord};
use crate::ports::outbound::SettlementDecider;

/// Succeeds with a configured probability (default 0.8).
#[derive(Debug, Clone, Copy)]
pub struct ProbabilisticSettlement {
    success_probability: f64,
}

impl ProbabilisticSettlement {
    /// Probability is clamped into `[0, 1]`.
    pub fn new(success_probability: f64) -> Self {
        let p = if success_probability.is_nan() {
            0.0
        } else {
            success_probability.clamp(0.0, 1.0)
        };
        Self {
            success_probability: p,
        }
    }

    pub fn success_probability(&self) -> f64 {
        self.success_probability
    }
}

impl Default for ProbabilisticSettlement {
    fn default() -> Self {
        Self::new(0.8)
    }
}

impl SettlementDecider for ProbabilisticSettlement {
    fn decide(&self, record: &TransactionRecord) -> SettlementOutcome {
        let outcome = if rand::thread_rng().gen_bool(self.success_probability) {
            SettlementOutcome::Success
        } else {
            SettlementOutcome::Failed
        };
        debug!(reference = %record.reference, ?outcome, "Simulated settlement");
        outcome
    }
}

/// Always returns the same outcome.
#[derive(Debug, Clone, Copy)]
pub struct FixedSettlement(pub SettlementOutcome);

impl FixedSettlement {
    pub fn success() -> Self {
        Self(SettlementOutcome::Success)
    }

    pub fn failure() -> Self {
        Self(SettlementOutcome::Failed)
    }
}

impl SettlementDecider for FixedSettlement {
    fn decide(&self, _record: &TransactionRecord) -> SettlementOutcome {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{Reference, TransactionMetadata};
    use rust_decimal::Decimal;

    fn record() -> TransactionRecord {
        TransactionRecord::pending(
            Reference::generate(),
            TransactionMetadata {
                subject: "a@b.com".into(),
                display_name: "Ada".into(),
                role: "customer".into(),
                amount: Decimal::ONE,
            },
        )
    }

    #[test]
    fn test_probability_extremes_are_deterministic() {
        let always = ProbabilisticSettlement::new(1.0);
        let never = ProbabilisticSettlement::new(0.0);
        for _ in 0..50 {
            assert_eq!(always.decide(&record()), SettlementOutcome::Success);
            assert_eq!(never.decide(&record()), SettlementOutcome::Failed);
        }
    }

    #[test]
    fn test_probability_is_clamped() {
        assert_eq!(ProbabilisticSettlement::new(7.0).success_probability(), 1.0);
        assert_eq!(ProbabilisticSettlement::new(-1.0).success_probability(), 0.0);
        assert_eq!(ProbabilisticSettlement::new(f64::NAN).success_probability(), 0.0);
    }

    #[test]
    fn test_fixed_settlement() {
        assert_eq!(
            FixedSettlement::failure().decide(&record()),
            SettlementOutcome::Failed
        );
        assert_eq!(
            FixedSettlement::success().decide(&record()),
            SettlementOutcome::Success
        );
    }
}
