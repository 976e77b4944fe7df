//! Ports (hexagonal architecture).

pub mod outbound;

pub use outbound::{
    IdentityVerifier, PolicyDecisionPoint, RateWindowStore, SettlementDecider, Sleeper,
    SystemTimeSource, TimeSource, TokioSleeper, TransactionStore,
};
