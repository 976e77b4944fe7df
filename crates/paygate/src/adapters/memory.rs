//! In-memory store adapters.
//!
//! Both stores are `DashMap`-backed: every read-modify-write happens under the
//! shard lock for that key, so readers never see a half-written value.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use crate::domain::error::StoreError;
use crate::domain::rate_window::RateWindow;
use crate::domain::types::{Reference, TransactionRecord};
use crate::ports::outbound::{RateWindowStore, TransactionStore};

// =============================================================================
// TRANSACTIONS
// =============================================================================

/// Transaction records keyed by reference.
#[derive(Debug, Default)]
pub struct InMemoryTransactionStore {
    records: DashMap<Reference, TransactionRecord>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn get(&self, reference: &Reference) -> Result<Option<TransactionRecord>, StoreError> {
        Ok(self.records.get(reference).map(|r| r.value().clone()))
    }

    async fn insert(&self, record: TransactionRecord) -> Result<(), StoreError> {
        match self.records.entry(record.reference.clone()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(record.reference)),
            Entry::Vacant(slot) => {
                debug!(
                    reference = %record.reference,
                    status = %record.status,
                    "Transaction stored"
                );
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn compare_and_swap(
        &self,
        expected: &TransactionRecord,
        replacement: TransactionRecord,
    ) -> Result<bool, StoreError> {
        if expected.reference != replacement.reference {
            return Err(StoreError::Backend(format!(
                "reference mismatch: {} vs {}",
                expected.reference, replacement.reference
            )));
        }

        let Some(mut current) = self.records.get_mut(&expected.reference) else {
            return Ok(false);
        };
        if *current != *expected {
            return Ok(false);
        }

        check_monotonic(&current, &replacement)?;
        *current = replacement;
        Ok(true)
    }
}

/// Status may only leave `Pending`, and a granted record stays granted.
fn check_monotonic(
    current: &TransactionRecord,
    replacement: &TransactionRecord,
) -> Result<(), StoreError> {
    let status_ok = current.status == replacement.status
        || current.status.can_transition_to(replacement.status);
    if !status_ok {
        return Err(StoreError::InvalidTransition {
            from: current.status,
            to: replacement.status,
        });
    }
    if current.access_granted && !replacement.access_granted {
        return Err(StoreError::Backend("access grant cannot be revoked".into()));
    }
    Ok(())
}

// =============================================================================
// RATE WINDOWS
// =============================================================================

/// Admission windows keyed by client key.
#[derive(Debug, Default)]
pub struct InMemoryRateWindowStore {
    windows: DashMap<String, RateWindow>,
}

impl InMemoryRateWindowStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateWindowStore for InMemoryRateWindowStore {
    fn get(&self, key: &str) -> Option<RateWindow> {
        self.windows.get(key).map(|w| *w)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<RateWindow>,
        replacement: RateWindow,
    ) -> bool {
        match (self.windows.entry(key.to_string()), expected) {
            (Entry::Vacant(slot), None) => {
                slot.insert(replacement);
                true
            }
            (Entry::Occupied(mut slot), Some(expected)) if *slot.get() == expected => {
                slot.insert(replacement);
                true
            }
            _ => false,
        }
    }

    fn remove_stale(&self, now_ms: u64, max_age_ms: u64) -> usize {
        let before = self.windows.len();
        self.windows.retain(|key, window| {
            let stale = window.is_stale(now_ms, max_age_ms);
            if stale {
                debug!(client_key = %key, "Removing stale rate window");
            }
            !stale
        });
        before.saturating_sub(self.windows.len())
    }

    fn len(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::{SettlementOutcome, TransactionMetadata, TransactionStatus};
    use rust_decimal::Decimal;

    fn record() -> TransactionRecord {
        TransactionRecord::pending(
            Reference::generate(),
            TransactionMetadata {
                subject: "a@b.com".into(),
                display_name: "Ada".into(),
                role: "customer".into(),
                amount: Decimal::from(10),
            },
        )
    }

    #[tokio::test]
    async fn test_insert_is_create_once() {
        let store = InMemoryTransactionStore::new();
        let rec = record();
        store.insert(rec.clone()).await.unwrap();
        assert!(matches!(
            store.insert(rec.clone()).await,
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.get(&rec.reference).await.unwrap(), Some(rec));
    }

    #[tokio::test]
    async fn test_get_unknown_is_none() {
        let store = InMemoryTransactionStore::new();
        assert_eq!(store.get(&Reference::from("txn_nope")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cas_enforces_monotonic_status() {
        let store = InMemoryTransactionStore::new();
        let pending = record();
        store.insert(pending.clone()).await.unwrap();

        let mut settled = pending.clone();
        settled.settle(SettlementOutcome::Success);
        assert!(store.compare_and_swap(&pending, settled.clone()).await.unwrap());

        let mut reversed = settled.clone();
        reversed.status = TransactionStatus::Failed;
        assert!(matches!(
            store.compare_and_swap(&settled, reversed).await,
            Err(StoreError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn test_cas_detects_stale_expectation() {
        let store = InMemoryTransactionStore::new();
        let pending = record();
        store.insert(pending.clone()).await.unwrap();

        let mut granted = pending.clone();
        granted.access_granted = true;
        assert!(store.compare_and_swap(&pending, granted.clone()).await.unwrap());
        // Second writer still holds the old copy.
        assert!(!store.compare_and_swap(&pending, granted).await.unwrap());
    }

    #[test]
    fn test_window_cas() {
        let store = InMemoryRateWindowStore::new();
        let w1 = RateWindow {
            count: 1,
            window_start_ms: 0,
        };
        let w2 = RateWindow {
            count: 2,
            window_start_ms: 0,
        };

        assert!(store.compare_and_swap("k", None, w1));
        assert!(!store.compare_and_swap("k", None, w2));
        assert!(store.compare_and_swap("k", Some(w1), w2));
        assert!(!store.compare_and_swap("k", Some(w1), w2));
        assert_eq!(store.get("k"), Some(w2));
    }

    #[test]
    fn test_remove_stale_windows() {
        let store = InMemoryRateWindowStore::new();
        store.compare_and_swap(
            "old",
            None,
            RateWindow {
                count: 1,
                window_start_ms: 0,
            },
        );
        store.compare_and_swap(
            "fresh",
            None,
            RateWindow {
                count: 1,
                window_start_ms: 90_000,
            },
        );
        assert_eq!(store.remove_stale(100_000, 60_000), 1);
        assert_eq!(store.len(), 1);
        assert!(store.get("fresh").is_some());
    }
}
