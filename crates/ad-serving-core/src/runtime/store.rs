// crates/ad-serving-core/src/runtime/store.rs
// ============================================================================
// Module: Ad Serving In-Memory Collaborators
// Description: In-memory catalog, history, ledger, and arm stores plus a file arm store.
// Purpose: Provide deterministic collaborator implementations for hosts and tests.
// Dependencies: crate::{core, interfaces}, serde_json
// ============================================================================

//! ## Overview
//! These collaborators back the serving pipeline without external services.
//! Each is cheap to clone; clones share state through `Arc<Mutex<_>>`, so the
//! orchestrator and the event handler can observe the same history and arms.
//! [`JsonFileArmStore`] persists arms across restarts with an atomic rewrite.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::AdEventRecord;
use crate::core::AdEventType;
use crate::core::AdType;
use crate::core::BanditArm;
use crate::core::Candidate;
use crate::core::ConfirmationType;
use crate::core::CreativeInstanceId;
use crate::core::OptedInCredential;
use crate::core::Segment;
use crate::core::Timestamp;
use crate::core::TransactionId;
use crate::core::TransactionInfo;
use crate::interfaces::AdEventHistory;
use crate::interfaces::ArmStoreError;
use crate::interfaces::BanditArmStore;
use crate::interfaces::CandidateCatalog;
use crate::interfaces::CatalogError;
use crate::interfaces::CredentialIssuer;
use crate::interfaces::EventScope;
use crate::interfaces::HistoryError;
use crate::interfaces::LedgerError;
use crate::interfaces::TransactionLedger;

// ============================================================================
// SECTION: Catalog
// ============================================================================

/// In-memory candidate catalog.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCatalog {
    /// Candidates protected by a mutex.
    candidates: Arc<Mutex<Vec<Candidate>>>,
}

impl InMemoryCatalog {
    /// Creates a catalog holding `candidates`.
    #[must_use]
    pub fn new(candidates: Vec<Candidate>) -> Self {
        Self {
            candidates: Arc::new(Mutex::new(candidates)),
        }
    }

    /// Replaces the catalog contents.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the catalog lock is poisoned.
    pub fn replace(&self, candidates: Vec<Candidate>) -> Result<(), CatalogError> {
        *self
            .candidates
            .lock()
            .map_err(|_| CatalogError::Unavailable("catalog mutex poisoned".to_string()))? =
            candidates;
        Ok(())
    }
}

impl CandidateCatalog for InMemoryCatalog {
    fn eligible_candidates(
        &self,
        segments: &BTreeSet<Segment>,
    ) -> Result<Vec<Candidate>, CatalogError> {
        let guard = self
            .candidates
            .lock()
            .map_err(|_| CatalogError::Unavailable("catalog mutex poisoned".to_string()))?;
        let untargeted = segments.iter().any(Segment::is_untargeted);
        Ok(guard
            .iter()
            .filter(|candidate| {
                untargeted
                    || candidate.segments.iter().any(|segment| {
                        segments.contains(segment) || segments.contains(&segment.parent())
                    })
            })
            .cloned()
            .collect())
    }
}

// ============================================================================
// SECTION: Event History
// ============================================================================

/// In-memory ad event history.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAdEventHistory {
    /// Event records in insertion order.
    records: Arc<Mutex<Vec<AdEventRecord>>>,
}

impl InMemoryAdEventHistory {
    /// Creates an empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every stored record.
    ///
    /// # Errors
    ///
    /// Returns [`HistoryError`] when the history lock is poisoned.
    pub fn records(&self) -> Result<Vec<AdEventRecord>, HistoryError> {
        Ok(self.lock()?.clone())
    }

    /// Locks the record list.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<AdEventRecord>>, HistoryError> {
        self.records
            .lock()
            .map_err(|_| HistoryError::Unavailable("event history mutex poisoned".to_string()))
    }
}

impl AdEventHistory for InMemoryAdEventHistory {
    fn event_count(
        &self,
        scope: &EventScope,
        event_type: AdEventType,
        since: Timestamp,
    ) -> Result<u64, HistoryError> {
        let guard = self.lock()?;
        let count = guard
            .iter()
            .filter(|record| {
                record.event_type == event_type && record.created_at > since && scope.matches(record)
            })
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }

    fn last_event_time(
        &self,
        scope: &EventScope,
        event_type: AdEventType,
    ) -> Result<Option<Timestamp>, HistoryError> {
        let guard = self.lock()?;
        Ok(guard
            .iter()
            .filter(|record| record.event_type == event_type && scope.matches(record))
            .map(|record| record.created_at)
            .max())
    }

    fn record_event(&self, record: AdEventRecord) -> Result<(), HistoryError> {
        self.lock()?.push(record);
        Ok(())
    }
}

// ============================================================================
// SECTION: Ledger
// ============================================================================

/// In-memory transaction ledger issuing sequential ids.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTransactionLedger {
    /// Recorded transactions.
    transactions: Arc<Mutex<Vec<TransactionInfo>>>,
}

impl InMemoryTransactionLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every recorded transaction.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] when the ledger lock is poisoned.
    pub fn transactions(&self) -> Result<Vec<TransactionInfo>, LedgerError> {
        Ok(self
            .transactions
            .lock()
            .map_err(|_| LedgerError::Ledger("ledger mutex poisoned".to_string()))?
            .clone())
    }
}

impl TransactionLedger for InMemoryTransactionLedger {
    fn record_transaction(
        &self,
        creative_instance_id: &CreativeInstanceId,
        ad_type: AdType,
        confirmation_type: ConfirmationType,
        value: f64,
        at: Timestamp,
    ) -> Result<TransactionInfo, LedgerError> {
        if !value.is_finite() || value < 0.0 {
            return Err(LedgerError::Ledger(format!("invalid transaction value {value}")));
        }
        let mut guard = self
            .transactions
            .lock()
            .map_err(|_| LedgerError::Ledger("ledger mutex poisoned".to_string()))?;
        let transaction = TransactionInfo {
            id: TransactionId::new(format!("txn-{}", guard.len() + 1)),
            created_at: at,
            creative_instance_id: creative_instance_id.clone(),
            ad_type,
            confirmation_type,
            value,
        };
        guard.push(transaction.clone());
        drop(guard);
        Ok(transaction)
    }
}

// ============================================================================
// SECTION: Credentials
// ============================================================================

/// Credential issuer that always confirms opted-out.
#[derive(Debug, Clone, Copy, Default)]
pub struct OptedOutCredentialIssuer;

impl CredentialIssuer for OptedOutCredentialIssuer {
    fn credential_for(&self, _transaction: &TransactionInfo) -> Option<OptedInCredential> {
        None
    }
}

// ============================================================================
// SECTION: Arm Stores
// ============================================================================

/// Rejects `proposed` when it would decrease the stored pull count.
fn check_monotonic(
    arms: &BTreeMap<Segment, BanditArm>,
    proposed: &BanditArm,
) -> Result<(), ArmStoreError> {
    match arms.get(&proposed.segment) {
        Some(stored) if proposed.pulls < stored.pulls => Err(ArmStoreError::NonMonotonic {
            segment: proposed.segment.clone(),
            stored: stored.pulls,
            proposed: proposed.pulls,
        }),
        _ => Ok(()),
    }
}

/// In-memory bandit arm store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryArmStore {
    /// Arms keyed by segment.
    arms: Arc<Mutex<BTreeMap<Segment, BanditArm>>>,
}

impl InMemoryArmStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `arms`.
    #[must_use]
    pub fn with_arms(arms: impl IntoIterator<Item = BanditArm>) -> Self {
        let arms = arms.into_iter().map(|arm| (arm.segment.clone(), arm)).collect();
        Self {
            arms: Arc::new(Mutex::new(arms)),
        }
    }
}

impl BanditArmStore for InMemoryArmStore {
    fn load_arms(&self) -> Result<BTreeMap<Segment, BanditArm>, ArmStoreError> {
        Ok(self
            .arms
            .lock()
            .map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?
            .clone())
    }

    fn save_arm(&self, arm: &BanditArm) -> Result<(), ArmStoreError> {
        let mut guard =
            self.arms.lock().map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?;
        check_monotonic(&guard, arm)?;
        guard.insert(arm.segment.clone(), arm.clone());
        drop(guard);
        Ok(())
    }

    fn clear(&self) -> Result<(), ArmStoreError> {
        self.arms
            .lock()
            .map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?
            .clear();
        Ok(())
    }
}

/// Bandit arm store persisted as a JSON file.
///
/// # Invariants
/// - Writes go to a sibling temporary file and are renamed into place.
/// - A missing file loads as an empty store.
#[derive(Debug, Clone)]
pub struct JsonFileArmStore {
    /// Target file path.
    path: PathBuf,
    /// Serializes read-modify-write cycles within the process.
    lock: Arc<Mutex<()>>,
}

impl JsonFileArmStore {
    /// Creates a store backed by `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads arms from disk.
    fn read(&self) -> Result<BTreeMap<Segment, BanditArm>, ArmStoreError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(err) => return Err(ArmStoreError::Io(err.to_string())),
        };
        let arms: Vec<BanditArm> =
            serde_json::from_slice(&bytes).map_err(|err| ArmStoreError::Corrupt(err.to_string()))?;
        Ok(arms.into_iter().map(|arm| (arm.segment.clone(), arm)).collect())
    }

    /// Writes arms to disk atomically.
    fn write(&self, arms: &BTreeMap<Segment, BanditArm>) -> Result<(), ArmStoreError> {
        let list: Vec<&BanditArm> = arms.values().collect();
        let bytes = serde_json::to_vec_pretty(&list)
            .map_err(|err| ArmStoreError::Corrupt(err.to_string()))?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(|err| ArmStoreError::Io(err.to_string()))?;
        fs::rename(&tmp, &self.path).map_err(|err| ArmStoreError::Io(err.to_string()))
    }
}

impl BanditArmStore for JsonFileArmStore {
    fn load_arms(&self) -> Result<BTreeMap<Segment, BanditArm>, ArmStoreError> {
        let _guard =
            self.lock.lock().map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?;
        self.read()
    }

    fn save_arm(&self, arm: &BanditArm) -> Result<(), ArmStoreError> {
        let _guard =
            self.lock.lock().map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?;
        let mut arms = self.read()?;
        check_monotonic(&arms, arm)?;
        arms.insert(arm.segment.clone(), arm.clone());
        self.write(&arms)
    }

    fn clear(&self) -> Result<(), ArmStoreError> {
        let _guard =
            self.lock.lock().map_err(|_| ArmStoreError::Io("arm store mutex poisoned".to_string()))?;
        self.write(&BTreeMap::new())
    }
}
