use {
    super::account::{Account, AccountNumber},
    super::error::StoreError,
    super::payment::Payment,
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    uuid::Uuid,
};

/// Outcome of an insert keyed by (account, identifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The unique key already exists, e.g. a concurrent import won the race.
    /// Treated as success-no-op by callers.
    Duplicate,
}

/// Restricts which rows a scheduler run claims. Time bounds apply to the
/// create time, account filters to the owning account's number.
#[derive(Debug, Clone, Default)]
pub struct BatchFilter {
    pub time_from: Option<DateTime<Utc>>,
    pub time_to: Option<DateTime<Utc>>,
    pub include_accounts: Option<Vec<AccountNumber>>,
    pub exclude_accounts: Option<Vec<AccountNumber>>,
}

/// Operational audit record of one import or download invocation.
#[derive(Debug, Clone)]
pub struct ImportBatch {
    pub id: Uuid,
    pub origin: String,
    pub started_at: DateTime<Utc>,
    pub filenames: Vec<String>,
    pub error_count: u32,
    pub finished: bool,
}

/// A set of rows locked by one claim. Rows already locked elsewhere were
/// skipped, not waited on; updates become visible atomically on commit, and
/// dropping the batch without committing discards them.
#[async_trait]
pub trait ClaimedBatch: Send {
    fn payments(&self) -> &[Payment];

    /// Stage the payment's lifecycle fields for write-back. The payment must
    /// belong to this claim.
    async fn apply(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// One row held under a blocking exclusive lock.
#[async_trait]
pub trait LockedPayment: Send {
    fn payment(&self) -> &Payment;

    /// Stage the payment's lifecycle fields for write-back.
    async fn save(&mut self, payment: &Payment) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}

/// Exclusive single-instance lock held for the duration of a scheduler run.
/// Dropping it without calling `release` still frees the lock, eventually.
#[async_trait]
pub trait RunLock: Send {
    async fn release(self: Box<Self>) -> Result<(), StoreError>;
}

/// Storage collaborator for payments. Any implementation must provide
/// row-scoped locking, claim-and-skip-already-locked selection and atomic
/// multi-row transaction scope.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError>;

    async fn account_by_number(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError>;

    /// Subset of `numbers` with no matching account row.
    async fn missing_accounts(
        &self,
        numbers: &[AccountNumber],
    ) -> Result<Vec<AccountNumber>, StoreError>;

    async fn payment_exists(
        &self,
        account_id: Uuid,
        identifier: &str,
    ) -> Result<bool, StoreError>;

    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome, StoreError>;

    async fn payment_by_uuid(&self, uuid: Uuid) -> Result<Option<Payment>, StoreError>;

    /// Non-blocking try-lock guarding against overlapping scheduler runs.
    /// `None` means another run holds the lock.
    async fn try_run_lock(&self) -> Result<Option<Box<dyn RunLock>>, StoreError>;

    /// Claim unsettled rows matching `filter` with skip-locked semantics,
    /// ordered by transaction date.
    async fn claim_batch(&self, filter: &BatchFilter)
    -> Result<Box<dyn ClaimedBatch>, StoreError>;

    /// Payments awaiting gateway confirmation, ordered by create time.
    /// Plain read; each row is locked individually when synced.
    async fn initialized_payments(
        &self,
        time_from: Option<DateTime<Utc>>,
        time_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>, StoreError>;

    /// Blocking single-row lock. `None` if the row does not exist.
    async fn lock_payment(
        &self,
        uuid: Uuid,
    ) -> Result<Option<Box<dyn LockedPayment>>, StoreError>;

    async fn open_import_batch(&self, origin: &str) -> Result<Uuid, StoreError>;

    async fn append_import_file(&self, batch: Uuid, filename: &str) -> Result<(), StoreError>;

    async fn add_import_errors(&self, batch: Uuid, errors: u32) -> Result<(), StoreError>;

    async fn close_import_batch(&self, batch: Uuid) -> Result<(), StoreError>;
}
