use {
    crate::domain::account::{Account, AccountNumber},
    crate::domain::error::StoreError,
    crate::domain::payment::Payment,
    crate::domain::store::{
        BatchFilter, ClaimedBatch, ImportBatch, InsertOutcome, LockedPayment, PaymentStore,
        RunLock,
    },
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    std::collections::{HashMap, HashSet},
    std::sync::{Arc, Mutex},
    std::time::Duration,
    uuid::Uuid,
};

/// In-memory `PaymentStore` with the same locking contract as the Postgres
/// store: claims skip rows that are individually locked, single-row locks
/// block until the row is free, the run lock is a non-blocking try-lock.
/// Backs the test suite and doubles as a storage stand-in for embedding.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Default)]
struct Inner {
    accounts: HashMap<String, Account>,
    payments: HashMap<Uuid, Payment>,
    row_locks: HashSet<Uuid>,
    run_locked: bool,
    batches: HashMap<Uuid, ImportBatch>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("payment store mutex poisoned")
    }

    /// Test hook: read back an import batch record.
    pub fn import_batch(&self, id: Uuid) -> Option<ImportBatch> {
        self.lock().batches.get(&id).cloned()
    }

    /// Test hook: look a payment up by its identifier.
    pub fn find_payment(&self, identifier: &str) -> Option<Payment> {
        self.lock()
            .payments
            .values()
            .find(|p| p.identifier == identifier)
            .cloned()
    }
}

fn matches_filter(payment: &Payment, filter: &BatchFilter) -> bool {
    if !payment.state.awaits_processing() {
        return false;
    }
    if let Some(from) = filter.time_from
        && payment.create_time < from
    {
        return false;
    }
    if let Some(to) = filter.time_to
        && payment.create_time > to
    {
        return false;
    }
    if let Some(include) = &filter.include_accounts
        && !include.contains(&payment.account.account_number)
    {
        return false;
    }
    if let Some(exclude) = &filter.exclude_accounts
        && exclude.contains(&payment.account.account_number)
    {
        return false;
    }
    true
}

struct MemClaimedBatch {
    inner: Arc<Mutex<Inner>>,
    payments: Vec<Payment>,
    staged: HashMap<Uuid, Payment>,
    claimed: Vec<Uuid>,
}

impl MemClaimedBatch {
    fn unlock(&mut self) {
        if self.claimed.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().expect("payment store mutex poisoned");
        for uuid in self.claimed.drain(..) {
            inner.row_locks.remove(&uuid);
        }
    }
}

#[async_trait]
impl ClaimedBatch for MemClaimedBatch {
    fn payments(&self) -> &[Payment] {
        &self.payments
    }

    async fn apply(&mut self, payment: &Payment) -> Result<(), StoreError> {
        self.staged.insert(payment.uuid, payment.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        {
            let mut inner = self.inner.lock().expect("payment store mutex poisoned");
            for (uuid, payment) in self.staged.drain() {
                inner.payments.insert(uuid, payment);
            }
        }
        self.unlock();
        Ok(())
    }
}

impl Drop for MemClaimedBatch {
    fn drop(&mut self) {
        self.unlock();
    }
}

struct MemLockedPayment {
    inner: Arc<Mutex<Inner>>,
    uuid: Uuid,
    payment: Payment,
    staged: Option<Payment>,
    released: bool,
}

impl MemLockedPayment {
    fn unlock(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.inner
            .lock()
            .expect("payment store mutex poisoned")
            .row_locks
            .remove(&self.uuid);
    }
}

#[async_trait]
impl LockedPayment for MemLockedPayment {
    fn payment(&self) -> &Payment {
        &self.payment
    }

    async fn save(&mut self, payment: &Payment) -> Result<(), StoreError> {
        self.staged = Some(payment.clone());
        Ok(())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(staged) = self.staged.take() {
            self.inner
                .lock()
                .expect("payment store mutex poisoned")
                .payments
                .insert(self.uuid, staged);
        }
        self.unlock();
        Ok(())
    }
}

impl Drop for MemLockedPayment {
    fn drop(&mut self) {
        self.unlock();
    }
}

struct MemRunLock {
    inner: Arc<Mutex<Inner>>,
    released: bool,
}

impl MemRunLock {
    fn unlock(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.inner
            .lock()
            .expect("payment store mutex poisoned")
            .run_locked = false;
    }
}

#[async_trait]
impl RunLock for MemRunLock {
    async fn release(mut self: Box<Self>) -> Result<(), StoreError> {
        self.unlock();
        Ok(())
    }
}

impl Drop for MemRunLock {
    fn drop(&mut self) {
        self.unlock();
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        self.lock()
            .accounts
            .insert(account.account_number.as_str().to_string(), account.clone());
        Ok(())
    }

    async fn account_by_number(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self.lock().accounts.get(number.as_str()).cloned())
    }

    async fn missing_accounts(
        &self,
        numbers: &[AccountNumber],
    ) -> Result<Vec<AccountNumber>, StoreError> {
        let inner = self.lock();
        let mut missing: Vec<AccountNumber> = numbers
            .iter()
            .filter(|n| !inner.accounts.contains_key(n.as_str()))
            .cloned()
            .collect();
        missing.sort();
        missing.dedup();
        Ok(missing)
    }

    async fn payment_exists(
        &self,
        account_id: Uuid,
        identifier: &str,
    ) -> Result<bool, StoreError> {
        Ok(self
            .lock()
            .payments
            .values()
            .any(|p| p.account.id == account_id && p.identifier == identifier))
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome, StoreError> {
        let mut inner = self.lock();
        let duplicate = inner
            .payments
            .values()
            .any(|p| p.account.id == payment.account.id && p.identifier == payment.identifier);
        if duplicate {
            return Ok(InsertOutcome::Duplicate);
        }
        inner.payments.insert(payment.uuid, payment.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn payment_by_uuid(&self, uuid: Uuid) -> Result<Option<Payment>, StoreError> {
        Ok(self.lock().payments.get(&uuid).cloned())
    }

    async fn try_run_lock(&self) -> Result<Option<Box<dyn RunLock>>, StoreError> {
        let mut inner = self.lock();
        if inner.run_locked {
            return Ok(None);
        }
        inner.run_locked = true;
        Ok(Some(Box::new(MemRunLock {
            inner: self.inner.clone(),
            released: false,
        })))
    }

    async fn claim_batch(
        &self,
        filter: &BatchFilter,
    ) -> Result<Box<dyn ClaimedBatch>, StoreError> {
        let mut inner = self.lock();
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| matches_filter(p, filter) && !inner.row_locks.contains(&p.uuid))
            .cloned()
            .collect();
        payments.sort_by(|a, b| {
            (a.transaction_date, a.create_time, a.uuid)
                .cmp(&(b.transaction_date, b.create_time, b.uuid))
        });
        let claimed: Vec<Uuid> = payments.iter().map(|p| p.uuid).collect();
        for uuid in &claimed {
            inner.row_locks.insert(*uuid);
        }
        Ok(Box::new(MemClaimedBatch {
            inner: self.inner.clone(),
            payments,
            staged: HashMap::new(),
            claimed,
        }))
    }

    async fn initialized_payments(
        &self,
        time_from: Option<DateTime<Utc>>,
        time_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>, StoreError> {
        let inner = self.lock();
        let mut payments: Vec<Payment> = inner
            .payments
            .values()
            .filter(|p| {
                p.state == crate::domain::payment::PaymentState::Initialized
                    && time_from.is_none_or(|from| p.create_time >= from)
                    && time_to.is_none_or(|to| p.create_time <= to)
            })
            .cloned()
            .collect();
        payments.sort_by_key(|p| (p.create_time, p.uuid));
        Ok(payments)
    }

    async fn lock_payment(
        &self,
        uuid: Uuid,
    ) -> Result<Option<Box<dyn LockedPayment>>, StoreError> {
        loop {
            {
                let mut inner = self.lock();
                let Some(payment) = inner.payments.get(&uuid).cloned() else {
                    return Ok(None);
                };
                if !inner.row_locks.contains(&uuid) {
                    inner.row_locks.insert(uuid);
                    return Ok(Some(Box::new(MemLockedPayment {
                        inner: self.inner.clone(),
                        uuid,
                        payment,
                        staged: None,
                        released: false,
                    })));
                }
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }

    async fn open_import_batch(&self, origin: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        self.lock().batches.insert(
            id,
            ImportBatch {
                id,
                origin: origin.to_string(),
                started_at: Utc::now(),
                filenames: Vec::new(),
                error_count: 0,
                finished: false,
            },
        );
        Ok(id)
    }

    async fn append_import_file(&self, batch: Uuid, filename: &str) -> Result<(), StoreError> {
        if let Some(record) = self.lock().batches.get_mut(&batch) {
            record.filenames.push(filename.to_string());
        }
        Ok(())
    }

    async fn add_import_errors(&self, batch: Uuid, errors: u32) -> Result<(), StoreError> {
        if let Some(record) = self.lock().batches.get_mut(&batch) {
            record.error_count += errors;
        }
        Ok(())
    }

    async fn close_import_batch(&self, batch: Uuid) -> Result<(), StoreError> {
        if let Some(record) = self.lock().batches.get_mut(&batch) {
            record.finished = true;
        }
        Ok(())
    }
}
