use {
    crate::domain::account::Account,
    crate::domain::error::{StoreError, ValidationError},
    crate::domain::payment::{Payment, StatementRecord},
    crate::domain::store::{InsertOutcome, PaymentStore},
    tracing::{info, warn},
};

/// What an import callback decided about one payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackDecision {
    Keep,
    /// Drop the payment without error; counted as skipped.
    Skip,
}

/// Transform hook run for every imported payment, in configured order. A
/// callback may mutate the payment, skip it silently or fail validation; a
/// failure discards the record and its remaining callbacks.
pub trait ImportCallback: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, payment: &mut Payment) -> Result<CallbackDecision, ValidationError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub imported: u32,
    pub skipped: u32,
    pub errors: u32,
}

impl ImportStats {
    pub fn absorb(&mut self, other: ImportStats) {
        self.imported += other.imported;
        self.skipped += other.skipped;
        self.errors += other.errors;
    }
}

enum RecordOutcome {
    Imported,
    Skipped,
    Error,
}

/// Import one statement's records for `account`. Records are independent:
/// one bad record never aborts the batch, and re-importing known records is
/// a no-op.
pub async fn import_payments(
    store: &dyn PaymentStore,
    account: &Account,
    records: impl IntoIterator<Item = StatementRecord>,
    callbacks: &[Box<dyn ImportCallback>],
) -> Result<ImportStats, StoreError> {
    let mut stats = ImportStats::default();
    for record in records {
        match import_one(store, account, record, callbacks).await? {
            RecordOutcome::Imported => stats.imported += 1,
            RecordOutcome::Skipped => stats.skipped += 1,
            RecordOutcome::Error => stats.errors += 1,
        }
    }
    if stats.skipped > 0 {
        info!(skipped = stats.skipped, "skipped payments");
    }
    if stats.errors > 0 {
        info!(errors = stats.errors, "payments not saved due to errors");
    }
    Ok(stats)
}

async fn import_one(
    store: &dyn PaymentStore,
    account: &Account,
    record: StatementRecord,
    callbacks: &[Box<dyn ImportCallback>],
) -> Result<RecordOutcome, StoreError> {
    let mut payment = Payment::from_statement(account.clone(), record);

    if store
        .payment_exists(account.id, &payment.identifier)
        .await?
    {
        info!(identifier = %payment.identifier, "payment already exists - skipping");
        return Ok(RecordOutcome::Skipped);
    }

    for callback in callbacks {
        match callback.apply(&mut payment) {
            Ok(CallbackDecision::Keep) => {}
            Ok(CallbackDecision::Skip) => {
                info!(
                    identifier = %payment.identifier,
                    callback = callback.name(),
                    "payment skipped by callback"
                );
                return Ok(RecordOutcome::Skipped);
            }
            Err(error) => {
                warn!(
                    identifier = %payment.identifier,
                    callback = callback.name(),
                    %error,
                    "payment has not been saved"
                );
                return Ok(RecordOutcome::Error);
            }
        }
    }

    if let Err(error) = payment.validate() {
        warn!(identifier = %payment.identifier, %error, "payment has not been saved");
        return Ok(RecordOutcome::Error);
    }

    match store.insert_payment(&payment).await? {
        InsertOutcome::Inserted => {
            info!(identifier = %payment.identifier, uuid = %payment.uuid, "payment imported");
            Ok(RecordOutcome::Imported)
        }
        InsertOutcome::Duplicate => {
            info!(
                identifier = %payment.identifier,
                "payment imported concurrently elsewhere - skipping"
            );
            Ok(RecordOutcome::Skipped)
        }
    }
}
