use {
    crate::domain::error::EngineError,
    crate::domain::payment::{Payment, PaymentType},
    crate::domain::store::{BatchFilter, ClaimedBatch, PaymentStore},
    crate::processors::ProcessorRegistry,
    std::collections::BTreeMap,
    tracing::{error, info},
};

/// Outcome of one scheduler run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    Completed { claimed: usize },
    /// Another run holds the lock; nothing was claimed. Soft outcome.
    LockBusy,
}

/// One scheduler run: claim unsettled payments and drive them through the
/// configured processors. Unknown accounts in an explicit filter abort the
/// run before anything is claimed; contention on the run lock is a logged
/// no-op.
pub async fn process_payments(
    store: &dyn PaymentStore,
    registry: &ProcessorRegistry,
    filter: &BatchFilter,
) -> Result<RunOutcome, EngineError> {
    for numbers in [&filter.include_accounts, &filter.exclude_accounts]
        .into_iter()
        .flatten()
    {
        let missing = store.missing_accounts(numbers).await?;
        if !missing.is_empty() {
            return Err(EngineError::UnknownAccounts(
                missing.iter().map(|n| n.to_string()).collect(),
            ));
        }
    }

    let Some(lock) = store.try_run_lock().await? else {
        info!("another processing run is active, terminating");
        return Ok(RunOutcome::LockBusy);
    };
    let outcome = run_batch(store, registry, filter).await;
    let released = lock.release().await;
    let outcome = outcome?;
    released?;
    info!("processing run finished");
    Ok(outcome)
}

async fn run_batch(
    store: &dyn PaymentStore,
    registry: &ProcessorRegistry,
    filter: &BatchFilter,
) -> Result<RunOutcome, EngineError> {
    let mut batch = store.claim_batch(filter).await?;
    let claimed = batch.payments().len();
    info!(claimed, "processing unprocessed payments");

    let (card, transfer): (Vec<Payment>, Vec<Payment>) = batch
        .payments()
        .iter()
        .cloned()
        .partition(|p| p.payment_type == PaymentType::CardPayment);

    process_card_payments(registry, batch.as_mut(), card).await?;
    process_transfer_payments(registry, batch.as_mut(), transfer).await?;

    batch.commit().await?;
    Ok(RunOutcome::Completed { claimed })
}

/// Card payments already carry their processor from intent creation; they
/// are grouped and handed to that one processor, never to another.
async fn process_card_payments(
    registry: &ProcessorRegistry,
    batch: &mut dyn ClaimedBatch,
    payments: Vec<Payment>,
) -> Result<(), EngineError> {
    if payments.is_empty() {
        return Ok(());
    }
    info!("processing card payments");

    let mut groups: BTreeMap<String, Vec<Payment>> = BTreeMap::new();
    for payment in payments {
        groups.entry(payment.processor.clone()).or_default().push(payment);
    }

    for (name, group) in groups {
        let Some(processor) = registry.get(&name) else {
            error!(processor = %name, "card payments reference an unknown processor, deferring");
            defer_all(batch, group).await?;
            continue;
        };
        info!(processor = %name, count = group.len(), "processing card payments");
        let results = match processor.process_payments(group.clone()).await {
            Ok(results) if results.len() == group.len() => results,
            Ok(results) => {
                error!(
                    processor = %name,
                    expected = group.len(),
                    got = results.len(),
                    "processor returned misaligned results, deferring its card payments"
                );
                defer_all(batch, group).await?;
                continue;
            }
            Err(error) => {
                error!(processor = %name, %error, "processor failed, deferring its card payments");
                defer_all(batch, group).await?;
                continue;
            }
        };
        for (mut payment, result) in group.into_iter().zip(results) {
            if result.accepted {
                payment.mark_processed(result.error);
            } else {
                info!(uuid = %payment.uuid, error = ?result.error, "saving card payment as deferred");
                payment.mark_deferred(result.error);
            }
            batch.apply(&payment).await?;
        }
    }
    Ok(())
}

/// Transfer payments walk the processor chain in configured order; the first
/// accepting processor wins.
async fn process_transfer_payments(
    registry: &ProcessorRegistry,
    batch: &mut dyn ClaimedBatch,
    mut payments: Vec<Payment>,
) -> Result<(), EngineError> {
    for (name, processor) in registry.iter() {
        if payments.is_empty() {
            break;
        }
        info!(processor = name, count = payments.len(), "processing payments");

        // Processors get owned copies; the working set stays here.
        let results = match processor.process_payments(payments.clone()).await {
            Ok(results) if results.len() == payments.len() => results,
            Ok(results) => {
                error!(
                    processor = name,
                    expected = payments.len(),
                    got = results.len(),
                    "processor returned misaligned results, skipping it for this run"
                );
                continue;
            }
            Err(error) => {
                error!(processor = name, %error, "processor failed, skipping it for this run");
                continue;
            }
        };

        let mut unprocessed = Vec::new();
        for (mut payment, result) in payments.into_iter().zip(results) {
            if result.accepted {
                payment.mark_processed_by(name, result.error);
                batch.apply(&payment).await?;
            } else if let Some(error) = result.error {
                info!(uuid = %payment.uuid, %error, "saving payment as deferred");
                payment.mark_deferred_by(name, Some(error));
                batch.apply(&payment).await?;
            } else {
                unprocessed.push(payment);
            }
        }
        payments = unprocessed;
    }

    info!(count = payments.len(), "marking unprocessed payments as deferred");
    for mut payment in payments {
        payment.mark_unclaimed();
        batch.apply(&payment).await?;
    }
    Ok(())
}

async fn defer_all(
    batch: &mut dyn ClaimedBatch,
    payments: Vec<Payment>,
) -> Result<(), EngineError> {
    for mut payment in payments {
        payment.mark_unclaimed();
        batch.apply(&payment).await?;
    }
    Ok(())
}
