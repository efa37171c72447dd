use {
    crate::domain::error::{EngineError, HandlerError},
    crate::domain::payment::PaymentState,
    crate::domain::store::PaymentStore,
    crate::handlers::HandlerRegistry,
    chrono::{DateTime, Utc},
    tracing::{error, info},
    uuid::Uuid,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub updated: u32,
    pub failed: u32,
    pub skipped: u32,
}

/// Query gateways for every payment awaiting external confirmation and
/// advance their state. A gateway failure for one payment is logged and the
/// job proceeds to the next; storage failures abort.
pub async fn update_card_payment_states(
    store: &dyn PaymentStore,
    handlers: &HandlerRegistry,
    time_from: Option<DateTime<Utc>>,
    time_to: Option<DateTime<Utc>>,
) -> Result<SyncStats, EngineError> {
    let pending = store.initialized_payments(time_from, time_to).await?;
    if pending.is_empty() {
        info!("no payments to update state");
        return Ok(SyncStats::default());
    }
    info!(count = pending.len(), "getting state of payments");

    let mut stats = SyncStats::default();
    for payment in pending {
        match sync_one(store, handlers, payment.uuid).await {
            Ok(true) => stats.updated += 1,
            Ok(false) => stats.skipped += 1,
            Err(EngineError::Handler(HandlerError::Connection(reason))) => {
                error!(
                    identifier = %payment.identifier,
                    %reason,
                    "connection error while updating state of payment"
                );
                stats.failed += 1;
            }
            Err(EngineError::Handler(err)) => {
                error!(
                    identifier = %payment.identifier,
                    error = %err,
                    "error while updating state of payment"
                );
                stats.failed += 1;
            }
            Err(other) => return Err(other),
        }
    }
    Ok(stats)
}

/// Sync one payment under its row lock. Returns `false` when there was
/// nothing to do: the row vanished, left INITIALIZED since the select, or
/// references an unknown handler.
async fn sync_one(
    store: &dyn PaymentStore,
    handlers: &HandlerRegistry,
    uuid: Uuid,
) -> Result<bool, EngineError> {
    let Some(mut locked) = store.lock_payment(uuid).await? else {
        return Ok(false);
    };
    let mut payment = locked.payment().clone();
    if payment.state != PaymentState::Initialized {
        return Ok(false);
    }
    let Some(handler) = handlers.get(&payment.card_handler) else {
        error!(
            uuid = %payment.uuid,
            handler = %payment.card_handler,
            "payment references an unknown card handler"
        );
        return Ok(false);
    };

    handler.sync_payment(&mut payment).await?;
    locked.save(&payment).await?;
    locked.commit().await?;
    Ok(true)
}
