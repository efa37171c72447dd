use {
    crate::domain::error::AssignmentError,
    crate::domain::store::PaymentStore,
    crate::processors::{AssignError, AssignmentContext, ProcessorRegistry},
    chrono::{Datelike, NaiveDate},
    tracing::info,
    uuid::Uuid,
};

/// Manually assign one payment to a chosen processor, bypassing the chain.
/// The row is held under a blocking lock for the duration, so a concurrent
/// scheduler run skips it. On rejection the payment is left untouched.
pub async fn assign_payment(
    store: &dyn PaymentStore,
    registry: &ProcessorRegistry,
    uuid: Uuid,
    processor_name: &str,
    ctx: AssignmentContext,
) -> Result<(), AssignmentError> {
    let processor = registry
        .get(processor_name)
        .ok_or_else(|| AssignmentError::UnknownProcessor(processor_name.to_string()))?;
    if processor.manual_tax_date() && ctx.tax_date.is_none() {
        return Err(AssignmentError::InvalidTaxDate(
            "processor requires a tax date".to_string(),
        ));
    }

    let Some(mut locked) = store.lock_payment(uuid).await? else {
        return Err(AssignmentError::NotFound(uuid));
    };
    let payment = locked.payment().clone();
    if !payment.state.awaits_processing() {
        return Err(AssignmentError::NotAssignable(payment.state.to_string()));
    }

    let result = processor
        .assign_payment(payment.clone(), &ctx)
        .await
        .map_err(|err| match err {
            AssignError::InvalidTaxDate(reason) => AssignmentError::InvalidTaxDate(reason),
            AssignError::Processor(err) => AssignmentError::Failed(err.to_string()),
        })?;

    if !result.accepted {
        return Err(AssignmentError::Rejected);
    }

    let mut updated = payment;
    updated.mark_processed_by(processor_name, result.error);
    locked.save(&updated).await?;
    locked.commit().await?;
    info!(uuid = %updated.uuid, processor = processor_name, "payment assigned");
    Ok(())
}

/// Default tax date offered to the operator for a payment identified on
/// `today`. The tax date must fall in the payment's month and may reach at
/// most 15 days into the past; where no safe default exists, `None` is
/// returned and the operator must choose.
pub fn default_tax_date(payment_date: NaiveDate, today: NaiveDate) -> Option<NaiveDate> {
    let month_index = |d: NaiveDate| d.year() * 12 + d.month() as i32;
    if payment_date > today {
        // payment from the future, manual correction needed
        None
    } else if (today - payment_date).num_days() <= 15 {
        Some(payment_date)
    } else if month_index(today) - month_index(payment_date) > 1 {
        // not from the current or previous month
        None
    } else if today.month() == payment_date.month() {
        Some(today)
    } else if today.day() > 15 {
        // last month, identified after the 15th
        None
    } else {
        last_day_of_month(payment_date.year(), payment_date.month())
    }
}

fn last_day_of_month(year: i32, month: u32) -> Option<NaiveDate> {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    first_of_next.and_then(|d| d.pred_opt())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    #[test]
    fn recent_payment_defaults_to_its_own_date() {
        assert_eq!(
            default_tax_date(d(2026, 3, 14), d(2026, 3, 20)),
            Some(d(2026, 3, 14))
        );
        // crosses a month boundary but is within 15 days
        assert_eq!(
            default_tax_date(d(2026, 2, 25), d(2026, 3, 5)),
            Some(d(2026, 2, 25))
        );
    }

    #[test]
    fn future_payment_has_no_default() {
        assert_eq!(default_tax_date(d(2026, 4, 1), d(2026, 3, 20)), None);
    }

    #[test]
    fn old_payment_has_no_default() {
        // 40 days back, two months away
        assert_eq!(default_tax_date(d(2026, 1, 25), d(2026, 3, 6)), None);
    }

    #[test]
    fn current_month_defaults_to_today() {
        assert_eq!(
            default_tax_date(d(2026, 3, 1), d(2026, 3, 20)),
            Some(d(2026, 3, 20))
        );
    }

    #[test]
    fn last_month_before_the_15th_defaults_to_month_end() {
        assert_eq!(
            default_tax_date(d(2026, 2, 10), d(2026, 3, 10)),
            Some(d(2026, 2, 28))
        );
        assert_eq!(
            default_tax_date(d(2024, 2, 10), d(2024, 3, 10)),
            Some(d(2024, 2, 29))
        );
        assert_eq!(
            default_tax_date(d(2025, 12, 10), d(2026, 1, 10)),
            Some(d(2025, 12, 31))
        );
    }

    #[test]
    fn last_month_after_the_15th_has_no_default() {
        assert_eq!(default_tax_date(d(2026, 2, 10), d(2026, 3, 20)), None);
    }
}
