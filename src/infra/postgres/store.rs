use {
    crate::domain::account::{Account, AccountNumber},
    crate::domain::error::StoreError,
    crate::domain::money::{Currency, Money},
    crate::domain::payment::{Payment, PaymentState, PaymentType, ProcessingError},
    crate::domain::store::{
        BatchFilter, ClaimedBatch, InsertOutcome, LockedPayment, PaymentStore, RunLock,
    },
    async_trait::async_trait,
    chrono::{DateTime, NaiveDate, Utc},
    sqlx::{PgPool, Postgres, QueryBuilder, Row, Transaction, postgres::PgRow},
    uuid::Uuid,
};

const SELECT_PAYMENT: &str = "SELECT \
    p.uuid, p.identifier, p.payment_type, p.amount, p.currency, \
    p.transaction_date, p.create_time, \
    p.counter_account_number, p.counter_account_name, p.description, \
    p.constant_symbol, p.variable_symbol, p.specific_symbol, \
    p.state, p.card_gateway_state, p.processing_error, p.processor, p.card_handler, \
    a.id AS account_id, a.account_number, a.account_name, a.currency AS account_currency \
    FROM payments p JOIN accounts a ON a.id = p.account_id";

/// `PaymentStore` over Postgres. Row claims use `FOR UPDATE SKIP LOCKED`,
/// single-row locks plain `FOR UPDATE`, and the scheduler run lock a session
/// advisory lock on a dedicated connection.
pub struct PgPaymentStore {
    pool: PgPool,
    run_lock_key: i64,
}

impl PgPaymentStore {
    pub fn new(pool: PgPool, run_lock_key: i64) -> Self {
        Self { pool, run_lock_key }
    }
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let corrupt = |e: crate::domain::error::ValidationError| StoreError::Corrupt(e.0);
    let currency: String = row.try_get("currency")?;
    let account_currency: String = row.try_get("account_currency")?;
    let payment_type: String = row.try_get("payment_type")?;
    let state: String = row.try_get("state")?;
    let processing_error: Option<String> = row.try_get("processing_error")?;
    Ok(Payment {
        uuid: row.try_get("uuid")?,
        identifier: row.try_get("identifier")?,
        payment_type: PaymentType::try_from(payment_type.as_str()).map_err(corrupt)?,
        account: Account {
            id: row.try_get("account_id")?,
            account_number: AccountNumber::new(row.try_get::<String, _>("account_number")?),
            account_name: row.try_get("account_name")?,
            currency: Currency::try_from(account_currency.as_str()).map_err(corrupt)?,
        },
        amount: Money::from_minor(
            row.try_get("amount")?,
            Currency::try_from(currency.as_str()).map_err(corrupt)?,
        ),
        transaction_date: row.try_get::<Option<NaiveDate>, _>("transaction_date")?,
        create_time: row.try_get("create_time")?,
        counter_account_number: row.try_get("counter_account_number")?,
        counter_account_name: row.try_get("counter_account_name")?,
        description: row.try_get("description")?,
        constant_symbol: row.try_get("constant_symbol")?,
        variable_symbol: row.try_get("variable_symbol")?,
        specific_symbol: row.try_get("specific_symbol")?,
        state: PaymentState::try_from(state.as_str()).map_err(corrupt)?,
        card_gateway_state: row.try_get("card_gateway_state")?,
        processing_error: processing_error
            .as_deref()
            .map(ProcessingError::try_from)
            .transpose()
            .map_err(corrupt)?,
        processor: row.try_get("processor")?,
        card_handler: row.try_get("card_handler")?,
    })
}

async fn write_lifecycle(
    tx: &mut Transaction<'static, Postgres>,
    payment: &Payment,
) -> Result<(), StoreError> {
    sqlx::query(
        "UPDATE payments SET state = $1, processor = $2, processing_error = $3, \
         card_gateway_state = $4 WHERE uuid = $5",
    )
    .bind(payment.state.as_str())
    .bind(&payment.processor)
    .bind(payment.processing_error.map(|e| e.as_str()))
    .bind(&payment.card_gateway_state)
    .bind(payment.uuid)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

struct PgClaimedBatch {
    tx: Transaction<'static, Postgres>,
    payments: Vec<Payment>,
}

#[async_trait]
impl ClaimedBatch for PgClaimedBatch {
    fn payments(&self) -> &[Payment] {
        &self.payments
    }

    async fn apply(&mut self, payment: &Payment) -> Result<(), StoreError> {
        write_lifecycle(&mut self.tx, payment).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

struct PgLockedPayment {
    tx: Transaction<'static, Postgres>,
    payment: Payment,
}

#[async_trait]
impl LockedPayment for PgLockedPayment {
    fn payment(&self) -> &Payment {
        &self.payment
    }

    async fn save(&mut self, payment: &Payment) -> Result<(), StoreError> {
        write_lifecycle(&mut self.tx, payment).await
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}

struct PgRunLock {
    conn: Option<sqlx::pool::PoolConnection<Postgres>>,
    key: i64,
}

#[async_trait]
impl RunLock for PgRunLock {
    async fn release(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(mut conn) = self.conn.take() {
            sqlx::query("SELECT pg_advisory_unlock($1)")
                .bind(self.key)
                .execute(&mut *conn)
                .await?;
        }
        Ok(())
    }
}

impl Drop for PgRunLock {
    fn drop(&mut self) {
        // Session advisory locks outlive the pooled connection's checkout;
        // a dropped-without-release lock must still be freed before the
        // connection is reused.
        if let Some(mut conn) = self.conn.take() {
            let key = self.key;
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    let _ = sqlx::query("SELECT pg_advisory_unlock($1)")
                        .bind(key)
                        .execute(&mut *conn)
                        .await;
                });
            }
        }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn insert_account(&self, account: &Account) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO accounts (id, account_number, account_name, currency) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(account.id)
        .bind(account.account_number.as_str())
        .bind(&account.account_name)
        .bind(account.currency.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn account_by_number(
        &self,
        number: &AccountNumber,
    ) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT id, account_number, account_name, currency FROM accounts \
             WHERE account_number = $1",
        )
        .bind(number.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(|row| {
            let currency: String = row.try_get("currency")?;
            Ok(Account {
                id: row.try_get("id")?,
                account_number: AccountNumber::new(row.try_get::<String, _>("account_number")?),
                account_name: row.try_get("account_name")?,
                currency: Currency::try_from(currency.as_str())
                    .map_err(|e| StoreError::Corrupt(e.0))?,
            })
        })
        .transpose()
    }

    async fn missing_accounts(
        &self,
        numbers: &[AccountNumber],
    ) -> Result<Vec<AccountNumber>, StoreError> {
        let requested: Vec<String> = numbers.iter().map(|n| n.as_str().to_string()).collect();
        let known: Vec<String> = sqlx::query_scalar(
            "SELECT account_number FROM accounts WHERE account_number = ANY($1)",
        )
        .bind(&requested)
        .fetch_all(&self.pool)
        .await?;
        let mut missing: Vec<AccountNumber> = numbers
            .iter()
            .filter(|n| !known.iter().any(|k| k == n.as_str()))
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
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM payments WHERE account_id = $1 AND identifier = $2)",
        )
        .bind(account_id)
        .bind(identifier)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<InsertOutcome, StoreError> {
        let result = sqlx::query(
            "INSERT INTO payments \
             (uuid, identifier, payment_type, account_id, amount, currency, \
              transaction_date, create_time, counter_account_number, \
              counter_account_name, description, constant_symbol, variable_symbol, \
              specific_symbol, state, card_gateway_state, processing_error, \
              processor, card_handler) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, \
                     $15, $16, $17, $18, $19)",
        )
        .bind(payment.uuid)
        .bind(&payment.identifier)
        .bind(payment.payment_type.as_str())
        .bind(payment.account.id)
        .bind(payment.amount.minor())
        .bind(payment.amount.currency().as_str())
        .bind(payment.transaction_date)
        .bind(payment.create_time)
        .bind(&payment.counter_account_number)
        .bind(&payment.counter_account_name)
        .bind(&payment.description)
        .bind(&payment.constant_symbol)
        .bind(&payment.variable_symbol)
        .bind(&payment.specific_symbol)
        .bind(payment.state.as_str())
        .bind(&payment.card_gateway_state)
        .bind(payment.processing_error.map(|e| e.as_str()))
        .bind(&payment.processor)
        .bind(&payment.card_handler)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(InsertOutcome::Inserted),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Ok(InsertOutcome::Duplicate)
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn payment_by_uuid(&self, uuid: Uuid) -> Result<Option<Payment>, StoreError> {
        let row = sqlx::query(&format!("{SELECT_PAYMENT} WHERE p.uuid = $1"))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn try_run_lock(&self) -> Result<Option<Box<dyn RunLock>>, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
            .bind(self.run_lock_key)
            .fetch_one(&mut *conn)
            .await?;
        if acquired {
            Ok(Some(Box::new(PgRunLock {
                conn: Some(conn),
                key: self.run_lock_key,
            })))
        } else {
            Ok(None)
        }
    }

    async fn claim_batch(
        &self,
        filter: &BatchFilter,
    ) -> Result<Box<dyn ClaimedBatch>, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "{SELECT_PAYMENT} WHERE p.state IN ('ready_to_process', 'deferred')"
        ));
        if let Some(from) = filter.time_from {
            query.push(" AND p.create_time >= ").push_bind(from);
        }
        if let Some(to) = filter.time_to {
            query.push(" AND p.create_time <= ").push_bind(to);
        }
        if let Some(include) = &filter.include_accounts {
            let numbers: Vec<String> = include.iter().map(|n| n.as_str().to_string()).collect();
            query
                .push(" AND a.account_number = ANY(")
                .push_bind(numbers)
                .push(")");
        }
        if let Some(exclude) = &filter.exclude_accounts {
            let numbers: Vec<String> = exclude.iter().map(|n| n.as_str().to_string()).collect();
            query
                .push(" AND NOT (a.account_number = ANY(")
                .push_bind(numbers)
                .push("))");
        }
        query.push(" ORDER BY p.transaction_date, p.create_time FOR UPDATE OF p SKIP LOCKED");

        let rows = query.build().fetch_all(&mut *tx).await?;
        let payments = rows
            .iter()
            .map(payment_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Box::new(PgClaimedBatch { tx, payments }))
    }

    async fn initialized_payments(
        &self,
        time_from: Option<DateTime<Utc>>,
        time_to: Option<DateTime<Utc>>,
    ) -> Result<Vec<Payment>, StoreError> {
        let mut query: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "{SELECT_PAYMENT} WHERE p.state = 'initialized'"
        ));
        if let Some(from) = time_from {
            query.push(" AND p.create_time >= ").push_bind(from);
        }
        if let Some(to) = time_to {
            query.push(" AND p.create_time <= ").push_bind(to);
        }
        query.push(" ORDER BY p.create_time");

        let rows = query.build().fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn lock_payment(
        &self,
        uuid: Uuid,
    ) -> Result<Option<Box<dyn LockedPayment>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query(&format!(
            "{SELECT_PAYMENT} WHERE p.uuid = $1 FOR UPDATE OF p"
        ))
        .bind(uuid)
        .fetch_optional(&mut *tx)
        .await?;
        match row {
            Some(row) => {
                let payment = payment_from_row(&row)?;
                Ok(Some(Box::new(PgLockedPayment { tx, payment })))
            }
            None => Ok(None),
        }
    }

    async fn open_import_batch(&self, origin: &str) -> Result<Uuid, StoreError> {
        let id = Uuid::now_v7();
        sqlx::query("INSERT INTO import_batches (id, origin) VALUES ($1, $2)")
            .bind(id)
            .bind(origin)
            .execute(&self.pool)
            .await?;
        Ok(id)
    }

    async fn append_import_file(&self, batch: Uuid, filename: &str) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE import_batches SET filenames = array_append(filenames, $2) WHERE id = $1",
        )
        .bind(batch)
        .bind(filename)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn add_import_errors(&self, batch: Uuid, errors: u32) -> Result<(), StoreError> {
        sqlx::query("UPDATE import_batches SET error_count = error_count + $2 WHERE id = $1")
            .bind(batch)
            .bind(errors as i32)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close_import_batch(&self, batch: Uuid) -> Result<(), StoreError> {
        sqlx::query("UPDATE import_batches SET finished = true WHERE id = $1")
            .bind(batch)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
