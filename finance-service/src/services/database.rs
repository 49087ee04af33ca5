//! Postgres ledger store.
//!
//! Every mutating operation runs in one transaction. Rows that are read and
//! then written are locked with `SELECT ... FOR UPDATE`; an uncommitted
//! transaction is rolled back when it is dropped, so any `?` before `commit`
//! leaves the ledger untouched.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use service_core::error::AppError;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

use super::store::{DiscountRequest, LedgerStore, RecurringInsert};
use crate::models::{
    BillableSubscription, DateRange, Donation, Expense, Guardian, GuardianRemoval, Invoice,
    InvoiceDiscount, InvoicePayment, InvoiceSummary, LedgerTotals, ListInvoicesFilter,
    ListPaymentsFilter, ListPayrollFilter, NewDonation, NewExpense, NewInvoice, NewPayment,
    NewPayroll, NewSubscription, Payment, Payroll, Period, Plan, RevenueBucket, Student,
    Subscription,
};
use crate::services::metrics::DB_QUERY_DURATION;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

fn db_error(action: &'static str) -> impl FnOnce(sqlx::Error) -> AppError {
    move |e| AppError::DatabaseError(anyhow::anyhow!("Failed to {}: {}", action, e))
}

fn not_found(kind: &str, id: Uuid) -> AppError {
    AppError::NotFound(anyhow::anyhow!("{} {} not found", kind, id))
}

impl Database {
    /// Create a new database connection pool.
    #[instrument(skip(database_url), fields(service = "finance-service"))]
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self, AppError> {
        info!(
            max_connections = max_connections,
            min_connections = min_connections,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .connect(database_url)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Failed to connect: {}", e)))?;

        info!("PostgreSQL connection pool established");

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations.
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Migration failed: {}", e)))?;
        info!("Database migrations completed");
        Ok(())
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, AppError> {
        self.pool.begin().await.map_err(db_error("begin transaction"))
    }

    async fn commit(tx: Transaction<'static, Postgres>) -> Result<(), AppError> {
        tx.commit().await.map_err(db_error("commit transaction"))
    }

    async fn lock_invoice(
        tx: &mut Transaction<'static, Postgres>,
        invoice_id: Uuid,
    ) -> Result<Invoice, AppError> {
        sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, guardian_id, student_id, subscription_id, amount, period_label, due_date,
                   status, source, description, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1
            FOR UPDATE
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("lock invoice"))?
        .ok_or_else(|| not_found("Invoice", invoice_id))
    }

    async fn write_invoice(
        tx: &mut Transaction<'static, Postgres>,
        invoice: &Invoice,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE invoices
            SET amount = $2, status = $3, updated_utc = $4
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.amount)
        .bind(invoice.status.as_str())
        .bind(invoice.updated_utc)
        .execute(&mut **tx)
        .await
        .map_err(db_error("update invoice"))?;
        Ok(())
    }

    async fn lock_payment(
        tx: &mut Transaction<'static, Postgres>,
        payment_id: Uuid,
    ) -> Result<Payment, AppError> {
        sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, guardian_id, student_id, invoice_id, subscription_id, amount, method, origin,
                   status, description, paid_utc, refund_reason, refunded_amount, refunded_utc,
                   recorded_by, created_utc, updated_utc
            FROM payments
            WHERE payment_id = $1
            FOR UPDATE
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error("lock payment"))?
        .ok_or_else(|| not_found("Payment", payment_id))
    }

    async fn insert_payment_row(
        tx: &mut Transaction<'static, Postgres>,
        payment: &Payment,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO payments (payment_id, guardian_id, student_id, invoice_id, subscription_id, amount, method,
                                  origin, status, description, paid_utc, recorded_by, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.guardian_id)
        .bind(payment.student_id)
        .bind(payment.invoice_id)
        .bind(payment.subscription_id)
        .bind(payment.amount)
        .bind(payment.method.as_str())
        .bind(payment.origin.as_str())
        .bind(payment.status.as_str())
        .bind(&payment.description)
        .bind(payment.paid_utc)
        .bind(&payment.recorded_by)
        .bind(payment.created_utc)
        .bind(payment.updated_utc)
        .execute(&mut **tx)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!(
                    "Guardian {} not found",
                    payment.guardian_id
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to insert payment: {}", e)),
        })?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for Database {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(anyhow::anyhow!("Health check failed: {}", e)))?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Reference data
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(guardian_id = %guardian_id))]
    async fn get_guardian(&self, guardian_id: Uuid) -> Result<Option<Guardian>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_guardian"])
            .start_timer();

        let guardian = sqlx::query_as::<_, Guardian>(
            r#"
            SELECT guardian_id, user_id, full_name, email, created_utc, removed_utc
            FROM guardians
            WHERE guardian_id = $1
            "#,
        )
        .bind(guardian_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get guardian"))?;

        timer.observe_duration();
        Ok(guardian)
    }

    #[instrument(skip(self), fields(student_id = %student_id))]
    async fn get_student(&self, student_id: Uuid) -> Result<Option<Student>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_student"])
            .start_timer();

        let student = sqlx::query_as::<_, Student>(
            "SELECT student_id, guardian_id, full_name, created_utc FROM students WHERE student_id = $1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get student"))?;

        timer.observe_duration();
        Ok(student)
    }

    #[instrument(skip(self), fields(plan_id = %plan_id))]
    async fn get_plan(&self, plan_id: Uuid) -> Result<Option<Plan>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_plan"])
            .start_timer();

        let plan = sqlx::query_as::<_, Plan>(
            r#"
            SELECT plan_id, name, price, duration_months, sessions_per_week, days_per_week, created_utc
            FROM plans
            WHERE plan_id = $1
            "#,
        )
        .bind(plan_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get plan"))?;

        timer.observe_duration();
        Ok(plan)
    }

    #[instrument(skip(self))]
    async fn list_billable_subscriptions(&self) -> Result<Vec<BillableSubscription>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_billable_subscriptions"])
            .start_timer();

        let rows = sqlx::query_as::<_, BillableSubscription>(
            r#"
            SELECT s.subscription_id, s.student_id, st.guardian_id, s.final_price
            FROM subscriptions s
            JOIN students st ON st.student_id = s.student_id
            WHERE s.status = 'ACTIVE'
            ORDER BY s.subscription_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list billable subscriptions"))?;

        timer.observe_duration();
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Invoices
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn get_invoice(&self, invoice_id: Uuid) -> Result<Option<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_invoice"])
            .start_timer();

        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, guardian_id, student_id, subscription_id, amount, period_label, due_date,
                   status, source, description, created_utc, updated_utc
            FROM invoices
            WHERE invoice_id = $1
            "#,
        )
        .bind(invoice_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get invoice"))?;

        timer.observe_duration();
        Ok(invoice)
    }

    #[instrument(skip(self, filter))]
    async fn list_invoices(&self, filter: &ListInvoicesFilter) -> Result<Vec<Invoice>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_invoices"])
            .start_timer();

        let invoices = sqlx::query_as::<_, Invoice>(
            r#"
            SELECT invoice_id, guardian_id, student_id, subscription_id, amount, period_label, due_date,
                   status, source, description, created_utc, updated_utc
            FROM invoices
            WHERE ($1::uuid IS NULL OR guardian_id = $1)
              AND ($2::varchar IS NULL OR status = $2)
              AND ($3::varchar IS NULL OR period_label = $3)
            ORDER BY created_utc, invoice_id
            "#,
        )
        .bind(filter.guardian_id)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.period_label.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list invoices"))?;

        timer.observe_duration();
        Ok(invoices)
    }

    #[instrument(skip(self, drafts), fields(period = %period, drafts = drafts.len()))]
    async fn insert_recurring_invoices(
        &self,
        period: Period,
        drafts: Vec<NewInvoice>,
    ) -> Result<RecurringInsert, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_recurring_invoices"])
            .start_timer();

        let label = period.label();
        let mut tx = self.begin().await?;

        // Serialise runs for the same period.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("invoice-generation:{}", label))
            .execute(&mut *tx)
            .await
            .map_err(db_error("acquire generation lock"))?;

        let now = Utc::now();
        let mut outcome = RecurringInsert::default();
        for draft in drafts {
            let invoice = Invoice::from_new(draft, now);
            let inserted = sqlx::query_as::<_, Invoice>(
                r#"
                INSERT INTO invoices (invoice_id, guardian_id, student_id, subscription_id, amount, period_label,
                                      due_date, status, source, description, created_utc, updated_utc)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
                ON CONFLICT (subscription_id, period_label) WHERE subscription_id IS NOT NULL DO NOTHING
                RETURNING invoice_id, guardian_id, student_id, subscription_id, amount, period_label, due_date,
                          status, source, description, created_utc, updated_utc
                "#,
            )
            .bind(invoice.invoice_id)
            .bind(invoice.guardian_id)
            .bind(invoice.student_id)
            .bind(invoice.subscription_id)
            .bind(invoice.amount)
            .bind(&invoice.period_label)
            .bind(invoice.due_date)
            .bind(invoice.status.as_str())
            .bind(invoice.source.as_str())
            .bind(&invoice.description)
            .bind(invoice.created_utc)
            .bind(invoice.updated_utc)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error("insert recurring invoice"))?;

            match inserted {
                Some(invoice) => outcome.created.push(invoice),
                None => outcome.already_invoiced += 1,
            }
        }

        Self::commit(tx).await?;
        timer.observe_duration();

        info!(
            period = %label,
            created = outcome.created.len(),
            already_invoiced = outcome.already_invoiced,
            "Recurring invoices inserted"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, input), fields(guardian_id = %input.guardian_id, period = %input.period_label))]
    async fn insert_invoice(&self, input: NewInvoice) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_invoice"])
            .start_timer();

        let invoice = Invoice::from_new(input, Utc::now());
        let invoice = sqlx::query_as::<_, Invoice>(
            r#"
            INSERT INTO invoices (invoice_id, guardian_id, student_id, subscription_id, amount, period_label,
                                  due_date, status, source, description, created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING invoice_id, guardian_id, student_id, subscription_id, amount, period_label, due_date,
                      status, source, description, created_utc, updated_utc
            "#,
        )
        .bind(invoice.invoice_id)
        .bind(invoice.guardian_id)
        .bind(invoice.student_id)
        .bind(invoice.subscription_id)
        .bind(invoice.amount)
        .bind(&invoice.period_label)
        .bind(invoice.due_date)
        .bind(invoice.status.as_str())
        .bind(invoice.source.as_str())
        .bind(&invoice.description)
        .bind(invoice.created_utc)
        .bind(invoice.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_foreign_key_violation() => {
                AppError::NotFound(anyhow::anyhow!("Guardian {} not found", invoice.guardian_id))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create invoice: {}", e)),
        })?;

        timer.observe_duration();
        info!(invoice_id = %invoice.invoice_id, amount = %invoice.amount, "Invoice created");
        Ok(invoice)
    }

    #[instrument(skip(self, request), fields(invoice_id = %invoice_id, discount = %request.amount))]
    async fn apply_discount(
        &self,
        invoice_id: Uuid,
        request: DiscountRequest,
    ) -> Result<(Invoice, InvoiceDiscount), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["apply_discount"])
            .start_timer();

        let mut tx = self.begin().await?;
        let mut invoice = Self::lock_invoice(&mut tx, invoice_id).await?;
        let now = Utc::now();
        let before = invoice.apply_discount(request.amount, now)?;
        Self::write_invoice(&mut tx, &invoice).await?;

        let audit = sqlx::query_as::<_, InvoiceDiscount>(
            r#"
            INSERT INTO invoice_discounts (discount_id, invoice_id, requested_amount, amount_before, amount_after,
                                           reason, applied_by, applied_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING discount_id, invoice_id, requested_amount, amount_before, amount_after, reason, applied_by,
                      applied_utc
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(invoice_id)
        .bind(request.amount)
        .bind(before)
        .bind(invoice.amount)
        .bind(&request.reason)
        .bind(&request.applied_by)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("record discount"))?;

        Self::commit(tx).await?;
        timer.observe_duration();

        info!(invoice_id = %invoice_id, before = %before, after = %invoice.amount, "Discount applied");
        Ok((invoice, audit))
    }

    #[instrument(skip(self), fields(invoice_id = %invoice_id))]
    async fn cancel_invoice(&self, invoice_id: Uuid) -> Result<Invoice, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["cancel_invoice"])
            .start_timer();

        let mut tx = self.begin().await?;
        let mut invoice = Self::lock_invoice(&mut tx, invoice_id).await?;
        invoice.cancel(Utc::now())?;
        Self::write_invoice(&mut tx, &invoice).await?;
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(invoice_id = %invoice_id, "Invoice cancelled");
        Ok(invoice)
    }

    #[instrument(skip(self), fields(as_of = %as_of))]
    async fn list_overdue_invoices(
        &self,
        as_of: NaiveDate,
    ) -> Result<Vec<InvoiceSummary>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_overdue_invoices"])
            .start_timer();

        let rows = sqlx::query_as::<_, InvoiceSummary>(
            r#"
            SELECT i.invoice_id, i.guardian_id, g.user_id AS guardian_user_id, g.full_name AS guardian_name,
                   g.email AS guardian_email, i.amount, i.period_label, i.due_date
            FROM invoices i
            JOIN guardians g ON g.guardian_id = i.guardian_id
            WHERE i.status = 'PENDING' AND i.due_date < $1
            ORDER BY i.due_date, i.invoice_id
            "#,
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list overdue invoices"))?;

        timer.observe_duration();
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // Payments
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn get_payment(&self, payment_id: Uuid) -> Result<Option<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payment"])
            .start_timer();

        let payment = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, guardian_id, student_id, invoice_id, subscription_id, amount, method, origin,
                   status, description, paid_utc, refund_reason, refunded_amount, refunded_utc,
                   recorded_by, created_utc, updated_utc
            FROM payments
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get payment"))?;

        timer.observe_duration();
        Ok(payment)
    }

    #[instrument(skip(self, filter))]
    async fn list_payments(&self, filter: &ListPaymentsFilter) -> Result<Vec<Payment>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payments"])
            .start_timer();

        let payments = sqlx::query_as::<_, Payment>(
            r#"
            SELECT payment_id, guardian_id, student_id, invoice_id, subscription_id, amount, method, origin,
                   status, description, paid_utc, refund_reason, refunded_amount, refunded_utc,
                   recorded_by, created_utc, updated_utc
            FROM payments
            WHERE ($1::uuid IS NULL OR guardian_id = $1)
              AND ($2::varchar IS NULL OR status = $2)
            ORDER BY created_utc, payment_id
            "#,
        )
        .bind(filter.guardian_id)
        .bind(filter.status.map(|s| s.as_str()))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list payments"))?;

        timer.observe_duration();
        Ok(payments)
    }

    #[instrument(skip(self, payment), fields(invoice_id = %invoice_id, amount = %payment.amount, method = payment.method.as_str()))]
    async fn record_payment(
        &self,
        invoice_id: Uuid,
        payment: InvoicePayment,
    ) -> Result<(Invoice, Payment), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["record_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        let mut invoice = Self::lock_invoice(&mut tx, invoice_id).await?;
        let now = Utc::now();
        let payment = Payment::completed(payment.for_invoice(&invoice), now);
        invoice.settle(now)?;

        Self::insert_payment_row(&mut tx, &payment).await?;
        Self::write_invoice(&mut tx, &invoice).await?;
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(
            payment_id = %payment.payment_id,
            invoice_id = %invoice_id,
            amount = %payment.amount,
            "Payment recorded and invoice settled"
        );
        Ok((invoice, payment))
    }

    #[instrument(skip(self, subscription, payment), fields(student_id = %subscription.student_id, plan_id = %subscription.plan_id))]
    async fn create_admission(
        &self,
        subscription: NewSubscription,
        payment: NewPayment,
    ) -> Result<(Subscription, Payment), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["create_admission"])
            .start_timer();

        let now = Utc::now();
        let subscription = Subscription::from_new(subscription, now);
        let payment = Payment::pending(
            NewPayment {
                subscription_id: Some(subscription.subscription_id),
                ..payment
            },
            now,
        );

        let mut tx = self.begin().await?;
        let subscription = sqlx::query_as::<_, Subscription>(
            r#"
            INSERT INTO subscriptions (subscription_id, student_id, plan_id, base_price, final_price,
                                       sessions_per_week, days_per_week, status, start_date, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING subscription_id, student_id, plan_id, base_price, final_price, sessions_per_week,
                      days_per_week, status, start_date, created_utc
            "#,
        )
        .bind(subscription.subscription_id)
        .bind(subscription.student_id)
        .bind(subscription.plan_id)
        .bind(subscription.base_price)
        .bind(subscription.final_price)
        .bind(subscription.sessions_per_week)
        .bind(subscription.days_per_week)
        .bind(subscription.status.as_str())
        .bind(subscription.start_date)
        .bind(subscription.created_utc)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_error("create subscription"))?;

        Self::insert_payment_row(&mut tx, &payment).await?;
        Self::commit(tx).await?;

        timer.observe_duration();
        info!(
            subscription_id = %subscription.subscription_id,
            payment_id = %payment.payment_id,
            "Admission opened"
        );
        Ok((subscription, payment))
    }

    #[instrument(skip(self, reason), fields(payment_id = %payment_id))]
    async fn refund_payment(
        &self,
        payment_id: Uuid,
        reason: &str,
    ) -> Result<(Payment, Option<Invoice>), AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["refund_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        // Status guard runs on the locked row, so two refunds cannot both pass it.
        let mut payment = Self::lock_payment(&mut tx, payment_id).await?;
        let now = Utc::now();
        payment.refund(reason, now)?;

        sqlx::query(
            r#"
            UPDATE payments
            SET status = $2, refund_reason = $3, refunded_amount = $4, refunded_utc = $5, updated_utc = $6
            WHERE payment_id = $1
            "#,
        )
        .bind(payment_id)
        .bind(payment.status.as_str())
        .bind(&payment.refund_reason)
        .bind(payment.refunded_amount)
        .bind(payment.refunded_utc)
        .bind(payment.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_error("refund payment"))?;

        let invoice = match payment.invoice_id {
            Some(invoice_id) => {
                let mut invoice = Self::lock_invoice(&mut tx, invoice_id).await?;
                invoice.reopen(now)?;
                Self::write_invoice(&mut tx, &invoice).await?;
                Some(invoice)
            }
            None => None,
        };

        Self::commit(tx).await?;
        timer.observe_duration();

        info!(
            payment_id = %payment_id,
            refunded_amount = %payment.amount,
            reopened_invoice = ?payment.invoice_id,
            "Payment refunded"
        );
        Ok((payment, invoice))
    }

    #[instrument(skip(self), fields(payment_id = %payment_id))]
    async fn delete_pending_payment(&self, payment_id: Uuid) -> Result<Payment, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["delete_pending_payment"])
            .start_timer();

        let mut tx = self.begin().await?;
        let payment = Self::lock_payment(&mut tx, payment_id).await?;
        payment.ensure_deletable()?;

        sqlx::query("DELETE FROM payments WHERE payment_id = $1")
            .bind(payment_id)
            .execute(&mut *tx)
            .await
            .map_err(db_error("delete payment"))?;

        Self::commit(tx).await?;
        timer.observe_duration();

        info!(payment_id = %payment_id, "Pending payment deleted");
        Ok(payment)
    }

    // -------------------------------------------------------------------------
    // Payroll
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(payroll_id = %payroll_id))]
    async fn get_payroll(&self, payroll_id: Uuid) -> Result<Option<Payroll>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["get_payroll"])
            .start_timer();

        let payroll = sqlx::query_as::<_, Payroll>(
            r#"
            SELECT payroll_id, staff_id, amount, period_label, status, description, paid_utc, created_utc, updated_utc
            FROM payroll
            WHERE payroll_id = $1
            "#,
        )
        .bind(payroll_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get payroll"))?;

        timer.observe_duration();
        Ok(payroll)
    }

    #[instrument(skip(self, filter))]
    async fn list_payroll(&self, filter: &ListPayrollFilter) -> Result<Vec<Payroll>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["list_payroll"])
            .start_timer();

        let rows = sqlx::query_as::<_, Payroll>(
            r#"
            SELECT payroll_id, staff_id, amount, period_label, status, description, paid_utc, created_utc, updated_utc
            FROM payroll
            WHERE ($1::varchar IS NULL OR staff_id = $1)
              AND ($2::varchar IS NULL OR period_label = $2)
            ORDER BY period_label, staff_id
            "#,
        )
        .bind(filter.staff_id.as_deref())
        .bind(filter.period_label.as_deref())
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list payroll"))?;

        timer.observe_duration();
        Ok(rows)
    }

    #[instrument(skip(self, input), fields(staff_id = %input.staff_id, period = %input.period))]
    async fn insert_payroll(&self, input: NewPayroll) -> Result<Payroll, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_payroll"])
            .start_timer();

        let payroll = Payroll::from_new(input, Utc::now());
        let payroll = sqlx::query_as::<_, Payroll>(
            r#"
            INSERT INTO payroll (payroll_id, staff_id, amount, period_label, status, description, paid_utc,
                                 created_utc, updated_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING payroll_id, staff_id, amount, period_label, status, description, paid_utc, created_utc,
                      updated_utc
            "#,
        )
        .bind(payroll.payroll_id)
        .bind(&payroll.staff_id)
        .bind(payroll.amount)
        .bind(&payroll.period_label)
        .bind(payroll.status.as_str())
        .bind(&payroll.description)
        .bind(payroll.paid_utc)
        .bind(payroll.created_utc)
        .bind(payroll.updated_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::Conflict(anyhow::anyhow!(
                    "Payroll for staff {} and period {} already exists",
                    payroll.staff_id,
                    payroll.period_label
                ))
            }
            _ => AppError::DatabaseError(anyhow::anyhow!("Failed to create payroll: {}", e)),
        })?;

        timer.observe_duration();
        info!(payroll_id = %payroll.payroll_id, "Payroll created");
        Ok(payroll)
    }

    #[instrument(skip(self), fields(payroll_id = %payroll_id))]
    async fn settle_payroll(&self, payroll_id: Uuid) -> Result<Payroll, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["settle_payroll"])
            .start_timer();

        let mut tx = self.begin().await?;
        let mut payroll = sqlx::query_as::<_, Payroll>(
            r#"
            SELECT payroll_id, staff_id, amount, period_label, status, description, paid_utc, created_utc, updated_utc
            FROM payroll
            WHERE payroll_id = $1
            FOR UPDATE
            "#,
        )
        .bind(payroll_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("lock payroll"))?
        .ok_or_else(|| not_found("Payroll", payroll_id))?;

        payroll.settle(Utc::now())?;

        sqlx::query(
            "UPDATE payroll SET status = $2, paid_utc = $3, updated_utc = $4 WHERE payroll_id = $1",
        )
        .bind(payroll_id)
        .bind(payroll.status.as_str())
        .bind(payroll.paid_utc)
        .bind(payroll.updated_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_error("settle payroll"))?;

        Self::commit(tx).await?;
        timer.observe_duration();

        info!(payroll_id = %payroll_id, "Payroll settled");
        Ok(payroll)
    }

    // -------------------------------------------------------------------------
    // Ledger entries and reporting
    // -------------------------------------------------------------------------

    #[instrument(skip(self, input), fields(category = %input.category, amount = %input.amount))]
    async fn insert_expense(&self, input: NewExpense) -> Result<Expense, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_expense"])
            .start_timer();

        let expense = Expense::from_new(input, Utc::now());
        let expense = sqlx::query_as::<_, Expense>(
            r#"
            INSERT INTO expenses (expense_id, category, description, amount, expense_date, recorded_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING expense_id, category, description, amount, expense_date, recorded_by, created_utc
            "#,
        )
        .bind(expense.expense_id)
        .bind(&expense.category)
        .bind(&expense.description)
        .bind(expense.amount)
        .bind(expense.expense_date)
        .bind(&expense.recorded_by)
        .bind(expense.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("record expense"))?;

        timer.observe_duration();
        Ok(expense)
    }

    #[instrument(skip(self, input), fields(amount = %input.amount))]
    async fn insert_donation(&self, input: NewDonation) -> Result<Donation, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["insert_donation"])
            .start_timer();

        let donation = Donation::from_new(input, Utc::now());
        let donation = sqlx::query_as::<_, Donation>(
            r#"
            INSERT INTO donations (donation_id, donor_name, amount, donation_date, note, recorded_by, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING donation_id, donor_name, amount, donation_date, note, recorded_by, created_utc
            "#,
        )
        .bind(donation.donation_id)
        .bind(&donation.donor_name)
        .bind(donation.amount)
        .bind(donation.donation_date)
        .bind(&donation.note)
        .bind(&donation.recorded_by)
        .bind(donation.created_utc)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("record donation"))?;

        timer.observe_duration();
        Ok(donation)
    }

    #[instrument(skip(self))]
    async fn ledger_totals(&self, range: Option<DateRange>) -> Result<LedgerTotals, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["ledger_totals"])
            .start_timer();

        let (revenue, expenses, donations, pending_balance) =
            sqlx::query_as::<_, (Decimal, Decimal, Decimal, Decimal)>(
                r#"
                SELECT
                    (SELECT COALESCE(SUM(amount), 0) FROM payments
                      WHERE status = 'COMPLETED'
                        AND ($1::date IS NULL OR (paid_utc AT TIME ZONE 'UTC')::date >= $1)
                        AND ($2::date IS NULL OR (paid_utc AT TIME ZONE 'UTC')::date <= $2)),
                    (SELECT COALESCE(SUM(amount), 0) FROM expenses
                      WHERE ($1::date IS NULL OR expense_date >= $1)
                        AND ($2::date IS NULL OR expense_date <= $2)),
                    (SELECT COALESCE(SUM(amount), 0) FROM donations
                      WHERE ($1::date IS NULL OR donation_date >= $1)
                        AND ($2::date IS NULL OR donation_date <= $2)),
                    (SELECT COALESCE(SUM(amount), 0) FROM invoices WHERE status = 'PENDING')
                "#,
            )
            .bind(range.map(|r| r.from))
            .bind(range.map(|r| r.to))
            .fetch_one(&self.pool)
            .await
            .map_err(db_error("aggregate ledger totals"))?;

        timer.observe_duration();
        Ok(LedgerTotals {
            revenue,
            expenses,
            donations,
            pending_balance,
        })
    }

    #[instrument(skip(self))]
    async fn revenue_by_month(
        &self,
        range: Option<DateRange>,
    ) -> Result<Vec<RevenueBucket>, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["revenue_by_month"])
            .start_timer();

        let buckets = sqlx::query_as::<_, RevenueBucket>(
            r#"
            SELECT to_char(paid_utc AT TIME ZONE 'UTC', 'YYYY-MM') AS period,
                   SUM(amount) AS revenue,
                   COUNT(*) AS payments
            FROM payments
            WHERE status = 'COMPLETED'
              AND ($1::date IS NULL OR (paid_utc AT TIME ZONE 'UTC')::date >= $1)
              AND ($2::date IS NULL OR (paid_utc AT TIME ZONE 'UTC')::date <= $2)
            GROUP BY 1
            ORDER BY 1
            "#,
        )
        .bind(range.map(|r| r.from))
        .bind(range.map(|r| r.to))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("aggregate revenue trend"))?;

        timer.observe_duration();
        Ok(buckets)
    }

    // -------------------------------------------------------------------------
    // Guardian removal
    // -------------------------------------------------------------------------

    #[instrument(skip(self), fields(guardian_id = %guardian_id))]
    async fn remove_guardian(&self, guardian_id: Uuid) -> Result<GuardianRemoval, AppError> {
        let timer = DB_QUERY_DURATION
            .with_label_values(&["remove_guardian"])
            .start_timer();

        let mut tx = self.begin().await?;

        // Invoices before the guardian row, the order payment recording takes them in.
        sqlx::query(
            r#"
            SELECT invoice_id
            FROM invoices
            WHERE guardian_id = $1 AND status = 'PENDING'
            ORDER BY invoice_id
            FOR UPDATE
            "#,
        )
        .bind(guardian_id)
        .fetch_all(&mut *tx)
        .await
        .map_err(db_error("lock pending invoices"))?;

        let mut guardian = sqlx::query_as::<_, Guardian>(
            r#"
            SELECT guardian_id, user_id, full_name, email, created_utc, removed_utc
            FROM guardians
            WHERE guardian_id = $1
            FOR UPDATE
            "#,
        )
        .bind(guardian_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("lock guardian"))?
        .ok_or_else(|| not_found("Guardian", guardian_id))?;

        if guardian.is_removed() {
            return Err(AppError::Conflict(anyhow::anyhow!(
                "Guardian {} was already removed",
                guardian_id
            )));
        }

        let now = Utc::now();
        let pending_payments_deleted =
            sqlx::query("DELETE FROM payments WHERE guardian_id = $1 AND status = 'PENDING'")
                .bind(guardian_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("delete pending payments"))?
                .rows_affected();

        let pending_invoices_cancelled = sqlx::query(
            r#"
            UPDATE invoices
            SET status = 'CANCELLED', updated_utc = $2
            WHERE guardian_id = $1 AND status = 'PENDING'
            "#,
        )
        .bind(guardian_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(db_error("cancel pending invoices"))?
        .rows_affected();

        let students_unlinked =
            sqlx::query("UPDATE students SET guardian_id = NULL WHERE guardian_id = $1")
                .bind(guardian_id)
                .execute(&mut *tx)
                .await
                .map_err(db_error("unlink students"))?
                .rows_affected();

        guardian.anonymize(now);
        sqlx::query(
            r#"
            UPDATE guardians
            SET user_id = $2, full_name = $3, email = NULL, removed_utc = $4
            WHERE guardian_id = $1
            "#,
        )
        .bind(guardian_id)
        .bind(&guardian.user_id)
        .bind(&guardian.full_name)
        .bind(guardian.removed_utc)
        .execute(&mut *tx)
        .await
        .map_err(db_error("anonymise guardian"))?;

        Self::commit(tx).await?;
        timer.observe_duration();

        let removal = GuardianRemoval {
            guardian_id,
            pending_payments_deleted,
            pending_invoices_cancelled,
            students_unlinked,
            anonymized: true,
        };
        info!(
            guardian_id = %guardian_id,
            pending_payments_deleted,
            pending_invoices_cancelled,
            students_unlinked,
            "Guardian removed"
        );
        Ok(removal)
    }
}
