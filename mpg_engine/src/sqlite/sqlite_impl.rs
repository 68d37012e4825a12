//! `SqliteDatabase` is a concrete implementation of a payment engine backend.
//!
//! Unsurprisingly, it uses SQLite as the backend and implements all the traits defined in the [`crate::traits`]
//! module.
use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqlitePool;

use super::db::{activities, db_url, new_pool, orders, payments, products, users};
use crate::{
    db_types::{
        MinorUnits,
        NewOrder,
        NewPaymentRecord,
        Order,
        OrderNo,
        OrderStatusType,
        PaymentRecord,
        Product,
        ProductStatus,
        ProductType,
        RechargeActivity,
        UserAccount,
    },
    order_objects::OrderQueryFilter,
    traits::{
        AccountManagement,
        ApplyPaymentResult,
        CloseOrderResult,
        OrderManagement,
        PaymentGatewayDatabase,
        PaymentGatewayError,
        ProductCatalog,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SqliteDatabase {
    /// Creates a new database API object using the URL in `MPG_DATABASE_URL`, or the default location.
    pub async fn new(max_connections: u32) -> Result<Self, PaymentGatewayError> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, PaymentGatewayError> {
        let pool = new_pool(url, max_connections).await?;
        trace!("🗃️ Created new SQLite connection pool for {url}");
        Ok(Self { url: url.to_string(), pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs any outstanding schema migrations.
    pub async fn run_migrations(&self) -> Result<(), PaymentGatewayError> {
        sqlx::migrate!("./src/sqlite/migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PaymentGatewayError::DatabaseError(format!("Migration failed: {e}")))?;
        info!("🗃️ Database migrations complete");
        Ok(())
    }

    pub async fn insert_user(&self, user_name: &str, email: Option<&str>) -> Result<UserAccount, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        users::insert_user(user_name, email, &mut conn).await
    }

    pub async fn insert_product(
        &self,
        name: &str,
        total: MinorUnits,
        add_points: i64,
        product_type: ProductType,
        status: ProductStatus,
    ) -> Result<Product, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        products::insert_product(name, total, add_points, product_type, status, &mut conn).await
    }

    pub async fn count_payments_for_order(&self, order_no: &OrderNo) -> Result<i64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::count_payments_for_order(order_no, &mut conn).await
    }

    pub async fn fetch_recharge_activities(&self, user_id: i64) -> Result<Vec<RechargeActivity>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        activities::fetch_activities_for_user(user_id, &mut conn).await
    }
}

impl OrderManagement for SqliteDatabase {
    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_order_no(order_no, &mut conn).await
    }

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::fetch_order_by_id(id, &mut conn).await
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::search_orders(query, &mut conn).await
    }

    async fn fetch_payment_for_order(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        payments::fetch_payment_for_order(order_no, &mut conn).await
    }
}

impl AccountManagement for SqliteDatabase {
    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        users::fetch_user_account(user_id, &mut conn).await
    }
}

impl ProductCatalog for SqliteDatabase {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        products::fetch_product(product_id, &mut conn).await
    }
}

impl PaymentGatewayDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::insert_order(order, &mut conn).await
    }

    async fn set_payment_payload(&self, order_no: &OrderNo, payload: &str) -> Result<Order, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let updated = orders::set_payment_payload(order_no, payload, Utc::now(), &mut tx).await?;
        let order = match updated {
            Some(order) => order,
            None => {
                let existing = orders::fetch_order_by_order_no(order_no, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
                return Err(PaymentGatewayError::InvalidStatusTransition {
                    order_no: order_no.clone(),
                    from: existing.status,
                    to: OrderStatusType::NotPaid,
                });
            },
        };
        tx.commit().await?;
        Ok(order)
    }

    async fn close_order(&self, order_no: &OrderNo) -> Result<CloseOrderResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let closed =
            orders::transition_status(order_no, OrderStatusType::NotPaid, OrderStatusType::Closed, Utc::now(), &mut tx)
                .await?;
        let result = match closed {
            Some(order) => CloseOrderResult::Closed(order),
            None => {
                let existing = orders::fetch_order_by_order_no(order_no, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
                match existing.status {
                    OrderStatusType::Closed => CloseOrderResult::AlreadyClosed(existing),
                    from => {
                        return Err(PaymentGatewayError::InvalidStatusTransition {
                            order_no: order_no.clone(),
                            from,
                            to: OrderStatusType::Closed,
                        })
                    },
                }
            },
        };
        tx.commit().await?;
        Ok(result)
    }

    async fn apply_payment(
        &self,
        order_no: &OrderNo,
        payment: NewPaymentRecord,
    ) -> Result<ApplyPaymentResult, PaymentGatewayError> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let updated =
            orders::transition_status(order_no, OrderStatusType::NotPaid, OrderStatusType::Success, now, &mut tx)
                .await?;
        let order = match updated {
            Some(order) => order,
            None => {
                // Nothing has been written, so dropping `tx` here is a plain rollback
                let existing = orders::fetch_order_by_order_no(order_no, &mut tx)
                    .await?
                    .ok_or_else(|| PaymentGatewayError::OrderNotFound(order_no.clone()))?;
                return match existing.status {
                    OrderStatusType::Success => {
                        debug!("🗃️ Order {order_no} is already paid. No action to take");
                        Ok(ApplyPaymentResult::AlreadyApplied(existing))
                    },
                    from => Err(PaymentGatewayError::InvalidStatusTransition {
                        order_no: order_no.clone(),
                        from,
                        to: OrderStatusType::Success,
                    }),
                };
            },
        };
        let account = users::credit_balance(order.user_id, order.add_points, now, &mut tx).await?;
        let record = payments::insert_payment_record(payment, &mut tx).await?;
        let single_purchase = match order.product_snapshot() {
            Some(product) => product.product_type.is_single_purchase(),
            None => {
                warn!("🗃️ Order {order_no} has an unreadable product snapshot. Using the live catalog entry instead.");
                products::fetch_product(order.product_id, &mut tx)
                    .await?
                    .map(|p| p.product_type.is_single_purchase())
                    .unwrap_or(false)
            },
        };
        if single_purchase {
            activities::insert_recharge_activity(order.user_id, order.product_id, &order.order_no, &mut tx).await?;
        }
        tx.commit().await?;
        debug!(
            "🗃️ Order {order_no} applied. Transaction {} recorded and user #{} credited with {} points",
            record.transaction_id, account.id, order.add_points
        );
        Ok(ApplyPaymentResult::Applied { order, account })
    }

    async fn has_blocking_purchase(&self, user_id: i64, product_id: i64) -> Result<bool, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        if orders::has_live_order(user_id, product_id, &mut conn).await? {
            return Ok(true);
        }
        activities::activity_exists(user_id, product_id, &mut conn).await
    }

    async fn delete_closed_orders_expired_before(&self, cutoff: DateTime<Utc>) -> Result<u64, PaymentGatewayError> {
        let mut conn = self.pool.acquire().await?;
        orders::delete_closed_orders_expired_before(cutoff, &mut conn).await
    }

    async fn close(&mut self) -> Result<(), PaymentGatewayError> {
        self.pool.close().await;
        Ok(())
    }
}
