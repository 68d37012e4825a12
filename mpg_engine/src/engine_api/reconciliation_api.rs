use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewPaymentRecord, Order, OrderNo, OrderStatusType, PaymentMethod},
    engine_api::{config::FlowConfig, settlement::OrderSettlement},
    locks::{lock_names, NamedLocks},
    order_objects::{OrderQueryFilter, ReconcileOutcome, ReconciliationReport},
    traits::{CallbackError, PaymentGatewayDatabase, PaymentProvider, ProviderError, ProviderTradeQuery, TradeStatus},
    OrderFlowError,
    ProviderRegistry,
};

/// `ReconciliationApi` drives orders whose callback never arrived to a terminal state, and cleans up old orders.
///
/// Provider queries are made without holding any order lock. Local transitions go through [`OrderSettlement`], so a
/// callback that lands in the middle of a sweep is never applied twice and never overwritten by a close.
pub struct ReconciliationApi<B> {
    db: B,
    locks: NamedLocks,
    providers: ProviderRegistry,
    settlement: OrderSettlement<B>,
    config: FlowConfig,
}

impl<B> Debug for ReconciliationApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReconciliationApi ({:?})", self.providers)
    }
}

impl<B> ReconciliationApi<B> {
    pub fn new(
        db: B,
        locks: NamedLocks,
        providers: ProviderRegistry,
        settlement: OrderSettlement<B>,
        config: FlowConfig,
    ) -> Self {
        Self { db, locks, providers, settlement, config }
    }
}

impl<B> ReconciliationApi<B>
where B: PaymentGatewayDatabase
{
    /// One reconciliation pass for `method`, under the `reconcile:{method}` job lock.
    ///
    /// Every `NOT_PAID` order that has passed its expiration time and was created more than the grace window ago is
    /// checked with the provider. Orders the user can still pay are never touched. A failure on one order is logged
    /// and recorded in the report; the sweep carries on with the next one.
    pub async fn reconcile_method(&self, method: PaymentMethod) -> Result<ReconciliationReport, OrderFlowError> {
        let provider =
            self.providers.get(method).map_err(|_| OrderFlowError::UnsupportedPaymentMethod(method))?;
        self.locks
            .with_lock(&lock_names::reconcile(method), || async {
                let now = Utc::now();
                let query = OrderQueryFilter::default()
                    .with_status(OrderStatusType::NotPaid)
                    .with_pay_type(method)
                    .created_before(now - self.config.reconcile_grace)
                    .expired_before(now);
                let orders = self.db.search_orders(query).await?;
                let mut report = ReconciliationReport { examined: orders.len(), ..Default::default() };
                for order in orders {
                    let order_no = order.order_no.clone();
                    match self.reconcile_with(provider.as_ref(), order).await {
                        Ok(ReconcileOutcome::Settled) => report.settled.push(order_no),
                        Ok(ReconcileOutcome::Closed) => report.closed.push(order_no),
                        Ok(ReconcileOutcome::LeftPending) => report.left_pending.push(order_no),
                        Ok(ReconcileOutcome::AlreadyTerminal) => {},
                        Err(e) => {
                            error!("🔍️ Could not reconcile {method} order {order_no}: {e}");
                            report.failed.push(order_no);
                        },
                    }
                }
                Ok::<_, OrderFlowError>(report)
            })
            .await
    }

    /// Reconciles a single order immediately, regardless of its age. Useful for manual incident recovery.
    pub async fn reconcile_order(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, OrderFlowError> {
        let order = self
            .db
            .fetch_order_by_order_no(order_no)
            .await?
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))?;
        if order.status.is_terminal() {
            return Ok(ReconcileOutcome::AlreadyTerminal);
        }
        let provider =
            self.providers.get(order.pay_type).map_err(|_| OrderFlowError::UnsupportedPaymentMethod(order.pay_type))?;
        self.reconcile_with(provider.as_ref(), order).await
    }

    /// Deletes `CLOSED` orders whose expiration time is older than the retention window, under the `janitor` lock.
    /// Returns the number of orders removed.
    pub async fn purge_stale_orders(&self) -> Result<u64, OrderFlowError> {
        self.locks
            .with_lock(lock_names::JANITOR, || async {
                let cutoff = Utc::now() - self.config.retention;
                let deleted = self.db.delete_closed_orders_expired_before(cutoff).await?;
                if deleted == 0 {
                    debug!("🧹️ No closed orders older than {cutoff}");
                } else {
                    info!("🧹️ Deleted {deleted} closed orders that expired before {cutoff}");
                }
                Ok::<_, OrderFlowError>(deleted)
            })
            .await
    }

    async fn reconcile_with(
        &self,
        provider: &dyn PaymentProvider,
        order: Order,
    ) -> Result<ReconcileOutcome, OrderFlowError> {
        let order_no = &order.order_no;
        let trade = match provider.query_order(order_no).await {
            Ok(trade) => trade,
            Err(ProviderError::Timeout(e)) => {
                info!("🔍️ Query for order {order_no} timed out ({e}). Will try again next pass");
                return Ok(ReconcileOutcome::LeftPending);
            },
            Err(e) => return Err(e.into()),
        };
        trace!("🔍️ Provider reports {} for order {order_no}", trade.trade_state);
        match trade.status {
            TradeStatus::NotFound => {
                debug!("🔍️ Provider has no record of order {order_no}. Closing it");
                self.settlement.close_locally(order_no).await
            },
            TradeStatus::NotPaid | TradeStatus::Closed => {
                self.close_on_provider(provider, order_no).await?;
                self.settlement.close_locally(order_no).await
            },
            TradeStatus::Success => {
                let payment = payment_from_query(&order, &trade, provider.method())?;
                let result = self.settlement.settle_success(order_no, payment).await?;
                if result.is_new() {
                    info!("🔍️ Order {order_no} was paid but its callback never arrived. It has now been applied");
                    Ok(ReconcileOutcome::Settled)
                } else {
                    Ok(ReconcileOutcome::AlreadyTerminal)
                }
            },
            TradeStatus::Pending => {
                debug!("🔍️ Order {order_no} is still {} at the provider. Leaving it", trade.trade_state);
                Ok(ReconcileOutcome::LeftPending)
            },
        }
    }

    /// Asks the provider to close the trade, retrying with doubling back-off up to the configured number of attempts.
    async fn close_on_provider(
        &self,
        provider: &dyn PaymentProvider,
        order_no: &OrderNo,
    ) -> Result<(), OrderFlowError> {
        let attempts = self.config.close_attempts.max(1);
        let mut delay = self.config.close_backoff;
        let mut attempt = 1;
        loop {
            match provider.close_order(order_no).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt >= attempts => {
                    error!(
                        "🔍️ Provider refused to close order {order_no} after {attempts} attempts: {e}. It stays unpaid \
                         until the next pass"
                    );
                    return Err(e.into());
                },
                Err(e) => {
                    warn!(
                        "🔍️ Close attempt {attempt}/{attempts} for order {order_no} failed: {e}. Retrying in {delay:?}"
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                },
            }
        }
    }
}

/// Builds the receipt for an order the provider reports as paid. The provider must report an amount, and it must
/// match the ledger.
fn payment_from_query(
    order: &Order,
    trade: &ProviderTradeQuery,
    method: PaymentMethod,
) -> Result<NewPaymentRecord, OrderFlowError> {
    let total = trade.total.ok_or_else(|| {
        ProviderError::MalformedResponse(format!("Paid trade for order {} has no amount", order.order_no))
    })?;
    if total != order.total {
        let order_no = order.order_no.clone();
        return Err(CallbackError::AmountMismatch { order_no, expected: order.total, actual: total }.into());
    }
    let transaction_id = trade.transaction_id.clone().ok_or_else(|| {
        ProviderError::MalformedResponse(format!("Paid trade for order {} has no transaction id", order.order_no))
    })?;
    Ok(NewPaymentRecord {
        order_no: order.order_no.clone(),
        transaction_id,
        pay_type: method,
        total,
        trade_state: trade.trade_state.clone(),
        payer: trade.payer.clone(),
        success_time: trade.success_time,
        raw_notification: trade.raw.clone(),
    })
}
