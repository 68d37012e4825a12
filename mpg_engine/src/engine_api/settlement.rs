//! The one place where orders leave `NOT_PAID`.
//!
//! Callbacks and the reconciliation poller both end up here, so a lost callback and a duplicated callback converge
//! on the same ledger state. Every transition runs under the per-order lock.
use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{NewPaymentRecord, OrderNo, OrderStatusType},
    events::{EventProducers, OrderClosedEvent, OrderPaidEvent},
    locks::{lock_names, NamedLocks},
    order_objects::ReconcileOutcome,
    traits::{ApplyPaymentResult, CloseOrderResult, PaymentGatewayDatabase},
    OrderFlowError,
};

#[derive(Clone)]
pub struct OrderSettlement<B> {
    db: B,
    locks: NamedLocks,
    producers: EventProducers,
}

impl<B> Debug for OrderSettlement<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderSettlement")
    }
}

impl<B> OrderSettlement<B> {
    pub fn new(db: B, locks: NamedLocks, producers: EventProducers) -> Self {
        Self { db, locks, producers }
    }

    pub fn db(&self) -> &B {
        &self.db
    }
}

impl<B> OrderSettlement<B>
where B: PaymentGatewayDatabase
{
    /// Applies a confirmed payment under the order lock.
    ///
    /// Re-applying an already successful order is a cheap no-op that reports [`ApplyPaymentResult::AlreadyApplied`].
    /// The order-paid hook fires only for the first application, and only after the ledger transaction commits.
    pub async fn settle_success(
        &self,
        order_no: &OrderNo,
        payment: NewPaymentRecord,
    ) -> Result<ApplyPaymentResult, OrderFlowError> {
        let transaction_id = payment.transaction_id.clone();
        let result = self
            .locks
            .with_lock(&lock_names::order(order_no), || async {
                self.db.apply_payment(order_no, payment).await.map_err(OrderFlowError::from)
            })
            .await?;
        match &result {
            ApplyPaymentResult::Applied { order, account } => {
                info!(
                    "💰️ Order {order_no} paid ({transaction_id}). User #{} credited with {} points",
                    account.id, order.add_points
                );
                let event = OrderPaidEvent::new(order.clone(), account.clone(), transaction_id);
                self.producers.publish_order_paid(event).await;
            },
            ApplyPaymentResult::AlreadyApplied(_) => {
                debug!("💰️ Order {order_no} had already been applied. Ignoring duplicate ({transaction_id})");
            },
        }
        Ok(result)
    }

    /// Closes an unpaid order locally, under the order lock.
    ///
    /// An order that reached `SUCCESS` while the caller was busy elsewhere (e.g. talking to the provider) is left
    /// untouched and reported as [`ReconcileOutcome::AlreadyTerminal`].
    pub async fn close_locally(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, OrderFlowError> {
        let result = self
            .locks
            .with_lock(&lock_names::order(order_no), || async {
                let order = self
                    .db
                    .fetch_order_by_order_no(order_no)
                    .await?
                    .ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))?;
                if order.status == OrderStatusType::Success {
                    return Ok(None);
                }
                let result = self.db.close_order(order_no).await?;
                Ok::<_, OrderFlowError>(Some(result))
            })
            .await?;
        match result {
            Some(CloseOrderResult::Closed(order)) => {
                info!("🔐️ Order {order_no} closed");
                self.producers.publish_order_closed(OrderClosedEvent::new(order)).await;
                Ok(ReconcileOutcome::Closed)
            },
            Some(CloseOrderResult::AlreadyClosed(_)) => Ok(ReconcileOutcome::AlreadyTerminal),
            None => {
                debug!("🔐️ Order {order_no} was paid before it could be closed. Leaving it alone");
                Ok(ReconcileOutcome::AlreadyTerminal)
            },
        }
    }
}
