use std::fmt::Debug;

use crate::{
    db_types::{Order, OrderNo, PaymentRecord},
    order_objects::OrderWithPayment,
    traits::OrderManagement,
    OrderFlowError,
};

/// Read-only access to orders, scoped to their owner.
pub struct OrderQueryApi<B> {
    db: B,
}

impl<B> Debug for OrderQueryApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderQueryApi")
    }
}

impl<B> OrderQueryApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> OrderQueryApi<B>
where B: OrderManagement
{
    /// Fetches `order_no` if it belongs to `user_id`. Orders owned by somebody else are reported as not found.
    pub async fn order_for_user(&self, user_id: i64, order_no: &OrderNo) -> Result<Order, OrderFlowError> {
        self.db
            .fetch_order_by_order_no(order_no)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| OrderFlowError::OrderNotFound(order_no.clone()))
    }

    /// The receipt for `order_no`, if the order belongs to `user_id` and has been paid.
    pub async fn payment_for_user(
        &self,
        user_id: i64,
        order_no: &OrderNo,
    ) -> Result<Option<PaymentRecord>, OrderFlowError> {
        let order = self.order_for_user(user_id, order_no).await?;
        let payment = self.db.fetch_payment_for_order(&order.order_no).await?;
        Ok(payment)
    }

    pub async fn order_with_payment(
        &self,
        user_id: i64,
        order_no: &OrderNo,
    ) -> Result<OrderWithPayment, OrderFlowError> {
        let order = self.order_for_user(user_id, order_no).await?;
        let payment = self.db.fetch_payment_for_order(&order.order_no).await?;
        Ok(OrderWithPayment { order, payment })
    }
}
