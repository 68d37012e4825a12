use crate::{
    db_types::{Order, OrderNo, PaymentMethod, PaymentRecord},
    order_objects::OrderQueryFilter,
    traits::PaymentGatewayError,
};

/// The `OrderManagement` trait defines the behaviour for querying information about orders in the database backend.
#[allow(async_fn_in_trait)]
pub trait OrderManagement {
    async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, PaymentGatewayError>;

    async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;

    /// Fetches orders according to the criteria in `query`, oldest first.
    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError>;

    /// The payable order for the (user, product, method) tuple, if there is one.
    async fn fetch_unpaid_order(
        &self,
        user_id: i64,
        product_id: i64,
        method: PaymentMethod,
    ) -> Result<Option<Order>, PaymentGatewayError> {
        let query = OrderQueryFilter::default()
            .with_user_id(user_id)
            .with_product_id(product_id)
            .with_pay_type(method)
            .with_status(crate::db_types::OrderStatusType::NotPaid);
        let mut orders = self.search_orders(query).await?;
        Ok(orders.pop())
    }

    async fn fetch_payment_for_order(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>, PaymentGatewayError>;
}
