use mockall::mock;
use mpg_engine::{
    db_types::{Order, OrderNo, PaymentRecord},
    order_objects::OrderQueryFilter,
    traits::{OrderManagement, PaymentGatewayError},
};

mock! {
    pub OrderManager {}
    impl OrderManagement for OrderManager {
        async fn fetch_order_by_order_no(&self, order_no: &OrderNo) -> Result<Option<Order>, PaymentGatewayError>;
        async fn fetch_order_by_id(&self, id: i64) -> Result<Option<Order>, PaymentGatewayError>;
        async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, PaymentGatewayError>;
        async fn fetch_payment_for_order(&self, order_no: &OrderNo) -> Result<Option<PaymentRecord>, PaymentGatewayError>;
    }
}
