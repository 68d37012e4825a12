use std::{future::Future, pin::Pin, time::Duration};

use log::*;
use mpg_engine::events::{EventHandlers, EventHooks, OrderClosedEvent, OrderPaidEvent};

use crate::data_objects::PaymentReceipt;

pub const RECEIPT_EVENT_BUFFER_SIZE: usize = 25;

/// Builds the handlers that run after an order changes state.
///
/// 1. OrderPaidEvent - The payment is logged and, if `webhook_url` is set, a [`PaymentReceipt`] is POSTed to it so
///    that the mailer can send the customer a receipt. Delivery failures are logged and otherwise ignored; the payment
///    itself has already been committed.
/// 2. OrderClosedEvent - Logged.
pub fn create_receipt_handlers(webhook_url: Option<String>, timeout: Duration) -> EventHandlers {
    let mut hooks = EventHooks::default();
    let client = reqwest::Client::builder().timeout(timeout).build().unwrap_or_default();
    // --- On OrderPaid Handler ---
    hooks.on_order_paid(move |ev| {
        let receipt = receipt_for(&ev);
        info!(
            "🧾️ Order {} paid by user {} ({}). {} points credited. Transaction {}",
            receipt.order_no, receipt.user_id, receipt.amount, receipt.add_points, receipt.transaction_id
        );
        let Some(url) = webhook_url.clone() else {
            return no_op();
        };
        let client = client.clone();
        Box::pin(async move {
            match client.post(&url).json(&receipt).send().await.and_then(|r| r.error_for_status()) {
                Ok(_) => debug!("🧾️ Receipt for order {} delivered", receipt.order_no),
                Err(e) => warn!("🧾️ Could not deliver the receipt for order {}. {e}", receipt.order_no),
            }
        })
    });
    // --- On OrderClosed Handler ---
    hooks.on_order_closed(move |ev: OrderClosedEvent| {
        let order = ev.order;
        info!("🧾️ Order {} for user {} was closed without payment", order.order_no, order.user_id);
        no_op()
    });
    EventHandlers::new(RECEIPT_EVENT_BUFFER_SIZE, hooks)
}

pub fn receipt_for(ev: &OrderPaidEvent) -> PaymentReceipt {
    let product_name =
        ev.order.product_snapshot().map(|p| p.name).unwrap_or_else(|| format!("#{}", ev.order.product_id));
    PaymentReceipt {
        order_no: ev.order.order_no.clone(),
        user_id: ev.account.id,
        user_name: ev.account.user_name.clone(),
        email: ev.account.email.clone(),
        product_name,
        amount: ev.order.total.to_major_string(),
        add_points: ev.order.add_points,
        transaction_id: ev.transaction_id.clone(),
    }
}

fn no_op() -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async {})
}

#[cfg(test)]
mod test {
    use mpg_engine::{
        db_types::{PaymentMethod, ProductType},
        test_utils::TestHarness,
    };

    use super::*;

    #[actix_web::test]
    async fn receipt_carries_the_snapshot_and_the_account() {
        let h = TestHarness::new().await;
        let user = h.user("alice").await;
        let product = h.product(1999, 200, ProductType::Recharge).await;
        let order = h.issuance.issue_or_complete_order(user.id, product.id, PaymentMethod::Alipay).await.unwrap();
        let ev = OrderPaidEvent::new(order.clone(), user.clone(), "ali-tx-9".to_string());
        let receipt = receipt_for(&ev);
        assert_eq!(receipt.order_no, order.order_no);
        assert_eq!(receipt.product_name, product.name);
        assert_eq!(receipt.amount, "19.99");
        assert_eq!(receipt.add_points, 200);
        assert_eq!(receipt.user_name, "alice");
        assert_eq!(receipt.transaction_id, "ali-tx-9");
        h.tear_down().await;
    }
}
