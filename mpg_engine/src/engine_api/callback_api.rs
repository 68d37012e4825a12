use std::fmt::Debug;

use log::*;

use crate::{
    db_types::{Order, PaymentMethod},
    engine_api::settlement::OrderSettlement,
    traits::{
        ApplyPaymentResult,
        CallbackAck,
        CallbackError,
        PaymentGatewayDatabase,
        PaymentProvider,
        RawNotification,
        TradeStatus,
        VerifiedNotification,
    },
    OrderFlowError,
    ProviderRegistry,
};

/// `PaymentCallbackApi` decides whether to believe an inbound "this order is paid" notification, and applies it.
///
/// Pipeline: authenticate, cross-check the business fields against the ledger, then hand over to
/// [`OrderSettlement::settle_success`], which takes the order lock and applies the payment exactly once.
pub struct PaymentCallbackApi<B> {
    providers: ProviderRegistry,
    settlement: OrderSettlement<B>,
}

impl<B> Debug for PaymentCallbackApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PaymentCallbackApi ({:?})", self.providers)
    }
}

impl<B> PaymentCallbackApi<B> {
    pub fn new(providers: ProviderRegistry, settlement: OrderSettlement<B>) -> Self {
        Self { providers, settlement }
    }
}

impl<B> PaymentCallbackApi<B>
where B: PaymentGatewayDatabase
{
    /// Processes a notification and returns the acknowledgement the provider expects.
    ///
    /// The success acknowledgement is only produced once the payment has been committed (or had already been
    /// committed by an earlier delivery). Every other outcome produces the failure acknowledgement so that the
    /// provider keeps re-delivering. The only error is an unregistered payment method, for which no provider-specific
    /// reply exists.
    pub async fn handle_notification(
        &self,
        method: PaymentMethod,
        notification: &RawNotification,
    ) -> Result<CallbackAck, OrderFlowError> {
        let provider =
            self.providers.get(method).map_err(|_| OrderFlowError::UnsupportedPaymentMethod(method))?;
        let ack = match self.process(provider.as_ref(), notification).await {
            Ok(result) => {
                trace!("📨️ Notification for order {} accepted", result.order().order_no);
                provider.acknowledgement(true, None)
            },
            Err(e) => {
                match &e {
                    OrderFlowError::Callback(_) => warn!("📨️ {method} notification rejected: {e}"),
                    e if e.is_retryable() => info!("📨️ {method} notification deferred: {e}"),
                    _ => error!("📨️ {method} notification could not be applied: {e}"),
                }
                provider.acknowledgement(false, Some(&e.to_string()))
            },
        };
        Ok(ack)
    }

    /// Verifies and applies a notification, returning the ledger outcome.
    pub async fn process_notification(
        &self,
        method: PaymentMethod,
        notification: &RawNotification,
    ) -> Result<ApplyPaymentResult, OrderFlowError> {
        let provider =
            self.providers.get(method).map_err(|_| OrderFlowError::UnsupportedPaymentMethod(method))?;
        self.process(provider.as_ref(), notification).await
    }

    async fn process(
        &self,
        provider: &dyn PaymentProvider,
        notification: &RawNotification,
    ) -> Result<ApplyPaymentResult, OrderFlowError> {
        let verified = provider.verify_notification(notification)?;
        debug!(
            "📨️ Authenticated {} notification for order {} ({})",
            provider.method(),
            verified.order_no,
            verified.trade_state
        );
        let order = self
            .settlement
            .db()
            .fetch_order_by_order_no(&verified.order_no)
            .await?
            .ok_or_else(|| CallbackError::UnknownOrder(verified.order_no.clone()))?;
        cross_check(&order, &verified, provider)?;
        let payment = verified.payment_record(provider.method());
        self.settlement.settle_success(&order.order_no, payment).await
    }
}

/// Hard-rejects any notification whose business fields disagree with the ledger or this deployment.
fn cross_check(
    order: &Order,
    notification: &VerifiedNotification,
    provider: &dyn PaymentProvider,
) -> Result<(), CallbackError> {
    if order.pay_type != provider.method() {
        return Err(CallbackError::MethodMismatch {
            order_no: order.order_no.clone(),
            expected: order.pay_type,
            received: provider.method(),
        });
    }
    if notification.total != order.total {
        return Err(CallbackError::AmountMismatch {
            order_no: order.order_no.clone(),
            expected: order.total,
            actual: notification.total,
        });
    }
    if notification.merchant_id != provider.merchant_identity() {
        return Err(CallbackError::MerchantMismatch {
            expected: provider.merchant_identity().to_string(),
            actual: notification.merchant_id.clone(),
        });
    }
    if notification.trade_status != TradeStatus::Success {
        return Err(CallbackError::TradeNotSuccessful {
            order_no: order.order_no.clone(),
            state: notification.trade_state.clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use chrono::Utc;
    use mpg_common::MinorUnits;

    use super::*;
    use crate::{
        db_types::{OrderNo, OrderStatusType},
        test_utils::MockProvider,
    };

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: 1,
            order_no: OrderNo::from("order_1"),
            user_id: 1,
            product_id: 1,
            pay_type: PaymentMethod::Alipay,
            total: MinorUnits::from(999),
            add_points: 50,
            product_info: "{}".into(),
            payment_payload: None,
            status: OrderStatusType::NotPaid,
            expiration_time: now,
            created_at: now,
            updated_at: now,
        }
    }

    fn notification() -> VerifiedNotification {
        VerifiedNotification {
            order_no: OrderNo::from("order_1"),
            transaction_id: "tx1".into(),
            total: MinorUnits::from(999),
            merchant_id: "app-1".into(),
            trade_status: TradeStatus::Success,
            trade_state: "TRADE_SUCCESS".into(),
            payer: None,
            success_time: None,
            raw: String::new(),
        }
    }

    #[test]
    fn genuine_notification_passes() {
        let provider = MockProvider::new(PaymentMethod::Alipay, "app-1");
        assert!(cross_check(&order(), &notification(), &provider).is_ok());
    }

    #[test]
    fn mismatches_are_rejected() {
        let provider = MockProvider::new(PaymentMethod::Alipay, "app-1");
        let mut forged = notification();
        forged.total = MinorUnits::from(1);
        assert!(matches!(cross_check(&order(), &forged, &provider), Err(CallbackError::AmountMismatch { .. })));

        let mut other_merchant = notification();
        other_merchant.merchant_id = "app-2".into();
        assert!(matches!(
            cross_check(&order(), &other_merchant, &provider),
            Err(CallbackError::MerchantMismatch { .. })
        ));

        let mut waiting = notification();
        waiting.trade_status = TradeStatus::NotPaid;
        waiting.trade_state = "WAIT_BUYER_PAY".into();
        assert!(matches!(
            cross_check(&order(), &waiting, &provider),
            Err(CallbackError::TradeNotSuccessful { state, .. }) if state == "WAIT_BUYER_PAY"
        ));

        let wechat = MockProvider::new(PaymentMethod::WechatPay, "app-1");
        assert!(matches!(cross_check(&order(), &notification(), &wechat), Err(CallbackError::MethodMismatch { .. })));
    }
}
