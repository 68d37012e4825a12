use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{NewOrder, Order, PaymentMethod, Product},
    engine_api::config::FlowConfig,
    helpers::new_order_no,
    locks::{lock_names, NamedLocks},
    traits::{PaymentGatewayDatabase, PaymentProvider, ProviderOrderRequest},
    OrderFlowError,
    ProviderRegistry,
};

/// `OrderIssuanceApi` hands out payable orders.
///
/// For any (user, product, method) tuple there is at most one `NOT_PAID` order. Issuance for a user is serialised by
/// the `issue:{user_id}` lock, so concurrent requests from the same user either get the same order or a busy error.
pub struct OrderIssuanceApi<B> {
    db: B,
    locks: NamedLocks,
    providers: ProviderRegistry,
    config: FlowConfig,
}

impl<B> Debug for OrderIssuanceApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderIssuanceApi ({:?})", self.providers)
    }
}

impl<B> OrderIssuanceApi<B> {
    pub fn new(db: B, locks: NamedLocks, providers: ProviderRegistry, config: FlowConfig) -> Self {
        Self { db, locks, providers, config }
    }
}

impl<B> OrderIssuanceApi<B>
where B: PaymentGatewayDatabase
{
    /// Returns the payable order for `user_id`, `product_id` and `method`, creating it if necessary.
    ///
    /// * An existing, unexpired `NOT_PAID` order is returned unchanged, so clients may retry freely. If an earlier
    ///   attempt never obtained a payment payload, one is requested now.
    /// * An existing order that has expired but not yet been reconciled cannot be re-issued. The call fails with the
    ///   retryable [`OrderFlowError::OrderPendingReconciliation`].
    /// * Single-purchase products are refused if the user already has a live order or an activity entry for them.
    /// * Otherwise a new order is minted with a snapshot of the product, and the provider is asked for a payload.
    ///
    /// If the provider call fails, the new order stays in the ledger as `NOT_PAID` without a payload and the provider
    /// error is returned. The reconciliation poller will close it if it is never paid.
    pub async fn issue_or_complete_order(
        &self,
        user_id: i64,
        product_id: i64,
        method: PaymentMethod,
    ) -> Result<Order, OrderFlowError> {
        let provider =
            self.providers.get(method).map_err(|_| OrderFlowError::UnsupportedPaymentMethod(method))?;
        self.locks
            .with_lock(&lock_names::issue(user_id), || async {
                self.issue_while_locked(user_id, product_id, method, provider.as_ref()).await
            })
            .await
    }

    async fn issue_while_locked(
        &self,
        user_id: i64,
        product_id: i64,
        method: PaymentMethod,
        provider: &dyn PaymentProvider,
    ) -> Result<Order, OrderFlowError> {
        let now = Utc::now();
        if let Some(existing) = self.db.fetch_unpaid_order(user_id, product_id, method).await? {
            if existing.is_expired(now) {
                info!(
                    "🧾️ Order {} for user #{user_id} expired at {}. It must be reconciled before a new one is issued",
                    existing.order_no, existing.expiration_time
                );
                return Err(OrderFlowError::OrderPendingReconciliation(existing.order_no));
            }
            if existing.payment_payload.is_some() {
                debug!("🧾️ Returning existing order {} to user #{user_id}", existing.order_no);
                return Ok(existing);
            }
            debug!("🧾️ Existing order {} has no payment payload yet. Requesting one", existing.order_no);
            let subject = existing.product_snapshot().map(|p| p.name).unwrap_or_else(|| existing.order_no.to_string());
            return self.request_payload(existing, &subject, provider).await;
        }

        let product = self.available_product(product_id).await?;
        if self.db.fetch_user_account(user_id).await?.is_none() {
            return Err(OrderFlowError::UserNotFound(user_id));
        }
        if product.product_type.is_single_purchase() && self.db.has_blocking_purchase(user_id, product_id).await? {
            info!("🧾️ User #{user_id} has already bought single-purchase product #{product_id}");
            return Err(OrderFlowError::DuplicatePurchase { user_id, product_id });
        }

        let expires_at = now + self.config.order_ttl;
        let new_order = NewOrder::for_product(new_order_no(), user_id, &product, method, now, expires_at)
            .map_err(crate::traits::PaymentGatewayError::from)?;
        let order = self.db.insert_order(new_order).await?;
        info!(
            "🧾️ Order {} issued to user #{user_id} for product #{product_id} ({}) via {method}",
            order.order_no, order.total
        );
        self.request_payload(order, &product.name, provider).await
    }

    async fn available_product(&self, product_id: i64) -> Result<Product, OrderFlowError> {
        let product = self.db.fetch_product(product_id).await?.ok_or(OrderFlowError::ProductNotFound(product_id))?;
        if !product.is_online() {
            return Err(OrderFlowError::ProductNotAvailable(product_id));
        }
        Ok(product)
    }

    async fn request_payload(
        &self,
        order: Order,
        subject: &str,
        provider: &dyn PaymentProvider,
    ) -> Result<Order, OrderFlowError> {
        let request = ProviderOrderRequest::for_order(&order, subject);
        let payload = match provider.create_payment(&request).await {
            Ok(payload) => payload,
            Err(e) => {
                warn!(
                    "🧾️ Could not obtain a payment payload for order {}: {e}. The order remains unpaid and will be \
                     reconciled",
                    order.order_no
                );
                return Err(e.into());
            },
        };
        let order = self.db.set_payment_payload(&order.order_no, &payload).await?;
        Ok(order)
    }
}
