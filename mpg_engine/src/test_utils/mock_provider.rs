use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::Utc;
use mpg_common::MinorUnits;
use serde::{Deserialize, Serialize};

use crate::{
    db_types::{OrderNo, PaymentMethod},
    traits::{
        CallbackAck,
        CallbackError,
        PaymentProvider,
        ProviderError,
        ProviderOrderRequest,
        ProviderTradeQuery,
        RawNotification,
        TradeStatus,
        VerifiedNotification,
    },
};

pub const MOCK_SECRET: u64 = 0x5eed;
const SIGNATURE_HEADER: &str = "x-mock-signature";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MockNotification {
    order_no: OrderNo,
    transaction_id: String,
    total: MinorUnits,
    merchant_id: String,
    trade_state: String,
}

#[derive(Debug, Clone)]
struct MockTrade {
    state: String,
    transaction_id: Option<String>,
    total: Option<MinorUnits>,
}

#[derive(Debug, Default)]
struct MockState {
    trades: HashMap<OrderNo, MockTrade>,
    timeouts: HashSet<OrderNo>,
    fail_create: bool,
    close_failures_remaining: u32,
    create_calls: u32,
    close_calls: u32,
}

/// A scriptable in-process payment provider. Clones share their state, so a test can keep one handle while the
/// registry holds another.
#[derive(Debug, Clone)]
pub struct MockProvider {
    method: PaymentMethod,
    merchant_id: String,
    state: Arc<Mutex<MockState>>,
}

impl MockProvider {
    pub fn new(method: PaymentMethod, merchant_id: &str) -> Self {
        Self { method, merchant_id: merchant_id.to_string(), state: Arc::new(Mutex::new(MockState::default())) }
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The provider now reports `order_no` as `state` (e.g. `SUCCESS`, `NOTPAY`, `CLOSED`, `USERPAYING`).
    pub fn set_trade(&self, order_no: &OrderNo, state: &str, transaction_id: Option<&str>, total: MinorUnits) {
        self.insert_trade(order_no, state, transaction_id, Some(total));
    }

    /// Like [`MockProvider::set_trade`], but the query response carries no amount.
    pub fn set_trade_without_amount(&self, order_no: &OrderNo, state: &str, transaction_id: Option<&str>) {
        self.insert_trade(order_no, state, transaction_id, None);
    }

    fn insert_trade(&self, order_no: &OrderNo, state: &str, transaction_id: Option<&str>, total: Option<MinorUnits>) {
        let trade = MockTrade { state: state.to_string(), transaction_id: transaction_id.map(String::from), total };
        self.state().trades.insert(order_no.clone(), trade);
    }

    pub fn set_query_timeout(&self, order_no: &OrderNo) {
        self.state().timeouts.insert(order_no.clone());
    }

    pub fn fail_create(&self, fail: bool) {
        self.state().fail_create = fail;
    }

    /// The next `n` close calls fail with a network error.
    pub fn fail_next_closes(&self, n: u32) {
        self.state().close_failures_remaining = n;
    }

    pub fn create_calls(&self) -> u32 {
        self.state().create_calls
    }

    pub fn close_calls(&self) -> u32 {
        self.state().close_calls
    }

    pub fn trade_state(&self, order_no: &OrderNo) -> Option<String> {
        self.state().trades.get(order_no).map(|t| t.state.clone())
    }

    pub fn signature_for(body: &str) -> String {
        let digest = body.bytes().fold(MOCK_SECRET, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        format!("{digest:016x}")
    }

    /// A correctly signed notification.
    pub fn notification(
        &self,
        order_no: &OrderNo,
        transaction_id: &str,
        total: MinorUnits,
        trade_state: &str,
    ) -> RawNotification {
        let body = serde_json::to_string(&MockNotification {
            order_no: order_no.clone(),
            transaction_id: transaction_id.to_string(),
            total,
            merchant_id: self.merchant_id.clone(),
            trade_state: trade_state.to_string(),
        })
        .unwrap_or_default();
        let signature = Self::signature_for(&body);
        RawNotification::new(body).with_header(SIGNATURE_HEADER, &signature)
    }

    fn status_for(state: &str) -> TradeStatus {
        match state {
            "SUCCESS" => TradeStatus::Success,
            "NOTPAY" => TradeStatus::NotPaid,
            "CLOSED" => TradeStatus::Closed,
            _ => TradeStatus::Pending,
        }
    }
}

#[async_trait]
impl PaymentProvider for MockProvider {
    fn method(&self) -> PaymentMethod {
        self.method
    }

    fn merchant_identity(&self) -> &str {
        self.merchant_id.as_str()
    }

    async fn create_payment(&self, request: &ProviderOrderRequest) -> Result<String, ProviderError> {
        let mut state = self.state();
        state.create_calls += 1;
        if state.fail_create {
            return Err(ProviderError::Network("mock provider is down".into()));
        }
        Ok(format!("mock://{}/pay/{}?total={}", self.method, request.order_no, request.total))
    }

    async fn query_order(&self, order_no: &OrderNo) -> Result<ProviderTradeQuery, ProviderError> {
        let state = self.state();
        if state.timeouts.contains(order_no) {
            return Err(ProviderError::Timeout(format!("query {order_no}")));
        }
        let result = match state.trades.get(order_no) {
            None => ProviderTradeQuery::not_found(String::new()),
            Some(trade) => ProviderTradeQuery {
                status: Self::status_for(&trade.state),
                trade_state: trade.state.clone(),
                transaction_id: trade.transaction_id.clone(),
                total: trade.total,
                payer: Some("mock-payer".into()),
                success_time: (trade.state == "SUCCESS").then(Utc::now),
                raw: format!("{trade:?}"),
            },
        };
        Ok(result)
    }

    async fn close_order(&self, order_no: &OrderNo) -> Result<(), ProviderError> {
        let mut state = self.state();
        state.close_calls += 1;
        if state.close_failures_remaining > 0 {
            state.close_failures_remaining -= 1;
            return Err(ProviderError::Network(format!("close {order_no} failed")));
        }
        if let Some(trade) = state.trades.get_mut(order_no) {
            trade.state = "CLOSED".into();
        }
        Ok(())
    }

    fn verify_notification(&self, notification: &RawNotification) -> Result<VerifiedNotification, CallbackError> {
        let signature = notification
            .header(SIGNATURE_HEADER)
            .ok_or_else(|| CallbackError::InvalidSignature("signature header is missing".into()))?;
        if signature != Self::signature_for(&notification.body) {
            return Err(CallbackError::InvalidSignature("signature does not match".into()));
        }
        let n: MockNotification =
            serde_json::from_str(&notification.body).map_err(|e| CallbackError::Malformed(e.to_string()))?;
        Ok(VerifiedNotification {
            trade_status: Self::status_for(&n.trade_state),
            order_no: n.order_no,
            transaction_id: n.transaction_id,
            total: n.total,
            merchant_id: n.merchant_id,
            trade_state: n.trade_state,
            payer: None,
            success_time: None,
            raw: notification.body.clone(),
        })
    }

    fn acknowledgement(&self, accepted: bool, _reason: Option<&str>) -> CallbackAck {
        if accepted {
            CallbackAck { status: 200, content_type: "text/plain", body: "success".into() }
        } else {
            CallbackAck { status: 400, content_type: "text/plain", body: "failure".into() }
        }
    }
}
