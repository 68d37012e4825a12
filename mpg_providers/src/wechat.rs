//! WeChat Pay native (QR code) checkout.
//!
//! Issuance places a native order and hands the returned `code_url` to the client, which renders it as a QR code.
//! Requests carry an `Authorization` header signed over `METHOD\nPATH\nTIMESTAMP\nNONCE\nBODY\n`. Notifications are
//! JSON posts whose `Wechatpay-*` headers sign `TIMESTAMP\nNONCE\nBODY\n`.
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use log::*;
use mpg_common::{MinorUnits, DEFAULT_CURRENCY_CODE};
use mpg_engine::{
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
use reqwest::{header, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    helpers::{cst, http_client, request_error},
    signing::{canonical_lines, nonce, sign, verify},
    WechatPayConfig,
};

pub const TIMESTAMP_HEADER: &str = "wechatpay-timestamp";
pub const NONCE_HEADER: &str = "wechatpay-nonce";
pub const SIGNATURE_HEADER: &str = "wechatpay-signature";
const AUTH_SCHEME: &str = "MPG-HMAC-SHA256";
/// Notifications whose timestamp is further than this from our clock are treated as replays
const REPLAY_WINDOW_SECS: i64 = 300;

#[derive(Debug, Clone)]
pub struct WechatPayProvider {
    config: WechatPayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Clone, Deserialize)]
struct Transaction {
    mchid: Option<String>,
    out_trade_no: String,
    transaction_id: Option<String>,
    trade_state: String,
    success_time: Option<DateTime<FixedOffset>>,
    payer: Option<Payer>,
    amount: Option<Amount>,
}

#[derive(Debug, Clone, Deserialize)]
struct Payer {
    openid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct Amount {
    total: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct NotificationEnvelope {
    id: String,
    event_type: String,
    resource: Transaction,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

impl WechatPayProvider {
    pub fn new(config: WechatPayConfig) -> Result<Self, ProviderError> {
        if config.api_secret.is_empty() {
            warn!("💳️ No WeChat Pay API secret is configured. Every call will be rejected.");
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// The value of the `Authorization` header for a request.
    pub fn authorization(&self, method: &str, path: &str, body: &str) -> Result<String, ProviderError> {
        let timestamp = Utc::now().timestamp().to_string();
        let nonce = nonce();
        let message = canonical_lines(&[method, path, &timestamp, &nonce, body]);
        let signature = sign(self.config.api_secret.reveal(), &message)?;
        Ok(format!(
            "{AUTH_SCHEME} mchid=\"{}\",nonce_str=\"{nonce}\",timestamp=\"{timestamp}\",signature=\"{signature}\"",
            self.config.mch_id
        ))
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<(StatusCode, String), ProviderError> {
        let body = body.map(|b| b.to_string()).unwrap_or_default();
        let auth = self.authorization(method.as_str(), path, &body)?;
        let url = format!("{}{path}", self.config.base_url.trim_end_matches('/'));
        trace!("💳️ WeChat Pay {method} {path}");
        let mut request = self
            .client
            .request(method, url)
            .header(header::AUTHORIZATION, auth)
            .header(header::ACCEPT, "application/json");
        if !body.is_empty() {
            request = request.header(header::CONTENT_TYPE, "application/json").body(body);
        }
        let response = request.send().await.map_err(request_error)?;
        let status = response.status();
        let text = response.text().await.map_err(request_error)?;
        Ok((status, text))
    }
}

/// Maps WeChat Pay's `trade_state` onto the normalised states.
pub fn trade_status(state: &str) -> TradeStatus {
    match state {
        "SUCCESS" => TradeStatus::Success,
        "NOTPAY" | "PAYERROR" => TradeStatus::NotPaid,
        "CLOSED" | "REVOKED" => TradeStatus::Closed,
        _ => TradeStatus::Pending,
    }
}

fn api_error(status: StatusCode, body: &str) -> ProviderError {
    let e = serde_json::from_str::<ApiErrorBody>(body).unwrap_or_default();
    let code = if e.code.is_empty() { status.as_u16().to_string() } else { e.code };
    let message = if e.message.is_empty() { body.to_string() } else { e.message };
    ProviderError::Api { code, message }
}

fn error_code(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body).ok().map(|e| e.code)
}

fn trade_query(tx: Transaction, raw: String) -> ProviderTradeQuery {
    ProviderTradeQuery {
        status: trade_status(&tx.trade_state),
        trade_state: tx.trade_state,
        transaction_id: tx.transaction_id,
        total: tx.amount.map(|a| MinorUnits::from(a.total)),
        payer: tx.payer.and_then(|p| p.openid),
        success_time: tx.success_time.map(|t| t.with_timezone(&Utc)),
        raw,
    }
}

/// Interprets the response to a query-by-out-trade-no call.
pub fn parse_trade_query(status: StatusCode, body: &str) -> Result<ProviderTradeQuery, ProviderError> {
    if status == StatusCode::NOT_FOUND && error_code(body).as_deref() == Some("ORDER_NOT_EXIST") {
        return Ok(ProviderTradeQuery::not_found(body.to_string()));
    }
    if !status.is_success() {
        return Err(api_error(status, body));
    }
    let tx = serde_json::from_str::<Transaction>(body)
        .map_err(|e| ProviderError::MalformedResponse(format!("WeChat Pay trade could not be read. {e}")))?;
    Ok(trade_query(tx, body.to_string()))
}

#[async_trait]
impl PaymentProvider for WechatPayProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::WechatPay
    }

    fn merchant_identity(&self) -> &str {
        self.config.mch_id.as_str()
    }

    async fn create_payment(&self, request: &ProviderOrderRequest) -> Result<String, ProviderError> {
        #[derive(Deserialize)]
        struct NativeResponse {
            code_url: String,
        }
        let body = json!({
            "appid": self.config.app_id,
            "mchid": self.config.mch_id,
            "description": request.subject,
            "out_trade_no": request.order_no.as_str(),
            "time_expire": request.expires_at.with_timezone(&cst()).to_rfc3339(),
            "notify_url": self.config.notify_url,
            "amount": { "total": request.total.value(), "currency": DEFAULT_CURRENCY_CODE },
        });
        let (status, text) = self.send(Method::POST, "/v3/pay/transactions/native", Some(body)).await?;
        if !status.is_success() {
            return Err(api_error(status, &text));
        }
        let response = serde_json::from_str::<NativeResponse>(&text)
            .map_err(|e| ProviderError::MalformedResponse(format!("WeChat Pay returned no code_url. {e}")))?;
        debug!("💳️ WeChat Pay native order placed for {}", request.order_no);
        Ok(response.code_url)
    }

    async fn query_order(&self, order_no: &OrderNo) -> Result<ProviderTradeQuery, ProviderError> {
        let path = format!("/v3/pay/transactions/out-trade-no/{order_no}?mchid={}", self.config.mch_id);
        let (status, text) = self.send(Method::GET, &path, None).await?;
        parse_trade_query(status, &text)
    }

    async fn close_order(&self, order_no: &OrderNo) -> Result<(), ProviderError> {
        let path = format!("/v3/pay/transactions/out-trade-no/{order_no}/close");
        let (status, text) = self.send(Method::POST, &path, Some(json!({ "mchid": self.config.mch_id }))).await?;
        if status.is_success() {
            info!("💳️ WeChat Pay trade for order {order_no} closed");
            return Ok(());
        }
        match error_code(&text).as_deref() {
            Some("ORDER_CLOSED") => {
                debug!("💳️ WeChat Pay trade for order {order_no} was already closed");
                Ok(())
            },
            Some("ORDER_NOT_EXIST") => {
                debug!("💳️ WeChat Pay has no trade for order {order_no}. Nothing to close");
                Ok(())
            },
            _ => Err(api_error(status, &text)),
        }
    }

    fn verify_notification(&self, notification: &RawNotification) -> Result<VerifiedNotification, CallbackError> {
        let header = |name: &str| {
            notification
                .header(name)
                .ok_or_else(|| CallbackError::InvalidSignature(format!("WeChat Pay notification has no {name} header")))
        };
        let timestamp = header(TIMESTAMP_HEADER)?;
        let nonce = header(NONCE_HEADER)?;
        let signature = header(SIGNATURE_HEADER)?;
        let message = canonical_lines(&[timestamp, nonce, &notification.body]);
        if !verify(self.config.notify_secret.reveal(), &message, signature) {
            return Err(CallbackError::InvalidSignature("WeChat Pay notification signature does not match".into()));
        }
        let sent_at = timestamp
            .parse::<i64>()
            .map_err(|e| CallbackError::Malformed(format!("Invalid notification timestamp '{timestamp}'. {e}")))?;
        let age = Utc::now().timestamp() - sent_at;
        if age.abs() > REPLAY_WINDOW_SECS {
            return Err(CallbackError::Replay(format!("Notification was signed {age}s ago")));
        }
        let envelope = serde_json::from_str::<NotificationEnvelope>(&notification.body)
            .map_err(|e| CallbackError::Malformed(format!("WeChat Pay notification could not be read. {e}")))?;
        trace!("💳️ WeChat Pay event {} ({})", envelope.id, envelope.event_type);
        let tx = envelope.resource;
        let order_no = OrderNo::new(tx.out_trade_no.clone());
        let merchant_id = tx.mchid.clone().unwrap_or_default();
        let total = tx
            .amount
            .as_ref()
            .map(|a| MinorUnits::from(a.total))
            .ok_or_else(|| CallbackError::Malformed(format!("Notification for {order_no} has no amount")))?;
        let transaction_id = tx
            .transaction_id
            .clone()
            .ok_or_else(|| CallbackError::Malformed(format!("Notification for {order_no} has no transaction id")))?;
        let trade = trade_query(tx, notification.body.clone());
        Ok(VerifiedNotification {
            order_no,
            transaction_id,
            total,
            merchant_id,
            trade_status: trade.status,
            trade_state: trade.trade_state,
            payer: trade.payer,
            success_time: trade.success_time,
            raw: trade.raw,
        })
    }

    fn acknowledgement(&self, accepted: bool, reason: Option<&str>) -> CallbackAck {
        let body = if accepted {
            json!({ "code": "SUCCESS" })
        } else {
            json!({ "code": "FAIL", "message": reason.unwrap_or("failed") })
        };
        let status = if accepted { 200 } else { 500 };
        CallbackAck { status, content_type: "application/json", body: body.to_string() }
    }
}

#[cfg(test)]
mod test {
    use mpg_common::Secret;

    use super::*;

    fn provider() -> WechatPayProvider {
        let config = WechatPayConfig {
            app_id: "wx0000000000000001".into(),
            mch_id: "1600000001".into(),
            api_secret: Secret::new("api-secret".into()),
            notify_secret: Secret::new("notify-secret".into()),
            notify_url: "https://mpg.example.com/notify/WX".into(),
            ..Default::default()
        };
        WechatPayProvider::new(config).unwrap()
    }

    fn paid_body(total: i64) -> String {
        json!({
            "id": "EV-2024120201",
            "create_time": "2024-12-02T09:30:05+08:00",
            "event_type": "TRANSACTION.SUCCESS",
            "resource": {
                "mchid": "1600000001",
                "appid": "wx0000000000000001",
                "out_trade_no": "order_12345678901234567890",
                "transaction_id": "4200002024120200001",
                "trade_state": "SUCCESS",
                "success_time": "2024-12-02T09:30:00+08:00",
                "payer": { "openid": "oUpF8uMuAJO_M2pxb1Q9zNjWeS6o" },
                "amount": { "total": total, "payer_total": total, "currency": "CNY" }
            }
        })
        .to_string()
    }

    fn signed(secret: &str, timestamp: i64, body: String) -> RawNotification {
        let ts = timestamp.to_string();
        let signature = sign(secret, &canonical_lines(&[&ts, "n0nce", &body])).unwrap();
        RawNotification::new(body)
            .with_header("Wechatpay-Timestamp", &ts)
            .with_header("Wechatpay-Nonce", "n0nce")
            .with_header("Wechatpay-Signature", &signature)
    }

    #[test]
    fn genuine_notifications_verify() {
        let p = provider();
        let n = p.verify_notification(&signed("notify-secret", Utc::now().timestamp(), paid_body(999))).unwrap();
        assert_eq!(n.order_no.as_str(), "order_12345678901234567890");
        assert_eq!(n.total, MinorUnits::from(999));
        assert_eq!(n.trade_status, TradeStatus::Success);
        assert_eq!(n.merchant_id, p.merchant_identity());
        assert_eq!(n.transaction_id, "4200002024120200001");
        assert_eq!(n.payer.as_deref(), Some("oUpF8uMuAJO_M2pxb1Q9zNjWeS6o"));
    }

    #[test]
    fn forged_and_stale_notifications_are_rejected() {
        let p = provider();
        let now = Utc::now().timestamp();
        let forged = signed("guess", now, paid_body(999));
        assert!(matches!(p.verify_notification(&forged), Err(CallbackError::InvalidSignature(_))));

        let mut tampered = signed("notify-secret", now, paid_body(999));
        tampered.body = paid_body(1);
        assert!(matches!(p.verify_notification(&tampered), Err(CallbackError::InvalidSignature(_))));

        let stale = signed("notify-secret", now - 10 * 60, paid_body(999));
        assert!(matches!(p.verify_notification(&stale), Err(CallbackError::Replay(_))));

        let unsigned = RawNotification::new(paid_body(999));
        assert!(matches!(p.verify_notification(&unsigned), Err(CallbackError::InvalidSignature(_))));
    }

    #[test]
    fn query_responses() {
        let missing = r#"{"code":"ORDER_NOT_EXIST","message":"order does not exist"}"#;
        let q = parse_trade_query(StatusCode::NOT_FOUND, missing).unwrap();
        assert_eq!(q.status, TradeStatus::NotFound);

        let waiting = r#"{"mchid":"1600000001","out_trade_no":"order_1","trade_state":"NOTPAY"}"#;
        let q = parse_trade_query(StatusCode::OK, waiting).unwrap();
        assert_eq!(q.status, TradeStatus::NotPaid);
        assert!(q.total.is_none());

        let paying = r#"{"out_trade_no":"order_1","trade_state":"USERPAYING","amount":{"total":999}}"#;
        assert_eq!(parse_trade_query(StatusCode::OK, paying).unwrap().status, TradeStatus::Pending);

        let denied = r#"{"code":"SIGN_ERROR","message":"bad signature"}"#;
        let err = parse_trade_query(StatusCode::UNAUTHORIZED, denied).unwrap_err();
        assert!(matches!(err, ProviderError::Api { code, .. } if code == "SIGN_ERROR"));
    }

    #[test]
    fn authorization_header_is_signed() {
        let p = provider();
        let auth = p.authorization("GET", "/v3/pay/transactions/out-trade-no/order_1?mchid=1600000001", "").unwrap();
        assert!(auth.starts_with("MPG-HMAC-SHA256 mchid=\"1600000001\",nonce_str=\""));
        assert!(auth.contains("signature=\""));
    }

    #[test]
    fn acknowledgements() {
        let p = provider();
        let ok = p.acknowledgement(true, None);
        assert_eq!((ok.status, ok.body.as_str()), (200, r#"{"code":"SUCCESS"}"#));
        let fail = p.acknowledgement(false, Some("busy"));
        assert_eq!(fail.status, 500);
        assert!(fail.body.contains("busy"));
    }
}
