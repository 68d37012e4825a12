//! Alipay computer-website ("page pay") checkout.
//!
//! Issuance needs no network call: the payable payload is a signed redirect URL to the Alipay gateway. Queries and
//! closes are signed form posts to the same gateway. Notifications arrive as form-encoded posts signed over the
//! sorted parameter string.
use std::{collections::BTreeMap, str::FromStr};

use async_trait::async_trait;
use chrono::Utc;
use log::*;
use mpg_common::MinorUnits;
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
use serde_json::{json, Value};
use url::Url;

use crate::{
    helpers::{format_cst_time, http_client, parse_cst_time, request_error},
    signing::{canonical_query, sign, verify},
    AlipayConfig,
};

const SUCCESS_CODE: &str = "10000";
const TRADE_NOT_EXIST: &str = "ACQ.TRADE_NOT_EXIST";
const TRADE_STATUS_ERROR: &str = "ACQ.TRADE_STATUS_ERROR";
const SIGN_TYPE: &str = "HMAC-SHA256";

#[derive(Debug, Clone)]
pub struct AlipayProvider {
    config: AlipayConfig,
    client: reqwest::Client,
}

impl AlipayProvider {
    pub fn new(config: AlipayConfig) -> Result<Self, ProviderError> {
        if config.app_secret.is_empty() {
            warn!("💳️ No Alipay app secret is configured. Every gateway call will be rejected.");
        }
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    /// The public and signed parameters of a gateway call.
    fn signed_params(
        &self,
        method: &str,
        biz_content: Value,
        extra: &[(&str, &str)],
    ) -> Result<BTreeMap<String, String>, ProviderError> {
        let mut params = BTreeMap::new();
        params.insert("app_id".to_string(), self.config.app_id.clone());
        params.insert("method".to_string(), method.to_string());
        params.insert("format".to_string(), "JSON".to_string());
        params.insert("charset".to_string(), "utf-8".to_string());
        params.insert("sign_type".to_string(), SIGN_TYPE.to_string());
        params.insert("timestamp".to_string(), format_cst_time(&Utc::now()));
        params.insert("version".to_string(), "1.0".to_string());
        params.insert("biz_content".to_string(), biz_content.to_string());
        for (k, v) in extra {
            params.insert(k.to_string(), v.to_string());
        }
        let signature = sign(self.config.app_secret.reveal(), &canonical_query(&params))?;
        params.insert("sign".to_string(), signature);
        Ok(params)
    }

    /// The signed redirect URL that takes the buyer to the Alipay checkout page.
    pub fn page_pay_url(&self, request: &ProviderOrderRequest) -> Result<String, ProviderError> {
        let biz = json!({
            "out_trade_no": request.order_no.as_str(),
            "total_amount": request.total.to_major_string(),
            "subject": request.subject,
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "time_expire": format_cst_time(&request.expires_at),
        });
        let mut urls = vec![("notify_url", self.config.notify_url.as_str())];
        if let Some(return_url) = &self.config.return_url {
            urls.push(("return_url", return_url.as_str()));
        }
        let params = self.signed_params("alipay.trade.page.pay", biz, &urls)?;
        let url = Url::parse_with_params(&self.config.gateway_url, params.iter())
            .map_err(|e| ProviderError::Configuration(format!("Invalid Alipay gateway url. {e}")))?;
        Ok(url.to_string())
    }

    async fn call(&self, method: &str, biz_content: Value) -> Result<Value, ProviderError> {
        let params = self.signed_params(method, biz_content, &[])?;
        trace!("💳️ Calling Alipay {method}");
        let response =
            self.client.post(&self.config.gateway_url).form(&params).send().await.map_err(request_error)?;
        let status = response.status();
        let body = response.text().await.map_err(request_error)?;
        if !status.is_success() {
            return Err(ProviderError::Api { code: status.as_u16().to_string(), message: body });
        }
        let json = serde_json::from_str::<Value>(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("Alipay {method} returned invalid JSON. {e}")))?;
        let key = format!("{}_response", method.replace('.', "_"));
        let inner = json.get(&key).cloned().ok_or_else(|| {
            ProviderError::MalformedResponse(format!("Alipay {method} response has no '{key}' field: {body}"))
        })?;
        Ok(inner)
    }
}

/// Maps Alipay's `trade_status` onto the normalised states.
pub fn trade_status(state: &str) -> TradeStatus {
    match state {
        "WAIT_BUYER_PAY" => TradeStatus::NotPaid,
        "TRADE_CLOSED" => TradeStatus::Closed,
        "TRADE_SUCCESS" | "TRADE_FINISHED" => TradeStatus::Success,
        _ => TradeStatus::Pending,
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn api_error(response: &Value) -> ProviderError {
    let code = str_field(response, "sub_code").or_else(|| str_field(response, "code")).unwrap_or("unknown");
    let message = str_field(response, "sub_msg").or_else(|| str_field(response, "msg")).unwrap_or_default();
    ProviderError::Api { code: code.to_string(), message: message.to_string() }
}

fn parse_amount(s: &str) -> Result<MinorUnits, ProviderError> {
    MinorUnits::from_str(s).map_err(|e| ProviderError::MalformedResponse(format!("Invalid Alipay amount '{s}'. {e}")))
}

/// Interprets the body of an `alipay.trade.query` response.
pub fn parse_trade_query(response: &Value) -> Result<ProviderTradeQuery, ProviderError> {
    let raw = response.to_string();
    if str_field(response, "code") != Some(SUCCESS_CODE) {
        return match str_field(response, "sub_code") {
            Some(TRADE_NOT_EXIST) => Ok(ProviderTradeQuery::not_found(raw)),
            _ => Err(api_error(response)),
        };
    }
    let trade_state = str_field(response, "trade_status")
        .ok_or_else(|| ProviderError::MalformedResponse(format!("Alipay trade has no status: {raw}")))?;
    let total = str_field(response, "total_amount").map(parse_amount).transpose()?;
    Ok(ProviderTradeQuery {
        status: trade_status(trade_state),
        trade_state: trade_state.to_string(),
        transaction_id: str_field(response, "trade_no").map(String::from),
        total,
        payer: str_field(response, "buyer_logon_id").or_else(|| str_field(response, "buyer_user_id")).map(String::from),
        success_time: str_field(response, "send_pay_date").and_then(parse_cst_time),
        raw,
    })
}

#[async_trait]
impl PaymentProvider for AlipayProvider {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Alipay
    }

    fn merchant_identity(&self) -> &str {
        self.config.app_id.as_str()
    }

    async fn create_payment(&self, request: &ProviderOrderRequest) -> Result<String, ProviderError> {
        let url = self.page_pay_url(request)?;
        debug!("💳️ Alipay checkout url generated for order {}", request.order_no);
        Ok(url)
    }

    async fn query_order(&self, order_no: &OrderNo) -> Result<ProviderTradeQuery, ProviderError> {
        let response = self.call("alipay.trade.query", json!({ "out_trade_no": order_no.as_str() })).await?;
        parse_trade_query(&response)
    }

    async fn close_order(&self, order_no: &OrderNo) -> Result<(), ProviderError> {
        let response = self.call("alipay.trade.close", json!({ "out_trade_no": order_no.as_str() })).await?;
        if str_field(&response, "code") == Some(SUCCESS_CODE) {
            info!("💳️ Alipay trade for order {order_no} closed");
            return Ok(());
        }
        match str_field(&response, "sub_code") {
            Some(TRADE_NOT_EXIST) => {
                debug!("💳️ Alipay has no trade for order {order_no}. Nothing to close");
                Ok(())
            },
            Some(TRADE_STATUS_ERROR) => {
                // Either already closed, or paid in the meantime. Only the former is a successful close.
                let trade = self.query_order(order_no).await?;
                if trade.status == TradeStatus::Closed {
                    debug!("💳️ Alipay trade for order {order_no} was already closed");
                    Ok(())
                } else {
                    Err(api_error(&response))
                }
            },
            _ => Err(api_error(&response)),
        }
    }

    fn verify_notification(&self, notification: &RawNotification) -> Result<VerifiedNotification, CallbackError> {
        let params = url::form_urlencoded::parse(notification.body.as_bytes())
            .into_owned()
            .collect::<BTreeMap<String, String>>();
        let signature = params
            .get("sign")
            .ok_or_else(|| CallbackError::InvalidSignature("Alipay notification is not signed".into()))?;
        if !verify(self.config.notify_secret.reveal(), &canonical_query(&params), signature) {
            return Err(CallbackError::InvalidSignature("Alipay notification signature does not match".into()));
        }
        let field = |key: &str| {
            params
                .get(key)
                .filter(|v| !v.is_empty())
                .cloned()
                .ok_or_else(|| CallbackError::Malformed(format!("Alipay notification has no {key}")))
        };
        let order_no = OrderNo::new(field("out_trade_no")?);
        let total_amount = field("total_amount")?;
        let total = MinorUnits::from_str(&total_amount)
            .map_err(|e| CallbackError::Malformed(format!("Invalid total_amount '{total_amount}'. {e}")))?;
        if let Some(seller_id) = params.get("seller_id").filter(|s| **s != self.config.seller_id) {
            return Err(CallbackError::MerchantMismatch {
                expected: self.config.seller_id.clone(),
                actual: seller_id.clone(),
            });
        }
        let trade_state = field("trade_status")?;
        Ok(VerifiedNotification {
            order_no,
            transaction_id: field("trade_no")?,
            total,
            merchant_id: field("app_id")?,
            trade_status: trade_status(&trade_state),
            trade_state,
            payer: params.get("buyer_logon_id").or_else(|| params.get("buyer_id")).cloned(),
            success_time: params.get("gmt_payment").and_then(|s| parse_cst_time(s)),
            raw: notification.body.clone(),
        })
    }

    fn acknowledgement(&self, accepted: bool, _reason: Option<&str>) -> CallbackAck {
        // Alipay re-delivers until it reads exactly "success"
        let body = if accepted { "success" } else { "failure" };
        CallbackAck { status: 200, content_type: "text/plain; charset=utf-8", body: body.to_string() }
    }
}
