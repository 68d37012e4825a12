use std::time::Duration;

use log::*;
use mpg_common::Secret;

pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_ALIPAY_GATEWAY: &str = "https://openapi.alipay.com/gateway.do";
const DEFAULT_WX_BASE_URL: &str = "https://api.mch.weixin.qq.com";

#[derive(Debug, Clone)]
pub struct AlipayConfig {
    pub app_id: String,
    /// The seller account that notifications must be addressed to. Falls back to the app id when empty.
    pub seller_id: String,
    /// Signs outbound gateway requests
    pub app_secret: Secret<String>,
    /// Verifies inbound notifications
    pub notify_secret: Secret<String>,
    pub gateway_url: String,
    pub notify_url: String,
    pub return_url: Option<String>,
    pub timeout: Duration,
}

impl Default for AlipayConfig {
    fn default() -> Self {
        Self {
            app_id: String::default(),
            seller_id: String::default(),
            app_secret: Secret::default(),
            notify_secret: Secret::default(),
            gateway_url: DEFAULT_ALIPAY_GATEWAY.to_string(),
            notify_url: String::default(),
            return_url: None,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl AlipayConfig {
    /// Reads the Alipay account from `MPG_ALIPAY_*` environment variables.
    ///
    /// Returns `None` when `MPG_ALIPAY_APP_ID` is not set, meaning Alipay is not offered by this deployment.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let Some(app_id) = non_empty_var("MPG_ALIPAY_APP_ID") else {
            info!("🪪️ MPG_ALIPAY_APP_ID is not set. Alipay payments are disabled.");
            return None;
        };
        let seller_id = non_empty_var("MPG_ALIPAY_SELLER_ID").unwrap_or_else(|| app_id.clone());
        let app_secret = required_secret("MPG_ALIPAY_APP_SECRET");
        let notify_secret = required_secret("MPG_ALIPAY_NOTIFY_SECRET");
        let gateway_url = non_empty_var("MPG_ALIPAY_GATEWAY_URL").unwrap_or_else(|| DEFAULT_ALIPAY_GATEWAY.to_string());
        let notify_url = non_empty_var("MPG_ALIPAY_NOTIFY_URL").unwrap_or_else(|| {
            warn!("🪪️ MPG_ALIPAY_NOTIFY_URL is not set. Alipay will not be able to notify us of payments.");
            String::default()
        });
        let return_url = non_empty_var("MPG_ALIPAY_RETURN_URL");
        Some(Self { app_id, seller_id, app_secret, notify_secret, gateway_url, notify_url, return_url, timeout })
    }
}

#[derive(Debug, Clone)]
pub struct WechatPayConfig {
    pub app_id: String,
    pub mch_id: String,
    pub api_secret: Secret<String>,
    pub notify_secret: Secret<String>,
    pub base_url: String,
    pub notify_url: String,
    pub timeout: Duration,
}

impl Default for WechatPayConfig {
    fn default() -> Self {
        Self {
            app_id: String::default(),
            mch_id: String::default(),
            api_secret: Secret::default(),
            notify_secret: Secret::default(),
            base_url: DEFAULT_WX_BASE_URL.to_string(),
            notify_url: String::default(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

impl WechatPayConfig {
    /// Reads the WeChat Pay merchant account from `MPG_WX_*` environment variables.
    ///
    /// Returns `None` when `MPG_WX_APP_ID` is not set.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let Some(app_id) = non_empty_var("MPG_WX_APP_ID") else {
            info!("🪪️ MPG_WX_APP_ID is not set. WeChat Pay payments are disabled.");
            return None;
        };
        let mch_id = non_empty_var("MPG_WX_MCH_ID").unwrap_or_else(|| {
            warn!("🪪️ MPG_WX_MCH_ID is not set. Every WeChat Pay call will be rejected.");
            String::default()
        });
        let api_secret = required_secret("MPG_WX_API_SECRET");
        let notify_secret = required_secret("MPG_WX_NOTIFY_SECRET");
        let base_url = non_empty_var("MPG_WX_BASE_URL").unwrap_or_else(|| DEFAULT_WX_BASE_URL.to_string());
        let notify_url = non_empty_var("MPG_WX_NOTIFY_URL").unwrap_or_else(|| {
            warn!("🪪️ MPG_WX_NOTIFY_URL is not set. WeChat Pay will not be able to notify us of payments.");
            String::default()
        });
        Some(Self { app_id, mch_id, api_secret, notify_secret, base_url, notify_url, timeout })
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn required_secret(name: &str) -> Secret<String> {
    Secret::new(non_empty_var(name).unwrap_or_else(|| {
        error!("🪪️ {name} is not set. Signatures cannot be produced or verified until it is configured.");
        String::default()
    }))
}
