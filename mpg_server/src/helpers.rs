use std::{
    future::{ready, Ready},
    net::IpAddr,
    str::FromStr,
};

use actix_web::{dev::Payload, FromRequest, HttpRequest};
use log::{debug, trace};
use mpg_engine::traits::RawNotification;

use crate::errors::ServerError;

/// The header in which the upstream gateway forwards the authenticated user's id.
pub const USER_ID_HEADER: &str = "X-User-Id";

/// The authenticated caller, taken from the [`USER_ID_HEADER`] header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserId(pub i64);

impl FromRequest for UserId {
    type Error = ServerError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(user_id_from_request(req))
    }
}

fn user_id_from_request(req: &HttpRequest) -> Result<UserId, ServerError> {
    let value = req
        .headers()
        .get(USER_ID_HEADER)
        .ok_or_else(|| ServerError::Unauthenticated(format!("Missing {USER_ID_HEADER} header")))?;
    let id = value
        .to_str()
        .ok()
        .and_then(|s| i64::from_str(s.trim()).ok())
        .filter(|id| *id > 0)
        .ok_or_else(|| ServerError::Unauthenticated(format!("Invalid {USER_ID_HEADER} header")))?;
    Ok(UserId(id))
}

/// Captures an inbound notification exactly as it arrived. Header names are lower-cased; headers that are not valid
/// UTF-8 are dropped. A body that is not valid UTF-8 is converted lossily, so its signature will not verify.
pub fn raw_notification(req: &HttpRequest, body: &[u8]) -> RawNotification {
    let body = String::from_utf8_lossy(body).into_owned();
    req.headers()
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .fold(RawNotification::new(body), |n, (name, value)| n.with_header(name, value))
}

/// Get the remote IP address from the request. The `X-Forwarded-For` header is used iif `use_x_forwarded_for` is set
/// in the configuration, otherwise the peer address from the connection info.
pub fn get_remote_ip(req: &HttpRequest, use_x_forwarded_for: bool) -> Option<IpAddr> {
    let mut result = None;
    if use_x_forwarded_for {
        trace!("Checking X-Forwarded-For header");
        result = req
            .headers()
            .get("X-Forwarded-For")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .and_then(|s| IpAddr::from_str(s.trim()).ok());
        if let Some(ip) = result {
            debug!("Using X-Forwarded-For header for remote address: {ip}");
        }
    }
    result.or_else(|| {
        let peer_addr = req.connection_info().peer_addr().map(|a| a.to_string());
        trace!("Using Peer address for remote address: {:?}", peer_addr);
        peer_addr.and_then(|s| IpAddr::from_str(&s).ok())
    })
}
