use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use mpg_engine::{traits::ProviderError, LockError, OrderFlowError, PaymentGatewayError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("The request is not authenticated. {0}")]
    Unauthenticated(String),
    #[error("{0}")]
    Busy(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The payment provider is unavailable. {0}")]
    ProviderUnavailable(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Busy(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::ProviderUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<OrderFlowError> for ServerError {
    fn from(e: OrderFlowError) -> Self {
        let msg = e.to_string();
        match e {
            OrderFlowError::Lock(LockError::Busy(_)) => {
                Self::Busy("Another request for this resource is in progress. Please try again.".into())
            },
            OrderFlowError::Lock(LockError::Backend(_)) => Self::BackendError(msg),
            OrderFlowError::OrderPendingReconciliation(_) => Self::Busy(msg),
            OrderFlowError::ProductNotFound(_) | OrderFlowError::OrderNotFound(_) => Self::NoRecordFound(msg),
            OrderFlowError::UserNotFound(_) => Self::Unauthenticated(msg),
            OrderFlowError::ProductNotAvailable(_) | OrderFlowError::UnsupportedPaymentMethod(_) => {
                Self::Unprocessable(msg)
            },
            OrderFlowError::DuplicatePurchase { .. } => Self::Conflict(msg),
            OrderFlowError::Provider(ProviderError::Unsupported(_)) => Self::Unprocessable(msg),
            OrderFlowError::Provider(_) => Self::ProviderUnavailable(msg),
            OrderFlowError::Callback(_) => Self::Unprocessable(msg),
            OrderFlowError::Database(PaymentGatewayError::UnpaidOrderExists { .. }) => {
                Self::Busy("An order for this product is already being issued. Please try again.".into())
            },
            OrderFlowError::Database(PaymentGatewayError::OrderNotFound(_)) => Self::NoRecordFound(msg),
            OrderFlowError::Database(PaymentGatewayError::InvalidStatusTransition { .. }) => Self::Conflict(msg),
            OrderFlowError::Database(_) => Self::BackendError(msg),
        }
    }
}

#[cfg(test)]
mod test {
    use mpg_engine::db_types::OrderNo;

    use super::*;

    fn status(e: OrderFlowError) -> StatusCode {
        ServerError::from(e).status_code()
    }

    #[test]
    fn flow_errors_map_to_http_statuses() {
        assert_eq!(status(LockError::Busy("issue:1".into()).into()), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            status(OrderFlowError::OrderPendingReconciliation(OrderNo::from("order_1"))),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(status(OrderFlowError::DuplicatePurchase { user_id: 1, product_id: 2 }), StatusCode::CONFLICT);
        assert_eq!(status(OrderFlowError::ProductNotAvailable(2)), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(status(OrderFlowError::ProductNotFound(2)), StatusCode::NOT_FOUND);
        assert_eq!(status(OrderFlowError::OrderNotFound(OrderNo::from("order_1"))), StatusCode::NOT_FOUND);
        assert_eq!(status(ProviderError::Timeout("create".into()).into()), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            status(PaymentGatewayError::DatabaseError("disk full".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn busy_responses_ask_the_caller_to_retry() {
        let e = ServerError::from(OrderFlowError::from(LockError::Busy("issue:1".into())));
        assert!(e.to_string().contains("try again"));
    }
}
