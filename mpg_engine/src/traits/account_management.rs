use crate::{db_types::UserAccount, traits::PaymentGatewayError};

/// Read access to the user/balance collaborator.
#[allow(async_fn_in_trait)]
pub trait AccountManagement {
    async fn fetch_user_account(&self, user_id: i64) -> Result<Option<UserAccount>, PaymentGatewayError>;
}
