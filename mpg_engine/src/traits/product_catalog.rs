use crate::{db_types::Product, traits::PaymentGatewayError};

/// The catalog collaborator. It is only consulted at issuance time; orders carry their own snapshot afterwards.
#[allow(async_fn_in_trait)]
pub trait ProductCatalog {
    async fn fetch_product(&self, product_id: i64) -> Result<Option<Product>, PaymentGatewayError>;
}
