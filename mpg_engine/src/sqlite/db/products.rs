use sqlx::SqliteConnection;

use crate::{
    db_types::{MinorUnits, Product, ProductStatus, ProductType},
    traits::PaymentGatewayError,
};

pub async fn fetch_product(
    product_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Product>, PaymentGatewayError> {
    let product = sqlx::query_as::<_, Product>(
        "SELECT id, name, description, total, add_points, product_type, status FROM products WHERE id = ?",
    )
    .bind(product_id)
    .fetch_optional(conn)
    .await?;
    Ok(product)
}

pub async fn insert_product(
    name: &str,
    total: MinorUnits,
    add_points: i64,
    product_type: ProductType,
    status: ProductStatus,
    conn: &mut SqliteConnection,
) -> Result<Product, PaymentGatewayError> {
    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (name, description, total, add_points, product_type, status) VALUES (?, ?, ?, ?, ?, ?) \
         RETURNING id, name, description, total, add_points, product_type, status",
    )
    .bind(name)
    .bind(format!("{add_points} points for {total}"))
    .bind(total)
    .bind(add_points)
    .bind(product_type)
    .bind(status)
    .fetch_one(conn)
    .await?;
    Ok(product)
}
