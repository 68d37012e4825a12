use chrono::Duration;
use log::*;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use crate::{db_types::OrderNo, SqliteDatabase};

pub async fn prepare_test_env(url: &str) {
    dotenvy::from_filename(".env.test").ok();
    let _ = env_logger::try_init();
    debug!("🚀️ Logging initialised");
    create_database(url).await;
    run_migrations(url).await;
}

pub fn random_db_path() -> String {
    let dir = std::env::temp_dir();
    format!("sqlite://{}/mpg_test_store_{}.db", dir.display(), rand::random::<u64>())
}

pub async fn run_migrations(url: &str) {
    let db = SqliteDatabase::new_with_url(url, 5).await.expect("Error creating connection to database");
    db.run_migrations().await.expect("Error running DB migrations");
    info!("🚀️ Migrations complete");
}

pub async fn create_database(url: &str) {
    if let Err(e) = Sqlite::drop_database(url).await {
        trace!("Nothing to drop at {url}: {e:?}");
    }
    Sqlite::create_database(url).await.expect("Error creating database");
    info!("🚀️ Created Sqlite database {url}");
}

/// Moves an order's creation and expiration times `by` into the past, as if it had been issued that long ago.
pub async fn backdate_order(db: &SqliteDatabase, order_no: &OrderNo, by: Duration) {
    let order = crate::traits::OrderManagement::fetch_order_by_order_no(db, order_no)
        .await
        .expect("Error fetching order")
        .expect("Order does not exist");
    sqlx::query("UPDATE orders SET created_at = ?, expiration_time = ? WHERE order_no = ?")
        .bind(order.created_at - by)
        .bind(order.expiration_time - by)
        .bind(order_no)
        .execute(db.pool())
        .await
        .expect("Error backdating order");
}
