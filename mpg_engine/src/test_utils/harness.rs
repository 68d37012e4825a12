use chrono::Duration;
use mpg_common::MinorUnits;
use sqlx::{migrate::MigrateDatabase, Sqlite};

use super::{
    prepare_env::{backdate_order, prepare_test_env, random_db_path},
    MockProvider,
};
use crate::{
    db_types::{Order, OrderNo, PaymentMethod, Product, ProductStatus, ProductType, UserAccount},
    events::EventProducers,
    traits::{AccountManagement, OrderManagement, PaymentGatewayDatabase},
    FlowConfig,
    NamedLocks,
    OrderIssuanceApi,
    OrderQueryApi,
    OrderSettlement,
    PaymentCallbackApi,
    ProviderRegistry,
    ReconciliationApi,
    SqliteDatabase,
};

pub const ALIPAY_APP_ID: &str = "mock-alipay-app";
pub const WX_MCH_ID: &str = "mock-wx-mch";

/// A fresh database with the full set of engine APIs wired to a pair of [`MockProvider`]s.
pub struct TestHarness {
    pub db: SqliteDatabase,
    pub locks: NamedLocks,
    pub alipay: MockProvider,
    pub wechat: MockProvider,
    pub registry: ProviderRegistry,
    pub config: FlowConfig,
    pub issuance: OrderIssuanceApi<SqliteDatabase>,
    pub callbacks: PaymentCallbackApi<SqliteDatabase>,
    pub reconciliation: ReconciliationApi<SqliteDatabase>,
    pub queries: OrderQueryApi<SqliteDatabase>,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_producers(EventProducers::default()).await
    }

    pub async fn with_producers(producers: EventProducers) -> Self {
        let config = FlowConfig { close_backoff: std::time::Duration::from_millis(1), ..FlowConfig::default() };
        Self::build(producers, config).await
    }

    pub async fn with_flow_config(config: FlowConfig) -> Self {
        Self::build(EventProducers::default(), config).await
    }

    async fn build(producers: EventProducers, config: FlowConfig) -> Self {
        let url = random_db_path();
        prepare_test_env(&url).await;
        let db = SqliteDatabase::new_with_url(&url, 5).await.expect("Error creating database");
        let locks = NamedLocks::in_memory();
        let alipay = MockProvider::new(PaymentMethod::Alipay, ALIPAY_APP_ID);
        let wechat = MockProvider::new(PaymentMethod::WechatPay, WX_MCH_ID);
        let registry = ProviderRegistry::new().with_provider(alipay.clone()).with_provider(wechat.clone());
        let settlement = OrderSettlement::new(db.clone(), locks.clone(), producers);
        let issuance = OrderIssuanceApi::new(db.clone(), locks.clone(), registry.clone(), config.clone());
        let callbacks = PaymentCallbackApi::new(registry.clone(), settlement.clone());
        let reconciliation =
            ReconciliationApi::new(db.clone(), locks.clone(), registry.clone(), settlement, config.clone());
        let queries = OrderQueryApi::new(db.clone());
        Self { db, locks, alipay, wechat, registry, config, issuance, callbacks, reconciliation, queries }
    }

    pub fn provider(&self, method: PaymentMethod) -> &MockProvider {
        match method {
            PaymentMethod::Alipay => &self.alipay,
            PaymentMethod::WechatPay => &self.wechat,
        }
    }

    pub async fn user(&self, name: &str) -> UserAccount {
        let email = format!("{name}@example.com");
        self.db.insert_user(name, Some(&email)).await.expect("Error creating user")
    }

    pub async fn product(&self, total: i64, add_points: i64, product_type: ProductType) -> Product {
        self.db
            .insert_product("Test product", MinorUnits::from(total), add_points, product_type, ProductStatus::Online)
            .await
            .expect("Error creating product")
    }

    pub async fn order(&self, order_no: &OrderNo) -> Order {
        self.db.fetch_order_by_order_no(order_no).await.expect("Error fetching order").expect("Order does not exist")
    }

    pub async fn balance(&self, user_id: i64) -> i64 {
        self.db.fetch_user_account(user_id).await.expect("Error fetching user").expect("User does not exist").balance
    }

    /// Pretends the order was issued `minutes` ago.
    pub async fn age_order(&self, order_no: &OrderNo, minutes: i64) {
        backdate_order(&self.db, order_no, Duration::minutes(minutes)).await;
    }

    pub async fn tear_down(mut self) {
        let url = self.db.url().to_string();
        if let Err(e) = self.db.close().await {
            log::error!("🚀️ Failed to close database: {e}");
        }
        let _ = Sqlite::drop_database(&url).await;
    }
}
