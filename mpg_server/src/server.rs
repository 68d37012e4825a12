use std::time::Duration;

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use log::*;
use mpg_engine::{
    events::EventProducers,
    locks::SqliteLockService,
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
use mpg_providers::{AlipayProvider, WechatPayProvider};

use crate::{
    config::ServerConfig,
    errors::ServerError,
    jobs::start_jobs,
    notifications::create_receipt_handlers,
    routes::{health, IssueOrderRoute, MyOrderRoute, MyPaymentRoute, PaymentNotificationRoute},
};

const MAX_DB_CONNECTIONS: u32 = 25;

/// Everything the engine APIs are built from. Cheap to clone; every clone shares the same pool, locks and providers.
#[derive(Clone)]
pub struct EngineComponents {
    pub db: SqliteDatabase,
    pub locks: NamedLocks,
    pub registry: ProviderRegistry,
    pub flow: FlowConfig,
    pub producers: EventProducers,
}

impl EngineComponents {
    /// Connects to the database, brings the schema up to date and registers every configured payment provider.
    pub async fn connect(config: &ServerConfig, producers: EventProducers) -> Result<Self, ServerError> {
        let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
            .await
            .map_err(|e| ServerError::InitializeError(e.to_string()))?;
        db.run_migrations().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;
        let locks = NamedLocks::new(SqliteLockService::new(db.pool().clone(), config.lock_lease));
        let registry = build_registry(config)?;
        Ok(Self { db, locks, registry, flow: config.flow.clone(), producers })
    }

    fn settlement(&self) -> OrderSettlement<SqliteDatabase> {
        OrderSettlement::new(self.db.clone(), self.locks.clone(), self.producers.clone())
    }

    pub fn issuance_api(&self) -> OrderIssuanceApi<SqliteDatabase> {
        OrderIssuanceApi::new(self.db.clone(), self.locks.clone(), self.registry.clone(), self.flow.clone())
    }

    pub fn callback_api(&self) -> PaymentCallbackApi<SqliteDatabase> {
        PaymentCallbackApi::new(self.registry.clone(), self.settlement())
    }

    pub fn reconciliation_api(&self) -> ReconciliationApi<SqliteDatabase> {
        ReconciliationApi::new(
            self.db.clone(),
            self.locks.clone(),
            self.registry.clone(),
            self.settlement(),
            self.flow.clone(),
        )
    }

    pub fn query_api(&self) -> OrderQueryApi<SqliteDatabase> {
        OrderQueryApi::new(self.db.clone())
    }
}

/// Registers a provider for every payment network that has configuration.
pub fn build_registry(config: &ServerConfig) -> Result<ProviderRegistry, ServerError> {
    let mut registry = ProviderRegistry::new();
    if let Some(alipay) = &config.alipay {
        let provider = AlipayProvider::new(alipay.clone()).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        registry = registry.with_provider(provider);
    }
    if let Some(wechat) = &config.wechat {
        let provider =
            WechatPayProvider::new(wechat.clone()).map_err(|e| ServerError::ConfigurationError(e.to_string()))?;
        registry = registry.with_provider(provider);
    }
    if registry.is_empty() {
        warn!("🚀️ No payment providers are configured. Orders cannot be issued and notifications will be refused.");
    }
    Ok(registry)
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let handlers = create_receipt_handlers(config.receipt_webhook_url.clone(), config.provider_timeout);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    let engine = EngineComponents::connect(&config, producers).await?;
    let jobs = start_jobs(&config, &engine);
    info!("🚀️ {} background jobs started", jobs.len());
    let srv = create_server_instance(config, engine)?;
    let result = srv.await.map_err(ServerError::from);
    jobs.iter().for_each(|j| j.abort());
    result
}

pub fn create_server_instance(config: ServerConfig, engine: EngineComponents) -> Result<Server, ServerError> {
    let host = config.host.clone();
    let port = config.port;
    let srv = HttpServer::new(move || {
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("mpg::access_log"))
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(engine.issuance_api()))
            .app_data(web::Data::new(engine.query_api()))
            .app_data(web::Data::new(engine.callback_api()));
        let api_scope = web::scope("/api")
            .service(IssueOrderRoute::<SqliteDatabase>::new())
            .service(MyPaymentRoute::<SqliteDatabase>::new())
            .service(MyOrderRoute::<SqliteDatabase>::new());
        app.service(health).service(api_scope).service(PaymentNotificationRoute::<SqliteDatabase>::new())
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((host.as_str(), port))?
    .run();
    Ok(srv)
}
