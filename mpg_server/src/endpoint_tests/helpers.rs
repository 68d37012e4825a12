use actix_web::{http::StatusCode, test, test::TestRequest, web, web::ServiceConfig, App};
use log::debug;
use mpg_engine::{
    events::EventProducers,
    test_utils::TestHarness,
    OrderIssuanceApi,
    OrderQueryApi,
    OrderSettlement,
    PaymentCallbackApi,
    SqliteDatabase,
};

use crate::{
    config::ServerConfig,
    helpers::USER_ID_HEADER,
    routes::{IssueOrderRoute, MyOrderRoute, MyPaymentRoute, PaymentNotificationRoute},
};

/// Sends `req` to an app set up by `configure` and returns the status and body of the response.
pub async fn send_request<F>(req: TestRequest, configure: F) -> (StatusCode, String)
where F: FnOnce(&mut ServiceConfig) {
    let app = App::new().configure(configure);
    let service = test::init_service(app).await;
    debug!("Making request");
    let res = test::call_service(&service, req.to_request()).await;
    let status = res.status();
    let body = String::from_utf8_lossy(&test::read_body(res).await).into_owned();
    (status, body)
}

pub fn get_as(user_id: i64, path: &str) -> TestRequest {
    TestRequest::get().uri(path).insert_header((USER_ID_HEADER, user_id.to_string()))
}

/// Mounts every route on top of the harness database, locks and mock providers.
pub fn configure_for(h: &TestHarness) -> impl FnOnce(&mut ServiceConfig) {
    let db = h.db.clone();
    let locks = h.locks.clone();
    let registry = h.registry.clone();
    let flow = h.config.clone();
    move |cfg: &mut ServiceConfig| {
        let settlement = OrderSettlement::new(db.clone(), locks.clone(), EventProducers::default());
        let issuance = OrderIssuanceApi::new(db.clone(), locks, registry.clone(), flow);
        let callbacks = PaymentCallbackApi::new(registry, settlement);
        let queries = OrderQueryApi::new(db);
        cfg.app_data(web::Data::new(ServerConfig::default()))
            .app_data(web::Data::new(issuance))
            .app_data(web::Data::new(callbacks))
            .app_data(web::Data::new(queries))
            .service(
                web::scope("/api")
                    .service(IssueOrderRoute::<SqliteDatabase>::new())
                    .service(MyPaymentRoute::<SqliteDatabase>::new())
                    .service(MyOrderRoute::<SqliteDatabase>::new()),
            )
            .service(PaymentNotificationRoute::<SqliteDatabase>::new());
    }
}
