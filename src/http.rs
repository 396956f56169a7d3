use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::ServiceError;
use crate::metrics::Metrics;
use crate::models::Order;
use crate::service::{CreateOutcome, OrderService};

// ============================================================================
// HTTP API
// ============================================================================
//
//   GET  /order?id=<order_uid>   cached or stored order as JSON
//   POST /create-order           JSON order body, persisted then cached
//   GET  /health                 liveness + cache size
//   GET  /metrics                Prometheus exposition
//
// ============================================================================

pub struct AppState {
    pub service: Arc<OrderService>,
    pub metrics: Arc<Metrics>,
}

#[derive(Debug, Deserialize)]
struct OrderQuery {
    id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusBody {
    pub code: u16,
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

pub async fn run_server(addr: (String, u16), state: web::Data<AppState>) -> std::io::Result<()> {
    tracing::info!("🌐 HTTP server listening on http://{}:{}", addr.0, addr.1);

    HttpServer::new(move || App::new().app_data(state.clone()).configure(routes))
        .bind(addr)?
        .run()
        .await
}

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/order", web::get().to(get_order))
        .service(
            web::resource("/create-order")
                .route(web::post().to(create_order))
                .default_service(web::to(method_not_allowed)),
        )
        .route("/health", web::get().to(health_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn get_order(state: web::Data<AppState>, query: web::Query<OrderQuery>) -> HttpResponse {
    let order_uid = match query.id.as_deref().map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => return error_response(HttpResponse::BadRequest(), "Order ID is required"),
    };

    match state.service.get_order(order_uid).await {
        Ok(order) => HttpResponse::Ok().json(order.as_ref()),
        Err(ServiceError::NotFound(id)) => {
            error_response(HttpResponse::NotFound(), format!("Order {} not found", id))
        }
        Err(ServiceError::Store(e)) => error_response(
            HttpResponse::InternalServerError(),
            format!("Error fetching order: {}", e),
        ),
    }
}

async fn create_order(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let order = match Order::decode(&body) {
        Ok(order) => order,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected create-order request");
            return error_response(
                HttpResponse::BadRequest(),
                format!("Error decoding JSON: {}", e),
            );
        }
    };

    match state.service.create_order(order).await {
        Ok(CreateOutcome::Created) => HttpResponse::Created().json(StatusBody {
            code: 201,
            message: "Order created successfully".to_string(),
        }),
        Ok(CreateOutcome::AlreadyExists) => HttpResponse::Ok().json(StatusBody {
            code: 200,
            message: "Order already exists".to_string(),
        }),
        Err(ServiceError::Store(e)) if e.is_rejection() => error_response(
            HttpResponse::UnprocessableEntity(),
            format!("Order rejected: {}", e),
        ),
        Err(e) => error_response(
            HttpResponse::InternalServerError(),
            format!("Error saving order: {}", e),
        ),
    }
}

async fn method_not_allowed() -> HttpResponse {
    error_response(HttpResponse::MethodNotAllowed(), "Invalid request method. Use POST.")
}

async fn health_handler(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "order-ingest",
        "cached_orders": state.service.cached_orders().await,
    }))
}

async fn metrics_handler(state: web::Data<AppState>) -> HttpResponse {
    match state.metrics.encode() {
        Ok(buffer) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(buffer),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            HttpResponse::InternalServerError().finish()
        }
    }
}

fn error_response(
    mut builder: actix_web::HttpResponseBuilder,
    message: impl Into<String>,
) -> HttpResponse {
    builder.json(ErrorBody {
        error: message.into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::OrderCache;
    use crate::models::fixtures;
    use crate::store::memory::MemoryOrderStore;
    use crate::store::OrderStore;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use std::time::Duration;

    fn state(store: Arc<MemoryOrderStore>) -> web::Data<AppState> {
        let metrics = Arc::new(Metrics::new().unwrap());
        let service = OrderService::new(
            store,
            Arc::new(OrderCache::default()),
            metrics.clone(),
            Duration::from_secs(1),
        );
        web::Data::new(AppState {
            service: Arc::new(service),
            metrics,
        })
    }

    #[actix_web::test]
    async fn test_get_order_returns_json() {
        let store = Arc::new(MemoryOrderStore::new());
        store.save(&fixtures::order("A1", &[1, 2])).await.unwrap();
        let app = test::init_service(App::new().app_data(state(store)).configure(routes)).await;

        let req = test::TestRequest::get().uri("/order?id=A1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let order: Order = test::read_body_json(resp).await;
        assert_eq!(order, fixtures::order("A1", &[1, 2]));
    }

    #[actix_web::test]
    async fn test_get_order_without_id_is_bad_request() {
        let app = test::init_service(
            App::new().app_data(state(Arc::new(MemoryOrderStore::new()))).configure(routes),
        )
        .await;

        for uri in ["/order", "/order?id=", "/order?id=%20"] {
            let req = test::TestRequest::get().uri(uri).to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{}", uri);
        }
    }

    #[actix_web::test]
    async fn test_get_unknown_order_is_not_found() {
        let app = test::init_service(
            App::new().app_data(state(Arc::new(MemoryOrderStore::new()))).configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/order?id=nope").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert!(body.error.contains("nope"));
    }

    #[actix_web::test]
    async fn test_store_failure_is_internal_error() {
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_all(true);
        let app = test::init_service(App::new().app_data(state(store)).configure(routes)).await;

        let req = test::TestRequest::get().uri("/order?id=A1").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_create_order_then_read_it_back() {
        let store = Arc::new(MemoryOrderStore::new());
        let app =
            test::init_service(App::new().app_data(state(store.clone())).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/create-order")
            .set_payload(fixtures::payload(&fixtures::order("C1", &[1])))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::CREATED);
        let body: StatusBody = test::read_body_json(resp).await;
        assert_eq!(body.code, 201);

        let req = test::TestRequest::get().uri("/order?id=C1").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        // Served from the cache filled by the create
        assert_eq!(store.loads(), 0);
    }

    #[actix_web::test]
    async fn test_create_duplicate_reports_existing() {
        let store = Arc::new(MemoryOrderStore::new());
        let app =
            test::init_service(App::new().app_data(state(store.clone())).configure(routes)).await;
        let payload = fixtures::payload(&fixtures::order("C1", &[1, 2]));

        for expected in [StatusCode::CREATED, StatusCode::OK] {
            let req = test::TestRequest::post()
                .uri("/create-order")
                .set_payload(payload.clone())
                .to_request();
            let resp = test::call_service(&app, req).await;
            assert_eq!(resp.status(), expected);
        }
        assert_eq!(store.item_rows("C1"), 2);
    }

    #[actix_web::test]
    async fn test_create_with_bad_body_is_bad_request() {
        let store = Arc::new(MemoryOrderStore::new());
        let app =
            test::init_service(App::new().app_data(state(store.clone())).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/create-order")
            .set_payload("{\"order_uid\": \"A1\"}")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.saves(), 0);
    }

    #[actix_web::test]
    async fn test_create_persist_failure_is_internal_error() {
        let store = Arc::new(MemoryOrderStore::new());
        store.fail_item_insert(Some(0));
        let app = test::init_service(App::new().app_data(state(store)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/create-order")
            .set_payload(fixtures::payload(&fixtures::order("C1", &[1])))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[actix_web::test]
    async fn test_create_refused_data_is_unprocessable() {
        let store = Arc::new(MemoryOrderStore::new());
        store.reject_saves(true);
        let app = test::init_service(App::new().app_data(state(store)).configure(routes)).await;

        let req = test::TestRequest::post()
            .uri("/create-order")
            .set_payload(fixtures::payload(&fixtures::order("C1", &[1])))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let body: ErrorBody = test::read_body_json(resp).await;
        assert!(body.error.contains("22021"));
    }

    #[actix_web::test]
    async fn test_create_with_nul_byte_is_bad_request() {
        let store = Arc::new(MemoryOrderStore::new());
        let app =
            test::init_service(App::new().app_data(state(store.clone())).configure(routes)).await;
        let mut order = fixtures::order("C1", &[1]);
        order.delivery.name = "Bad\u{0000}Name".to_string();

        let req = test::TestRequest::post()
            .uri("/create-order")
            .set_payload(fixtures::payload(&order))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.saves(), 0);
    }

    #[actix_web::test]
    async fn test_create_requires_post() {
        let app = test::init_service(
            App::new().app_data(state(Arc::new(MemoryOrderStore::new()))).configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/create-order").to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[actix_web::test]
    async fn test_health_and_metrics_endpoints() {
        let app = test::init_service(
            App::new().app_data(state(Arc::new(MemoryOrderStore::new()))).configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/order?id=missing").to_request();
        test::call_service(&app, req).await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["cached_orders"], 0);

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("cache_lookups_total"));
    }
}
