use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{book, order, ws};
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/orders", post(order::create_order))
        .route(
            "/orders/{id}",
            get(order::get_order).delete(order::cancel_order),
        )
        .route("/books/{symbol}", get(book::book_stats));

    Router::new()
        .nest("/v1", api_routes)
        .route("/ws", get(ws::ws_handler))
        .route("/ws/stats", get(ws::ws_stats))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
