mod api;
mod error;
mod pages;
mod render;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::text_search_handler, api::image_search_handler, api::metrics_handler),
    components(schemas(types::SearchForm, types::SearchResponse, crate::imdb::SearchResult))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(pages::index_handler))
        .route("/image/{id}", get(pages::image_handler))
        .route("/random", get(pages::random_handler))
        .route("/text-query", get(pages::text_query_handler))
        .route("/img/{*path}", get(pages::serve_image_handler))
        .route("/api/search", get(api::text_search_handler).post(api::image_search_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        // 上传限制：10M
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}
