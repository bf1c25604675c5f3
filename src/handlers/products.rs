use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::product::ProductCategory,
    errors::ServiceError,
    handlers::common::success_response,
    AppState,
};

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub category: Option<ProductCategory>,
    pub featured: Option<bool>,
}

async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let products = state
        .services
        .products
        .list_products(query.category, query.featured)
        .await?;
    Ok(success_response(products))
}

async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let product = state.services.products.get_product(product_id).await?;
    Ok(success_response(product))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products))
        .route("/:id", get(get_product))
}
