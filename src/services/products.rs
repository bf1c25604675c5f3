use std::sync::Arc;

use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder};
use tracing::instrument;
use uuid::Uuid;

use crate::{
    entities::product::{self, Entity as Product, ProductCategory},
    errors::ServiceError,
};

/// Read-side catalog access for the storefront listing pages and for
/// cart validation.
#[derive(Clone)]
pub struct ProductCatalogService {
    db: Arc<DatabaseConnection>,
}

impl ProductCatalogService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Lists products, optionally filtered by category and featured flag.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        category: Option<ProductCategory>,
        featured: Option<bool>,
    ) -> Result<Vec<product::Model>, ServiceError> {
        let mut query = Product::find();

        if let Some(category) = category {
            query = query.filter(product::Column::Category.eq(category));
        }
        if let Some(featured) = featured {
            query = query.filter(product::Column::Featured.eq(featured));
        }

        let products = query
            .order_by_desc(product::Column::CreatedAt)
            .all(&*self.db)
            .await?;
        Ok(products)
    }

    /// Fetches a single product.
    #[instrument(skip(self))]
    pub async fn get_product(&self, product_id: Uuid) -> Result<product::Model, ServiceError> {
        Product::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }
}
