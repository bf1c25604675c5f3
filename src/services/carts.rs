use std::sync::Arc;

use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Serialize;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::{
    entities::{
        cart_item::{self, Entity as CartItem},
        product::{self, ProductSize},
    },
    errors::ServiceError,
    events::{Event, EventSender},
};

/// One cart line joined with its product for display.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub id: Uuid,
    pub product: product::Model,
    pub size: ProductSize,
    pub quantity: i32,
}

/// Manages the per-user shopping cart.
///
/// A cart is the set of `cart_items` rows for a user; the unique index
/// on (user, product, size) guarantees one line per combination, so
/// adding an existing combination merges into its quantity.
#[derive(Clone)]
pub struct CartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl CartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Returns the user's cart with product details, newest lines last.
    /// Lines whose product has been removed from the catalog are
    /// filtered out.
    #[instrument(skip(self))]
    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        let rows = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .find_also_related(product::Entity)
            .order_by_asc(cart_item::Column::CreatedAt)
            .all(&*self.db)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(item, product)| {
                product.map(|product| CartLine {
                    id: item.id,
                    product,
                    size: item.size,
                    quantity: item.quantity,
                })
            })
            .collect())
    }

    /// Adds a product to the cart.
    ///
    /// Validates that the product exists and is offered in the
    /// requested size. If the (product, size) combination is already
    /// in the cart its quantity is incremented instead of creating a
    /// second line.
    #[instrument(skip(self))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        product_id: Uuid,
        size: ProductSize,
        quantity: i32,
    ) -> Result<Vec<CartLine>, ServiceError> {
        if quantity < 1 {
            return Err(ServiceError::InvalidInput(
                "Quantity must be at least 1".into(),
            ));
        }

        let product = product::Entity::find_by_id(product_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".into()))?;

        if !product.offers_size(size) {
            return Err(ServiceError::InvalidInput(
                "Invalid size for this product".into(),
            ));
        }

        let existing = CartItem::find()
            .filter(cart_item::Column::UserId.eq(user_id))
            .filter(cart_item::Column::ProductId.eq(product_id))
            .filter(cart_item::Column::Size.eq(size))
            .one(&*self.db)
            .await?;

        match existing {
            Some(item) => {
                let new_quantity = item.quantity + quantity;
                let mut active: cart_item::ActiveModel = item.into();
                active.quantity = Set(new_quantity);
                active.update(&*self.db).await?;
            }
            None => {
                let item = cart_item::ActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(user_id),
                    product_id: Set(product_id),
                    size: Set(size),
                    quantity: Set(quantity),
                    ..Default::default()
                };
                item.insert(&*self.db).await?;
            }
        }

        self.get_cart(user_id).await
    }

    /// Sets a line's quantity; zero or negative removes the line.
    #[instrument(skip(self))]
    pub async fn update_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        quantity: i32,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".into()))?;

        if quantity <= 0 {
            CartItem::delete_by_id(item.id).exec(&*self.db).await?;
        } else {
            let mut active: cart_item::ActiveModel = item.into();
            active.quantity = Set(quantity);
            active.update(&*self.db).await?;
        }

        self.get_cart(user_id).await
    }

    /// Removes a single line from the cart.
    #[instrument(skip(self))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        item_id: Uuid,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let item = CartItem::find_by_id(item_id)
            .filter(cart_item::Column::UserId.eq(user_id))
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Cart item not found".into()))?;

        CartItem::delete_by_id(item.id).exec(&*self.db).await?;
        self.get_cart(user_id).await
    }

    /// Empties the cart in one atomic delete.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = CartItem::delete_many()
            .filter(cart_item::Column::UserId.eq(user_id))
            .exec(&*self.db)
            .await?;

        info!(%user_id, removed = result.rows_affected, "cart cleared");
        self.event_sender.send_or_log(Event::CartCleared(user_id)).await;
        Ok(result.rows_affected)
    }
}
