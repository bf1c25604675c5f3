use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Sizes a product can be offered in. Stored as the display string
/// both in the per-line columns and inside the product's `sizes` list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum ProductSize {
    #[sea_orm(string_value = "S")]
    #[serde(rename = "S")]
    Small,
    #[sea_orm(string_value = "M")]
    #[serde(rename = "M")]
    Medium,
    #[sea_orm(string_value = "L")]
    #[serde(rename = "L")]
    Large,
    #[sea_orm(string_value = "XL")]
    #[serde(rename = "XL")]
    ExtraLarge,
    #[sea_orm(string_value = "One Size")]
    #[serde(rename = "One Size")]
    OneSize,
}

impl std::fmt::Display for ProductSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ProductSize::Small => "S",
            ProductSize::Medium => "M",
            ProductSize::Large => "L",
            ProductSize::ExtraLarge => "XL",
            ProductSize::OneSize => "One Size",
        };
        write!(f, "{}", label)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum ProductCategory {
    #[sea_orm(string_value = "Men")]
    Men,
    #[sea_orm(string_value = "Women")]
    Women,
    #[sea_orm(string_value = "Kids")]
    Kids,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    #[sea_orm(column_type = "Decimal(Some((16, 4)))")]
    pub price: Decimal,
    pub image_url: Option<String>,
    pub category: ProductCategory,
    /// JSON-encoded list of offered [`ProductSize`] values.
    pub sizes: String,
    pub in_stock: bool,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
}

impl Model {
    /// Decodes the offered sizes list. Unknown entries are dropped.
    pub fn offered_sizes(&self) -> Vec<ProductSize> {
        serde_json::from_str::<Vec<ProductSize>>(&self.sizes).unwrap_or_default()
    }

    pub fn offers_size(&self, size: ProductSize) -> bool {
        self.offered_sizes().contains(&size)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::cart_item::Entity")]
    CartItems,
}

impl Related<super::cart_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CartItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
