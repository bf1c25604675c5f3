use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Orders::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Orders::Id).uuid().not_null().primary_key())
                    .col(
                        ColumnDef::new(Orders::OrderNumber)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Orders::UserId).uuid().not_null())
                    // Idempotency key: at most one order per checkout session
                    .col(
                        ColumnDef::new(Orders::CheckoutSessionId)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Orders::PaymentIntentId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Orders::TotalAmount)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::Currency)
                            .string_len(3)
                            .not_null()
                            .default("usd"),
                    )
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string_len(32)
                            .not_null()
                            .default("confirmed"),
                    )
                    .col(ColumnDef::new(Orders::ShippingName).string_len(255).null())
                    .col(
                        ColumnDef::new(Orders::ShippingAddress)
                            .string_len(512)
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::ShippingCity).string_len(255).null())
                    .col(
                        ColumnDef::new(Orders::ShippingPostalCode)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Orders::ShippingCountry)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(Orders::OrderDate).timestamp().not_null())
                    .col(ColumnDef::new(Orders::CreatedAt).timestamp().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_orders_user")
                    .table(Orders::Table)
                    .col(Orders::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Orders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Orders {
    Table,
    Id,
    OrderNumber,
    UserId,
    CheckoutSessionId,
    PaymentIntentId,
    TotalAmount,
    Currency,
    Status,
    ShippingName,
    ShippingAddress,
    ShippingCity,
    ShippingPostalCode,
    ShippingCountry,
    OrderDate,
    CreatedAt,
}
