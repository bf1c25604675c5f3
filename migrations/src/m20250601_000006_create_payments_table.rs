use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Payments::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Payments::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Payments::UserId).uuid().not_null())
                    .col(ColumnDef::new(Payments::OrderId).uuid().null())
                    .col(
                        ColumnDef::new(Payments::CheckoutSessionId)
                            .string_len(255)
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Payments::PaymentIntentId)
                            .string_len(255)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::Amount)
                            .decimal_len(16, 4)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Payments::Currency)
                            .string_len(3)
                            .not_null()
                            .default("usd"),
                    )
                    .col(
                        ColumnDef::new(Payments::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(
                        ColumnDef::new(Payments::PaymentMethod)
                            .string_len(32)
                            .not_null()
                            .default("card"),
                    )
                    .col(ColumnDef::new(Payments::ShippingName).string_len(255).null())
                    .col(
                        ColumnDef::new(Payments::ShippingAddress)
                            .string_len(512)
                            .null(),
                    )
                    .col(ColumnDef::new(Payments::ShippingCity).string_len(255).null())
                    .col(
                        ColumnDef::new(Payments::ShippingPostalCode)
                            .string_len(32)
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Payments::ShippingCountry)
                            .string_len(64)
                            .null(),
                    )
                    .col(ColumnDef::new(Payments::Error).text().null())
                    .col(ColumnDef::new(Payments::CreatedAt).timestamp().not_null())
                    .col(ColumnDef::new(Payments::UpdatedAt).timestamp().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_payments_user")
                    .table(Payments::Table)
                    .col(Payments::UserId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Payments::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum Payments {
    Table,
    Id,
    UserId,
    OrderId,
    CheckoutSessionId,
    PaymentIntentId,
    Amount,
    Currency,
    Status,
    PaymentMethod,
    ShippingName,
    ShippingAddress,
    ShippingCity,
    ShippingPostalCode,
    ShippingCountry,
    Error,
    CreatedAt,
    UpdatedAt,
}
