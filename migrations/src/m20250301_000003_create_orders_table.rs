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
                        ColumnDef::new(Orders::StripeSessionId)
                            .string_len(255)
                            .not_null(),
                    )
                    .col(ColumnDef::new(Orders::CustomerEmail).string_len(320).null())
                    .col(ColumnDef::new(Orders::AmountTotal).big_integer().null())
                    .col(ColumnDef::new(Orders::Currency).string_len(3).null())
                    .col(
                        ColumnDef::new(Orders::PaymentStatus)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Orders::Status)
                            .string_len(32)
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Orders::Customization).text().null())
                    .col(ColumnDef::new(Orders::Items).json().null())
                    .col(
                        ColumnDef::new(Orders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Webhook deliveries are at-least-once; the session id is the dedup key.
        manager
            .create_index(
                Index::create()
                    .name("uq_orders_stripe_session_id")
                    .table(Orders::Table)
                    .col(Orders::StripeSessionId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
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
    StripeSessionId,
    CustomerEmail,
    AmountTotal,
    Currency,
    PaymentStatus,
    Status,
    Customization,
    Items,
    CreatedAt,
}
