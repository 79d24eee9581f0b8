use crate::{
    entities::order::{self, OrderStatus},
    errors::ServiceResult,
};
use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use sea_orm::{sea_query::OnConflict, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Order fields taken from a completed checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOrder {
    pub stripe_session_id: String,
    pub customer_email: Option<String>,
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub payment_status: String,
    pub customization: Option<String>,
    pub items: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    Inserted(order::Model),
    /// A row for this session already existed; nothing was written.
    Duplicate,
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Records the order at most once per `stripe_session_id`.
    async fn record(&self, order: NewOrder) -> ServiceResult<RecordOutcome>;
}

#[derive(Clone)]
pub struct SeaOrmOrderStore {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmOrderStore {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl OrderStore for SeaOrmOrderStore {
    #[instrument(skip(self, order), fields(session_id = %order.stripe_session_id))]
    async fn record(&self, order: NewOrder) -> ServiceResult<RecordOutcome> {
        let model = order::Model {
            id: Uuid::new_v4(),
            stripe_session_id: order.stripe_session_id,
            customer_email: order.customer_email,
            amount_total: order.amount_total,
            currency: order.currency,
            payment_status: order.payment_status,
            status: OrderStatus::Pending.to_string(),
            customization: order.customization,
            items: order.items,
            created_at: Utc::now(),
        };

        let active = order::ActiveModel {
            id: Set(model.id),
            stripe_session_id: Set(model.stripe_session_id.clone()),
            customer_email: Set(model.customer_email.clone()),
            amount_total: Set(model.amount_total),
            currency: Set(model.currency.clone()),
            payment_status: Set(model.payment_status.clone()),
            status: Set(model.status.clone()),
            customization: Set(model.customization.clone()),
            items: Set(model.items.clone()),
            created_at: Set(model.created_at),
        };

        // Concurrent duplicate deliveries race on the unique index, not on a pre-check.
        let inserted = order::Entity::insert(active)
            .on_conflict(
                OnConflict::column(order::Column::StripeSessionId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&*self.db)
            .await?;

        if inserted == 0 {
            counter!("orders.duplicate", 1);
            info!("order for session already exists");
            return Ok(RecordOutcome::Duplicate);
        }

        counter!("orders.recorded", 1);
        info!(order_id = %model.id, "order inserted");
        Ok(RecordOutcome::Inserted(model))
    }
}
