use sea_orm::entity::prelude::*;

/// One webhook event addressed to one subscription, with its delivery state.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_calls")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub subscription_id: Uuid,
    pub team_id: i64,
    pub event_id: Uuid,
    pub event_type: String,
    pub payload: Json,
    /// `PENDING | IN_PROGRESS | DELIVERED | FAILED | DISCARDED`
    pub status: String,
    pub attempt: i32,
    pub max_attempts: i32,
    pub next_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    pub response_status: Option<i32>,
    pub response_body: Option<String>,
    pub response_time_ms: Option<i64>,
    pub last_error: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub last_attempt_at: Option<chrono::DateTime<chrono::Utc>>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::webhook_subscriptions::Entity",
        from = "Column::SubscriptionId",
        to = "super::webhook_subscriptions::Column::Id"
    )]
    WebhookSubscriptions,
}

impl Related<super::webhook_subscriptions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookSubscriptions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
