use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "webhook_subscriptions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub team_id: i64,
    pub url: String,
    pub secret: String,
    /// JSON array of event type strings; empty means every event.
    pub event_types: Json,
    /// JSON array of sending domain ids; empty means every domain.
    pub domain_ids: Json,
    pub enabled: bool,
    pub description: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::webhook_calls::Entity")]
    WebhookCalls,
}

impl Related<super::webhook_calls::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WebhookCalls.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
