use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Outbound proxy configuration. At most one proxy per user carries the
/// `default` flag; `services::proxy_service::save_proxy` enforces that.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "proxies")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub protocol: String,
    pub host: String,
    pub port: i32,
    pub auth: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
    #[sea_orm(column_name = "default")]
    pub is_default: bool,
    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::monitor::Entity")]
    Monitor,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Monitor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
