use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Docker Engine endpoint used by `docker` monitors; `docker_type` is
/// either `socket` (unix socket path) or `tcp` (daemon URL).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "docker_hosts")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: i32,
    pub name: Option<String>,
    pub docker_daemon: Option<String>,
    pub docker_type: Option<String>,
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
