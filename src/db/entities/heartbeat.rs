use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One timestamped probe outcome. Append-only; the `important` subsequence
/// is the canonical status-change log.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "heartbeats")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub monitor_id: i32,
    /// Discriminant of `monitor::status::Status`.
    pub status: i16,
    pub msg: String,
    pub time: ChronoDateTimeUtc,
    /// Probe round-trip in milliseconds; absent when the probe never
    /// completed or the type has no latency notion.
    pub ping: Option<i32>,
    /// Wall time of the full check cycle in milliseconds, overhead included.
    pub duration: i32,
    pub important: bool,
    pub down_count: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::monitor::Entity",
        from = "Column::MonitorId",
        to = "super::monitor::Column::Id",
        on_delete = "Cascade"
    )]
    Monitor,
}

impl Related<super::monitor::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Monitor.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
