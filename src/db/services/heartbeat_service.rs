use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    QueryOrder, Set,
};

use crate::db::entities::{heartbeat, prelude::Heartbeat};

/// Most recent heartbeat for a monitor, ordered by probe time. This is the
/// "previous beat" the runner carries between cycles.
pub async fn latest_for_monitor(
    db: &DatabaseConnection,
    monitor_id: i32,
) -> Result<Option<heartbeat::Model>, DbErr> {
    Heartbeat::find()
        .filter(heartbeat::Column::MonitorId.eq(monitor_id))
        .order_by_desc(heartbeat::Column::Time)
        .one(db)
        .await
}

/// Append one heartbeat. Heartbeats are never updated after insertion.
pub async fn insert_heartbeat(
    db: &DatabaseConnection,
    beat: &heartbeat::Model,
) -> Result<(), DbErr> {
    let active = heartbeat::ActiveModel {
        id: NotSet,
        monitor_id: Set(beat.monitor_id),
        status: Set(beat.status),
        msg: Set(beat.msg.clone()),
        time: Set(beat.time),
        ping: Set(beat.ping),
        duration: Set(beat.duration),
        important: Set(beat.important),
        down_count: Set(beat.down_count),
    };
    active.insert(db).await?;
    Ok(())
}
