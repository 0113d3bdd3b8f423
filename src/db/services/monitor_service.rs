use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, prelude::Expr};

use crate::db::entities::{monitor, prelude::Monitor};

/// All monitors the fleet scheduler should bring online.
pub async fn get_active_monitors(
    db: &DatabaseConnection,
) -> Result<Vec<monitor::Model>, DbErr> {
    Monitor::find()
        .filter(monitor::Column::Active.eq(true))
        .all(db)
        .await
}

pub async fn get_monitor_by_id(
    db: &DatabaseConnection,
    monitor_id: i32,
) -> Result<Option<monitor::Model>, DbErr> {
    Monitor::find_by_id(monitor_id).one(db).await
}

/// Persist the latest DNS answer for a `dns` monitor. Declared side effect
/// of the DNS checker; only called when the answer changed.
pub async fn update_dns_last_result(
    db: &DatabaseConnection,
    monitor_id: i32,
    result: &str,
) -> Result<(), DbErr> {
    Monitor::update_many()
        .col_expr(monitor::Column::DnsLastResult, Expr::value(result))
        .filter(monitor::Column::Id.eq(monitor_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Detach a proxy from every monitor that references it (used when the
/// proxy is deleted).
pub async fn clear_proxy_references(
    db: &DatabaseConnection,
    proxy_id: i32,
) -> Result<(), DbErr> {
    Monitor::update_many()
        .col_expr(
            monitor::Column::ProxyId,
            Expr::value(sea_orm::Value::Int(None)),
        )
        .filter(monitor::Column::ProxyId.eq(proxy_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Point every monitor owned by `user_id` at the given proxy.
pub async fn apply_proxy_to_monitors(
    db: &DatabaseConnection,
    proxy_id: i32,
    user_id: i32,
) -> Result<(), DbErr> {
    Monitor::update_many()
        .col_expr(monitor::Column::ProxyId, Expr::value(proxy_id))
        .filter(monitor::Column::UserId.eq(user_id))
        .filter(
            monitor::Column::ProxyId
                .ne(proxy_id)
                .or(monitor::Column::ProxyId.is_null()),
        )
        .exec(db)
        .await?;
    Ok(())
}
