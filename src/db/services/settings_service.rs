use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::db::entities::setting;

pub const DNS_CACHE_KEY: &str = "dnsCache";
pub const STEAM_API_KEY: &str = "steamAPIKey";

/// Retrieves a setting by its key. Settings are written by external
/// configuration management; the fleet only reads them.
pub async fn get_setting(
    db: &DatabaseConnection,
    key: &str,
) -> Result<Option<setting::Model>, DbErr> {
    setting::Entity::find_by_id(key.to_owned()).one(db).await
}

/// The polled DNS-cache toggle; absent or non-boolean reads as off.
pub async fn dns_cache_enabled(db: &DatabaseConnection) -> Result<bool, DbErr> {
    let setting = get_setting(db, DNS_CACHE_KEY).await?;
    Ok(setting
        .and_then(|s| s.value.as_bool())
        .unwrap_or(false))
}

/// Steam Web API key for `steam` monitors.
pub async fn steam_api_key(db: &DatabaseConnection) -> Result<Option<String>, DbErr> {
    let setting = get_setting(db, STEAM_API_KEY).await?;
    Ok(setting.and_then(|s| s.value.as_str().map(str::to_owned)))
}
