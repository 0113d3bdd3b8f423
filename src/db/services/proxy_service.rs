use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, NotSet, QueryFilter,
    Set, prelude::Expr,
};
use thiserror::Error;

use crate::db::entities::{prelude::Proxy, proxy};
use crate::db::services::monitor_service;

pub const SUPPORTED_PROXY_PROTOCOLS: [&str; 6] =
    ["http", "https", "socks", "socks5", "socks5h", "socks4"];

#[derive(Debug, Error)]
pub enum ProxyServiceError {
    #[error("proxy not found")]
    NotFound,
    #[error(
        "unsupported proxy protocol \"{0}\", supported protocols are {supported}",
        supported = SUPPORTED_PROXY_PROTOCOLS.join(", ")
    )]
    UnsupportedProtocol(String),
    #[error(transparent)]
    Db(#[from] DbErr),
}

/// Fields accepted when creating or editing a proxy.
#[derive(Debug, Clone)]
pub struct ProxyInput {
    pub protocol: String,
    pub host: String,
    pub port: i32,
    pub auth: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    pub active: bool,
    pub is_default: bool,
    /// Re-point every monitor of the user at this proxy after saving.
    pub apply_existing: bool,
}

fn validate_protocol(protocol: &str) -> Result<(), ProxyServiceError> {
    if SUPPORTED_PROXY_PROTOCOLS.contains(&protocol) {
        Ok(())
    } else {
        Err(ProxyServiceError::UnsupportedProtocol(protocol.to_owned()))
    }
}

/// Saves or updates a proxy. Validation happens before any write: an
/// unsupported protocol leaves storage untouched. Marking the proxy as the
/// user's default clears the flag on every other proxy first.
pub async fn save_proxy(
    db: &DatabaseConnection,
    input: &ProxyInput,
    proxy_id: Option<i32>,
    user_id: i32,
) -> Result<proxy::Model, ProxyServiceError> {
    validate_protocol(&input.protocol)?;

    let existing = match proxy_id {
        Some(id) => {
            let found = Proxy::find_by_id(id)
                .filter(proxy::Column::UserId.eq(user_id))
                .one(db)
                .await?;
            Some(found.ok_or(ProxyServiceError::NotFound)?)
        }
        None => None,
    };

    if input.is_default {
        Proxy::update_many()
            .col_expr(proxy::Column::IsDefault, Expr::value(false))
            .filter(proxy::Column::UserId.eq(user_id))
            .filter(proxy::Column::IsDefault.eq(true))
            .exec(db)
            .await?;
    }

    let active_model = proxy::ActiveModel {
        id: existing.as_ref().map(|p| Set(p.id)).unwrap_or(NotSet),
        user_id: Set(user_id),
        protocol: Set(input.protocol.clone()),
        host: Set(input.host.clone()),
        port: Set(input.port),
        auth: Set(input.auth),
        username: Set(input.username.clone()),
        password: Set(input.password.clone()),
        active: Set(input.active),
        is_default: Set(input.is_default),
        created_at: existing
            .as_ref()
            .map(|p| Set(p.created_at))
            .unwrap_or_else(|| Set(Utc::now())),
    };

    let saved = match existing {
        Some(_) => active_model.update(db).await?,
        None => active_model.insert(db).await?,
    };

    if input.apply_existing {
        monitor_service::apply_proxy_to_monitors(db, saved.id, user_id).await?;
    }

    Ok(saved)
}

/// Deletes a proxy and detaches it from referencing monitors first.
pub async fn delete_proxy(
    db: &DatabaseConnection,
    proxy_id: i32,
    user_id: i32,
) -> Result<(), ProxyServiceError> {
    let found = Proxy::find_by_id(proxy_id)
        .filter(proxy::Column::UserId.eq(user_id))
        .one(db)
        .await?;
    if found.is_none() {
        return Err(ProxyServiceError::NotFound);
    }

    monitor_service::clear_proxy_references(db, proxy_id).await?;

    Proxy::delete_many()
        .filter(proxy::Column::Id.eq(proxy_id))
        .filter(proxy::Column::UserId.eq(user_id))
        .exec(db)
        .await?;
    Ok(())
}

/// Point lookup used by the HTTP checker; inactive proxies are ignored by
/// the caller.
pub async fn get_proxy(
    db: &DatabaseConnection,
    proxy_id: i32,
) -> Result<Option<proxy::Model>, DbErr> {
    Proxy::find_by_id(proxy_id).one(db).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    fn input(protocol: &str, is_default: bool) -> ProxyInput {
        ProxyInput {
            protocol: protocol.to_owned(),
            host: "proxy.internal".to_owned(),
            port: 8080,
            auth: false,
            username: None,
            password: None,
            active: true,
            is_default,
            apply_existing: false,
        }
    }

    #[tokio::test]
    async fn saving_a_default_proxy_clears_siblings_before_the_insert() {
        let saved = proxy::Model {
            id: 7,
            user_id: 1,
            protocol: "http".to_owned(),
            host: "proxy.internal".to_owned(),
            port: 8080,
            auth: false,
            username: None,
            password: None,
            active: true,
            is_default: true,
            created_at: Utc::now(),
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 2,
            }])
            .append_query_results([vec![saved.clone()]])
            .into_connection();

        let result = save_proxy(&db, &input("http", true), None, 1).await.unwrap();
        assert_eq!(result.id, 7);

        let log = db.into_transaction_log();
        assert_eq!(log.len(), 2);
        let first = format!("{:?}", log[0]);
        let second = format!("{:?}", log[1]);
        assert!(
            first.contains("UPDATE") && first.contains("proxies"),
            "expected the clear-default update first, got: {first}"
        );
        assert!(
            second.contains("INSERT") && second.contains("proxies"),
            "expected the insert second, got: {second}"
        );
    }

    #[tokio::test]
    async fn unsupported_protocol_issues_no_statements() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();

        let err = save_proxy(&db, &input("quic", true), None, 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProxyServiceError::UnsupportedProtocol(p) if p == "quic"));
        assert!(db.into_transaction_log().is_empty());
    }

    #[test]
    fn every_supported_protocol_passes_validation() {
        for protocol in ["http", "https", "socks", "socks5", "socks5h", "socks4"] {
            assert!(validate_protocol(protocol).is_ok());
        }
        assert!(validate_protocol("quic").is_err());
    }

    #[test]
    fn unsupported_protocol_error_names_the_protocol() {
        let err = ProxyServiceError::UnsupportedProtocol("quic".into());
        let text = err.to_string();
        assert!(text.contains("quic"));
        assert!(text.contains("socks5h"));
    }
}
