use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One probe target. The `monitor_type` tag decides which of the nullable
/// type-specific columns are meaningful; `checks::MonitorKind` is the parsed
/// form. Edited concurrently by external configuration management, so the
/// runner re-reads at safe points instead of caching forever.
#[derive(Clone, Debug, Default, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "monitors")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: Option<i32>,
    pub name: Option<String>,
    pub active: bool,
    pub monitor_type: String,
    pub interval: i32,
    pub max_retries: i32,
    pub retry_interval: i32,
    pub resend_interval: i32,
    pub upside_down: bool,

    // http / keyword
    pub url: Option<String>,
    pub method: String,
    pub body: Option<String>,
    pub headers: Option<String>,
    pub keyword: Option<String>,
    pub ignore_tls: bool,
    pub max_redirects: i32,
    pub accepted_statuscodes_json: String,
    pub auth_method: Option<String>,
    pub basic_auth_user: Option<String>,
    pub basic_auth_pass: Option<String>,
    pub auth_domain: Option<String>,
    pub auth_workstation: Option<String>,
    pub proxy_id: Option<i32>,

    // tcp / ping / dns / steam / radius
    pub hostname: Option<String>,
    pub port: Option<i32>,
    pub dns_resolve_server: Option<String>,
    pub dns_resolve_type: Option<String>,
    pub dns_last_result: Option<String>,

    // push
    pub push_token: Option<String>,

    // docker
    pub docker_container: Option<String>,
    pub docker_host: Option<i32>,

    // mqtt
    pub mqtt_topic: Option<String>,
    pub mqtt_success_message: Option<String>,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,

    // sqlserver / postgres / mysql
    #[sea_orm(column_type = "Text", nullable)]
    pub database_connection_string: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub database_query: Option<String>,

    // grpc-keyword
    pub grpc_url: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub grpc_protobuf: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub grpc_body: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub grpc_metadata: Option<String>,
    pub grpc_method: Option<String>,
    pub grpc_service_name: Option<String>,
    pub grpc_enable_tls: bool,

    // radius
    pub radius_username: Option<String>,
    pub radius_password: Option<String>,
    pub radius_secret: Option<String>,
    pub radius_called_station_id: Option<String>,
    pub radius_calling_station_id: Option<String>,

    pub created_at: ChronoDateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::heartbeat::Entity")]
    Heartbeat,

    #[sea_orm(
        belongs_to = "super::proxy::Entity",
        from = "Column::ProxyId",
        to = "super::proxy::Column::Id"
    )]
    Proxy,

    #[sea_orm(
        belongs_to = "super::docker_host::Entity",
        from = "Column::DockerHost",
        to = "super::docker_host::Column::Id"
    )]
    DockerHost,
}

impl Related<super::heartbeat::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Heartbeat.def()
    }
}

impl Related<super::proxy::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Proxy.def()
    }
}

impl Related<super::docker_host::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::DockerHost.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
