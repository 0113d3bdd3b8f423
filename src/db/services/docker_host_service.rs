use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::db::entities::{docker_host, prelude::DockerHost};

pub async fn get_docker_host(
    db: &DatabaseConnection,
    docker_host_id: i32,
) -> Result<Option<docker_host::Model>, DbErr> {
    DockerHost::find_by_id(docker_host_id).one(db).await
}

/// Docker daemons are commonly configured with a `tcp://` URL, which HTTP
/// clients do not accept as a scheme. Rewrite it on the fly.
pub fn patch_docker_url(url: &str) -> String {
    url.replacen("tcp://", "http://", 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_scheme_is_rewritten() {
        assert_eq!(
            patch_docker_url("tcp://127.0.0.1:2375"),
            "http://127.0.0.1:2375"
        );
    }

    #[test]
    fn other_schemes_pass_through() {
        assert_eq!(
            patch_docker_url("http://docker.local:2375"),
            "http://docker.local:2375"
        );
    }
}
