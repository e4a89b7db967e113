//! Per-tenant naming conventions shared by injection, execution and listing

/// Label key binding engine resources to their tenant
pub const TENANT_LABEL_KEY: &str = "serverId";

/// Label compose stamps on every container of a project
pub const COMPOSE_PROJECT_LABEL: &str = "com.docker.compose.project";

/// Label marking resources created by this orchestrator
pub const MANAGED_BY_LABEL: &str = "managed-by";

pub const MANAGED_BY_VALUE: &str = "beanstalk";

/// Compose project name for a server, stable for the server's lifetime
pub fn project_name(server_id: &str) -> String {
    format!("app-{}", server_id)
}

/// Canonical tenant network name for a server
pub fn network_name(server_id: &str) -> String {
    format!("network-server-{}", server_id)
}
