//! Container registration after a successful compose run

use api_models::models::ContainerStatus;
use chrono::Utc;
use tracing::{debug, info};

use crate::errors::PlatformError;
use crate::models::container::Container;
use crate::models::deploy::Deploy;
use crate::store::Store;

/// Rows written for one deployment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub registered: Vec<Container>,
    /// Engine ids already owned by an earlier deployment of the same project
    pub already_registered: Vec<String>,
}

/// Strip the leading slash and any square brackets the engine reports
pub fn sanitize_container_name(raw: &str) -> String {
    raw.trim_start_matches('/')
        .chars()
        .filter(|c| !matches!(c, '[' | ']'))
        .collect()
}

/// Record one `CREATED` container per `(id, name)` pair.
///
/// The lists must have the same length. Rows that already exist are left
/// untouched, so registration never rewrites another deployment's containers.
pub async fn register_containers(
    store: &dyn Store,
    deploy: &Deploy,
    ids: &[String],
    names: &[String],
) -> Result<Registration, PlatformError> {
    if ids.len() != names.len() {
        return Err(PlatformError::ConsistencyError(format!(
            "engine reported {} container ids but {} names",
            ids.len(),
            names.len()
        )));
    }

    let mut registration = Registration::default();
    for (id, raw_name) in ids.iter().zip(names) {
        let name = sanitize_container_name(raw_name);
        let now = Utc::now();
        let container = Container {
            id: id.clone(),
            server_id: deploy.server_id.clone(),
            deploy_id: deploy.id,
            image: name.clone(),
            name,
            status: ContainerStatus::Created,
            created_at: now,
            updated_at: now,
        };

        if store.insert_container(container.clone()).await? {
            debug!(deploy_id = deploy.id, "Registered container {} ({})", container.name, id);
            registration.registered.push(container);
        } else {
            registration.already_registered.push(id.clone());
        }
    }

    info!(
        deploy_id = deploy.id,
        "Registered {} containers ({} already known)",
        registration.registered.len(),
        registration.already_registered.len()
    );
    Ok(registration)
}
