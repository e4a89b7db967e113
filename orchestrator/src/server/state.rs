//! Server state

use std::sync::Arc;

use crate::containers::ContainerManager;
use crate::deploy::service::DeployService;
use crate::provision::ServerProvisioner;
use crate::store::Store;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub deploys: Arc<DeployService>,
    pub provisioner: Arc<ServerProvisioner>,
    pub containers: Arc<ContainerManager>,
}

impl ServerState {
    pub fn new(
        store: Arc<dyn Store>,
        deploys: Arc<DeployService>,
        provisioner: Arc<ServerProvisioner>,
        containers: Arc<ContainerManager>,
    ) -> Self {
        Self {
            store,
            deploys,
            provisioner,
            containers,
        }
    }
}
