pub mod azure;

use crate::error::InspectError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

/// Snapshot of a virtual machine, as read from the cloud provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualMachine {
    pub id: String,
    pub name: String,
    /// `None` for machines created from a custom disk rather than a marketplace image
    pub image: Option<ImageReference>,
}

/// Snapshot of a network interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub id: String,
    pub name: String,
    /// Full resource ID of the attached machine, if any
    pub virtual_machine_id: Option<String>,
}

/// Read-only access to deployed resources. Nothing is cached, every call hits the provider.
pub trait ResourceInspector {
    fn preflight(&self) -> Result<(), String> {
        Ok(())
    }

    fn virtual_machine_exists(&self, vm_name: &str, resource_group: &str) -> Result<bool, InspectError>;

    fn get_virtual_machine(&self, vm_name: &str, resource_group: &str) -> Result<VirtualMachine, InspectError>;

    fn get_network_interface(&self, nic_name: &str, resource_group: &str) -> Result<NetworkInterface, InspectError>;
}
