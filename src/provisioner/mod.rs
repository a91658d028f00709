pub mod terraform;

use crate::error::{LifecycleError, ProvisionError};

pub const OUTPUT_VM_NAME: &str = "vm_name";
pub const OUTPUT_RESOURCE_GROUP_NAME: &str = "resource_group_name";
pub const OUTPUT_NIC_NAME: &str = "nic_name";

/// An infrastructure-as-code tool able to create and tear down a deployment.
pub trait Provisioner {
    /// Checks the tool is usable before anything gets created
    fn preflight(&self) -> Result<(), String> {
        Ok(())
    }

    fn init_and_apply(&self) -> Result<(), ProvisionError>;

    /// Value of a declared output. `None` if the deployment does not declare it.
    fn output(&self, name: &str) -> Result<Option<String>, ProvisionError>;

    fn destroy(&self) -> Result<(), ProvisionError>;
}

/// The three outputs the definitions must expose
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentOutputs {
    pub vm_name: String,
    pub resource_group_name: String,
    pub nic_name: String,
}

impl DeploymentOutputs {
    pub fn read<P: Provisioner + ?Sized>(provisioner: &P) -> Result<Self, LifecycleError> {
        Ok(DeploymentOutputs {
            vm_name: required_output(provisioner, OUTPUT_VM_NAME)?,
            resource_group_name: required_output(provisioner, OUTPUT_RESOURCE_GROUP_NAME)?,
            nic_name: required_output(provisioner, OUTPUT_NIC_NAME)?,
        })
    }
}

/// Reads an output which must be present and non-empty
pub fn required_output<P: Provisioner + ?Sized>(provisioner: &P, name: &str) -> Result<String, LifecycleError> {
    match provisioner.output(name).map_err(LifecycleError::Provision)? {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(LifecycleError::OutputMissing { name: name.to_string() }),
    }
}
