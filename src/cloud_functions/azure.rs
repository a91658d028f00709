use crate::cloud_functions::{ImageReference, NetworkInterface, ResourceInspector, VirtualMachine};
use crate::error::InspectError;
use crate::shell_tools::{self, ShellCommand};
use crate::utils::global_config::LifecycleConfig;
use regex::Regex;
use serde::Deserialize;

lazy_static! {
    static ref NOT_FOUND: Regex =
        Regex::new(r"\((ResourceNotFound|ResourceGroupNotFound)\)").expect("invalid not-found pattern");
}

/// Queries Azure through the `az` command line tool
#[derive(Debug, Clone)]
pub struct AzureCli {
    binary: String,
    subscription_id: String,
}

impl AzureCli {
    pub fn new(binary: &str, subscription_id: Option<String>) -> Result<Self, InspectError> {
        let subscription_id = subscription_id.ok_or(InspectError::MissingSubscription)?;
        Ok(AzureCli {
            binary: binary.to_string(),
            subscription_id,
        })
    }

    pub fn from_config(config: &LifecycleConfig) -> Result<Self, InspectError> {
        Self::new(&config.azure.cli_binary, config.subscription_id())
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    fn show(&self, kind: &[&str], name: &str, resource_group: &str) -> ShellCommand {
        ShellCommand::new(&self.binary)
            .args(kind.iter().copied())
            .args(vec![
                "show",
                "--resource-group",
                resource_group,
                "--name",
                name,
                "--subscription",
                self.subscription_id.as_str(),
                "--output",
                "json",
            ])
    }

    fn check_logged_in(&self) -> Result<(), String> {
        let res = ShellCommand::new(&self.binary)
            .args(vec!["account", "show", "--subscription", self.subscription_id.as_str()])
            .run();
        match res.failure() {
            false => Ok(()),
            true => Err(format!(
                "Azure CLI is installed but does not seem to be logged in to subscription {}. Please run \"{} login\".",
                self.subscription_id, self.binary
            )),
        }
    }
}

impl ResourceInspector for AzureCli {
    fn preflight(&self) -> Result<(), String> {
        match shell_tools::check_command_exist(&self.binary) {
            true => self.check_logged_in(),
            false => Err(format!(
                "Azure CLI is not installed on this system with path '{}', please check the provided path in the config file and/or install Azure CLI.",
                self.binary
            )),
        }
    }

    fn virtual_machine_exists(&self, vm_name: &str, resource_group: &str) -> Result<bool, InspectError> {
        let res = self.show(&["vm"], vm_name, resource_group).run();
        if res.non_zero_exit() && NOT_FOUND.is_match(res.stderr()) {
            return Ok(false);
        }
        res.into_result()?;
        Ok(true)
    }

    fn get_virtual_machine(&self, vm_name: &str, resource_group: &str) -> Result<VirtualMachine, InspectError> {
        let details = self.show(&["vm"], vm_name, resource_group).run().into_result()?;
        parse_virtual_machine(&details.stdout)
    }

    fn get_network_interface(&self, nic_name: &str, resource_group: &str) -> Result<NetworkInterface, InspectError> {
        let details = self.show(&["network", "nic"], nic_name, resource_group).run().into_result()?;
        parse_network_interface(&details.stdout)
    }
}

// Only the fields we look at. The Azure CLI prints a lot more.

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureVm {
    id: String,
    name: String,
    storage_profile: Option<AzureStorageProfile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureStorageProfile {
    image_reference: Option<AzureImageReference>,
}

#[derive(Debug, Deserialize)]
struct AzureImageReference {
    publisher: Option<String>,
    offer: Option<String>,
    sku: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzureNic {
    id: String,
    name: String,
    virtual_machine: Option<SubResource>,
}

#[derive(Debug, Deserialize)]
struct SubResource {
    id: String,
}

pub(crate) fn parse_virtual_machine(json: &str) -> Result<VirtualMachine, InspectError> {
    let vm: AzureVm = serde_json::from_str(json).map_err(|source| InspectError::Parse {
        what: "virtual machine",
        source,
    })?;

    let image = vm
        .storage_profile
        .and_then(|sp| sp.image_reference)
        .map(|ir| ImageReference {
            publisher: ir.publisher.unwrap_or_default(),
            offer: ir.offer.unwrap_or_default(),
            sku: ir.sku.unwrap_or_default(),
            version: ir.version.unwrap_or_default(),
        });

    Ok(VirtualMachine {
        id: vm.id,
        name: vm.name,
        image,
    })
}

pub(crate) fn parse_network_interface(json: &str) -> Result<NetworkInterface, InspectError> {
    let nic: AzureNic = serde_json::from_str(json).map_err(|source| InspectError::Parse {
        what: "network interface",
        source,
    })?;

    Ok(NetworkInterface {
        id: nic.id,
        name: nic.name,
        virtual_machine_id: nic.virtual_machine.map(|vm| vm.id),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shell_tools::testing::fake_program;
    use assert_matches::assert_matches;

    const VM_JSON: &str = r#"{
        "id": "/subscriptions/127e7a44-d802-42e4-b654-a434382666ac/resourceGroups/duan0027-A05-RG/providers/Microsoft.Compute/virtualMachines/duan0027A05VM",
        "location": "canadacentral",
        "name": "duan0027A05VM",
        "networkProfile": {
            "networkInterfaces": [
                { "id": "/subscriptions/127e7a44-d802-42e4-b654-a434382666ac/resourceGroups/duan0027-A05-RG/providers/Microsoft.Network/networkInterfaces/duan0027A05NIC" }
            ]
        },
        "storageProfile": {
            "imageReference": {
                "exactVersion": "22.04.202409010",
                "offer": "0001-com-ubuntu-server-jammy",
                "publisher": "Canonical",
                "sku": "22_04-lts-gen2",
                "version": "latest"
            },
            "osDisk": { "caching": "ReadWrite" }
        }
    }"#;

    const NIC_JSON: &str = r#"{
        "id": "/subscriptions/127e7a44-d802-42e4-b654-a434382666ac/resourceGroups/duan0027-A05-RG/providers/Microsoft.Network/networkInterfaces/duan0027A05NIC",
        "name": "duan0027A05NIC",
        "primary": true,
        "virtualMachine": {
            "id": "/subscriptions/127e7a44-d802-42e4-b654-a434382666ac/resourceGroups/DUAN0027-A05-RG/providers/Microsoft.Compute/virtualMachines/duan0027A05VM",
            "resourceGroup": "DUAN0027-A05-RG"
        }
    }"#;

    #[test]
    fn parses_vm_image() {
        let vm = parse_virtual_machine(VM_JSON).unwrap();
        assert_eq!(vm.name, "duan0027A05VM");
        assert!(vm.id.ends_with("/virtualMachines/duan0027A05VM"));
        let image = vm.image.unwrap();
        assert_eq!(image.publisher, "Canonical");
        assert_eq!(image.offer, "0001-com-ubuntu-server-jammy");
        assert_eq!(image.sku, "22_04-lts-gen2");
        assert_eq!(image.version, "latest");
    }

    #[test]
    fn vm_without_image_reference() {
        let vm = parse_virtual_machine(r#"{"id": "/x/virtualMachines/vm", "name": "vm", "storageProfile": {}}"#).unwrap();
        assert_eq!(vm.image, None);
    }

    #[test]
    fn parses_nic_attachment() {
        let nic = parse_network_interface(NIC_JSON).unwrap();
        assert_eq!(nic.name, "duan0027A05NIC");
        assert!(nic.virtual_machine_id.unwrap().contains("duan0027A05VM"));
    }

    #[test]
    fn detached_nic() {
        let nic = parse_network_interface(r#"{"id": "/x/networkInterfaces/n", "name": "n", "virtualMachine": null}"#).unwrap();
        assert_eq!(nic.virtual_machine_id, None);
    }

    #[test]
    fn garbage_is_parse_error() {
        assert_matches!(
            parse_virtual_machine("ERROR: something"),
            Err(InspectError::Parse { what: "virtual machine", .. })
        );
    }

    #[test]
    fn not_found_messages() {
        assert!(NOT_FOUND.is_match(
            "ERROR: (ResourceNotFound) The Resource 'Microsoft.Compute/virtualMachines/x' under resource group 'rg' was not found."
        ));
        assert!(NOT_FOUND.is_match("ERROR: (ResourceGroupNotFound) Resource group 'rg' could not be found."));
        assert!(!NOT_FOUND.is_match("ERROR: (AuthorizationFailed) The client does not have authorization"));
    }

    #[test]
    fn subscription_is_required() {
        assert_matches!(AzureCli::new("az", None), Err(InspectError::MissingSubscription));
        let az = AzureCli::new("az", Some("sub".to_string())).unwrap();
        assert_eq!(az.subscription_id(), "sub");
    }

    #[test]
    fn show_command_targets_subscription() {
        let az = AzureCli::new("az", Some("sub".to_string())).unwrap();
        assert_eq!(
            az.show(&["network", "nic"], "nic0", "rg").display(),
            "az network nic show --resource-group rg --name nic0 --subscription sub --output json"
        );
    }

    fn fake_az(dir: &std::path::Path, body: &str) -> AzureCli {
        let bin = fake_program(dir, "az", body);
        AzureCli::new(bin.to_str().unwrap(), Some("sub".to_string())).unwrap()
    }

    #[test]
    fn missing_vm_does_not_exist() {
        let dir = tempfile::tempdir().unwrap();
        let az = fake_az(
            dir.path(),
            "echo \"ERROR: (ResourceNotFound) The Resource 'Microsoft.Compute/virtualMachines/$6' under resource group '$4' was not found.\" >&2; exit 3",
        );
        assert!(!az.virtual_machine_exists("duan0027A05VM", "duan0027-A05-RG").unwrap());
    }

    #[test]
    fn found_vm_exists() {
        let dir = tempfile::tempdir().unwrap();
        let az = fake_az(dir.path(), &format!("cat <<'EOF'\n{}\nEOF", VM_JSON));
        assert!(az.virtual_machine_exists("duan0027A05VM", "duan0027-A05-RG").unwrap());
        let vm = az.get_virtual_machine("duan0027A05VM", "duan0027-A05-RG").unwrap();
        assert_eq!(vm.image.unwrap().sku, "22_04-lts-gen2");
    }

    #[test]
    fn other_failures_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let az = fake_az(
            dir.path(),
            "echo 'ERROR: (AuthorizationFailed) The client does not have authorization' >&2; exit 1",
        );
        assert_matches!(
            az.virtual_machine_exists("duan0027A05VM", "duan0027-A05-RG"),
            Err(InspectError::Command(_))
        );
    }
}
