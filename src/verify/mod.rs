//! The checks run against a live deployment.
//!
//! Each check collects every failed assertion instead of stopping at the first one, and
//! a failing check never prevents the others from running.

use crate::cloud_functions::{ImageReference, NetworkInterface, ResourceInspector};
use crate::provisioner::DeploymentOutputs;
use crate::retry::DisplayChain;
use crate::utils::global_config::{ImageConfig, LifecycleConfig};
use std::fmt;

/// What the deployment is supposed to look like
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedResources {
    pub vm_name: String,
    pub resource_group_name: String,
    /// Only compared when set
    pub nic_name: Option<String>,
    pub image: ImageConfig,
}

impl ExpectedResources {
    /// Names derived from a naming prefix, Ubuntu 22.04 LTS Gen2 image
    pub fn for_prefix(prefix: &str) -> Self {
        let defaults = crate::utils::global_config::ExpectedConfig::default();
        ExpectedResources {
            vm_name: format!("{}{}", prefix, defaults.vm_suffix),
            resource_group_name: format!("{}{}", prefix, defaults.resource_group_suffix),
            nic_name: None,
            image: defaults.image,
        }
    }

    pub fn from_config(config: &LifecycleConfig) -> Self {
        let prefix = config.naming_prefix();
        ExpectedResources {
            vm_name: format!("{}{}", prefix, config.expected.vm_suffix),
            resource_group_name: format!("{}{}", prefix, config.expected.resource_group_suffix),
            nic_name: config.expected.nic_name.clone(),
            image: config.expected.image.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Check {
    VmAndResourceGroup,
    NetworkInterface,
    VmImage,
}

impl Check {
    pub const ALL: [Check; 3] = [Check::VmAndResourceGroup, Check::NetworkInterface, Check::VmImage];

    pub fn name(self) -> &'static str {
        match self {
            Check::VmAndResourceGroup => "Verify VM and Resource Group",
            Check::NetworkInterface => "Verify Network Interface",
            Check::VmImage => "Verify VM Image",
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckOutcome {
    pub check: Check,
    pub failures: Vec<String>,
}

impl CheckOutcome {
    fn new(check: Check) -> Self {
        CheckOutcome { check, failures: Vec::new() }
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    fn assert_true(&mut self, cond: bool, msg: &str) {
        if !cond {
            self.failures.push(msg.to_string());
        }
    }

    fn assert_eq(&mut self, expected: &str, actual: &str, msg: &str) {
        if expected != actual {
            self.failures
                .push(format!("{}: expected \"{}\", got \"{}\"", msg, expected, actual));
        }
    }

    fn fail(&mut self, msg: String) {
        self.failures.push(msg);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationReport {
    pub outcomes: Vec<CheckOutcome>,
}

impl VerificationReport {
    pub fn passed(&self) -> bool {
        self.outcomes.iter().all(CheckOutcome::passed)
    }

    pub fn outcome(&self, check: Check) -> Option<&CheckOutcome> {
        self.outcomes.iter().find(|o| o.check == check)
    }

    pub fn failed_names(&self) -> Vec<&'static str> {
        self.outcomes
            .iter()
            .filter(|o| !o.passed())
            .map(|o| o.check.name())
            .collect()
    }

    /// One line per check, failures indented underneath
    pub fn log(&self) {
        for outcome in &self.outcomes {
            if outcome.passed() {
                tracing::info!(check = outcome.check.name(), "PASS");
            } else {
                for failure in &outcome.failures {
                    tracing::error!(check = outcome.check.name(), "FAIL: {}", failure);
                }
            }
        }
    }
}

/// Runs all three checks and records each result
pub fn verify<I: ResourceInspector + ?Sized>(
    inspector: &I,
    outputs: &DeploymentOutputs,
    expected: &ExpectedResources,
) -> VerificationReport {
    let outcomes = Check::ALL
        .iter()
        .map(|check| match check {
            Check::VmAndResourceGroup => check_vm_and_resource_group(inspector, outputs, expected),
            Check::NetworkInterface => check_network_interface(inspector, outputs, expected),
            Check::VmImage => check_vm_image(inspector, outputs, expected),
        })
        .collect();
    VerificationReport { outcomes }
}

fn check_vm_and_resource_group<I: ResourceInspector + ?Sized>(
    inspector: &I,
    outputs: &DeploymentOutputs,
    expected: &ExpectedResources,
) -> CheckOutcome {
    let mut out = CheckOutcome::new(Check::VmAndResourceGroup);
    out.assert_eq(
        &expected.vm_name,
        &outputs.vm_name,
        &format!("VM name should be {}", expected.vm_name),
    );
    out.assert_eq(
        &expected.resource_group_name,
        &outputs.resource_group_name,
        &format!("Resource group name should be {}", expected.resource_group_name),
    );
    match inspector.virtual_machine_exists(&outputs.vm_name, &outputs.resource_group_name) {
        Ok(exists) => out.assert_true(exists, "VM should exist"),
        Err(e) => out.fail(format!("could not look up VM: {}", DisplayChain(&e))),
    }
    out
}

fn check_network_interface<I: ResourceInspector + ?Sized>(
    inspector: &I,
    outputs: &DeploymentOutputs,
    expected: &ExpectedResources,
) -> CheckOutcome {
    let mut out = CheckOutcome::new(Check::NetworkInterface);
    if let Some(nic_name) = &expected.nic_name {
        out.assert_eq(nic_name, &outputs.nic_name, &format!("NIC name should be {}", nic_name));
    }
    match inspector.get_network_interface(&outputs.nic_name, &outputs.resource_group_name) {
        Ok(nic) => out.assert_true(
            nic_attached_to(&nic, &outputs.vm_name),
            &format!("NIC {} should be attached to VM {}", outputs.nic_name, outputs.vm_name),
        ),
        Err(e) => out.fail(format!("could not look up NIC {}: {}", outputs.nic_name, DisplayChain(&e))),
    }
    out
}

fn check_vm_image<I: ResourceInspector + ?Sized>(
    inspector: &I,
    outputs: &DeploymentOutputs,
    expected: &ExpectedResources,
) -> CheckOutcome {
    let mut out = CheckOutcome::new(Check::VmImage);
    let vm = match inspector.get_virtual_machine(&outputs.vm_name, &outputs.resource_group_name) {
        Ok(vm) => vm,
        Err(e) => {
            out.fail(format!("Should not encounter error when fetching VM image: {}", DisplayChain(&e)));
            return out;
        }
    };
    let image = match vm.image {
        Some(image) => image,
        None => {
            out.fail(format!("VM {} has no image reference", vm.name));
            return out;
        }
    };
    image_assertions(&mut out, &image, &expected.image);
    out
}

fn image_assertions(out: &mut CheckOutcome, image: &ImageReference, expected: &ImageConfig) {
    out.assert_eq(
        &expected.publisher,
        &image.publisher,
        &format!("VM image publisher should be {}", expected.publisher),
    );
    out.assert_eq(&expected.offer, &image.offer, &format!("VM image offer should be {}", expected.offer));
    out.assert_eq(&expected.sku, &image.sku, &format!("VM image SKU should be {}", expected.sku));
}

/// Resource IDs are full paths, so the VM name only has to appear in the NIC's reference
pub fn nic_attached_to(nic: &NetworkInterface, vm_name: &str) -> bool {
    nic.virtual_machine_id
        .as_ref()
        .map(|id| id.contains(vm_name))
        .unwrap_or(false)
}
