//! Resource graph builder
//!
//! Turns a [`DeploymentRequest`] into a [`ProvisioningPlan`] without touching
//! the network. Planning starts at the virtual machine and walks its
//! dependencies depth-first, emitting each dependency before the step that
//! consumes it, so the resulting order is always a valid topological order:
//!
//! ```text
//! public IP ──┐
//!             ├──> network interface ──> virtual machine
//! vnet/subnet ┘
//! ```
//!
//! Dependencies given as existing references become "use existing" steps.
//! Everything else is created under a name derived from the VM name, so
//! re-running the same request targets the same resources.

use crate::error::{CloudError, Result};
use crate::plan::{
    NetworkInterfaceSpec, ProvisioningPlan, PublicIpSpec, ResourceSpec, Step, StepAction, StepRef,
    VirtualMachineSpec, VirtualNetworkSpec,
};
use crate::request::{DeploymentRequest, PublicIpChoice, ResourceKind, ResourceReference};

const NIC_TYPE: &str = "Microsoft.Network/networkInterfaces";
const SUBNET_TYPE: &str = "Microsoft.Network/virtualNetworks/subnets";
const PUBLIC_IP_TYPE: &str = "Microsoft.Network/publicIPAddresses";
const DEFAULT_SUBNET: &str = "default";

/// Build the ordered plan for `request`
pub fn plan(request: &DeploymentRequest) -> Result<ProvisioningPlan> {
    validate(request)?;

    let mut builder = PlanBuilder {
        request,
        steps: Vec::new(),
    };
    builder.virtual_machine()?;

    let plan = ProvisioningPlan::new(&request.name, &request.resource_group, builder.steps)?;
    tracing::debug!("Planned {}: {}", request.name, plan.summary());
    Ok(plan)
}

/// Name of a dependency created for `vm_name`
pub fn derived_name(vm_name: &str, kind: ResourceKind) -> String {
    format!("{}-{}", vm_name, kind.name_suffix())
}

struct PlanBuilder<'a> {
    request: &'a DeploymentRequest,
    steps: Vec<Step>,
}

impl PlanBuilder<'_> {
    fn push(&mut self, kind: ResourceKind, name: String, action: StepAction) -> StepRef {
        let index = self.steps.len();
        let depends_on = match &action {
            StepAction::Create(spec) => spec.dependencies(),
            StepAction::UseExisting(_) => Vec::new(),
        };
        self.steps.push(Step {
            index,
            kind,
            name,
            action,
            depends_on,
        });
        StepRef(index)
    }

    fn use_existing(&mut self, kind: ResourceKind, reference: &ResourceReference) -> StepRef {
        self.push(
            kind,
            reference.name().to_string(),
            StepAction::UseExisting(reference.clone()),
        )
    }

    fn virtual_machine(&mut self) -> Result<StepRef> {
        let nic = self.network_interface()?;
        let request = self.request;
        let spec = VirtualMachineSpec {
            location: request.location.clone(),
            size: request.size.clone(),
            image: request.image.clone(),
            os_disk: request.os_disk.clone(),
            os_disk_name: format!("{}-osdisk", request.name),
            admin: request.admin.clone(),
            nic,
        };
        Ok(self.push(
            ResourceKind::VirtualMachine,
            request.name.clone(),
            StepAction::Create(ResourceSpec::VirtualMachine(spec)),
        ))
    }

    fn network_interface(&mut self) -> Result<StepRef> {
        let network = &self.request.network;
        if let Some(nic) = &network.existing_nic {
            expect_type(nic, NIC_TYPE, "existing_nic")?;
            return Ok(self.use_existing(ResourceKind::NetworkInterface, nic));
        }

        let public_ip = self.public_ip()?;
        let subnet = self.subnet()?;
        let spec = NetworkInterfaceSpec {
            location: self.request.location.clone(),
            subnet,
            public_ip,
        };
        Ok(self.push(
            ResourceKind::NetworkInterface,
            derived_name(&self.request.name, ResourceKind::NetworkInterface),
            StepAction::Create(ResourceSpec::NetworkInterface(spec)),
        ))
    }

    fn public_ip(&mut self) -> Result<Option<StepRef>> {
        match &self.request.network.public_ip {
            PublicIpChoice::None => Ok(None),
            PublicIpChoice::Existing(reference) => {
                expect_type(reference, PUBLIC_IP_TYPE, "public_ip")?;
                Ok(Some(self.use_existing(ResourceKind::PublicIp, reference)))
            }
            PublicIpChoice::Create => {
                let spec = PublicIpSpec {
                    location: self.request.location.clone(),
                };
                Ok(Some(self.push(
                    ResourceKind::PublicIp,
                    derived_name(&self.request.name, ResourceKind::PublicIp),
                    StepAction::Create(ResourceSpec::PublicIp(spec)),
                )))
            }
        }
    }

    fn subnet(&mut self) -> Result<StepRef> {
        let network = &self.request.network;
        if let Some(subnet) = &network.existing_subnet {
            expect_type(subnet, SUBNET_TYPE, "existing_subnet")?;
            return Ok(self.use_existing(ResourceKind::VirtualNetwork, subnet));
        }

        let vnet_name = network
            .vnet_name
            .clone()
            .unwrap_or_else(|| derived_name(&self.request.name, ResourceKind::VirtualNetwork));
        let spec = VirtualNetworkSpec {
            location: self.request.location.clone(),
            address_space: network.address_space.clone(),
            subnet_name: network
                .subnet_name
                .clone()
                .unwrap_or_else(|| DEFAULT_SUBNET.to_string()),
            subnet_prefix: network.subnet_prefix.clone(),
        };
        Ok(self.push(
            ResourceKind::VirtualNetwork,
            vnet_name,
            StepAction::Create(ResourceSpec::VirtualNetwork(spec)),
        ))
    }
}

fn validate(request: &DeploymentRequest) -> Result<()> {
    validate_name("name", &request.name, 64)?;
    validate_name("resource_group", &request.resource_group, 90)?;
    require("location", &request.location)?;
    require("size", &request.size)?;
    require("image.publisher", &request.image.publisher)?;
    require("image.offer", &request.image.offer)?;
    require("image.sku", &request.image.sku)?;
    require("image.version", &request.image.version)?;
    require("os_disk.storage_type", &request.os_disk.storage_type)?;
    require("admin.username", &request.admin.username)?;
    if request.admin.password.as_deref().is_none_or(str::is_empty) {
        return Err(CloudError::Planning(
            "admin.password is required".to_string(),
        ));
    }
    if request.os_disk.size_gb == Some(0) {
        return Err(CloudError::Planning(
            "os_disk.size_gb must be greater than zero".to_string(),
        ));
    }

    let network = &request.network;
    let names_given = network.vnet_name.is_some() || network.subnet_name.is_some();

    if network.existing_nic.is_some() {
        if network.public_ip != PublicIpChoice::None {
            return Err(CloudError::Planning(
                "public_ip cannot be combined with existing_nic; attach the public IP to that NIC instead"
                    .to_string(),
            ));
        }
        if network.existing_subnet.is_some() || names_given {
            return Err(CloudError::Planning(
                "existing_nic conflicts with existing_subnet/vnet_name/subnet_name; the NIC already fixes its subnet"
                    .to_string(),
            ));
        }
    } else if network.existing_subnet.is_some() {
        if names_given {
            return Err(CloudError::Planning(
                "existing_subnet conflicts with vnet_name/subnet_name; choose either an existing subnet or a new one"
                    .to_string(),
            ));
        }
    } else {
        if let Some(vnet) = &network.vnet_name {
            validate_name("network.vnet_name", vnet, 64)?;
        }
        if let Some(subnet) = &network.subnet_name {
            validate_name("network.subnet_name", subnet, 80)?;
        }
        require("network.address_space", &network.address_space)?;
        require("network.subnet_prefix", &network.subnet_prefix)?;
    }

    Ok(())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(CloudError::Planning(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn validate_name(field: &str, value: &str, max_len: usize) -> Result<()> {
    require(field, value)?;
    let starts_ok = value.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let chars_ok = value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if !starts_ok || !chars_ok || value.len() > max_len {
        return Err(CloudError::Planning(format!(
            "{} '{}' must be 1-{} characters of letters, digits, '-', '_' or '.', starting with a letter or digit",
            field, value, max_len
        )));
    }
    Ok(())
}

fn expect_type(reference: &ResourceReference, expected: &str, field: &str) -> Result<()> {
    if reference.is_type(expected) {
        Ok(())
    } else {
        Err(CloudError::Planning(format!(
            "{} must reference a {} resource, got {}",
            field,
            expected,
            reference.resource_type()
        )))
    }
}
