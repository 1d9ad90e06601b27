//! Typed Azure Resource Manager request bodies and resource paths

use serde::Serialize;
use serde_json::Value;
use vmflow_cloud::{
    CloudError, ImageReference, NetworkInterfaceSpec, PublicIpSpec, ResourceKind,
    ResourceReference, ResourceSpec, Result, StepRef, VirtualMachineSpec, VirtualNetworkSpec,
};

pub const NETWORK_API_VERSION: &str = "2023-09-01";
pub const COMPUTE_API_VERSION: &str = "2024-07-01";
pub const DISK_API_VERSION: &str = "2023-04-02";
pub const DEPLOYMENT_API_VERSION: &str = "2021-04-01";
pub const SUBSCRIPTION_API_VERSION: &str = "2022-12-01";
pub const RESOURCE_SKU_API_VERSION: &str = "2021-07-01";

/// `{namespace}/{type}` and api-version for each managed kind
pub fn provider_type(kind: ResourceKind) -> (&'static str, &'static str) {
    match kind {
        ResourceKind::PublicIp => ("Microsoft.Network/publicIPAddresses", NETWORK_API_VERSION),
        ResourceKind::VirtualNetwork => ("Microsoft.Network/virtualNetworks", NETWORK_API_VERSION),
        ResourceKind::NetworkInterface => {
            ("Microsoft.Network/networkInterfaces", NETWORK_API_VERSION)
        }
        ResourceKind::VirtualMachine => ("Microsoft.Compute/virtualMachines", COMPUTE_API_VERSION),
        ResourceKind::Deployment => ("Microsoft.Resources/deployments", DEPLOYMENT_API_VERSION),
    }
}

/// Fully-qualified id of a resource in `resource_group`
pub fn resource_id(
    subscription_id: &str,
    resource_group: &str,
    kind: ResourceKind,
    name: &str,
) -> String {
    let (provider, _) = provider_type(kind);
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/{}/{}",
        subscription_id, resource_group, provider, name
    )
}

/// Request path (id plus api-version) for a resource
pub fn resource_path(id: &str, api_version: &str) -> String {
    format!("{}?api-version={}", id, api_version)
}

/// Kind a reference points at, when vmflow manages that type
pub fn kind_of(reference: &ResourceReference) -> Option<ResourceKind> {
    [
        ResourceKind::PublicIp,
        ResourceKind::VirtualNetwork,
        ResourceKind::NetworkInterface,
        ResourceKind::VirtualMachine,
        ResourceKind::Deployment,
    ]
    .into_iter()
    .find(|kind| reference.is_type(provider_type(*kind).0))
}

/// api-version of the resource family a reference belongs to
pub fn api_version_for(reference: &ResourceReference) -> Result<&'static str> {
    let resource_type = reference.resource_type().to_ascii_lowercase();
    let version = match resource_type.split('/').next().unwrap_or_default() {
        "microsoft.network" => NETWORK_API_VERSION,
        "microsoft.resources" => DEPLOYMENT_API_VERSION,
        "microsoft.compute" if resource_type.starts_with("microsoft.compute/disks") => {
            DISK_API_VERSION
        }
        "microsoft.compute" => COMPUTE_API_VERSION,
        _ => {
            return Err(CloudError::Planning(format!(
                "unsupported resource type {}",
                reference.resource_type()
            )));
        }
    };
    Ok(version)
}

#[derive(Serialize)]
struct Resource<P> {
    location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sku: Option<Sku>,
    properties: P,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Sku {
    name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    tier: Option<&'static str>,
}

#[derive(Serialize)]
struct IdRef {
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicIpProperties {
    #[serde(rename = "publicIPAllocationMethod")]
    public_ip_allocation_method: &'static str,
    #[serde(rename = "publicIPAddressVersion")]
    public_ip_address_version: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VirtualNetworkProperties {
    address_space: AddressSpace,
    subnets: Vec<Subnet>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddressSpace {
    address_prefixes: Vec<String>,
}

#[derive(Serialize)]
struct Subnet {
    name: String,
    properties: SubnetProperties,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubnetProperties {
    address_prefix: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkInterfaceProperties {
    ip_configurations: Vec<IpConfiguration>,
}

#[derive(Serialize)]
struct IpConfiguration {
    name: &'static str,
    properties: IpConfigurationProperties,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IpConfigurationProperties {
    subnet: IdRef,
    #[serde(rename = "privateIPAllocationMethod")]
    private_ip_allocation_method: &'static str,
    #[serde(rename = "publicIPAddress", skip_serializing_if = "Option::is_none")]
    public_ip_address: Option<IdRef>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct VirtualMachineProperties<'a> {
    hardware_profile: HardwareProfile<'a>,
    storage_profile: StorageProfile<'a>,
    os_profile: OsProfile<'a>,
    network_profile: NetworkProfile,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HardwareProfile<'a> {
    vm_size: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StorageProfile<'a> {
    image_reference: &'a ImageReference,
    os_disk: OsDisk<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OsDisk<'a> {
    name: &'a str,
    caching: &'static str,
    create_option: &'static str,
    managed_disk: ManagedDisk<'a>,
    #[serde(rename = "diskSizeGB", skip_serializing_if = "Option::is_none")]
    disk_size_gb: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ManagedDisk<'a> {
    storage_account_type: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OsProfile<'a> {
    computer_name: &'a str,
    admin_username: &'a str,
    admin_password: &'a str,
    linux_configuration: LinuxConfiguration,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LinuxConfiguration {
    #[serde(rename = "provisionVMAgent")]
    provision_vm_agent: bool,
    patch_settings: PatchSettings,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PatchSettings {
    patch_mode: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NetworkProfile {
    network_interfaces: Vec<NetworkInterfaceRef>,
}

#[derive(Serialize)]
struct NetworkInterfaceRef {
    id: String,
    properties: Primary,
}

#[derive(Serialize)]
struct Primary {
    primary: bool,
}

/// Request body for creating `spec` named `name`.
///
/// `outputs` holds the resource ids produced by the steps executed so far,
/// indexed by step.
pub fn build_body(name: &str, spec: &ResourceSpec, outputs: &[String]) -> Result<Value> {
    match spec {
        ResourceSpec::PublicIp(spec) => public_ip(spec),
        ResourceSpec::VirtualNetwork(spec) => virtual_network(spec),
        ResourceSpec::NetworkInterface(spec) => network_interface(spec, outputs),
        ResourceSpec::VirtualMachine(spec) => virtual_machine(name, spec, outputs),
    }
}

fn output(outputs: &[String], step: StepRef) -> Result<&str> {
    outputs.get(step.0).map(String::as_str).ok_or_else(|| {
        CloudError::Planning(format!("step {} has not produced a resource id yet", step.0))
    })
}

fn public_ip(spec: &PublicIpSpec) -> Result<Value> {
    Ok(serde_json::to_value(Resource {
        location: spec.location.clone(),
        sku: Some(Sku {
            name: "Standard",
            tier: Some("Regional"),
        }),
        properties: PublicIpProperties {
            public_ip_allocation_method: "Static",
            public_ip_address_version: "IPv4",
        },
    })?)
}

fn virtual_network(spec: &VirtualNetworkSpec) -> Result<Value> {
    Ok(serde_json::to_value(Resource {
        location: spec.location.clone(),
        sku: None,
        properties: VirtualNetworkProperties {
            address_space: AddressSpace {
                address_prefixes: vec![spec.address_space.clone()],
            },
            subnets: vec![Subnet {
                name: spec.subnet_name.clone(),
                properties: SubnetProperties {
                    address_prefix: spec.subnet_prefix.clone(),
                },
            }],
        },
    })?)
}

fn network_interface(
    spec: &NetworkInterfaceSpec,
    outputs: &[String],
) -> Result<Value> {
    let subnet = output(outputs, spec.subnet)?;
    let public_ip = spec
        .public_ip
        .map(|step| output(outputs, step))
        .transpose()?;

    Ok(serde_json::to_value(Resource {
        location: spec.location.clone(),
        sku: None,
        properties: NetworkInterfaceProperties {
            ip_configurations: vec![IpConfiguration {
                name: "ipconfig1",
                properties: IpConfigurationProperties {
                    subnet: IdRef {
                        id: subnet.to_string(),
                    },
                    private_ip_allocation_method: "Dynamic",
                    public_ip_address: public_ip.map(|id| IdRef { id: id.to_string() }),
                },
            }],
        },
    })?)
}

fn virtual_machine(
    name: &str,
    spec: &VirtualMachineSpec,
    outputs: &[String],
) -> Result<Value> {
    let nic = output(outputs, spec.nic)?;
    let password = spec
        .admin
        .password
        .as_deref()
        .ok_or_else(|| CloudError::Planning("admin.password is required".to_string()))?;

    Ok(serde_json::to_value(Resource {
        location: spec.location.clone(),
        sku: None,
        properties: VirtualMachineProperties {
            hardware_profile: HardwareProfile { vm_size: &spec.size },
            storage_profile: StorageProfile {
                image_reference: &spec.image,
                os_disk: OsDisk {
                    name: &spec.os_disk_name,
                    caching: "ReadWrite",
                    create_option: "FromImage",
                    managed_disk: ManagedDisk {
                        storage_account_type: &spec.os_disk.storage_type,
                    },
                    disk_size_gb: spec.os_disk.size_gb,
                },
            },
            os_profile: OsProfile {
                computer_name: name,
                admin_username: &spec.admin.username,
                admin_password: password,
                linux_configuration: LinuxConfiguration {
                    provision_vm_agent: true,
                    patch_settings: PatchSettings {
                        patch_mode: "ImageDefault",
                    },
                },
            },
            network_profile: NetworkProfile {
                network_interfaces: vec![NetworkInterfaceRef {
                    id: nic.to_string(),
                    properties: Primary { primary: true },
                }],
            },
        },
    })?)
}

/// Body of a template deployment
pub fn deployment_body(template: &Value, parameters: &Value, mode: &str) -> Value {
    serde_json::json!({
        "properties": {
            "mode": mode,
            "template": template,
            "parameters": if parameters.is_null() { serde_json::json!({}) } else { parameters.clone() },
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmflow_cloud::{DeploymentRequest, PublicIpChoice, StepAction};

    const SUB: &str = "sub-1";

    fn outputs_for(plan: &vmflow_cloud::ProvisioningPlan) -> Vec<String> {
        plan.steps()
            .iter()
            .map(|s| resource_id(SUB, "rg", s.kind, &s.name))
            .collect()
    }

    #[test]
    fn test_vm_body_shape() {
        let request = DeploymentRequest::new("vm01", "rg", "eastasia", "azureuser", Some("P@ssw0rd!23".into()));
        let plan = vmflow_cloud::plan(&request).unwrap();
        let outputs = outputs_for(&plan);
        let vm = plan.steps().last().unwrap();
        let StepAction::Create(spec) = &vm.action else {
            panic!("vm step must create");
        };

        let body = build_body(&vm.name, spec, &outputs).unwrap();

        assert_eq!(body["location"], "eastasia");
        let props = &body["properties"];
        assert_eq!(props["hardwareProfile"]["vmSize"], "Standard_D2as_v5");
        assert_eq!(props["storageProfile"]["imageReference"]["publisher"], "Canonical");
        assert_eq!(props["storageProfile"]["osDisk"]["name"], "vm01-osdisk");
        assert_eq!(props["storageProfile"]["osDisk"]["createOption"], "FromImage");
        assert_eq!(
            props["storageProfile"]["osDisk"]["managedDisk"]["storageAccountType"],
            "Premium_LRS"
        );
        assert!(props["storageProfile"]["osDisk"].get("diskSizeGB").is_none());
        assert_eq!(props["osProfile"]["computerName"], "vm01");
        assert_eq!(props["osProfile"]["linuxConfiguration"]["provisionVMAgent"], true);
        assert_eq!(props["networkProfile"]["networkInterfaces"][0]["id"], outputs[1]);
        assert_eq!(props["networkProfile"]["networkInterfaces"][0]["properties"]["primary"], true);
    }

    #[test]
    fn test_nic_body_references_earlier_outputs() {
        let request = DeploymentRequest::new("vm01", "rg", "eastasia", "azureuser", Some("pw".into()))
            .with_public_ip(PublicIpChoice::Create);
        let plan = vmflow_cloud::plan(&request).unwrap();
        let outputs = vec!["/pip-id".to_string(), "/vnet-id/subnets/default".to_string()];
        let nic = &plan.steps()[2];
        let StepAction::Create(spec) = &nic.action else {
            panic!("nic step must create");
        };

        let body = build_body(&nic.name, spec, &outputs).unwrap();
        let ipconfig = &body["properties"]["ipConfigurations"][0];
        assert_eq!(ipconfig["name"], "ipconfig1");
        assert_eq!(ipconfig["properties"]["subnet"]["id"], "/vnet-id/subnets/default");
        assert_eq!(ipconfig["properties"]["publicIPAddress"]["id"], "/pip-id");
        assert_eq!(ipconfig["properties"]["privateIPAllocationMethod"], "Dynamic");

        // missing upstream output
        assert!(build_body(&nic.name, spec, &outputs[..1]).is_err());
    }

    #[test]
    fn test_api_versions_by_family() {
        let vm = ResourceReference::parse(resource_id(SUB, "rg", ResourceKind::VirtualMachine, "vm01")).unwrap();
        let nic = ResourceReference::parse(resource_id(SUB, "rg", ResourceKind::NetworkInterface, "nic")).unwrap();
        let disk = ResourceReference::parse(
            "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Compute/disks/vm01-osdisk",
        )
        .unwrap();
        let storage = ResourceReference::parse(
            "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Storage/storageAccounts/st",
        )
        .unwrap();

        assert_eq!(api_version_for(&vm).unwrap(), COMPUTE_API_VERSION);
        assert_eq!(api_version_for(&nic).unwrap(), NETWORK_API_VERSION);
        assert_eq!(api_version_for(&disk).unwrap(), DISK_API_VERSION);
        assert!(api_version_for(&storage).is_err());
        assert_eq!(kind_of(&vm), Some(ResourceKind::VirtualMachine));
        assert_eq!(kind_of(&disk), None);
    }
}
