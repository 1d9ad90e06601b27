//! Deployment request and resource identifiers

use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};

/// Kind of resource a plan step manages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    PublicIp,
    /// Virtual network together with the subnet the NIC attaches to
    VirtualNetwork,
    NetworkInterface,
    VirtualMachine,
    /// Template deployment record
    Deployment,
}

impl ResourceKind {
    /// Suffix used for deterministic dependency names (`{vm}-{suffix}`)
    pub fn name_suffix(&self) -> &'static str {
        match self {
            ResourceKind::PublicIp => "pip",
            ResourceKind::VirtualNetwork => "vnet",
            ResourceKind::NetworkInterface => "nic",
            ResourceKind::VirtualMachine => "vm",
            ResourceKind::Deployment => "deployment",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::PublicIp => write!(f, "public-ip"),
            ResourceKind::VirtualNetwork => write!(f, "virtual-network"),
            ResourceKind::NetworkInterface => write!(f, "network-interface"),
            ResourceKind::VirtualMachine => write!(f, "virtual-machine"),
            ResourceKind::Deployment => write!(f, "deployment"),
        }
    }
}

/// Fully-qualified identifier of an existing remote resource
///
/// `/subscriptions/{sub}/resourceGroups/{rg}/providers/{namespace}/{type}/{name}[/{child}/{name}]`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceReference(String);

impl ResourceReference {
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim().trim_end_matches('/');
        let segments: Vec<&str> = trimmed.split('/').skip(1).collect();

        let valid = trimmed.starts_with('/')
            && segments.len() >= 8
            && segments[0].eq_ignore_ascii_case("subscriptions")
            && segments[2].eq_ignore_ascii_case("resourceGroups")
            && segments[4].eq_ignore_ascii_case("providers")
            && segments.len() % 2 == 0
            && segments.iter().all(|s| !s.is_empty());

        if !valid {
            return Err(CloudError::Planning(format!(
                "'{}' is not a fully-qualified resource id \
                 (expected /subscriptions/{{id}}/resourceGroups/{{rg}}/providers/{{namespace}}/{{type}}/{{name}})",
                id
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> Vec<&str> {
        self.0.split('/').skip(1).collect()
    }

    /// Last path segment
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or_default()
    }

    pub fn subscription_id(&self) -> &str {
        self.segments()[1]
    }

    pub fn resource_group(&self) -> &str {
        self.segments()[3]
    }

    /// Resource type including child types, e.g. `Microsoft.Network/virtualNetworks/subnets`
    pub fn resource_type(&self) -> String {
        let segments = self.segments();
        let mut parts = vec![segments[5]];
        parts.extend(segments[6..].iter().step_by(2));
        parts.join("/")
    }

    /// Case-insensitive resource type comparison
    pub fn is_type(&self, resource_type: &str) -> bool {
        self.resource_type().eq_ignore_ascii_case(resource_type)
    }
}

impl TryFrom<String> for ResourceReference {
    type Error = CloudError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<ResourceReference> for String {
    fn from(value: ResourceReference) -> Self {
        value.0
    }
}

impl std::fmt::Display for ResourceReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Marketplace image coordinates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl Default for ImageReference {
    fn default() -> Self {
        Self {
            publisher: "Canonical".to_string(),
            offer: "ubuntu-24_04-lts".to_string(),
            sku: "server".to_string(),
            version: "latest".to_string(),
        }
    }
}

/// OS disk specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiskSpec {
    /// Storage account type, e.g. `Premium_LRS`
    pub storage_type: String,
    /// Size in GiB; the image default when absent
    pub size_gb: Option<u32>,
}

impl Default for DiskSpec {
    fn default() -> Self {
        Self {
            storage_type: "Premium_LRS".to_string(),
            size_gb: None,
        }
    }
}

/// Public IP policy for a deployment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "reference")]
pub enum PublicIpChoice {
    /// No public IP (least exposure)
    #[default]
    None,
    /// Create `{vm}-pip`
    Create,
    /// Attach an existing public IP
    Existing(ResourceReference),
}

/// Network placement of the VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkSpec {
    /// Attach this NIC instead of creating network resources
    pub existing_nic: Option<ResourceReference>,
    /// Attach the new NIC to this subnet instead of creating a virtual network
    pub existing_subnet: Option<ResourceReference>,
    /// Name of the virtual network to create (default `{vm}-vnet`)
    pub vnet_name: Option<String>,
    /// Name of the subnet to create (default `default`)
    pub subnet_name: Option<String>,
    pub address_space: String,
    pub subnet_prefix: String,
    pub public_ip: PublicIpChoice,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            existing_nic: None,
            existing_subnet: None,
            vnet_name: None,
            subnet_name: None,
            address_space: "10.0.0.0/16".to_string(),
            subnet_prefix: "10.0.0.0/24".to_string(),
            public_ip: PublicIpChoice::None,
        }
    }
}

/// OS administrator credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsCredentials {
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl std::fmt::Debug for OsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OsCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Caller-supplied description of a desired virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    pub name: String,
    pub resource_group: String,
    pub location: String,
    pub size: String,
    pub image: ImageReference,
    pub os_disk: DiskSpec,
    pub network: NetworkSpec,
    pub admin: OsCredentials,
}

impl DeploymentRequest {
    /// Request with the default image, disk and network settings
    pub fn new(
        name: impl Into<String>,
        resource_group: impl Into<String>,
        location: impl Into<String>,
        admin_username: impl Into<String>,
        admin_password: Option<String>,
    ) -> Self {
        Self {
            name: name.into(),
            resource_group: resource_group.into(),
            location: location.into(),
            size: "Standard_D2as_v5".to_string(),
            image: ImageReference::default(),
            os_disk: DiskSpec::default(),
            network: NetworkSpec::default(),
            admin: OsCredentials {
                username: admin_username.into(),
                password: admin_password,
            },
        }
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_image(mut self, image: ImageReference) -> Self {
        self.image = image;
        self
    }

    pub fn with_network(mut self, network: NetworkSpec) -> Self {
        self.network = network;
        self
    }

    pub fn with_public_ip(mut self, choice: PublicIpChoice) -> Self {
        self.network.public_ip = choice;
        self
    }
}
