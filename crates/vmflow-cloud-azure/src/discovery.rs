//! Read-only discovery and inspection
//!
//! Catalog lookups (locations, sizes, images, disk types) return bounded
//! [`Listing`]s; VM inspection returns typed summaries of what exists.

use crate::client::ArmClient;
use crate::error::Result;
use crate::payload::{
    COMPUTE_API_VERSION, RESOURCE_SKU_API_VERSION, SUBSCRIPTION_API_VERSION, resource_id,
    resource_path,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use vmflow_cloud::{CloudError, ListQuery, Listable, Listing, ResourceKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub name: String,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region_type: Option<String>,
}

impl Listable for Location {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSize {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    pub cores: u32,
    pub memory_mb: u64,
    /// Availability zones offering the size
    pub zones: Vec<String>,
}

impl Listable for VmSize {
    fn name(&self) -> &str {
        &self.name
    }

    fn cores(&self) -> Option<u32> {
        Some(self.cores)
    }

    fn memory_mb(&self) -> Option<u64> {
        Some(self.memory_mb)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiskType {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
}

impl Listable for DiskType {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Level of the image catalog a listing was taken from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CatalogLevel {
    Publisher,
    Offer,
    Sku,
    Version,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub name: String,
    pub level: CatalogLevel,
}

impl Listable for CatalogEntry {
    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmSummary {
    pub name: String,
    pub id: String,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

impl VmSummary {
    fn from_value(value: &Value) -> Self {
        let text = |pointer: &str| value.pointer(pointer).and_then(Value::as_str).map(str::to_string);
        Self {
            name: text("/name").unwrap_or_default(),
            id: text("/id").unwrap_or_default(),
            location: text("/location").unwrap_or_default(),
            size: text("/properties/hardwareProfile/vmSize"),
            provisioning_state: text("/properties/provisioningState"),
        }
    }
}

/// One page of virtual machines
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmPage {
    pub vms: Vec<VmSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VmStatus {
    pub name: String,
    pub id: String,
    pub location: String,
    pub provisioning_state: Option<String>,
    pub power_state: Option<String>,
}

pub struct Discovery {
    client: Arc<ArmClient>,
}

impl Discovery {
    pub fn new(client: Arc<ArmClient>) -> Self {
        Self { client }
    }

    pub async fn list_locations(&self, query: &ListQuery) -> Result<Listing<Location>> {
        let path = self.client.subscription_path(&format!(
            "/locations?api-version={}",
            SUBSCRIPTION_API_VERSION
        ));
        let items = self.client.collect_all(path).await?;
        let locations = items.iter().filter_map(|item| {
            let name = item.get("name")?.as_str()?.to_string();
            Some(Location {
                display_name: item
                    .get("displayName")
                    .and_then(Value::as_str)
                    .unwrap_or(&name)
                    .to_string(),
                region_type: item
                    .pointer("/metadata/regionType")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                name,
            })
        });
        Ok(Listing::select(locations.collect::<Vec<_>>(), query))
    }

    pub async fn list_vm_sizes(&self, location: &str, query: &ListQuery) -> Result<Listing<VmSize>> {
        let skus = self.resource_skus(location).await?;
        let mut sizes: BTreeMap<String, VmSize> = BTreeMap::new();
        for sku in skus.iter().filter(|s| is_resource_type(s, "virtualMachines")) {
            if is_restricted(sku) {
                continue;
            }
            let Some(name) = sku.get("name").and_then(Value::as_str) else {
                continue;
            };
            let cores = capability(sku, "vCPUs").map(|v| v as u32).unwrap_or(0);
            let memory_mb = capability(sku, "MemoryGB")
                .map(|gb| (gb * 1024.0).round() as u64)
                .unwrap_or(0);
            let zones = sku
                .pointer("/locationInfo/0/zones")
                .and_then(Value::as_array)
                .map(|zones| {
                    let mut zones: Vec<String> = zones
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect();
                    zones.sort();
                    zones
                })
                .unwrap_or_default();
            sizes.entry(name.to_string()).or_insert(VmSize {
                name: name.to_string(),
                family: sku.get("family").and_then(Value::as_str).map(str::to_string),
                cores,
                memory_mb,
                zones,
            });
        }
        Ok(Listing::select(sizes.into_values(), query))
    }

    pub async fn list_disk_types(&self, location: &str, query: &ListQuery) -> Result<Listing<DiskType>> {
        let skus = self.resource_skus(location).await?;
        let mut types: BTreeMap<String, DiskType> = BTreeMap::new();
        for sku in skus.iter().filter(|s| is_resource_type(s, "disks")) {
            if let Some(name) = sku.get("name").and_then(Value::as_str) {
                types.entry(name.to_string()).or_insert(DiskType {
                    name: name.to_string(),
                    tier: sku.get("tier").and_then(Value::as_str).map(str::to_string),
                });
            }
        }
        Ok(Listing::select(types.into_values(), query))
    }

    pub async fn list_image_publishers(
        &self,
        location: &str,
        query: &ListQuery,
    ) -> Result<Listing<CatalogEntry>> {
        let path = self.image_path(location, "/publishers", "");
        self.catalog(&path, CatalogLevel::Publisher, query).await
    }

    /// Browse one level of the marketplace catalog.
    ///
    /// Without `offer` lists the publisher's offers, with `offer` its SKUs and
    /// with both `offer` and `sku` the available versions.
    pub async fn list_image_catalog(
        &self,
        location: &str,
        publisher: &str,
        offer: Option<&str>,
        sku: Option<&str>,
        query: &ListQuery,
    ) -> Result<Listing<CatalogEntry>> {
        require("publisher", publisher)?;
        let base = format!("/publishers/{}/artifacttypes/vmimage/offers", publisher);
        match (offer, sku) {
            (None, None) => {
                let path = self.image_path(location, &base, "");
                self.catalog(&path, CatalogLevel::Offer, query).await
            }
            (Some(offer), None) => {
                require("offer", offer)?;
                let path = self.image_path(location, &format!("{}/{}/skus", base, offer), "");
                self.catalog(&path, CatalogLevel::Sku, query).await
            }
            (Some(offer), Some(sku)) => {
                require("offer", offer)?;
                require("sku", sku)?;
                // no $top: search and has_more need every version
                let path = self.image_path(
                    location,
                    &format!("{}/{}/skus/{}/versions", base, offer, sku),
                    "&$orderby=name%20desc",
                );
                self.catalog(&path, CatalogLevel::Version, query).await
            }
            (None, Some(_)) => Err(CloudError::Planning(
                "sku requires offer".to_string(),
            )),
        }
    }

    /// First page of virtual machines, in a resource group or the whole subscription
    pub async fn list_vms_page(&self, resource_group: Option<&str>) -> Result<VmPage> {
        let page = self.client.list_page(&self.vms_path(resource_group)).await?;
        Ok(VmPage {
            vms: page.items.iter().map(VmSummary::from_value).collect(),
            next_link: page.next_link,
        })
    }

    /// Every virtual machine, following next links
    pub async fn list_vms_all(&self, resource_group: Option<&str>) -> Result<Vec<VmSummary>> {
        let items = self.client.collect_all(self.vms_path(resource_group)).await?;
        Ok(items.iter().map(VmSummary::from_value).collect())
    }

    pub async fn instance_view(&self, resource_group: &str, vm_name: &str) -> Result<Value> {
        let id = self.vm_id(resource_group, vm_name)?;
        self.client
            .get(&format!(
                "{}/instanceView?api-version={}",
                id, COMPUTE_API_VERSION
            ))
            .await
    }

    /// Power state code such as `running` or `deallocated`
    pub async fn power_state(&self, resource_group: &str, vm_name: &str) -> Result<Option<String>> {
        let view = self.instance_view(resource_group, vm_name).await?;
        Ok(power_state_of(&view))
    }

    pub async fn vm_status(&self, resource_group: &str, vm_name: &str) -> Result<VmStatus> {
        let id = self.vm_id(resource_group, vm_name)?;
        let vm = self
            .client
            .get(&format!(
                "{}&$expand=instanceView",
                resource_path(&id, COMPUTE_API_VERSION)
            ))
            .await?;
        let summary = VmSummary::from_value(&vm);
        let power_state = vm
            .pointer("/properties/instanceView")
            .and_then(power_state_of);
        Ok(VmStatus {
            name: if summary.name.is_empty() {
                vm_name.to_string()
            } else {
                summary.name
            },
            id: if summary.id.is_empty() { id } else { summary.id },
            location: summary.location,
            provisioning_state: summary.provisioning_state,
            power_state,
        })
    }

    async fn resource_skus(&self, location: &str) -> Result<Vec<Value>> {
        require("location", location)?;
        let path = self.client.subscription_path(&format!(
            "/providers/Microsoft.Compute/skus?api-version={}&$filter=location%20eq%20'{}'",
            RESOURCE_SKU_API_VERSION, location
        ));
        let skus = self.client.collect_all(path).await?;
        // the filter is advisory on some clouds
        Ok(skus
            .into_iter()
            .filter(|sku| {
                sku.get("locations")
                    .and_then(Value::as_array)
                    .is_none_or(|locations| {
                        locations
                            .iter()
                            .filter_map(Value::as_str)
                            .any(|l| l.eq_ignore_ascii_case(location))
                    })
            })
            .collect())
    }

    async fn catalog(
        &self,
        path: &str,
        level: CatalogLevel,
        query: &ListQuery,
    ) -> Result<Listing<CatalogEntry>> {
        let items = self.client.list_page(path).await?.items;
        let entries: Vec<CatalogEntry> = items
            .iter()
            .filter_map(|item| item.get("name").and_then(Value::as_str))
            .map(|name| CatalogEntry {
                name: name.to_string(),
                level,
            })
            .collect();
        Ok(Listing::select(entries, query))
    }

    fn image_path(&self, location: &str, suffix: &str, extra_query: &str) -> String {
        self.client.subscription_path(&format!(
            "/providers/Microsoft.Compute/locations/{}{}?api-version={}{}",
            location, suffix, COMPUTE_API_VERSION, extra_query
        ))
    }

    fn vms_path(&self, resource_group: Option<&str>) -> String {
        let scope = match resource_group {
            Some(rg) if !rg.trim().is_empty() => format!("/resourceGroups/{}", rg),
            _ => String::new(),
        };
        self.client.subscription_path(&format!(
            "{}/providers/Microsoft.Compute/virtualMachines?api-version={}",
            scope, COMPUTE_API_VERSION
        ))
    }

    fn vm_id(&self, resource_group: &str, vm_name: &str) -> Result<String> {
        require("resource_group", resource_group)?;
        require("vm_name", vm_name)?;
        Ok(resource_id(
            self.client.subscription_id(),
            resource_group,
            ResourceKind::VirtualMachine,
            vm_name,
        ))
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        Err(CloudError::Planning(format!("{} is required", field)))
    } else {
        Ok(())
    }
}

fn is_resource_type(sku: &Value, resource_type: &str) -> bool {
    sku.get("resourceType")
        .and_then(Value::as_str)
        .is_some_and(|t| t.eq_ignore_ascii_case(resource_type))
}

/// SKUs the subscription cannot deploy in this location
fn is_restricted(sku: &Value) -> bool {
    sku.get("restrictions")
        .and_then(Value::as_array)
        .is_some_and(|restrictions| {
            restrictions.iter().any(|r| {
                r.get("type").and_then(Value::as_str) == Some("Location")
            })
        })
}

fn capability(sku: &Value, name: &str) -> Option<f64> {
    sku.get("capabilities")?
        .as_array()?
        .iter()
        .find(|c| c.get("name").and_then(Value::as_str) == Some(name))?
        .get("value")?
        .as_str()?
        .parse()
        .ok()
}

/// `PowerState/running` -> `running`
pub fn power_state_of(instance_view: &Value) -> Option<String> {
    instance_view
        .get("statuses")?
        .as_array()?
        .iter()
        .filter_map(|s| s.get("code").and_then(Value::as_str))
        .find_map(|code| code.strip_prefix("PowerState/"))
        .map(str::to_string)
}
