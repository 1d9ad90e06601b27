//! ツール引数の定義

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use vmflow_cloud::{
    CloudError, DeploymentRequest, DiskSpec, ImageReference, ListQuery, NetworkSpec,
    PublicIpChoice, ResourceReference,
};

fn default_location() -> String {
    "eastasia".to_string()
}

fn default_size() -> String {
    "Standard_D2as_v5".to_string()
}

fn default_username() -> String {
    "azureuser".to_string()
}

fn default_true() -> bool {
    true
}

/// リソースグループ指定（任意）
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ResourceGroupParam {
    /// リソースグループ名（省略時はサブスクリプション全体）
    pub resource_group: Option<String>,
}

/// 仮想マシン指定
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VmParam {
    pub resource_group: String,
    pub vm_name: String,
}

/// 仮想マシンのデプロイパラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeployVmParam {
    pub resource_group: String,
    pub vm_name: String,
    /// Azure リージョン（デフォルト: eastasia）
    #[serde(default = "default_location")]
    pub location: String,
    /// VM サイズ（デフォルト: Standard_D2as_v5）
    #[serde(default = "default_size")]
    pub vm_size: String,
    /// 管理者ユーザー名（デフォルト: azureuser）
    #[serde(default = "default_username")]
    pub admin_username: String,
    /// 管理者パスワード（省略時は AZ_TEST_PASS を使用）
    pub admin_password: Option<String>,
    pub image_publisher: Option<String>,
    pub image_offer: Option<String>,
    pub image_sku: Option<String>,
    pub image_version: Option<String>,
    /// OS ディスクの種類（例: Premium_LRS, StandardSSD_LRS）
    pub os_disk_type: Option<String>,
    pub os_disk_size_gb: Option<u32>,
    /// 接続する既存 NIC のリソース ID
    pub nic_id: Option<String>,
    /// 新しい NIC を配置する既存サブネットのリソース ID
    pub subnet_id: Option<String>,
    /// 作成する仮想ネットワーク名（デフォルト: {vm_name}-vnet）
    pub vnet_name: Option<String>,
    /// 作成するサブネット名（デフォルト: default）
    pub subnet_name: Option<String>,
    /// パブリック IP（{vm_name}-pip）を作成する場合は true（デフォルト: false）
    #[serde(default)]
    pub public_ip: bool,
    /// 接続する既存パブリック IP のリソース ID（public_ip=true とは併用不可）
    pub public_ip_id: Option<String>,
}

impl DeployVmParam {
    /// デプロイ要求に変換する。パスワード未指定時は `fallback_password` を使う
    pub fn to_request(
        &self,
        fallback_password: Option<&str>,
    ) -> Result<DeploymentRequest, CloudError> {
        let password = self
            .admin_password
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| fallback_password.map(str::to_string));

        let defaults = ImageReference::default();
        let image = ImageReference {
            publisher: self.image_publisher.clone().unwrap_or(defaults.publisher),
            offer: self.image_offer.clone().unwrap_or(defaults.offer),
            sku: self.image_sku.clone().unwrap_or(defaults.sku),
            version: self.image_version.clone().unwrap_or(defaults.version),
        };

        let public_ip = match (&self.public_ip_id, self.public_ip) {
            (Some(_), true) => {
                return Err(CloudError::Planning(
                    "public_ip=true cannot be combined with public_ip_id".to_string(),
                ));
            }
            (Some(id), false) => PublicIpChoice::Existing(ResourceReference::parse(id.as_str())?),
            (None, true) => PublicIpChoice::Create,
            (None, false) => PublicIpChoice::None,
        };
        let network = NetworkSpec {
            existing_nic: self.nic_id.as_deref().map(ResourceReference::parse).transpose()?,
            existing_subnet: self
                .subnet_id
                .as_deref()
                .map(ResourceReference::parse)
                .transpose()?,
            vnet_name: self.vnet_name.clone(),
            subnet_name: self.subnet_name.clone(),
            public_ip,
            ..NetworkSpec::default()
        };

        let mut request = DeploymentRequest::new(
            &self.vm_name,
            &self.resource_group,
            &self.location,
            &self.admin_username,
            password,
        )
        .with_size(&self.vm_size)
        .with_image(image)
        .with_network(network);
        request.os_disk = DiskSpec {
            storage_type: self
                .os_disk_type
                .clone()
                .unwrap_or(DiskSpec::default().storage_type),
            size_gb: self.os_disk_size_gb,
        };
        Ok(request)
    }
}

/// 仮想マシン削除パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteVmParam {
    pub resource_group: String,
    pub vm_name: String,
    /// 競合時に forceDeletion=true で再試行する（デフォルト: true）
    #[serde(default = "default_true")]
    pub force: bool,
}

/// リソース ID 指定の削除パラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteResourceParam {
    /// リソース ID
    pub resource_id: String,
    #[serde(default)]
    pub force: bool,
}

/// ARM テンプレートのデプロイパラメータ
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeployTemplateParam {
    pub resource_group: String,
    pub deployment_name: String,
    /// テンプレート（オブジェクトまたは JSON 文字列）
    pub template: Value,
    /// パラメータ（オブジェクトまたは JSON 文字列、デフォルト: {}）
    #[serde(default)]
    pub parameters: Value,
    /// Incremental（デフォルト）または Complete
    pub mode: Option<String>,
}

impl DeployTemplateParam {
    pub fn template(&self) -> Result<Value, CloudError> {
        decode_json("template", &self.template)
    }

    pub fn parameters(&self) -> Result<Value, CloudError> {
        decode_json("parameters", &self.parameters)
    }
}

/// オブジェクトでも JSON 文字列でも受け付ける
fn decode_json(field: &str, value: &Value) -> Result<Value, CloudError> {
    match value {
        Value::String(text) => serde_json::from_str(text)
            .map_err(|e| CloudError::Planning(format!("{} is not valid JSON: {}", field, e))),
        other => Ok(other.clone()),
    }
}

/// デプロイメント指定
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeploymentParam {
    pub resource_group: String,
    pub deployment_name: String,
}

/// 検索系ツール共通の絞り込み条件
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct FilterParam {
    /// 名前の部分一致（大文字小文字を区別しない）
    pub search: Option<String>,
    /// 最大件数（デフォルト 50、上限 500）
    pub top: Option<usize>,
}

impl FilterParam {
    pub fn query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            top: self.top,
            ..ListQuery::default()
        }
    }
}

/// リージョン内のカタログ検索
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LocationParam {
    pub location: String,
    #[serde(flatten)]
    pub filter: FilterParam,
}

/// VM サイズ検索
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VmSizesParam {
    pub location: String,
    pub search: Option<String>,
    pub min_cores: Option<u32>,
    pub max_cores: Option<u32>,
    pub min_memory_mb: Option<u64>,
    pub max_memory_mb: Option<u64>,
    pub top: Option<usize>,
}

impl VmSizesParam {
    pub fn query(&self) -> ListQuery {
        ListQuery {
            search: self.search.clone(),
            min_cores: self.min_cores,
            max_cores: self.max_cores,
            min_memory_mb: self.min_memory_mb,
            max_memory_mb: self.max_memory_mb,
            top: self.top,
        }
    }
}

/// Marketplace イメージ検索（オファー → SKU → バージョン）
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct VmImagesParam {
    pub location: String,
    pub publisher: String,
    pub offer: Option<String>,
    /// `offer` の指定が必要
    pub sku: Option<String>,
    #[serde(flatten)]
    pub filter: FilterParam,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn deploy(args: Value) -> DeployVmParam {
        serde_json::from_value(args).unwrap()
    }

    #[test]
    fn test_deploy_defaults() {
        let param = deploy(json!({"resource_group": "rg-demo", "vm_name": "vm01"}));
        let request = param.to_request(Some("Fallback!Pw1")).unwrap();

        assert_eq!(request.location, "eastasia");
        assert_eq!(request.size, "Standard_D2as_v5");
        assert_eq!(request.admin.username, "azureuser");
        assert_eq!(request.admin.password.as_deref(), Some("Fallback!Pw1"));
        assert_eq!(request.network.public_ip, PublicIpChoice::None);
        assert!(vmflow_cloud::plan(&request).is_ok());
    }

    #[test]
    fn test_explicit_password_wins() {
        let param = deploy(json!({
            "resource_group": "rg-demo",
            "vm_name": "vm01",
            "admin_password": "Given!Pw2",
            "public_ip": true
        }));
        let request = param.to_request(Some("Fallback!Pw1")).unwrap();

        assert_eq!(request.admin.password.as_deref(), Some("Given!Pw2"));
        assert_eq!(request.network.public_ip, PublicIpChoice::Create);
    }

    #[test]
    fn test_malformed_nic_id_is_rejected() {
        let param = deploy(json!({"resource_group": "rg", "vm_name": "vm01", "nic_id": "nic-1"}));
        assert!(param.to_request(None).is_err());
    }

    #[test]
    fn test_public_ip_create_and_existing_conflict() {
        let pip = "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/publicIPAddresses/pip-1";
        let both = deploy(json!({
            "resource_group": "rg",
            "vm_name": "vm01",
            "public_ip": true,
            "public_ip_id": pip
        }));
        let err = both.to_request(Some("Fallback!Pw1")).unwrap_err();
        assert!(matches!(err, CloudError::Planning(_)));

        let existing = deploy(json!({"resource_group": "rg", "vm_name": "vm01", "public_ip_id": pip}));
        let request = existing.to_request(Some("Fallback!Pw1")).unwrap();
        assert!(matches!(request.network.public_ip, PublicIpChoice::Existing(_)));
    }

    #[test]
    fn test_template_accepts_encoded_json() {
        let param: DeployTemplateParam = serde_json::from_value(json!({
            "resource_group": "rg",
            "deployment_name": "dep1",
            "template": "{\"resources\": []}"
        }))
        .unwrap();

        assert_eq!(param.template().unwrap(), json!({"resources": []}));
        assert_eq!(param.parameters().unwrap(), Value::Null);

        let broken = DeployTemplateParam {
            template: json!("{not json"),
            ..param
        };
        assert!(broken.template().is_err());
    }

    #[test]
    fn test_location_filters_flatten() {
        let param: LocationParam =
            serde_json::from_value(json!({"location": "eastasia", "search": "ubuntu", "top": 5})).unwrap();
        let query = param.filter.query();
        assert_eq!(query.search.as_deref(), Some("ubuntu"));
        assert_eq!(query.limit(), 5);
    }
}
