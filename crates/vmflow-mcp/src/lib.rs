//! vmflow MCP Server
//!
//! 公式 rmcp SDK を使用した MCP サーバー実装。
//! stdio トランスポートで動作し、Azure VM の構築・状態確認・カタログ検索をツールとして提供する。
//! 各ツールは JSON を返し、失敗時は
//! `{"error": {"kind", "message", "status"?, "code"?, "remote"?}}` を返す。

pub mod params;

use anyhow::Result;
use params::*;
use rmcp::{
    ErrorData as McpError, RoleServer, ServerHandler, ServiceExt,
    handler::server::{tool::ToolCallContext, tool::ToolRouter, wrapper::Parameters},
    model::*,
    service::RequestContext,
    tool, tool_router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};
use vmflow_cloud::{CloudError, ResourceReference};
use vmflow_cloud_azure::{AzureConfig, AzureSession, ClientCredentials, DeploymentMode, Provisioner};
use vmflow_config::Settings;

/// 環境設定から Azure 接続設定を組み立てる
pub fn azure_config(settings: &Settings) -> AzureConfig {
    let credentials = ClientCredentials {
        tenant_id: settings.tenant_id.clone(),
        client_id: settings.client_id.clone(),
        client_secret: settings.client_secret.clone(),
    };
    let mut config = AzureConfig::new(credentials, settings.subscription_id.clone())
        .with_guardrail(settings.guardrail())
        .with_poll(settings.poll_config());
    if let Some(endpoint) = &settings.management_endpoint {
        config.management_endpoint = endpoint.clone();
    }
    if let Some(endpoint) = &settings.login_endpoint {
        config.login_endpoint = endpoint.clone();
    }
    config
}

fn to_json<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| {
        json!({"error": {"kind": "invalid_response", "message": e.to_string()}}).to_string()
    })
}

/// 構造化されたエラー応答
fn error_json(tool: &str, err: CloudError) -> String {
    error!("{} failed: {}", tool, err);
    json!({ "error": err.diagnostic() }).to_string()
}

fn parse_mode(mode: Option<&str>) -> Result<DeploymentMode, CloudError> {
    match mode.map(str::to_ascii_lowercase).as_deref() {
        None | Some("incremental") => Ok(DeploymentMode::Incremental),
        Some("complete") => Ok(DeploymentMode::Complete),
        Some(other) => Err(CloudError::Planning(format!(
            "unknown deployment mode '{}', expected Incremental or Complete",
            other
        ))),
    }
}

/// vmflow MCP サーバー
#[derive(Clone)]
pub struct VmFlowServer {
    azure: AzureSession,
    fallback_password: Option<Arc<str>>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl VmFlowServer {
    pub fn new(azure: AzureSession, fallback_password: Option<String>) -> Self {
        Self {
            azure,
            fallback_password: fallback_password.map(Arc::from),
            tool_router: Self::tool_router(),
        }
    }

    /// 読み込んだ設定で Azure に接続
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let azure = AzureSession::connect(azure_config(settings))?;
        Ok(Self::new(azure, settings.fallback_password.clone()))
    }

    #[tool(
        description = "このサーバーが提供するツールと、変更系操作が有効かどうかを返します。最初に呼び出してください。"
    )]
    async fn capabilities(&self) -> Result<String, String> {
        let deploy_enabled = self.azure.provisioner.guardrail().is_enabled();
        to_json(&json!({
            "description": "Azure Resource Manager 経由の Azure VM 構築と状態確認",
            "deploy_enabled": deploy_enabled,
            "guardrail": if deploy_enabled {
                "AZ_RUN_DEPLOY が有効です。作成・削除操作を実行できます"
            } else {
                "AZ_RUN_DEPLOY=true になるまで作成・削除操作は拒否されます"
            },
            "tools": {
                "list_vms": "VM 一覧（先頭ページ）。引数: resource_group（任意）",
                "list_vms_all": "全ページの VM 一覧。引数: resource_group（任意）",
                "get_vm_instance_view": "VM の instanceView JSON。引数: resource_group, vm_name",
                "get_vm_power_state": "電源状態（running, deallocated など）。引数: resource_group, vm_name",
                "get_vm_status": "name, id, location, provisioningState, powerState。引数: resource_group, vm_name",
                "plan_vm": "Azure を呼ばずに依存順の構築プランを作成。引数: deploy_vm と同じ",
                "deploy_vm": "(ガード付き) VM と必要なネットワークリソースを作成。引数: resource_group, vm_name, location, vm_size, admin_username, admin_password, nic_id, subnet_id, public_ip など",
                "delete_vm": "(ガード付き) VM を削除。引数: resource_group, vm_name, force",
                "delete_resource": "(ガード付き) リソース ID で削除（force は VM のみ有効）。引数: resource_id, force",
                "deploy_template": "(ガード付き) ARM テンプレートをデプロイ。引数: resource_group, deployment_name, template, parameters, mode",
                "delete_deployment": "(ガード付き) デプロイメント記録を削除（リソースは残る）。引数: resource_group, deployment_name",
                "list_locations": "サブスクリプションのリージョン。引数: search, top",
                "list_vm_sizes": "リージョンの VM サイズ。引数: location, search, min/max_cores, min/max_memory_mb, top",
                "list_image_publishers": "Marketplace イメージ発行元。引数: location, search, top",
                "list_vm_images": "発行元のオファー・SKU・バージョン。引数: location, publisher, offer, sku, search, top",
                "list_disk_types": "リージョンのマネージドディスク種類。引数: location, search, top"
            }
        }))
    }

    #[tool(
        description = "リソースグループ内（resource_group 省略時はサブスクリプション全体）の仮想マシンを一覧表示します（先頭ページのみ）。続きがある場合は next link を返します。"
    )]
    async fn list_vms(&self, params: Parameters<ResourceGroupParam>) -> Result<String, String> {
        let resource_group = params.0.resource_group.as_deref();
        info!("Tool called: list_vms({:?})", resource_group);
        let page = self
            .azure
            .discovery
            .list_vms_page(resource_group)
            .await
            .map_err(|e| error_json("list_vms", e))?;
        to_json(&page)
    }

    #[tool(
        description = "リソースグループまたはサブスクリプション全体の仮想マシンを、全ページたどって一覧表示します。"
    )]
    async fn list_vms_all(&self, params: Parameters<ResourceGroupParam>) -> Result<String, String> {
        let resource_group = params.0.resource_group.as_deref();
        info!("Tool called: list_vms_all({:?})", resource_group);
        let vms = self
            .azure
            .discovery
            .list_vms_all(resource_group)
            .await
            .map_err(|e| error_json("list_vms_all", e))?;
        to_json(&vms)
    }

    #[tool(description = "仮想マシンの instanceView JSON を取得します。")]
    async fn get_vm_instance_view(&self, params: Parameters<VmParam>) -> Result<String, String> {
        let VmParam {
            resource_group,
            vm_name,
        } = params.0;
        info!("Tool called: get_vm_instance_view({}, {})", resource_group, vm_name);
        let view = self
            .azure
            .discovery
            .instance_view(&resource_group, &vm_name)
            .await
            .map_err(|e| error_json("get_vm_instance_view", e))?;
        to_json(&view)
    }

    #[tool(
        description = "仮想マシンの電源状態（running, stopped, deallocated など）を取得します。"
    )]
    async fn get_vm_power_state(&self, params: Parameters<VmParam>) -> Result<String, String> {
        let VmParam {
            resource_group,
            vm_name,
        } = params.0;
        info!("Tool called: get_vm_power_state({}, {})", resource_group, vm_name);
        let state = self
            .azure
            .discovery
            .power_state(&resource_group, &vm_name)
            .await
            .map_err(|e| error_json("get_vm_power_state", e))?;
        to_json(&json!({ "powerState": state }))
    }

    #[tool(
        description = "仮想マシンの概要（name, id, location, provisioningState, powerState）を取得します。"
    )]
    async fn get_vm_status(&self, params: Parameters<VmParam>) -> Result<String, String> {
        let VmParam {
            resource_group,
            vm_name,
        } = params.0;
        info!("Tool called: get_vm_status({}, {})", resource_group, vm_name);
        let status = self
            .azure
            .discovery
            .vm_status(&resource_group, &vm_name)
            .await
            .map_err(|e| error_json("get_vm_status", e))?;
        to_json(&status)
    }

    #[tool(
        description = "Azure を呼び出さずに、VM デプロイの依存順の構築プランを作成します。deploy_vm が何を作成するかの確認に使います。"
    )]
    async fn plan_vm(&self, params: Parameters<DeployVmParam>) -> Result<String, String> {
        info!("Tool called: plan_vm({}, {})", params.0.resource_group, params.0.vm_name);
        let plan = params
            .0
            .to_request(self.fallback_password.as_deref())
            .and_then(|request| vmflow_cloud::plan(&request))
            .map_err(|e| error_json("plan_vm", e))?;
        to_json(&plan)
    }

    #[tool(
        description = "(ガード付き) 仮想マシンを作成します。nic_id や subnet_id で既存リソースを指定しない場合は仮想ネットワークと NIC も作成します。パブリック IP は public_ip=true の場合のみ作成します。AZ_RUN_DEPLOY=true が必要です。結果には各ステップと作成されたリソースが含まれます。"
    )]
    async fn deploy_vm(&self, params: Parameters<DeployVmParam>) -> Result<String, String> {
        info!("Tool called: deploy_vm({}, {})", params.0.resource_group, params.0.vm_name);
        let request = params
            .0
            .to_request(self.fallback_password.as_deref())
            .map_err(|e| error_json("deploy_vm", e))?;
        let result = self
            .azure
            .provisioner
            .provision(&request)
            .await
            .map_err(|e| error_json("deploy_vm", e))?;
        to_json(&result)
    }

    #[tool(
        description = "(ガード付き) 仮想マシンを削除し、完了まで待機します。force=true（デフォルト）の場合、競合した削除を forceDeletion で再試行します。AZ_RUN_DEPLOY=true が必要です。"
    )]
    async fn delete_vm(&self, params: Parameters<DeleteVmParam>) -> Result<String, String> {
        let DeleteVmParam {
            resource_group,
            vm_name,
            force,
        } = params.0;
        info!("Tool called: delete_vm({}, {}, force={})", resource_group, vm_name, force);
        let result = self
            .azure
            .provisioner
            .delete_vm(&resource_group, &vm_name, force)
            .await
            .map_err(|e| error_json("delete_vm", e))?;
        to_json(&result)
    }

    #[tool(
        description = "(ガード付き) パブリック IP、仮想ネットワーク、NIC、仮想マシン、デプロイメントをリソース ID で削除します。force=true（競合時に forceDeletion で再試行）は仮想マシンのみ有効で、それ以外では無視され、応答の note にその旨が入ります。AZ_RUN_DEPLOY=true が必要です。"
    )]
    async fn delete_resource(&self, params: Parameters<DeleteResourceParam>) -> Result<String, String> {
        info!("Tool called: delete_resource({})", params.0.resource_id);
        let reference = ResourceReference::parse(params.0.resource_id.as_str())
            .map_err(|e| error_json("delete_resource", e))?;
        let result = self
            .azure
            .provisioner
            .delete_resource(&reference, params.0.force)
            .await
            .map_err(|e| error_json("delete_resource", e))?;

        if params.0.force && !Provisioner::supports_forced_delete(&reference) {
            let mut reply = serde_json::to_value(&result)
                .map_err(|e| error_json("delete_resource", e.into()))?;
            reply["note"] = json!(format!(
                "force ignored: forceDeletion applies only to virtual machines, not {}",
                reference.resource_type()
            ));
            return to_json(&reply);
        }
        to_json(&result)
    }

    #[tool(
        description = "(ガード付き) ARM テンプレートをリソースグループにデプロイし、完了まで待機します。template と parameters はオブジェクトまたは JSON 文字列で指定できます。AZ_RUN_DEPLOY=true が必要です。"
    )]
    async fn deploy_template(&self, params: Parameters<DeployTemplateParam>) -> Result<String, String> {
        let param = params.0;
        info!(
            "Tool called: deploy_template({}, {})",
            param.resource_group, param.deployment_name
        );
        let (template, parameters, mode) = param
            .template()
            .and_then(|t| Ok((t, param.parameters()?, parse_mode(param.mode.as_deref())?)))
            .map_err(|e| error_json("deploy_template", e))?;
        let result = self
            .azure
            .provisioner
            .deploy_template(
                &param.resource_group,
                &param.deployment_name,
                &template,
                &parameters,
                mode,
            )
            .await
            .map_err(|e| error_json("deploy_template", e))?;
        to_json(&result)
    }

    #[tool(
        description = "(ガード付き) デプロイメントの記録を削除します。デプロイ済みのリソースは残ります。AZ_RUN_DEPLOY=true が必要です。"
    )]
    async fn delete_deployment(&self, params: Parameters<DeploymentParam>) -> Result<String, String> {
        let DeploymentParam {
            resource_group,
            deployment_name,
        } = params.0;
        info!("Tool called: delete_deployment({}, {})", resource_group, deployment_name);
        let result = self
            .azure
            .provisioner
            .delete_deployment(&resource_group, &deployment_name)
            .await
            .map_err(|e| error_json("delete_deployment", e))?;
        to_json(&result)
    }

    #[tool(description = "サブスクリプションで利用できる Azure リージョンを一覧表示します。")]
    async fn list_locations(&self, params: Parameters<FilterParam>) -> Result<String, String> {
        info!("Tool called: list_locations");
        let listing = self
            .azure
            .discovery
            .list_locations(&params.0.query())
            .await
            .map_err(|e| error_json("list_locations", e))?;
        to_json(&listing)
    }

    #[tool(
        description = "リージョンで提供される VM サイズを、名前や vCPU・メモリの範囲で絞り込んで一覧表示します。"
    )]
    async fn list_vm_sizes(&self, params: Parameters<VmSizesParam>) -> Result<String, String> {
        info!("Tool called: list_vm_sizes({})", params.0.location);
        let listing = self
            .azure
            .discovery
            .list_vm_sizes(&params.0.location, &params.0.query())
            .await
            .map_err(|e| error_json("list_vm_sizes", e))?;
        to_json(&listing)
    }

    #[tool(description = "リージョンの Marketplace イメージ発行元を一覧表示します。")]
    async fn list_image_publishers(&self, params: Parameters<LocationParam>) -> Result<String, String> {
        info!("Tool called: list_image_publishers({})", params.0.location);
        let listing = self
            .azure
            .discovery
            .list_image_publishers(&params.0.location, &params.0.filter.query())
            .await
            .map_err(|e| error_json("list_image_publishers", e))?;
        to_json(&listing)
    }

    #[tool(
        description = "発行元の Marketplace イメージを参照します。オファー、オファーの SKU、オファーと SKU のバージョンの順にたどれます。"
    )]
    async fn list_vm_images(&self, params: Parameters<VmImagesParam>) -> Result<String, String> {
        let param = params.0;
        info!(
            "Tool called: list_vm_images({}, {}, {:?}, {:?})",
            param.location, param.publisher, param.offer, param.sku
        );
        let listing = self
            .azure
            .discovery
            .list_image_catalog(
                &param.location,
                &param.publisher,
                param.offer.as_deref(),
                param.sku.as_deref(),
                &param.filter.query(),
            )
            .await
            .map_err(|e| error_json("list_vm_images", e))?;
        to_json(&listing)
    }

    #[tool(description = "リージョンで利用できるマネージドディスクの種類を一覧表示します。")]
    async fn list_disk_types(&self, params: Parameters<LocationParam>) -> Result<String, String> {
        info!("Tool called: list_disk_types({})", params.0.location);
        let listing = self
            .azure
            .discovery
            .list_disk_types(&params.0.location, &params.0.filter.query())
            .await
            .map_err(|e| error_json("list_disk_types", e))?;
        to_json(&listing)
    }
}

impl ServerHandler for VmFlowServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo::default().with_instructions(
            "vmflow MCP サーバー。Azure Resource Manager 経由で Azure 仮想マシンの構築と状態確認を行います。変更系ツールには AZ_RUN_DEPLOY=true が必要です。",
        )
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.tool_router.list_all(),
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_context = ToolCallContext::new(self, request, context);
        self.tool_router.call(tool_context).await
    }
}

/// stdio で MCP サーバーを起動
pub async fn run_server(settings: &Settings) -> Result<()> {
    let server = VmFlowServer::from_settings(settings)?;
    info!(
        "Starting vmflow MCP server (deploy {})",
        if settings.run_deploy { "enabled" } else { "disabled" }
    );
    let transport = (tokio::io::stdin(), tokio::io::stdout());

    let service = server.serve(transport).await.map_err(|e| {
        error!("MCP server initialization failed: {}", e);
        anyhow::anyhow!("MCP server initialization failed: {}", e)
    })?;

    service.waiting().await.map_err(|e| {
        error!("MCP server error: {}", e);
        anyhow::anyhow!("MCP server error: {}", e)
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use vmflow_cloud::{Guardrail, PollConfig, RetryConfig};
    use vmflow_cloud_azure::testing::ScriptedBackend;
    use vmflow_cloud_azure::{HttpResponse, Method};

    const SUB: &str = "0000-sub";

    fn server(guardrail: Guardrail) -> (Arc<ScriptedBackend>, VmFlowServer) {
        let backend = Arc::new(ScriptedBackend::new());
        backend.with_token("test-token", 3600);
        let mut config = AzureConfig::new(
            ClientCredentials {
                tenant_id: "tenant".into(),
                client_id: "client".into(),
                client_secret: "client-secret-value".into(),
            },
            SUB,
        )
        .with_guardrail(guardrail)
        .with_poll(PollConfig::default().with_interval(std::time::Duration::from_secs(1)));
        config.retry = RetryConfig::none();
        let azure = AzureSession::with_backend(backend.clone(), config);
        (backend, VmFlowServer::new(azure, Some("Fallback!Pw1".into())))
    }

    fn parse(text: &str) -> Value {
        serde_json::from_str(text).unwrap()
    }

    fn deploy_args() -> DeployVmParam {
        serde_json::from_value(json!({"resource_group": "rg-demo", "vm_name": "vm01"})).unwrap()
    }

    #[tokio::test]
    async fn test_tools_are_registered() {
        let (_, server) = server(Guardrail::disabled());
        let names: Vec<String> = server
            .tool_router
            .list_all()
            .into_iter()
            .map(|tool| tool.name.to_string())
            .collect();
        for expected in [
            "capabilities",
            "list_vms",
            "list_vms_all",
            "get_vm_instance_view",
            "get_vm_power_state",
            "get_vm_status",
            "plan_vm",
            "deploy_vm",
            "delete_vm",
            "delete_resource",
            "deploy_template",
            "delete_deployment",
            "list_locations",
            "list_vm_sizes",
            "list_image_publishers",
            "list_vm_images",
            "list_disk_types",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing tool {}", expected);
        }
    }

    #[tokio::test]
    async fn test_capabilities_report_guardrail() {
        let (backend, server) = server(Guardrail::disabled());
        let caps = parse(&server.capabilities().await.unwrap());
        assert_eq!(caps["deploy_enabled"], false);
        assert!(caps["tools"]["deploy_vm"].is_string());
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_plan_vm_uses_fallback_password_without_calls() {
        let (backend, server) = server(Guardrail::disabled());
        let plan = parse(&server.plan_vm(Parameters(deploy_args())).await.unwrap());

        let names: Vec<&str> = plan["steps"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|s| s["name"].as_str())
            .collect();
        assert_eq!(names, vec!["vm01-vnet", "vm01-nic", "vm01"]);
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_deploy_vm_denied_by_guardrail() {
        let (backend, server) = server(Guardrail::disabled());
        let err = parse(&server.deploy_vm(Parameters(deploy_args())).await.unwrap_err());

        assert_eq!(err["error"]["kind"], "guardrail_denied");
        assert!(err["error"]["message"].as_str().unwrap().contains("AZ_RUN_DEPLOY"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_power_state_tool() {
        let (backend, server) = server(Guardrail::disabled());
        backend.on_json(
            Method::Get,
            "virtualMachines/vm01/instanceView",
            200,
            json!({"statuses": [
                {"code": "ProvisioningState/succeeded"},
                {"code": "PowerState/running"}
            ]}),
        );

        let args = VmParam {
            resource_group: "rg-demo".into(),
            vm_name: "vm01".into(),
        };
        let state = parse(&server.get_vm_power_state(Parameters(args)).await.unwrap());
        assert_eq!(state["powerState"], "running");
    }

    #[tokio::test]
    async fn test_rejection_is_a_structured_error() {
        let (backend, server) = server(Guardrail::disabled());
        backend.on_json(
            Method::Get,
            "virtualMachines/ghost",
            404,
            json!({"error": {"code": "ResourceNotFound", "message": "The Resource 'ghost' was not found."}}),
        );

        let args = VmParam {
            resource_group: "rg-demo".into(),
            vm_name: "ghost".into(),
        };
        let err = parse(&server.get_vm_status(Parameters(args)).await.unwrap_err());
        assert_eq!(err["error"]["kind"], "request_rejected");
        assert_eq!(err["error"]["status"], 404);
        assert_eq!(err["error"]["remote"]["error"]["code"], "ResourceNotFound");
        assert!(!err.to_string().contains("test-token"));
    }

    #[tokio::test]
    async fn test_delete_resource_rejects_malformed_id() {
        let (backend, server) = server(Guardrail::enabled());
        let args = DeleteResourceParam {
            resource_id: "vm01".into(),
            force: false,
        };
        let err = parse(&server.delete_resource(Parameters(args)).await.unwrap_err());
        assert_eq!(err["error"]["kind"], "planning_error");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_resource_notes_ignored_force() {
        let (backend, server) = server(Guardrail::enabled());
        backend
            .on(Method::Delete, "networkInterfaces/nic1", HttpResponse::new(200, ""))
            .on(Method::Delete, "virtualMachines/vm01", HttpResponse::new(200, ""));
        let nic = format!(
            "/subscriptions/{}/resourceGroups/rg-demo/providers/Microsoft.Network/networkInterfaces/nic1",
            SUB
        );
        let vm = format!(
            "/subscriptions/{}/resourceGroups/rg-demo/providers/Microsoft.Compute/virtualMachines/vm01",
            SUB
        );

        let args = DeleteResourceParam {
            resource_id: nic,
            force: true,
        };
        let reply = parse(&server.delete_resource(Parameters(args)).await.unwrap());
        assert_eq!(reply["status"], "succeeded");
        assert!(reply["note"].as_str().unwrap().contains("networkInterfaces"));

        let args = DeleteResourceParam {
            resource_id: vm,
            force: true,
        };
        let reply = parse(&server.delete_resource(Parameters(args)).await.unwrap());
        assert!(reply.get("note").is_none());

        let description = server
            .tool_router
            .list_all()
            .into_iter()
            .find(|tool| tool.name == "delete_resource")
            .and_then(|tool| tool.description)
            .unwrap();
        assert!(description.contains("forceDeletion"));
    }

    #[tokio::test]
    async fn test_deploy_template_rejects_unknown_mode() {
        let (backend, server) = server(Guardrail::enabled());
        let args: DeployTemplateParam = serde_json::from_value(json!({
            "resource_group": "rg-demo",
            "deployment_name": "dep1",
            "template": {"resources": []},
            "mode": "Partial"
        }))
        .unwrap();

        let err = parse(&server.deploy_template(Parameters(args)).await.unwrap_err());
        assert!(err["error"]["message"].as_str().unwrap().contains("Partial"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_list_locations_tool_truncates() {
        let (backend, server) = server(Guardrail::disabled());
        let locations: Vec<Value> = ["westus", "eastasia", "japaneast", "eastus"]
            .iter()
            .map(|name| json!({"name": name, "displayName": name}))
            .collect();
        backend.on_json(Method::Get, "/locations?", 200, json!({"value": locations}));

        let args = FilterParam {
            search: Some("east".into()),
            top: Some(2),
        };
        let listing = parse(&server.list_locations(Parameters(args)).await.unwrap());
        assert_eq!(listing["total_matched"], 3);
        assert_eq!(listing["returned"], 2);
        assert_eq!(listing["has_more"], true);
        assert_eq!(listing["items"][0]["name"], "eastasia");
    }
}
