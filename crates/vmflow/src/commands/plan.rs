use crate::utils;
use clap::Args;
use colored::Colorize;
use vmflow_mcp::params::DeployVmParam;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// VM 名
    pub vm_name: String,
    /// リソースグループ
    #[arg(short = 'g', long)]
    pub resource_group: String,
    /// Azure リージョン
    #[arg(short, long, default_value = "eastasia")]
    pub location: String,
    /// VM サイズ
    #[arg(long, default_value = "Standard_D2as_v5")]
    pub size: String,
    /// 管理者ユーザー名
    #[arg(long, default_value = "azureuser")]
    pub admin_username: String,
    /// 管理者パスワード（AZ_TEST_PASS 環境変数）
    #[arg(long, env = "AZ_TEST_PASS", hide_env_values = true)]
    pub admin_password: Option<String>,
    /// 接続する既存 NIC のリソース ID
    #[arg(long, conflicts_with = "subnet_id")]
    pub nic_id: Option<String>,
    /// 新しい NIC を配置する既存サブネットのリソース ID
    #[arg(long)]
    pub subnet_id: Option<String>,
    /// パブリック IP を作成する
    #[arg(long)]
    pub public_ip: bool,
    /// JSON で出力
    #[arg(long)]
    pub json: bool,
}

impl PlanArgs {
    fn to_param(&self) -> DeployVmParam {
        DeployVmParam {
            resource_group: self.resource_group.clone(),
            vm_name: self.vm_name.clone(),
            location: self.location.clone(),
            vm_size: self.size.clone(),
            admin_username: self.admin_username.clone(),
            admin_password: self.admin_password.clone(),
            image_publisher: None,
            image_offer: None,
            image_sku: None,
            image_version: None,
            os_disk_type: None,
            os_disk_size_gb: None,
            nic_id: self.nic_id.clone(),
            subnet_id: self.subnet_id.clone(),
            vnet_name: None,
            subnet_name: None,
            public_ip: self.public_ip,
            public_ip_id: None,
        }
    }
}

pub fn handle(args: &PlanArgs) -> anyhow::Result<()> {
    let request = args.to_param().to_request(None)?;
    let plan = vmflow_cloud::plan(&request)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!(
        "{} {} / {} ({})",
        "構築プラン:".bold(),
        plan.target.cyan(),
        plan.resource_group.cyan(),
        plan.summary()
    );
    println!();
    utils::print_plan(&plan);
    Ok(())
}
