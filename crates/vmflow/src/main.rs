mod commands;
mod utils;

use clap::{Parser, Subcommand};
use colored::Colorize;
use vmflow_config::Settings;

#[derive(Parser)]
#[command(name = "vmflow")]
#[command(about = "Azure 仮想マシンの構築と状態確認を、シェルからもエージェントからも。", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// MCP (Model Context Protocol) サーバーを stdio で起動
    Mcp,
    /// Azure を呼び出さずに VM の構築プランを表示
    Plan(commands::plan::PlanArgs),
    /// 仮想マシンの一覧を表示
    Vms {
        /// リソースグループ（省略時はサブスクリプション全体）
        #[arg(short = 'g', long)]
        resource_group: Option<String>,
        /// 先頭ページだけでなく全ページを表示
        #[arg(short, long)]
        all: bool,
        /// 表ではなく JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// VM のプロビジョニング状態と電源状態を表示
    Status {
        /// リソースグループ
        #[arg(short = 'g', long)]
        resource_group: String,
        /// VM 名
        vm_name: String,
        /// JSON で出力
        #[arg(long)]
        json: bool,
    },
    /// バージョン情報を表示
    Version,
}

fn load_settings() -> anyhow::Result<Settings> {
    Settings::load().map_err(|e| {
        eprintln!("{} {}", "✗".red().bold(), e);
        anyhow::anyhow!("設定が不完全です")
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // MCP モードでは stdout を JSON-RPC が使うため、ログはファイルに出力
    if matches!(cli.command, Commands::Mcp) {
        use std::fs::OpenOptions;
        let log_path = std::env::temp_dir().join("vmflow-mcp.log");
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)
            .ok();

        if let Some(file) = log_file {
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_env_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::DEBUG.into()),
                )
                .with_ansi(false)
                .init();
        }

        let settings = load_settings()?;
        return vmflow_mcp::run_server(&settings).await;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    match cli.command {
        Commands::Version => {
            println!("vmflow {}", env!("CARGO_PKG_VERSION"));
        }
        Commands::Plan(args) => {
            commands::plan::handle(&args)?;
        }
        Commands::Vms {
            resource_group,
            all,
            json,
        } => {
            let settings = load_settings()?;
            commands::vms::handle(&settings, resource_group.as_deref(), all, json).await?;
        }
        Commands::Status {
            resource_group,
            vm_name,
            json,
        } => {
            let settings = load_settings()?;
            commands::status::handle(&settings, &resource_group, &vm_name, json).await?;
        }
        Commands::Mcp => {
            unreachable!("Mcp はログ初期化の前に処理済み");
        }
    }

    Ok(())
}
