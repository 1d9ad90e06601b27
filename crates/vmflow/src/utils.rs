use colored::{ColoredString, Colorize};
use vmflow_cloud::{ProvisioningPlan, StepAction};
use vmflow_cloud_azure::AzureSession;
use vmflow_config::Settings;

/// 読み込んだ設定で Azure セッションを作成
pub fn connect(settings: &Settings) -> anyhow::Result<AzureSession> {
    Ok(AzureSession::connect(vmflow_mcp::azure_config(settings))?)
}

pub fn print_plan(plan: &ProvisioningPlan) {
    for step in plan.steps() {
        let marker = match step.action {
            StepAction::Create(_) => "+".green().bold(),
            StepAction::UseExisting(_) => "=".blue().bold(),
        };
        let deps = if step.depends_on.is_empty() {
            String::new()
        } else {
            let list: Vec<String> = step.depends_on.iter().map(|d| d.0.to_string()).collect();
            format!(" (依存: {})", list.join(", ")).dimmed().to_string()
        };
        println!("  {} {}. {}{}", marker, step.index, step.description(), deps);
    }
}

/// プロビジョニング状態を色付きで表示
pub fn colored_state(state: Option<&str>) -> ColoredString {
    match state {
        Some(s) if s.eq_ignore_ascii_case("succeeded") => s.green(),
        Some(s) if s.eq_ignore_ascii_case("failed") || s.eq_ignore_ascii_case("canceled") => s.red(),
        Some(s) => s.yellow(),
        None => "unknown".dimmed(),
    }
}

pub fn colored_power(state: Option<&str>) -> ColoredString {
    match state {
        Some("running") => "running".green(),
        Some(s @ ("stopped" | "deallocated")) => s.red(),
        Some(s) => s.yellow(),
        None => "unknown".dimmed(),
    }
}
