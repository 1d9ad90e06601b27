use crate::utils;
use colored::Colorize;
use vmflow_config::Settings;

pub async fn handle(
    settings: &Settings,
    resource_group: Option<&str>,
    all: bool,
    json: bool,
) -> anyhow::Result<()> {
    let azure = utils::connect(settings)?;

    let (vms, next_link) = if all {
        (azure.discovery.list_vms_all(resource_group).await?, None)
    } else {
        let page = azure.discovery.list_vms_page(resource_group).await?;
        (page.vms, page.next_link)
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&vms)?);
        return Ok(());
    }

    if vms.is_empty() {
        println!("{}", "仮想マシンが見つかりません".dimmed());
        return Ok(());
    }

    println!(
        "{}",
        format!(
            "{:<24} {:<20} {:<16} {:<20} {:<12}",
            "NAME", "RESOURCE GROUP", "LOCATION", "SIZE", "STATE"
        )
        .bold()
    );
    println!("{}", "─".repeat(96).dimmed());
    for vm in &vms {
        let group = vmflow_cloud::ResourceReference::parse(vm.id.as_str())
            .map(|r| r.resource_group().to_string())
            .unwrap_or_default();
        println!(
            "{:<24} {:<20} {:<16} {:<20} {}",
            vm.name.cyan(),
            group,
            vm.location,
            vm.size.as_deref().unwrap_or("-"),
            utils::colored_state(vm.provisioning_state.as_deref())
        );
    }

    if next_link.is_some() {
        println!();
        println!("{}", "続きがあります。全件表示するには --all を指定してください".yellow());
    }
    Ok(())
}
