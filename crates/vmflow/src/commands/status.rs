use crate::utils;
use colored::Colorize;
use vmflow_config::Settings;

pub async fn handle(
    settings: &Settings,
    resource_group: &str,
    vm_name: &str,
    json: bool,
) -> anyhow::Result<()> {
    let azure = utils::connect(settings)?;
    let status = azure.discovery.vm_status(resource_group, vm_name).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    println!("{} {}", "VM".bold(), status.name.cyan());
    println!("  id:           {}", status.id.dimmed());
    println!("  location:     {}", status.location);
    println!(
        "  provisioning: {}",
        utils::colored_state(status.provisioning_state.as_deref())
    );
    println!(
        "  power:        {}",
        utils::colored_power(status.power_state.as_deref())
    );
    Ok(())
}
