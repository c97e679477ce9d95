//! Workspace listing — `atrium workspaces`.

use anyhow::Result;
use console::style;

use super::super::Cli;

pub async fn cmd_workspaces(cli: &Cli) -> Result<()> {
    use atrium::api::ApiClient;
    use atrium::auth::TokenVault;
    use atrium::config::Config;

    let config = Config::resolve(cli.base_url.clone(), cli.verbose)?;
    let vault = TokenVault::new(config.token_store_path());
    let api = ApiClient::new(&config.base_url, vault);

    let workspaces = api.workspaces().await?;
    if workspaces.is_empty() {
        println!("No workspaces yet.");
        return Ok(());
    }

    for workspace in workspaces {
        println!(
            "{}  {}",
            style(&workspace.name).bold(),
            style(&workspace.id).dim()
        );
        if let Some(description) = workspace.description {
            println!("    {}", style(description).dim());
        }
    }
    Ok(())
}
