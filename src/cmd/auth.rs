//! Credential commands — `atrium login`, `atrium logout`, `atrium whoami`.

use anyhow::Result;
use console::style;

use super::super::Cli;

pub async fn cmd_login(cli: &Cli, email: Option<String>) -> Result<()> {
    use atrium::api::ApiClient;
    use atrium::auth::TokenVault;
    use atrium::config::Config;

    let config = Config::resolve(cli.base_url.clone(), cli.verbose)?;
    config.ensure_directories()?;

    let vault = TokenVault::new(config.token_store_path());
    let api = ApiClient::new(&config.base_url, vault);

    let email = match email {
        Some(email) => email,
        None => dialoguer::Input::new()
            .with_prompt("Email")
            .interact_text()?,
    };
    let password = dialoguer::Password::new()
        .with_prompt("Password")
        .interact()?;

    let profile = api.login(&email, &password).await?;
    let who = profile.name.unwrap_or(profile.email);
    println!("{} Signed in as {}", style("✓").green(), style(who).bold());
    Ok(())
}

pub fn cmd_logout() -> Result<()> {
    use atrium::auth::TokenVault;
    use atrium::config::{Config, TOKENS_FILE};

    let state_dir = Config::state_dir()?;
    let vault = TokenVault::new(state_dir.join(TOKENS_FILE));
    vault.clear()?;
    println!("Signed out.");
    Ok(())
}

pub async fn cmd_whoami(cli: &Cli) -> Result<()> {
    use atrium::api::ApiClient;
    use atrium::auth::TokenVault;
    use atrium::config::Config;

    let config = Config::resolve(cli.base_url.clone(), cli.verbose)?;
    let vault = TokenVault::new(config.token_store_path());
    let api = ApiClient::new(&config.base_url, vault);

    let profile = api.me().await?;
    match profile.name {
        Some(name) => println!("{} <{}>", style(name).bold(), profile.email),
        None => println!("{}", style(profile.email).bold()),
    }
    if cli.verbose {
        println!("{}", style(format!("id: {}", profile.id)).dim());
        println!("{}", style(format!("server: {}", config.base_url)).dim());
    }
    Ok(())
}
