//! Interactive workspace chat — `atrium chat`.
//!
//! Wires the pieces together: pool + session for the socket, the expiry
//! watchdog for credentials, stdin for input, and the renderer for output.
//! The loop runs until the user quits, the connection dies for good, or
//! the watchdog signs the session out.

use anyhow::{Result, anyhow, ensure};
use console::style;
use tokio::io::AsyncBufReadExt;
use tokio::sync::watch;

use atrium::api::{ApiClient, Workspace};
use atrium::auth::{SessionHealth, run_watchdog};
use atrium::chat::{ChatPool, ChatSession, RetryPolicy};
use atrium::errors::ChatError;
use atrium::ui::{ChatRenderer, print_workspace_banner};

use super::super::Cli;

pub async fn cmd_chat(cli: &Cli, workspace_arg: Option<String>) -> Result<()> {
    use atrium::auth::TokenVault;
    use atrium::config::Config;

    let config = Config::resolve(cli.base_url.clone(), cli.verbose)?;
    config.ensure_directories()?;

    let vault = TokenVault::new(config.token_store_path());
    let api = ApiClient::new(&config.base_url, vault);
    // Fail fast with a sign-in hint instead of a mid-chat 401
    api.vault().require()?;

    let workspace = resolve_workspace(&api, workspace_arg).await?;

    let pool = ChatPool::new(api.clone(), RetryPolicy::from(&config.retry));
    let mut session = ChatSession::open(&pool, &workspace.id).await?;

    let (health_tx, mut health_rx) = watch::channel(SessionHealth::Active);
    let watchdog = tokio::spawn(run_watchdog(
        api.clone(),
        config.watchdog_interval(),
        config.refresh_window(),
        health_tx,
    ));

    print_workspace_banner(&workspace);
    let mut renderer = ChatRenderer::new(cli.verbose);

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut lines = stdin.lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match line {
                    "/quit" | "/exit" => break,
                    "/clear" => {
                        session.clear_transcript();
                        println!("{}", style("transcript cleared").dim());
                    }
                    _ => match session.send_message(line).await {
                        Ok(_) => renderer.begin_waiting(),
                        Err(e) => println!("{}", style(format!("send failed: {e}")).red()),
                    },
                }
            }

            event = session.next_event() => {
                match event {
                    Some(event) => renderer.on_event(&event),
                    None => {
                        // Supervisor ended; release below reports why.
                        break;
                    }
                }
            }

            changed = health_rx.changed() => {
                if changed.is_err() || *health_rx.borrow() == SessionHealth::SignedOut {
                    println!("{}", style("Session expired, signed out.").yellow());
                    break;
                }
            }
        }
    }

    watchdog.abort();
    if let Some(Err(e)) = pool.release(&workspace.id).await {
        match e {
            ChatError::ClosedByPolicy { .. } | ChatError::RetriesExhausted { .. } => {
                println!("{}", style(format!("connection ended: {e}")).dim());
            }
            other => return Err(other.into()),
        }
    }
    Ok(())
}

/// Match the argument against workspace id or name, or prompt when absent.
async fn resolve_workspace(api: &ApiClient, arg: Option<String>) -> Result<Workspace> {
    let mut workspaces = api.workspaces().await?;
    ensure!(!workspaces.is_empty(), "No workspaces available on this server");

    match arg {
        Some(arg) => workspaces
            .into_iter()
            .find(|w| w.id == arg || w.name == arg)
            .ok_or_else(|| anyhow!("No workspace with id or name '{arg}'")),
        None => {
            let names: Vec<&str> = workspaces.iter().map(|w| w.name.as_str()).collect();
            let picked = dialoguer::Select::new()
                .with_prompt("Workspace")
                .items(&names)
                .default(0)
                .interact()?;
            Ok(workspaces.swap_remove(picked))
        }
    }
}
