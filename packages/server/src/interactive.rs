//! Interactive mode for the server.
//!
//! Prompts for the data source, bind address and port before starting the
//! server.

use std::path::PathBuf;

use dialoguer::{Confirm, Input};
use osm_explorer_config::ExplorerConfig;

use crate::{AppState, ServerError, bind_from_env, serve};

/// Runs the server in interactive mode, prompting for configuration.
///
/// Starts from `config`, lets the user override the data directory, bind
/// address and port, and delegates to [`crate::serve`].
///
/// # Errors
///
/// Returns [`ServerError`] if the store cannot be opened or the server
/// fails to start.
#[allow(clippy::future_not_send)]
pub async fn run(mut config: ExplorerConfig) -> Result<(), ServerError> {
    println!("OSM Explorer Server");
    println!();

    let (default_addr, default_port) = bind_from_env();

    if config.duckdb_path.is_none() {
        let data_dir: String = Input::new()
            .with_prompt("GeoJSON data directory")
            .default(config.data_dir.display().to_string())
            .interact_text()
            .unwrap_or_else(|_| config.data_dir.display().to_string());
        config.data_dir = PathBuf::from(data_dir);
    }

    let bind_addr: String = Input::new()
        .with_prompt("Bind address")
        .default(default_addr.clone())
        .interact_text()
        .unwrap_or(default_addr);

    let port: u16 = Input::new()
        .with_prompt("Port")
        .default(default_port)
        .interact_text()
        .unwrap_or(default_port);

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    let state = AppState::from_config(config)?;
    serve(state, bind_addr, port).await?;
    Ok(())
}
