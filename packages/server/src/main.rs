#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the OSM explorer.
//!
//! Reads configuration from `OSM_EXPLORER_CONFIG` / `OSM_EXPLORER_DATA` and
//! the bind address from `BIND_ADDR` / `PORT`.

use osm_explorer_config::ExplorerConfig;
use osm_explorer_server::ServerError;

#[actix_web::main]
async fn main() -> Result<(), ServerError> {
    pretty_env_logger::init_custom_env("RUST_LOG");

    let config = ExplorerConfig::load()?;
    osm_explorer_server::run_server(config).await
}
