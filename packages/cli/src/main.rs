#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line front end for the OSM explorer.
//!
//! ```text
//! osm_explorer serve [--bind 0.0.0.0] [--port 8080]
//! osm_explorer query --table line --column highway --bbox -87,39,-86,40
//! osm_explorer values point amenity [--min-count 10]
//! osm_explorer landmarks
//! ```
//!
//! Running `osm_explorer` with no subcommand enters interactive mode.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use osm_explorer_geometry_models::{AttributeName, Filters, GeometryKind, TagSet};
use osm_explorer_server::AppState;

use crate::commands::ViewRequest;

#[derive(Parser)]
#[command(
    name = "osm_explorer",
    about = "Explore OpenStreetMap geometry tables by viewport"
)]
struct Cli {
    /// TOML file with configuration overrides
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the `planet_osm_*.geojson` tables
    #[arg(long, global = true)]
    data: Option<PathBuf>,
    /// `DuckDB` warehouse to query instead of `GeoJSON` tables
    #[arg(long, global = true)]
    duckdb: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// Bind address (defaults to `BIND_ADDR` or 127.0.0.1)
        #[arg(long)]
        bind: Option<String>,
        /// Port (defaults to `PORT` or 8080)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run one styled query and print it as `GeoJSON`
    Query {
        /// Geometry table: point, line or polygon
        #[arg(long, default_value = "point")]
        table: GeometryKind,
        /// Attribute column to color by
        #[arg(long, default_value = "ACCESS")]
        column: String,
        /// Attribute values to keep (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tags: Vec<String>,
        /// Maximum number of rows
        #[arg(long)]
        row_cap: Option<u32>,
        /// Area as west,south,east,north
        #[arg(long, conflicts_with = "landmark")]
        bbox: Option<String>,
        /// Landmark to center on
        #[arg(long)]
        landmark: Option<String>,
        /// Write to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Pretty-print the output
        #[arg(long)]
        pretty: bool,
    },
    /// List the values of a column, most frequent first
    Values {
        /// Geometry table
        table: GeometryKind,
        /// Attribute column
        column: String,
        /// Minimum occurrences (defaults to the configured threshold)
        #[arg(long)]
        min_count: Option<u64>,
    },
    /// List the landmarks available for jumps
    Landmarks,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init_custom_env("RUST_LOG");
    let cli = Cli::parse();

    let config = commands::load_config(cli.config.as_deref(), cli.data, cli.duckdb)?;

    let Some(command) = cli.command else {
        return interactive::run(config);
    };

    match command {
        Commands::Serve { bind, port } => {
            let (default_bind, default_port) = osm_explorer_server::bind_from_env();
            let state = AppState::from_config(config)?;
            actix_web::rt::System::new().block_on(osm_explorer_server::serve(
                state,
                bind.unwrap_or(default_bind),
                port.unwrap_or(default_port),
            ))?;
        }
        Commands::Query {
            table,
            column,
            tags,
            row_cap,
            bbox,
            landmark,
            output,
            pretty,
        } => {
            let driver = commands::driver(&config)?;
            let filters = Filters {
                table,
                column: AttributeName::new(&column)?,
                tags: Some(tags.into_iter().collect::<TagSet>()),
                row_cap: row_cap.unwrap_or(config.row_caps.default),
            }
            .normalized();
            let view = match (bbox, landmark) {
                (Some(bbox), _) => ViewRequest::Bounds(commands::parse_bbox(&bbox)?),
                (None, Some(name)) => ViewRequest::Landmark(name),
                (None, None) => ViewRequest::Default,
            };

            let result = commands::run_query(&driver, filters, &view)?;
            for report in &result.reports {
                commands::print_report(report);
            }
            commands::write_overlay(result.overlay.as_ref(), output.as_deref(), pretty)?;
        }
        Commands::Values {
            table,
            column,
            min_count,
        } => {
            let driver = commands::driver(&config)?;
            let column = AttributeName::new(&column)?;
            let values = driver.store().attribute_values(
                table,
                &column,
                min_count.unwrap_or(config.min_tag_count),
            )?;

            if values.is_empty() {
                println!("No values found.");
                return Ok(());
            }

            println!("{:<40} COUNT", "VALUE");
            println!("{}", "-".repeat(50));
            for row in &values {
                println!("{:<40} {}", row.value, row.count);
            }
            println!("\n{} value(s)", values.len());
        }
        Commands::Landmarks => {
            let driver = commands::driver(&config)?;
            let landmarks = driver.store().landmarks()?;

            if landmarks.is_empty() {
                println!("No landmarks found.");
                return Ok(());
            }

            println!("{:<32} {:>10} {:>11}", "NAME", "LAT", "LNG");
            println!("{}", "-".repeat(55));
            for landmark in &landmarks {
                println!(
                    "{:<32} {:>10.4} {:>11.4}",
                    landmark.name, landmark.location.lat, landmark.location.lng
                );
            }
        }
    }

    Ok(())
}
