//! Interactive menu: the control panel as a series of prompts.

use std::error::Error;
use std::path::PathBuf;

use dialoguer::{Input, MultiSelect, Select};
use osm_explorer_config::ExplorerConfig;
use osm_explorer_geometry_models::{Filters, GeometryKind};
use osm_explorer_session::Driver;

use crate::commands::{self, ViewRequest};

/// Top-level tool selection.
enum Tool {
    Query,
    Values,
    Server,
}

impl Tool {
    const ALL: &[Self] = &[Self::Query, Self::Values, Self::Server];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Query => "Explore a table",
            Self::Values => "List column values",
            Self::Server => "Start server",
        }
    }
}

/// Runs the interactive menu.
///
/// # Errors
///
/// Returns an error if a prompt fails or the selected tool fails.
pub fn run(config: ExplorerConfig) -> Result<(), Box<dyn Error>> {
    println!("OSM Explorer");
    println!();

    let labels: Vec<&str> = Tool::ALL.iter().map(Tool::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Tool::ALL[idx] {
        Tool::Query => query(&commands::driver(&config)?),
        Tool::Values => values(&commands::driver(&config)?),
        Tool::Server => {
            actix_web::rt::System::new().block_on(osm_explorer_server::interactive::run(config))?;
            Ok(())
        }
    }
}

fn select_table() -> Result<GeometryKind, Box<dyn Error>> {
    let tables = GeometryKind::all();
    let labels: Vec<&str> = tables.iter().map(|t| t.table_name()).collect();
    let idx = Select::new()
        .with_prompt("Table")
        .items(&labels)
        .default(0)
        .interact()?;
    Ok(tables[idx])
}

fn select_filters(driver: &Driver) -> Result<Filters, Box<dyn Error>> {
    let options = &driver.env().options;
    let table = select_table()?;

    let columns = options.columns(table);
    let idx = Select::new()
        .with_prompt("Column")
        .items(columns)
        .default(0)
        .interact()?;
    let column = columns[idx].clone();

    let choices = options.tag_choices(driver.store(), table, &column)?;
    let tags = if choices.is_empty() {
        None
    } else {
        let picked = MultiSelect::new()
            .with_prompt("Tags (none keeps every value)")
            .items(&choices)
            .interact()?;
        Some(picked.into_iter().map(|i| choices[i].clone()).collect())
    };

    let caps = options.row_caps();
    let default_cap = options.default_filters().row_cap;
    let idx = Select::new()
        .with_prompt("Row cap")
        .items(caps)
        .default(caps.iter().position(|c| *c == default_cap).unwrap_or(0))
        .interact()?;

    Ok(Filters {
        table,
        column,
        tags,
        row_cap: caps[idx],
    }
    .normalized())
}

fn select_view(driver: &Driver) -> Result<ViewRequest, Box<dyn Error>> {
    let landmarks = driver.env().locator.names().collect::<Vec<_>>();
    let mut labels = vec!["Default view", "Bounding box"];
    labels.extend(landmarks.iter().copied());

    let idx = Select::new()
        .with_prompt("Where")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(match idx {
        0 => ViewRequest::Default,
        1 => {
            let bbox: String = Input::new()
                .with_prompt("west,south,east,north")
                .interact_text()?;
            ViewRequest::Bounds(commands::parse_bbox(&bbox)?)
        }
        i => ViewRequest::Landmark(landmarks[i - 2].to_string()),
    })
}

fn query(driver: &Driver) -> Result<(), Box<dyn Error>> {
    let filters = select_filters(driver)?;
    let view = select_view(driver)?;

    let result = commands::run_query(driver, filters, &view)?;
    for report in &result.reports {
        commands::print_report(report);
    }

    let output: String = Input::new()
        .with_prompt("Output file (empty for stdout)")
        .allow_empty(true)
        .interact_text()?;
    let output = (!output.trim().is_empty()).then(|| PathBuf::from(output.trim()));

    commands::write_overlay(result.overlay.as_ref(), output.as_deref(), true)
}

fn values(driver: &Driver) -> Result<(), Box<dyn Error>> {
    let table = select_table()?;
    let columns = driver.env().options.columns(table);
    let idx = Select::new()
        .with_prompt("Column")
        .items(columns)
        .default(0)
        .interact()?;

    let choices = driver.store().attribute_values(
        table,
        &columns[idx],
        driver.env().options.min_tag_count(),
    )?;
    for row in &choices {
        println!("{:<40} {}", row.value, row.count);
    }
    println!("\n{} value(s)", choices.len());
    Ok(())
}
