//! HTTP handler functions for the OSM explorer API.

use actix_web::{HttpResponse, web};
use osm_explorer_geometry_models::{
    AttributeName, BoundingRectangle, Filters, GeometryKind, QueryParameters, TagSet,
};
use osm_explorer_server_models::{
    ApiAttributeValue, ApiExploreResponse, ApiHealth, ApiOptions, ApiOverlay, ApiQueryReport,
    ApiSession, ApiTableColumns, ApiTickResponse, AttributeValuesParams, ExploreQueryParams,
    TickRequest,
};
use osm_explorer_session::{RecordingPanel, RecordingWidget};

use crate::AppState;

fn error_response(mut builder: actix_web::HttpResponseBuilder, message: &str) -> HttpResponse {
    builder.json(serde_json::json!({ "error": message }))
}

fn internal_error(context: &str, error: &dyn std::fmt::Display) -> HttpResponse {
    log::error!("{context}: {error}");
    error_response(HttpResponse::InternalServerError(), context)
}

fn session_not_found(id: &str) -> HttpResponse {
    error_response(HttpResponse::NotFound(), &format!("Unknown session {id}"))
}

/// `GET /api/health`
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(ApiHealth {
        healthy: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// `GET /api/options`
///
/// Returns the control panel choices and the defaults a session starts with.
pub async fn options(state: web::Data<AppState>) -> HttpResponse {
    let env = state.driver.env();
    let options = &env.options;

    HttpResponse::Ok().json(ApiOptions {
        tables: options
            .tables()
            .iter()
            .map(|table| ApiTableColumns {
                table: *table,
                columns: options.columns(*table).to_vec(),
            })
            .collect(),
        row_caps: options.row_caps().to_vec(),
        landmarks: options.landmarks().to_vec(),
        default_filters: options.default_filters(),
        default_view: env.default_view,
    })
}

/// `GET /api/options/{table}/{column}/values`
///
/// Lists the values of an offered column, most frequent first.
pub async fn attribute_values(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    params: web::Query<AttributeValuesParams>,
) -> HttpResponse {
    let (table, column) = path.into_inner();
    let Ok(table) = table.parse::<GeometryKind>() else {
        return error_response(HttpResponse::NotFound(), &format!("Unknown table {table}"));
    };
    let Ok(column) = AttributeName::new(&column) else {
        return error_response(HttpResponse::BadRequest(), &format!("Invalid column {column}"));
    };
    let options = &state.driver.env().options;
    if !options.columns(table).contains(&column) {
        return error_response(
            HttpResponse::NotFound(),
            &format!("Column {column} is not offered for {table}"),
        );
    }
    let min_count = params.min_count.unwrap_or_else(|| options.min_tag_count());

    let driver = state.driver.clone();
    match web::block(move || driver.store().attribute_values(table, &column, min_count)).await {
        Ok(Ok(values)) => HttpResponse::Ok().json(
            values
                .into_iter()
                .map(ApiAttributeValue::from)
                .collect::<Vec<_>>(),
        ),
        Ok(Err(e)) => internal_error("Failed to list attribute values", &e),
        Err(e) => internal_error("Failed to list attribute values", &e),
    }
}

/// `GET /api/explore`
///
/// Runs one styled query outside any session.
pub async fn explore(
    state: web::Data<AppState>,
    params: web::Query<ExploreQueryParams>,
) -> HttpResponse {
    let params = params.into_inner();
    let Some(rectangle) = parse_bbox(&params.bbox) else {
        return error_response(
            HttpResponse::BadRequest(),
            "bbox must be west,south,east,north",
        );
    };
    let Ok(column) = AttributeName::new(&params.column) else {
        return error_response(
            HttpResponse::BadRequest(),
            &format!("Invalid column {}", params.column),
        );
    };

    let env = state.driver.env();
    let filters = Filters {
        table: params.table,
        column,
        tags: params.tags.as_deref().map(parse_tags),
        row_cap: params
            .row_cap
            .unwrap_or_else(|| env.options.default_filters().row_cap),
    }
    .normalized();
    if let Err(e) = env.options.validate(&filters) {
        return error_response(HttpResponse::BadRequest(), &e.to_string());
    }

    let query = QueryParameters::new(&filters, env.normalizer.quantize(&rectangle));
    let driver = state.driver.clone();
    let result = web::block(move || {
        let (document, report) = driver.execute(&query)?;
        let styled =
            driver
                .env()
                .styler
                .style_document(&document, &query.column, query.tags.as_ref());
        Ok::<_, osm_explorer_query::QueryExecutionError>((styled, report))
    })
    .await;

    match result {
        Ok(Ok((styled, report))) => HttpResponse::Ok().json(ApiExploreResponse {
            report: ApiQueryReport::from(&report),
            overlay: ApiOverlay {
                collection: styled.to_geojson(),
                popup_fields: styled.popup_fields(),
            },
        }),
        Ok(Err(e)) => internal_error("Query failed", &e),
        Err(e) => internal_error("Query failed", &e),
    }
}

/// `POST /api/sessions`
pub async fn create_session(state: web::Data<AppState>) -> HttpResponse {
    match state.create_session() {
        Ok((id, session)) => HttpResponse::Created().json(ApiSession::from_state(id, &session)),
        Err(e) => internal_error("Failed to create session", &e),
    }
}

/// `GET /api/sessions/{id}`
pub async fn get_session(state: web::Data<AppState>, id: web::Path<String>) -> HttpResponse {
    let stored = match state.session(&id) {
        Ok(Some(stored)) => stored,
        Ok(None) => return session_not_found(&id),
        Err(e) => return internal_error("Failed to read session", &e),
    };
    match stored.snapshot() {
        Ok(session) => HttpResponse::Ok().json(ApiSession::from_state(id.as_str(), &session)),
        Err(e) => internal_error("Failed to read session", &e),
    }
}

/// `DELETE /api/sessions/{id}`
pub async fn delete_session(state: web::Data<AppState>, id: web::Path<String>) -> HttpResponse {
    match state.remove_session(&id) {
        Ok(true) => HttpResponse::NoContent().finish(),
        Ok(false) => session_not_found(&id),
        Err(e) => internal_error("Failed to delete session", &e),
    }
}

/// `POST /api/sessions/{id}/tick`
///
/// Folds a batch of events into the session and returns what the map and
/// control panel must show.
pub async fn tick(
    state: web::Data<AppState>,
    id: web::Path<String>,
    body: web::Json<TickRequest>,
) -> HttpResponse {
    let id = id.into_inner();
    let stored = match state.session(&id) {
        Ok(Some(stored)) => stored,
        Ok(None) => return session_not_found(&id),
        Err(e) => return internal_error("Failed to read session", &e),
    };

    let events = body.into_inner().events;
    log::debug!("Session {id}: {} event(s)", events.len());

    let driver = state.driver.clone();
    let result = web::block(move || {
        let mut widget = RecordingWidget::default();
        let mut panel = RecordingPanel::default();
        let (next, outcome) = stored.tick(&driver, &events, &mut widget, &mut panel)?;
        Ok::<_, crate::ServerError>(ApiTickResponse::new(
            ApiSession::from_state(id, &next),
            &outcome,
            &widget,
            &panel,
        ))
    })
    .await;

    match result {
        Ok(Ok(response)) => HttpResponse::Ok().json(response),
        Ok(Err(e)) => internal_error("Tick failed", &e),
        Err(e) => internal_error("Tick failed", &e),
    }
}

/// Parses a bounding box string `"west,south,east,north"` into a
/// [`BoundingRectangle`].
fn parse_bbox(s: &str) -> Option<BoundingRectangle> {
    let parts: Vec<f64> = s.split(',').filter_map(|p| p.trim().parse().ok()).collect();
    if parts.len() == 4 {
        BoundingRectangle::new(parts[0], parts[1], parts[2], parts[3]).ok()
    } else {
        None
    }
}

fn parse_tags(s: &str) -> TagSet {
    s.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(ToString::to_string)
        .collect()
}
