#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Actix-Web API server for the OSM explorer.
//!
//! Each browser tab owns a session: a view state machine held on the server
//! and advanced by posting batches of widget and control panel events to
//! `/api/sessions/{id}/tick`. All sessions share one geometry store and one
//! query result cache.

mod handlers;
pub mod interactive;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use actix_cors::Cors;
use actix_web::{App, HttpServer, middleware, web};
use chrono::{DateTime, Utc};
use osm_explorer_config::{ConfigError, ExplorerConfig};
use osm_explorer_query::QueryCache;
use osm_explorer_session::{
    ControlPanel, Driver, Environment, Event, MapWidget, SessionError, SessionState, TickOutcome,
};
use osm_explorer_store::{GeometryStore, MemoryStore, StoreError};

/// Sessions kept before the oldest is dropped.
pub const MAX_SESSIONS: usize = 1024;

/// Errors starting or running the server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Session table lock poisoned")]
    LockPoisoned,
}

/// A session parked between ticks.
///
/// The state sits behind its own lock, so ticks on one session run one at
/// a time while other sessions proceed.
#[derive(Debug)]
pub struct StoredSession {
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    state: Mutex<SessionState>,
}

impl StoredSession {
    fn new(state: SessionState) -> Self {
        Self {
            created_at: Utc::now(),
            state: Mutex::new(state),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, SessionState>, ServerError> {
        self.state.lock().map_err(|_| ServerError::LockPoisoned)
    }

    /// A copy of the current state.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if a tick panicked.
    pub fn snapshot(&self) -> Result<SessionState, ServerError> {
        Ok(self.lock()?.clone())
    }

    /// Runs one tick under the session lock and applies it to `widget` and
    /// `panel`. Returns the new state and the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if an earlier tick panicked.
    pub fn tick(
        &self,
        driver: &Driver,
        events: &[Event],
        widget: &mut dyn MapWidget,
        panel: &mut dyn ControlPanel,
    ) -> Result<(SessionState, TickOutcome), ServerError> {
        let mut state = self.lock()?;
        let (next, outcome) = driver.run_tick(std::mem::take(&mut *state), events);
        *state = next.clone();
        drop(state);

        outcome.apply(widget, panel);
        Ok((next, outcome))
    }
}

/// Shared application state.
pub struct AppState {
    /// Loaded configuration.
    pub config: ExplorerConfig,
    /// Store, cache and environment shared by all sessions.
    pub driver: Driver,
    sessions: Mutex<BTreeMap<String, Arc<StoredSession>>>,
}

impl AppState {
    /// Builds the state around an already opened store.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if landmarks cannot be loaded or the
    /// configuration is invalid.
    pub fn new(config: ExplorerConfig, store: Arc<dyn GeometryStore>) -> Result<Self, ServerError> {
        let env = Environment::load(&config, store.as_ref())?;
        log::info!(
            "Loaded {} landmark(s); cache capacity {}",
            env.locator.len(),
            config.cache_capacity
        );
        let driver = Driver::new(
            store,
            Arc::new(QueryCache::new(config.cache_capacity)),
            Arc::new(env),
        );

        Ok(Self {
            config,
            driver,
            sessions: Mutex::new(BTreeMap::new()),
        })
    }

    /// Opens the configured store and builds the state around it.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError`] if the store cannot be opened.
    pub fn from_config(config: ExplorerConfig) -> Result<Self, ServerError> {
        let store = open_store(&config)?;
        Self::new(config, store)
    }

    fn sessions(
        &self,
    ) -> Result<MutexGuard<'_, BTreeMap<String, Arc<StoredSession>>>, ServerError> {
        self.sessions.lock().map_err(|_| ServerError::LockPoisoned)
    }

    /// Starts a session in the default view.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if the session table is poisoned.
    pub fn create_session(&self) -> Result<(String, SessionState), ServerError> {
        let id = uuid::Uuid::new_v4().to_string();
        let state = SessionState::new(self.driver.env());

        let mut sessions = self.sessions()?;
        if sessions.len() >= MAX_SESSIONS
            && let Some(oldest) = sessions
                .iter()
                .min_by_key(|(_, stored)| stored.created_at)
                .map(|(id, _)| id.clone())
        {
            log::debug!("Dropping oldest session {oldest}");
            sessions.remove(&oldest);
        }
        sessions.insert(id.clone(), Arc::new(StoredSession::new(state.clone())));
        log::info!("Created session {id} ({} active)", sessions.len());
        drop(sessions);

        Ok((id, state))
    }

    /// Session `id`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if the session table is poisoned.
    pub fn session(&self, id: &str) -> Result<Option<Arc<StoredSession>>, ServerError> {
        Ok(self.sessions()?.get(id).cloned())
    }

    /// Number of live sessions.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if the session table is poisoned.
    pub fn session_count(&self) -> Result<usize, ServerError> {
        Ok(self.sessions()?.len())
    }

    /// Removes session `id`, returning whether it existed.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::LockPoisoned`] if the session table is poisoned.
    pub fn remove_session(&self, id: &str) -> Result<bool, ServerError> {
        Ok(self.sessions()?.remove(id).is_some())
    }
}

/// Opens the geometry store `config` describes: the `DuckDB` warehouse when
/// `duckdb_path` is set, otherwise the `GeoJSON` tables under `data_dir`.
///
/// # Errors
///
/// Returns [`StoreError`] if the store cannot be opened.
pub fn open_store(config: &ExplorerConfig) -> Result<Arc<dyn GeometryStore>, StoreError> {
    match &config.duckdb_path {
        Some(path) => open_duckdb(path),
        None => {
            log::info!("Loading GeoJSON tables from {}", config.data_dir.display());
            Ok(Arc::new(MemoryStore::load_dir(&config.data_dir)?))
        }
    }
}

#[cfg(feature = "duckdb")]
fn open_duckdb(path: &Path) -> Result<Arc<dyn GeometryStore>, StoreError> {
    log::info!("Opening DuckDB warehouse {}", path.display());
    Ok(Arc::new(osm_explorer_store::DuckDbStore::open(path)?))
}

#[cfg(not(feature = "duckdb"))]
fn open_duckdb(path: &Path) -> Result<Arc<dyn GeometryStore>, StoreError> {
    Err(StoreError::new(format!(
        "{} is a DuckDB warehouse, but this build has no DuckDB support",
        path.display()
    )))
}

/// Registers the `/api` routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/health", web::get().to(handlers::health))
            .route("/options", web::get().to(handlers::options))
            .route(
                "/options/{table}/{column}/values",
                web::get().to(handlers::attribute_values),
            )
            .route("/explore", web::get().to(handlers::explore))
            .route("/sessions", web::post().to(handlers::create_session))
            .route("/sessions/{id}", web::get().to(handlers::get_session))
            .route("/sessions/{id}", web::delete().to(handlers::delete_session))
            .route("/sessions/{id}/tick", web::post().to(handlers::tick)),
    );
}

/// Serves `state` on `bind_addr:port`.
///
/// # Errors
///
/// Returns an `std::io::Result` error if the HTTP server fails to bind or
/// encounters a runtime error.
#[allow(clippy::future_not_send)]
pub async fn serve(state: AppState, bind_addr: String, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(state);

    log::info!("Starting server on {bind_addr}:{port}");

    HttpServer::new(move || {
        let cors = Cors::permissive();

        App::new()
            .wrap(cors)
            .wrap(middleware::Logger::default())
            .app_data(state.clone())
            .configure(configure)
    })
    .bind((bind_addr, port))?
    .run()
    .await
}

/// Bind address and port from `BIND_ADDR` and `PORT`.
#[must_use]
pub fn bind_from_env() -> (String, u16) {
    let bind_addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080);
    (bind_addr, port)
}

/// Starts the OSM explorer API server.
///
/// Opens the configured store, loads landmarks, and serves on the address
/// from [`bind_from_env`]. This is a regular async function; the caller
/// provides the async runtime (e.g. via `#[actix_web::main]`).
///
/// # Errors
///
/// Returns [`ServerError`] if the store cannot be opened or the server
/// fails to bind.
#[allow(clippy::future_not_send)]
pub async fn run_server(config: ExplorerConfig) -> Result<(), ServerError> {
    let state = AppState::from_config(config)?;
    let (bind_addr, port) = bind_from_env();
    serve(state, bind_addr, port).await?;
    Ok(())
}
