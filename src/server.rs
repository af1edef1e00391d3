use crate::config::AppConfig;
use crate::processing::{apply, FilterCriteria, FilterOptions};
use crate::render::{bounds, to_feature_collection, Bounds, DepositPalette, DetailPanel, LegendEntry};
use crate::selection::{find_by_name, DuplicatePolicy, LookupError};
use crate::types::FacilityRecord;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::process::Command;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::{debug, info, warn};

/// Read-only for the lifetime of the server.
pub struct AppState {
    pub records: Vec<FacilityRecord>,
    pub options: FilterOptions,
    pub palette: DepositPalette,
    pub policy: DuplicatePolicy,
}

impl AppState {
    pub fn new(records: Vec<FacilityRecord>, policy: DuplicatePolicy) -> Self {
        Self {
            options: FilterOptions::from_records(&records),
            palette: DepositPalette::from_records(&records),
            records,
            policy,
        }
    }
}

#[derive(Serialize)]
pub struct OptionsResponse {
    #[serde(flatten)]
    filters: FilterOptions,
    legend: Vec<LegendEntry>,
}

#[derive(Serialize)]
pub struct FacilitiesResponse {
    count: usize,
    bounds: Option<Bounds>,
    features: FeatureCollection,
}

#[derive(Deserialize)]
pub struct SelectionParams {
    name: Option<String>,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/options", get(options_handler))
        .route("/api/facilities", get(facilities_handler))
        .route("/api/facility", get(facility_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: &AppConfig, records: Vec<FacilityRecord>, open_browser: bool) -> Result<()> {
    let state = Arc::new(AppState::new(records, config.selection.on_duplicate));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    let app = router(state).fallback_service(ServeDir::new(&config.server.static_dir));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    let url = format!("http://{addr}/");
    info!("Serving map on {url}");

    if open_browser {
        open_in_browser(&url);
    }

    axum::serve(listener, app).await?;
    Ok(())
}

fn open_in_browser(url: &str) {
    let mut command = if cfg!(target_os = "macos") {
        Command::new("open")
    } else if cfg!(target_os = "windows") {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", "start", ""]);
        cmd
    } else {
        Command::new("xdg-open")
    };

    if let Err(err) = command.arg(url).spawn() {
        warn!("Could not open a browser ({err}), visit {url}");
    }
}

async fn options_handler(State(state): State<Arc<AppState>>) -> Json<OptionsResponse> {
    Json(OptionsResponse {
        filters: state.options.clone(),
        legend: state.palette.legend().to_vec(),
    })
}

async fn facilities_handler(
    State(state): State<Arc<AppState>>,
    Query(criteria): Query<FilterCriteria>,
) -> Json<FacilitiesResponse> {
    let criteria = criteria.normalized();
    let filtered = apply(&state.records, &criteria);
    if !criteria.is_empty() {
        debug!("{:?} matched {} facilities", criteria, filtered.len());
    }

    Json(FacilitiesResponse {
        count: filtered.len(),
        bounds: bounds(&filtered),
        features: to_feature_collection(&filtered, &state.palette),
    })
}

async fn facility_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SelectionParams>,
) -> Json<DetailPanel> {
    let Some(name) = params.name.filter(|n| !n.is_empty()) else {
        return Json(DetailPanel::empty());
    };

    match find_by_name(&state.records, &name, state.policy) {
        Ok(record) => Json(DetailPanel::from_record(record)),
        Err(err @ LookupError::NotFound { .. }) => {
            debug!("{err}");
            Json(DetailPanel::empty())
        }
        Err(err @ LookupError::Ambiguous { .. }) => {
            warn!("{err}");
            Json(DetailPanel::empty())
        }
    }
}
