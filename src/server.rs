use crate::config::AppConfig;
use crate::data::{load_directory, DataService};
use crate::error::{not_found, AppError};
use crate::filter::FilterState;
use crate::map::{Interaction, MapData, MapState, MapView};
use crate::popup::PopupOverlay;
use crate::options::group_options;
use crate::redraw::{LayerRevision, RepaintSchedule};
use crate::types::{GroupedOption, Toast};
use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    response::{Html, Json},
    routing::{get, post},
    Router,
};
use geojson::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

pub struct MapAppState {
    pub data: MapData,
    pub revision: Arc<LayerRevision>,
    pub toast: Option<Toast>,
}

impl MapAppState {
    fn view(&self, state: MapState) -> MapView<'_> {
        MapView::new(&self.data, state)
            .with_redraw(self.revision.clone(), RepaintSchedule::default())
    }
}

#[derive(Deserialize)]
pub struct SizeParams {
    #[serde(default = "default_width")]
    width: f64,
    #[serde(default = "default_height")]
    height: f64,
}

fn default_width() -> f64 {
    1024.0
}

fn default_height() -> f64 {
    768.0
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    id: String,
    display_name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitialResponse {
    state: MapState,
    clusters: FeatureCollection,
    associations: Vec<ListEntry>,
    district_options: Vec<GroupedOption>,
    activity_options: Vec<GroupedOption>,
    #[serde(skip_serializing_if = "Option::is_none")]
    toast: Option<Toast>,
    revision: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClustersResponse {
    clusters: FeatureCollection,
    revision: u64,
}

#[derive(Deserialize)]
pub struct FilterRequest {
    state: MapState,
    filter: FilterState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterResponse {
    state: MapState,
    changed: bool,
    associations: Vec<ListEntry>,
    clusters: FeatureCollection,
}

/// Single-field filter edits from the sidebar controls.
#[derive(Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum FilterCommand {
    Query { query: String },
    Districts { values: Vec<String> },
    Activities { values: Vec<String> },
    ResetDistricts,
    ResetActivities,
    Clear,
}

#[derive(Deserialize)]
pub struct FilterEdit {
    state: MapState,
    #[serde(flatten)]
    command: FilterCommand,
}

#[derive(Deserialize)]
pub struct PixelRequest {
    state: MapState,
    pixel: [f64; 2],
}

#[derive(Deserialize)]
pub struct SelectRequest {
    state: MapState,
    id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionResponse {
    state: MapState,
    #[serde(flatten)]
    interaction: Interaction,
}

#[derive(Serialize)]
pub struct CursorResponse {
    cursor: &'static str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseResponse {
    state: MapState,
    closed: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarResponse {
    state: MapState,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OverlayResponse {
    overlay: Option<PopupOverlay>,
}

#[derive(Serialize)]
pub struct RevisionResponse {
    revision: u64,
}

fn list_entries(view: &MapView<'_>) -> Vec<ListEntry> {
    view.filtered_associations()
        .into_iter()
        .map(|a| ListEntry {
            id: a.id.clone(),
            display_name: a.display_name().to_string(),
        })
        .collect()
}

pub fn map_router(state: Arc<MapAppState>) -> Router {
    Router::new()
        .route("/", get(initial_handler))
        .route("/api/clusters", post(clusters_handler))
        .route("/api/filter", post(filter_handler))
        .route("/api/filter/edit", post(filter_edit_handler))
        .route("/api/sidebar", post(sidebar_handler))
        .route("/api/overlay", post(overlay_handler))
        .route("/api/click", post(click_handler))
        .route("/api/select", post(select_handler))
        .route("/api/pointer", post(pointer_handler))
        .route("/api/close", post(close_handler))
        .route("/api/popup/:id", get(popup_handler))
        .route("/api/layer/revision", get(revision_handler))
        .fallback(not_found)
        .with_state(state)
}

async fn initial_handler(
    State(app): State<Arc<MapAppState>>,
    Query(size): Query<SizeParams>,
) -> Json<InitialResponse> {
    let view = app.view(MapState::initial(&app.data.config, [size.width, size.height]));
    Json(InitialResponse {
        clusters: view.render_geojson(),
        associations: list_entries(&view),
        district_options: group_options(&app.data.district_options),
        activity_options: group_options(&app.data.activity_options),
        toast: app.toast.clone(),
        revision: app.revision.current(),
        state: view.into_state(),
    })
}

async fn clusters_handler(
    State(app): State<Arc<MapAppState>>,
    Json(state): Json<MapState>,
) -> Json<ClustersResponse> {
    let view = app.view(state);
    Json(ClustersResponse {
        clusters: view.render_geojson(),
        revision: app.revision.current(),
    })
}

async fn filter_handler(
    State(app): State<Arc<MapAppState>>,
    Json(request): Json<FilterRequest>,
) -> Json<FilterResponse> {
    let mut view = app.view(request.state);
    let changed = view.apply_filter(request.filter);
    Json(filter_response(view, changed))
}

fn filter_response(view: MapView<'_>, changed: bool) -> FilterResponse {
    FilterResponse {
        changed,
        associations: list_entries(&view),
        clusters: view.render_geojson(),
        state: view.into_state(),
    }
}

async fn filter_edit_handler(
    State(app): State<Arc<MapAppState>>,
    Json(edit): Json<FilterEdit>,
) -> Json<FilterResponse> {
    let mut view = app.view(edit.state);
    let changed = match edit.command {
        FilterCommand::Query { query } => view.set_query(&query),
        FilterCommand::Districts { values } => view.select_districts(values),
        FilterCommand::Activities { values } => view.select_activities(values),
        FilterCommand::ResetDistricts => view.reset_districts(),
        FilterCommand::ResetActivities => view.reset_activities(),
        FilterCommand::Clear => view.clear_filters(),
    };
    Json(filter_response(view, changed))
}

async fn sidebar_handler(
    State(app): State<Arc<MapAppState>>,
    Json(state): Json<MapState>,
) -> Json<SidebarResponse> {
    let mut view = app.view(state);
    view.toggle_sidebar();
    Json(SidebarResponse {
        state: view.into_state(),
    })
}

/// Overlay of the popup that is open in `state`, for restoring the view after a reload.
async fn overlay_handler(
    State(app): State<Arc<MapAppState>>,
    Json(state): Json<MapState>,
) -> Json<OverlayResponse> {
    let view = app.view(state);
    Json(OverlayResponse {
        overlay: view.popup_overlay(),
    })
}

async fn click_handler(
    State(app): State<Arc<MapAppState>>,
    Json(request): Json<PixelRequest>,
) -> Json<InteractionResponse> {
    let mut view = app.view(request.state);
    let interaction = view.click(request.pixel);
    Json(InteractionResponse {
        state: view.into_state(),
        interaction,
    })
}

async fn select_handler(
    State(app): State<Arc<MapAppState>>,
    Json(request): Json<SelectRequest>,
) -> Json<InteractionResponse> {
    let mut view = app.view(request.state);
    let interaction = view.select_association(&request.id);
    Json(InteractionResponse {
        state: view.into_state(),
        interaction,
    })
}

async fn pointer_handler(
    State(app): State<Arc<MapAppState>>,
    Json(request): Json<PixelRequest>,
) -> Json<CursorResponse> {
    let view = app.view(request.state);
    Json(CursorResponse {
        cursor: view.cursor(request.pixel),
    })
}

async fn close_handler(
    State(app): State<Arc<MapAppState>>,
    Json(state): Json<MapState>,
) -> Json<CloseResponse> {
    let mut view = app.view(state);
    let closed = view.close_popup();
    Json(CloseResponse {
        state: view.into_state(),
        closed,
    })
}

async fn popup_handler(
    State(app): State<Arc<MapAppState>>,
    Path(id): Path<String>,
) -> Result<Html<String>, AppError> {
    let association = app
        .data
        .association(&id)
        .ok_or_else(|| AppError::NotFound(format!("association {}", id)))?;
    Ok(Html(crate::popup::popup_content(
        association,
        &app.data.district_options,
    )))
}

async fn revision_handler(State(app): State<Arc<MapAppState>>) -> Json<RevisionResponse> {
    Json(RevisionResponse {
        revision: app.revision.current(),
    })
}

fn with_static(router: Router, config: &AppConfig) -> Router {
    match &config.server.static_dir {
        Some(dir) => router.nest_service("/assets", ServeDir::new(dir)),
        None => router,
    }
}

async fn serve(router: Router, config: &AppConfig) -> Result<()> {
    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!("Starting server on http://{}", addr);

    let app = with_static(router, config)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// Loads the directory once and serves the map application.
pub async fn start_map_server(config: AppConfig, service: Arc<dyn DataService>) -> Result<()> {
    let directory = load_directory(service.as_ref()).await;
    let toast = directory.toast.clone();
    let state = Arc::new(MapAppState {
        data: MapData::new(directory, config.map.clone()),
        revision: Arc::new(LayerRevision::default()),
        toast,
    });
    serve(map_router(state), &config).await
}

/// Serves the administration forms.
pub async fn start_form_server(config: AppConfig, service: Arc<dyn DataService>) -> Result<()> {
    let state = Arc::new(crate::admin::FormAppState {
        service,
        root_path: config.server.root_path.clone(),
    });
    serve(crate::admin::form_router(state), &config).await
}
