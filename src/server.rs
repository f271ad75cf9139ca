use crate::config::AppConfig;
use crate::types::StyledSchool;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    response::Json,
    routing::get,
    Router,
};
use rstar::primitives::GeomWithData;
use rstar::RTree;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tracing::info;

/// `[lon, lat]` tagged with the index into `AppState::schools`.
type SchoolPoint = GeomWithData<[f64; 2], usize>;

pub struct AppState {
    pub schools: Vec<StyledSchool>,
    pub tree: RTree<SchoolPoint>,
}

impl AppState {
    pub fn new(schools: Vec<StyledSchool>) -> Self {
        info!("Building spatial index for {} schools...", schools.len());
        let points = schools
            .iter()
            .enumerate()
            .map(|(i, s)| GeomWithData::new([s.lon, s.lat], i))
            .collect();
        Self {
            tree: RTree::bulk_load(points),
            schools,
        }
    }

    pub fn nearest(&self, lat: f64, lon: f64) -> Option<&StyledSchool> {
        self.tree
            .nearest_neighbor(&[lon, lat])
            .and_then(|p| self.schools.get(p.data))
    }
}

#[derive(Deserialize)]
pub struct NearestParams {
    lat: f64,
    lon: f64,
}

pub fn router(state: Arc<AppState>, config: &AppConfig) -> Router {
    Router::new()
        .route("/api/schools", get(schools_handler))
        .route("/api/nearest", get(nearest_handler))
        .fallback_service(ServeDir::new(&config.output.dir))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start_server(config: AppConfig, schools: Vec<StyledSchool>) -> Result<()> {
    let state = Arc::new(AppState::new(schools));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.server.port));
    info!(
        "Serving {:?} on http://{}/{}",
        config.output.dir, addr, config.output.map_html
    );

    let app = router(state, &config);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn schools_handler(State(state): State<Arc<AppState>>) -> Json<Vec<StyledSchool>> {
    Json(state.schools.clone())
}

async fn nearest_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<NearestParams>,
) -> Json<Option<StyledSchool>> {
    Json(state.nearest(params.lat, params.lon).cloned())
}
