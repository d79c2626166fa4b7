//! HTTP control surface.
//!
//! JSON in and out, 200 on success, 400 for caller mistakes, 500 for
//! everything else. Handlers are stateless translations onto the Pilot.

use crate::pilot::Pilot;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pilot_protocol::{ApiInfo, MinerAddress, PilotError, SwitchId, SwitchRequest, SwitchState};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

pub fn router(pilot: Pilot) -> Router {
    Router::new()
        .route("/miner/add", post(add_miner))
        .route("/miner/remove/{id}", get(remove_miner))
        .route("/miner/list", get(list_miners))
        .route("/miner/worker/{id}", get(miner_worker))
        .route("/switch/new", post(new_switch))
        .route("/switch/get/{id}", get(get_switch))
        .route("/switch/cancel/{id}", get(cancel_switch))
        .route("/switch/remove/{id}", get(remove_switch))
        .route("/switch/resume/{id}", get(resume_switch))
        .route("/switch/list", get(list_switch))
        .route("/script/create/{id}", get(create_script))
        .with_state(pilot)
}

/// Body of `POST /miner/add`.
#[derive(Debug, Deserialize)]
pub struct MinerAddRequest {
    pub miner: String,
    pub api: ApiInfo,
}

struct ApiError(PilotError);

impl From<PilotError> for ApiError {
    fn from(err: PilotError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            warn!(error = %self.0, "internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, self.0.to_string()).into_response()
    }
}

fn parse_addr(id: &str) -> Result<MinerAddress, ApiError> {
    id.parse::<MinerAddress>()
        .map_err(|err| ApiError(PilotError::BadRequest(err.to_string())))
}

/// Manual body decoding so malformed JSON surfaces as 400, not axum's 422.
fn parse_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, ApiError> {
    serde_json::from_str(body)
        .map_err(|err| ApiError(PilotError::BadRequest(format!("invalid body: {err}"))))
}

fn parse_switch_id(id: &str) -> Result<SwitchId, ApiError> {
    id.parse::<SwitchId>()
        .map_err(|err| ApiError(PilotError::BadRequest(format!("invalid switch id: {err}"))))
}

async fn add_miner(State(pilot): State<Pilot>, body: String) -> Result<(), ApiError> {
    let body: MinerAddRequest = parse_body(&body)?;
    let address = parse_addr(&body.miner)?;
    pilot.add_miner(address, body.api).await?;
    Ok(())
}

async fn remove_miner(State(pilot): State<Pilot>, Path(id): Path<String>) -> Result<(), ApiError> {
    let address = parse_addr(&id)?;
    pilot.remove_miner(&address).await?;
    Ok(())
}

async fn list_miners(State(pilot): State<Pilot>) -> Json<Vec<String>> {
    Json(pilot.list_miners().await)
}

async fn miner_worker(
    State(pilot): State<Pilot>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let out = if id == "all" {
        let info = pilot.worker_info_all().await?;
        serde_json::to_value(info)
    } else {
        let address = parse_addr(&id)?;
        let info = pilot.worker_info(&address).await?;
        serde_json::to_value(&*info)
    };
    Ok(Json(out.map_err(|err| PilotError::Fatal(err.to_string()))?))
}

async fn new_switch(
    State(pilot): State<Pilot>,
    body: String,
) -> Result<Json<SwitchState>, ApiError> {
    let req: SwitchRequest = parse_body(&body)?;
    Ok(Json(pilot.new_switch(req).await?))
}

async fn get_switch(
    State(pilot): State<Pilot>,
    Path(id): Path<String>,
) -> Result<Json<SwitchState>, ApiError> {
    let id = parse_switch_id(&id)?;
    Ok(Json(pilot.get_switch(id).await?))
}

async fn cancel_switch(State(pilot): State<Pilot>, Path(id): Path<String>) -> Result<(), ApiError> {
    let id = parse_switch_id(&id)?;
    pilot.cancel_switch(id).await?;
    Ok(())
}

async fn remove_switch(State(pilot): State<Pilot>, Path(id): Path<String>) -> Result<(), ApiError> {
    let id = parse_switch_id(&id)?;
    pilot.remove_switch(id).await?;
    Ok(())
}

async fn resume_switch(State(pilot): State<Pilot>, Path(id): Path<String>) -> Result<(), ApiError> {
    let id = parse_switch_id(&id)?;
    pilot.resume_switch(id).await?;
    Ok(())
}

async fn list_switch(State(pilot): State<Pilot>) -> Json<Vec<SwitchId>> {
    Json(pilot.list_switch().await)
}

async fn create_script(State(pilot): State<Pilot>, Path(id): Path<String>) -> Result<(), ApiError> {
    pilot.create_script(&id).await?;
    Ok(())
}
