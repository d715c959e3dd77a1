use crate::engine::{RaceLap, RaceResult};
use crate::types::CarState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::Response,
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::{sync::Arc, time::Duration};

// ---------- Server state ----------

#[derive(Clone)]
pub struct FeedState {
    race: Arc<RaceResult>,
    /// Delay between laps on the streaming endpoint.
    lap_interval: Duration,
}

impl FeedState {
    pub fn new(race: RaceResult, lap_interval: Duration) -> Self {
        Self {
            race: Arc::new(race),
            lap_interval,
        }
    }
}

type ApiError = (StatusCode, Json<serde_json::Value>);

// ---------- Handlers ----------

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn race(State(state): State<FeedState>) -> Json<RaceResult> {
    Json(state.race.as_ref().clone())
}

async fn standings(State(state): State<FeedState>) -> Json<Vec<CarState>> {
    Json(state.race.standings().into_iter().cloned().collect())
}

async fn lap(
    State(state): State<FeedState>,
    Path(lap): Path<u32>,
) -> Result<Json<RaceLap>, ApiError> {
    state.race.lap(lap).cloned().map(Json).ok_or_else(|| {
        (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": format!("lap {lap} out of range 1..={}", state.race.history.len())
            })),
        )
    })
}

async fn stream(ws: WebSocketUpgrade, State(state): State<FeedState>) -> Response {
    ws.on_upgrade(move |socket| push_laps(socket, state))
}

/// Sends the race one lap per message, paced by the state's interval.
async fn push_laps(mut socket: WebSocket, state: FeedState) {
    for lap in &state.race.history {
        let payload = match serde_json::to_string(lap) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!("failed to encode lap {}: {}", lap.lap, e);
                break;
            }
        };
        if socket.send(Message::Text(payload)).await.is_err() {
            tracing::debug!("stream client went away at lap {}", lap.lap);
            return;
        }
        tokio::time::sleep(state.lap_interval).await;
    }
    let _ = socket.send(Message::Close(None)).await;
}

pub fn router(state: FeedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/race", get(race))
        .route("/race/standings", get(standings))
        .route("/race/laps/:lap", get(lap))
        .route("/race/stream", get(stream))
        .with_state(state)
}

pub async fn serve(state: FeedState, port: u16) -> anyhow::Result<()> {
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("race feed listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router(state)).await?;
    Ok(())
}
