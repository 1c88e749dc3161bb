//! Order book inspection

use axum::{
    extract::{Path, State},
    Json,
};

use matching_engine::BookStats;
use types::ids::Symbol;

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /v1/books/{symbol}`: best bid/ask, spread, and depth.
pub async fn book_stats(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
) -> Result<Json<BookStats>, ApiError> {
    let symbol = Symbol::try_new(&symbol)
        .ok_or_else(|| ApiError::NotFound("empty symbol".to_string()))?;
    state
        .engine
        .stats(&symbol)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no book for {symbol}")))
}
