use crate::error::AppError;
use crate::services::fetcher::BattleSource;
use crate::services::report;
use crate::validation;
use ntex::util::Bytes;
use ntex::web::{self, HttpResponse};
use serde_json::Value;
use std::sync::Arc;

pub type SharedSource = Arc<dyn BattleSource>;

pub async fn score_battle(
    source: web::types::State<SharedSource>,
    body: Bytes,
) -> Result<HttpResponse, AppError> {
    let payload = parse_body(&body)?;
    let fight_id = validation::resolve_fight_id(&payload).inspect_err(|_| {
        tracing::warn!(payload = %payload, "no battle identifier in request");
    })?;

    let report = report::fetch_and_score(&**source, fight_id)
        .await
        .inspect_err(|err| tracing::warn!(fight_id, error = %err, "battle request failed"))?;

    tracing::info!(
        fight_id,
        total_votes = report.summary.total_votes,
        total_creations = report.summary.total_creations,
        "battle scored"
    );
    Ok(HttpResponse::Ok().json(&serde_json::json!({
        "success": true,
        "data": report,
    })))
}

/// An empty body reads as `{}`; anything else must be valid JSON.
fn parse_body(body: &[u8]) -> Result<Value, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_slice(body)?)
}
