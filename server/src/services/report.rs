use crate::error::AppError;
use crate::models::battle::{BattleReport, BattleSummary};
use crate::services::fetcher::BattleSource;
use crate::services::scoring;
use chrono::Local;
use std::path::{Path, PathBuf};

/// Fetch one battle and score it. Used by both the API and the CLI.
pub async fn fetch_and_score(source: &dyn BattleSource, fight_id: u64) -> Result<BattleReport, AppError> {
    let raw = source
        .fetch(fight_id)
        .await
        .filter(scoring::is_truthy)
        .ok_or(AppError::UpstreamUnavailable(fight_id))?;
    let summary = scoring::score_battle(&raw)?;
    Ok(build_report(fight_id, summary))
}

pub fn build_report(fight_id: u64, summary: BattleSummary) -> BattleReport {
    let points_per_vote = scoring::points_per_vote(summary.total_votes);
    BattleReport {
        summary,
        fight_id,
        points_per_vote,
    }
}

/// Plain-text summary followed by the top `top` results.
pub fn render_summary(report: &BattleReport, top: usize) -> String {
    let summary = &report.summary;
    let info = &summary.battle_info;
    let rule = "=".repeat(60);
    let thin = "-".repeat(60);

    let mut lines = vec![
        rule.clone(),
        format!("BATTLE {} 投票统计汇总", report.fight_id),
        rule,
        format!("对战名称: {}", info.name),
        format!("总作品数: {}", summary.total_creations),
        format!("冠军作品数: {}", summary.winner_count),
        format!("总票数: {}", summary.total_votes),
        format!("每票得分: {:.4}", report.points_per_vote),
        format!("创建时间: {}", info.created_at),
        format!("结束时间: {}", info.ends_at),
        format!("参与用户数: {}", info.participant_count),
        String::new(),
        thin.clone(),
        format!("TOP {} 作品排名", top),
        thin.clone(),
        format!("{:<4} {:<8} {:<15} {:<6} {:<8}", "排名", "作品ID", "用户名", "票数", "得分"),
        thin,
    ];
    lines.extend(summary.results.iter().take(top).enumerate().map(|(rank, result)| {
        format!(
            "{:<4} {:<8} {:<15} {:<6} {:<8}",
            rank + 1,
            result.submission.creation_id.to_string(),
            result.submission.user_name,
            result.votes,
            result.final_score
        )
    }));
    lines.push(String::new());
    lines.join("\n")
}

pub fn snapshot_filename(fight_id: u64) -> PathBuf {
    PathBuf::from(format!(
        "battle_{}_data_{}.json",
        fight_id,
        Local::now().format("%Y%m%d_%H%M%S")
    ))
}

pub async fn save_snapshot(report: &BattleReport, path: &Path) -> Result<(), AppError> {
    let body = serde_json::to_vec_pretty(report)?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| AppError::Internal(format!("failed to write {}: {}", path.display(), e)))
}
