use crate::error::AppError;
use crate::models::battle::*;
use serde::Deserialize;
use serde_json::Value;

pub const CHAMPION_BONUS: u32 = 30;
/// A champion needs strictly more votes than this to earn the bonus.
pub const CHAMPION_MIN_VOTES: usize = 15;

/// Invited judges and the bonus a submission earns when each one voted for it.
pub const SPECIAL_JUDGES: &[(&str, u32)] = &[("K'K", 30), ("AJ", 30), ("麦橘MERJIC", 30)];

const UNKNOWN_BATTLE: &str = "未知";
const UNKNOWN_USER: &str = "未知用户";
const UNKNOWN_VOTER: &str = "未知";

/// Validate the fight item payload, then tally and score every creation.
pub fn score_battle(payload: &Value) -> Result<BattleSummary, AppError> {
    if !payload.get("success").is_some_and(is_truthy) {
        return Err(AppError::InvalidData("payload is not marked successful".into()));
    }
    let data = match payload.get("data") {
        Some(data @ Value::Object(_)) => data,
        _ => return Err(AppError::InvalidData("payload has no data object".into())),
    };
    let battle = RawBattle::deserialize(data)
        .map_err(|e| AppError::InvalidData(format!("malformed battle data: {}", e)))?;

    Ok(summarize(battle))
}

fn summarize(battle: RawBattle) -> BattleSummary {
    let winners = battle.winner_list.unwrap_or_default();
    let winner_count = winners.len();

    let merged: Vec<Submission> = winners
        .into_iter()
        .chain(battle.creation_list.unwrap_or_default())
        .map(to_submission)
        .collect();

    let total_votes = merged.iter().map(|s| s.voters.len()).sum();
    let total_creations = merged.len();
    let max_votes = merged.iter().map(|s| s.voters.len()).max().unwrap_or(0);

    let mut results: Vec<ScoredSubmission> = merged
        .into_iter()
        .map(|submission| score_submission(submission, max_votes))
        .collect();

    // Stable: ties keep winners-then-creations order.
    results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));

    BattleSummary {
        results,
        total_votes,
        total_creations,
        winner_count,
        battle_info: BattleInfo {
            name: battle.fight_name_cn.unwrap_or_else(|| UNKNOWN_BATTLE.to_string()),
            description: battle.fight_desc.unwrap_or_default(),
            created_at: battle.create_time.unwrap_or_default(),
            ends_at: battle.end_time.unwrap_or_default(),
            participant_count: battle.fight_user_count.unwrap_or(0),
        },
    }
}

fn to_submission(raw: RawCreation) -> Submission {
    Submission {
        creation_id: raw.creation_id.or(raw.id).unwrap_or_else(|| "N/A".into()),
        user_name: raw.user_name.unwrap_or_else(|| UNKNOWN_USER.to_string()),
        voters: raw
            .vote_list
            .unwrap_or_default()
            .into_iter()
            .map(|vote| vote.user_name.unwrap_or_else(|| UNKNOWN_VOTER.to_string()))
            .collect(),
        created_at: raw.create_time.unwrap_or_default(),
        url: raw.creation_url.unwrap_or_default(),
        is_champion: raw.winner,
    }
}

pub fn score_submission(submission: Submission, max_votes: usize) -> ScoredSubmission {
    let votes = submission.voters.len();
    let base_score = if votes == 0 || max_votes == 0 {
        0.0
    } else {
        votes as f64 / max_votes as f64 * 100.0
    };

    let champion_bonus = if submission.is_champion && votes > CHAMPION_MIN_VOTES {
        CHAMPION_BONUS
    } else {
        0
    };

    let judge_bonuses = judge_bonuses(&submission.voters);
    let judge_bonus_total = judge_bonuses.total();
    let final_score = round_to(base_score + f64::from(champion_bonus + judge_bonus_total), 2);

    ScoredSubmission {
        submission,
        votes,
        base_score,
        champion_bonus,
        judge_bonuses,
        judge_bonus_total,
        final_score,
    }
}

/// One pass over the voters, flagging every invited judge seen.
pub fn judge_bonuses(voters: &[String]) -> JudgeBonuses {
    let mut earned = vec![false; SPECIAL_JUDGES.len()];
    for voter in voters {
        if let Some(idx) = SPECIAL_JUDGES.iter().position(|(name, _)| name == voter) {
            earned[idx] = true;
        }
    }
    JudgeBonuses(
        SPECIAL_JUDGES
            .iter()
            .zip(earned)
            .map(|(&(name, bonus), hit)| (name, if hit { bonus } else { 0 }))
            .collect(),
    )
}

/// Score each vote is worth, rounded to 4 places; 0 for a battle without votes.
pub fn points_per_vote(total_votes: usize) -> f64 {
    if total_votes == 0 {
        0.0
    } else {
        round_to(100.0 / total_votes as f64, 4)
    }
}

/// Exact ties on the scaled value round to even (15.625 -> 15.62).
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
