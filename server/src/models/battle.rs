use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A loosely typed scalar as the upstream sends it. Ids and timestamps
/// arrive as either numbers or strings depending on the battle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

impl Default for Scalar {
    fn default() -> Self {
        Scalar::Text(String::new())
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Int(n) => write!(f, "{}", n),
            Scalar::Float(n) => write!(f, "{}", n),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

// Upstream payload (`data` object of the fight item response). Scalars are
// decoded leniently: a mistyped field falls back to its default instead of
// failing the whole battle.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawBattle {
    pub winner_list: Option<Vec<RawCreation>>,
    pub creation_list: Option<Vec<RawCreation>>,
    #[serde(deserialize_with = "lenient_text")]
    pub fight_name_cn: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub fight_desc: Option<String>,
    #[serde(deserialize_with = "lenient_scalar")]
    pub create_time: Option<Scalar>,
    #[serde(deserialize_with = "lenient_scalar")]
    pub end_time: Option<Scalar>,
    #[serde(deserialize_with = "lenient_count")]
    pub fight_user_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCreation {
    #[serde(deserialize_with = "lenient_scalar")]
    pub creation_id: Option<Scalar>,
    #[serde(deserialize_with = "lenient_scalar")]
    pub id: Option<Scalar>,
    #[serde(deserialize_with = "lenient_text")]
    pub user_name: Option<String>,
    pub vote_list: Option<Vec<RawVote>>,
    #[serde(deserialize_with = "lenient_scalar")]
    pub create_time: Option<Scalar>,
    #[serde(deserialize_with = "lenient_text")]
    pub creation_url: Option<String>,
    /// `1` (or `true`) marks a champion entry.
    #[serde(deserialize_with = "lenient_flag")]
    pub winner: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawVote {
    #[serde(deserialize_with = "lenient_text")]
    pub user_name: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_scalar<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Scalar>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(Scalar::Text(s)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Scalar::Int(i)),
            None => n.as_f64().map(Scalar::Float),
        },
        _ => None,
    })
}

fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_flag<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64() == Some(1.0),
        _ => false,
    })
}

// Scored output. Field names follow the keys the battle frontend reads.

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Submission {
    #[serde(rename = "作品ID")]
    pub creation_id: Scalar,
    #[serde(rename = "用户名")]
    pub user_name: String,
    #[serde(rename = "投票者")]
    pub voters: Vec<String>,
    #[serde(rename = "创建时间")]
    pub created_at: Scalar,
    #[serde(rename = "作品链接")]
    pub url: String,
    #[serde(rename = "是否冠军", serialize_with = "serialize_yes_no")]
    pub is_champion: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredSubmission {
    #[serde(flatten)]
    pub submission: Submission,
    #[serde(rename = "票数")]
    pub votes: usize,
    #[serde(rename = "基础分")]
    pub base_score: f64,
    #[serde(rename = "加分")]
    pub champion_bonus: u32,
    #[serde(flatten)]
    pub judge_bonuses: JudgeBonuses,
    #[serde(rename = "特邀评委总分")]
    pub judge_bonus_total: u32,
    #[serde(rename = "得分")]
    pub final_score: f64,
}

/// Per-judge bonuses in judge-table order, serialized as `<name>加分` keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JudgeBonuses(pub Vec<(&'static str, u32)>);

impl JudgeBonuses {
    #[cfg(test)]
    pub fn get(&self, judge: &str) -> Option<u32> {
        self.0
            .iter()
            .find(|(name, _)| *name == judge)
            .map(|(_, bonus)| *bonus)
    }

    pub fn total(&self) -> u32 {
        self.0.iter().map(|(_, bonus)| bonus).sum()
    }
}

impl Serialize for JudgeBonuses {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, bonus) in &self.0 {
            map.serialize_entry(&format!("{}加分", name), bonus)?;
        }
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleInfo {
    #[serde(rename = "名称")]
    pub name: String,
    #[serde(rename = "描述")]
    pub description: String,
    #[serde(rename = "创建时间")]
    pub created_at: Scalar,
    #[serde(rename = "结束时间")]
    pub ends_at: Scalar,
    #[serde(rename = "参与用户数")]
    pub participant_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleSummary {
    pub results: Vec<ScoredSubmission>,
    pub total_votes: usize,
    pub total_creations: usize,
    pub winner_count: usize,
    pub battle_info: BattleInfo,
}

/// What the API hands back: the summary plus request-level metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BattleReport {
    #[serde(flatten)]
    pub summary: BattleSummary,
    #[serde(rename = "fightId")]
    pub fight_id: u64,
    pub points_per_vote: f64,
}

fn serialize_yes_no<S: Serializer>(flag: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(if *flag { "是" } else { "否" })
}
