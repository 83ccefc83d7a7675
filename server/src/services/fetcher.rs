use crate::config::ServerConfig;
use crate::services::scoring::is_truthy;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Where raw battle payloads come from. `None` means the fetch failed; the
/// caller reports that uniformly.
#[async_trait]
pub trait BattleSource: Send + Sync {
    async fn fetch(&self, fight_id: u64) -> Option<Value>;
}

/// Fetches the fight item from the battleverse endpoint. One attempt per call.
#[derive(Clone)]
pub struct HttpBattleSource {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpBattleSource {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, reqwest::Error> {
        Self::new(config.endpoint.clone(), config.fetch_timeout)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, fight_id: u64) -> Result<Value, reqwest::Error> {
        self.http
            .post(&self.endpoint)
            .json(&json!({ "fightId": fight_id }))
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await
    }
}

#[async_trait]
impl BattleSource for HttpBattleSource {
    async fn fetch(&self, fight_id: u64) -> Option<Value> {
        match self.request(fight_id).await {
            Ok(payload) if !is_truthy(&payload) => {
                tracing::warn!(fight_id, endpoint = %self.endpoint, body = %payload, "battle endpoint returned an empty body");
                None
            }
            Ok(payload) => Some(payload),
            Err(err) => {
                tracing::warn!(
                    fight_id,
                    endpoint = %self.endpoint,
                    error = %err,
                    timeout = err.is_timeout(),
                    "battle fetch failed"
                );
                None
            }
        }
    }
}
