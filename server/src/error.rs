use ntex::http::StatusCode;
use ntex::web::{HttpResponse, WebResponseError};
use std::fmt;

pub const INVALID_TARGET_MESSAGE: &str =
    "请提供有效的 battle 链接或 fightId，例如：https://www.battleverse.cn/battle/630 或 630";
pub const FETCH_FAILED_MESSAGE: &str = "拉取原始数据失败";
pub const PROCESSING_FAILED_MESSAGE: &str = "数据处理失败";

#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    UpstreamUnavailable(u64),
    InvalidData(String),
    NotFound,
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::UpstreamUnavailable(fight_id) => {
                write!(f, "No data returned for battle {}", fight_id)
            }
            AppError::InvalidData(reason) => write!(f, "Invalid battle data: {}", reason),
            AppError::NotFound => write!(f, "Not Found"),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::InvalidData(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the client. Invalid data only reports the generic
    /// processing failure; the reason stays in the logs.
    pub fn client_message(&self) -> String {
        match self {
            AppError::BadRequest(msg) => msg.clone(),
            AppError::UpstreamUnavailable(_) => FETCH_FAILED_MESSAGE.to_string(),
            AppError::InvalidData(_) => PROCESSING_FAILED_MESSAGE.to_string(),
            AppError::NotFound => "Not Found".to_string(),
            AppError::Internal(msg) => format!("服务器异常: {}", msg),
        }
    }
}

impl WebResponseError for AppError {
    fn error_response(&self, _: &ntex::web::HttpRequest) -> HttpResponse {
        HttpResponse::build(self.status()).json(&serde_json::json!({
            "success": false,
            "message": self.client_message(),
        }))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Internal(e.to_string())
    }
}
