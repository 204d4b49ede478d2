//! アプリケーション共通のエラー型
//!
//! HTTP レスポンスへの変換もここで行う。ユーザー向けメッセージはそのまま返し、
//! DB エラーなどの内部詳細はログにのみ出力する。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    MissingInput(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Invalid ID")]
    InvalidId,

    #[error("Unauthorized. Please log in.")]
    Unauthorized,

    #[error("Forbidden. You are not authorized to perform this action.")]
    Forbidden,

    #[error("{0}")]
    NotFound(String),

    #[error("\"{field}\" 已經存在")]
    Conflict { field: String },

    #[error("今日的 AI 解析次數已達上限（{limit} 次），請明天再試")]
    RateLimited { limit: u32 },

    #[error("GEMINI_API_KEY 未設定")]
    AiNotConfigured,

    #[error("AI 服務呼叫失敗: {0}")]
    AiRequest(String),

    #[error("無法驗證 Google 登入，請稍後再試")]
    AuthProvider(String),

    #[error("AI 回應格式錯誤，無法解析菜單。")]
    MalformedAiResponse(String),

    #[error("伺服器發生錯誤")]
    Database(String),
}

/// SQLite の UNIQUE 制約違反メッセージから列名を取り出す
static UNIQUE_FIELD_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"UNIQUE constraint failed: ([\w.]+(?:, [\w.]+)*)").unwrap());

impl AppError {
    /// sqlx エラーを分類する。UNIQUE 制約違反は Conflict、それ以外は Database
    pub fn database(context: &str, err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            if db_err.is_unique_violation() {
                let field = UNIQUE_FIELD_REGEX
                    .captures(db_err.message())
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_else(|| "unknown".to_string());
                log::warn!("{context}: unique constraint violated on {field}");
                return AppError::Conflict { field };
            }
        }
        log::error!("{context}: {err}");
        AppError::Database(format!("{context}: {err}"))
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MissingInput(_) | AppError::InvalidInput(_) | AppError::InvalidId => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict { .. } => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::AiNotConfigured => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::MalformedAiResponse(_) => StatusCode::BAD_GATEWAY,
            AppError::AiRequest(_) | AppError::AuthProvider(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::MissingInput(_) => "missing_input",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::InvalidId => "invalid_id",
            AppError::Unauthorized => "unauthorized",
            AppError::Forbidden => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::Conflict { .. } => "conflict",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::AiNotConfigured => "ai_not_configured",
            AppError::MalformedAiResponse(_) => "malformed_ai_response",
            AppError::AiRequest(_) => "ai_request_failed",
            AppError::AuthProvider(_) => "auth_provider_unavailable",
            AppError::Database(_) => "database_error",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
    code: &'static str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.to_string(),
            code: self.code(),
        };

        (self.status(), Json(body)).into_response()
    }
}
