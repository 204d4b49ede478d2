//! Gemini APIキー管理
//!
//! # セキュリティガイドライン
//! - APIキーは絶対にログに出力しないこと
//! - 環境変数 GEMINI_API_KEY を優先し、なければデータディレクトリの
//!   gemini_api_key.json を読む

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// APIキー設定ファイルの構造
#[derive(Debug, Serialize, Deserialize)]
pub struct GeminiApiKeyConfig {
    pub api_key: String,
}

/// APIキー設定ファイルのパスを取得
pub fn get_config_path(data_dir: &Path) -> PathBuf {
    data_dir.join("gemini_api_key.json")
}

/// APIキーを読み込み
///
/// キーが見つからない場合は `Ok(None)`。サーバーは起動するが、
/// 解析リクエストは AiNotConfigured で拒否される。
///
/// # セキュリティ
/// APIキーはログに出力されません
pub fn load_api_key(data_dir: &Path) -> Result<Option<String>, String> {
    if let Ok(key) = std::env::var(API_KEY_ENV) {
        let key = key.trim().to_string();
        if !key.is_empty() {
            log::info!("Gemini API key loaded from environment");
            return Ok(Some(key));
        }
    }

    let config_path = get_config_path(data_dir);
    if !config_path.exists() {
        log::warn!(
            "Gemini API key not configured (set {API_KEY_ENV} or place {})",
            config_path.display()
        );
        return Ok(None);
    }

    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read Gemini API key file: {e}"))?;

    let config: GeminiApiKeyConfig = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse Gemini API key file: {e}"))?;

    if config.api_key.trim().is_empty() {
        return Err("Gemini API key is empty".to_string());
    }

    // セキュリティ: APIキーをログに出力しない
    log::info!("Gemini API key loaded from file");

    Ok(Some(config.api_key.trim().to_string()))
}
