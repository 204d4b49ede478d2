//! アプリケーション設定ファイルの管理
//!
//! サーバー・Gemini・アップロード・レート制限・認証の設定を drink_menu_config.json で管理する。
//! APIキーなどの秘密情報はこのファイルに置かず、環境変数から読む（gemini::config 参照）。

use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILENAME: &str = "drink_menu_config.json";

/// データディレクトリを指定する環境変数
pub const DATA_DIR_ENV: &str = "DRINK_MENU_DATA_DIR";
/// 管理者メールアドレス（カンマ区切り）を指定する環境変数
pub const ADMIN_EMAILS_ENV: &str = "ADMIN_EMAILS";

/// アプリケーション設定
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gemini: GeminiSettings,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

/// HTTP サーバー設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS で許可するオリジン（空なら CORS ヘッダーを付けない）
    pub allowed_origins: Vec<String>,
    /// リクエストボディの上限（画像の data URL を含むため大きめ）
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            allowed_origins: Vec::new(),
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}

/// Gemini 呼び出し設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    pub model: String,
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.0-flash".to_string(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            request_timeout_secs: 120,
            temperature: 0.1,
            max_output_tokens: 8192,
        }
    }
}

/// アップロード設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// デコード後の画像サイズ上限
    pub max_image_bytes: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_image_bytes: 10 * 1024 * 1024,
        }
    }
}

/// レート制限設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// 1ユーザーあたり1日の解析回数上限（0 で無制限）
    pub daily_limit: u32,
    /// 「1日」の境界を決めるタイムゾーン（IANA 名）
    pub timezone: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            daily_limit: 20,
            timezone: "Asia/Taipei".to_string(),
        }
    }
}

impl RateLimitConfig {
    pub fn tz(&self) -> Result<Tz, String> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| format!("Invalid rate_limit.timezone '{}': {e}", self.timezone))
    }
}

/// 認証設定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    pub admin_emails: Vec<String>,
    pub tokeninfo_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 24 * 30,
            admin_emails: Vec::new(),
            tokeninfo_url: "https://oauth2.googleapis.com/tokeninfo".to_string(),
        }
    }
}

impl AuthConfig {
    /// 設定ファイルと ADMIN_EMAILS 環境変数をマージする
    pub fn merge_admin_emails_from_env(&mut self) {
        if let Ok(raw) = std::env::var(ADMIN_EMAILS_ENV) {
            for email in parse_email_list(&raw) {
                if !self.admin_emails.iter().any(|e| e.eq_ignore_ascii_case(&email)) {
                    self.admin_emails.push(email);
                }
            }
        }
    }

    /// セッションの有効期限。TTL が不正（0 以下・範囲外）なら None
    pub fn session_expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.session_ttl_hours <= 0 {
            return None;
        }
        TimeDelta::try_hours(self.session_ttl_hours).and_then(|ttl| now.checked_add_signed(ttl))
    }

    pub fn is_admin(&self, email: Option<&str>) -> bool {
        match email {
            Some(email) => self
                .admin_emails
                .iter()
                .any(|e| e.eq_ignore_ascii_case(email.trim())),
            None => false,
        }
    }
}

fn parse_email_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

/// データディレクトリ（DB・設定ファイル・APIキーファイルの置き場所）
pub fn data_dir() -> PathBuf {
    std::env::var(DATA_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("data"))
}

/// 設定を読み込む。ファイルが存在しない場合はデフォルトを返し、保存する。
pub fn load(config_dir: &Path) -> Result<AppConfig, String> {
    let path = config_dir.join(CONFIG_FILENAME);

    if path.exists() {
        let contents =
            fs::read_to_string(&path).map_err(|e| format!("Failed to read config file: {e}"))?;
        let config: AppConfig =
            serde_json::from_str(&contents).map_err(|e| format!("Invalid config JSON: {e}"))?;
        if config.auth.session_expires_at(Utc::now()).is_none() {
            return Err(format!(
                "Invalid auth.session_ttl_hours: {}",
                config.auth.session_ttl_hours
            ));
        }
        Ok(config)
    } else {
        let config = AppConfig::default();
        save(config_dir, &config)?;
        Ok(config)
    }
}

/// 設定を保存する。
pub fn save(config_dir: &Path, config: &AppConfig) -> Result<(), String> {
    std::fs::create_dir_all(config_dir).map_err(|e| format!("Failed to create config dir: {e}"))?;

    let path = config_dir.join(CONFIG_FILENAME);
    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| format!("Failed to serialize config: {e}"))?;

    fs::write(&path, contents).map_err(|e| format!("Failed to write config file: {e}"))
}
