//! E2E テスト用の外部APIモック
//!
//! 環境変数 DRINK_MENU_E2E_MOCK=1 が設定されている場合、Gemini・Google ログインの
//! 実際のAPI呼び出しをモックに置き換え、CIやローカルE2Eで外部依存なしにテスト可能にする。

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::AppError;
use crate::gemini::{GeminiClientTrait, MenuPrompt, PromptPart};
use crate::google_auth::{GoogleIdentity, GoogleTokenVerifierTrait};

pub const E2E_MOCK_ENV: &str = "DRINK_MENU_E2E_MOCK";

/// 「品名 $35」「品名 NT$35」「品名 35」
static MENU_LINE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(.+?)\s*(?:NT)?\$?\s*(\d+(?:\.\d+)?)\s*$").unwrap()
});

const TEXT_MARKER: &str = "菜單內容：\n";

/// E2E用 Gemini API モック（テキストの各行を品項として返す）
pub struct E2EMockGeminiClient;

impl E2EMockGeminiClient {
    fn items_from_text(content: &str) -> Vec<serde_json::Value> {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|line| match MENU_LINE_REGEX.captures(line) {
                Some(caps) => serde_json::json!({
                    "originalName": caps[1].trim(),
                    "newName": caps[1].trim(),
                    "price": caps[2].parse::<f64>().ok(),
                    "description": null
                }),
                None => serde_json::json!({
                    "originalName": line,
                    "newName": line,
                    "price": null,
                    "description": null
                }),
            })
            .collect()
    }
}

#[async_trait]
impl GeminiClientTrait for E2EMockGeminiClient {
    async fn generate_menu(&self, prompt: &MenuPrompt) -> Result<String, AppError> {
        let items = if prompt.has_image() {
            log::info!("[E2E Mock] Gemini generate_menu: image prompt");
            vec![serde_json::json!({
                "originalName": "E2E 圖片品項",
                "newName": "紅茶",
                "price": 30,
                "description": null
            })]
        } else {
            let content = prompt
                .parts
                .iter()
                .find_map(|part| match part {
                    PromptPart::Text { text } => text
                        .split_once(TEXT_MARKER)
                        .map(|(_, content)| content.to_string()),
                    PromptPart::InlineData { .. } => None,
                })
                .unwrap_or_default();
            let items = Self::items_from_text(&content);
            log::info!("[E2E Mock] Gemini generate_menu: {} line item(s)", items.len());
            items
        };

        let json = serde_json::to_string_pretty(&items)
            .map_err(|e| AppError::AiRequest(format!("E2E mock serialization failed: {e}")))?;
        Ok(format!("```json\n{json}\n```"))
    }
}

/// E2E用 Google ログインモック（"admin" で始まるトークンは管理者アカウント）
pub struct E2EMockGoogleVerifier;

#[async_trait]
impl GoogleTokenVerifierTrait for E2EMockGoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AppError> {
        let token = id_token.trim();
        if token.is_empty() {
            return Err(AppError::MissingInput("缺少 idToken".to_string()));
        }
        log::info!("[E2E Mock] Google verify");

        let (sub, email, name) = if token.starts_with("admin") {
            ("e2e-admin", "e2e-admin@example.com", "E2E Admin")
        } else {
            ("e2e-user", "e2e-user@example.com", "E2E User")
        };
        Ok(GoogleIdentity {
            sub: sub.to_string(),
            email: email.to_string(),
            name: Some(name.to_string()),
            picture: None,
        })
    }
}

/// 環境変数 DRINK_MENU_E2E_MOCK が設定されているか
pub fn is_e2e_mock_mode() -> bool {
    std::env::var(E2E_MOCK_ENV).as_deref() == Ok("1")
}

/// Gemini クライアントの E2E 対応ラッパー（実機 or モックを切り替え）
pub enum GeminiClientForE2E {
    Real(crate::gemini::GeminiClient),
    Mock(E2EMockGeminiClient),
}

#[async_trait]
impl GeminiClientTrait for GeminiClientForE2E {
    async fn generate_menu(&self, prompt: &MenuPrompt) -> Result<String, AppError> {
        match self {
            Self::Real(c) => c.generate_menu(prompt).await,
            Self::Mock(m) => m.generate_menu(prompt).await,
        }
    }
}

/// Google ログインの E2E 対応ラッパー
pub enum GoogleVerifierForE2E {
    Real(crate::google_auth::GoogleTokenVerifier),
    Mock(E2EMockGoogleVerifier),
}

#[async_trait]
impl GoogleTokenVerifierTrait for GoogleVerifierForE2E {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AppError> {
        match self {
            Self::Real(c) => c.verify(id_token).await,
            Self::Mock(m) => m.verify(id_token).await,
        }
    }
}
