//! Gemini API クライアント
//!
//! # セキュリティガイドライン
//! - APIキーはログに出力しない
//! - ログに出すのはステータス・長さ・処理時間などのメタ情報のみ
//!
//! # タイムアウト
//! リクエスト送信〜レスポンスボディ取得までを `request_timeout_secs` で打ち切る。
//! 失敗時の自動リトライはしない。

use crate::config::GeminiSettings;
use crate::error::AppError;
use crate::gemini::prompt::MenuPrompt;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::Deserialize;
use std::time::{Duration, Instant};

/// Gemini API レスポンスの構造
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    candidates: Option<Vec<Candidate>>,
    prompt_feedback: Option<PromptFeedback>,
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    parts: Option<Vec<Part>>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}

/// Gemini クライアントトレイト（テスト用モック対応）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GeminiClientTrait: Send + Sync {
    /// 菜單プロンプトを送り、モデルの応答テキストをそのまま返す
    async fn generate_menu(&self, prompt: &MenuPrompt) -> Result<String, AppError>;
}

/// Gemini API クライアント実装
/// リクエストボディに Full<Bytes> を使用（hyper-util Client の型パラメータと一致）
pub struct GeminiClient {
    api_key: String,
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    model: String,
    base_url: String,
    timeout: Duration,
    temperature: f32,
    max_output_tokens: u32,
}

impl GeminiClient {
    /// 新しいGeminiクライアントを作成
    ///
    /// # セキュリティ
    /// APIキーはログに出力されません
    pub fn new(api_key: String, settings: &GeminiSettings) -> Result<Self, String> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| format!("Failed to create HTTPS connector: {e}"))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        log::info!("GeminiClient created with model: {}", settings.model);

        Ok(Self {
            api_key,
            http_client,
            model: settings.model.clone(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(settings.request_timeout_secs),
            temperature: settings.temperature,
            max_output_tokens: settings.max_output_tokens,
        })
    }

    /// Gemini API エンドポイントURL
    fn get_endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }

    /// APIリクエストボディを構築
    fn build_request_body(&self, prompt: &MenuPrompt) -> String {
        serde_json::json!({
            "contents": [{
                "role": "user",
                "parts": prompt.parts
            }],
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_output_tokens
            }
        })
        .to_string()
    }

    /// レスポンスボディから応答テキストを取り出す
    fn parse_response_body(body: &str) -> Result<String, AppError> {
        let response: GeminiResponse = serde_json::from_str(body).map_err(|e| {
            log::error!("Failed to parse Gemini response envelope: {e}");
            AppError::AiRequest("Gemini 回應無法解析".to_string())
        })?;

        if let Some(error) = response.error {
            log::error!(
                "Gemini API returned error object (message length: {} chars)",
                error.message.len()
            );
            return Err(AppError::AiRequest("Gemini 回傳錯誤".to_string()));
        }

        if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
            log::warn!("Gemini blocked the prompt: {reason}");
            return Err(AppError::AiRequest(format!("請求被 Gemini 拒絕（{reason}）")));
        }

        let candidate = response
            .candidates
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| {
                log::error!("No candidates in Gemini response");
                AppError::AiRequest("Gemini 沒有回傳內容".to_string())
            })?;

        if let Some(reason) = candidate.finish_reason.as_deref() {
            if reason != "STOP" {
                log::warn!("Gemini finished with reason: {reason}");
            }
        }

        let text: String = candidate
            .content
            .and_then(|c| c.parts)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|p| p.text)
            .collect();

        if text.trim().is_empty() {
            log::error!("No text content in Gemini response");
            return Err(AppError::AiRequest("Gemini 沒有回傳內容".to_string()));
        }

        Ok(text)
    }
}

#[async_trait]
impl GeminiClientTrait for GeminiClient {
    async fn generate_menu(&self, prompt: &MenuPrompt) -> Result<String, AppError> {
        let request_body = self.build_request_body(prompt);
        let endpoint = self.get_endpoint();

        // リクエストのメトリクスのみログに出力（内容は含めない）
        log::info!(
            "Calling Gemini API ({}), image: {}, request body length: {} bytes",
            self.model,
            prompt.has_image(),
            request_body.len()
        );

        let body = Full::new(Bytes::from(request_body));
        let req = Request::builder()
            .method(Method::POST)
            .uri(&endpoint)
            .header("Content-Type", "application/json")
            .header("X-goog-api-key", &self.api_key)
            .body(body)
            .map_err(|e| {
                log::error!("Failed to build request: {e}");
                AppError::AiRequest("無法建立 Gemini 請求".to_string())
            })?;

        let started = Instant::now();
        let request_result = tokio::time::timeout(self.timeout, async {
            let response = self
                .http_client
                .request(req)
                .await
                .map_err(|e| format!("Failed to send request to Gemini API: {e}"))?;
            let status = response.status();
            let body_bytes = response
                .into_body()
                .collect()
                .await
                .map_err(|e| format!("Failed to read response body: {e}"))?
                .to_bytes();
            Ok::<_, String>((status, body_bytes))
        })
        .await;

        let (status, body_bytes) = match request_result {
            Ok(Ok((s, b))) => (s, b),
            Ok(Err(e)) => {
                log::error!("Failed to complete Gemini API request: {e}");
                return Err(AppError::AiRequest("無法連線至 Gemini".to_string()));
            }
            Err(_) => {
                log::error!(
                    "Gemini API request timed out after {} seconds",
                    self.timeout.as_secs()
                );
                return Err(AppError::AiRequest("Gemini 回應逾時".to_string()));
            }
        };

        log::info!(
            "Gemini API responded with status {} in {} ms ({} bytes)",
            status,
            started.elapsed().as_millis(),
            body_bytes.len()
        );

        let response_text = String::from_utf8_lossy(&body_bytes);

        if !status.is_success() {
            if status.as_u16() == 429 || response_text.contains("RESOURCE_EXHAUSTED") {
                log::warn!("Gemini API quota exceeded");
                return Err(AppError::AiRequest("Gemini 配額已用完，請稍後再試".to_string()));
            }
            log::error!("Gemini API error (status {status})");
            return Err(AppError::AiRequest(format!(
                "Gemini 回傳錯誤狀態 {}",
                status.as_u16()
            )));
        }

        Self::parse_response_body(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::prompt::{build_menu_prompt, MenuSource};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings(base_url: &str) -> GeminiSettings {
        GeminiSettings {
            base_url: base_url.to_string(),
            request_timeout_secs: 5,
            ..GeminiSettings::default()
        }
    }

    fn text_prompt() -> MenuPrompt {
        build_menu_prompt("店", &MenuSource::Text("紅茶 $30".to_string()))
    }

    fn candidate_body(text: &str) -> serde_json::Value {
        serde_json::json!({
            "candidates": [{
                "content": {"parts": [{"text": text}], "role": "model"},
                "finishReason": "STOP"
            }]
        })
    }

    #[test]
    fn test_endpoint_uses_model_and_base_url() {
        let client = GeminiClient::new("k".into(), &settings("http://localhost:9/")).unwrap();
        assert_eq!(
            client.get_endpoint(),
            "http://localhost:9/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn test_request_body_contains_parts() {
        let client = GeminiClient::new("k".into(), &settings("http://localhost:9")).unwrap();
        let body: serde_json::Value =
            serde_json::from_str(&client.build_request_body(&text_prompt())).unwrap();

        let parts = body["contents"][0]["parts"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        assert!(parts[0]["text"].as_str().unwrap().contains("紅茶 $30"));
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 8192);
    }

    #[test]
    fn test_parse_response_body_joins_text_parts() {
        let body = serde_json::json!({
            "candidates": [{"content": {"parts": [{"text": "[{\"a\":"}, {"text": "1}]"}]}}]
        })
        .to_string();
        assert_eq!(GeminiClient::parse_response_body(&body).unwrap(), "[{\"a\":1}]");
    }

    #[test]
    fn test_parse_response_body_errors() {
        for body in [
            r#"{"error": {"message": "bad"}}"#,
            r#"{"candidates": []}"#,
            r#"{"candidates": [{"content": {"parts": []}}]}"#,
            r#"{"promptFeedback": {"blockReason": "SAFETY"}}"#,
            "not json",
        ] {
            match GeminiClient::parse_response_body(body) {
                Err(AppError::AiRequest(_)) => {}
                other => panic!("expected AiRequest for {body}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_generate_menu_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-2.0-flash:generateContent"))
            .and(header("X-goog-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(candidate_body("[]")))
            .expect(1)
            .mount(&server)
            .await;

        let client = GeminiClient::new("secret".into(), &settings(&server.uri())).unwrap();
        let text = client.generate_menu(&text_prompt()).await.unwrap();
        assert_eq!(text, "[]");
    }

    #[tokio::test]
    async fn test_generate_menu_quota_exceeded() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_string(r#"{"error":{"status":"RESOURCE_EXHAUSTED"}}"#),
            )
            .mount(&server)
            .await;

        let client = GeminiClient::new("k".into(), &settings(&server.uri())).unwrap();
        let err = client.generate_menu(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, AppError::AiRequest(ref m) if m.contains("配額")));
    }

    #[tokio::test]
    async fn test_generate_menu_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = GeminiClient::new("k".into(), &settings(&server.uri())).unwrap();
        let err = client.generate_menu(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, AppError::AiRequest(ref m) if m.contains("500")));
    }

    #[tokio::test]
    async fn test_generate_menu_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(candidate_body("[]"))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let mut s = settings(&server.uri());
        s.request_timeout_secs = 1;
        let client = GeminiClient::new("k".into(), &s).unwrap();
        let err = client.generate_menu(&text_prompt()).await.unwrap_err();
        assert!(matches!(err, AppError::AiRequest(ref m) if m.contains("逾時")));
    }
}
