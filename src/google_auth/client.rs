//! Google ID トークン検証クライアント（tokeninfo エンドポイント）
//!
//! # セキュリティガイドライン
//! - ID トークンはログに出力しない（URL にも含まれるため URL もログに出さない）
//! - aud がこのアプリのクライアント ID と一致し、email_verified が true のときのみ受け付ける

use crate::error::AppError;
use crate::google_auth::GoogleIdentity;
use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{Method, Request};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::time::Duration;

/// リクエストタイムアウト（秒）
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// 受け付ける発行者
const ALLOWED_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];

/// tokeninfo レスポンスの構造
#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    iss: Option<String>,
    sub: Option<String>,
    email: Option<String>,
    #[serde(default, deserialize_with = "deserialize_flag")]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

/// email_verified は "true" の文字列で返ることがある
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    })
}

/// ID トークン検証トレイト（テスト用モック対応）
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GoogleTokenVerifierTrait: Send + Sync {
    /// 検証に成功したらアカウント情報を返す。無効なトークンは Unauthorized
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AppError>;
}

/// tokeninfo を使う実装
pub struct GoogleTokenVerifier {
    client_id: String,
    tokeninfo_url: String,
    http_client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
}

impl GoogleTokenVerifier {
    pub fn new(client_id: String, tokeninfo_url: String) -> Result<Self, String> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(|e| format!("Failed to create HTTPS connector: {e}"))?
            .https_or_http()
            .enable_http1()
            .build();

        let http_client = Client::builder(TokioExecutor::new()).build(https);

        log::info!("GoogleTokenVerifier created");

        Ok(Self {
            client_id,
            tokeninfo_url,
            http_client,
        })
    }

    fn build_url(&self, id_token: &str) -> Result<String, AppError> {
        url::Url::parse_with_params(&self.tokeninfo_url, &[("id_token", id_token)])
            .map(String::from)
            .map_err(|e| {
                log::error!("Invalid tokeninfo URL in config: {e}");
                AppError::AuthProvider("invalid tokeninfo url".to_string())
            })
    }

    /// tokeninfo の内容を検証してアカウント情報に変換する
    fn check_token_info(&self, info: TokenInfo) -> Result<GoogleIdentity, AppError> {
        if info.aud.as_deref() != Some(self.client_id.as_str()) {
            log::warn!("Rejected ID token issued for another client");
            return Err(AppError::Unauthorized);
        }
        if let Some(iss) = info.iss.as_deref() {
            if !ALLOWED_ISSUERS.contains(&iss) {
                log::warn!("Rejected ID token from unexpected issuer");
                return Err(AppError::Unauthorized);
            }
        }
        let (Some(sub), Some(email)) = (info.sub, info.email) else {
            log::warn!("Rejected ID token without sub or email");
            return Err(AppError::Unauthorized);
        };
        if !info.email_verified {
            log::warn!("Rejected ID token with unverified email");
            return Err(AppError::Unauthorized);
        }

        Ok(GoogleIdentity {
            sub,
            email,
            name: info.name.filter(|n| !n.trim().is_empty()),
            picture: info.picture.filter(|p| !p.trim().is_empty()),
        })
    }
}

#[async_trait]
impl GoogleTokenVerifierTrait for GoogleTokenVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleIdentity, AppError> {
        if id_token.trim().is_empty() {
            return Err(AppError::MissingInput("缺少 idToken".to_string()));
        }

        let url = self.build_url(id_token.trim())?;
        let req = Request::builder()
            .method(Method::GET)
            .uri(&url)
            .header("Accept", "application/json")
            .body(Full::new(Bytes::new()))
            .map_err(|e| {
                log::error!("Failed to build tokeninfo request: {e}");
                AppError::AuthProvider("failed to build request".to_string())
            })?;

        let request_result =
            tokio::time::timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS), async {
                let response = self
                    .http_client
                    .request(req)
                    .await
                    .map_err(|e| format!("Failed to send request to tokeninfo: {e}"))?;
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
                log::error!("Failed to complete tokeninfo request: {e}");
                return Err(AppError::AuthProvider(e));
            }
            Err(_) => {
                log::error!(
                    "tokeninfo request timed out after {} seconds",
                    REQUEST_TIMEOUT_SECS
                );
                return Err(AppError::AuthProvider("timeout".to_string()));
            }
        };

        // 無効・期限切れのトークンは 4xx で返る
        if status.is_client_error() {
            log::warn!("tokeninfo rejected the ID token (status {status})");
            return Err(AppError::Unauthorized);
        }
        if !status.is_success() {
            log::error!("tokeninfo error (status {status})");
            return Err(AppError::AuthProvider(format!("status {status}")));
        }

        let info: TokenInfo = serde_json::from_slice(&body_bytes).map_err(|e| {
            log::error!("Failed to parse tokeninfo response: {e}");
            AppError::AuthProvider("unparseable tokeninfo response".to_string())
        })?;

        self.check_token_info(info)
    }
}
