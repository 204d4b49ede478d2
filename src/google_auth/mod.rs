//! Google ログイン
//!
//! # セキュリティガイドライン
//! - **トークンのログ出力禁止**: ID トークン・セッショントークンは絶対にログに出力しないこと
//! - **メトリクスのみ**: ログに出力できるのは成否とステータスコードのみ

pub mod client;
pub mod config;

use serde::{Deserialize, Serialize};

pub use client::{GoogleTokenVerifier, GoogleTokenVerifierTrait};
pub use config::load_client_id;

/// 検証済みの Google アカウント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GoogleIdentity {
    /// Google のアカウント ID（users.id に使う）
    pub sub: String,
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}
