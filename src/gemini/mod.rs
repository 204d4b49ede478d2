//! Gemini API 連携モジュール
//!
//! # セキュリティガイドライン
//! このモジュールはGemini AIを使用して飲料店の菜單を解析します。
//!
//! - **APIキーのログ出力禁止**: APIキーは絶対にログに出力しないこと
//! - **送信内容**: AIに送るのは菜單テキスト・菜單画像・店名のみ。ユーザー情報は送信しない

pub mod client;
pub mod config;
pub mod prompt;
pub mod response;

pub use client::{GeminiClient, GeminiClientTrait};
pub use config::load_api_key;
pub use prompt::{build_menu_prompt, MenuPrompt, MenuSource, PromptPart};
pub use response::extract_menu_items;
