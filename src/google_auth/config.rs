//! Google OAuth クライアント ID の読み込み

/// クライアント ID を渡す環境変数
pub const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";

/// 環境変数からクライアント ID を読む。未設定・空なら None（ログイン無効）
pub fn load_client_id() -> Option<String> {
    std::env::var(CLIENT_ID_ENV)
        .ok()
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
}
