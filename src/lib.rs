use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;

pub mod auth;
pub mod config;
pub mod db;
pub mod e2e_mocks;
pub mod e2e_seed;
pub mod error;
pub mod gemini;
pub mod google_auth;
pub mod logic;
pub mod menu;
pub mod repository;
pub mod routes;
pub mod state;

use crate::e2e_mocks::{
    is_e2e_mock_mode, E2EMockGeminiClient, E2EMockGoogleVerifier, GeminiClientForE2E,
    GoogleVerifierForE2E,
};
use crate::gemini::{GeminiClient, GeminiClientTrait};
use crate::google_auth::{GoogleTokenVerifier, GoogleTokenVerifierTrait};
use crate::state::AppState;

pub use crate::routes::build_router;

/// ロガー初期化
///
/// リリースビルドではWarnレベル以上、デバッグビルドではInfoレベル以上。RUST_LOG で上書き可能。
/// タイムスタンプは設定のタイムゾーン（既定 Asia/Taipei）で出力する。
fn init_logger(tz: chrono_tz::Tz) {
    #[cfg(debug_assertions)]
    let default_level = log::LevelFilter::Info;
    #[cfg(not(debug_assertions))]
    let default_level = log::LevelFilter::Warn;

    let mut builder = env_logger::Builder::new();
    builder.filter_level(default_level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }

    builder
        .format(move |buf, record| {
            writeln!(
                buf,
                "[{} {:5} {}] {}",
                chrono::Utc::now()
                    .with_timezone(&tz)
                    .format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

/// Gemini クライアントを用意する。APIキー未設定なら None
fn build_gemini_client(
    data_dir: &Path,
    config: &config::AppConfig,
) -> Result<Option<Arc<dyn GeminiClientTrait>>, String> {
    if is_e2e_mock_mode() {
        log::warn!("[E2E] Gemini API calls are replaced with a mock");
        return Ok(Some(Arc::new(GeminiClientForE2E::Mock(E2EMockGeminiClient))));
    }

    match gemini::load_api_key(data_dir)? {
        Some(api_key) => {
            let client = GeminiClient::new(api_key, &config.gemini)?;
            Ok(Some(Arc::new(GeminiClientForE2E::Real(client))))
        }
        None => {
            log::warn!("GEMINI_API_KEY is not set; menu processing will be rejected");
            Ok(None)
        }
    }
}

/// Google ログイン検証を用意する。クライアントID未設定なら None
fn build_google_verifier(
    config: &config::AppConfig,
) -> Result<Option<Arc<dyn GoogleTokenVerifierTrait>>, String> {
    if is_e2e_mock_mode() {
        log::warn!("[E2E] Google login is replaced with a mock");
        return Ok(Some(Arc::new(GoogleVerifierForE2E::Mock(
            E2EMockGoogleVerifier,
        ))));
    }

    match google_auth::load_client_id() {
        Some(client_id) => {
            let verifier =
                GoogleTokenVerifier::new(client_id, config.auth.tokeninfo_url.clone())?;
            Ok(Some(Arc::new(GoogleVerifierForE2E::Real(verifier))))
        }
        None => {
            log::warn!("GOOGLE_CLIENT_ID is not set; login is disabled");
            Ok(None)
        }
    }
}

/// サーバーを起動し、Ctrl+C / SIGTERM まで待つ
pub async fn run() -> Result<(), String> {
    let data_dir = config::data_dir();
    let mut app_config = config::load(&data_dir)?;
    app_config.auth.merge_admin_emails_from_env();

    init_logger(app_config.rate_limit.tz()?);
    log::info!("Data directory: {}", data_dir.display());

    // hyper-rustls が使う暗号プロバイダ（既に設定済みならそのまま）
    let _ = rustls::crypto::ring::default_provider().install_default();

    let pool = db::init_database(&data_dir).await?;
    e2e_seed::seed_if_enabled_and_empty(&pool).await;

    let gemini = build_gemini_client(&data_dir, &app_config)?;
    let google_verifier = build_google_verifier(&app_config)?;

    let address = format!("{}:{}", app_config.server.host, app_config.server.port);
    let state = AppState::new(pool.clone(), app_config, gemini, google_verifier)?;
    let app = build_router(state);

    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| format!("Failed to bind {address}: {e}"))?;
    log::info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| format!("Server error: {e}"))?;

    pool.close().await;
    log::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
        log::info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                log::info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                log::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
