//! ハンドラ間で共有する状態

use crate::config::AppConfig;
use crate::gemini::GeminiClientTrait;
use crate::google_auth::GoogleTokenVerifierTrait;
use crate::menu::{MenuProcessLimits, MenuProcessService};
use crate::repository::{
    SqliteMenuItemRepository, SqliteShopRepository, SqliteUsageRepository, SqliteUserRepository,
};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;

pub type MenuService =
    MenuProcessService<dyn GeminiClientTrait, SqliteShopRepository, SqliteUsageRepository>;

pub struct AppState {
    pub pool: SqlitePool,
    pub config: AppConfig,
    /// GEMINI_API_KEY 未設定なら None（取り込みは AiNotConfigured）
    pub gemini: Option<Arc<dyn GeminiClientTrait>>,
    /// GOOGLE_CLIENT_ID 未設定なら None（ログイン不可）
    pub google_verifier: Option<Arc<dyn GoogleTokenVerifierTrait>>,
    pub limits: MenuProcessLimits,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        config: AppConfig,
        gemini: Option<Arc<dyn GeminiClientTrait>>,
        google_verifier: Option<Arc<dyn GoogleTokenVerifierTrait>>,
    ) -> Result<Arc<Self>, String> {
        let limits = MenuProcessLimits {
            daily_limit: config.rate_limit.daily_limit,
            timezone: config.rate_limit.tz()?,
            max_image_bytes: config.upload.max_image_bytes,
        };

        Ok(Arc::new(Self {
            pool,
            config,
            gemini,
            google_verifier,
            limits,
        }))
    }

    pub fn menu_service(&self) -> MenuService {
        MenuProcessService::new(
            self.gemini.clone(),
            SqliteShopRepository::new(self.pool.clone()),
            SqliteUsageRepository::new(self.pool.clone()),
            self.limits,
        )
    }

    pub fn shop_repository(&self) -> SqliteShopRepository {
        SqliteShopRepository::new(self.pool.clone())
    }

    pub fn menu_item_repository(&self) -> SqliteMenuItemRepository {
        SqliteMenuItemRepository::new(self.pool.clone())
    }

    pub fn user_repository(&self) -> SqliteUserRepository {
        SqliteUserRepository::new(self.pool.clone())
    }
}
