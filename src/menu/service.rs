//! 菜單取り込みサービス
//!
//! 入力検証 → 回数制限 → Gemini 呼び出し → 抽出 → 正規化 → 照合・保存 を1リクエスト内で順に行う。
//! 外部呼び出しの前に入力を検証し、失敗しても自動リトライはしない。

use super::image::parse_image_data_url;
use super::normalize_items;
use crate::error::AppError;
use crate::gemini::{build_menu_prompt, extract_menu_items, GeminiClientTrait, MenuSource};
use crate::logic::rate_limit::consume_daily_quota;
use crate::repository::{Shop, ShopRepository, UsageRepository};
use chrono::Utc;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// `POST /api/process-menu` のボディ
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuProcessRequest {
    #[serde(default)]
    pub shop_name: Option<String>,
    #[serde(default)]
    pub raw_menu_content: Option<String>,
    /// `data:image/...;base64,...`
    #[serde(default)]
    pub image_data: Option<String>,
}

/// 取り込み結果。店舗のフィールドはトップレベルに展開する
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuProcessOutcome {
    #[serde(flatten)]
    pub shop: Shop,
    pub extracted: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// 制限値
#[derive(Debug, Clone, Copy)]
pub struct MenuProcessLimits {
    pub daily_limit: u32,
    pub timezone: Tz,
    pub max_image_bytes: usize,
}

pub struct MenuProcessService<C, S, U>
where
    C: GeminiClientTrait + ?Sized,
    S: ShopRepository,
    U: UsageRepository,
{
    gemini_client: Option<Arc<C>>,
    shop_repository: S,
    usage_repository: U,
    limits: MenuProcessLimits,
}

impl<C, S, U> MenuProcessService<C, S, U>
where
    C: GeminiClientTrait + ?Sized,
    S: ShopRepository,
    U: UsageRepository,
{
    pub fn new(
        gemini_client: Option<Arc<C>>,
        shop_repository: S,
        usage_repository: U,
        limits: MenuProcessLimits,
    ) -> Self {
        Self {
            gemini_client,
            shop_repository,
            usage_repository,
            limits,
        }
    }

    /// 菜單を解析して店舗に反映する
    pub async fn process_menu(
        &self,
        request: MenuProcessRequest,
        user_id: &str,
    ) -> Result<MenuProcessOutcome, AppError> {
        let shop_name = request
            .shop_name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::MissingInput("店家名稱不能為空".to_string()))?;

        let raw_text = request
            .raw_menu_content
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let image_url = request
            .image_data
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        // 画像があれば画像を優先
        let source = match (image_url, raw_text) {
            (Some(url), _) => {
                let image = parse_image_data_url(url, self.limits.max_image_bytes)?;
                log::info!(
                    "Menu image accepted: {} ({} bytes)",
                    image.mime_type,
                    image.byte_len
                );
                MenuSource::Image {
                    mime_type: image.mime_type,
                    data: image.base64_data,
                }
            }
            (None, Some(text)) => MenuSource::Text(text.to_string()),
            (None, None) => {
                return Err(AppError::MissingInput(
                    "請提供原始菜單內容或上傳圖片".to_string(),
                ))
            }
        };

        let client = self
            .gemini_client
            .as_ref()
            .ok_or(AppError::AiNotConfigured)?;

        consume_daily_quota(
            &self.usage_repository,
            user_id,
            Utc::now(),
            self.limits.daily_limit,
            self.limits.timezone,
        )
        .await?;

        let prompt = build_menu_prompt(shop_name, &source);
        let reply = client.generate_menu(&prompt).await?;

        let drafts = extract_menu_items(&reply)?;
        let items = normalize_items(&drafts);
        if items.is_empty() {
            log::error!(
                "AI reply contained {} item(s) but none had a usable originalName",
                drafts.len()
            );
            return Err(AppError::MalformedAiResponse(
                "no item with originalName".to_string(),
            ));
        }

        let applied = self
            .shop_repository
            .apply_menu_extraction(shop_name, &items, user_id)
            .await?;

        Ok(MenuProcessOutcome {
            shop: applied.shop,
            extracted: items.len(),
            created: applied.created,
            updated: applied.updated,
            unchanged: applied.unchanged,
        })
    }
}
