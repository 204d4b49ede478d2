//! 菜單品項のドメインモデルと解析パイプライン
//!
//! 下書き（AI 出力そのまま）→ 正規化（重複除去・既定値）→ 照合（作成/更新/変更なし）
//! の順に処理する。

pub mod image;
pub mod normalize;
pub mod reconcile;
pub mod service;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

pub use normalize::normalize_items;
pub use reconcile::{reconcile, MenuItemUpdate, ReconcilePlan};
pub use service::{MenuProcessLimits, MenuProcessOutcome, MenuProcessRequest, MenuProcessService};

/// AI が返した品項（正規化前）
///
/// スキーマは厳密に検証する。文字列フィールドに数値が来た場合などはデコードエラー。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftMenuItem {
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_price")]
    pub price: Option<f64>,
    #[serde(default)]
    pub description: Option<String>,
}

/// 正規化済みの品項
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedMenuItem {
    pub original_name: String,
    pub new_name: String,
    pub price: Option<f64>,
    pub description: Option<String>,
}

/// DB に保存済みの品項
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StoredMenuItem {
    pub id: i64,
    pub shop_id: i64,
    pub original_name: String,
    pub new_name: String,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub updated_by_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// price は数値・null・数値として読める文字列（"35", "$35", "NT$35"）のみ受け付ける
fn deserialize_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    let value = Option::<Value>::deserialize(deserializer)?;
    let price = match value {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| D::Error::custom("price is not representable as f64"))?,
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            let digits = trimmed
                .strip_prefix("NT$")
                .or_else(|| trimmed.strip_prefix('$'))
                .unwrap_or(trimmed)
                .trim();
            if digits.is_empty() {
                return Ok(None);
            }
            digits
                .parse::<f64>()
                .map_err(|_| D::Error::custom(format!("price is not a number: {s:?}")))?
        }
        Some(other) => {
            return Err(D::Error::custom(format!(
                "price must be a number or null, got {other}"
            )))
        }
    };

    if !price.is_finite() || price < 0.0 {
        return Err(D::Error::custom(format!("price out of range: {price}")));
    }
    Ok(Some(price))
}

/// 説明文の正規化（空白のみは None）
pub(crate) fn normalize_description(description: Option<&str>) -> Option<String> {
    description
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
}
