//! リポジトリパターンによるDB操作の抽象化
//!
//! このモジュールはデータベース操作を抽象化し、テスト時にモック可能にします。

use crate::error::AppError;
use crate::google_auth::GoogleIdentity;
use crate::menu::{normalize_description, reconcile, NormalizedMenuItem, StoredMenuItem};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
#[cfg(test)]
use mockall::automock;
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::sqlite::SqlitePool;

/// SQLite の datetime('now') と比較できる形式
const SQLITE_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const MENU_ITEM_COLUMNS: &str = "id, shop_id, original_name, new_name, price, description, \
                                 updated_by_id, created_at, updated_at";

/// 店舗
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Shop {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
}

/// 店舗一覧の1行（品項数・編集者数つき）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ShopSummary {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub updated_at: String,
    pub item_count: i64,
    pub contributor_count: i64,
}

/// ユーザー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub name: Option<String>,
    pub image: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 品項に付ける最終編集者の公開情報
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatedBy {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemWithUser {
    #[serde(flatten)]
    pub item: StoredMenuItem,
    pub updated_by: Option<UpdatedBy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopWithItems {
    #[serde(flatten)]
    pub shop: Shop,
    pub items: Vec<MenuItemWithUser>,
}

/// menu_items LEFT JOIN users の1行
#[derive(sqlx::FromRow)]
struct MenuItemJoinRow {
    #[sqlx(flatten)]
    item: StoredMenuItem,
    user_name: Option<String>,
    user_image: Option<String>,
}

impl From<MenuItemJoinRow> for MenuItemWithUser {
    fn from(row: MenuItemJoinRow) -> Self {
        let updated_by = row.item.updated_by_id.clone().map(|id| UpdatedBy {
            id,
            name: row.user_name,
            image: row.user_image,
        });
        Self {
            item: row.item,
            updated_by,
        }
    }
}

/// 菜單取り込みの適用結果
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuApplyResult {
    pub shop: Shop,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
}

/// ログインセッション
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: String,
}

/// 品項の手動編集内容（PUT ボディ）
///
/// price / description はキー無し（変更なし）と null（値を消す）を区別する。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuItemChanges {
    #[serde(default)]
    pub original_name: Option<String>,
    #[serde(default)]
    pub new_name: Option<String>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub price: Option<Option<f64>>,
    #[serde(default, deserialize_with = "deserialize_some")]
    pub description: Option<Option<String>>,
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl MenuItemChanges {
    pub fn is_empty(&self) -> bool {
        self.original_name.is_none()
            && self.new_name.is_none()
            && self.price.is_none()
            && self.description.is_none()
    }

    /// 名前をトリムし、空の名前・負の価格を拒否する。空白のみの説明は null 扱い
    pub fn validated(self) -> Result<Self, AppError> {
        if self.is_empty() {
            return Err(AppError::InvalidInput("沒有要更新的欄位".to_string()));
        }

        let trim_name = |name: Option<String>, label: &str| -> Result<Option<String>, AppError> {
            match name {
                None => Ok(None),
                Some(n) if n.trim().is_empty() => {
                    Err(AppError::InvalidInput(format!("{label}不能為空")))
                }
                Some(n) => Ok(Some(n.trim().to_string())),
            }
        };

        if let Some(Some(price)) = self.price {
            if !price.is_finite() || price < 0.0 {
                return Err(AppError::InvalidInput("價格必須是非負數".to_string()));
            }
        }

        Ok(Self {
            original_name: trim_name(self.original_name, "原始品名")?,
            new_name: trim_name(self.new_name, "新品名")?,
            price: self.price,
            description: self
                .description
                .map(|d| normalize_description(d.as_deref())),
        })
    }
}

/// 店舗と菜單の DB 操作を抽象化するトレイト
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ShopRepository: Send + Sync {
    /// 店舗一覧（更新が新しい順）
    async fn list_shops(&self) -> Result<Vec<ShopSummary>, AppError>;

    /// 店舗と品項（作成順、最終編集者つき）
    async fn get_shop_with_items(&self, id: i64) -> Result<Option<ShopWithItems>, AppError>;

    /// 店舗と品項を削除。存在しなければ NotFound
    async fn delete_shop(&self, id: i64) -> Result<(), AppError>;

    /// 店舗を upsert し、品項を照合して作成・更新を1トランザクションで適用する
    ///
    /// 作成・更新した品項の updated_by_id には `user_id` を記録する。
    async fn apply_menu_extraction(
        &self,
        shop_name: &str,
        items: &[NormalizedMenuItem],
        user_id: &str,
    ) -> Result<MenuApplyResult, AppError>;
}

/// 品項の手動編集
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MenuItemRepository: Send + Sync {
    /// 指定フィールドのみ更新。存在しなければ NotFound、original_name 重複は Conflict
    async fn update_menu_item(
        &self,
        id: i64,
        changes: MenuItemChanges,
        user_id: &str,
    ) -> Result<StoredMenuItem, AppError>;
}

/// AI 解析回数のカウンタ
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UsageRepository: Send + Sync {
    /// (user_id, usage_date) のカウンタをアトミックに +1 し、加算後の値を返す
    async fn increment_daily_usage(&self, user_id: &str, usage_date: &str) -> Result<i64, AppError>;
}

/// ユーザーとセッション
#[cfg_attr(test, automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn upsert_user(&self, identity: &GoogleIdentity) -> Result<User, AppError>;

    async fn create_session(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError>;

    /// 有効期限内のセッションに紐づくユーザー
    async fn find_session_user(&self, token: &str) -> Result<Option<User>, AppError>;

    async fn delete_session(&self, token: &str) -> Result<(), AppError>;
}

/// ShopRepositoryのSQLite実装
pub struct SqliteShopRepository {
    pool: SqlitePool,
}

impl SqliteShopRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ShopRepository for SqliteShopRepository {
    async fn list_shops(&self) -> Result<Vec<ShopSummary>, AppError> {
        sqlx::query_as::<_, ShopSummary>(
            r#"
            SELECT s.id, s.name, s.created_at, s.updated_at,
                   COUNT(m.id) AS item_count,
                   COUNT(DISTINCT m.updated_by_id) AS contributor_count
            FROM shops s
            LEFT JOIN menu_items m ON m.shop_id = s.id
            GROUP BY s.id
            ORDER BY s.updated_at DESC, s.id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to list shops", e))
    }

    async fn get_shop_with_items(&self, id: i64) -> Result<Option<ShopWithItems>, AppError> {
        let shop = sqlx::query_as::<_, Shop>(
            "SELECT id, name, created_at, updated_at FROM shops WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to get shop", e))?;

        let Some(shop) = shop else {
            return Ok(None);
        };

        let rows = sqlx::query_as::<_, MenuItemJoinRow>(
            r#"
            SELECT m.id, m.shop_id, m.original_name, m.new_name, m.price, m.description,
                   m.updated_by_id, m.created_at, m.updated_at,
                   u.name AS user_name, u.image AS user_image
            FROM menu_items m
            LEFT JOIN users u ON u.id = m.updated_by_id
            WHERE m.shop_id = ?
            ORDER BY m.created_at ASC, m.id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to get menu items", e))?;

        Ok(Some(ShopWithItems {
            shop,
            items: rows.into_iter().map(MenuItemWithUser::from).collect(),
        }))
    }

    async fn delete_shop(&self, id: i64) -> Result<(), AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to start transaction", e))?;

        let deleted_items = sqlx::query("DELETE FROM menu_items WHERE shop_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to delete menu items", e))?
            .rows_affected();

        let deleted_shops = sqlx::query("DELETE FROM shops WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to delete shop", e))?
            .rows_affected();

        if deleted_shops == 0 {
            // tx は drop 時にロールバックされる
            return Err(AppError::NotFound("找不到該店家".to_string()));
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit transaction", e))?;

        log::info!("Deleted shop {id} with {deleted_items} menu item(s)");
        Ok(())
    }

    async fn apply_menu_extraction(
        &self,
        shop_name: &str,
        items: &[NormalizedMenuItem],
        user_id: &str,
    ) -> Result<MenuApplyResult, AppError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::database("Failed to start transaction", e))?;

        // 1. 店名で upsert（既存なら updated_at のみ更新）
        let shop = sqlx::query_as::<_, Shop>(
            r#"
            INSERT INTO shops (name) VALUES (?)
            ON CONFLICT(name) DO UPDATE SET updated_at = datetime('now')
            RETURNING id, name, created_at, updated_at
            "#,
        )
        .bind(shop_name)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::database("Failed to upsert shop", e))?;

        // 2. 既存品項を読み、照合
        let existing = sqlx::query_as::<_, StoredMenuItem>(&format!(
            "SELECT {MENU_ITEM_COLUMNS} FROM menu_items WHERE shop_id = ?"
        ))
        .bind(shop.id)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| AppError::database("Failed to get existing menu items", e))?;

        let plan = reconcile(items, &existing);

        // 3. 新規品項
        for item in &plan.creates {
            sqlx::query(
                r#"
                INSERT INTO menu_items (shop_id, original_name, new_name, price, description, updated_by_id)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(shop.id)
            .bind(&item.original_name)
            .bind(&item.new_name)
            .bind(item.price)
            .bind(item.description.as_deref())
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to insert menu item", e))?;
        }

        // 4. 変更のあったフィールドのみ更新
        for update in &plan.updates {
            sqlx::query(
                r#"
                UPDATE menu_items
                SET new_name = CASE WHEN ? THEN ? ELSE new_name END,
                    price = CASE WHEN ? THEN ? ELSE price END,
                    description = CASE WHEN ? THEN ? ELSE description END,
                    updated_by_id = ?,
                    updated_at = datetime('now')
                WHERE id = ?
                "#,
            )
            .bind(update.new_name.is_some())
            .bind(update.new_name.as_deref())
            .bind(update.price.is_some())
            .bind(update.price.flatten())
            .bind(update.description.is_some())
            .bind(update.description.as_ref().and_then(|d| d.as_deref()))
            .bind(user_id)
            .bind(update.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::database("Failed to update menu item", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::database("Failed to commit transaction", e))?;

        log::info!(
            "Applied menu for shop {}: {} created, {} updated, {} unchanged",
            shop.id,
            plan.creates.len(),
            plan.updates.len(),
            plan.unchanged
        );

        Ok(MenuApplyResult {
            shop,
            created: plan.creates.len(),
            updated: plan.updates.len(),
            unchanged: plan.unchanged,
        })
    }
}

/// MenuItemRepositoryのSQLite実装
pub struct SqliteMenuItemRepository {
    pool: SqlitePool,
}

impl SqliteMenuItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MenuItemRepository for SqliteMenuItemRepository {
    async fn update_menu_item(
        &self,
        id: i64,
        changes: MenuItemChanges,
        user_id: &str,
    ) -> Result<StoredMenuItem, AppError> {
        let updated = sqlx::query_as::<_, StoredMenuItem>(&format!(
            r#"
            UPDATE menu_items
            SET original_name = COALESCE(?, original_name),
                new_name = COALESCE(?, new_name),
                price = CASE WHEN ? THEN ? ELSE price END,
                description = CASE WHEN ? THEN ? ELSE description END,
                updated_by_id = ?,
                updated_at = datetime('now')
            WHERE id = ?
            RETURNING {MENU_ITEM_COLUMNS}
            "#
        ))
        .bind(changes.original_name.as_deref())
        .bind(changes.new_name.as_deref())
        .bind(changes.price.is_some())
        .bind(changes.price.flatten())
        .bind(changes.description.is_some())
        .bind(changes.description.as_ref().and_then(|d| d.as_deref()))
        .bind(user_id)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to update menu item", e))?;

        updated.ok_or_else(|| AppError::NotFound("找不到該品項".to_string()))
    }
}

/// UsageRepositoryのSQLite実装
pub struct SqliteUsageRepository {
    pool: SqlitePool,
}

impl SqliteUsageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepository for SqliteUsageRepository {
    async fn increment_daily_usage(&self, user_id: &str, usage_date: &str) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO api_usage (user_id, usage_date, request_count) VALUES (?, ?, 1)
            ON CONFLICT(user_id, usage_date) DO UPDATE SET request_count = request_count + 1
            RETURNING request_count
            "#,
        )
        .bind(user_id)
        .bind(usage_date)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to increment api usage", e))?;

        // 前日以前のカウンタの掃除（YYYY-MM-DD は文字列比較で日付順。失敗してもログのみ）
        if let Err(e) = sqlx::query("DELETE FROM api_usage WHERE usage_date < ?")
            .bind(usage_date)
            .execute(&self.pool)
            .await
        {
            log::warn!("Failed to purge old api usage rows: {e}");
        }

        Ok(count)
    }
}

/// UserRepositoryのSQLite実装
pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn upsert_user(&self, identity: &GoogleIdentity) -> Result<User, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, name, image) VALUES (?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                email = excluded.email,
                name = excluded.name,
                image = excluded.image,
                updated_at = datetime('now')
            RETURNING id, email, name, image, created_at, updated_at
            "#,
        )
        .bind(&identity.sub)
        .bind(&identity.email)
        .bind(identity.name.as_deref())
        .bind(identity.picture.as_deref())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to upsert user", e))
    }

    async fn create_session(
        &self,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<Session, AppError> {
        let session = Session {
            token: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            expires_at: expires_at.format(SQLITE_DATETIME_FORMAT).to_string(),
        };

        sqlx::query("INSERT INTO sessions (token, user_id, expires_at) VALUES (?, ?, ?)")
            .bind(&session.token)
            .bind(&session.user_id)
            .bind(&session.expires_at)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to create session", e))?;

        // 期限切れセッションの掃除（失敗してもログのみ）
        if let Err(e) = sqlx::query("DELETE FROM sessions WHERE expires_at <= datetime('now')")
            .execute(&self.pool)
            .await
        {
            log::warn!("Failed to purge expired sessions: {e}");
        }

        Ok(session)
    }

    async fn find_session_user(&self, token: &str) -> Result<Option<User>, AppError> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT u.id, u.email, u.name, u.image, u.created_at, u.updated_at
            FROM sessions s
            JOIN users u ON u.id = s.user_id
            WHERE s.token = ? AND s.expires_at > datetime('now')
            "#,
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::database("Failed to find session", e))
    }

    async fn delete_session(&self, token: &str) -> Result<(), AppError> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::database("Failed to delete session", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_test_db;
    use chrono::Duration;

    fn identity(sub: &str, email: &str) -> GoogleIdentity {
        GoogleIdentity {
            sub: sub.to_string(),
            email: email.to_string(),
            name: Some(format!("{sub} name")),
            picture: None,
        }
    }

    fn item(name: &str, new_name: &str, price: Option<f64>) -> NormalizedMenuItem {
        NormalizedMenuItem {
            original_name: name.to_string(),
            new_name: new_name.to_string(),
            price,
            description: None,
        }
    }

    async fn setup_with_user(user_id: &str) -> SqlitePool {
        let pool = setup_test_db().await;
        SqliteUserRepository::new(pool.clone())
            .upsert_user(&identity(user_id, &format!("{user_id}@example.com")))
            .await
            .unwrap();
        pool
    }

    #[tokio::test]
    async fn test_apply_menu_extraction_creates_shop_and_items() {
        let pool = setup_with_user("u1").await;
        let repo = SqliteShopRepository::new(pool.clone());

        let result = repo
            .apply_menu_extraction(
                "可不可熟成紅茶",
                &[item("熟成紅茶", "紅茶", Some(35.0)), item("麗春紅茶", "紅茶", Some(40.0))],
                "u1",
            )
            .await
            .unwrap();

        assert_eq!(result.shop.name, "可不可熟成紅茶");
        assert_eq!(result.created, 2);
        assert_eq!(result.updated, 0);

        let shop = repo.get_shop_with_items(result.shop.id).await.unwrap().unwrap();
        assert_eq!(shop.items.len(), 2);
        assert_eq!(shop.items[0].item.original_name, "熟成紅茶");
        assert_eq!(shop.items[0].item.updated_by_id.as_deref(), Some("u1"));
        assert_eq!(
            shop.items[0].updated_by.as_ref().and_then(|u| u.name.as_deref()),
            Some("u1 name")
        );
    }

    #[tokio::test]
    async fn test_apply_menu_extraction_rolls_back_on_failure() {
        // users に存在しない編集者 → 品項の INSERT が外部キー違反で失敗する
        let pool = setup_test_db().await;
        let repo = SqliteShopRepository::new(pool.clone());

        let result = repo
            .apply_menu_extraction("新店", &[item("熟成紅茶", "紅茶", Some(35.0))], "ghost")
            .await;
        assert!(matches!(result, Err(AppError::Database(_))), "{result:?}");

        // 店家の upsert も含めて何も残らない
        assert!(repo.list_shops().await.unwrap().is_empty());
        let items: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(items, 0);
    }

    #[tokio::test]
    async fn test_apply_menu_extraction_reconciles_existing_shop() {
        let pool = setup_with_user("u1").await;
        SqliteUserRepository::new(pool.clone())
            .upsert_user(&identity("u2", "u2@example.com"))
            .await
            .unwrap();
        let repo = SqliteShopRepository::new(pool.clone());

        let first = repo
            .apply_menu_extraction(
                "店",
                &[item("熟成紅茶", "紅茶", Some(35.0)), item("麗春紅茶", "紅茶", Some(40.0))],
                "u1",
            )
            .await
            .unwrap();

        let second = repo
            .apply_menu_extraction(
                "店",
                &[
                    item("熟成紅茶", "紅茶", Some(35.0)),
                    item("麗春紅茶", "紅茶", Some(45.0)),
                    item("太妃紅茶", "紅茶＋太妃糖", None),
                ],
                "u2",
            )
            .await
            .unwrap();

        assert_eq!(first.shop.id, second.shop.id);
        assert_eq!((second.created, second.updated, second.unchanged), (1, 1, 1));

        let shop = repo.get_shop_with_items(first.shop.id).await.unwrap().unwrap();
        let by_name = |n: &str| {
            shop.items
                .iter()
                .find(|i| i.item.original_name == n)
                .unwrap()
                .item
                .clone()
        };
        assert_eq!(by_name("熟成紅茶").updated_by_id.as_deref(), Some("u1"));
        assert_eq!(by_name("麗春紅茶").price, Some(45.0));
        assert_eq!(by_name("麗春紅茶").updated_by_id.as_deref(), Some("u2"));
        assert_eq!(by_name("太妃紅茶").price, None);

        let shops = repo.list_shops().await.unwrap();
        assert_eq!(shops.len(), 1);
        assert_eq!(shops[0].item_count, 3);
        assert_eq!(shops[0].contributor_count, 2);
    }

    #[tokio::test]
    async fn test_delete_shop_removes_items() {
        let pool = setup_with_user("u1").await;
        let repo = SqliteShopRepository::new(pool.clone());
        let result = repo
            .apply_menu_extraction("店", &[item("綠茶", "綠茶", Some(30.0))], "u1")
            .await
            .unwrap();

        repo.delete_shop(result.shop.id).await.unwrap();

        assert!(repo.get_shop_with_items(result.shop.id).await.unwrap().is_none());
        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM menu_items")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn test_delete_missing_shop_is_not_found() {
        let repo = SqliteShopRepository::new(setup_test_db().await);
        assert!(matches!(repo.delete_shop(42).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_menu_item_partial_fields() {
        let pool = setup_with_user("u1").await;
        SqliteUserRepository::new(pool.clone())
            .upsert_user(&identity("u2", "u2@example.com"))
            .await
            .unwrap();
        let shops = SqliteShopRepository::new(pool.clone());
        let result = shops
            .apply_menu_extraction("店", &[item("綠茶", "綠茶", Some(30.0))], "u1")
            .await
            .unwrap();
        let item_id = shops
            .get_shop_with_items(result.shop.id)
            .await
            .unwrap()
            .unwrap()
            .items[0]
            .item
            .id;

        let repo = SqliteMenuItemRepository::new(pool);
        let changes = MenuItemChanges {
            new_name: Some("青茶".to_string()),
            price: Some(None),
            ..Default::default()
        };
        let updated = repo.update_menu_item(item_id, changes, "u2").await.unwrap();

        assert_eq!(updated.original_name, "綠茶");
        assert_eq!(updated.new_name, "青茶");
        assert_eq!(updated.price, None);
        assert_eq!(updated.updated_by_id.as_deref(), Some("u2"));
    }

    #[tokio::test]
    async fn test_update_menu_item_conflict_and_not_found() {
        let pool = setup_with_user("u1").await;
        let shops = SqliteShopRepository::new(pool.clone());
        let result = shops
            .apply_menu_extraction(
                "店",
                &[item("綠茶", "綠茶", None), item("紅茶", "紅茶", None)],
                "u1",
            )
            .await
            .unwrap();
        let items = shops
            .get_shop_with_items(result.shop.id)
            .await
            .unwrap()
            .unwrap()
            .items;

        let repo = SqliteMenuItemRepository::new(pool);
        let changes = MenuItemChanges {
            original_name: Some("紅茶".to_string()),
            ..Default::default()
        };
        match repo.update_menu_item(items[0].item.id, changes.clone(), "u1").await {
            Err(AppError::Conflict { field }) => assert!(field.contains("original_name")),
            other => panic!("expected conflict, got {other:?}"),
        }

        assert!(matches!(
            repo.update_menu_item(9999, changes, "u1").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_increment_daily_usage_counts_per_day() {
        let repo = SqliteUsageRepository::new(setup_test_db().await);
        assert_eq!(repo.increment_daily_usage("u1", "2025-06-01").await.unwrap(), 1);
        assert_eq!(repo.increment_daily_usage("u1", "2025-06-01").await.unwrap(), 2);
        assert_eq!(repo.increment_daily_usage("u2", "2025-06-01").await.unwrap(), 1);
        assert_eq!(repo.increment_daily_usage("u1", "2025-06-02").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_increment_daily_usage_purges_previous_days() {
        let pool = setup_test_db().await;
        let repo = SqliteUsageRepository::new(pool.clone());
        repo.increment_daily_usage("u1", "2025-05-31").await.unwrap();
        repo.increment_daily_usage("u2", "2025-06-01").await.unwrap();
        repo.increment_daily_usage("u1", "2025-06-02").await.unwrap();

        let dates: Vec<String> =
            sqlx::query_scalar("SELECT usage_date FROM api_usage ORDER BY usage_date")
                .fetch_all(&pool)
                .await
                .unwrap();
        assert_eq!(dates, vec!["2025-06-02"]);
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let pool = setup_with_user("u1").await;
        let repo = SqliteUserRepository::new(pool);

        let session = repo
            .create_session("u1", Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        let user = repo.find_session_user(&session.token).await.unwrap().unwrap();
        assert_eq!(user.id, "u1");
        assert_eq!(user.email.as_deref(), Some("u1@example.com"));

        repo.delete_session(&session.token).await.unwrap();
        assert!(repo.find_session_user(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expired_session_is_ignored() {
        let pool = setup_with_user("u1").await;
        let repo = SqliteUserRepository::new(pool);
        let session = repo
            .create_session("u1", Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        assert!(repo.find_session_user(&session.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_user_updates_profile() {
        let repo = SqliteUserRepository::new(setup_test_db().await);
        repo.upsert_user(&identity("u1", "old@example.com")).await.unwrap();
        let user = repo.upsert_user(&identity("u1", "new@example.com")).await.unwrap();
        assert_eq!(user.email.as_deref(), Some("new@example.com"));
    }

    #[test]
    fn test_menu_item_changes_null_vs_missing() {
        let changes: MenuItemChanges =
            serde_json::from_str(r#"{"price": null, "newName": "紅茶"}"#).unwrap();
        assert_eq!(changes.price, Some(None));
        assert_eq!(changes.description, None);

        let changes: MenuItemChanges = serde_json::from_str(r#"{"price": 0}"#).unwrap();
        assert_eq!(changes.price, Some(Some(0.0)));
    }

    #[test]
    fn test_menu_item_changes_validated() {
        let changes = MenuItemChanges {
            new_name: Some(" 紅茶 ".to_string()),
            description: Some(Some("  ".to_string())),
            ..Default::default()
        }
        .validated()
        .unwrap();
        assert_eq!(changes.new_name.as_deref(), Some("紅茶"));
        assert_eq!(changes.description, Some(None));

        assert!(MenuItemChanges::default().validated().is_err());
        assert!(MenuItemChanges {
            original_name: Some(" ".to_string()),
            ..Default::default()
        }
        .validated()
        .is_err());
        assert!(MenuItemChanges {
            price: Some(Some(-1.0)),
            ..Default::default()
        }
        .validated()
        .is_err());
    }
}
