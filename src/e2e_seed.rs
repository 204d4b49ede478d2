//! サンプルデータ投入
//!
//! DRINK_MENU_SEED=1 または E2E モックモードのとき、店舗が1件も無ければ
//! サンプル店舗「可不可熟成紅茶」と品項6件を投入する。

use sqlx::SqlitePool;

pub const SEED_ENV: &str = "DRINK_MENU_SEED";

pub const SAMPLE_SHOP_NAME: &str = "可不可熟成紅茶";

/// (original_name, price, description)
const SAMPLE_ITEMS: [(&str, f64, &str); 6] = [
    ("熟成紅茶", 35.0, "經典紅茶，茶味濃郁"),
    ("麗春紅茶", 40.0, "清香紅茶，帶有花果香"),
    ("太妃紅茶", 50.0, "獨特太妃糖風味紅茶"),
    ("熟成歐蕾", 55.0, "熟成紅茶與鮮奶的完美結合"),
    ("白玉歐蕾", 60.0, "熟成歐蕾加上Q彈白玉珍珠"),
    ("冷露歐蕾", 65.0, "冬瓜茶與鮮奶的清爽組合"),
];

pub fn is_seed_enabled() -> bool {
    std::env::var(SEED_ENV).as_deref() == Ok("1") || crate::e2e_mocks::is_e2e_mock_mode()
}

/// 有効かつ DB が空のときだけシードする。失敗はログのみ
pub async fn seed_if_enabled_and_empty(pool: &SqlitePool) {
    if !is_seed_enabled() {
        return;
    }
    match seed_sample_shop(pool).await {
        Ok(true) => log::info!("[Seed] Sample shop {SAMPLE_SHOP_NAME} inserted"),
        Ok(false) => log::info!("[Seed] DB already has shops, skipping seed"),
        Err(e) => log::error!("[Seed] Failed to seed sample data: {e}"),
    }
}

/// サンプル店舗を投入する。既に店舗があれば何もしないで false
pub async fn seed_sample_shop(pool: &SqlitePool) -> Result<bool, String> {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM shops")
        .fetch_one(pool)
        .await
        .map_err(|e| format!("Failed to count shops: {e}"))?;
    if count > 0 {
        return Ok(false);
    }

    let mut tx = pool
        .begin()
        .await
        .map_err(|e| format!("Failed to start transaction: {e}"))?;

    let (shop_id,): (i64,) = sqlx::query_as("INSERT INTO shops (name) VALUES (?) RETURNING id")
        .bind(SAMPLE_SHOP_NAME)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| format!("Failed to insert sample shop: {e}"))?;

    for (name, price, description) in SAMPLE_ITEMS {
        sqlx::query(
            r#"
            INSERT INTO menu_items (shop_id, original_name, new_name, price, description)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(shop_id)
        .bind(name)
        .bind(name)
        .bind(price)
        .bind(description)
        .execute(&mut *tx)
        .await
        .map_err(|e| format!("Failed to insert sample item: {e}"))?;
    }

    tx.commit()
        .await
        .map_err(|e| format!("Failed to commit seed: {e}"))?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_test_db;
    use crate::repository::{ShopRepository, SqliteShopRepository};

    #[tokio::test]
    async fn test_seed_sample_shop_once() {
        let pool = setup_test_db().await;
        assert!(seed_sample_shop(&pool).await.unwrap());
        assert!(!seed_sample_shop(&pool).await.unwrap());

        let shops = SqliteShopRepository::new(pool).list_shops().await.unwrap();
        assert_eq!(shops.len(), 1);
        assert_eq!(shops[0].name, SAMPLE_SHOP_NAME);
        assert_eq!(shops[0].item_count, 6);
        assert_eq!(shops[0].contributor_count, 0);
    }
}
