//! 正規化済み品項と保存済み品項の照合
//!
//! original_name をキーに、作成・更新（変更のあったフィールドのみ）・変更なしに振り分ける。
//! DB には触れない。適用（と操作ユーザーの記録）は repository 側で1トランザクションで行う。

use super::{normalize_description, NormalizedMenuItem, StoredMenuItem};
use std::collections::{HashMap, HashSet};

/// 既存品項への更新内容。None のフィールドは変更なし
#[derive(Debug, Clone, PartialEq)]
pub struct MenuItemUpdate {
    pub id: i64,
    pub original_name: String,
    pub new_name: Option<String>,
    pub price: Option<Option<f64>>,
    pub description: Option<Option<String>>,
}

impl MenuItemUpdate {
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::with_capacity(3);
        if self.new_name.is_some() {
            fields.push("new_name");
        }
        if self.price.is_some() {
            fields.push("price");
        }
        if self.description.is_some() {
            fields.push("description");
        }
        fields
    }
}

/// 照合結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReconcilePlan {
    pub creates: Vec<NormalizedMenuItem>,
    pub updates: Vec<MenuItemUpdate>,
    pub unchanged: usize,
}

impl ReconcilePlan {
    pub fn is_noop(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty()
    }
}

fn prices_equal(a: Option<f64>, b: Option<f64>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => (x - y).abs() < 1e-9,
        _ => false,
    }
}

/// 品項を既存データと照合する
pub fn reconcile(items: &[NormalizedMenuItem], existing: &[StoredMenuItem]) -> ReconcilePlan {
    let by_name: HashMap<&str, &StoredMenuItem> = existing
        .iter()
        .map(|item| (item.original_name.as_str(), item))
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(items.len());
    let mut plan = ReconcilePlan::default();

    for item in items {
        if !seen.insert(item.original_name.as_str()) {
            continue;
        }

        let Some(stored) = by_name.get(item.original_name.as_str()) else {
            plan.creates.push(item.clone());
            continue;
        };

        let stored_description = normalize_description(stored.description.as_deref());

        let update = MenuItemUpdate {
            id: stored.id,
            original_name: stored.original_name.clone(),
            new_name: (stored.new_name != item.new_name).then(|| item.new_name.clone()),
            price: (!prices_equal(stored.price, item.price)).then_some(item.price),
            description: (stored_description != item.description)
                .then(|| item.description.clone()),
        };

        if update.changed_fields().is_empty() {
            plan.unchanged += 1;
        } else {
            plan.updates.push(update);
        }
    }

    log::debug!(
        "Reconciled {} item(s): {} to create, {} to update, {} unchanged",
        items.len(),
        plan.creates.len(),
        plan.updates.len(),
        plan.unchanged
    );

    plan
}
