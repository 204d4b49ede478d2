//! 下書き品項の正規化
//!
//! - originalName が無い・空白のみの品項は捨てる
//! - 同じ originalName は最初の1件だけ残す（順序は維持）
//! - newName が無ければ originalName を使う
//! - description は空白のみなら None

use super::{normalize_description, DraftMenuItem, NormalizedMenuItem};
use std::collections::HashSet;

/// 下書き品項を正規化する
pub fn normalize_items(drafts: &[DraftMenuItem]) -> Vec<NormalizedMenuItem> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(drafts.len());
    let mut items = Vec::with_capacity(drafts.len());

    for draft in drafts {
        let original_name = match draft.original_name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => continue,
        };
        if !seen.insert(original_name) {
            continue;
        }

        let new_name = draft
            .new_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .unwrap_or(original_name);

        items.push(NormalizedMenuItem {
            original_name: original_name.to_string(),
            new_name: new_name.to_string(),
            price: draft.price,
            description: normalize_description(draft.description.as_deref()),
        });
    }

    let dropped = drafts.len() - items.len();
    if dropped > 0 {
        log::info!(
            "Normalized {} draft item(s) into {} (dropped {} without name or duplicated)",
            drafts.len(),
            items.len(),
            dropped
        );
    }

    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(original: Option<&str>, new: Option<&str>, price: Option<f64>) -> DraftMenuItem {
        DraftMenuItem {
            original_name: original.map(str::to_string),
            new_name: new.map(str::to_string),
            price,
            description: None,
        }
    }

    fn to_draft(item: &NormalizedMenuItem) -> DraftMenuItem {
        DraftMenuItem {
            original_name: Some(item.original_name.clone()),
            new_name: Some(item.new_name.clone()),
            price: item.price,
            description: item.description.clone(),
        }
    }

    #[test]
    fn test_first_duplicate_wins() {
        let drafts = vec![
            draft(Some("熟成紅茶"), Some("紅茶"), Some(35.0)),
            draft(Some("麗春紅茶"), None, Some(40.0)),
            draft(Some("熟成紅茶"), Some("別の名前"), Some(99.0)),
        ];

        let items = normalize_items(&drafts);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].original_name, "熟成紅茶");
        assert_eq!(items[0].new_name, "紅茶");
        assert_eq!(items[0].price, Some(35.0));
        assert_eq!(items[1].original_name, "麗春紅茶");
    }

    #[test]
    fn test_missing_or_blank_original_name_is_dropped() {
        let drafts = vec![
            draft(None, Some("紅茶"), Some(35.0)),
            draft(Some("   "), None, None),
            draft(Some("綠茶"), None, None),
        ];

        let items = normalize_items(&drafts);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].original_name, "綠茶");
    }

    #[test]
    fn test_defaults_applied() {
        let mut d = draft(Some(" 冬瓜檸檬 "), Some(""), None);
        d.description = Some("".to_string());

        let items = normalize_items(&[d]);
        assert_eq!(items[0].original_name, "冬瓜檸檬");
        assert_eq!(items[0].new_name, "冬瓜檸檬");
        assert_eq!(items[0].price, None);
        assert_eq!(items[0].description, None);
    }

    #[test]
    fn test_trimmed_names_collide() {
        let drafts = vec![draft(Some("紅茶"), None, None), draft(Some(" 紅茶 "), None, None)];
        assert_eq!(normalize_items(&drafts).len(), 1);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let mut with_desc = draft(Some("白玉歐蕾"), Some("紅茶＋鮮奶＋白玉"), Some(60.0));
        with_desc.description = Some(" Q彈白玉珍珠 ".to_string());
        let drafts = vec![
            with_desc,
            draft(Some("白玉歐蕾"), None, None),
            draft(None, None, None),
            draft(Some("冷露歐蕾"), None, Some(65.0)),
        ];

        let once = normalize_items(&drafts);
        let again_input: Vec<DraftMenuItem> = once.iter().map(to_draft).collect();
        let twice = normalize_items(&again_input);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_empty_input() {
        assert!(normalize_items(&[]).is_empty());
    }
}
