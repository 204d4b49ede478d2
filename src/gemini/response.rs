//! Gemini の応答テキストから菜單 JSON 配列を取り出す
//!
//! 1. ```json フェンスがあればその中身を、なければ応答全体を JSON として読む
//! 2. 値は空でない配列であること
//! 3. 各要素は DraftMenuItem のスキーマに厳密に一致すること
//!
//! いずれかに失敗した場合は MalformedAiResponse を返す。再試行はしない。

use crate::error::AppError;
use crate::menu::DraftMenuItem;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static JSON_FENCE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```json[ \t]*\r?\n?(.*?)```").unwrap());

/// 応答テキストから下書き品項の配列を取り出す
pub fn extract_menu_items(text: &str) -> Result<Vec<DraftMenuItem>, AppError> {
    extract_inner(text).map_err(|detail| {
        log::error!(
            "Failed to extract menu items from AI response: {detail} (response length: {} chars)",
            text.chars().count()
        );
        log::warn!("Raw AI response text: {text}");
        AppError::MalformedAiResponse(detail)
    })
}

fn extract_inner(text: &str) -> Result<Vec<DraftMenuItem>, String> {
    let candidate = match JSON_FENCE_REGEX.captures(text).and_then(|c| c.get(1)) {
        Some(fenced) => fenced.as_str(),
        None => text,
    }
    .trim();

    if candidate.is_empty() {
        return Err("response is empty".to_string());
    }

    let value: Value =
        serde_json::from_str(candidate).map_err(|e| format!("response is not valid JSON: {e}"))?;

    let len = match &value {
        Value::Array(items) => items.len(),
        other => return Err(format!("expected a JSON array, got {}", kind_of(other))),
    };
    if len == 0 {
        return Err("JSON array is empty".to_string());
    }

    serde_json::from_value::<Vec<DraftMenuItem>>(value)
        .map_err(|e| format!("menu item does not match schema: {e}"))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_ITEMS: &str = r#"[{"originalName":"熟成紅茶","newName":"紅茶","price":35,"description":""},{"originalName":"麗春紅茶","newName":"紅茶","price":40,"description":""}]"#;

    fn assert_malformed(text: &str) {
        match extract_menu_items(text) {
            Err(AppError::MalformedAiResponse(_)) => {}
            other => panic!("expected MalformedAiResponse for {text:?}, got {other:?}"),
        }
    }

    #[test]
    fn test_extract_plain_array_preserves_order() {
        let items = extract_menu_items(TWO_ITEMS).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].original_name.as_deref(), Some("熟成紅茶"));
        assert_eq!(items[0].price, Some(35.0));
        assert_eq!(items[1].original_name.as_deref(), Some("麗春紅茶"));
        assert_eq!(items[1].price, Some(40.0));
    }

    #[test]
    fn test_extract_fenced_block_with_surrounding_prose() {
        let text = format!("以下是解析結果：\n```json\n{TWO_ITEMS}\n```\n希望有幫助！");
        let items = extract_menu_items(&text).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].new_name.as_deref(), Some("紅茶"));
    }

    #[test]
    fn test_extract_fenced_block_uppercase_marker() {
        let text = "```JSON\n[{\"originalName\":\"綠茶\"}]\n```";
        let items = extract_menu_items(text).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].new_name, None);
        assert_eq!(items[0].price, None);
    }

    #[test]
    fn test_extract_whitespace_around_plain_array() {
        let items = extract_menu_items("\n  [{\"originalName\":\"奶茶\",\"price\":null}]  \n").unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].price, None);
    }

    #[test]
    fn test_extract_accepts_numeric_string_price() {
        let items = extract_menu_items(r#"[{"originalName":"奶綠","price":"45"}]"#).unwrap();
        assert_eq!(items[0].price, Some(45.0));
    }

    #[test]
    fn test_extract_empty_string_fails() {
        assert_malformed("");
        assert_malformed("   \n");
    }

    #[test]
    fn test_extract_malformed_json_fails() {
        assert_malformed("[{\"originalName\": \"紅茶\",]");
        assert_malformed("抱歉，我無法讀取這張圖片。");
    }

    #[test]
    fn test_extract_non_array_fails() {
        assert_malformed(r#"{"originalName":"紅茶"}"#);
        assert_malformed("42");
        assert_malformed("null");
    }

    #[test]
    fn test_extract_empty_array_fails() {
        assert_malformed("[]");
        assert_malformed("```json\n[]\n```");
    }

    #[test]
    fn test_extract_schema_mismatch_fails_closed() {
        // 要素がオブジェクトでない
        assert_malformed(r#"["紅茶", "綠茶"]"#);
        // price が数値として読めない
        assert_malformed(r#"[{"originalName":"紅茶","price":"時價"}]"#);
        // originalName が文字列でない
        assert_malformed(r#"[{"originalName":123}]"#);
    }

    #[test]
    fn test_extract_fenced_invalid_does_not_fall_back() {
        // フェンス内が壊れている場合は全体パースに戻らない
        assert_malformed("```json\nnot json\n```");
    }
}
