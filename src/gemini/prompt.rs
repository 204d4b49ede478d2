//! 菜單解析用プロンプトの構築
//!
//! 指示文 + 菜單本文（テキスト）または画像（inline data）を1つのリクエストにまとめる。
//! 画像とテキストの両方がある場合は画像を優先する。

use serde::Serialize;

/// 菜單の入力元
#[derive(Debug, Clone, PartialEq)]
pub enum MenuSource {
    Text(String),
    Image {
        mime_type: String,
        /// base64 エンコード済みの画像データ
        data: String,
    },
}

/// Gemini に送るパーツ
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PromptPart {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

/// 1回の生成リクエスト分のパーツ
#[derive(Debug, Clone, PartialEq)]
pub struct MenuPrompt {
    pub parts: Vec<PromptPart>,
}

impl MenuPrompt {
    pub fn has_image(&self) -> bool {
        self.parts
            .iter()
            .any(|p| matches!(p, PromptPart::InlineData { .. }))
    }
}

const INSTRUCTION: &str = "請解析以下飲料店菜單內容，並為每個品項提供成分名稱（說明飲料有哪些成分）、價格和說明。\
請以 JSON 陣列的格式返回，每個物件包含 originalName (原始名稱), newName (成分名稱), price (價格，數字), description (說明)。\
如果沒有價格或說明，請填 null。成分名稱請盡量簡潔易懂。只輸出 JSON 陣列，不要加入其他文字。";

const EXAMPLE_JSON: &str = r#"範例 JSON 格式：
[
  {
    "originalName": "紅茶那堤",
    "newName": "紅茶＋鮮奶",
    "price": 35.0,
    "description": "經典紅茶，茶味濃郁"
  },
  {
    "originalName": "金萱青茶",
    "newName": "青茶",
    "price": 40.0,
    "description": null
  },
  {
    "originalName": "波霸鮮奶茶",
    "newName": "波霸＋紅茶＋鮮奶",
    "price": 40.0,
    "description": "清香紅茶，帶有花果香"
  }
]"#;

/// 店名と入力元からプロンプトを組み立てる
pub fn build_menu_prompt(shop_name: &str, source: &MenuSource) -> MenuPrompt {
    let header = format!("{INSTRUCTION}\n\n店家名稱：{}", shop_name.trim());

    let mut parts = Vec::with_capacity(3);
    match source {
        MenuSource::Image { mime_type, data } => {
            parts.push(PromptPart::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.clone(),
                    data: data.clone(),
                },
            });
            parts.push(PromptPart::Text {
                text: format!("{header}\n\n菜單內容來自圖片。"),
            });
        }
        MenuSource::Text(content) => {
            parts.push(PromptPart::Text {
                text: format!("{header}\n\n菜單內容：\n{content}"),
            });
        }
    }
    parts.push(PromptPart::Text {
        text: format!("\n\n{EXAMPLE_JSON}\n"),
    });

    MenuPrompt { parts }
}
