//! 菜單画像（data URL）の検証
//!
//! `data:<mime>;base64,<payload>` 形式のみ受け付ける。
//! サイズ上限と実データの形式を確認してから Gemini に渡す。

use crate::error::AppError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::ImageFormat;

/// 検証済み画像
#[derive(Debug, Clone, PartialEq)]
pub struct MenuImage {
    pub mime_type: String,
    /// 空白を除いた base64 データ
    pub base64_data: String,
    pub byte_len: usize,
}

/// マジックナンバーで判別できないが Gemini が受け付ける形式
const PASSTHROUGH_MIME_TYPES: [&str; 2] = ["image/heic", "image/heif"];

/// data URL をデコード・検証する
pub fn parse_image_data_url(data_url: &str, max_bytes: usize) -> Result<MenuImage, AppError> {
    let invalid = |msg: &str| AppError::InvalidInput(msg.to_string());

    let rest = data_url
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| invalid("圖片格式錯誤：必須是 data URL"))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| invalid("圖片格式錯誤：缺少圖片資料"))?;

    let mut header_parts = header.split(';');
    let declared_mime = header_parts
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if !header_parts.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(invalid("圖片格式錯誤：必須是 base64 編碼"));
    }
    if !declared_mime.starts_with("image/") {
        return Err(invalid("只接受圖片檔案"));
    }

    let cleaned: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(invalid("圖片內容為空"));
    }
    // デコード前に概算サイズで弾く（base64 は 4 文字で 3 バイト）
    if cleaned.len() / 4 * 3 > max_bytes + 3 {
        return Err(too_large(max_bytes));
    }

    let bytes = STANDARD
        .decode(cleaned.as_bytes())
        .map_err(|_| invalid("圖片資料不是有效的 base64"))?;
    if bytes.is_empty() {
        return Err(invalid("圖片內容為空"));
    }
    if bytes.len() > max_bytes {
        return Err(too_large(max_bytes));
    }

    let mime_type = match image::guess_format(&bytes) {
        Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP)) => {
            let detected = format.to_mime_type();
            if detected != declared_mime {
                log::debug!("Image mime type corrected: declared {declared_mime}, detected {detected}");
            }
            detected.to_string()
        }
        Ok(other) => {
            log::warn!("Unsupported image format uploaded: {other:?}");
            return Err(invalid("不支援的圖片格式（請使用 PNG、JPEG 或 WebP）"));
        }
        Err(_) if PASSTHROUGH_MIME_TYPES.contains(&declared_mime.as_str()) => declared_mime,
        Err(_) => return Err(invalid("無法辨識的圖片格式")),
    };

    Ok(MenuImage {
        mime_type,
        base64_data: cleaned,
        byte_len: bytes.len(),
    })
}

fn too_large(max_bytes: usize) -> AppError {
    AppError::InvalidInput(format!("圖片過大（上限 {}）", format_byte_limit(max_bytes)))
}

/// 1 MB 未満は KB、1 KB 未満はバイトで表示する
fn format_byte_limit(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = 1024 * KB;
    if bytes >= MB {
        format!("{} MB", bytes / MB)
    } else if bytes >= KB {
        format!("{} KB", bytes / KB)
    } else {
        format!("{bytes} bytes")
    }
}
