use image::DynamicImage;
use image::imageops::FilterType;
use indicatif::ProgressStyle;

use crate::error::ImageResult;

/// 从内存解码图片，格式自动识别
pub fn imdecode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    Ok(image::load_from_memory(bytes)?)
}

/// 如果宽或高超过 `max_size`，则等比缩放使长边等于 `max_size`，为 0 时不做限制
pub fn adjust_image_size(image: DynamicImage, max_size: u32) -> DynamicImage {
    if max_size == 0 || (image.width() <= max_size && image.height() <= max_size) {
        return image;
    }
    image.resize(max_size, max_size, FilterType::Triangle)
}

/// 字段名规范化：转为小写并把空白替换为下划线
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect::<String>()
        .to_lowercase()
}

/// 图片内容哈希，用于去重
pub fn content_hash(bytes: &[u8]) -> [u8; 32] {
    *blake3::hash(bytes).as_bytes()
}

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] {spinner:.green} {pos}/{len} {per_sec} {wide_msg}",
    )
    .expect("invalid progress template")
}
