use std::io::Cursor;

use image::{DynamicImage, ImageDecoder, ImageReader};

use crate::error::{ImageError, ImageResult};
use crate::feature::{DescriptorKind, FeatureVector};
use crate::utils::normalize_name;

/// 从已解码的图片中提取单个种类的特征
pub trait FeatureExtractor: Send + Sync {
    fn extract(&self, image: &DynamicImage, kind: DescriptorKind) -> ImageResult<FeatureVector>;
}

/// 按种类分派到内置算法的提取器
#[derive(Debug, Default, Clone, Copy)]
pub struct DescriptorExtractor;

impl FeatureExtractor for DescriptorExtractor {
    fn extract(&self, image: &DynamicImage, kind: DescriptorKind) -> ImageResult<FeatureVector> {
        FeatureVector::extract(kind, image)
    }
}

/// 一条图片元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataTag {
    pub directory: String,
    pub tag: String,
    pub value: String,
}

impl MetadataTag {
    pub fn new(directory: impl Into<String>, tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self { directory: directory.into(), tag: tag.into(), value: value.into() }
    }

    /// `{目录}.{标签}`，小写且空白替换为下划线
    pub fn name(&self) -> String {
        normalize_name(&format!("{}.{}", self.directory, self.tag))
    }
}

/// 从原始图片数据中读取元数据
pub trait MetadataReader: Send + Sync {
    fn read(&self, bytes: &[u8]) -> ImageResult<Vec<MetadataTag>>;
}

/// 读取图片容器层面的基本信息：格式、尺寸与颜色类型
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageInfoReader;

impl MetadataReader for ImageInfoReader {
    fn read(&self, bytes: &[u8]) -> ImageResult<Vec<MetadataTag>> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Metadata(e.to_string()))?;
        let format = reader
            .format()
            .ok_or_else(|| ImageError::Metadata("无法识别图片格式".to_string()))?;
        let decoder = reader.into_decoder().map_err(|e| ImageError::Metadata(e.to_string()))?;
        let (width, height) = decoder.dimensions();
        let format = format.extensions_str().first().copied().unwrap_or("unknown");
        Ok(vec![
            MetadataTag::new("image", "format", format),
            MetadataTag::new("image", "width", width.to_string()),
            MetadataTag::new("image", "height", height.to_string()),
            MetadataTag::new("image", "color type", format!("{:?}", decoder.color_type())),
        ])
    }
}
