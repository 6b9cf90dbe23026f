use thiserror::Error;

use crate::feature::DescriptorKind;
use crate::hash::HashFamily;

pub type ImageResult<T> = Result<T, ImageError>;

/// 图片特征提取与相似度查询过程中的错误
#[derive(Error, Debug)]
pub enum ImageError {
    /// 图片无法解码
    #[error("无法解码图片: {0}")]
    Decode(#[from] image::ImageError),

    /// 单个特征提取失败
    #[error("提取特征 {kind} 失败: {reason}")]
    Extraction { kind: DescriptorKind, reason: String },

    /// 同步重试后依然失败，整个文档的索引失败
    #[error("索引特征 {kind} 失败")]
    IndexFeature {
        kind: DescriptorKind,
        #[source]
        source: Box<ImageError>,
    },

    /// 元数据提取失败
    #[error("提取图片元数据失败: {0}")]
    Metadata(String),

    /// 哈希参数表未能加载
    #[error("哈希参数表 {0} 不可用")]
    HashParameterUnavailable(HashFamily),

    /// 存储的特征数据无法解析
    #[error("特征数据损坏: {0}")]
    CorruptFeature(String),

    /// 查询参数不合法
    #[error("无效的查询: {0}")]
    InvalidQuery(String),

    /// 读取索引失败
    #[error("读取索引失败: {0:#}")]
    Storage(anyhow::Error),
}

impl ImageError {
    pub fn index_feature(kind: DescriptorKind, source: ImageError) -> Self {
        Self::IndexFeature { kind, source: Box::new(source) }
    }
}
