use log::warn;

use super::ImageQuery;
use crate::config::ExtractOptions;
use crate::error::{ImageError, ImageResult};
use crate::feature::{DescriptorKind, FeatureVector};
use crate::hash::{HashContext, HashFamily};
use crate::index::{GlobalDocId, IndexReader, feature_field};
use crate::utils::{adjust_image_size, imdecode};

#[derive(Debug, Clone)]
enum QuerySource {
    Image(Vec<u8>),
    Lookup(GlobalDocId),
}

/// 构建图片查询
///
/// 不指定哈希时对所有文档计分；指定哈希时只对命中 token 的文档计分；
/// 同时指定哈希和数量上限时只对命中最多的前若干个文档计分。
#[derive(Debug, Clone)]
pub struct ImageQueryBuilder {
    field: String,
    kind: DescriptorKind,
    source: Option<QuerySource>,
    family: Option<HashFamily>,
    limit: Option<usize>,
    boost: f32,
}

impl ImageQueryBuilder {
    pub fn new(field: impl Into<String>, kind: DescriptorKind) -> Self {
        Self { field: field.into(), kind, source: None, family: None, limit: None, boost: 1. }
    }

    /// 使用图片数据作为查询
    pub fn image(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.source = Some(QuerySource::Image(bytes.into()));
        self
    }

    /// 使用索引中已有文档的特征作为查询
    pub fn lookup(mut self, doc: GlobalDocId) -> Self {
        self.source = Some(QuerySource::Lookup(doc));
        self
    }

    pub fn hash(mut self, family: HashFamily) -> Self {
        self.family = Some(family);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn build(
        self,
        hashes: &HashContext,
        reader: &IndexReader<'_>,
        options: &ExtractOptions,
    ) -> ImageResult<ImageQuery> {
        if self.boost.is_nan() || self.boost <= 0. {
            return Err(ImageError::InvalidQuery(format!("boost 必须为正数: {}", self.boost)));
        }
        if self.limit == Some(0) {
            return Err(ImageError::InvalidQuery("limit 必须大于 0".to_string()));
        }

        let vector = match &self.source {
            Some(QuerySource::Image(bytes)) => {
                let image = adjust_image_size(imdecode(bytes)?, options.max_image_dimension);
                FeatureVector::extract(self.kind, &image)?
            }
            Some(QuerySource::Lookup(doc)) => self.lookup_vector(reader, *doc)?,
            None => return Err(ImageError::InvalidQuery("需要提供图片或文档编号".to_string())),
        };

        let query = match (self.family, self.limit) {
            (None, limit) => {
                if let Some(limit) = limit {
                    warn!("未指定哈希算法，忽略 limit = {}", limit);
                }
                ImageQuery::full_scan(self.field, vector)
            }
            (Some(family), None) => {
                let tokens = hashes.generate_tokens(&vector, family)?;
                ImageQuery::hash_filtered(self.field, vector, family, tokens)
            }
            (Some(family), Some(limit)) => {
                let tokens = hashes.generate_tokens(&vector, family)?;
                ImageQuery::hash_limited(self.field, vector, family, tokens, limit)
            }
        };
        Ok(query.with_boost(self.boost))
    }

    fn lookup_vector(&self, reader: &IndexReader<'_>, doc: GlobalDocId) -> ImageResult<FeatureVector> {
        let (leaf, local) = reader
            .resolve(doc)
            .ok_or_else(|| ImageError::InvalidQuery(format!("文档 {} 不存在", doc)))?;
        let field = feature_field(&self.field, self.kind);
        let payload = leaf.reader.feature(&field, local).map_err(ImageError::Storage)?.ok_or_else(
            || ImageError::InvalidQuery(format!("文档 {} 没有特征 {}", doc, field)),
        )?;
        FeatureVector::from_bytes_of(self.kind, &payload)
    }
}
