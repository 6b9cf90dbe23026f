//! 索引时的图片特征提取：解码、缩放、并发提取各种类特征并生成哈希 token
mod extractor;
mod task;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

pub use extractor::*;
use log::{debug, error};
pub use task::*;

use crate::config::ExtractOptions;
use crate::error::{ImageError, ImageResult};
use crate::feature::{DescriptorKind, FeatureVector};
use crate::hash::{HashContext, HashFamily};
use crate::index::{IndexableField, feature_field, hash_field, metadata_field};
use crate::utils::{adjust_image_size, imdecode, normalize_name};

/// 图片字段的映射配置，构建后不可修改
#[derive(Debug, Clone)]
pub struct ImageFieldMapping {
    name: String,
    features: BTreeMap<DescriptorKind, Vec<HashFamily>>,
    metadata: BTreeSet<String>,
}

impl ImageFieldMapping {
    pub fn builder(name: impl Into<String>) -> ImageFieldMappingBuilder {
        ImageFieldMappingBuilder {
            name: name.into(),
            features: BTreeMap::new(),
            metadata: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 特征种类及其需要生成的哈希算法
    pub fn features(&self) -> &BTreeMap<DescriptorKind, Vec<HashFamily>> {
        &self.features
    }

    pub fn metadata(&self) -> &BTreeSet<String> {
        &self.metadata
    }
}

pub struct ImageFieldMappingBuilder {
    name: String,
    features: BTreeMap<DescriptorKind, Vec<HashFamily>>,
    metadata: BTreeSet<String>,
}

impl ImageFieldMappingBuilder {
    /// 添加特征种类，重复添加时合并哈希算法
    pub fn feature(mut self, kind: DescriptorKind, families: impl IntoIterator<Item = HashFamily>) -> Self {
        let entry = self.features.entry(kind).or_default();
        for family in families {
            if !entry.contains(&family) {
                entry.push(family);
            }
        }
        self
    }

    /// 添加需要存储的元数据，如 `image.width`
    pub fn metadata(mut self, name: &str) -> Self {
        self.metadata.insert(normalize_name(name));
        self
    }

    pub fn build(self) -> ImageFieldMapping {
        ImageFieldMapping { name: self.name, features: self.features, metadata: self.metadata }
    }
}

/// 把原始图片数据转换为待写入索引的字段
pub struct ImageEnricher {
    mapping: ImageFieldMapping,
    options: ExtractOptions,
    hashes: Arc<HashContext>,
    extractor: Arc<dyn FeatureExtractor>,
    metadata: Arc<dyn MetadataReader>,
    executor: Arc<dyn TaskExecutor>,
}

impl ImageEnricher {
    pub fn new(mapping: ImageFieldMapping, options: ExtractOptions, hashes: Arc<HashContext>) -> Self {
        Self {
            mapping,
            options,
            hashes,
            extractor: Arc::new(DescriptorExtractor),
            metadata: Arc::new(ImageInfoReader),
            executor: shared_executor(),
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn FeatureExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_metadata_reader(mut self, metadata: Arc<dyn MetadataReader>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn mapping(&self) -> &ImageFieldMapping {
        &self.mapping
    }

    pub fn enrich(&self, bytes: &[u8]) -> ImageResult<Vec<IndexableField>> {
        self.enrich_interruptible(bytes, &Interrupt::new())
    }

    /// 提取图片的全部字段
    ///
    /// 无法解码的图片不产生任何字段。并发阶段失败或未完成的特征会在当前线程重新提取，
    /// 重新提取仍然失败时返回 [`ImageError::IndexFeature`]。
    pub fn enrich_interruptible(
        &self,
        bytes: &[u8],
        interrupt: &Interrupt,
    ) -> ImageResult<Vec<IndexableField>> {
        let image = match imdecode(bytes) {
            Ok(image) => image,
            Err(e) => {
                debug!("跳过无法解码的图片: {}", e);
                return Ok(vec![]);
            }
        };
        let image = Arc::new(adjust_image_size(image, self.options.max_image_dimension));

        let mut concurrent = self.extract_concurrently(&image, interrupt);

        let mut fields = vec![];
        for (&kind, families) in self.mapping.features() {
            let vector = match concurrent.remove(&kind) {
                Some(vector) => vector,
                None => self
                    .extractor
                    .extract(&image, kind)
                    .map_err(|e| ImageError::index_feature(kind, e))?,
            };
            fields.push(IndexableField::Feature {
                name: feature_field(self.mapping.name(), kind),
                payload: vector.to_bytes(),
            });
            for &family in families {
                let tokens = self
                    .hashes
                    .generate_tokens(&vector, family)
                    .map_err(|e| ImageError::index_feature(kind, e))?;
                fields.push(IndexableField::Tokens {
                    name: hash_field(self.mapping.name(), kind, family),
                    tokens,
                });
            }
        }

        if !self.mapping.metadata().is_empty() {
            self.read_metadata(bytes, &mut fields)?;
        }
        Ok(fields)
    }

    fn extract_concurrently(
        &self,
        image: &Arc<image::DynamicImage>,
        interrupt: &Interrupt,
    ) -> BTreeMap<DescriptorKind, FeatureVector> {
        let kinds = self.mapping.features();
        if !self.options.use_thread_pool || kinds.len() <= 1 {
            return BTreeMap::new();
        }
        let mut group = TaskGroup::new(self.executor.clone());
        for &kind in kinds.keys() {
            let image = image.clone();
            let extractor = self.extractor.clone();
            group.spawn(kind.name(), move || extractor.extract(&image, kind));
        }
        group.join(interrupt).into_iter().map(|vector| (vector.kind(), vector)).collect()
    }

    fn read_metadata(&self, bytes: &[u8], fields: &mut Vec<IndexableField>) -> ImageResult<()> {
        match self.metadata.read(bytes) {
            Ok(tags) => {
                for tag in tags {
                    let name = tag.name();
                    if self.mapping.metadata().contains(&name) {
                        fields.push(IndexableField::Stored {
                            name: metadata_field(self.mapping.name(), &name),
                            value: tag.value,
                        });
                    }
                }
                Ok(())
            }
            Err(e) => {
                error!("读取图片元数据失败: {}", e);
                if self.options.ignore_metadata_errors {
                    return Ok(());
                }
                match e {
                    ImageError::Metadata(_) => Err(e),
                    e => Err(ImageError::Metadata(e.to_string())),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mapping_builder_merges_families() {
        let mapping = ImageFieldMapping::builder("img")
            .feature(DescriptorKind::ColorLayout, [HashFamily::Lsh])
            .feature(DescriptorKind::ColorLayout, [HashFamily::Lsh, HashFamily::BitSampling])
            .feature(DescriptorKind::ColorHistogram, [])
            .metadata("Image.Color Type")
            .build();
        assert_eq!(mapping.name(), "img");
        assert_eq!(
            mapping.features()[&DescriptorKind::ColorLayout],
            vec![HashFamily::Lsh, HashFamily::BitSampling]
        );
        assert!(mapping.features()[&DescriptorKind::ColorHistogram].is_empty());
        assert!(mapping.metadata().contains("image.color_type"));
    }
}
