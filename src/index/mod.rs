//! 段存储：按 (字段, 文档) 随机读取的特征数据，以及按 (字段, token) 读取的倒排列表
mod lmdb;
mod memory;

use std::borrow::Cow;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
pub use lmdb::*;
pub use memory::*;

use crate::feature::DescriptorKind;
use crate::hash::HashFamily;

/// 段内文档编号，从 0 开始连续分配
pub type DocId = u32;

/// 全局文档编号 = 段的起始编号 + 段内编号
pub type GlobalDocId = u64;

static NEXT_SEGMENT_ID: AtomicU64 = AtomicU64::new(0);

/// 进程内唯一的段标识，用于区分不同段中相同的 DocId
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(u64);

impl SegmentId {
    pub fn next() -> Self {
        Self(NEXT_SEGMENT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// 写入段中的字段
#[derive(Debug, Clone, PartialEq)]
pub enum IndexableField {
    /// 按文档随机读取的二进制数据，每个文档只保留一份
    Feature { name: String, payload: Vec<u8> },
    /// 可检索的 token，同一文档内的重复 token 不做去重
    Tokens { name: String, tokens: Vec<i32> },
    /// 只存储不检索的字符串
    Stored { name: String, value: String },
}

impl IndexableField {
    pub fn name(&self) -> &str {
        match self {
            Self::Feature { name, .. } | Self::Tokens { name, .. } | Self::Stored { name, .. } => {
                name
            }
        }
    }
}

/// 特征字段名：`{field}.{KIND}`
pub fn feature_field(field: &str, kind: DescriptorKind) -> String {
    format!("{}.{}", field, kind)
}

/// 哈希字段名：`{field}.{KIND}.hash.{FAMILY}`
pub fn hash_field(field: &str, kind: DescriptorKind, family: HashFamily) -> String {
    format!("{}.{}.hash.{}", field, kind, family)
}

/// 元数据字段名：`{field}.metadata.{name}`
pub fn metadata_field(field: &str, name: &str) -> String {
    format!("{}.metadata.{}", field, name)
}

/// 只读的段
pub trait SegmentReader {
    /// 段标识
    fn segment_id(&self) -> SegmentId;

    /// 段内文档数量
    fn max_doc(&self) -> DocId;

    /// 读取文档的特征数据
    fn feature(&self, field: &str, doc: DocId) -> Result<Option<Cow<'_, [u8]>>>;

    /// 读取 token 的倒排列表，按 DocId 升序且不重复
    fn postings(&self, field: &str, token: i32) -> Result<Cow<'_, [DocId]>>;

    /// 读取存储字段
    fn stored(&self, field: &str, doc: DocId) -> Result<Option<String>>;
}

/// 参与一次查询的段及其全局起始编号
#[derive(Clone, Copy)]
pub struct LeafContext<'a> {
    pub ord: usize,
    pub doc_base: GlobalDocId,
    pub reader: &'a dyn SegmentReader,
}

/// 一组段的只读视图
pub struct IndexReader<'a> {
    leaves: Vec<LeafContext<'a>>,
    max_doc: GlobalDocId,
}

impl<'a> IndexReader<'a> {
    pub fn new<I>(segments: I) -> Self
    where
        I: IntoIterator<Item = &'a dyn SegmentReader>,
    {
        let mut leaves = vec![];
        let mut doc_base = 0;
        for (ord, reader) in segments.into_iter().enumerate() {
            leaves.push(LeafContext { ord, doc_base, reader });
            doc_base += reader.max_doc() as GlobalDocId;
        }
        Self { leaves, max_doc: doc_base }
    }

    pub fn from_segments<S: SegmentReader + 'a>(segments: &'a [S]) -> Self {
        Self::new(segments.iter().map(|s| s as &dyn SegmentReader))
    }

    pub fn leaves(&self) -> &[LeafContext<'a>] {
        &self.leaves
    }

    pub fn max_doc(&self) -> GlobalDocId {
        self.max_doc
    }

    /// 把全局编号拆分为所在的段与段内编号
    pub fn resolve(&self, doc: GlobalDocId) -> Option<(LeafContext<'a>, DocId)> {
        let idx = self.leaves.partition_point(|leaf| leaf.doc_base <= doc);
        let leaf = *self.leaves.get(idx.checked_sub(1)?)?;
        let local = doc - leaf.doc_base;
        (local < leaf.reader.max_doc() as GlobalDocId).then_some((leaf, local as DocId))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(docs: usize) -> MemorySegment {
        let mut writer = SegmentWriter::new();
        for i in 0..docs {
            writer.add_document(&[IndexableField::Stored {
                name: "name".to_string(),
                value: i.to_string(),
            }]);
        }
        writer.finish()
    }

    #[test]
    fn test_resolve_global_doc() {
        let segments = [segment(3), segment(0), segment(2)];
        let reader = IndexReader::from_segments(&segments);
        assert_eq!(reader.max_doc(), 5);

        let (leaf, doc) = reader.resolve(2).unwrap();
        assert_eq!((leaf.ord, doc), (0, 2));
        let (leaf, doc) = reader.resolve(3).unwrap();
        assert_eq!((leaf.ord, doc), (2, 0));
        assert_eq!(leaf.reader.stored("name", doc).unwrap().as_deref(), Some("0"));
        assert!(reader.resolve(5).is_none());
    }

    #[test]
    fn test_segment_ids_are_unique() {
        let a = segment(1);
        let b = segment(1);
        assert_ne!(a.segment_id(), b.segment_id());
    }

    #[test]
    fn test_field_names() {
        assert_eq!(feature_field("img", DescriptorKind::ColorLayout), "img.COLOR_LAYOUT");
        assert_eq!(
            hash_field("img", DescriptorKind::EdgeHistogram, HashFamily::BitSampling),
            "img.EDGE_HISTOGRAM.hash.BIT_SAMPLING"
        );
        assert_eq!(metadata_field("img", "image.width"), "img.metadata.image.width");
    }
}
