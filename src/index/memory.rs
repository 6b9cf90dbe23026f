use std::borrow::Cow;
use std::collections::HashMap;

use anyhow::Result;

use super::{DocId, IndexableField, SegmentId, SegmentReader};

#[derive(Debug, Default)]
struct SegmentData {
    max_doc: DocId,
    /// 字段 -> 文档 -> 特征数据
    features: HashMap<String, HashMap<DocId, Vec<u8>>>,
    /// 字段 -> token -> 倒排列表
    postings: HashMap<String, HashMap<i32, Vec<DocId>>>,
    /// 字段 -> 文档 -> 存储值
    stored: HashMap<String, HashMap<DocId, String>>,
}

/// 内存段的写入器，写入完成后通过 [`SegmentWriter::finish`] 冻结为只读段
#[derive(Debug, Default)]
pub struct SegmentWriter {
    data: SegmentData,
}

impl SegmentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个文档，返回其段内编号
    pub fn add_document(&mut self, fields: &[IndexableField]) -> DocId {
        let doc = self.data.max_doc;
        for field in fields {
            match field {
                IndexableField::Feature { name, payload } => {
                    self.data.features.entry(name.clone()).or_default().insert(doc, payload.clone());
                }
                IndexableField::Tokens { name, tokens } => {
                    let terms = self.data.postings.entry(name.clone()).or_default();
                    for token in tokens {
                        let list = terms.entry(*token).or_default();
                        // 文档按顺序写入，只需检查末尾即可去重
                        if list.last() != Some(&doc) {
                            list.push(doc);
                        }
                    }
                }
                IndexableField::Stored { name, value } => {
                    self.data.stored.entry(name.clone()).or_default().insert(doc, value.clone());
                }
            }
        }
        self.data.max_doc += 1;
        doc
    }

    /// 已写入的文档数量
    pub fn len(&self) -> usize {
        self.data.max_doc as usize
    }

    pub fn is_empty(&self) -> bool {
        self.data.max_doc == 0
    }

    pub fn finish(self) -> MemorySegment {
        MemorySegment { id: SegmentId::next(), data: self.data }
    }
}

/// 只读的内存段
#[derive(Debug)]
pub struct MemorySegment {
    id: SegmentId,
    data: SegmentData,
}

impl SegmentReader for MemorySegment {
    fn segment_id(&self) -> SegmentId {
        self.id
    }

    fn max_doc(&self) -> DocId {
        self.data.max_doc
    }

    fn feature(&self, field: &str, doc: DocId) -> Result<Option<Cow<'_, [u8]>>> {
        Ok(self
            .data
            .features
            .get(field)
            .and_then(|docs| docs.get(&doc))
            .map(|bytes| Cow::Borrowed(bytes.as_slice())))
    }

    fn postings(&self, field: &str, token: i32) -> Result<Cow<'_, [DocId]>> {
        Ok(self
            .data
            .postings
            .get(field)
            .and_then(|terms| terms.get(&token))
            .map(|list| Cow::Borrowed(list.as_slice()))
            .unwrap_or(Cow::Borrowed(&[])))
    }

    fn stored(&self, field: &str, doc: DocId) -> Result<Option<String>> {
        Ok(self.data.stored.get(field).and_then(|docs| docs.get(&doc)).cloned())
    }
}
