use std::cmp::Ordering;

use anyhow::Result;
use log::debug;
use serde::Serialize;

use crate::index::{GlobalDocId, IndexReader};
use crate::query::{Explanation, ImageQuery, PreparedQuery};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreDoc {
    pub score: f32,
    pub doc: GlobalDocId,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopDocs {
    /// 参与计分的文档总数
    pub total_hits: usize,
    /// 按得分降序、编号升序排列
    pub hits: Vec<ScoreDoc>,
}

/// 在一组段上执行查询
pub struct Searcher<'r, 'a> {
    reader: &'r IndexReader<'a>,
}

impl<'r, 'a> Searcher<'r, 'a> {
    pub fn new(reader: &'r IndexReader<'a>) -> Self {
        Self { reader }
    }

    pub fn reader(&self) -> &IndexReader<'a> {
        self.reader
    }

    pub fn search(&self, query: &ImageQuery, top_k: usize) -> Result<TopDocs> {
        let prepared = query.prepare(self.reader)?;
        let mut hits = vec![];
        for leaf in self.reader.leaves() {
            let mut scorer = prepared.scorer(leaf)?;
            debug!("段 {} 预计访问 {} 个文档", leaf.ord, scorer.cost());
            while let Some(doc) = scorer.next_doc() {
                let score = scorer.score()?;
                hits.push(ScoreDoc { score, doc: leaf.doc_base + doc as GlobalDocId });
            }
        }
        let total_hits = hits.len();
        hits.sort_unstable_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => a.doc.cmp(&b.doc),
            ord => ord,
        });
        hits.truncate(top_k);
        debug!("查询 {} 共 {} 个结果", query, total_hits);
        Ok(TopDocs { total_hits, hits })
    }

    pub fn explain(&self, query: &ImageQuery, doc: GlobalDocId) -> Result<Explanation> {
        self.explain_prepared(&query.prepare(self.reader)?, doc)
    }

    /// 使用已准备好的查询解释得分，解释多个文档时只需准备一次
    pub fn explain_prepared(&self, prepared: &PreparedQuery<'_>, doc: GlobalDocId) -> Result<Explanation> {
        let Some((leaf, local)) = self.reader.resolve(doc) else {
            return Ok(Explanation::no_match(format!("文档 {} 不存在", doc)));
        };
        prepared.explain(&leaf, local)
    }
}
