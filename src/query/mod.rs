//! 图片相似度查询
//!
//! 查询分三种：
//! - `FullScan`：对段内所有文档计分
//! - `HashFiltered`：只对命中任一哈希 token 的文档计分，每个文档只计分一次
//! - `HashLimited`：先按命中 token 数量选出候选文档，再只对候选文档计分
mod builder;
mod cache;
mod docset;
mod scorer;

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;
pub use builder::*;
pub use cache::*;
pub use docset::*;
use log::debug;
pub use scorer::*;

use crate::feature::FeatureVector;
use crate::hash::HashFamily;
use crate::index::{DocId, GlobalDocId, IndexReader, LeafContext, feature_field, hash_field};

/// 查询的执行方式
#[derive(Debug, Clone, PartialEq)]
pub enum QueryMode {
    FullScan,
    HashFiltered { family: HashFamily, tokens: Vec<i32> },
    HashLimited { family: HashFamily, tokens: Vec<i32>, limit: usize },
}

/// 图片相似度查询
#[derive(Debug, Clone, PartialEq)]
pub struct ImageQuery {
    field: String,
    vector: FeatureVector,
    boost: f32,
    mode: QueryMode,
}

impl ImageQuery {
    pub fn full_scan(field: impl Into<String>, vector: FeatureVector) -> Self {
        Self { field: field.into(), vector, boost: 1., mode: QueryMode::FullScan }
    }

    pub fn hash_filtered(
        field: impl Into<String>,
        vector: FeatureVector,
        family: HashFamily,
        tokens: Vec<i32>,
    ) -> Self {
        Self { field: field.into(), vector, boost: 1., mode: QueryMode::HashFiltered { family, tokens } }
    }

    pub fn hash_limited(
        field: impl Into<String>,
        vector: FeatureVector,
        family: HashFamily,
        tokens: Vec<i32>,
        limit: usize,
    ) -> Self {
        Self {
            field: field.into(),
            vector,
            boost: 1.,
            mode: QueryMode::HashLimited { family, tokens, limit },
        }
    }

    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn vector(&self) -> &FeatureVector {
        &self.vector
    }

    pub fn boost(&self) -> f32 {
        self.boost
    }

    pub fn mode(&self) -> &QueryMode {
        &self.mode
    }

    /// 为一次执行做准备，创建本次执行专属的缓存，`HashLimited` 会在此时选出候选文档
    pub fn prepare(&self, reader: &IndexReader<'_>) -> Result<PreparedQuery<'_>> {
        let feature = feature_field(&self.field, self.vector.kind());
        let (hash, candidates) = match &self.mode {
            QueryMode::FullScan => (None, None),
            QueryMode::HashFiltered { family, .. } => {
                (Some(hash_field(&self.field, self.vector.kind(), *family)), None)
            }
            QueryMode::HashLimited { family, tokens, limit } => {
                let hash = hash_field(&self.field, self.vector.kind(), *family);
                let candidates = select_candidates(reader, &hash, tokens, *limit)?;
                (Some(hash), Some(candidates))
            }
        };
        Ok(PreparedQuery { query: self, feature, hash, cache: ScoreCache::new(), candidates })
    }
}

impl fmt::Display for ImageQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.field, self.vector.kind())?;
        match &self.mode {
            QueryMode::FullScan => {}
            QueryMode::HashFiltered { family, tokens } => {
                write!(f, ",{}[{}]", family, tokens.len())?;
            }
            QueryMode::HashLimited { family, tokens, limit } => {
                write!(f, ",{}[{}],limit={}", family, tokens.len(), limit)?;
            }
        }
        if self.boost != 1. {
            write!(f, "^{}", self.boost)?;
        }
        Ok(())
    }
}

/// 准备好的查询，在同一次执行的所有段之间共享
pub struct PreparedQuery<'q> {
    query: &'q ImageQuery,
    feature: String,
    hash: Option<String>,
    cache: ScoreCache,
    /// 按段序号分组的候选文档
    candidates: Option<HashMap<usize, Vec<DocId>>>,
}

impl PreparedQuery<'_> {
    pub fn query(&self) -> &ImageQuery {
        self.query
    }

    fn image_scorer<'s>(&'s self, leaf: &LeafContext<'s>, docs: DocSet) -> ImageScorer<'s> {
        ImageScorer::new(leaf.reader, &self.feature, &self.query.vector, self.query.boost, docs)
    }

    /// 创建段内的计分器
    pub fn scorer<'s>(&'s self, leaf: &LeafContext<'s>) -> Result<Box<dyn Scorer + 's>> {
        let scorer: Box<dyn Scorer + 's> = match &self.query.mode {
            QueryMode::FullScan => {
                Box::new(self.image_scorer(leaf, DocSet::All { max_doc: leaf.reader.max_doc() }))
            }
            QueryMode::HashFiltered { tokens, .. } => {
                let field = self.hash.as_deref().unwrap_or_default();
                let mut clauses = Vec::with_capacity(tokens.len());
                for &token in tokens {
                    let postings = leaf.reader.postings(field, token)?.into_owned();
                    let docs = if postings.is_empty() { DocSet::Empty } else { DocSet::Postings(postings) };
                    clauses.push(self.image_scorer(leaf, docs).with_cache(&self.cache));
                }
                Box::new(DisjunctionScorer::new(clauses))
            }
            QueryMode::HashLimited { .. } => {
                let docs = match self.candidates.as_ref().and_then(|c| c.get(&leaf.ord)) {
                    Some(docs) => DocSet::Candidates(docs.clone()),
                    None => DocSet::Empty,
                };
                Box::new(self.image_scorer(leaf, docs))
            }
        };
        Ok(scorer)
    }

    /// 解释文档的得分，不使用也不影响本次执行的缓存
    pub fn explain(&self, leaf: &LeafContext<'_>, doc: DocId) -> Result<Explanation> {
        let scorer = ImageScorer::new(
            leaf.reader,
            &self.feature,
            &self.query.vector,
            self.query.boost,
            DocSet::Empty,
        );
        match &self.query.mode {
            QueryMode::FullScan => {
                if doc >= leaf.reader.max_doc() {
                    return Ok(Explanation::no_match(format!("文档 {} 不存在", doc)));
                }
                scorer.explain(doc)
            }
            QueryMode::HashFiltered { tokens, .. } => {
                let field = self.hash.as_deref().unwrap_or_default();
                let mut matched = 0;
                for &token in tokens {
                    if leaf.reader.postings(field, token)?.binary_search(&doc).is_ok() {
                        matched += 1;
                    }
                }
                if matched == 0 {
                    return Ok(Explanation::no_match("没有命中任何哈希 token"));
                }
                let inner = scorer.explain(doc)?;
                Ok(Explanation::matched(
                    inner.value,
                    format!("命中 {}/{} 个哈希 token，只计分一次", matched, tokens.len()),
                    vec![inner],
                ))
            }
            QueryMode::HashLimited { limit, .. } => {
                let candidate = self
                    .candidates
                    .as_ref()
                    .and_then(|c| c.get(&leaf.ord))
                    .is_some_and(|docs| docs.binary_search(&doc).is_ok());
                if !candidate {
                    return Ok(Explanation::no_match(format!("不在前 {} 个候选文档中", limit)));
                }
                let inner = scorer.explain(doc)?;
                Ok(Explanation::matched(
                    inner.value,
                    format!("前 {} 个候选文档之一", limit),
                    vec![inner],
                ))
            }
        }
    }
}

/// 统计每个文档命中的 token 数量（重复 token 分别计数），按数量降序、全局编号升序取前 `limit` 个
fn select_candidates(
    reader: &IndexReader<'_>,
    field: &str,
    tokens: &[i32],
    limit: usize,
) -> Result<HashMap<usize, Vec<DocId>>> {
    let mut counts: HashMap<GlobalDocId, u32> = HashMap::new();
    for leaf in reader.leaves() {
        for &token in tokens {
            for &doc in leaf.reader.postings(field, token)?.iter() {
                *counts.entry(leaf.doc_base + doc as GlobalDocId).or_default() += 1;
            }
        }
    }
    let matched = counts.len();
    let mut ranked: Vec<_> = counts.into_iter().collect();
    ranked.sort_unstable_by(|(a, ca), (b, cb)| cb.cmp(ca).then(a.cmp(b)));
    ranked.truncate(limit);

    let mut candidates: HashMap<usize, Vec<DocId>> = HashMap::new();
    for (doc, _) in ranked {
        if let Some((leaf, local)) = reader.resolve(doc) {
            candidates.entry(leaf.ord).or_default().push(local);
        }
    }
    for docs in candidates.values_mut() {
        docs.sort_unstable();
    }
    debug!("哈希候选：{} 个文档命中，保留 {} 个", matched, matched.min(limit));
    Ok(candidates)
}
