use std::fmt;

use anyhow::Result;
use serde::Serialize;

use super::cache::ScoreCache;
use super::docset::{DocIdIter, DocSet, DocState};
use crate::feature::FeatureVector;
use crate::index::{DocId, SegmentReader};

/// 距离转换为相似度：距离不超过 1 时视为同一张图片，得分 `2 - d`，否则为 `1 / d`
pub fn similarity(distance: f32) -> f32 {
    if distance.is_nan() {
        0.
    } else if distance <= 1. {
        2. - distance
    } else {
        1. / distance
    }
}

/// 段内的计分迭代器
pub trait Scorer {
    fn doc(&self) -> Option<DocId>;

    fn next_doc(&mut self) -> Option<DocId>;

    fn advance(&mut self, target: DocId) -> Option<DocId>;

    /// 需要访问的文档数量估计
    fn cost(&self) -> usize;

    /// 当前文档的得分
    fn score(&mut self) -> Result<f32>;
}

/// 得分的解释
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Explanation {
    pub matched: bool,
    pub value: f32,
    pub description: String,
    pub details: Vec<Explanation>,
}

impl Explanation {
    pub fn matched(value: f32, description: impl Into<String>, details: Vec<Explanation>) -> Self {
        Self { matched: true, value, description: description.into(), details }
    }

    pub fn no_match(description: impl Into<String>) -> Self {
        Self { matched: false, value: 0., description: description.into(), details: vec![] }
    }

    fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(f, "{:indent$}{} = {}", "", self.value, self.description, indent = depth * 2)?;
        for detail in &self.details {
            detail.write(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write(f, 0)
    }
}

/// 计算查询特征与段内文档特征的相似度得分
pub struct ImageScorer<'s> {
    reader: &'s dyn SegmentReader,
    field: &'s str,
    query: &'s FeatureVector,
    boost: f32,
    docs: DocIdIter,
    cache: Option<&'s ScoreCache>,
}

impl<'s> ImageScorer<'s> {
    pub fn new(
        reader: &'s dyn SegmentReader,
        field: &'s str,
        query: &'s FeatureVector,
        boost: f32,
        docs: DocSet,
    ) -> Self {
        Self { reader, field, query, boost, docs: DocIdIter::new(docs), cache: None }
    }

    /// 与其它子查询共享缓存，同一文档只在第一次计分时得分
    pub fn with_cache(mut self, cache: &'s ScoreCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// 返回 (距离, 相似度)，文档没有该特征时为 `None`
    fn similarity_of(&self, doc: DocId) -> Result<Option<(f32, f32)>> {
        let Some(payload) = self.reader.feature(self.field, doc)? else {
            return Ok(None);
        };
        let stored = FeatureVector::from_bytes_of(self.query.kind(), &payload)?;
        let distance = self.query.distance(&stored);
        Ok(Some((distance, similarity(distance))))
    }

    /// 不考虑迭代位置与缓存，直接解释文档的得分
    pub fn explain(&self, doc: DocId) -> Result<Explanation> {
        let (distance, sim) = match self.similarity_of(doc)? {
            Some(found) => found,
            None => return Ok(Explanation::no_match(format!("文档 {} 没有特征 {}", doc, self.field))),
        };
        let score = sim * self.boost;
        let sim_desc = if distance <= 1. {
            format!("相似度 2 - distance，distance = {}", distance)
        } else {
            format!("相似度 1 / distance，distance = {}", distance)
        };
        Ok(Explanation::matched(
            score,
            format!("{} 的图片得分，乘积：", self.field),
            vec![Explanation::matched(sim, sim_desc, vec![]), Explanation::matched(self.boost, "boost", vec![])],
        ))
    }
}

impl Scorer for ImageScorer<'_> {
    fn doc(&self) -> Option<DocId> {
        self.docs.doc()
    }

    fn next_doc(&mut self) -> Option<DocId> {
        self.docs.next_doc()
    }

    fn advance(&mut self, target: DocId) -> Option<DocId> {
        self.docs.advance(target)
    }

    fn cost(&self) -> usize {
        self.docs.cost()
    }

    fn score(&mut self) -> Result<f32> {
        let Some(doc) = self.docs.doc() else {
            return Ok(0.);
        };
        if let Some(cache) = self.cache {
            if !cache.claim(self.reader.segment_id(), doc) {
                return Ok(0.);
            }
        }
        Ok(self.similarity_of(doc)?.map_or(0., |(_, sim)| sim * self.boost))
    }
}

/// 多个子查询的并集，得分为命中子查询的得分之和
pub struct DisjunctionScorer<S> {
    clauses: Vec<S>,
    state: DocState,
}

impl<S: Scorer> DisjunctionScorer<S> {
    pub fn new(clauses: Vec<S>) -> Self {
        Self { clauses, state: DocState::Unstarted }
    }

    fn position(&mut self, target: DocId) -> Option<DocId> {
        let min = self.state.next_target(target)?;
        for clause in &mut self.clauses {
            let behind = match clause.doc() {
                Some(doc) => doc < min,
                None => matches!(self.state, DocState::Unstarted),
            };
            if behind {
                clause.advance(min);
            }
        }
        let doc = self.clauses.iter().filter_map(|clause| clause.doc()).min();
        self.state = match doc {
            Some(doc) => DocState::Positioned(doc),
            None => DocState::Exhausted,
        };
        doc
    }
}

impl<S: Scorer> Scorer for DisjunctionScorer<S> {
    fn doc(&self) -> Option<DocId> {
        self.state.doc()
    }

    fn next_doc(&mut self) -> Option<DocId> {
        self.position(0)
    }

    fn advance(&mut self, target: DocId) -> Option<DocId> {
        self.position(target)
    }

    fn cost(&self) -> usize {
        self.clauses.iter().map(|clause| clause.cost()).sum()
    }

    fn score(&mut self) -> Result<f32> {
        let Some(doc) = self.state.doc() else {
            return Ok(0.);
        };
        let mut score = 0.;
        for clause in &mut self.clauses {
            if clause.doc() == Some(doc) {
                score += clause.score()?;
            }
        }
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::DescriptorKind;
    use crate::index::{IndexableField, MemorySegment, SegmentWriter};

    fn vector(value: f32) -> FeatureVector {
        let mut histogram = vec![0.; 64];
        histogram[0] = value;
        FeatureVector::new(DescriptorKind::LuminanceLayout, histogram).unwrap()
    }

    /// 文档 i 与零向量的 L2 距离为 `distances[i]`，`None` 表示没有特征
    fn segment(distances: &[Option<f32>]) -> MemorySegment {
        let mut writer = SegmentWriter::new();
        for distance in distances {
            let fields = match distance {
                Some(d) => vec![IndexableField::Feature {
                    name: "f".to_string(),
                    payload: vector(*d).to_bytes(),
                }],
                None => vec![],
            };
            writer.add_document(&fields);
        }
        writer.finish()
    }

    fn drain(scorer: &mut impl Scorer) -> Vec<(DocId, f32)> {
        let mut result = vec![];
        while let Some(doc) = scorer.next_doc() {
            result.push((doc, scorer.score().unwrap()));
        }
        result
    }

    #[test]
    fn test_similarity() {
        assert_eq!(similarity(0.), 2.);
        assert_eq!(similarity(0.5), 1.5);
        assert_eq!(similarity(1.), 1.);
        assert_eq!(similarity(2.), 0.5);
        assert_eq!(similarity(f32::INFINITY), 0.);
        assert_eq!(similarity(f32::NAN), 0.);
        // 在 1 处连续
        assert!((similarity(1. - 1e-6) - similarity(1. + 1e-6)).abs() < 1e-5);
        // 随距离单调不增
        let mut last = f32::MAX;
        for i in 0..100 {
            let s = similarity(i as f32 * 0.05);
            assert!(s <= last);
            last = s;
        }
    }

    #[test]
    fn test_score_with_boost() {
        let segment = segment(&[Some(0.5), Some(2.), None]);
        let query = vector(0.);
        let mut scorer = ImageScorer::new(&segment, "f", &query, 5., DocSet::All { max_doc: 3 });
        assert_eq!(drain(&mut scorer), vec![(0, 7.5), (1, 2.5), (2, 0.)]);
    }

    #[test]
    fn test_cache_dedups() {
        let segment = segment(&[Some(0.), Some(0.)]);
        let query = vector(0.);
        let cache = ScoreCache::new();
        let clauses: Vec<_> = (0..3)
            .map(|_| {
                ImageScorer::new(&segment, "f", &query, 1., DocSet::Postings(vec![0, 1]))
                    .with_cache(&cache)
            })
            .collect();
        let mut scorer = DisjunctionScorer::new(clauses);
        assert_eq!(drain(&mut scorer), vec![(0, 2.), (1, 2.)]);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_disjunction_iteration() {
        let segment = segment(&[Some(0.); 6]);
        let query = vector(0.);
        let clauses = vec![
            ImageScorer::new(&segment, "f", &query, 1., DocSet::Postings(vec![1, 4])),
            ImageScorer::new(&segment, "f", &query, 1., DocSet::Postings(vec![2, 4, 5])),
            ImageScorer::new(&segment, "f", &query, 1., DocSet::Empty),
        ];
        let mut scorer = DisjunctionScorer::new(clauses);
        assert_eq!(scorer.cost(), 5);
        assert_eq!(scorer.next_doc(), Some(1));
        assert_eq!(scorer.advance(3), Some(4));
        // 没有缓存时两个子查询都计分
        assert_eq!(scorer.score().unwrap(), 4.);
        assert_eq!(scorer.next_doc(), Some(5));
        assert_eq!(scorer.next_doc(), None);
        assert_eq!(scorer.next_doc(), None);
    }

    #[test]
    fn test_explain() {
        let segment = segment(&[Some(2.), None]);
        let query = vector(0.);
        let scorer = ImageScorer::new(&segment, "f", &query, 5., DocSet::All { max_doc: 2 });
        let explanation = scorer.explain(0).unwrap();
        assert!(explanation.matched);
        assert_eq!(explanation.value, 2.5);
        assert_eq!(explanation.details.len(), 2);
        assert_eq!(explanation.details[0].value, 0.5);
        assert_eq!(explanation.details[1].value, 5.);
        assert!(explanation.to_string().contains("boost"));
        assert!(!scorer.explain(1).unwrap().matched);
    }
}
