use crate::index::DocId;

/// 段内参与计分的文档集合
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocSet {
    /// `0..max_doc` 的全部文档
    All { max_doc: DocId },
    /// 某个 token 的倒排列表，升序
    Postings(Vec<DocId>),
    /// 预先筛选出的候选文档，升序
    Candidates(Vec<DocId>),
    Empty,
}

impl DocSet {
    pub fn cost(&self) -> usize {
        match self {
            Self::All { max_doc } => *max_doc as usize,
            Self::Postings(docs) | Self::Candidates(docs) => docs.len(),
            Self::Empty => 0,
        }
    }

    pub fn contains(&self, doc: DocId) -> bool {
        match self {
            Self::All { max_doc } => doc < *max_doc,
            Self::Postings(docs) | Self::Candidates(docs) => docs.binary_search(&doc).is_ok(),
            Self::Empty => false,
        }
    }
}

/// 迭代状态，`Exhausted` 之后不再变化
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocState {
    Unstarted,
    Positioned(DocId),
    Exhausted,
}

impl DocState {
    /// 下一次定位允许的最小文档，已耗尽时为 `None`
    pub fn next_target(self, target: DocId) -> Option<DocId> {
        match self {
            Self::Unstarted => Some(target),
            Self::Positioned(doc) => doc.checked_add(1).map(|next| next.max(target)),
            Self::Exhausted => None,
        }
    }

    pub fn doc(self) -> Option<DocId> {
        match self {
            Self::Positioned(doc) => Some(doc),
            _ => None,
        }
    }
}

/// 对 [`DocSet`] 的前向迭代
#[derive(Debug, Clone)]
pub struct DocIdIter {
    set: DocSet,
    state: DocState,
    /// 列表型集合中的下标
    pos: usize,
}

impl DocIdIter {
    pub fn new(set: DocSet) -> Self {
        Self { set, state: DocState::Unstarted, pos: 0 }
    }

    pub fn state(&self) -> DocState {
        self.state
    }

    pub fn doc(&self) -> Option<DocId> {
        self.state.doc()
    }

    pub fn next_doc(&mut self) -> Option<DocId> {
        self.advance(0)
    }

    /// 移动到第一个不小于 `target` 且位于当前文档之后的文档
    pub fn advance(&mut self, target: DocId) -> Option<DocId> {
        let found = self.state.next_target(target).and_then(|min| self.seek(min));
        self.state = match found {
            Some(doc) => DocState::Positioned(doc),
            None => DocState::Exhausted,
        };
        found
    }

    pub fn cost(&self) -> usize {
        self.set.cost()
    }

    fn seek(&mut self, min: DocId) -> Option<DocId> {
        match &self.set {
            DocSet::All { max_doc } => (min < *max_doc).then_some(min),
            DocSet::Postings(docs) | DocSet::Candidates(docs) => {
                self.pos += docs[self.pos..].partition_point(|&doc| doc < min);
                docs.get(self.pos).copied()
            }
            DocSet::Empty => None,
        }
    }
}
