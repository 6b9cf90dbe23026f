use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

use crate::index::{DocId, SegmentId};

/// 一次查询执行内已计分的文档
///
/// 同一文档命中多个哈希 token 时，只有第一个计分的子查询得分，其余返回 0。
/// 键中包含段标识，不同段中相同的段内编号互不影响。
#[derive(Debug, Default)]
pub struct ScoreCache {
    scored: Mutex<HashSet<(SegmentId, DocId)>>,
}

impl ScoreCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录文档，首次记录时返回 true
    pub fn claim(&self, segment: SegmentId, doc: DocId) -> bool {
        self.scored.lock().unwrap_or_else(PoisonError::into_inner).insert((segment, doc))
    }

    pub fn len(&self) -> usize {
        self.scored.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
