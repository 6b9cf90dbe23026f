use std::borrow::Cow;
use std::path::Path;

use anyhow::{Context, Result};
use byteorder::BigEndian;
use heed::types::{Bytes, SerdeBincode, Str, U32};
use heed::{Database, Env, EnvOpenOptions, RoTxn, WithTls};
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::{DocId, IndexableField, SegmentId, SegmentReader};

/// 存储在 lmdb 中的段元数据
#[derive(Debug, Default, Serialize, Deserialize)]
struct Meta {
    /// 已写入的文档数量
    max_doc: DocId,
}

/// 持久化在 lmdb 中的单段索引
pub struct LmdbIndex {
    env: Env<WithTls>,
    meta: Meta,
    db_meta: Database<Str, SerdeBincode<Meta>>,
    /// (字段, 文档) -> 特征数据
    db_feature: Database<Bytes, Bytes>,
    /// (字段, token) -> 倒排列表
    db_postings: Database<Bytes, SerdeBincode<Vec<DocId>>>,
    /// (字段, 文档) -> 存储值
    db_stored: Database<Bytes, Str>,
    /// 图片内容哈希 -> 文档，用于去重
    db_content: Database<Bytes, U32<BigEndian>>,
}

impl LmdbIndex {
    /// 打开索引，不存在时创建
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        std::fs::create_dir_all(path)
            .with_context(|| format!("无法创建索引目录 {}", path.display()))?;
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(1 << 36) // 64GiB 的地址空间，实际按需占用
                .max_dbs(5)
                .open(path)?
        };
        let mut txn = env.write_txn()?;
        let db_meta: Database<Str, SerdeBincode<Meta>> = env.create_database(&mut txn, Some("meta"))?;
        let db_feature = env.create_database(&mut txn, Some("feature"))?;
        let db_postings = env.create_database(&mut txn, Some("postings"))?;
        let db_stored = env.create_database(&mut txn, Some("stored"))?;
        let db_content = env.create_database(&mut txn, Some("content"))?;
        let meta = db_meta.get(&txn, "meta")?.unwrap_or_default();
        txn.commit()?;
        info!("打开索引 {}，共 {} 个文档", path.display(), meta.max_doc);
        Ok(Self { env, meta, db_meta, db_feature, db_postings, db_stored, db_content })
    }

    pub fn max_doc(&self) -> DocId {
        self.meta.max_doc
    }

    /// 检查图片内容哈希是否已经添加过
    pub fn contains(&self, content_hash: &[u8]) -> Result<bool> {
        let txn = self.env.read_txn()?;
        Ok(self.db_content.get(&txn, content_hash)?.is_some())
    }

    /// 在一个事务中写入文档，返回其编号
    pub fn add_document(&mut self, content_hash: &[u8], fields: &[IndexableField]) -> Result<DocId> {
        let doc = self.meta.max_doc;
        let mut txn = self.env.write_txn()?;
        for field in fields {
            match field {
                IndexableField::Feature { name, payload } => {
                    self.db_feature.put(&mut txn, &doc_key(name, doc), payload)?;
                }
                IndexableField::Tokens { name, tokens } => {
                    for token in tokens {
                        let key = term_key(name, *token);
                        let mut list = self.db_postings.get(&txn, &key)?.unwrap_or_default();
                        if list.last() != Some(&doc) {
                            list.push(doc);
                            self.db_postings.put(&mut txn, &key, &list)?;
                        }
                    }
                }
                IndexableField::Stored { name, value } => {
                    self.db_stored.put(&mut txn, &doc_key(name, doc), value)?;
                }
            }
        }
        self.db_content.put(&mut txn, content_hash, &doc)?;
        let meta = Meta { max_doc: doc + 1 };
        self.db_meta.put(&mut txn, "meta", &meta)?;
        txn.commit()?;
        self.meta = meta;
        debug!("写入文档 {}，共 {} 个字段", doc, fields.len());
        Ok(doc)
    }

    /// 创建只读视图，视图存续期间持有一个读事务
    pub fn reader(&self) -> Result<LmdbSegmentReader<'_>> {
        let txn = self.env.read_txn()?;
        let max_doc = self.db_meta.get(&txn, "meta")?.unwrap_or_default().max_doc;
        Ok(LmdbSegmentReader {
            id: SegmentId::next(),
            max_doc,
            txn,
            db_feature: self.db_feature,
            db_postings: self.db_postings,
            db_stored: self.db_stored,
        })
    }
}

pub struct LmdbSegmentReader<'a> {
    id: SegmentId,
    max_doc: DocId,
    txn: RoTxn<'a, WithTls>,
    db_feature: Database<Bytes, Bytes>,
    db_postings: Database<Bytes, SerdeBincode<Vec<DocId>>>,
    db_stored: Database<Bytes, Str>,
}

impl SegmentReader for LmdbSegmentReader<'_> {
    fn segment_id(&self) -> SegmentId {
        self.id
    }

    fn max_doc(&self) -> DocId {
        self.max_doc
    }

    fn feature(&self, field: &str, doc: DocId) -> Result<Option<Cow<'_, [u8]>>> {
        Ok(self.db_feature.get(&self.txn, &doc_key(field, doc))?.map(Cow::Borrowed))
    }

    fn postings(&self, field: &str, token: i32) -> Result<Cow<'_, [DocId]>> {
        let list = self.db_postings.get(&self.txn, &term_key(field, token))?;
        Ok(Cow::Owned(list.unwrap_or_default()))
    }

    fn stored(&self, field: &str, doc: DocId) -> Result<Option<String>> {
        Ok(self.db_stored.get(&self.txn, &doc_key(field, doc))?.map(str::to_owned))
    }
}

/// 字段名与编号之间用 0 分隔，编号使用大端序以保持 lmdb 中的顺序
fn doc_key(field: &str, doc: DocId) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + 5);
    key.extend_from_slice(field.as_bytes());
    key.push(0);
    key.extend_from_slice(&doc.to_be_bytes());
    key
}

fn term_key(field: &str, token: i32) -> Vec<u8> {
    let mut key = Vec::with_capacity(field.len() + 5);
    key.extend_from_slice(field.as_bytes());
    key.push(0);
    key.extend_from_slice(&token.to_be_bytes());
    key
}
