use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Parser, ValueEnum};
use log::info;
use serde::Serialize;
use tokio::task::block_in_place;

use crate::cli::{PATH_FIELD, SubCommandExtend};
use crate::config::{ExtractOptions, Opts};
use crate::feature::DescriptorKind;
use crate::hash::{HashContext, HashFamily};
use crate::index::{GlobalDocId, IndexReader, LmdbIndex};
use crate::query::{Explanation, ImageQueryBuilder};
use crate::search::Searcher;

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 被搜索的图片路径
    #[arg(required_unless_present = "doc", conflicts_with = "doc")]
    pub image: Option<PathBuf>,
    /// 使用索引中已有的文档作为查询
    #[arg(long, value_name = "ID")]
    pub doc: Option<GlobalDocId>,
    /// 图片字段名
    #[arg(long, default_value = "image")]
    pub field: String,
    /// 用于比较的特征
    #[arg(short, long, value_name = "KIND")]
    pub feature: DescriptorKind,
    /// 只比较命中该哈希算法 token 的图片
    #[arg(long, value_name = "FAMILY")]
    pub hash: Option<HashFamily>,
    /// 只比较命中 token 最多的前 N 张图片，需要同时指定 --hash
    #[arg(long, value_name = "N", requires = "hash")]
    pub limit: Option<usize>,
    /// 得分倍数
    #[arg(long, default_value_t = 1.)]
    pub boost: f32,
    /// 显示的结果数量
    #[arg(long, value_name = "COUNT", default_value_t = 10)]
    pub count: usize,
    /// 显示得分的计算过程
    #[arg(long)]
    pub explain: bool,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", value_enum, default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

#[derive(Debug, Serialize)]
struct SearchHit {
    score: f32,
    doc: GlobalDocId,
    path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    explanation: Option<Explanation>,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let hashes = HashContext::load_only(
            opts.conf_dir.bit_sampling_table(),
            opts.conf_dir.lsh_table(),
            self.hash,
        );
        let index = LmdbIndex::open(opts.conf_dir.index())?;

        let result = block_in_place(|| -> Result<Vec<SearchHit>> {
            let segments = [index.reader()?];
            let reader = IndexReader::from_segments(&segments);

            let mut builder = ImageQueryBuilder::new(&self.field, self.feature).boost(self.boost);
            builder = match (&self.image, self.doc) {
                (Some(path), _) => builder.image(std::fs::read(path)?),
                (None, Some(doc)) => builder.lookup(doc),
                (None, None) => bail!("需要提供图片或文档编号"),
            };
            if let Some(family) = self.hash {
                builder = builder.hash(family);
            }
            if let Some(limit) = self.limit {
                builder = builder.limit(limit);
            }
            let query = builder.build(&hashes, &reader, &self.extract)?;

            let searcher = Searcher::new(&reader);
            let top = searcher.search(&query, self.count)?;
            info!("共 {} 个结果", top.total_hits);

            // 解释不使用计分缓存，所有结果共用一次准备
            let explainer = if self.explain { Some(query.prepare(&reader)?) } else { None };
            let mut hits = Vec::with_capacity(top.hits.len());
            for hit in top.hits {
                let path = match reader.resolve(hit.doc) {
                    Some((leaf, local)) => leaf.reader.stored(PATH_FIELD, local)?,
                    None => None,
                };
                let explanation = match &explainer {
                    Some(prepared) => Some(searcher.explain_prepared(prepared, hit.doc)?),
                    None => None,
                };
                hits.push(SearchHit { score: hit.score, doc: hit.doc, path, explanation });
            }
            Ok(hits)
        })?;

        print_result(&result, self)
    }
}

fn print_result(result: &[SearchHit], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for hit in result {
                println!("{:.2}\t{}\t{}", hit.score, hit.doc, hit.path.as_deref().unwrap_or("-"));
                if let Some(explanation) = &hit.explanation {
                    print!("{}", explanation);
                }
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum OutputFormat {
    Json,
    Table,
}
