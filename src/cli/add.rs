use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressIterator};
use log::info;
use regex::Regex;
use tokio::task::spawn_blocking;
use walkdir::WalkDir;

use crate::cli::{PATH_FIELD, SubCommandExtend};
use crate::config::{ExtractOptions, Opts};
use crate::error::ImageError;
use crate::extract::{ImageEnricher, ImageFieldMapping};
use crate::feature::DescriptorKind;
use crate::hash::{HashContext, HashFamily};
use crate::index::{IndexableField, LmdbIndex};
use crate::utils::{content_hash, pb_style};

/// 需要提取的特征及其哈希算法，格式为 `KIND[:FAMILY,...]`
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureArg {
    pub kind: DescriptorKind,
    pub families: Vec<HashFamily>,
}

impl FromStr for FeatureArg {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, families) = match s.split_once(':') {
            Some((kind, families)) => (kind, families),
            None => (s, ""),
        };
        let families = families
            .split(',')
            .filter(|family| !family.trim().is_empty())
            .map(HashFamily::from_str)
            .collect::<Result<_, _>>()?;
        Ok(Self { kind: kind.parse()?, families })
    }
}

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    #[command(flatten)]
    pub extract: ExtractOptions,
    /// 图片所在目录
    pub path: PathBuf,
    /// 图片字段名
    #[arg(long, default_value = "image")]
    pub field: String,
    /// 提取的特征，可以指定多次
    /// 例：-f color_layout:bit_sampling,lsh -f edge_histogram
    #[arg(short, long = "feature", value_name = "KIND[:FAMILY,...]", required = true, verbatim_doc_comment)]
    pub features: Vec<FeatureArg>,
    /// 存储的元数据，如 image.width，可以指定多次
    #[arg(short, long = "metadata", value_name = "NAME")]
    pub metadata: Vec<String>,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,png,webp")]
    pub suffix: String,
}

impl AddCommand {
    fn mapping(&self) -> ImageFieldMapping {
        let builder = self
            .features
            .iter()
            .fold(ImageFieldMapping::builder(&self.field), |builder, feature| {
                builder.feature(feature.kind, feature.families.iter().copied())
            });
        self.metadata.iter().fold(builder, |builder, name| builder.metadata(name)).build()
    }

    /// 需要加载参数表的哈希算法
    fn families(&self) -> Vec<HashFamily> {
        let mut families: Vec<_> =
            self.features.iter().flat_map(|feature| feature.families.iter().copied()).collect();
        families.sort();
        families.dedup();
        families
    }
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = format!("(?i)^({})$", self.suffix.replace(',', "|"));
        let re_suf = Regex::new(&re_suf).context("无效的后缀名")?;

        let hashes = HashContext::load_only(
            opts.conf_dir.bit_sampling_table(),
            opts.conf_dir.lsh_table(),
            self.families(),
        );
        let enricher = Arc::new(ImageEnricher::new(self.mapping(), self.extract.clone(), Arc::new(hashes)));
        let index = Arc::new(Mutex::new(LmdbIndex::open(opts.conf_dir.index())?));

        let entries = scan_directory(&self.path, &re_suf);
        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());

        let mut results = futures::stream::iter(entries)
            .map(|path| {
                let enricher = enricher.clone();
                let index = index.clone();
                async move {
                    let bytes = tokio::fs::read(&path).await?;
                    let hash = content_hash(&bytes);
                    if lock(&index)?.contains(&hash)? {
                        return Ok((path, hash, None));
                    }
                    let fields = spawn_blocking(move || enricher.enrich(&bytes)).await??;
                    anyhow::Ok((path, hash, Some(fields)))
                }
            })
            .buffer_unordered(num_cpus::get());

        let (mut added, mut skipped) = (0, 0);
        while let Some(result) = results.next().await {
            pb.inc(1);
            let (path, hash, fields) = match result {
                Ok(data) => data,
                Err(e) => {
                    pb.println(format!("添加图片失败: {:#}", e));
                    continue;
                }
            };
            let path = path.to_string_lossy().to_string();
            let Some(mut fields) = fields.filter(|fields| !fields.is_empty()) else {
                pb.set_message(format!("跳过图片: {}", path));
                skipped += 1;
                continue;
            };
            let mut db = lock(&index)?;
            // 处理过程中可能出现了内容相同的图片，这里再检查一次
            if db.contains(&hash)? {
                pb.set_message(format!("跳过已添加图片: {}", path));
                skipped += 1;
                continue;
            }
            fields.push(IndexableField::Stored { name: PATH_FIELD.to_string(), value: path.clone() });
            db.add_document(&hash, &fields)?;
            pb.set_message(path);
            added += 1;
        }

        pb.finish_with_message("图片添加完成");
        info!("添加 {} 张图片，跳过 {} 张", added, skipped);
        Ok(())
    }
}

fn lock(index: &Mutex<LmdbIndex>) -> Result<std::sync::MutexGuard<'_, LmdbIndex>> {
    index.lock().map_err(|_| anyhow!("索引锁已损坏"))
}

fn scan_directory(path: &Path, regex_suf: &Regex) -> Vec<PathBuf> {
    info!("开始扫描目录: {}", path.display());
    let pb = ProgressBar::no_length().with_style(pb_style());
    let entries = WalkDir::new(path)
        .into_iter()
        .progress_with(pb)
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .is_some_and(|ext| regex_suf.is_match(&ext.to_string_lossy()))
        })
        .collect::<Vec<_>>();
    info!("扫描完成，共 {} 张图片", entries.len());
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_feature_arg() {
        let arg: FeatureArg = "color_layout:bit_sampling,lsh".parse().unwrap();
        assert_eq!(arg.kind, DescriptorKind::ColorLayout);
        assert_eq!(arg.families, vec![HashFamily::BitSampling, HashFamily::Lsh]);

        let arg: FeatureArg = "EDGE_HISTOGRAM".parse().unwrap();
        assert_eq!(arg.kind, DescriptorKind::EdgeHistogram);
        assert!(arg.families.is_empty());

        assert!("color_layout:minhash".parse::<FeatureArg>().is_err());
        assert!("sift".parse::<FeatureArg>().is_err());
    }

    #[test]
    fn test_requested_families() {
        let add = AddCommand::try_parse_from([
            "add",
            "images",
            "-f",
            "color_layout:lsh,bit_sampling",
            "-f",
            "edge_histogram:lsh",
        ])
        .unwrap();
        assert_eq!(add.families(), vec![HashFamily::BitSampling, HashFamily::Lsh]);

        let add = AddCommand::try_parse_from(["add", "images", "-f", "color_layout"]).unwrap();
        assert!(add.families().is_empty());
    }

    #[test]
    fn test_scan_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["a.jpg", "b.PNG", "c.txt"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.jpg")).unwrap();
        let re = Regex::new("(?i)^(jpg|png)$").unwrap();
        let mut names: Vec<_> = scan_directory(dir.path(), &re)
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        assert_eq!(names, vec!["a.jpg", "b.PNG"]);
    }
}
