use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{ArgAction, Parser, Subcommand};
use directories::ProjectDirs;

use crate::cli::*;

static CONF_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "imsim", "imsim")
        .map(|dirs| dirs.config_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| ".imsim".to_string())
});

fn default_config_dir() -> &'static str {
    CONF_DIR.as_str()
}

/// 特征提取选项
#[derive(Parser, Debug, Clone)]
pub struct ExtractOptions {
    /// 不使用线程池并发提取特征，所有特征在当前线程依次提取
    #[arg(long = "no-thread-pool", action = ArgAction::SetFalse)]
    pub use_thread_pool: bool,
    /// 元数据读取失败时终止索引，默认只记录错误
    #[arg(long = "strict-metadata", action = ArgAction::SetFalse)]
    pub ignore_metadata_errors: bool,
    /// 图片最大边长，超过时等比缩放
    #[arg(long, value_name = "PIXELS", default_value_t = 1024)]
    pub max_image_dimension: u32,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self { use_thread_pool: true, ignore_metadata_errors: true, max_image_dimension: 1024 }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(name = "imsim", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// imsim 配置文件目录
    #[arg(short, long, default_value = default_config_dir())]
    pub conf_dir: ConfDir,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 生成哈希参数表
    GenHash(GenHashCommand),
    /// 添加图片到索引
    Add(AddCommand),
    /// 按视觉相似度搜索图片
    Search(SearchCommand),
}

#[derive(Debug, Clone)]
pub struct ConfDir {
    path: PathBuf,
}

impl ConfDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 返回索引目录
    pub fn index(&self) -> PathBuf {
        self.path.join("index")
    }

    /// 返回位采样哈希参数表路径
    pub fn bit_sampling_table(&self) -> PathBuf {
        self.path.join("hash.bit_sampling")
    }

    /// 返回 LSH 参数表路径
    pub fn lsh_table(&self) -> PathBuf {
        self.path.join("hash.lsh")
    }
}

impl FromStr for ConfDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}
