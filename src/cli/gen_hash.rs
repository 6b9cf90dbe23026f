use anyhow::{Result, bail};
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::hash::HashContext;

#[derive(Parser, Debug, Clone)]
pub struct GenHashCommand {
    /// 生成参数表使用的随机种子
    #[arg(long, default_value_t = 20_160_101)]
    pub seed: u64,
    /// 覆盖已有的参数表，已添加的图片需要重新添加
    #[arg(long)]
    pub overwrite: bool,
}

impl SubCommandExtend for GenHashCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let bit_sampling = opts.conf_dir.bit_sampling_table();
        let lsh = opts.conf_dir.lsh_table();
        if !self.overwrite && (bit_sampling.exists() || lsh.exists()) {
            bail!("哈希参数表已存在，如需重新生成请使用 --overwrite");
        }
        std::fs::create_dir_all(opts.conf_dir.path())?;
        HashContext::generate(self.seed).save(&bit_sampling, &lsh)?;
        info!("哈希参数表已写入 {}", opts.conf_dir.path().display());
        Ok(())
    }
}
