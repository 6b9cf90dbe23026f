//! 近似相似度哈希：把特征直方图映射为一组可检索的整数 token
//!
//! 参数表在进程启动时通过 [`HashContext::load`] 显式加载一次，之后只读，
//! 每次生成 token 时都需要传入该上下文。
mod bit_sampling;
mod lsh;

use std::collections::BTreeSet;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
pub use bit_sampling::BitSampling;
use log::{error, info, warn};
pub use lsh::Lsh;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ImageResult};
use crate::feature::FeatureVector;

/// 哈希算法族
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HashFamily {
    /// 随机超平面位采样
    BitSampling,
    /// p-stable 局部敏感哈希
    Lsh,
}

impl HashFamily {
    pub const ALL: [HashFamily; 2] = [Self::BitSampling, Self::Lsh];

    pub fn name(self) -> &'static str {
        match self {
            Self::BitSampling => "BIT_SAMPLING",
            Self::Lsh => "LSH",
        }
    }
}

impl fmt::Display for HashFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HashFamily {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|family| family.name() == normalized)
            .ok_or_else(|| ImageError::InvalidQuery(format!("未知的哈希算法: {}", s)))
    }
}

/// 已加载的哈希参数表，构造后不可变，可在线程间共享
#[derive(Debug, Clone, Default)]
pub struct HashContext {
    bit_sampling: Option<BitSampling>,
    lsh: Option<Lsh>,
}

impl HashContext {
    /// 使用固定种子生成全部参数表
    pub fn generate(seed: u64) -> Self {
        Self {
            bit_sampling: Some(BitSampling::generate(seed)),
            lsh: Some(Lsh::generate(seed.wrapping_add(1))),
        }
    }

    /// 从文件加载参数表，加载失败的算法族只记录一次错误，之后请求该算法族会返回
    /// [`ImageError::HashParameterUnavailable`]
    pub fn load(bit_sampling: impl AsRef<Path>, lsh: impl AsRef<Path>) -> Self {
        Self::load_only(bit_sampling, lsh, HashFamily::ALL)
    }

    /// 只加载指定的算法族，其余算法族不可用
    pub fn load_only(
        bit_sampling: impl AsRef<Path>,
        lsh: impl AsRef<Path>,
        families: impl IntoIterator<Item = HashFamily>,
    ) -> Self {
        let families: BTreeSet<_> = families.into_iter().collect();
        Self {
            bit_sampling: families
                .contains(&HashFamily::BitSampling)
                .then(|| load_family(HashFamily::BitSampling, bit_sampling.as_ref(), BitSampling::validate))
                .flatten(),
            lsh: families
                .contains(&HashFamily::Lsh)
                .then(|| load_family(HashFamily::Lsh, lsh.as_ref(), Lsh::validate))
                .flatten(),
        }
    }

    /// 保存参数表，未加载的算法族会被跳过
    pub fn save(&self, bit_sampling: impl AsRef<Path>, lsh: impl AsRef<Path>) -> Result<()> {
        if let Some(table) = &self.bit_sampling {
            save_table(table, bit_sampling.as_ref())?;
        }
        if let Some(table) = &self.lsh {
            save_table(table, lsh.as_ref())?;
        }
        Ok(())
    }

    pub fn is_available(&self, family: HashFamily) -> bool {
        match family {
            HashFamily::BitSampling => self.bit_sampling.is_some(),
            HashFamily::Lsh => self.lsh.is_some(),
        }
    }

    /// 为特征生成 token 序列，相同的特征与参数表总是得到相同的结果
    pub fn generate_tokens(
        &self,
        feature: &FeatureVector,
        family: HashFamily,
    ) -> ImageResult<Vec<i32>> {
        let histogram = feature.histogram();
        match family {
            HashFamily::BitSampling => self
                .bit_sampling
                .as_ref()
                .map(|table| table.hash(histogram))
                .ok_or(ImageError::HashParameterUnavailable(family)),
            HashFamily::Lsh => self
                .lsh
                .as_ref()
                .map(|table| table.hash(histogram))
                .ok_or(ImageError::HashParameterUnavailable(family)),
        }
    }
}

fn load_table<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("无法打开 {}", path.display()))?;
    let table = bincode::deserialize_from(BufReader::new(file))
        .with_context(|| format!("无法解析 {}", path.display()))?;
    info!("已加载哈希参数表: {}", path.display());
    Ok(table)
}

fn save_table<T: Serialize>(table: &T, path: &Path) -> Result<()> {
    let file = File::create(path).with_context(|| format!("无法创建 {}", path.display()))?;
    bincode::serialize_into(BufWriter::new(file), table)?;
    Ok(())
}

/// 文件不存在只是尚未生成参数表，记录警告；文件损坏记录错误
fn load_family<T: DeserializeOwned>(
    family: HashFamily,
    path: &Path,
    validate: impl FnOnce(&T) -> Result<()>,
) -> Option<T> {
    if !path.exists() {
        warn!("哈希参数表 {} 不存在: {}，请先运行 gen-hash", family, path.display());
        return None;
    }
    match load_table::<T>(path).and_then(|table| validate(&table).map(|_| table)) {
        Ok(table) => Some(table),
        Err(e) => {
            error!("初始化哈希参数表 {} 失败: {:#}", family, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use image::{DynamicImage, Rgb, RgbImage};
    use tempfile::TempDir;

    use super::*;
    use crate::feature::DescriptorKind;

    fn feature(kind: DescriptorKind) -> FeatureVector {
        let image = DynamicImage::ImageRgb8(RgbImage::from_fn(40, 30, |x, y| {
            Rgb([(x * 6) as u8, (y * 8) as u8, ((x ^ y) * 4) as u8])
        }));
        FeatureVector::extract(kind, &image).unwrap()
    }

    #[test]
    fn test_tokens_are_deterministic() {
        let a = HashContext::generate(7);
        let b = HashContext::generate(7);
        for kind in DescriptorKind::ALL {
            let f = feature(kind);
            for family in HashFamily::ALL {
                let ta = a.generate_tokens(&f, family).unwrap();
                assert_eq!(ta, a.generate_tokens(&f, family).unwrap());
                assert_eq!(ta, b.generate_tokens(&f, family).unwrap());
                assert!(!ta.is_empty());
            }
        }
    }

    #[test]
    fn test_save_and_load_keeps_tokens() {
        let dir = TempDir::new().unwrap();
        let bs = dir.path().join("bit_sampling.bin");
        let lsh = dir.path().join("lsh.bin");
        let generated = HashContext::generate(42);
        generated.save(&bs, &lsh).unwrap();

        let loaded = HashContext::load(&bs, &lsh);
        let f = feature(DescriptorKind::EdgeHistogram);
        for family in HashFamily::ALL {
            assert_eq!(
                generated.generate_tokens(&f, family).unwrap(),
                loaded.generate_tokens(&f, family).unwrap()
            );
        }
    }

    #[test]
    fn test_missing_table_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let bs = dir.path().join("bit_sampling.bin");
        HashContext::generate(1).save(&bs, dir.path().join("unused.bin")).unwrap();

        let ctx = HashContext::load(&bs, dir.path().join("missing.bin"));
        assert!(ctx.is_available(HashFamily::BitSampling));
        assert!(!ctx.is_available(HashFamily::Lsh));

        let f = feature(DescriptorKind::ColorHistogram);
        assert!(ctx.generate_tokens(&f, HashFamily::BitSampling).is_ok());
        assert!(matches!(
            ctx.generate_tokens(&f, HashFamily::Lsh),
            Err(ImageError::HashParameterUnavailable(HashFamily::Lsh))
        ));
    }

    #[test]
    fn test_corrupt_table_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let bs = dir.path().join("bit_sampling.bin");
        std::fs::write(&bs, b"not a table").unwrap();
        let ctx = HashContext::load(&bs, dir.path().join("missing.bin"));
        assert!(!ctx.is_available(HashFamily::BitSampling));
        assert!(HashContext::default().generate_tokens(
            &feature(DescriptorKind::ColorLayout),
            HashFamily::BitSampling
        ).is_err());
    }

    #[test]
    fn test_load_only_requested_families() {
        let dir = TempDir::new().unwrap();
        let bs = dir.path().join("bit_sampling.bin");
        let lsh = dir.path().join("lsh.bin");
        HashContext::generate(9).save(&bs, &lsh).unwrap();

        let ctx = HashContext::load_only(&bs, &lsh, [HashFamily::Lsh]);
        assert!(ctx.is_available(HashFamily::Lsh));
        assert!(!ctx.is_available(HashFamily::BitSampling));

        let ctx = HashContext::load_only(&bs, &lsh, Vec::<HashFamily>::new());
        assert!(HashFamily::ALL.iter().all(|&family| !ctx.is_available(family)));

        let ctx = HashContext::load_only(&bs, &lsh, [HashFamily::BitSampling, HashFamily::BitSampling]);
        assert!(ctx.is_available(HashFamily::BitSampling));
    }

    #[test]
    fn test_family_from_str() {
        assert_eq!("bit_sampling".parse::<HashFamily>().unwrap(), HashFamily::BitSampling);
        assert_eq!("LSH".parse::<HashFamily>().unwrap(), HashFamily::Lsh);
        assert!("minhash".parse::<HashFamily>().is_err());
    }
}
