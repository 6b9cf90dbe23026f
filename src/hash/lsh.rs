use anyhow::{Result, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::feature::MAX_DIMENSION;

/// 哈希函数数量
const FUNCTIONS: usize = 100;
/// 桶宽，直方图会先归一化为单位向量
const BIN_WIDTH: f64 = 0.25;

/// p-stable 局部敏感哈希：`floor((a · ĥ + b) / w)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lsh {
    dimension: usize,
    width: f64,
    /// 每个哈希函数的高斯随机向量
    projections: Vec<Vec<f64>>,
    /// 每个哈希函数的偏移量，均匀分布于 [0, w)
    offsets: Vec<f64>,
}

impl Lsh {
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let projections = (0..FUNCTIONS)
            .map(|_| (0..MAX_DIMENSION).map(|_| rng.sample::<f64, _>(StandardNormal)).collect())
            .collect();
        let offsets = (0..FUNCTIONS).map(|_| rng.random_range(0.0..BIN_WIDTH)).collect();
        Self { dimension: MAX_DIMENSION, width: BIN_WIDTH, projections, offsets }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.width > 0., "桶宽必须为正数: {}", self.width);
        ensure!(self.dimension >= MAX_DIMENSION, "维度 {} 小于 {}", self.dimension, MAX_DIMENSION);
        ensure!(
            !self.projections.is_empty() && self.projections.len() == self.offsets.len(),
            "投影数量 {} 与偏移数量 {} 不一致",
            self.projections.len(),
            self.offsets.len()
        );
        ensure!(self.projections.iter().all(|p| p.len() == self.dimension), "投影维度不一致");
        Ok(())
    }

    /// 第 i 个 token 为 `(i << 16) | (桶编号 & 0xffff)`
    pub fn hash(&self, histogram: &[f32]) -> Vec<i32> {
        let norm = histogram.iter().map(|&v| v as f64 * v as f64).sum::<f64>().sqrt();
        let scale = if norm > 0. { 1. / norm } else { 0. };
        self.projections
            .iter()
            .zip(&self.offsets)
            .enumerate()
            .map(|(i, (projection, offset))| {
                let dot: f64 =
                    projection.iter().zip(histogram).map(|(a, &h)| a * h as f64 * scale).sum();
                let bucket = ((dot + offset) / self.width).floor() as i32;
                ((i as i32) << 16) | (bucket & 0xffff)
            })
            .collect()
    }
}
