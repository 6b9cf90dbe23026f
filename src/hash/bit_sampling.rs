use anyhow::{Result, ensure};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::feature::MAX_DIMENSION;

/// 每个 token 的位数
const BITS: usize = 12;
/// token 数量
const BUNDLES: usize = 100;

/// 位采样哈希：每一位是直方图在一个随机超平面上投影的符号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BitSampling {
    dimension: usize,
    bits: usize,
    /// `bundles * bits` 个随机向量，元素均匀分布于 [-1, 1]
    functions: Vec<Vec<f64>>,
}

impl BitSampling {
    pub fn generate(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let functions = (0..BUNDLES * BITS)
            .map(|_| (0..MAX_DIMENSION).map(|_| rng.random_range(-1.0..=1.0)).collect())
            .collect();
        Self { dimension: MAX_DIMENSION, bits: BITS, functions }
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.bits > 0 && self.bits <= 16, "位数不合法: {}", self.bits);
        ensure!(self.dimension >= MAX_DIMENSION, "维度 {} 小于 {}", self.dimension, MAX_DIMENSION);
        ensure!(
            !self.functions.is_empty() && self.functions.len() % self.bits == 0,
            "哈希函数数量 {} 不是位数的整数倍",
            self.functions.len()
        );
        ensure!(self.functions.iter().all(|f| f.len() == self.dimension), "哈希函数维度不一致");
        Ok(())
    }

    pub fn bundles(&self) -> usize {
        self.functions.len() / self.bits
    }

    /// 第 i 个 token 为 `(i << bits) | 该组的位`
    pub fn hash(&self, histogram: &[f32]) -> Vec<i32> {
        self.functions
            .chunks_exact(self.bits)
            .enumerate()
            .map(|(i, bundle)| {
                let mut code = 0i32;
                for function in bundle {
                    let projection: f64 =
                        function.iter().zip(histogram).map(|(w, &h)| w * h as f64).sum();
                    code = (code << 1) | (projection >= 0.) as i32;
                }
                ((i as i32) << self.bits) | code
            })
            .collect()
    }
}
