use std::f64::consts::{FRAC_1_SQRT_2, PI};

use image::DynamicImage;
use image::imageops::FilterType;

/// 缩略图边长
const GRID: u32 = 8;

/// 各通道保留的 zigzag 系数数量
const Y_COEFFS: usize = 6;
const C_COEFFS: usize = 3;

pub const COLOR_LAYOUT_LEN: usize = Y_COEFFS + 2 * C_COEFFS;

/// zigzag 扫描中前 6 个系数在 8x8 块中的行主序下标
const ZIGZAG: [usize; Y_COEFFS] = [0, 1, 8, 16, 9, 2];

const Y_WEIGHTS: [f64; Y_COEFFS] = [2., 2., 2., 1., 1., 1.];
const CB_WEIGHTS: [f64; C_COEFFS] = [2., 1., 1.];
const CR_WEIGHTS: [f64; C_COEFFS] = [4., 2., 2.];

/// 8x8 灰度缩略图，值域 [0, 1]
pub fn luminance_layout(image: &DynamicImage) -> Vec<f32> {
    let thumb = image.resize_exact(GRID, GRID, FilterType::Triangle).to_luma8();
    thumb.pixels().map(|p| p.0[0] as f32 / 255.).collect()
}

/// MPEG-7 颜色布局：8x8 代表色转换到 YCbCr 后做 DCT，取低频系数
pub fn color_layout(image: &DynamicImage) -> Vec<f32> {
    let thumb = image.resize_exact(GRID, GRID, FilterType::Triangle).to_rgb8();
    let mut y = [0.; 64];
    let mut cb = [0.; 64];
    let mut cr = [0.; 64];
    for (i, pixel) in thumb.pixels().enumerate() {
        let [r, g, b] = pixel.0.map(|c| c as f64);
        y[i] = 0.299 * r + 0.587 * g + 0.114 * b;
        cb[i] = -0.169 * r - 0.331 * g + 0.5 * b + 128.;
        cr[i] = 0.5 * r - 0.419 * g - 0.081 * b + 128.;
    }

    let (y, cb, cr) = (dct8x8(&y), dct8x8(&cb), dct8x8(&cr));
    let mut out = Vec::with_capacity(COLOR_LAYOUT_LEN);
    out.extend(ZIGZAG.iter().map(|&i| y[i] as f32));
    out.extend(ZIGZAG[..C_COEFFS].iter().map(|&i| cb[i] as f32));
    out.extend(ZIGZAG[..C_COEFFS].iter().map(|&i| cr[i] as f32));
    out
}

/// 三个通道的加权欧氏距离之和
pub fn color_layout_distance(a: &[f32], b: &[f32]) -> f64 {
    let (ay, ac) = a.split_at(Y_COEFFS);
    let (by, bc) = b.split_at(Y_COEFFS);
    let (acb, acr) = ac.split_at(C_COEFFS);
    let (bcb, bcr) = bc.split_at(C_COEFFS);
    weighted_l2(ay, by, &Y_WEIGHTS) + weighted_l2(acb, bcb, &CB_WEIGHTS) + weighted_l2(acr, bcr, &CR_WEIGHTS)
}

fn weighted_l2(a: &[f32], b: &[f32], weights: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .zip(weights)
        .map(|((&x, &y), w)| {
            let d = x as f64 - y as f64;
            w * d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// 二维 DCT-II，结果额外除以 8 使直流分量与像素值同量级
fn dct8x8(block: &[f64; 64]) -> [f64; 64] {
    let mut out = [0.; 64];
    for u in 0..8 {
        for v in 0..8 {
            let mut sum = 0.;
            for x in 0..8 {
                for y in 0..8 {
                    sum += block[x * 8 + y]
                        * (((2 * x + 1) * u) as f64 * PI / 16.).cos()
                        * (((2 * y + 1) * v) as f64 * PI / 16.).cos();
                }
            }
            let cu = if u == 0 { FRAC_1_SQRT_2 } else { 1. };
            let cv = if v == 0 { FRAC_1_SQRT_2 } else { 1. };
            out[u * 8 + v] = 0.25 * cu * cv * sum / 8.;
        }
    }
    out
}
