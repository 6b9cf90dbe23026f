use std::f64::consts::SQRT_2;

use image::{DynamicImage, GrayImage};

/// 图片划分为 4x4 个子图
const SUB_IMAGES: u32 = 4;
/// 每个子图统计 5 种边缘
const EDGE_TYPES: usize = 5;
/// 期望的图像块总数，用于推算块大小
const DESIRED_BLOCKS: f64 = 1100.;
/// 边缘强度阈值，低于该值的块视为无边缘
const THRESHOLD: f64 = 11.;

/// 垂直、水平、45°、135°、无方向五种滤波器，依次作用于 2x2 子块的均值
const FILTERS: [[f64; 4]; EDGE_TYPES] = [
    [1., -1., 1., -1.],
    [1., 1., -1., -1.],
    [SQRT_2, 0., 0., -SQRT_2],
    [0., SQRT_2, -SQRT_2, 0.],
    [2., -2., -2., 2.],
];

/// MPEG-7 边缘直方图，80 个桶，每个子图内按块数归一化
pub fn edge_histogram(image: &DynamicImage) -> Vec<f32> {
    let gray = image.to_luma8();
    let (width, height) = gray.dimensions();
    let block = block_size(width, height);

    let mut bins = [0u32; (SUB_IMAGES * SUB_IMAGES) as usize * EDGE_TYPES];
    let mut blocks = [0u32; (SUB_IMAGES * SUB_IMAGES) as usize];

    let mut y = 0;
    while y + block <= height {
        let mut x = 0;
        while x + block <= width {
            let sub = ((y * SUB_IMAGES / height) * SUB_IMAGES + x * SUB_IMAGES / width) as usize;
            blocks[sub] += 1;
            if let Some(edge) = classify_block(&gray, x, y, block) {
                bins[sub * EDGE_TYPES + edge] += 1;
            }
            x += block;
        }
        y += block;
    }

    bins.iter()
        .enumerate()
        .map(|(i, &n)| match blocks[i / EDGE_TYPES] {
            0 => 0.,
            total => n as f32 / total as f32,
        })
        .collect()
}

/// 块边长，取偶数且不小于 2
fn block_size(width: u32, height: u32) -> u32 {
    let size = ((width as f64 * height as f64 / DESIRED_BLOCKS).sqrt() / 2.).floor() as u32 * 2;
    size.max(2)
}

/// 返回强度最大的边缘类型，强度低于阈值时返回 None
fn classify_block(gray: &GrayImage, x: u32, y: u32, block: u32) -> Option<usize> {
    let half = block / 2;
    let means = [
        region_mean(gray, x, y, half),
        region_mean(gray, x + half, y, half),
        region_mean(gray, x, y + half, half),
        region_mean(gray, x + half, y + half, half),
    ];

    let mut best = None;
    let mut max = THRESHOLD;
    for (i, filter) in FILTERS.iter().enumerate() {
        let strength = filter.iter().zip(&means).map(|(f, m)| f * m).sum::<f64>().abs();
        if strength >= max {
            max = strength;
            best = Some(i);
        }
    }
    best
}

fn region_mean(gray: &GrayImage, x: u32, y: u32, size: u32) -> f64 {
    let mut sum = 0u64;
    for dy in 0..size {
        for dx in 0..size {
            sum += gray.get_pixel(x + dx, y + dy).0[0] as u64;
        }
    }
    sum as f64 / (size * size) as f64
}
