use image::DynamicImage;

/// 每个通道的量化级数
const LEVELS: usize = 4;

/// RGB 每通道量化为 4 级，共 64 个桶，值为像素占比
pub fn color_histogram(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let mut hist = [0u64; LEVELS * LEVELS * LEVELS];
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0;
        let bin = (r >> 6) as usize * LEVELS * LEVELS + (g >> 6) as usize * LEVELS + (b >> 6) as usize;
        hist[bin] += 1;
    }
    normalize(&hist)
}

/// 对立色彩空间直方图
///
/// O1 = (R - G) / √2，O2 = (R + G - 2B) / √6，O3 = (R + G + B) / √3，
/// 三个分量线性映射到 [0, 1] 后各量化为 4 级
pub fn opponent_histogram(image: &DynamicImage) -> Vec<f32> {
    let rgb = image.to_rgb8();
    let mut hist = [0u64; LEVELS * LEVELS * LEVELS];
    for pixel in rgb.pixels() {
        let [r, g, b] = pixel.0.map(|c| c as f32 / 255.);
        let o1 = (r - g + 1.) / 2.;
        let o2 = (r + g - 2. * b + 2.) / 4.;
        let o3 = (r + g + b) / 3.;
        let bin = quantize(o1) * LEVELS * LEVELS + quantize(o2) * LEVELS + quantize(o3);
        hist[bin] += 1;
    }
    normalize(&hist)
}

fn quantize(v: f32) -> usize {
    ((v * LEVELS as f32) as usize).min(LEVELS - 1)
}

fn normalize(hist: &[u64]) -> Vec<f32> {
    let total = hist.iter().sum::<u64>().max(1) as f64;
    hist.iter().map(|&n| (n as f64 / total) as f32).collect()
}
