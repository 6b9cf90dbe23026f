//! 直方图距离函数，结果在 f64 中累加

pub fn l1(a: &[f32], b: &[f32]) -> f64 {
    a.iter().zip(b).map(|(&x, &y)| (x as f64 - y as f64).abs()).sum()
}

pub fn l2(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Jensen-Shannon 散度（自然对数），输入为归一化直方图
pub fn jensen_shannon(a: &[f32], b: &[f32]) -> f64 {
    let mut sum = 0.;
    for (&p, &q) in a.iter().zip(b) {
        let (p, q) = (p as f64, q as f64);
        let m = p + q;
        if p > 0. {
            sum += p * (2. * p / m).ln();
        }
        if q > 0. {
            sum += q * (2. * q / m).ln();
        }
    }
    sum / 2.
}
