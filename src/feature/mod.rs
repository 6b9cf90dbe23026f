//! 图片视觉特征：描述符种类、特征直方图及其字节编码
mod color;
mod distance;
mod edge;
mod layout;

use std::fmt;
use std::str::FromStr;

use byteorder::{ByteOrder, LittleEndian};
use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::error::{ImageError, ImageResult};

/// 编码头部长度：1 字节种类 + 2 字节直方图长度
const HEADER_LEN: usize = 3;

/// 所有直方图中最长的长度，哈希参数表按此维度生成
pub const MAX_DIMENSION: usize = 80;

/// 视觉特征描述符种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DescriptorKind {
    /// RGB 颜色直方图
    ColorHistogram,
    /// 对立色彩空间直方图
    OpponentHistogram,
    /// 8x8 亮度缩略图
    LuminanceLayout,
    /// MPEG-7 边缘直方图
    EdgeHistogram,
    /// MPEG-7 颜色布局
    ColorLayout,
}

impl DescriptorKind {
    pub const ALL: [DescriptorKind; 5] = [
        Self::ColorHistogram,
        Self::OpponentHistogram,
        Self::LuminanceLayout,
        Self::EdgeHistogram,
        Self::ColorLayout,
    ];

    /// 写入字节编码中的种类代码，一经发布不可修改
    pub fn code(self) -> u8 {
        match self {
            Self::ColorHistogram => 1,
            Self::OpponentHistogram => 2,
            Self::LuminanceLayout => 3,
            Self::EdgeHistogram => 4,
            Self::ColorLayout => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.code() == code)
    }

    /// 直方图长度
    pub fn dimension(self) -> usize {
        match self {
            Self::ColorHistogram | Self::OpponentHistogram | Self::LuminanceLayout => 64,
            Self::EdgeHistogram => 80,
            Self::ColorLayout => layout::COLOR_LAYOUT_LEN,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::ColorHistogram => "COLOR_HISTOGRAM",
            Self::OpponentHistogram => "OPPONENT_HISTOGRAM",
            Self::LuminanceLayout => "LUMINANCE_LAYOUT",
            Self::EdgeHistogram => "EDGE_HISTOGRAM",
            Self::ColorLayout => "COLOR_LAYOUT",
        }
    }

    /// 从已解码的图片计算该种类的直方图
    pub fn extract(self, image: &DynamicImage) -> Vec<f32> {
        match self {
            Self::ColorHistogram => color::color_histogram(image),
            Self::OpponentHistogram => color::opponent_histogram(image),
            Self::LuminanceLayout => layout::luminance_layout(image),
            Self::EdgeHistogram => edge::edge_histogram(image),
            Self::ColorLayout => layout::color_layout(image),
        }
    }

    /// 两个同种类直方图之间的距离，距离度量是描述符自身的属性
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        let d = match self {
            Self::ColorHistogram => distance::l1(a, b) * 10.,
            Self::OpponentHistogram => distance::jensen_shannon(a, b) * 10.,
            Self::LuminanceLayout => distance::l2(a, b),
            Self::EdgeHistogram => distance::l1(a, b),
            Self::ColorLayout => layout::color_layout_distance(a, b),
        };
        d as f32
    }
}

impl fmt::Display for DescriptorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DescriptorKind {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == normalized)
            .ok_or_else(|| ImageError::InvalidQuery(format!("未知的特征种类: {}", s)))
    }
}

/// 某一描述符种类的特征直方图
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    kind: DescriptorKind,
    histogram: Vec<f32>,
}

impl FeatureVector {
    pub fn new(kind: DescriptorKind, histogram: Vec<f32>) -> ImageResult<Self> {
        if histogram.len() != kind.dimension() {
            return Err(ImageError::CorruptFeature(format!(
                "{} 的直方图长度应为 {}，实际为 {}",
                kind,
                kind.dimension(),
                histogram.len()
            )));
        }
        Ok(Self { kind, histogram })
    }

    /// 从图片提取特征
    pub fn extract(kind: DescriptorKind, image: &DynamicImage) -> ImageResult<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(ImageError::Extraction { kind, reason: "图片尺寸为 0".to_string() });
        }
        Self::new(kind, kind.extract(image))
    }

    pub fn kind(&self) -> DescriptorKind {
        self.kind
    }

    pub fn histogram(&self) -> &[f32] {
        &self.histogram
    }

    /// 与另一特征的距离，种类不一致时视为无穷远
    pub fn distance(&self, other: &FeatureVector) -> f32 {
        if self.kind != other.kind {
            return f32::INFINITY;
        }
        self.kind.distance(&self.histogram, &other.histogram)
    }

    /// 序列化为 `[种类][长度 u16 LE][f32 LE ...]`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0; HEADER_LEN + self.histogram.len() * 4];
        buf[0] = self.kind.code();
        LittleEndian::write_u16(&mut buf[1..HEADER_LEN], self.histogram.len() as u16);
        LittleEndian::write_f32_into(&self.histogram, &mut buf[HEADER_LEN..]);
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> ImageResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(ImageError::CorruptFeature(format!("数据长度过短: {}", bytes.len())));
        }
        let kind = DescriptorKind::from_code(bytes[0])
            .ok_or_else(|| ImageError::CorruptFeature(format!("未知的种类代码: {}", bytes[0])))?;
        let len = LittleEndian::read_u16(&bytes[1..HEADER_LEN]) as usize;
        let body = &bytes[HEADER_LEN..];
        if body.len() != len * 4 {
            return Err(ImageError::CorruptFeature(format!(
                "直方图长度 {} 与数据长度 {} 不符",
                len,
                body.len()
            )));
        }
        let mut histogram = vec![0.; len];
        LittleEndian::read_f32_into(body, &mut histogram);
        Self::new(kind, histogram)
    }

    /// 解析存储的特征，并要求种类与期望一致
    pub fn from_bytes_of(kind: DescriptorKind, bytes: &[u8]) -> ImageResult<Self> {
        let feature = Self::from_bytes(bytes)?;
        if feature.kind != kind {
            return Err(ImageError::CorruptFeature(format!(
                "期望特征 {}，实际为 {}",
                kind, feature.kind
            )));
        }
        Ok(feature)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 255 / width) as u8, (y * 255 / height) as u8, ((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_round_trip_all_kinds() {
        let image = gradient(64, 48);
        for kind in DescriptorKind::ALL {
            let feature = FeatureVector::extract(kind, &image).unwrap();
            assert_eq!(feature.histogram().len(), kind.dimension());
            let decoded = FeatureVector::from_bytes(&feature.to_bytes()).unwrap();
            assert_eq!(decoded, feature);
            let bits: Vec<u32> = feature.histogram().iter().map(|v| v.to_bits()).collect();
            let decoded_bits: Vec<u32> = decoded.histogram().iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits, decoded_bits);
        }
    }

    #[test]
    fn test_self_distance_is_zero() {
        let image = gradient(100, 70);
        for kind in DescriptorKind::ALL {
            let feature = FeatureVector::extract(kind, &image).unwrap();
            assert_eq!(feature.distance(&feature), 0.0, "{}", kind);
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let image = gradient(120, 90);
        for kind in DescriptorKind::ALL {
            let a = FeatureVector::extract(kind, &image).unwrap();
            let b = FeatureVector::extract(kind, &image).unwrap();
            assert_eq!(a.to_bytes(), b.to_bytes());
        }
    }

    #[test]
    fn test_different_images_have_positive_distance() {
        // 宽度为 3 的竖条纹，保证 2x2 块跨越条纹边界
        let a = DynamicImage::ImageRgb8(RgbImage::from_fn(64, 64, |x, _| {
            if (x / 3) % 2 == 0 { Rgb([250, 240, 230]) } else { Rgb([5, 10, 20]) }
        }));
        let b = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 64, Rgb([10, 200, 30])));
        for kind in DescriptorKind::ALL {
            let fa = FeatureVector::extract(kind, &a).unwrap();
            let fb = FeatureVector::extract(kind, &b).unwrap();
            assert!(fa.distance(&fb) > 0.0, "{}", kind);
        }
    }

    #[test]
    fn test_empty_image_fails() {
        let image = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let err = FeatureVector::extract(DescriptorKind::ColorHistogram, &image).unwrap_err();
        assert!(matches!(err, ImageError::Extraction { .. }));
    }

    #[test]
    fn test_from_bytes_rejects_corrupt_payload() {
        let feature = FeatureVector::extract(DescriptorKind::ColorLayout, &gradient(16, 16)).unwrap();
        let bytes = feature.to_bytes();

        assert!(FeatureVector::from_bytes(&bytes[..2]).is_err());
        assert!(FeatureVector::from_bytes(&bytes[..bytes.len() - 1]).is_err());

        let mut unknown = bytes.clone();
        unknown[0] = 0xff;
        assert!(FeatureVector::from_bytes(&unknown).is_err());

        // 长度与种类不匹配
        let mut wrong_kind = bytes.clone();
        wrong_kind[0] = DescriptorKind::ColorHistogram.code();
        assert!(FeatureVector::from_bytes(&wrong_kind).is_err());

        assert!(FeatureVector::from_bytes_of(DescriptorKind::EdgeHistogram, &bytes).is_err());
        assert!(FeatureVector::from_bytes_of(DescriptorKind::ColorLayout, &bytes).is_ok());
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("color_layout".parse::<DescriptorKind>().unwrap(), DescriptorKind::ColorLayout);
        assert_eq!(
            "EDGE-HISTOGRAM".parse::<DescriptorKind>().unwrap(),
            DescriptorKind::EdgeHistogram
        );
        assert!("CEDD".parse::<DescriptorKind>().is_err());
        for kind in DescriptorKind::ALL {
            assert_eq!(kind.to_string().parse::<DescriptorKind>().unwrap(), kind);
            assert_eq!(DescriptorKind::from_code(kind.code()), Some(kind));
        }
    }
}
