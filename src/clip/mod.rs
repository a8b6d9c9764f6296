//! CLIP 模型封装：图片预处理、文本分词与向量计算

mod model;
mod processor;
mod tokenizer;

use std::path::Path;

use anyhow::Result;
use image::DynamicImage;

pub use model::ClipEmbedder;
pub use processor::ImageProcessor;
pub use tokenizer::ClipTokenizer;

use crate::utils;

/// 将图片与文本映射到同一向量空间的模型
///
/// 返回的向量均已归一化，可以直接用余弦距离比较
pub trait Embedder: Send + Sync {
    /// 输出向量的维度
    fn dimensions(&self) -> usize;

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>>;

    fn embed_text(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_image_path(&self, path: &Path) -> Result<Vec<f32>> {
        let image = utils::open_image(path)?;
        self.embed_image(&image)
    }

    fn embed_image_bytes(&self, bytes: &[u8]) -> Result<Vec<f32>> {
        let image = utils::decode_image(bytes)?;
        self.embed_image(&image)
    }
}

/// L2 归一化，零向量原样返回
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm.is_finite() && norm > f32::EPSILON {
        v.iter().map(|x| x / norm).collect()
    } else {
        vec![0.0; v.len()]
    }
}
