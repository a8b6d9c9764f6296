use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::clip::{ClipConfig, ClipModel};
use hf_hub::api::sync::Api;
use hf_hub::{Repo, RepoType};
use image::DynamicImage;
use log::{debug, info};

use super::{ClipTokenizer, Embedder, ImageProcessor, l2_normalize};
use crate::config::ModelOptions;

const WEIGHTS_FILE: &str = "model.safetensors";
const TOKENIZER_FILE: &str = "tokenizer.json";

/// 基于 candle 的 CLIP 模型
pub struct ClipEmbedder {
    model: ClipModel,
    tokenizer: ClipTokenizer,
    processor: ImageProcessor,
    device: Device,
    dimensions: usize,
}

impl ClipEmbedder {
    /// 加载模型权重与分词器
    ///
    /// 指定了本地模型目录时直接读取，否则从 Hugging Face 下载（已下载的文件会被缓存）
    pub fn load(opts: &ModelOptions) -> Result<Self> {
        let config = clip_config(&opts.clip_model)?;
        let (weights, tokenizer) = model_files(opts)?;

        let device = Device::cuda_if_available(0)?;
        info!("正在加载 CLIP 模型 {}，设备: {:?}", opts.clip_model, device);
        let start = Instant::now();

        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights], DType::F32, &device)? };
        let model = ClipModel::new(vb, &config).context("无法加载 CLIP 模型权重")?;
        let tokenizer = ClipTokenizer::from_file(tokenizer)?;
        let processor = ImageProcessor::new(config.image_size);

        let mut embedder = Self { model, tokenizer, processor, device, dimensions: 0 };
        // 用空文本跑一次推理，顺便得到输出维度
        embedder.dimensions = embedder.embed_text("")?.len();

        info!(
            "CLIP 模型加载完成，向量维度 {}，耗时 {:.2}s",
            embedder.dimensions,
            start.elapsed().as_secs_f32()
        );
        Ok(embedder)
    }

    fn features_to_vec(features: Tensor) -> Result<Vec<f32>> {
        let v = features.squeeze(0)?.to_dtype(DType::F32)?.to_vec1::<f32>()?;
        Ok(l2_normalize(&v))
    }
}

impl Embedder for ClipEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let pixel_values = self.processor.preprocess(image)?.to_device(&self.device)?.unsqueeze(0)?;
        let features = self.model.get_image_features(&pixel_values)?;
        Self::features_to_vec(features)
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let ids = self.tokenizer.encode(text)?;
        let input_ids = Tensor::new(ids.as_slice(), &self.device)?.unsqueeze(0)?;
        let features = self.model.get_text_features(&input_ids)?;
        debug!("文本向量计算完成: {:?}", text);
        Self::features_to_vec(features)
    }
}

/// 根据模型名称选择网络结构
fn clip_config(name: &str) -> Result<ClipConfig> {
    if name.ends_with("clip-vit-base-patch32") {
        Ok(ClipConfig::vit_base_patch32())
    } else {
        bail!("不支持的 CLIP 模型: {}，目前只支持 ViT-B/32", name)
    }
}

/// 返回 (权重文件, 分词器文件) 的路径
fn model_files(opts: &ModelOptions) -> Result<(PathBuf, PathBuf)> {
    if let Some(dir) = &opts.model_dir {
        let weights = dir.join(WEIGHTS_FILE);
        let tokenizer = dir.join(TOKENIZER_FILE);
        if !weights.exists() || !tokenizer.exists() {
            bail!("模型目录 {} 中缺少 {} 或 {}", dir.display(), WEIGHTS_FILE, TOKENIZER_FILE);
        }
        return Ok((weights, tokenizer));
    }

    info!("从 Hugging Face 获取模型 {}@{}", opts.clip_model, opts.model_revision);
    let api = Api::new()?;
    let repo = api.repo(Repo::with_revision(
        opts.clip_model.clone(),
        RepoType::Model,
        opts.model_revision.clone(),
    ));
    let weights = repo.get(WEIGHTS_FILE).context("下载模型权重失败")?;
    let tokenizer = repo.get(TOKENIZER_FILE).context("下载分词器失败")?;
    Ok((weights, tokenizer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_vit_b32_is_supported() {
        assert!(clip_config("openai/clip-vit-base-patch32").is_ok());
        assert!(clip_config("openai/clip-vit-large-patch14").is_err());
    }

    #[test]
    fn model_dir_must_contain_files() {
        let dir = tempfile::tempdir().unwrap();
        let opts = ModelOptions {
            clip_model: "openai/clip-vit-base-patch32".to_string(),
            model_revision: "main".to_string(),
            model_dir: Some(dir.path().to_path_buf()),
        };
        assert!(model_files(&opts).is_err());

        std::fs::write(dir.path().join(WEIGHTS_FILE), b"").unwrap();
        std::fs::write(dir.path().join(TOKENIZER_FILE), b"").unwrap();
        let (weights, tokenizer) = model_files(&opts).unwrap();
        assert!(weights.ends_with(WEIGHTS_FILE));
        assert!(tokenizer.ends_with(TOKENIZER_FILE));
    }
}
