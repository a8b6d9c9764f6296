use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::body::Bytes;
use tokio::task::spawn_blocking;

use crate::clip::Embedder;
use crate::imdb::ClipDB;
use crate::utils::relative_path;

/// 单次查询最多返回的结果数量
pub const MAX_RESULT_COUNT: usize = 1000;

/// 应用状态
pub struct AppState {
    /// 数据库与向量索引
    pub db: ClipDB,
    /// CLIP 模型
    pub embedder: Arc<dyn Embedder>,
    /// 图片所在目录
    pub image_dir: PathBuf,
    /// 每页显示的图片数量
    pub count: usize,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(
        db: ClipDB,
        embedder: Arc<dyn Embedder>,
        image_dir: PathBuf,
        count: usize,
    ) -> Arc<Self> {
        Arc::new(AppState { db, embedder, image_dir, count })
    }

    /// 请求中的结果数量，未指定或为 0 时使用默认值
    pub fn result_count(&self, requested: Option<usize>) -> usize {
        requested.filter(|&n| n > 0).unwrap_or(self.count).min(MAX_RESULT_COUNT)
    }

    /// 图片在 `/img/` 下的路径
    ///
    /// 旧数据库中保存的绝对路径会转换为相对于图片目录的路径
    pub fn display_path<'a>(&self, stored: &'a str) -> Cow<'a, str> {
        let path = Path::new(stored);
        if path.is_absolute() && path.starts_with(&self.image_dir) {
            Cow::Owned(relative_path(&self.image_dir, path))
        } else {
            Cow::Borrowed(stored)
        }
    }

    /// 在阻塞线程中计算文本向量
    pub async fn embed_text(&self, text: String) -> anyhow::Result<Vec<f32>> {
        let embedder = self.embedder.clone();
        spawn_blocking(move || embedder.embed_text(&text)).await?
    }

    /// 在阻塞线程中解码图片并计算向量
    pub async fn embed_image_bytes(&self, bytes: Bytes) -> anyhow::Result<Vec<f32>> {
        let embedder = self.embedder.clone();
        spawn_blocking(move || embedder.embed_image_bytes(&bytes)).await?
    }
}
