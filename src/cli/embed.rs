use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use indicatif::ProgressBar;
use log::{info, warn};
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, load_embedder};
use crate::clip::Embedder;
use crate::config::{ImageOptions, ModelOptions, Opts};
use crate::db::crud;
use crate::imdb::ClipDB;
use crate::utils::pb_style;

#[derive(Parser, Debug, Clone)]
pub struct EmbedCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 重新计算所有图片的向量，包括已计算过的
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for EmbedCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = load_embedder(&self.model)?;
        let db = ClipDB::open(&opts.paths(), embedder.dimensions()).await?;
        embed_images(&db, embedder, &self.image.image_dir, self.force).await?;
        Ok(())
    }
}

/// 为数据库中的图片计算向量，返回成功计算的数量
///
/// 逐张处理，单张图片失败时记录日志并跳过。`force` 为 true 且索引不为空时，
/// 计算完成后重建向量索引
pub async fn embed_images(
    db: &ClipDB,
    embedder: Arc<dyn Embedder>,
    image_dir: &Path,
    force: bool,
) -> Result<usize> {
    let records = if force {
        crud::all_images(db.db()).await?
    } else {
        crud::images_without_embedding(db.db()).await?
    };
    info!("共 {} 张图片需要计算向量", records.len());

    let pb = ProgressBar::new(records.len() as u64).with_style(pb_style());
    let mut done = 0;
    for record in records {
        // 旧数据库中可能保存的是绝对路径，join 后保持不变
        let path = image_dir.join(&record.path);
        pb.set_message(record.filename.clone());
        match block_in_place(|| embedder.embed_image_path(&path)) {
            Ok(vector) => {
                crud::set_embedding(db.db(), record.id, &vector).await?;
                done += 1;
            }
            Err(e) => pb.suspend(|| warn!("计算向量失败 {}: {e:#}", path.display())),
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    info!("向量计算完成，成功 {done} 张");

    let (_, _, indexed) = db.count().await?;
    if force && indexed > 0 {
        // 索引中仍是旧向量
        db.load_vectors(true).await?;
    }
    Ok(done)
}
