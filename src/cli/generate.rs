use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::{SubCommandExtend, embed_images, load_embedder, scan_images};
use crate::config::{ImageOptions, ModelOptions, Opts};
use crate::imdb::ClipDB;

#[derive(Parser, Debug, Clone)]
pub struct GenerateCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub image: ImageOptions,
    /// 忽略文件列表缓存，重新遍历图片目录
    #[arg(long)]
    pub rescan: bool,
    /// 重新计算所有图片的向量
    #[arg(long)]
    pub force: bool,
}

impl SubCommandExtend for GenerateCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        opts.data_dir.create()?;
        let paths = opts.paths();
        let embedder = load_embedder(&self.model)?;
        let db = ClipDB::open(&paths, embedder.dimensions()).await?;

        scan_images(db.db(), &self.image, &paths.filelist_cache, self.rescan).await?;
        embed_images(&db, embedder, &self.image.image_dir, self.force).await?;
        db.load_vectors(false).await?;

        let (total, embedded, indexed) = db.count().await?;
        info!("图片 {total} 张，已计算向量 {embedded} 张，索引中 {indexed} 条");
        Ok(())
    }
}
