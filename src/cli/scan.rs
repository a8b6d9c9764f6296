use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;
use indicatif::{ParallelProgressIterator, ProgressBar};
use log::info;
use rayon::prelude::*;
use tokio::task::block_in_place;

use crate::cli::SubCommandExtend;
use crate::config::{ImageOptions, Opts};
use crate::db::{self, Database, NewImage, crud};
use crate::scan::{FileMeta, filter_suffix, hydrate_cache, suffix_regex};
use crate::utils::{pb_style, relative_path};

#[derive(Parser, Debug, Clone)]
pub struct ScanCommand {
    #[command(flatten)]
    pub image: ImageOptions,
    /// 忽略文件列表缓存，重新遍历图片目录
    #[arg(long)]
    pub rescan: bool,
}

impl SubCommandExtend for ScanCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        opts.data_dir.create()?;
        let db = db::init_db(opts.paths().database).await?;
        scan_images(&db, &self.image, &opts.paths().filelist_cache, self.rescan).await?;
        Ok(())
    }
}

/// 扫描图片目录，将尚未登记的图片写入数据库，返回新增的图片数量
pub async fn scan_images(
    db: &Database,
    image: &ImageOptions,
    cache: &Path,
    rescan: bool,
) -> Result<usize> {
    let root = image.image_dir.as_path();
    let re = suffix_regex(&image.suffix)?;

    let files = block_in_place(|| hydrate_cache(root, cache, rescan))?;

    // 旧数据库中的绝对路径同样换算成相对路径再比较
    let known = crud::all_images(db)
        .await?
        .into_iter()
        .map(|r| relative_path(root, Path::new(&r.path)))
        .collect::<HashSet<_>>();
    let pending = filter_suffix(&files, &re)
        .map(PathBuf::from)
        .filter(|path| !known.contains(&relative_path(root, path)))
        .collect::<Vec<_>>();
    info!("共 {} 个图片文件，其中 {} 个尚未登记", files.len(), pending.len());

    let pb = ProgressBar::new(pending.len() as u64).with_style(pb_style());
    let metas = block_in_place(|| {
        pending
            .par_iter()
            .progress_with(pb.clone())
            .filter_map(|path| match FileMeta::read(root, path) {
                Ok(meta) => Some(meta),
                Err(e) => {
                    pb.println(format!("读取文件失败: {e:#}"));
                    None
                }
            })
            .collect::<Vec<_>>()
    });
    pb.finish_and_clear();

    let mut tx = db.begin().await?;
    let mut added = 0;
    for meta in metas {
        if crud::add_image(&mut *tx, &NewImage::from(meta)).await?.is_some() {
            added += 1;
        }
    }
    tx.commit().await?;

    info!("扫描完成，新增 {added} 张图片");
    Ok(added)
}
