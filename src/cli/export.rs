use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use log::{info, warn};
use ndarray::Array1;
use ndarray_npy::write_npy;

use crate::cli::{SubCommandExtend, stored_dimensions};
use crate::config::Opts;
use crate::db;
use crate::imdb::ClipDB;
use crate::vectors::VectorIndex;

#[derive(Parser, Debug, Clone)]
pub struct ExportCommand {
    /// 输出文件，同时会在旁边写入 `.ids.npy` 保存每一行对应的图片 ID
    #[arg(short, long, default_value = "embeddings.npy")]
    pub output: PathBuf,
}

impl ExportCommand {
    fn ids_path(&self) -> PathBuf {
        self.output.with_extension("ids.npy")
    }
}

impl SubCommandExtend for ExportCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let paths = opts.paths();
        let db = db::init_db(&paths.database).await?;
        let Some(dimensions) = stored_dimensions(&db).await? else {
            warn!("数据库中没有任何向量");
            return Ok(());
        };
        // 只读取数据库，不会写入索引文件
        let index = VectorIndex::create(&paths.vector_index, dimensions)?;
        let (ids, data) = ClipDB::new(db, index).export().await?;

        write_npy(&self.output, &data)?;
        write_npy(self.ids_path(), &Array1::from(ids))?;
        info!("导出成功，共 {} 条向量，维度 {}", data.nrows(), dimensions);
        Ok(())
    }
}
