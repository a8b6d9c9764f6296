use anyhow::Result;
use clap::Parser;
use log::warn;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::db::{self, Database, crud};
use crate::imdb::ClipDB;
use crate::vectors::VectorIndex;

#[derive(Parser, Debug, Clone)]
pub struct LoadCommand {
    /// 丢弃已有的向量索引并重新构建
    #[arg(long)]
    pub rebuild: bool,
}

impl SubCommandExtend for LoadCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let paths = opts.paths();
        let db = db::init_db(&paths.database).await?;
        let Some(dimensions) = stored_dimensions(&db).await? else {
            warn!("数据库中没有任何向量，请先执行 embed");
            return Ok(());
        };
        let index = VectorIndex::open_or_create(&paths.vector_index, dimensions)?;
        ClipDB::new(db, index).load_vectors(self.rebuild).await?;
        Ok(())
    }
}

/// 根据数据库中已保存的向量推断维度，这样载入时无需加载模型
pub async fn stored_dimensions(db: &Database) -> Result<Option<usize>> {
    let first = crud::get_embeddings(db, 1, 0).await?;
    Ok(first.first().map(|r| r.vector().len()))
}
