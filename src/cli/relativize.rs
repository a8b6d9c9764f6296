use anyhow::Result;
use clap::Parser;
use log::info;

use crate::cli::SubCommandExtend;
use crate::config::{ImageOptions, Opts};
use crate::db::{self, crud};

#[derive(Parser, Debug, Clone)]
pub struct RelativizeCommand {
    #[command(flatten)]
    pub image: ImageOptions,
    /// 需要去除的路径前缀，默认为图片目录
    #[arg(long)]
    pub prefix: Option<String>,
}

impl RelativizeCommand {
    /// 要去除的前缀，总是以 `/` 结尾
    fn prefix(&self) -> String {
        let prefix = self
            .prefix
            .clone()
            .unwrap_or_else(|| self.image.image_dir.to_string_lossy().into_owned());
        if prefix.ends_with('/') { prefix } else { format!("{prefix}/") }
    }
}

impl SubCommandExtend for RelativizeCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let db = db::init_db(opts.paths().database).await?;
        let prefix = self.prefix();
        let changed = crud::strip_path_prefix(&db, &prefix).await?;
        info!("已将 {changed} 条记录的路径中的 {prefix:?} 去除");
        Ok(())
    }
}
