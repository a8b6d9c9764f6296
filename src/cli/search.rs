use anyhow::Result;
use clap::Parser;
use log::info;
use tokio::task::block_in_place;

use crate::cli::{SubCommandExtend, load_embedder};
use crate::config::{ModelOptions, Opts, OutputFormat, SearchOptions};
use crate::imdb::{ClipDB, SearchResult};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    #[command(flatten)]
    pub model: ModelOptions,
    #[command(flatten)]
    pub search: SearchOptions,
    /// 搜索文本
    pub text: String,
    /// 输出格式
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let embedder = load_embedder(&self.model)?;
        let db = ClipDB::open(&opts.paths(), embedder.dimensions()).await?;

        let vector = block_in_place(|| embedder.embed_text(&self.text))?;
        let result = db.search_vector(&vector, self.search.count, None).await?;
        info!("找到 {} 条结果", result.len());

        print_result(&result, self.output_format)
    }
}

fn print_result(result: &[SearchResult], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for r in result {
                println!("{:.4}\t{}", r.score, r.path);
            }
        }
    }
    Ok(())
}
