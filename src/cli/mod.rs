mod embed;
mod export;
mod generate;
mod load;
mod relativize;
mod scan;
mod search;
pub mod server;

use std::sync::Arc;

pub use embed::*;
pub use export::*;
pub use generate::*;
pub use load::*;
pub use relativize::*;
pub use scan::*;
pub use search::*;
pub use server::*;
use tokio::task::block_in_place;

use crate::clip::{ClipEmbedder, Embedder};
use crate::config::{ModelOptions, Opts};

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

/// 加载 CLIP 模型，加载过程会阻塞较长时间
pub fn load_embedder(opts: &ModelOptions) -> anyhow::Result<Arc<dyn Embedder>> {
    let embedder = block_in_place(|| ClipEmbedder::load(opts))?;
    Ok(Arc::new(embedder))
}
