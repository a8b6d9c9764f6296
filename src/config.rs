use std::convert::Infallible;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

use clap::{Parser, Subcommand, ValueEnum};
use directories::ProjectDirs;

use crate::cli::*;

static DATA_DIR: LazyLock<String> = LazyLock::new(|| {
    ProjectDirs::from("", "clipsearch", "clipsearch")
        .map(|dirs| dirs.data_dir().to_string_lossy().into_owned())
        .unwrap_or_else(|| "./".to_string())
});

fn default_data_dir() -> &'static str {
    DATA_DIR.as_str()
}

#[derive(Parser, Debug, Clone)]
pub struct ModelOptions {
    /// Hugging Face 上的 CLIP 模型仓库
    #[arg(long, env = "CLIP_MODEL", default_value = "openai/clip-vit-base-patch32")]
    pub clip_model: String,
    /// 模型仓库的版本，openai 的仓库只有该分支提供 safetensors 权重
    #[arg(long, value_name = "REVISION", default_value = "refs/pr/15")]
    pub model_revision: String,
    /// 本地模型目录，需包含 model.safetensors 与 tokenizer.json，指定后不再访问网络
    #[arg(long, env = "CLIP_MODEL_DIR", value_name = "DIR")]
    pub model_dir: Option<PathBuf>,
}

#[derive(Parser, Debug, Clone)]
pub struct ImageOptions {
    /// 图片所在目录，数据库中保存的是相对于该目录的路径
    #[arg(long, env = "IMAGE_DIRECTORY", value_name = "DIR", default_value = "images")]
    pub image_dir: PathBuf,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp")]
    pub suffix: String,
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// 显示的结果数量
    #[arg(long, env = "NUM_IMAGE_RESULTS", value_name = "COUNT", default_value_t = 52)]
    pub count: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "clipsearch", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    /// 数据目录，存放数据库与文件列表缓存
    #[arg(short, long, env = "DATA_DIR", global = true, default_value = default_data_dir())]
    pub data_dir: DataDir,
    /// 数据库文件名
    #[arg(long, env = "DB_FILENAME", global = true, default_value = "images.db")]
    pub db_filename: String,
    /// 文件列表缓存文件名
    #[arg(long, env = "CACHE_FILENAME", global = true, default_value = "filelist_cache.bin")]
    pub cache_filename: String,
    /// 向量索引所在目录，默认为数据目录下的 vectors
    #[arg(long, env = "VECTOR_PATH", global = true, value_name = "DIR")]
    pub vector_path: Option<PathBuf>,
    /// 向量索引集合名称
    #[arg(long, env = "VECTOR_COLLECTION", global = true, default_value = "images")]
    pub collection: String,
}

impl Opts {
    /// 根据命令行参数计算出的各文件路径
    pub fn paths(&self) -> DataPaths {
        let vectors = self.vector_path.clone().unwrap_or_else(|| self.data_dir.path().join("vectors"));
        DataPaths {
            database: self.data_dir.path().join(&self.db_filename),
            filelist_cache: self.data_dir.path().join(&self.cache_filename),
            vector_index: vectors.join(format!("{}.usearch", self.collection)),
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 扫描图片目录，将新图片登记到数据库
    Scan(ScanCommand),
    /// 为尚未计算特征向量的图片生成 CLIP 向量
    Embed(EmbedCommand),
    /// 将数据库中的向量载入向量索引
    Load(LoadCommand),
    /// 依次执行 scan、embed、load
    Generate(GenerateCommand),
    /// 将数据库中的绝对路径改写为相对于图片目录的路径
    Relativize(RelativizeCommand),
    /// 使用文本搜索图片
    Search(SearchCommand),
    /// 导出所有特征向量为 npy 文件
    Export(ExportCommand),
    /// 启动 HTTP 服务
    Server(ServerCommand),
}

#[derive(Debug, Clone)]
pub struct DataDir {
    path: PathBuf,
}

impl DataDir {
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// 确保目录存在
    pub fn create(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.path)
    }
}

impl FromStr for DataDir {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self { path: PathBuf::from(s) })
    }
}

/// 数据库、缓存与向量索引的路径
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub database: PathBuf,
    pub filelist_cache: PathBuf,
    pub vector_index: PathBuf,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default)]
pub enum OutputFormat {
    Json,
    #[default]
    Table,
}
