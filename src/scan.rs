use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::Regex;
use walkdir::WalkDir;

use crate::db::NewImage;
use crate::utils::{hash_file, relative_path};

/// 根据逗号分隔的后缀名构建正则，忽略大小写
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let alternatives = suffix
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| regex::escape(s.trim_start_matches('.')))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!("(?i)^({alternatives})$")).context("无法构建后缀名正则")
}

/// 只保留后缀名匹配的文件
pub fn filter_suffix<'a>(files: &'a [String], re: &'a Regex) -> impl Iterator<Item = &'a String> {
    files.iter().filter(move |file| {
        Path::new(file).extension().is_some_and(|ext| re.is_match(&ext.to_string_lossy()))
    })
}

/// 遍历目录下的所有文件
pub fn walk_dir(dir: &Path) -> Vec<String> {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("遍历目录出错: {e}");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_string_lossy().into_owned())
        .collect()
}

/// 加载文件列表缓存，缓存为空、无法读取或指定 `rescan` 时重新遍历目录
pub fn hydrate_cache(dir: &Path, cache_path: &Path, rescan: bool) -> Result<Vec<String>> {
    info!("正在加载文件列表缓存 {}", cache_path.display());
    if !rescan && cache_path.exists() {
        match load_cache(cache_path) {
            Ok(files) if !files.is_empty() => {
                info!("从缓存中读取到 {} 个文件", files.len());
                return Ok(files);
            }
            Ok(_) => warn!("文件列表缓存为空，重新扫描目录"),
            Err(e) => warn!("无法读取文件列表缓存: {e:#}，重新扫描目录"),
        }
    }

    let files = walk_dir(dir);
    store_cache(cache_path, &files)?;
    info!("扫描到 {} 个文件，已写入缓存 {}", files.len(), cache_path.display());
    Ok(files)
}

fn load_cache(path: &Path) -> Result<Vec<String>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(bincode::deserialize_from(reader)?)
}

fn store_cache(path: &Path, files: &[String]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    {
        let writer = BufWriter::new(File::create(&tmp)?);
        bincode::serialize_into(writer, files)?;
    }
    std::fs::rename(&tmp, path).with_context(|| format!("无法写入缓存 {}", path.display()))?;
    debug!("文件列表缓存已保存");
    Ok(())
}

/// 图片文件的元数据
#[derive(Debug, Clone, PartialEq)]
pub struct FileMeta {
    pub filename: String,
    /// 相对于图片目录的路径
    pub path: String,
    /// 修改时间，unix 时间戳（秒）
    pub modified: i64,
    pub checksum: blake3::Hash,
}

impl FileMeta {
    pub fn read(root: &Path, path: &Path) -> Result<Self> {
        let metadata =
            std::fs::metadata(path).with_context(|| format!("无法读取 {}", path.display()))?;
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        let filename = path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            filename,
            path: relative_path(root, path),
            modified,
            checksum: hash_file(path)?,
        })
    }

    /// 文件在磁盘上的完整路径
    pub fn full_path(&self, root: &Path) -> PathBuf {
        root.join(&self.path)
    }
}

impl From<FileMeta> for NewImage {
    fn from(meta: FileMeta) -> Self {
        NewImage {
            filename: meta.filename,
            path: meta.path,
            modified: meta.modified,
            checksum: meta.checksum.as_bytes().to_vec(),
        }
    }
}
