use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, ensure};
use log::{debug, info};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};

/// 每次扩容时至少预留的向量数量
const MIN_RESERVE: usize = 1024;

/// 基于 usearch 的向量索引，key 与数据库中的图片 ID 一致
pub struct VectorIndex {
    index: Index,
    path: PathBuf,
    dimensions: usize,
}

impl VectorIndex {
    fn options(dimensions: usize) -> IndexOptions {
        IndexOptions {
            dimensions,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            // 此处为 usearch 默认参数
            connectivity: 16,
            expansion_add: 128,
            expansion_search: 64,
            ..Default::default()
        }
    }

    /// 创建一个空索引，调用 `save` 后会覆盖 `path` 处已有的文件
    pub fn create<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let index = Index::new(&Self::options(dimensions))?;
        Ok(Self { index, path: path.as_ref().to_path_buf(), dimensions })
    }

    /// 打开已有索引，不存在时创建新的索引
    pub fn open_or_create<P: AsRef<Path>>(path: P, dimensions: usize) -> Result<Self> {
        let path = path.as_ref();
        let s = Self::create(path, dimensions)?;
        if path.exists() {
            let file = path.to_str().ok_or_else(|| anyhow!("索引路径不是合法的 UTF-8"))?;
            s.index.load(file).with_context(|| format!("无法加载向量索引 {}", path.display()))?;
            ensure!(
                s.index.dimensions() == dimensions,
                "向量索引维度为 {}，但模型输出维度为 {}",
                s.index.dimensions(),
                dimensions
            );
            info!("已加载向量索引 {}，共 {} 条向量", path.display(), s.len());
        } else {
            debug!("向量索引 {} 不存在，创建新索引", path.display());
        }
        Ok(s)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.index.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: i64) -> bool {
        self.index.contains(id as u64)
    }

    /// 添加一条向量，容量不足时自动扩容
    pub fn add(&self, id: i64, vector: &[f32]) -> Result<()> {
        self.check_dimensions(vector)?;
        let size = self.index.size();
        if size >= self.index.capacity() {
            self.index.reserve((size * 2).max(MIN_RESERVE))?;
        }
        self.index.add(id as u64, vector)?;
        Ok(())
    }

    /// 取出指定 ID 的向量
    pub fn get(&self, id: i64) -> Result<Option<Vec<f32>>> {
        if !self.contains(id) {
            return Ok(None);
        }
        let mut buffer = vec![0f32; self.dimensions];
        let found = self.index.get(id as u64, &mut buffer)?;
        Ok((found > 0).then_some(buffer))
    }

    /// 搜索最接近的 k 个向量，返回 (ID, 余弦距离)，按距离升序排列
    pub fn search(&self, vector: &[f32], k: usize) -> Result<Vec<(i64, f32)>> {
        self.check_dimensions(vector)?;
        // usearch 会按 k 预先分配结果空间
        let k = k.min(self.len());
        if k == 0 {
            return Ok(vec![]);
        }
        let matches = self.index.search(vector, k)?;
        Ok(matches.keys.into_iter().map(|key| key as i64).zip(matches.distances).collect())
    }

    /// 保存索引，先写入临时文件再替换，避免中途失败损坏已有索引
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone();
        tmp.set_extension("tmp");
        let file = tmp.to_str().ok_or_else(|| anyhow!("索引路径不是合法的 UTF-8"))?;
        self.index.save(file)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("向量索引已保存到 {}", self.path.display());
        Ok(())
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<()> {
        ensure!(
            vector.len() == self.dimensions,
            "向量维度不匹配：期望 {}，实际 {}",
            self.dimensions,
            vector.len()
        );
        Ok(())
    }
}
