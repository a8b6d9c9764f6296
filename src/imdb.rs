use anyhow::{Result, ensure};
use log::{debug, info};
use ndarray::Array2;
use serde::Serialize;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::DataPaths;
use crate::db::{self, Database, ImageRecord, crud};
use crate::vectors::VectorIndex;

/// 每次从数据库读取的向量数量
const LOAD_BATCH_SIZE: usize = 1024;

/// 一条搜索结果
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchResult {
    /// 图片 ID
    pub id: i64,
    /// 图片文件名
    pub filename: String,
    /// 相对于图片目录的路径
    pub path: String,
    /// 余弦距离，越小越相似
    pub distance: f32,
    /// 相似度，等于 `1 - distance`
    pub score: f32,
}

/// 元数据库与向量索引的组合
pub struct ClipDB {
    db: Database,
    index: RwLock<VectorIndex>,
}

impl ClipDB {
    /// 打开数据库与向量索引，`dimensions` 为模型输出的向量维度
    pub async fn open(paths: &DataPaths, dimensions: usize) -> Result<Self> {
        let db = db::init_db(&paths.database).await?;
        let index = VectorIndex::open_or_create(&paths.vector_index, dimensions)?;
        Ok(Self::new(db, index))
    }

    pub fn new(db: Database, index: VectorIndex) -> Self {
        Self { db, index: RwLock::new(index) }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// 返回 (图片总数, 已计算向量的图片数, 索引中的向量数)
    pub async fn count(&self) -> Result<(i64, i64, usize)> {
        let (total, embedded) = crud::get_count(&self.db).await?;
        Ok((total, embedded, self.index.read().await.len()))
    }

    /// 搜索与 `vector` 最接近的 `k` 张图片
    ///
    /// 索引中存在但数据库中找不到的 ID 会被跳过，`exclude` 指定的图片不会出现在结果中
    pub async fn search_vector(
        &self,
        vector: &[f32],
        k: usize,
        exclude: Option<i64>,
    ) -> Result<Vec<SearchResult>> {
        let mut hits = {
            let index = self.index.read().await;
            index.search(vector, k.saturating_add(exclude.is_some() as usize))?
        };
        hits.retain(|(id, _)| Some(*id) != exclude);
        hits.truncate(k);

        let ids = hits.iter().map(|(id, _)| *id).collect::<Vec<_>>();
        let records = crud::get_images(&self.db, &ids).await?;
        debug!("向量索引返回 {} 条结果，其中 {} 条在数据库中", ids.len(), records.len());

        let mut records = records.into_iter().peekable();
        let mut result = Vec::with_capacity(hits.len());
        for (id, distance) in hits {
            // get_images 返回的顺序与 ids 一致，缺失的记录直接跳过
            if let Some(record) = records.next_if(|r| r.id == id) {
                result.push(SearchResult {
                    id,
                    filename: record.filename,
                    path: record.path,
                    distance,
                    score: 1.0 - distance,
                });
            }
        }
        Ok(result)
    }

    /// 搜索与指定图片相似的图片，不包括图片本身
    ///
    /// 图片不存在或尚未计算向量时返回 None
    pub async fn similar(&self, id: i64, k: usize) -> Result<Option<Vec<SearchResult>>> {
        let vector = match self.index.read().await.get(id)? {
            Some(vector) => Some(vector),
            None => crud::get_embedding(&self.db, id).await?,
        };
        match vector {
            Some(vector) => Ok(Some(self.search_vector(&vector, k, Some(id)).await?)),
            None => Ok(None),
        }
    }

    pub async fn get_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        Ok(crud::get_image(&self.db, id).await?)
    }

    /// 随机选取 `n` 张已计算向量的图片
    pub async fn random(&self, n: usize) -> Result<Vec<ImageRecord>> {
        Ok(crud::random_images(&self.db, n).await?)
    }

    /// 将数据库中的向量写入索引，已存在的 ID 会被跳过，返回新增的数量
    ///
    /// `rebuild` 为 true 时丢弃已有索引并重新构建
    pub async fn load_vectors(&self, rebuild: bool) -> Result<usize> {
        let mut index = self.index.write().await;
        if rebuild {
            let path = index.path().to_path_buf();
            info!("重新构建向量索引 {}", path.display());
            *index = VectorIndex::create(path, index.dimensions())?;
        }

        let mut added = 0;
        let mut offset = 0;
        loop {
            let records = crud::get_embeddings(&self.db, LOAD_BATCH_SIZE, offset).await?;
            if records.is_empty() {
                break;
            }
            offset += records.len();
            for record in records {
                if index.contains(record.id) {
                    continue;
                }
                index.add(record.id, &record.vector())?;
                added += 1;
            }
            debug!("已读取 {offset} 条向量");
        }

        index.save()?;
        info!("向量索引新增 {added} 条向量，共 {} 条", index.len());
        Ok(added)
    }

    /// 导出所有向量，返回 (图片 ID, N x D 矩阵)
    pub async fn export(&self) -> Result<(Vec<i64>, Array2<f32>)> {
        let dimensions = self.index.read().await.dimensions();
        let mut ids = vec![];
        let mut data = vec![];
        let mut offset = 0;
        loop {
            let records = crud::get_embeddings(&self.db, LOAD_BATCH_SIZE, offset).await?;
            if records.is_empty() {
                break;
            }
            offset += records.len();
            for record in records {
                let vector = record.vector();
                ensure!(
                    vector.len() == dimensions,
                    "图片 {} 的向量维度为 {}，期望 {}",
                    record.id,
                    vector.len(),
                    dimensions
                );
                ids.push(record.id);
                data.extend_from_slice(&vector);
            }
        }
        let matrix = Array2::from_shape_vec((ids.len(), dimensions), data)?;
        Ok((ids, matrix))
    }
}
