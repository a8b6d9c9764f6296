use serde::Serialize;
use sqlx::FromRow;

/// 图片记录
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ImageRecord {
    /// 图片 ID，同时也是向量索引中的 key
    pub id: i64,
    /// 文件名
    pub filename: String,
    /// 相对于图片目录的路径
    pub path: String,
    /// 文件修改时间（unix 秒）
    pub modified: i64,
    /// 文件内容的 blake3 哈希
    #[serde(skip)]
    pub checksum: Vec<u8>,
}

/// 待插入的图片元数据
#[derive(Debug, Clone)]
pub struct NewImage {
    pub filename: String,
    pub path: String,
    pub modified: i64,
    pub checksum: Vec<u8>,
}

/// 图片特征向量记录
#[derive(Debug, Clone, FromRow)]
pub struct EmbeddingRecord {
    /// 图片 ID
    pub id: i64,
    /// f32 数组，按小端字节序存储
    pub embedding: Vec<u8>,
}

impl EmbeddingRecord {
    pub fn vector(&self) -> Vec<f32> {
        decode_vector(&self.embedding)
    }
}

/// 将向量编码为数据库中保存的字节（小端序）
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// 从数据库字节还原向量，BLOB 不保证 4 字节对齐，所以逐个读取
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(bytemuck::pod_read_unaligned(chunk)))
        .collect()
}
