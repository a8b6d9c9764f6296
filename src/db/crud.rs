use std::collections::HashMap;

use sqlx::{Executor, QueryBuilder, Result, Sqlite, SqlitePool};

use super::{EmbeddingRecord, ImageRecord, NewImage, encode_vector};

const IMAGE_COLUMNS: &str = "id, filename, path, modified, checksum";

/// 添加图片记录，路径已存在时返回 None
pub async fn add_image<'c, E>(executor: E, image: &NewImage) -> Result<Option<i64>>
where
    E: Executor<'c, Database = Sqlite>,
{
    let id: Option<i64> = sqlx::query_scalar(
        r#"
        INSERT INTO image (filename, path, modified, checksum)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (path) DO NOTHING
        RETURNING id
        "#,
    )
    .bind(&image.filename)
    .bind(&image.path)
    .bind(image.modified)
    .bind(&image.checksum)
    .fetch_optional(executor)
    .await?;

    Ok(id)
}

/// 检查图片路径是否已登记
pub async fn image_exists(executor: &SqlitePool, path: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM image WHERE path = ?")
        .bind(path)
        .fetch_one(executor)
        .await?;

    Ok(count > 0)
}

pub async fn get_image(executor: &SqlitePool, id: i64) -> Result<Option<ImageRecord>> {
    sqlx::query_as(&format!("SELECT {IMAGE_COLUMNS} FROM image WHERE id = ?"))
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// 批量获取图片记录，结果顺序与 `ids` 一致，不存在的 ID 会被跳过
pub async fn get_images(executor: &SqlitePool, ids: &[i64]) -> Result<Vec<ImageRecord>> {
    if ids.is_empty() {
        return Ok(vec![]);
    }

    let mut builder =
        QueryBuilder::<Sqlite>::new(format!("SELECT {IMAGE_COLUMNS} FROM image WHERE id IN ("));
    {
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(*id);
        }
        separated.push_unseparated(")");
    }

    let rows: Vec<ImageRecord> = builder.build_query_as().fetch_all(executor).await?;
    let mut rows = rows.into_iter().map(|row| (row.id, row)).collect::<HashMap<_, _>>();

    Ok(ids.iter().filter_map(|id| rows.remove(id)).collect())
}

pub async fn all_images(executor: &SqlitePool) -> Result<Vec<ImageRecord>> {
    sqlx::query_as(&format!("SELECT {IMAGE_COLUMNS} FROM image ORDER BY id ASC"))
        .fetch_all(executor)
        .await
}

/// 获取尚未计算特征向量的图片
pub async fn images_without_embedding(executor: &SqlitePool) -> Result<Vec<ImageRecord>> {
    sqlx::query_as(&format!(
        "SELECT {IMAGE_COLUMNS} FROM image WHERE embedding IS NULL ORDER BY id ASC"
    ))
    .fetch_all(executor)
    .await
}

/// 保存图片的特征向量
pub async fn set_embedding<'c, E>(executor: E, id: i64, vector: &[f32]) -> Result<()>
where
    E: Executor<'c, Database = Sqlite>,
{
    sqlx::query("UPDATE image SET embedding = ? WHERE id = ?")
        .bind(encode_vector(vector))
        .bind(id)
        .execute(executor)
        .await?;

    Ok(())
}

pub async fn get_embedding(executor: &SqlitePool, id: i64) -> Result<Option<Vec<f32>>> {
    let record: Option<EmbeddingRecord> = sqlx::query_as(
        "SELECT id, embedding FROM image WHERE id = ? AND embedding IS NOT NULL",
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(record.map(|r| r.vector()))
}

/// 分页获取已有特征向量的记录
pub async fn get_embeddings(
    executor: &SqlitePool,
    limit: usize,
    offset: usize,
) -> Result<Vec<EmbeddingRecord>> {
    let limit = limit as i64;
    let offset = offset as i64;
    sqlx::query_as(
        r#"
        SELECT id, embedding FROM image
        WHERE embedding IS NOT NULL
        ORDER BY id ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(limit)
    .bind(offset)
    .fetch_all(executor)
    .await
}

/// 随机选取已有特征向量的图片
pub async fn random_images(executor: &SqlitePool, n: usize) -> Result<Vec<ImageRecord>> {
    let n = n as i64;
    sqlx::query_as(&format!(
        "SELECT {IMAGE_COLUMNS} FROM image WHERE embedding IS NOT NULL ORDER BY RANDOM() LIMIT ?"
    ))
    .bind(n)
    .fetch_all(executor)
    .await
}

/// 查询数据库中的图片数量与已计算向量的图片数量
pub async fn get_count(executor: &SqlitePool) -> Result<(i64, i64)> {
    let count = sqlx::query_as("SELECT COUNT(*), COUNT(embedding) FROM image")
        .fetch_one(executor)
        .await?;

    Ok(count)
}

/// 去除路径中的 `prefix` 前缀，返回被修改的记录数
///
/// NOTE: 去除前缀后与已有记录重复的路径会被忽略
pub async fn strip_path_prefix(executor: &SqlitePool, prefix: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE OR IGNORE image
        SET path = substr(path, length(?) + 1)
        WHERE substr(path, 1, length(?)) = ?
        "#,
    )
    .bind(prefix)
    .bind(prefix)
    .bind(prefix)
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}
