use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{Html, IntoResponse, Redirect, Response};
use image::ImageFormat;
use log::{debug, info};
use tokio::task::spawn_blocking;

use super::error::{Result, not_found};
use super::render::{self, Tile};
use super::state::AppState;
use super::types::TextQuery;
use crate::imdb::SearchResult;
use crate::metrics::{self, QueryKind};
use crate::utils::{half_size_jpeg, join_safe, open_image};

/// 超过该大小的图片会被缩小后再返回
const THUMBNAIL_THRESHOLD: u64 = 1024 * 1024;
const THUMBNAIL_QUALITY: u8 = 85;

fn result_tiles<'a>(state: &AppState, result: &'a [SearchResult]) -> Vec<Tile<'a>> {
    result
        .iter()
        .map(|r| Tile {
            id: r.id,
            path: state.display_path(&r.path),
            caption: Some(format!("{:.3}", r.score)),
        })
        .collect()
}

/// 首页，随机展示若干图片
pub async fn index_handler(State(state): State<Arc<AppState>>) -> Result<Html<String>> {
    let images = state.db.random(state.count).await?;
    let tiles = images
        .iter()
        .map(|r| Tile { id: r.id, path: state.display_path(&r.path), caption: None })
        .collect::<Vec<_>>();
    Ok(Html(render::page("Images", "", &render::grid(&tiles))))
}

/// 单张图片及与其相似的图片
pub async fn image_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Response> {
    let Some(record) = state.db.get_image(id).await? else {
        return Ok(not_found("Image not found"));
    };
    // 只有能通过 /img/ 访问到的图片才显示
    let path = state.display_path(&record.path);
    if !join_safe(&state.image_dir, &path).is_some_and(|file| file.is_file()) {
        debug!("图片文件不存在或不在图片目录中: {}", record.path);
        return Ok(not_found("Image not found"));
    }

    let start = Instant::now();
    let similar = state.db.similar(id, state.count).await?.unwrap_or_default();
    metrics::observe_query(
        QueryKind::Similar,
        start.elapsed().as_secs_f32(),
        similar.first().map(|r| r.score),
    );

    let body = format!(
        "{}<h2>Similar images</h2>{}",
        render::main_image(&path),
        render::grid(&result_tiles(&state, &similar))
    );
    Ok(Html(render::page(&record.filename, "", &body)).into_response())
}

/// 随机跳转到一张图片
pub async fn random_handler(State(state): State<Arc<AppState>>) -> Result<Response> {
    let image = state.db.random(1).await?;
    match image.first() {
        Some(record) => Ok(Redirect::to(&format!("/image/{}", record.id)).into_response()),
        None => Ok(not_found("No images found")),
    }
}

/// 文本搜索结果页面
pub async fn text_query_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TextQuery>,
) -> Result<Response> {
    let Some(text) = query.text.filter(|t| !t.trim().is_empty()) else {
        return Ok(Redirect::to("/").into_response());
    };
    let count = state.result_count(query.count);

    info!("正在搜索文本: {text:?}");
    let start = Instant::now();
    let vector = state.embed_text(text.clone()).await?;
    let result = state.db.search_vector(&vector, count, None).await?;
    metrics::observe_query(
        QueryKind::Text,
        start.elapsed().as_secs_f32(),
        result.first().map(|r| r.score),
    );

    let body = format!(
        "<h2>Text Query Results: {}</h2>{}",
        render::escape(&text),
        render::grid(&result_tiles(&state, &result))
    );
    Ok(Html(render::page("Text Query Results", &text, &body)).into_response())
}

/// 返回图片文件，较大的图片会缩小一半并转为 JPEG
pub async fn serve_image_handler(
    State(state): State<Arc<AppState>>,
    Path(path): Path<String>,
) -> Result<Response> {
    let Some(file) = join_safe(&state.image_dir, &path) else {
        return Ok(not_found("Image not found"));
    };
    let metadata = match tokio::fs::metadata(&file).await {
        Ok(metadata) if metadata.is_file() => metadata,
        _ => return Ok(not_found("Image not found")),
    };

    if metadata.len() > THUMBNAIL_THRESHOLD {
        let bytes = spawn_blocking(move || {
            let image = open_image(&file)?;
            half_size_jpeg(&image, THUMBNAIL_QUALITY)
        })
        .await??;
        return Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes).into_response());
    }

    let content_type = ImageFormat::from_path(&file)
        .map(|f| f.to_mime_type())
        .unwrap_or("application/octet-stream");
    let bytes = tokio::fs::read(&file).await?;
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}
