use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::imdb::SearchResult;

/// 文本搜索参数
#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TextQuery {
    /// 搜索文本
    pub text: Option<String>,
    /// 返回的结果数量，默认使用服务器配置
    pub count: Option<usize>,
}

/// 图片搜索请求参数
#[derive(TryFromMultipart)]
pub struct SearchRequest {
    pub file: Bytes,
    pub count: Option<usize>,
}

/// 图片搜索表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchForm {
    /// 上传的图片文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 返回的结果数量
    pub count: Option<usize>,
}

/// 搜索响应
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    /// 搜索耗时，单位为毫秒
    pub time: u64,
    /// 按相似度从高到低排列的结果
    pub result: Vec<SearchResult>,
}
