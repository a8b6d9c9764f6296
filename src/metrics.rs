use std::sync::LazyLock;

use prometheus::*;

/// 查询类型
#[derive(Debug, Clone, Copy)]
pub enum QueryKind {
    /// 文本搜索
    Text,
    /// 上传图片搜索
    Image,
    /// 相似图片
    Similar,
}

impl QueryKind {
    fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Text => "text",
            QueryKind::Image => "image",
            QueryKind::Similar => "similar",
        }
    }
}

static METRIC_QUERY_COUNT: LazyLock<IntCounterVec> = LazyLock::new(|| {
    register_int_counter_vec!("clip_search_query_count", "count of the search queries", &["kind"])
        .unwrap()
});

static METRIC_QUERY_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "clip_search_query_duration",
        "duration of the per-query search in seconds, including embedding",
        &["kind"]
    )
    .unwrap()
});

static METRIC_QUERY_BEST_SCORE: LazyLock<HistogramVec> = LazyLock::new(|| {
    register_histogram_vec!(
        "clip_search_best_score",
        "cosine similarity of the best result",
        &["kind"],
        (0..=20).map(|x| x as f64 * 0.05).collect()
    )
    .unwrap()
});

/// 记录一次查询
pub fn observe_query(kind: QueryKind, duration: f32, best_score: Option<f32>) {
    let label = [kind.as_str()];
    METRIC_QUERY_COUNT.with_label_values(&label).inc();
    METRIC_QUERY_DURATION.with_label_values(&label).observe(duration as f64);
    if let Some(score) = best_score {
        METRIC_QUERY_BEST_SCORE.with_label_values(&label).observe(score as f64);
    }
}

/// 以文本格式导出所有指标
pub fn gather_text() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    Ok(encoder.encode_to_string(&prometheus::gather())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_is_exported() {
        observe_query(QueryKind::Similar, 0.01, Some(0.8));
        let text = gather_text().unwrap();
        assert!(text.contains("clip_search_query_count"));
        assert!(text.contains(r#"kind="similar""#));
    }
}
