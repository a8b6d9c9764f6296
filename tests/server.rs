use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use assert_fs::TempDir;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, Response, StatusCode, header};
use clipsearch::ClipDB;
use clipsearch::clip::{Embedder, l2_normalize};
use clipsearch::config::DataPaths;
use clipsearch::db::{NewImage, crud};
use clipsearch::server::{AppState, create_app};
use image::{DynamicImage, Rgb, RgbImage};
use serde_json::Value;
use tower::ServiceExt;

/// 用图片平均颜色作为向量，文本按颜色名映射
struct ColorEmbedder;

impl Embedder for ColorEmbedder {
    fn dimensions(&self) -> usize {
        3
    }

    fn embed_image(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let rgb = image.to_rgb8();
        let mut sum = [0f32; 3];
        for pixel in rgb.pixels() {
            for (s, c) in sum.iter_mut().zip(pixel.0) {
                *s += c as f32;
            }
        }
        Ok(l2_normalize(&sum))
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let v = match text {
            "red" => [1.0, 0.0, 0.0],
            "green" => [0.0, 1.0, 0.0],
            _ => [0.0, 0.0, 1.0],
        };
        Ok(v.to_vec())
    }
}

struct TestApp {
    data_dir: TempDir,
    image_dir: TempDir,
    app: Router,
    state: Arc<AppState>,
    /// red、green、blue 三张图片的 ID
    ids: Vec<i64>,
}

impl TestApp {
    async fn get(&self, uri: &str) -> Result<Response<Body>> {
        let request = Request::builder().uri(uri).body(Body::empty())?;
        Ok(self.app.clone().oneshot(request).await?)
    }
}

async fn body_string(response: Response<Body>) -> Result<String> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(String::from_utf8(bytes.to_vec())?)
}

fn png_bytes(image: RgbImage) -> Result<Vec<u8>> {
    let mut buffer = std::io::Cursor::new(vec![]);
    image.write_to(&mut buffer, image::ImageFormat::Png)?;
    Ok(buffer.into_inner())
}

async fn open_db(data_dir: &Path) -> Result<ClipDB> {
    let paths = DataPaths {
        database: data_dir.join("images.db"),
        filelist_cache: data_dir.join("filelist_cache.bin"),
        vector_index: data_dir.join("vectors").join("images.usearch"),
    };
    ClipDB::open(&paths, 3).await
}

/// `populate` 为 false 时数据库为空
async fn test_app(populate: bool) -> Result<TestApp> {
    let data_dir = TempDir::new()?;
    let image_dir = TempDir::new()?;
    let db = open_db(data_dir.path()).await?;
    let embedder = Arc::new(ColorEmbedder);

    let mut ids = vec![];
    if populate {
        for (name, color) in [("red", [255, 0, 0]), ("green", [0, 255, 0]), ("blue", [0, 0, 255])] {
            let path = format!("{name}.png");
            let full = image_dir.path().join(&path);
            RgbImage::from_pixel(8, 8, Rgb(color)).save(&full)?;

            let image = NewImage {
                filename: path.clone(),
                path,
                modified: 0,
                checksum: blake3::hash(name.as_bytes()).as_bytes().to_vec(),
            };
            let id = crud::add_image(db.db(), &image).await?.expect("新图片");
            crud::set_embedding(db.db(), id, &embedder.embed_image_path(&full)?).await?;
            ids.push(id);
        }
        db.load_vectors(false).await?;
    }

    let state = AppState::new(db, embedder, image_dir.path().to_path_buf(), 2);
    Ok(TestApp { data_dir, image_dir, app: create_app(state.clone()), state, ids })
}

#[tokio::test]
async fn random_on_empty_store_is_404() -> Result<()> {
    let app = test_app(false).await?;
    let response = app.get("/random").await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await?, "No images found");
    Ok(())
}

#[tokio::test]
async fn random_redirects_to_image_page() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/random").await?;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let location = response.headers()[header::LOCATION].to_str()?;
    assert!(location.starts_with("/image/"));
    Ok(())
}

#[tokio::test]
async fn index_shows_images() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await?;
    // 每页显示两张
    assert_eq!(html.matches("<figure>").count(), 2);
    Ok(())
}

#[tokio::test]
async fn text_query_renders_result_links() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/text-query?text=red").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await?;
    assert!(html.contains(&format!(r#"href="/image/{}""#, app.ids[0])));
    assert!(html.contains("/img/red.png"));
    Ok(())
}

#[tokio::test]
async fn empty_text_query_redirects_home() -> Result<()> {
    let app = test_app(true).await?;
    for uri in ["/text-query", "/text-query?text=", "/text-query?text=%20"] {
        let response = app.get(uri).await?;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/");
    }
    Ok(())
}

#[tokio::test]
async fn image_page_excludes_itself() -> Result<()> {
    let app = test_app(true).await?;
    let red = app.ids[0];
    let response = app.get(&format!("/image/{red}")).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await?;
    assert!(!html.contains(&format!(r#"href="/image/{red}""#)));
    assert!(html.contains(&format!(r#"href="/image/{}""#, app.ids[1])));
    assert!(html.contains(&format!(r#"href="/image/{}""#, app.ids[2])));
    Ok(())
}

#[tokio::test]
async fn unknown_or_missing_image_is_404() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/image/9999").await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_string(response).await?, "Image not found");

    // 记录存在但文件已被删除
    std::fs::remove_file(app.image_dir.path().join("green.png"))?;
    let response = app.get(&format!("/image/{}", app.ids[1])).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn serve_small_image_as_is() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/img/red.png").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    assert_eq!(bytes.as_ref(), std::fs::read(app.image_dir.path().join("red.png"))?);
    Ok(())
}

#[tokio::test]
async fn serve_large_image_as_half_size_jpeg() -> Result<()> {
    let app = test_app(true).await?;

    // 随机噪声，保证 PNG 文件超过 1M
    let mut state = 0x2545_f491_u32;
    let noise = RgbImage::from_fn(800, 600, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        };
        Rgb([next(), next(), next()])
    });
    let bytes = png_bytes(noise)?;
    assert!(bytes.len() > 1024 * 1024);
    std::fs::write(app.image_dir.path().join("noise.png"), bytes)?;

    let response = app.get("/img/noise.png").await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/jpeg");
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let image = image::load_from_memory(&bytes)?;
    assert_eq!((image.width(), image.height()), (400, 300));
    Ok(())
}

#[tokio::test]
async fn image_path_traversal_is_404() -> Result<()> {
    let app = test_app(true).await?;
    std::fs::write(app.data_dir.path().join("secret.png"), b"secret")?;

    for uri in ["/img/../secret.png", "/img/%2e%2e/secret.png", "/img/nested/../../secret.png"] {
        let response = app.get(uri).await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{uri}");
    }
    assert_eq!(app.get("/img/missing.png").await?.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn api_text_search() -> Result<()> {
    let app = test_app(true).await?;
    let response = app.get("/api/search?text=green&count=1").await?;
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await?)?;
    let result = json["result"].as_array().expect("result 应为数组");
    assert_eq!(result.len(), 1);
    assert_eq!(result[0]["path"], "green.png");
    assert!(result[0]["score"].as_f64().unwrap() > 0.99);

    assert_eq!(app.get("/api/search").await?.status(), StatusCode::BAD_REQUEST);

    // 查询之后指标中应有记录
    let metrics = body_string(app.get("/metrics").await?).await?;
    assert!(metrics.contains(r#"clip_search_query_count{kind="text"}"#));
    Ok(())
}

#[tokio::test]
async fn api_count_is_bounded() -> Result<()> {
    let app = test_app(true).await?;

    let response = app.get(&format!("/api/search?text=red&count={}", usize::MAX)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let json: Value = serde_json::from_str(&body_string(response).await?)?;
    assert_eq!(json["result"].as_array().map(Vec::len), Some(3));

    // 0 视为未指定，使用默认的 2 条
    let response = app.get("/api/search?text=red&count=0").await?;
    let json: Value = serde_json::from_str(&body_string(response).await?)?;
    assert_eq!(json["result"].as_array().map(Vec::len), Some(2));

    let response = app.get(&format!("/text-query?text=red&count={}", usize::MAX)).await?;
    assert_eq!(response.status(), StatusCode::OK);
    Ok(())
}

#[tokio::test]
async fn legacy_absolute_path_is_served() -> Result<()> {
    let app = test_app(true).await?;

    let full = app.image_dir.path().join("legacy.png");
    RgbImage::from_pixel(8, 8, Rgb([250, 10, 10])).save(&full)?;
    let image = NewImage {
        filename: "legacy.png".to_string(),
        path: full.to_string_lossy().into_owned(),
        modified: 0,
        checksum: blake3::hash(b"legacy").as_bytes().to_vec(),
    };
    let db = &app.state.db;
    let id = crud::add_image(db.db(), &image).await?.expect("新图片");
    crud::set_embedding(db.db(), id, &ColorEmbedder.embed_image_path(&full)?).await?;
    db.load_vectors(false).await?;

    let html = body_string(app.get(&format!("/image/{id}")).await?).await?;
    assert!(html.contains(r#"src="/img/legacy.png""#));
    assert_eq!(app.get("/img/legacy.png").await?.status(), StatusCode::OK);

    // 与它最接近的 red 页面中也使用相对路径
    let html = body_string(app.get(&format!("/image/{}", app.ids[0])).await?).await?;
    assert!(html.contains(r#"src="/img/legacy.png""#));
    assert!(!html.contains(&*full.to_string_lossy()));

    // 图片目录之外的绝对路径无法访问
    let outside = app.data_dir.path().join("outside.png");
    RgbImage::from_pixel(8, 8, Rgb([0, 0, 0])).save(&outside)?;
    let image = NewImage {
        filename: "outside.png".to_string(),
        path: outside.to_string_lossy().into_owned(),
        modified: 0,
        checksum: blake3::hash(b"outside").as_bytes().to_vec(),
    };
    let id = crud::add_image(db.db(), &image).await?.expect("新图片");
    assert_eq!(app.get(&format!("/image/{id}")).await?.status(), StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn api_image_search() -> Result<()> {
    let app = test_app(true).await?;

    let boundary = "clipsearch-boundary";
    let mut body = format!(
        "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"q.png\"\r\nContent-Type: image/png\r\n\r\n"
    )
    .into_bytes();
    body.extend(png_bytes(RgbImage::from_pixel(4, 4, Rgb([0, 0, 200])))?);
    body.extend(format!("\r\n--{boundary}--\r\n").into_bytes());

    let request = Request::builder()
        .method("POST")
        .uri("/api/search")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={boundary}"))
        .body(Body::from(body))?;
    let response = app.app.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let json: Value = serde_json::from_str(&body_string(response).await?)?;
    let result = json["result"].as_array().expect("result 应为数组");
    assert_eq!(result.len(), 2);
    assert_eq!(result[0]["path"], "blue.png");
    Ok(())
}
