use std::io::Cursor;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageDecoder, ImageReader};
use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({eta}) {msg}")
        .expect("invalid progress bar template")
        .progress_chars("#>-")
}

/// 读取图片并按照 EXIF 信息旋转
pub fn open_image(path: &Path) -> Result<DynamicImage> {
    let reader = ImageReader::open(path)
        .with_context(|| format!("无法打开图片 {}", path.display()))?
        .with_guessed_format()?;
    read_oriented(reader).with_context(|| format!("无法解码图片 {}", path.display()))
}

/// 从内存中解码图片并按照 EXIF 信息旋转
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    read_oriented(reader).context("无法解码图片")
}

fn read_oriented<R: std::io::BufRead + std::io::Seek>(
    reader: ImageReader<R>,
) -> image::ImageResult<DynamicImage> {
    let mut decoder = reader.into_decoder()?;
    let orientation = decoder.orientation()?;
    let mut image = DynamicImage::from_decoder(decoder)?;
    image.apply_orientation(orientation);
    Ok(image)
}

/// 将图片缩小到原来的一半并编码为 JPEG
pub fn half_size_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let thumbnail = image.thumbnail((image.width() / 2).max(1), (image.height() / 2).max(1));
    let mut buffer = vec![];
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    // JPEG 不支持透明通道
    DynamicImage::ImageRgb8(thumbnail.to_rgb8()).write_with_encoder(encoder)?;
    Ok(buffer)
}

/// 计算文件内容的 blake3 哈希
pub fn hash_file(path: &Path) -> Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(path).with_context(|| format!("无法读取文件 {}", path.display()))?;
    Ok(hasher.finalize())
}

/// 将用户提供的相对路径拼接到根目录下，拒绝 `..`、绝对路径等可能逃出根目录的路径
pub fn join_safe(root: &Path, relative: &str) -> Option<PathBuf> {
    let relative = Path::new(relative);
    if relative.as_os_str().is_empty()
        || !relative.components().all(|c| matches!(c, Component::Normal(_)))
    {
        return None;
    }
    Some(root.join(relative))
}

/// 数据库中保存的路径统一使用 `/` 分隔
pub fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use image::{Rgba, RgbaImage};

    use super::*;

    #[test]
    fn join_safe_rejects_escape() {
        let root = Path::new("/srv/images");
        assert_eq!(join_safe(root, "a/b.jpg"), Some(PathBuf::from("/srv/images/a/b.jpg")));
        assert_eq!(join_safe(root, "../etc/passwd"), None);
        assert_eq!(join_safe(root, "a/../../b.jpg"), None);
        assert_eq!(join_safe(root, "/etc/passwd"), None);
        assert_eq!(join_safe(root, ""), None);
    }

    #[test]
    fn relative_path_strips_root() {
        let root = Path::new("/srv/images");
        assert_eq!(relative_path(root, Path::new("/srv/images/2020/a.jpg")), "2020/a.jpg");
        assert_eq!(relative_path(root, Path::new("other/b.jpg")), "other/b.jpg");
    }

    #[test]
    fn half_size_jpeg_from_rgba() -> Result<()> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(64, 32, Rgba([10, 20, 30, 128])));
        let bytes = half_size_jpeg(&image, 85)?;
        let decoded = decode_image(&bytes)?;
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        Ok(())
    }

    #[test]
    fn hash_matches_content() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("a.bin");
        std::fs::write(&path, b"hello")?;
        assert_eq!(hash_file(&path)?, blake3::hash(b"hello"));
        Ok(())
    }
}
