use anyhow::Result;
use candle_core::{DType, Device, Tensor};
use image::DynamicImage;
use image::imageops::FilterType;

/// CLIP 训练时使用的 RGB 均值
const CLIP_MEAN: [f32; 3] = [0.481_454_66, 0.457_827_5, 0.408_210_73];
/// CLIP 训练时使用的 RGB 标准差
const CLIP_STD: [f32; 3] = [0.268_629_54, 0.261_302_58, 0.275_777_11];

/// 将图片转换为模型输入
#[derive(Debug, Clone)]
pub struct ImageProcessor {
    size: u32,
}

impl ImageProcessor {
    pub fn new(size: usize) -> Self {
        Self { size: size as u32 }
    }

    pub fn size(&self) -> usize {
        self.size as usize
    }

    /// 短边缩放到目标尺寸后居中裁剪，返回形状为 `(3, size, size)` 的张量
    pub fn preprocess(&self, image: &DynamicImage) -> Result<Tensor> {
        let size = self.size as usize;
        let img = image.resize_to_fill(self.size, self.size, FilterType::CatmullRom).to_rgb8();

        let mean = Tensor::new(CLIP_MEAN.as_slice(), &Device::Cpu)?.reshape((3, 1, 1))?;
        let std = Tensor::new(CLIP_STD.as_slice(), &Device::Cpu)?.reshape((3, 1, 1))?;

        let tensor = Tensor::from_vec(img.into_raw(), (size, size, 3), &Device::Cpu)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1. / 255., 0.)?
            .broadcast_sub(&mean)?
            .broadcast_div(&std)?;
        Ok(tensor)
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    #[test]
    fn output_shape_ignores_aspect_ratio() -> Result<()> {
        let processor = ImageProcessor::new(224);
        for (w, h) in [(640, 480), (100, 900), (224, 224), (7, 5)] {
            let image = DynamicImage::ImageRgb8(RgbImage::new(w, h));
            let tensor = processor.preprocess(&image)?;
            assert_eq!(tensor.dims(), &[3, 224, 224]);
        }
        Ok(())
    }

    #[test]
    fn normalized_with_clip_statistics() -> Result<()> {
        let processor = ImageProcessor::new(4);
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(8, 8, Rgb([255, 0, 128])));
        let tensor = processor.preprocess(&image)?;

        let values = tensor.flatten_all()?.to_vec1::<f32>()?;
        let red = (1.0 - CLIP_MEAN[0]) / CLIP_STD[0];
        let green = (0.0 - CLIP_MEAN[1]) / CLIP_STD[1];
        assert!((values[0] - red).abs() < 1e-4);
        assert!((values[16] - green).abs() < 1e-4);
        Ok(())
    }
}
