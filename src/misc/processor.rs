use anyhow::Result;
use fast_image_resize::{images::Image, pixels::PixelType, FilterType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, GenericImageView, RgbImage};
use ndarray::{Array, IxDyn};

use crate::{DType, LisaError, Options, X};

/// Both model inputs for one decoded image.
#[derive(Debug, Clone)]
pub struct PreprocessedImages {
    /// `[1, 3, clip_size, clip_size]` for the vision-language encoder.
    pub clip: X,
    /// `[1, 3, image_size, image_size]` for the mask-decoder backbone.
    pub backbone: X,
    /// `(h, w)` of the backbone image after the longest-side resize, before padding.
    pub resize_shape: (usize, usize),
    /// `(h, w)` of the decoded image.
    pub original_shape: (usize, usize),
    pub dtype: DType,
}

#[derive(aksr::Builder, Clone, Debug)]
pub struct Processor {
    image_size: u32,
    clip_size: u32,
    clip_mean: Vec<f32>,
    clip_std: Vec<f32>,
    pixel_mean: Vec<f32>,
    pixel_std: Vec<f32>,
    resize_filter: &'static str,
    dtype: DType,
}

impl Default for Processor {
    fn default() -> Self {
        Self {
            image_size: 1024,
            clip_size: 224,
            clip_mean: vec![0.48145466, 0.4578275, 0.40821073],
            clip_std: vec![0.26862954, 0.26130258, 0.27577711],
            pixel_mean: vec![123.675, 116.28, 103.53],
            pixel_std: vec![58.395, 57.12, 57.375],
            resize_filter: "CatmullRom",
            dtype: DType::default(),
        }
    }
}

impl Processor {
    pub fn new(options: &Options) -> Result<Self> {
        if options.image_size == 0 || options.clip_size == 0 {
            return Err(LisaError::config(format!(
                "Target sizes must be positive: image_size={}, clip_size={}",
                options.image_size, options.clip_size
            ))
            .into());
        }
        Self::build_resizer_filter(options.resize_filter)?;

        Ok(Self {
            image_size: options.image_size,
            clip_size: options.clip_size,
            clip_mean: options.clip_mean.clone(),
            clip_std: options.clip_std.clone(),
            pixel_mean: options.pixel_mean.clone(),
            pixel_std: options.pixel_std.clone(),
            resize_filter: options.resize_filter,
            dtype: options.model_dtype,
        })
    }

    /// Ensures the image is in RGB format.
    pub fn ensure_rgb(&self, image: DynamicImage) -> RgbImage {
        match image {
            DynamicImage::ImageRgb8(x) => x,
            x => x.to_rgb8(),
        }
    }

    pub fn process(&self, image: &DynamicImage) -> Result<PreprocessedImages> {
        let rgb = self.ensure_rgb(image.clone());
        let (w0, h0) = rgb.dimensions();
        let clip = self.process_clip(&rgb)?;
        let (backbone, resize_shape) = self.process_backbone(&rgb)?;
        log::debug!(
            "Preprocessed {}x{}: clip {:?}, backbone {:?} (resized {:?})",
            w0,
            h0,
            clip.dims(),
            backbone.dims(),
            resize_shape
        );

        Ok(PreprocessedImages {
            clip,
            backbone,
            resize_shape,
            original_shape: (h0 as usize, w0 as usize),
            dtype: self.dtype,
        })
    }

    /// Shortest edge to `clip_size`, center crop, rescale, CLIP statistics, NCHW.
    pub fn process_clip(&self, rgb: &RgbImage) -> Result<X> {
        let (w0, h0) = rgb.dimensions();
        let size = self.clip_size;
        let (w, h) = if w0 <= h0 {
            (size, ((size as u64 * h0 as u64) / w0.max(1) as u64) as u32)
        } else {
            (((size as u64 * w0 as u64) / h0.max(1) as u64) as u32, size)
        };
        let resized = self.resize_exact(rgb, w.max(size), h.max(size))?;
        let (left, top) = ((resized.width() - size) / 2, (resized.height() - size) / 2);
        let cropped = resized.view(left, top, size, size).to_image();

        let x = Self::hwc_to_tensor(&cropped)?
            .normalize(0., 255.)?
            .standardize(&self.clip_mean, &self.clip_std, 3)?
            .nhwc2nchw()?;
        Ok(x)
    }

    /// Longest edge to `image_size`, SAM statistics, NCHW, zero-pad bottom/right.
    pub fn process_backbone(&self, rgb: &RgbImage) -> Result<(X, (usize, usize))> {
        let (w0, h0) = rgb.dimensions();
        let (h, w) = Self::longest_side_shape(h0, w0, self.image_size);
        let target = self.image_size;
        if h > target || w > target || h == 0 || w == 0 {
            return Err(LisaError::config(format!(
                "Backbone target {} cannot hold a {}x{} resize of a {}x{} image",
                target, w, h, w0, h0
            ))
            .into());
        }
        let resized = self.resize_exact(rgb, w, h)?;

        let x = Self::hwc_to_tensor(&resized)?
            .standardize(&self.pixel_mean, &self.pixel_std, 3)?
            .nhwc2nchw()?
            .pad_bottom_right(target as usize, target as usize)?;
        Ok((x, (h as usize, w as usize)))
    }

    /// `(h, w)` with the longer edge scaled to `long_side`, rounding half up.
    pub fn longest_side_shape(h: u32, w: u32, long_side: u32) -> (u32, u32) {
        let scale = long_side as f64 / h.max(w).max(1) as f64;
        let h = (h as f64 * scale + 0.5).floor() as u32;
        let w = (w as f64 * scale + 0.5).floor() as u32;
        (h, w)
    }

    pub fn build_resizer_filter(ty: &str) -> Result<(Resizer, ResizeOptions)> {
        let ty = match ty.to_lowercase().as_str() {
            "box" => FilterType::Box,
            "bilinear" => FilterType::Bilinear,
            "hamming" => FilterType::Hamming,
            "catmullrom" | "bicubic" => FilterType::CatmullRom,
            "mitchell" => FilterType::Mitchell,
            "gaussian" => FilterType::Gaussian,
            "lanczos3" => FilterType::Lanczos3,
            x => {
                return Err(LisaError::config(format!("Unsupported resizer's filter type: {}", x)).into())
            }
        };
        Ok((
            Resizer::new(),
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(ty)),
        ))
    }

    fn resize_exact(&self, rgb: &RgbImage, w: u32, h: u32) -> Result<RgbImage> {
        if rgb.dimensions() == (w, h) {
            return Ok(rgb.clone());
        }
        let src = DynamicImage::ImageRgb8(rgb.clone());
        let mut dst = Image::new(w, h, PixelType::U8x3);
        let (mut resizer, options) = Self::build_resizer_filter(self.resize_filter)?;
        resizer.resize(&src, &mut dst, &options)?;
        RgbImage::from_raw(w, h, dst.into_vec())
            .ok_or_else(|| anyhow::anyhow!("Failed to create RgbImage from resized buffer"))
    }

    fn hwc_to_tensor(rgb: &RgbImage) -> Result<X> {
        let (w, h) = rgb.dimensions();
        let x = Array::from_shape_vec(
            IxDyn(&[1, h as usize, w as usize, 3]),
            rgb.as_raw().iter().map(|&v| v as f32).collect(),
        )
        .map_err(|e| anyhow::anyhow!("Failed to create array from buffer: {}", e))?;
        Ok(X(x))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(w: u32, h: u32, px: [u8; 3]) -> RgbImage {
        RgbImage::from_pixel(w, h, image::Rgb(px))
    }

    fn processor(size: u32) -> Processor {
        Processor::default().with_image_size(size)
    }

    #[test]
    fn longest_side_rounding() {
        assert_eq!(Processor::longest_side_shape(720, 1280, 1024), (576, 1024));
        assert_eq!(Processor::longest_side_shape(100, 100, 1024), (1024, 1024));
        // 333 * (64 / 1000) = 21.312
        assert_eq!(Processor::longest_side_shape(333, 1000, 64), (21, 64));
    }

    #[test]
    fn backbone_is_exact_square_with_zero_padding() {
        let p = processor(64);
        let img = solid(100, 50, [255, 255, 255]);
        let (x, (h, w)) = p.process_backbone(&img).unwrap();
        assert_eq!(x.dims(), &[1, 3, 64, 64]);
        assert_eq!((h, w), (32, 64));

        let expected_r = (255.0 - 123.675) / 58.395;
        assert!((x.0[[0, 0, 0, 0]] - expected_r).abs() < 0.05);
        assert!((x.0[[0, 0, 31, 63]] - expected_r).abs() < 0.05);
        // everything below the resized content is padding
        for c in 0..3 {
            for y in 32..64 {
                for xx in 0..64 {
                    assert_eq!(x.0[[0, c, y, xx]], 0.0);
                }
            }
        }
    }

    #[test]
    fn backbone_portrait_pads_right() {
        let p = processor(32);
        let img = solid(10, 40, [0, 0, 0]);
        let (x, (h, w)) = p.process_backbone(&img).unwrap();
        assert_eq!((h, w), (32, 8));
        assert_eq!(x.0[[0, 1, 5, 20]], 0.0);
        assert!(x.0[[0, 1, 5, 3]] < 0.0);
    }

    #[test]
    fn clip_shape_and_statistics() {
        let p = Processor::default().with_clip_size(16);
        let img = solid(40, 20, [255, 0, 0]);
        let x = p.process_clip(&img).unwrap();
        assert_eq!(x.dims(), &[1, 3, 16, 16]);
        let r = (1.0 - 0.48145466) / 0.26862954;
        let g = (0.0 - 0.4578275) / 0.26130258;
        assert!((x.0[[0, 0, 8, 8]] - r).abs() < 0.05);
        assert!((x.0[[0, 1, 8, 8]] - g).abs() < 0.05);
    }

    #[test]
    fn process_records_shapes() {
        let p = processor(64).with_clip_size(16).with_dtype(DType::Fp16);
        let img = DynamicImage::ImageRgb8(solid(30, 60, [10, 20, 30]));
        let out = p.process(&img).unwrap();
        assert_eq!(out.original_shape, (60, 30));
        assert_eq!(out.resize_shape, (64, 32));
        assert_eq!(out.backbone.dims(), &[1, 3, 64, 64]);
        assert_eq!(out.clip.dims(), &[1, 3, 16, 16]);
        assert_eq!(out.dtype, DType::Fp16);
    }

    #[test]
    fn unknown_filter_is_configuration_error() {
        let err = Processor::build_resizer_filter("sinc").err().unwrap();
        let err = err.downcast_ref::<LisaError>().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn both_paths_resize_bicubic() {
        assert_eq!(Processor::default().resize_filter, "CatmullRom");
        assert_eq!(Options::default().resize_filter, "CatmullRom");
        assert!(Processor::build_resizer_filter("bicubic").is_ok());
        let mut options = Options::default();
        options.resize_filter = "bicubic";
        assert!(Processor::new(&options).is_ok());
    }

    #[test]
    fn zero_target_is_rejected() {
        let options = Options::default().with_image_size(0);
        assert!(Processor::new(&options).is_err());
    }
}
