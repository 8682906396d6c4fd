use anyhow::Result;
use image::{GrayImage, Luma, Rgb, RgbImage};
use ndarray::{Array3, ArrayView2, Axis};

use crate::LisaError;

pub const HIGHLIGHT: [u8; 3] = [255, 0, 0];

/// One entry of the model's mask list: `[rows, H, W]` logits at the original
/// image resolution. `rows == 0` means nothing was detected.
#[derive(Debug, Clone, PartialEq)]
pub struct PredMask(pub Array3<f32>);

impl From<Array3<f32>> for PredMask {
    fn from(x: Array3<f32>) -> Self {
        Self(x)
    }
}

impl PredMask {
    pub fn rows(&self) -> usize {
        self.0.len_of(Axis(0))
    }

    pub fn is_empty(&self) -> bool {
        self.rows() == 0 || self.0.is_empty()
    }

    /// The first row, where the model puts the mask for its first `[SEG]` token.
    pub fn logits(&self) -> Option<ArrayView2<'_, f32>> {
        if self.is_empty() {
            None
        } else {
            Some(self.0.index_axis(Axis(0), 0))
        }
    }
}

/// Thresholded mask rendered as 8-bit gray, `value > 0` -> 255, else 0.
pub fn binarize(logits: ArrayView2<'_, f32>) -> GrayImage {
    let (h, w) = logits.dim();
    GrayImage::from_fn(w as u32, h as u32, |x, y| {
        if logits[[y as usize, x as usize]] > 0.0 {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Copy of `image` with every masked pixel blended 50/50 with [`HIGHLIGHT`].
pub fn overlay(image: &RgbImage, mask: &GrayImage) -> Result<RgbImage> {
    if image.dimensions() != mask.dimensions() {
        return Err(LisaError::collaborator(format!(
            "Mask is {:?} but the image is {:?}",
            mask.dimensions(),
            image.dimensions()
        ))
        .into());
    }
    let mut out = image.clone();
    for (p, m) in out.pixels_mut().zip(mask.pixels()) {
        if m.0[0] > 0 {
            let Rgb([r, g, b]) = *p;
            *p = Rgb([blend(r, HIGHLIGHT[0]), blend(g, HIGHLIGHT[1]), blend(b, HIGHLIGHT[2])]);
        }
    }
    Ok(out)
}

#[inline]
fn blend(a: u8, b: u8) -> u8 {
    (a as f32 * 0.5 + b as f32 * 0.5) as u8
}

/// Both rasters for one non-empty mask.
#[derive(Debug, Clone)]
pub struct RenderedMask {
    pub index: usize,
    pub mask: GrayImage,
    pub overlay: RgbImage,
}

impl RenderedMask {
    pub fn render(index: usize, pred: &PredMask, image: &RgbImage) -> Result<Option<Self>> {
        let Some(logits) = pred.logits() else {
            return Ok(None);
        };
        let mask = binarize(logits);
        let overlay = overlay(image, &mask)?;
        Ok(Some(Self {
            index,
            mask,
            overlay,
        }))
    }

    pub fn pixel_count(&self) -> usize {
        self.mask.pixels().filter(|p| p.0[0] > 0).count()
    }
}
