use anyhow::Result;
use ndarray::{Array, Array1, Array2, ArrayViewD, Axis, Ix3, IxDyn};
use ort::value::{DynValue, Tensor};

use crate::{
    seg_token_id, DType, LisaError, Model, Options, PredMask, Prediction, PreprocessedImages,
    TokenizerTrait, X,
};

pub const INPUT_IMAGES_CLIP: &str = "images_clip";
pub const INPUT_IMAGES: &str = "images";
pub const INPUT_IDS: &str = "input_ids";
pub const INPUT_RESIZE_LIST: &str = "resize_list";
pub const INPUT_ORIGINAL_SIZE_LIST: &str = "original_size_list";
pub const INPUT_MAX_NEW_TOKENS: &str = "max_new_tokens";
pub const OUTPUT_IDS: &str = "output_ids";
pub const OUTPUT_PRED_MASKS: &str = "pred_masks";

/// Everything one model call consumes for a single-image batch.
#[derive(Debug, Clone)]
pub struct LisaInputs<'a> {
    pub images_clip: &'a X,
    pub images: &'a X,
    /// `[1, L]`, image placeholders already resolved to `IMAGE_TOKEN_INDEX`.
    pub input_ids: Array2<i64>,
    pub resize_list: Vec<(usize, usize)>,
    pub original_size_list: Vec<(usize, usize)>,
    pub max_new_tokens: u64,
    pub dtype: DType,
}

impl<'a> LisaInputs<'a> {
    pub fn new(images: &'a PreprocessedImages, input_ids: Vec<i64>, max_new_tokens: u64) -> Self {
        Self {
            images_clip: &images.clip,
            images: &images.backbone,
            input_ids: Array1::from_vec(input_ids).insert_axis(Axis(0)),
            resize_list: vec![images.resize_shape],
            original_size_list: vec![images.original_shape],
            max_new_tokens,
            dtype: images.dtype,
        }
    }
}

/// The reasoning-segmentation model as seen by the pipeline.
pub trait Segmenter {
    /// Called once before every sample so peak device memory does not depend
    /// on earlier samples.
    fn release_cache(&mut self) -> Result<()> {
        Ok(())
    }

    /// Returns the generated ids and the positional mask list. Any error is fatal to the run.
    fn evaluate(&mut self, inputs: &LisaInputs<'_>) -> Result<Prediction>;
}

impl<S: Segmenter + ?Sized> Segmenter for Box<S> {
    fn release_cache(&mut self) -> Result<()> {
        (**self).release_cache()
    }

    fn evaluate(&mut self, inputs: &LisaInputs<'_>) -> Result<Prediction> {
        (**self).evaluate(inputs)
    }
}

/// LISA exported to a single ONNX graph (vision tower, LLM generate loop and
/// SAM decoder), run through ONNX Runtime.
#[derive(Debug)]
pub struct Lisa {
    model: Model,
    dtype: DType,
    seg_token_idx: u32,
    spec: String,
}

impl Lisa {
    pub fn new(options: &Options, tokenizer: &dyn TokenizerTrait) -> Result<Self> {
        let model = Model::new(&options.model_file, options.model_device)?;
        model.summary();
        for name in [
            INPUT_IMAGES_CLIP,
            INPUT_IMAGES,
            INPUT_IDS,
            INPUT_RESIZE_LIST,
            INPUT_ORIGINAL_SIZE_LIST,
        ] {
            if !model.has_input(name) {
                anyhow::bail!(LisaError::collaborator(format!(
                    "{} has no `{}` input",
                    options.model_file, name
                )));
            }
        }
        for name in [OUTPUT_IDS, OUTPUT_PRED_MASKS] {
            if !model.has_output(name) {
                anyhow::bail!(LisaError::collaborator(format!(
                    "{} has no `{}` output",
                    options.model_file, name
                )));
            }
        }
        let seg_token_idx = seg_token_id(tokenizer)?;
        let spec = format!("{}/{}", options.model_stem()?, options.model_file_name());
        log::info!("Loaded {} ([SEG] = {})", spec, seg_token_idx);
        if options.quantization.is_quantized() {
            log::info!(
                "{} weights, tensors stay in {}",
                options.quantization,
                options.model_dtype
            );
        }

        let mut lisa = Self {
            model,
            dtype: options.model_dtype,
            seg_token_idx,
            spec,
        };
        lisa.dry_run(options)?;
        Ok(lisa)
    }

    fn dry_run(&mut self, options: &Options) -> Result<()> {
        if options.model_num_dry_run == 0 {
            return Ok(());
        }
        let s = options.image_size as usize;
        let c = options.clip_size as usize;
        let images = PreprocessedImages {
            clip: X::zeros(&[1, 3, c, c]),
            backbone: X::zeros(&[1, 3, s, s]),
            resize_shape: (s, s),
            original_shape: (s, s),
            dtype: self.dtype,
        };
        let inputs = LisaInputs::new(&images, vec![1], 1);
        for _ in 0..options.model_num_dry_run {
            self.evaluate(&inputs)?;
        }
        log::debug!("Dry runs done: {}", options.model_num_dry_run);
        Ok(())
    }

    fn shape_list(xs: &[(usize, usize)]) -> Result<DynValue> {
        let flat: Vec<i64> = xs.iter().flat_map(|&(h, w)| [h as i64, w as i64]).collect();
        let x = Array2::from_shape_vec((xs.len(), 2), flat)?;
        Ok(Tensor::from_array(x)?.into_dyn())
    }

    fn extract_masks(value: &DynValue) -> Result<Vec<PredMask>> {
        let x: Array<f32, IxDyn> = if let Ok(x) = value.try_extract_tensor::<f32>() {
            x.to_owned()
        } else if let Ok(x) = value.try_extract_tensor::<half::f16>() {
            x.mapv(|v| v.to_f32())
        } else {
            let x: ArrayViewD<'_, half::bf16> =
                value.try_extract_tensor::<half::bf16>().map_err(|e| {
                    LisaError::collaborator(format!(
                        "Unsupported `{}` dtype: {}",
                        OUTPUT_PRED_MASKS, e
                    ))
                })?;
            x.mapv(|v| v.to_f32())
        };

        match x.ndim() {
            3 => Ok(vec![PredMask(x.into_dimensionality::<Ix3>()?)]),
            4 => x
                .axis_iter(Axis(0))
                .map(|m| -> Result<PredMask> {
                    Ok(PredMask(m.to_owned().into_dimensionality::<Ix3>()?))
                })
                .collect(),
            _ => Err(LisaError::Shape(format!(
                "`{}` must be [N, H, W] or [B, N, H, W], got {:?}",
                OUTPUT_PRED_MASKS,
                x.shape()
            ))
            .into()),
        }
    }
}

impl Segmenter for Lisa {
    fn release_cache(&mut self) -> Result<()> {
        self.model.release_cache();
        Ok(())
    }

    fn evaluate(&mut self, inputs: &LisaInputs<'_>) -> Result<Prediction> {
        let dtype = self.dtype;
        if inputs.dtype != dtype {
            log::warn!(
                "Inputs prepared as {} but the model computes in {}; converting",
                inputs.dtype,
                dtype
            );
        }
        let mut xs: Vec<(&str, DynValue)> = vec![
            (INPUT_IMAGES_CLIP, inputs.images_clip.to_value(dtype)?),
            (INPUT_IMAGES, inputs.images.to_value(dtype)?),
            (INPUT_IDS, Tensor::from_array(inputs.input_ids.clone())?.into_dyn()),
            (INPUT_RESIZE_LIST, Self::shape_list(&inputs.resize_list)?),
            (
                INPUT_ORIGINAL_SIZE_LIST,
                Self::shape_list(&inputs.original_size_list)?,
            ),
        ];
        if self.model.has_input(INPUT_MAX_NEW_TOKENS) {
            xs.push((
                INPUT_MAX_NEW_TOKENS,
                Tensor::from_array(Array1::from_vec(vec![inputs.max_new_tokens as i64]))?
                    .into_dyn(),
            ));
        }

        let ys = self.model.run(xs)?;
        let output_ids = ys
            .get(OUTPUT_IDS)
            .ok_or_else(|| LisaError::collaborator(format!("Missing `{}` output", OUTPUT_IDS)))?
            .try_extract_tensor::<i64>()
            .map_err(|e| LisaError::collaborator(format!("Bad `{}`: {}", OUTPUT_IDS, e)))?;
        let token_ids: Vec<i64> = match output_ids.ndim() {
            0 | 1 => output_ids.iter().copied().collect(),
            _ => output_ids.index_axis(Axis(0), 0).iter().copied().collect(),
        };
        let masks = Self::extract_masks(ys.get(OUTPUT_PRED_MASKS).ok_or_else(|| {
            LisaError::collaborator(format!("Missing `{}` output", OUTPUT_PRED_MASKS))
        })?)?;

        let n_seg = token_ids
            .iter()
            .filter(|&&id| id == self.seg_token_idx as i64)
            .count();
        log::debug!(
            "{}: {} tokens, {} [SEG], masks {:?}",
            self.spec,
            token_ids.len(),
            n_seg,
            masks.iter().map(|m| m.0.shape().to_vec()).collect::<Vec<_>>()
        );

        Ok(Prediction::new(token_ids, masks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn inputs_carry_single_sample_metadata() {
        let images = PreprocessedImages {
            clip: X::zeros(&[1, 3, 4, 4]),
            backbone: X::zeros(&[1, 3, 8, 8]),
            resize_shape: (4, 8),
            original_shape: (40, 80),
            dtype: DType::Bf16,
        };
        let inputs = LisaInputs::new(&images, vec![1, -200, 5], 512);
        assert_eq!(inputs.input_ids.dim(), (1, 3));
        assert_eq!(inputs.resize_list, vec![(4, 8)]);
        assert_eq!(inputs.original_size_list, vec![(40, 80)]);
        assert_eq!(inputs.max_new_tokens, 512);
        assert_eq!(inputs.dtype, DType::Bf16);
    }

    #[test]
    fn boxed_segmenter_delegates() {
        struct Fixed;
        impl Segmenter for Fixed {
            fn evaluate(&mut self, _: &LisaInputs<'_>) -> Result<Prediction> {
                Ok(Prediction::new(vec![7], vec![PredMask(Array3::zeros((0, 1, 1)))]))
            }
        }
        let images = PreprocessedImages {
            clip: X::zeros(&[1]),
            backbone: X::zeros(&[1]),
            resize_shape: (1, 1),
            original_shape: (1, 1),
            dtype: DType::Fp32,
        };
        let mut s: Box<dyn Segmenter> = Box::new(Fixed);
        s.release_cache().unwrap();
        let y = s.evaluate(&LisaInputs::new(&images, vec![], 1)).unwrap();
        assert_eq!(y.token_ids, vec![7]);
        assert_eq!(y.num_empty(), 1);
    }
}
