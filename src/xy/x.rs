use anyhow::Result;
use ndarray::{Array, Axis, IxDyn};
use ort::value::{DynValue, Tensor};

use crate::DType;

/// Model input/output tensor, always held as `f32` on the host.
#[derive(Clone, PartialEq, Debug)]
pub struct X(pub Array<f32, IxDyn>);

impl From<Array<f32, IxDyn>> for X {
    fn from(x: Array<f32, IxDyn>) -> Self {
        Self(x)
    }
}

impl std::ops::Deref for X {
    type Target = Array<f32, IxDyn>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl X {
    pub fn zeros(shape: &[usize]) -> Self {
        Self(Array::zeros(IxDyn(shape)))
    }

    pub fn dims(&self) -> &[usize] {
        self.0.shape()
    }

    /// Min-max scales every value from `[min, max]` to `[0, 1]`.
    pub fn normalize(mut self, min: f32, max: f32) -> Result<Self> {
        if min >= max {
            anyhow::bail!(
                "Invalid range in `normalize`: `min` ({}) must be less than `max` ({}).",
                min,
                max
            );
        }
        let range = max - min;
        self.0.par_mapv_inplace(|x| (x - min) / range);
        Ok(self)
    }

    /// `(x - mean[c]) / std[c]` along channel axis `dim`.
    pub fn standardize(mut self, mean: &[f32], std: &[f32], dim: usize) -> Result<Self> {
        let shape = self.0.shape().to_vec();
        if dim >= shape.len() {
            anyhow::bail!("Channel axis {} out of range for shape {:?}", dim, shape);
        }
        let nc = shape[dim];
        if mean.len() != nc || std.len() != nc {
            anyhow::bail!(
                "`standardize` expects {} channel statistics, got mean={} std={}",
                nc,
                mean.len(),
                std.len()
            );
        }
        if std.iter().any(|&s| s == 0.0) {
            anyhow::bail!("`standardize` got a zero standard deviation: {:?}", std);
        }
        for (c, mut lane) in self.0.axis_iter_mut(Axis(dim)).enumerate() {
            let (m, s) = (mean[c], std[c]);
            lane.mapv_inplace(|x| (x - m) / s);
        }
        Ok(self)
    }

    pub fn nhwc2nchw(self) -> Result<Self> {
        if self.0.ndim() != 4 {
            anyhow::bail!("`nhwc2nchw` expects a 4D tensor, got {:?}", self.0.shape());
        }
        let x = self.0.permuted_axes(vec![0, 3, 1, 2]);
        Ok(Self(x.as_standard_layout().into_owned()))
    }

    /// Zero-pads the two trailing (spatial) axes on the bottom/right up to `h x w`.
    pub fn pad_bottom_right(self, h: usize, w: usize) -> Result<Self> {
        let shape = self.0.shape().to_vec();
        let n = shape.len();
        if n < 2 {
            anyhow::bail!("`pad_bottom_right` expects at least 2 axes, got {:?}", shape);
        }
        let (h0, w0) = (shape[n - 2], shape[n - 1]);
        if h0 > h || w0 > w {
            anyhow::bail!(
                "Cannot pad {}x{} into {}x{}: padding would be negative",
                h0,
                w0,
                h,
                w
            );
        }
        let mut dst_shape = shape.clone();
        dst_shape[n - 2] = h;
        dst_shape[n - 1] = w;
        let mut dst = Array::zeros(IxDyn(&dst_shape));
        dst.slice_each_axis_mut(|ax| {
            if ax.axis.index() == n - 2 {
                ndarray::Slice::from(0..h0)
            } else if ax.axis.index() == n - 1 {
                ndarray::Slice::from(0..w0)
            } else {
                ndarray::Slice::from(..)
            }
        })
        .assign(&self.0);
        Ok(Self(dst))
    }

    /// Host-to-runtime conversion in the run-wide precision.
    pub fn to_value(&self, dtype: DType) -> Result<DynValue> {
        let x = self.0.as_standard_layout().into_owned();
        let value = match dtype {
            DType::Fp32 => Tensor::from_array(x)?.into_dyn(),
            DType::Fp16 => Tensor::from_array(x.mapv(half::f16::from_f32))?.into_dyn(),
            DType::Bf16 => Tensor::from_array(x.mapv(half::bf16::from_f32))?.into_dyn(),
        };
        Ok(value)
    }
}
