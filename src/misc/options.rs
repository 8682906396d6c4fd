use aksr::Builder;
use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::{
    ConvType, ConversationBuilder, DType, Device, HfTokenizer, LisaError, Processor, Quantization,
    TokenizerTrait,
};

/// Run configuration. Fixed for the whole run once committed.
#[derive(Builder, Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Options {
    // Model configs
    pub model_version: String,
    pub model_dir: String,
    pub model_file: String,
    pub model_device: Device,
    pub model_dtype: DType,
    pub quantization: Quantization,
    pub model_num_dry_run: usize,

    // Processor configs
    pub image_size: u32,
    pub clip_size: u32,
    pub clip_mean: Vec<f32>,
    pub clip_std: Vec<f32>,
    pub pixel_mean: Vec<f32>,
    pub pixel_std: Vec<f32>,
    #[serde(skip)]
    pub resize_filter: &'static str,

    // Language configs
    pub tokenizer_file: Option<String>,
    pub model_max_length: u64,
    pub max_new_tokens: u64,
    pub conv_type: ConvType,
    pub use_mm_start_end: bool,
    pub prompt_number: u32,

    // Data
    pub folder_path: String,
    pub progress_bar: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            model_version: "xinlai/LISA-13B-llama2-v1".to_string(),
            model_dir: "models".to_string(),
            model_file: String::new(),
            model_device: Device::Cuda(0),
            model_dtype: DType::Bf16,
            quantization: Quantization::None,
            model_num_dry_run: 0,
            image_size: 1024,
            clip_size: 224,
            clip_mean: vec![0.48145466, 0.4578275, 0.40821073],
            clip_std: vec![0.26862954, 0.26130258, 0.27577711],
            pixel_mean: vec![123.675, 116.28, 103.53],
            pixel_std: vec![58.395, 57.12, 57.375],
            resize_filter: "CatmullRom",
            tokenizer_file: None,
            model_max_length: 512,
            max_new_tokens: 512,
            conv_type: ConvType::LlavaV1,
            use_mm_start_end: true,
            prompt_number: 1,
            folder_path: "./gt_good_sample".to_string(),
            progress_bar: true,
        }
    }
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config {:?}: {}", path, e))?;
        let options: Self = serde_json::from_str(&s).map_err(|e| {
            LisaError::config(format!("Invalid config {}: {}", path.display(), e))
        })?;
        Ok(options)
    }

    /// Lowercased last segment of the version, e.g. `lisa-13b-llama2-v1`.
    pub fn model_stem(&self) -> Result<String> {
        let stem = self
            .model_version
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_lowercase();
        if stem.is_empty() {
            anyhow::bail!(LisaError::config("`model_version` is empty"));
        }
        Ok(stem)
    }

    /// Exported graph file name within the version directory, e.g. `bf16-q4.onnx`.
    /// Quantization only picks the weights; tensors stay in `model_dtype`.
    pub fn model_file_name(&self) -> String {
        let mut y = self.model_dtype.to_string();
        if let Some(q) = self.quantization.file_suffix() {
            y.push_str(&format!("-{}", q));
        }
        y.push_str(".onnx");
        y
    }

    /// Resolves model and tokenizer files under `model_dir/<stem>/` unless set
    /// explicitly, and checks they exist.
    pub fn commit(mut self) -> Result<Self> {
        let dir = PathBuf::from(&self.model_dir).join(self.model_stem()?);
        if self.model_file.is_empty() {
            self.model_file = dir.join(self.model_file_name()).to_string_lossy().into_owned();
        }
        if self.tokenizer_file.is_none() {
            self.tokenizer_file = Some(dir.join("tokenizer.json").to_string_lossy().into_owned());
        }
        for file in [Some(&self.model_file), self.tokenizer_file.as_ref()]
            .into_iter()
            .flatten()
        {
            if !Path::new(file).is_file() {
                anyhow::bail!(LisaError::config(format!("File not found: {}", file)));
            }
        }
        log::info!(
            "Model {} ({}, {}, quantization: {}) -> {}",
            self.model_version,
            self.model_device,
            self.model_dtype,
            self.quantization,
            self.model_file
        );

        Ok(self)
    }

    pub fn to_processor(&self) -> Result<Processor> {
        Processor::new(self)
    }

    pub fn to_conversation(&self) -> ConversationBuilder {
        ConversationBuilder::new(self.conv_type, self.use_mm_start_end)
    }

    pub fn to_tokenizer(&self) -> Result<Box<dyn TokenizerTrait>> {
        let file = self
            .tokenizer_file
            .as_ref()
            .ok_or_else(|| LisaError::config("No tokenizer file specified"))?;
        Ok(Box::new(HfTokenizer::from_file(file)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_reference_run() {
        let o = Options::default();
        assert_eq!(o.model_version, "xinlai/LISA-13B-llama2-v1");
        assert_eq!(o.model_dtype, DType::Bf16);
        assert_eq!(o.image_size, 1024);
        assert_eq!(o.max_new_tokens, 512);
        assert_eq!(o.conv_type, ConvType::LlavaV1);
        assert!(o.use_mm_start_end);
        assert_eq!(o.prompt_number, 1);
    }

    #[test]
    fn quantization_keeps_tensor_precision() {
        let o = Options::default()
            .with_model_dtype(DType::Bf16)
            .with_quantization(Quantization::Int8);
        assert_eq!(o.model_file_name(), "bf16-q8.onnx");
        let p = o.to_processor().unwrap();
        assert_eq!(p.process(&image::DynamicImage::new_rgb8(4, 4)).unwrap().dtype, DType::Bf16);

        let o = Options::default()
            .with_model_dtype(DType::Fp32)
            .with_quantization(Quantization::Int4);
        assert_eq!(o.model_file_name(), "fp32-q4.onnx");
        let o = Options::default().with_model_dtype(DType::Fp32);
        assert_eq!(o.model_file_name(), "fp32.onnx");
    }

    #[test]
    fn model_stem_from_version() {
        let o = Options::default();
        assert_eq!(o.model_stem().unwrap(), "lisa-13b-llama2-v1");
        let o = Options::default().with_model_version("");
        assert!(o.model_stem().is_err());
    }

    #[test]
    fn commit_resolves_files() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("lisa-7b-v1");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("fp16.onnx"), b"").unwrap();
        std::fs::write(dir.join("tokenizer.json"), b"{}").unwrap();

        let o = Options::default()
            .with_model_version("xinlai/LISA-7B-v1")
            .with_model_dir(tmp.path().to_str().unwrap())
            .with_model_dtype(DType::Fp16)
            .commit()
            .unwrap();
        assert!(o.model_file.ends_with("fp16.onnx"));
        assert!(o.tokenizer_file.unwrap().ends_with("tokenizer.json"));
    }

    #[test]
    fn commit_reports_missing_model() {
        let tmp = tempfile::tempdir().unwrap();
        let err = Options::default()
            .with_model_dir(tmp.path().to_str().unwrap())
            .commit()
            .unwrap_err();
        assert!(err.downcast_ref::<LisaError>().unwrap().is_configuration());
    }

    #[test]
    fn json_overrides_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("run.json");
        std::fs::write(
            &path,
            r#"{"precision_is_ignored": 1, "model_dtype": "fp16", "prompt_number": 3,
                "conv_type": "llava_llama_2", "quantization": "8bit", "model_device": {"Cpu": 0}}"#,
        )
        .unwrap();
        let o = Options::from_json_file(&path).unwrap();
        assert_eq!(o.model_dtype, DType::Fp16);
        assert_eq!(o.prompt_number, 3);
        assert_eq!(o.conv_type, ConvType::LlavaLlama2);
        assert_eq!(o.quantization, Quantization::Int8);
        assert_eq!(o.model_device, Device::Cpu(0));
        assert_eq!(o.resize_filter, "CatmullRom");
        assert_eq!(o.image_size, 1024);
    }

    #[test]
    fn invalid_json_is_configuration_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("bad.json");
        std::fs::write(&path, r#"{"model_dtype": "int3"}"#).unwrap();
        let err = Options::from_json_file(&path).unwrap_err();
        assert!(err.downcast_ref::<LisaError>().unwrap().is_configuration());
    }
}
