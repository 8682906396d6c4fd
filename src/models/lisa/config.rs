use anyhow::Result;

use crate::{ConvType, DType, Lisa, Options, TokenizerTrait};

impl Options {
    pub fn to_model(&self, tokenizer: &dyn TokenizerTrait) -> Result<Lisa> {
        Lisa::new(self, tokenizer)
    }

    pub fn lisa() -> Self {
        Self::default()
            .with_image_size(1024)
            .with_clip_size(224)
            .with_resize_filter("CatmullRom")
            .with_model_max_length(512)
            .with_max_new_tokens(512)
            .with_use_mm_start_end(true)
    }

    pub fn lisa_7b_v1() -> Self {
        Self::lisa()
            .with_model_version("xinlai/LISA-7B-v1")
            .with_conv_type(ConvType::LlavaV1)
    }

    pub fn lisa_7b_v1_explanatory() -> Self {
        Self::lisa()
            .with_model_version("xinlai/LISA-7B-v1-explanatory")
            .with_conv_type(ConvType::LlavaV1)
    }

    pub fn lisa_13b_llama2_v1() -> Self {
        Self::lisa()
            .with_model_version("xinlai/LISA-13B-llama2-v1")
            .with_conv_type(ConvType::LlavaV1)
    }

    pub fn lisa_13b_llama2_v1_explanatory() -> Self {
        Self::lisa()
            .with_model_version("xinlai/LISA-13B-llama2-v1-explanatory")
            .with_conv_type(ConvType::LlavaV1)
    }

    pub fn lisa_13b_llama2_v1_fp16() -> Self {
        Self::lisa_13b_llama2_v1().with_model_dtype(DType::Fp16)
    }
}

#[cfg(test)]
mod tests {
    use crate::{DType, Options};

    #[test]
    fn presets() {
        let o = Options::lisa_7b_v1();
        assert_eq!(o.model_stem().unwrap(), "lisa-7b-v1");
        let o = Options::lisa_13b_llama2_v1_fp16();
        assert_eq!(o.model_dtype, DType::Fp16);
        assert_eq!(o.model_file_name(), "fp16.onnx");
    }
}
