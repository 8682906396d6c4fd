use anyhow::Result;
use argh::FromArgs;
use tracing_subscriber::EnvFilter;

use lisa_batch::{ConvType, DType, Device, Lisa, Options, Quantization, Session};

#[derive(FromArgs)]
/// Run LISA reasoning segmentation over every image/label pair of a dataset.
struct Args {
    /// JSON file with run options; flags given here override it
    #[argh(option)]
    config: Option<String>,

    /// model version, e.g. xinlai/LISA-13B-llama2-v1
    #[argh(option)]
    version: Option<String>,

    /// compute precision: fp32, bf16 or fp16
    #[argh(option)]
    precision: Option<DType>,

    /// longest side of the mask-decoder input
    #[argh(option)]
    image_size: Option<u32>,

    /// tokenizer max length
    #[argh(option)]
    model_max_length: Option<u64>,

    /// generation budget per sample
    #[argh(option)]
    max_new_tokens: Option<u64>,

    /// conversation template: llava_v1 or llava_llama_2
    #[argh(option)]
    conv_type: Option<ConvType>,

    /// wrap the image token with <im_start>/<im_end>
    #[argh(option)]
    use_mm_start_end: Option<bool>,

    /// weight quantization: none, 8bit or 4bit
    #[argh(option)]
    quantization: Option<Quantization>,

    /// shorthand for --quantization 8bit
    #[argh(switch)]
    load_in_8bit: bool,

    /// shorthand for --quantization 4bit
    #[argh(switch)]
    load_in_4bit: bool,

    /// instruction template id
    #[argh(option)]
    prompt_number: Option<u32>,

    /// dataset root
    #[argh(option)]
    folder_path: Option<String>,

    /// directory holding exported models
    #[argh(option)]
    model_dir: Option<String>,

    /// explicit ONNX file, skips resolution under --model-dir
    #[argh(option)]
    model_file: Option<String>,

    /// explicit tokenizer.json
    #[argh(option)]
    tokenizer_file: Option<String>,

    /// device: cpu, cpu:N, cuda or cuda:N
    #[argh(option)]
    device: Option<Device>,

    /// log at debug level unless RUST_LOG is set
    #[argh(switch, short = 'v')]
    verbose: bool,
}

impl Args {
    fn to_options(&self) -> Result<Options> {
        let mut options = match &self.config {
            Some(f) => Options::from_json_file(f)?,
            None => Options::lisa(),
        };
        if let Some(x) = &self.version {
            options = options.with_model_version(x);
        }
        if let Some(x) = self.precision {
            options = options.with_model_dtype(x);
        }
        if let Some(x) = self.image_size {
            options = options.with_image_size(x);
        }
        if let Some(x) = self.model_max_length {
            options = options.with_model_max_length(x);
        }
        if let Some(x) = self.max_new_tokens {
            options = options.with_max_new_tokens(x);
        }
        if let Some(x) = self.conv_type {
            options = options.with_conv_type(x);
        }
        if let Some(x) = self.use_mm_start_end {
            options = options.with_use_mm_start_end(x);
        }
        if let Some(x) = self.quantization {
            options = options.with_quantization(x);
        }
        if self.load_in_8bit {
            options = options.with_quantization(Quantization::Int8);
        }
        if self.load_in_4bit {
            options = options.with_quantization(Quantization::Int4);
        }
        if let Some(x) = self.prompt_number {
            options = options.with_prompt_number(x);
        }
        if let Some(x) = &self.folder_path {
            options = options.with_folder_path(x);
        }
        if let Some(x) = &self.model_dir {
            options = options.with_model_dir(x);
        }
        if let Some(x) = &self.model_file {
            options = options.with_model_file(x);
        }
        if let Some(x) = &self.tokenizer_file {
            options.tokenizer_file = Some(x.clone());
        }
        if let Some(x) = self.device {
            options = options.with_model_device(x);
        }

        Ok(options)
    }
}

fn main() -> Result<()> {
    let args: Args = argh::from_env();

    let level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .init();

    let options = args.to_options()?.commit()?;
    let tokenizer = options.to_tokenizer()?;
    let model = Lisa::new(&options, tokenizer.as_ref())?;
    let folder = options.folder_path.clone();
    let mut session = Session::new(model, tokenizer, options)?;
    session.process_folder(folder)?;

    Ok(())
}
