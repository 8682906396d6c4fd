use anyhow::Result;
use dyn_clone::DynClone;
use std::fmt;
use std::path::Path;
use tokenizers::{Encoding, PaddingParams, PaddingStrategy, Tokenizer};

use crate::{LisaError, DEFAULT_IMAGE_TOKEN, IMAGE_TOKEN_INDEX};

pub const SEG_TOKEN: &str = "[SEG]";

/// Tokenizer seam: the HuggingFace tokenizer in production, scripted ones in tests.
pub trait TokenizerTrait: Send + Sync + DynClone + std::fmt::Debug {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding>;
    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String>;
    fn token_to_id(&self, token: &str) -> Option<u32>;
    fn bos_token_id(&self) -> Option<u32>;
}

dyn_clone::clone_trait_object!(TokenizerTrait);

#[derive(Clone)]
pub struct HfTokenizer {
    inner: Tokenizer,
    bos_token: String,
}

impl fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HfTokenizer(<tokenizers::Tokenizer>, bos={})", self.bos_token)
    }
}

impl HfTokenizer {
    /// Loads `tokenizer.json`, reading special tokens from a sibling
    /// `tokenizer_config.json` when present. Padding uses the unk token.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut inner = Tokenizer::from_file(path)
            .map_err(|err| LisaError::Tokenizer(format!("Failed to build tokenizer: {err}")))?;

        let config: Option<serde_json::Value> = path
            .parent()
            .map(|p| p.join("tokenizer_config.json"))
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| serde_json::from_str(&s).ok());
        let special = |key: &str, default: &str| -> String {
            config
                .as_ref()
                .and_then(|c| c.get(key))
                .and_then(|v| v.as_str().or_else(|| v.get("content").and_then(|c| c.as_str())))
                .unwrap_or(default)
                .to_string()
        };
        let bos_token = special("bos_token", "<s>");
        let pad_token = special("unk_token", "<unk>");
        let pad_id = inner.token_to_id(&pad_token).unwrap_or(0);

        inner.with_padding(Some(PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            pad_token,
            pad_id,
            ..Default::default()
        }));

        Ok(Self { inner, bos_token })
    }
}

impl TokenizerTrait for HfTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding> {
        self.inner
            .encode(text, add_special_tokens)
            .map_err(|e| LisaError::Tokenizer(e.to_string()).into())
    }

    fn decode(&self, ids: &[u32], skip_special_tokens: bool) -> Result<String> {
        self.inner
            .decode(ids, skip_special_tokens)
            .map_err(|e| LisaError::Tokenizer(e.to_string()).into())
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    fn bos_token_id(&self) -> Option<u32> {
        self.inner.token_to_id(&self.bos_token)
    }
}

/// Tokenizes `prompt`, mapping every `<image>` marker to [`IMAGE_TOKEN_INDEX`].
///
/// Each chunk between markers is encoded with special tokens. A leading BOS
/// on the first chunk is kept once and stripped from every chunk.
pub fn tokenize_image_prompt(tokenizer: &dyn TokenizerTrait, prompt: &str) -> Result<Vec<i64>> {
    let chunks: Vec<Vec<i64>> = prompt
        .split(DEFAULT_IMAGE_TOKEN)
        .map(|chunk| {
            tokenizer
                .encode(chunk, true)
                .map(|e| e.get_ids().iter().map(|&id| id as i64).collect())
        })
        .collect::<Result<_>>()?;

    let bos = tokenizer.bos_token_id().map(|x| x as i64);
    let mut input_ids = Vec::new();
    let offset = match (chunks.first().and_then(|c| c.first()), bos) {
        (Some(&first), Some(bos)) if first == bos => {
            input_ids.push(first);
            1
        }
        _ => 0,
    };

    let n = chunks.len();
    for (i, chunk) in chunks.iter().enumerate() {
        input_ids.extend(chunk.iter().skip(offset));
        if i + 1 < n {
            input_ids.push(IMAGE_TOKEN_INDEX);
        }
    }

    Ok(input_ids)
}

/// Resolves the `[SEG]` token id the model emits once per predicted mask.
pub fn seg_token_id(tokenizer: &dyn TokenizerTrait) -> Result<u32> {
    let encoding = tokenizer.encode(SEG_TOKEN, false)?;
    let id = tokenizer
        .token_to_id(SEG_TOKEN)
        .or_else(|| encoding.get_ids().first().copied())
        .ok_or_else(|| LisaError::config(format!("Tokenizer has no `{}` token", SEG_TOKEN)))?;
    Ok(id)
}

/// Drops image placeholders and decodes the rest, flattening newlines.
pub fn decode_output(tokenizer: &dyn TokenizerTrait, ids: &[i64]) -> Result<String> {
    let ids: Vec<u32> = ids
        .iter()
        .filter(|&&id| id != IMAGE_TOKEN_INDEX && id >= 0)
        .map(|&id| id as u32)
        .collect();
    let text = tokenizer.decode(&ids, false)?;
    Ok(text.replace('\n', "").replace("  ", " "))
}
