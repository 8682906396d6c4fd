use serde::{Deserialize, Serialize};

use crate::LisaError;

/// Run-wide numeric precision for every tensor handed to the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Fp32,
    #[default]
    Bf16,
    Fp16,
}

impl std::str::FromStr for DType {
    type Err = LisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fp32" | "f32" | "float32" => Ok(Self::Fp32),
            "bf16" | "bfloat16" => Ok(Self::Bf16),
            "fp16" | "f16" | "float16" | "half" => Ok(Self::Fp16),
            x => Err(LisaError::config(format!(
                "Unsupported precision: {x}. Use fp32, bf16 or fp16"
            ))),
        }
    }
}

impl std::fmt::Display for DType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let x = match self {
            Self::Fp32 => "fp32",
            Self::Bf16 => "bf16",
            Self::Fp16 => "fp16",
        };
        write!(f, "{}", x)
    }
}

/// Weight quantization of the exported model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Quantization {
    #[default]
    #[serde(rename = "none")]
    None,
    #[serde(rename = "8bit")]
    Int8,
    #[serde(rename = "4bit")]
    Int4,
}

impl Quantization {
    pub fn is_quantized(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Suffix of the exported model file, e.g. `fp16-q4.onnx`.
    pub fn file_suffix(&self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Int8 => Some("q8"),
            Self::Int4 => Some("q4"),
        }
    }
}

impl std::str::FromStr for Quantization {
    type Err = LisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "8bit" | "int8" | "q8" => Ok(Self::Int8),
            "4bit" | "int4" | "q4" | "nf4" => Ok(Self::Int4),
            x => Err(LisaError::config(format!(
                "Unsupported quantization: {x}. Use none, 8bit or 4bit"
            ))),
        }
    }
}

impl std::fmt::Display for Quantization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let x = match self {
            Self::None => "none",
            Self::Int8 => "8bit",
            Self::Int4 => "4bit",
        };
        write!(f, "{}", x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dtype_parsing() {
        assert_eq!("fp32".parse::<DType>().unwrap(), DType::Fp32);
        assert_eq!("BF16".parse::<DType>().unwrap(), DType::Bf16);
        assert_eq!("fp16".parse::<DType>().unwrap(), DType::Fp16);
        let err = "int8".parse::<DType>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn dtype_display_round_trips() {
        for d in [DType::Fp32, DType::Bf16, DType::Fp16] {
            assert_eq!(d.to_string().parse::<DType>().unwrap(), d);
        }
    }

    #[test]
    fn quantization_parsing() {
        assert_eq!("none".parse::<Quantization>().unwrap(), Quantization::None);
        assert_eq!("8bit".parse::<Quantization>().unwrap(), Quantization::Int8);
        assert_eq!("4bit".parse::<Quantization>().unwrap(), Quantization::Int4);
        assert!("2bit".parse::<Quantization>().is_err());
        assert!(!Quantization::None.is_quantized());
        assert_eq!(Quantization::Int4.file_suffix(), Some("q4"));
    }

    #[test]
    fn quantization_serde_names() {
        let q: Quantization = serde_json::from_str("\"8bit\"").unwrap();
        assert_eq!(q, Quantization::Int8);
        let d: DType = serde_json::from_str("\"fp16\"").unwrap();
        assert_eq!(d, DType::Fp16);
    }
}
