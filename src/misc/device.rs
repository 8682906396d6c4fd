use serde::{Deserialize, Serialize};

use crate::LisaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu(usize),
    Cuda(usize),
}

impl Default for Device {
    fn default() -> Self {
        Self::Cuda(0)
    }
}

impl Device {
    pub fn id(&self) -> usize {
        match self {
            Self::Cpu(i) | Self::Cuda(i) => *i,
        }
    }

    pub fn is_cuda(&self) -> bool {
        matches!(self, Self::Cuda(_))
    }
}

impl TryFrom<&str> for Device {
    type Error = LisaError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let s = s.trim().to_lowercase();
        let (kind, id) = match s.split_once(':') {
            Some((kind, id)) => {
                let id = id
                    .parse::<usize>()
                    .map_err(|_| LisaError::config(format!("Invalid device id in `{s}`")))?;
                (kind.to_string(), id)
            }
            None => (s.clone(), 0),
        };
        match kind.as_str() {
            "cpu" => Ok(Self::Cpu(id)),
            "cuda" | "gpu" => Ok(Self::Cuda(id)),
            x => Err(LisaError::config(format!(
                "Unsupported device: {x}. Use cpu[:N] or cuda[:N]"
            ))),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = LisaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::try_from(s)
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cpu(i) => write!(f, "cpu:{}", i),
            Self::Cuda(i) => write!(f, "cuda:{}", i),
        }
    }
}
