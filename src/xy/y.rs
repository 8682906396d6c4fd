use crate::{PredMask, IMAGE_TOKEN_INDEX};

/// What one model call returns for one sample.
#[derive(Clone, PartialEq, Default)]
pub struct Prediction {
    /// Prompt and generated ids; the image placeholder span is still present.
    pub token_ids: Vec<i64>,
    /// Positional mask list. Entries may be empty and keep their index.
    pub masks: Vec<PredMask>,
}

impl std::fmt::Debug for Prediction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prediction")
            .field("n_tokens", &self.token_ids.len())
            .field(
                "masks",
                &self.masks.iter().map(|m| m.0.shape().to_vec()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Prediction {
    pub fn new(token_ids: Vec<i64>, masks: Vec<PredMask>) -> Self {
        Self { token_ids, masks }
    }

    /// Ids with the image placeholder removed.
    pub fn text_ids(&self) -> Vec<i64> {
        self.token_ids
            .iter()
            .copied()
            .filter(|&id| id != IMAGE_TOKEN_INDEX)
            .collect()
    }

    pub fn num_empty(&self) -> usize {
        self.masks.iter().filter(|m| m.is_empty()).count()
    }
}
