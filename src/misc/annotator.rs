use anyhow::Result;
use std::path::{Path, PathBuf};

use crate::{try_fetch_stem, LisaError, RenderedMask};

/// Output file names for one mask of one label, placed beside the label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactNames {
    pub dir: PathBuf,
    pub mask_path: PathBuf,
    pub overlay_path: PathBuf,
}

impl ArtifactNames {
    pub fn new<P: AsRef<Path>>(label_path: P, index: usize, prompt_id: u32) -> Result<Self> {
        let label_path = label_path.as_ref();
        let base = try_fetch_stem(label_path)?;
        let dir = label_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();

        Ok(Self {
            mask_path: dir.join(format!("{}_LISA_mask_{}_prompt{}.png", base, index, prompt_id)),
            overlay_path: dir.join(format!(
                "{}_LISA_masked_img_{}_prompt{}.png",
                base, index, prompt_id
            )),
            dir,
        })
    }
}

/// Writes rendered masks next to their labels. Existing files are overwritten.
#[derive(Debug, Clone, Copy)]
pub struct Annotator {
    prompt_id: u32,
}

impl Annotator {
    pub fn new(prompt_id: u32) -> Self {
        Self { prompt_id }
    }

    pub fn prompt_id(&self) -> u32 {
        self.prompt_id
    }

    /// Writes the mask, then the overlay. Callers report the returned paths.
    pub fn save<P: AsRef<Path>>(&self, rendered: &RenderedMask, label_path: P) -> Result<ArtifactNames> {
        let names = ArtifactNames::new(label_path, rendered.index, self.prompt_id)?;

        rendered
            .mask
            .save(&names.mask_path)
            .map_err(LisaError::from)?;
        rendered
            .overlay
            .save(&names.overlay_path)
            .map_err(LisaError::from)?;
        log::debug!(
            "Mask {} covers {} pixels",
            rendered.index,
            rendered.pixel_count()
        );

        Ok(names)
    }
}
