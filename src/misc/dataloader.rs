use anyhow::{anyhow, Result};
use image::{DynamicImage, ImageDecoder};
use indicatif::ProgressBar;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::{build_progress_bar, LisaError};

pub const IMAGES_SEGMENT: &str = "images";
pub const LABELS_SEGMENT: &str = "labels";
pub const IMAGE_EXTENSION: &str = "jpeg";
pub const LABEL_EXTENSION: &str = "png";

/// A frame and its ground-truth label; both existed when discovered.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SamplePair {
    pub image_path: PathBuf,
    pub label_path: PathBuf,
}

/// Replaces every component of `path` equal to `from` with `to`.
pub fn map_segment<P: AsRef<Path>>(path: P, from: &str, to: &str) -> PathBuf {
    path.as_ref()
        .components()
        .map(|c| match c {
            Component::Normal(x) if x == OsStr::new(from) => Component::Normal(OsStr::new(to)),
            c => c,
        })
        .collect()
}

/// `frame.jpeg` -> `frame.png`. Names without the `from` extension are kept as-is.
pub fn map_extension(file_name: &OsStr, from: &str, to: &str) -> PathBuf {
    let p = Path::new(file_name);
    match p.extension() {
        Some(ext) if ext == OsStr::new(from) => p.with_extension(to),
        _ => p.to_path_buf(),
    }
}

pub struct DataLoaderIterator {
    pairs: VecDeque<SamplePair>,
    progress_bar: Option<ProgressBar>,
}

impl DataLoaderIterator {
    /// The live bar, until the last pair has been yielded.
    pub fn progress_bar(&self) -> Option<&ProgressBar> {
        self.progress_bar.as_ref()
    }
}

impl Iterator for DataLoaderIterator {
    type Item = SamplePair;

    fn next(&mut self) -> Option<Self::Item> {
        match self.pairs.pop_front() {
            Some(pair) => {
                if let Some(pb) = &self.progress_bar {
                    pb.inc(1);
                }
                Some(pair)
            }
            None => {
                if let Some(pb) = self.progress_bar.take() {
                    pb.set_prefix("Iterated");
                    if let Ok(style) =
                        indicatif::ProgressStyle::with_template(crate::PROGRESS_BAR_STYLE_FINISH_2)
                    {
                        pb.set_style(style);
                    }
                    pb.finish();
                }
                None
            }
        }
    }
}

impl IntoIterator for DataLoader {
    type Item = SamplePair;
    type IntoIter = DataLoaderIterator;

    fn into_iter(self) -> Self::IntoIter {
        let progress_bar = if self.with_pb {
            build_progress_bar(
                self.pairs.len() as u64,
                "Iterating",
                Some("Pairs"),
                crate::PROGRESS_BAR_STYLE_CYAN_2,
            )
            .ok()
        } else {
            None
        };

        DataLoaderIterator {
            pairs: self.pairs.into(),
            progress_bar,
        }
    }
}

/// Image/label pairs of a dataset laid out as
/// `root/.../images/<clip>/<timestamp>/<frame>.jpeg` with a mirrored
/// `labels/` tree holding `<frame>.png`.
pub struct DataLoader {
    root: PathBuf,
    pairs: Vec<SamplePair>,
    with_pb: bool,
}

impl TryFrom<&str> for DataLoader {
    type Error = anyhow::Error;

    fn try_from(str: &str) -> Result<Self, Self::Error> {
        Self::new(str)
    }
}

impl DataLoader {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let pairs = Self::collect_pairs(&root)?;
        info!("Found {} image/label pairs under {:?}", pairs.len(), root);

        Ok(Self {
            root,
            pairs,
            with_pb: true,
        })
    }

    pub fn with_progress_bar(mut self, x: bool) -> Self {
        self.with_pb = x;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn pairs(&self) -> &[SamplePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Walks `root` in traversal order. Timestamps without a label directory
    /// and frames without a label file are left out silently. `root` may be
    /// the `images` directory itself.
    pub fn collect_pairs<P: AsRef<Path>>(root: P) -> Result<Vec<SamplePair>> {
        let root = root.as_ref();
        if !root.is_dir() {
            warn!("Dataset root not found or not a directory: {:?}", root);
            return Ok(Vec::new());
        }

        let mut pairs = Vec::new();
        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(x) => x,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if !entry.file_type().is_dir() || entry.file_name() != OsStr::new(IMAGES_SEGMENT) {
                continue;
            }
            // Mapped relative to the parent of `images`, which may lie above `root`.
            let base = entry.path().parent().unwrap_or(root);
            for clip in Self::subdirs(entry.path())? {
                let rel = clip.strip_prefix(base).unwrap_or(&clip);
                let label_clip = base.join(map_segment(rel, IMAGES_SEGMENT, LABELS_SEGMENT));
                Self::collect_clip(&clip, &label_clip, &mut pairs)?;
            }
        }

        Ok(pairs)
    }

    fn collect_clip(image_clip: &Path, label_clip: &Path, pairs: &mut Vec<SamplePair>) -> Result<()> {
        for image_ts in Self::subdirs(image_clip)? {
            let Some(ts) = image_ts.file_name() else {
                continue;
            };
            let label_ts = label_clip.join(ts);
            if !label_ts.is_dir() {
                debug!("No labels for {:?}", image_ts);
                continue;
            }
            for frame in std::fs::read_dir(&image_ts)? {
                let frame = frame?;
                if !frame.file_type()?.is_file() {
                    continue;
                }
                let label_path =
                    label_ts.join(map_extension(&frame.file_name(), IMAGE_EXTENSION, LABEL_EXTENSION));
                if label_path.exists() {
                    pairs.push(SamplePair {
                        image_path: frame.path(),
                        label_path,
                    });
                }
            }
        }
        Ok(())
    }

    fn subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
        let mut xs = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(LisaError::from)? {
            let entry = entry.map_err(LisaError::from)?;
            if entry.file_type().map_err(LisaError::from)?.is_dir() {
                xs.push(entry.path());
            }
        }
        Ok(xs)
    }

    /// Decodes `path` upright, applying its EXIF orientation if any.
    pub fn try_read<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path = path.as_ref();
        let mut decoder = image::ImageReader::open(path)
            .map_err(|err| anyhow!("Failed to open image at {:?}: {:?}", path, err))?
            .with_guessed_format()
            .map_err(|err| anyhow!("Failed to guess the format of {:?}: {:?}", path, err))?
            .into_decoder()
            .map_err(|err| anyhow!("Failed to decode image at {:?}: {:?}", path, err))?;
        let orientation = decoder
            .orientation()
            .map_err(|err| anyhow!("Failed to read the orientation of {:?}: {:?}", path, err))?;
        let mut img = DynamicImage::from_decoder(decoder)
            .map_err(|err| anyhow!("Failed to decode image at {:?}: {:?}", path, err))?;
        img.apply_orientation(orientation);
        Ok(img)
    }
}
