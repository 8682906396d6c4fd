use anyhow::Result;
use image::{GrayImage, Rgb, RgbImage};
use ndarray::Array3;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokenizers::Encoding;

use lisa_batch::{
    LisaInputs, Options, PredMask, Prediction, RunSummary, Segmenter, Session, TokenizerTrait,
    IMAGE_TOKEN_INDEX,
};

/// Every word maps to 7, `<s>` is 1.
#[derive(Clone, Debug)]
struct WordTokenizer;

impl TokenizerTrait for WordTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Encoding> {
        let mut ids: Vec<u32> = if add_special_tokens { vec![1] } else { vec![] };
        ids.extend(text.split_whitespace().map(|_| 7));
        let n = ids.len();
        Ok(Encoding::new(
            ids,
            vec![0; n],
            vec![String::new(); n],
            vec![None; n],
            vec![(0, 0); n],
            vec![0; n],
            vec![1; n],
            vec![],
            HashMap::new(),
        ))
    }

    fn decode(&self, ids: &[u32], _: bool) -> Result<String> {
        Ok(ids.iter().map(|i| i.to_string()).collect::<Vec<_>>().join(" "))
    }

    fn token_to_id(&self, token: &str) -> Option<u32> {
        (token == "[SEG]").then_some(32000)
    }

    fn bos_token_id(&self) -> Option<u32> {
        Some(1)
    }
}

/// Returns the same masks for every sample and records what it was given.
#[derive(Default)]
struct Scripted {
    masks: Vec<PredMask>,
    seen: Vec<(Vec<usize>, Vec<usize>, Vec<(usize, usize)>, Vec<(usize, usize)>)>,
    releases: usize,
}

impl Segmenter for Scripted {
    fn release_cache(&mut self) -> Result<()> {
        self.releases += 1;
        Ok(())
    }

    fn evaluate(&mut self, inputs: &LisaInputs<'_>) -> Result<Prediction> {
        assert_eq!(
            inputs
                .input_ids
                .iter()
                .filter(|&&id| id == IMAGE_TOKEN_INDEX)
                .count(),
            1
        );
        self.seen.push((
            inputs.images_clip.dims().to_vec(),
            inputs.images.dims().to_vec(),
            inputs.resize_list.clone(),
            inputs.original_size_list.clone(),
        ));
        let mut ids: Vec<i64> = inputs.input_ids.iter().copied().collect();
        ids.extend([32000, 2]);
        Ok(Prediction::new(ids, self.masks.clone()))
    }
}

fn write_pair(root: &Path, clip: &str, ts: &str, frame: &str, w: u32, h: u32) -> (PathBuf, PathBuf) {
    let img = root.join("images").join(clip).join(ts).join(format!("{frame}.jpeg"));
    let lbl = root.join("labels").join(clip).join(ts).join(format!("{frame}.png"));
    std::fs::create_dir_all(img.parent().unwrap()).unwrap();
    std::fs::create_dir_all(lbl.parent().unwrap()).unwrap();
    RgbImage::from_pixel(w, h, Rgb([100, 100, 100]))
        .save_with_format(&img, image::ImageFormat::Jpeg)
        .unwrap();
    GrayImage::new(w, h).save(&lbl).unwrap();
    (img, lbl)
}

fn options() -> Options {
    Options::lisa()
        .with_image_size(64)
        .with_clip_size(32)
        .with_progress_bar(false)
}

fn session(masks: Vec<PredMask>, prompt: u32) -> Session<Scripted> {
    Session::new(
        Scripted {
            masks,
            ..Default::default()
        },
        Box::new(WordTokenizer),
        options().with_prompt_number(prompt),
    )
    .unwrap()
}

#[test]
fn empty_then_full_mask_with_prompt_3() {
    let tmp = tempfile::tempdir().unwrap();
    let (_, lbl) = write_pair(tmp.path(), "c1", "t1", "f", 100, 100);
    let masks = vec![
        PredMask(Array3::zeros((0, 100, 100))),
        PredMask(Array3::from_elem((1, 100, 100), 0.5)),
    ];
    let mut s = session(masks, 3);
    let summary = s.process_folder(tmp.path()).unwrap();
    assert_eq!(
        summary,
        RunSummary {
            pairs: 1,
            processed: 1,
            skipped: 0,
            masks_written: 1,
            empty_masks: 1,
        }
    );

    let dir = lbl.parent().unwrap();
    assert!(!dir.join("f_LISA_mask_0_prompt3.png").exists());
    assert!(!dir.join("f_LISA_masked_img_0_prompt3.png").exists());

    let mask = image::open(dir.join("f_LISA_mask_1_prompt3.png"))
        .unwrap()
        .to_luma8();
    assert_eq!(mask.dimensions(), (100, 100));
    assert!(mask.pixels().all(|p| p.0[0] == 255));

    let overlay = image::open(dir.join("f_LISA_masked_img_1_prompt3.png"))
        .unwrap()
        .to_rgb8();
    assert_eq!(overlay.dimensions(), (100, 100));
    // jpeg source, so allow codec noise around floor(0.5 * 100 + 0.5 * c)
    for p in overlay.pixels() {
        let [r, g, b] = p.0;
        assert!((170..=185).contains(&r), "r = {r}");
        assert!(g <= 58 && b <= 58, "g = {g}, b = {b}");
    }

    let (clip, backbone, resize, original) = &s.segmenter().seen[0];
    assert_eq!(clip, &vec![1, 3, 32, 32]);
    assert_eq!(backbone, &vec![1, 3, 64, 64]);
    assert_eq!(resize, &vec![(64, 64)]);
    assert_eq!(original, &vec![(100, 100)]);
}

#[test]
fn backbone_keeps_aspect_and_pads() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "c1", "t1", "wide", 80, 40);
    let mut s = session(vec![], 1);
    s.process_folder(tmp.path()).unwrap();
    let (_, backbone, resize, original) = &s.segmenter().seen[0];
    assert_eq!(backbone, &vec![1, 3, 64, 64]);
    assert_eq!(resize, &vec![(32, 64)]);
    assert_eq!(original, &vec![(40, 80)]);
}

#[test]
fn unmatched_frames_are_never_evaluated() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "c1", "t1", "a", 16, 16);
    write_pair(tmp.path(), "c1", "t1", "b", 16, 16);
    std::fs::remove_file(tmp.path().join("labels/c1/t1/b.png")).unwrap();

    let mut s = session(vec![PredMask(Array3::from_elem((1, 16, 16), 1.0))], 2);
    let summary = s.process_folder(tmp.path()).unwrap();
    assert_eq!(summary.pairs, 1);
    assert_eq!(s.segmenter().seen.len(), 1);
    assert_eq!(s.segmenter().releases, 1);
    let dir = tmp.path().join("labels/c1/t1");
    assert!(dir.join("a_LISA_mask_0_prompt2.png").exists());
    assert!(!dir.join("b_LISA_mask_0_prompt2.png").exists());
}

#[test]
fn rerun_overwrites_same_files() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "c1", "t1", "f", 16, 16);
    let dir = tmp.path().join("labels/c1/t1");
    let masks = vec![PredMask(Array3::from_elem((1, 16, 16), 1.0))];

    session(masks.clone(), 4).process_folder(tmp.path()).unwrap();
    let count = std::fs::read_dir(&dir).unwrap().count();
    session(masks, 4).process_folder(tmp.path()).unwrap();
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), count);
    assert_eq!(count, 3);
}

#[test]
fn mask_size_mismatch_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    write_pair(tmp.path(), "c1", "t1", "f", 16, 16);
    let mut s = session(vec![PredMask(Array3::from_elem((1, 8, 8), 1.0))], 1);
    let err = s.process_folder(tmp.path()).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<lisa_batch::LisaError>(),
        Some(lisa_batch::LisaError::Collaborator(_))
    ));
}

#[test]
fn empty_dataset_runs_cleanly() {
    let tmp = tempfile::tempdir().unwrap();
    let summary = session(vec![], 1).process_folder(tmp.path()).unwrap();
    assert_eq!(summary, RunSummary::default());
}
