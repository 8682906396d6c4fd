//! Batch reasoning segmentation with LISA over image/label datasets.
//!
//! Every `images/<clip>/<timestamp>/<frame>.jpeg` that has a matching
//! `labels/<clip>/<timestamp>/<frame>.png` is run through the model under one
//! fixed instruction, and each non-empty predicted mask is written beside the
//! label as a gray mask plus a red-tinted overlay.
//!
//! ```no_run
//! use lisa_batch::{Lisa, Options, Session};
//!
//! let options = Options::lisa_13b_llama2_v1().commit()?;
//! let tokenizer = options.to_tokenizer()?;
//! let model = Lisa::new(&options, tokenizer.as_ref())?;
//! let mut session = Session::new(model, tokenizer, options)?;
//! session.process_folder("./gt_good_sample")?;
//! # Ok::<(), anyhow::Error>(())
//! ```

mod error;
mod misc;
mod model;
pub mod models;
mod session;
pub mod tokenizer;
mod utils;
mod xy;

pub use error::*;
pub use misc::*;
pub use model::*;
pub use models::*;
pub use session::*;
pub use tokenizer::*;
pub use utils::*;
pub use xy::*;
