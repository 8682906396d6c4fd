use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};

pub const PROGRESS_BAR_STYLE_CYAN_2: &str =
    "{prefix:.cyan.bold} {msg} {human_pos}/{human_len} |{bar}| {elapsed_precise}";
pub const PROGRESS_BAR_STYLE_FINISH_2: &str =
    "{prefix:.green.bold} {msg} x{human_len} in {elapsed}";

pub fn build_progress_bar(
    n: u64,
    prefix: &str,
    msg: Option<&str>,
    style_temp: &str,
) -> Result<ProgressBar> {
    let pb = ProgressBar::new(n);
    pb.set_style(ProgressStyle::with_template(style_temp)?.progress_chars("██ "));
    pb.set_prefix(prefix.to_string());
    pb.set_message(msg.unwrap_or_default().to_string());

    Ok(pb)
}

/// Prints `msg` to stdout, suspending `pb` so the bar is redrawn below it.
pub fn say(pb: Option<&ProgressBar>, msg: &str) {
    match pb {
        Some(pb) => pb.suspend(|| println!("{}", msg)),
        None => println!("{}", msg),
    }
}

/// Label base name as used in artifact names: the file name up to its first `.`.
pub fn try_fetch_stem<P: AsRef<std::path::Path>>(p: P) -> Result<String> {
    let p = p.as_ref();
    let name = p
        .file_name()
        .and_then(|x| x.to_str())
        .ok_or_else(|| anyhow::anyhow!("Failed to get the file name of: {:?}", p))?;
    let stem = name.split('.').next().unwrap_or(name);
    if stem.is_empty() {
        anyhow::bail!("Empty file stem: {:?}", p);
    }

    Ok(stem.to_string())
}
