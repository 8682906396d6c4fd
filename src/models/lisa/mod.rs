mod config;
mod r#impl;

pub use r#impl::*;
