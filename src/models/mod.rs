mod lisa;

pub use lisa::*;
