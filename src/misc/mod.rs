mod annotator;
mod conversation;
mod dataloader;
mod device;
mod dtype;
mod options;
mod processor;
mod prompts;

pub use annotator::*;
pub use conversation::*;
pub use dataloader::*;
pub use device::*;
pub use dtype::*;
pub use options::*;
pub use processor::*;
pub use prompts::*;
