mod mask;
mod x;
mod y;

pub use mask::*;
pub use x::*;
pub use y::*;
