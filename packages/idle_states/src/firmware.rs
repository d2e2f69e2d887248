//! Access to platform capability data (firmware device tree and processor topology).

mod abstractions;
mod facade;
mod real;

pub use abstractions::*;
pub(crate) use facade::*;
pub use real::*;
