//! Detector contract and model backends.
//!
//! The acquisition loop only depends on the [`Detector`] trait. The
//! TorchScript backend is compiled in with the `with-tch` feature, which pulls
//! in the `tch` crate and a libtorch installation.

pub mod detector;
pub mod labels;
#[cfg(feature = "with-tch")]
pub mod torchscript;

pub use detector::{BoundingBox, Detection, Detector};

#[cfg(feature = "with-tch")]
pub use tch;
