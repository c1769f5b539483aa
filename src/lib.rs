//! Reader and writer for Scanco micro-CT volume files.
//!
//! Supports the four related proprietary formats produced by Scanco
//! scanners: ISQ and RSQ volumes, RAD radiographs, and AIM volumes in both
//! the v020 (32-bit) and v030 (64-bit) header dialects. Headers carry
//! acquisition parameters and density calibration; payloads may be raw or
//! compressed with one of three run-length/bit-packing schemes.
//!
//! The typical entry points are [`load`] and [`save`]:
//!
//! ```ignore
//! let image = scanco::load("C0004255.ISQ")?;
//! println!("{:?} voxels of {}", image.shape(), image.component());
//! scanco::save(&image, "converted.aim")?;
//! ```
//!
//! Pixel values are rescaled to calibrated units on load (Hounsfield units
//! when the header carries a Mu-scaling calibration) and the transform is
//! inverted on save. For finer control, [`ScancoReader`] and
//! [`ScancoWriter`] expose the header and pixel steps separately.

pub mod error;

mod aim;
mod codec;
mod header;
mod image;
mod io;
mod isq;
mod pixels;
mod rescale;

pub use error::{Error, Result};
pub use header::{
    ComponentKind, Compression, PixelGeometry, PixelLayout, ScancoHeader, ScancoVersion,
    AIM_V020, AIM_V030, CT_HEADER_V1,
};
pub use image::ScancoImage;
pub use io::{can_read, load, read_header, save, ScancoReader, ScancoWriter};
pub use rescale::Rescale;
