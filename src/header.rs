//! Scanco header parsing support: format versions, component types, and the
//! header record shared by every dialect.
//!
//! Four on-disk formats are handled: ISQ and RSQ (3-D volumes), RAD (2-D
//! radiographs sharing the ISQ pre-header), and AIM in its v020 (32-bit) and
//! v030 (64-bit) dialects.

use crate::codec;
use crate::error::{Error, Result};

/// Version string carried by ISQ/RSQ/RAD files.
pub const CT_HEADER_V1: &str = "CTDATA-HEADER_V1";
/// Version string stored for AIM v020 files (the file itself has none).
pub const AIM_V020: &str = "AIMDATA_V020   ";
/// Version string carried by AIM v030 files.
pub const AIM_V030: &str = "AIMDATA_V030   ";

/// Scanco file format variant, detected from the first 16 bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScancoVersion {
    /// ISQ, RSQ or RAD ("CTDATA-HEADER_V1").
    CtHeaderV1,
    /// AIM with 32-bit header fields (no version string on disk).
    AimV020,
    /// AIM with 64-bit header fields ("AIMDATA_V030   ").
    AimV030,
    /// None of the known signatures.
    #[default]
    Unknown,
}

impl ScancoVersion {
    /// Detect the format variant from the first 16 bytes of a file.
    pub fn detect(head: &[u8]) -> Self {
        if head.len() < 16 {
            return Self::Unknown;
        }
        if &head[..16] == CT_HEADER_V1.as_bytes() {
            Self::CtHeaderV1
        } else if &head[..15] == AIM_V030.as_bytes() {
            Self::AimV030
        } else if codec::read_i32(head) == 20 && codec::read_i32(&head[4..]) == 140 {
            Self::AimV020
        } else {
            Self::Unknown
        }
    }

    /// Width in bytes of the integer fields in this dialect's AIM header.
    pub const fn int_size(self) -> usize {
        match self {
            Self::AimV030 => 8,
            _ => 4,
        }
    }
}

/// Pixel component type carried by a Scanco payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentKind {
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Signed 16-bit integer
    #[default]
    Int16,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit floating point
    Float32,
}

impl ComponentKind {
    /// Size of one component in bytes.
    pub const fn byte_size(self) -> usize {
        match self {
            Self::Int8 | Self::UInt8 => 1,
            Self::Int16 | Self::UInt16 => 2,
            Self::Int32 | Self::Float32 => 4,
        }
    }

    /// Rust type name, for messages.
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Int8 => "i8",
            Self::UInt8 => "u8",
            Self::Int16 => "i16",
            Self::UInt16 => "u16",
            Self::Int32 => "i32",
            Self::Float32 => "f32",
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.type_name())
    }
}

/// Scalar or fixed-arity vector pixels.
///
/// Vector pixels (three 8-bit components) are recognized from the type word
/// but their payloads are not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PixelLayout {
    /// One component per pixel.
    #[default]
    Scalar,
    /// Fixed number of components per pixel.
    Vector(u8),
}

impl PixelLayout {
    /// Number of components per pixel.
    pub const fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vector(n) => n as usize,
        }
    }
}

/// Payload compression scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Raw little-endian samples.
    #[default]
    None,
    /// One byte per 2x2x2 voxel block plus a trailing fill value (0x00b1).
    PackedBits,
    /// Two-phase run-length stream (0x00b2).
    BitRunLength,
    /// (length, value) byte pairs (0x00c2).
    ByteRunLength,
}

/// Map an AIM data-type word to its component kind, pixel layout and
/// compression scheme.
pub(crate) fn component_from_type_word(
    word: i32,
) -> Result<(ComponentKind, PixelLayout, Compression)> {
    use Compression as C;
    use ComponentKind as K;
    use PixelLayout as L;
    match word {
        0x0016_0001 | 0x000d_0001 => Ok((K::UInt8, L::Scalar, C::None)),
        0x0012_0003 => Ok((K::UInt8, L::Vector(3), C::None)),
        0x0001_0001 => Ok((K::Int8, L::Scalar, C::None)),
        0x0006_0003 => Ok((K::Int8, L::Vector(3), C::None)),
        0x0017_0002 => Ok((K::UInt16, L::Scalar, C::None)),
        0x0002_0002 => Ok((K::Int16, L::Scalar, C::None)),
        0x0003_0004 => Ok((K::Int32, L::Scalar, C::None)),
        0x001a_0004 => Ok((K::Float32, L::Scalar, C::None)),
        0x0015_0001 => Ok((K::Int8, L::Scalar, C::BitRunLength)),
        0x0008_0002 => Ok((K::Int8, L::Scalar, C::ByteRunLength)),
        0x0006_0001 => Ok((K::Int8, L::Scalar, C::PackedBits)),
        _ => Err(Error::UnsupportedComponent(word)),
    }
}

/// Canonical uncompressed AIM type word for a component kind, used when
/// composing a header that did not originate from an AIM file.
pub(crate) const fn canonical_type_word(kind: ComponentKind) -> i32 {
    match kind {
        ComponentKind::Int8 => 0x0001_0001,
        ComponentKind::UInt8 => 0x0016_0001,
        ComponentKind::Int16 => 0x0002_0002,
        ComponentKind::UInt16 => 0x0017_0002,
        ComponentKind::Int32 => 0x0003_0004,
        ComponentKind::Float32 => 0x001a_0004,
    }
}

/// Geometry and sample description of the pixel payload.
#[derive(Debug, Clone, Default)]
pub struct PixelGeometry {
    /// Pixel counts along x, y, z.
    pub dimensions: [i32; 3],
    /// Voxel spacing in millimetres.
    pub spacing: [f64; 3],
    /// Physical origin in millimetres.
    pub origin: [f64; 3],
    /// Raw AIM data-type word (ISQ files store their data-type code here).
    pub component_tag: i32,
    /// Decoded component kind.
    pub component: ComponentKind,
    /// Scalar or vector pixels.
    pub layout: PixelLayout,
}

impl PixelGeometry {
    /// Total number of pixels.
    pub fn pixel_count(&self) -> usize {
        self.dimensions.iter().map(|&d| d.max(0) as usize).product()
    }

    /// Size of the decoded payload in bytes.
    pub fn data_size(&self) -> usize {
        self.pixel_count() * self.layout.components() * self.component.byte_size()
    }
}

/// Every semantic field the four Scanco formats carry.
///
/// A header is built fresh at the start of each read or write operation and
/// owned by it; fields a given dialect does not store keep their defaults.
#[derive(Debug, Clone)]
pub struct ScancoHeader {
    /// Format version string (15 printable characters on disk).
    pub version: String,
    /// Patient name (at most 41 characters).
    pub patient_name: String,
    /// Patient index number.
    pub patient_index: i32,
    /// Scanner serial number.
    pub scanner_id: i32,
    /// Creation timestamp, formatted `"D-MMM-YYYY HH:MM:SS.mmm"`.
    pub creation_date: String,
    /// Modification timestamp, same format.
    pub modification_date: String,
    /// Original scan extent in pixels.
    pub scan_dimensions_pixels: [i32; 3],
    /// Original scan extent in millimetres.
    pub scan_dimensions_physical: [f64; 3],
    /// Slice thickness in millimetres.
    pub slice_thickness: f64,
    /// Slice increment in millimetres.
    pub slice_increment: f64,
    /// Position of the first slice in millimetres.
    pub start_position: f64,
    /// Position of the last slice in millimetres.
    pub end_position: f64,
    /// Table position for radiographs, millimetres.
    pub z_position: f64,
    /// Minimum and maximum stored sample values.
    pub data_range: [f64; 2],
    /// Linear attenuation scale factor; values of 1 or below mean
    /// "no Mu-scaling in effect".
    pub mu_scaling: f64,
    /// Detector samples per projection.
    pub number_of_samples: i32,
    /// Projections per 180 degrees.
    pub number_of_projections: i32,
    /// Scan distance in millimetres.
    pub scan_distance: f64,
    /// Integration time in milliseconds.
    pub sample_time: f64,
    /// Scanner model code.
    pub scanner_type: i32,
    /// Measurement index number.
    pub measurement_index: i32,
    /// Anatomical site code.
    pub site: i32,
    /// Reconstruction algorithm code.
    pub reconstruction_alg: i32,
    /// Reference line in millimetres.
    pub reference_line: f64,
    /// Tube voltage in kV.
    pub energy: f64,
    /// Tube current in mA.
    pub intensity: f64,
    /// Calibration unit type code.
    pub rescale_type: i32,
    /// Calibration unit label, e.g. `"mg HA/ccm"`.
    pub rescale_units: String,
    /// Calibration description string.
    pub calibration_data: String,
    /// Density calibration slope.
    pub rescale_slope: f64,
    /// Density calibration intercept.
    pub rescale_intercept: f64,
    /// Linear attenuation of water, for Hounsfield conversion.
    pub mu_water: f64,
    /// Payload geometry and sample description.
    pub pixel: PixelGeometry,
    /// Payload compression scheme.
    pub compression: Compression,
    /// File offset at which pixel data begins.
    pub header_size: u64,
}

impl Default for ScancoHeader {
    fn default() -> Self {
        Self {
            version: String::new(),
            patient_name: String::new(),
            patient_index: 0,
            scanner_id: 0,
            creation_date: String::new(),
            modification_date: String::new(),
            scan_dimensions_pixels: [0; 3],
            scan_dimensions_physical: [0.0; 3],
            slice_thickness: 0.0,
            slice_increment: 0.0,
            start_position: 0.0,
            end_position: 0.0,
            z_position: 0.0,
            data_range: [0.0; 2],
            mu_scaling: 1.0,
            number_of_samples: 0,
            number_of_projections: 0,
            scan_distance: 0.0,
            sample_time: 0.0,
            scanner_type: 0,
            measurement_index: 0,
            site: 0,
            reconstruction_alg: 0,
            reference_line: 0.0,
            energy: 0.0,
            intensity: 0.0,
            rescale_type: 0,
            rescale_units: String::new(),
            calibration_data: String::new(),
            rescale_slope: 1.0,
            rescale_intercept: 0.0,
            mu_water: 0.7033,
            pixel: PixelGeometry::default(),
            compression: Compression::None,
            header_size: 0,
        }
    }
}

impl ScancoHeader {
    /// Format variant this header belongs to, from its version string.
    pub fn format_version(&self) -> ScancoVersion {
        if self.version == CT_HEADER_V1 {
            ScancoVersion::CtHeaderV1
        } else if self.version == AIM_V030 {
            ScancoVersion::AimV030
        } else if self.version == AIM_V020 {
            ScancoVersion::AimV020
        } else {
            ScancoVersion::Unknown
        }
    }

    /// Size of the decoded pixel payload in bytes.
    pub fn data_size(&self) -> usize {
        self.pixel.data_size()
    }

    /// Validate basic invariants after a read or before a write.
    pub fn validate(&self) -> Result<()> {
        for (axis, &dim) in self.pixel.dimensions.iter().enumerate() {
            if dim <= 0 {
                return Err(Error::BadHeader(format!(
                    "dimension {axis} is not positive: {dim}"
                )));
            }
            let spacing = self.pixel.spacing[axis];
            if !(spacing > 0.0) || !spacing.is_finite() {
                return Err(Error::BadHeader(format!(
                    "spacing {axis} must be finite and > 0, got {spacing}"
                )));
            }
        }
        Ok(())
    }
}
