//! In-memory pairing of a Scanco header with its decoded pixel payload.

use crate::error::{Error, Result};
use crate::header::{ComponentKind, ScancoHeader};

/// A decoded Scanco volume: the header record plus an owned pixel buffer in
/// host byte order.
#[derive(Debug, Clone)]
pub struct ScancoImage {
    header: ScancoHeader,
    data: Vec<u8>,
}

impl ScancoImage {
    /// Pair a header with its pixel buffer. The buffer length must match
    /// the payload size the header describes.
    pub fn from_parts(header: ScancoHeader, data: Vec<u8>) -> Result<Self> {
        let expected = header.data_size();
        if data.len() != expected {
            return Err(Error::Sequence(format!(
                "pixel buffer holds {} bytes, header describes {expected}",
                data.len()
            )));
        }
        Ok(Self { header, data })
    }

    /// Header record.
    pub fn header(&self) -> &ScancoHeader {
        &self.header
    }

    /// Mutable header record.
    pub fn header_mut(&mut self) -> &mut ScancoHeader {
        &mut self.header
    }

    /// Pixel payload bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable pixel payload bytes.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Split into header and pixel buffer.
    pub fn into_parts(self) -> (ScancoHeader, Vec<u8>) {
        (self.header, self.data)
    }

    /// Pixel dimensions as usizes.
    pub fn shape(&self) -> [usize; 3] {
        let d = self.header.pixel.dimensions;
        [d[0] as usize, d[1] as usize, d[2] as usize]
    }

    /// Voxel spacing in millimetres.
    pub fn spacing(&self) -> [f64; 3] {
        self.header.pixel.spacing
    }

    /// Component kind of the samples.
    pub fn component(&self) -> ComponentKind {
        self.header.pixel.component
    }

    /// Materialize the samples as f32 values, converting from the native
    /// component type.
    pub fn to_f32(&self) -> Vec<f32> {
        match self.component() {
            ComponentKind::Int8 => self.data.iter().map(|&b| f32::from(b as i8)).collect(),
            ComponentKind::UInt8 => self.data.iter().map(|&b| f32::from(b)).collect(),
            ComponentKind::Int16 => self
                .data
                .chunks_exact(2)
                .map(|c| f32::from(i16::from_ne_bytes([c[0], c[1]])))
                .collect(),
            ComponentKind::UInt16 => self
                .data
                .chunks_exact(2)
                .map(|c| f32::from(u16::from_ne_bytes([c[0], c[1]])))
                .collect(),
            ComponentKind::Int32 => self
                .data
                .chunks_exact(4)
                .map(|c| i32::from_ne_bytes([c[0], c[1], c[2], c[3]]) as f32)
                .collect(),
            ComponentKind::Float32 => self
                .data
                .chunks_exact(4)
                .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        }
    }
}
