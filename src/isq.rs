//! ISQ/RSQ/RAD header codec.
//!
//! The primary header is a single 512-byte block. The data offset stored in
//! its last word points past an optional extended header: a chain of up to
//! four 128-byte descriptors (optionally preceded by a "MultiHeader" block)
//! whose "Calibration" entry carries the density calibration block.

use std::io::Read;
use std::io::Write;

use tracing::debug;

use crate::codec;
use crate::error::{Error, Result};
use crate::header::{ComponentKind, Compression, PixelLayout, ScancoHeader, CT_HEADER_V1};
use crate::io::read_full;

/// Size of one header block.
pub(crate) const BLOCK_SIZE: usize = 512;

/// Data-type code written for ISQ volumes.
const ISQ_DATA_TYPE: i32 = 3;
/// Data-type code identifying a RAD radiograph.
const RAD_DATA_TYPE: i32 = 9;

/// Field offsets shared by the ISQ and RAD layouts.
mod pre {
    pub const VERSION: usize = 0;
    pub const DATA_TYPE: usize = 16;
    pub const IMAGE_BYTES: usize = 20;
    pub const IMAGE_BLOCKS: usize = 24;
    pub const PATIENT_INDEX: usize = 28;
    pub const SCANNER_ID: usize = 32;
    pub const CREATION_DATE: usize = 36;
    pub const PIXDIM: usize = 44;
    pub const PHYSDIM: usize = 56;
    pub const DATA_OFFSET: usize = 508;
}

/// ISQ/RSQ variant payload offsets.
mod isq {
    pub const SLICE_THICKNESS: usize = 68;
    pub const SLICE_INCREMENT: usize = 72;
    pub const START_POSITION: usize = 76;
    pub const DATA_MIN: usize = 80;
    pub const DATA_MAX: usize = 84;
    pub const MU_SCALING: usize = 88;
    pub const NUMBER_OF_SAMPLES: usize = 92;
    pub const NUMBER_OF_PROJECTIONS: usize = 96;
    pub const SCAN_DISTANCE: usize = 100;
    pub const SCANNER_TYPE: usize = 104;
    pub const SAMPLE_TIME: usize = 108;
    pub const MEASUREMENT_INDEX: usize = 112;
    pub const SITE: usize = 116;
    pub const REFERENCE_LINE: usize = 120;
    pub const RECONSTRUCTION_ALG: usize = 124;
    pub const PATIENT_NAME: usize = 128;
    pub const ENERGY: usize = 168;
    pub const INTENSITY: usize = 172;
}

/// RAD variant payload offsets.
mod rad {
    pub const MEASUREMENT_INDEX: usize = 68;
    pub const DATA_MIN: usize = 72;
    pub const DATA_MAX: usize = 76;
    pub const MU_SCALING: usize = 80;
    pub const PATIENT_NAME: usize = 84;
    pub const Z_POSITION: usize = 124;
    pub const SAMPLE_TIME: usize = 132;
    pub const ENERGY: usize = 136;
    pub const INTENSITY: usize = 140;
    pub const REFERENCE_LINE: usize = 144;
    pub const START_POSITION: usize = 148;
    pub const END_POSITION: usize = 152;
}

/// Calibration block field offsets (relative to the block start).
mod cal {
    pub const CALIBRATION_DATA: usize = 28;
    pub const RESCALE_TYPE: usize = 632;
    pub const RESCALE_UNITS: usize = 648;
    pub const RESCALE_SLOPE: usize = 664;
    pub const RESCALE_INTERCEPT: usize = 672;
    pub const MU_WATER: usize = 688;
}

/// Read an ISQ/RSQ/RAD header.
///
/// `first` holds the bytes already consumed from the stream (at most one
/// block); `reader` is positioned immediately after them. On success the
/// header record is fully populated and `header.header_size` gives the file
/// offset of the pixel data.
pub(crate) fn read_header(
    reader: &mut impl Read,
    mut raw: Vec<u8>,
    header: &mut ScancoHeader,
) -> Result<()> {
    if raw.len() < BLOCK_SIZE {
        return Err(Error::Truncated {
            missing: (BLOCK_SIZE - raw.len()) as u64,
        });
    }

    header.version = codec::strip_string(&raw[pre::VERSION..pre::VERSION + 16]);
    let data_type = codec::read_i32(&raw[pre::DATA_TYPE..]);
    header.patient_index = codec::read_i32(&raw[pre::PATIENT_INDEX..]);
    header.scanner_id = codec::read_i32(&raw[pre::SCANNER_ID..]);
    header.creation_date = codec::decode_vms_date(&raw[pre::CREATION_DATE..]);
    header.modification_date = header.creation_date.clone();

    let mut pixdim = [0i32; 3];
    let mut physdim = [0i32; 3];
    for axis in 0..3 {
        pixdim[axis] = codec::read_i32(&raw[pre::PIXDIM + axis * 4..]);
        physdim[axis] = codec::read_i32(&raw[pre::PHYSDIM + axis * 4..]);
    }

    let is_rad = data_type == RAD_DATA_TYPE || physdim[2] == 0;

    // Record the scan extent, then sanitize what the geometry derives from
    for axis in 0..3 {
        header.scan_dimensions_pixels[axis] = pixdim[axis];
        header.scan_dimensions_physical[axis] =
            f64::from(physdim[axis]) * if is_rad { 1e-6 } else { 1e-3 };
        if pixdim[axis] < 1 {
            pixdim[axis] = 1;
        }
        header.pixel.dimensions[axis] = pixdim[axis];
        let spacing = header.scan_dimensions_physical[axis] / f64::from(pixdim[axis]);
        header.pixel.spacing[axis] = if is_rad && axis == 2 {
            1.0
        } else if spacing > 0.0 {
            spacing
        } else {
            1.0
        };
        header.pixel.origin[axis] = 0.0;
    }

    if is_rad {
        header.measurement_index = codec::read_i32(&raw[rad::MEASUREMENT_INDEX..]);
        header.data_range[0] = f64::from(codec::read_i32(&raw[rad::DATA_MIN..]));
        header.data_range[1] = f64::from(codec::read_i32(&raw[rad::DATA_MAX..]));
        header.mu_scaling = f64::from(codec::read_i32(&raw[rad::MU_SCALING..]));
        header.patient_name =
            codec::strip_string(&raw[rad::PATIENT_NAME..rad::PATIENT_NAME + 40]);
        header.z_position = f64::from(codec::read_i32(&raw[rad::Z_POSITION..])) * 1e-3;
        header.sample_time = f64::from(codec::read_i32(&raw[rad::SAMPLE_TIME..])) * 1e-3;
        header.energy = f64::from(codec::read_i32(&raw[rad::ENERGY..])) * 1e-3;
        header.intensity = f64::from(codec::read_i32(&raw[rad::INTENSITY..])) * 1e-3;
        header.reference_line = f64::from(codec::read_i32(&raw[rad::REFERENCE_LINE..])) * 1e-3;
        header.start_position = f64::from(codec::read_i32(&raw[rad::START_POSITION..])) * 1e-3;
        header.end_position = f64::from(codec::read_i32(&raw[rad::END_POSITION..])) * 1e-3;
    } else {
        header.slice_thickness = f64::from(codec::read_i32(&raw[isq::SLICE_THICKNESS..])) * 1e-3;
        header.slice_increment = f64::from(codec::read_i32(&raw[isq::SLICE_INCREMENT..])) * 1e-3;
        header.start_position = f64::from(codec::read_i32(&raw[isq::START_POSITION..])) * 1e-3;
        header.end_position = header.start_position
            + f64::from(physdim[2]) * 1e-3 * f64::from(pixdim[2] - 1) / f64::from(pixdim[2]);
        header.data_range[0] = f64::from(codec::read_i32(&raw[isq::DATA_MIN..]));
        header.data_range[1] = f64::from(codec::read_i32(&raw[isq::DATA_MAX..]));
        header.mu_scaling = f64::from(codec::read_i32(&raw[isq::MU_SCALING..]));
        header.number_of_samples = codec::read_i32(&raw[isq::NUMBER_OF_SAMPLES..]);
        header.number_of_projections = codec::read_i32(&raw[isq::NUMBER_OF_PROJECTIONS..]);
        header.scan_distance = f64::from(codec::read_i32(&raw[isq::SCAN_DISTANCE..])) * 1e-3;
        header.scanner_type = codec::read_i32(&raw[isq::SCANNER_TYPE..]);
        header.sample_time = f64::from(codec::read_i32(&raw[isq::SAMPLE_TIME..])) * 1e-3;
        header.measurement_index = codec::read_i32(&raw[isq::MEASUREMENT_INDEX..]);
        header.site = codec::read_i32(&raw[isq::SITE..]);
        header.reference_line = f64::from(codec::read_i32(&raw[isq::REFERENCE_LINE..])) * 1e-3;
        header.reconstruction_alg = codec::read_i32(&raw[isq::RECONSTRUCTION_ALG..]);
        header.patient_name =
            codec::strip_string(&raw[isq::PATIENT_NAME..isq::PATIENT_NAME + 40]);
        header.energy = f64::from(codec::read_i32(&raw[isq::ENERGY..])) * 1e-3;
        header.intensity = f64::from(codec::read_i32(&raw[isq::INTENSITY..])) * 1e-3;
    }

    // Undo the millimetre quantization of the slice fields when the exact
    // spacing is recoverable from the physical extent
    if physdim[2] != 0 {
        let computed = f64::from(physdim[2]) * 1e-3 / f64::from(pixdim[2]);
        if (computed - header.slice_thickness).abs() < 1.1e-3 {
            header.slice_thickness = computed;
        }
        if (computed - header.slice_increment).abs() < 1.1e-3 {
            header.slice_increment = computed;
        }
    }

    header.pixel.component = ComponentKind::Int16;
    header.pixel.layout = PixelLayout::Scalar;
    header.pixel.component_tag = data_type;
    header.compression = Compression::None;

    let data_offset = codec::read_i32(&raw[pre::DATA_OFFSET..]);
    if data_offset < 0 {
        return Err(Error::BadHeader(format!(
            "negative data offset: {data_offset}"
        )));
    }
    let header_size = (u64::from(data_offset as u32) + 1) * BLOCK_SIZE as u64;
    header.header_size = header_size;

    if header_size as usize > raw.len() {
        let already = raw.len();
        raw.resize(header_size as usize, 0);
        let got = read_full(reader, &mut raw[already..])?;
        if already + got < header_size as usize {
            return Err(Error::Truncated {
                missing: (header_size as usize - already - got) as u64,
            });
        }
    }

    if header_size >= 2048 {
        read_extended_header(&raw, header_size, header)?;
    }

    if header.mu_scaling > 1.0 {
        header.rescale_slope /= header.mu_scaling;
    }

    debug!(
        version = %header.version,
        dimensions = ?header.pixel.dimensions,
        header_size = header.header_size,
        rad = is_rad,
        "decoded CT header"
    );

    header.validate()
}

/// Walk the extended multi-header chain and decode the calibration block
/// when one is present.
fn read_extended_header(raw: &[u8], header_size: u64, header: &mut ScancoHeader) -> Result<()> {
    let mut table = BLOCK_SIZE;
    let mut skipped: u64 = 1;
    if &raw[table + 8..table + 24] == b"MultiHeader     " {
        table += BLOCK_SIZE;
        skipped += 1;
    }

    let mut calibration: Option<(usize, usize)> = None;
    for entry in 0..4 {
        let descriptor = table + entry * 128;
        let blocks = codec::read_i32(&raw[descriptor + 24..]);
        if blocks < 0 {
            return Err(Error::BadHeader(format!(
                "invalid multi-header chain: negative block count {blocks}"
            )));
        }
        if (1 + skipped + blocks as u64) * BLOCK_SIZE as u64 > header_size {
            break;
        }
        if &raw[descriptor + 8..descriptor + 24] == b"Calibration     " {
            calibration = Some((
                (1 + skipped) as usize * BLOCK_SIZE,
                blocks as usize * BLOCK_SIZE,
            ));
            break;
        }
        skipped += blocks as u64;
    }

    if let Some((start, size)) = calibration {
        if size >= 1024 && start + size <= raw.len() {
            let body = &raw[start..start + size];
            header.calibration_data = codec::strip_string(
                &body[cal::CALIBRATION_DATA..cal::CALIBRATION_DATA + 64],
            );
            header.rescale_type = codec::read_i32(&body[cal::RESCALE_TYPE..]);
            header.rescale_units =
                codec::strip_string(&body[cal::RESCALE_UNITS..cal::RESCALE_UNITS + 16]);
            header.rescale_slope = codec::read_scanco_f64(&body[cal::RESCALE_SLOPE..]);
            header.rescale_intercept = codec::read_scanco_f64(&body[cal::RESCALE_INTERCEPT..]);
            header.mu_water = codec::read_scanco_f64(&body[cal::MU_WATER..]);
        }
    }

    Ok(())
}

/// Write an ISQ header: primary block, MultiHeader block, calibration
/// descriptor block and a two-block calibration body. Returns the number of
/// bytes written; pixel data starts right after.
pub(crate) fn write_header(
    out: &mut impl Write,
    header: &ScancoHeader,
    image_bytes: u64,
) -> Result<u64> {
    let mut block = [0u8; BLOCK_SIZE];

    codec::pad_string(&mut block[pre::VERSION..pre::VERSION + 16], CT_HEADER_V1);
    codec::write_i32(ISQ_DATA_TYPE, &mut block[pre::DATA_TYPE..]);
    codec::write_i32(image_bytes as i32, &mut block[pre::IMAGE_BYTES..]);
    codec::write_i32(
        (image_bytes / BLOCK_SIZE as u64) as i32,
        &mut block[pre::IMAGE_BLOCKS..],
    );
    codec::write_i32(header.patient_index, &mut block[pre::PATIENT_INDEX..]);
    codec::write_i32(header.scanner_id, &mut block[pre::SCANNER_ID..]);
    if header.creation_date.is_empty() {
        codec::write_i64(
            codec::current_vms_ticks() as i64,
            &mut block[pre::CREATION_DATE..],
        );
    } else {
        codec::encode_vms_date(&header.creation_date, &mut block[pre::CREATION_DATE..])?;
    }

    for axis in 0..3 {
        let dim = header.pixel.dimensions[axis];
        codec::write_i32(dim, &mut block[pre::PIXDIM + axis * 4..]);
        let physical_um = header.pixel.spacing[axis] * f64::from(dim) * 1e3;
        codec::write_i32(physical_um.round() as i32, &mut block[pre::PHYSDIM + axis * 4..]);
    }

    let millis = |value: f64| (value * 1e3).round() as i32;
    codec::write_i32(millis(header.slice_thickness), &mut block[isq::SLICE_THICKNESS..]);
    codec::write_i32(millis(header.slice_increment), &mut block[isq::SLICE_INCREMENT..]);
    codec::write_i32(millis(header.start_position), &mut block[isq::START_POSITION..]);
    codec::write_i32(header.data_range[0] as i32, &mut block[isq::DATA_MIN..]);
    codec::write_i32(header.data_range[1] as i32, &mut block[isq::DATA_MAX..]);
    codec::write_i32(header.mu_scaling as i32, &mut block[isq::MU_SCALING..]);
    codec::write_i32(header.number_of_samples, &mut block[isq::NUMBER_OF_SAMPLES..]);
    codec::write_i32(
        header.number_of_projections,
        &mut block[isq::NUMBER_OF_PROJECTIONS..],
    );
    codec::write_i32(millis(header.scan_distance), &mut block[isq::SCAN_DISTANCE..]);
    codec::write_i32(header.scanner_type, &mut block[isq::SCANNER_TYPE..]);
    codec::write_i32(millis(header.sample_time), &mut block[isq::SAMPLE_TIME..]);
    codec::write_i32(header.measurement_index, &mut block[isq::MEASUREMENT_INDEX..]);
    codec::write_i32(header.site, &mut block[isq::SITE..]);
    codec::write_i32(millis(header.reference_line), &mut block[isq::REFERENCE_LINE..]);
    codec::write_i32(header.reconstruction_alg, &mut block[isq::RECONSTRUCTION_ALG..]);
    codec::pad_string(
        &mut block[isq::PATIENT_NAME..isq::PATIENT_NAME + 40],
        &header.patient_name,
    );
    codec::write_i32(millis(header.energy), &mut block[isq::ENERGY..]);
    codec::write_i32(millis(header.intensity), &mut block[isq::INTENSITY..]);

    // Four extended blocks follow: MultiHeader, descriptor table, and the
    // two-block calibration body
    codec::write_i32(4, &mut block[pre::DATA_OFFSET..]);
    out.write_all(&block)?;

    let mut multi = [0u8; BLOCK_SIZE];
    multi[8..24].copy_from_slice(b"MultiHeader     ");
    out.write_all(&multi)?;

    let mut table = [0u8; BLOCK_SIZE];
    table[8..24].copy_from_slice(b"Calibration     ");
    codec::write_i32(2, &mut table[24..]);
    out.write_all(&table)?;

    let mut body = [0u8; 2 * BLOCK_SIZE];
    codec::pad_string(
        &mut body[cal::CALIBRATION_DATA..cal::CALIBRATION_DATA + 64],
        &header.calibration_data,
    );
    codec::write_i32(header.rescale_type, &mut body[cal::RESCALE_TYPE..]);
    codec::pad_string(
        &mut body[cal::RESCALE_UNITS..cal::RESCALE_UNITS + 16],
        &header.rescale_units,
    );
    // the reader folds MuScaling into the slope; store the raw value
    let slope = if header.mu_scaling > 1.0 {
        header.rescale_slope * header.mu_scaling
    } else {
        header.rescale_slope
    };
    codec::write_scanco_f64(slope, &mut body[cal::RESCALE_SLOPE..]);
    codec::write_scanco_f64(header.rescale_intercept, &mut body[cal::RESCALE_INTERCEPT..]);
    codec::write_scanco_f64(header.mu_water, &mut body[cal::MU_WATER..]);
    out.write_all(&body)?;

    Ok(5 * BLOCK_SIZE as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_header() -> ScancoHeader {
        let mut header = ScancoHeader::default();
        header.version = CT_HEADER_V1.to_string();
        header.patient_name = "TEST PATIENT".to_string();
        header.patient_index = 78;
        header.scanner_id = 2135;
        header.creation_date = "3-JUN-2019 14:05:07.123".to_string();
        header.pixel.dimensions = [16, 16, 8];
        header.pixel.spacing = [0.036, 0.036, 0.036];
        header.pixel.component = ComponentKind::Int16;
        header.slice_thickness = 0.036;
        header.slice_increment = 0.036;
        header.start_position = 75.0;
        header.data_range = [-2813.0, 32767.0];
        header.mu_scaling = 4096.0;
        header.number_of_samples = 1024;
        header.number_of_projections = 500;
        header.scan_distance = 36.864;
        header.scanner_type = 10;
        header.sample_time = 0.4;
        header.measurement_index = 4937;
        header.site = 5;
        header.reference_line = 0.0;
        header.reconstruction_alg = 3;
        header.energy = 45.0;
        header.intensity = 0.177;
        header.rescale_type = 2;
        header.rescale_units = "mg HA/ccm".to_string();
        header.calibration_data = "45 kVp, BH: 200 mg HA/ccm".to_string();
        header.rescale_slope = 0.347136;
        header.rescale_intercept = -1000.0;
        header.mu_water = 0.7033;
        header
    }

    fn roundtrip(header: &ScancoHeader) -> ScancoHeader {
        let mut bytes = Vec::new();
        write_header(&mut bytes, header, 16 * 16 * 8 * 2).unwrap();
        assert_eq!(bytes.len(), 2560);

        let first = bytes[..BLOCK_SIZE].to_vec();
        let mut rest = Cursor::new(&bytes[BLOCK_SIZE..]);
        let mut reread = ScancoHeader::default();
        read_header(&mut rest, first, &mut reread).unwrap();
        reread
    }

    #[test]
    fn test_header_roundtrip_preserves_fields() {
        let header = sample_header();
        let reread = roundtrip(&header);

        assert_eq!(reread.version, CT_HEADER_V1);
        assert_eq!(reread.patient_name, header.patient_name);
        assert_eq!(reread.patient_index, 78);
        assert_eq!(reread.scanner_id, 2135);
        assert_eq!(reread.creation_date, header.creation_date);
        assert_eq!(reread.pixel.dimensions, [16, 16, 8]);
        assert_eq!(reread.header_size, 2560);
        assert!((reread.slice_thickness - 0.036).abs() < 1e-3);
        assert!((reread.start_position - 75.0).abs() < 1e-3);
        assert_eq!(reread.data_range, [-2813.0, 32767.0]);
        assert_eq!(reread.mu_scaling, 4096.0);
        assert_eq!(reread.number_of_samples, 1024);
        assert_eq!(reread.number_of_projections, 500);
        assert!((reread.scan_distance - 36.864).abs() < 1e-3);
        assert_eq!(reread.scanner_type, 10);
        assert_eq!(reread.site, 5);
        assert!((reread.energy - 45.0).abs() < 1e-3);
        assert!((reread.intensity - 0.177).abs() < 1e-3);
        assert_eq!(reread.rescale_units, "mg HA/ccm");
        assert_eq!(reread.calibration_data, header.calibration_data);
        assert!((reread.rescale_slope - 0.347136).abs() < 1e-9);
        assert_eq!(reread.rescale_intercept, -1000.0);
        assert_eq!(reread.mu_water, 0.7033);
    }

    #[test]
    fn test_spacing_derived_from_physical_extent() {
        let header = sample_header();
        let reread = roundtrip(&header);
        for axis in 0..3 {
            assert!(
                (reread.pixel.spacing[axis] - 0.036).abs() < 1e-6,
                "axis {axis}: {}",
                reread.pixel.spacing[axis]
            );
        }
    }

    #[test]
    fn test_rad_variant_selected_by_data_type() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, &sample_header(), 16 * 16 * 8 * 2).unwrap();
        // flip the data type to the radiograph code
        codec::write_i32(RAD_DATA_TYPE, &mut bytes[pre::DATA_TYPE..]);
        // RAD stores its measurement index in the first payload word
        codec::write_i32(12345, &mut bytes[rad::MEASUREMENT_INDEX..]);

        let first = bytes[..BLOCK_SIZE].to_vec();
        let mut rest = Cursor::new(&bytes[BLOCK_SIZE..]);
        let mut header = ScancoHeader::default();
        read_header(&mut rest, first, &mut header).unwrap();

        assert_eq!(header.measurement_index, 12345);
        assert_eq!(header.pixel.spacing[2], 1.0);
    }

    #[test]
    fn test_truncated_extended_header_reported() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, &sample_header(), 16 * 16 * 8 * 2).unwrap();
        bytes.truncate(1024);

        let first = bytes[..BLOCK_SIZE].to_vec();
        let mut rest = Cursor::new(&bytes[BLOCK_SIZE..]);
        let mut header = ScancoHeader::default();
        let err = read_header(&mut rest, first, &mut header).unwrap_err();
        assert!(matches!(err, Error::Truncated { missing: 1536 }));
    }

    #[test]
    fn test_missing_calibration_block_keeps_defaults() {
        let mut bytes = Vec::new();
        write_header(&mut bytes, &sample_header(), 16 * 16 * 8 * 2).unwrap();
        // erase the descriptor table; the walk finds nothing
        bytes[1024..1536].fill(0);

        let first = bytes[..BLOCK_SIZE].to_vec();
        let mut rest = Cursor::new(&bytes[BLOCK_SIZE..]);
        let mut header = ScancoHeader::default();
        read_header(&mut rest, first, &mut header).unwrap();

        assert_eq!(header.rescale_units, "");
        // slope still folds in the MuScaling factor
        assert!((header.rescale_slope - 1.0 / 4096.0).abs() < 1e-12);
    }
}
