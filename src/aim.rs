//! AIM header codec.
//!
//! An AIM file is a pre-header of five section lengths, an image structure,
//! and a free-form ASCII processing log, preceded in v030 by a 16-byte
//! version string. The v020 dialect stores 32-bit header integers and
//! Scanco-float element sizes; v030 stores 64-bit integers and micrometre
//! element sizes.

use std::io::Read;
use std::io::Write;

use tracing::{debug, warn};

use crate::codec;
use crate::error::{Error, Result};
use crate::header::{
    canonical_type_word, component_from_type_word, Compression, ScancoHeader, ScancoVersion,
    AIM_V020, AIM_V030,
};
use crate::io::read_full;

/// v020 image structure size in bytes.
const STRUCT_SIZE_V020: usize = 140;
/// v030 image structure size in bytes.
const STRUCT_SIZE_V030: usize = 208;
/// v020 pre-header: five 4-byte lengths.
const PRE_HEADER_V020: usize = 20;
/// v030 pre-header: five 8-byte lengths.
const PRE_HEADER_V030: usize = 40;
/// Upper bound accepted for a processing log, far beyond anything real.
const MAX_LOG_SIZE: i64 = 1 << 24;

fn read_header_int(data: &[u8], int_size: usize) -> i64 {
    if int_size == 8 {
        codec::read_i64(data)
    } else {
        i64::from(codec::read_i32(data))
    }
}

/// Read an AIM header (either dialect).
///
/// `raw` holds the bytes already consumed from the stream; `reader` is
/// positioned immediately after them.
pub(crate) fn read_header(
    reader: &mut impl Read,
    mut raw: Vec<u8>,
    version: ScancoVersion,
    header: &mut ScancoHeader,
) -> Result<()> {
    let int_size = version.int_size();
    let skip = match version {
        ScancoVersion::AimV030 => {
            header.version = AIM_V030.to_string();
            16
        }
        _ => {
            header.version = AIM_V020.to_string();
            0
        }
    };

    if raw.len() < skip + 3 * int_size {
        return Err(Error::Truncated {
            missing: (skip + 3 * int_size - raw.len()) as u64,
        });
    }

    let pre_len = read_header_int(&raw[skip..], int_size);
    let struct_len = read_header_int(&raw[skip + int_size..], int_size);
    let log_len = read_header_int(&raw[skip + 2 * int_size..], int_size);

    let expected_struct = match version {
        ScancoVersion::AimV030 => STRUCT_SIZE_V030,
        _ => STRUCT_SIZE_V020,
    };
    if pre_len < (3 * int_size) as i64 || pre_len > 4096 {
        return Err(Error::BadHeader(format!(
            "inconsistent pre-header length: {pre_len}"
        )));
    }
    if struct_len < expected_struct as i64 || struct_len > 4096 {
        return Err(Error::BadHeader(format!(
            "inconsistent image structure length: {struct_len} (expected at least {expected_struct})"
        )));
    }
    if log_len < 0 || log_len > MAX_LOG_SIZE {
        return Err(Error::BadHeader(format!(
            "inconsistent processing log length: {log_len}"
        )));
    }

    let total = skip + (pre_len + struct_len + log_len) as usize;
    header.header_size = total as u64;

    if total > raw.len() {
        let already = raw.len();
        raw.resize(total, 0);
        let got = read_full(reader, &mut raw[already..])?;
        if already + got < total {
            return Err(Error::Truncated {
                missing: (total - already - got) as u64,
            });
        }
    }

    let base = skip + pre_len as usize;
    match version {
        ScancoVersion::AimV030 => read_struct_v030(&raw[base..base + STRUCT_SIZE_V030], header)?,
        _ => read_struct_v020(&raw[base..base + STRUCT_SIZE_V020], header)?,
    }

    let log_start = base + struct_len as usize;
    parse_processing_log(&raw[log_start..log_start + log_len as usize], header);

    if header.mu_scaling > 1.0 {
        header.rescale_slope /= header.mu_scaling;
    }

    // these two are not in the processing log
    header.slice_thickness = header.pixel.spacing[2];
    header.slice_increment = header.pixel.spacing[2];

    debug!(
        version = %header.version,
        dimensions = ?header.pixel.dimensions,
        component = %header.pixel.component,
        header_size = header.header_size,
        "decoded AIM header"
    );

    header.validate()
}

fn read_struct_v020(data: &[u8], header: &mut ScancoHeader) -> Result<()> {
    // six 4-byte words: Version, ProcLog, Data, ID, Reference, Type
    let type_word = codec::read_i32(&data[20..]);
    apply_type_word(type_word, header)?;

    for axis in 0..3 {
        let dim = codec::read_i32(&data[36 + axis * 4..]);
        if dim <= 0 {
            return Err(Error::BadHeader(format!("dimension {axis} is zero")));
        }
        header.pixel.dimensions[axis] = dim;

        let size = f64::from(codec::read_scanco_f32(&data[108 + axis * 4..]));
        header.pixel.spacing[axis] = if size == 0.0 { 1.0 } else { size };

        let position = f64::from(codec::read_i32(&data[24 + axis * 4..]));
        header.pixel.origin[axis] = position * header.pixel.spacing[axis];
    }
    Ok(())
}

fn read_struct_v030(data: &[u8], header: &mut ScancoHeader) -> Result<()> {
    // four 4-byte words: Version, ID, Reference, Type
    let type_word = codec::read_i32(&data[12..]);
    apply_type_word(type_word, header)?;

    for axis in 0..3 {
        let dim = codec::read_i64(&data[40 + axis * 8..]);
        if dim <= 0 {
            return Err(Error::BadHeader(format!("dimension {axis} is zero")));
        }
        header.pixel.dimensions[axis] = dim as i32;

        // element size is an integer micrometre count
        let size = 1e-6 * codec::read_i64(&data[184 + axis * 8..]) as f64;
        header.pixel.spacing[axis] = if size == 0.0 { 1.0 } else { size };

        let position = codec::read_i64(&data[16 + axis * 8..]) as f64;
        header.pixel.origin[axis] = position * header.pixel.spacing[axis];
    }
    Ok(())
}

fn apply_type_word(word: i32, header: &mut ScancoHeader) -> Result<()> {
    let (kind, layout, compression) = component_from_type_word(word)?;
    header.pixel.component_tag = word;
    header.pixel.component = kind;
    header.pixel.layout = layout;
    header.compression = compression;
    Ok(())
}

fn log_int(key: &str, value: &str) -> i64 {
    match value.split_whitespace().next().unwrap_or("").parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(key, value, "unparseable integer in processing log");
            0
        }
    }
}

fn log_float(key: &str, value: &str) -> f64 {
    match value.split_whitespace().next().unwrap_or("").parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            warn!(key, value, "unparseable number in processing log");
            0.0
        }
    }
}

fn log_triplet_int(key: &str, value: &str, target: &mut [i32; 3]) {
    for (axis, token) in value.split_whitespace().take(3).enumerate() {
        target[axis] = log_int(key, token) as i32;
    }
}

fn log_triplet_float(key: &str, value: &str, scale: f64, target: &mut [f64; 3]) {
    for (axis, token) in value.split_whitespace().take(3).enumerate() {
        target[axis] = log_float(key, token) * scale;
    }
}

/// Parse the ASCII processing log into header fields.
///
/// Lines starting with `!` are comments; keys are separated from values by
/// two or more spaces; unknown keys are ignored.
fn parse_processing_log(log: &[u8], header: &mut ScancoHeader) {
    let text = String::from_utf8_lossy(log);
    for line in text.split('\n') {
        let line = line.trim_end_matches(['\r', '\0']);
        if line.is_empty() || line.starts_with('!') {
            continue;
        }
        let Some(split) = line.find("  ") else {
            continue;
        };
        let key = &line[..split];
        let value = line[split..].trim_start_matches(' ').trim_end_matches(' ');

        match key {
            "Time" => header.modification_date = value.to_string(),
            "Original Creation-Date" => header.creation_date = value.to_string(),
            "Orig-ISQ-Dim-p" => {
                log_triplet_int(key, value, &mut header.scan_dimensions_pixels);
            }
            "Orig-ISQ-Dim-um" => {
                log_triplet_float(key, value, 1e-3, &mut header.scan_dimensions_physical);
            }
            "Patient Name" => header.patient_name = value.to_string(),
            "Index Patient" => header.patient_index = log_int(key, value) as i32,
            "Index Measurement" => header.measurement_index = log_int(key, value) as i32,
            "Site" => header.site = log_int(key, value) as i32,
            "Scanner ID" => header.scanner_id = log_int(key, value) as i32,
            "Scanner type" => header.scanner_type = log_int(key, value) as i32,
            "Position Slice 1 [um]" => {
                header.start_position = log_float(key, value) * 1e-3;
                header.end_position = header.start_position
                    + header.pixel.spacing[2] * f64::from(header.pixel.dimensions[2] - 1);
            }
            "No. samples" => header.number_of_samples = log_int(key, value) as i32,
            "No. projections per 180" => {
                header.number_of_projections = log_int(key, value) as i32;
            }
            "Scan Distance [um]" => header.scan_distance = log_float(key, value) * 1e-3,
            "Integration time [us]" => header.sample_time = log_float(key, value) * 1e-3,
            "Reference line [um]" => header.reference_line = log_float(key, value) * 1e-3,
            "Reconstruction-Alg." => header.reconstruction_alg = log_int(key, value) as i32,
            "Energy [V]" => header.energy = log_float(key, value) * 1e-3,
            "Intensity [uA]" => header.intensity = log_float(key, value) * 1e-3,
            "Mu_Scaling" => header.mu_scaling = log_int(key, value) as f64,
            "Minimum data value" => header.data_range[0] = log_float(key, value),
            "Maximum data value" => header.data_range[1] = log_float(key, value),
            "Calib. default unit type" => header.rescale_type = log_int(key, value) as i32,
            "Calibration Data" => header.calibration_data = value.to_string(),
            "Density: unit" => header.rescale_units = value.to_string(),
            "Density: slope" => header.rescale_slope = log_float(key, value),
            "Density: intercept" => header.rescale_intercept = log_float(key, value),
            "HU: mu water" => header.mu_water = log_float(key, value),
            _ => warn!(key, "ignoring unknown processing log key"),
        }
    }
}

const LOG_RULE: &str =
    "!-------------------------------------------------------------------------------\n";

fn log_line(log: &mut String, key: &str, value: impl std::fmt::Display) {
    log.push_str(&format!("{key:<30}{value}\n"));
}

/// Compose the processing log for a header, in a fixed key order with fixed
/// column alignment so the byte output is reproducible.
pub(crate) fn compose_processing_log(header: &ScancoHeader, time: &str) -> String {
    let creation = if header.creation_date.is_empty() {
        time
    } else {
        header.creation_date.as_str()
    };
    let p = &header.scan_dimensions_pixels;
    let um = &header.scan_dimensions_physical;
    // the reader folds MuScaling into the slope; store the raw value
    let slope = if header.mu_scaling > 1.0 {
        header.rescale_slope * header.mu_scaling
    } else {
        header.rescale_slope
    };

    let mut log = String::new();
    log.push_str("! \n");
    log.push_str("! Processing Log \n");
    log.push_str("!\n");
    log.push_str(LOG_RULE);
    log_line(&mut log, "Created by", "scanco");
    log_line(&mut log, "Time", time);
    log_line(&mut log, "Original Creation-Date", creation);
    log_line(&mut log, "Orig-ISQ-Dim-p", format!("{} {} {}", p[0], p[1], p[2]));
    log_line(
        &mut log,
        "Orig-ISQ-Dim-um",
        format!("{:.3} {:.3} {:.3}", um[0] * 1e3, um[1] * 1e3, um[2] * 1e3),
    );
    log.push_str(LOG_RULE);
    log_line(&mut log, "Patient Name", &header.patient_name);
    log_line(&mut log, "Index Patient", header.patient_index);
    log_line(&mut log, "Index Measurement", header.measurement_index);
    log.push_str(LOG_RULE);
    log_line(&mut log, "Site", header.site);
    log_line(&mut log, "Scanner ID", header.scanner_id);
    log_line(&mut log, "Scanner type", header.scanner_type);
    log_line(
        &mut log,
        "Position Slice 1 [um]",
        format!("{:.3}", header.start_position * 1e3),
    );
    log_line(&mut log, "No. samples", header.number_of_samples);
    log_line(&mut log, "No. projections per 180", header.number_of_projections);
    log_line(
        &mut log,
        "Scan Distance [um]",
        format!("{:.3}", header.scan_distance * 1e3),
    );
    log_line(
        &mut log,
        "Integration time [us]",
        format!("{:.3}", header.sample_time * 1e3),
    );
    log_line(
        &mut log,
        "Reference line [um]",
        format!("{:.3}", header.reference_line * 1e3),
    );
    log_line(&mut log, "Reconstruction-Alg.", header.reconstruction_alg);
    log_line(&mut log, "Energy [V]", format!("{:.3}", header.energy * 1e3));
    log_line(
        &mut log,
        "Intensity [uA]",
        format!("{:.3}", header.intensity * 1e3),
    );
    log.push_str(LOG_RULE);
    log_line(&mut log, "Mu_Scaling", header.mu_scaling as i64);
    log_line(&mut log, "Calibration Data", &header.calibration_data);
    log_line(&mut log, "Calib. default unit type", header.rescale_type);
    log_line(&mut log, "Density: unit", &header.rescale_units);
    log_line(&mut log, "Density: slope", slope);
    log_line(&mut log, "Density: intercept", header.rescale_intercept);
    log_line(&mut log, "HU: mu water", header.mu_water);
    log.push_str(LOG_RULE);
    log_line(&mut log, "Minimum data value", header.data_range[0]);
    log_line(&mut log, "Maximum data value", header.data_range[1]);
    log
}

/// Type word to store on write: the original tag when it still describes the
/// payload being written (raw samples), the canonical word otherwise.
fn write_type_word(header: &ScancoHeader) -> i32 {
    if let Ok((kind, layout, compression)) = component_from_type_word(header.pixel.component_tag) {
        if kind == header.pixel.component
            && layout == header.pixel.layout
            && compression == Compression::None
        {
            return header.pixel.component_tag;
        }
    }
    canonical_type_word(header.pixel.component)
}

fn write_struct_v020(header: &ScancoHeader) -> [u8; STRUCT_SIZE_V020] {
    let mut data = [0u8; STRUCT_SIZE_V020];
    codec::write_scanco_f32(1.6, &mut data[0..]);
    codec::write_i32(write_type_word(header), &mut data[20..]);
    for axis in 0..3 {
        let spacing = header.pixel.spacing[axis];
        let position = header.pixel.origin[axis] / spacing;
        codec::write_i32(position.round() as i32, &mut data[24 + axis * 4..]);
        codec::write_i32(header.pixel.dimensions[axis], &mut data[36 + axis * 4..]);
        codec::write_scanco_f32(spacing as f32, &mut data[108 + axis * 4..]);
    }
    data
}

fn write_struct_v030(header: &ScancoHeader) -> [u8; STRUCT_SIZE_V030] {
    let mut data = [0u8; STRUCT_SIZE_V030];
    codec::write_i32(write_type_word(header), &mut data[12..]);
    for axis in 0..3 {
        let spacing = header.pixel.spacing[axis];
        let position = header.pixel.origin[axis] / spacing;
        codec::write_i64(position.round() as i64, &mut data[16 + axis * 8..]);
        codec::write_i64(
            i64::from(header.pixel.dimensions[axis]),
            &mut data[40 + axis * 8..],
        );
        codec::write_i64(
            (spacing * 1e6).round() as i64,
            &mut data[184 + axis * 8..],
        );
    }
    data
}

/// Write an AIM header in the dialect named by the header's version string
/// (anything other than v030 is written as v020). Returns the total header
/// size; pixel data starts right after.
pub(crate) fn write_header(
    out: &mut impl Write,
    header: &ScancoHeader,
    image_bytes: u64,
) -> Result<u64> {
    let log = compose_processing_log(header, &codec::current_date_string());
    let log_len = log.len();

    let total = if header.format_version() == ScancoVersion::AimV030 {
        let mut version = [0u8; 16];
        version[..15].copy_from_slice(AIM_V030.as_bytes());
        out.write_all(&version)?;

        let mut pre = [0u8; PRE_HEADER_V030];
        for (slot, value) in [
            PRE_HEADER_V030 as i64,
            STRUCT_SIZE_V030 as i64,
            log_len as i64,
            image_bytes as i64,
            0,
        ]
        .into_iter()
        .enumerate()
        {
            codec::write_i64(value, &mut pre[slot * 8..]);
        }
        out.write_all(&pre)?;
        out.write_all(&write_struct_v030(header))?;
        16 + PRE_HEADER_V030 + STRUCT_SIZE_V030 + log_len
    } else {
        let mut pre = [0u8; PRE_HEADER_V020];
        for (slot, value) in [
            PRE_HEADER_V020 as i32,
            STRUCT_SIZE_V020 as i32,
            log_len as i32,
            image_bytes as i32,
            0,
        ]
        .into_iter()
        .enumerate()
        {
            codec::write_i32(value, &mut pre[slot * 4..]);
        }
        out.write_all(&pre)?;
        out.write_all(&write_struct_v020(header))?;
        PRE_HEADER_V020 + STRUCT_SIZE_V020 + log_len
    };

    out.write_all(log.as_bytes())?;
    Ok(total as u64)
}
