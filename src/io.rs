//! File-level operations: format sniffing, extension dispatch, and the
//! read/write state machines tying the header and pixel codecs together.
//!
//! Reads always trust the content sniff; the file extension only selects the
//! output dialect on write (ISQ and AIM are writable, RSQ and RAD are
//! read-only).

use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::aim;
use crate::error::{Error, Result};
use crate::header::{ComponentKind, PixelLayout, ScancoHeader, ScancoVersion};
use crate::image::ScancoImage;
use crate::isq;
use crate::pixels;
use crate::rescale::Rescale;

/// Read until the buffer is full or the stream ends; returns the number of
/// bytes obtained. Short reads are left for the caller to diagnose.
pub(crate) fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> Result<usize> {
    let mut offset = 0;
    while offset < buf.len() {
        match reader.read(&mut buf[offset..]) {
            Ok(0) => break,
            Ok(n) => offset += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(offset)
}

/// Check whether a file starts with a recognized Scanco signature.
///
/// Any I/O problem answers `false`; this probe never errors.
pub fn can_read<P: AsRef<Path>>(path: P) -> bool {
    let Ok(mut file) = File::open(path.as_ref()) else {
        return false;
    };
    let mut head = [0u8; 16];
    match read_full(&mut file, &mut head) {
        Ok(16) => ScancoVersion::detect(&head) != ScancoVersion::Unknown,
        _ => false,
    }
}

/// Read only the header of a Scanco file.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<ScancoHeader> {
    let mut reader = ScancoReader::open(path)?;
    reader.read_header()?;
    Ok(reader.into_header())
}

/// Load a Scanco volume: header, decompressed pixels, and calibrated
/// rescaling applied in place.
pub fn load<P: AsRef<Path>>(path: P) -> Result<ScancoImage> {
    let mut reader = ScancoReader::open(path)?;
    reader.read_header()?;
    let mut data = vec![0u8; reader.header().data_size()];
    reader.read_pixels(&mut data)?;
    let header = reader.into_header();

    let rescale = Rescale::from_header(&header);
    if !rescale.is_identity() {
        rescale.apply(header.pixel.component, &mut data);
    }
    ScancoImage::from_parts(header, data)
}

/// Write a volume as ISQ or AIM, selected by the output extension. The
/// rescaling transform is inverted so a re-read reproduces the input.
pub fn save<P: AsRef<Path>>(image: &ScancoImage, path: P) -> Result<()> {
    image.header().validate()?;
    let mut writer = ScancoWriter::create(path)?;

    let mut data = image.data().to_vec();
    let rescale = Rescale::from_header(image.header());
    if !rescale.is_identity() {
        rescale.invert(image.header().pixel.component, &mut data);
    }

    writer.write_header(image.header(), data.len() as u64)?;
    writer.write_pixels(&data)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    Unread,
    HeaderRead,
    PixelsRead,
}

/// Sequential reader over one Scanco file.
///
/// Operations must follow header-then-pixels order; anything else fails
/// with [`Error::Sequence`].
#[derive(Debug)]
pub struct ScancoReader {
    file: File,
    header: ScancoHeader,
    state: ReadState,
}

impl ScancoReader {
    /// Open a file for reading. The format is not inspected yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::EmptyFileName);
        }
        Ok(Self {
            file: File::open(path)?,
            header: ScancoHeader::default(),
            state: ReadState::Unread,
        })
    }

    /// Header decoded so far (default-initialized before `read_header`).
    pub fn header(&self) -> &ScancoHeader {
        &self.header
    }

    /// Consume the reader, keeping the header.
    pub fn into_header(self) -> ScancoHeader {
        self.header
    }

    /// Sniff the version and decode the full header.
    pub fn read_header(&mut self) -> Result<&ScancoHeader> {
        if self.state != ReadState::Unread {
            return Err(Error::Sequence("header was already read".into()));
        }

        let mut first = vec![0u8; isq::BLOCK_SIZE];
        let got = read_full(&mut self.file, &mut first)?;
        first.truncate(got);
        if got < 16 {
            return Err(Error::UnrecognizedVersion);
        }

        match ScancoVersion::detect(&first[..16]) {
            ScancoVersion::CtHeaderV1 => {
                isq::read_header(&mut self.file, first, &mut self.header)?;
            }
            version @ (ScancoVersion::AimV020 | ScancoVersion::AimV030) => {
                aim::read_header(&mut self.file, first, version, &mut self.header)?;
            }
            ScancoVersion::Unknown => return Err(Error::UnrecognizedVersion),
        }

        self.state = ReadState::HeaderRead;
        Ok(&self.header)
    }

    /// Decode the pixel payload into `out`, which must hold at least
    /// `header.data_size()` bytes. The buffer ends up in host byte order.
    pub fn read_pixels(&mut self, out: &mut [u8]) -> Result<()> {
        if self.state != ReadState::HeaderRead {
            return Err(Error::Sequence(
                "pixels requested before the header was read".into(),
            ));
        }
        let needed = self.header.data_size();
        if out.len() < needed {
            return Err(Error::Sequence(format!(
                "pixel buffer holds {} bytes, {needed} required",
                out.len()
            )));
        }

        self.file.seek(SeekFrom::Start(self.header.header_size))?;
        pixels::read_pixels(&mut self.file, &self.header, &mut out[..needed])?;

        if cfg!(target_endian = "big") {
            pixels::swap_bytes_in_place(
                &mut out[..needed],
                self.header.pixel.component.byte_size(),
            );
        }

        self.state = ReadState::PixelsRead;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    Unwritten,
    HeaderWritten,
    PixelsWritten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteFormat {
    Isq,
    Aim,
}

fn write_format_for(path: &Path) -> Result<WriteFormat> {
    if path.as_os_str().is_empty() {
        return Err(Error::EmptyFileName);
    }
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "isq" => Ok(WriteFormat::Isq),
        "aim" => Ok(WriteFormat::Aim),
        "rsq" | "rad" => Err(Error::UnsupportedWriteFormat(format!(
            "{extension} files are read-only"
        ))),
        _ => Err(Error::UnrecognizedExtension(
            path.to_string_lossy().into_owned(),
        )),
    }
}

/// Sequential writer producing one ISQ or AIM file.
pub struct ScancoWriter {
    file: BufWriter<File>,
    format: WriteFormat,
    state: WriteState,
    expected_bytes: u64,
    element_size: usize,
}

impl ScancoWriter {
    /// Create the output file; the dialect comes from the extension.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let format = write_format_for(path)?;
        Ok(Self {
            file: BufWriter::new(File::create(path)?),
            format,
            state: WriteState::Unwritten,
            expected_bytes: 0,
            element_size: 1,
        })
    }

    /// Write the header for a payload of `image_bytes` bytes.
    pub fn write_header(&mut self, header: &ScancoHeader, image_bytes: u64) -> Result<u64> {
        if self.state != WriteState::Unwritten {
            return Err(Error::Sequence("header was already written".into()));
        }

        let header_size = match self.format {
            WriteFormat::Isq => {
                if header.pixel.component != ComponentKind::Int16
                    || header.pixel.layout != PixelLayout::Scalar
                {
                    return Err(Error::UnsupportedWriteFormat(format!(
                        "ISQ stores 16-bit signed scalars, not {} pixels",
                        header.pixel.component
                    )));
                }
                isq::write_header(&mut self.file, header, image_bytes)?
            }
            WriteFormat::Aim => aim::write_header(&mut self.file, header, image_bytes)?,
        };

        debug!(format = ?self.format, header_size, image_bytes, "wrote header");
        self.expected_bytes = image_bytes;
        self.element_size = header.pixel.component.byte_size();
        self.state = WriteState::HeaderWritten;
        Ok(header_size)
    }

    /// Write the raw pixel payload announced to `write_header`.
    pub fn write_pixels(&mut self, data: &[u8]) -> Result<()> {
        if self.state != WriteState::HeaderWritten {
            return Err(Error::Sequence(
                "pixels written before the header".into(),
            ));
        }
        if data.len() as u64 != self.expected_bytes {
            return Err(Error::Sequence(format!(
                "pixel data holds {} bytes, header announced {}",
                data.len(),
                self.expected_bytes
            )));
        }

        if cfg!(target_endian = "big") && self.element_size > 1 {
            let mut swapped = data.to_vec();
            pixels::swap_bytes_in_place(&mut swapped, self.element_size);
            self.file.write_all(&swapped)?;
        } else {
            self.file.write_all(data)?;
        }
        self.file.flush()?;
        self.state = WriteState::PixelsWritten;
        Ok(())
    }
}
