//! RIFF/WAVE Loading
//!
//! Walks the chunk list of a WAVE container and returns the raw `data`
//! payload. Only `fmt ` and `data` are interpreted; every other chunk is
//! skipped by its declared size.
//!
//! ```text
//! "RIFF" | u32 size | "WAVE" | { id[4] | u32 size | payload[size] | pad? }*
//! ```
//!
//! Odd-sized chunks are followed by one pad byte. The pad is skipped when
//! present and tolerated when the file ends right after the payload.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::{CodecError, CodecResult};
use crate::format::{DeviceFormat, SampleEncoding};

const RIFF_ID: [u8; 4] = *b"RIFF";
const WAVE_ID: [u8; 4] = *b"WAVE";
const FMT_ID: [u8; 4] = *b"fmt ";
const DATA_ID: [u8; 4] = *b"data";

/// Minimum body length of a `fmt ` chunk (PCMWAVEFORMAT)
const FMT_MIN_SIZE: usize = 16;

/// Body length of a `fmt ` chunk carrying the WAVEFORMATEXTENSIBLE tail
const FMT_EXTENSIBLE_SIZE: usize = 40;

/// Fields of the `fmt ` chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveFormat {
    pub format_tag: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub avg_bytes_per_sec: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,

    /// Extensible tail: significant bits per sample
    pub valid_bits_per_sample: Option<u16>,
    /// Extensible tail: speaker position mask
    pub channel_mask: Option<u32>,
    /// Extensible tail: sub-format GUID in `GUID::to_u128` order
    pub sub_format: Option<u128>,
}

impl WaveFormat {
    fn parse(body: &[u8]) -> Self {
        let u16_at = |at: usize| u16::from_le_bytes([body[at], body[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes([body[at], body[at + 1], body[at + 2], body[at + 3]]);

        let mut format = Self {
            format_tag: u16_at(0),
            channels: u16_at(2),
            sample_rate: u32_at(4),
            avg_bytes_per_sec: u32_at(8),
            block_align: u16_at(12),
            bits_per_sample: u16_at(14),
            valid_bits_per_sample: None,
            channel_mask: None,
            sub_format: None,
        };

        // cbSize at 16 announces the 22-byte extensible tail
        if body.len() >= FMT_EXTENSIBLE_SIZE && u16_at(16) >= 22 {
            format.valid_bits_per_sample = Some(u16_at(18));
            format.channel_mask = Some(u32_at(20));
            format.sub_format = Some(guid_to_u128(&body[24..40]));
        }
        format
    }

    /// Sample encoding declared by the tag, or by the sub-format when extensible
    pub fn encoding(&self) -> SampleEncoding {
        let mut device = DeviceFormat::new(self.format_tag, self.channels, self.bits_per_sample, self.sample_rate);
        device.sub_format = self.sub_format;
        device.encoding()
    }
}

/// On-disk GUID (`Data1..3` little-endian, `Data4` bytes) to its `u128` value
fn guid_to_u128(raw: &[u8]) -> u128 {
    let data1 = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as u128;
    let data2 = u16::from_le_bytes([raw[4], raw[5]]) as u128;
    let data3 = u16::from_le_bytes([raw[6], raw[7]]) as u128;
    let mut data4 = [0u8; 8];
    data4.copy_from_slice(&raw[8..16]);
    (data1 << 96) | (data2 << 80) | (data3 << 64) | u64::from_be_bytes(data4) as u128
}

/// Decoded WAVE file: format block (if any) and raw PCM payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WaveAsset {
    pub format: Option<WaveFormat>,
    pub data: Vec<u8>,
}

impl WaveAsset {
    /// Check the declared format is the converter's canonical input
    pub fn ensure_pcm16(&self) -> CodecResult<()> {
        match self.format {
            Some(fmt)
                if fmt.encoding() == SampleEncoding::Pcm { bits: 16 }
                    && fmt.valid_bits_per_sample.map_or(true, |bits| bits == 16) =>
            {
                Ok(())
            }
            Some(fmt) => Err(CodecError::NotSupported(format!(
                "WAVE payload is tag {:#06x} at {}-bit, expected 16-bit PCM",
                fmt.format_tag, fmt.bits_per_sample
            ))),
            None => Err(CodecError::NotSupported(
                "WAVE file has no fmt chunk to validate".into(),
            )),
        }
    }

    /// Number of whole frames in the payload, if the format is known
    pub fn frame_count(&self) -> Option<usize> {
        let align = self.format?.block_align as usize;
        (align > 0).then(|| self.data.len() / align)
    }

    /// Playback duration, if the format is known
    pub fn duration(&self) -> Option<Duration> {
        let rate = self.format?.sample_rate;
        if rate == 0 {
            return None;
        }
        let frames = self.frame_count()?;
        Some(Duration::from_secs_f64(frames as f64 / rate as f64))
    }
}

/// Bounds-checked cursor over the file bytes
struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, offset: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.offset
    }

    fn take(&mut self, len: usize, context: &'static str) -> CodecResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(CodecError::Truncated {
                context,
                offset: self.offset,
                needed: len,
                available: self.remaining(),
            });
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn id(&mut self, context: &'static str) -> CodecResult<[u8; 4]> {
        let b = self.take(4, context)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    fn u32(&mut self, context: &'static str) -> CodecResult<u32> {
        let b = self.take(4, context)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Skip the pad byte after an odd-sized chunk, if the file has one
    fn skip_pad(&mut self, chunk_size: usize) {
        if chunk_size % 2 == 1 && self.remaining() > 0 {
            self.offset += 1;
        }
    }
}

/// Parse a complete RIFF/WAVE file held in memory
///
/// Returns the `data` payload verbatim. Any structural error fails the whole
/// parse; no partial payload is returned.
pub fn parse_wave(bytes: &[u8]) -> CodecResult<WaveAsset> {
    let mut reader = Reader::new(bytes);

    let riff = reader.id("RIFF header")?;
    let _declared_size = reader.u32("RIFF header")?;
    let wave = reader.id("RIFF header")?;

    if riff != RIFF_ID {
        return Err(CodecError::MalformedContainer(format!(
            "expected RIFF id, found {:?}",
            String::from_utf8_lossy(&riff)
        )));
    }
    if wave != WAVE_ID {
        return Err(CodecError::MalformedContainer(format!(
            "expected WAVE id, found {:?}",
            String::from_utf8_lossy(&wave)
        )));
    }

    let mut asset = WaveAsset::default();
    let mut found_data = false;

    while reader.remaining() > 0 {
        let id = reader.id("chunk header")?;
        let size = reader.u32("chunk header")? as usize;
        let body = reader.take(size, "chunk body")?;

        trace!("chunk {:?} ({} bytes)", String::from_utf8_lossy(&id), size);

        match id {
            FMT_ID => {
                if body.len() < FMT_MIN_SIZE {
                    return Err(CodecError::Truncated {
                        context: "fmt chunk",
                        offset: reader.offset - size,
                        needed: FMT_MIN_SIZE,
                        available: body.len(),
                    });
                }
                asset.format = Some(WaveFormat::parse(body));
            }
            DATA_ID => {
                asset.data = body.to_vec();
                found_data = true;
            }
            _ => {}
        }

        reader.skip_pad(size);
    }

    if !found_data {
        warn!("WAVE file has no data chunk; payload is empty");
    }

    if let Some(fmt) = asset.format {
        debug!(
            "Loaded WAVE: tag {:#06x}, {} ch, {} Hz, {} bits, {} payload bytes",
            fmt.format_tag,
            fmt.channels,
            fmt.sample_rate,
            fmt.bits_per_sample,
            asset.data.len()
        );
    }

    Ok(asset)
}

/// Read a WAVE file from disk and parse it
pub fn load_wave<P: AsRef<Path>>(path: P) -> CodecResult<WaveAsset> {
    let bytes = std::fs::read(path.as_ref())?;
    parse_wave(&bytes)
}
