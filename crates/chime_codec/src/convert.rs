//! Native Format Conversion
//!
//! Converts canonical 16-bit signed little-endian interleaved PCM (what WAVE
//! assets carry) into the device's negotiated encoding. Conversion runs once
//! per sound on the control thread, never in the feed loop.
//!
//! | Device format | Transform                                    |
//! |---------------|----------------------------------------------|
//! | PCM 16-bit    | identity                                     |
//! | PCM 8-bit     | `(s + 32768) >> 8`, truncating               |
//! | float 32-bit  | `s / 32767` clamped to [-1, 1], LE bytes     |
//! | anything else | [`CodecError::NotSupported`]                 |

use crate::error::{CodecError, CodecResult};
use crate::format::{DeviceFormat, SampleEncoding};

/// Bytes per canonical input sample
const INPUT_SAMPLE_BYTES: usize = 2;

/// Convert 16-bit PCM bytes into the device's native encoding
///
/// A trailing odd byte (half a sample) is dropped by the 8-bit and float
/// paths. The 16-bit path returns the input unchanged.
pub fn convert_to_native(format: &DeviceFormat, pcm: &[u8]) -> CodecResult<Vec<u8>> {
    match format.encoding() {
        SampleEncoding::Pcm { bits: 16 } => Ok(pcm.to_vec()),
        SampleEncoding::Pcm { bits: 8 } => Ok(pcm16_to_u8(pcm)),
        SampleEncoding::IeeeFloat { bits: 32 } => Ok(pcm16_to_f32(pcm)),
        _ => Err(CodecError::NotSupported(format!(
            "no conversion from 16-bit PCM to {} (tag {:#06x}, sub-format {})",
            format,
            format.format_tag,
            format
                .sub_format
                .map(|guid| format!("{:032x}", guid))
                .unwrap_or_else(|| "none".into())
        ))),
    }
}

/// Whether [`convert_to_native`] accepts this format
pub fn is_supported(format: &DeviceFormat) -> bool {
    matches!(
        format.encoding(),
        SampleEncoding::Pcm { bits: 16 } | SampleEncoding::Pcm { bits: 8 } | SampleEncoding::IeeeFloat { bits: 32 }
    )
}

#[inline]
fn read_sample(bytes: &[u8]) -> i16 {
    i16::from_le_bytes([bytes[0], bytes[1]])
}

fn pcm16_to_u8(pcm: &[u8]) -> Vec<u8> {
    pcm.chunks_exact(INPUT_SAMPLE_BYTES)
        .map(|sample| {
            let biased = (read_sample(sample) as i32 + 32768) as u16;
            (biased >> 8) as u8
        })
        .collect()
}

fn pcm16_to_f32(pcm: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(pcm.len() / INPUT_SAMPLE_BYTES * 4);
    for sample in pcm.chunks_exact(INPUT_SAMPLE_BYTES) {
        let value = (read_sample(sample) as f32 / i16::MAX as f32).clamp(-1.0, 1.0);
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}
