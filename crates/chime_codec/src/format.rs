//! Device Sample Format Model
//!
//! Describes the native format an output device negotiated, in the terms the
//! Windows `WAVEFORMATEX`/`WAVEFORMATEXTENSIBLE` structures use. Other
//! backends translate into the same model so the converter has one input.

use serde::{Deserialize, Serialize};

/// `wFormatTag` for integer PCM
pub const WAVE_FORMAT_PCM: u16 = 0x0001;

/// `wFormatTag` for IEEE floating point samples
pub const WAVE_FORMAT_IEEE_FLOAT: u16 = 0x0003;

/// `wFormatTag` announcing a `WAVEFORMATEXTENSIBLE` with a sub-format GUID
pub const WAVE_FORMAT_EXTENSIBLE: u16 = 0xFFFE;

/// `KSDATAFORMAT_SUBTYPE_PCM` (00000001-0000-0010-8000-00aa00389b71)
pub const KSDATAFORMAT_SUBTYPE_PCM: u128 = 0x00000001_0000_0010_8000_00aa00389b71;

/// `KSDATAFORMAT_SUBTYPE_IEEE_FLOAT` (00000003-0000-0010-8000-00aa00389b71)
pub const KSDATAFORMAT_SUBTYPE_IEEE_FLOAT: u128 = 0x00000003_0000_0010_8000_00aa00389b71;

/// Sample encoding resolved from a tag / sub-format pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleEncoding {
    /// Signed integer PCM (unsigned for 8-bit)
    Pcm { bits: u16 },
    /// IEEE floating point
    IeeeFloat { bits: u16 },
    /// Tag or sub-format the converter has no mapping for
    Unknown { tag: u16, sub_format: Option<u128> },
}

/// Native stream format negotiated with a device
///
/// Created once when a session opens and never modified afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFormat {
    /// `wFormatTag` as reported by the device
    pub format_tag: u16,

    /// Interleaved channel count
    pub channels: u16,

    /// Container bits per sample
    pub bits_per_sample: u16,

    /// Frames per second
    pub sample_rate: u32,

    /// Bytes per frame (`channels * bits_per_sample / 8`)
    pub frame_size: usize,

    /// Sub-format GUID when `format_tag` is `WAVE_FORMAT_EXTENSIBLE`
    pub sub_format: Option<u128>,
}

impl DeviceFormat {
    /// Plain (non-extensible) format with derived frame size
    pub fn new(format_tag: u16, channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            format_tag,
            channels,
            bits_per_sample,
            sample_rate,
            frame_size: channels as usize * bits_per_sample as usize / 8,
            sub_format: None,
        }
    }

    /// Extensible format carrying a sub-format GUID
    pub fn extensible(sub_format: u128, channels: u16, bits_per_sample: u16, sample_rate: u32) -> Self {
        Self {
            sub_format: Some(sub_format),
            ..Self::new(WAVE_FORMAT_EXTENSIBLE, channels, bits_per_sample, sample_rate)
        }
    }

    /// 16-bit integer PCM
    pub fn pcm16(channels: u16, sample_rate: u32) -> Self {
        Self::new(WAVE_FORMAT_PCM, channels, 16, sample_rate)
    }

    /// 32-bit float
    pub fn float32(channels: u16, sample_rate: u32) -> Self {
        Self::new(WAVE_FORMAT_IEEE_FLOAT, channels, 32, sample_rate)
    }

    /// Resolve the encoding from the tag, falling back to the sub-format
    pub fn encoding(&self) -> SampleEncoding {
        let bits = self.bits_per_sample;
        if self.format_tag == WAVE_FORMAT_PCM || self.sub_format == Some(KSDATAFORMAT_SUBTYPE_PCM) {
            SampleEncoding::Pcm { bits }
        } else if self.format_tag == WAVE_FORMAT_IEEE_FLOAT
            || self.sub_format == Some(KSDATAFORMAT_SUBTYPE_IEEE_FLOAT)
        {
            SampleEncoding::IeeeFloat { bits }
        } else {
            SampleEncoding::Unknown {
                tag: self.format_tag,
                sub_format: self.sub_format,
            }
        }
    }

    /// Byte length of `frames` frames
    pub fn bytes_for_frames(&self, frames: u32) -> usize {
        frames as usize * self.frame_size
    }
}

impl std::fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.encoding() {
            SampleEncoding::Pcm { .. } => "PCM",
            SampleEncoding::IeeeFloat { .. } => "float",
            SampleEncoding::Unknown { .. } => "unknown",
        };
        write!(
            f,
            "{} {}-bit, {} ch, {} Hz",
            kind, self.bits_per_sample, self.channels, self.sample_rate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_size_derivation() {
        assert_eq!(DeviceFormat::pcm16(2, 48000).frame_size, 4);
        assert_eq!(DeviceFormat::float32(2, 48000).frame_size, 8);
        assert_eq!(DeviceFormat::new(WAVE_FORMAT_PCM, 1, 8, 22050).frame_size, 1);
    }

    #[test]
    fn test_encoding_from_plain_tag() {
        assert_eq!(
            DeviceFormat::pcm16(2, 44100).encoding(),
            SampleEncoding::Pcm { bits: 16 }
        );
        assert_eq!(
            DeviceFormat::float32(2, 44100).encoding(),
            SampleEncoding::IeeeFloat { bits: 32 }
        );
    }

    #[test]
    fn test_encoding_from_extensible_sub_format() {
        let float = DeviceFormat::extensible(KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, 2, 32, 48000);
        assert_eq!(float.encoding(), SampleEncoding::IeeeFloat { bits: 32 });

        let pcm = DeviceFormat::extensible(KSDATAFORMAT_SUBTYPE_PCM, 2, 16, 48000);
        assert_eq!(pcm.encoding(), SampleEncoding::Pcm { bits: 16 });

        let other = DeviceFormat::extensible(0xdead_beef, 2, 16, 48000);
        assert!(matches!(other.encoding(), SampleEncoding::Unknown { .. }));
    }

    #[test]
    fn test_bytes_for_frames() {
        let format = DeviceFormat::float32(2, 48000);
        assert_eq!(format.bytes_for_frames(480), 3840);
    }

    #[test]
    fn test_display() {
        let text = DeviceFormat::float32(2, 48000).to_string();
        assert_eq!(text, "float 32-bit, 2 ch, 48000 Hz");
    }
}
