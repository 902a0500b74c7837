//! Chime Codec - WAVE Loading and Native Format Conversion
//!
//! This crate provides the byte-level half of the playback pipeline:
//! - RIFF/WAVE container parsing into a raw 16-bit PCM payload
//! - Conversion of 16-bit PCM into a device's negotiated sample encoding
//! - The device format model shared with the platform backends
//!
//! Nothing here touches a device or a thread; every function is pure and
//! runs on the control thread before audio is queued.

mod convert;
mod error;
mod format;
mod wave;

pub use convert::{convert_to_native, is_supported};
pub use error::{CodecError, CodecResult};
pub use format::{
    DeviceFormat, SampleEncoding, KSDATAFORMAT_SUBTYPE_IEEE_FLOAT, KSDATAFORMAT_SUBTYPE_PCM,
    WAVE_FORMAT_EXTENSIBLE, WAVE_FORMAT_IEEE_FLOAT, WAVE_FORMAT_PCM,
};
pub use wave::{load_wave, parse_wave, WaveAsset, WaveFormat};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crate_exports() {
        // Verify all public types are accessible
        let format = DeviceFormat::pcm16(2, 48000);
        assert!(is_supported(&format));
        let _asset = WaveAsset::default();
    }
}
