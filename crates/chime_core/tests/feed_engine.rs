//! End-to-end playback through the public engine API
//!
//! Uses a free-running session: every ready signal plays one period, so the
//! engine is fed continuously the way a real device would drive it.

use std::io::Write;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tempfile::NamedTempFile;

use chime_core::{
    DeviceFormat, DeviceSession, EngineConfig, EngineError, EngineState, Event, FeedEngine,
    PeriodInfo, PlatformError,
};

const PERIOD_FRAMES: u32 = 16;
const BUFFER_FRAMES: u32 = 32;

struct ClockedSession {
    format: DeviceFormat,
    period: PeriodInfo,
    region: Vec<u8>,
    pending: u32,
    played: Sender<Vec<u8>>,
}

impl ClockedSession {
    fn new(format: DeviceFormat, played: Sender<Vec<u8>>) -> Self {
        Self {
            format,
            period: PeriodInfo {
                default_period: PERIOD_FRAMES,
                fundamental_period: PERIOD_FRAMES,
                min_period: PERIOD_FRAMES,
                max_period: PERIOD_FRAMES,
                buffer_frames: BUFFER_FRAMES,
            },
            region: Vec::new(),
            pending: 0,
            played,
        }
    }
}

impl DeviceSession for ClockedSession {
    fn backend(&self) -> &'static str {
        "clocked"
    }

    fn format(&self) -> &DeviceFormat {
        &self.format
    }

    fn period(&self) -> &PeriodInfo {
        &self.period
    }

    fn acquire(&mut self, frames: u32) -> Result<&mut [u8], PlatformError> {
        self.region = vec![0xEE; self.format.bytes_for_frames(frames)];
        Ok(&mut self.region)
    }

    fn commit(&mut self, frames: u32) -> Result<(), PlatformError> {
        self.pending += frames;
        let _ = self.played.send(std::mem::take(&mut self.region));
        Ok(())
    }

    fn frames_pending(&self) -> Result<u32, PlatformError> {
        Ok(self.pending)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<(), PlatformError> {
        thread::sleep(Duration::from_millis(1));
        self.pending = self.pending.saturating_sub(PERIOD_FRAMES);
        Ok(())
    }
}

fn open_engine(format: DeviceFormat) -> (FeedEngine, Receiver<Vec<u8>>) {
    let (played_sender, played) = unbounded();
    let engine = FeedEngine::with_session(EngineConfig::default(), move |_| {
        Ok(ClockedSession::new(format, played_sender))
    })
    .unwrap();
    (engine, played)
}

/// Collect committed bytes until at least `len` have been played
fn collect(played: &Receiver<Vec<u8>>, len: usize) -> Vec<u8> {
    let mut out = Vec::new();
    while out.len() < len {
        let region = played
            .recv_timeout(Duration::from_secs(2))
            .expect("device commit");
        out.extend(region);
    }
    out
}

fn mono_wave(samples: &[i16]) -> NamedTempFile {
    let data: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&(4 + 8 + 16 + 8 + 4 + 8 + data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(b"WAVE");
    // Unknown chunk before fmt is skipped
    bytes.extend_from_slice(b"LIST");
    bytes.extend_from_slice(&4u32.to_le_bytes());
    bytes.extend_from_slice(b"INFO");
    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&44100u32.to_le_bytes());
    bytes.extend_from_slice(&88200u32.to_le_bytes());
    bytes.extend_from_slice(&2u16.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());
    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&(data.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&data);

    let mut file = tempfile::Builder::new()
        .prefix("chime_")
        .suffix(".wav")
        .tempfile()
        .unwrap();
    file.write_all(&bytes).unwrap();
    file
}

#[test]
fn test_wave_file_plays_then_silence() {
    let (engine, played) = open_engine(DeviceFormat::pcm16(1, 44100));
    let file = mono_wave(&[1, 2, 3, 4]);

    let sound = engine.load_sound(file.path()).unwrap();
    assert_eq!(sound, [0x01, 0x00, 0x02, 0x00, 0x03, 0x00, 0x04, 0x00]);

    engine.queue_audio(sound.clone());
    engine.start().unwrap();

    let out = collect(&played, 4 * BUFFER_FRAMES as usize * 2);
    assert_eq!(&out[..8], &sound[..]);
    assert!(out[8..].iter().all(|&b| b == 0));
    assert_eq!(engine.remaining(), 0);
}

#[test]
fn test_float_device_receives_converted_samples() {
    let (engine, played) = open_engine(DeviceFormat::float32(1, 44100));
    let file = mono_wave(&[i16::MAX, 0, i16::MIN]);

    let sound = engine.load_sound(file.path()).unwrap();
    assert_eq!(sound.len(), 12);

    engine.queue_audio(sound);
    engine.start().unwrap();

    let out = collect(&played, 12);
    let samples: Vec<f32> = out
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    assert_eq!(samples[0], 1.0);
    assert_eq!(samples[1], 0.0);
    assert_eq!(samples[2], -1.0);
    assert!(samples[3..].iter().all(|&s| s == 0.0));
}

#[test]
fn test_repeated_sounds_and_lifecycle() {
    let (mut engine, played) = open_engine(DeviceFormat::pcm16(2, 48000));
    engine.start().unwrap();

    loop {
        match engine.recv_event_timeout(Duration::from_secs(2)) {
            Some(Event::Started) => break,
            Some(_) => continue,
            None => panic!("engine never started"),
        }
    }
    assert_eq!(engine.state(), EngineState::Running);

    for _ in 0..3 {
        engine.queue_audio(vec![9u8; 64]);
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while engine.remaining() > 0 {
            assert!(std::time::Instant::now() < deadline, "queue never drained");
            thread::sleep(Duration::from_millis(1));
        }
    }
    assert!(played.try_iter().count() > 0);

    engine.stop().unwrap();
    engine.destroy().unwrap();
    assert_eq!(engine.state(), EngineState::Closed);
    assert!(matches!(engine.start(), Err(EngineError::Closed)));

    let events: Vec<Event> = std::iter::from_fn(|| engine.try_recv_event()).collect();
    assert_eq!(events.last(), Some(&Event::Closed));
}
