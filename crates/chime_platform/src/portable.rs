//! Portable Output Session (cpal)
//!
//! cpal is pull-based: the host calls back for samples. To give the feed
//! engine the same acquire/commit/wait contract WASAPI offers, an `rtrb`
//! byte ring stands in for the device buffer.
//!
//! ```text
//! Feed Thread                              cpal Callback
//! ───────────                              ─────────────
//! acquire ─► staging ─► commit ─► rtrb ─► decode LE bytes ─► device
//!   ▲                                           │
//!   └──────── wait_ready ◄── ready (bounded 1) ◄┘
//! ```
//!
//! The ring capacity is `buffer_frames * frame_size` bytes, so
//! `frames_pending` is simply the ring's fill level.

use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, Stream, SupportedBufferSize};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use rtrb::{Consumer, Producer, RingBuffer};

use chime_codec::{DeviceFormat, WAVE_FORMAT_PCM};

use crate::error::PlatformError;
use crate::traits::{DeviceSession, PeriodInfo, PeriodPreference, SessionConfig};

/// Sample types the portable backend renders, decoded from LE bytes
trait NativeSample: SizedSample + Send + 'static {
    const BYTES: usize;

    fn from_le(bytes: &[u8]) -> Self;
}

impl NativeSample for i16 {
    const BYTES: usize = 2;

    fn from_le(bytes: &[u8]) -> Self {
        i16::from_le_bytes([bytes[0], bytes[1]])
    }
}

impl NativeSample for u8 {
    const BYTES: usize = 1;

    fn from_le(bytes: &[u8]) -> Self {
        bytes[0]
    }
}

impl NativeSample for f32 {
    const BYTES: usize = 4;

    fn from_le(bytes: &[u8]) -> Self {
        f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
    }
}

/// Host callbacks can run this long when the buffer size is left to the host
const HOST_DEFAULT_BOUND_MS: u32 = 200;

/// Feed-thread ends of the emulated device buffer
struct RingEnds {
    producer: Producer<u8>,
    capacity: usize,
    ready_rx: Receiver<()>,
    stream_error: Arc<Mutex<Option<String>>>,
}

/// cpal-backed session on the default output device
///
/// Field order matters: the stream is dropped (and its callback stops)
/// before the ring producer.
pub struct CpalSession {
    stream: Stream,
    producer: Producer<u8>,
    capacity: usize,
    staging: Vec<u8>,
    acquired_frames: u32,
    ready_rx: Receiver<()>,
    stream_error: Arc<Mutex<Option<String>>>,
    format: DeviceFormat,
    period: PeriodInfo,
    started: bool,
}

impl CpalSession {
    /// Open the default output device with its default configuration
    pub fn open(config: &SessionConfig) -> Result<Self, PlatformError> {
        config.validate()?;

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlatformError::DeviceUnavailable(format!("{:?} host has no output device", host.id())))?;

        let supported = device
            .default_output_config()
            .map_err(|e| PlatformError::NegotiationFailed(e.to_string()))?;

        let channels = supported.channels();
        let sample_rate = supported.sample_rate().0;
        let sample_format = supported.sample_format();

        let format = match sample_format {
            SampleFormat::I16 => DeviceFormat::pcm16(channels, sample_rate),
            SampleFormat::U8 => DeviceFormat::new(WAVE_FORMAT_PCM, channels, 8, sample_rate),
            SampleFormat::F32 => DeviceFormat::float32(channels, sample_rate),
            other => {
                return Err(PlatformError::NegotiationFailed(format!(
                    "device sample type {:?} has no native mapping",
                    other
                )))
            }
        };

        let period = Self::period_info(config, sample_rate, supported.buffer_size());

        // Ask for the period explicitly even when the host can't report a
        // range; only a host that refuses gets its own default size.
        let fixed_config = cpal::StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Fixed(period.default_period),
        };
        let (stream, ring, period) = match Self::build_ring_stream(&device, sample_format, &fixed_config, &format, period) {
            Ok((stream, ring)) => (stream, ring, period),
            Err(e) if matches!(supported.buffer_size(), SupportedBufferSize::Unknown) => {
                tracing::warn!("Fixed {}-frame buffer refused ({}); using host default", period.default_period, e);
                let period = Self::host_default_period(period, sample_rate);
                let default_config = cpal::StreamConfig {
                    buffer_size: cpal::BufferSize::Default,
                    ..fixed_config
                };
                let (stream, ring) = Self::build_ring_stream(&device, sample_format, &default_config, &format, period)?;
                (stream, ring, period)
            }
            Err(e) => return Err(e),
        };
        let RingEnds {
            producer,
            capacity,
            ready_rx,
            stream_error,
        } = ring;

        // Some hosts start streams on creation; the engine primes first
        if let Err(e) = stream.pause() {
            tracing::debug!("Pausing new stream failed: {}", e);
        }

        tracing::info!(
            "cpal session open: {} (period {} frames, buffer {} frames)",
            format,
            period.default_period,
            period.buffer_frames
        );

        Ok(Self {
            stream,
            producer,
            capacity,
            staging: Vec::with_capacity(capacity),
            acquired_frames: 0,
            ready_rx,
            stream_error,
            format,
            period,
            started: false,
        })
    }

    fn period_info(config: &SessionConfig, sample_rate: u32, range: &SupportedBufferSize) -> PeriodInfo {
        let (min_period, max_period) = match range {
            SupportedBufferSize::Range { min, max } => (*min, *max),
            SupportedBufferSize::Unknown => (0, u32::MAX),
        };

        // 10 ms unless configured
        let fundamental = (sample_rate / 100).max(1);
        let requested = config.period_frames.unwrap_or(fundamental);
        let preferred = match config.period {
            PeriodPreference::Minimum => requested.min(fundamental),
            PeriodPreference::Default => requested,
        };
        let period = preferred.clamp(min_period.max(1), max_period.max(1));

        PeriodInfo {
            default_period: period,
            fundamental_period: fundamental,
            min_period: min_period.max(1),
            max_period,
            buffer_frames: period * config.buffer_periods,
        }
    }

    /// Without a fixed host buffer a callback may ask for far more than one
    /// configured period, so the ring must hold at least the host bound.
    fn host_default_period(period: PeriodInfo, sample_rate: u32) -> PeriodInfo {
        let bound = (sample_rate / 1000 * HOST_DEFAULT_BOUND_MS).max(period.buffer_frames);
        let frames_per_period = period.default_period.max(1);
        let periods = (bound + frames_per_period - 1) / frames_per_period;
        PeriodInfo {
            buffer_frames: periods * frames_per_period,
            ..period
        }
    }

    fn build_ring_stream(
        device: &cpal::Device,
        sample_format: SampleFormat,
        stream_config: &cpal::StreamConfig,
        format: &DeviceFormat,
        period: PeriodInfo,
    ) -> Result<(Stream, RingEnds), PlatformError> {
        let capacity = format.bytes_for_frames(period.buffer_frames);
        let (producer, consumer) = RingBuffer::<u8>::new(capacity);
        let (ready_tx, ready_rx) = bounded::<()>(1);
        let stream_error = Arc::new(Mutex::new(None));

        let errors = Arc::clone(&stream_error);
        let stream = match sample_format {
            SampleFormat::I16 => Self::build_stream::<i16>(device, stream_config, consumer, ready_tx, errors),
            SampleFormat::U8 => Self::build_stream::<u8>(device, stream_config, consumer, ready_tx, errors),
            _ => Self::build_stream::<f32>(device, stream_config, consumer, ready_tx, errors),
        }?;

        Ok((
            stream,
            RingEnds {
                producer,
                capacity,
                ready_rx,
                stream_error,
            },
        ))
    }

    fn build_stream<T: NativeSample>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut consumer: Consumer<u8>,
        ready_tx: Sender<()>,
        stream_error: Arc<Mutex<Option<String>>>,
    ) -> Result<Stream, PlatformError> {
        let err_ready_tx = ready_tx.clone();

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    // Real-time audio callback - NO allocations allowed here
                    let whole_samples = (consumer.slots() / T::BYTES).min(data.len());
                    let mut written = 0;

                    if let Ok(chunk) = consumer.read_chunk(whole_samples * T::BYTES) {
                        let (first, second) = chunk.as_slices();
                        let mut bytes = first.iter().chain(second.iter()).copied();
                        let mut sample = [0u8; 4];
                        for slot in data.iter_mut().take(whole_samples) {
                            for byte in sample.iter_mut().take(T::BYTES) {
                                *byte = bytes.next().unwrap_or(0);
                            }
                            *slot = T::from_le(&sample[..T::BYTES]);
                        }
                        chunk.commit_all();
                        written = whole_samples;
                    }

                    // Underrun - fill with silence
                    for slot in data[written..].iter_mut() {
                        *slot = T::EQUILIBRIUM;
                    }

                    // Auto-reset semantics: a pending signal absorbs this one
                    let _ = ready_tx.try_send(());
                },
                move |err| {
                    *stream_error.lock() = Some(err.to_string());
                    let _ = err_ready_tx.try_send(());
                },
                None,
            )
            .map_err(|e| PlatformError::NegotiationFailed(format!("build_output_stream: {}", e)))
    }

    fn check_stream(&self) -> Result<(), PlatformError> {
        match self.stream_error.lock().as_ref() {
            Some(message) => Err(PlatformError::Device(message.clone())),
            None => Ok(()),
        }
    }
}

impl DeviceSession for CpalSession {
    fn backend(&self) -> &'static str {
        "cpal"
    }

    fn format(&self) -> &DeviceFormat {
        &self.format
    }

    fn period(&self) -> &PeriodInfo {
        &self.period
    }

    fn acquire(&mut self, frames: u32) -> Result<&mut [u8], PlatformError> {
        self.check_stream()?;

        let len = self.format.bytes_for_frames(frames);
        if len > self.producer.slots() {
            return Err(PlatformError::Device(format!(
                "region of {} frames exceeds free capacity",
                frames
            )));
        }

        self.staging.clear();
        self.staging.resize(len, 0);
        self.acquired_frames = frames;
        Ok(&mut self.staging[..])
    }

    fn commit(&mut self, frames: u32) -> Result<(), PlatformError> {
        if frames > self.acquired_frames {
            return Err(PlatformError::Device(format!(
                "commit of {} frames exceeds acquired {}",
                frames, self.acquired_frames
            )));
        }
        self.acquired_frames = 0;

        let len = self.format.bytes_for_frames(frames);
        let chunk = self
            .producer
            .write_chunk_uninit(len)
            .map_err(|e| PlatformError::Device(format!("ring write: {}", e)))?;
        chunk.fill_from_iter(self.staging[..len].iter().copied());
        Ok(())
    }

    fn frames_pending(&self) -> Result<u32, PlatformError> {
        self.check_stream()?;
        let queued = self.capacity - self.producer.slots();
        Ok((queued / self.format.frame_size.max(1)) as u32)
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        if self.started {
            return Ok(());
        }
        self.stream
            .play()
            .map_err(|e| PlatformError::Device(format!("play: {}", e)))?;
        self.started = true;
        tracing::debug!("cpal stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        self.stream
            .pause()
            .map_err(|e| PlatformError::Device(format!("pause: {}", e)))?;
        tracing::debug!("cpal stream paused");
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<(), PlatformError> {
        self.ready_rx
            .recv()
            .map_err(|_| PlatformError::Device("audio callback disconnected".into()))?;
        self.check_stream()
    }
}

impl Drop for CpalSession {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}
