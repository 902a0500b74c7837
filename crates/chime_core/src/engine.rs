//! Feed Engine
//!
//! Owns the feed thread and the device session running on it.
//!
//! The session is opened on the feed thread and never leaves it. The control
//! thread only ever sees the negotiated format and period, which the feed
//! thread reports back before [`FeedEngine::open`] returns.
//!
//! ```text
//!            Stopped ──start──► Priming ──primed──► Running
//!               ▲                  │                   │
//!               └──────stop────────┴───────stop────────┘
//!   any device error ──► Failed          destroy ──► Closed
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use chime_codec::{convert_to_native, load_wave, DeviceFormat};
use chime_platform::{DeviceSession, PeriodInfo, PlatformError, SessionConfig};

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::message::{Command, Event};
use crate::queue::SampleQueue;

/// Lifecycle state of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum EngineState {
    /// Session open, device clock stopped
    Stopped = 0,
    /// Filling the device buffer before the clock starts
    Priming = 1,
    /// Feeding one period per device signal
    Running = 2,
    /// A device call failed; the engine must be reopened
    Failed = 3,
    /// Destroyed, session released
    Closed = 4,
}

impl EngineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Stopped,
            1 => Self::Priming,
            2 => Self::Running,
            3 => Self::Failed,
            _ => Self::Closed,
        }
    }

    /// Whether the feed thread is (or is about to be) feeding the device
    pub fn is_active(self) -> bool {
        matches!(self, Self::Priming | Self::Running)
    }
}

/// State shared between the control and feed threads
///
/// The state word packs the [`EngineState`] in its low byte and the start
/// generation above it, so the feed thread can only promote the start it
/// is actually serving.
struct Shared {
    state: AtomicU64,
    failure: Mutex<Option<String>>,
}

fn pack(generation: u64, state: EngineState) -> u64 {
    (generation << 8) | state as u64
}

fn unpack(word: u64) -> (u64, EngineState) {
    (word >> 8, EngineState::from_u8(word as u8))
}

impl Shared {
    fn new() -> Self {
        Self {
            state: AtomicU64::new(pack(0, EngineState::Stopped)),
            failure: Mutex::new(None),
        }
    }

    fn state(&self) -> EngineState {
        unpack(self.state.load(Ordering::Acquire)).1
    }

    fn set(&self, state: EngineState) {
        let _ = self.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
            Some(pack(unpack(word).0, state))
        });
    }

    /// Stopped -> Priming under a new generation, returned on success
    fn begin_start(&self) -> Result<u64, EngineState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| match unpack(word) {
                (generation, EngineState::Stopped) => Some(pack(generation + 1, EngineState::Priming)),
                _ => None,
            })
            .map(|word| unpack(word).0 + 1)
            .map_err(|word| unpack(word).1)
    }

    /// Priming/Running -> Stopped
    fn begin_stop(&self) -> Result<(), EngineState> {
        self.state
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| match unpack(word) {
                (generation, state) if state.is_active() => Some(pack(generation, EngineState::Stopped)),
                _ => None,
            })
            .map(|_| ())
            .map_err(|word| unpack(word).1)
    }

    /// Priming -> Running, only if no stop or restart happened since `generation` began
    fn mark_running(&self, generation: u64) -> bool {
        self.state
            .compare_exchange(
                pack(generation, EngineState::Priming),
                pack(generation, EngineState::Running),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn fail(&self, message: String) {
        *self.failure.lock() = Some(message);
        self.set(EngineState::Failed);
    }

    fn failure_message(&self) -> String {
        self.failure
            .lock()
            .clone()
            .unwrap_or_else(|| "device session failed".to_string())
    }
}

/// Periodic feed engine for a single shared-mode output device
///
/// Thread-safe control handle: every method takes `&self` except
/// [`FeedEngine::destroy`].
pub struct FeedEngine {
    config: EngineConfig,
    format: DeviceFormat,
    period: PeriodInfo,
    queue: Arc<SampleQueue>,
    shared: Arc<Shared>,
    command_sender: Sender<Command>,
    event_receiver: Receiver<Event>,
    feed_thread: Option<JoinHandle<()>>,
}

impl FeedEngine {
    /// Open the default output device with the given configuration
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        Self::with_session(config, chime_platform::open_default_session)
    }

    /// Start the feed thread on a session produced by `opener`
    ///
    /// `opener` runs on the feed thread, so the session itself need not be
    /// `Send`. Open errors are returned here and the thread is joined.
    pub fn with_session<S, F>(config: EngineConfig, opener: F) -> EngineResult<Self>
    where
        S: DeviceSession + 'static,
        F: FnOnce(&SessionConfig) -> Result<S, PlatformError> + Send + 'static,
    {
        config.validate()?;

        let (command_sender, command_receiver) = bounded::<Command>(config.command_capacity);
        let (event_sender, event_receiver) = unbounded::<Event>();
        let (opened_sender, opened_receiver) = bounded::<Result<(DeviceFormat, PeriodInfo), PlatformError>>(1);

        let queue = Arc::new(SampleQueue::new());
        let shared = Arc::new(Shared::new());
        let session_config = config.session_config();

        let worker = FeedWorker {
            queue: Arc::clone(&queue),
            shared: Arc::clone(&shared),
            commands: command_receiver,
            events: event_sender,
        };

        let feed_thread = thread::Builder::new()
            .name(config.thread_name.clone())
            .spawn(move || {
                let session = match opener(&session_config) {
                    Ok(session) => session,
                    Err(e) => {
                        let _ = opened_sender.send(Err(e));
                        return;
                    }
                };
                if opened_sender
                    .send(Ok((*session.format(), *session.period())))
                    .is_err()
                {
                    return;
                }
                worker.run(session);
            })
            .map_err(|e| EngineError::ThreadSpawn(e.to_string()))?;

        let opened = opened_receiver.recv();
        let (format, period) = match opened {
            Ok(Ok(negotiated)) => negotiated,
            Ok(Err(e)) => {
                let _ = feed_thread.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = feed_thread.join();
                return Err(EngineError::ChannelRecvError);
            }
        };

        info!(
            "Feed engine open: {} (buffer {} frames, {:.1} ms)",
            format,
            period.buffer_frames,
            period.buffer_ms(format.sample_rate)
        );

        Ok(Self {
            config,
            format,
            period,
            queue,
            shared,
            command_sender,
            event_receiver,
            feed_thread: Some(feed_thread),
        })
    }

    /// Prime the device buffer and start feeding
    pub fn start(&self) -> EngineResult<()> {
        let generation = self
            .shared
            .begin_start()
            .map_err(|state| self.rejected(state, EngineError::AlreadyRunning))?;
        info!("Starting feed engine");
        self.send_command(Command::Start { generation })
    }

    /// Stop feeding; takes effect within one period
    pub fn stop(&self) -> EngineResult<()> {
        self.shared
            .begin_stop()
            .map_err(|state| self.rejected(state, EngineError::NotRunning))?;
        info!("Stopping feed engine");
        self.send_command(Command::Stop)
    }

    /// Stop, release the device and join the feed thread
    ///
    /// Blocks for up to one device period. Calling it again is a no-op.
    pub fn destroy(&mut self) -> EngineResult<()> {
        let Some(feed_thread) = self.feed_thread.take() else {
            return Ok(());
        };

        info!("Destroying feed engine");
        // The thread may already have exited after a device failure
        let _ = self.command_sender.send(Command::Shutdown);
        let joined = feed_thread.join();
        self.shared.set(EngineState::Closed);
        joined.map_err(|_| EngineError::Device("feed thread panicked".into()))
    }

    /// Replace the pending sound (device-native bytes), newest wins
    pub fn queue_audio(&self, samples: impl Into<Vec<u8>>) {
        self.queue.queue_audio(samples);
    }

    /// Mute until the next [`FeedEngine::queue_audio`]
    pub fn clear_queued_audio(&self) {
        self.queue.clear_queued_audio();
    }

    /// Bytes of the pending sound not yet handed to the device
    pub fn remaining(&self) -> usize {
        self.queue.remaining()
    }

    /// Convert 16-bit PCM into this device's native encoding
    pub fn convert_to_native_format(&self, pcm: &[u8]) -> EngineResult<Vec<u8>> {
        Ok(convert_to_native(&self.format, pcm)?)
    }

    /// Load a WAVE file and convert it for this device
    ///
    /// The file must hold 16-bit PCM. Sample rate and channel count are not
    /// adapted; a mismatch is only logged.
    pub fn load_sound<P: AsRef<Path>>(&self, path: P) -> EngineResult<Vec<u8>> {
        let path = path.as_ref();
        let asset = load_wave(path)?;
        asset.ensure_pcm16()?;

        if let Some(wave) = asset.format {
            if wave.sample_rate != self.format.sample_rate || wave.channels != self.format.channels {
                warn!(
                    "{:?} is {} Hz / {} ch but the device runs {}; playing without resampling",
                    path, wave.sample_rate, wave.channels, self.format
                );
            }
        }
        debug!("Loaded {:?}: {} bytes of PCM", path, asset.data.len());

        self.convert_to_native_format(&asset.data)
    }

    /// Format negotiated with the device
    pub fn format(&self) -> &DeviceFormat {
        &self.format
    }

    /// Period sizing negotiated with the device
    pub fn period(&self) -> &PeriodInfo {
        &self.period
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state().is_active()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Poll for an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<Event> {
        self.event_receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for an event
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<Event> {
        self.event_receiver.recv_timeout(timeout).ok()
    }

    fn send_command(&self, command: Command) -> EngineResult<()> {
        self.command_sender
            .send(command)
            .map_err(|_| EngineError::ChannelSendError)
    }

    fn rejected(&self, state: EngineState, otherwise: EngineError) -> EngineError {
        match state {
            EngineState::Closed => EngineError::Closed,
            EngineState::Failed => EngineError::Device(self.shared.failure_message()),
            _ => otherwise,
        }
    }
}

impl Drop for FeedEngine {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            error!("Feed engine shutdown failed: {}", e);
        }
    }
}

/// Why a feed run ended
enum FeedExit {
    Stopped,
    Shutdown,
}

/// Feed thread side of the engine
struct FeedWorker {
    queue: Arc<SampleQueue>,
    shared: Arc<Shared>,
    commands: Receiver<Command>,
    events: Sender<Event>,
}

impl FeedWorker {
    fn run<S: DeviceSession>(self, mut session: S) {
        debug!("Feed thread running on {} session", session.backend());

        loop {
            match self.commands.recv() {
                Ok(Command::Start { generation }) => match self.feed(&mut session, generation) {
                    Ok(FeedExit::Stopped) => {
                        let _ = self.events.send(Event::Stopped);
                    }
                    Ok(FeedExit::Shutdown) => break,
                    Err(e) => {
                        error!("Feed thread failed: {}", e);
                        let _ = session.stop();
                        self.shared.fail(e.to_string());
                        let _ = self.events.send(Event::error(&e));
                        break;
                    }
                },
                Ok(Command::Stop) => debug!("Stop received while idle"),
                Ok(Command::Shutdown) | Err(_) => break,
            }
        }

        drop(session);
        debug!("Feed thread exiting");
        let _ = self.events.send(Event::Closed);
    }

    /// Prime, start the clock, then feed one region per ready signal
    fn feed<S: DeviceSession>(&self, session: &mut S, generation: u64) -> Result<FeedExit, PlatformError> {
        let primed = feed_free_frames(session, &self.queue)?;
        session.start()?;
        debug!("Primed {} frames", primed);

        if self.shared.mark_running(generation) {
            let _ = self.events.send(Event::Started);
        } else {
            debug!("Start {} was stopped while priming", generation);
        }

        loop {
            session.wait_ready()?;

            match self.commands.try_recv() {
                Ok(Command::Stop) => {
                    session.stop()?;
                    return Ok(FeedExit::Stopped);
                }
                Ok(Command::Shutdown) | Err(TryRecvError::Disconnected) => {
                    session.stop()?;
                    return Ok(FeedExit::Shutdown);
                }
                Ok(Command::Start { .. }) | Err(TryRecvError::Empty) => {}
            }

            feed_free_frames(session, &self.queue)?;
        }
    }
}

/// Fill and commit every frame the device buffer has room for
///
/// Returns the number of frames committed.
fn feed_free_frames<S: DeviceSession + ?Sized>(
    session: &mut S,
    queue: &SampleQueue,
) -> Result<u32, PlatformError> {
    let capacity = session.period().buffer_frames;
    let frames = capacity.saturating_sub(session.frames_pending()?);
    if frames == 0 {
        return Ok(0);
    }

    let region = session.acquire(frames)?;
    queue.fill(region);
    session.commit(frames)?;
    Ok(frames)
}
