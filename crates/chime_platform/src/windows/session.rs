//! WASAPI Shared-Mode Render Session
//!
//! Event-driven shared-mode stream on the default render endpoint, using
//! `IAudioClient3` so the engine can ask for the device's minimum period.
//!
//! ```text
//! IMMDeviceEnumerator ──► default endpoint (eRender, eConsole)
//!   └── IAudioClient3
//!         ├── GetCurrentSharedModeEnginePeriod  → mix format
//!         ├── GetSharedModeEnginePeriod         → default/fundamental/min/max
//!         ├── InitializeSharedAudioStream(EVENTCALLBACK, period)
//!         ├── SetEventHandle(auto-reset event)  → ready signal
//!         └── IAudioRenderClient                → GetBuffer / ReleaseBuffer
//! ```

use windows::core::{GUID, PCWSTR};
use windows::Win32::Foundation::{CloseHandle, E_NOINTERFACE, HANDLE, WAIT_OBJECT_0};
use windows::Win32::Media::Audio::{
    eConsole, eRender, IAudioClient3, IAudioRenderClient, IMMDeviceEnumerator,
    MMDeviceEnumerator, AUDCLNT_STREAMFLAGS_EVENTCALLBACK, WAVEFORMATEX, WAVEFORMATEXTENSIBLE,
};
use windows::Win32::System::Com::{CoCreateInstance, CoTaskMemFree, CLSCTX_ALL};
use windows::Win32::System::Threading::{CreateEventW, WaitForSingleObject, INFINITE};

use chime_codec::{DeviceFormat, WAVE_FORMAT_EXTENSIBLE};

use super::com::ComGuard;
use crate::error::PlatformError;
use crate::traits::{DeviceSession, PeriodInfo, PeriodPreference, SessionConfig};

/// Event-driven WASAPI render stream
///
/// Field order matters: COM objects are released before `_com` uninitializes
/// the apartment.
pub struct WasapiSession {
    client: IAudioClient3,
    render_client: IAudioRenderClient,
    ready_event: HANDLE,
    format: DeviceFormat,
    period: PeriodInfo,
    acquired_frames: u32,
    started: bool,
    _com: ComGuard,
}

impl WasapiSession {
    /// Negotiate a shared-mode stream with the default render endpoint
    pub fn open(config: &SessionConfig) -> Result<Self, PlatformError> {
        let com = ComGuard::new()?;

        let enumerator: IMMDeviceEnumerator =
            unsafe { CoCreateInstance(&MMDeviceEnumerator, None, CLSCTX_ALL) }.map_err(|e| {
                PlatformError::InitializationFailed(format!("Failed to create MMDeviceEnumerator: {}", e))
            })?;

        let device = unsafe { enumerator.GetDefaultAudioEndpoint(eRender, eConsole) }
            .map_err(|e| PlatformError::DeviceUnavailable(e.to_string()))?;

        let client: IAudioClient3 = unsafe { device.Activate(CLSCTX_ALL, None) }.map_err(activation_error)?;

        let mut format_ptr: *mut WAVEFORMATEX = std::ptr::null_mut();
        let mut current_period = 0u32;
        unsafe { client.GetCurrentSharedModeEnginePeriod(&mut format_ptr, &mut current_period) }
            .map_err(|e| PlatformError::NegotiationFailed(format!("Query mix format: {}", e)))?;

        // Keep the format alive through Initialize, then free it on every path
        let negotiated = Self::initialize(&client, format_ptr, config);
        unsafe { CoTaskMemFree(Some(format_ptr as *const _)) };
        let (format, mut period) = negotiated?;

        period.buffer_frames = unsafe { client.GetBufferSize() }
            .map_err(|e| PlatformError::NegotiationFailed(format!("GetBufferSize: {}", e)))?;

        let ready_event = unsafe { CreateEventW(None, false, false, PCWSTR::null()) }
            .map_err(|e| PlatformError::InitializationFailed(format!("CreateEventW: {}", e)))?;

        let render_client = unsafe { client.SetEventHandle(ready_event) }
            .and_then(|_| unsafe { client.GetService::<IAudioRenderClient>() });
        let render_client = match render_client {
            Ok(render_client) => render_client,
            Err(e) => {
                unsafe {
                    let _ = CloseHandle(ready_event);
                }
                return Err(PlatformError::NegotiationFailed(format!("Render client setup: {}", e)));
            }
        };

        tracing::info!(
            "WASAPI session open: {} (current period {} frames, buffer {} frames)",
            format,
            current_period,
            period.buffer_frames
        );

        Ok(Self {
            client,
            render_client,
            ready_event,
            format,
            period,
            acquired_frames: 0,
            started: false,
            _com: com,
        })
    }

    fn initialize(
        client: &IAudioClient3,
        format_ptr: *mut WAVEFORMATEX,
        config: &SessionConfig,
    ) -> Result<(DeviceFormat, PeriodInfo), PlatformError> {
        // SAFETY: format_ptr was filled by GetCurrentSharedModeEnginePeriod and
        // is read by value (WAVEFORMATEX is packed)
        let (tag, channels, bits, rate) = unsafe {
            (
                (*format_ptr).wFormatTag,
                (*format_ptr).nChannels,
                (*format_ptr).wBitsPerSample,
                (*format_ptr).nSamplesPerSec,
            )
        };

        let format = if tag == WAVE_FORMAT_EXTENSIBLE {
            let ext = format_ptr as *const WAVEFORMATEXTENSIBLE;
            // SAFETY: the extensible tag guarantees the larger layout
            let sub_format: GUID = unsafe { std::ptr::addr_of!((*ext).SubFormat).read_unaligned() };
            DeviceFormat::extensible(sub_format.to_u128(), channels, bits, rate)
        } else {
            DeviceFormat::new(tag, channels, bits, rate)
        };

        let (mut default_period, mut fundamental_period, mut min_period, mut max_period) =
            (0u32, 0u32, 0u32, 0u32);
        unsafe {
            client.GetSharedModeEnginePeriod(
                format_ptr,
                &mut default_period,
                &mut fundamental_period,
                &mut min_period,
                &mut max_period,
            )
        }
        .map_err(|e| PlatformError::NegotiationFailed(format!("GetSharedModeEnginePeriod: {}", e)))?;

        let requested = match config.period {
            PeriodPreference::Minimum => min_period,
            PeriodPreference::Default => default_period,
        };

        tracing::debug!(
            "Engine periods: default {}, fundamental {}, min {}, max {}; requesting {}",
            default_period,
            fundamental_period,
            min_period,
            max_period,
            requested
        );

        unsafe {
            client.InitializeSharedAudioStream(
                AUDCLNT_STREAMFLAGS_EVENTCALLBACK,
                requested,
                format_ptr,
                None,
            )
        }
        .map_err(|e| PlatformError::NegotiationFailed(format!("InitializeSharedAudioStream: {}", e)))?;

        Ok((
            format,
            PeriodInfo {
                default_period,
                fundamental_period,
                min_period,
                max_period,
                buffer_frames: 0,
            },
        ))
    }
}

/// IAudioClient3 is missing before Windows 10, which has no engine period API
fn activation_error(e: windows::core::Error) -> PlatformError {
    if e.code() == E_NOINTERFACE {
        tracing::error!("IAudioClient3 unavailable; Windows 10 or later is required");
        PlatformError::UnsupportedPlatform
    } else {
        PlatformError::NegotiationFailed(format!("Activate IAudioClient3: {}", e))
    }
}

impl DeviceSession for WasapiSession {
    fn backend(&self) -> &'static str {
        "WASAPI"
    }

    fn format(&self) -> &DeviceFormat {
        &self.format
    }

    fn period(&self) -> &PeriodInfo {
        &self.period
    }

    fn acquire(&mut self, frames: u32) -> Result<&mut [u8], PlatformError> {
        self.acquired_frames = frames;
        if frames == 0 {
            return Ok(&mut []);
        }

        let data_ptr = unsafe { self.render_client.GetBuffer(frames) }
            .map_err(|e| PlatformError::Device(format!("GetBuffer({}): {}", frames, e)))?;

        let len = self.format.bytes_for_frames(frames);
        // SAFETY: GetBuffer returned a region of exactly `frames` frames that
        // stays valid until ReleaseBuffer
        Ok(unsafe { std::slice::from_raw_parts_mut(data_ptr, len) })
    }

    fn commit(&mut self, frames: u32) -> Result<(), PlatformError> {
        if frames > self.acquired_frames {
            return Err(PlatformError::Device(format!(
                "commit of {} frames exceeds acquired {}",
                frames, self.acquired_frames
            )));
        }
        let acquired = std::mem::take(&mut self.acquired_frames);
        if acquired == 0 {
            return Ok(());
        }

        unsafe { self.render_client.ReleaseBuffer(frames, 0) }
            .map_err(|e| PlatformError::Device(format!("ReleaseBuffer({}): {}", frames, e)))
    }

    fn frames_pending(&self) -> Result<u32, PlatformError> {
        unsafe { self.client.GetCurrentPadding() }
            .map_err(|e| PlatformError::Device(format!("GetCurrentPadding: {}", e)))
    }

    fn start(&mut self) -> Result<(), PlatformError> {
        if self.started {
            return Ok(());
        }
        unsafe { self.client.Start() }
            .map_err(|e| PlatformError::Device(format!("Start: {}", e)))?;
        self.started = true;
        tracing::debug!("WASAPI stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<(), PlatformError> {
        if !self.started {
            return Ok(());
        }
        self.started = false;
        unsafe { self.client.Stop() }
            .map_err(|e| PlatformError::Device(format!("Stop: {}", e)))?;
        tracing::debug!("WASAPI stream stopped");
        Ok(())
    }

    fn wait_ready(&mut self) -> Result<(), PlatformError> {
        let result = unsafe { WaitForSingleObject(self.ready_event, INFINITE) };
        if result != WAIT_OBJECT_0 {
            return Err(PlatformError::Device(format!(
                "wait on ready event failed ({:?})",
                result
            )));
        }
        Ok(())
    }
}

impl Drop for WasapiSession {
    fn drop(&mut self) {
        let _ = self.stop();
        unsafe {
            let _ = CloseHandle(self.ready_event);
        }
        tracing::debug!("WASAPI session released");
    }
}
