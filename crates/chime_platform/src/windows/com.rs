//! COM Initialization
//!
//! RAII guard around `CoInitializeEx`/`CoUninitialize` for the thread that
//! owns a WASAPI session.
//!
//! # COM Threading Model
//!
//! The feed thread blocks in `WaitForSingleObject` without pumping window
//! messages, so it joins the multithreaded apartment (MTA). An STA thread
//! must not block like that.

use crate::error::PlatformError;

/// RAII guard for COM initialization
///
/// Initializes COM when created, uninitializes when dropped. Not `Send`:
/// it must be dropped on the thread that created it.
pub struct ComGuard {
    /// Marker to prevent Send/Sync (COM is thread-local)
    _not_send_sync: std::marker::PhantomData<*const ()>,
}

impl ComGuard {
    /// Initialize COM (MTA) for the current thread
    ///
    /// Calling this on a thread that is already in the MTA succeeds
    /// (`S_FALSE`); each success is balanced by one `CoUninitialize`.
    pub fn new() -> Result<Self, PlatformError> {
        use windows::Win32::System::Com::{CoInitializeEx, COINIT_DISABLE_OLE1DDE, COINIT_MULTITHREADED};

        // SAFETY: balanced by CoUninitialize in Drop on this same thread
        let hr = unsafe { CoInitializeEx(None, COINIT_MULTITHREADED | COINIT_DISABLE_OLE1DDE) };
        if hr.is_err() {
            return Err(PlatformError::InitializationFailed(format!(
                "COM initialization failed: {:?}",
                hr
            )));
        }

        tracing::trace!("COM initialized for thread {:?}", std::thread::current().id());

        Ok(Self {
            _not_send_sync: std::marker::PhantomData,
        })
    }
}

impl Drop for ComGuard {
    fn drop(&mut self) {
        use windows::Win32::System::Com::CoUninitialize;

        // SAFETY: We initialized COM in new(), so we must uninitialize
        unsafe {
            CoUninitialize();
        }

        tracing::trace!("COM uninitialized for thread {:?}", std::thread::current().id());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_com_initialization_nests() {
        let outer = ComGuard::new();
        assert!(outer.is_ok(), "COM should initialize successfully");

        // Balanced nested init on the same thread is allowed
        let inner = ComGuard::new();
        assert!(inner.is_ok(), "Second COM init should succeed");
    }

    #[test]
    fn test_com_guard_drops_cleanly() {
        {
            let _guard = ComGuard::new().unwrap();
        }
        assert!(ComGuard::new().is_ok(), "Should reinitialize after drop");
    }
}
