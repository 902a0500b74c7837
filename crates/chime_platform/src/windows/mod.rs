//! Windows Platform Backend - WASAPI
//!
//! Shared-mode, event-driven render session on the default endpoint.
//!
//! # Threading
//!
//! ```text
//! Feed Thread
//! ───────────
//! ComGuard (MTA)
//!   └── WasapiSession
//!         ├── IAudioClient3 / IAudioRenderClient
//!         └── ready event ◄── audio engine, once per period
//! ```
//!
//! The session, and the COM apartment it lives in, belong to the thread that
//! opened it.

pub mod com;
pub mod session;

pub use com::ComGuard;
pub use session::WasapiSession;
