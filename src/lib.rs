//! Camera Capture Session Library
//!
//! The core of a camera capture session: it opens a camera device,
//! negotiates a capture format, streams frames to a consumer and handles
//! hardware errors and shutdown.
//!
//! # Architecture
//!
//! ```text
//! format (negotiation) ─┐
//! orientation ──────────┼─► session (state machine on a CameraThread) ─► CameraEvents
//! capture (device, surface, frames) ─┘        │
//!                                             └─► metrics (StatsSink)
//! ```
//!
//! # Design Principles
//!
//! - **Single owner**: every state change runs on the session's camera thread
//! - **Release exactly once**: the device is released on stop or failure, never twice
//! - **Bounded buffers**: raw frames cycle through a fixed pool that is never
//!   resubmitted after stop
//! - **Failures are events**: hardware errors stop the session and are reported,
//!   not returned
//!
//! # Example
//!
//! ```no_run
//! use camera_session::{
//!     capture::{MockBackend, MockCameraSpec, MockSurfaceSource, Frame},
//!     session::{CameraEvents, CameraSession, CameraThread, SessionContext, SessionRequest},
//! };
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! impl CameraEvents for Printer {
//!     fn on_camera_opening(&self) {}
//!     fn on_frame_captured(&self, _: &CameraSession, frame: &Frame) {
//!         println!("{}x{} rotated {}", frame.width(), frame.height(), frame.rotation());
//!     }
//!     fn on_camera_error(&self, _: &CameraSession, message: &str) {
//!         eprintln!("{}", message);
//!     }
//!     fn on_camera_disconnected(&self, _: &CameraSession) {}
//!     fn on_camera_closed(&self, _: &CameraSession) {}
//! }
//!
//! let backend = Arc::new(MockBackend::new().with_camera(0, MockCameraSpec::back()));
//! let context = SessionContext::new(backend, Arc::new(MockSurfaceSource::new()), Arc::new(Printer));
//!
//! let (thread, worker) = CameraThread::spawn("camera").unwrap();
//! CameraSession::create(&thread, context, SessionRequest::new(0, 1280, 720, 30), |result| {
//!     match result {
//!         Ok(session) => println!("opened {}", session.preview_size()),
//!         Err(e) => eprintln!("open failed: {}", e),
//!     }
//! });
//! thread.shutdown();
//! worker.join().unwrap();
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod capture;
pub mod format;
pub mod metrics;
pub mod orientation;
pub mod session;

// Re-export commonly used types at crate root
pub use capture::{CameraBackend, CameraDevice, Frame, SessionConfig};
pub use format::{negotiate, CaptureFormat, FramerateRange, Size};
pub use metrics::{MetricsRegistry, StatsSink};
pub use orientation::{compute_frame_rotation, DeviceInfo, Facing};
pub use session::{
    CameraEvents, CameraSession, CameraThread, SessionContext, SessionError, SessionRequest,
    SessionState,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
