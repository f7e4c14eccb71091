//! Capture format types and negotiation.
//!
//! A device reports what it supports as plain lists of sizes and frame
//! rate ranges. Negotiation picks the closest entries to a request without
//! touching the device, so the same code drives real and mock hardware.

mod negotiate;
mod types;

pub use negotiate::{
    closest_framerate_range, closest_size, negotiate, NegotiatedFormat, NegotiationError,
};
pub use types::{
    resolution_sample, CaptureFormat, FramerateRange, PixelFormat, Size, COMMON_RESOLUTIONS,
};
