//! Closest-match selection of a capture format from device capabilities.
//!
//! Everything here is a pure function of the capability lists and the
//! request, so it can be exercised with synthetic lists.

use super::types::{CaptureFormat, FramerateRange, Size};
use std::cmp::Ordering;
use thiserror::Error;

/// Errors produced when no format can be chosen.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// The framerate range list is empty.
    #[error("device reports no supported frame rate ranges")]
    NoFramerateRanges,
    /// A size list is empty; names which one.
    #[error("device reports no supported {0} sizes")]
    NoSizes(&'static str),
}

/// Result of format negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NegotiatedFormat {
    /// Preview capture format.
    pub format: CaptureFormat,
    /// Picture size chosen with the same matching rule.
    pub picture_size: Size,
}

/// Chooses the capture format and picture size closest to the request.
///
/// `requested_framerate` is in frames per second; the ranges are in device
/// units (fps × 1000).
pub fn negotiate(
    framerate_ranges: &[FramerateRange],
    preview_sizes: &[Size],
    picture_sizes: &[Size],
    requested_width: u32,
    requested_height: u32,
    requested_framerate: u32,
) -> Result<NegotiatedFormat, NegotiationError> {
    tracing::debug!(
        ranges = ?framerate_ranges,
        requested_framerate,
        "Available fps ranges"
    );

    let framerate = closest_framerate_range(framerate_ranges, requested_framerate)
        .ok_or(NegotiationError::NoFramerateRanges)?;
    let preview = closest_size(preview_sizes, requested_width, requested_height)
        .ok_or(NegotiationError::NoSizes("preview"))?;
    let picture_size = closest_size(picture_sizes, requested_width, requested_height)
        .ok_or(NegotiationError::NoSizes("picture"))?;

    Ok(NegotiatedFormat {
        format: CaptureFormat::new(preview.width, preview.height, framerate),
        picture_size,
    })
}

/// Picks the range whose midpoint is closest to `requested_fps`.
///
/// Ties go to the narrowest range, then to the earliest in the list.
pub fn closest_framerate_range(
    ranges: &[FramerateRange],
    requested_fps: u32,
) -> Option<FramerateRange> {
    let target = f64::from(requested_fps);
    ranges.iter().copied().min_by(|a, b| {
        let da = (a.midpoint_fps() - target).abs();
        let db = (b.midpoint_fps() - target).abs();
        da.total_cmp(&db).then_with(|| a.span().cmp(&b.span()))
    })
}

/// Picks the supported size closest to `width` x `height`.
///
/// The distance combines the relative pixel-count difference with the
/// aspect-ratio difference. Ties go to the smallest size covering the
/// requested area, otherwise to the largest size.
pub fn closest_size(sizes: &[Size], width: u32, height: u32) -> Option<Size> {
    let requested = Size::new(width, height);
    sizes.iter().copied().min_by(|a, b| {
        size_distance(*a, requested)
            .total_cmp(&size_distance(*b, requested))
            .then_with(|| tie_break(*a, *b, requested))
    })
}

fn size_distance(size: Size, requested: Size) -> f64 {
    let requested_area = requested.area().max(1) as f64;
    let pixels = (size.area() as f64 - requested.area() as f64).abs() / requested_area;
    let aspect = match (size.aspect_ratio(), requested.aspect_ratio()) {
        (Some(a), Some(b)) => (a - b).abs(),
        _ => 0.0,
    };
    pixels + aspect
}

fn tie_break(a: Size, b: Size, requested: Size) -> Ordering {
    let covers = |s: Size| s.area() >= requested.area();
    match (covers(a), covers(b)) {
        (true, true) => a.area().cmp(&b.area()),
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        (false, false) => b.area().cmp(&a.area()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sizes() -> Vec<Size> {
        vec![
            Size::new(640, 480),
            Size::new(1280, 720),
            Size::new(1920, 1080),
        ]
    }

    #[test]
    fn test_closest_size_near_720p() {
        assert_eq!(closest_size(&sizes(), 1270, 700), Some(Size::new(1280, 720)));
    }

    #[test]
    fn test_exact_match_wins() {
        assert_eq!(closest_size(&sizes(), 640, 480), Some(Size::new(640, 480)));
    }

    #[test]
    fn test_oversized_request_picks_largest() {
        assert_eq!(
            closest_size(&sizes(), 4000, 2250),
            Some(Size::new(1920, 1080))
        );
    }

    #[test]
    fn test_equal_distance_prefers_covering_size() {
        // Same area and aspect, so only the tie break separates them.
        let duplicated = vec![Size::new(320, 240), Size::new(320, 240)];
        assert_eq!(closest_size(&duplicated, 320, 240), Some(Size::new(320, 240)));

        let requested = Size::new(100, 100);
        assert_eq!(
            tie_break(Size::new(90, 90), Size::new(110, 110), requested),
            Ordering::Greater
        );
        assert_eq!(
            tie_break(Size::new(120, 120), Size::new(110, 110), requested),
            Ordering::Greater
        );
        assert_eq!(
            tie_break(Size::new(50, 50), Size::new(90, 90), requested),
            Ordering::Greater
        );
    }

    #[test]
    fn test_framerate_midpoint() {
        let ranges = vec![FramerateRange::new(15000, 15000), FramerateRange::new(15000, 30000)];
        assert_eq!(
            closest_framerate_range(&ranges, 30),
            Some(FramerateRange::new(15000, 30000))
        );
    }

    #[test]
    fn test_framerate_tie_prefers_narrowest() {
        let ranges = vec![FramerateRange::new(10000, 30000), FramerateRange::new(20000, 20000)];
        assert_eq!(
            closest_framerate_range(&ranges, 20),
            Some(FramerateRange::new(20000, 20000))
        );
    }

    #[test]
    fn test_negotiate_full() {
        let ranges = vec![FramerateRange::new(7000, 30000), FramerateRange::new(30000, 30000)];
        let pictures = vec![Size::new(2592, 1944), Size::new(1280, 960)];
        let negotiated = negotiate(&ranges, &sizes(), &pictures, 1280, 720, 30).unwrap();

        assert_eq!(negotiated.format.size(), Size::new(1280, 720));
        assert_eq!(negotiated.format.framerate, FramerateRange::new(30000, 30000));
        assert_eq!(negotiated.picture_size, Size::new(1280, 960));
    }

    #[test]
    fn test_negotiate_empty_lists() {
        let ranges = vec![FramerateRange::new(30000, 30000)];
        assert_eq!(
            negotiate(&[], &sizes(), &sizes(), 640, 480, 30),
            Err(NegotiationError::NoFramerateRanges)
        );
        assert_eq!(
            negotiate(&ranges, &[], &sizes(), 640, 480, 30),
            Err(NegotiationError::NoSizes("preview"))
        );
        assert_eq!(
            negotiate(&ranges, &sizes(), &[], 640, 480, 30),
            Err(NegotiationError::NoSizes("picture"))
        );
    }

    #[test]
    fn test_zero_request_does_not_panic() {
        assert_eq!(closest_size(&sizes(), 0, 0), Some(Size::new(640, 480)));
    }

    proptest! {
        #[test]
        fn chosen_size_is_supported(
            dims in prop::collection::vec((1u32..4000, 1u32..4000), 1..12),
            width in 0u32..5000,
            height in 0u32..5000,
        ) {
            let supported: Vec<Size> = dims.into_iter().map(|(w, h)| Size::new(w, h)).collect();
            let chosen = closest_size(&supported, width, height).unwrap();
            prop_assert!(supported.contains(&chosen));
        }

        #[test]
        fn chosen_range_is_supported(
            bounds in prop::collection::vec((1u32..60, 0u32..60), 1..8),
            fps in 0u32..120,
        ) {
            let supported: Vec<FramerateRange> = bounds
                .into_iter()
                .map(|(min, extra)| FramerateRange::new(min * 1000, (min + extra) * 1000))
                .collect();
            let chosen = closest_framerate_range(&supported, fps).unwrap();
            prop_assert!(supported.contains(&chosen));
        }
    }
}
