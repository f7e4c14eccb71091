//! Focus and zoom control on a running session.
//!
//! Both are best effort: they do nothing on a stopped session or on a
//! device that lacks the capability, and device rejections are logged
//! rather than returned.

use super::{CameraSession, SessionState};
use crate::capture::{FocusArea, FocusMode, Rect};
use tracing::{debug, warn};

/// Weight given to regions passed to [`CameraSession::focus`].
pub const FOCUS_AREA_WEIGHT: u32 = 100;

/// Maps a zoom percentage onto a zoom-ratio index.
///
/// `percent` is clamped to `[1, 100]` and scaled linearly onto
/// `0..ratio_count`. Returns `None` when there are no ratios.
pub fn zoom_index(percent: i32, ratio_count: usize) -> Option<usize> {
    if ratio_count == 0 {
        return None;
    }
    let percent = percent.clamp(1, 100) as usize;
    Some((percent * ratio_count / 100).min(ratio_count - 1))
}

impl CameraSession {
    /// Runs a one-shot autofocus on `focus_area`, metering on
    /// `metering_area` where supported.
    ///
    /// The previous focus mode is restored once the driver reports the
    /// autofocus result, which happens after this call returns.
    pub fn focus(&self, focus_area: Rect, metering_area: Rect) {
        debug!("focus");
        self.shared.thread.check_is_current();

        let capabilities = &self.shared.capabilities;
        if capabilities.max_focus_areas == 0 {
            return;
        }

        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return;
        }
        let mut settings = match inner.device.settings() {
            Ok(settings) => settings,
            Err(e) => {
                warn!(error = %e, "Failed to read focus settings");
                return;
            }
        };
        let saved_mode = settings.focus_mode;

        settings.focus_mode = FocusMode::Auto;
        settings.focus_areas = vec![FocusArea::new(focus_area, FOCUS_AREA_WEIGHT)];
        if capabilities.max_metering_areas > 0 {
            settings.metering_areas = vec![FocusArea::new(metering_area, FOCUS_AREA_WEIGHT)];
        }

        inner.device.cancel_auto_focus();
        if let Err(e) = inner.device.apply_settings(&settings) {
            warn!(error = %e, "Camera rejected focus areas");
            return;
        }

        let (weak, thread) = self.callback_handles();
        inner.device.auto_focus(Box::new(move |success| {
            thread.post(move || {
                if let Some(session) = CameraSession::upgrade(&weak) {
                    session.restore_focus_mode(saved_mode, success);
                }
            });
        }));
    }

    fn restore_focus_mode(&self, mode: FocusMode, success: bool) {
        self.shared.thread.check_is_current();
        debug!(success, ?mode, "Auto focus finished");

        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return;
        }
        let result = inner.device.settings().and_then(|mut settings| {
            settings.focus_mode = mode;
            inner.device.apply_settings(&settings)
        });
        if let Err(e) = result {
            warn!(error = %e, "Failed to restore focus mode");
        }
    }

    /// Zooms to `percent` of the device's zoom range.
    pub fn set_zoom(&self, percent: i32) {
        debug!(percent, "setZoom");
        self.shared.thread.check_is_current();

        let capabilities = &self.shared.capabilities;
        if !capabilities.zoom_supported {
            return;
        }
        let Some(index) = zoom_index(percent, capabilities.zoom_ratios.len()) else {
            return;
        };

        let mut inner = self.lock();
        if inner.state != SessionState::Running {
            return;
        }
        let result = inner.device.settings().and_then(|mut settings| {
            settings.zoom = index;
            inner.device.apply_settings(&settings)
        });
        if let Err(e) = result {
            warn!(error = %e, index, "Failed to apply zoom");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zoom_clamping() {
        assert_eq!(zoom_index(0, 10), zoom_index(1, 10));
        assert_eq!(zoom_index(150, 10), zoom_index(100, 10));
        assert_eq!(zoom_index(-20, 10), Some(0));
    }

    #[test]
    fn test_zoom_linear_mapping() {
        assert_eq!(zoom_index(55, 10), Some(5));
        assert_eq!(zoom_index(100, 10), Some(9));
        assert_eq!(zoom_index(1, 10), Some(0));
        assert_eq!(zoom_index(50, 3), Some(1));
    }

    #[test]
    fn test_zoom_without_ratios() {
        assert_eq!(zoom_index(50, 0), None);
    }
}
