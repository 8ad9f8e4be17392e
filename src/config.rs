//! Configuration for the three pipeline components.
//!
//! Each struct mirrors one component and is independently constructable,
//! validated, and defaulted so the CLI, a future GUI, or a test can build
//! just the piece it needs.

use glcap_proto::Rect;

use crate::error::CaptureError;

/// GL Capture settings: target frame rate, optional crop, and the two
/// escape-hatch flags from the host capture component (`LOCK_FPS`,
/// `IGNORE_TIME`).
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub fps: f64,
    pub crop: Option<Rect>,
    pub dword_aligned: bool,
    /// Block on a full buffer instead of dropping the frame.
    pub lock_fps: bool,
    /// Stamp every frame with `now()` instead of the PBO-start time.
    pub ignore_time: bool,
    pub buffer_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            crop: None,
            dword_aligned: true,
            lock_fps: false,
            ignore_time: false,
            buffer_capacity: 8,
        }
    }
}

impl CaptureConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.fps > 0.0) || !self.fps.is_finite() {
            return Err(CaptureError::Configuration(format!("fps must be positive and finite, got {}", self.fps)));
        }
        if self.buffer_capacity == 0 {
            return Err(CaptureError::Configuration("buffer_capacity must be at least 1".into()));
        }
        Ok(())
    }
}

/// Software Scaler settings: the target scale factor and worker pool size.
#[derive(Debug, Clone)]
pub struct ScalerConfig {
    pub scale: f64,
    /// `None` uses `std::thread::available_parallelism()`.
    pub workers: Option<usize>,
    pub buffer_capacity: usize,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self { scale: 1.0, workers: None, buffer_capacity: 8 }
    }
}

impl ScalerConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.scale > 0.0) || !self.scale.is_finite() {
            return Err(CaptureError::Configuration(format!("scale must be positive and finite, got {}", self.scale)));
        }
        if matches!(self.workers, Some(0)) {
            return Err(CaptureError::Configuration("workers must be at least 1 when set explicitly".into()));
        }
        Ok(())
    }
}

/// Info Sink settings: whether the diagnostic tally is even computed, and at
/// what verbosity it logs.
#[derive(Debug, Clone, Copy)]
pub struct InfoConfig {
    pub enabled: bool,
    /// Verbosity level in `1..=6`, mirroring the original's `INFO_*` level
    /// ladder: `1` tallies silently, `2` additionally logs format changes,
    /// `3` additionally logs the rolling fps estimate, `4` and above also
    /// log audio format/packet events.
    pub info_level: u8,
}

impl Default for InfoConfig {
    fn default() -> Self {
        Self { enabled: true, info_level: 1 }
    }
}

impl InfoConfig {
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(1..=6).contains(&self.info_level) {
            return Err(CaptureError::Configuration(format!("info_level must be in 1..=6, got {}", self.info_level)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_capture_config_validates() {
        assert!(CaptureConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let config = CaptureConfig { fps: 0.0, ..CaptureConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_scale_is_rejected() {
        let config = ScalerConfig { scale: 0.0, ..ScalerConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_zero_workers_is_rejected() {
        let config = ScalerConfig { workers: Some(0), ..ScalerConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_info_config_validates() {
        assert!(InfoConfig::default().validate().is_ok());
    }

    #[test]
    fn out_of_range_info_level_is_rejected() {
        assert!(InfoConfig { info_level: 0, ..InfoConfig::default() }.validate().is_err());
        assert!(InfoConfig { info_level: 7, ..InfoConfig::default() }.validate().is_err());
    }
}
