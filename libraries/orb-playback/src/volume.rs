//! Local output volume
//!
//! Volume is per listener: in a listen party it is never sent to or taken
//! from the host.

use crate::error::{PlaybackError, Result};

/// Linear output gain with mute
#[derive(Debug, Clone, PartialEq)]
pub struct Volume {
    /// Gain in `[0, 1]`
    gain: f32,

    /// Mute state (preserves gain)
    muted: bool,
}

impl Volume {
    /// Create a volume at `gain`, clamped to `[0, 1]` (NaN becomes unity)
    pub fn new(gain: f32) -> Self {
        Self {
            gain: if gain.is_nan() { 1.0 } else { gain.clamp(0.0, 1.0) },
            muted: false,
        }
    }

    /// Set the gain, clamped to `[0, 1]`
    ///
    /// Returns the stored gain. NaN is rejected and leaves the gain unchanged.
    pub fn set_gain(&mut self, gain: f32) -> Result<f32> {
        if gain.is_nan() {
            return Err(PlaybackError::InvalidVolume(gain));
        }
        self.gain = gain.clamp(0.0, 1.0);
        Ok(self.gain)
    }

    /// Gain as set, ignoring mute
    pub fn level(&self) -> f32 {
        self.gain
    }

    pub fn mute(&mut self) {
        self.muted = true;
    }

    pub fn unmute(&mut self) {
        self.muted = false;
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Gain to hand to the backend (0 when muted)
    pub fn effective_gain(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.gain
        }
    }

    /// Scale interleaved samples in place
    pub fn apply(&self, buffer: &mut [f32]) {
        let gain = self.effective_gain();
        if gain == 0.0 {
            buffer.fill(0.0);
        } else if gain != 1.0 {
            for sample in buffer.iter_mut() {
                *sample *= gain;
            }
        }
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::new(1.0)
    }
}
