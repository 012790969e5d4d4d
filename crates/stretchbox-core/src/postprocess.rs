//! Block post-processing applied to each rendered region

use crate::types::AudioBuffer;

/// Default fade length at region edges, in frames
pub const DEFAULT_CROSSFADE_MARGIN: usize = 1024;

/// Reverse the first `frames` frames of every channel in place
pub fn reverse_block(buffer: &mut AudioBuffer, frames: usize) {
    let frames = frames.min(buffer.len());
    for channel in buffer.channels_mut() {
        channel[..frames].reverse();
    }
}

/// Linear fade-in over the first `margin` frames and fade-out over the last
/// `margin` frames of `buffer[0..frames]`
///
/// Blocks shorter than two margins are left untouched.
pub fn fade_block(buffer: &mut AudioBuffer, frames: usize, margin: usize) {
    let frames = frames.min(buffer.len());
    if margin == 0 || frames < 2 * margin {
        if margin > 0 {
            log::debug!("Block of {} frames too short for a {}-frame fade", frames, margin);
        }
        return;
    }

    let tail = frames - margin;
    for channel in buffer.channels_mut() {
        for v in 0..margin {
            let gain = v as f32 / margin as f32;
            channel[v] *= gain;
            channel[tail + v] *= 1.0 - gain;
        }
    }
}
