use std::time::Duration;

pub const MIN_PATH_STEPS: u32 = 10;
const MAX_PATH_STEPS: u32 = 60;
/// Target spacing between MOVE events.
const STEP_INTERVAL_MS: u32 = 20;

/// Number of MOVE events for a gesture lasting `duration_ms`.
pub fn path_steps(duration_ms: u32) -> u32 {
    (duration_ms / STEP_INTERVAL_MS).clamp(MIN_PATH_STEPS, MAX_PATH_STEPS)
}

/// Delay between consecutive MOVE events.
pub fn step_delay(duration_ms: u32, steps: u32) -> Duration {
    Duration::from_millis(u64::from(duration_ms / steps.max(1)))
}

/// Points strictly after `from`, linearly spaced, ending exactly at `to`.
pub fn interpolate_path(from: (u32, u32), to: (u32, u32), steps: u32) -> Vec<(u32, u32)> {
    let steps = steps.max(1);
    (1..=steps)
        .map(|i| {
            if i == steps {
                return to;
            }
            let t = f64::from(i) / f64::from(steps);
            (lerp(from.0, to.0, t), lerp(from.1, to.1, t))
        })
        .collect()
}

fn lerp(a: u32, b: u32, t: f64) -> u32 {
    let v = f64::from(a) + (f64::from(b) - f64::from(a)) * t;
    v.round().max(0.0) as u32
}
