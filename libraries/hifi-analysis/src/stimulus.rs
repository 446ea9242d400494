//! Playback waveform for a test plan
//!
//! Layout, in samples:
//!
//! ```text
//! [pause before] [preamble] [pause after] [pip 0][pause] [pip 1][pause] ...
//! ```
//!
//! Pips appear in playback order, each a sine at its playback frequency shaped
//! by the plan's apodization window. Pip positions use
//! [`TestPlan::pip_offset`], the same helper the analyzer measures with.

use crate::plan::TestPlan;
use std::f64::consts::PI;

/// Render the full stimulus for `plan` with peak `amplitude`
pub fn render_stimulus(plan: &TestPlan, amplitude: f64) -> Vec<f32> {
    let lead = plan
        .timing()
        .samples(plan.timing().pause_before_preamble_s);
    let total = lead + plan.pip_offset(plan.pip_count());
    let mut samples = vec![0.0_f32; total];

    for (slot, &p) in samples[lead..].iter_mut().zip(plan.preamble()) {
        *slot = (amplitude * p) as f32;
    }

    let sample_rate = f64::from(plan.sample_rate());
    for pip in 0..plan.pip_count() {
        let start = lead + plan.pip_offset(pip);
        let step = 2.0 * PI * plan.playback_frequency(pip) / sample_rate;
        for (n, (slot, &w)) in samples[start..]
            .iter_mut()
            .zip(plan.window())
            .enumerate()
        {
            *slot = (amplitude * w * (step * n as f64).sin()) as f32;
        }
    }

    samples
}
