//! Analog-modelled biquad filter bank.
//!
//! [`AnalogFilter`] cascades up to `MAX_FILTER_STAGES + 1` identical first- or
//! second-order sections. Coefficients follow the RBJ Audio EQ Cookbook, with
//! resonance and gain redistributed across the cascade so that the combined
//! response matches a single equivalent section.
//!
//! Large frequency jumps are rendered click-free: the previous coefficients and
//! histories are kept for one block, both cascades run on the same input and
//! the two outputs are cross-faded linearly across the block.
//!
//! # Difference Equation
//!
//! Feedback coefficients are stored with their sign already flipped:
//!
//! ```text
//! y[n] = c0*x[n] + c1*x[n-1] + c2*x[n-2]
//!                + d1*y[n-1] + d2*y[n-2]
//! ```

use core::f32::consts::PI;
use libm::{cosf, expf, powf, sinf, sqrtf};

use crate::math::db_to_linear;

/// Highest stage index. A filter runs `stages + 1` sections, so at most
/// `MAX_FILTER_STAGES + 1`.
pub const MAX_FILTER_STAGES: usize = 5;

/// Lowest accepted frequency in Hz.
const MIN_FREQUENCY: f32 = 0.1;

/// Distance below Nyquist at which coefficients switch to their fallback.
const NYQUIST_MARGIN: f32 = 500.0;

/// Frequency ratio above which a change is cross-faded.
const INTERPOLATION_RATIO: f32 = 3.0;

/// Keeps `alpha` finite when resonance is clamped to zero.
const Q_FLOOR: f32 = 1e-4;

/// The nine filter responses.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterType {
    /// One-pole low-pass
    #[default]
    LowPass1,
    /// One-pole high-pass
    HighPass1,
    /// Two-pole low-pass
    LowPass2,
    /// Two-pole high-pass
    HighPass2,
    /// Two-pole band-pass
    BandPass2,
    /// Two-pole notch
    Notch2,
    /// Two-pole peaking EQ
    Peak2,
    /// Two-pole low shelf
    LowShelf2,
    /// Two-pole high shelf
    HighShelf2,
}

impl FilterType {
    /// All types in control-index order.
    pub const ALL: [FilterType; 9] = [
        FilterType::LowPass1,
        FilterType::HighPass1,
        FilterType::LowPass2,
        FilterType::HighPass2,
        FilterType::BandPass2,
        FilterType::Notch2,
        FilterType::Peak2,
        FilterType::LowShelf2,
        FilterType::HighShelf2,
    ];

    /// Map a control index to a type. Unknown indices fall back to
    /// [`FilterType::LowPass1`].
    pub fn from_index(index: u8) -> Self {
        Self::ALL
            .get(usize::from(index))
            .copied()
            .unwrap_or(FilterType::LowPass1)
    }

    /// Control index of this type.
    pub fn index(self) -> u8 {
        self as u8
    }

    /// Order of the sections this type uses.
    pub fn order(self) -> FilterOrder {
        match self {
            FilterType::LowPass1 | FilterType::HighPass1 => FilterOrder::First,
            _ => FilterOrder::Second,
        }
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FilterType::LowPass1 => "LPF 1 pole",
            FilterType::HighPass1 => "HPF 1 pole",
            FilterType::LowPass2 => "LPF 2 poles",
            FilterType::HighPass2 => "HPF 2 poles",
            FilterType::BandPass2 => "BPF 2 poles",
            FilterType::Notch2 => "Notch 2 poles",
            FilterType::Peak2 => "Peak",
            FilterType::LowShelf2 => "Low Shelf",
            FilterType::HighShelf2 => "High Shelf",
        }
    }
}

/// Order of a single filter section.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOrder {
    /// Uses `c0, c1, d1`
    First,
    /// Uses all five coefficients
    Second,
}

/// Coefficients of one section.
///
/// `d[0]` is never used; it is kept so indices line up with the delay taps.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Coefficients {
    /// Feed-forward taps
    pub c: [f32; 3],
    /// Feedback taps (sign already flipped)
    pub d: [f32; 3],
    /// Section order
    pub order: FilterOrder,
}

impl Coefficients {
    /// Coefficients that pass the signal unchanged.
    pub const PASSTHROUGH: Coefficients = Coefficients {
        c: [1.0, 0.0, 0.0],
        d: [0.0, 0.0, 0.0],
        order: FilterOrder::First,
    };

    fn second(c: [f32; 3], d1: f32, d2: f32) -> Self {
        Self {
            c,
            d: [0.0, d1, d2],
            order: FilterOrder::Second,
        }
    }

    fn second_gain(c0: f32) -> Self {
        Self::second([c0, 0.0, 0.0], 0.0, 0.0)
    }

    /// Derive the per-section coefficients.
    ///
    /// `gain` is linear. `freq` and `q` are clamped here; `stages` is the
    /// extra section count (0 means a single section).
    pub fn compute(
        filter_type: FilterType,
        freq: f32,
        q: f32,
        gain: f32,
        stages: usize,
        sample_rate: f32,
    ) -> Self {
        let nyquist_limit = sample_rate / 2.0 - NYQUIST_MARGIN;
        let mut freq = freq;
        let mut zero_coefs = false;
        if freq > nyquist_limit {
            freq = nyquist_limit;
            zero_coefs = true;
        }
        let freq = freq.max(MIN_FREQUENCY);
        let q = q.max(0.0);

        let (stage_q, stage_gain) = if stages == 0 {
            (q, gain)
        } else {
            let root = 1.0 / (stages as f32 + 1.0);
            (if q > 1.0 { powf(q, root) } else { q }, powf(gain, root))
        };
        let stage_q = stage_q.max(Q_FLOOR);
        // Shelf/peak amplitude is the linear gain itself, so a section's
        // extreme response is stage_gain squared.
        let amp = stage_gain;

        let omega = 2.0 * PI * freq / sample_rate;
        let sn = sinf(omega);
        let cs = cosf(omega);

        match filter_type {
            FilterType::LowPass1 => {
                let tmp = if zero_coefs { 0.0 } else { expf(-omega) };
                Self {
                    c: [1.0 - tmp, 0.0, 0.0],
                    d: [0.0, tmp, 0.0],
                    order: FilterOrder::First,
                }
            }
            FilterType::HighPass1 => {
                let tmp = if zero_coefs { 0.0 } else { expf(-omega) };
                Self {
                    c: [(1.0 + tmp) / 2.0, -(1.0 + tmp) / 2.0, 0.0],
                    d: [0.0, tmp, 0.0],
                    order: FilterOrder::First,
                }
            }
            FilterType::LowPass2 => {
                if zero_coefs {
                    return Self::second_gain(1.0);
                }
                let alpha = sn / (2.0 * stage_q);
                let tmp = 1.0 + alpha;
                Self::second(
                    [(1.0 - cs) / 2.0 / tmp, (1.0 - cs) / tmp, (1.0 - cs) / 2.0 / tmp],
                    2.0 * cs / tmp,
                    -(1.0 - alpha) / tmp,
                )
            }
            FilterType::HighPass2 => {
                if zero_coefs {
                    return Self::second_gain(0.0);
                }
                let alpha = sn / (2.0 * stage_q);
                let tmp = 1.0 + alpha;
                Self::second(
                    [(1.0 + cs) / 2.0 / tmp, -(1.0 + cs) / tmp, (1.0 + cs) / 2.0 / tmp],
                    2.0 * cs / tmp,
                    -(1.0 - alpha) / tmp,
                )
            }
            FilterType::BandPass2 => {
                if zero_coefs {
                    return Self::second_gain(0.0);
                }
                let alpha = sn / (2.0 * stage_q);
                let tmp = 1.0 + alpha;
                let scale = sqrtf(stage_q + 1.0);
                Self::second(
                    [alpha / tmp * scale, 0.0, -alpha / tmp * scale],
                    2.0 * cs / tmp,
                    -(1.0 - alpha) / tmp,
                )
            }
            FilterType::Notch2 => {
                if zero_coefs {
                    return Self::second_gain(1.0);
                }
                let alpha = sn / (2.0 * sqrtf(stage_q));
                let tmp = 1.0 + alpha;
                Self::second(
                    [1.0 / tmp, -2.0 * cs / tmp, 1.0 / tmp],
                    2.0 * cs / tmp,
                    -(1.0 - alpha) / tmp,
                )
            }
            FilterType::Peak2 => {
                if zero_coefs {
                    return Self::second_gain(1.0);
                }
                let alpha = sn / (2.0 * stage_q * 3.0);
                let tmp = 1.0 + alpha / amp;
                Self::second(
                    [(1.0 + alpha * amp) / tmp, (-2.0 * cs) / tmp, (1.0 - alpha * amp) / tmp],
                    2.0 * cs / tmp,
                    -(1.0 - alpha / amp) / tmp,
                )
            }
            FilterType::LowShelf2 => {
                if zero_coefs {
                    return Self::second_gain(stage_gain);
                }
                let beta = sqrtf(amp) / sqrtf(stage_q);
                let tmp = (amp + 1.0) + (amp - 1.0) * cs + beta * sn;
                Self::second(
                    [
                        amp * ((amp + 1.0) - (amp - 1.0) * cs + beta * sn) / tmp,
                        2.0 * amp * ((amp - 1.0) - (amp + 1.0) * cs) / tmp,
                        amp * ((amp + 1.0) - (amp - 1.0) * cs - beta * sn) / tmp,
                    ],
                    2.0 * ((amp - 1.0) + (amp + 1.0) * cs) / tmp,
                    -((amp + 1.0) + (amp - 1.0) * cs - beta * sn) / tmp,
                )
            }
            FilterType::HighShelf2 => {
                if zero_coefs {
                    return Self::second_gain(1.0);
                }
                let beta = sqrtf(amp) / sqrtf(stage_q);
                let tmp = (amp + 1.0) - (amp - 1.0) * cs + beta * sn;
                Self::second(
                    [
                        amp * ((amp + 1.0) + (amp - 1.0) * cs + beta * sn) / tmp,
                        -2.0 * amp * ((amp - 1.0) + (amp + 1.0) * cs) / tmp,
                        amp * ((amp + 1.0) + (amp - 1.0) * cs - beta * sn) / tmp,
                    ],
                    -2.0 * ((amp - 1.0) - (amp + 1.0) * cs) / tmp,
                    -((amp + 1.0) - (amp - 1.0) * cs - beta * sn) / tmp,
                )
            }
        }
    }

    /// Squared magnitude of one section at normalized angular frequency `w`.
    fn power_at(&self, w: f32) -> f32 {
        let mut x = self.c[0];
        let mut y = 0.0;
        for n in 1..3 {
            let nf = n as f32;
            x += cosf(nf * w) * self.c[n];
            y -= sinf(nf * w) * self.c[n];
        }
        let num = x * x + y * y;

        let mut x = 1.0;
        let mut y = 0.0;
        for n in 1..3 {
            let nf = n as f32;
            x -= cosf(nf * w) * self.d[n];
            y += sinf(nf * w) * self.d[n];
        }
        num / (x * x + y * y)
    }
}

/// Delay taps of one section.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct StageHistory {
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl StageHistory {
    const ZERO: StageHistory = StageHistory {
        x1: 0.0,
        x2: 0.0,
        y1: 0.0,
        y2: 0.0,
    };

    #[inline]
    fn tick(&mut self, x: f32, coeff: &Coefficients) -> f32 {
        match coeff.order {
            FilterOrder::First => {
                let y = x * coeff.c[0] + self.x1 * coeff.c[1] + self.y1 * coeff.d[1];
                self.y1 = y;
                self.x1 = x;
                y
            }
            FilterOrder::Second => {
                let y = x * coeff.c[0]
                    + self.x1 * coeff.c[1]
                    + self.x2 * coeff.c[2]
                    + self.y1 * coeff.d[1]
                    + self.y2 * coeff.d[2];
                self.y2 = self.y1;
                self.y1 = y;
                self.x2 = self.x1;
                self.x1 = x;
                y
            }
        }
    }
}

type Histories = [StageHistory; MAX_FILTER_STAGES + 1];

/// Run one sample through every active section.
#[inline]
fn cascade(histories: &mut [StageHistory], coeff: &Coefficients, input: f32) -> f32 {
    histories
        .iter_mut()
        .fold(input, |sample, stage| stage.tick(sample, coeff))
}

/// Multi-stage analog-style filter with click-free frequency changes.
///
/// ## Parameters
/// - `filter_type`: one of [`FilterType`] (default `LowPass1`)
/// - `frequency`: cutoff/center in Hz, clamped to `0.1..=sr/2 - 500`
/// - `q`: resonance, clamped to `>= 0`
/// - `gain`: shelf/peak gain in dB (default 0)
/// - `stages`: extra cascaded sections, `0..=MAX_FILTER_STAGES`
///
/// # Example
///
/// ```rust
/// use cadenza_core::{AnalogFilter, FilterType};
///
/// let mut filter = AnalogFilter::new(FilterType::LowPass2, 1000.0, 0.707, 1, 44100.0);
/// let mut block = [0.5f32; 256];
/// filter.process(&mut block);
///
/// // A jump by more than 3x is cross-faded over the next block
/// filter.set_frequency(8000.0);
/// filter.process(&mut block);
/// ```
#[derive(Debug, Clone)]
pub struct AnalogFilter {
    filter_type: FilterType,
    freq: f32,
    q: f32,
    /// Linear shelf/peak gain
    gain: f32,
    stages: usize,
    sample_rate: f32,
    out_gain: f32,

    coeff: Coefficients,
    old_coeff: Coefficients,
    history: Histories,
    old_history: Histories,

    needs_interpolation: bool,
    /// The first frequency set after construction never cross-fades.
    first_time: bool,
    above_nyquist: bool,
}

impl AnalogFilter {
    /// Create a filter. `stages` is clamped to [`MAX_FILTER_STAGES`].
    pub fn new(filter_type: FilterType, freq: f32, q: f32, stages: usize, sample_rate: f32) -> Self {
        let mut filter = Self {
            filter_type,
            freq,
            q,
            gain: 1.0,
            stages: stages.min(MAX_FILTER_STAGES),
            sample_rate,
            out_gain: 1.0,
            coeff: Coefficients::PASSTHROUGH,
            old_coeff: Coefficients::PASSTHROUGH,
            history: [StageHistory::ZERO; MAX_FILTER_STAGES + 1],
            old_history: [StageHistory::ZERO; MAX_FILTER_STAGES + 1],
            needs_interpolation: false,
            first_time: false,
            above_nyquist: false,
        };
        filter.set_frequency_and_q(freq, q);
        filter.first_time = true;
        filter
    }

    /// Clear all section histories and cancel any pending cross-fade.
    pub fn cleanup(&mut self) {
        self.history = [StageHistory::ZERO; MAX_FILTER_STAGES + 1];
        self.old_history = self.history;
        self.needs_interpolation = false;
    }

    fn nyquist_limit(&self) -> f32 {
        self.sample_rate / 2.0 - NYQUIST_MARGIN
    }

    fn recompute(&mut self) {
        self.q = self.q.max(0.0);
        self.coeff = Coefficients::compute(
            self.filter_type,
            self.freq,
            self.q,
            self.gain,
            self.stages,
            self.sample_rate,
        );
    }

    /// Set the cutoff/center frequency in Hz.
    ///
    /// A change by more than a factor of 3, or one that crosses the
    /// Nyquist-adjacency threshold, keeps the previous coefficients and
    /// histories so the next [`process`](Self::process) call cross-fades.
    pub fn set_frequency(&mut self, frequency: f32) {
        let frequency = frequency.max(MIN_FREQUENCY);
        let mut ratio = self.freq / frequency;
        if ratio < 1.0 {
            ratio = 1.0 / ratio;
        }

        let was_above = self.above_nyquist;
        self.above_nyquist = frequency > self.nyquist_limit();
        let crossed_nyquist = was_above != self.above_nyquist;

        if ratio > INTERPOLATION_RATIO || crossed_nyquist {
            self.old_coeff = self.coeff;
            self.old_history = self.history;
            if !self.first_time {
                self.needs_interpolation = true;
            }
        }
        self.freq = frequency;
        self.recompute();
        self.first_time = false;
    }

    /// Set frequency and resonance together.
    pub fn set_frequency_and_q(&mut self, frequency: f32, q: f32) {
        self.q = q;
        self.set_frequency(frequency);
    }

    /// Set resonance (Q). Negative values are clamped to zero.
    pub fn set_resonance(&mut self, q: f32) {
        self.q = q;
        self.recompute();
    }

    /// Change the response type.
    pub fn set_type(&mut self, filter_type: FilterType) {
        self.filter_type = filter_type;
        self.recompute();
    }

    /// Set the shelf/peak gain in dB.
    pub fn set_gain_db(&mut self, gain_db: f32) {
        self.gain = db_to_linear(gain_db);
        self.recompute();
    }

    /// Set the number of extra cascaded sections. Clears the histories.
    pub fn set_stages(&mut self, stages: usize) {
        self.stages = stages.min(MAX_FILTER_STAGES);
        self.cleanup();
        self.recompute();
    }

    /// Set the linear gain applied after all sections.
    pub fn set_output_gain(&mut self, gain: f32) {
        self.out_gain = gain;
    }

    /// Current response type.
    pub fn filter_type(&self) -> FilterType {
        self.filter_type
    }

    /// Current frequency in Hz (as set, before clamping to Nyquist).
    pub fn frequency(&self) -> f32 {
        self.freq
    }

    /// Current resonance.
    pub fn resonance(&self) -> f32 {
        self.q
    }

    /// Current extra section count.
    pub fn stages(&self) -> usize {
        self.stages
    }

    /// Current per-section coefficients.
    pub fn coefficients(&self) -> &Coefficients {
        &self.coeff
    }

    /// True when the next block will be cross-faded.
    pub fn is_interpolating(&self) -> bool {
        self.needs_interpolation
    }

    /// Filter a block in place.
    pub fn process(&mut self, block: &mut [f32]) {
        let active = self.stages + 1;
        let out_gain = self.out_gain;

        if self.needs_interpolation {
            let len = block.len() as f32;
            for (i, sample) in block.iter_mut().enumerate() {
                let input = *sample;
                let new = cascade(&mut self.history[..active], &self.coeff, input);
                let old = cascade(&mut self.old_history[..active], &self.old_coeff, input);
                let weight = i as f32 / len;
                *sample = (old * (1.0 - weight) + new * weight) * out_gain;
            }
            self.needs_interpolation = false;
        } else {
            for sample in block.iter_mut() {
                *sample = cascade(&mut self.history[..active], &self.coeff, *sample) * out_gain;
            }
        }
    }

    /// Magnitude response of the whole cascade at `frequency` Hz, including
    /// the output gain.
    pub fn frequency_response(&self, frequency: f32) -> f32 {
        let w = 2.0 * PI * frequency / self.sample_rate;
        let power = self.coeff.power_at(w);
        powf(power, (self.stages as f32 + 1.0) / 2.0) * self.out_gain
    }
}
