//! Click-free legato transitions.
//!
//! A sounding voice cannot simply jump to a new pitch: the phase
//! discontinuity clicks. [`Legato`] instead fades the voice out over a short
//! window, keeps it running silently at a "catch-up" pitch for the same
//! duration so its phase re-synchronises, then retunes it to the real target.
//! Its silent twin fades in at the new pitch meanwhile (see
//! [`Part`](crate::Part)).
//!
//! ```text
//!            update (audible)              ramp hits 0
//!   Normal ─────────────────────▶ FadeOut ─────────────▶ CatchUp
//!     ▲  │                                                  │
//!     │  │ update (silent)                     window ends  │
//!     │  ▼                                                  ▼
//!     └─ FadeIn ◀── ramp hits 1            ReturnToNormal ──┘
//! ```
//!
//! Every [`apply`](Legato::apply) call processes exactly one block in place.

use crate::note::NoteParams;

/// Length of a fade in seconds.
const FADE_SECONDS: f32 = 0.005;

/// Transition state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LegatoState {
    /// No transition in progress
    #[default]
    Normal,
    /// Ramping 0 → 1 at the new pitch
    FadeIn,
    /// Ramping 1 → 0 at the old pitch
    FadeOut,
    /// Silent, running at the catch-up pitch
    CatchUp,
    /// Catch-up done; becomes `Normal` immediately
    ReturnToNormal,
}

/// What the voice should do after [`Legato::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LegatoUpdate {
    /// A fade-out started; keep the current pitch for now.
    Deferred,
    /// Retune to the new parameters right away.
    Apply,
}

/// Per-voice legato state machine.
#[derive(Debug, Clone)]
pub struct Legato {
    state: LegatoState,
    ramp: f32,
    step: f32,
    fade_len: usize,
    remaining: usize,
    pending: NoteParams,
    last_freq: f32,
    silent: bool,
}

impl Legato {
    /// Create a machine for a voice starting at `params`. A `silent` voice
    /// outputs nothing until its next update fades it in.
    pub fn new(params: NoteParams, sample_rate: f32, silent: bool) -> Self {
        let fade_len = ((sample_rate * FADE_SECONDS) as usize).max(1);
        Self {
            state: LegatoState::Normal,
            ramp: 1.0,
            step: 1.0 / fade_len as f32,
            fade_len,
            remaining: fade_len,
            pending: params,
            last_freq: params.freq,
            silent,
        }
    }

    /// Current state.
    pub fn state(&self) -> LegatoState {
        self.state
    }

    /// Current fade gain.
    pub fn ramp(&self) -> f32 {
        self.ramp
    }

    /// True while the voice is muted by a completed fade-out.
    pub fn is_silent(&self) -> bool {
        self.silent
    }

    /// Fade window in samples.
    pub fn fade_len(&self) -> usize {
        self.fade_len
    }

    /// Parameters of the latest update.
    pub fn pending(&self) -> NoteParams {
        self.pending
    }

    /// Register a new target.
    ///
    /// `external` abandons any transition in progress. During a catch-up
    /// an internal update is ignored so the pending target survives.
    pub fn update(&mut self, params: NoteParams, external: bool) -> LegatoUpdate {
        if external {
            self.state = LegatoState::Normal;
        }
        if self.state != LegatoState::CatchUp {
            self.last_freq = self.pending.freq;
            self.pending = params;
            match self.state {
                LegatoState::Normal if self.silent => {
                    self.ramp = 0.0;
                    self.remaining = self.fade_len;
                    self.state = LegatoState::FadeIn;
                }
                LegatoState::Normal => {
                    self.ramp = 1.0;
                    self.remaining = self.fade_len;
                    self.state = LegatoState::FadeOut;
                    return LegatoUpdate::Deferred;
                }
                LegatoState::ReturnToNormal => self.state = LegatoState::Normal,
                _ => {}
            }
        }
        LegatoUpdate::Apply
    }

    /// Process one rendered block in place.
    ///
    /// Returns the parameters the voice must retune to: the catch-up pitch
    /// when a fade-out completes, the real target when the catch-up ends.
    pub fn apply(&mut self, out_l: &mut [f32], out_r: &mut [f32]) -> Option<NoteParams> {
        let n = out_l.len().min(out_r.len());
        if self.silent && self.state != LegatoState::FadeIn {
            out_l[..n].fill(0.0);
            out_r[..n].fill(0.0);
        }

        match self.state {
            LegatoState::CatchUp => {
                for _ in 0..n {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        // ReturnToNormal resolves within the same tick
                        self.remaining = self.fade_len;
                        self.ramp = 1.0;
                        self.state = LegatoState::Normal;
                        return Some(self.pending);
                    }
                }
                None
            }
            LegatoState::FadeIn => {
                self.silent = false;
                for i in 0..n {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        self.remaining = self.fade_len;
                        self.ramp = 1.0;
                        self.state = LegatoState::Normal;
                        break;
                    }
                    self.ramp = (self.ramp + self.step).min(1.0);
                    out_l[i] *= self.ramp;
                    out_r[i] *= self.ramp;
                }
                None
            }
            LegatoState::FadeOut => {
                for i in 0..n {
                    self.remaining -= 1;
                    if self.remaining == 0 {
                        out_l[i..n].fill(0.0);
                        out_r[i..n].fill(0.0);
                        self.silent = true;
                        self.remaining = self.fade_len;
                        self.state = LegatoState::CatchUp;
                        return Some(self.catch_up_params());
                    }
                    self.ramp = (self.ramp - self.step).max(0.0);
                    out_l[i] *= self.ramp;
                    out_r[i] *= self.ramp;
                }
                None
            }
            LegatoState::Normal | LegatoState::ReturnToNormal => None,
        }
    }

    /// Pitch that lets the silent voice catch up with the one now heard over
    /// the same time it spent fading at the old pitch.
    fn catch_up_params(&self) -> NoteParams {
        let target = self.pending.freq;
        let freq = if self.last_freq > 0.0 {
            target * (target / self.last_freq)
        } else {
            target
        };
        NoteParams {
            freq,
            ..self.pending
        }
    }
}
