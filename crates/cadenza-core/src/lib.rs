//! Cadenza Core - DSP building blocks for the synthesizer engine
//!
//! This crate provides the allocation-free signal processing pieces that the
//! voices and the mixer are assembled from.
//!
//! # Filters
//!
//! - [`AnalogFilter`] - Cascaded RBJ filter bank (9 types, up to
//!   `MAX_FILTER_STAGES + 1` sections) with click-free cross-faded frequency jumps
//! - [`FilterType`] - The closed set of filter responses
//!
//! # Effects
//!
//! - [`Effect`] - Stereo block effect contract driven by 7-bit parameters
//! - [`EffectRole`] - Insertion vs. system placement
//! - [`Echo`] - Stereo feedback echo with nine presets
//!
//! # Utilities
//!
//! - Level conversions: [`db_to_linear`], [`linear_to_db`]
//! - Control laws: [`send_gain`], [`volume_gain`], [`unit_control`]
//! - Block interpolation: [`above_amplitude_threshold`], [`interpolate_amplitude`]
//!
//! # no_std Support
//!
//! Disable the default `std` feature to build for embedded targets:
//!
//! ```toml
//! [dependencies]
//! cadenza-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Example
//!
//! ```rust
//! use cadenza_core::{AnalogFilter, FilterType};
//!
//! let mut filter = AnalogFilter::new(FilterType::HighShelf2, 4000.0, 0.7, 0, 48000.0);
//! filter.set_gain_db(6.0);
//!
//! let mut block = [0.0f32; 128];
//! filter.process(&mut block);
//! assert!((filter.frequency_response(0.0) - 1.0).abs() < 1e-3);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

pub mod analog_filter;
pub mod echo;
pub mod effect;
pub mod math;

pub use analog_filter::{AnalogFilter, Coefficients, FilterOrder, FilterType, MAX_FILTER_STAGES};
pub use echo::Echo;
pub use effect::{Effect, EffectRole};
pub use math::{
    above_amplitude_threshold, db_to_linear, flush_denormal, interpolate_amplitude, linear_to_db,
    send_gain, unit_control, volume_gain,
};
