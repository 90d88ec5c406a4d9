//! Full-integer post-training quantization.
//!
//! `calibrate` observes tensor ranges, `convert` turns the float model into
//! a [`QuantizedModel`], `format` owns its byte layout and `interp` runs it
//! with integer arithmetic only.

pub mod calibrate;
pub mod convert;
pub mod fixed;
pub mod format;
pub mod interp;
pub mod params;

pub use calibrate::{calibrate, Calibration, CalibrationSet, InputDomain, RangeTracker};
pub use convert::{quantize, tanh_lut};
pub use fixed::{dot_i8, QuantizedMultiplier};
pub use format::{QuantizedLayer, QuantizedModel, LUT_SIZE, MAGIC};
pub use params::{QuantParams, QMAX, QMIN};
