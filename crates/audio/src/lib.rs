//! Audio plumbing for the Talkie pipeline
//!
//! - [`ChunkQueue`]: WebSocket-fed capture buffer handing fixed-size chunks
//!   to the pipeline worker
//! - [`chunk_rms_level`]: normalized RMS of an int16 LE chunk
//! - [`resample_int16`]: linear resampler for int16 mono PCM
//! - [`AutoSensitivityController`]: raises capture gain when speech is too
//!   quiet to transcribe

pub mod capture;
pub mod level;
pub mod resample;
pub mod sensitivity;

pub use capture::{ChunkQueue, TARGET_SAMPLE_RATE};
pub use level::chunk_rms_level;
pub use resample::resample_int16;
pub use sensitivity::{AutoSensitivityConfig, AutoSensitivityController};
