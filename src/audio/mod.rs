//! Audio capture and answer recording.

pub mod capture;
pub mod recorder;

pub use capture::{CpalMicrophone, MicProbe, MicrophoneSource, MockMicrophone, list_devices};
pub use recorder::{AudioArtifact, Clock, MockClock, Recorder, SystemClock};
