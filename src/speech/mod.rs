//! Text-to-speech: reading questions aloud.

pub mod announcer;
pub mod synth;

pub use announcer::Announcer;
pub use synth::{EspeakSynth, MockSynth, SpeechSynth, Voice, check_engine_available, select_voice};
