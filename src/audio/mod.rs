pub mod analyzer;
pub mod decoder;
pub mod player;
pub mod snapshot;
pub mod source;

pub use analyzer::{SpectrumAnalyzer, TapKind};
pub use decoder::AudioDecoder;
pub use player::{AudioPlayer, PlaybackHandle};
pub use snapshot::AudioSnapshot;
pub use source::{AudioSource, AudioTap, SharedSource, SourceId};
