use log::warn;
use thiserror::Error;

mod decode;
mod density;
mod normalize;
mod singular;
mod track;
mod window;

pub use decode::*;
pub use density::*;
pub use normalize::*;
pub use singular::*;
pub use track::*;
pub use window::*;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    #[error("negative time delta {delta} between events at {from} and {to}")]
    NegativeDelta { delta: f64, from: f64, to: f64 },

    #[error("density distribution is empty, the corpus has no window with a sounding note")]
    EmptyDensityDistribution,

    #[error("window size ({window_size_bars}) and hop length ({hop_length_bars}) must both be non-zero")]
    InvalidWindow {
        window_size_bars: usize,
        hop_length_bars: usize,
    },

    #[error("density bin count must be non-zero")]
    InvalidBinCount,

    #[error("unexpected token '{token}'")]
    UnexpectedToken { token: String },

    #[error("malformed token '{token}'")]
    MalformedToken { token: String },

    #[error("bar fill picked track {track} which has no bars in window {start}..{end}")]
    EmptyFillWindow {
        track: usize,
        start: usize,
        end: usize,
    },
}

impl CodecError {
    /// Configuration errors abort a whole batch. Everything else only concerns the song
    /// or sequence that produced it.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CodecError::EmptyDensityDistribution
                | CodecError::InvalidWindow { .. }
                | CodecError::InvalidBinCount
        )
    }
}

/// Receives per-item failures that batch operations skip over.
pub trait Diagnostics {
    fn song_skipped(&self, song: &str, error: &CodecError);
}

/// Forwards diagnostics to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogDiagnostics;

impl Diagnostics for LogDiagnostics {
    fn song_skipped(&self, song: &str, error: &CodecError) {
        warn!("Skipping song '{}': {}..!", song, error);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::model::song::{Bar, Event, Song, Track};
    use std::cell::RefCell;

    use super::{CodecError, Diagnostics};

    /// Collects skipped songs instead of logging them.
    #[derive(Default)]
    pub struct RecordingDiagnostics {
        pub skipped: RefCell<Vec<String>>,
    }

    impl Diagnostics for RecordingDiagnostics {
        fn song_skipped(&self, song: &str, error: &CodecError) {
            self.skipped.borrow_mut().push(format!("{}: {}", song, error));
        }
    }

    /// A bar with one quarter note (4 sixteenths) per pitch, played back to back.
    pub fn quarter_bar(pitches: &[i32]) -> Bar {
        let mut events = Vec::new();
        for &pitch in pitches {
            events.push(Event::NoteOn { pitch });
            events.push(Event::TimeDelta { delta: 4.0 });
            events.push(Event::NoteOff { pitch });
        }
        Bar::new(events)
    }

    pub fn track(index: usize, is_drum: bool, bars: Vec<Bar>) -> Track {
        Track {
            name: None,
            index,
            is_drum,
            bars,
        }
    }

    pub fn song(title: &str, tracks: Vec<Track>) -> Song {
        Song {
            title: Some(title.to_string()),
            identifier: None,
            tracks,
        }
    }
}
