use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Length of one 4/4 bar in the time-delta unit used for empty bars.
pub const EMPTY_BAR_DELTA: f64 = 4.0;

/// A single timed event inside a bar. Times are relative: `TimeDelta` advances the cursor
/// in sixteenth-note units, the note events happen at the current cursor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    NoteOn { pitch: i32 },
    NoteOff { pitch: i32 },
    TimeDelta { delta: f64 },
}

impl Event {
    pub fn is_note_on(&self) -> bool {
        matches!(self, Event::NoteOn { .. })
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Bar {
    pub events: Vec<Event>,

    /// Set on the copy produced by bar-fill masking; a masked bar has no events of its own.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub masked: bool,
}

impl Bar {
    pub fn new(events: Vec<Event>) -> Self {
        if events.is_empty() {
            return Self::empty();
        }

        Self {
            events,
            masked: false,
        }
    }

    /// A bar without musical content spans one full 4/4 bar of silence.
    pub fn empty() -> Self {
        Self {
            events: vec![Event::TimeDelta {
                delta: EMPTY_BAR_DELTA,
            }],
            masked: false,
        }
    }

    pub fn masked() -> Self {
        Self {
            events: Vec::new(),
            masked: true,
        }
    }

    pub fn note_on_count(&self) -> usize {
        if self.masked {
            return 0;
        }
        self.events.iter().filter(|e| e.is_note_on()).count()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Track {
    pub name: Option<String>,

    /// Position of the track in the source song. Never recomputed, even when the encoder
    /// visits tracks in a permuted order.
    pub index: usize,

    #[serde(rename = "drums", default)]
    pub is_drum: bool,

    pub bars: Vec<Bar>,
}

impl Track {
    /// Bars in `[start, end)`, clipped to however many bars this track actually has.
    pub fn bar_slice(&self, start: usize, end: usize) -> &[Bar] {
        let end = end.min(self.bars.len());
        let start = start.min(end);
        &self.bars[start..end]
    }

    pub fn note_on_count(&self, start: usize, end: usize) -> usize {
        self.bar_slice(start, end)
            .iter()
            .map(Bar::note_on_count)
            .sum()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct Song {
    pub title: Option<String>,

    #[serde(default, rename = "number")]
    pub identifier: Option<serde_json::Value>,

    pub tracks: Vec<Track>,
}

impl Song {
    /// The longest bar list across all tracks. Shorter tracks are silent past their own end.
    pub fn bar_count(&self) -> usize {
        self.tracks.iter().map(|t| t.bars.len()).max().unwrap_or(0)
    }

    /// Human-readable identity used in log messages.
    pub fn label(&self) -> String {
        match (&self.title, &self.identifier) {
            (Some(title), Some(id)) => format!("{} ({})", title, id),
            (Some(title), None) => title.clone(),
            (None, Some(id)) => format!("<untitled> ({})", id),
            (None, None) => "<untitled>".into(),
        }
    }
}

pub fn load_song_json<P: AsRef<Path>>(path: P) -> Result<Song> {
    let text = fs::read_to_string(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read song record {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    serde_json::from_str(&text).map_err(|e| {
        anyhow!(
            "Failed to parse song record {}: {}",
            path.as_ref().display(),
            e
        )
    })
}

pub fn save_song_json<P: AsRef<Path>>(song: &Song, path: P) -> Result<()> {
    let text = serde_json::to_string(song)?;
    fs::write(path.as_ref(), text).map_err(|e| {
        anyhow!(
            "Failed to write song record {}: {}",
            path.as_ref().display(),
            e
        )
    })
}
