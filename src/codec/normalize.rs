use super::CodecError;
use crate::model::song::Event;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteKind {
    On,
    Off,
}

/// A note boundary at an absolute time (sixteenth-note units from the bar start).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedNote {
    pub kind: NoteKind,
    pub pitch: i32,
    pub time: f64,
}

impl TimedNote {
    pub fn on(pitch: i32, time: f64) -> Self {
        Self {
            kind: NoteKind::On,
            pitch,
            time,
        }
    }

    pub fn off(pitch: i32, time: f64) -> Self {
        Self {
            kind: NoteKind::Off,
            pitch,
            time,
        }
    }

    fn to_event(self) -> Event {
        match self.kind {
            NoteKind::On => Event::NoteOn { pitch: self.pitch },
            NoteKind::Off => Event::NoteOff { pitch: self.pitch },
        }
    }
}

/// Orders timed notes chronologically and materializes the gaps between them as
/// `TimeDelta` events. Zero gaps are omitted and the last note never gets a trailing delta.
pub fn normalize(notes: &[TimedNote]) -> Result<Vec<Event>, CodecError> {
    let mut sorted = notes.to_vec();
    // stable, so simultaneous events keep their input order
    sorted.sort_by(|a, b| a.time.total_cmp(&b.time));

    let mut events = Vec::with_capacity(sorted.len() * 2);

    if let Some(first) = sorted.first()
        && first.time != 0.0
    {
        if first.time < 0.0 || first.time.is_nan() {
            return Err(CodecError::NegativeDelta {
                delta: first.time,
                from: 0.0,
                to: first.time,
            });
        }
        events.push(Event::TimeDelta { delta: first.time });
    }

    for (i, note) in sorted.iter().enumerate() {
        events.push(note.to_event());

        let Some(next) = sorted.get(i + 1) else {
            continue;
        };

        let delta = next.time - note.time;
        if delta < 0.0 || delta.is_nan() {
            return Err(CodecError::NegativeDelta {
                delta,
                from: note.time,
                to: next.time,
            });
        }

        if delta != 0.0 {
            events.push(Event::TimeDelta { delta });
        }
    }

    Ok(events)
}

/// Inverse of [`normalize`]: recovers absolute times by summing deltas from zero.
pub fn denormalize(events: &[Event]) -> Vec<TimedNote> {
    let mut time = 0.0;
    let mut notes = Vec::new();

    for event in events {
        match *event {
            Event::TimeDelta { delta } => time += delta,
            Event::NoteOn { pitch } => notes.push(TimedNote::on(pitch, time)),
            Event::NoteOff { pitch } => notes.push(TimedNote::off(pitch, time)),
        }
    }

    notes
}
