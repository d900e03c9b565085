use crate::codec::{DecodedNote, NoteSequence};
use anyhow::{Result, anyhow};
use log::{debug, warn};
use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track, TrackEvent, TrackEventKind};
use std::collections::BTreeMap;
use std::path::Path;

/// Ticks per quarter note in MIDI output.
const TICKS_PER_QUARTER: u16 = 480;
const DRUM_CHANNEL: u8 = 9;

/// Convert a decoded note sequence to MIDI and write it to a file.
pub fn write_note_sequence<P: AsRef<Path>>(sequence: &NoteSequence, path: P) -> Result<()> {
    let smf = note_sequence_to_smf(sequence);
    let mut buf = Vec::new();
    smf.write(&mut buf)
        .map_err(|e| anyhow!("Failed to encode MIDI: {:?}", e))?;

    std::fs::write(path.as_ref(), &buf).map_err(|e| {
        anyhow!(
            "Failed to write MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })
}

/// Format 1 SMF: a tempo track, then one track per (program, drum) group.
pub fn note_sequence_to_smf(sequence: &NoteSequence) -> Smf<'static> {
    let mut smf = Smf::new(Header::new(
        Format::Parallel,
        Timing::Metrical(u15::new(TICKS_PER_QUARTER)),
    ));

    let mut tempo_track: Track<'static> = Vec::new();
    let tempo_microseconds = (60_000_000.0 / sequence.qpm).round() as u32;
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo_microseconds))),
    });
    tempo_track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
    smf.tracks.push(tempo_track);

    let mut groups: BTreeMap<(bool, u32), Vec<&DecodedNote>> = BTreeMap::new();
    for note in sequence.notes.iter() {
        if !(0..=127).contains(&note.pitch) {
            warn!("Dropping out-of-range MIDI pitch {} on export..!", note.pitch);
            continue;
        }
        groups.entry((note.is_drum, note.program)).or_default().push(note);
    }

    let ticks_per_second = sequence.qpm / 60.0 * TICKS_PER_QUARTER as f64;
    let to_tick = |seconds: f64| -> u32 { (seconds.max(0.0) * ticks_per_second).round() as u32 };

    let mut next_channel: u8 = 0;
    for ((is_drum, program), notes) in groups.into_iter() {
        let channel = if is_drum {
            DRUM_CHANNEL
        } else {
            let ch = next_channel;
            next_channel = (next_channel + 1) % 16;
            if next_channel == DRUM_CHANNEL {
                next_channel += 1;
            }
            ch
        };

        debug!(
            "Exporting {} notes for program {} (drums: {}) on channel {}",
            notes.len(),
            program,
            is_drum,
            channel
        );
        let channel = u4::new(channel);

        // (tick, is_on, key); offs sort before ons at the same tick
        let mut points: Vec<(u32, bool, u8)> = Vec::with_capacity(notes.len() * 2);
        for note in notes.iter() {
            let start = to_tick(note.start_time);
            let end = to_tick(note.end_time).max(start + 1);
            points.push((start, true, note.pitch as u8));
            points.push((end, false, note.pitch as u8));
        }
        points.sort();

        let mut track: Track<'static> = Vec::new();
        if !is_drum {
            track.push(TrackEvent {
                delta: u28::new(0),
                kind: TrackEventKind::Midi {
                    channel,
                    message: MidiMessage::ProgramChange {
                        program: u7::new((program % 128) as u8),
                    },
                },
            });
        }

        let mut last_tick = 0u32;
        for (tick, is_on, key) in points {
            let message = if is_on {
                MidiMessage::NoteOn {
                    key: u7::new(key),
                    vel: u7::new(crate::codec::DEFAULT_VELOCITY),
                }
            } else {
                MidiMessage::NoteOff {
                    key: u7::new(key),
                    vel: u7::new(0),
                }
            };

            track.push(TrackEvent {
                delta: u28::new(tick - last_tick),
                kind: TrackEventKind::Midi { channel, message },
            });
            last_tick = tick;
        }

        track.push(TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
        });
        smf.tracks.push(track);
    }

    smf
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::decode_str;

    #[test]
    fn decoded_tokens_to_smf() {
        let sequence = decode_str(
            "PIECE_START TRACK_START INST=0 DENSITY=1 BAR_START NOTE_ON=60 TIME_DELTA=4 NOTE_OFF=60 \
             NOTE_ON=200 BAR_END TRACK_END TRACK_START INST=DRUMS BAR_START NOTE_ON=36 BAR_END TRACK_END",
        )
        .unwrap();

        let smf = note_sequence_to_smf(&sequence);
        // tempo track + piano + drums, pitch 200 dropped
        assert_eq!(smf.tracks.len(), 3);

        let piano_notes = smf.tracks[1]
            .iter()
            .filter(|e| matches!(e.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. }))
            .count();
        assert_eq!(piano_notes, 1);

        let drum_channel = smf.tracks[2].iter().find_map(|e| match e.kind {
            TrackEventKind::Midi { channel, .. } => Some(channel.as_int()),
            _ => None,
        });
        assert_eq!(drum_channel, Some(DRUM_CHANNEL));
    }

    #[test]
    fn exported_file_reimports() {
        env_logger::try_init().unwrap_or(());

        let sequence = decode_str(
            "TRACK_START INST=2 BAR_START NOTE_ON=60 TIME_DELTA=4 NOTE_OFF=60 NOTE_ON=64 TIME_DELTA=4 \
             NOTE_OFF=64 BAR_END BAR_START NOTE_ON=67 TIME_DELTA=8 NOTE_OFF=67 BAR_END",
        )
        .unwrap();

        let dir = std::env::temp_dir().join("exported_file_reimports");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("decoded.mid");
        write_note_sequence(&sequence, &path).unwrap();

        let song = crate::import_midi_file(&path).unwrap();
        assert_eq!(song.tracks.len(), 1);
        assert_eq!(song.bar_count(), 2);
        assert_eq!(song.tracks[0].bars[0].note_on_count(), 2);
        assert_eq!(song.tracks[0].bars[1].note_on_count(), 1);
    }
}
