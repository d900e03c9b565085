use crate::codec::{TimedNote, normalize};
use crate::model::song::*;
use anyhow::{Result, anyhow, bail};
use log::{debug, warn};
use midly::{Format, MetaMessage, MidiMessage, Smf, Timing, TrackEventKind};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

const QUARTERS_PER_BAR: u64 = 4;
const SIXTEENTHS_PER_QUARTER: u64 = 4;
const DRUM_CHANNEL: u8 = 9;

/// Onsets are snapped to twelfths of a sixteenth, which keeps triplets exact.
const GRID_PER_SIXTEENTH: u64 = 12;

struct NoteInterval {
    pub midi: u8,
    pub start_tick: u64,
    pub end_tick: u64,
}

/// Notes of one (MIDI track, channel) pair; each becomes a [`Track`].
#[derive(Default)]
struct Voice {
    name: Option<String>,
    intervals: Vec<NoteInterval>,
}

pub fn import_midi_file<P: AsRef<Path>>(path: P) -> Result<Song> {
    let bytes = fs::read(path.as_ref()).map_err(|e| {
        anyhow!(
            "Failed to read MIDI file {}: {}",
            path.as_ref().display(),
            e
        )
    })?;

    let title = path
        .as_ref()
        .file_name()
        .and_then(|s| s.to_str())
        .map(|s| s.to_string());

    midi_bytes_to_song(&bytes, title)
}

/// Parses a standard MIDI file into 4/4 bars of normalized events.
///
/// Rejects SMPTE timing, format 2 files, any meter other than 4/4, and files without notes.
pub fn midi_bytes_to_song(bytes: &[u8], title: Option<String>) -> Result<Song> {
    let smf = Smf::parse(bytes).map_err(|e| anyhow!("Failed to parse MIDI: {:?}", e))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(t) => t.as_int() as u64,
        Timing::Timecode(_fps, _subframe) => {
            bail!("SMPTE timecode midi timing is not currently supported..!");
        }
    };

    if ticks_per_quarter == 0 {
        bail!("MIDI header declares zero ticks per quarter note..!");
    }

    if let Format::Sequential = smf.header.format {
        bail!("Sequential (format 2) MIDI files are not supported..!");
    }

    debug!("Ticks per quarter note: {}", ticks_per_quarter);
    debug!(
        "MIDI format: {:?}, tracks: {}",
        smf.header.format,
        smf.tracks.len()
    );

    let mut meters: BTreeSet<(u8, u8)> = BTreeSet::new();
    let mut tempo_changes = 0usize;
    let mut voices: BTreeMap<(usize, u8), Voice> = BTreeMap::new();

    for (track_idx, track) in smf.tracks.iter().enumerate() {
        let mut abs_tick: u64 = 0;
        let mut track_name: Option<String> = None;
        let mut open_notes: BTreeMap<(u8, u8), Vec<u64>> = BTreeMap::new();

        for event in track.iter() {
            abs_tick = abs_tick.saturating_add(event.delta.as_int() as u64);

            match &event.kind {
                TrackEventKind::Meta(meta) => match meta {
                    MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => {
                        meters.insert((*numerator, *denominator_pow));
                    }
                    MetaMessage::Tempo(micro) => {
                        tempo_changes += 1;
                        debug!(
                            "Tempo change at tick {} -> {} us/qn (track {})",
                            abs_tick,
                            micro.as_int(),
                            track_idx
                        );
                    }
                    MetaMessage::TrackName(bytes) => {
                        if track_name.is_none() {
                            let name = String::from_utf8_lossy(bytes).trim().to_string();
                            debug!("Track name: {}", name);
                            track_name = Some(name).filter(|n| !n.is_empty());
                        }
                    }
                    _ => {}
                },
                TrackEventKind::Midi { channel, message } => {
                    let ch: u8 = channel.as_int();

                    match message {
                        MidiMessage::NoteOn { key, vel } => {
                            if vel.as_int() == 0 {
                                close_note(&mut open_notes, &mut voices, track_idx, ch, key.as_int(), abs_tick);
                            } else {
                                open_notes
                                    .entry((ch, key.as_int()))
                                    .or_default()
                                    .push(abs_tick);
                            }
                        }
                        MidiMessage::NoteOff { key, vel: _ } => {
                            close_note(&mut open_notes, &mut voices, track_idx, ch, key.as_int(), abs_tick);
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        for ((ch, key), stack) in open_notes.into_iter() {
            for start_tick in stack {
                let end_tick = if abs_tick > start_tick {
                    abs_tick
                } else {
                    start_tick + ticks_per_quarter
                };

                warn!(
                    "Unclosed NoteOn for {}, channel: {} at tick: {} auto-closing at: {}..!",
                    key, ch, start_tick, end_tick
                );

                voices.entry((track_idx, ch)).or_default().intervals.push(NoteInterval {
                    midi: key,
                    start_tick,
                    end_tick,
                });
            }
        }

        for ((idx, _), voice) in voices.iter_mut() {
            if *idx == track_idx && voice.name.is_none() {
                voice.name = track_name.clone();
            }
        }
    }

    // a file without any time signature is 4/4 by definition
    if meters.iter().any(|&meter| meter != (4, 2)) {
        let listed: Vec<String> = meters
            .iter()
            .map(|&(num, pow)| match 1u64.checked_shl(pow as u32) {
                Some(den) => format!("{}/{}", num, den),
                None => format!("{}/2^{}", num, pow),
            })
            .collect();
        bail!("Unsupported meter(s) [{}], only 4/4 is supported..!", listed.join(", "));
    }

    if tempo_changes > 1 {
        warn!(
            "MIDI contains {} tempo changes, bars are cut as if the tempo were fixed..!",
            tempo_changes
        );
    }

    voices.retain(|_, voice| !voice.intervals.is_empty());
    if voices.is_empty() {
        bail!("MIDI file contains no notes..!");
    }

    let bar_ticks = QUARTERS_PER_BAR * ticks_per_quarter;
    let last_tick = voices
        .values()
        .flat_map(|voice| voice.intervals.iter().map(|i| i.end_tick))
        .max()
        .unwrap_or(0);
    let bar_count = last_tick.div_ceil(bar_ticks).max(1) as usize;

    let mut tracks = Vec::with_capacity(voices.len());
    for (index, ((_, ch), voice)) in voices.into_iter().enumerate() {
        let bars = voice_to_bars(&voice.intervals, bar_count, bar_ticks, ticks_per_quarter)?;

        tracks.push(Track {
            name: voice.name,
            index,
            is_drum: ch == DRUM_CHANNEL,
            bars,
        });
    }

    Ok(Song {
        title,
        identifier: None,
        tracks,
    })
}

fn voice_to_bars(
    intervals: &[NoteInterval],
    bar_count: usize,
    bar_ticks: u64,
    ticks_per_quarter: u64,
) -> Result<Vec<Bar>> {
    let to_units = |ticks: u64| -> f64 {
        let grid = (ticks * SIXTEENTHS_PER_QUARTER * GRID_PER_SIXTEENTH) as f64 / ticks_per_quarter as f64;
        grid.round() / GRID_PER_SIXTEENTH as f64
    };

    let mut per_bar: Vec<Vec<TimedNote>> = vec![Vec::new(); bar_count];

    for interval in intervals.iter() {
        if interval.end_tick <= interval.start_tick {
            debug!(
                "Skipping zero/negative duration midi note {}, start: {} end: {}..!",
                interval.midi, interval.start_tick, interval.end_tick
            );
            continue;
        }

        // a note crossing a barline is re-struck in every bar it touches
        let first_bar = (interval.start_tick / bar_ticks) as usize;
        let last_bar = ((interval.end_tick - 1) / bar_ticks) as usize;

        for bar_idx in first_bar..=last_bar.min(bar_count - 1) {
            let bar_start = bar_idx as u64 * bar_ticks;
            let on = to_units(interval.start_tick.max(bar_start) - bar_start);
            let off = to_units(interval.end_tick.min(bar_start + bar_ticks) - bar_start);

            if off <= on {
                debug!(
                    "Note {} in bar {} vanished after quantization..!",
                    interval.midi, bar_idx
                );
                continue;
            }

            per_bar[bar_idx].push(TimedNote::on(interval.midi as i32, on));
            per_bar[bar_idx].push(TimedNote::off(interval.midi as i32, off));
        }
    }

    per_bar
        .into_iter()
        .enumerate()
        .map(|(bar_idx, notes)| {
            let events = normalize(&notes).map_err(|e| anyhow!("Bar {}: {}", bar_idx, e))?;
            Ok(Bar::new(events))
        })
        .collect()
}

fn close_note(
    open_notes: &mut BTreeMap<(u8, u8), Vec<u64>>,
    voices: &mut BTreeMap<(usize, u8), Voice>,
    track_idx: usize,
    ch: u8,
    midi_num: u8,
    abs_tick: u64,
) {
    if let Some(start_tick) = open_notes.get_mut(&(ch, midi_num)).and_then(|stack| stack.pop()) {
        voices.entry((track_idx, ch)).or_default().intervals.push(NoteInterval {
            midi: midi_num,
            start_tick,
            end_tick: abs_tick,
        });
    } else {
        debug!(
            "Orphaned NoteOff for {} ch{} at tick {}..!",
            midi_num, ch, abs_tick
        );
    }
}
