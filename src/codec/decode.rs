use super::CodecError;
use crate::model::token::{Instrument, Token};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Decoding assumes a fixed 120 BPM in 4/4.
pub const DECODE_QPM: f64 = 120.0;
/// One delta unit: a sixteenth note at 120 BPM.
pub const SIXTEENTH_SECONDS: f64 = 0.25 * 60.0 / DECODE_QPM;
/// One 4/4 bar at 120 BPM.
pub const BAR_SECONDS: f64 = 4.0 * 60.0 / DECODE_QPM;
pub const DEFAULT_VELOCITY: u8 = 80;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DecodedNote {
    pub pitch: i32,
    pub start_time: f64,
    pub end_time: f64,
    pub velocity: u8,
    pub program: u32,
    pub is_drum: bool,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct NoteSequence {
    pub qpm: f64,
    pub notes: Vec<DecodedNote>,
}

impl Default for NoteSequence {
    fn default() -> Self {
        Self {
            qpm: DECODE_QPM,
            notes: Vec::new(),
        }
    }
}

impl NoteSequence {
    pub fn total_time(&self) -> f64 {
        self.notes.iter().map(|n| n.end_time).fold(0.0, f64::max)
    }
}

#[derive(Debug, Default)]
struct DecodeState {
    program: u32,
    is_drum: bool,
    bar_index: usize,
    time: f64,
    /// Pitch -> index into the output notes of the note a NOTE_OFF would close.
    open: HashMap<i32, usize>,
}

/// Rebuilds timed notes from a token stream in a single pass.
///
/// `BAR_START` forgets every open note, so a note held across a barline keeps its default
/// length. Stops at `PIECE_END`; anything after it is ignored.
pub fn decode<S: AsRef<str>>(tokens: &[S]) -> Result<NoteSequence, CodecError> {
    let mut sequence = NoteSequence::default();
    let mut state = DecodeState::default();

    for (position, raw) in tokens.iter().enumerate() {
        let token: Token = raw.as_ref().parse().inspect_err(|e| {
            debug!("Decoding failed at token #{}: {}", position, e);
        })?;

        match token {
            Token::PieceStart => state = DecodeState::default(),
            Token::PieceEnd => break,
            Token::TrackStart => state.bar_index = 0,
            Token::TrackEnd => {}
            Token::Inst(Instrument::Drums) => {
                state.program = 0;
                state.is_drum = true;
            }
            Token::Inst(Instrument::Program(program)) => {
                state.program = program;
                state.is_drum = false;
            }
            Token::BarStart => {
                state.time = state.bar_index as f64 * BAR_SECONDS;
                state.open.clear();
            }
            Token::BarEnd => state.bar_index += 1,
            Token::NoteOn(pitch) => {
                sequence.notes.push(DecodedNote {
                    pitch,
                    start_time: state.time,
                    end_time: state.time + SIXTEENTH_SECONDS,
                    velocity: DEFAULT_VELOCITY,
                    program: state.program,
                    is_drum: state.is_drum,
                });
                state.open.insert(pitch, sequence.notes.len() - 1);
            }
            Token::NoteOff(pitch) => {
                if let Some(&index) = state.open.get(&pitch) {
                    sequence.notes[index].end_time = state.time;
                }
            }
            Token::TimeDelta(delta) => state.time += delta * SIXTEENTH_SECONDS,
            Token::Density(_)
            | Token::FillPlaceholder
            | Token::FillStart
            | Token::FillEnd
            | Token::Special(_) => {}
        }
    }

    Ok(sequence)
}

/// Decodes one whitespace-separated token line.
pub fn decode_str(line: &str) -> Result<NoteSequence, CodecError> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    decode(&tokens)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::fixtures::{quarter_bar, song, track};
    use crate::codec::{DensityBins, EncodeOptions, encode_single, encode_song};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn arpeggio_round_trip() {
        let s = song("arpeggio", vec![track(0, false, vec![quarter_bar(&[60, 64, 67, 72])])]);

        let decoded = decode(&encode_single(Some(&s), 0).to_strings()).unwrap();
        let pitches: Vec<i32> = decoded.notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 64, 67, 72]);

        assert!(decoded.notes.windows(2).all(|w| w[0].start_time <= w[1].start_time));
        for (i, note) in decoded.notes.iter().enumerate() {
            assert!(approx_eq(note.start_time, i as f64 * 0.5));
            assert!(approx_eq(note.end_time, (i + 1) as f64 * 0.5));
        }
        assert!(approx_eq(decoded.total_time(), 2.0));
    }

    #[test]
    fn windowed_encoding_decodes() {
        let s = song(
            "band",
            vec![
                track(0, false, vec![quarter_bar(&[60, 62]); 3]),
                track(1, true, vec![quarter_bar(&[36]); 3]),
            ],
        );
        let options = EncodeOptions {
            transpositions: vec![-1],
            ..Default::default()
        };
        let seqs = encode_song(&s, &options, &DensityBins(vec![2.0]), &mut StdRng::seed_from_u64(0)).unwrap();

        let decoded = decode(&seqs[0].to_strings()).unwrap();
        assert_eq!(decoded.notes.len(), 6);

        let drums: Vec<&DecodedNote> = decoded.notes.iter().filter(|n| n.is_drum).collect();
        assert_eq!(drums.len(), 2);
        assert!(drums.iter().all(|n| n.pitch == 36 && n.program == 0));
        assert!(approx_eq(drums[1].start_time, BAR_SECONDS));

        let melody: Vec<i32> = decoded.notes.iter().filter(|n| !n.is_drum).map(|n| n.pitch).collect();
        assert_eq!(melody, vec![59, 61, 59, 61]);
    }

    #[test]
    fn dangling_note_off_is_ignored() {
        let decoded = decode_str(
            "PIECE_START TRACK_START INST=0 BAR_START NOTE_OFF=64 NOTE_ON=60 TIME_DELTA=2 NOTE_OFF=60 BAR_END",
        )
        .unwrap();

        assert_eq!(decoded.notes.len(), 1);
        assert_eq!(decoded.notes[0].pitch, 60);
        assert!(approx_eq(decoded.notes[0].end_time, 2.0 * SIXTEENTH_SECONDS));
    }

    #[test]
    fn unknown_token_is_an_error() {
        let err = decode_str("PIECE_START TRACK_START GARBAGE_TOKEN").unwrap_err();
        assert_eq!(
            err,
            CodecError::UnexpectedToken {
                token: "GARBAGE_TOKEN".into()
            }
        );
    }

    #[test]
    fn note_without_off_keeps_default_length() {
        let decoded = decode_str("TRACK_START INST=4 BAR_START NOTE_ON=70 TIME_DELTA=8 BAR_END").unwrap();
        assert!(approx_eq(decoded.notes[0].end_time, SIXTEENTH_SECONDS));
        assert_eq!(decoded.notes[0].program, 4);
        assert_eq!(decoded.notes[0].velocity, DEFAULT_VELOCITY);
    }

    #[test]
    fn bar_start_forgets_open_notes() {
        let decoded = decode_str(
            "TRACK_START INST=1 BAR_START NOTE_ON=60 TIME_DELTA=16 BAR_END BAR_START TIME_DELTA=4 NOTE_OFF=60 BAR_END",
        )
        .unwrap();

        assert_eq!(decoded.notes.len(), 1);
        assert!(approx_eq(decoded.notes[0].end_time, SIXTEENTH_SECONDS));
    }

    #[test]
    fn repeated_note_on_supersedes() {
        let decoded = decode_str(
            "BAR_START NOTE_ON=60 TIME_DELTA=1 NOTE_ON=60 TIME_DELTA=3 NOTE_OFF=60 BAR_END",
        )
        .unwrap();

        assert_eq!(decoded.notes.len(), 2);
        assert!(approx_eq(decoded.notes[0].end_time, SIXTEENTH_SECONDS));
        assert!(approx_eq(decoded.notes[1].start_time, SIXTEENTH_SECONDS));
        assert!(approx_eq(decoded.notes[1].end_time, 4.0 * SIXTEENTH_SECONDS));
    }

    #[test]
    fn fractional_delta_and_piece_end() {
        let decoded = decode_str(
            "PIECE_START TRACK_START INST=DRUMS DENSITY=2 BAR_START TIME_DELTA=4/3 NOTE_ON=42 \
             BAR_END TRACK_END PIECE_END GARBAGE_TOKEN",
        )
        .unwrap();

        assert_eq!(decoded.notes.len(), 1);
        assert!(decoded.notes[0].is_drum);
        assert!(approx_eq(decoded.notes[0].start_time, 4.0 / 3.0 * SIXTEENTH_SECONDS));
    }

    #[test]
    fn bar_index_resets_per_track() {
        let decoded = decode_str(
            "TRACK_START INST=0 BAR_START BAR_END BAR_START NOTE_ON=60 BAR_END TRACK_END \
             TRACK_START INST=7 BAR_START NOTE_ON=67 BAR_END TRACK_END",
        )
        .unwrap();

        assert!(approx_eq(decoded.notes[0].start_time, BAR_SECONDS));
        assert!(approx_eq(decoded.notes[1].start_time, 0.0));
        assert!(!decoded.notes[1].is_drum);
    }

    #[test]
    fn markers_are_no_ops() {
        let decoded = decode_str("[PAD] FILL_START DENSITY=4 [UNK] FILL_PLACEHOLDER FILL_END").unwrap();
        assert!(decoded.notes.is_empty());
    }
}
