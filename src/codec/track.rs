use super::DensityBins;
use crate::model::song::{Bar, Event, Track};
use crate::model::token::{Instrument, Token};

/// Renders the bars `[bar_start, bar_end)` of one track. Bars past the end of the track are
/// simply absent from the output.
///
/// Drum tracks ignore `transposition`; the override is local to this call.
pub fn encode_track(
    track: &Track,
    density_bins: &DensityBins,
    bar_start: usize,
    bar_end: usize,
    transposition: i32,
) -> Vec<Token> {
    let density = density_bins.digitize(track.note_on_count(bar_start, bar_end));
    encode_track_bars(track, density, track.bar_slice(bar_start, bar_end), transposition)
}

pub(crate) fn encode_track_bars(
    track: &Track,
    density: usize,
    bars: &[Bar],
    transposition: i32,
) -> Vec<Token> {
    let (instrument, transposition) = if track.is_drum {
        (Instrument::Drums, 0)
    } else {
        (Instrument::Program(track.index as u32), transposition)
    };

    let mut tokens = vec![
        Token::TrackStart,
        Token::Inst(instrument),
        Token::Density(density),
    ];

    for bar in bars {
        tokens.extend(encode_bar(bar, transposition));
    }

    tokens.push(Token::TrackEnd);
    tokens
}

pub fn encode_bar(bar: &Bar, transposition: i32) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(bar.events.len() + 2);
    tokens.push(Token::BarStart);

    if bar.masked {
        tokens.push(Token::FillPlaceholder);
    } else {
        tokens.extend(bar.events.iter().map(|e| encode_event(e, transposition)));
    }

    tokens.push(Token::BarEnd);
    tokens
}

pub fn encode_event(event: &Event, transposition: i32) -> Token {
    match *event {
        Event::NoteOn { pitch } => Token::note_on(pitch, transposition),
        Event::NoteOff { pitch } => Token::note_off(pitch, transposition),
        Event::TimeDelta { delta } => Token::TimeDelta(delta),
    }
}
