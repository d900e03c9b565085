use super::{CodecError, DensityBins, Diagnostics, encode_bar, encode_track};
use crate::model::song::{Bar, Song};
use crate::model::token::{Token, TokenSequence};
use log::debug;
use rand::Rng;
use rand::seq::SliceRandom;

/// Windowing and augmentation parameters for corpus encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeOptions {
    pub transpositions: Vec<i32>,
    pub permute: bool,
    pub window_size_bars: usize,
    pub hop_length_bars: usize,

    /// Legacy bar-infilling mode.
    pub bar_fill: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            transpositions: vec![0],
            permute: false,
            window_size_bars: 2,
            hop_length_bars: 2,
            bar_fill: false,
        }
    }
}

/// Window bounds `[start, end)`. Starts advance by the hop from 0, ends advance by the hop
/// from `window_size_bars`, and only end indices below `bar_count` are produced, so there is
/// never a ragged final window.
pub fn window_indices(
    bar_count: usize,
    window_size_bars: usize,
    hop_length_bars: usize,
) -> Result<Vec<(usize, usize)>, CodecError> {
    if window_size_bars == 0 || hop_length_bars == 0 {
        return Err(CodecError::InvalidWindow {
            window_size_bars,
            hop_length_bars,
        });
    }

    let starts = (0..bar_count).step_by(hop_length_bars);
    let ends = (window_size_bars..bar_count).step_by(hop_length_bars);
    Ok(starts.zip(ends).collect())
}

/// Encodes a whole corpus. Songs that fail structurally are reported to `diagnostics` and
/// skipped; configuration errors abort.
pub fn encode_corpus<R: Rng + ?Sized>(
    songs: &[Song],
    options: &EncodeOptions,
    density_bins: &DensityBins,
    rng: &mut R,
    diagnostics: &dyn Diagnostics,
) -> Result<Vec<TokenSequence>, CodecError> {
    let mut sequences = Vec::new();

    for song in songs {
        match encode_song(song, options, density_bins, rng) {
            Ok(encoded) => sequences.extend(encoded),
            Err(e) if e.is_configuration() => return Err(e),
            Err(e) => diagnostics.song_skipped(&song.label(), &e),
        }
    }

    Ok(sequences)
}

/// One sequence per (window, transposition) pair, windows in the outer loop.
pub fn encode_song<R: Rng + ?Sized>(
    song: &Song,
    options: &EncodeOptions,
    density_bins: &DensityBins,
    rng: &mut R,
) -> Result<Vec<TokenSequence>, CodecError> {
    let windows = window_indices(
        song.bar_count(),
        options.window_size_bars,
        options.hop_length_bars,
    )?;

    debug!(
        "Encoding '{}' with {} windows x {} transpositions..!",
        song.label(),
        windows.len(),
        options.transpositions.len()
    );

    let mut sequences = Vec::with_capacity(windows.len() * options.transpositions.len());
    for &(start, end) in windows.iter() {
        for &transposition in options.transpositions.iter() {
            let sequence = if options.bar_fill {
                let (track_position, bar_index) = pick_fill_bar(song, start, end, rng)?;
                let (masked, fill) = mask_bar(song, track_position, bar_index);
                let mut sequence =
                    encode_window(&masked, density_bins, start, end, transposition, options.permute, rng);

                sequence.push(Token::FillStart);
                // the fill follows the pass transposition even for drum tracks
                let bar_tokens = encode_bar(&fill, transposition);
                // drop the BAR_START/BAR_END bracket, the fill markers replace it
                sequence.extend(bar_tokens[1..bar_tokens.len() - 1].iter().cloned());
                sequence.push(Token::FillEnd);
                sequence
            } else {
                encode_window(song, density_bins, start, end, transposition, options.permute, rng)
            };

            sequences.push(sequence);
        }
    }

    Ok(sequences)
}

fn encode_window<R: Rng + ?Sized>(
    song: &Song,
    density_bins: &DensityBins,
    start: usize,
    end: usize,
    transposition: i32,
    permute: bool,
    rng: &mut R,
) -> TokenSequence {
    let mut sequence = TokenSequence::new();
    sequence.push(Token::PieceStart);

    let mut order: Vec<usize> = (0..song.tracks.len()).collect();
    if permute {
        order.shuffle(rng);
    }

    for position in order {
        sequence.extend(encode_track(
            &song.tracks[position],
            density_bins,
            start,
            end,
            transposition,
        ));
    }

    sequence
}

fn pick_fill_bar<R: Rng + ?Sized>(
    song: &Song,
    start: usize,
    end: usize,
    rng: &mut R,
) -> Result<(usize, usize), CodecError> {
    let track_position = rng.random_range(0..song.tracks.len());
    let available = song.tracks[track_position].bar_slice(start, end).len();

    if available == 0 {
        return Err(CodecError::EmptyFillWindow {
            track: track_position,
            start,
            end,
        });
    }

    Ok((track_position, start + rng.random_range(0..available)))
}

/// Returns a copy of `song` with one bar replaced by a masked bar, together with the
/// original bar. The input song is left untouched.
pub fn mask_bar(song: &Song, track_position: usize, bar_index: usize) -> (Song, Bar) {
    let mut masked = song.clone();
    let original = std::mem::replace(
        &mut masked.tracks[track_position].bars[bar_index],
        Bar::masked(),
    );
    (masked, original)
}
