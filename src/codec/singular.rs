use super::track::encode_track_bars;
use crate::model::song::Song;
use crate::model::token::{Token, TokenSequence};

/// Encodes a whole song for priming generation: every bar of every track in source order,
/// untransposed, with the same `density` on every track.
///
/// A missing song yields just `PIECE_START`.
pub fn encode_single(song: Option<&Song>, density: usize) -> TokenSequence {
    let mut sequence = TokenSequence::new();
    sequence.push(Token::PieceStart);

    let Some(song) = song else {
        return sequence;
    };

    for track in song.tracks.iter() {
        sequence.extend(encode_track_bars(track, density, &track.bars, 0));
    }

    sequence
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::fixtures::{quarter_bar, song, track};
    use crate::model::song::Bar;

    #[test]
    fn absent_song_is_just_piece_start() {
        assert_eq!(encode_single(None, 3).to_string(), "PIECE_START");
    }

    #[test]
    fn all_bars_in_order_with_fixed_density() {
        let s = song(
            "duet",
            vec![
                track(0, false, vec![quarter_bar(&[60]), Bar::empty(), quarter_bar(&[62])]),
                track(1, true, vec![quarter_bar(&[36])]),
            ],
        );

        let text = encode_single(Some(&s), 2).to_string();
        assert_eq!(
            text,
            "PIECE_START \
             TRACK_START INST=0 DENSITY=2 \
             BAR_START NOTE_ON=60 TIME_DELTA=4.0 NOTE_OFF=60 BAR_END \
             BAR_START TIME_DELTA=4.0 BAR_END \
             BAR_START NOTE_ON=62 TIME_DELTA=4.0 NOTE_OFF=62 BAR_END \
             TRACK_END \
             TRACK_START INST=DRUMS DENSITY=2 \
             BAR_START NOTE_ON=36 TIME_DELTA=4.0 NOTE_OFF=36 BAR_END \
             TRACK_END"
        );
    }
}
