use crate::codec::{NoteSequence, decode_str};
use crate::model::token::{Token, TokenSequence};
use anyhow::{Result, anyhow, bail};
use log::debug;
use rand::Rng;
use std::fs::{self, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one sequence per line. `fresh` truncates the file first, otherwise lines are appended.
pub fn write_sequences<P: AsRef<Path>>(path: P, sequences: &[TokenSequence], fresh: bool) -> Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(!fresh)
        .truncate(fresh)
        .open(path.as_ref())
        .map_err(|e| anyhow!("Failed to open corpus {}: {}", path.as_ref().display(), e))?;

    let mut writer = BufWriter::new(file);
    for sequence in sequences.iter() {
        writeln!(writer, "{}", sequence)?;
    }
    writer.flush()?;

    debug!(
        "Wrote {} sequences to {}",
        sequences.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads every non-empty line of a corpus file.
pub fn read_sequences<P: AsRef<Path>>(path: P) -> Result<Vec<TokenSequence>> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| anyhow!("Failed to read corpus {}: {}", path.as_ref().display(), e))?;

    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            line.parse::<TokenSequence>()
                .map_err(|e| anyhow!("{}:{}: {}", path.as_ref().display(), i + 1, e))
        })
        .collect()
}

/// Decodes the `line`-th non-empty line of a token file, counted from zero.
///
/// The raw text goes straight to the decoder, so other lines are never parsed and anything
/// after `PIECE_END` is ignored.
pub fn decode_line<P: AsRef<Path>>(path: P, line: usize) -> Result<NoteSequence> {
    let text = fs::read_to_string(path.as_ref())
        .map_err(|e| anyhow!("Failed to read token file {}: {}", path.as_ref().display(), e))?;

    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let Some(raw) = lines.nth(line) else {
        bail!(
            "Token file {} has no sequence at line {}..!",
            path.as_ref().display(),
            line
        );
    };

    decode_str(raw).map_err(|e| anyhow!("{}: sequence {}: {}", path.as_ref().display(), line, e))
}

/// Picks a random corpus line and truncates it to prime generation.
///
/// Stops right after the `stop_on_track_end`-th `TRACK_END` (counted from zero) or after
/// `stop_after_n_tokens` tokens, whichever comes first.
pub fn priming_sequence<P: AsRef<Path>, R: Rng + ?Sized>(
    path: P,
    stop_on_track_end: Option<usize>,
    stop_after_n_tokens: Option<usize>,
    rng: &mut R,
) -> Result<TokenSequence> {
    let sequences = read_sequences(path.as_ref())?;
    if sequences.is_empty() {
        bail!("Corpus {} has no sequences..!", path.as_ref().display());
    }

    let picked = &sequences[rng.random_range(0..sequences.len())];
    Ok(truncate_priming(picked, stop_on_track_end, stop_after_n_tokens))
}

pub fn truncate_priming(
    sequence: &TokenSequence,
    stop_on_track_end: Option<usize>,
    stop_after_n_tokens: Option<usize>,
) -> TokenSequence {
    let mut result = TokenSequence::new();
    let mut track_ends = 0;

    for token in sequence.tokens() {
        result.push(token.clone());

        if *token == Token::TrackEnd {
            if stop_on_track_end == Some(track_ends) {
                break;
            }
            track_ends += 1;
        }

        if stop_after_n_tokens.is_some_and(|n| n != 0 && result.len() == n) {
            break;
        }
    }

    result
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn seq(line: &str) -> TokenSequence {
        line.parse().unwrap()
    }

    fn scratch(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(name);
        fs::create_dir_all(&dir).unwrap();
        dir.join("corpus.txt")
    }

    #[test]
    fn append_then_truncate() {
        let path = scratch("corpus_append_then_truncate");
        let a = seq("PIECE_START TRACK_START INST=0 DENSITY=1 TRACK_END");
        let b = seq("PIECE_START TRACK_START INST=DRUMS DENSITY=0 TRACK_END");

        write_sequences(&path, std::slice::from_ref(&a), true).unwrap();
        write_sequences(&path, std::slice::from_ref(&b), false).unwrap();
        assert_eq!(read_sequences(&path).unwrap(), vec![a.clone(), b.clone()]);

        write_sequences(&path, std::slice::from_ref(&b), true).unwrap();
        assert_eq!(read_sequences(&path).unwrap(), vec![b]);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "PIECE_START TRACK_START INST=DRUMS DENSITY=0 TRACK_END\n"
        );
    }

    #[test]
    fn bad_line_reports_position() {
        let path = scratch("corpus_bad_line_reports_position");
        fs::write(&path, "PIECE_START\n\nPIECE_START WHAT\n").unwrap();

        let err = read_sequences(&path).unwrap_err().to_string();
        assert!(err.contains(":3:"));
    }

    #[test]
    fn decode_line_reads_only_the_chosen_line() {
        let path = scratch("corpus_decode_line_reads_only_the_chosen_line");
        fs::write(
            &path,
            "PIECE_START WHAT\n\n\
             PIECE_START TRACK_START INST=0 BAR_START NOTE_ON=60 TIME_DELTA=4/3 NOTE_OFF=60 BAR_END \
             TRACK_END PIECE_END GARBAGE\n",
        )
        .unwrap();

        let decoded = decode_line(&path, 1).unwrap();
        assert_eq!(decoded.notes.len(), 1);
        assert!((decoded.notes[0].end_time - 4.0 / 3.0 * crate::codec::SIXTEENTH_SECONDS).abs() < 1e-12);

        assert!(decode_line(&path, 0).is_err());
        assert!(decode_line(&path, 2).is_err());
    }

    #[test]
    fn priming_stops_on_track_end() {
        let full = seq(
            "PIECE_START TRACK_START INST=0 DENSITY=1 TRACK_END TRACK_START INST=1 DENSITY=2 TRACK_END",
        );

        assert_eq!(
            truncate_priming(&full, Some(0), None).to_string(),
            "PIECE_START TRACK_START INST=0 DENSITY=1 TRACK_END"
        );
        assert_eq!(truncate_priming(&full, Some(1), None), full);
        assert_eq!(truncate_priming(&full, None, Some(3)).len(), 3);
        assert_eq!(truncate_priming(&full, None, Some(0)), full);
    }

    #[test]
    fn priming_picks_a_corpus_line() {
        let path = scratch("corpus_priming_picks_a_corpus_line");
        let lines = vec![
            seq("PIECE_START TRACK_START INST=0 DENSITY=1 TRACK_END"),
            seq("PIECE_START TRACK_START INST=3 DENSITY=4 TRACK_END"),
        ];
        write_sequences(&path, &lines, true).unwrap();

        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..8 {
            let primed = priming_sequence(&path, None, Some(3), &mut rng).unwrap();
            assert_eq!(primed.len(), 3);
            assert!(lines.iter().any(|l| l.tokens()[..3] == primed.tokens()[..]));
        }
    }
}
