use super::{CodecError, window_indices};
use crate::model::song::{Song, load_song_json};
use anyhow::Result;
use log::debug;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Ascending quantile thresholds over note-on counts per (track, window).
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct DensityBins(pub Vec<f64>);

impl DensityBins {
    /// Right-open bucketing: the number of thresholds less than or equal to `count`.
    /// Yields a class in `[0, thresholds.len()]`.
    pub fn digitize(&self, count: usize) -> usize {
        let count = count as f64;
        self.0.partition_point(|&threshold| threshold <= count)
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.0
    }
}

/// Derives density bins from the note-on counts of every track in every window of every song.
pub fn compute_bins(
    songs: &[Song],
    window_size_bars: usize,
    hop_length_bars: usize,
    bin_count: usize,
) -> Result<DensityBins, CodecError> {
    check_bin_config(window_size_bars, hop_length_bars, bin_count)?;

    let mut distribution = Vec::new();
    for song in songs {
        collect_counts(song, window_size_bars, hop_length_bars, &mut distribution)?;
    }

    bins_from_distribution(distribution, bin_count)
}

/// Same as [`compute_bins`], reading each song from a serialized JSON record.
///
/// I/O and parse failures are fatal here: a missing record would silently shift the quantiles.
pub fn compute_bins_from_json_files<P: AsRef<Path>>(
    paths: &[P],
    window_size_bars: usize,
    hop_length_bars: usize,
    bin_count: usize,
) -> Result<DensityBins> {
    check_bin_config(window_size_bars, hop_length_bars, bin_count)?;

    let mut distribution = Vec::new();
    for path in paths {
        let song = load_song_json(path)?;
        collect_counts(&song, window_size_bars, hop_length_bars, &mut distribution)?;
    }

    Ok(bins_from_distribution(distribution, bin_count)?)
}

fn check_bin_config(
    window_size_bars: usize,
    hop_length_bars: usize,
    bin_count: usize,
) -> Result<(), CodecError> {
    if bin_count == 0 {
        return Err(CodecError::InvalidBinCount);
    }
    if window_size_bars == 0 || hop_length_bars == 0 {
        return Err(CodecError::InvalidWindow {
            window_size_bars,
            hop_length_bars,
        });
    }
    Ok(())
}

fn collect_counts(
    song: &Song,
    window_size_bars: usize,
    hop_length_bars: usize,
    distribution: &mut Vec<f64>,
) -> Result<(), CodecError> {
    let windows = window_indices(song.bar_count(), window_size_bars, hop_length_bars)?;

    for track in song.tracks.iter() {
        for &(start, end) in windows.iter() {
            let count = track.note_on_count(start, end);

            // silent windows would drag the quantiles toward zero
            if count != 0 {
                distribution.push(count as f64);
            }
        }
    }

    Ok(())
}

fn bins_from_distribution(
    mut distribution: Vec<f64>,
    bin_count: usize,
) -> Result<DensityBins, CodecError> {
    if distribution.is_empty() {
        return Err(CodecError::EmptyDensityDistribution);
    }

    distribution.sort_by(f64::total_cmp);
    debug!(
        "Density distribution has {} voiced windows, computing {} thresholds..!",
        distribution.len(),
        bin_count - 1
    );

    let thresholds = (1..bin_count)
        .map(|i| percentile(&distribution, 100.0 * i as f64 / bin_count as f64))
        .collect();

    Ok(DensityBins(thresholds))
}

/// Linear interpolation between closest ranks over an ascending, non-empty slice.
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    let rank = pct / 100.0 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let weight = rank - lower as f64;

    sorted[lower] + (sorted[upper] - sorted[lower]) * weight
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::codec::fixtures::{quarter_bar, song, track};
    use crate::model::song::{Bar, save_song_json};

    #[test]
    fn percentile_matches_linear_interpolation() {
        let data = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile(&data, 0.0), 1.0);
        assert_eq!(percentile(&data, 100.0), 4.0);
        assert!((percentile(&data, 50.0) - 2.5).abs() < 1e-12);
        assert!((percentile(&data, 20.0) - 1.6).abs() < 1e-12);
    }

    #[test]
    fn digitize_is_right_open() {
        let bins = DensityBins(vec![2.0, 4.0, 6.0]);
        assert_eq!(bins.digitize(0), 0);
        assert_eq!(bins.digitize(1), 0);
        assert_eq!(bins.digitize(2), 1);
        assert_eq!(bins.digitize(5), 2);
        assert_eq!(bins.digitize(6), 3);
        assert_eq!(bins.digitize(100), 3);
    }

    fn graded_corpus() -> Vec<Song> {
        // one track per song, window counts 1..=10 across ten songs
        (1..=10)
            .map(|n| {
                let pitches: Vec<i32> = (0..n).map(|p| 60 + p).collect();
                song(
                    &format!("song {}", n),
                    vec![track(0, false, vec![quarter_bar(&pitches), Bar::empty(), Bar::empty()])],
                )
            })
            .collect()
    }

    #[test]
    fn five_bins_give_four_ordered_thresholds() {
        let bins = compute_bins(&graded_corpus(), 2, 2, 5).unwrap();

        assert_eq!(bins.thresholds().len(), 4);
        assert!(bins.thresholds().windows(2).all(|w| w[0] <= w[1]));
        assert!((bins.thresholds()[0] - 2.8).abs() < 1e-9);
        assert!((bins.thresholds()[3] - 8.2).abs() < 1e-9);
    }

    #[test]
    fn silent_windows_are_excluded() {
        let mut corpus = graded_corpus();
        corpus.push(song(
            "silence",
            vec![track(0, false, vec![Bar::empty(); 8])],
        ));

        let with_silence = compute_bins(&corpus, 2, 2, 5).unwrap();
        let without = compute_bins(&graded_corpus(), 2, 2, 5).unwrap();
        assert_eq!(with_silence, without);
    }

    #[test]
    fn empty_distribution_is_fatal() {
        let corpus = vec![song("silence", vec![track(0, false, vec![Bar::empty(); 4])])];
        let err = compute_bins(&corpus, 2, 2, 5).unwrap_err();

        assert_eq!(err, CodecError::EmptyDensityDistribution);
        assert!(err.is_configuration());
    }

    #[test]
    fn zero_sizes_are_rejected() {
        assert!(matches!(
            compute_bins(&graded_corpus(), 0, 2, 5),
            Err(CodecError::InvalidWindow { .. })
        ));
        assert_eq!(
            compute_bins(&graded_corpus(), 2, 2, 0),
            Err(CodecError::InvalidBinCount)
        );
    }

    #[test]
    fn json_records_give_the_same_bins() {
        let dir = std::env::temp_dir().join("json_records_give_the_same_bins");
        std::fs::create_dir_all(&dir).unwrap();

        let corpus = graded_corpus();
        let paths: Vec<_> = corpus
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let path = dir.join(format!("{}.json", i));
                save_song_json(s, &path).unwrap();
                path
            })
            .collect();

        let from_files = compute_bins_from_json_files(&paths, 2, 2, 5).unwrap();
        assert_eq!(from_files, compute_bins(&corpus, 2, 2, 5).unwrap());
    }
}
