use crate::codec::{CodecError, EncodeOptions};
use anyhow::{Result, anyhow, bail};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "orchestrify",
    about = "Turn MIDI songs into token sequences for a sequence model, and generated tokens back into MIDI."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build train/validation token corpora from `<datasets_path>/midi_files/*.mid`.
    Build {
        /// Directory holding the `midi_files` folder; the dataset is written next to it.
        datasets_path: PathBuf,

        /// JSON dataset configuration. Defaults to the track preset.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override the configured transpositions, e.g. `-12..=12` or `0,5,-5`.
        #[arg(short, long, allow_hyphen_values = true)]
        transpositions: Option<String>,

        /// Rebuild an existing dataset, truncating its corpus files.
        #[arg(short, long, default_value_t = false)]
        overwrite: bool,
    },

    /// Import a MIDI file and write the song record as JSON.
    Import {
        /// Path to the source MIDI file.
        midi: PathBuf,

        /// Output path for the JSON record. Prints to stdout when omitted.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Compute density bins from JSON song records.
    Bins {
        /// Song records written by `import`.
        #[arg(required = true)]
        records: Vec<PathBuf>,

        #[arg(long, default_value_t = 2)]
        window_size: usize,

        #[arg(long, default_value_t = 2)]
        hop_length: usize,

        #[arg(long, default_value_t = 5)]
        bins: usize,
    },

    /// Print the priming token sequence for one MIDI file.
    Prime {
        /// Path to the source MIDI file.
        midi: PathBuf,

        /// Density class applied to every track.
        #[arg(short, long, default_value_t = 0)]
        density: usize,
    },

    /// Decode a token sequence file into a MIDI file.
    Decode {
        /// File with one space-separated token sequence per line.
        tokens: PathBuf,

        /// Which line of the token file to decode.
        #[arg(short, long, default_value_t = 0)]
        line: usize,

        /// Output MIDI path.
        #[arg(short, long, default_value = "decoded.mid")]
        out: PathBuf,

        /// Dry run (print first dry_run_max notes and exit).
        #[arg(long, default_value_t = false)]
        dry_run: bool,

        /// Maximum notes to print in dry run.
        #[arg(long, default_value_t = 80)]
        dry_run_max: usize,
    },
}

/// Corpus build settings.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DatasetConfig {
    pub dataset_name: String,
    pub window_size_bars: usize,
    pub hop_length_bars: usize,
    pub density_bins_number: usize,
    pub transpositions_train: Vec<i32>,
    pub permute_tracks: bool,
    pub bar_fill: bool,
    pub seed: u64,

    /// Share of songs that go to the training corpus; the rest is validation.
    pub train_split: f64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self::jsb_track()
    }
}

impl DatasetConfig {
    pub fn jsb_track() -> Self {
        Self {
            dataset_name: "jsb_mmmtrack".into(),
            window_size_bars: 2,
            hop_length_bars: 2,
            density_bins_number: 5,
            transpositions_train: (-12..=12).collect(),
            permute_tracks: true,
            bar_fill: false,
            seed: 42,
            train_split: 0.8,
        }
    }

    pub fn jsb_bar() -> Self {
        Self {
            dataset_name: "jsb_mmmbar".into(),
            ..Self::jsb_track()
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).map_err(|e| {
            anyhow!(
                "Failed to read dataset config {}: {}",
                path.as_ref().display(),
                e
            )
        })?;

        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset_name.trim().is_empty() {
            bail!("Config parameter dataset_name must not be empty..!");
        }
        if self.window_size_bars == 0 || self.hop_length_bars == 0 {
            return Err(CodecError::InvalidWindow {
                window_size_bars: self.window_size_bars,
                hop_length_bars: self.hop_length_bars,
            }
            .into());
        }
        if self.density_bins_number == 0 {
            return Err(CodecError::InvalidBinCount.into());
        }
        if self.transpositions_train.is_empty() {
            bail!("Config parameter transpositions_train must list at least one transposition..!");
        }
        if !(self.train_split > 0.0 && self.train_split <= 1.0) {
            bail!(
                "Config parameter train_split must be in (0, 1], but is {}..!",
                self.train_split
            );
        }
        Ok(())
    }

    /// Encoding options for the training corpus.
    pub fn train_options(&self) -> EncodeOptions {
        EncodeOptions {
            transpositions: self.transpositions_train.clone(),
            permute: self.permute_tracks,
            window_size_bars: self.window_size_bars,
            hop_length_bars: self.hop_length_bars,
            bar_fill: self.bar_fill,
        }
    }

    /// Validation data is never transposed.
    pub fn valid_options(&self) -> EncodeOptions {
        EncodeOptions {
            transpositions: vec![0],
            ..self.train_options()
        }
    }
}
