use crate::codec::{DensityBins, EncodeOptions, LogDiagnostics, compute_bins, encode_corpus};
use crate::corpus::write_sequences;
use crate::midi_importer::import_midi_file;
use crate::model::config::DatasetConfig;
use crate::model::song::Song;
use anyhow::{Result, anyhow, bail};
use log::{info, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

const BATCH_SIZE: usize = 100;
const IMPORT_WORKERS: usize = 8;

pub const TRAIN_FILE: &str = "token_sequences_train.txt";
pub const VALID_FILE: &str = "token_sequences_valid.txt";
pub const BINS_FILE: &str = "density_bins.json";

#[derive(Debug, Clone)]
pub struct DatasetBuilder {
    config: DatasetConfig,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Builds `<datasets_path>/<dataset_name>/` from `<datasets_path>/midi_files/*.mid`.
    ///
    /// Returns `None` when the dataset already exists and `overwrite` is not set.
    pub fn create<P: AsRef<Path>>(&self, datasets_path: P, overwrite: bool) -> Result<Option<PathBuf>> {
        let datasets_path = datasets_path.as_ref();
        if !datasets_path.is_dir() {
            bail!("Dataset path {} doesn't exist..!", datasets_path.display());
        }

        let dataset_path = datasets_path.join(&self.config.dataset_name);
        if dataset_path.exists() && !overwrite {
            info!("Dataset {} already exists..!", dataset_path.display());
            return Ok(None);
        }
        fs::create_dir_all(&dataset_path)?;

        let midi_files = list_midi_files(&datasets_path.join("midi_files"))?;
        info!("Found {} MIDI files..!", midi_files.len());

        let songs = import_all(&midi_files);
        let split_index = (self.config.train_split * songs.len() as f64) as usize;
        let (train, valid) = songs.split_at(split_index);
        info!(
            "Imported {} songs, {} for training and {} for validation..!",
            songs.len(),
            train.len(),
            valid.len()
        );

        let bins = compute_bins(
            train,
            self.config.window_size_bars,
            self.config.hop_length_bars,
            self.config.density_bins_number,
        )?;
        info!("Density bins: {:?}", bins.thresholds());
        fs::write(dataset_path.join(BINS_FILE), serde_json::to_string(&bins)?)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let train_path = dataset_path.join(TRAIN_FILE);
        let train_count = self.encode_to_file(train, &train_path, &self.config.train_options(), &bins, &mut rng)?;
        info!("Wrote {} training sequences to {}..!", train_count, train_path.display());

        let valid_path = dataset_path.join(VALID_FILE);
        let valid_count = self.encode_to_file(valid, &valid_path, &self.config.valid_options(), &bins, &mut rng)?;
        info!("Wrote {} validation sequences to {}..!", valid_count, valid_path.display());

        Ok(Some(dataset_path))
    }

    fn encode_to_file(
        &self,
        songs: &[Song],
        path: &Path,
        options: &EncodeOptions,
        bins: &DensityBins,
        rng: &mut StdRng,
    ) -> Result<usize> {
        write_sequences(path, &[], true)?;

        let total_batches = songs.len().div_ceil(BATCH_SIZE);
        let mut written = 0;
        for (batch_index, batch) in songs.chunks(BATCH_SIZE).enumerate() {
            info!(
                "Encoding batch {} of {} with {} songs..!",
                batch_index + 1,
                total_batches,
                batch.len()
            );

            let sequences = encode_corpus(batch, options, bins, rng, &LogDiagnostics)?;
            write_sequences(path, &sequences, false)?;
            written += sequences.len();
        }

        Ok(written)
    }
}

fn list_midi_files(midi_files_path: &Path) -> Result<Vec<PathBuf>> {
    if !midi_files_path.is_dir() {
        bail!(
            "Please create a '{}' folder with all the MIDI files..!",
            midi_files_path.display()
        );
    }

    let mut files: Vec<PathBuf> = fs::read_dir(midi_files_path)
        .map_err(|e| anyhow!("Failed to list {}: {}", midi_files_path.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("mid")))
        .collect();

    // directory order is platform dependent
    files.sort();
    Ok(files)
}

/// Imports files in batches on scoped worker threads. Files that fail are logged and dropped;
/// the result keeps the input order.
fn import_all(files: &[PathBuf]) -> Vec<Song> {
    import_all_with(files, |path| import_midi_file(path))
}

fn import_all_with<F>(files: &[PathBuf], import: F) -> Vec<Song>
where
    F: Fn(&PathBuf) -> Result<Song> + Sync,
{
    let import = &import;
    let total_batches = files.len().div_ceil(BATCH_SIZE);
    let mut songs = Vec::with_capacity(files.len());

    for (batch_index, batch) in files.chunks(BATCH_SIZE).enumerate() {
        info!(
            "Importing batch {} of {} with {} files..!",
            batch_index + 1,
            total_batches,
            batch.len()
        );

        let per_worker = batch.len().div_ceil(IMPORT_WORKERS).max(1);
        let results: Vec<Result<Song>> = thread::scope(|scope| {
            let handles: Vec<_> = batch
                .chunks(per_worker)
                .map(|chunk| (chunk.len(), scope.spawn(move || chunk.iter().map(import).collect::<Vec<_>>())))
                .collect();

            // a panicked worker still yields one result per file so paths stay aligned
            handles
                .into_iter()
                .flat_map(|(len, handle)| match handle.join() {
                    Ok(results) => results,
                    Err(_) => (0..len).map(|_| Err(anyhow!("Import worker panicked..!"))).collect(),
                })
                .collect()
        });

        for (path, result) in batch.iter().zip(results) {
            match result {
                Ok(song) => songs.push(song),
                Err(why) => warn!("Skipping MIDI file {}: {}", path.display(), why),
            }
        }
    }

    songs
}
