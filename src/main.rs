use anyhow::Result;
use clap::Parser;
use log::{debug, info, warn};
use orchestrify::{
    Args, Command, DatasetBuilder, DatasetConfig, compute_bins_from_json_files, decode_line, encode_single,
    import_midi_file, parse_transpositions, save_song_json, write_note_sequence,
};

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Command::Build {
            datasets_path,
            config,
            transpositions,
            overwrite,
        } => {
            let mut config = match config {
                Some(path) => {
                    info!("Loading dataset config: '{}'...", path.display());
                    DatasetConfig::load(&path)?
                }
                None => DatasetConfig::default(),
            };

            if let Some(transpositions) = transpositions {
                config.transpositions_train = parse_transpositions(&transpositions)?;
            }
            debug!("Dataset config: {:?}", config);

            match DatasetBuilder::new(config)?.create(&datasets_path, overwrite)? {
                Some(dataset) => info!("Dataset written to '{}'..!", dataset.display()),
                None => info!("Nothing to do, pass --overwrite to rebuild..!"),
            }
        }

        Command::Import { midi, out } => {
            info!("Importing MIDI file: '{}'...", midi.display());
            let song = import_midi_file(&midi)?;
            debug!(
                "Imported song '{}' with {} tracks and {} bars..!",
                song.label(),
                song.tracks.len(),
                song.bar_count()
            );

            match out {
                Some(path) => {
                    save_song_json(&song, &path)?;
                    info!("Song record written to '{}'..!", path.display());
                }
                None => println!("{}", serde_json::to_string_pretty(&song)?),
            }
        }

        Command::Bins {
            records,
            window_size,
            hop_length,
            bins,
        } => {
            info!("Computing {} density bins from {} records...", bins, records.len());
            let density = compute_bins_from_json_files(&records, window_size, hop_length, bins)?;
            println!("{}", serde_json::to_string(&density)?);
        }

        Command::Prime { midi, density } => {
            info!("Importing MIDI file: '{}'...", midi.display());
            let song = import_midi_file(&midi)?;
            println!("{}", encode_single(Some(&song), density));
        }

        Command::Decode {
            tokens,
            line,
            out,
            dry_run,
            dry_run_max,
        } => {
            let notes = decode_line(&tokens, line)?;
            if notes.notes.is_empty() {
                warn!("Sequence {} decodes to no notes..!", line);
            }

            if dry_run {
                info!("Previewing at most {} notes..!", dry_run_max);
                for (i, note) in notes.notes.iter().take(dry_run_max).enumerate() {
                    info!(
                        "Note {}: pitch={} start_s={:.3} end_s={:.3} program={} drums={}",
                        i, note.pitch, note.start_time, note.end_time, note.program, note.is_drum
                    );
                }
                return Ok(());
            }

            write_note_sequence(&notes, &out)?;
            info!(
                "Wrote {} notes ({:.2}s) to '{}'..!",
                notes.notes.len(),
                notes.total_time(),
                out.display()
            );
        }
    }

    Ok(())
}
