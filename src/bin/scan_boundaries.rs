use anyhow::Result;
use clap::Parser;
use seamless_loop::{analysis, audio, DetectorSettings};
use std::path::PathBuf;

/// Lists every silence boundary the loop detector sees in a file.
#[derive(Parser)]
struct Args {
    input: PathBuf,
    #[arg(long, default_value_t = DetectorSettings::DEFAULT_THRESHOLD)]
    threshold: f32,
    /// Override the fixed 4410-frame silence window, in milliseconds.
    #[arg(long)]
    silence_ms: Option<u32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    if !args.input.exists() {
        println!("File not found: {:?}", args.input);
        return Ok(());
    }

    println!("Loading file: {:?}", args.input);
    let audio_data = audio::load_audio_file(&args.input)?;
    let rate = audio_data.sample_rate;
    println!(
        "Loaded. Sample Rate: {}, Channels: {}, Frames: {}",
        rate,
        audio_data.channels,
        audio_data.frames.len()
    );

    let mut settings = match args.silence_ms {
        Some(ms) => DetectorSettings::with_silence_ms(rate, ms),
        None => DetectorSettings::default(),
    };
    settings.threshold = args.threshold;
    println!(
        "Threshold: {}, silence run > {} frames",
        settings.threshold, settings.silence_frames
    );

    let mut stream = audio_data.into_stream();
    let boundaries = analysis::find_boundaries(&mut stream, &settings);

    if boundaries.is_empty() {
        println!("No silence boundaries found.");
        return Ok(());
    }

    println!("--- {} boundaries ---", boundaries.len());
    for (i, idx) in boundaries.iter().enumerate() {
        println!("{}. Frame: {}, Time: {:.3}s", i + 1, idx, *idx as f64 / f64::from(rate));
    }

    let n = boundaries.len();
    let (start, end) = if n >= 2 {
        (boundaries[n - 2], boundaries[n - 1])
    } else {
        (0, boundaries[0])
    };
    println!("Loop segment: {} to {}", start, end);

    Ok(())
}
