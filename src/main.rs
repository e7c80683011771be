use anyhow::Context;
use clap::Parser;
use seamless_loop::sink::RodioSink;
use seamless_loop::stream::SampleStream;
use seamless_loop::{analysis, audio, export, player, DegeneratePolicy, DetectorSettings, PlayerSettings};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about = "Find a silence-bounded loop in an audio file and play it seamlessly", long_about = None)]
struct Cli {
    input: PathBuf,
    /// Render the loop to a WAV file instead of playing it.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Number of passes (defaults to forever, or 5 when exporting).
    #[arg(short, long)]
    loops: Option<u32>,
    /// Channel-average amplitude treated as silence.
    #[arg(long, default_value_t = DetectorSettings::DEFAULT_THRESHOLD)]
    threshold: f32,
    /// Silence length that marks a loop boundary, in milliseconds at the file's
    /// sample rate. Defaults to a fixed 4410 frames.
    #[arg(long)]
    silence_ms: Option<u32>,
    /// Frames read per batch while scanning and playing.
    #[arg(long, default_value_t = seamless_loop::CHUNK_SIZE)]
    chunk_size: usize,
    /// Exit with an error when no loop is found instead of looping the whole file.
    #[arg(long)]
    strict: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    println!("Loading audio: {:?}", cli.input);
    let audio_data = audio::load_audio_file(&cli.input)?;
    println!(
        "Audio loaded. Sample rate: {}, Channels: {}, Length: {:.2}s",
        audio_data.sample_rate,
        audio_data.channels,
        audio_data.duration_secs()
    );
    if let Some(title) = &audio_data.title {
        println!("Title: {title}");
    }

    let mut settings = match cli.silence_ms {
        Some(ms) => DetectorSettings::with_silence_ms(audio_data.sample_rate, ms),
        None => DetectorSettings::default(),
    };
    settings.threshold = cli.threshold;
    settings.chunk_size = cli.chunk_size;

    let sample_rate = audio_data.sample_rate;
    let mut stream = audio_data.into_stream();
    let total_frames = stream.len();

    println!("Detecting loop points...");
    let detected = analysis::detect_loop(&mut stream, &settings);
    println!("Detected loop segment from {} to {}", detected.start, detected.end);

    let policy = if cli.strict {
        DegeneratePolicy::Fail
    } else {
        DegeneratePolicy::WholeStream
    };
    let segment = detected.resolve(policy, total_frames)?;
    if segment != detected {
        println!("No clear loop detected. Looping the whole file.");
    }

    if let Some(output_path) = cli.output {
        let loop_count = cli.loops.unwrap_or(5);
        println!("Exporting to {:?} with {} loops...", output_path, loop_count);
        export::export_loop(&output_path, stream, segment, loop_count)?;
        println!("Export complete.");
    } else {
        let sink = RodioSink::try_default(sample_rate).context("failed to open audio output")?;
        println!("Playing... (Ctrl+C to stop)");
        let mut player = player::SeamlessPlayer::new(stream, sink, segment)?
            .with_settings(PlayerSettings {
                chunk_size: cli.chunk_size,
            })
            .with_max_loops(cli.loops);
        let stats = player.play_forever()?;
        println!("Played {} loops.", stats.passes);
    }

    Ok(())
}
