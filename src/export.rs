use std::io::{Seek, Write};
use std::path::Path;

use anyhow::{Context, Result};
use log::info;

use crate::player::{PlaybackStats, SeamlessPlayer};
use crate::sink::WavSink;
use crate::stream::SampleStream;
use crate::LoopSegment;

fn render<S, W>(sink: WavSink<W>, stream: S, segment: LoopSegment, loops: u32) -> Result<PlaybackStats>
where
    S: SampleStream,
    W: Write + Seek,
{
    // An export has to end, so the pass count is always bounded.
    let mut player = SeamlessPlayer::new(stream, sink, segment)?.with_max_loops(Some(loops));
    let stats = player.play_forever()?;
    info!(
        "exported {} passes, {} frames",
        stats.passes, stats.frames_written
    );
    Ok(stats)
}

/// Renders `loops` back-to-back passes of `segment` as a 16-bit stereo WAV.
pub fn export_loop_to<S, W>(writer: W, stream: S, segment: LoopSegment, loops: u32) -> Result<PlaybackStats>
where
    S: SampleStream,
    W: Write + Seek,
{
    let sink = WavSink::new(writer, stream.sample_rate())?;
    render(sink, stream, segment, loops)
}

pub fn export_loop<S, P>(output_path: P, stream: S, segment: LoopSegment, loops: u32) -> Result<PlaybackStats>
where
    S: SampleStream,
    P: AsRef<Path>,
{
    let sink = WavSink::create(&output_path, stream.sample_rate())
        .with_context(|| format!("failed to create {}", output_path.as_ref().display()))?;
    render(sink, stream, segment, loops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::PcmStream;
    use std::io::Cursor;

    #[test]
    fn writes_every_pass() {
        let frames = (0..50).map(|i| [i as f32 / 100.0, 0.0]).collect();
        let stream = PcmStream::new(frames, 8000);

        let mut buffer = Cursor::new(Vec::new());
        let stats = export_loop_to(&mut buffer, stream, LoopSegment::new(10, 20), 4).unwrap();
        assert_eq!(stats.frames_written, 40);

        buffer.set_position(0);
        let reader = hound::WavReader::new(buffer).unwrap();
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.duration(), 40);
        let left: Vec<i16> = reader
            .into_samples::<i16>()
            .step_by(2)
            .map(|s| s.unwrap())
            .collect();
        assert_eq!(left[0], left[10]);
        assert_eq!(left[9], left[39]);
        assert_eq!(left[0], (0.1f32 * 32767.0) as i16);
    }

    #[test]
    fn exports_to_a_file() {
        let path = std::env::temp_dir().join(format!("seamless-loop-export-{}.wav", std::process::id()));
        let stream = PcmStream::new(vec![[0.25, -0.25]; 30], 16000);
        let stats = export_loop(&path, stream, LoopSegment::new(5, 15), 3).unwrap();
        assert_eq!(stats, PlaybackStats { passes: 3, frames_written: 30 });

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().sample_rate, 16000);
        assert_eq!(reader.duration(), 30);
        drop(reader);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn empty_segment_cannot_be_exported() {
        let stream = PcmStream::new(vec![[0.0; 2]; 10], 8000);
        let res = export_loop_to(Cursor::new(Vec::new()), stream, LoopSegment::default(), 2);
        assert!(res.is_err());
    }
}
