use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::error::PlayError;
use crate::sink::{PcmSink, FRAME_BYTES};
use crate::stream::{Frame, SampleStream};
use crate::{LoopSegment, PlayerSettings};

/// Converts frames to 16-bit little-endian PCM, interleaved L then R.
/// The float-to-int cast truncates toward zero.
pub fn pack_frames(frames: &[Frame], out: &mut Vec<u8>) {
    out.reserve(frames.len() * FRAME_BYTES);
    for frame in frames {
        for &channel in frame {
            let sample = (channel * 32767.0) as i16;
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

/// Asks a running [`SeamlessPlayer`] to return. Can be cloned to other threads.
#[derive(Clone, Debug, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlaybackStats {
    pub passes: u64,
    pub frames_written: u64,
}

/// Replays one segment of a stream back to back, forever.
///
/// There is no natural end: [`play_forever`](Self::play_forever) only returns
/// when `max_loops` passes are done, when the [`StopHandle`] fires, or when the
/// sink fails. Seek and read failures never stop playback.
pub struct SeamlessPlayer<S, K> {
    stream: S,
    sink: K,
    segment: LoopSegment,
    settings: PlayerSettings,
    max_loops: Option<u32>, // None means infinite
    stop: StopHandle,
}

impl<S: SampleStream, K: PcmSink> SeamlessPlayer<S, K> {
    /// Fails on a zero-length segment, which would otherwise spin without
    /// playing anything.
    pub fn new(stream: S, sink: K, segment: LoopSegment) -> Result<Self, PlayError> {
        if segment.is_empty() {
            return Err(PlayError::EmptySegment {
                start: segment.start,
                end: segment.end,
            });
        }
        Ok(Self {
            stream,
            sink,
            segment,
            settings: PlayerSettings::default(),
            max_loops: None,
            stop: StopHandle::new(),
        })
    }

    pub fn with_settings(mut self, settings: PlayerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_max_loops(mut self, max_loops: Option<u32>) -> Self {
        self.max_loops = max_loops;
        self
    }

    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn segment(&self) -> LoopSegment {
        self.segment
    }

    pub fn into_parts(self) -> (S, K) {
        (self.stream, self.sink)
    }

    pub fn play_forever(&mut self) -> Result<PlaybackStats, PlayError> {
        let mut stats = PlaybackStats::default();
        let chunk_size = self.settings.chunk_size.max(1);
        let mut buffer = vec![[0.0f32; 2]; chunk_size];
        let mut bytes = Vec::with_capacity(chunk_size * FRAME_BYTES);
        let mut warned_empty = false;

        info!(
            "looping frames [{}, {}) ({} per pass)",
            self.segment.start,
            self.segment.end,
            self.segment.len()
        );

        while self.max_loops.map_or(true, |max| stats.passes < u64::from(max)) {
            if self.stop.is_stopped() {
                debug!("stop requested after {} passes", stats.passes);
                break;
            }

            if let Err(e) = self.stream.seek(self.segment.start) {
                if stats.passes == 0 {
                    warn!("seek to loop start failed, playing on: {e}");
                } else {
                    debug!("seek to loop start failed: {e}");
                }
            }

            let played = self.play_pass(&mut buffer, &mut bytes)?;
            stats.passes += 1;
            stats.frames_written += played as u64;

            if played == 0 && !warned_empty {
                warn!(
                    "loop segment [{}, {}) produced no audio",
                    self.segment.start, self.segment.end
                );
                warned_empty = true;
            }
        }

        self.sink.finish()?;
        Ok(stats)
    }

    // Delivers up to `segment.len()` frames from the current cursor.
    fn play_pass(&mut self, buffer: &mut [Frame], bytes: &mut Vec<u8>) -> Result<usize, PlayError> {
        let target = self.segment.len();
        let mut played = 0;

        while played < target && !self.stop.is_stopped() {
            let want = buffer.len().min(target - played);
            let n = match self.stream.stream(&mut buffer[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    warn!("read failed mid-loop, restarting pass: {e}");
                    break;
                }
            };

            bytes.clear();
            pack_frames(&buffer[..n], bytes);
            self.sink.write(bytes)?;
            played += n;
        }

        Ok(played)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{SinkError, StreamError};
    use crate::stream::PcmStream;

    #[derive(Default)]
    struct RecordingSink {
        writes: Vec<Vec<u8>>,
        finished: bool,
        stop_after: Option<(usize, StopHandle)>,
    }

    impl PcmSink for RecordingSink {
        fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
            self.writes.push(bytes.to_vec());
            if let Some((limit, stop)) = &self.stop_after {
                if self.writes.len() >= *limit {
                    stop.stop();
                }
            }
            Ok(())
        }

        fn finish(&mut self) -> Result<(), SinkError> {
            self.finished = true;
            Ok(())
        }
    }

    struct BrokenSink;

    impl PcmSink for BrokenSink {
        fn write(&mut self, _bytes: &[u8]) -> Result<(), SinkError> {
            Err(SinkError::Device("unplugged".into()))
        }
    }

    /// Records seeks and can fail one chosen pull.
    struct Probe {
        inner: PcmStream,
        seeks: Vec<usize>,
        pulls: usize,
        fail_at: Option<usize>,
    }

    impl Probe {
        fn new(len: usize) -> Self {
            let frames = (0..len).map(|i| [i as f32 / len as f32, 0.0]).collect();
            Self {
                inner: PcmStream::new(frames, 44100),
                seeks: Vec::new(),
                pulls: 0,
                fail_at: None,
            }
        }
    }

    impl SampleStream for Probe {
        fn stream(&mut self, buf: &mut [Frame]) -> Result<usize, StreamError> {
            self.pulls += 1;
            if self.fail_at == Some(self.pulls) {
                return Err(StreamError::Read("bad packet".into()));
            }
            self.inner.stream(buf)
        }

        fn seek(&mut self, index: usize) -> Result<(), StreamError> {
            self.seeks.push(index);
            self.inner.seek(index)
        }

        fn sample_rate(&self) -> u32 {
            self.inner.sample_rate()
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn packs_full_scale_and_silence() {
        let mut out = Vec::new();
        pack_frames(&[[1.0, -1.0]], &mut out);
        let mut expected = 32767i16.to_le_bytes().to_vec();
        expected.extend_from_slice(&(-32767i16).to_le_bytes());
        assert_eq!(out, expected);
        assert_eq!(out, vec![0xFF, 0x7F, 0x01, 0x80]);

        out.clear();
        pack_frames(&[[0.0, 0.0]], &mut out);
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn packing_truncates_toward_zero() {
        let mut out = Vec::new();
        pack_frames(&[[0.5, -0.5], [1.5, -1.5]], &mut out);
        let samples: Vec<i16> = out
            .chunks_exact(2)
            .map(|b| i16::from_le_bytes([b[0], b[1]]))
            .collect();
        assert_eq!(samples, vec![16383, -16383, 32767, -32768]);
    }

    #[test]
    fn plays_exact_segment_each_pass() {
        let mut player = SeamlessPlayer::new(Probe::new(10), RecordingSink::default(), LoopSegment::new(2, 5))
            .unwrap()
            .with_max_loops(Some(3));
        let stats = player.play_forever().unwrap();
        let (probe, sink) = player.into_parts();

        assert_eq!(stats, PlaybackStats { passes: 3, frames_written: 9 });
        assert_eq!(probe.seeks, vec![2, 2, 2]);
        assert_eq!(sink.writes.len(), 3);
        let mut expected = Vec::new();
        pack_frames(&[[0.2, 0.0], [0.3, 0.0], [0.4, 0.0]], &mut expected);
        for write in &sink.writes {
            assert_eq!(write.len(), 3 * FRAME_BYTES);
            assert_eq!(write, &expected);
        }
        assert!(sink.finished);
    }

    #[test]
    fn long_segments_span_several_chunks() {
        let mut player = SeamlessPlayer::new(Probe::new(3000), RecordingSink::default(), LoopSegment::new(0, 2500))
            .unwrap()
            .with_max_loops(Some(2));
        let stats = player.play_forever().unwrap();
        let (_, sink) = player.into_parts();

        assert_eq!(stats.frames_written, 5000);
        let sizes: Vec<usize> = sink.writes.iter().map(|w| w.len() / FRAME_BYTES).collect();
        assert_eq!(sizes, vec![1024, 1024, 452, 1024, 1024, 452]);
    }

    #[test]
    fn chunk_size_sets_write_granularity() {
        let mut player = SeamlessPlayer::new(Probe::new(20), RecordingSink::default(), LoopSegment::new(0, 8))
            .unwrap()
            .with_settings(PlayerSettings { chunk_size: 3 })
            .with_max_loops(Some(2));
        player.play_forever().unwrap();
        let (_, sink) = player.into_parts();

        let sizes: Vec<usize> = sink.writes.iter().map(|w| w.len() / FRAME_BYTES).collect();
        assert_eq!(sizes, vec![3, 3, 2, 3, 3, 2]);
    }

    #[test]
    fn segment_past_end_spins_without_writing() {
        let mut player = SeamlessPlayer::new(
            Probe::new(100),
            RecordingSink::default(),
            LoopSegment::new(1_000_000, 1_000_010),
        )
        .unwrap()
        .with_max_loops(Some(5));
        let stats = player.play_forever().unwrap();
        let (probe, sink) = player.into_parts();

        assert_eq!(stats, PlaybackStats { passes: 5, frames_written: 0 });
        assert_eq!(probe.seeks.len(), 5);
        assert!(sink.writes.is_empty());
    }

    #[test]
    fn segment_running_off_the_end_is_truncated() {
        let mut player = SeamlessPlayer::new(Probe::new(10), RecordingSink::default(), LoopSegment::new(6, 20))
            .unwrap()
            .with_max_loops(Some(2));
        let stats = player.play_forever().unwrap();
        assert_eq!(stats.frames_written, 8);
    }

    #[test]
    fn read_error_restarts_from_loop_start() {
        let mut probe = Probe::new(3000);
        probe.fail_at = Some(2);
        let mut player = SeamlessPlayer::new(probe, RecordingSink::default(), LoopSegment::new(0, 2500))
            .unwrap()
            .with_max_loops(Some(2));
        let stats = player.play_forever().unwrap();
        let (probe, _) = player.into_parts();

        assert_eq!(stats.frames_written, 1024 + 2500);
        assert_eq!(probe.seeks, vec![0, 0]);
    }

    #[test]
    fn empty_segment_is_rejected() {
        let res = SeamlessPlayer::new(Probe::new(10), RecordingSink::default(), LoopSegment::new(0, 0));
        assert!(matches!(res, Err(PlayError::EmptySegment { start: 0, end: 0 })));
    }

    #[test]
    fn stop_handle_ends_an_unbounded_loop() {
        let stop = StopHandle::new();
        let sink = RecordingSink {
            stop_after: Some((2, stop.clone())),
            ..Default::default()
        };
        let mut player = SeamlessPlayer::new(Probe::new(10), sink, LoopSegment::new(2, 5))
            .unwrap()
            .with_stop_handle(stop);
        let stats = player.play_forever().unwrap();
        assert_eq!(stats.passes, 2);
        assert_eq!(stats.frames_written, 6);
    }

    #[test]
    fn stopped_before_start_plays_nothing() {
        let mut player = SeamlessPlayer::new(Probe::new(10), RecordingSink::default(), LoopSegment::new(2, 5)).unwrap();
        player.stop_handle().stop();
        let stats = player.play_forever().unwrap();
        assert_eq!(stats, PlaybackStats::default());
    }

    #[test]
    fn sink_failure_is_returned() {
        let mut player = SeamlessPlayer::new(Probe::new(10), BrokenSink, LoopSegment::new(0, 5)).unwrap();
        assert!(matches!(player.play_forever(), Err(PlayError::Sink(SinkError::Device(_)))));
    }
}
