use log::{debug, info, warn};

use crate::stream::{Frame, SampleStream};
use crate::{DetectorSettings, LoopSegment};

/// Counts the current run of silent frames.
///
/// A frame is silent when the signed average of its two channels is below the
/// threshold, so strongly negative frames count as silence too.
#[derive(Clone, Debug)]
pub struct SilenceTracker {
    threshold: f32,
    silence_frames: usize,
    run: usize,
}

impl SilenceTracker {
    pub fn new(settings: &DetectorSettings) -> Self {
        Self {
            threshold: settings.threshold,
            silence_frames: settings.silence_frames,
            run: 0,
        }
    }

    /// Feeds the next frame. Returns `true` when this frame is the first sound
    /// after a silence run longer than the configured duration.
    pub fn push(&mut self, frame: Frame) -> bool {
        let amp = (frame[0] + frame[1]) / 2.0;
        if amp < self.threshold {
            self.run += 1;
            return false;
        }
        let boundary = self.run > self.silence_frames;
        self.run = 0;
        boundary
    }

    pub fn run_length(&self) -> usize {
        self.run
    }
}

// Reads the stream to its end, reporting each boundary's absolute frame index.
// A read error ends the scan as if the stream had run out.
fn scan<S, F>(stream: &mut S, settings: &DetectorSettings, mut on_boundary: F) -> usize
where
    S: SampleStream + ?Sized,
    F: FnMut(usize),
{
    let mut tracker = SilenceTracker::new(settings);
    let mut buffer = vec![[0.0f32; 2]; settings.chunk_size.max(1)];
    let mut idx = 0usize;

    loop {
        let n = match stream.stream(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                warn!("read failed at frame {idx}, ending scan early: {e}");
                break;
            }
        };

        for &frame in &buffer[..n] {
            if tracker.push(frame) {
                debug!("silence boundary at frame {idx}");
                on_boundary(idx);
            }
            idx += 1;
        }
    }

    idx
}

/// Finds the loop segment between the last two silence boundaries.
///
/// Each boundary shifts the previous `end` into `start`, so with a single
/// boundary `b` the result is `[0, b)` and with none it is the empty `[0, 0)`.
/// Consumes `stream`; seek it back before reuse.
pub fn detect_loop<S: SampleStream + ?Sized>(stream: &mut S, settings: &DetectorSettings) -> LoopSegment {
    let mut segment = LoopSegment::default();
    let scanned = scan(stream, settings, |idx| {
        segment.start = segment.end;
        segment.end = idx;
    });

    info!(
        "scanned {scanned} frames, loop segment [{}, {})",
        segment.start, segment.end
    );
    segment
}

/// Every silence boundary in the stream, in order. Consumes `stream`.
pub fn find_boundaries<S: SampleStream + ?Sized>(stream: &mut S, settings: &DetectorSettings) -> Vec<usize> {
    let mut boundaries = Vec::new();
    scan(stream, settings, |idx| boundaries.push(idx));
    boundaries
}
