pub mod analysis;
pub mod audio;
pub mod error;
pub mod export;
pub mod player;
pub mod sink;
pub mod stream;

use error::LoopError;

/// Frames pulled from a stream per batch, both while scanning and playing.
pub const CHUNK_SIZE: usize = 1024;

/// Half-open range `[start, end)` of absolute frame indices to replay.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct LoopSegment {
    pub start: usize,
    pub end: usize,
}

impl LoopSegment {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies `policy` to a zero-length segment. Non-empty segments pass
    /// through untouched, even when they reach past `total_frames`.
    pub fn resolve(self, policy: DegeneratePolicy, total_frames: usize) -> Result<Self, LoopError> {
        if !self.is_empty() {
            return Ok(self);
        }
        match policy {
            DegeneratePolicy::WholeStream if total_frames > 0 => Ok(Self::new(0, total_frames)),
            DegeneratePolicy::WholeStream | DegeneratePolicy::Fail => Err(LoopError::NoLoopFound),
        }
    }
}

/// What to do when detection finds no usable segment.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum DegeneratePolicy {
    /// Loop the entire stream instead.
    #[default]
    WholeStream,
    /// Refuse to play.
    Fail,
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    /// Channel-average amplitude below which a frame counts as silent.
    pub threshold: f32,
    /// A silence run must be strictly longer than this many frames to mark a boundary.
    pub silence_frames: usize,
    pub chunk_size: usize,
}

impl DetectorSettings {
    pub const DEFAULT_THRESHOLD: f32 = 0.001;
    /// 100ms at 44.1kHz. Fixed whatever the file's own rate is.
    pub const DEFAULT_SILENCE_FRAMES: usize = 44100 / 10;

    /// Overrides the silence window with a duration measured at `sample_rate`.
    pub fn with_silence_ms(sample_rate: u32, silence_ms: u32) -> Self {
        Self {
            silence_frames: (u64::from(sample_rate) * u64::from(silence_ms) / 1000) as usize,
            ..Self::default()
        }
    }
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            threshold: Self::DEFAULT_THRESHOLD,
            silence_frames: Self::DEFAULT_SILENCE_FRAMES,
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerSettings {
    /// Frames pulled and written per sink write.
    pub chunk_size: usize,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_silence_window_is_fixed() {
        assert_eq!(DetectorSettings::default().silence_frames, 4410);
        assert_eq!(DetectorSettings::default().chunk_size, 1024);
    }

    #[test]
    fn silence_ms_override_uses_given_rate() {
        assert_eq!(DetectorSettings::with_silence_ms(48000, 100).silence_frames, 4800);
        assert_eq!(DetectorSettings::with_silence_ms(8000, 250).silence_frames, 2000);
        assert_eq!(DetectorSettings::with_silence_ms(8000, 250).threshold, 0.001);
    }

    #[test]
    fn empty_segment_falls_back_to_whole_stream() {
        let seg = LoopSegment::default().resolve(DegeneratePolicy::WholeStream, 500).unwrap();
        assert_eq!(seg, LoopSegment::new(0, 500));
    }

    #[test]
    fn empty_segment_fails_when_strict() {
        let res = LoopSegment::new(7, 7).resolve(DegeneratePolicy::Fail, 500);
        assert!(matches!(res, Err(LoopError::NoLoopFound)));
    }

    #[test]
    fn empty_stream_has_nothing_to_fall_back_to() {
        let res = LoopSegment::default().resolve(DegeneratePolicy::WholeStream, 0);
        assert!(res.is_err());
    }

    #[test]
    fn non_empty_segment_is_kept_as_is() {
        let seg = LoopSegment::new(1_000_000, 1_000_010);
        assert_eq!(seg.resolve(DegeneratePolicy::Fail, 100).unwrap(), seg);
        assert_eq!(seg.len(), 10);
    }
}
