use crate::error::StreamError;

/// One stereo frame: left and right amplitude.
pub type Frame = [f32; 2];

/// Pull-based, seekable cursor over decoded stereo frames.
pub trait SampleStream {
    /// Fills the front of `buf` and returns how many frames were written.
    /// `Ok(0)` means the cursor is at the end of the stream.
    fn stream(&mut self, buf: &mut [Frame]) -> Result<usize, StreamError>;

    /// Moves the cursor to an absolute frame index.
    fn seek(&mut self, index: usize) -> Result<(), StreamError>;

    fn sample_rate(&self) -> u32;

    /// Total frames in the stream.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fully decoded audio held in memory, so any frame can be sought to exactly.
#[derive(Clone, Debug)]
pub struct PcmStream {
    frames: Vec<Frame>,
    sample_rate: u32,
    cursor: usize,
}

impl PcmStream {
    pub fn new(frames: Vec<Frame>, sample_rate: u32) -> Self {
        Self {
            frames,
            sample_rate,
            cursor: 0,
        }
    }
}

impl SampleStream for PcmStream {
    fn stream(&mut self, buf: &mut [Frame]) -> Result<usize, StreamError> {
        let remaining = &self.frames[self.cursor..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.cursor += n;
        Ok(n)
    }

    /// Seeking past the end parks the cursor at the end and reports the error.
    fn seek(&mut self, index: usize) -> Result<(), StreamError> {
        let len = self.frames.len();
        if index > len {
            self.cursor = len;
            return Err(StreamError::SeekOutOfRange { index, len });
        }
        self.cursor = index;
        Ok(())
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn len(&self) -> usize {
        self.frames.len()
    }
}
