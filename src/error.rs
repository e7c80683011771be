use thiserror::Error;

/// Failures reported by a [`SampleStream`](crate::stream::SampleStream).
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("seek to frame {index} is past the end of the stream ({len} frames)")]
    SeekOutOfRange { index: usize, len: usize },

    #[error("stream read failed: {0}")]
    Read(String),
}

/// Failures reported by a [`PcmSink`](crate::sink::PcmSink).
#[derive(Error, Debug)]
pub enum SinkError {
    #[error("audio output unavailable: {0}")]
    Device(String),

    #[error("buffer of {0} bytes is not whole 16-bit stereo frames")]
    Misaligned(usize),

    #[error("sink already finished")]
    Closed,

    #[error("wav write failed: {0}")]
    Wav(#[from] hound::Error),
}

#[derive(Error, Debug)]
pub enum PlayError {
    #[error("loop segment [{start}, {end}) is empty")]
    EmptySegment { start: usize, end: usize },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Error, Debug)]
pub enum LoopError {
    #[error("no silence-delimited loop segment found")]
    NoLoopFound,
}
