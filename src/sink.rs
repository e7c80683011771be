use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

use log::debug;
use rodio::buffer::SamplesBuffer;
use rodio::queue::SourcesQueueInput;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::error::SinkError;

/// Output always carries two channels.
pub const CHANNELS: u16 = 2;

/// Bytes per interleaved 16-bit stereo frame.
pub const FRAME_BYTES: usize = 4;

/// Accepts 16-bit little-endian signed PCM, channel-interleaved (L, R).
pub trait PcmSink {
    /// Blocks until `bytes` has been accepted.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError>;

    /// Flushes whatever is still buffered. Nothing may be written afterwards.
    fn finish(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

fn check_aligned(bytes: &[u8]) -> Result<(), SinkError> {
    if bytes.len() % FRAME_BYTES != 0 {
        return Err(SinkError::Misaligned(bytes.len()));
    }
    Ok(())
}

fn decode_i16(bytes: &[u8]) -> impl Iterator<Item = i16> + '_ {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
}

/// Completion signals for buffers handed to the output queue, oldest first.
#[derive(Debug, Default)]
pub struct Backlog {
    pending: VecDeque<Receiver<()>>,
}

impl Backlog {
    pub fn push(&mut self, done: Receiver<()>) {
        self.pending.push_back(done);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Blocks until no more than `max` buffers are still waiting to play.
    /// A dropped sender means the buffer will never play, which counts as done.
    pub fn wait_until_at_most(&mut self, max: usize) {
        while self.pending.len() > max {
            if let Some(done) = self.pending.pop_front() {
                let _ = done.recv();
            }
        }
    }
}

/// Plays through the default output device.
pub struct RodioSink {
    // Dropping the stream silences the sink, so it lives as long as we do.
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    _sink: Sink,
    queue: Arc<SourcesQueueInput<i16>>,
    backlog: Backlog,
    sample_rate: u32,
    max_queued: usize,
}

impl RodioSink {
    /// Buffers allowed in rodio's queue before `write` starts blocking.
    pub const DEFAULT_MAX_QUEUED: usize = 4;

    pub fn try_default(sample_rate: u32) -> Result<Self, SinkError> {
        let (stream, handle) =
            OutputStream::try_default().map_err(|e| SinkError::Device(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| SinkError::Device(e.to_string()))?;
        // Kept alive when empty so a late write does not end playback.
        let (queue, output) = rodio::queue::queue(true);
        sink.append(output);
        debug!("opened default output at {sample_rate} Hz");
        Ok(Self {
            _stream: stream,
            _handle: handle,
            _sink: sink,
            queue,
            backlog: Backlog::default(),
            sample_rate,
            max_queued: Self::DEFAULT_MAX_QUEUED,
        })
    }
}

impl PcmSink for RodioSink {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        check_aligned(bytes)?;
        let samples: Vec<i16> = decode_i16(bytes).collect();
        let done = self
            .queue
            .append_with_signal(SamplesBuffer::new(CHANNELS, self.sample_rate, samples));
        self.backlog.push(done);
        self.backlog.wait_until_at_most(self.max_queued);
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        self.backlog.wait_until_at_most(0);
        Ok(())
    }
}

fn wav_spec(sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels: CHANNELS,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    }
}

/// Writes a 16-bit stereo WAV.
pub struct WavSink<W: Write + Seek> {
    writer: Option<hound::WavWriter<W>>,
}

impl<W: Write + Seek> WavSink<W> {
    pub fn new(inner: W, sample_rate: u32) -> Result<Self, SinkError> {
        Ok(Self {
            writer: Some(hound::WavWriter::new(inner, wav_spec(sample_rate))?),
        })
    }
}

impl WavSink<BufWriter<File>> {
    pub fn create<P: AsRef<Path>>(path: P, sample_rate: u32) -> Result<Self, SinkError> {
        Ok(Self {
            writer: Some(hound::WavWriter::create(path, wav_spec(sample_rate))?),
        })
    }
}

impl<W: Write + Seek> PcmSink for WavSink<W> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SinkError> {
        check_aligned(bytes)?;
        let writer = self.writer.as_mut().ok_or(SinkError::Closed)?;
        for sample in decode_i16(bytes) {
            writer.write_sample(sample)?;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<(), SinkError> {
        if let Some(writer) = self.writer.take() {
            writer.finalize()?;
        }
        Ok(())
    }
}
