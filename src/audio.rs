use anyhow::{bail, Context, Result};
use log::{debug, warn};
use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::{MetadataOptions, StandardTagKey};
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use crate::stream::{Frame, PcmStream};

/// A decoded track, already folded to stereo frames.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub frames: Vec<Frame>,
    pub sample_rate: u32,
    /// Channel count of the source before folding to stereo.
    pub channels: u16,
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
}

impl AudioData {
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / f64::from(self.sample_rate)
    }

    pub fn into_stream(self) -> PcmStream {
        PcmStream::new(self.frames, self.sample_rate)
    }
}

// Mono is duplicated to both sides; anything wider keeps its first two channels.
fn push_frames<S: Sample>(buf: &AudioBuffer<S>, to_f32: impl Fn(S) -> f32, out: &mut Vec<Frame>) {
    let channels = buf.spec().channels.count();
    if channels == 0 {
        return;
    }
    let left = buf.chan(0);
    let right = if channels > 1 { buf.chan(1) } else { left };
    out.extend(
        left.iter()
            .zip(right.iter())
            .map(|(&l, &r)| [to_f32(l), to_f32(r)]),
    );
}

fn append_decoded(decoded: AudioBufferRef<'_>, out: &mut Vec<Frame>) {
    match decoded {
        AudioBufferRef::F32(buf) => push_frames(&*buf, |s| s, out),
        AudioBufferRef::F64(buf) => push_frames(&*buf, |s| s as f32, out),
        AudioBufferRef::S8(buf) => push_frames(&*buf, |s| f32::from(s) / 128.0, out),
        AudioBufferRef::S16(buf) => push_frames(&*buf, |s| f32::from(s) / 32768.0, out),
        AudioBufferRef::S24(buf) => push_frames(&*buf, |s| s.inner() as f32 / 8388608.0, out),
        AudioBufferRef::S32(buf) => push_frames(&*buf, |s| s as f32 / 2147483648.0, out),
        AudioBufferRef::U8(buf) => push_frames(&*buf, |s| (f32::from(s) - 128.0) / 128.0, out),
        AudioBufferRef::U16(buf) => push_frames(&*buf, |s| (f32::from(s) - 32768.0) / 32768.0, out),
        AudioBufferRef::U24(buf) => {
            push_frames(&*buf, |s| (s.inner() as f32 - 8388608.0) / 8388608.0, out)
        }
        AudioBufferRef::U32(buf) => {
            push_frames(&*buf, |s| ((f64::from(s) - 2147483648.0) / 2147483648.0) as f32, out)
        }
    }
}

/// Decodes the first audio track of `source` completely into memory.
pub fn load_audio_from_source(source: Box<dyn MediaSource>, hint: &Hint) -> Result<AudioData> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut probed = symphonia::default::get_probe()
        .format(hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .context("unsupported format")?;

    let mut title = None;
    let mut artist = None;
    let mut album = None;
    if let Some(metadata) = probed.format.metadata().current() {
        for tag in metadata.tags() {
            match tag.std_key {
                Some(StandardTagKey::TrackTitle) => title = Some(tag.value.to_string()),
                Some(StandardTagKey::Artist) => artist = Some(tag.value.to_string()),
                Some(StandardTagKey::Album) => album = Some(tag.value.to_string()),
                _ => (),
            }
        }
    }

    let mut format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("no supported audio track")?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("unsupported codec")?;

    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);
    let mut frames: Vec<Frame> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(Error::IoError(_)) => break,
            Err(Error::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => {
                warn!("stopping decode early: {e}");
                break;
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                sample_rate = decoded.spec().rate;
                channels = decoded.spec().channels.count() as u16;
                append_decoded(decoded, &mut frames);
            }
            Err(Error::DecodeError(e)) => debug!("skipping undecodable packet: {e}"),
            Err(e) => {
                warn!("stopping decode early: {e}");
                break;
            }
        }
    }

    if sample_rate == 0 {
        bail!("track has no sample rate");
    }

    debug!(
        "decoded {} frames at {} Hz from {} channel(s)",
        frames.len(),
        sample_rate,
        channels
    );

    Ok(AudioData {
        frames,
        sample_rate,
        channels,
        title,
        artist,
        album,
    })
}

pub fn load_audio_file<P: AsRef<Path>>(path: P) -> Result<AudioData> {
    let src = File::open(&path).context("failed to open audio file")?;

    let mut hint = Hint::new();
    if let Some(ext) = path.as_ref().extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    load_audio_from_source(Box::new(src), &hint)
}

pub fn load_audio_from_bytes(data: Vec<u8>, extension_hint: Option<&str>) -> Result<AudioData> {
    let src = Cursor::new(data);

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    load_audio_from_source(Box::new(src), &hint)
}
