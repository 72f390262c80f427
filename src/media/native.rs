//! Pure-Rust backend.
//!
//! Video is stored as a "frame sequence": a directory named `*.frames`
//! holding `manifest.toml` and one PNG per frame. Audio lives next to the
//! frames as a WAV file. Standalone audio files are read with hound (WAV)
//! or symphonia (compressed formats).

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

use crate::error::{MediaError, Result};
use crate::media::audio::AudioBuffer;
use crate::media::engine::{FrameSink, FrameSource, MediaBackend, SinkSpec};
use crate::media::types::{Frame, MediaInfo};

pub const SEQUENCE_EXTENSION: &str = "frames";
const MANIFEST_FILE: &str = "manifest.toml";
const SEQUENCE_AUDIO_FILE: &str = "audio.wav";
const COMPRESSED_AUDIO: [&str; 5] = ["mp3", "flac", "ogg", "m4a", "aac"];

/// On-disk description of a frame sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceManifest {
    pub frame_rate: f64,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,

    /// Audio file inside the sequence directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio: Option<String>,

    /// Written last; a sequence without it was never finalised
    #[serde(default)]
    pub complete: bool,
}

impl SequenceManifest {
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(MANIFEST_FILE);
        let content = fs::read_to_string(&path).map_err(|e| MediaError::DecodeFailed {
            path: dir.display().to_string(),
            reason: format!("cannot read {}: {}", MANIFEST_FILE, e),
        })?;
        toml::from_str(&content).map_err(|e| {
            MediaError::DecodeFailed {
                path: dir.display().to_string(),
                reason: format!("bad manifest: {}", e),
            }
            .into()
        })
    }

    pub fn store(&self, dir: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| MediaError::EncodeFailed {
            path: dir.display().to_string(),
            reason: e.to_string(),
        })?;
        fs::write(dir.join(MANIFEST_FILE), content).map_err(|e| write_failed(dir, e))
    }
}

pub fn frame_file_name(index: u64) -> String {
    format!("frame_{:06}.png", index)
}

fn write_failed(path: &Path, e: impl std::fmt::Display) -> crate::error::EditorError {
    MediaError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    }
    .into()
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// Backend for frame sequences and audio files
#[derive(Debug, Default)]
pub struct NativeBackend;

impl NativeBackend {
    pub fn new() -> Self {
        Self
    }

    fn probe_sequence(&self, dir: &Path) -> Result<MediaInfo> {
        let manifest = SequenceManifest::load(dir)?;
        if !manifest.complete {
            return Err(MediaError::DecodeFailed {
                path: dir.display().to_string(),
                reason: "sequence is marked incomplete".to_string(),
            }
            .into());
        }
        if manifest.frame_rate <= 0.0 {
            return Err(MediaError::DecodeFailed {
                path: dir.display().to_string(),
                reason: format!("invalid frame rate {}", manifest.frame_rate),
            }
            .into());
        }

        let (audio_channels, sample_rate) = match &manifest.audio {
            Some(name) => {
                let reader = hound::WavReader::open(dir.join(name)).map_err(|e| MediaError::DecodeFailed {
                    path: dir.display().to_string(),
                    reason: format!("audio track: {}", e),
                })?;
                (reader.spec().channels, reader.spec().sample_rate)
            }
            None => (0, 0),
        };

        Ok(MediaInfo {
            path: dir.to_path_buf(),
            duration: manifest.frame_count as f64 / manifest.frame_rate,
            width: manifest.width,
            height: manifest.height,
            frame_rate: manifest.frame_rate,
            frame_count: manifest.frame_count,
            audio_channels,
            sample_rate,
            format: SEQUENCE_EXTENSION.to_string(),
        })
    }

    fn probe_audio_file(&self, path: &Path) -> Result<MediaInfo> {
        let audio = read_audio_file(path)?;
        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration: audio.duration(),
            width: 0,
            height: 0,
            frame_rate: 0.0,
            frame_count: 0,
            audio_channels: audio.channels,
            sample_rate: audio.sample_rate,
            format: extension_of(path),
        })
    }
}

impl MediaBackend for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn handles(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        ext == SEQUENCE_EXTENSION || ext == "wav" || COMPRESSED_AUDIO.contains(&ext.as_str())
    }

    fn writes(&self, path: &Path) -> bool {
        let ext = extension_of(path);
        ext == SEQUENCE_EXTENSION || ext == "wav"
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if extension_of(path) == SEQUENCE_EXTENSION {
            self.probe_sequence(path)
        } else {
            self.probe_audio_file(path)
        }
    }

    fn open_video(&self, info: &MediaInfo) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(SequenceSource { info: info.clone() }))
    }

    fn read_audio(&self, info: &MediaInfo) -> Result<Option<AudioBuffer>> {
        if extension_of(&info.path) != SEQUENCE_EXTENSION {
            return read_audio_file(&info.path).map(Some);
        }
        match SequenceManifest::load(&info.path)?.audio {
            Some(name) => read_wav(&info.path.join(name)).map(Some),
            None => Ok(None),
        }
    }

    fn create_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn FrameSink>> {
        if extension_of(path) != SEQUENCE_EXTENSION {
            return Err(MediaError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: "native video output must be a .frames sequence".to_string(),
            }
            .into());
        }
        Ok(Box::new(SequenceSink::create(path, spec)?))
    }

    fn write_audio(&self, path: &Path, audio: &AudioBuffer) -> Result<()> {
        match extension_of(path).as_str() {
            "wav" => write_wav(path, audio),
            other => Err(MediaError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: format!("cannot encode '{}' audio natively", other),
            }
            .into()),
        }
    }
}

/// Reads PNG frames out of a sequence directory
struct SequenceSource {
    info: MediaInfo,
}

impl FrameSource for SequenceSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame> {
        let decode_failed = |reason: String| MediaError::DecodeFailed {
            path: self.info.path.display().to_string(),
            reason,
        };

        if index >= self.info.frame_count {
            return Err(decode_failed(format!(
                "frame {} out of range ({} frames)",
                index, self.info.frame_count
            ))
            .into());
        }

        let path = self.info.path.join(frame_file_name(index));
        let image = image::open(&path).map_err(|e| decode_failed(format!("frame {}: {}", index, e)))?;
        let frame = Frame::new(image.to_rgb8());

        if frame.width() != self.info.width || frame.height() != self.info.height {
            return Err(decode_failed(format!(
                "frame {} is {}x{}, expected {}x{}",
                index,
                frame.width(),
                frame.height(),
                self.info.width,
                self.info.height
            ))
            .into());
        }
        Ok(frame)
    }
}

/// Writes PNG frames and finalises the manifest on `finish`
struct SequenceSink {
    dir: PathBuf,
    spec: SinkSpec,
    written: u64,
}

impl SequenceSink {
    fn create(dir: &Path, spec: SinkSpec) -> Result<Self> {
        if dir.exists() {
            fs::remove_dir_all(dir).map_err(|e| write_failed(dir, e))?;
        }
        fs::create_dir_all(dir).map_err(|e| write_failed(dir, e))?;

        let sink = Self {
            dir: dir.to_path_buf(),
            spec,
            written: 0,
        };
        // Incomplete manifest first so an interrupted write is recognisable
        sink.manifest(false).store(&sink.dir)?;
        debug!("Opened frame sequence sink at {:?}", sink.dir);
        Ok(sink)
    }

    fn manifest(&self, complete: bool) -> SequenceManifest {
        SequenceManifest {
            frame_rate: self.spec.frame_rate,
            width: self.spec.width,
            height: self.spec.height,
            frame_count: self.written,
            audio: self.spec.audio.as_ref().map(|_| SEQUENCE_AUDIO_FILE.to_string()),
            complete,
        }
    }
}

impl FrameSink for SequenceSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.spec.width || frame.height() != self.spec.height {
            return Err(MediaError::EncodeFailed {
                path: self.dir.display().to_string(),
                reason: format!(
                    "frame is {}x{}, sink expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.spec.width,
                    self.spec.height
                ),
            }
            .into());
        }

        let path = self.dir.join(frame_file_name(self.written));
        frame.save_png(&path).map_err(|e| write_failed(&path, e))?;
        self.written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<u64> {
        if let Some(audio) = &self.spec.audio {
            write_wav(&self.dir.join(SEQUENCE_AUDIO_FILE), audio)?;
        }
        self.manifest(true).store(&self.dir)?;
        Ok(self.written)
    }

    fn abort(self: Box<Self>) {
        debug!("Aborted frame sequence at {:?} after {} frames", self.dir, self.written);
    }
}

/// Read any supported audio file
pub fn read_audio_file(path: &Path) -> Result<AudioBuffer> {
    if extension_of(path) == "wav" {
        read_wav(path)
    } else {
        read_with_symphonia(path)
    }
}

fn read_wav(path: &Path) -> Result<AudioBuffer> {
    let decode_failed = |e: hound::Error| MediaError::DecodeFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let reader = hound::WavReader::open(path).map_err(decode_failed)?;
    let spec = reader.spec();

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .into_samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(decode_failed)?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(decode_failed)?
        }
    };

    Ok(AudioBuffer::new(samples, spec.sample_rate, spec.channels))
}

/// Write 32-bit float WAV
pub fn write_wav(path: &Path, audio: &AudioBuffer) -> Result<()> {
    let spec = hound::WavSpec {
        channels: audio.channels,
        sample_rate: audio.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer = hound::WavWriter::create(path, spec).map_err(|e| write_failed(path, e))?;
    for &sample in &audio.samples {
        writer.write_sample(sample).map_err(|e| write_failed(path, e))?;
    }
    writer.finalize().map_err(|e| write_failed(path, e))
}

fn read_with_symphonia(path: &Path) -> Result<AudioBuffer> {
    let decode_failed = |reason: String| MediaError::DecodeFailed {
        path: path.display().to_string(),
        reason,
    };

    let file = File::open(path).map_err(|e| decode_failed(e.to_string()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| MediaError::UnsupportedFormat {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| decode_failed("no decodable audio track".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| decode_failed("no sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| decode_failed("no channel layout".to_string()))?
        .count() as u16;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_failed(e.to_string()))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            // End of stream surfaces as an IO error
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(decode_failed(e.to_string()).into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(SymphoniaError::IoError(_)) => break,
            Err(e) => return Err(decode_failed(e.to_string()).into()),
        }
    }

    Ok(AudioBuffer::new(samples, sample_rate, channels))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use tempfile::tempdir;

    fn spec(width: u32, height: u32, audio: Option<AudioBuffer>) -> SinkSpec {
        SinkSpec {
            width,
            height,
            frame_rate: 10.0,
            codec: "png".to_string(),
            bitrate_kbps: 0,
            audio,
        }
    }

    #[test]
    fn test_sequence_write_then_probe() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("clip.frames");
        let backend = NativeBackend::new();

        let audio = AudioBuffer::silence(8000, 1, 0.5);
        let mut sink = backend.create_sink(&path, spec(4, 3, Some(audio))).unwrap();
        for v in 0..5u8 {
            sink.write_frame(&Frame::new_filled(4, 3, [v * 10, 0, 0])).unwrap();
        }
        assert_eq!(sink.finish().unwrap(), 5);

        let info = backend.probe(&path).unwrap();
        assert_eq!(info.frame_count, 5);
        assert!((info.duration - 0.5).abs() < 1e-9);
        assert_eq!(info.audio_channels, 1);

        let mut source = backend.open_video(&info).unwrap();
        assert_eq!(source.read_frame(3).unwrap().get_pixel(0, 0), [30, 0, 0]);
        assert_eq!(source.read_frame(5).unwrap_err().kind(), ErrorKind::DecodeFailure);

        let audio = backend.read_audio(&info).unwrap().unwrap();
        assert!((audio.duration() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_unfinished_sequence_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.frames");
        let backend = NativeBackend::new();

        let mut sink = backend.create_sink(&path, spec(2, 2, None)).unwrap();
        sink.write_frame(&Frame::new_black(2, 2)).unwrap();
        sink.abort();

        let err = backend.probe(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodeFailure);
    }

    #[test]
    fn test_sink_rejects_wrong_size() {
        let dir = tempdir().unwrap();
        let backend = NativeBackend::new();
        let mut sink = backend.create_sink(&dir.path().join("a.frames"), spec(2, 2, None)).unwrap();
        let err = sink.write_frame(&Frame::new_black(3, 2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EncodeFailure);
    }

    #[test]
    fn test_wav_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let audio = AudioBuffer::new(vec![0.25, -0.5, 0.75, 0.0], 4000, 2);

        write_wav(&path, &audio).unwrap();
        let info = NativeBackend::new().probe(&path).unwrap();
        assert_eq!(info.audio_channels, 2);
        assert!(!info.has_video());
        assert_eq!(read_audio_file(&path).unwrap(), audio);
    }
}
