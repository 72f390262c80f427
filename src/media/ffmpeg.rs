//! Backend driving the `ffmpeg` / `ffprobe` command-line tools.
//!
//! Frames travel as raw rgb24 over pipes, audio as f32le. Nothing is linked
//! against libav, so the crate builds without FFmpeg development headers.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{MediaError, Result};
use crate::media::audio::AudioBuffer;
use crate::media::engine::{FrameSink, FrameSource, MediaBackend, SinkSpec};
use crate::media::native::write_wav;
use crate::media::types::{Frame, MediaInfo};

/// Forward seeks shorter than this many seconds decode through instead of respawning
const MAX_SKIP_SECONDS: f64 = 2.0;

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegBackend {
    pub fn new(ffmpeg: &str, ffprobe: &str) -> Self {
        Self {
            ffmpeg: ffmpeg.to_string(),
            ffprobe: ffprobe.to_string(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.ffmpeg)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|status| status.success())
            .unwrap_or(false)
    }

    fn spawn_failed(&self, path: &Path, e: std::io::Error) -> crate::error::EditorError {
        MediaError::EngineUnavailable {
            reason: format!("failed to run {} for {}: {}", self.ffmpeg, path.display(), e),
        }
        .into()
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    channels: Option<u16>,
    sample_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    format_name: Option<String>,
    duration: Option<String>,
}

/// Collect a child's stderr on a helper thread so a chatty ffmpeg never
/// stalls on a full pipe while we are feeding its stdin
fn drain_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut pipe = child.stderr.take()?;
    Some(thread::spawn(move || {
        let mut text = String::new();
        let _ = pipe.read_to_string(&mut text);
        text
    }))
}

fn collect_stderr(drain: Option<JoinHandle<String>>) -> String {
    drain
        .and_then(|handle| handle.join().ok())
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Parse ffprobe's "30000/1001" style rates
fn parse_rate(rate: &str) -> Option<f64> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            (den > 0.0).then(|| num / den)
        }
        None => rate.trim().parse().ok(),
    }
}

fn codec_for(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "h265" | "hevc" => "libx265",
        "vp9" => "libvpx-vp9",
        "av1" => "libaom-av1",
        other => other,
    }
}

impl MediaBackend for FfmpegBackend {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension().is_some()
    }

    fn probe(&self, path: &Path) -> Result<MediaInfo> {
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path)
            .output()
            .map_err(|e| self.spawn_failed(path, e))?;

        if !output.status.success() {
            return Err(MediaError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let probe: ProbeOutput =
            serde_json::from_slice(&output.stdout).map_err(|e| MediaError::DecodeFailed {
                path: path.display().to_string(),
                reason: format!("unreadable ffprobe output: {}", e),
            })?;

        let video = probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("video"));
        let audio = probe.streams.iter().find(|s| s.codec_type.as_deref() == Some("audio"));

        if video.is_none() && audio.is_none() {
            return Err(MediaError::UnsupportedFormat {
                path: path.display().to_string(),
                reason: "no audio or video streams".to_string(),
            }
            .into());
        }

        let duration = probe
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .or_else(|| video.and_then(|v| v.duration.as_deref()))
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let frame_rate = video
            .and_then(|v| v.r_frame_rate.as_deref())
            .and_then(parse_rate)
            .unwrap_or(0.0);

        let frame_count = video
            .and_then(|v| v.nb_frames.as_deref())
            .and_then(|n| n.parse::<u64>().ok())
            .unwrap_or_else(|| (duration * frame_rate).round() as u64);

        Ok(MediaInfo {
            path: path.to_path_buf(),
            duration,
            width: video.and_then(|v| v.width).unwrap_or(0),
            height: video.and_then(|v| v.height).unwrap_or(0),
            frame_rate,
            frame_count: if video.is_some() { frame_count } else { 0 },
            audio_channels: audio.and_then(|a| a.channels).unwrap_or(0),
            sample_rate: audio
                .and_then(|a| a.sample_rate.as_deref())
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
            format: probe
                .format
                .and_then(|f| f.format_name)
                .unwrap_or_else(|| "unknown".to_string()),
        })
    }

    fn open_video(&self, info: &MediaInfo) -> Result<Box<dyn FrameSource>> {
        Ok(Box::new(FfmpegSource {
            ffmpeg: self.ffmpeg.clone(),
            info: info.clone(),
            process: None,
            next_index: 0,
        }))
    }

    fn read_audio(&self, info: &MediaInfo) -> Result<Option<AudioBuffer>> {
        let channels = info.audio_channels.max(1);
        let sample_rate = if info.sample_rate > 0 { info.sample_rate } else { 44100 };

        let output = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(&info.path)
            .args(["-vn", "-f", "f32le", "-ac", &channels.to_string(), "-ar", &sample_rate.to_string(), "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| self.spawn_failed(&info.path, e))?;

        if !output.status.success() {
            return Err(MediaError::DecodeFailed {
                path: info.path.display().to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }
            .into());
        }

        let samples = output
            .stdout
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Ok(Some(AudioBuffer::new(samples, sample_rate, channels)))
    }

    fn create_sink(&self, path: &Path, spec: SinkSpec) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(FfmpegSink::spawn(&self.ffmpeg, path, spec)?))
    }

    fn write_audio(&self, path: &Path, audio: &AudioBuffer) -> Result<()> {
        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-v", "error", "-f", "f32le"])
            .args(["-ar", &audio.sample_rate.to_string(), "-ac", &audio.channels.to_string()])
            .args(["-i", "-"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_failed(path, e))?;
        let drain = drain_stderr(&mut child);

        let bytes: Vec<u8> = audio.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(&bytes),
            None => Ok(()),
        };
        let status = child.wait()?;
        let stderr = collect_stderr(drain);

        if let Err(e) = written {
            return Err(MediaError::WriteFailed {
                path: path.display().to_string(),
                reason: format!("{}: {}", e, stderr),
            }
            .into());
        }
        if !status.success() {
            return Err(MediaError::EncodeFailed {
                path: path.display().to_string(),
                reason: stderr,
            }
            .into());
        }
        Ok(())
    }
}

/// Sequential rgb24 decoder; seeks by restarting ffmpeg at the target time
struct FfmpegSource {
    ffmpeg: String,
    info: MediaInfo,
    process: Option<(Child, ChildStdout)>,
    next_index: u64,
}

impl FfmpegSource {
    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    fn restart_at(&mut self, index: u64) -> Result<()> {
        self.stop();
        let seconds = index as f64 / self.info.frame_rate.max(f64::EPSILON);
        debug!("Seeking {:?} to frame {} ({:.3}s)", self.info.path, index, seconds);

        let mut child = Command::new(&self.ffmpeg)
            .args(["-v", "error", "-ss", &format!("{:.6}", seconds), "-i"])
            .arg(&self.info.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| MediaError::EngineUnavailable {
                reason: format!("failed to run {}: {}", self.ffmpeg, e),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| MediaError::DecodeFailed {
            path: self.info.path.display().to_string(),
            reason: "ffmpeg stdout unavailable".to_string(),
        })?;
        self.process = Some((child, stdout));
        self.next_index = index;
        Ok(())
    }

    fn read_next(&mut self) -> Result<Frame> {
        let size = self.frame_bytes();
        let (width, height) = (self.info.width, self.info.height);
        let path = self.info.path.display().to_string();
        let (_, stdout) = self.process.as_mut().ok_or_else(|| MediaError::DecodeFailed {
            path: path.clone(),
            reason: "decoder not running".to_string(),
        })?;

        let mut data = vec![0u8; size];
        stdout.read_exact(&mut data).map_err(|e| MediaError::DecodeFailed {
            path: path.clone(),
            reason: format!("frame {}: {}", self.next_index, e),
        })?;
        self.next_index += 1;

        Frame::from_rgb_bytes(width, height, data).ok_or_else(|| {
            MediaError::DecodeFailed {
                path,
                reason: "frame buffer size mismatch".to_string(),
            }
            .into()
        })
    }

    fn stop(&mut self) {
        if let Some((mut child, _)) = self.process.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

impl FrameSource for FfmpegSource {
    fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn read_frame(&mut self, index: u64) -> Result<Frame> {
        let max_skip = (MAX_SKIP_SECONDS * self.info.frame_rate).ceil() as u64;
        if self.process.is_none() || index < self.next_index || index > self.next_index + max_skip {
            self.restart_at(index)?;
        }
        while self.next_index < index {
            self.read_next()?;
        }
        self.read_next()
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// rgb24 frames piped into an encoding ffmpeg process
struct FfmpegSink {
    path: PathBuf,
    child: Child,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    audio_file: Option<PathBuf>,
    spec: SinkSpec,
    written: u64,
}

impl FfmpegSink {
    fn spawn(ffmpeg: &str, path: &Path, spec: SinkSpec) -> Result<Self> {
        let audio_file = match &spec.audio {
            Some(audio) => {
                let file_name = format!(
                    ".{}.audio.wav",
                    path.file_name().and_then(|n| n.to_str()).unwrap_or("output")
                );
                let audio_path = path.with_file_name(file_name);
                write_wav(&audio_path, audio)?;
                Some(audio_path)
            }
            None => None,
        };

        let mut cmd = Command::new(ffmpeg);
        cmd.args(["-y", "-v", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", spec.width, spec.height)])
            .args(["-r", &spec.frame_rate.to_string()])
            .args(["-i", "-"]);
        if let Some(audio_path) = &audio_file {
            cmd.arg("-i").arg(audio_path);
        }
        cmd.args(["-c:v", codec_for(&spec.codec), "-pix_fmt", "yuv420p"]);
        if spec.bitrate_kbps > 0 {
            cmd.args(["-b:v", &format!("{}k", spec.bitrate_kbps)]);
        }
        if audio_file.is_some() {
            cmd.args(["-c:a", "aac", "-shortest"]);
        }
        cmd.arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                if let Some(audio_path) = &audio_file {
                    let _ = std::fs::remove_file(audio_path);
                }
                return Err(MediaError::EngineUnavailable {
                    reason: format!("failed to run {}: {}", ffmpeg, e),
                }
                .into());
            }
        };
        let stdin = child.stdin.take();
        let stderr = drain_stderr(&mut child);

        debug!("Spawned ffmpeg encoder for {:?}", path);
        Ok(Self {
            path: path.to_path_buf(),
            child,
            stdin,
            stderr,
            audio_file,
            spec,
            written: 0,
        })
    }

    fn remove_audio_file(&mut self) {
        if let Some(audio_path) = self.audio_file.take() {
            if let Err(e) = std::fs::remove_file(&audio_path) {
                warn!("Failed to remove temporary audio {:?}: {}", audio_path, e);
            }
        }
    }
}

impl FrameSink for FfmpegSink {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.spec.width || frame.height() != self.spec.height {
            return Err(MediaError::EncodeFailed {
                path: self.path.display().to_string(),
                reason: format!(
                    "frame is {}x{}, encoder expects {}x{}",
                    frame.width(),
                    frame.height(),
                    self.spec.width,
                    self.spec.height
                ),
            }
            .into());
        }

        let stdin = self.stdin.as_mut().ok_or_else(|| MediaError::EncodeFailed {
            path: self.path.display().to_string(),
            reason: "encoder input closed".to_string(),
        })?;
        stdin.write_all(frame.as_rgb_bytes()).map_err(|e| MediaError::EncodeFailed {
            path: self.path.display().to_string(),
            reason: format!("encoder pipe: {}", e),
        })?;
        self.written += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        // Closing stdin tells ffmpeg the stream is over
        drop(self.stdin.take());
        let status = self.child.wait();
        let stderr = collect_stderr(self.stderr.take());
        self.remove_audio_file();

        if !status?.success() {
            return Err(MediaError::EncodeFailed {
                path: self.path.display().to_string(),
                reason: stderr,
            }
            .into());
        }
        Ok(self.written)
    }

    fn abort(mut self: Box<Self>) {
        drop(self.stdin.take());
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = collect_stderr(self.stderr.take());
        self.remove_audio_file();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate() {
        assert_eq!(parse_rate("30/1"), Some(30.0));
        assert!((parse_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert_eq!(parse_rate("25"), Some(25.0));
        assert_eq!(parse_rate("0/0"), None);
    }

    #[test]
    fn test_codec_mapping() {
        assert_eq!(codec_for("h264"), "libx264");
        assert_eq!(codec_for("prores_ks"), "prores_ks");
    }

    #[cfg(unix)]
    #[test]
    fn test_stderr_is_drained_while_child_runs() {
        // Far more than a pipe buffer holds; without draining the child never exits
        let mut child = Command::new("sh")
            .args(["-c", "head -c 1000000 /dev/zero | tr '\\0' x >&2"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .unwrap();
        let drain = drain_stderr(&mut child);
        assert!(child.wait().unwrap().success());
        assert_eq!(collect_stderr(drain).len(), 1_000_000);
    }

    #[test]
    fn test_failed_spawn_removes_temporary_audio() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("clip.mp4");
        let spec = SinkSpec {
            width: 4,
            height: 4,
            frame_rate: 10.0,
            codec: "h264".into(),
            bitrate_kbps: 0,
            audio: Some(AudioBuffer::new(vec![0.0; 800], 8000, 1)),
        };

        let err = FfmpegSink::spawn("videosnap-no-such-ffmpeg", &output, spec).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::EngineUnavailable);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_missing_binary_is_unavailable() {
        let backend = FfmpegBackend::new("videosnap-no-such-ffmpeg", "videosnap-no-such-ffprobe");
        assert!(!backend.is_available());
    }
}
