//! Timeline editing operations on single media resources.

use tracing::{debug, info};

use crate::error::{Result, TimelineError};
use crate::media::{mix_buffers, AudioBuffer, Engine, MediaHandle};
use crate::timeline::segment::{check_range, Segment, TIME_EPSILON};
use crate::timeline::{snap_to_frame, Timeline};

/// Layout used for silence when no input carries audio
const FALLBACK_SAMPLE_RATE: u32 = 44100;
const FALLBACK_CHANNELS: u16 = 2;

/// Timeline holding `[start, end)` of `media`
pub fn trim(media: &MediaHandle, start: f64, end: f64) -> Result<Timeline> {
    check_range(start, end, media.duration)?;
    debug!("Trimming {:?} to [{:.3}, {:.3})", media.path(), start, end);

    let mut timeline = Timeline::new();
    timeline.add(Segment::new(media.clone(), start, end)?)?;
    Ok(timeline)
}

/// Two independent timelines covering `[0, point)` and `[point, duration)`
///
/// For media with video the point snaps to the nearest frame boundary so
/// the halves hold whole frames and re-join to the original length.
pub fn split(media: &MediaHandle, point: f64) -> Result<(Timeline, Timeline)> {
    let duration = media.duration;
    let snapped = if media.has_video() {
        snap_to_frame(point, media.frame_rate)
    } else {
        point
    };

    if !snapped.is_finite() || snapped <= TIME_EPSILON || snapped >= duration - TIME_EPSILON {
        return Err(TimelineError::InvalidRange {
            start: point,
            end: duration,
            duration,
        }
        .into());
    }
    if (snapped - point).abs() > TIME_EPSILON {
        debug!("Split point {:.6}s snapped to frame boundary {:.6}s", point, snapped);
    }

    let mut first = Timeline::new();
    first.add(Segment::new(media.clone(), 0.0, snapped)?)?;
    let mut second = Timeline::new();
    second.add(Segment::new(media.clone(), snapped, duration)?)?;
    Ok((first, second))
}

/// Sum the audio of several resources aligned at time zero
///
/// Shorter streams are padded with silence to the longest; resources without
/// an audio track contribute silence for their duration. With `normalize`
/// the mix is scaled down when it would clip.
pub fn mix_audio(engine: &Engine, media: &[MediaHandle], normalize: bool) -> Result<AudioBuffer> {
    if media.is_empty() {
        return Err(TimelineError::EmptyInput {
            what: "no media to mix".to_string(),
        }
        .into());
    }

    let mut tracks = Vec::with_capacity(media.len());
    let mut silent = Vec::new();
    for handle in media {
        match engine.read_audio(handle.info())? {
            Some(audio) => tracks.push(audio),
            None => silent.push(handle.duration),
        }
    }

    let sample_rate = tracks.iter().map(|t| t.sample_rate).max().unwrap_or(FALLBACK_SAMPLE_RATE);
    let channels = tracks.iter().map(|t| t.channels).max().unwrap_or(FALLBACK_CHANNELS);
    for duration in silent {
        tracks.push(AudioBuffer::silence(sample_rate, channels, duration));
    }

    let mixed = mix_buffers(&tracks, normalize).ok_or_else(|| TimelineError::EmptyInput {
        what: "no audio to mix".to_string(),
    })?;
    info!(
        "Mixed {} tracks into {:.3}s at {} Hz, {} ch",
        tracks.len(),
        mixed.duration(),
        mixed.sample_rate,
        mixed.channels
    );
    Ok(mixed)
}
