//! Screencast frame-timing math and video-container selection (spec.md
//! §4.4 `save_screen_record`).
//!
//! Turning a JPEG/PNG frame into actual MJPG/FLV1/mp4v container bytes is an
//! out-of-scope external collaborator (spec.md §1); this module owns only
//! what the spec's testable properties and literal scenario 6 pin down: the
//! frame-duplication arithmetic and the container choice by file suffix.
//! The `ScreencastEncoder` trait is the seam a caller plugs a real encoder
//! (e.g. backed by a video-writing crate) into.

use std::path::Path;

use crate::error::Result;

/// A screencast frame as delivered by `Page.screencastFrame`: a timestamp
/// and the raw (already base64-decoded) image bytes.
#[derive(Debug, Clone)]
pub struct ScreencastFrame {
    pub timestamp: f64,
    pub data: Vec<u8>,
}

/// Picked from the output path's suffix (spec.md §4.4): `.flv` → FLV1,
/// `.mp4` → mp4v, anything else → MJPG.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Flv1,
    Mp4v,
    Mjpg,
}

impl VideoCodec {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("flv") => VideoCodec::Flv1,
            Some(ext) if ext.eq_ignore_ascii_case("mp4") => VideoCodec::Mp4v,
            _ => VideoCodec::Mjpg,
        }
    }
}

/// Expands a frame buffer into the sequence of frame indices to actually
/// write at `fps`: for consecutive frames whose `Δts > 1/fps`, the earlier
/// frame is duplicated `⌊Δts·fps⌋ − 1` times (spec.md §4.4, verified against
/// §8 scenario 6).
pub fn expand_frame_sequence(frames: &[ScreencastFrame], fps: f64) -> Vec<usize> {
    let mut out = Vec::new();
    let period = 1.0 / fps;
    for i in 0..frames.len() {
        out.push(i);
        if let Some(next) = frames.get(i + 1) {
            let dt = next.timestamp - frames[i].timestamp;
            if dt > period {
                let extra = (dt * fps).floor() as i64 - 1;
                for _ in 0..extra.max(0) {
                    out.push(i);
                }
            }
        }
    }
    out
}

/// `expand_frame_sequence` resolved to the actual byte slices, in write
/// order.
pub fn expand_frames(frames: &[ScreencastFrame], fps: f64) -> Vec<&[u8]> {
    expand_frame_sequence(frames, fps)
        .into_iter()
        .map(|i| frames[i].data.as_slice())
        .collect()
}

/// Materializes a sequence of frames into a video container at `path`.
pub trait ScreencastEncoder: Send + Sync {
    fn encode(&self, path: &Path, frames: &[&[u8]], fps: u32, codec: VideoCodec) -> Result<()>;
}

/// Satisfies the trait boundary without shipping a real encoder — the spec
/// treats container encoding as an injected external collaborator
/// (spec.md §1). Install a concrete `ScreencastEncoder` to actually write a
/// file.
#[derive(Debug, Default)]
pub struct UnimplementedEncoder;

impl ScreencastEncoder for UnimplementedEncoder {
    fn encode(&self, _path: &Path, _frames: &[&[u8]], _fps: u32, _codec: VideoCodec) -> Result<()> {
        Err(crate::error::CdpError::Other(
            "no ScreencastEncoder installed; inject one to materialize a video container".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(ts: f64) -> ScreencastFrame {
        ScreencastFrame { timestamp: ts, data: vec![ts as u8] }
    }

    #[test]
    fn duplicates_frame_held_across_a_gap() {
        // spec.md §8 scenario 6: t=0.0 and t=0.50 at fps=10.
        let frames = vec![frame(0.0), frame(0.50)];
        let seq = expand_frame_sequence(&frames, 10.0);
        assert_eq!(seq, vec![0, 0, 0, 0, 0, 1]);
    }

    #[test]
    fn no_duplication_within_one_frame_period() {
        let frames = vec![frame(0.0), frame(0.05), frame(0.10)];
        let seq = expand_frame_sequence(&frames, 10.0);
        assert_eq!(seq, vec![0, 1, 2]);
    }

    #[test]
    fn codec_selection_by_suffix() {
        assert_eq!(VideoCodec::for_path(Path::new("out.flv")), VideoCodec::Flv1);
        assert_eq!(VideoCodec::for_path(Path::new("out.mp4")), VideoCodec::Mp4v);
        assert_eq!(VideoCodec::for_path(Path::new("out.avi")), VideoCodec::Mjpg);
    }
}
