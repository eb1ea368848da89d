//! `PageHandler::save_screen_record` exercised end to end against an
//! injected `ScreencastEncoder`: quiescence wait plus container selection
//! by path suffix.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use remote_debug_cdp::handler::page::PageHandler;
use remote_debug_cdp::video::{ScreencastEncoder, VideoCodec};
use remote_debug_cdp::Result;

#[derive(Default)]
struct CapturingEncoder {
    calls: Mutex<Vec<(PathBuf, usize, u32, VideoCodec)>>,
}

impl ScreencastEncoder for CapturingEncoder {
    fn encode(&self, path: &Path, frames: &[&[u8]], fps: u32, codec: VideoCodec) -> Result<()> {
        self.calls.lock().unwrap().push((path.to_path_buf(), frames.len(), fps, codec));
        Ok(())
    }
}

#[test]
fn save_screen_record_picks_codec_by_suffix_with_no_buffered_frames() {
    let handler = PageHandler::default();
    let encoder = CapturingEncoder::default();

    handler.save_screen_record("out.mp4", &encoder).unwrap();

    let calls = encoder.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (path, frame_count, fps, codec) = &calls[0];
    assert_eq!(path, Path::new("out.mp4"));
    assert_eq!(*frame_count, 0);
    assert_eq!(*fps, 10);
    assert_eq!(*codec, VideoCodec::Mp4v);
}

#[test]
fn save_screen_record_falls_back_to_mjpg_for_unknown_suffix() {
    let handler = PageHandler::default();
    let encoder = CapturingEncoder::default();

    handler.save_screen_record("out.avi", &encoder).unwrap();

    let calls = encoder.calls.lock().unwrap();
    assert_eq!(calls[0].3, VideoCodec::Mjpg);
}
