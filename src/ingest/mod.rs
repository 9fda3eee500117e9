//! Frame ingestion sources.
//!
//! A session's source is one of:
//! - a local video file path
//! - a camera device index
//! - a network stream URL (RTSP/HTTP)
//! - a `stub://` synthetic scene (tests and demo builds)
//!
//! Real decode goes through FFmpeg (`ingest-ffmpeg` feature); one backend
//! covers all three real source kinds through the same decode loop. Sources
//! produce BGR24 frames with capture timestamps and sequence numbers.
//! End of stream is a normal `Ok(None)`, not an error; failure to open the
//! source is fatal to the session before the loop starts.

#[cfg(feature = "ingest-ffmpeg")]
mod ffmpeg;

use anyhow::{anyhow, Result};
use std::fmt;

use crate::config::IngestSettings;
use crate::frame::Frame;
use crate::now_s;

const STUB_SCHEME: &str = "stub://";

/// Parsed session input.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceSpec {
    File(String),
    Camera(u32),
    Network(String),
}

impl SourceSpec {
    /// Parse operator input. Empty or whitespace-only input is rejected
    /// here, at the session-start boundary, before any source is opened.
    pub fn parse(input: &str) -> Result<SourceSpec> {
        let input = input.trim();
        if input.is_empty() {
            return Err(anyhow!("source must not be empty"));
        }
        if let Ok(index) = input.parse::<u32>() {
            return Ok(SourceSpec::Camera(index));
        }
        if input.contains("://") {
            return Ok(SourceSpec::Network(input.to_string()));
        }
        Ok(SourceSpec::File(input.to_string()))
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceSpec::File(path) => write!(f, "file:{}", path),
            SourceSpec::Camera(index) => write!(f, "camera:{}", index),
            SourceSpec::Network(url) => f.write_str(url),
        }
    }
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub descriptor: String,
}

/// A session's frame source.
pub struct FrameSource {
    backend: SourceBackend,
}

enum SourceBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(ffmpeg::FfmpegSource),
}

impl FrameSource {
    /// Open the source. Failure here is fatal to the session.
    pub fn open(spec: &SourceSpec, settings: &IngestSettings) -> Result<FrameSource> {
        if let SourceSpec::Network(url) = spec {
            if url.starts_with(STUB_SCHEME) {
                return Ok(FrameSource {
                    backend: SourceBackend::Synthetic(SyntheticSource::new(url, settings)?),
                });
            }
        }

        #[cfg(feature = "ingest-ffmpeg")]
        {
            Ok(FrameSource {
                backend: SourceBackend::Ffmpeg(ffmpeg::FfmpegSource::open(spec, settings)?),
            })
        }
        #[cfg(not(feature = "ingest-ffmpeg"))]
        {
            Err(anyhow!(
                "source '{}' requires the ingest-ffmpeg feature",
                spec
            ))
        }
    }

    /// Capture the next frame. `Ok(None)` means the stream is exhausted.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            SourceBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            SourceBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> SourceStats {
        match &self.backend {
            SourceBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-ffmpeg")]
            SourceBackend::Ffmpeg(source) => source.stats(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests and demo builds
// ----------------------------------------------------------------------------

struct SyntheticSource {
    descriptor: String,
    width: u32,
    height: u32,
    frame_count: u64,
    /// Frames to produce before signalling end of stream; `None` runs forever.
    limit: Option<u64>,
    scene_state: u8,
}

impl SyntheticSource {
    fn new(url: &str, settings: &IngestSettings) -> Result<Self> {
        let limit = parse_frame_limit(url)?;
        Ok(Self {
            descriptor: url.to_string(),
            width: settings.width,
            height: settings.height,
            frame_count: 0,
            limit,
            scene_state: 0,
        })
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(limit) = self.limit {
            if self.frame_count >= limit {
                return Ok(None);
            }
        }
        self.frame_count += 1;

        let pixels = self.generate_synthetic_pixels();
        let frame = Frame::new(pixels, self.width, self.height, self.frame_count, now_s()?)?;
        Ok(Some(frame))
    }

    /// Simple moving pattern; the scene shifts every 50 frames so stub runs
    /// exercise frame-to-frame change without any real content.
    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width * self.height * 3) as usize;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            descriptor: self.descriptor.clone(),
        }
    }
}

/// `stub://scene?frames=N` bounds the synthetic run to N frames.
fn parse_frame_limit(url: &str) -> Result<Option<u64>> {
    let Some(query) = url.splitn(2, '?').nth(1) else {
        return Ok(None);
    };
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("frames=") {
            let frames: u64 = value
                .parse()
                .map_err(|_| anyhow!("invalid frames limit in '{}'", url))?;
            return Ok(Some(frames));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> IngestSettings {
        IngestSettings {
            target_fps: 10,
            width: 64,
            height: 48,
        }
    }

    #[test]
    fn parse_rejects_empty_input() {
        assert!(SourceSpec::parse("").is_err());
        assert!(SourceSpec::parse("   ").is_err());
    }

    #[test]
    fn parse_distinguishes_source_kinds() {
        assert_eq!(SourceSpec::parse("0").unwrap(), SourceSpec::Camera(0));
        assert_eq!(
            SourceSpec::parse("rtsp://cam/stream").unwrap(),
            SourceSpec::Network("rtsp://cam/stream".to_string())
        );
        assert_eq!(
            SourceSpec::parse("clips/footage.mp4").unwrap(),
            SourceSpec::File("clips/footage.mp4".to_string())
        );
    }

    #[test]
    fn synthetic_source_honors_frame_limit() {
        let spec = SourceSpec::parse("stub://calm?frames=3").unwrap();
        let mut source = FrameSource::open(&spec, &settings()).unwrap();
        for seq in 1..=3u64 {
            let frame = source.next_frame().unwrap().expect("frame before limit");
            assert_eq!(frame.seq, seq);
            assert_eq!(frame.width, 64);
        }
        assert!(source.next_frame().unwrap().is_none());
        assert_eq!(source.stats().frames_captured, 3);
    }

    #[test]
    fn bad_frame_limit_is_rejected_at_open() {
        let spec = SourceSpec::parse("stub://calm?frames=soon").unwrap();
        assert!(FrameSource::open(&spec, &settings()).is_err());
    }
}
