//! FFmpeg-backed frame source.
//!
//! One decode loop covers all three real source kinds: local files, camera
//! devices (`/dev/video<n>`), and network streams. Output is scaled to
//! BGR24 at the stream's native resolution.

use anyhow::{Context, Result};
use ffmpeg_next as ffmpeg;
use std::time::{Duration, Instant};

use super::{SourceSpec, SourceStats};
use crate::config::IngestSettings;
use crate::frame::Frame;
use crate::now_s;

pub(crate) struct FfmpegSource {
    descriptor: String,
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    target_fps: u32,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

impl FfmpegSource {
    pub(crate) fn open(spec: &SourceSpec, settings: &IngestSettings) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;

        let descriptor = match spec {
            SourceSpec::File(path) => path.clone(),
            SourceSpec::Camera(index) => format!("/dev/video{}", index),
            SourceSpec::Network(url) => url.clone(),
        };

        let input = ffmpeg::format::input(&descriptor)
            .with_context(|| format!("failed to open source '{}'", descriptor))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("source '{}' has no video track", descriptor))?;
        let stream_index = input_stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::BGR24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!("FrameSource: opened '{}' (ffmpeg)", descriptor);

        Ok(Self {
            descriptor,
            input,
            stream_index,
            decoder,
            scaler,
            target_fps: settings.target_fps,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut bgr_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }

            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;

            while self.decoder.receive_frame(&mut decoded).is_ok() {
                self.scaler
                    .run(&decoded, &mut bgr_frame)
                    .context("scale frame to BGR")?;
                let (pixels, width, height) = frame_to_pixels(&bgr_frame)?;

                self.frame_count += 1;
                self.last_frame_at = Some(Instant::now());

                return Ok(Some(Frame::new(
                    pixels,
                    width,
                    height,
                    self.frame_count,
                    now_s()?,
                )?));
            }
        }

        // Packets exhausted: normal end of stream.
        Ok(None)
    }

    pub(crate) fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    pub(crate) fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            descriptor: self.descriptor.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.target_fps == 0 {
            2_000
        } else {
            (1000 / self.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0) as usize;
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok((data.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Ok((pixels, width, height))
}
