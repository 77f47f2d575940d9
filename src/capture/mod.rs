//! Screen capture: grab, shrink, JPEG-encode, base64.

use crate::config::{ScreenshotConfig, secs};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};
use std::path::Path;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use xcap::Monitor;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no monitor found")]
    NoMonitor,
    #[error("screen grab failed: {0}")]
    Grab(String),
    #[error("image encoding failed: {0}")]
    Encode(#[from] image::ImageError),
    #[error("no screenshot has been taken yet")]
    NoFrame,
}

/// Transport-ready screenshot: base64 JPEG.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedImage {
    pub base64: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn data_url(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.base64)
    }

    pub fn len(&self) -> usize {
        self.base64.len()
    }

    pub fn is_empty(&self) -> bool {
        self.base64.is_empty()
    }
}

pub trait ScreenCapture {
    fn capture_and_encode(&mut self) -> Result<EncodedImage, CaptureError>;
    fn screen_size(&self) -> Result<(u32, u32), CaptureError>;

    /// Writes the most recent frame to `path`.
    fn save_last(&self, _path: &Path) -> Result<(), CaptureError> {
        Err(CaptureError::NoFrame)
    }

    /// Like [`ScreenCapture::save_last`], with `target` (screen coordinates) marked.
    fn save_annotated(&self, path: &Path, _target: (i64, i64)) -> Result<(), CaptureError> {
        self.save_last(path)
    }
}

const MARK_RADIUS: u32 = 10;
const MARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

/// Primary-monitor capture through `xcap`.
pub struct XcapCapture {
    quality: u8,
    max_size: (u32, u32),
    interval: Duration,
    screenshot_count: u64,
    last: Option<RgbImage>,
    /// Size of the last grab before shrinking.
    last_source: (u32, u32),
    last_at: Option<Instant>,
}

impl XcapCapture {
    pub fn new(config: &ScreenshotConfig) -> Self {
        Self {
            quality: config.quality.clamp(1, 100),
            max_size: (config.max_width, config.max_height),
            interval: secs(config.interval_secs),
            screenshot_count: 0,
            last: None,
            last_source: (0, 0),
            last_at: None,
        }
    }

    /// The primary monitor, the same display the input driver measures.
    fn monitor() -> Result<Monitor, CaptureError> {
        let monitors = Monitor::all().map_err(|e| CaptureError::Grab(e.to_string()))?;
        pick_primary(monitors, Monitor::is_primary).ok_or(CaptureError::NoMonitor)
    }

    /// Full-resolution grab of the primary monitor.
    pub fn capture(&mut self) -> Result<DynamicImage, CaptureError> {
        let frame = Self::monitor()?
            .capture_image()
            .map_err(|e| CaptureError::Grab(e.to_string()))?;
        self.screenshot_count += 1;
        self.last_at = Some(Instant::now());
        debug!(
            "screenshot #{} captured: {}x{}",
            self.screenshot_count,
            frame.width(),
            frame.height()
        );
        Ok(DynamicImage::ImageRgba8(frame))
    }

    pub fn screenshot_count(&self) -> u64 {
        self.screenshot_count
    }

    /// True once the configured screenshot interval has passed.
    pub fn should_capture(&self) -> bool {
        self.last_at
            .map(|at| at.elapsed() >= self.interval)
            .unwrap_or(true)
    }
}

impl ScreenCapture for XcapCapture {
    fn capture_and_encode(&mut self) -> Result<EncodedImage, CaptureError> {
        let frame = self.capture()?;
        self.last_source = (frame.width(), frame.height());
        let rgb = shrink(frame, self.max_size).to_rgb8();
        let encoded = encode_jpeg(&rgb, self.quality)?;
        self.last = Some(rgb);
        Ok(encoded)
    }

    fn screen_size(&self) -> Result<(u32, u32), CaptureError> {
        let monitor = Self::monitor()?;
        Ok((monitor.width(), monitor.height()))
    }

    fn save_last(&self, path: &Path) -> Result<(), CaptureError> {
        let frame = self.last.as_ref().ok_or(CaptureError::NoFrame)?;
        frame.save(path)?;
        info!("screenshot saved: {}", path.display());
        Ok(())
    }

    fn save_annotated(&self, path: &Path, target: (i64, i64)) -> Result<(), CaptureError> {
        let mut frame = self.last.clone().ok_or(CaptureError::NoFrame)?;
        let (sw, sh) = self.last_source;
        let scale = |v: i64, from: u32, to: u32| {
            if from == 0 { v } else { v * i64::from(to) / i64::from(from) }
        };
        let x = scale(target.0, sw, frame.width());
        let y = scale(target.1, sh, frame.height());
        mark_target(&mut frame, x, y, MARK_RADIUS);
        frame.save(path)?;
        info!("annotated screenshot saved: {} (target {}, {})", path.display(), target.0, target.1);
        Ok(())
    }
}

/// Draws a ring of `radius` with a crosshair through it, clipped to the frame.
pub fn mark_target(image: &mut RgbImage, x: i64, y: i64, radius: u32) {
    let (w, h) = (i64::from(image.width()), i64::from(image.height()));
    let r = i64::from(radius);
    let reach = r + 5;
    let mut paint = |px: i64, py: i64| {
        if (0..w).contains(&px) && (0..h).contains(&py) {
            image.put_pixel(px as u32, py as u32, MARK_COLOR);
        }
    };

    for py in y - reach..=y + reach {
        for px in x - reach..=x + reach {
            let (dx, dy) = ((px - x) as f64, (py - y) as f64);
            let d = (dx * dx + dy * dy).sqrt();
            let on_ring = (d - r as f64).abs() <= 1.5;
            let on_cross = (py == y || py == y - 1) || (px == x || px == x - 1);
            if on_ring || on_cross {
                paint(px, py);
            }
        }
    }
}

/// First item flagged primary, else the first item.
pub fn pick_primary<T>(items: Vec<T>, is_primary: impl Fn(&T) -> bool) -> Option<T> {
    let index = items.iter().position(|item| is_primary(item)).unwrap_or(0);
    items.into_iter().nth(index)
}

/// Downscales, keeping aspect ratio, only when the frame exceeds `max`.
pub fn shrink(image: DynamicImage, max: (u32, u32)) -> DynamicImage {
    if image.width() > max.0 || image.height() > max.1 {
        let small = image.thumbnail(max.0, max.1);
        debug!("screenshot resized to {}x{}", small.width(), small.height());
        small
    } else {
        image
    }
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<EncodedImage, CaptureError> {
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(image)?;
    let base64 = STANDARD.encode(&bytes);
    debug!("base64 payload: {} chars", base64.len());
    Ok(EncodedImage {
        base64,
        width: image.width(),
        height: image.height(),
    })
}
