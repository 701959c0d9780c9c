use log::debug;
use thiserror::Error;

use super::frame::Frame;
use super::types::{CodeGeometry, DecodedPayload, Point};

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Frame is empty or malformed ({width}x{height}, {len} bytes)")]
    InvalidFrame { width: u32, height: u32, len: usize },

    #[error("Decoder failure: {0}")]
    Backend(String),
}

/// 二维码解码能力（外部实现）
pub trait CodeDecoder: Send + Sync {
    /// Every code readable in `frame`, with geometry in `frame` coordinates.
    fn decode(&self, frame: &Frame) -> Result<Vec<DecodedPayload>, DecodeError>;
}

/// `rqrr` grid detection on the luminance plane.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

impl CodeDecoder for RqrrDecoder {
    fn decode(&self, frame: &Frame) -> Result<Vec<DecodedPayload>, DecodeError> {
        if !frame.is_valid() {
            return Err(DecodeError::InvalidFrame {
                width: frame.width,
                height: frame.height,
                len: frame.data.len(),
            });
        }

        let gray = frame.to_gray();
        let w = frame.width as usize;
        let h = frame.height as usize;
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(w, h, |x, y| gray[y * w + x]);

        let grids = prepared.detect_grids();
        let mut payloads = Vec::with_capacity(grids.len());
        for grid in grids {
            match grid.decode() {
                Ok((_meta, content)) => {
                    let polygon = grid.bounds.iter().map(|p| Point::new(p.x, p.y)).collect();
                    payloads.push(DecodedPayload::new(
                        content,
                        CodeGeometry::from_polygon(polygon),
                    ));
                }
                Err(e) => debug!("Grid found but not decodable: {:?}", e),
            }
        }

        Ok(payloads)
    }
}

type DecodeScript = Box<dyn Fn(&Frame) -> Result<Vec<String>, DecodeError> + Send + Sync>;

/// 测试用解码器：按脚本返回固定内容，几何信息覆盖整帧
pub struct MockDecoder {
    script: Option<DecodeScript>,
}

impl MockDecoder {
    pub fn new() -> Self {
        Self { script: None }
    }

    pub fn with_pattern<F>(pattern: F) -> Self
    where
        F: Fn(&Frame) -> Result<Vec<String>, DecodeError> + Send + Sync + 'static,
    {
        Self {
            script: Some(Box::new(pattern)),
        }
    }

    /// Same texts for every frame.
    pub fn with_payloads(texts: Vec<String>) -> Self {
        Self::with_pattern(move |_| Ok(texts.clone()))
    }

    /// Texts keyed by frame number; other frames decode nothing.
    pub fn with_frames(frames: Vec<(u64, String)>) -> Self {
        Self::with_pattern(move |frame| {
            Ok(frames
                .iter()
                .filter(|(n, _)| *n == frame.frame_number)
                .map(|(_, text)| text.clone())
                .collect())
        })
    }

    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::with_pattern(move |_| Err(DecodeError::Backend(message.clone())))
    }
}

impl Default for MockDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl CodeDecoder for MockDecoder {
    fn decode(&self, frame: &Frame) -> Result<Vec<DecodedPayload>, DecodeError> {
        let Some(script) = self.script.as_ref() else {
            return Ok(Vec::new());
        };

        let right = frame.width.saturating_sub(1) as i32;
        let bottom = frame.height.saturating_sub(1) as i32;
        let outline = vec![
            Point::new(0, 0),
            Point::new(right, 0),
            Point::new(right, bottom),
            Point::new(0, bottom),
        ];

        Ok(script(frame)?
            .into_iter()
            .map(|text| DecodedPayload::new(text, CodeGeometry::from_polygon(outline.clone())))
            .collect())
    }
}
