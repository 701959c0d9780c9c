use std::path::Path;

use image::RgbImage;

use super::types::BoundingBox;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB 格式
    pub timestamp_ms: u64,
    pub frame_number: u64,
}

impl Frame {
    pub fn new(
        width: u32,
        height: u32,
        data: Vec<u8>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Self {
        Self {
            width,
            height,
            data,
            timestamp_ms,
            frame_number,
        }
    }

    pub fn from_rgb_image(img: RgbImage, timestamp_ms: u64, frame_number: u64) -> Self {
        let (width, height) = img.dimensions();
        Self::new(width, height, img.into_raw(), timestamp_ms, frame_number)
    }

    /// 从图片文件加载一帧
    pub fn open(
        path: impl AsRef<Path>,
        timestamp_ms: u64,
        frame_number: u64,
    ) -> Result<Self, image::ImageError> {
        let img = image::open(path)?.to_rgb8();
        Ok(Self::from_rgb_image(img, timestamp_ms, frame_number))
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Non-empty and the buffer holds exactly `width * height` RGB triples.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.pixel_count() * 3
    }

    /// 转灰度（BT.601 整数权重）
    pub fn to_gray(&self) -> Vec<u8> {
        luminance(&self.data)
    }

    /// Copy of the pixels inside `rect`, clamped to the frame.
    pub fn crop(&self, rect: &BoundingBox) -> Frame {
        let x0 = rect.x.min(self.width);
        let y0 = rect.y.min(self.height);
        let x1 = rect.right().min(self.width);
        let y1 = rect.bottom().min(self.height);
        let (w, h) = (x1 - x0, y1 - y0);

        let mut data = Vec::with_capacity(w as usize * h as usize * 3);
        if self.is_valid() {
            let stride = self.width as usize * 3;
            for y in y0..y1 {
                let start = y as usize * stride + x0 as usize * 3;
                data.extend_from_slice(&self.data[start..start + w as usize * 3]);
            }
        }

        Frame::new(w, h, data, self.timestamp_ms, self.frame_number)
    }

    /// Resample to an exact size. Returns `None` for a malformed frame.
    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Option<Frame> {
        let img = RgbImage::from_raw(self.width, self.height, self.data.clone())?;
        let resized = image::imageops::resize(
            &img,
            target_width.max(1),
            target_height.max(1),
            image::imageops::FilterType::Triangle,
        );
        Some(Frame::from_rgb_image(
            resized,
            self.timestamp_ms,
            self.frame_number,
        ))
    }

    /// 按比例缩放；比例 >= 1 或帧无效时原样返回
    pub fn scaled(self, factor: f32) -> Frame {
        if factor >= 1.0 || factor <= 0.0 || !self.is_valid() {
            return self;
        }
        let w = ((self.width as f32 * factor).round() as u32).max(1);
        let h = ((self.height as f32 * factor).round() as u32).max(1);
        match self.resize_to(w, h) {
            Some(frame) => frame,
            None => self,
        }
    }
}

/// Packed RGB to one intensity byte per pixel.
pub fn luminance(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3)
        .map(|c| ((c[0] as u32 * 299 + c[1] as u32 * 587 + c[2] as u32 * 114) / 1000) as u8)
        .collect()
}
