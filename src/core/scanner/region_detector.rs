use log::debug;
use serde::{Deserialize, Serialize};

use super::contour::find_external_contours;
use super::frame::Frame;
use super::types::{BoundingBox, Region};

/// 亮区检测配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionSettings {
    /// 亮度阈值 (0-255)，高于此值视为前景
    pub brightness_threshold: u8,
    pub min_rect_size: u32,
    pub max_rect_size: u32,
    /// max(w/h, h/w) 上限
    pub rect_aspect_ratio: f32,
    pub min_contour_area: f64,
    pub max_regions: usize,
    /// 聚焦模式下送去解码的区域数
    pub focused_regions: usize,
    /// 裁剪时四周额外保留的像素
    pub region_margin: u32,
    pub focus_enabled: bool,
    pub highlight_potential: bool,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            brightness_threshold: 160,
            min_rect_size: 50,
            max_rect_size: 500,
            rect_aspect_ratio: 1.5,
            min_contour_area: 100.0,
            max_regions: 5,
            focused_regions: 3,
            region_margin: 10,
            focus_enabled: true,
            highlight_potential: true,
        }
    }
}

/// 亮矩形预筛选：找出可能是屏幕/纸面上二维码的明亮四边形区域
pub struct RegionDetector {
    settings: DetectionSettings,
}

impl RegionDetector {
    pub fn new() -> Self {
        Self::with_settings(DetectionSettings::default())
    }

    pub fn with_settings(settings: DetectionSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &DetectionSettings {
        &self.settings
    }

    pub fn settings_mut(&mut self) -> &mut DetectionSettings {
        &mut self.settings
    }

    /// Up to `max_regions` candidate regions, brightest first. A malformed
    /// frame yields an empty list.
    pub fn detect(&self, frame: &Frame) -> Vec<Region> {
        if !frame.is_valid() {
            return Vec::new();
        }
        self.detect_gray(&frame.to_gray(), frame.width, frame.height)
    }

    pub fn detect_gray(&self, gray: &[u8], width: u32, height: u32) -> Vec<Region> {
        let w = width as usize;
        let h = height as usize;
        if w == 0 || h == 0 || gray.len() != w * h {
            return Vec::new();
        }

        let s = &self.settings;
        let blurred = gaussian_blur_5x5(gray, w, h);
        let mask: Vec<bool> = blurred
            .iter()
            .map(|&v| v > s.brightness_threshold)
            .collect();

        let mut regions = Vec::new();
        for contour in find_external_contours(&mask, w, h) {
            if contour.area() < s.min_contour_area {
                continue;
            }

            let epsilon = 0.04 * contour.perimeter();
            let approx = contour.approximate(epsilon);
            if !(4..=7).contains(&approx.len()) {
                continue;
            }

            let Some(bounds) = BoundingBox::from_points(&approx) else {
                continue;
            };
            if !self.size_matches(&bounds) {
                continue;
            }

            let brightness = mean_brightness(gray, w, &bounds);
            if brightness > s.brightness_threshold as f32 {
                regions.push(Region { bounds, brightness });
            }
        }

        regions.sort_by(|a, b| {
            b.brightness
                .partial_cmp(&a.brightness)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        regions.truncate(s.max_regions);

        debug!("🔆 {} bright region(s) in {}x{} frame", regions.len(), width, height);
        regions
    }

    fn size_matches(&self, bounds: &BoundingBox) -> bool {
        let s = &self.settings;
        // 零面积在除法之前排除
        let Some(aspect) = bounds.aspect_ratio() else {
            return false;
        };
        let in_range = |v: u32| v >= s.min_rect_size && v <= s.max_rect_size;
        in_range(bounds.width) && in_range(bounds.height) && aspect <= s.rect_aspect_ratio
    }
}

impl Default for RegionDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Separable 5x5 Gaussian, kernel `[1, 4, 6, 4, 1] / 16`, reflected borders.
///
/// Same fixed kernel and `BORDER_REFLECT_101` edges as OpenCV's
/// `GaussianBlur(ksize = 5, sigma = 0)`. `imageops::blur` derives a float
/// kernel from sigma and clamps at the edges, which moves the threshold
/// crossings near region borders.
pub fn gaussian_blur_5x5(gray: &[u8], width: usize, height: usize) -> Vec<u8> {
    const KERNEL: [u32; 5] = [1, 4, 6, 4, 1];

    let reflect = |i: isize, n: usize| -> usize {
        let n = n as isize;
        if n == 1 {
            return 0;
        }
        let mut i = i;
        if i < 0 {
            i = -i;
        }
        if i >= n {
            i = 2 * (n - 1) - i;
        }
        i.clamp(0, n - 1) as usize
    };

    let mut horizontal = vec![0u8; gray.len()];
    for y in 0..height {
        let row = y * width;
        for x in 0..width {
            let sum: u32 = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &weight)| {
                    let sx = reflect(x as isize + k as isize - 2, width);
                    gray[row + sx] as u32 * weight
                })
                .sum();
            horizontal[row + x] = ((sum + 8) / 16) as u8;
        }
    }

    let mut out = vec![0u8; gray.len()];
    for y in 0..height {
        for x in 0..width {
            let sum: u32 = KERNEL
                .iter()
                .enumerate()
                .map(|(k, &weight)| {
                    let sy = reflect(y as isize + k as isize - 2, height);
                    horizontal[sy * width + x] as u32 * weight
                })
                .sum();
            out[y * width + x] = ((sum + 8) / 16) as u8;
        }
    }
    out
}

fn mean_brightness(gray: &[u8], width: usize, bounds: &BoundingBox) -> f32 {
    let mut sum = 0u64;
    let mut count = 0u64;
    for y in bounds.y as usize..bounds.bottom() as usize {
        let row = y * width;
        for x in bounds.x as usize..bounds.right() as usize {
            if let Some(&v) = gray.get(row + x) {
                sum += v as u64;
                count += 1;
            }
        }
    }
    if count == 0 {
        0.0
    } else {
        sum as f32 / count as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 黑底，绘制若干指定灰度的实心矩形 (x, y, w, h, value)
    fn create_test_frame(width: u32, height: u32, rects: &[(u32, u32, u32, u32, u8)]) -> Frame {
        let mut data = vec![0u8; (width * height * 3) as usize];
        for &(x, y, w, h, value) in rects {
            for row in y..y + h {
                for col in x..x + w {
                    let idx = ((row * width + col) * 3) as usize;
                    data[idx..idx + 3].copy_from_slice(&[value, value, value]);
                }
            }
        }
        Frame::new(width, height, data, 0, 0)
    }

    #[test]
    fn test_dark_frame_has_no_regions() {
        let detector = RegionDetector::new();
        let frame = create_test_frame(320, 240, &[(40, 40, 80, 80, 120)]);
        assert!(detector.detect(&frame).is_empty());
    }

    #[test]
    fn test_malformed_frame_is_empty() {
        let detector = RegionDetector::new();
        assert!(detector.detect(&Frame::new(0, 0, vec![], 0, 0)).is_empty());
        assert!(detector.detect(&Frame::new(10, 10, vec![255; 12], 0, 0)).is_empty());
    }

    #[test]
    fn test_single_bright_square() {
        let detector = RegionDetector::new();
        let frame = create_test_frame(320, 240, &[(100, 60, 80, 80, 255)]);
        let regions = detector.detect(&frame);

        assert_eq!(regions.len(), 1);
        let r = &regions[0];
        // blurred corners may shave one pixel off the outline
        assert!(r.bounds.x.abs_diff(100) <= 1 && r.bounds.y.abs_diff(60) <= 1);
        assert!(r.bounds.width.abs_diff(80) <= 2 && r.bounds.height.abs_diff(80) <= 2);
        assert!(r.brightness > 250.0);
    }

    #[test]
    fn test_regions_sorted_and_capped() {
        let detector = RegionDetector::new();
        let levels = [190u8, 255, 200, 245, 210, 235, 220];
        let rects: Vec<_> = levels
            .iter()
            .enumerate()
            .map(|(i, &v)| (10 + i as u32 * 80, 100, 60, 60, v))
            .collect();
        let frame = create_test_frame(640, 300, &rects);

        let regions = detector.detect(&frame);
        assert_eq!(regions.len(), 5);
        for pair in regions.windows(2) {
            assert!(pair[0].brightness >= pair[1].brightness);
        }
        assert!(regions[0].brightness > 250.0);
        // the two dimmest squares are cut
        assert!(regions.iter().all(|r| r.brightness > 205.0));
    }

    #[test]
    fn test_rejects_wrong_shapes() {
        let detector = RegionDetector::new();
        let frame = create_test_frame(
            640,
            480,
            &[
                (20, 20, 240, 70, 255),   // too elongated
                (300, 20, 30, 30, 255),   // too small
                (20, 200, 100, 100, 255), // ok
            ],
        );
        let regions = detector.detect(&frame);
        assert_eq!(regions.len(), 1);
        assert!(regions[0].bounds.x.abs_diff(20) <= 1);
        assert!(regions[0].bounds.y.abs_diff(200) <= 1);
    }

    #[test]
    fn test_square_inside_hole_is_ignored() {
        let detector = RegionDetector::new();
        // 亮框（空心）内部放一个亮方块：只取外轮廓，外框平均亮度不足
        let mut rects = vec![
            (40, 20, 200, 20, 255),
            (40, 200, 200, 20, 255),
            (40, 40, 20, 160, 255),
            (220, 40, 20, 160, 255),
        ];
        rects.push((110, 90, 60, 60, 255));
        let frame = create_test_frame(320, 260, &rects);

        assert!(detector.detect(&frame).is_empty());
    }

    #[test]
    fn test_threshold_setting_applies() {
        let mut detector = RegionDetector::new();
        let frame = create_test_frame(320, 240, &[(100, 60, 80, 80, 150)]);
        assert!(detector.detect(&frame).is_empty());

        detector.settings_mut().brightness_threshold = 100;
        assert_eq!(detector.detect(&frame).len(), 1);
    }

    #[test]
    fn test_blur_step_edge_exact_weights() {
        let step = [0u8, 0, 0, 160, 160, 160];
        assert_eq!(gaussian_blur_5x5(&step, 6, 1), vec![0, 10, 50, 110, 150, 160]);

        // reflect-101: the border pixel is not repeated
        let spike = [200u8, 0, 0, 0, 0, 0];
        assert_eq!(gaussian_blur_5x5(&spike, 6, 1), vec![75, 50, 13, 0, 0, 0]);
    }

    #[test]
    fn test_blur_preserves_flat_image() {
        let gray = vec![90u8; 6 * 4];
        assert_eq!(gaussian_blur_5x5(&gray, 6, 4), gray);
    }
}
