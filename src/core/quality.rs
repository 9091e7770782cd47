use crate::core::extractor::FaceBox;
use image::DynamicImage;

/// Brightness and contrast of a detected face region, both normalized to
/// 0.0..=1.0. Used as the coarse usability check behind the verification
/// pre-check: a region that is too dark or too flat is treated as covered.
#[derive(Debug, Clone)]
pub struct RegionQuality {
    pub brightness: f32,
    pub contrast: f32,
}

impl RegionQuality {
    pub fn measure(image: &DynamicImage, region: &FaceBox) -> Self {
        let gray = image.to_luma8();

        let x1 = region.x1.max(0.0) as u32;
        let y1 = region.y1.max(0.0) as u32;
        let x2 = region.x2.min(gray.width() as f32) as u32;
        let y2 = region.y2.min(gray.height() as f32) as u32;

        if x2 <= x1 || y2 <= y1 {
            return Self {
                brightness: 0.5,
                contrast: 0.5,
            };
        }

        let mut sum = 0u64;
        let mut sum_sq = 0u64;
        let mut count = 0u32;

        for y in y1..y2 {
            for x in x1..x2 {
                let pixel = gray.get_pixel(x, y)[0] as u64;
                sum += pixel;
                sum_sq += pixel * pixel;
                count += 1;
            }
        }

        if count == 0 {
            return Self {
                brightness: 0.5,
                contrast: 0.5,
            };
        }

        let mean = sum as f32 / count as f32;
        let variance = (sum_sq as f32 / count as f32) - (mean * mean);
        let std_dev = variance.max(0.0).sqrt();

        // Ideal mean sits at mid-gray; std dev of 64 is already strong contrast
        let brightness = 1.0 - ((mean - 127.5).abs() / 127.5).min(1.0);
        let contrast = (std_dev / 64.0).min(1.0);

        Self {
            brightness,
            contrast,
        }
    }

    pub fn is_usable(&self, min_brightness: f32, min_contrast: f32) -> bool {
        self.brightness >= min_brightness && self.contrast >= min_contrast
    }
}
