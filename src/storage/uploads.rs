use crate::common::Result;
use image::DynamicImage;
use std::fs;
use std::path::PathBuf;

/// Keeps the raw captures that backed an enrollment, named by purpose and
/// capture time. Losing one never fails the flow that produced it; callers
/// log and move on.
pub struct UploadArchive {
    dir: PathBuf,
}

impl UploadArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn save_capture(&self, prefix: &str, image: &DynamicImage) -> Result<PathBuf> {
        let filename = format!("{}_{}.jpg", prefix, chrono::Utc::now().timestamp());
        let path = self.dir.join(filename);
        image.save(&path)?;
        Ok(path)
    }
}
