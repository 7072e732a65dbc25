use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, RgbaImage};
use tracing::info;

use crate::error::CaptureError;

use super::sidecar::CaptureDocument;

/// Paths of one written capture: `<name>.png` and `<name>.json` side by side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRecord {
    pub name: String,
    pub image_path: PathBuf,
    pub sidecar_path: PathBuf,
}

/// A directory of captures.
#[derive(Debug, Clone)]
pub struct CaptureStore {
    root: PathBuf,
}

impl CaptureStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn paths(&self, name: &str) -> Result<(PathBuf, PathBuf), CaptureError> {
        if name.is_empty() || name.contains(['/', '\\']) || name == "." || name == ".." {
            return Err(CaptureError::InvalidName(name.to_string()));
        }
        Ok((
            self.root.join(format!("{name}.png")),
            self.root.join(format!("{name}.json")),
        ))
    }

    pub fn write(
        &self,
        name: &str,
        image: &RgbaImage,
        sidecar: &str,
    ) -> Result<CaptureRecord, CaptureError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(CaptureError::EmptyScreenshot);
        }
        let (image_path, sidecar_path) = self.paths(name)?;
        fs::create_dir_all(&self.root)?;
        image.save_with_format(&image_path, ImageFormat::Png)?;
        fs::write(&sidecar_path, sidecar)?;

        info!(name, path = %image_path.display(), "capture written");
        Ok(CaptureRecord {
            name: name.to_string(),
            image_path,
            sidecar_path,
        })
    }

    pub fn load(&self, name: &str) -> Result<(RgbaImage, CaptureDocument), CaptureError> {
        let (image_path, sidecar_path) = self.paths(name)?;
        let image = image::open(&image_path)?.to_rgba8();
        let document = CaptureDocument::from_json(&fs::read_to_string(&sidecar_path)?)?;
        Ok((image, document))
    }
}
