//! Resolve a slide name to something a reader can open.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::TileError;

use super::dotted_extension;
use super::scan::SLIDE_FILE_EXTENSIONS;

/// Extension appended when a bare name does not exist on disk.
const FALLBACK_EXTENSION: &str = "svs";

const DICOM_EXTENSION: &str = ".dcm";

/// Where a slide's pixels live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlideLocation {
    /// A single pyramidal image file
    File(PathBuf),
    /// A folder of DICOM instances; `sample` is the first one by name
    DicomFolder { folder: PathBuf, sample: PathBuf },
}

impl SlideLocation {
    pub fn path(&self) -> &Path {
        match self {
            SlideLocation::File(path) => path,
            SlideLocation::DicomFolder { folder, .. } => folder,
        }
    }
}

/// Resolve `name` under `root`.
///
/// Tries `{root}/{name}`, then `{root}/{name}.svs`. A folder resolves to its
/// first DICOM file if it has any, otherwise to its first file with a slide
/// extension (an MRXS index, for example).
pub fn locate_slide(root: &Path, name: &str) -> Result<SlideLocation, TileError> {
    let not_found = || TileError::SlideNotFound {
        slide: name.to_string(),
    };

    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(not_found());
    }

    let mut path = root.join(name);
    if !path.exists() {
        path = root.join(format!("{name}.{FALLBACK_EXTENSION}"));
    }
    if !path.exists() {
        debug!(slide = name, root = %root.display(), "Slide not found on disk");
        return Err(not_found());
    }

    if path.is_file() {
        return Ok(SlideLocation::File(path));
    }

    let files = sorted_files(&path).map_err(|e| TileError::UnsupportedSlide {
        slide: name.to_string(),
        reason: format!("cannot list folder: {e}"),
    })?;

    let with_extension = |wanted: &[&str]| {
        files.iter().find(|f| {
            dotted_extension(f).is_some_and(|ext| wanted.contains(&ext.as_str()))
        })
    };

    if let Some(sample) = with_extension(&[DICOM_EXTENSION]) {
        return Ok(SlideLocation::DicomFolder {
            sample: sample.clone(),
            folder: path,
        });
    }
    if let Some(file) = with_extension(&SLIDE_FILE_EXTENSIONS) {
        return Ok(SlideLocation::File(file.clone()));
    }

    Err(TileError::UnsupportedSlide {
        slide: name.to_string(),
        reason: "folder contains no DICOM or slide file".to_string(),
    })
}

fn sorted_files(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file())
        .collect();
    files.sort();
    Ok(files)
}
