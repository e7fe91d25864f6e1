//! Slide directory scan and reconciliation against the slides table.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::error::ScanError;
use crate::store::{self, Database};

use super::{dotted_extension, SlideRecord};

/// Extensions of single-file slides.
pub const SLIDE_FILE_EXTENSIONS: [&str; 8] = [
    ".svs", ".tiff", ".ndpi", ".vms", ".vmu", ".scn", ".mrxs", ".bif",
];

/// A folder holding any file with one of these extensions is a slide.
pub const SLIDE_FOLDER_MARKERS: [&str; 3] = [".dcm", ".mrxs", ".dat"];

/// Outcome of [`reconcile_slides`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Slide names found on disk
    pub discovered: usize,
    /// Names newly written to the store
    pub inserted: usize,
}

pub fn is_slide_file(path: &Path) -> bool {
    path.is_file()
        && dotted_extension(path).is_some_and(|ext| SLIDE_FILE_EXTENSIONS.contains(&ext.as_str()))
}

/// Whether `path` is a folder containing a DICOM, MRXS or MRXS data file.
pub fn is_slide_folder(path: &Path) -> bool {
    if !path.is_dir() {
        return false;
    }
    match fs::read_dir(path) {
        Ok(entries) => entries.flatten().any(|entry| {
            dotted_extension(&entry.path())
                .is_some_and(|ext| SLIDE_FOLDER_MARKERS.contains(&ext.as_str()))
        }),
        Err(e) => {
            warn!(path = %path.display(), "Skipping unreadable folder: {}", e);
            false
        }
    }
}

/// Names of the slide files and folders directly under `root`, sorted.
pub fn discover_slides(root: &Path) -> Result<Vec<String>, ScanError> {
    let entries = fs::read_dir(root).map_err(|e| ScanError::Io {
        path: root.display().to_string(),
        message: e.to_string(),
    })?;

    let mut names: Vec<String> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| is_slide_file(path) || is_slide_folder(path))
        .filter_map(|path| path.file_name()?.to_str().map(String::from))
        .collect();
    names.sort();

    debug!(root = %root.display(), count = names.len(), "Discovered slides");
    Ok(names)
}

/// Insert a slide row for every discovered name not yet persisted.
///
/// All inserts share one transaction. Re-running on an unchanged directory
/// writes nothing.
pub fn reconcile_slides(db: &Database, root: &Path) -> Result<ScanReport, ScanError> {
    let names = discover_slides(root)?;

    let inserted = db.with_conn_mut(|conn| {
        let tx = conn.transaction()?;
        let existing = store::slides::slide_names(&tx)?;

        let mut inserted = 0;
        for name in names.iter().filter(|n| !existing.contains(n.as_str())) {
            if store::slides::insert_slide(&tx, &SlideRecord::named(name.as_str()))? {
                info!(slide = %name, "Registered new slide");
                inserted += 1;
            }
        }

        tx.commit()?;
        Ok::<_, ScanError>(inserted)
    })?;

    Ok(ScanReport {
        discovered: names.len(),
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn populate(root: &Path) {
        fs::write(root.join("case1.svs"), b"x").unwrap();
        fs::write(root.join("CASE2.TIFF"), b"x").unwrap();
        fs::write(root.join("notes.txt"), b"x").unwrap();
        fs::write(root.join("photo.png"), b"x").unwrap();

        fs::create_dir(root.join("series")).unwrap();
        fs::write(root.join("series").join("img0001.DCM"), b"x").unwrap();

        fs::create_dir(root.join("mirax")).unwrap();
        fs::write(root.join("mirax").join("Data0000.dat"), b"x").unwrap();

        fs::create_dir(root.join("empty")).unwrap();
        fs::create_dir(root.join("docs")).unwrap();
        fs::write(root.join("docs").join("readme.md"), b"x").unwrap();
    }

    #[test]
    fn test_discover_files_and_folders() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());

        let names = discover_slides(dir.path()).unwrap();
        assert_eq!(names, ["CASE2.TIFF", "case1.svs", "mirax", "series"]);
    }

    #[test]
    fn test_discover_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover_slides(&dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, ScanError::Io { .. }));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        populate(dir.path());
        let db = Database::open_in_memory().unwrap();

        let first = reconcile_slides(&db, dir.path()).unwrap();
        assert_eq!(first, ScanReport { discovered: 4, inserted: 4 });

        let second = reconcile_slides(&db, dir.path()).unwrap();
        assert_eq!(second, ScanReport { discovered: 4, inserted: 0 });

        fs::write(dir.path().join("case3.ndpi"), b"x").unwrap();
        let third = reconcile_slides(&db, dir.path()).unwrap();
        assert_eq!(third.inserted, 1);

        let count = db
            .with_conn(|conn| store::slides::list_slides(conn))
            .unwrap()
            .len();
        assert_eq!(count, 5);
    }
}
