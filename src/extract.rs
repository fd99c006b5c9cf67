use crate::error::PipelineError;
use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use zip::ZipArchive;

/// Archives unpacked into `root`.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub root: PathBuf,
    pub archives: Vec<PathBuf>,
    /// Top-level entries the archives unpacked, usually one `.SAFE` folder each.
    pub scenes: Vec<PathBuf>,
}

/// Zip archives directly inside `dir`, sorted by path.
pub fn find_archives(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut archives: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().map_or(false, |ext| ext == "zip"))
        .collect();
    archives.sort();
    Ok(archives)
}

/// Extract every archive in `dir` into `dir`. Existing files are overwritten.
pub fn extract_archives(dir: &Path) -> Result<Extraction> {
    let archives = find_archives(dir)?;
    extract_selected(dir, &archives)
}

/// Extract only `archives` into `dir`. Scenes already unpacked there by other archives
/// are not part of the result.
pub fn extract_selected(dir: &Path, archives: &[PathBuf]) -> Result<Extraction> {
    if archives.is_empty() {
        return Err(PipelineError::NoArchives(dir.to_path_buf()).into());
    }

    let mut scenes = BTreeSet::new();
    for archive in archives.iter() {
        log::info!("Extracting file: {}", archive.display());
        let file = File::open(archive)?;
        let mut zip = ZipArchive::new(file)
            .with_context(|| format!("Failed to open archive {}", archive.display()))?;
        scenes.extend(top_level_entries(&zip).into_iter().map(|name| dir.join(name)));
        zip.extract(dir)
            .with_context(|| format!("Failed to extract {}", archive.display()))?;
    }

    Ok(Extraction {
        root: dir.to_path_buf(),
        archives: archives.to_vec(),
        scenes: scenes.into_iter().collect(),
    })
}

fn top_level_entries(zip: &ZipArchive<File>) -> BTreeSet<String> {
    zip.file_names()
        .filter_map(|name| match Path::new(name).components().next() {
            Some(Component::Normal(first)) => Some(first.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect()
}
