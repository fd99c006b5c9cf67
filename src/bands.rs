use crate::config::ExistingOutput;
use crate::destination::prepare_destination;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const RASTER_EXTENSION: &str = "jp2";

/// A band to collect, e.g. `B04_10m` from the `R10m` image folders.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BandSpec {
    pub resolution: String,
    pub band: String,
}

impl BandSpec {
    pub fn new(resolution: &str, band: &str) -> Self {
        Self {
            resolution: resolution.to_string(),
            band: band.to_string(),
        }
    }
}

/// Matches band rasters by folder name and file-name suffix.
pub struct BandMatcher {
    resolution: String,
    file_name: Regex,
}

impl BandMatcher {
    pub fn new(spec: &BandSpec) -> Self {
        let pattern = format!(
            r"{}\.{}$",
            regex::escape(&spec.band),
            RASTER_EXTENSION
        );
        let file_name = Regex::new(&pattern).expect("Escaped band pattern should always compile");
        Self {
            resolution: spec.resolution.clone(),
            file_name,
        }
    }

    pub fn is_match(self: &Self, path: &Path) -> bool {
        let in_resolution_dir = path
            .parent()
            .and_then(|p| p.file_name())
            .map_or(false, |name| name == self.resolution.as_str());
        let name_matches = path
            .file_name()
            .and_then(|n| n.to_str())
            .map_or(false, |name| self.file_name.is_match(name));
        in_resolution_dir && name_matches
    }

    /// Every matching file under `root`, sorted by path.
    pub fn find(self: &Self, root: &Path) -> Vec<PathBuf> {
        let mut matches: Vec<PathBuf> = WalkDir::new(root)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| self.is_match(path))
            .collect();
        matches.sort();
        matches
    }
}

/// Tiles of one band copied into their own directory.
#[derive(Debug, Clone)]
pub struct BandCollection {
    pub band: String,
    pub dir: PathBuf,
    pub tiles: Vec<PathBuf>,
}

/// Copy every file matching `spec` under `scenes` into `<dest_root>/<band>`.
///
/// Files sharing a name (the same tile from a reprocessed product) keep the last match in
/// path order.
pub fn collect_band(
    spec: &BandSpec,
    scenes: &[PathBuf],
    dest_root: &Path,
    policy: ExistingOutput,
) -> Result<BandCollection> {
    log::info!("Collecting band {}", spec.band);
    let dir = dest_root.join(&spec.band);
    prepare_destination(&dir, policy)?;

    let matcher = BandMatcher::new(spec);
    let mut matches: Vec<PathBuf> = scenes
        .iter()
        .flat_map(|scene| matcher.find(scene))
        .collect();
    matches.sort();
    if matches.is_empty() {
        log::warn!(
            "No {} files matched band {} in {} scenes",
            spec.resolution,
            spec.band,
            scenes.len()
        );
    }

    let mut tiles = BTreeMap::new();
    for source in matches {
        // Matches always have a file name
        let Some(name) = source.file_name() else {
            continue;
        };
        let target = dir.join(name);
        log::debug!("{} -> {}", source.display(), target.display());
        fs::copy(&source, &target)?;
        if let Some(previous) = tiles.insert(target.clone(), source.clone()) {
            log::warn!(
                "{} replaces {} as {}",
                source.display(),
                previous.display(),
                target.display()
            );
        }
    }

    Ok(BandCollection {
        band: spec.band.clone(),
        dir,
        tiles: tiles.into_keys().collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRANULE: &str = "S2A_MSIL2A_20240504T051651_N0510_R062_T44QRD_20240504T100814.SAFE/GRANULE/L2A_T44QRD_A046134_20240504T052238/IMG_DATA";
    const GRANULE_2: &str = "S2B_MSIL2A_20240507T050649_N0510_R019_T44QRE_20240507T090102.SAFE/GRANULE/L2A_T44QRE_A037557_20240507T051629/IMG_DATA";

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, relative.as_bytes()).unwrap();
    }

    fn scene_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (granule, tile) in [(GRANULE, "T44QRD"), (GRANULE_2, "T44QRE")] {
            for (res, band) in [
                ("R10m", "B04_10m"),
                ("R10m", "B08_10m"),
                ("R20m", "B04_20m"),
                ("R20m", "B8A_20m"),
                ("R60m", "B04_60m"),
            ] {
                touch(
                    dir.path(),
                    &format!("{}/{}/{}_20240504T051651_{}.jp2", granule, res, tile, band),
                );
            }
            touch(dir.path(), &format!("{}/R10m/{}_B04_10m.jp2.aux.xml", granule, tile));
        }
        dir
    }

    #[test]
    fn test_matcher_requires_resolution_folder_and_suffix() {
        let matcher = BandMatcher::new(&BandSpec::new("R10m", "B04_10m"));
        assert!(matcher.is_match(Path::new("x/R10m/T44QRD_20240504T051651_B04_10m.jp2")));
        assert!(!matcher.is_match(Path::new("x/R20m/T44QRD_20240504T051651_B04_10m.jp2")));
        assert!(!matcher.is_match(Path::new("x/R10m/T44QRD_20240504T051651_B04_10m.jp2.aux.xml")));
        assert!(!matcher.is_match(Path::new("x/R10m/T44QRD_20240504T051651_B04_10mXjp2")));
    }

    #[test]
    fn test_collect_selects_only_requested_resolution() {
        let tree = scene_tree();
        let dest = tempfile::tempdir().unwrap();

        let collection = collect_band(
            &BandSpec::new("R20m", "B04_20m"),
            &[tree.path().to_path_buf()],
            dest.path(),
            ExistingOutput::Fail,
        )
        .unwrap();

        assert_eq!(collection.tiles.len(), 2);
        for tile in collection.tiles.iter() {
            let name = tile.file_name().unwrap().to_str().unwrap();
            assert!(name.ends_with("_B04_20m.jp2"), "{}", name);
            assert_eq!(tile.parent().unwrap(), dest.path().join("B04_20m"));
        }
    }

    #[test]
    fn test_unmatched_band_yields_empty_collection() {
        let tree = scene_tree();
        let dest = tempfile::tempdir().unwrap();

        let collection = collect_band(
            &BandSpec::new("R10m", "B8A_10m"),
            &[tree.path().to_path_buf()],
            dest.path(),
            ExistingOutput::Fail,
        )
        .unwrap();

        assert!(collection.tiles.is_empty());
        assert!(collection.dir.is_dir());
    }

    #[test]
    fn test_stale_band_directory_respects_policy() {
        let tree = scene_tree();
        let dest = tempfile::tempdir().unwrap();
        touch(dest.path(), "B08_10m/T99XXX_20230101T000000_B08_10m.jp2");
        let spec = BandSpec::new("R10m", "B08_10m");
        let roots = vec![tree.path().to_path_buf()];

        assert!(collect_band(&spec, &roots, dest.path(), ExistingOutput::Fail).is_err());

        let collection =
            collect_band(&spec, &roots, dest.path(), ExistingOutput::Clear).unwrap();
        assert_eq!(collection.tiles.len(), 2);
        assert_eq!(fs::read_dir(&collection.dir).unwrap().count(), 2);
    }

    #[test]
    fn test_only_given_scenes_are_searched() {
        let tree = scene_tree();
        let dest = tempfile::tempdir().unwrap();
        let scene = GRANULE_2.split('/').next().unwrap();

        let collection = collect_band(
            &BandSpec::new("R10m", "B04_10m"),
            &[tree.path().join(scene)],
            dest.path(),
            ExistingOutput::Fail,
        )
        .unwrap();

        assert_eq!(collection.tiles.len(), 1);
        let name = collection.tiles[0].file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("T44QRE_"), "{}", name);
    }

    #[test]
    fn test_duplicate_tile_names_keep_last_match() {
        let tree = tempfile::tempdir().unwrap();
        let dest = tempfile::tempdir().unwrap();
        let tile = "R10m/T44QRD_20240504T051651_B04_10m.jp2";
        let baselines = [
            "S2A_MSIL2A_20240504T051651_N0510_R062_T44QRD_20240504T100814.SAFE",
            "S2A_MSIL2A_20240504T051651_N0511_R062_T44QRD_20240601T080000.SAFE",
        ];
        for scene in baselines {
            touch(tree.path(), &format!("{}/GRANULE/IMG_DATA/{}", scene, tile));
        }
        let roots: Vec<PathBuf> = baselines.iter().map(|s| tree.path().join(s)).collect();

        let collection = collect_band(
            &BandSpec::new("R10m", "B04_10m"),
            &roots,
            dest.path(),
            ExistingOutput::Fail,
        )
        .unwrap();

        assert_eq!(collection.tiles.len(), 1);
        let content = fs::read_to_string(&collection.tiles[0]).unwrap();
        assert!(content.starts_with(baselines[1]), "{}", content);
    }
}
