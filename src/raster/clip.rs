use crate::error::PipelineError;
use anyhow::Result;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

pub const CLIPPED_FILE: &str = "clipped.tiff";
const GDALWARP: &str = "gdalwarp";

#[derive(Debug, Clone)]
pub struct ClipOptions {
    pub cutline: PathBuf,
    pub nodata: f64,
    pub crop_to_cutline: bool,
}

impl ClipOptions {
    pub fn args(self: &Self, src: &Path, dst: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-overwrite".into(),
            "-of".into(),
            "GTiff".into(),
            "-cutline".into(),
            self.cutline.clone().into(),
            "-dstnodata".into(),
            self.nodata.to_string().into(),
        ];
        if self.crop_to_cutline {
            args.push("-crop_to_cutline".into());
        }
        args.push(src.into());
        args.push(dst.into());
        args
    }
}

/// Mask `src` to the cutline polygon with `gdalwarp`, writing `dst`.
pub fn clip(src: &Path, dst: &Path, options: &ClipOptions) -> Result<PathBuf> {
    log::info!("Clipping {} to {}", src.display(), options.cutline.display());
    let args = options.args(src, dst);
    let command = format!(
        "{} {}",
        GDALWARP,
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    log::debug!("{}", command);

    let output = Command::new(GDALWARP)
        .args(&args)
        .output()
        .map_err(|e| PipelineError::CommandFailed {
            command: command.clone(),
            stderr: e.to_string(),
        })?;
    if !output.status.success() {
        return Err(PipelineError::CommandFailed {
            command,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
        .into());
    }

    Ok(dst.to_path_buf())
}
