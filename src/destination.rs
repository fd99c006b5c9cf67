//! Preparing the directory a stage writes into.
use crate::config::ExistingOutput;
use crate::error::PipelineError;
use anyhow::Result;
use std::fs;
use std::path::Path;

/// Make sure `dir` exists and satisfies `policy` before a stage writes into it.
pub fn prepare_destination(dir: &Path, policy: ExistingOutput) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)?;
        return Ok(());
    }

    let is_empty = fs::read_dir(dir)?.next().is_none();
    if is_empty {
        return Ok(());
    }

    match policy {
        ExistingOutput::Fail => Err(PipelineError::DestinationNotEmpty(dir.to_path_buf()).into()),
        ExistingOutput::Clear => {
            log::info!("Clearing {}", dir.display());
            fs::remove_dir_all(dir)?;
            fs::create_dir_all(dir)?;
            Ok(())
        }
        ExistingOutput::Keep => {
            log::debug!("Keeping existing contents of {}", dir.display());
            Ok(())
        }
    }
}
