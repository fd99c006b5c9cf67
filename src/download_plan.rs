use crate::copernicus::ProductCatalog;
use crate::source::ProductSource;
use anyhow::Result;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DownloadTask {
    product_id: String,
    name: String,
    output: PathBuf,
    size: Option<u64>,
}

impl DownloadTask {
    pub fn new(product_id: &str, name: &str, output: &Path, size: Option<u64>) -> Self {
        DownloadTask {
            product_id: product_id.to_string(),
            name: name.to_string(),
            output: output.to_path_buf(),
            size,
        }
    }

    pub fn output(self: &Self) -> &Path {
        &self.output
    }
}

#[derive(Deserialize, Serialize, Debug)]
pub struct DownloadPlan {
    tasks: Vec<DownloadTask>,
}

/// One task per catalog product, each saved as `<output_dir>/<product name>.zip`.
pub fn generate_download_plan(catalog: &ProductCatalog, output_dir: &Path) -> DownloadPlan {
    let tasks = catalog
        .iter()
        .map(|product| {
            let stem = product.name.trim_end_matches(".SAFE");
            let output = output_dir.join(format!("{}.zip", stem));
            DownloadTask::new(&product.id, &product.name, &output, product.size)
        })
        .collect();
    DownloadPlan::new(tasks)
}

impl DownloadPlan {
    pub fn new(tasks: Vec<DownloadTask>) -> Self {
        Self { tasks }
    }

    pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let plan: Self = serde_json::from_str(&content)?;
        Ok(plan)
    }

    pub fn write<P: AsRef<Path>>(self: &Self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn tasks(self: &Self) -> &[DownloadTask] {
        &self.tasks
    }

    /// Download every task in order. The first failure aborts the plan.
    pub async fn execute(self: &Self, source: &impl ProductSource) -> Result<Vec<PathBuf>> {
        let mut outputs = vec![];
        for (i, task) in self.tasks.iter().enumerate() {
            log::info!("Downloading {}/{}: {}", i + 1, self.tasks.len(), task.name);
            outputs.push(try_download(source, task).await?);
        }
        Ok(outputs)
    }
}

pub async fn try_download(source: &impl ProductSource, task: &DownloadTask) -> Result<PathBuf> {
    // Check if the output file already exists; return early if so
    let dst = task.output.as_path();
    if dst.exists() {
        log::info!("Output file already exists: {}", dst.display());
        return Ok(dst.to_path_buf());
    }

    if let Some(parent_dir) = dst.parent() {
        fs::create_dir_all(parent_dir)?;
    }

    // Check if partial file exists and get its size
    let partial = partial_path(dst);
    let mut partial_file = OpenOptions::new()
        .read(true)
        .create(true)
        .append(true)
        .open(&partial)?;
    let mut byte_count = partial_file.metadata()?.len();

    let complete = matches!(task.size, Some(size) if size > 0 && byte_count >= size);
    if !complete {
        if byte_count > 0 {
            match task.size {
                Some(size) => log::info!(
                    "Resuming download from {:.2}% completion",
                    (byte_count as f64 / size as f64) * 100.
                ),
                None => log::info!("Resuming download from byte {}", byte_count),
            }
        }

        let mut stream = source.get_product(&task.product_id, byte_count).await?;
        if byte_count > 0 && !stream.resumed {
            log::warn!("Server ignored the range request, restarting download");
            partial_file.set_len(0)?;
            byte_count = 0;
        }
        log::debug!(
            "Streaming {} bytes into {}",
            stream
                .content_length
                .map(|n| n.to_string())
                .unwrap_or_else(|| "an unknown number of".to_string()),
            partial.display()
        );

        while let Some(bytes) = stream.body.try_next().await? {
            partial_file.write_all(&bytes)?;
            byte_count += bytes.len() as u64;
        }
        partial_file.flush()?;
    }

    if let Some(size) = task.size {
        if size != byte_count {
            log::warn!(
                "{}: catalog lists {} bytes, received {}",
                task.name,
                size,
                byte_count
            );
        }
    }

    log::info!("Download complete: {}", dst.display());
    // Rename the file to remove .partial suffix
    fs::rename(&partial, dst)?;

    Ok(dst.to_path_buf())
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
