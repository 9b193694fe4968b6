use anyhow::{Context, Result};
use std::io::{Cursor, Seek, Write};
use std::path::{Path, PathBuf};

use crate::payload::ImagePayload;
use crate::task::Task;

/// Result of a batch export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// No task has produced an image; nothing was written.
    Empty,
    Written {
        path: PathBuf,
        files: usize,
        bytes: u64,
    },
}

/// File name for output `index` (0-based) of the task at `position` (1-based).
///
/// The first image is `3.png`, later ones `3-1.png`, `3-2.png`, ...
pub fn export_file_name(position: usize, index: usize, extension: &str) -> String {
    if index == 0 {
        format!("{position}.{extension}")
    } else {
        format!("{position}-{index}.{extension}")
    }
}

/// Every generated image with its export file name, in task order.
pub fn export_entries(tasks: &[Task]) -> Vec<(String, &ImagePayload)> {
    tasks
        .iter()
        .enumerate()
        .flat_map(|(t, task)| {
            task.generated_images.iter().enumerate().map(move |(i, image)| {
                (export_file_name(t + 1, i, image.data.extension()), &image.data)
            })
        })
        .collect()
}

/// Write all generated images into a zip archive.
///
/// Returns the number of files written.
pub fn write_archive<W: Write + Seek>(tasks: &[Task], writer: W) -> Result<usize> {
    let mut zip = zip::ZipWriter::new(writer);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated);

    let entries = export_entries(tasks);
    for (name, payload) in &entries {
        let bytes = payload
            .decode()
            .with_context(|| format!("Failed to decode image {name}"))?;
        zip.start_file(name.as_str(), options)
            .with_context(|| format!("Failed to add {name} to archive"))?;
        zip.write_all(&bytes)
            .with_context(|| format!("Failed to write {name} to archive"))?;
    }

    let mut inner = zip.finish().context("Failed to finalize archive")?;
    inner.flush().context("Failed to flush archive")?;
    Ok(entries.len())
}

/// Package every generated image into one archive at `path`.
///
/// Nothing is created when there is no image to export. The archive is
/// assembled in memory first, so an image that fails to decode leaves no
/// file behind at `path`.
///
/// # Example
///
/// ```rust,no_run
/// use gemini_batch::export::{ExportOutcome, export_archive};
///
/// # fn example(tasks: &[gemini_batch::task::Task]) -> anyhow::Result<()> {
/// match export_archive(tasks, "gemini_batch_output.zip".as_ref())? {
///     ExportOutcome::Empty => println!("No images to export."),
///     ExportOutcome::Written { path, files, .. } => {
///         println!("Wrote {files} image(s) to {}", path.display())
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn export_archive(tasks: &[Task], path: &Path) -> Result<ExportOutcome> {
    if tasks.iter().all(|t| t.generated_images.is_empty()) {
        log::info!("No images to export");
        return Ok(ExportOutcome::Empty);
    }

    let mut buf = Cursor::new(Vec::new());
    let files = write_archive(tasks, &mut buf)?;
    let archive = buf.into_inner();
    std::fs::write(path, &archive)
        .with_context(|| format!("Failed to write archive {}", path.display()))?;
    let bytes = archive.len() as u64;

    log::info!("Archive written: {} ({files} file(s), {bytes} bytes)", path.display());
    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        files,
        bytes,
    })
}

/// Save one image under a caller-chosen path.
pub fn save_image(payload: &ImagePayload, path: &Path) -> Result<()> {
    let bytes = payload.decode()?;
    std::fs::write(path, bytes)
        .with_context(|| format!("Failed to write image {}", path.display()))?;
    log::debug!("Saved {}", path.display());
    Ok(())
}

/// Save every generated image into `dir` using the archive naming.
pub fn save_all(tasks: &[Task], dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    export_entries(tasks)
        .into_iter()
        .map(|(name, payload)| {
            let path = dir.join(name);
            save_image(payload, &path)?;
            Ok(path)
        })
        .collect()
}
