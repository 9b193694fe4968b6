//! Bounded-concurrency batch generation.
//!
//! Eligible tasks are split into consecutive chunks of [`BATCH_CONCURRENCY`].
//! The tasks of one chunk run concurrently and the next chunk only starts
//! once every task of the current one has settled, so at most
//! `BATCH_CONCURRENCY` API calls are in flight at any time.

use anyhow::Result;
use futures::future::join_all;
use serde::Serialize;
use tokio::sync::Mutex;

use crate::ai::ImageGenerator;
use crate::config::GenerationSettings;
use crate::task::{GeneratedImage, Task, TaskStatus, TaskStore};

/// Number of tasks generated at the same time. Not user configurable.
pub const BATCH_CONCURRENCY: usize = 2;

/// Message stored on a task when the back-end error carries no text.
pub const GENERIC_FAILURE: &str = "Generation failed";

/// Aggregate outcome of a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Images produced during this run.
    pub images: usize,
}

/// Split `ids` into consecutive chunks of `limit`, keeping their order.
pub fn plan_chunks(ids: &[String], limit: usize) -> Vec<Vec<String>> {
    ids.chunks(limit.max(1)).map(<[String]>::to_vec).collect()
}

/// Generate every pending task in the store.
///
/// Pending means: not currently generating and with a non-blank prompt.
/// A failing task only marks itself as failed; the rest of the batch
/// carries on. Invalid `settings` are rejected before any task is touched.
pub async fn generate_all(
    store: &Mutex<TaskStore>,
    generator: &dyn ImageGenerator,
    settings: &GenerationSettings,
) -> Result<BatchSummary> {
    settings.validate()?;
    let pending = store.lock().await.pending_ids();
    let chunks = plan_chunks(&pending, BATCH_CONCURRENCY);
    let total = chunks.len();

    log::info!(
        "Generating {} task(s) in {} chunk(s) with {} ({} image(s) each, {})",
        pending.len(),
        total,
        generator.name(),
        settings.images_per_task,
        settings.aspect_ratio
    );

    let mut summary = BatchSummary::default();
    for (i, chunk) in chunks.iter().enumerate() {
        log::info!("[{}/{}] Chunk of {} task(s)", i + 1, total, chunk.len());

        let outcomes = join_all(
            chunk
                .iter()
                .map(|id| run_task(store, generator, settings, id)),
        )
        .await;

        for outcome in outcomes.into_iter().flatten() {
            summary.attempted += 1;
            summary.images += outcome.images;
            match outcome.status {
                TaskStatus::Success => summary.succeeded += 1,
                _ => summary.failed += 1,
            }
        }
    }

    log::info!(
        "Batch done: {} succeeded, {} failed, {} image(s)",
        summary.succeeded,
        summary.failed,
        summary.images
    );
    Ok(summary)
}

/// What one task run ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub status: TaskStatus,
    pub images: usize,
}

/// Generate `settings.images_per_task` images for one task, one at a time.
///
/// Returns `None` without touching the store when the task does not exist or
/// its prompt is blank. The prompt and references are captured when the run
/// starts. Each image is stored as soon as it arrives; on failure the task
/// keeps the images it already got.
pub async fn generate_task(
    store: &Mutex<TaskStore>,
    generator: &dyn ImageGenerator,
    settings: &GenerationSettings,
    id: &str,
) -> Result<Option<TaskOutcome>> {
    settings.validate()?;
    Ok(run_task(store, generator, settings, id).await)
}

async fn run_task(
    store: &Mutex<TaskStore>,
    generator: &dyn ImageGenerator,
    settings: &GenerationSettings,
    id: &str,
) -> Option<TaskOutcome> {
    let task = {
        let mut store = store.lock().await;
        let task = store.get(id)?.clone();
        if task.is_blank() {
            return None;
        }
        store.update(id, Task::generating);
        task
    };

    log::info!("  Generating: {}", task.prompt);

    let mut images = 0;
    for n in 0..settings.images_per_task {
        match generator
            .generate(&task.prompt, settings.aspect_ratio, &task.reference_images)
            .await
        {
            Ok(data) => {
                let image = GeneratedImage::new(data, &task.prompt, settings.aspect_ratio);
                store.lock().await.update(id, |t| t.with_generated(image));
                images += 1;
                log::debug!("  {} image {}/{} done", task.prompt, n + 1, settings.images_per_task);
            }
            Err(e) => {
                let message = match e.to_string() {
                    m if m.trim().is_empty() => GENERIC_FAILURE.to_string(),
                    m => m,
                };
                log::warn!("  {} failed: {message}", task.prompt);
                store.lock().await.update(id, |t| t.failed(&message));
                return Some(TaskOutcome {
                    status: TaskStatus::Error,
                    images,
                });
            }
        }
    }

    store.lock().await.update(id, Task::succeeded);
    Some(TaskOutcome {
        status: TaskStatus::Success,
        images,
    })
}
