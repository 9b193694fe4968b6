//! Generation tasks and the ordered task store.
//!
//! A [`Task`] is a plain value. Every change goes through a function that
//! takes the current task and returns the next one, and the [`TaskStore`]
//! applies such a function to exactly one task selected by id. Concurrent
//! generations therefore never overwrite each other's results.

use serde::{Deserialize, Serialize};

use crate::ai::AspectRatio;
use crate::payload::ImagePayload;

/// Fresh random identifier for tasks, images and library entries.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    #[default]
    Idle,
    Generating,
    Success,
    Error,
}

/// One image produced for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedImage {
    pub id: String,
    pub data: ImagePayload,
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl GeneratedImage {
    pub fn new(data: ImagePayload, prompt: &str, aspect_ratio: AspectRatio) -> Self {
        Self {
            id: new_id(),
            data,
            prompt: prompt.to_string(),
            aspect_ratio,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// One unit of work: a prompt, its reference images, and its outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub prompt: String,
    pub status: TaskStatus,
    pub reference_images: Vec<ImagePayload>,
    pub generated_images: Vec<GeneratedImage>,
    pub error: Option<String>,
}

impl Task {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            prompt: prompt.into(),
            status: TaskStatus::Idle,
            reference_images: Vec::new(),
            generated_images: Vec::new(),
            error: None,
        }
    }

    /// `true` when the prompt has no visible text.
    pub fn is_blank(&self) -> bool {
        self.prompt.trim().is_empty()
    }

    pub fn with_prompt(&self, prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            ..self.clone()
        }
    }

    /// Union `images` into the reference set, keeping it free of duplicates.
    pub fn with_references<'a>(&self, images: impl IntoIterator<Item = &'a ImagePayload>) -> Self {
        let mut reference_images = self.reference_images.clone();
        for image in images {
            if !reference_images.contains(image) {
                reference_images.push(image.clone());
            }
        }
        Self {
            reference_images,
            ..self.clone()
        }
    }

    /// Drop the reference image at `index`; out of range leaves the task as is.
    pub fn without_reference(&self, index: usize) -> Self {
        let mut next = self.clone();
        if index < next.reference_images.len() {
            next.reference_images.remove(index);
        }
        next
    }

    pub fn generating(&self) -> Self {
        Self {
            status: TaskStatus::Generating,
            error: None,
            ..self.clone()
        }
    }

    pub fn with_generated(&self, image: GeneratedImage) -> Self {
        let mut next = self.clone();
        next.generated_images.push(image);
        next
    }

    pub fn succeeded(&self) -> Self {
        Self {
            status: TaskStatus::Success,
            ..self.clone()
        }
    }

    pub fn failed(&self, message: &str) -> Self {
        Self {
            status: TaskStatus::Error,
            error: Some(message.to_string()),
            ..self.clone()
        }
    }
}

/// Ordered collection of tasks. Insertion order is export order.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    tasks: Vec<Task>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// 1-based position of a task, as used in export file names.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.id == id).map(|i| i + 1)
    }

    pub fn push(&mut self, task: Task) {
        self.tasks.push(task);
    }

    pub fn extend(&mut self, tasks: impl IntoIterator<Item = Task>) {
        self.tasks.extend(tasks);
    }

    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        Some(self.tasks.remove(index))
    }

    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Replace the task `id` with `f(task)`. Returns `false` if it is gone.
    pub fn update(&mut self, id: &str, f: impl FnOnce(&Task) -> Task) -> bool {
        match self.tasks.iter_mut().find(|t| t.id == id) {
            Some(slot) => {
                *slot = f(&*slot);
                true
            }
            None => false,
        }
    }

    /// Replace every task with `f(&tasks)`; `f` must keep ids and order.
    pub fn replace_all(&mut self, f: impl FnOnce(&[Task]) -> Vec<Task>) {
        self.tasks = f(&self.tasks);
    }

    /// Ids of the tasks a batch run should pick up, in order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Generating && !t.is_blank())
            .map(|t| t.id.clone())
            .collect()
    }

    /// `true` if at least one task has produced an image.
    pub fn has_output(&self) -> bool {
        self.tasks.iter().any(|t| !t.generated_images.is_empty())
    }
}

/// Split imported text into prompts: one per line, trimmed, blanks dropped.
pub fn parse_prompts(text: &str) -> Vec<String> {
    text.split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect()
}
