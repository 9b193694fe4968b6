//! The application controller.
//!
//! A [`Session`] owns the task list, the reference library and the
//! generation settings. Each user action is one method; tasks are changed
//! only through [`TaskStore::update`] and the copy-on-write functions on
//! [`Task`].

use anyhow::Result;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::ai::{AspectRatio, ImageGenerator};
use crate::batch::{self, BatchSummary, TaskOutcome};
use crate::config::GenerationSettings;
use crate::export::{self, ExportOutcome};
use crate::library::{self, ReferenceImage, ReferenceLibrary};
use crate::matcher::auto_match;
use crate::payload::ImagePayload;
use crate::task::{Task, TaskStore, parse_prompts};

#[derive(Debug, Default)]
pub struct Session {
    tasks: TaskStore,
    library: ReferenceLibrary,
    settings: GenerationSettings,
}

impl Session {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings,
            ..Default::default()
        }
    }

    pub fn tasks(&self) -> &[Task] {
        self.tasks.tasks()
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Ids a batch run would pick up, in order.
    pub fn pending_ids(&self) -> Vec<String> {
        self.tasks.pending_ids()
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn set_aspect_ratio(&mut self, aspect_ratio: AspectRatio) {
        self.settings.aspect_ratio = aspect_ratio;
    }

    pub fn set_images_per_task(&mut self, count: u8) -> Result<()> {
        let next = GenerationSettings {
            images_per_task: count,
            ..self.settings
        };
        next.validate()?;
        self.settings = next;
        Ok(())
    }

    // ── Tasks ────────────────────────────────────────────────────────

    /// Append an empty task and return its id.
    pub fn add_task(&mut self) -> String {
        let task = Task::new("");
        let id = task.id.clone();
        self.tasks.push(task);
        id
    }

    pub fn update_prompt(&mut self, id: &str, prompt: &str) -> bool {
        self.tasks.update(id, |t| t.with_prompt(prompt))
    }

    pub fn delete_task(&mut self, id: &str) -> bool {
        self.tasks.remove(id).is_some()
    }

    /// Append one task per non-blank line, matched against the whole library.
    ///
    /// Returns the ids of the new tasks.
    pub fn import_prompt_text(&mut self, text: &str) -> Vec<String> {
        let new_tasks: Vec<Task> = parse_prompts(text).into_iter().map(Task::new).collect();
        let new_tasks = auto_match(&new_tasks, self.library.images());
        let ids = new_tasks.iter().map(|t| t.id.clone()).collect();
        self.tasks.extend(new_tasks);
        ids
    }

    /// Text import from a file. An unreadable file adds nothing.
    pub fn import_prompts_file(&mut self, path: &Path) -> Vec<String> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                let ids = self.import_prompt_text(&text);
                log::info!("Imported {} prompt(s) from {}", ids.len(), path.display());
                ids
            }
            Err(e) => {
                log::warn!("Skipping prompt file {}: {e}", path.display());
                Vec::new()
            }
        }
    }

    // ── Reference images ─────────────────────────────────────────────

    /// Add images to the library and match only those against existing tasks.
    pub fn add_references(&mut self, images: Vec<ReferenceImage>) {
        if images.is_empty() {
            return;
        }
        self.tasks.replace_all(|tasks| auto_match(tasks, &images));
        self.library.extend(images);
    }

    /// Bulk image import from files and directories. Returns how many
    /// images were added; unreadable files are skipped.
    pub fn import_references(&mut self, paths: &[PathBuf]) -> usize {
        let images = library::load_references(&library::collect_images(paths));
        let count = images.len();
        self.add_references(images);
        log::info!("Added {count} reference image(s), library now holds {}", self.library.len());
        count
    }

    /// Remove from the library only; tasks keep images already attached.
    pub fn remove_reference(&mut self, id: &str) -> bool {
        self.library.remove(id).is_some()
    }

    pub fn attach_payload(&mut self, task_id: &str, payload: ImagePayload) -> bool {
        self.tasks.update(task_id, |t| t.with_references([&payload]))
    }

    /// Attach an image file to one task by hand.
    pub fn attach_image(&mut self, task_id: &str, path: &Path) -> Result<bool> {
        let payload = ImagePayload::from_file(path)?;
        Ok(self.attach_payload(task_id, payload))
    }

    pub fn remove_task_image(&mut self, task_id: &str, index: usize) -> bool {
        self.tasks.update(task_id, |t| t.without_reference(index))
    }

    /// Drop every task and every library image.
    pub fn clear_all(&mut self) {
        self.tasks.clear();
        self.library.clear();
    }

    // ── Generation ───────────────────────────────────────────────────

    pub async fn generate_all(&mut self, generator: &dyn ImageGenerator) -> Result<BatchSummary> {
        let store = Mutex::new(std::mem::take(&mut self.tasks));
        let summary = batch::generate_all(&store, generator, &self.settings).await;
        self.tasks = store.into_inner();
        summary
    }

    pub async fn generate_task(
        &mut self,
        generator: &dyn ImageGenerator,
        id: &str,
    ) -> Result<Option<TaskOutcome>> {
        let store = Mutex::new(std::mem::take(&mut self.tasks));
        let outcome = batch::generate_task(&store, generator, &self.settings, id).await;
        self.tasks = store.into_inner();
        outcome
    }

    // ── Export ───────────────────────────────────────────────────────

    pub fn export_archive(&self, path: &Path) -> Result<ExportOutcome> {
        export::export_archive(self.tasks(), path)
    }

    pub fn save_all(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        export::save_all(self.tasks(), dir)
    }

    /// Save output `index` of a task under `path`.
    pub fn save_image(&self, task_id: &str, index: usize, path: &Path) -> Result<()> {
        let image = self
            .task(task_id)
            .and_then(|t| t.generated_images.get(index))
            .ok_or_else(|| anyhow::anyhow!("No generated image {index} for task {task_id}"))?;
        export::save_image(&image.data, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskStatus;
    use std::fs;
    use tempfile::TempDir;

    struct EchoGenerator;

    #[async_trait::async_trait]
    impl ImageGenerator for EchoGenerator {
        fn name(&self) -> &str {
            "Echo"
        }

        async fn generate(
            &self,
            prompt: &str,
            _aspect_ratio: AspectRatio,
            _references: &[ImagePayload],
        ) -> Result<ImagePayload> {
            if prompt.contains("refuse") {
                anyhow::bail!("The model refused the prompt");
            }
            Ok(ImagePayload::from_bytes("image/png", prompt.as_bytes()))
        }
    }

    fn reference(name: &str, data: &str) -> ReferenceImage {
        ReferenceImage::new(name, ImagePayload::new("image/png", data))
    }

    fn prompts(session: &Session) -> Vec<&str> {
        session.tasks().iter().map(|t| t.prompt.as_str()).collect()
    }

    // ── text import ──────────────────────────────────────────────────

    #[test]
    fn text_import_creates_tasks_in_order() {
        let mut session = Session::default();
        let ids = session.import_prompt_text("a\n\nb\n  \nc");
        assert_eq!(ids.len(), 3);
        assert_eq!(prompts(&session), vec!["a", "b", "c"]);
        assert!(session.tasks().iter().all(|t| t.status == TaskStatus::Idle));
    }

    #[test]
    fn text_import_appends_and_matches_library() {
        let mut session = Session::default();
        session.add_references(vec![reference("girl", "G")]);
        session.import_prompt_text("first");
        session.import_prompt_text("a Girl reading\nno match");

        assert_eq!(prompts(&session), vec!["first", "a Girl reading", "no match"]);
        assert_eq!(session.tasks()[1].reference_images.len(), 1);
        assert!(session.tasks()[2].reference_images.is_empty());
    }

    #[test]
    fn text_import_unreadable_file_adds_nothing() {
        let mut session = Session::default();
        assert!(session.import_prompts_file(Path::new("/nonexistent/prompts.txt")).is_empty());
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn text_import_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("prompts.txt");
        fs::write(&path, "sunset\n\ncity at night\n").unwrap();

        let mut session = Session::default();
        assert_eq!(session.import_prompts_file(&path).len(), 2);
        assert_eq!(prompts(&session), vec!["sunset", "city at night"]);
    }

    // ── reference import ─────────────────────────────────────────────

    #[test]
    fn new_references_match_existing_tasks() {
        let mut session = Session::default();
        session.import_prompt_text("girl with a hat\nboy");
        session.add_references(vec![reference("girl", "G"), reference("hat", "H")]);

        assert_eq!(session.tasks()[0].reference_images.len(), 2);
        assert!(session.tasks()[1].reference_images.is_empty());
        assert_eq!(session.library().len(), 2);
    }

    #[test]
    fn only_new_references_are_matched_on_import() {
        let mut session = Session::default();
        session.add_references(vec![reference("girl", "G")]);
        let id = session.import_prompt_text("girl and dog").remove(0);
        session.remove_task_image(&id, 0);
        assert!(session.task(&id).unwrap().reference_images.is_empty());

        session.add_references(vec![reference("dog", "D")]);
        let refs = &session.task(&id).unwrap().reference_images;
        assert_eq!(refs, &vec![ImagePayload::new("image/png", "D")]);
    }

    #[test]
    fn import_references_from_directory() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("girl.png"), b"g").unwrap();
        fs::write(dir.path().join("notes.txt"), b"n").unwrap();

        let mut session = Session::default();
        session.import_prompt_text("a girl");
        assert_eq!(session.import_references(&[dir.path().to_path_buf()]), 1);
        assert_eq!(session.library().images()[0].name, "girl");
        assert_eq!(session.tasks()[0].reference_images.len(), 1);
    }

    #[test]
    fn removing_reference_keeps_task_copy() {
        let mut session = Session::default();
        session.import_prompt_text("girl");
        let girl = reference("girl", "G");
        let girl_id = girl.id.clone();
        session.add_references(vec![girl]);

        assert!(session.remove_reference(&girl_id));
        assert!(session.library().is_empty());
        assert_eq!(session.tasks()[0].reference_images.len(), 1);
    }

    #[test]
    fn manual_attach_dedupes() {
        let mut session = Session::default();
        let id = session.add_task();
        let payload = ImagePayload::new("image/png", "P");

        assert!(session.attach_payload(&id, payload.clone()));
        assert!(session.attach_payload(&id, payload));
        assert_eq!(session.task(&id).unwrap().reference_images.len(), 1);
        assert!(!session.attach_payload("missing", ImagePayload::new("image/png", "Q")));
    }

    #[test]
    fn attach_image_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("style.jpg");
        fs::write(&path, b"jpeg").unwrap();

        let mut session = Session::default();
        let id = session.add_task();
        assert!(session.attach_image(&id, &path).unwrap());
        assert_eq!(
            session.task(&id).unwrap().reference_images[0].mime_type(),
            "image/jpeg"
        );
        assert!(session.attach_image(&id, &dir.path().join("missing.png")).is_err());
    }

    // ── task editing ─────────────────────────────────────────────────

    #[test]
    fn add_update_delete_task() {
        let mut session = Session::default();
        let id = session.add_task();
        assert!(session.task(&id).unwrap().is_blank());

        assert!(session.update_prompt(&id, "a lighthouse"));
        assert_eq!(session.task(&id).unwrap().prompt, "a lighthouse");

        assert!(session.delete_task(&id));
        assert!(!session.delete_task(&id));
        assert!(session.tasks().is_empty());
    }

    #[test]
    fn pending_ids_skip_blank_tasks() {
        let mut session = Session::default();
        session.add_task();
        let ids = session.import_prompt_text("a\nb");
        assert_eq!(session.pending_ids(), ids);
    }

    #[test]
    fn clear_all_empties_everything() {
        let mut session = Session::default();
        session.import_prompt_text("a\nb");
        session.add_references(vec![reference("a", "A")]);
        session.clear_all();
        assert!(session.tasks().is_empty());
        assert!(session.library().is_empty());
    }

    #[test]
    fn images_per_task_is_validated() {
        let mut session = Session::default();
        assert!(session.set_images_per_task(4).is_ok());
        assert!(session.set_images_per_task(0).is_err());
        assert!(session.set_images_per_task(5).is_err());
        assert_eq!(session.settings().images_per_task, 4);
    }

    // ── generation + export ──────────────────────────────────────────

    #[tokio::test]
    async fn generate_then_export() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::default();
        session.set_aspect_ratio(AspectRatio::Square);
        session.set_images_per_task(2).unwrap();
        session.import_prompt_text("a cat\nrefuse this\na dog");

        let summary = session.generate_all(&EchoGenerator).await.unwrap();
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.images, 4);

        let failed = &session.tasks()[1];
        assert_eq!(failed.status, TaskStatus::Error);
        assert_eq!(failed.error.as_deref(), Some("The model refused the prompt"));

        let path = dir.path().join("out.zip");
        match session.export_archive(&path).unwrap() {
            ExportOutcome::Written { files, .. } => assert_eq!(files, 4),
            ExportOutcome::Empty => panic!("expected an archive"),
        }

        let saved = session.save_all(&dir.path().join("split")).unwrap();
        let names: Vec<_> = saved
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["1.png", "1-1.png", "3.png", "3-1.png"]);
    }

    #[tokio::test]
    async fn generate_single_task_and_save() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::default();
        let ids = session.import_prompt_text("one\ntwo");

        let outcome = session.generate_task(&EchoGenerator, &ids[1]).await.unwrap().unwrap();
        assert_eq!(outcome.status, TaskStatus::Success);
        assert_eq!(session.task(&ids[0]).unwrap().status, TaskStatus::Idle);

        let path = dir.path().join("two.png");
        session.save_image(&ids[1], 0, &path).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"two");
        assert!(session.save_image(&ids[0], 0, &path).is_err());
    }

    #[tokio::test]
    async fn invalid_settings_keep_tasks_untouched() {
        let mut session = Session::new(GenerationSettings {
            aspect_ratio: AspectRatio::Square,
            images_per_task: 0,
        });
        session.import_prompt_text("a\nb");

        assert!(session.generate_all(&EchoGenerator).await.is_err());
        assert_eq!(session.tasks().len(), 2);
        assert!(session.tasks().iter().all(|t| t.status == TaskStatus::Idle));
    }

    #[test]
    fn export_with_no_images_is_empty() {
        let dir = TempDir::new().unwrap();
        let mut session = Session::default();
        session.import_prompt_text("a\nb");
        let path = dir.path().join("out.zip");
        assert_eq!(session.export_archive(&path).unwrap(), ExportOutcome::Empty);
        assert!(!path.exists());
    }
}
