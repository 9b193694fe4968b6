use crate::library::ReferenceImage;
use crate::task::Task;

/// Link reference images to tasks by name.
///
/// A reference matches a task when its lower-cased `name` occurs anywhere in
/// the lower-cased prompt, so `girl` matches "Girl", "agirl" and "girl2".
/// Matched payloads are merged into each task's reference set without
/// duplicates; nothing is ever removed. Tasks without a match come back
/// unchanged, and running the function again with the same references is a
/// no-op. An empty name is a substring of every prompt and matches them all.
///
/// # Example
///
/// ```rust
/// use gemini_batch::library::ReferenceImage;
/// use gemini_batch::matcher::auto_match;
/// use gemini_batch::payload::ImagePayload;
/// use gemini_batch::task::Task;
///
/// let girl = ReferenceImage::new("girl", ImagePayload::new("image/png", "AAAA"));
/// let tasks = auto_match(&[Task::new("A Girl at the beach")], &[girl]);
/// assert_eq!(tasks[0].reference_images.len(), 1);
/// ```
pub fn auto_match(tasks: &[Task], references: &[ReferenceImage]) -> Vec<Task> {
    if references.is_empty() {
        return tasks.to_vec();
    }

    let keys: Vec<(String, &ReferenceImage)> = references
        .iter()
        .map(|r| (r.name.to_lowercase(), r))
        .collect();

    tasks
        .iter()
        .map(|task| {
            let prompt = task.prompt.to_lowercase();
            let matched: Vec<_> = keys
                .iter()
                .filter(|(key, _)| prompt.contains(key.as_str()))
                .map(|(_, r)| &r.data)
                .collect();

            if matched.is_empty() {
                task.clone()
            } else {
                log::debug!("Task {:?} matched {} reference image(s)", task.prompt, matched.len());
                task.with_references(matched)
            }
        })
        .collect()
}
