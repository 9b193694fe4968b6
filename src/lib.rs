//! # gemini-batch
//!
//! Batch image generation with Google Gemini. Import prompts from text files,
//! attach reference images (by hand or automatically by file name), generate
//! with bounded concurrency, and export everything as one zip archive.
//!
//! ## Quick Start
//!
//! The [`session::Session`] controller holds the whole state and exposes
//! every action:
//!
//! ```rust,no_run
//! use gemini_batch::ai::GeminiService;
//! use gemini_batch::config::Config;
//! use gemini_batch::export::ExportOutcome;
//! use gemini_batch::session::Session;
//! use std::path::{Path, PathBuf};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load(Some("config.json".as_ref()))?;
//!     let api_key = config.gemini.resolved_api_key().unwrap_or_default();
//!     let service = GeminiService::new(api_key, config.gemini.model.clone());
//!
//!     let mut session = Session::new(config.generation);
//!
//!     // `girl.png` is attached to every prompt mentioning "girl"
//!     session.import_references(&[PathBuf::from("./refs")]);
//!     session.import_prompts_file(Path::new("prompts.txt"));
//!
//!     let summary = session.generate_all(&service).await?;
//!     println!("{} succeeded, {} failed", summary.succeeded, summary.failed);
//!
//!     if let ExportOutcome::Written { path, files, .. } =
//!         session.export_archive(Path::new("gemini_batch_output.zip"))?
//!     {
//!         println!("Wrote {files} image(s) to {}", path.display());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Export Naming
//!
//! | Task position | Output | File |
//! |---------------|--------|------|
//! | 1 | first | `1.png` |
//! | 1 | second | `1-1.png` |
//! | 1 | third | `1-2.png` |
//! | 2 | first | `2.png` |
//!
//! ## Modules
//!
//! - [`ai`] — Image generator trait, aspect ratios, and the Gemini client
//! - [`batch`] — Chunked, bounded-concurrency batch runner
//! - [`config`] — Configuration types and loading/saving
//! - [`export`] — Zip archive and single-image export
//! - [`library`] — Reference image library and file collection
//! - [`matcher`] — File-name-to-prompt reference matching
//! - [`payload`] — Self-describing base64 image payloads
//! - [`session`] — Application controller tying everything together
//! - [`task`] — Tasks, generated images, and the task store

pub mod ai;
pub mod batch;
pub mod config;
pub mod export;
pub mod library;
pub mod matcher;
pub mod payload;
pub mod session;
pub mod task;
