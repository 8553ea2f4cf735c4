//! Render Worker Library
//!
//! Accepts documents, deduplicates them by content, and renders each unique
//! document in the background while clients poll for the result.
//!
//! ## Module Overview
//!
//! - `chromium`: HTML to PDF renderer driving headless Chromium
//! - `config`: environment-driven worker configuration
//! - `converter`: the `Renderer` contract and the SVG to PDF renderer
//! - `fingerprint`: pluggable content fingerprints for deduplication
//! - `job`: document ids, job and client-facing status models
//! - `queue`: bounded, deduplicating job queue with status tracking
//! - `record`: document records, the `RecordStore` contract, in-memory store
//! - `service`: submission and lookup used by an API layer
//! - `storage`: Redis-backed `RecordStore`
//! - `telemetry`: OpenTelemetry integration and structured logging
//! - `worker`: fixed-size pool of render workers
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use worker_render::{
//!     converter::SvgToPdfConverter,
//!     job::FetchOutcome,
//!     queue::JobQueue,
//!     record::MemoryRecordStore,
//!     service::ConverterService,
//!     worker::{WorkerContext, WorkerPool},
//! };
//!
//! #[tokio::main]
//! async fn main() {
//!     let cancel = CancellationToken::new();
//!     let queue = Arc::new(JobQueue::new(64));
//!     let store = Arc::new(MemoryRecordStore::new());
//!
//!     let pool = WorkerPool::spawn(
//!         4,
//!         WorkerContext {
//!             queue: queue.clone(),
//!             store: store.clone(),
//!             renderer: Arc::new(SvgToPdfConverter::new()),
//!             render_timeout: std::time::Duration::from_secs(30),
//!         },
//!         cancel.clone(),
//!     );
//!
//!     let service = ConverterService::new(queue, store, cancel);
//!     let id = service
//!         .submit_document(br#"<svg xmlns="http://www.w3.org/2000/svg" width="10" height="10"/>"#.to_vec())
//!         .await
//!         .unwrap();
//!
//!     while service.fetch_result(id).await.unwrap() == FetchOutcome::Pending {
//!         tokio::time::sleep(std::time::Duration::from_millis(50)).await;
//!     }
//!
//!     pool.shutdown().await;
//! }
//! ```

pub mod chromium;
pub mod config;
pub mod converter;
pub mod error;
pub mod fingerprint;
pub mod job;
pub mod queue;
pub mod record;
pub mod service;
pub mod storage;
pub mod telemetry;
pub mod worker;
