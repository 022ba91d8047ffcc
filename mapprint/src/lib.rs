//! MapPrint - Print-job orchestration for map rasters
//!
//! This library turns a declarative map-print spec (layers, geographic
//! center, scale, DPI, output size, projection) into a rasterized PNG by
//! progressively loading tiled or single-request map layers, compositing
//! them in order, and streaming fractional progress to the caller while the
//! work is still in flight.
//!
//! # Architecture
//!
//! ```text
//! PrintSpec ──► PrintService ──JobRequest──► PrintDaemon
//!                    ▲                            │
//!                    │                      JobCoordinator
//!              JobStatusStream                    │
//!             (replay-latest)          ┌──────────┼──────────┐
//!                    ▲                 ▼          ▼          ▼
//!                    │           LayerRenderer  ...one per layer
//!                    │                 │
//!                    └── aggregator ◄──┘ (progress fan-in, compositing)
//! ```
//!
//! Each job fans its layers out to renderer tasks that share one
//! center-first fetch queue; an aggregator task serializes their progress
//! events, emits non-decreasing job progress snapshots, and produces
//! exactly one finished snapshot carrying the composited artifact.
//!
//! # Example
//!
//! ```ignore
//! use mapprint::service::PrintService;
//! use mapprint::spec::{Layer, OutputSize, PrintSpec};
//!
//! let service = PrintService::start(Default::default())?;
//! let artifact = service
//!     .print(PrintSpec {
//!         layers: vec![Layer::Xyz {
//!             url: "https://{a-c}.tile.openstreetmap.org/{z}/{x}/{y}.png".into(),
//!             opacity: 1.0,
//!         }],
//!         size: OutputSize::pixels(800.0, 600.0),
//!         center: [12.0, 48.0],
//!         dpi: 200.0,
//!         scale: 40_000_000.0,
//!         projection: "EPSG:3857".into(),
//!         projection_definition: None,
//!     })
//!     .await?;
//! ```

pub mod compose;
pub mod coordinator;
pub mod error;
pub mod exchange;
pub mod frame;
pub mod job;
pub mod layer;
pub mod logging;
pub mod projection;
pub mod provider;
pub mod service;
pub mod spec;
pub mod tile;

pub use error::PrintError;
pub use exchange::JobStatusStream;
pub use job::{JobId, JobStatus, JobStatusSnapshot};
pub use projection::{ProjectionDefinition, ProjectionRegistry};
pub use service::{DaemonConfig, PrintService};
pub use spec::{Layer, OutputSize, PrintSpec};
