//! On-disk persistence for drover.
//!
//! Tasks live as Markdown files with YAML front matter in a flat
//! directory; the worker registry is a single versioned JSON document.
//! [`FileTaskSource`] implements the engine's `TaskSource` contract over
//! those files, rescanned on demand rather than cached.

pub mod descriptor;
pub mod registry;
pub mod store;

pub use descriptor::{DescriptorError, TaskDocument};
pub use registry::{RegistryError, WorkerRecord, WorkerRegistry};
pub use store::FileTaskSource;
