//! Core orchestration engine for drover.
//!
//! Drives a fleet of long-running worker processes through a directed graph
//! of interdependent tasks. Tasks carry a role (skill specialization), a
//! workstream (a serial execution lane), explicit dependencies, and optional
//! completion criteria. The engine decides what is runnable, hands work to
//! idle workers subject to per-role concurrency caps, drives each task to a
//! terminal verdict, and unblocks downstream work on completion.
//!
//! The engine consumes two capability records: a [`source::TaskSource`]
//! (ground truth for tasks, rescanned rather than cached) and a
//! [`source::WorkerSource`] (worker lifecycle plus the
//! `run(name, prompt) -> output` contract). Everything else is internal.

pub mod balancer;
pub mod config;
pub mod model;
pub mod orchestrator;
pub mod queue;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod source;
pub mod tracker;

pub use config::OrchestratorConfig;
pub use model::{Completion, Event, EventType, Priority, StatusChange, Task, TaskStatus};
pub use orchestrator::Orchestrator;
pub use source::{TaskSource, WorkerSource};
