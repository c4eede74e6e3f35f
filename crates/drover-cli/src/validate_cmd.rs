//! `drover validate`: check a task directory before running it.

use std::path::Path;

use anyhow::{bail, Result};

use drover_core::resolver::DependencyResolver;
use drover_core::scheduler::readiness::ReadinessScheduler;
use drover_core::source::TaskSource;
use drover_files::FileTaskSource;

pub async fn validate(dir: &Path) -> Result<()> {
    let source = FileTaskSource::new(dir);
    let tasks = source.scan().await?;
    if tasks.is_empty() {
        bail!("no task descriptors found in {}", dir.display());
    }
    println!("{} task(s) in {}", tasks.len(), dir.display());

    let resolver = DependencyResolver::new(&tasks);
    if let Some(path) = resolver.detect_cycle() {
        bail!("dependency cycle detected: {}", path.join(" -> "));
    }

    println!("\nExecution levels:");
    for (depth, level) in resolver.levels().iter().enumerate() {
        let ids: Vec<&str> = level.iter().map(|t| t.id.as_str()).collect();
        println!("  {depth}: {}", ids.join(", "));
    }

    let scheduler = ReadinessScheduler::default();
    scheduler.initialize(&tasks)?;

    let mut roles: Vec<&str> = tasks.iter().map(|t| t.role.as_str()).collect();
    roles.sort_unstable();
    roles.dedup();

    println!("\nWorkstream readiness:");
    for role in roles {
        for record in scheduler.ready_workstreams(role) {
            println!(
                "  ready   {}:{} ({} ready, {} blocked, score {})",
                record.role,
                record.workstream,
                record.ready_count,
                record.blocked_count,
                record.score()
            );
        }
        for record in scheduler.blocked_workstreams(role) {
            let blockers: Vec<String> =
                record.blockers.iter().map(ToString::to_string).collect();
            println!(
                "  blocked {}:{} (waiting on {})",
                record.role,
                record.workstream,
                if blockers.is_empty() {
                    "unknown tasks".to_owned()
                } else {
                    blockers.join(", ")
                }
            );
        }
    }

    if let Some(info) = scheduler.detect_potential_deadlock() {
        println!("\nwarning: potential deadlock between roles {:?}", info.roles);
        println!("  {}", info.suggestion);
    }

    println!("\nOK");
    Ok(())
}
