//! `drover status`: task table and aggregate counts.

use std::path::Path;

use anyhow::Result;

use drover_core::source::TaskSource;
use drover_files::FileTaskSource;

pub async fn status(dir: &Path) -> Result<()> {
    let source = FileTaskSource::new(dir);
    let tasks = source.scan().await?;

    println!(
        "{:<16} {:<12} {:<10} {:<10} {:<14} {:<12} TITLE",
        "ID", "STATUS", "PRIORITY", "ROLE", "WORKSTREAM", "WORKER"
    );
    for task in &tasks {
        println!(
            "{:<16} {:<12} {:<10} {:<10} {:<14} {:<12} {}",
            task.id,
            task.status.to_string(),
            task.priority.to_string(),
            task.role,
            task.effective_workstream(),
            task.assigned_worker.as_deref().unwrap_or("-"),
            task.title,
        );
    }

    let stats = source.stats().await?;
    println!("\n{} task(s)", stats.total);

    let mut by_status: Vec<(String, usize)> = stats
        .by_status
        .iter()
        .map(|(status, count)| (status.to_string(), *count))
        .collect();
    by_status.sort();
    let rendered: Vec<String> = by_status
        .iter()
        .map(|(status, count)| format!("{status}={count}"))
        .collect();
    println!("by status:   {}", rendered.join(" "));

    let mut by_role: Vec<(String, usize)> = stats.by_role.into_iter().collect();
    by_role.sort();
    let rendered: Vec<String> = by_role
        .iter()
        .map(|(role, count)| format!("{role}={count}"))
        .collect();
    println!("by role:     {}", rendered.join(" "));

    let mut by_priority: Vec<(String, usize)> = stats
        .by_priority
        .iter()
        .map(|(priority, count)| (priority.to_string(), *count))
        .collect();
    by_priority.sort();
    let rendered: Vec<String> = by_priority
        .iter()
        .map(|(priority, count)| format!("{priority}={count}"))
        .collect();
    println!("by priority: {}", rendered.join(" "));

    Ok(())
}
