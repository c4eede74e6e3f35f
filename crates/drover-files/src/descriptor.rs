//! Task descriptor format: YAML front matter + Markdown body.
//!
//! A descriptor is UTF-8 text with YAML front matter between `---`
//! markers on their own lines, followed by a free-form Markdown body.
//! `id`, `title`, and `role` are required; unknown front-matter keys are
//! preserved on round-trip.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drover_core::model::{Completion, Priority, Task, TaskStatus};

/// Errors from parsing or rendering a descriptor.
#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("missing front matter: expected `---` markers on their own lines")]
    MissingFrontMatter,

    #[error("invalid front matter: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("missing required front-matter key {0:?}")]
    MissingKey(&'static str),

    #[error("invalid {key} value {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// On-disk shape of the front matter. Unknown keys land in `extra` and
/// survive a round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct FrontMatter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    workstream: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    priority: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    depends_on: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    assigned_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    completion: Option<Completion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    failure_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    log_file: Option<String>,
    #[serde(flatten)]
    extra: serde_yaml::Mapping,
}

/// A parsed task descriptor: the task plus any unrecognized front-matter
/// keys, kept so edits round-trip.
#[derive(Debug, Clone)]
pub struct TaskDocument {
    pub task: Task,
    extra: serde_yaml::Mapping,
}

impl TaskDocument {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            extra: serde_yaml::Mapping::new(),
        }
    }

    /// Parse a descriptor file's contents.
    pub fn parse(content: &str) -> Result<Self, DescriptorError> {
        let (front, body) = split_front_matter(content)?;
        let fm: FrontMatter = serde_yaml::from_str(front)?;

        let id = fm
            .id
            .filter(|s| !s.is_empty())
            .ok_or(DescriptorError::MissingKey("id"))?;
        let title = fm
            .title
            .filter(|s| !s.is_empty())
            .ok_or(DescriptorError::MissingKey("title"))?;
        let role = fm
            .role
            .filter(|s| !s.is_empty())
            .ok_or(DescriptorError::MissingKey("role"))?;

        let priority = match fm.priority.as_deref() {
            None => Priority::default(),
            Some(raw) => raw.parse().map_err(|_| DescriptorError::InvalidValue {
                key: "priority",
                value: raw.to_owned(),
            })?,
        };
        let status = match fm.status.as_deref() {
            None | Some("") => TaskStatus::default(),
            Some(raw) => raw.parse().map_err(|_| DescriptorError::InvalidValue {
                key: "status",
                value: raw.to_owned(),
            })?,
        };

        let mut task = Task::new(id, title, role);
        task.content = body.trim().to_owned();
        task.workstream = fm.workstream.unwrap_or_default();
        task.project = fm.project.unwrap_or_default();
        task.priority = priority;
        task.status = status;
        task.depends_on = fm.depends_on.unwrap_or_default();
        task.assigned_worker = fm.assigned_to;
        task.completion = fm.completion;
        task.tags = fm.tags.unwrap_or_default();
        task.failure_message = fm.failure_message;
        task.log_path = fm.log_file;

        Ok(Self {
            task,
            extra: fm.extra,
        })
    }

    /// Render the descriptor back to file contents.
    pub fn render(&self) -> Result<String, DescriptorError> {
        let task = &self.task;
        let fm = FrontMatter {
            id: Some(task.id.clone()),
            title: Some(task.title.clone()),
            role: Some(task.role.clone()),
            workstream: none_if_empty(&task.workstream),
            project: none_if_empty(&task.project),
            priority: (task.priority != Priority::default())
                .then(|| task.priority.to_string()),
            status: (task.status != TaskStatus::default())
                .then(|| task.status.to_string()),
            depends_on: (!task.depends_on.is_empty()).then(|| task.depends_on.clone()),
            assigned_to: task.assigned_worker.clone(),
            completion: task.completion.clone(),
            tags: (!task.tags.is_empty()).then(|| task.tags.clone()),
            failure_message: task.failure_message.clone(),
            log_file: task.log_path.clone(),
            extra: self.extra.clone(),
        };

        let yaml = serde_yaml::to_string(&fm)?;
        let mut out = String::with_capacity(yaml.len() + task.content.len() + 16);
        out.push_str("---\n");
        out.push_str(&yaml);
        out.push_str("---\n");
        if !task.content.is_empty() {
            out.push('\n');
            out.push_str(&task.content);
            out.push('\n');
        }
        Ok(out)
    }
}

fn none_if_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_owned())
}

/// Split `---`-delimited front matter from the body.
fn split_front_matter(content: &str) -> Result<(&str, &str), DescriptorError> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))
        .ok_or(DescriptorError::MissingFrontMatter)?;

    // Closing marker on its own line, or closing the file.
    for marker in ["\n---\n", "\n---\r\n"] {
        if let Some(end) = rest.find(marker) {
            return Ok((&rest[..end + 1], &rest[end + marker.len()..]));
        }
    }
    if let Some(front) = rest.strip_suffix("\n---").or_else(|| rest.strip_suffix("\n---\n")) {
        return Ok((front, ""));
    }
    Err(DescriptorError::MissingFrontMatter)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = "---\n\
id: auth-1\n\
title: Implement login\n\
role: be\n\
workstream: auth\n\
project: webapp\n\
priority: high\n\
status: pending\n\
depends_on:\n\
- schema-1\n\
completion:\n\
\x20\x20verify: cargo test -p auth\n\
\x20\x20signal: AUTH_DONE\n\
\x20\x20max_iterations: 10\n\
tags:\n\
- backend\n\
---\n\
\n\
Add the /login endpoint with JWT issuance.\n";

    #[test]
    fn parses_a_full_descriptor() {
        let doc = TaskDocument::parse(FULL).expect("should parse");
        let task = &doc.task;
        assert_eq!(task.id, "auth-1");
        assert_eq!(task.title, "Implement login");
        assert_eq!(task.role, "be");
        assert_eq!(task.workstream, "auth");
        assert_eq!(task.project, "webapp");
        assert_eq!(task.priority, Priority::High);
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.depends_on, vec!["schema-1"]);
        let completion = task.completion.as_ref().expect("completion present");
        assert_eq!(completion.verify.as_deref(), Some("cargo test -p auth"));
        assert_eq!(completion.signal.as_deref(), Some("AUTH_DONE"));
        assert_eq!(completion.max_iterations, Some(10));
        assert_eq!(task.tags, vec!["backend"]);
        assert_eq!(task.content, "Add the /login endpoint with JWT issuance.");
    }

    #[test]
    fn roundtrips_a_descriptor() {
        let doc = TaskDocument::parse(FULL).expect("should parse");
        let rendered = doc.render().expect("should render");
        let reparsed = TaskDocument::parse(&rendered).expect("round-trip parses");
        assert_eq!(reparsed.task, doc.task);
    }

    #[test]
    fn minimal_descriptor_gets_defaults() {
        let content = "---\nid: t-1\ntitle: Solo\nrole: be\n---\n\nBody.\n";
        let doc = TaskDocument::parse(content).expect("should parse");
        assert_eq!(doc.task.priority, Priority::Medium);
        assert_eq!(doc.task.status, TaskStatus::Pending);
        assert!(doc.task.workstream.is_empty());
        assert!(doc.task.depends_on.is_empty());
        assert!(doc.task.completion.is_none());
    }

    #[test]
    fn missing_required_keys_are_rejected() {
        let content = "---\ntitle: No id\nrole: be\n---\nBody.\n";
        let err = TaskDocument::parse(content).unwrap_err();
        assert!(matches!(err, DescriptorError::MissingKey("id")));

        let content = "---\nid: t-1\ntitle: No role\n---\nBody.\n";
        let err = TaskDocument::parse(content).unwrap_err();
        assert!(matches!(err, DescriptorError::MissingKey("role")));
    }

    #[test]
    fn missing_front_matter_is_rejected() {
        let err = TaskDocument::parse("just markdown, no markers\n").unwrap_err();
        assert!(matches!(err, DescriptorError::MissingFrontMatter));
    }

    #[test]
    fn invalid_priority_is_rejected() {
        let content = "---\nid: t-1\ntitle: T\nrole: be\npriority: urgent\n---\n";
        let err = TaskDocument::parse(content).unwrap_err();
        assert!(matches!(
            err,
            DescriptorError::InvalidValue { key: "priority", .. }
        ));
    }

    #[test]
    fn unknown_keys_survive_a_roundtrip() {
        let content = "---\n\
id: t-1\n\
title: T\n\
role: be\n\
custom_annotation: keep-me\n\
---\n\
\n\
Body.\n";
        let doc = TaskDocument::parse(content).expect("should parse");
        let rendered = doc.render().expect("should render");
        assert!(
            rendered.contains("custom_annotation: keep-me"),
            "unknown key should survive: {rendered}"
        );
    }

    #[test]
    fn empty_body_renders_and_parses() {
        let content = "---\nid: t-1\ntitle: T\nrole: be\n---\n";
        let doc = TaskDocument::parse(content).expect("should parse");
        assert!(doc.task.content.is_empty());
        let rendered = doc.render().expect("should render");
        let reparsed = TaskDocument::parse(&rendered).expect("round-trip parses");
        assert_eq!(reparsed.task, doc.task);
    }

    #[test]
    fn mutated_status_rerenders() {
        let mut doc = TaskDocument::parse(FULL).expect("should parse");
        doc.task.status = TaskStatus::InProgress;
        doc.task.assigned_worker = Some("be-1".to_owned());
        let rendered = doc.render().expect("should render");
        assert!(rendered.contains("status: in_progress"));
        assert!(rendered.contains("assigned_to: be-1"));
    }
}
