//! Pure assembly of a [`WorkSpec`] from a pipeline output directory tree.
//!
//! Takes no Kubernetes client: given a directory laid out the way a pipeline
//! pod leaves it (`input/`, `metadata/destination-selectors.yaml`,
//! `kratix-system/promise-scheduling`), produces the `Work` name, namespace,
//! and spec. Upserting the result against the API server is the caller's job.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use walkdir::WalkDir;

use crate::constants::{selector_source, DEPENDENCY_REPLICAS, RESOURCE_REQUEST_REPLICAS};
use crate::error::WorkBuilderError;
use crate::hash::group_id;
use crate::promise::SelectorSource;
use crate::work::{WorkDestinationSelector, Workload, WorkloadGroup, WorkSpec};

/// Which pipeline invoked the builder; determines the `*-workflow` selector
/// source tag and the replicas sentinel used for the assembled Work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowType {
    Resource,
    Promise,
}

impl WorkflowType {
    fn workflow_source(self) -> SelectorSource {
        match self {
            Self::Resource => SelectorSource::ResourceWorkflow,
            Self::Promise => SelectorSource::PromiseWorkflow,
        }
    }
}

/// Inputs to a single Work-builder run.
pub struct WorkBuilderInput<'a> {
    /// Root of the pipeline's shared volumes (`<root>/input`, `<root>/metadata`, `<root>/kratix-system`).
    pub root_directory: &'a Path,
    pub promise_name: &'a str,
    /// `Some(name)` for a resource-request Work, `None` for a dependency Work.
    pub resource_name: Option<&'a str>,
    /// Requested namespace; blank or absent falls back to `system_namespace`.
    pub namespace: Option<&'a str>,
    pub workflow_type: WorkflowType,
    pub system_namespace: &'a str,
}

/// The assembled Work, ready for the caller to upsert.
pub struct BuiltWork {
    pub name: String,
    pub namespace: String,
    pub spec: WorkSpec,
}

#[derive(Debug, Deserialize)]
struct SelectorFileEntry {
    directory: String,
    #[serde(rename = "matchLabels", default)]
    match_labels: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SchedulingSelectorEntry {
    #[serde(rename = "matchLabels", default)]
    match_labels: BTreeMap<String, String>,
    source: SelectorSource,
}

/// Normalise a selector-file directory the way `path.Clean` would, then
/// verify it is either the root marker `"."` or a single top-level name.
fn clean_directory(raw: &str) -> Result<String, WorkBuilderError> {
    let trimmed = raw.trim().trim_start_matches("./").trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return Ok(".".to_string());
    }
    if trimmed.contains('/') || trimmed == ".." {
        return Err(WorkBuilderError::NonTopLevelDirectory(raw.to_string()));
    }
    Ok(trimmed.to_string())
}

fn read_destination_selectors(
    root: &Path,
) -> Result<Vec<SelectorFileEntry>, WorkBuilderError> {
    let path = root.join("metadata").join("destination-selectors.yaml");
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(&path).map_err(|source| WorkBuilderError::Io {
        path: path.clone(),
        source,
    })?;
    let mut entries: Vec<SelectorFileEntry> =
        serde_yaml::from_str(&raw).map_err(|source| WorkBuilderError::Yaml { path, source })?;

    let mut seen = HashSet::new();
    for entry in &mut entries {
        entry.directory = clean_directory(&entry.directory)?;
        if !seen.insert(entry.directory.clone()) {
            return Err(WorkBuilderError::DuplicateSelectorDirectory(
                entry.directory.clone(),
            ));
        }
    }
    Ok(entries)
}

fn read_promise_scheduling(root: &Path) -> Vec<SchedulingSelectorEntry> {
    let path = root.join("kratix-system").join("promise-scheduling");
    let Ok(raw) = fs::read_to_string(path) else {
        return Vec::new();
    };
    serde_yaml::from_str(&raw).unwrap_or_default()
}

/// Merge a sequence of label maps into one, later entries winning on key collision.
fn squash(maps: impl IntoIterator<Item = BTreeMap<String, String>>) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    for map in maps {
        out.extend(map);
    }
    out
}

fn walk_workloads(dir: &Path, input_root: &Path) -> Vec<Workload> {
    let mut workloads = Vec::new();
    if !dir.exists() {
        return workloads;
    }
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let Ok(entry) = entry else { continue };
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(content) = fs::read_to_string(entry.path()) else {
            continue;
        };
        let filepath = entry
            .path()
            .strip_prefix(input_root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        workloads.push(Workload { filepath, content });
    }
    workloads.sort_by(|a, b| a.filepath.cmp(&b.filepath));
    workloads
}

/// Run the Work-builder algorithm over `input.root_directory`.
pub fn build_work(input: &WorkBuilderInput<'_>) -> Result<BuiltWork, WorkBuilderError> {
    let input_root = input.root_directory.join("input");
    let selector_entries = read_destination_selectors(input.root_directory)?;

    let root_entry = selector_entries.iter().find(|e| e.directory == ".");
    let dir_entries: Vec<&SelectorFileEntry> =
        selector_entries.iter().filter(|e| e.directory != ".").collect();

    let workflow_source = input.workflow_type.workflow_source();
    let mut ignore = HashSet::new();
    let mut groups = Vec::new();

    for entry in &dir_entries {
        let dir_path = input_root.join(&entry.directory);
        let workloads = walk_workloads(&dir_path, &input_root);
        groups.push(WorkloadGroup {
            id: group_id(&entry.directory),
            directory: entry.directory.clone(),
            workloads,
            destination_selectors: vec![WorkDestinationSelector {
                match_labels: entry.match_labels.clone(),
                source: workflow_source,
            }],
        });
        ignore.insert(entry.directory.clone());
    }

    let root_workloads: Vec<Workload> = if input_root.exists() {
        WalkDir::new(&input_root)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                if e.depth() != 1 || e.file_type().is_file() {
                    return true;
                }
                !ignore.contains(&e.file_name().to_string_lossy().to_string())
            })
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let content = fs::read_to_string(e.path()).ok()?;
                let filepath = e
                    .path()
                    .strip_prefix(&input_root)
                    .unwrap_or(e.path())
                    .to_string_lossy()
                    .replace('\\', "/");
                Some(Workload { filepath, content })
            })
            .collect()
    } else {
        Vec::new()
    };

    if !root_workloads.is_empty() {
        let mut destination_selectors = Vec::new();
        if let Some(root_entry) = root_entry {
            destination_selectors.push(WorkDestinationSelector {
                match_labels: root_entry.match_labels.clone(),
                source: workflow_source,
            });
        }

        let scheduling = read_promise_scheduling(input.root_directory);
        let promise_workflow_labels = squash(
            scheduling
                .iter()
                .filter(|e| e.source == SelectorSource::PromiseWorkflow)
                .map(|e| e.match_labels.clone()),
        );
        if !promise_workflow_labels.is_empty() {
            destination_selectors.push(WorkDestinationSelector {
                match_labels: promise_workflow_labels,
                source: SelectorSource::PromiseWorkflow,
            });
        }
        let promise_labels = squash(
            scheduling
                .iter()
                .filter(|e| e.source == SelectorSource::Promise)
                .map(|e| e.match_labels.clone()),
        );
        if !promise_labels.is_empty() {
            destination_selectors.push(WorkDestinationSelector {
                match_labels: promise_labels,
                source: SelectorSource::Promise,
            });
        }

        groups.push(WorkloadGroup {
            id: group_id("."),
            directory: ".".to_string(),
            workloads: root_workloads,
            destination_selectors,
        });
    }

    let (name, namespace, replicas, resource_name) = match input.resource_name {
        Some(resource_name) => {
            let namespace = input
                .namespace
                .filter(|ns| !ns.is_empty())
                .unwrap_or(input.system_namespace)
                .to_string();
            (
                format!("{}-{}", input.promise_name, resource_name),
                namespace,
                RESOURCE_REQUEST_REPLICAS,
                resource_name.to_string(),
            )
        }
        None => (
            input.promise_name.to_string(),
            input.system_namespace.to_string(),
            DEPENDENCY_REPLICAS,
            String::new(),
        ),
    };

    Ok(BuiltWork {
        name,
        namespace,
        spec: WorkSpec {
            replicas,
            resource_name,
            workload_groups: groups,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn single_root_group_when_no_selectors_file() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("input/a.yaml"), "kind: ConfigMap");

        let input = WorkBuilderInput {
            root_directory: dir.path(),
            promise_name: "postgres",
            resource_name: None,
            namespace: None,
            workflow_type: WorkflowType::Promise,
            system_namespace: "kratix-platform-system",
        };
        let built = build_work(&input).unwrap();
        assert_eq!(built.name, "postgres");
        assert_eq!(built.namespace, "kratix-platform-system");
        assert_eq!(built.spec.workload_groups.len(), 1);
        assert_eq!(built.spec.workload_groups[0].directory, ".");
    }

    #[test]
    fn directory_selector_splits_into_its_own_group() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("input/frontend/deploy.yaml"), "kind: Deployment");
        write(&dir.path().join("input/root.yaml"), "kind: Namespace");
        write(
            &dir.path().join("metadata/destination-selectors.yaml"),
            "- directory: frontend\n  matchLabels:\n    env: prod\n",
        );

        let input = WorkBuilderInput {
            root_directory: dir.path(),
            promise_name: "app",
            resource_name: Some("my-app"),
            namespace: Some("team-a"),
            workflow_type: WorkflowType::Resource,
            system_namespace: "kratix-platform-system",
        };
        let built = build_work(&input).unwrap();
        assert_eq!(built.name, "app-my-app");
        assert_eq!(built.namespace, "team-a");
        assert_eq!(built.spec.workload_groups.len(), 2);

        let frontend = built
            .spec
            .workload_groups
            .iter()
            .find(|g| g.directory == "frontend")
            .unwrap();
        assert_eq!(frontend.id, group_id("frontend"));
        assert_eq!(frontend.destination_selectors[0].source, SelectorSource::ResourceWorkflow);

        let root = built.spec.workload_groups.iter().find(|g| g.directory == ".").unwrap();
        assert_eq!(root.workloads.len(), 1);
    }

    #[test]
    fn duplicate_selector_directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("metadata/destination-selectors.yaml"),
            "- directory: frontend\n  matchLabels: {}\n- directory: frontend\n  matchLabels: {}\n",
        );
        let input = WorkBuilderInput {
            root_directory: dir.path(),
            promise_name: "app",
            resource_name: None,
            namespace: None,
            workflow_type: WorkflowType::Promise,
            system_namespace: "kratix-platform-system",
        };
        assert!(matches!(
            build_work(&input),
            Err(WorkBuilderError::DuplicateSelectorDirectory(_))
        ));
    }

    #[test]
    fn empty_pipeline_output_builds_work_with_no_groups() {
        let dir = tempfile::tempdir().unwrap();
        let input = WorkBuilderInput {
            root_directory: dir.path(),
            promise_name: "app",
            resource_name: None,
            namespace: None,
            workflow_type: WorkflowType::Promise,
            system_namespace: "kratix-platform-system",
        };
        let built = build_work(&input).unwrap();
        assert!(built.spec.workload_groups.is_empty());
    }

    #[test]
    fn promise_scheduling_buckets_are_squashed_in_fixed_order() {
        let dir = tempfile::tempdir().unwrap();
        write(&dir.path().join("input/root.yaml"), "kind: Namespace");
        write(
            &dir.path().join("kratix-system/promise-scheduling"),
            "- matchLabels:\n    region: eu\n  source: promise-workflow\n- matchLabels:\n    zone: a\n  source: promise\n",
        );
        let input = WorkBuilderInput {
            root_directory: dir.path(),
            promise_name: "app",
            resource_name: None,
            namespace: None,
            workflow_type: WorkflowType::Promise,
            system_namespace: "kratix-platform-system",
        };
        let built = build_work(&input).unwrap();
        let root = &built.spec.workload_groups[0];
        assert_eq!(root.destination_selectors.len(), 2);
        assert_eq!(root.destination_selectors[0].source, SelectorSource::PromiseWorkflow);
        assert_eq!(root.destination_selectors[1].source, SelectorSource::Promise);
    }
}
