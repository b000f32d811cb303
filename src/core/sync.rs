//! Sync engine: push, pull, and clone between a local pipeline
//! definition file and the server.
//!
//! Each operation is a single deterministic pass with no retry loop;
//! store and client errors propagate unchanged. The engine never merges
//! state: when local and remote definitions differ it snapshots both
//! sides next to the primary file and leaves resolution to the
//! operator.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::client::{ConfigApi, Etag};
use crate::error::{Error, Result};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::store;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushAction {
    Created,
    Updated,
}

/// Where the two diverging variants were written.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Divergence {
    pub local_backup: String,
    pub remote_backup: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushOutcome {
    pub pipeline: String,
    pub action: PushAction,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PullOutcome {
    pub pipeline: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence: Option<Divergence>,
}

/// Send the definition at `path` to the server, creating the pipeline
/// in `group` when it does not exist yet and updating it in place when
/// it does. The divergence snapshot is taken before the remote is
/// mutated, so the operator always gets a pre-push record of drift.
pub fn push(api: &dyn ConfigApi, path: &Path, group: Option<&str>) -> Result<PushOutcome> {
    let local = store::load(path)?;
    let name = local.name.clone();

    // A failed read of remote state does not abort the push: the
    // server's answer to the create or update below is authoritative
    // either way. The cost is a possible create attempt against a
    // pipeline that does exist, surfaced then as a conflict.
    let (remote, etag) = match api.fetch(&name) {
        Ok(found) => found,
        Err(err) => {
            log_status!("push", "Could not read remote state for '{}': {}", name, err);
            (Pipeline::default(), Etag::absent())
        }
    };

    let divergence = compare_and_backup(&local, &remote, path);

    let action = if etag.is_absent() {
        let group = group.filter(|g| !g.trim().is_empty()).ok_or_else(|| {
            Error::validation_missing_argument(vec!["group".to_string()]).with_hint(format!(
                "'{}' does not exist on the server yet; pass a pipeline group to create it",
                name
            ))
        })?;
        api.create(&PipelineConfig {
            group: group.to_string(),
            pipeline: local,
        })?;
        PushAction::Created
    } else {
        api.update(&local, &etag)?;
        PushAction::Updated
    };

    Ok(PushOutcome {
        pipeline: name,
        action,
        divergence,
    })
}

/// Overwrite the definition at `path` with the server's version. The
/// divergence snapshot compares the pre-pull file content against what
/// was fetched, so drift is recorded even though the file itself has
/// already been replaced.
pub fn pull(api: &dyn ConfigApi, path: &Path) -> Result<PullOutcome> {
    let local = store::load(path)?;
    let remote = clone_remote(api, path, &local.name)?;
    let divergence = compare_and_backup(&local, &remote, path);

    Ok(PullOutcome {
        pipeline: local.name,
        path: path.display().to_string(),
        divergence,
    })
}

/// Fetch the named pipeline and save it to `path`, returning the
/// fetched definition. The version token is discarded; clone never
/// writes back to the server.
pub fn clone_remote(api: &dyn ConfigApi, path: &Path, name: &str) -> Result<Pipeline> {
    let (remote, etag) = api.fetch(name)?;
    if etag.is_absent() {
        return Err(Error::pipeline_not_found(name));
    }

    store::save(path, &remote)?;
    Ok(remote)
}

/// Structural comparison of two definitions. When they differ, both
/// variants are persisted to sibling backup paths; neither side wins
/// and the primary file is not touched. The two writes are independent:
/// losing one snapshot is no reason to lose the other, so write
/// failures are logged rather than propagated.
pub fn compare_and_backup(
    local: &Pipeline,
    remote: &Pipeline,
    path: &Path,
) -> Option<Divergence> {
    if local == remote {
        return None;
    }

    let local_backup = backup_path(path, "local");
    let remote_backup = backup_path(path, "remote");

    if let Err(err) = store::save(&local_backup, local) {
        log_status!("compare", "Failed to write {}: {}", local_backup.display(), err);
    }
    if let Err(err) = store::save(&remote_backup, remote) {
        log_status!("compare", "Failed to write {}: {}", remote_backup.display(), err);
    }

    Some(Divergence {
        local_backup: local_backup.display().to_string(),
        remote_backup: remote_backup.display().to_string(),
    })
}

fn backup_path(path: &Path, side: &str) -> PathBuf {
    path.with_extension(format!("{}.bak.json", side))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use tempfile::TempDir;

    use crate::pipeline::EnvironmentVariable;

    /// In-memory stand-in for the server: at most one remote pipeline,
    /// plus a call log the assertions read back.
    #[derive(Default)]
    struct FakeApi {
        remote: Option<(Pipeline, &'static str)>,
        fetch_fails: bool,
        calls: RefCell<Vec<String>>,
    }

    impl FakeApi {
        fn with_remote(pipeline: Pipeline, etag: &'static str) -> Self {
            Self {
                remote: Some((pipeline, etag)),
                ..Self::default()
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.borrow().clone()
        }
    }

    impl ConfigApi for FakeApi {
        fn fetch(&self, name: &str) -> Result<(Pipeline, Etag)> {
            self.calls.borrow_mut().push(format!("fetch {}", name));
            if self.fetch_fails {
                return Err(Error::remote_request_failed(
                    "connection refused",
                    Some("fetch pipeline".to_string()),
                ));
            }
            match &self.remote {
                Some((pipeline, etag)) => Ok((pipeline.clone(), Etag::new(*etag))),
                None => Ok((Pipeline::default(), Etag::absent())),
            }
        }

        fn create(&self, config: &PipelineConfig) -> Result<Pipeline> {
            self.calls
                .borrow_mut()
                .push(format!("create {} in {}", config.pipeline.name, config.group));
            Ok(config.pipeline.clone())
        }

        fn update(&self, pipeline: &Pipeline, etag: &Etag) -> Result<Pipeline> {
            self.calls
                .borrow_mut()
                .push(format!("update {} if-match {}", pipeline.name, etag.as_str()));
            Ok(pipeline.clone())
        }
    }

    fn named(name: &str) -> Pipeline {
        Pipeline {
            name: name.to_string(),
            ..Pipeline::default()
        }
    }

    #[test]
    fn push_creates_when_remote_is_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.json");
        store::save(&path, &named("build")).unwrap();

        let api = FakeApi::default();
        let outcome = push(&api, &path, Some("dev")).unwrap();

        assert_eq!(outcome.action, PushAction::Created);
        assert_eq!(api.calls(), vec!["fetch build", "create build in dev"]);
    }

    #[test]
    fn push_updates_with_the_fetched_etag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.json");
        store::save(&path, &named("build")).unwrap();

        let api = FakeApi::with_remote(named("build"), "\"etag-1\"");
        let outcome = push(&api, &path, None).unwrap();

        assert_eq!(outcome.action, PushAction::Updated);
        assert!(outcome.divergence.is_none());
        assert_eq!(
            api.calls(),
            vec!["fetch build", "update build if-match \"etag-1\""]
        );
    }

    #[test]
    fn push_needs_a_group_to_create() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.json");
        store::save(&path, &named("build")).unwrap();

        let api = FakeApi::default();
        let err = push(&api, &path, None).unwrap_err();

        assert_eq!(err.code.as_str(), "validation.missing_argument");
        assert_eq!(api.calls(), vec!["fetch build"]);
    }

    #[test]
    fn push_treats_a_failed_fetch_as_absent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.json");
        store::save(&path, &named("build")).unwrap();

        let api = FakeApi {
            fetch_fails: true,
            ..FakeApi::default()
        };
        let outcome = push(&api, &path, Some("dev")).unwrap();

        assert_eq!(outcome.action, PushAction::Created);
        assert_eq!(api.calls(), vec!["fetch build", "create build in dev"]);
    }

    #[test]
    fn equal_definitions_write_no_backups() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.json");

        let result = compare_and_backup(&named("build"), &named("build"), &path);

        assert!(result.is_none());
        assert!(!dir.path().join("foo.local.bak.json").exists());
        assert!(!dir.path().join("foo.remote.bak.json").exists());
    }

    #[test]
    fn diverging_definitions_back_up_both_sides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("foo.json");
        let local = named("build");
        store::save(&path, &local).unwrap();
        let primary_before = std::fs::read_to_string(&path).unwrap();

        let mut remote = named("build");
        remote.environment_variables.push(EnvironmentVariable {
            secure: false,
            name: "X".to_string(),
            value: Some("1".to_string()),
            encrypted_value: None,
        });

        let divergence = compare_and_backup(&local, &remote, &path).unwrap();

        let local_bak = store::load(dir.path().join("foo.local.bak.json").as_path()).unwrap();
        let remote_bak = store::load(dir.path().join("foo.remote.bak.json").as_path()).unwrap();
        assert!(local_bak.environment_variables.is_empty());
        assert_eq!(remote_bak.environment_variables[0].name, "X");
        assert_eq!(remote_bak, remote);

        assert!(divergence.local_backup.ends_with("foo.local.bak.json"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), primary_before);
    }

    #[test]
    fn pull_overwrites_and_compares_against_the_pre_pull_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("build.json");
        let mut stale = named("build");
        stale.label_template = "old-${COUNT}".to_string();
        store::save(&path, &stale).unwrap();

        let mut remote = named("build");
        remote.label_template = "new-${COUNT}".to_string();
        let api = FakeApi::with_remote(remote.clone(), "\"etag-9\"");

        let outcome = pull(&api, &path).unwrap();

        assert_eq!(store::load(&path).unwrap(), remote);
        assert!(outcome.divergence.is_some());
        let local_bak = store::load(dir.path().join("build.local.bak.json").as_path()).unwrap();
        assert_eq!(local_bak.label_template, "old-${COUNT}");
    }

    #[test]
    fn clone_writes_exactly_what_was_fetched() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        let api = FakeApi::with_remote(named("deploy"), "\"etag-4\"");
        let fetched = clone_remote(&api, &path, "deploy").unwrap();

        assert_eq!(fetched.name, "deploy");
        assert_eq!(store::load(&path).unwrap(), fetched);
    }

    #[test]
    fn clone_of_a_missing_pipeline_fails_without_writing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.json");

        let api = FakeApi::default();
        let err = clone_remote(&api, &path, "ghost").unwrap_err();

        assert_eq!(err.code.as_str(), "pipeline.not_found");
        assert!(!path.exists());
    }

    #[test]
    fn backup_paths_replace_the_json_extension() {
        assert_eq!(
            backup_path(Path::new("/tmp/foo.json"), "local"),
            PathBuf::from("/tmp/foo.local.bak.json")
        );
        assert_eq!(
            backup_path(Path::new("/tmp/release.v2.json"), "remote"),
            PathBuf::from("/tmp/release.v2.remote.bak.json")
        );
    }
}
