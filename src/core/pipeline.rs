//! Typed model of a GoCD pipeline definition.
//!
//! Mirrors the snake_case JSON shape of the pipeline configuration API.
//! Fields whose internal shape the tool never consults (templates,
//! timers, tracking tools, filters) are carried as raw
//! `serde_json::Value` so that server-side configuration survives a
//! round-trip verbatim instead of producing false divergence.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pipeline {
    pub label_template: String,
    pub enable_pipeline_locking: bool,
    pub name: String,
    pub template: Value,
    pub parameters: Vec<Value>,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub materials: Vec<Material>,
    pub stages: Vec<Stage>,
    pub tracking_tool: Value,
    pub timer: Value,
}

/// Creation payload: the API takes the pipeline group only on POST;
/// the group is not mutable through update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub group: String,
    pub pipeline: Pipeline,
}

/// A plain or encrypted variable. `value` and `encrypted_value` are
/// mutually exclusive on the wire; whichever is present is preserved
/// as-is, the tool does not enforce the pairing with `secure`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentVariable {
    pub secure: bool,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Material {
    #[serde(rename = "type")]
    pub material_type: String,
    pub attributes: MaterialAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialAttributes {
    pub url: String,
    pub destination: Option<String>,
    pub filter: Value,
    pub invert_filter: bool,
    pub name: Value,
    pub auto_update: bool,
    pub branch: Option<String>,
    pub submodule_folder: Value,
    pub shallow_clone: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stage {
    pub name: String,
    pub fetch_materials: bool,
    pub clean_working_directory: bool,
    pub never_cleanup_artifacts: bool,
    pub approval: Approval,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub jobs: Vec<Job>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Approval {
    #[serde(rename = "type")]
    pub approval_type: String,
    pub authorization: Authorization,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Authorization {
    pub roles: Vec<String>,
    pub users: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub name: String,
    // number, "all", or null depending on server version
    pub run_instance_count: Value,
    pub timeout: Value,
    pub environment_variables: Vec<EnvironmentVariable>,
    pub resources: Vec<String>,
    pub tasks: Vec<Task>,
    pub tabs: Vec<Value>,
    pub artifacts: Vec<Value>,
    pub properties: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Task {
    #[serde(rename = "type")]
    pub task_type: String,
    pub attributes: TaskAttributes,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskAttributes {
    pub run_if: Vec<String>,
    pub on_cancel: Value,
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: Option<String>,
}
