//! Job domain types
//!
//! A job is an ordered list of containerized steps plus the metadata needed
//! to stage inputs and outputs. The runner reads it from a JSON file and
//! treats it as immutable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Job description
///
/// Structure supplied by the submitting service and read by the runner.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Job {
    pub id: String,
    /// Unique identifier of this run; namespaces compose resources
    pub invocation_id: String,
    pub app_name: String,
    pub name: String,
    pub submitter: String,
    pub output_dir: String,
    /// Manifest listing every input; when set, inputs are downloaded in one pass
    pub input_path_list_file: Option<String>,
    pub steps: Vec<Step>,
}

impl Job {
    /// All step inputs, in step order and then declaration order
    pub fn inputs(&self) -> Vec<&StepInput> {
        self.steps
            .iter()
            .flat_map(|step| step.config.inputs.iter())
            .collect()
    }

    /// Remote directory that receives the job outputs
    pub fn output_directory(&self) -> &str {
        &self.output_dir
    }

    /// Input manifest file name, if one was supplied and is non-empty
    pub fn input_manifest(&self) -> Option<&str> {
        self.input_path_list_file
            .as_deref()
            .filter(|file| !file.is_empty())
    }
}

/// One pipeline stage's tool description
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Step {
    pub component: StepComponent,
    pub config: StepConfig,
    pub environment: HashMap<String, String>,
}

impl Step {
    /// The tool container of this step
    pub fn container(&self) -> &Container {
        &self.component.container
    }

    /// Command line arguments, built from the params sorted by their order
    ///
    /// Each param contributes its name followed by its value; empty strings
    /// are dropped so flags without values and positional values both work.
    pub fn arguments(&self) -> Vec<String> {
        let mut params: Vec<&StepParam> = self.config.params.iter().collect();
        params.sort_by_key(|param| param.order);

        params
            .into_iter()
            .flat_map(|param| [param.name.as_str(), param.value.as_str()])
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepComponent {
    pub container: Container,
}

/// Container description for a tool step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Container {
    pub id: String,
    pub name: String,
    pub image: ContainerImage,
    pub volumes_from: Vec<VolumesFrom>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerImage {
    pub id: String,
    /// Image reference, optionally prefixed by a registry host
    pub name: String,
    pub tag: String,
    /// Base64-encoded JSON `{"username", "password"}` for the registry
    pub auth: Option<String>,
}

/// Auxiliary data container whose volumes are mounted into a step
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumesFrom {
    pub name: String,
    pub tag: String,
    pub auth: Option<String>,
    pub host_path: String,
    pub container_path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    pub params: Vec<StepParam>,
    pub inputs: Vec<StepInput>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepParam {
    pub id: String,
    pub name: String,
    pub value: String,
    pub order: i32,
}

/// A logical input staged before the steps run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StepInput {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub multiplicity: String,
    pub retain: bool,
    /// Remote path of the input
    pub value: String,
}

impl StepInput {
    /// Remote location the input is downloaded from
    pub fn source_path(&self) -> &str {
        &self.value
    }
}
