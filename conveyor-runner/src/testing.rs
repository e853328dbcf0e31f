//! Test fixtures and recording fakes shared by the unit tests

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::HashSet;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::compose::Invocation;
use crate::process::{InvocationError, InvocationRunner};
use crate::service::JobUpdatePublisher;
use conveyor_core::domain::job::{
    Container, ContainerImage, Job, Step, StepComponent, StepConfig, StepInput, StepParam,
    VolumesFrom,
};
use conveyor_core::dto::update::JobUpdate;

pub fn encode_auth(username: &str, password: &str) -> String {
    STANDARD.encode(format!(
        "{{\"username\":\"{}\",\"password\":\"{}\"}}",
        username, password
    ))
}

fn volumes_from(name: &str, auth: Option<String>) -> VolumesFrom {
    VolumesFrom {
        name: name.to_string(),
        tag: "latest".to_string(),
        auth,
        host_path: format!("/host/{}", name),
        container_path: format!("/container/{}", name),
    }
}

/// One step whose image and data containers span three registries
pub fn credentials_job() -> Job {
    let container = Container {
        id: "container-id-1".to_string(),
        name: "container-name-1".to_string(),
        image: ContainerImage {
            id: "container-image-1".to_string(),
            name: "docker.example.com/container-image-name-1".to_string(),
            tag: "container-image-tag-1".to_string(),
            auth: Some(encode_auth("user1", "passwd1")),
        },
        volumes_from: vec![
            volumes_from("docker.example.org/name1", Some(encode_auth("user1", "passwd1"))),
            volumes_from("docker.example.net/name2", Some(String::new())),
            volumes_from("docker.example.org/name3", Some(encode_auth("user2", "passwd2"))),
        ],
    };

    Job {
        id: "test-job-id".to_string(),
        invocation_id: "test-invocation-id".to_string(),
        steps: vec![Step {
            component: StepComponent { container },
            ..Default::default()
        }],
        ..Default::default()
    }
}

/// A job with `steps` tool steps, no auth tokens and `inputs` inputs on the first step
pub fn pipeline_job(steps: usize, inputs: usize) -> Job {
    let steps = (0..steps)
        .map(|index| Step {
            component: StepComponent {
                container: Container {
                    image: ContainerImage {
                        name: format!("example.org/tool-{}", index),
                        tag: "1.0".to_string(),
                        ..Default::default()
                    },
                    ..Default::default()
                },
            },
            config: StepConfig {
                params: vec![StepParam {
                    name: "--index".to_string(),
                    value: index.to_string(),
                    ..Default::default()
                }],
                inputs: if index == 0 {
                    (0..inputs)
                        .map(|i| StepInput {
                            value: format!("/remote/input-{}", i),
                            ..Default::default()
                        })
                        .collect()
                } else {
                    Vec::new()
                },
            },
            ..Default::default()
        })
        .collect();

    Job {
        id: "pipeline-job".to_string(),
        invocation_id: "c0ffee-0000-1111".to_string(),
        app_name: "word-count".to_string(),
        name: "analysis".to_string(),
        submitter: "tester".to_string(),
        output_dir: "/remote/outputs".to_string(),
        steps,
        ..Default::default()
    }
}

/// Records every invocation and fails the ones whose label is listed
#[derive(Default)]
pub struct RecordingRunner {
    calls: Mutex<Vec<(Invocation, bool)>>,
    failing: HashSet<String>,
}

impl RecordingRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(labels: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(inv, _)| inv.clone())
            .collect()
    }

    pub fn labels(&self) -> Vec<String> {
        self.invocations().into_iter().map(|inv| inv.label).collect()
    }

    /// Whether the token passed with each call was already cancelled
    pub fn cancelled_flags(&self) -> Vec<bool> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(_, cancelled)| *cancelled)
            .collect()
    }
}

#[async_trait]
impl InvocationRunner for RecordingRunner {
    async fn run(
        &self,
        invocation: Invocation,
        cancel: &CancellationToken,
    ) -> Result<(), InvocationError> {
        let label = invocation.label.clone();
        self.calls
            .lock()
            .unwrap()
            .push((invocation, cancel.is_cancelled()));

        if self.failing.contains(&label) {
            return Err(InvocationError::Exit {
                label,
                status: ExitStatus::from_raw(1 << 8),
            });
        }
        Ok(())
    }
}

/// Records published updates, optionally rejecting all of them
#[derive(Default)]
pub struct RecordingPublisher {
    updates: Mutex<Vec<JobUpdate>>,
    reject: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting() -> Self {
        Self {
            updates: Mutex::new(Vec::new()),
            reject: true,
        }
    }

    pub fn updates(&self) -> Vec<JobUpdate> {
        self.updates.lock().unwrap().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.updates().into_iter().map(|u| u.message).collect()
    }
}

#[async_trait]
impl JobUpdatePublisher for RecordingPublisher {
    async fn publish(&self, update: JobUpdate) -> anyhow::Result<()> {
        if self.reject {
            anyhow::bail!("update endpoint unavailable");
        }
        self.updates.lock().unwrap().push(update);
        Ok(())
    }
}
