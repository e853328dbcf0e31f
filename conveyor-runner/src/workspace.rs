//! Job workspace
//!
//! Directory layout of a job run, relative to the working directory:
//! - `workingvolume/`: mounted into the containers, world-writable
//! - `workingvolume/logs/`: stage logs and debugging artifacts
//! - `tmpfiles/`: scratch space for the containers, world-writable

use anyhow::{Context, Result};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::compose::COMPOSE_FILE;
use crate::service::JobLog;
use conveyor_core::domain::job::Job;

pub const VOLUME_DIR: &str = "workingvolume";
pub const LOGS_DIR: &str = "logs";
pub const TMP_DIR: &str = "tmpfiles";

/// Paths excluded from the output upload
pub const UPLOAD_EXCLUDES_FILE: &str = "upload-exclusions.txt";
/// Written on every run so the surrounding file transfer sees new content
pub const TRANSFER_TRIGGER_FILE: &str = "transfer-trigger.log";
/// Job-control descriptor moved into the logs if present
pub const JOB_CONTROL_FILE: &str = "job.cmd";
pub const JOB_SUMMARY_FILE: &str = "job-summary.txt";
pub const JOB_PARAMETERS_FILE: &str = "job-parameters.txt";

const TRANSFER_TRIGGER_TEXT: &str = "This is only used to force the file transfer to pick up the logs.";

/// Directory layout of one job run
#[derive(Debug, Clone)]
pub struct Workspace {
    working_dir: PathBuf,
    volume_dir: PathBuf,
    logs_dir: PathBuf,
    tmp_dir: PathBuf,
}

impl Workspace {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        let working_dir = working_dir.into();
        let volume_dir = working_dir.join(VOLUME_DIR);
        Self {
            logs_dir: volume_dir.join(LOGS_DIR),
            tmp_dir: working_dir.join(TMP_DIR),
            volume_dir,
            working_dir,
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Creates the directories and stages the debugging artifacts
    ///
    /// Permission changes and artifact copies are best effort and only
    /// logged. Directory creation, the transfer trigger and the job-control
    /// move return errors.
    pub fn init(&self, job: &Job, log: &dyn JobLog) -> Result<()> {
        fs::create_dir_all(&self.logs_dir)
            .with_context(|| format!("Failed to create {}", self.logs_dir.display()))?;
        fs::create_dir_all(&self.tmp_dir)
            .with_context(|| format!("Failed to create {}", self.tmp_dir.display()))?;

        // Containers may run as non-root users and still need to write here
        for dir in [&self.volume_dir, &self.tmp_dir] {
            if let Err(e) = fs::set_permissions(dir, fs::Permissions::from_mode(0o777)) {
                log.error(&format!(
                    "Failed to set permissions on {}: {}",
                    dir.display(),
                    e
                ));
            }
        }

        self.copy_to_logs(COMPOSE_FILE, log);
        self.copy_to_logs(UPLOAD_EXCLUDES_FILE, log);
        if let Some(manifest) = job.input_manifest() {
            self.copy_to_logs(manifest, log);
        }

        let trigger = self.logs_dir.join(TRANSFER_TRIGGER_FILE);
        fs::write(&trigger, TRANSFER_TRIGGER_TEXT)
            .with_context(|| format!("Failed to write {}", trigger.display()))?;

        let control = self.working_dir.join(JOB_CONTROL_FILE);
        if control.exists() {
            let target = self.logs_dir.join(JOB_CONTROL_FILE);
            fs::rename(&control, &target).with_context(|| {
                format!(
                    "Failed to move {} to {}",
                    control.display(),
                    target.display()
                )
            })?;
        }

        Ok(())
    }

    /// Copies a working-directory file into the logs, logging any failure
    fn copy_to_logs(&self, name: &str, log: &dyn JobLog) {
        let source = self.working_dir.join(name);
        let Some(file_name) = Path::new(name).file_name() else {
            log.error(&format!("Cannot copy '{}' to the logs: no file name", name));
            return;
        };
        let target = self.logs_dir.join(file_name);

        if let Err(e) = fs::copy(&source, &target) {
            log.error(&format!(
                "Failed to copy {} to {}: {}",
                source.display(),
                target.display(),
                e
            ));
        }
    }

    /// Writes a human-readable summary of the job into the logs
    pub fn write_job_summary(&self, job: &Job) -> Result<()> {
        let mut summary = format!(
            "Job ID: {}\nInvocation ID: {}\nApp Name: {}\nJob Name: {}\nSubmitter: {}\nOutput Directory: {}\nSteps: {}\n",
            job.id,
            job.invocation_id,
            job.app_name,
            job.name,
            job.submitter,
            job.output_directory(),
            job.steps.len()
        );
        for (index, step) in job.steps.iter().enumerate() {
            let image = &step.container().image;
            summary.push_str(&format!("  step_{}: {}:{}\n", index, image.name, image.tag));
        }

        let path = self.logs_dir.join(JOB_SUMMARY_FILE);
        fs::write(&path, summary).with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Writes the step parameters, one tab-separated line per param
    pub fn write_job_parameters(&self, job: &Job) -> Result<()> {
        let mut params = String::from("step\torder\tname\tvalue\n");
        for (index, step) in job.steps.iter().enumerate() {
            let mut sorted: Vec<_> = step.config.params.iter().collect();
            sorted.sort_by_key(|param| param.order);
            for param in sorted {
                params.push_str(&format!(
                    "step_{}\t{}\t{}\t{}\n",
                    index, param.order, param.name, param.value
                ));
            }
        }

        let path = self.logs_dir.join(JOB_PARAMETERS_FILE);
        fs::write(&path, params).with_context(|| format!("Failed to write {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::InMemoryJobLog;
    use crate::testing::pipeline_job;
    use conveyor_core::domain::log::LogLevel;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let workspace = Workspace::new("/work");
        assert_eq!(workspace.working_dir(), Path::new("/work"));
        assert_eq!(workspace.logs_dir(), Path::new("/work/workingvolume/logs"));
    }

    #[test]
    fn test_init_creates_layout_and_artifacts() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(COMPOSE_FILE), "services: {}\n").unwrap();
        fs::write(dir.path().join(UPLOAD_EXCLUDES_FILE), "tmpfiles\n").unwrap();
        fs::write(dir.path().join("inputs.list"), "/remote/a\n").unwrap();
        fs::write(dir.path().join(JOB_CONTROL_FILE), "universe = vanilla\n").unwrap();

        let mut job = pipeline_job(1, 0);
        job.input_path_list_file = Some("inputs.list".to_string());
        let log = InMemoryJobLog::new();
        let workspace = Workspace::new(dir.path());

        workspace.init(&job, &log).unwrap();

        let logs = workspace.logs_dir();
        assert!(logs.join(COMPOSE_FILE).exists());
        assert!(logs.join(UPLOAD_EXCLUDES_FILE).exists());
        assert!(logs.join("inputs.list").exists());
        assert!(logs.join(TRANSFER_TRIGGER_FILE).exists());
        assert!(logs.join(JOB_CONTROL_FILE).exists());
        assert!(!dir.path().join(JOB_CONTROL_FILE).exists());
        assert!(log.messages(LogLevel::Error).is_empty());

        let mode = fs::metadata(dir.path().join(TMP_DIR))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[test]
    fn test_init_tolerates_missing_artifacts() {
        let dir = TempDir::new().unwrap();
        let log = InMemoryJobLog::new();
        let workspace = Workspace::new(dir.path());

        workspace.init(&pipeline_job(1, 0), &log).unwrap();

        assert!(workspace.logs_dir().join(TRANSFER_TRIGGER_FILE).exists());
        assert!(!workspace.logs_dir().join(JOB_CONTROL_FILE).exists());
        // compose file and exclusion list are both missing
        assert_eq!(log.messages(LogLevel::Error).len(), 2);
    }

    #[test]
    fn test_job_summary_and_parameters() {
        let dir = TempDir::new().unwrap();
        let workspace = Workspace::new(dir.path());
        fs::create_dir_all(workspace.logs_dir()).unwrap();
        let job = pipeline_job(2, 0);

        workspace.write_job_summary(&job).unwrap();
        workspace.write_job_parameters(&job).unwrap();

        let summary = fs::read_to_string(workspace.logs_dir().join(JOB_SUMMARY_FILE)).unwrap();
        assert_eq!(
            summary.lines().take(2).collect::<Vec<_>>(),
            vec!["Job ID: pipeline-job", "Invocation ID: c0ffee-0000-1111"]
        );
        assert!(summary.contains("Steps: 2\n"));
        assert!(summary.contains("  step_1: example.org/tool-1:1.0"));

        let params = fs::read_to_string(workspace.logs_dir().join(JOB_PARAMETERS_FILE)).unwrap();
        let lines: Vec<&str> = params.lines().collect();
        assert_eq!(
            lines,
            vec![
                "step\torder\tname\tvalue",
                "step_0\t0\t--index\t0",
                "step_1\t0\t--index\t1"
            ]
        );
    }
}
