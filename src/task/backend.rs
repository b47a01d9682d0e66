use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use anyhow::Result;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use super::types::Task;

/// A program and its arguments, resolved for one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: Vec<String>) -> Self {
        Self { program: program.to_string(), args }
    }

    pub fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

/// Where recognition actually runs. The runner only needs the command that
/// recognizes one image and, optionally, a command that stops it by name.
#[async_trait]
pub trait RecognitionBackend: Send + Sync {
    fn recognize_command(&self, task: &Task) -> CommandSpec;

    fn terminate_command(&self, task: &Task) -> Option<CommandSpec>;

    /// Runs the termination command, giving up after `wait`.
    async fn terminate(&self, task: &Task, wait: Duration) -> Result<()> {
        let Some(spec) = self.terminate_command(task) else {
            debug!(task_id = %task.id, "Backend has no termination command");
            return Ok(());
        };

        let mut cmd = spec.command();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(wait, cmd.output())
            .await
            .map_err(|_| anyhow::anyhow!("{} did not finish within {}s", spec.program, wait.as_secs()))??;

        if !output.status.success() {
            return Err(anyhow::anyhow!(
                "{} exited with {}: {}",
                spec.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        info!(task_id = %task.id, "Termination command finished");
        Ok(())
    }
}

/// OSRA inside a throwaway docker container, with the upload directory
/// mounted at `/data`.
pub struct DockerOsra {
    docker_bin: String,
    image: String,
    upload_dir: PathBuf,
}

impl DockerOsra {
    pub fn new(docker_bin: &str, image: &str, upload_dir: &Path) -> Result<Self> {
        let upload_dir = std::fs::canonicalize(upload_dir)
            .map_err(|e| anyhow::anyhow!("Failed to resolve upload directory {:?}: {}", upload_dir, e))?;
        Ok(Self {
            docker_bin: docker_bin.to_string(),
            image: image.to_string(),
            upload_dir,
        })
    }
}

#[async_trait]
impl RecognitionBackend for DockerOsra {
    fn recognize_command(&self, task: &Task) -> CommandSpec {
        CommandSpec::new(
            &self.docker_bin,
            vec![
                "run".to_string(),
                "--rm".to_string(),
                format!("--name={}", task.container_name),
                "-v".to_string(),
                format!("{}:/data", self.upload_dir.display()),
                self.image.clone(),
                "osra".to_string(),
                "-f".to_string(),
                "smi".to_string(),
                format!("/data/{}", task.filename),
            ],
        )
    }

    fn terminate_command(&self, task: &Task) -> Option<CommandSpec> {
        Some(CommandSpec::new(
            &self.docker_bin,
            vec!["stop".to_string(), task.container_name.clone()],
        ))
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Runs an `sh -c` script in place of the recognition tool. `$1` is the
    /// input path.
    pub struct ScriptBackend {
        pub script: String,
        pub terminate_script: Option<String>,
    }

    impl ScriptBackend {
        pub fn new(script: &str) -> Self {
            Self { script: script.to_string(), terminate_script: None }
        }
    }

    #[async_trait]
    impl RecognitionBackend for ScriptBackend {
        fn recognize_command(&self, task: &Task) -> CommandSpec {
            CommandSpec::new(
                "sh",
                vec![
                    "-c".to_string(),
                    self.script.clone(),
                    "recognize".to_string(),
                    task.input_path.display().to_string(),
                ],
            )
        }

        fn terminate_command(&self, _task: &Task) -> Option<CommandSpec> {
            self.terminate_script
                .as_ref()
                .map(|script| CommandSpec::new("sh", vec!["-c".to_string(), script.clone()]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::ScriptBackend;
    use super::*;

    #[test]
    fn test_docker_commands_use_container_name() {
        let dir = tempfile::tempdir().unwrap();
        let backend = DockerOsra::new("docker", "daverona/osra", dir.path()).unwrap();
        let task = Task::new("42", "mol.png", dir.path());

        let run = backend.recognize_command(&task);
        assert_eq!(run.program, "docker");
        assert!(run.args.contains(&"--name=osra-task-42".to_string()));
        assert!(run.args.contains(&"/data/mol.png".to_string()));
        assert_eq!(&run.args[run.args.len() - 4..run.args.len() - 1], ["osra", "-f", "smi"]);

        let stop = backend.terminate_command(&task).unwrap();
        assert_eq!(stop.args, vec!["stop", "osra-task-42"]);
    }

    #[test]
    fn test_missing_upload_dir_is_an_error() {
        assert!(DockerOsra::new("docker", "img", Path::new("/definitely/not/here")).is_err());
    }

    #[tokio::test]
    async fn test_terminate_reports_failure_and_timeout() {
        let task = Task::new("t", "x.png", Path::new("/tmp"));

        let mut backend = ScriptBackend::new("true");
        assert!(backend.terminate(&task, Duration::from_secs(5)).await.is_ok());

        backend.terminate_script = Some("echo boom >&2; exit 1".to_string());
        let err = backend.terminate(&task, Duration::from_secs(5)).await.unwrap_err();
        assert!(err.to_string().contains("boom"));

        backend.terminate_script = Some("sleep 5".to_string());
        let err = backend.terminate(&task, Duration::from_millis(100)).await.unwrap_err();
        assert!(err.to_string().contains("did not finish"));
    }
}
