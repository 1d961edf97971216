//! Thin wrappers over the `docker` CLI.

use std::{path::Path, time::Duration};

use interchain_testing_core::adjust_timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::exec::{self, CommandError, Output};

const DOCKER: &str = "docker";
const DOCKER_TIMEOUT: Duration = Duration::from_secs(120);
pub const TEST_LABEL: &str = "ictest.test";

fn docker_timeout() -> Duration {
    adjust_timeout(DOCKER_TIMEOUT)
}

async fn docker(args: Vec<String>, stdin: Option<&[u8]>) -> Result<Output, CommandError> {
    exec::run(DOCKER, &args, stdin, docker_timeout()).await
}

/// Lowercase alphanumerics and dashes, as accepted in container and network
/// names.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_owned()
}

#[must_use]
pub fn unique_name(prefix: &str) -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}-{}", sanitize(prefix), &id[..8])
}

/// A user-defined bridge network shared by every container of one test.
#[derive(Clone, Debug)]
pub struct DockerNetwork {
    name: String,
    test_name: String,
}

impl DockerNetwork {
    pub async fn create(test_name: &str) -> Result<Self, CommandError> {
        let name = unique_name(&format!("ictest-{test_name}"));
        docker(
            vec![
                "network".into(),
                "create".into(),
                "--label".into(),
                format!("{TEST_LABEL}={test_name}"),
                name.clone(),
            ],
            None,
        )
        .await?;
        info!(network = %name, "docker network created");
        Ok(Self {
            name,
            test_name: test_name.to_owned(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub async fn remove(&self) {
        if let Err(err) = docker(vec!["network".into(), "rm".into(), self.name.clone()], None).await {
            warn!(network = %self.name, error = %err, "failed to remove docker network");
        }
    }
}

/// What a long-lived helper container runs with. The entrypoint is replaced
/// by `sleep infinity`; processes are started later through `docker exec`.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub user: Option<String>,
    pub published_ports: Vec<u16>,
    pub env: Vec<(String, String)>,
}

impl ContainerSpec {
    #[must_use]
    pub fn new(name: impl Into<String>, image: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            image: image.into(),
            user: None,
            published_ports: Vec::new(),
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: Option<String>) -> Self {
        self.user = user;
        self
    }

    #[must_use]
    pub fn publish(mut self, port: u16) -> Self {
        self.published_ports.push(port);
        self
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    fn run_args(&self, network: &DockerNetwork) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "-d".to_owned(),
            "--name".to_owned(),
            self.name.clone(),
            "--hostname".to_owned(),
            self.name.clone(),
            "--network".to_owned(),
            network.name().to_owned(),
            "--label".to_owned(),
            format!("{TEST_LABEL}={}", network.test_name()),
            "--entrypoint".to_owned(),
            "sleep".to_owned(),
        ];
        if let Some(user) = &self.user {
            args.push("--user".to_owned());
            args.push(user.clone());
        }
        for port in &self.published_ports {
            args.push("-p".to_owned());
            args.push(format!("127.0.0.1::{port}"));
        }
        for (key, value) in &self.env {
            args.push("-e".to_owned());
            args.push(format!("{key}={value}"));
        }
        args.push(self.image.clone());
        args.push("infinity".to_owned());
        args
    }
}

#[derive(Clone, Debug)]
pub struct Container {
    name: String,
}

impl Container {
    pub async fn run(spec: &ContainerSpec, network: &DockerNetwork) -> Result<Self, CommandError> {
        docker(spec.run_args(network), None).await?;
        info!(container = %spec.name, image = %spec.image, "container started");
        Ok(Self {
            name: spec.name.clone(),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn exec(&self, argv: &[String], stdin: Option<&[u8]>) -> Result<Output, CommandError> {
        let mut args = vec!["exec".to_owned()];
        if stdin.is_some() {
            args.push("-i".to_owned());
        }
        args.push(self.name.clone());
        args.extend(argv.iter().cloned());
        docker(args, stdin).await
    }

    /// Starts `argv` in the background inside the container.
    pub async fn exec_detached(&self, argv: &[String]) -> Result<(), CommandError> {
        let mut args = vec!["exec".to_owned(), "-d".to_owned(), self.name.clone()];
        args.extend(argv.iter().cloned());
        docker(args, None).await.map(|_| ())
    }

    pub async fn write_file(&self, path: &str, contents: &[u8]) -> Result<(), CommandError> {
        let script = format!("cat > '{path}'");
        self.exec(&["sh".into(), "-c".into(), script], Some(contents))
            .await
            .map(|_| ())
    }

    pub async fn read_file(&self, path: &str) -> Result<String, CommandError> {
        self.exec(&["cat".into(), path.to_owned()], None)
            .await
            .map(|output| output.stdout)
    }

    pub async fn copy_in(&self, local: &Path, dest: &str) -> Result<(), CommandError> {
        docker(
            vec![
                "cp".into(),
                local.display().to_string(),
                format!("{}:{dest}", self.name),
            ],
            None,
        )
        .await
        .map(|_| ())
    }

    /// Host port docker bound to the container's `port`.
    pub async fn host_port(&self, port: u16) -> Result<u16, CommandError> {
        let output = docker(
            vec!["port".into(), self.name.clone(), format!("{port}/tcp")],
            None,
        )
        .await?;
        parse_host_port(&output.stdout).ok_or_else(|| CommandError::Failed {
            command: format!("docker port {} {port}/tcp", self.name),
            code: None,
            stdout: output.stdout.clone(),
            stderr: "no host binding".to_owned(),
        })
    }

    pub async fn remove(&self) -> Result<(), CommandError> {
        docker(vec!["rm".into(), "-f".into(), self.name.clone()], None).await?;
        info!(container = %self.name, "container removed");
        Ok(())
    }
}

fn parse_host_port(stdout: &str) -> Option<u16> {
    stdout
        .lines()
        .filter_map(|line| line.trim().rsplit_once(':'))
        .find_map(|(_, port)| port.parse().ok())
}
