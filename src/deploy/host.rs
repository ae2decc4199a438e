// ABOUTME: Remote host primitives the deploy core composes: manifest I/O, probes, compose.
// ABOUTME: Every shell command skiff issues against the host is built here.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::remote::{RemoteError, RemoteErrorKind, RemoteOps, quote};

/// Go template read by [`probe_container`]: status, health, exit code.
const INSPECT_FORMAT: &str =
    "{{.State.Status}} {{if .State.Health}}{{.State.Health.Status}}{{else}}none{{end}} {{.State.ExitCode}}";

/// Manifest text exactly as found before an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestSnapshot(Option<String>);

impl ManifestSnapshot {
    /// Snapshot of a manifest file that does not exist.
    pub fn absent() -> Self {
        Self(None)
    }

    pub fn of(text: impl Into<String>) -> Self {
        Self(Some(text.into()))
    }

    pub fn exists(&self) -> bool {
        self.0.is_some()
    }

    /// Manifest text; empty when the file did not exist.
    pub fn text(&self) -> &str {
        self.0.as_deref().unwrap_or_default()
    }
}

/// Read the manifest at `path`.
pub async fn read_manifest<R: RemoteOps + ?Sized>(
    remote: &R,
    path: &str,
) -> Result<ManifestSnapshot, RemoteError> {
    let path = quote(path);
    // The marker tells an empty file apart from a missing one.
    let output = remote
        .run_command(&format!("if [ -f {path} ]; then printf '+'; cat {path}; fi"))
        .await?;

    Ok(match output.strip_prefix('+') {
        Some(text) => ManifestSnapshot::of(text),
        None => ManifestSnapshot::absent(),
    })
}

/// Replace the file at `path` with `text`, byte for byte.
pub async fn write_manifest<R: RemoteOps + ?Sized>(
    remote: &R,
    path: &str,
    text: &str,
) -> Result<(), RemoteError> {
    let directory = path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or(".");
    let staging = format!("{path}.tmp");
    let command = format!(
        "mkdir -p {} && printf '%s' '{}' | base64 -d > {} && mv {} {}",
        quote(directory),
        STANDARD.encode(text),
        quote(&staging),
        quote(&staging),
        quote(path),
    );
    remote.run_command(&command).await?;
    Ok(())
}

/// Put the manifest back exactly as snapshotted, deleting it if it was absent.
pub async fn restore_manifest<R: RemoteOps + ?Sized>(
    remote: &R,
    path: &str,
    snapshot: &ManifestSnapshot,
) -> Result<(), RemoteError> {
    match &snapshot.0 {
        Some(text) => write_manifest(remote, path, text).await,
        None => {
            remote.run_command(&format!("rm -f {}", quote(path))).await?;
            Ok(())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Restarting,
    Paused,
    Exited,
    Dead,
    Other(String),
}

impl ContainerStatus {
    fn parse(status: &str) -> Self {
        match status {
            "created" => ContainerStatus::Created,
            "running" => ContainerStatus::Running,
            "restarting" => ContainerStatus::Restarting,
            "paused" => ContainerStatus::Paused,
            "exited" => ContainerStatus::Exited,
            "dead" => ContainerStatus::Dead,
            other => ContainerStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContainerStatus::Created => "created",
            ContainerStatus::Running => "running",
            ContainerStatus::Restarting => "restarting",
            ContainerStatus::Paused => "paused",
            ContainerStatus::Exited => "exited",
            ContainerStatus::Dead => "dead",
            ContainerStatus::Other(status) => status,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    Starting,
    Healthy,
    Unhealthy,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            HealthStatus::Starting => "starting",
            HealthStatus::Healthy => "healthy",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

/// State of one container as reported by `docker inspect`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerProbe {
    pub status: ContainerStatus,
    /// `None` when the container has no health check.
    pub health: Option<HealthStatus>,
    pub exit_code: i64,
}

impl ContainerProbe {
    /// Parse the output of the inspect template.
    pub fn parse(output: &str) -> Option<Self> {
        let mut fields = output.split_whitespace();
        let status = ContainerStatus::parse(fields.next()?);
        let health = match fields.next()? {
            "starting" => Some(HealthStatus::Starting),
            "healthy" => Some(HealthStatus::Healthy),
            "unhealthy" => Some(HealthStatus::Unhealthy),
            _ => None,
        };
        let exit_code = fields.next().and_then(|code| code.parse().ok()).unwrap_or(0);
        Some(Self {
            status,
            health,
            exit_code,
        })
    }

    pub fn is_running(&self) -> bool {
        self.status == ContainerStatus::Running
    }

    pub fn is_healthy(&self) -> bool {
        self.is_running() && self.health == Some(HealthStatus::Healthy)
    }
}

/// Inspect a container by name; `None` when it does not exist.
pub async fn probe_container<R: RemoteOps + ?Sized>(
    remote: &R,
    name: &str,
) -> Result<Option<ContainerProbe>, RemoteError> {
    let output = remote
        .run_command(&format!(
            "docker inspect --format {} {} 2>/dev/null || true",
            quote(INSPECT_FORMAT),
            quote(name)
        ))
        .await?;
    Ok(ContainerProbe::parse(&output))
}

/// Force-remove a container.
pub async fn remove_container<R: RemoteOps + ?Sized>(
    remote: &R,
    name: &str,
) -> Result<(), RemoteError> {
    remote
        .run_command(&format!("docker rm -f {}", quote(name)))
        .await?;
    Ok(())
}

/// Start `services` from the manifest in `directory`, never their dependencies.
pub async fn compose_up<R: RemoteOps + ?Sized>(
    remote: &R,
    directory: &str,
    project: &str,
    services: &[&str],
    recreate: bool,
) -> Result<(), RemoteError> {
    let mut command = format!(
        "cd {} && docker compose -p {} up -d --no-deps",
        quote(directory),
        quote(project)
    );
    if recreate {
        command.push_str(" --force-recreate");
    }
    for service in services {
        command.push(' ');
        command.push_str(&quote(service));
    }
    remote.run_interactive(&command).await
}

/// Stream the compose logs of one service to the local terminal.
pub async fn service_logs<R: RemoteOps + ?Sized>(
    remote: &R,
    directory: &str,
    project: &str,
    service: &str,
    tail: usize,
    follow: bool,
) -> Result<(), RemoteError> {
    let mut command = format!(
        "cd {} && docker compose -p {} logs --tail {}",
        quote(directory),
        quote(project),
        tail
    );
    if follow {
        command.push_str(" --follow");
    }
    command.push(' ');
    command.push_str(&quote(service));
    remote.run_interactive(&command).await
}

/// Whether `reference` is present in the host's image store.
pub async fn image_exists<R: RemoteOps + ?Sized>(
    remote: &R,
    reference: &str,
) -> Result<bool, RemoteError> {
    let command = format!(
        "docker image inspect --format {} {}",
        quote("{{.Id}}"),
        quote(reference)
    );
    match remote.run_command(&command).await {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == RemoteErrorKind::NonZeroExit => Ok(false),
        Err(e) => Err(e),
    }
}
