// ABOUTME: Produces the image a deploy runs: remote build from synced source, or a pull.
// ABOUTME: Build workspaces are temporary directories removed on every exit path.

use std::path::Path;

use super::{Cancellation, DeployError};
use crate::remote::{RemoteError, RemoteOps, quote};
use crate::stack::{ImageSource, ServiceDescriptor};
use crate::types::Version;

/// A temporary directory on the remote host holding build source.
pub struct RemoteWorkspace<'a, R: RemoteOps + ?Sized> {
    remote: &'a R,
    path: String,
}

impl<'a, R: RemoteOps + ?Sized> RemoteWorkspace<'a, R> {
    pub async fn create(remote: &'a R) -> Result<Self, RemoteError> {
        let output = remote.run_command("mktemp -d /tmp/skiff-build.XXXXXX").await?;
        let path = output.trim().to_string();
        tracing::debug!("Created build workspace {}", path);
        Ok(Self { remote, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub async fn remove(self) -> Result<(), RemoteError> {
        self.remote
            .run_command(&format!("rm -rf {}", quote(&self.path)))
            .await?;
        tracing::debug!("Removed build workspace {}", self.path);
        Ok(())
    }
}

/// Builds or pulls service images on the remote host.
pub struct ImageBuilder<'a, R: RemoteOps + ?Sized> {
    remote: &'a R,
    cancel: &'a Cancellation,
}

impl<'a, R: RemoteOps + ?Sized> ImageBuilder<'a, R> {
    pub fn new(remote: &'a R, cancel: &'a Cancellation) -> Self {
        Self { remote, cancel }
    }

    /// Make the image for `descriptor` available and return its reference.
    ///
    /// Pre-built images are pulled exactly as named and `version` is ignored.
    /// Built images are tagged `prefix-project-service:version`.
    pub async fn resolve(
        &self,
        descriptor: &ServiceDescriptor,
        version: Version,
    ) -> Result<String, DeployError> {
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }

        match &descriptor.source {
            ImageSource::Prebuilt(image) => {
                tracing::info!("Pulling {}", image);
                self.cancel
                    .guard(
                        self.remote
                            .run_interactive(&format!("docker pull {}", quote(image))),
                    )
                    .await?;
                Ok(image.clone())
            }
            ImageSource::Build {
                context,
                dockerfile,
                target,
            } => {
                let reference = descriptor.image_name().tagged(version);
                tracing::info!("Building {}", reference);

                let workspace = RemoteWorkspace::create(self.remote).await?;
                let result = self
                    .build_in(&workspace, context, dockerfile, target.as_deref(), &reference)
                    .await;

                if let Err(e) = workspace.remove().await {
                    tracing::warn!("Failed to remove build workspace: {}", e);
                }

                result.map(|()| reference)
            }
        }
    }

    async fn build_in(
        &self,
        workspace: &RemoteWorkspace<'_, R>,
        context: &Path,
        dockerfile: &str,
        target: Option<&str>,
        reference: &str,
    ) -> Result<(), DeployError> {
        let root = workspace.path();

        self.cancel
            .guard(self.remote.sync_tree(context, root))
            .await?;

        let mut command = format!(
            "docker build --tag {} --file {}",
            quote(reference),
            quote(&format!("{root}/{dockerfile}"))
        );
        if let Some(target) = target {
            command.push_str(&format!(" --target {}", quote(target)));
        }
        command.push_str(&format!(" {}", quote(root)));

        self.cancel
            .guard(self.remote.run_interactive(&command))
            .await
    }
}
