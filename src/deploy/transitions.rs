// ABOUTME: State transition methods for deployment orchestration.
// ABOUTME: Each method consumes self and returns the next state on success.

use super::Deployment;
use super::dependencies::ensure_dependency;
use super::error::DeployError;
use super::health::{health_deadline, wait_for_canary};
use super::host::{
    compose_up, probe_container, read_manifest, remove_container, restore_manifest,
    write_manifest,
};
use super::image::ImageBuilder;
use super::outcome::{DeployFailure, Deployed, Stage};
use super::state::{
    Built, CanaryHealthy, CanaryOutcome, CanarySession, CanaryStarted, CanaryState, Done, Idle,
    Promoted, Resolved, RolledBack,
};
use super::strategy::{DeployStrategy, Eligibility};
use super::version::VersionPlan;
use super::{Cancellation, DeployMode};
use crate::manifest::{EntryRole, ManifestDocument, ServiceEntry};
use crate::remote::{RemoteError, RemoteOps};
use crate::stack::ImageSource;
use crate::types::Version;

/// Result type for transitions that may need rollback on failure.
///
/// On failure the deployment comes back in state `S` with the error, so the
/// caller can still undo whatever `S` owns.
pub type TransitionResult<'a, T, S> =
    Result<Deployment<'a, T>, (Deployment<'a, S>, DeployError)>;

// =============================================================================
// Internal Helpers
// =============================================================================

impl<S> Deployment<'_, S> {
    fn manifest_path(&self) -> String {
        self.descriptor().manifest_path()
    }

    /// Declare the volumes and networks the primary and canary entries refer to.
    fn declare_resources(&self, document: &mut ManifestDocument) {
        match self.request.stack {
            Some(stack) => document.declare_stack_resources(stack),
            None => {
                let descriptor = self.descriptor();
                document.declare_volumes(
                    descriptor
                        .volumes
                        .iter()
                        .filter(|mount| mount.is_named())
                        .map(|mount| mount.source.as_str()),
                );
                if descriptor.routing.is_some() {
                    document.declare_proxy_network();
                }
            }
        }
    }

    async fn write_document<R: RemoteOps + ?Sized>(
        &self,
        remote: &R,
        document: &ManifestDocument,
    ) -> Result<(), DeployError> {
        let text = document.render()?;
        write_manifest(remote, &self.manifest_path(), &text).await?;
        Ok(())
    }

    /// Recreate the primary from the manifest now on the host.
    async fn recreate_primary<R: RemoteOps + ?Sized>(
        &mut self,
        remote: &R,
    ) -> Result<(), DeployError> {
        let descriptor = self.descriptor();
        self.primary_touched = true;
        compose_up(
            remote,
            &descriptor.directory,
            &descriptor.project,
            &[descriptor.name.as_str()],
            true,
        )
        .await?;
        Ok(())
    }

    /// Start the direct dependencies that do not meet their wait condition
    /// and wait on each one.
    async fn start_dependencies<R: RemoteOps + ?Sized>(
        &self,
        remote: &R,
        cancel: &Cancellation,
        document: &mut ManifestDocument,
    ) -> Result<(), DeployError> {
        let Some(stack) = self.request.stack else {
            if !self.descriptor().depends_on.is_empty() {
                tracing::debug!(
                    "{}: sibling services unknown, not starting dependencies",
                    self.service_name()
                );
            }
            return Ok(());
        };

        for (dependency, condition) in stack.dependencies_of(self.descriptor()) {
            self.report(&format!("waiting for {} ({})", dependency.name, condition));
            ensure_dependency(
                remote,
                stack,
                document,
                self.descriptor(),
                dependency,
                condition,
                cancel,
            )
            .await?;
        }
        Ok(())
    }
}

impl<S: CanaryState> Deployment<'_, S> {
    /// Remove the canary container if it exists.
    async fn remove_canary<R: RemoteOps + ?Sized>(&self, remote: &R) -> Result<(), RemoteError> {
        let container = &self.state.session().container;
        if probe_container(remote, container).await?.is_some() {
            remove_container(remote, container).await?;
            tracing::debug!("Removed canary {}", container);
        }
        Ok(())
    }

    /// Final canary removal. Runs on every canary path; failures are logged.
    #[must_use = "deployment state must be used"]
    pub async fn cleanup<R: RemoteOps + ?Sized>(self, remote: &R) -> Self {
        if let Err(e) = self.remove_canary(remote).await {
            tracing::warn!(
                "Failed to remove canary {}: {}",
                self.state.session().container,
                e
            );
        }
        self
    }
}

// =============================================================================
// Idle -> Resolved
// =============================================================================

impl<'a> Deployment<'a, Idle> {
    /// Read the manifest and plan the next version.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::Manifest` when the manifest is malformed or the
    /// service's recorded image does not carry a skiff version.
    #[must_use = "deployment state must be used"]
    pub async fn resolve<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
    ) -> Result<Deployment<'a, Resolved>, DeployError> {
        let descriptor = self.descriptor();
        let snapshot = read_manifest(remote, &self.manifest_path()).await?;

        let document = if snapshot.text().trim().is_empty() {
            ManifestDocument::new(&descriptor.project)
        } else {
            ManifestDocument::parse(snapshot.text())?
        };

        let plan = match descriptor.source {
            ImageSource::Prebuilt(_) => None,
            ImageSource::Build { .. } => Some(VersionPlan::for_service(
                &document,
                &descriptor.name,
                &descriptor.image_name(),
            )?),
        };

        if let Some(plan) = plan {
            tracing::info!(
                "{}: version {} -> {}",
                descriptor.name,
                plan.current,
                plan.next
            );
        }

        Ok(self.transition(Resolved {
            snapshot,
            document,
            plan,
        }))
    }
}

// =============================================================================
// Resolved -> Built
// =============================================================================

impl<'a> Deployment<'a, Resolved> {
    /// Build or pull the image for the planned version.
    ///
    /// # Errors
    ///
    /// Returns the build, pull, or sync failure, or `DeployError::Cancelled`.
    #[must_use = "deployment state must be used"]
    pub async fn build<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
        cancel: &Cancellation,
    ) -> Result<Deployment<'a, Built>, DeployError> {
        let version = self.state.plan.map(|plan| plan.next);
        self.report(match self.descriptor().source {
            ImageSource::Prebuilt(_) => "pulling image",
            ImageSource::Build { .. } => "building image",
        });

        let image = ImageBuilder::new(remote, cancel)
            .resolve(self.descriptor(), version.unwrap_or(Version::UNDEPLOYED))
            .await?;

        let Resolved {
            snapshot, document, ..
        } = self.state;
        Ok(Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Built {
                snapshot,
                document,
                version,
                image,
            },
        })
    }

    /// Use the image an earlier build-only pass produced for this version.
    #[must_use = "deployment state must be used"]
    pub fn skip_build(self) -> Deployment<'a, Built> {
        let version = self.state.plan.map(|plan| plan.next);
        let image = match &self.descriptor().source {
            ImageSource::Prebuilt(image) => image.clone(),
            ImageSource::Build { .. } => self
                .descriptor()
                .image_name()
                .tagged(version.unwrap_or(Version::UNDEPLOYED)),
        };

        let Resolved {
            snapshot, document, ..
        } = self.state;
        Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Built {
                snapshot,
                document,
                version,
                image,
            },
        }
    }
}

// =============================================================================
// Built -> CanaryStarted | Done
// =============================================================================

impl<'a> Deployment<'a, Built> {
    pub fn image(&self) -> &str {
        &self.state.image
    }

    /// Inspect the host for the facts that decide canary eligibility.
    pub async fn eligibility<R: RemoteOps + ?Sized>(
        &self,
        remote: &R,
    ) -> Result<Eligibility, DeployError> {
        let primary = probe_container(remote, self.service_name().as_str()).await?;
        Ok(Eligibility {
            primary_running: primary.is_some_and(|probe| probe.is_running()),
            build_only: self.request.mode == DeployMode::BuildOnly,
            siblings_available: self.request.stack.is_some(),
        })
    }

    /// End a build-only pass: the image exists and nothing was started.
    #[must_use = "deployment state must be used"]
    pub fn finish_build(self) -> Deployment<'a, Done> {
        let Built { version, image, .. } = self.state;
        Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Done {
                version,
                image,
                strategy: None,
                reason: None,
            },
        }
    }

    /// Inject the canary entry next to the primary and start only the canary.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure. The deployment already owns the
    /// canary session, so the caller must roll back.
    #[must_use = "deployment state must be used"]
    pub async fn start_canary<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
        cancel: &Cancellation,
    ) -> TransitionResult<'a, CanaryStarted, CanaryStarted> {
        let descriptor = self.descriptor();
        let session = CanarySession {
            snapshot: self.state.snapshot.clone(),
            container: descriptor.name.canary(),
            deadline: health_deadline(descriptor.healthcheck.as_ref()),
            outcome: CanaryOutcome::Pending,
        };

        let mut document = self.state.document.clone();
        let canary = self.transition_canary(session);
        canary.report("starting canary");

        let started = async {
            canary.start_dependencies(remote, cancel, &mut document).await?;
            if cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }

            document.upsert_service(
                &canary.state.session.container,
                ServiceEntry::for_service(descriptor, &canary.state.built.image, EntryRole::Canary),
            );
            canary.declare_resources(&mut document);
            canary.write_document(remote, &document).await?;

            // Runs to completion: an interrupted `compose up` may still create
            // the container after rollback has looked for it.
            compose_up(
                remote,
                &descriptor.directory,
                &descriptor.project,
                &[canary.state.session.container.as_str()],
                true,
            )
            .await?;
            if cancel.is_cancelled() {
                return Err(DeployError::Cancelled);
            }
            Ok(())
        }
        .await;

        match started {
            Ok(()) => {
                tracing::info!("Started canary {}", canary.state.session.container);
                Ok(canary)
            }
            Err(e) => Err((canary, e)),
        }
    }

    fn transition_canary(self, session: CanarySession) -> Deployment<'a, CanaryStarted> {
        Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: CanaryStarted {
                built: self.state,
                session,
            },
        }
    }

    /// Start the primary on the new version without a canary.
    ///
    /// Direct dependencies that are not running are started first and waited
    /// on according to their wait condition.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure. Nothing is undone; check
    /// [`Deployment::primary_touched`].
    #[must_use = "deployment state must be used"]
    pub async fn start_direct<R: RemoteOps + ?Sized>(
        mut self,
        remote: &R,
        cancel: &Cancellation,
        reason: Option<&'static str>,
    ) -> TransitionResult<'a, Done, Built> {
        let mut document = self.state.document.clone();
        if let Err(e) = self.start_dependencies(remote, cancel, &mut document).await {
            return Err((self, e));
        }
        if cancel.is_cancelled() {
            return Err((self, DeployError::Cancelled));
        }

        let descriptor = self.descriptor();
        document.upsert_service(
            descriptor.name.as_str(),
            ServiceEntry::for_service(descriptor, &self.state.image, EntryRole::Primary),
        );
        self.declare_resources(&mut document);

        self.report("starting");
        if let Err(e) = self.write_document(remote, &document).await {
            return Err((self, e));
        }
        if let Err(e) = self.recreate_primary(remote).await {
            return Err((self, e));
        }
        tracing::info!("Started {} directly on {}", descriptor.name, self.state.image);

        let Built { version, image, .. } = self.state;
        Ok(Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Done {
                version,
                image,
                strategy: Some(DeployStrategy::Direct),
                reason,
            },
        })
    }
}

// =============================================================================
// CanaryStarted -> CanaryHealthy | RolledBack
// =============================================================================

impl<'a> Deployment<'a, CanaryStarted> {
    pub fn canary_container(&self) -> &str {
        &self.state.session.container
    }

    /// Wait for the canary to become healthy.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on timeout or cancellation so the caller can
    /// roll back.
    #[must_use = "deployment state must be used"]
    pub async fn health_check<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
        cancel: &Cancellation,
    ) -> TransitionResult<'a, CanaryHealthy, CanaryStarted> {
        self.report("waiting for canary health");
        let result = wait_for_canary(
            remote,
            &self.state.session.container,
            self.descriptor().healthcheck.as_ref(),
            cancel,
        )
        .await;

        match result {
            Ok(()) => {
                tracing::info!("Canary {} healthy", self.state.session.container);
                let CanaryStarted { built, session } = self.state;
                Ok(Deployment {
                    request: self.request,
                    primary_touched: self.primary_touched,
                    state: CanaryHealthy { built, session },
                })
            }
            Err(e) => Err((self, e)),
        }
    }

    /// Remove the canary and restore the pre-canary manifest.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackFailed` wrapping the restore failure.
    #[must_use = "deployment state must be used"]
    pub async fn roll_back<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
        cause: DeployError,
    ) -> Result<Deployment<'a, RolledBack>, DeployError> {
        tracing::warn!(
            "Rolling back canary {}: {}",
            self.state.session.container,
            cause
        );
        self.report("rolling back canary");

        if let Err(e) = self.undo_canary(remote, true).await {
            return Err(DeployError::RollbackFailed {
                cause: cause.to_string(),
                source: Box::new(e),
            });
        }

        let CanaryStarted { mut session, .. } = self.state;
        session.outcome = CanaryOutcome::RolledBack;
        Ok(Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: RolledBack { session, cause },
        })
    }
}

impl<S: CanaryState> Deployment<'_, S> {
    /// Remove the canary container, then put the snapshot back if asked to.
    async fn undo_canary<R: RemoteOps + ?Sized>(
        &self,
        remote: &R,
        restore: bool,
    ) -> Result<(), DeployError> {
        self.remove_canary(remote).await?;
        if restore {
            let session = self.state.session();
            restore_manifest(remote, &self.manifest_path(), &session.snapshot).await?;
            tracing::debug!("Restored manifest {}", self.manifest_path());
        }
        Ok(())
    }
}

// =============================================================================
// CanaryHealthy -> Promoted | RolledBack
// =============================================================================

impl<'a> Deployment<'a, CanaryHealthy> {
    /// Record the new version for the primary, drop the canary entry, and
    /// recreate only the primary.
    ///
    /// # Errors
    ///
    /// Returns `(self, error)` on failure; the canary is still running.
    #[must_use = "deployment state must be used"]
    pub async fn promote<R: RemoteOps + ?Sized>(
        mut self,
        remote: &R,
    ) -> TransitionResult<'a, Promoted, CanaryHealthy> {
        let descriptor = self.descriptor();
        let mut document = self.state.built.document.clone();
        document.remove_service(&self.state.session.container);
        document.upsert_service(
            descriptor.name.as_str(),
            ServiceEntry::for_service(descriptor, &self.state.built.image, EntryRole::Primary),
        );
        self.declare_resources(&mut document);

        self.report("promoting");
        if let Err(e) = self.write_document(remote, &document).await {
            return Err((self, e));
        }
        if let Err(e) = self.recreate_primary(remote).await {
            return Err((self, e));
        }
        tracing::info!("Promoted {} to {}", descriptor.name, self.state.built.image);

        let CanaryHealthy { built, mut session } = self.state;
        session.outcome = CanaryOutcome::Promoted;
        Ok(Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Promoted {
                version: built.version,
                image: built.image,
                session,
            },
        })
    }

    /// Give up after a failed promotion.
    ///
    /// Removes the canary. The snapshot is restored only while the primary is
    /// untouched; once it has been recreated the new manifest stays.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::RollbackFailed` wrapping the undo failure.
    #[must_use = "deployment state must be used"]
    pub async fn abandon<R: RemoteOps + ?Sized>(
        self,
        remote: &R,
        cause: DeployError,
    ) -> Result<Deployment<'a, RolledBack>, DeployError> {
        tracing::warn!("Abandoning promotion of {}: {}", self.service_name(), cause);

        if let Err(e) = self.undo_canary(remote, !self.primary_touched).await {
            return Err(DeployError::RollbackFailed {
                cause: cause.to_string(),
                source: Box::new(e),
            });
        }

        let CanaryHealthy { mut session, .. } = self.state;
        session.outcome = CanaryOutcome::Aborted;
        Ok(Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: RolledBack { session, cause },
        })
    }
}

// =============================================================================
// Promoted -> Done
// =============================================================================

impl<'a> Deployment<'a, Promoted> {
    #[must_use = "deployment state must be used"]
    pub fn complete(self) -> Deployment<'a, Done> {
        let Promoted { version, image, .. } = self.state;
        Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state: Done {
                version,
                image,
                strategy: Some(DeployStrategy::Canary),
                reason: None,
            },
        }
    }
}

// =============================================================================
// Terminal states
// =============================================================================

impl Deployment<'_, RolledBack> {
    pub fn outcome(&self) -> CanaryOutcome {
        self.state.session.outcome
    }

    /// Report the failure that caused the rollback at `stage`.
    pub fn into_failure(self, stage: Stage) -> DeployFailure {
        DeployFailure::new(
            self.service_name(),
            stage,
            self.primary_touched,
            self.state.cause,
        )
    }
}

impl Deployment<'_, Done> {
    pub fn finish(self) -> Deployed {
        let descriptor = self.descriptor();
        Deployed {
            service: descriptor.name.clone(),
            version: self.state.version,
            image: self.state.image,
            strategy: self.state.strategy,
            reason: self.state.reason,
            url: self
                .state
                .strategy
                .and_then(|_| descriptor.url()),
        }
    }
}
