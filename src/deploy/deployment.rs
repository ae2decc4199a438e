// ABOUTME: Generic deployment struct parameterized by state type.
// ABOUTME: Carries the request being served and whether the primary was touched.

use crate::stack::{ServiceDescriptor, Stack};
use crate::types::ServiceName;

use super::state::Idle;

/// Which part of a deploy to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeployMode {
    /// Build, then start.
    #[default]
    Full,
    /// Build the image and stop; nothing is started.
    BuildOnly,
    /// Start an image an earlier build-only pass produced.
    StartOnly,
}

/// Receives user-facing progress messages from a deploy.
pub trait Progress: Sync {
    fn step(&self, service: &ServiceName, message: &str);
}

impl Progress for () {
    fn step(&self, _service: &ServiceName, _message: &str) {}
}

/// One service to deploy and the context it is deployed in.
#[derive(Clone, Copy)]
pub struct DeployRequest<'a> {
    pub descriptor: &'a ServiceDescriptor,
    /// Sibling services sharing the target directory, when known.
    pub stack: Option<&'a Stack>,
    pub mode: DeployMode,
    pub progress: &'a dyn Progress,
}

impl<'a> DeployRequest<'a> {
    pub fn new(descriptor: &'a ServiceDescriptor) -> Self {
        Self {
            descriptor,
            stack: None,
            mode: DeployMode::Full,
            progress: &(),
        }
    }

    pub fn in_stack(mut self, stack: &'a Stack) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn mode(mut self, mode: DeployMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn progress(mut self, progress: &'a dyn Progress) -> Self {
        self.progress = progress;
        self
    }
}

impl std::fmt::Debug for DeployRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeployRequest")
            .field("service", &self.descriptor.name)
            .field("stack", &self.stack.map(Stack::project))
            .field("mode", &self.mode)
            .finish()
    }
}

/// A deployment in progress, parameterized by its current state.
///
/// The state type parameter `S` carries the data of that state, so a canary
/// session exists exactly in the states that own a canary container.
#[derive(Debug)]
pub struct Deployment<'a, S> {
    pub(crate) request: DeployRequest<'a>,
    pub(crate) primary_touched: bool,
    pub(crate) state: S,
}

impl<'a> Deployment<'a, Idle> {
    pub fn new(request: DeployRequest<'a>) -> Self {
        Deployment {
            request,
            primary_touched: false,
            state: Idle,
        }
    }
}

impl<'a, S> Deployment<'a, S> {
    pub fn descriptor(&self) -> &'a ServiceDescriptor {
        self.request.descriptor
    }

    pub fn service_name(&self) -> &'a ServiceName {
        &self.request.descriptor.name
    }

    pub fn request(&self) -> &DeployRequest<'a> {
        &self.request
    }

    /// Whether the primary container has been recreated or stopped.
    pub fn primary_touched(&self) -> bool {
        self.primary_touched
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    /// Move to the next state, keeping the request.
    pub(crate) fn transition<T>(self, state: T) -> Deployment<'a, T> {
        Deployment {
            request: self.request,
            primary_touched: self.primary_touched,
            state,
        }
    }

    pub(crate) fn report(&self, message: &str) {
        self.request.progress.step(self.service_name(), message);
    }
}
