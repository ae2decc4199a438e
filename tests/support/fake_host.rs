// ABOUTME: In-memory remote host that understands the commands skiff issues.
// ABOUTME: Files, images, and containers live in memory; container probes can be scripted.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use parking_lot::Mutex;
use serde_yaml::Value;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::Path;
use std::time::Duration;

use skiff::remote::{RemoteError, RemoteOps};

/// Probe output of a running container without a health check.
pub const RUNNING: &str = "running none 0";
/// Probe output of a running container that passes its health check.
pub const HEALTHY: &str = "running healthy 0";
/// Probe output of a container whose health check has not passed yet.
pub const STARTING: &str = "running starting 0";

/// A container on the fake host.
#[derive(Debug, Clone)]
pub struct FakeContainer {
    pub image: String,
    /// Remaining probe outputs; the last one repeats forever.
    probes: VecDeque<String>,
}

impl FakeContainer {
    fn new(image: &str, probes: VecDeque<String>) -> Self {
        Self {
            image: image.to_string(),
            probes,
        }
    }

    fn probe(&mut self) -> String {
        if self.probes.len() > 1 {
            self.probes.pop_front().unwrap_or_default()
        } else {
            self.probes.front().cloned().unwrap_or_default()
        }
    }

    /// Current container status word, e.g. `running`.
    pub fn status(&self) -> &str {
        self.probes
            .front()
            .and_then(|probe| probe.split_whitespace().next())
            .unwrap_or("running")
    }
}

#[derive(Debug, Default)]
struct HostState {
    files: BTreeMap<String, String>,
    images: BTreeSet<String>,
    containers: BTreeMap<String, FakeContainer>,
    /// Probe scripts picked up by the next container created under a name.
    scripts: BTreeMap<String, VecDeque<String>>,
    workspaces: BTreeSet<String>,
    next_workspace: u32,
    failures: Vec<Failure>,
    delays: Vec<(String, Duration)>,
    commands: Vec<String>,
}

#[derive(Debug)]
enum Failure {
    Contains(String),
    EndsWith(String),
    Times { pattern: String, remaining: u32 },
}

impl Failure {
    fn matches(&self, command: &str) -> bool {
        match self {
            Failure::Contains(pattern) => command.contains(pattern.as_str()),
            Failure::EndsWith(pattern) => command.ends_with(pattern.as_str()),
            Failure::Times { pattern, remaining } => {
                *remaining > 0 && command.contains(pattern.as_str())
            }
        }
    }

    fn consume(&mut self) {
        if let Failure::Times { remaining, .. } = self {
            *remaining -= 1;
        }
    }
}

impl HostState {
    fn inject_failure(&mut self, command: &str) -> bool {
        match self.failures.iter_mut().find(|failure| failure.matches(command)) {
            Some(failure) => {
                failure.consume();
                true
            }
            None => false,
        }
    }
}

/// Scripted stand-in for a deploy target reached over SSH.
#[derive(Debug, Default)]
pub struct FakeHost {
    state: Mutex<HostState>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: &str, text: &str) -> Self {
        self.state
            .lock()
            .files
            .insert(path.to_string(), text.to_string());
        self
    }

    pub fn with_image(self, reference: &str) -> Self {
        self.state.lock().images.insert(reference.to_string());
        self
    }

    /// Add a container running `image` that reports `probe` on every inspect.
    pub fn with_container(self, name: &str, image: &str, probe: &str) -> Self {
        {
            let mut state = self.state.lock();
            state.images.insert(image.to_string());
            state.containers.insert(
                name.to_string(),
                FakeContainer::new(image, VecDeque::from([probe.to_string()])),
            );
        }
        self
    }

    /// Probe outputs for the next container started under `container`.
    pub fn script(&self, container: &str, probes: &[&str]) {
        self.state.lock().scripts.insert(
            container.to_string(),
            probes.iter().map(|probe| probe.to_string()).collect(),
        );
    }

    /// Make every command containing `pattern` exit with status 1.
    pub fn fail_on(&self, pattern: &str) {
        self.state
            .lock()
            .failures
            .push(Failure::Contains(pattern.to_string()));
    }

    /// Make every command ending in `suffix` exit with status 1.
    pub fn fail_on_suffix(&self, suffix: &str) {
        self.state
            .lock()
            .failures
            .push(Failure::EndsWith(suffix.to_string()));
    }

    /// Make the next `times` commands containing `pattern` exit with status 1.
    pub fn fail_times(&self, pattern: &str, times: u32) {
        self.state.lock().failures.push(Failure::Times {
            pattern: pattern.to_string(),
            remaining: times,
        });
    }

    /// Make commands containing `pattern` take `delay` before they run.
    pub fn slow_on(&self, pattern: &str, delay: Duration) {
        self.state
            .lock()
            .delays
            .push((pattern.to_string(), delay));
    }

    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.state.lock().files.get(path).cloned()
    }

    pub fn write_file(&self, path: &str, text: &str) {
        self.state
            .lock()
            .files
            .insert(path.to_string(), text.to_string());
    }

    pub fn has_image(&self, reference: &str) -> bool {
        self.state.lock().images.contains(reference)
    }

    pub fn container(&self, name: &str) -> Option<FakeContainer> {
        self.state.lock().containers.get(name).cloned()
    }

    pub fn container_image(&self, name: &str) -> Option<String> {
        self.container(name).map(|container| container.image)
    }

    /// Build workspaces created and not yet removed.
    pub fn open_workspaces(&self) -> usize {
        self.state.lock().workspaces.len()
    }

    /// Every command run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Number of commands containing `pattern`.
    pub fn count(&self, pattern: &str) -> usize {
        self.state
            .lock()
            .commands
            .iter()
            .filter(|command| command.contains(pattern))
            .count()
    }

    pub fn clear_commands(&self) {
        self.state.lock().commands.clear();
    }

    /// Wait out the delay configured for `command`, if any.
    async fn delay(&self, command: &str) {
        let delay = self
            .state
            .lock()
            .delays
            .iter()
            .find(|(pattern, _)| command.contains(pattern.as_str()))
            .map(|(_, delay)| *delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn execute(&self, command: &str) -> Result<String, RemoteError> {
        let mut state = self.state.lock();
        state.commands.push(command.to_string());

        if state.inject_failure(command) {
            return Err(RemoteError::exit(command, 1, "injected failure"));
        }

        state
            .dispatch(command)
            .map_err(|(code, stderr)| RemoteError::exit(command, code, stderr))
    }
}

impl HostState {
    fn dispatch(&mut self, command: &str) -> Result<String, (u32, String)> {
        if let Some(rest) = command.strip_prefix("if [ -f ") {
            let path = unquote(rest.split(" ]").next().unwrap_or_default());
            return Ok(match self.files.get(&path) {
                Some(text) => format!("+{text}"),
                None => String::new(),
            });
        }

        if command.contains("ln \"$tmp\" ") {
            return self.publish_lock(command);
        }

        if command.contains("| base64 -d >") {
            return self.write_base64(command);
        }

        if let Some(path) = command.strip_prefix("cat ") {
            return self
                .files
                .get(&unquote(path))
                .cloned()
                .ok_or_else(|| (1, format!("cat: {path}: No such file or directory")));
        }

        if let Some(path) = command.strip_prefix("rm -f ") {
            self.files.remove(&unquote(path));
            return Ok(String::new());
        }

        if command.starts_with("mktemp -d ") {
            self.next_workspace += 1;
            let path = format!("/tmp/skiff-build.{:06}", self.next_workspace);
            self.workspaces.insert(path.clone());
            return Ok(format!("{path}\n"));
        }

        if let Some(path) = command.strip_prefix("rm -rf ") {
            self.workspaces.remove(&unquote(path));
            return Ok(String::new());
        }

        if let Some(rest) = command.strip_prefix("docker image inspect --format ") {
            let reference = unquote(last_word(rest));
            if self.images.contains(&reference) {
                return Ok(format!("sha256:{}\n", reference.len()));
            }
            return Err((1, format!("Error: No such image: {reference}")));
        }

        if let Some(rest) = command.strip_prefix("docker inspect --format ") {
            let name = unquote(last_word(
                rest.strip_suffix(" 2>/dev/null || true").unwrap_or(rest),
            ));
            return Ok(self
                .containers
                .get_mut(&name)
                .map(FakeContainer::probe)
                .unwrap_or_default());
        }

        if let Some(name) = command.strip_prefix("docker rm -f ") {
            self.containers.remove(&unquote(name));
            return Ok(String::new());
        }

        if let Some(image) = command.strip_prefix("docker pull ") {
            self.images.insert(unquote(image));
            return Ok(String::new());
        }

        if let Some(rest) = command.strip_prefix("docker build --tag ") {
            let reference = unquote(rest.split_whitespace().next().unwrap_or_default());
            let workspace = unquote(last_word(rest));
            if !self.workspaces.contains(&workspace) {
                return Err((1, format!("unable to prepare context: {workspace} not found")));
            }
            self.images.insert(reference);
            return Ok(String::new());
        }

        if command.starts_with("cd ") && command.contains(" up -d --no-deps") {
            return self.compose_up(command);
        }

        if command.starts_with("cd ") && command.contains(" logs --tail ") {
            return Ok(String::new());
        }

        Err((127, format!("fake host: unsupported command: {command}")))
    }

    /// Write holder info to a temp file and hard-link it into place.
    fn publish_lock(&mut self, command: &str) -> Result<String, (u32, String)> {
        let content = command
            .split_once("printf '%s' ")
            .and_then(|(_, rest)| rest.split_once(" > \"$tmp\""))
            .map(|(content, _)| content);
        let path = command
            .split_once("ln \"$tmp\" ")
            .and_then(|(_, rest)| rest.split_once(" 2>/dev/null"))
            .map(|(path, _)| path);
        let (Some(content), Some(path)) = (content, path) else {
            return Err((2, "malformed lock command".to_string()));
        };

        let path = unquote(path);
        if self.files.contains_key(&path) {
            return Err((1, String::new()));
        }
        self.files.insert(path, unquote(content));
        Ok(String::new())
    }

    fn write_base64(&mut self, command: &str) -> Result<String, (u32, String)> {
        let encoded = command
            .split_once("printf '%s' '")
            .and_then(|(_, rest)| rest.split_once("' |"))
            .map(|(encoded, _)| encoded)
            .unwrap_or_default();
        let decoded = STANDARD
            .decode(encoded)
            .map_err(|e| (1, format!("base64: {e}")))?;
        let text = String::from_utf8(decoded).map_err(|e| (1, e.to_string()))?;

        self.files.insert(unquote(last_word(command)), text);
        Ok(String::new())
    }

    fn compose_up(&mut self, command: &str) -> Result<String, (u32, String)> {
        let directory = command
            .strip_prefix("cd ")
            .and_then(|rest| rest.split(" && ").next())
            .map(unquote)
            .unwrap_or_default();
        let recreate = command.contains("--force-recreate");
        let services: Vec<String> = command
            .split_once("--no-deps")
            .map(|(_, rest)| rest)
            .unwrap_or_default()
            .split_whitespace()
            .filter(|word| *word != "--force-recreate")
            .map(unquote)
            .collect();

        let path = format!("{directory}/compose.yml");
        let text = self
            .files
            .get(&path)
            .ok_or_else(|| (1, format!("no configuration file provided: {path} not found")))?;
        let manifest: Value =
            serde_yaml::from_str(text).map_err(|e| (1, format!("invalid compose file: {e}")))?;

        for service in services {
            let entry = manifest
                .get("services")
                .and_then(|services| services.get(service.as_str()))
                .ok_or_else(|| (1, format!("no such service: {service}")))?;
            let image = entry
                .get("image")
                .and_then(Value::as_str)
                .ok_or_else(|| (1, format!("service {service} has no image")))?;
            if !self.images.contains(image) {
                return Err((1, format!("pull access denied for {image}")));
            }

            let container = entry
                .get("container_name")
                .and_then(Value::as_str)
                .unwrap_or(service.as_str())
                .to_string();
            let running = self
                .containers
                .get(&container)
                .is_some_and(|existing| existing.status() == "running");
            if running && !recreate {
                continue;
            }

            let default_probe = match entry.get("healthcheck") {
                Some(_) => HEALTHY,
                None => RUNNING,
            };
            let probes = self
                .scripts
                .remove(&container)
                .unwrap_or_else(|| VecDeque::from([default_probe.to_string()]));
            self.containers
                .insert(container, FakeContainer::new(image, probes));
        }

        Ok(String::new())
    }
}

#[async_trait]
impl RemoteOps for FakeHost {
    async fn run_command(&self, command: &str) -> Result<String, RemoteError> {
        self.delay(command).await;
        self.execute(command)
    }

    async fn run_interactive(&self, command: &str) -> Result<(), RemoteError> {
        self.delay(command).await;
        self.execute(command).map(|_| ())
    }

    async fn sync_tree(&self, local: &Path, remote: &str) -> Result<(), RemoteError> {
        let command = format!("sync {} -> {}", local.display(), remote);
        let mut state = self.state.lock();
        state.commands.push(command.clone());
        if state.inject_failure(&command) {
            return Err(RemoteError::exit(&command, 1, "injected failure"));
        }
        if !state.workspaces.contains(remote) {
            return Err(RemoteError::exit(&command, 2, "no such directory"));
        }
        Ok(())
    }
}

fn last_word(text: &str) -> &str {
    text.rsplit(' ').next().unwrap_or_default()
}

/// Undo POSIX single-quoting as produced by `shell_escape`.
fn unquote(word: &str) -> String {
    let word = word.trim();
    match word
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
    {
        Some(inner) => inner.replace("'\\''", "'").replace("'\\!'", "!"),
        None => word.to_string(),
    }
}
