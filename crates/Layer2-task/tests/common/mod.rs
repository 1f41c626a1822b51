//! In-memory container engine for runner tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use taskbox_task::{
    ContainerEngine, ContainerHandle, ContainerSpec, EngineError, Environment, ExecId, ExecOutput,
    ExecStatus, OutputChunk, StatusStream,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Every engine call, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    ImageExists(String),
    PullImage(String),
    LoadImage(Vec<u8>),
    CreateContainer(ContainerSpec),
    StartContainer(String),
    ExecCreate {
        container: String,
        command: Vec<String>,
        env: Environment,
    },
    ExecStart(String),
    ExecInspect(String),
    StopContainer(String),
    RemoveContainer(String),
    Close,
}

/// Where the fake engine should fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Lookup,
    Pull,
    Load,
    Create,
    Start,
    ExecStart,
    MidStream,
    Inspect,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerStatus {
    Created,
    Running,
    Stopped,
}

pub const FAKE_PID: i64 = 4242;

pub struct FakeEngine {
    calls: Mutex<Vec<Call>>,
    images: Mutex<HashSet<String>>,
    containers: Mutex<HashMap<String, ContainerStatus>>,
    next_id: AtomicUsize,

    pull_status: Vec<String>,
    archive_image: Option<String>,
    output: Vec<OutputChunk>,
    exit_code: i64,
    fail_at: Option<FailAt>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            images: Mutex::new(HashSet::new()),
            containers: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            pull_status: vec![
                "latest: Pulling from library/ubuntu".to_string(),
                "Status: Downloaded newer image for ubuntu:latest".to_string(),
            ],
            archive_image: None,
            output: Vec::new(),
            exit_code: 0,
            fail_at: None,
        }
    }

    /// Image already in local storage
    pub fn with_image(self, reference: &str) -> Self {
        self.images.lock().unwrap().insert(reference.to_string());
        self
    }

    /// Image that a successful `load_image` provides
    pub fn with_archive_image(mut self, reference: &str) -> Self {
        self.archive_image = Some(reference.to_string());
        self
    }

    pub fn with_stdout(mut self, text: &str) -> Self {
        self.output
            .push(OutputChunk::Stdout(Bytes::copy_from_slice(text.as_bytes())));
        self
    }

    pub fn with_stderr(mut self, text: &str) -> Self {
        self.output
            .push(OutputChunk::Stderr(Bytes::copy_from_slice(text.as_bytes())));
        self
    }

    pub fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub fn failing_at(mut self, point: FailAt) -> Self {
        self.fail_at = Some(point);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    pub fn position(&self, pred: impl Fn(&Call) -> bool) -> Option<usize> {
        self.calls().iter().position(pred)
    }

    pub fn container_status(&self, id: &str) -> Option<ContainerStatus> {
        self.containers.lock().unwrap().get(id).copied()
    }

    pub fn container_count(&self) -> usize {
        self.containers.lock().unwrap().len()
    }

    pub fn created_spec(&self) -> Option<ContainerSpec> {
        self.calls().into_iter().find_map(|c| match c {
            Call::CreateContainer(spec) => Some(spec),
            _ => None,
        })
    }

    pub fn exec_env(&self) -> Option<Environment> {
        self.calls().into_iter().find_map(|c| match c {
            Call::ExecCreate { env, .. } => Some(env),
            _ => None,
        })
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn fails(&self, point: FailAt) -> bool {
        self.fail_at == Some(point)
    }

    fn set_status(&self, id: &str, status: ContainerStatus) -> Result<(), EngineError> {
        let mut containers = self.containers.lock().unwrap();
        match containers.get_mut(id) {
            Some(current) => {
                *current = status;
                Ok(())
            }
            None => Err(EngineError::NotFound(format!("container {}", id))),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        self.record(Call::ImageExists(reference.to_string()));
        if self.fails(FailAt::Lookup) {
            return Err(EngineError::Other("daemon unreachable".to_string()));
        }
        Ok(self.images.lock().unwrap().contains(reference))
    }

    fn pull_image<'a>(&'a self, reference: &'a str) -> StatusStream<'a> {
        self.record(Call::PullImage(reference.to_string()));
        let mut lines: Vec<Result<String, EngineError>> =
            self.pull_status.iter().cloned().map(Ok).collect();
        if self.fails(FailAt::Pull) {
            lines.truncate(1);
            lines.push(Err(EngineError::Pull(format!(
                "manifest for {} not found",
                reference
            ))));
        } else {
            self.images.lock().unwrap().insert(reference.to_string());
        }
        stream::iter(lines).boxed()
    }

    async fn load_image(&self, archive: &Path) -> Result<(), EngineError> {
        let data = tokio::fs::read(archive).await?;
        self.record(Call::LoadImage(data));
        if self.fails(FailAt::Load) {
            return Err(EngineError::InvalidArchive(
                "archive/tar: invalid tar header".to_string(),
            ));
        }
        if let Some(image) = &self.archive_image {
            self.images.lock().unwrap().insert(image.clone());
        }
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        self.record(Call::CreateContainer(spec.clone()));
        if self.fails(FailAt::Create) {
            return Err(EngineError::Other("create refused".to_string()));
        }
        if !self.images.lock().unwrap().contains(&spec.image) {
            return Err(EngineError::NotFound(format!("image {}", spec.image)));
        }
        let id = format!("c{:011}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers
            .lock()
            .unwrap()
            .insert(id.clone(), ContainerStatus::Created);
        Ok(ContainerHandle::new(id))
    }

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Call::StartContainer(container.id.clone()));
        if self.fails(FailAt::Start) {
            return Err(EngineError::Other("OCI runtime create failed".to_string()));
        }
        self.set_status(&container.id, ContainerStatus::Running)
    }

    async fn exec_create(
        &self,
        container: &ContainerHandle,
        command: &[String],
        env: &Environment,
    ) -> Result<ExecId, EngineError> {
        self.record(Call::ExecCreate {
            container: container.id.clone(),
            command: command.to_vec(),
            env: env.clone(),
        });
        Ok(ExecId(format!("exec-{}", container.id)))
    }

    async fn exec_start(&self, exec: &ExecId) -> Result<ExecOutput, EngineError> {
        self.record(Call::ExecStart(exec.0.clone()));
        if self.fails(FailAt::ExecStart) {
            return Err(EngineError::Other("exec start refused".to_string()));
        }

        let container = exec.0.trim_start_matches("exec-");
        if self.container_status(container) != Some(ContainerStatus::Running) {
            return Err(EngineError::Other(format!(
                "container {} is not running",
                container
            )));
        }

        let mut items: Vec<Result<OutputChunk, EngineError>> =
            self.output.iter().cloned().map(Ok).collect();
        if self.fails(FailAt::MidStream) {
            items.push(Err(EngineError::Other("connection reset".to_string())));
        }
        Ok(stream::iter(items).boxed())
    }

    async fn exec_inspect(&self, exec: &ExecId) -> Result<ExecStatus, EngineError> {
        self.record(Call::ExecInspect(exec.0.clone()));
        if self.fails(FailAt::Inspect) {
            return Err(EngineError::NotFound(format!("exec {}", exec)));
        }
        Ok(ExecStatus {
            exit_code: self.exit_code,
            pid: FAKE_PID,
        })
    }

    async fn stop_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Call::StopContainer(container.id.clone()));
        if self.fails(FailAt::Stop) {
            return Err(EngineError::Other("stop timed out".to_string()));
        }
        self.set_status(&container.id, ContainerStatus::Stopped)
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.record(Call::RemoveContainer(container.id.clone()));
        match self.containers.lock().unwrap().remove(&container.id) {
            Some(_) => Ok(()),
            None => Err(EngineError::NotFound(format!("container {}", container.id))),
        }
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.record(Call::Close);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "fake"
    }
}

/// Serve `body` once over plain HTTP, returning the URL
pub async fn serve_once(body: Vec<u8>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = vec![0u8; 4096];
        let _ = socket.read(&mut request).await;

        let header = format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/x-tar\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        socket.write_all(header.as_bytes()).await.unwrap();
        socket.write_all(&body).await.unwrap();
        let _ = socket.shutdown().await;
    });

    format!("http://{}/image.tar", addr)
}
