//! Docker engine - talks to the Docker Engine API through bollard

use crate::engine::r#trait::{
    ContainerEngine, ContainerHandle, ContainerSpec, ExecId, ExecOutput, ExecStatus, OutputChunk,
    StatusStream,
};
use crate::env::{to_env_vars, Environment};
use crate::error::EngineError;
use crate::image::DOWNLOAD_CHUNK_SIZE;
use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::image::{CreateImageOptions, ImportImageOptions};
use bollard::models::CreateImageInfo;
use bollard::{Docker, API_DEFAULT_VERSION};
use bytes::Bytes;
use futures::{future, stream, Stream, StreamExt};
use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex};
use taskbox_foundation::TaskboxConfig;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Request timeout for the daemon connection, in seconds
const CONNECT_TIMEOUT_SECS: u64 = 120;

/// Docker engine
pub struct DockerEngine {
    docker: Docker,

    /// Grace period for `stop`, in seconds
    stop_timeout: i64,
}

impl DockerEngine {
    /// Connect using `dockerHost` from config, or the local defaults
    /// (`DOCKER_HOST`, then the platform socket)
    pub fn connect(config: &TaskboxConfig) -> Result<Self, EngineError> {
        let docker = match config.docker_host.as_deref() {
            Some(host) if host.starts_with("unix://") => Docker::connect_with_unix(
                host,
                CONNECT_TIMEOUT_SECS,
                API_DEFAULT_VERSION,
            )?,
            Some(host) if host.starts_with("tcp://") || host.starts_with("http://") => {
                Docker::connect_with_http(host, CONNECT_TIMEOUT_SECS, API_DEFAULT_VERSION)?
            }
            Some(host) => {
                return Err(EngineError::Other(format!(
                    "Unsupported docker host: {}",
                    host
                )))
            }
            None => Docker::connect_with_local_defaults()?,
        };

        Ok(Self::with_client(docker).with_stop_timeout(config.stop_timeout_secs()))
    }

    pub fn with_client(docker: Docker) -> Self {
        Self {
            docker,
            stop_timeout: 10,
        }
    }

    pub fn with_stop_timeout(mut self, secs: i64) -> Self {
        self.stop_timeout = secs;
        self
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<(), EngineError> {
        self.docker.ping().await?;
        Ok(())
    }
}

/// `ubuntu` -> (`ubuntu`, `latest`), `registry:5000/app:1.0` -> (`registry:5000/app`, `1.0`)
///
/// Digests are passed through whole with an empty tag.
pub(crate) fn split_reference(reference: &str) -> (String, String) {
    if reference.contains('@') {
        return (reference.to_string(), String::new());
    }
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(i) => {
            let split = name_start + i;
            (
                reference[..split].to_string(),
                reference[split + 1..].to_string(),
            )
        }
        None => (reference.to_string(), "latest".to_string()),
    }
}

/// Render one pull progress message as a status line
fn status_line(info: &CreateImageInfo) -> String {
    let mut line = String::new();
    if let Some(id) = &info.id {
        line.push_str(id);
        line.push_str(": ");
    }
    line.push_str(info.status.as_deref().unwrap_or_default());
    if let Some(progress) = &info.progress {
        line.push(' ');
        line.push_str(progress);
    }
    line
}

/// Read `file` as a stream of chunks for upload
///
/// The upload stream cannot carry errors, so a read failure ends the stream
/// and is left in `read_error`.
fn archive_chunks(
    file: File,
    read_error: Arc<Mutex<Option<io::Error>>>,
) -> impl Stream<Item = Bytes> + Send + 'static {
    stream::unfold(file, move |mut file| {
        let read_error = read_error.clone();
        async move {
            let mut buf = vec![0u8; DOWNLOAD_CHUNK_SIZE];
            match file.read(&mut buf).await {
                Ok(0) => None,
                Ok(n) => {
                    buf.truncate(n);
                    Some((Bytes::from(buf), file))
                }
                Err(e) => {
                    if let Ok(mut slot) = read_error.lock() {
                        *slot = Some(e);
                    }
                    None
                }
            }
        }
    })
}

fn demux(output: LogOutput) -> Option<OutputChunk> {
    match output {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            Some(OutputChunk::Stdout(message))
        }
        LogOutput::StdErr { message } => Some(OutputChunk::Stderr(message)),
        LogOutput::StdIn { .. } => None,
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn image_exists(&self, reference: &str) -> Result<bool, EngineError> {
        match self.docker.inspect_image(reference).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn pull_image<'a>(&'a self, reference: &'a str) -> StatusStream<'a> {
        let (from_image, tag) = split_reference(reference);
        info!("Pulling image: {}", reference);

        let options = CreateImageOptions {
            from_image,
            tag,
            ..Default::default()
        };

        self.docker
            .create_image(Some(options), None, None)
            .map(|item| match item {
                Ok(info) => match &info.error {
                    Some(message) => Err(EngineError::Pull(message.clone())),
                    None => Ok(status_line(&info)),
                },
                Err(e) => Err(EngineError::from(e)),
            })
            .boxed()
    }

    async fn load_image(&self, archive: &Path) -> Result<(), EngineError> {
        info!("Loading image archive: {}", archive.display());

        let file = File::open(archive).await?;
        let read_error = Arc::new(Mutex::new(None));
        let mut progress = Box::pin(self.docker.import_image_stream(
            ImportImageOptions {
                ..Default::default()
            },
            archive_chunks(file, read_error.clone()),
            None,
        ));

        let mut outcome = Ok(());
        while let Some(item) = progress.next().await {
            let info = match item {
                Ok(info) => info,
                Err(e) => {
                    outcome = Err(EngineError::from(e));
                    break;
                }
            };
            if let Some(message) = info.error {
                outcome = Err(EngineError::InvalidArchive(message));
                break;
            }
            if let Some(line) = info.stream {
                debug!("load: {}", line.trim_end());
            }
        }

        // a failed local read truncates the upload; it is the real cause
        if let Some(e) = read_error.lock().ok().and_then(|mut slot| slot.take()) {
            return Err(e.into());
        }
        outcome
    }

    async fn create_container(&self, spec: &ContainerSpec) -> Result<ContainerHandle, EngineError> {
        let options = CreateContainerOptions {
            name: spec.name.clone(),
            ..Default::default()
        };

        // Keep container running with the idle command; the script runs via exec
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.entrypoint.clone()),
            env: Some(to_env_vars(&spec.env)),
            working_dir: spec.working_dir.clone(),
            ..Default::default()
        };

        let response = self.docker.create_container(Some(options), config).await?;
        for warning in &response.warnings {
            debug!("create warning: {}", warning);
        }

        Ok(ContainerHandle::new(response.id))
    }

    async fn start_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.docker
            .start_container(&container.id, None::<StartContainerOptions<String>>)
            .await?;
        Ok(())
    }

    async fn exec_create(
        &self,
        container: &ContainerHandle,
        command: &[String],
        env: &Environment,
    ) -> Result<ExecId, EngineError> {
        let options = CreateExecOptions {
            cmd: Some(command.to_vec()),
            env: Some(to_env_vars(env)),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        };

        let exec = self.docker.create_exec(&container.id, options).await?;
        Ok(ExecId(exec.id))
    }

    async fn exec_start(&self, exec: &ExecId) -> Result<ExecOutput, EngineError> {
        match self.docker.start_exec(&exec.0, None).await? {
            StartExecResults::Attached { output, .. } => Ok(output
                .filter_map(|item| {
                    future::ready(match item {
                        Ok(output) => demux(output).map(Ok),
                        Err(e) => Some(Err(EngineError::from(e))),
                    })
                })
                .boxed()),
            StartExecResults::Detached => Ok(stream::empty().boxed()),
        }
    }

    async fn exec_inspect(&self, exec: &ExecId) -> Result<ExecStatus, EngineError> {
        let inspect = self.docker.inspect_exec(&exec.0).await?;
        Ok(ExecStatus {
            exit_code: inspect.exit_code.unwrap_or(-1),
            pid: inspect.pid.unwrap_or(0),
        })
    }

    async fn stop_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        self.docker
            .stop_container(
                &container.id,
                Some(StopContainerOptions {
                    t: self.stop_timeout,
                }),
            )
            .await?;
        Ok(())
    }

    async fn remove_container(&self, container: &ContainerHandle) -> Result<(), EngineError> {
        let options = RemoveContainerOptions {
            v: true,
            ..Default::default()
        };

        self.docker
            .remove_container(&container.id, Some(options))
            .await?;
        Ok(())
    }

    async fn close(&self) -> Result<(), EngineError> {
        // bollard pools connections per client; idle ones are released when
        // the client is dropped
        debug!("Docker connection released");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "docker"
    }
}
