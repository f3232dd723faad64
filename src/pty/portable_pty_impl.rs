use crate::pty::pty_trait::{
    AsyncPty, ExitStatus, PtyConfig, PtyError, PtyFactory, READ_CHUNK_SIZE,
};
use async_trait::async_trait;
use portable_pty::{Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio::task::spawn_blocking;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

/// Chunks buffered between the blocking reader thread and the relay
const OUTPUT_CHANNEL_CAPACITY: usize = 64;

type OutputChunk = std::io::Result<Vec<u8>>;

/// 基于 portable-pty 库的异步 PTY 实现
///
/// The blocking halves of the pty (read, write, wait) each run on a dedicated
/// OS thread and talk to async code through tokio channels. Plain threads are
/// used instead of `spawn_blocking` so a reader stuck on a descriptor held
/// open by a grandchild can never hold up runtime shutdown.
pub struct PortablePty {
    pid: Option<u32>,
    master: Mutex<Option<Box<dyn MasterPty + Send>>>,
    input_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    output_rx: AsyncMutex<mpsc::Receiver<OutputChunk>>,
    killer: Mutex<Option<Box<dyn ChildKiller + Send + Sync>>>,
    exit_rx: watch::Receiver<Option<ExitStatus>>,
    cancel: CancellationToken,
    terminated: AtomicBool,
}

impl PortablePty {
    pub fn new(config: &PtyConfig) -> Result<Self, PtyError> {
        info!(
            "PortablePty: Creating PTY with command: {:?}, args: {:?}",
            config.command, config.args
        );

        let pty_system = portable_pty::native_pty_system();
        let pair = pty_system
            .openpty(PtySize {
                rows: config.size.rows,
                cols: config.size.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| PtyError::SpawnFailed(format!("failed to open pty: {e}")))?;

        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        for (key, value) in &config.env {
            cmd.env(key, value);
        }
        if let Some(cwd) = &config.cwd {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| PtyError::SpawnFailed(format!("{}: {e}", config.command)))?;
        // 关闭 slave 端，否则子进程退出后 reader 永远读不到 EOF
        drop(pair.slave);

        let pid = child.process_id();
        let mut killer = child.clone_killer();

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        let (exit_tx, exit_rx) = watch::channel(None);

        if let Err(e) = start_io_threads(reader, writer, child, input_rx, output_tx, exit_tx) {
            error!("PortablePty: failed to start I/O threads: {}", e);
            let _ = killer.kill();
            return Err(PtyError::SpawnFailed(format!("failed to start pty threads: {e}")));
        }

        info!("PortablePty: spawned {:?} with pid {:?}", config.command_line(), pid);

        Ok(Self {
            pid,
            master: Mutex::new(Some(pair.master)),
            input_tx: Mutex::new(Some(input_tx)),
            output_rx: AsyncMutex::new(output_rx),
            killer: Mutex::new(Some(killer)),
            exit_rx,
            cancel: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        })
    }

    fn has_exited(&self) -> bool {
        self.exit_rx.borrow().is_some()
    }

    /// Synchronous teardown shared by `terminate` and `Drop`
    fn shutdown(&self) {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();

        // 停止写入：writer 线程在通道关闭后退出
        if let Ok(mut input_tx) = self.input_tx.lock() {
            input_tx.take();
        }

        if !self.has_exited() {
            if let Ok(mut killer) = self.killer.lock() {
                if let Some(mut killer) = killer.take() {
                    if let Err(e) = killer.kill() {
                        debug!("PortablePty: kill returned error: {}", e);
                    }
                }
            }
        }

        // 即使 shell 已退出，后台成员仍可能占用 slave
        #[cfg(unix)]
        {
            if let Some(pid) = self.pid {
                kill_process_group(pid);
            }
        }

        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
        debug!("PortablePty: pid {:?} terminated", self.pid);
    }
}

fn start_io_threads(
    reader: Box<dyn Read + Send>,
    writer: Box<dyn Write + Send>,
    child: Box<dyn Child + Send + Sync>,
    input_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    output_tx: mpsc::Sender<OutputChunk>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
) -> std::io::Result<()> {
    thread::Builder::new()
        .name("pty-reader".to_string())
        .spawn(move || read_loop(reader, output_tx))?;
    thread::Builder::new()
        .name("pty-writer".to_string())
        .spawn(move || write_loop(writer, input_rx))?;
    thread::Builder::new()
        .name("pty-waiter".to_string())
        .spawn(move || wait_loop(child, exit_tx))?;
    Ok(())
}

fn read_loop(mut reader: Box<dyn Read + Send>, output_tx: mpsc::Sender<OutputChunk>) {
    let mut buffer = [0u8; READ_CHUNK_SIZE];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => {
                debug!("PTY EOF reached, stopping background reader");
                break;
            }
            Ok(n) => {
                trace!("PTY background reader: read {} bytes", n);
                if output_tx.blocking_send(Ok(buffer[..n].to_vec())).is_err() {
                    debug!("PTY background reader: receiver dropped, stopping");
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if is_hangup(&e) => {
                debug!("PTY slave side closed, stopping background reader");
                break;
            }
            Err(e) => {
                error!("Error reading from PTY: {}", e);
                let _ = output_tx.blocking_send(Err(e));
                break;
            }
        }
    }
}

fn write_loop(mut writer: Box<dyn Write + Send>, mut input_rx: mpsc::UnboundedReceiver<Vec<u8>>) {
    while let Some(bytes) = input_rx.blocking_recv() {
        trace!("PTY writer: writing {} bytes", bytes.len());
        if let Err(e) = writer.write_all(&bytes).and_then(|_| writer.flush()) {
            warn!("PTY writer: error writing to PTY: {}", e);
            break;
        }
    }
    debug!("PTY writer stopped");
}

fn wait_loop(mut child: Box<dyn Child + Send + Sync>, exit_tx: watch::Sender<Option<ExitStatus>>) {
    let status = match child.wait() {
        // portable-pty 对被信号终止的进程报告 exit code 1
        Ok(status) => i32::try_from(status.exit_code())
            .map(ExitStatus::from_code)
            .unwrap_or_else(|_| ExitStatus::abnormal()),
        Err(e) => {
            warn!("PTY waiter: wait failed: {}", e);
            ExitStatus::abnormal()
        }
    };
    debug!("PTY waiter: child exited with {:?}", status);
    exit_tx.send_replace(Some(status));
}

/// On Linux a read from the master returns EIO once every slave fd is closed
fn is_hangup(error: &std::io::Error) -> bool {
    #[cfg(unix)]
    {
        error.raw_os_error() == Some(libc::EIO)
    }
    #[cfg(not(unix))]
    {
        let _ = error;
        false
    }
}

/// The child is a session leader, so its pid is also its process group id.
#[cfg(unix)]
fn kill_process_group(pid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };
    // SAFETY: killpg only sends a signal; an already-gone group yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        trace!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[async_trait]
impl AsyncPty for PortablePty {
    async fn write_input(&self, data: &[u8]) -> Result<(), PtyError> {
        let input_tx = self
            .input_tx
            .lock()
            .map_err(|e| PtyError::Other(format!("Failed to acquire input lock: {e}")))?
            .clone();

        match input_tx {
            Some(tx) => tx.send(data.to_vec()).map_err(|_| {
                PtyError::Io(std::io::Error::new(
                    ErrorKind::BrokenPipe,
                    "pty writer has stopped",
                ))
            }),
            None => {
                trace!("PortablePty: discarding {} bytes of input after termination", data.len());
                Ok(())
            }
        }
    }

    async fn read_output_chunk(&self) -> Result<Option<Vec<u8>>, PtyError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let mut output_rx = self.output_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            chunk = output_rx.recv() => match chunk {
                Some(Ok(bytes)) => Ok(Some(bytes)),
                Some(Err(e)) => Err(PtyError::Io(e)),
                None => Ok(None),
            },
        }
    }

    async fn terminate(&self) -> Result<(), PtyError> {
        self.shutdown();
        Ok(())
    }

    async fn wait(&self) -> ExitStatus {
        let mut exit_rx = self.exit_rx.clone();
        match exit_rx.wait_for(Option::is_some).await {
            Ok(status) => {
                let status = *status;
                status.unwrap_or_else(ExitStatus::abnormal)
            }
            Err(_) => ExitStatus::abnormal(),
        }
    }

    fn pid(&self) -> Option<u32> {
        self.pid
    }

    fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.has_exited()
    }
}

impl Drop for PortablePty {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ================ 工厂实现 ================

/// 基于 portable-pty 的 PTY 工厂
#[derive(Debug, Default)]
pub struct PortablePtyFactory;

#[async_trait]
impl PtyFactory for PortablePtyFactory {
    async fn spawn(&self, config: &PtyConfig) -> Result<Arc<dyn AsyncPty>, PtyError> {
        // openpty 与 fork 都是阻塞操作
        let config = config.clone();
        let pty = spawn_blocking(move || PortablePty::new(&config))
            .await
            .map_err(|e| PtyError::Other(format!("Failed to create PTY: {e:?}")))??;
        Ok(Arc::new(pty))
    }

    fn name(&self) -> &'static str {
        "portable-pty"
    }
}
