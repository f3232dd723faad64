/// In-process PTY implementation
///
/// Simulates a shell without touching the OS: useful for dry runs of the
/// service and for exercising session logic deterministically. It understands
/// a handful of commands:
///
/// * `echo <text>` prints `<text>` and exits 0
/// * `exit <n>` exits with `n`
/// * `cat` echoes every input chunk back until it sees Ctrl-D (`0x04`)
/// * anything else reports `command not found` and exits 127
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pty::pty_trait::{AsyncPty, ExitStatus, PtyConfig, PtyError, PtyFactory};

const END_OF_TRANSMISSION: u8 = 0x04;

pub struct MemoryPty {
    command_line: String,
    interactive: bool,
    output_tx: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    output_rx: AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>,
    received: Mutex<Vec<u8>>,
    exit_tx: watch::Sender<Option<ExitStatus>>,
    cancel: CancellationToken,
    terminated: AtomicBool,
}

impl MemoryPty {
    pub fn new(config: &PtyConfig) -> Self {
        let command_line = config.command_line().trim().to_string();
        info!("Creating new MemoryPty for {:?}", command_line);

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        let (exit_tx, _) = watch::channel(None);
        let pty = Self {
            interactive: command_line == "cat",
            command_line,
            output_tx: Mutex::new(Some(output_tx)),
            output_rx: AsyncMutex::new(output_rx),
            received: Mutex::new(Vec::new()),
            exit_tx,
            cancel: CancellationToken::new(),
            terminated: AtomicBool::new(false),
        };
        pty.run_script();
        pty
    }

    /// Command line this pty was started with
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Every input byte written so far, in arrival order
    pub fn received_input(&self) -> Vec<u8> {
        self.received
            .lock()
            .map(|received| received.clone())
            .unwrap_or_default()
    }

    fn run_script(&self) {
        let mut words = self.command_line.splitn(2, char::is_whitespace);
        let program = words.next().unwrap_or_default();
        let rest = words.next().map(str::trim);

        match program {
            "" => self.finish(0),
            "cat" if rest.is_none() => {}
            "echo" => {
                self.emit(format!("{}\r\n", rest.unwrap_or_default()).into_bytes());
                self.finish(0);
            }
            "exit" => {
                let code = rest.unwrap_or("0").parse().unwrap_or(2);
                self.finish(code);
            }
            other => {
                self.emit(format!("sh: {other}: command not found\r\n").into_bytes());
                self.finish(127);
            }
        }
    }

    fn emit(&self, bytes: Vec<u8>) {
        if let Ok(output_tx) = self.output_tx.lock() {
            if let Some(tx) = output_tx.as_ref() {
                let _ = tx.send(bytes);
            }
        }
    }

    /// Close the output stream and publish the exit status once
    fn finish(&self, code: i32) {
        if let Ok(mut output_tx) = self.output_tx.lock() {
            output_tx.take();
        }
        self.exit_tx.send_if_modified(|status| {
            if status.is_some() {
                return false;
            }
            *status = Some(ExitStatus::from_code(code));
            true
        });
    }

    fn has_exited(&self) -> bool {
        self.exit_tx.borrow().is_some()
    }
}

#[async_trait]
impl AsyncPty for MemoryPty {
    async fn write_input(&self, data: &[u8]) -> Result<(), PtyError> {
        if !self.is_alive() {
            debug!("MemoryPty: discarding {} bytes of input", data.len());
            return Ok(());
        }

        self.received
            .lock()
            .map_err(|e| PtyError::Other(format!("Failed to acquire input lock: {e}")))?
            .extend_from_slice(data);

        if self.interactive {
            self.emit(data.to_vec());
            if data.contains(&END_OF_TRANSMISSION) {
                self.finish(0);
            }
        }
        Ok(())
    }

    async fn read_output_chunk(&self) -> Result<Option<Vec<u8>>, PtyError> {
        if self.cancel.is_cancelled() {
            return Ok(None);
        }
        let mut output_rx = self.output_rx.lock().await;
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Ok(None),
            chunk = output_rx.recv() => Ok(chunk),
        }
    }

    async fn terminate(&self) -> Result<(), PtyError> {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("MemoryPty killed: {:?}", self.command_line);
        self.cancel.cancel();
        if let Ok(mut output_tx) = self.output_tx.lock() {
            output_tx.take();
        }
        self.exit_tx.send_if_modified(|status| {
            if status.is_some() {
                return false;
            }
            *status = Some(ExitStatus::abnormal());
            true
        });
        Ok(())
    }

    async fn wait(&self) -> ExitStatus {
        let mut exit_rx = self.exit_tx.subscribe();
        match exit_rx.wait_for(Option::is_some).await {
            Ok(status) => {
                let status = *status;
                status.unwrap_or_else(ExitStatus::abnormal)
            }
            Err(_) => ExitStatus::abnormal(),
        }
    }

    fn pid(&self) -> Option<u32> {
        None
    }

    fn is_alive(&self) -> bool {
        !self.terminated.load(Ordering::SeqCst) && !self.has_exited()
    }
}

// ================ 工厂实现 ================

/// Factory for [`MemoryPty`]; remembers the ptys it hands out
#[derive(Default)]
pub struct MemoryPtyFactory {
    fail_spawn: bool,
    spawned: Mutex<Vec<Arc<MemoryPty>>>,
}

impl MemoryPtyFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose every spawn fails
    pub fn failing() -> Self {
        Self {
            fail_spawn: true,
            ..Self::default()
        }
    }

    /// Ptys spawned so far (finished ones are pruned on the next spawn)
    pub fn spawned(&self) -> Vec<Arc<MemoryPty>> {
        self.spawned
            .lock()
            .map(|spawned| spawned.clone())
            .unwrap_or_default()
    }

    /// Number of spawned ptys still running
    pub fn live_count(&self) -> usize {
        self.spawned().iter().filter(|pty| pty.is_alive()).count()
    }
}

#[async_trait]
impl PtyFactory for MemoryPtyFactory {
    async fn spawn(&self, config: &PtyConfig) -> Result<Arc<dyn AsyncPty>, PtyError> {
        if self.fail_spawn {
            return Err(PtyError::SpawnFailed(format!(
                "{}: memory backend refused to spawn",
                config.command
            )));
        }

        let pty = Arc::new(MemoryPty::new(config));
        let mut spawned = self
            .spawned
            .lock()
            .map_err(|e| PtyError::Other(format!("Failed to acquire factory lock: {e}")))?;
        spawned.retain(|existing| existing.is_alive());
        spawned.push(pty.clone());
        Ok(pty)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::TerminalSize;

    fn config(command: &str) -> PtyConfig {
        PtyConfig {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), command.to_string()],
            size: TerminalSize::default(),
            env: vec![],
            cwd: None,
        }
    }

    async fn drain(pty: &dyn AsyncPty) -> String {
        let mut out = Vec::new();
        while let Ok(Some(chunk)) = pty.read_output_chunk().await {
            out.extend(chunk);
        }
        String::from_utf8(out).unwrap()
    }

    #[tokio::test]
    async fn echo_prints_and_exits_zero() {
        let pty = MemoryPty::new(&config("echo hello world"));
        assert_eq!(drain(&pty).await, "hello world\r\n");
        assert_eq!(pty.wait().await.code(), 0);
    }

    #[tokio::test]
    async fn exit_reports_its_code() {
        let pty = MemoryPty::new(&config("exit 7"));
        assert_eq!(pty.wait().await.code(), 7);
        assert_eq!(drain(&pty).await, "");
    }

    #[tokio::test]
    async fn unknown_program_is_not_found() {
        let pty = MemoryPty::new(&config("bad-binary-not-found"));
        assert!(drain(&pty).await.contains("command not found"));
        assert_eq!(pty.wait().await.code(), 127);
    }

    #[tokio::test]
    async fn cat_echoes_until_ctrl_d() {
        let pty = MemoryPty::new(&config("cat"));
        assert!(pty.is_alive());
        pty.write_input(b"one").await.unwrap();
        pty.write_input(b"two\x04").await.unwrap();
        assert_eq!(drain(&pty).await, "onetwo\x04");
        assert_eq!(pty.wait().await.code(), 0);
        assert_eq!(pty.received_input(), b"onetwo\x04");

        // Input after exit is silently discarded
        pty.write_input(b"late").await.unwrap();
        assert_eq!(pty.received_input(), b"onetwo\x04");
    }

    #[tokio::test]
    async fn terminate_is_idempotent_and_unblocks_reads() {
        let pty = Arc::new(MemoryPty::new(&config("cat")));
        let reader = {
            let pty = pty.clone();
            tokio::spawn(async move { pty.read_output_chunk().await })
        };
        tokio::task::yield_now().await;

        pty.terminate().await.unwrap();
        pty.terminate().await.unwrap();
        assert!(matches!(reader.await.unwrap(), Ok(None)));
        assert_eq!(pty.wait().await, ExitStatus::abnormal());
        assert!(!pty.is_alive());
    }

    #[tokio::test]
    async fn factory_tracks_live_ptys_and_can_fail() {
        let factory = MemoryPtyFactory::new();
        let pty = factory.spawn(&config("cat")).await.unwrap();
        assert_eq!(factory.live_count(), 1);
        pty.terminate().await.unwrap();
        assert_eq!(factory.live_count(), 0);

        let failing = MemoryPtyFactory::failing();
        assert!(matches!(
            failing.spawn(&config("cat")).await,
            Err(PtyError::SpawnFailed(_))
        ));
    }
}
