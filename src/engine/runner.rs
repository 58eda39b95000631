use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use crate::error::{MediaError, MediaResult};
use crate::task::{KillReason, TaskEvent, TaskHandle, TaskManager, TaskRegistry};
use super::command::FfmpegCommand;
use super::progress::progress_from_line;

// stderr lines kept for the error message
const STDERR_TAIL_LINES: usize = 12;

/// Keeps a run's registry entry alive; removing it when dropped, including
/// when the whole run future is dropped mid flight.
struct Registration<'a> {
    registry: &'a TaskRegistry,
    task_id: &'a str,
    generation: u64,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        if self.registry.deregister(self.task_id, self.generation) {
            debug!("[{}] Deregistered", self.task_id);
        }
    }
}

/// Run one transcoder process for `task_id` to completion.
///
/// The process is registered before anything is awaited on it, so it can be
/// cancelled from the moment it exists. Progress is pushed through `manager`
/// in the order the transcoder reports it.
pub async fn run_ffmpeg(
    manager: &TaskManager,
    ffmpeg: &Path,
    task_id: &str,
    operation: &str,
    expected_duration: f64,
    command: &FfmpegCommand,
) -> MediaResult<()> {
    let args = command.to_args();
    info!("[{}] {} {}", task_id, ffmpeg.display(), args.join(" "));

    let mut child = Command::new(ffmpeg)
        .args(["-progress", "pipe:1", "-nostats"])
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| MediaError::ExternalProcess(format!("Failed to execute ffmpeg: {}", e)))?;

    let (handle, mut control) = TaskHandle::new(operation, child.id());
    let registration = Registration {
        registry: manager.registry(),
        task_id,
        generation: manager.registry().register(task_id, handle),
    };

    let stdout = child.stdout.take();
    let stderr_task = child
        .stderr
        .take()
        .map(|stderr| tokio::spawn(collect_stderr(stderr, task_id.to_string())));

    let mut lines = stdout.map(|stdout| BufReader::new(stdout).lines());
    let mut killed = None;

    let status = loop {
        tokio::select! {
            line = next_line(&mut lines), if lines.is_some() => match line {
                Some(line) => {
                    if let Some(progress) = progress_from_line(&line, expected_duration) {
                        manager.notify(TaskEvent::progress(task_id, progress)).await;
                    }
                }
                None => lines = None,
            },
            status = child.wait(), if lines.is_none() => break status,
            reason = control.kill_requested() => {
                killed = Some(reason);
                if let Err(e) = child.start_kill() {
                    warn!("[{}] Failed to kill ffmpeg: {}", task_id, e);
                }
                break child.wait().await;
            }
        }
    };

    drop(registration);
    // the process is gone, release anyone waiting in cancel()
    drop(control);

    let stderr_tail = match stderr_task {
        Some(task) => task.await.unwrap_or_default(),
        None => String::new(),
    };

    match killed {
        Some(KillReason::Cancel) => {
            info!("[{}] {} cancelled", task_id, operation);
            manager
                .notify(TaskEvent::Cancelled { task_id: task_id.to_string() })
                .await;
            return Err(MediaError::Cancelled(task_id.to_string()));
        }
        // the id now belongs to the newer run, which reports under it
        Some(KillReason::Replaced) => {
            info!("[{}] {} replaced by a newer run", task_id, operation);
            return Err(MediaError::Cancelled(task_id.to_string()));
        }
        None => {}
    }

    let status = status
        .map_err(|e| MediaError::ExternalProcess(format!("Failed to wait for ffmpeg: {}", e)))?;

    if status.success() {
        info!("[{}] {} finished", task_id, operation);
        Ok(())
    } else {
        let code = status
            .code()
            .map(|code| code.to_string())
            .unwrap_or_else(|| "signal".to_string());
        error!("[{}] ffmpeg exited with code {}: {}", task_id, code, stderr_tail);
        Err(MediaError::ExternalProcess(if stderr_tail.is_empty() {
            format!("ffmpeg exited with code {}", code)
        } else {
            format!("ffmpeg exited with code {}: {}", code, stderr_tail)
        }))
    }
}

async fn next_line<R>(lines: &mut Option<tokio::io::Lines<BufReader<R>>>) -> Option<String>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!("Stopped reading ffmpeg progress: {}", e);
                None
            }
        },
        None => None,
    }
}

async fn collect_stderr<R>(stderr: R, task_id: String) -> String
where
    R: AsyncRead + Unpin,
{
    let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
    let mut lines = BufReader::new(stderr).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        debug!(target: "ffmpeg_log", "[{}] {}", task_id, line);
        if tail.len() == STDERR_TAIL_LINES {
            tail.pop_front();
        }
        tail.push_back(line);
    }

    Vec::from(tail).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_missing_binary_is_external_error() {
        let manager = TaskManager::new();
        let command = FfmpegCommand::new("in.wav", "out.wav");
        let result = run_ffmpeg(
            &manager,
            &PathBuf::from("/nonexistent/ffmpeg"),
            "task-missing",
            "audio/convert",
            10.0,
            &command,
        )
        .await;

        assert!(matches!(result, Err(MediaError::ExternalProcess(_))));
        assert!(manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_collect_stderr_keeps_tail() {
        let text: String = (0..30).map(|i| format!("line {}\n\n", i)).collect();
        let tail = collect_stderr(text.as_bytes(), "t".to_string()).await;
        let lines: Vec<&str> = tail.lines().collect();
        assert_eq!(lines.len(), STDERR_TAIL_LINES);
        assert_eq!(lines.last(), Some(&"line 29"));
    }

    #[cfg(unix)]
    mod with_script {
        use super::*;
        use crate::engine::testing::{script, FAILS, HANGS, REPORTS_HALF};
        use std::sync::Arc;
        use std::time::Duration;
        use tempfile::TempDir;

        fn command() -> FfmpegCommand {
            FfmpegCommand::new("in.wav", "out.wav")
        }

        async fn wait_registered(manager: &TaskManager, task_id: &str) {
            tokio::time::timeout(Duration::from_secs(5), async {
                while !manager.registry().contains(task_id) {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            })
            .await
            .expect("task never registered");
        }

        #[tokio::test]
        async fn test_progress_then_success() {
            let dir = TempDir::new().unwrap();
            let ffmpeg = script(dir.path(), "ffmpeg", REPORTS_HALF);
            let manager = TaskManager::new();
            let mut events = manager.subscribe();

            let result = run_ffmpeg(&manager, &ffmpeg, "ok", "audio/reverse", 60.0, &command()).await;

            assert!(result.is_ok());
            assert_eq!(events.try_recv().unwrap(), TaskEvent::progress("ok", 25.0));
            assert_eq!(events.try_recv().unwrap(), TaskEvent::progress("ok", 50.0));
            assert!(events.try_recv().is_err());
            assert!(manager.registry().is_empty());
        }

        #[tokio::test]
        async fn test_nonzero_exit_carries_stderr_tail() {
            let dir = TempDir::new().unwrap();
            let ffmpeg = script(dir.path(), "ffmpeg", FAILS);
            let manager = TaskManager::new();

            let result = run_ffmpeg(&manager, &ffmpeg, "bad", "audio/reverse", 60.0, &command()).await;

            match result {
                Err(MediaError::ExternalProcess(message)) => {
                    assert!(message.starts_with("ffmpeg exited with code 1"), "{}", message);
                    assert!(message.contains("Invalid data found when processing input"), "{}", message);
                }
                other => panic!("expected an external process error, got {:?}", other),
            }
            assert!(manager.registry().is_empty());
        }

        #[tokio::test]
        async fn test_cancel_kills_and_reports() {
            let dir = TempDir::new().unwrap();
            let ffmpeg = script(dir.path(), "ffmpeg", HANGS);
            let manager = Arc::new(TaskManager::new());
            let mut events = manager.subscribe();

            let runner = manager.clone();
            let run = tokio::spawn(async move {
                run_ffmpeg(&runner, &ffmpeg, "stop-me", "audio/reverse", 60.0, &command()).await
            });
            wait_registered(&manager, "stop-me").await;

            assert!(manager.cancel("stop-me").await);
            let result = tokio::time::timeout(Duration::from_secs(5), run).await.unwrap().unwrap();
            assert!(matches!(result, Err(MediaError::Cancelled(id)) if id == "stop-me"));
            assert_eq!(events.recv().await.unwrap(), TaskEvent::Cancelled { task_id: "stop-me".into() });
            assert!(manager.registry().is_empty());
        }

        #[tokio::test]
        async fn test_dropped_run_leaves_no_entry() {
            let dir = TempDir::new().unwrap();
            let ffmpeg = script(dir.path(), "ffmpeg", HANGS);
            let manager = TaskManager::new();

            let cmd = command();
            let run = run_ffmpeg(&manager, &ffmpeg, "dropped", "audio/reverse", 60.0, &cmd);
            let result = tokio::time::timeout(Duration::from_millis(500), run).await;
            assert!(result.is_err());

            assert!(!manager.registry().contains("dropped"));
            assert!(!manager.cancel("dropped").await);
        }

        #[tokio::test]
        async fn test_replaced_run_is_not_reported_cancelled() {
            let dir = TempDir::new().unwrap();
            let ffmpeg = script(dir.path(), "ffmpeg", HANGS);
            let manager = Arc::new(TaskManager::new());
            let mut events = manager.subscribe();

            let (runner, path) = (manager.clone(), ffmpeg.clone());
            let first = tokio::spawn(async move {
                run_ffmpeg(&runner, &path, "dup", "audio/reverse", 60.0, &command()).await
            });
            wait_registered(&manager, "dup").await;

            let (runner, path) = (manager.clone(), ffmpeg.clone());
            let second = tokio::spawn(async move {
                run_ffmpeg(&runner, &path, "dup", "audio/reverse", 60.0, &command()).await
            });

            let first_result = tokio::time::timeout(Duration::from_secs(5), first).await.unwrap().unwrap();
            assert!(matches!(first_result, Err(MediaError::Cancelled(id)) if id == "dup"));
            // the id is still taken by the second run
            assert!(manager.registry().contains("dup"));
            assert!(events.try_recv().is_err());

            assert!(manager.cancel("dup").await);
            let second_result = tokio::time::timeout(Duration::from_secs(5), second).await.unwrap().unwrap();
            assert!(matches!(second_result, Err(MediaError::Cancelled(_))));
            assert_eq!(events.recv().await.unwrap(), TaskEvent::Cancelled { task_id: "dup".into() });
        }
    }
}
