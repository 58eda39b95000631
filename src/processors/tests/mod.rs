use super::*;

#[test]
fn test_job_target_wire_names() {
    let target: JobTarget = serde_json::from_value(serde_json::json!({
        "taskId": "t-1",
        "inputPath": "/in.mp4",
        "outputPath": "/out.mp4",
        "duration": 12.5
    }))
    .unwrap();
    assert_eq!(target.task_id, "t-1");
    assert_eq!(target.duration, 12.5);
    assert!(target.validate().is_ok());
}

#[test]
fn test_job_target_validation() {
    let target = JobTarget {
        task_id: " ".to_string(),
        input_path: PathBuf::from("/in"),
        output_path: PathBuf::from("/out"),
        duration: 0.0,
    };
    assert!(matches!(target.validate(), Err(MediaError::InvalidArgument(_))));
}

#[test]
fn test_require_range() {
    assert_eq!(require_range("gain", 3.0, -30.0, 30.0).unwrap(), 3.0);
    assert!(require_range("gain", 31.0, -30.0, 30.0).is_err());
    assert!(require_range("gain", f64::NAN, -30.0, 30.0).is_err());
}

#[tokio::test]
async fn test_every_handler_is_routed() {
    let ctx = AppContext::new(Default::default());
    for handler in HANDLERS {
        // an empty body fails deserialization, never the lookup
        let result = dispatch(&ctx, handler, serde_json::json!({})).await;
        assert!(
            matches!(result, Err(MediaError::InvalidArgument(_))),
            "{} gave {:?}",
            handler,
            result
        );
    }
}

#[tokio::test]
async fn test_unknown_handler() {
    let ctx = AppContext::new(Default::default());
    let result = dispatch(&ctx, "audio/karaoke", serde_json::json!({})).await;
    assert!(matches!(result, Err(MediaError::UnknownHandler(name)) if name == "audio/karaoke"));
}

#[tokio::test]
async fn test_ensure_input_missing() {
    let result = ensure_input(Path::new("/definitely/not/here.wav")).await;
    assert!(matches!(result, Err(MediaError::Io(_))));
}

// 以下测试需要 PATH 中有 ffmpeg/ffprobe
mod with_ffmpeg {
    use super::*;
    use crate::task::TaskEvent;
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::process::Command;

    async fn generate(args: &[&str], output: &Path) {
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-y", "-loglevel", "error"])
            .args(args)
            .arg(output)
            .status()
            .await
            .expect("ffmpeg on PATH");
        assert!(status.success());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg on PATH"]
    async fn test_trim_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.wav");
        let output = dir.path().join("trimmed.wav");
        generate(&["-f", "lavfi", "-i", "sine=frequency=440:duration=30"], &source).await;

        let ctx = AppContext::new(Default::default());
        let mut events = ctx.task_manager.subscribe();

        let message = dispatch(
            &ctx,
            "audio/trim",
            serde_json::json!({
                "taskId": "trim-e2e",
                "inputPath": source,
                "outputPath": output,
                "startTime": "00:00:05",
                "endTime": 10
            }),
        )
        .await
        .unwrap();
        assert_eq!(message, "Audio trimmed successfully");

        let duration = probe_duration(&ctx.tools.ffprobe, &output).await.unwrap().unwrap();
        assert!((duration - 10.0).abs() < 0.1, "duration {}", duration);

        let mut last = None;
        while let Ok(event) = events.try_recv() {
            if let TaskEvent::Progress(progress) = &event {
                assert!((0.0..=100.0).contains(&progress.progress));
            }
            last = Some(event);
        }
        assert!(matches!(last, Some(TaskEvent::Completed { .. })));
        assert!(ctx.task_manager.registry().is_empty());
    }

    #[tokio::test]
    #[ignore = "requires ffmpeg on PATH"]
    async fn test_cancel_end_to_end() {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        let output = dir.path().join("stable.mp4");
        generate(
            &["-f", "lavfi", "-i", "testsrc=size=1280x720:rate=30:duration=60", "-c:v", "libx264", "-preset", "ultrafast"],
            &source,
        )
        .await;

        let ctx = std::sync::Arc::new(AppContext::new(Default::default()));
        let worker = {
            let ctx = ctx.clone();
            let body = serde_json::json!({
                "taskId": "cancel-e2e",
                "inputPath": source,
                "outputPath": output,
                "shakiness": 10
            });
            tokio::spawn(async move { dispatch(&ctx, "video/stabilize", body).await })
        };

        while !ctx.task_manager.registry().contains("cancel-e2e") {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(ctx.task_manager.cancel("cancel-e2e").await);
        assert!(ctx.task_manager.registry().is_empty());

        let result = worker.await.unwrap();
        assert!(matches!(result, Err(MediaError::Cancelled(id)) if id == "cancel-e2e"));
    }
}

#[cfg(unix)]
mod with_script {
    use super::*;
    use crate::engine::testing::{fake_tools, FAILS, HANGS, REPORTS_HALF};
    use crate::task::TaskEvent;
    use crate::utils::http::Envelope;
    use std::time::Duration;
    use tempfile::TempDir;

    fn reverse_body(dir: &TempDir, task_id: &str) -> Value {
        let input = dir.path().join("in.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        serde_json::json!({
            "taskId": task_id,
            "inputPath": input,
            "outputPath": dir.path().join("out.wav"),
        })
    }

    #[tokio::test]
    async fn test_reverse_completes_with_envelope() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(fake_tools(dir.path(), REPORTS_HALF));
        let mut events = ctx.task_manager.subscribe();

        let result = dispatch(&ctx, "audio/reverse", reverse_body(&dir, "rev")).await;
        let envelope = Envelope::from(result);
        assert!(envelope.success);
        assert_eq!(envelope.message, "Audio reversed successfully");

        // probed duration is 60s
        assert_eq!(events.try_recv().unwrap(), TaskEvent::progress("rev", 25.0));
        assert_eq!(events.try_recv().unwrap(), TaskEvent::progress("rev", 50.0));
        assert_eq!(
            events.try_recv().unwrap(),
            TaskEvent::Completed {
                task_id: "rev".into(),
                message: "Audio reversed successfully".into()
            }
        );
        assert!(ctx.task_manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_reverse_failure_reports_stderr() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(fake_tools(dir.path(), FAILS));
        let mut events = ctx.task_manager.subscribe();

        let result = dispatch(&ctx, "audio/reverse", reverse_body(&dir, "rev-bad")).await;
        let envelope = Envelope::from(result);
        assert!(!envelope.success);
        assert_eq!(
            envelope.message,
            "Processing failed: ffmpeg exited with code 1: in.wav: Invalid data found when processing input"
        );

        match events.try_recv().unwrap() {
            TaskEvent::Failed { task_id, error } => {
                assert_eq!(task_id, "rev-bad");
                assert!(error.contains("Invalid data found"), "{}", error);
            }
            other => panic!("expected a failure event, got {:?}", other),
        }
        assert!(ctx.task_manager.registry().is_empty());
    }

    #[tokio::test]
    async fn test_abandoned_dispatch_deregisters() {
        let dir = TempDir::new().unwrap();
        let ctx = AppContext::new(fake_tools(dir.path(), HANGS));

        let run = dispatch(&ctx, "audio/reverse", reverse_body(&dir, "abandoned"));
        assert!(tokio::time::timeout(Duration::from_millis(500), run).await.is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!ctx.task_manager.registry().contains("abandoned"));
        assert_eq!(ctx.task_manager.running_tasks().len(), 0);
    }
}
