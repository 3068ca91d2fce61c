use std::sync::Arc;
use std::time::Duration;

use boxlease::{
    BoxCommand, BoxOptions, BoxStatus, BoxleaseError, BoxleaseRuntime, StaticImageSource,
};
use futures::StreamExt;

mod common;

use common::TestEnv;

// ============================================================================
// Execution
// ============================================================================

#[tokio::test]
async fn test_exec_exit_code() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();
    assert_eq!(sandbox.info().status, BoxStatus::Running);

    let execution = sandbox
        .exec(BoxCommand::new("sh").args(["-c", "exit 42"]))
        .await
        .unwrap();
    assert_eq!(execution.wait().await.unwrap().exit_code, 42);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exec_streams_are_independent() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    let execution = sandbox
        .exec(BoxCommand::new("sh").args([
            "-c",
            "for i in 1 2 3; do echo out$i; echo err$i >&2; done",
        ]))
        .await
        .unwrap();

    // Drain stderr first; stdout must not be lost meanwhile.
    let stderr: Vec<String> = execution.stderr().unwrap().collect().await;
    let stdout: Vec<String> = execution.stdout().unwrap().collect().await;
    assert_eq!(stderr, vec!["err1\n", "err2\n", "err3\n"]);
    assert_eq!(stdout, vec!["out1\n", "out2\n", "out3\n"]);
    assert!(execution.stdout().is_none());
    assert!(execution.wait().await.unwrap().success());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_run_collects_output_and_check() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    let output = sandbox
        .run(BoxCommand::new("sh").args(["-c", "echo 1920; echo warn >&2"]))
        .await
        .unwrap();
    assert_eq!(output.parse::<u32>().unwrap(), 1920);
    assert_eq!(output.stderr, "warn\n");

    let failed = sandbox
        .run(BoxCommand::new("sh").args(["-c", "echo missing >&2; exit 3"]))
        .await
        .unwrap();
    match failed.check("health check").unwrap_err() {
        BoxleaseError::Execution {
            exit_code, stderr, ..
        } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr, "missing\n");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exec_environment_and_working_dir() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let options = BoxOptions {
        env: vec![("FROM_BOX".into(), "box".into())],
        working_dir: Some("/srv".into()),
        ..env.box_options()
    };
    let sandbox = runtime.create(options, None).await.unwrap();

    let output = sandbox
        .run(
            BoxCommand::new("sh")
                .args(["-c", "echo $FROM_BOX $FROM_CMD $BOXLEASE_BOX_ID; pwd -P"])
                .env("FROM_CMD", "cmd"),
        )
        .await
        .unwrap();

    let rootfs = std::fs::canonicalize(env.rootfs.path()).unwrap();
    let expected = format!(
        "box cmd {}\n{}\n",
        sandbox.id(),
        rootfs.join("srv").display()
    );
    assert_eq!(output.stdout, expected);

    let output = sandbox
        .run(BoxCommand::new("pwd").arg("-P").working_dir("/work/a"))
        .await
        .unwrap();
    assert_eq!(
        output.stdout,
        format!("{}\n", rootfs.join("work/a").display())
    );

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exec_timeout_and_kill() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    let timed = sandbox
        .exec(BoxCommand::new("sleep").arg("30").timeout(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(timed.wait().await.unwrap().exit_code, -libc::SIGKILL);

    let killed = sandbox.exec(BoxCommand::new("sleep").arg("30")).await.unwrap();
    killed.kill().await.unwrap();
    assert_eq!(killed.wait().await.unwrap().exit_code, -libc::SIGKILL);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_interactive_exec_reads_stdin() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    let execution = sandbox
        .exec(BoxCommand::new("sh").args(["-c", "tr a-z A-Z"]).interactive(true))
        .await
        .unwrap();
    let mut stdin = execution.stdin().unwrap();
    stdin.write_all(b"hello\n").await.unwrap();
    stdin.write_all(b"box\n").await.unwrap();
    drop(stdin);

    let output = execution.output().await.unwrap();
    assert_eq!(output.stdout, "HELLO\nBOX\n");
    assert!(output.success());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_wait_survives_abandoned_deadline() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    let execution = sandbox
        .exec(BoxCommand::new("sh").args(["-c", "sleep 1; exit 4"]))
        .await
        .unwrap();
    let early = tokio::time::timeout(Duration::from_millis(100), execution.wait()).await;
    assert!(early.is_err());
    assert_eq!(execution.wait().await.unwrap().exit_code, 4);

    runtime.shutdown().await.unwrap();
}

// ============================================================================
// Lookup and Identity
// ============================================================================

#[tokio::test]
async fn test_name_and_id_resolve_to_same_box() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.box_options(), Some("n1".into()))
        .await
        .unwrap();

    let by_name = runtime.get("n1").unwrap().unwrap();
    let by_id = runtime.get(sandbox.id()).unwrap().unwrap();
    assert_eq!(by_name.id(), by_id.id());
    assert_eq!(by_name.name(), Some("n1"));
    assert_eq!(runtime.get_info("n1").unwrap().unwrap().id, *sandbox.id());
    assert!(runtime.get("n2").unwrap().is_none());

    let err = runtime
        .create(env.box_options(), Some("n1".into()))
        .await
        .unwrap_err();
    assert!(matches!(err, BoxleaseError::NameConflict(name) if name == "n1"));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_ids_increase() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let first = runtime.create(env.box_options(), None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = runtime.create(env.box_options(), None).await.unwrap();

    assert_ne!(first.id(), second.id());
    assert!(first.id() < second.id());

    let listed: Vec<String> = runtime
        .list_info()
        .unwrap()
        .into_iter()
        .map(|info| info.id)
        .collect();
    assert_eq!(listed, vec![second.id().clone(), first.id().clone()]);

    runtime.shutdown().await.unwrap();
}

// ============================================================================
// Stop, Restart, Remove
// ============================================================================

#[tokio::test]
async fn test_stop_keeps_record_without_auto_remove() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();
    let pid = sandbox.info().pid.unwrap();

    sandbox.stop().await.unwrap();
    sandbox.stop().await.unwrap();

    let info = runtime.get_info(sandbox.id()).unwrap().unwrap();
    assert_eq!(info.status, BoxStatus::Stopped);
    assert_eq!(info.pid, None);
    assert!(unsafe { libc::kill(pid as i32, 0) } != 0);
    assert_eq!(runtime.metrics().boxes_stopped_total(), 1);

    // Restart on demand.
    let output = sandbox
        .run(BoxCommand::new("sh").args(["-c", "exit 7"]))
        .await
        .unwrap();
    assert_eq!(output.exit_code, 7);
    let info = runtime.get_info(sandbox.id()).unwrap().unwrap();
    assert_eq!(info.status, BoxStatus::Running);
    assert_ne!(info.pid, Some(pid));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_with_auto_remove_deletes_record() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();
    let box_dir = env.home.path().join("boxes").join(sandbox.id());
    assert!(box_dir.exists());

    sandbox.stop().await.unwrap();

    assert!(runtime.get_info(sandbox.id()).unwrap().is_none());
    assert!(!box_dir.exists());
    // User-provided rootfs is left alone.
    assert!(env.rootfs.path().exists());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_stop_kills_running_commands() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();

    let execution = sandbox
        .exec(BoxCommand::new("sh").args(["-c", "sleep 30 & sleep 30; wait"]))
        .await
        .unwrap();
    sandbox.stop().await.unwrap();

    assert_eq!(sandbox.info().status, BoxStatus::Stopped);
    assert!(execution.is_finished());
    let result = tokio::time::timeout(Duration::from_secs(1), execution.wait())
        .await
        .expect("command outlived its box")
        .unwrap();
    assert_eq!(result.exit_code, -libc::SIGKILL);

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_shutdown_kills_commands_in_detached_box() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.detached_box_options(), None)
        .await
        .unwrap();
    let id = sandbox.id().clone();

    let execution = sandbox.exec(BoxCommand::new("sleep").arg("30")).await.unwrap();
    runtime.shutdown().await.unwrap();
    let result = tokio::time::timeout(Duration::from_secs(1), execution.wait())
        .await
        .expect("command outlived its runtime")
        .unwrap();
    assert_eq!(result.exit_code, -libc::SIGKILL);

    // The supervisor itself stays up for the next lease holder.
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    assert_eq!(
        runtime.get_info(&id).unwrap().unwrap().status,
        BoxStatus::Running
    );
    runtime.remove(&id, true).await.unwrap();
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_removed_handle_reports_not_found() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();
    sandbox.stop().await.unwrap();

    for _ in 0..2 {
        assert!(matches!(
            sandbox.run(BoxCommand::new("true")).await,
            Err(BoxleaseError::NotFound(_))
        ));
    }
    assert!(matches!(sandbox.start().await, Err(BoxleaseError::NotFound(_))));
    assert!(matches!(sandbox.stop().await, Err(BoxleaseError::NotFound(_))));
    assert_eq!(sandbox.info().status, BoxStatus::Stopped);
    assert!(runtime.get_info(sandbox.id()).unwrap().is_none());

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_remove_requires_stopped_or_force() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), Some("keep".into()))
        .await
        .unwrap();

    let err = runtime.remove("keep", false).await.unwrap_err();
    assert!(matches!(err, BoxleaseError::InvalidState(_)));
    assert!(runtime.get_info("keep").unwrap().is_some());

    runtime.remove("keep", true).await.unwrap();
    assert!(runtime.get_info(sandbox.id()).unwrap().is_none());

    assert!(matches!(
        runtime.remove("keep", false).await,
        Err(BoxleaseError::NotFound(_))
    ));

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_concurrent_exec_on_stopped_box_restarts_once() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();
    sandbox.stop().await.unwrap();

    let a = sandbox.clone();
    let b = runtime.get(sandbox.id()).unwrap().unwrap();
    let (ra, rb) = tokio::join!(
        a.run(BoxCommand::new("true")),
        b.run(BoxCommand::new("true"))
    );
    assert!(ra.unwrap().success());
    assert!(rb.unwrap().success());

    assert_eq!(sandbox.info().status, BoxStatus::Running);
    assert_eq!(sandbox.info().pid, b.info().pid);

    runtime.shutdown().await.unwrap();
}

// ============================================================================
// Failure
// ============================================================================

#[tokio::test]
async fn test_dead_supervisor_makes_box_not_runnable() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();
    let pid = sandbox.info().pid.unwrap();

    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    let err = sandbox.exec(BoxCommand::new("true")).await.unwrap_err();
    assert!(matches!(err, BoxleaseError::NotRunnable(_)));
    assert_eq!(sandbox.info().status, BoxStatus::Failed);
    assert!(matches!(
        sandbox.exec(BoxCommand::new("true")).await,
        Err(BoxleaseError::NotRunnable(_))
    ));
    assert_eq!(runtime.metrics().boxes_failed_total(), 1);

    runtime.remove(sandbox.id(), false).await.unwrap();
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_supervisor_spawn_failure_marks_failed() {
    let env = TestEnv::new();
    let mut options = env.options();
    options.shim = Some(boxlease::ShimCommand::new("/bin/false"));
    let runtime = BoxleaseRuntime::new(options).unwrap();

    let err = runtime.create(env.box_options(), Some("broken".into())).await.unwrap_err();
    assert!(matches!(err, BoxleaseError::Engine(_)));

    let info = runtime.get_info("broken").unwrap().unwrap();
    assert_eq!(info.status, BoxStatus::Failed);
    let metrics = runtime.metrics();
    assert_eq!(metrics.boxes_created_total(), 1);
    assert_eq!(metrics.boxes_failed_total(), 1);
    assert_eq!(metrics.num_running_boxes(), 0);

    runtime.shutdown().await.unwrap();
}

// ============================================================================
// Creation Validation
// ============================================================================

#[tokio::test]
async fn test_create_validation_errors() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();

    let detached_auto_remove = BoxOptions {
        detach: true,
        auto_remove: true,
        ..env.box_options()
    };
    assert!(matches!(
        runtime.create(detached_auto_remove, None).await,
        Err(BoxleaseError::Config(_))
    ));

    let no_cpus = BoxOptions {
        cpus: Some(0),
        ..env.box_options()
    };
    assert!(matches!(
        runtime.create(no_cpus, None).await,
        Err(BoxleaseError::ResourceLimit(_))
    ));

    let missing_rootfs = BoxOptions::rootfs(env.home.path().join("nope"));
    assert!(matches!(
        runtime.create(missing_rootfs, None).await,
        Err(BoxleaseError::Config(_))
    ));

    assert!(runtime.list_info().unwrap().is_empty());
    assert_eq!(runtime.metrics().boxes_created_total(), 0);
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_image_resolution_through_registries() {
    let env = TestEnv::new();
    let mut options = env.options();
    options.image_registries = vec!["ghcr.io".into(), "docker.io".into()];
    let source = StaticImageSource::new(["docker.io/library/alpine:latest"]);
    let runtime = BoxleaseRuntime::with_image_source(options, Arc::new(source)).unwrap();

    let sandbox = runtime
        .create(
            BoxOptions {
                memory_mib: Some(256),
                ..BoxOptions::image("alpine")
            },
            None,
        )
        .await
        .unwrap();
    assert_eq!(sandbox.info().image, "docker.io/library/alpine:latest");
    assert!(sandbox.run(BoxCommand::new("true")).await.unwrap().success());

    let err = runtime
        .create(
            BoxOptions {
                memory_mib: Some(256),
                ..BoxOptions::image("missing:1.0")
            },
            None,
        )
        .await
        .unwrap_err();
    match err {
        BoxleaseError::ImageResolution {
            reference,
            attempts,
        } => {
            assert_eq!(reference, "missing:1.0");
            assert_eq!(
                attempts,
                vec![
                    "ghcr.io/library/missing:1.0".to_string(),
                    "docker.io/library/missing:1.0".to_string(),
                ]
            );
        }
        other => panic!("unexpected error: {other:?}"),
    }

    runtime.shutdown().await.unwrap();
}

// ============================================================================
// Readiness and Metrics
// ============================================================================

#[tokio::test]
async fn test_wait_until_ready() {
    let env = TestEnv::new();
    std::fs::write(env.rootfs.path().join("ready"), "").unwrap();
    std::fs::write(env.rootfs.path().join("app.log"), "booting\nbind failed\n").unwrap();

    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    sandbox
        .wait_until_ready(
            BoxCommand::new("test").args(["-f", "ready"]),
            Duration::from_secs(5),
            Duration::from_millis(50),
            None,
        )
        .await
        .unwrap();

    let err = sandbox
        .wait_until_ready(
            BoxCommand::new("test").args(["-f", "never"]),
            Duration::from_millis(300),
            Duration::from_millis(50),
            Some("/app.log"),
        )
        .await
        .unwrap_err();
    match err {
        BoxleaseError::Timeout { context, .. } => assert!(context.contains("bind failed")),
        other => panic!("unexpected error: {other:?}"),
    }

    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_running_gauge_follows_restart_and_reattach() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();
    let metrics = runtime.metrics();
    assert_eq!(metrics.num_running_boxes(), 1);

    sandbox.stop().await.unwrap();
    assert_eq!(metrics.num_running_boxes(), 0);

    assert!(sandbox.run(BoxCommand::new("true")).await.unwrap().success());
    assert_eq!(sandbox.info().status, BoxStatus::Running);
    assert_eq!(metrics.num_running_boxes(), 1);
    assert_eq!(metrics.boxes_created_total(), 1);
    runtime.remove(sandbox.id(), true).await.unwrap();
    assert_eq!(metrics.num_running_boxes(), 0);
    runtime.shutdown().await.unwrap();

    // A box left running by another lease holder counts once attached.
    let first = BoxleaseRuntime::new(env.options()).unwrap();
    let id = first
        .create(env.detached_box_options(), None)
        .await
        .unwrap()
        .id()
        .clone();
    first.shutdown().await.unwrap();

    let second = BoxleaseRuntime::new(env.options()).unwrap();
    let metrics = second.metrics();
    assert_eq!(metrics.num_running_boxes(), 0);
    let reattached = second.get(&id).unwrap().unwrap();
    assert!(reattached.run(BoxCommand::new("true")).await.unwrap().success());
    assert_eq!(metrics.num_running_boxes(), 1);
    reattached.stop().await.unwrap();
    assert_eq!(metrics.num_running_boxes(), 0);
    assert_eq!(metrics.boxes_stopped_total(), 1);

    second.remove(&id, false).await.unwrap();
    second.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exec_on_failed_box_counts_as_error() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime
        .create(env.persistent_box_options(), None)
        .await
        .unwrap();
    let pid = sandbox.info().pid.unwrap();
    unsafe {
        libc::kill(pid as i32, libc::SIGKILL);
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(sandbox.exec(BoxCommand::new("true")).await.is_err());
    assert!(sandbox.exec(BoxCommand::new("true")).await.is_err());

    let metrics = runtime.metrics();
    assert_eq!(metrics.total_commands_executed(), 2);
    assert_eq!(metrics.total_exec_errors(), 2);
    assert_eq!(metrics.num_running_boxes(), 0);
    assert_eq!(sandbox.metrics().await.unwrap().exec_errors, 2);

    runtime.remove(sandbox.id(), false).await.unwrap();
    runtime.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_metrics_count_commands() {
    let env = TestEnv::new();
    let runtime = BoxleaseRuntime::new(env.options()).unwrap();
    let sandbox = runtime.create(env.box_options(), None).await.unwrap();

    sandbox.run(BoxCommand::new("true")).await.unwrap();
    assert!(sandbox.exec(BoxCommand::new("no-such-program-here")).await.is_err());

    let box_metrics = sandbox.metrics().await.unwrap();
    assert_eq!(box_metrics.commands_executed, 2);
    assert_eq!(box_metrics.exec_errors, 1);
    assert!(box_metrics.memory_bytes.is_some());

    let metrics = runtime.metrics();
    assert_eq!(metrics.boxes_created_total(), 1);
    assert_eq!(metrics.num_running_boxes(), 1);
    assert_eq!(metrics.total_commands_executed(), 2);
    assert_eq!(metrics.total_exec_errors(), 1);

    runtime.shutdown().await.unwrap();
}
