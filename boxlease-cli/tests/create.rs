use predicates::prelude::*;

mod common;

#[test]
fn test_create_prints_id_and_keeps_running() {
    let ctx = common::boxlease();
    let id = ctx.create_box(&[]);

    let info = ctx.info(&id);
    assert_eq!(info["id"], id.as_str());
    assert_eq!(info["status"], "running");
    assert_eq!(info["detach"], true);
    assert_eq!(info["auto_remove"], false);
    assert!(info["pid"].is_u64());
}

#[test]
fn test_create_with_name_and_resources() {
    let ctx = common::boxlease();
    let id = ctx.create_box(&["--name", "web", "--cpus", "1", "--memory", "256"]);

    let info = ctx.info("web");
    assert_eq!(info["id"], id.as_str());
    assert_eq!(info["name"], "web");
    assert_eq!(info["cpus"], 1);
    assert_eq!(info["memory_mib"], 256);
    assert!(info["image"].as_str().unwrap().starts_with("rootfs:"));
}

#[test]
fn test_create_name_conflict() {
    let ctx = common::boxlease();
    ctx.create_box(&["--name", "dup"]);

    let mut cmd = ctx.new_cmd();
    cmd.args(["create", "--name", "dup", "--rootfs", &ctx.rootfs_arg()]);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("already in use"));
}

#[test]
fn test_create_ids_increase() {
    let ctx = common::boxlease();
    let first = ctx.create_box(&[]);
    std::thread::sleep(std::time::Duration::from_millis(5));
    let second = ctx.create_box(&[]);
    assert!(second > first, "{} should sort after {}", second, first);
}

#[test]
fn test_create_memory_out_of_bounds() {
    let mut ctx = common::boxlease();
    let root = ctx.rootfs_arg();
    ctx.cmd
        .args(["create", "--memory", "1", "--rootfs", &root]);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("resource limit"));
    assert!(ctx.all_ids().is_empty());
}

#[test]
fn test_create_missing_rootfs() {
    let mut ctx = common::boxlease();
    let missing = ctx.rootfs.path().join("missing");
    ctx.cmd
        .args(["create", "--rootfs"])
        .arg(&missing);
    ctx.cmd
        .assert()
        .failure()
        .stderr(predicate::str::contains("rootfs"));
}

#[test]
fn test_create_image_and_rootfs_conflict() {
    let mut ctx = common::boxlease();
    let root = ctx.rootfs_arg();
    ctx.cmd.args(["create", "alpine", "--rootfs", &root]);
    ctx.cmd.assert().failure();
}
