use std::path::Path;

use boxlease::{BoxOptions, BoxleaseOptions, ShimCommand};
use tempfile::TempDir;

/// A private home plus a directory used as box root.
pub struct TestEnv {
    pub home: TempDir,
    pub rootfs: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            home: TempDir::new().unwrap(),
            rootfs: TempDir::new().unwrap(),
        }
    }

    /// Runtime options using the freshly built supervisor binary.
    pub fn options(&self) -> BoxleaseOptions {
        options_for(self.home.path())
    }

    /// Box running under the shared rootfs, small enough for any host.
    pub fn box_options(&self) -> BoxOptions {
        BoxOptions {
            memory_mib: Some(256),
            ..BoxOptions::rootfs(self.rootfs.path())
        }
    }

    /// Box that survives its creator and keeps its record.
    #[allow(dead_code)]
    pub fn detached_box_options(&self) -> BoxOptions {
        BoxOptions {
            auto_remove: false,
            detach: true,
            ..self.box_options()
        }
    }

    /// Box that keeps its record after stop.
    #[allow(dead_code)]
    pub fn persistent_box_options(&self) -> BoxOptions {
        BoxOptions {
            auto_remove: false,
            ..self.box_options()
        }
    }
}

pub fn options_for(home: &Path) -> BoxleaseOptions {
    let mut options = BoxleaseOptions::with_home(home);
    options.shim = Some(ShimCommand::new(env!("CARGO_BIN_EXE_boxlease-shim")));
    options.file_logging = false;
    options
}

/// Wait until `pid` is gone, reaping it when it is our child.
#[allow(dead_code)]
pub fn wait_for_exit(pid: u32) {
    unsafe {
        libc::waitpid(pid as i32, std::ptr::null_mut(), 0);
    }
    for _ in 0..100 {
        if unsafe { libc::kill(pid as i32, 0) } != 0 {
            return;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
    }
    panic!("process {} did not exit", pid);
}
