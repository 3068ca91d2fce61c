//! Constants shared by the runtime, the supervisor and the CLI.

/// Environment variables.
pub mod env {
    /// Overrides the default home directory.
    pub const HOME: &str = "BOXLEASE_HOME";

    /// Extra directories searched for runtime binaries (colon separated).
    pub const RUNTIME_DIR: &str = "BOXLEASE_RUNTIME_DIR";

    /// Injected into every executed command: the id of the box it runs in.
    pub const BOX_ID: &str = "BOXLEASE_BOX_ID";
}

/// Names of files and directories under the home directory.
pub mod layout {
    /// Default home directory name under the user's home.
    pub const HOME_DIR: &str = ".boxlease";

    pub const LOCK_FILE: &str = ".lock";
    pub const DB_DIR: &str = "db";
    pub const DB_FILE: &str = "boxes.db";
    pub const BOXES_DIR: &str = "boxes";
    pub const LOGS_DIR: &str = "logs";

    /// Daily-rolling runtime log under the logs directory.
    pub const RUNTIME_LOG_PREFIX: &str = "boxlease.log";

    /// Per-box working tree used as the command root.
    pub const ROOTFS_DIR: &str = "rootfs";

    /// Written by the supervisor once it is up.
    pub const PID_FILE: &str = "shim.pid";
}

/// Supervisor binary.
pub mod shim {
    pub const BINARY_NAME: &str = "boxlease-shim";

    /// CLI subcommand that hosts the supervisor inside the `boxlease` binary.
    pub const SUBCOMMAND: &str = "shim";

    pub const LOG_FILE_PREFIX: &str = "boxlease-shim.log";
}

/// Box defaults applied when options leave a value unset.
pub mod defaults {
    pub const CPUS: u8 = 1;
    pub const MEMORY_MIB: u32 = 2048;
    pub const MIN_MEMORY_MIB: u32 = 128;
    pub const REGISTRY: &str = "docker.io";
    pub const TAG: &str = "latest";
}
