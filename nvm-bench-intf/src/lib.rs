// Copyright (c) Facebook, Inc. and its affiliates.
pub mod args;
pub mod cmd;
pub mod connection;
pub mod machine;

pub use args::{Args, Mode};
pub use cmd::{client_cmd, server_cmd, LaunchCmd};
pub use connection::{ConnectionEntry, ConnectionFile};
pub use machine::{MachineDirectory, MachineFile, MachineInfo};

/// Remote checkout the benchmark binaries live in.
pub const PROJECT_NAME: &str = "librdpma_fork";

pub const SERVER_BIN: &str = "nvm_server";
pub const NUMA_SERVER_BIN: &str = "nvm_userver";
pub const CLIENT_BIN: &str = "nvm_client";

/// Relative path from the repo dir to the binaries.
pub const BIN_DIR: &str = "scripts";

/// NUMA classification marking a machine as a DPU. DPUs run the userspace
/// server binary instead of nvm_server.
pub const NUMA_TYPE_DPU: u32 = 3;

/// Sentinel values the config templates ship with. Configs still carrying
/// them are rejected before any remote connection is attempted.
pub const PLACEHOLDER_USER: &str = "YOUR_USER_NAME";
pub const PLACEHOLDER_PASSWD: &str = "YOUR_PASSWORD";
pub const PLACEHOLDER_REPO_DIR: &str = "path/to/librdpma_fork";

lazy_static::lazy_static! {
    pub static ref VERSION: &'static str = env!("CARGO_PKG_VERSION");
}
