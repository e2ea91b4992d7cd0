// Copyright (c) Facebook, Inc. and its affiliates.
use std::fmt::Display;

use super::args::Mode;
use super::machine::MachineInfo;
use super::{BIN_DIR, CLIENT_BIN, NUMA_SERVER_BIN, SERVER_BIN};

/// A remote benchmark invocation. Flags render as long-form `--key=value`
/// pairs in insertion order; the exact flag set is owned by the binaries.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchCmd {
    pub binary: String,
    pub opts: Vec<(String, String)>,
    pub sudo: bool,
}

impl LaunchCmd {
    pub fn new(binary: &str) -> Self {
        Self {
            binary: format!("{}/{}", BIN_DIR, binary),
            opts: vec![],
            sudo: false,
        }
    }

    pub fn opt<V: Display>(mut self, key: &str, val: V) -> Self {
        self.opts.push((key.to_string(), val.to_string()));
        self
    }

    pub fn sudo(mut self, sudo: bool) -> Self {
        self.sudo = sudo;
        self
    }

    /// Number of `sudo -S` password prompts this command will raise.
    pub fn nr_sudo_prompts(&self) -> u32 {
        self.sudo as u32
    }

    pub fn render(&self) -> String {
        let mut cmd = String::new();
        if self.sudo {
            cmd += "sudo -S ";
        }
        cmd += &self.binary;
        for (key, val) in self.opts.iter() {
            cmd += &format!(" --{}={}", key, val);
        }
        cmd
    }
}

pub fn server_bin(server: &MachineInfo) -> &'static str {
    if server.is_dpu() {
        NUMA_SERVER_BIN
    } else {
        SERVER_BIN
    }
}

/// Server launch configuration: bind address, memory touch behavior and
/// NIC selection.
pub fn server_cmd(server: &MachineInfo, sudo: bool) -> LaunchCmd {
    LaunchCmd::new(server_bin(server))
        .opt("host", &server.ip)
        .opt("port", server.port)
        .opt("use_nvm", false)
        .opt("touch_mem", true)
        .opt("nvm_sz", 1)
        .opt("use_nic_idx", server.nic_idx())
        .sudo(sudo)
}

/// Client launch configuration for one configuration point.
pub fn client_cmd(
    client: &MachineInfo,
    server: &MachineInfo,
    mode: Mode,
    threads: u32,
    coros: u32,
    payload: u64,
    sudo: bool,
) -> LaunchCmd {
    LaunchCmd::new(CLIENT_BIN)
        .opt("random", true)
        .opt("doorbell", false)
        .opt("two_qp", false)
        .opt("add_sync", false)
        .opt("read_write", false)
        .opt("use_read", mode == Mode::Read)
        .opt("threads", threads)
        .opt("coros", coros)
        .opt("payload", payload)
        .opt("numa_type", client.numa_type)
        .opt("force_use_numa_node", true)
        .opt("use_numa_node", 0)
        .opt("remote_nic_idx", server.nic_idx())
        .opt("use_nic_idx", client.nic_idx())
        .opt("address_space", 1)
        .opt("addr", server.server_addr())
        .sudo(sudo)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(ip: &str, numa_type: u32) -> MachineInfo {
        MachineInfo {
            ip: ip.into(),
            port: 8964,
            numa_type,
            ..Default::default()
        }
    }

    #[test]
    fn test_render_long_flags() {
        let cmd = LaunchCmd::new("nvm_server")
            .opt("threads", 4)
            .opt("addr", "10.0.0.1:8964");
        assert_eq!(
            cmd.render(),
            "scripts/nvm_server --threads=4 --addr=10.0.0.1:8964"
        );
    }

    #[test]
    fn test_sudo_prefix() {
        let cmd = LaunchCmd::new("nvm_client").opt("threads", 1).sudo(true);
        assert!(cmd.render().starts_with("sudo -S scripts/nvm_client"));
        assert_eq!(cmd.nr_sudo_prompts(), 1);
    }

    #[test]
    fn test_dpu_gets_userver() {
        assert_eq!(server_bin(&machine("10.0.0.1", 0)), "nvm_server");
        assert_eq!(server_bin(&machine("10.0.0.1", 3)), "nvm_userver");
    }

    #[test]
    fn test_client_cmd_mode_flag() {
        let server = machine("10.0.0.1", 0);
        let client = machine("10.0.0.2", 1);

        let read = client_cmd(&client, &server, Mode::Read, 2, 1, 256, false).render();
        assert!(read.contains("--use_read=true"));
        assert!(read.contains("--threads=2"));
        assert!(read.contains("--payload=256"));
        assert!(read.contains("--addr=10.0.0.1:8964"));

        let write = client_cmd(&client, &server, Mode::Write, 2, 1, 256, false).render();
        assert!(write.contains("--use_read=false"));
    }
}
