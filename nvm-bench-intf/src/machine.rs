// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use nb_util::*;

use super::{PLACEHOLDER_PASSWD, PLACEHOLDER_REPO_DIR, PLACEHOLDER_USER, PROJECT_NAME};

/// One machine in the fleet. `port` is the benchmark server's bind port,
/// not the SSH port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MachineInfo {
    pub ip: String,
    pub port: u16,
    pub user: String,
    pub passwd: String,
    pub available_nic: Vec<u32>,
    pub threads_per_socket: u32,
    pub nr_sockets: u32,
    pub numa_type: u32,
    pub repo_dir: Option<String>,
}

impl Default for MachineInfo {
    fn default() -> Self {
        Self {
            ip: "0.0.0.0".into(),
            port: 8964,
            user: PLACEHOLDER_USER.into(),
            passwd: PLACEHOLDER_PASSWD.into(),
            available_nic: vec![0],
            threads_per_socket: 16,
            nr_sockets: 2,
            numa_type: 0,
            repo_dir: None,
        }
    }
}

impl MachineInfo {
    /// Physical thread capacity. Requested thread counts above this get
    /// clamped by the sweep driver.
    pub fn thread_capacity(&self) -> u32 {
        self.threads_per_socket * self.nr_sockets
    }

    pub fn is_dpu(&self) -> bool {
        self.numa_type == super::NUMA_TYPE_DPU
    }

    pub fn nic_idx(&self) -> u32 {
        self.available_nic[0]
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }

    /// Remote directory holding the benchmark checkout. Placeholder and
    /// missing values fall back to the user's home checkout.
    pub fn repo_dir(&self) -> String {
        match self.repo_dir.as_deref() {
            Some(dir) if dir != PLACEHOLDER_REPO_DIR && dir != "None" && dir.len() > 0 => {
                dir.to_string()
            }
            _ => format!("/home/{}/{}", self.user, PROJECT_NAME),
        }
    }

    pub fn validate(&self, name: &str) -> Result<()> {
        if self.user == PLACEHOLDER_USER || self.passwd == PLACEHOLDER_PASSWD {
            bail!(
                "machine {:?} still has placeholder credentials, edit the machine config",
                name
            );
        }
        if self.available_nic.is_empty() {
            bail!("machine {:?} has no available NICs configured", name);
        }
        Ok(())
    }
}

pub type MachineDirectory = BTreeMap<String, MachineInfo>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineFile {
    pub machines: MachineDirectory,
}

impl Default for MachineFile {
    fn default() -> Self {
        let mut machines = MachineDirectory::new();
        machines.insert("server0".into(), MachineInfo::default());
        machines.insert(
            "client0".into(),
            MachineInfo {
                ip: "0.0.0.1".into(),
                ..Default::default()
            },
        );
        Self { machines }
    }
}

impl JsonLoad for MachineFile {}

impl JsonSave for MachineFile {
    fn preamble() -> Option<String> {
        Some(
            "// Machine directory for nvm-bench.\n\
             // Replace the placeholder user/passwd values before running.\n"
                .into(),
        )
    }
}

impl MachineFile {
    pub fn get(&self, name: &str) -> Result<&MachineInfo> {
        match self.machines.get(name) {
            Some(m) => Ok(m),
            None => bail!("machine {:?} is not in the machine config", name),
        }
    }
}
