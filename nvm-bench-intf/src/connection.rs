// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use nb_util::*;

/// One sweep entry: a server, its clients and the parameter lists whose
/// cross product defines the configuration points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionEntry {
    pub enable: bool,
    pub server: String,
    pub clients: Vec<String>,
    pub thread_counts: Vec<u32>,
    pub coroutine_counts: Vec<u32>,
    pub payloads: Vec<u64>,
}

impl Default for ConnectionEntry {
    fn default() -> Self {
        Self {
            enable: false,
            server: "server0".into(),
            clients: vec!["client0".into()],
            thread_counts: vec![1, 36],
            coroutine_counts: vec![1],
            payloads: vec![16, 256, 512, 8192],
        }
    }
}

impl ConnectionEntry {
    pub fn validate(&self) -> Result<()> {
        if self.clients.is_empty() {
            bail!("connection entry for server {:?} has no clients", self.server);
        }
        if self.thread_counts.is_empty()
            || self.coroutine_counts.is_empty()
            || self.payloads.is_empty()
        {
            bail!(
                "connection entry for server {:?} has an empty sweep dimension",
                self.server
            );
        }
        Ok(())
    }

    /// Full deterministic cross product, threads outermost, then
    /// coroutines, then payloads.
    pub fn points(&self) -> Vec<(u32, u32, u64)> {
        let mut points = vec![];
        for &threads in self.thread_counts.iter() {
            for &coros in self.coroutine_counts.iter() {
                for &payload in self.payloads.iter() {
                    points.push((threads, coros, payload));
                }
            }
        }
        points
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionFile {
    pub entries: Vec<ConnectionEntry>,
}

impl Default for ConnectionFile {
    fn default() -> Self {
        Self {
            entries: vec![Default::default()],
        }
    }
}

impl JsonLoad for ConnectionFile {}

impl JsonSave for ConnectionFile {
    fn preamble() -> Option<String> {
        Some(
            "// Connection matrix for nvm-bench.\n\
             // Set \"enable\": true on the entries to sweep.\n"
                .into(),
        )
    }
}
