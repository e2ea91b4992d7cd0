// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use log::{debug, info};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use nb_util::{wait_prog_state, ProgState};

use crate::session::OutputHandle;

pub const DFL_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drains a set of concurrently producing output channels into
/// per-participant buffers. Everything runs on the calling thread; one
/// bounded read per ready channel per poll keeps any single remote from
/// starving the others and keeps the remote-side output buffers moving.
pub struct OutputCollector {
    poll_interval: Duration,
    deadline: Option<Duration>,
}

impl OutputCollector {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            poll_interval: DFL_POLL_INTERVAL,
            deadline,
        }
    }

    #[cfg(test)]
    fn with_poll_interval(deadline: Option<Duration>, poll_interval: Duration) -> Self {
        Self {
            poll_interval,
            deadline,
        }
    }

    /// Polls until every channel reports completion. Without a deadline a
    /// hung remote process hangs the collection; SIGINT still gets out
    /// through the prog state.
    pub fn collect<H: OutputHandle>(
        &self,
        mut channels: BTreeMap<String, H>,
    ) -> Result<BTreeMap<String, String>> {
        let mut buffers: BTreeMap<String, String> = channels
            .keys()
            .map(|name| (name.clone(), String::new()))
            .collect();
        let started = Instant::now();

        while !channels.is_empty() {
            if wait_prog_state(self.poll_interval) == ProgState::Exiting {
                bail!("interrupted while collecting output");
            }
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    bail!(
                        "output collection from {} exceeded the {:?} deadline",
                        channels
                            .keys()
                            .cloned()
                            .collect::<Vec<String>>()
                            .join(", "),
                        deadline
                    );
                }
            }

            let mut finished = vec![];
            for (name, channel) in channels.iter_mut() {
                if let Some(text) = channel.read_chunk()? {
                    debug!("{}: received {} bytes", name, text.len());
                    buffers.get_mut(name).unwrap().push_str(&text);
                }
                if channel.finished() {
                    info!("{}: output complete", name);
                    finished.push(name.clone());
                }
            }
            for name in finished {
                channels.remove(&name);
            }
        }

        Ok(buffers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ScriptedHandle {
        chunks: Vec<Option<String>>,
        pos: usize,
    }

    impl ScriptedHandle {
        fn new(chunks: Vec<Option<&str>>) -> Self {
            Self {
                chunks: chunks
                    .into_iter()
                    .map(|c| c.map(|s| s.to_string()))
                    .collect(),
                pos: 0,
            }
        }
    }

    impl OutputHandle for ScriptedHandle {
        fn read_chunk(&mut self) -> Result<Option<String>> {
            let chunk = self.chunks.get(self.pos).cloned().flatten();
            self.pos += 1;
            Ok(chunk)
        }

        fn finished(&self) -> bool {
            self.pos >= self.chunks.len()
        }
    }

    fn fast_collector() -> OutputCollector {
        OutputCollector::with_poll_interval(None, Duration::from_millis(1))
    }

    #[test]
    fn test_accumulates_per_participant() {
        let mut channels = BTreeMap::new();
        channels.insert(
            "c0".to_string(),
            ScriptedHandle::new(vec![Some("epoch 1\n"), None, Some("epoch 2\n")]),
        );
        channels.insert(
            "c1".to_string(),
            ScriptedHandle::new(vec![None, Some("other\n")]),
        );

        let buffers = fast_collector().collect(channels).unwrap();
        assert_eq!(buffers["c0"], "epoch 1\nepoch 2\n");
        assert_eq!(buffers["c1"], "other\n");
    }

    #[test]
    fn test_empty_set_returns_immediately() {
        let channels: BTreeMap<String, ScriptedHandle> = BTreeMap::new();
        let buffers = fast_collector().collect(channels).unwrap();
        assert!(buffers.is_empty());
    }

    #[test]
    fn test_deadline_aborts() {
        struct HungHandle;
        impl OutputHandle for HungHandle {
            fn read_chunk(&mut self) -> Result<Option<String>> {
                Ok(None)
            }
            fn finished(&self) -> bool {
                false
            }
        }

        let mut channels = BTreeMap::new();
        channels.insert("c0".to_string(), HungHandle);

        let collector = OutputCollector::with_poll_interval(
            Some(Duration::from_millis(5)),
            Duration::from_millis(1),
        );
        assert!(collector.collect(channels).is_err());
    }
}
