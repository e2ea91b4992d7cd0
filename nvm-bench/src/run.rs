// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use nb_util::*;
use nvm_bench_intf::{
    client_cmd, server_cmd, Args, ConnectionEntry, ConnectionFile, MachineFile, MachineInfo,
    CLIENT_BIN,
};

use crate::collect::OutputCollector;
use crate::session::{ExecOpts, Session};
use crate::stats;

/// One aggregate result per configuration point, append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub throughput: f64,
    pub latency: f64,
    pub server: String,
    pub clients: Vec<String>,
    pub threads: u32,
    pub coros: u32,
    pub payload: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryResults {
    pub points: Vec<PointRecord>,
}

impl JsonLoad for EntryResults {}
impl JsonSave for EntryResults {}

/// Seam between the sweep iteration and the remote orchestration so the
/// sweep bookkeeping can be exercised without a fleet.
pub trait PointRunner {
    fn run_point(&mut self, threads: u32, coros: u32, payload: u64) -> Result<(f64, f64)>;
}

/// Requested thread counts above the machine's physical capacity get
/// clamped, the point still runs.
pub fn clamp_threads(requested: u32, machine: &MachineInfo, name: &str) -> u32 {
    let capacity = machine.thread_capacity();
    if requested > capacity {
        warn!(
            "{}: requested {} threads > capacity {} ({} per socket x {}), clamping",
            name, requested, capacity, machine.threads_per_socket, machine.nr_sockets
        );
        capacity
    } else {
        requested
    }
}

fn settle(secs: f64, what: &str) -> Result<()> {
    if secs <= 0.0 {
        return Ok(());
    }
    info!("--- waiting {}s for the {} to settle", secs, what);
    if wait_prog_state(Duration::from_secs_f64(secs)) == ProgState::Exiting {
        bail!("interrupted while waiting for the {}", what);
    }
    Ok(())
}

/// Best-effort kill of a stale or finished remote binary. "No such
/// process" is success for our purposes, so all errors are swallowed.
fn kill_remote(session: &Session, binary: &str, sudo: bool) {
    let (cmd, opts) = if sudo {
        (
            format!("sudo -S killall {} || true", binary),
            ExecOpts {
                sudo_passwd_writes: 1,
            },
        )
    } else {
        (format!("killall {} || true", binary), ExecOpts::default())
    };
    if let Err(e) = session.execute(&[cmd], &opts) {
        warn!("{}: failed to kill {} ({:#})", session.host, binary, e);
    }
}

pub struct RemotePointRunner<'a> {
    pub args: &'a Args,
    pub machines: &'a MachineFile,
    pub entry: &'a ConnectionEntry,
}

impl<'a> RemotePointRunner<'a> {
    fn launch_opts(&self, nr_sudo_prompts: u32) -> ExecOpts {
        ExecOpts {
            sudo_passwd_writes: if self.args.sudo { nr_sudo_prompts } else { 0 },
        }
    }

    fn connect(&self, name: &str, machine: &MachineInfo) -> Result<Session> {
        Session::connect(&machine.ip, &machine.user, &machine.passwd)
            .with_context(|| format!("connecting to {}", name))
    }

    /// Launches everything for one point and reduces the collected client
    /// output. Sessions opened for clients are pushed into
    /// `client_sessions` so the caller can clean up on any exit path.
    fn drive_point(
        &self,
        server: &MachineInfo,
        server_session: &Session,
        client_sessions: &mut Vec<Session>,
        threads: u32,
        coros: u32,
        payload: u64,
    ) -> Result<(f64, f64)> {
        let server_bin = nvm_bench_intf::cmd::server_bin(server);
        kill_remote(server_session, server_bin, self.args.sudo);

        let launch = server_cmd(server, self.args.sudo);
        let opts = self.launch_opts(launch.nr_sudo_prompts());
        // Keep the server's channel open for the lifetime of the point;
        // its output isn't scraped, the clients report the statistics.
        let _server_out = server_session.execute_non_blocking(
            &[format!("cd {}", server.repo_dir()), launch.render()],
            &opts,
        )?;
        settle(self.args.server_settle, "server")?;

        let mut handles = BTreeMap::new();
        for name in self.entry.clients.iter() {
            let client = self.machines.get(name)?;
            let session = self.connect(name, client)?;
            kill_remote(&session, CLIENT_BIN, self.args.sudo);

            let eff_threads = clamp_threads(threads, client, name);
            let launch = client_cmd(
                client,
                server,
                self.args.mode,
                eff_threads,
                coros,
                payload,
                self.args.sudo,
            );
            let opts = self.launch_opts(launch.nr_sudo_prompts());
            let handle = session.execute_non_blocking(
                &[format!("cd {}", client.repo_dir()), launch.render()],
                &opts,
            )?;

            handles.insert(name.clone(), handle);
            client_sessions.push(session);
            settle(self.args.client_settle, "client")?;
        }

        let collector =
            OutputCollector::new(self.args.point_deadline.map(Duration::from_secs));
        let buffers = collector.collect(handles)?;
        stats::aggregate(&buffers)
    }
}

impl<'a> PointRunner for RemotePointRunner<'a> {
    fn run_point(&mut self, threads: u32, coros: u32, payload: u64) -> Result<(f64, f64)> {
        let server = self.machines.get(&self.entry.server)?;
        let mut server_session = self.connect(&self.entry.server, server)?;
        let server_bin = nvm_bench_intf::cmd::server_bin(server);

        let mut client_sessions = vec![];
        let result = self.drive_point(
            server,
            &server_session,
            &mut client_sessions,
            threads,
            coros,
            payload,
        );

        // Kill and close everything regardless of the outcome so nothing
        // leaks into the next point.
        for session in client_sessions.iter_mut() {
            kill_remote(session, CLIENT_BIN, self.args.sudo);
            session.close();
        }
        kill_remote(&server_session, server_bin, self.args.sudo);
        server_session.close();

        result
    }
}

/// Runs the full cross product of one connection entry, committing the
/// whole result array after every point.
pub fn run_sweep_entry(
    entry: &ConnectionEntry,
    runner: &mut dyn PointRunner,
    result_path: &Path,
    point_pause: Duration,
) -> Result<()> {
    entry.validate()?;

    let mut report = JsonReportFile::<EntryResults>::new(result_path);
    let points = entry.points();

    info!(
        "=== sweep: server = {}, clients = {:?}, {} points ===",
        entry.server,
        entry.clients,
        points.len()
    );
    info!(
        "===        threads = {:?}, coros = {:?}, payloads = {:?} ===",
        entry.thread_counts, entry.coroutine_counts, entry.payloads
    );
    info!("===        results -> {:?} ===", result_path);

    for (threads, coros, payload) in points {
        info!(
            "run: threads = {}, coros = {}, payload = {}",
            threads, coros, payload
        );

        let (throughput, latency) = runner.run_point(threads, coros, payload)?;

        info!(
            "result: threads = {}, coros = {}, payload = {} -> throughput = {}, latency = {}",
            threads, coros, payload, throughput, latency
        );

        report.data.points.push(PointRecord {
            throughput,
            latency,
            server: entry.server.clone(),
            clients: entry.clients.clone(),
            threads,
            coros,
            payload,
        });
        report
            .commit()
            .with_context(|| format!("writing {:?}", result_path))?;

        if point_pause > Duration::from_secs(0) {
            if wait_prog_state(point_pause) == ProgState::Exiting {
                bail!("interrupted between sweep points");
            }
        }
    }

    Ok(())
}

/// Validates every referenced machine up front, then drives each enabled
/// connection entry into its own result file.
pub fn run_sweep(args: &Args, machines: &MachineFile, connections: &ConnectionFile) -> Result<()> {
    let enabled: Vec<&ConnectionEntry> = connections
        .entries
        .iter()
        .filter(|e| e.enable)
        .collect();
    if enabled.is_empty() {
        bail!("no enabled entries in the connection config");
    }

    // All config errors must surface before the first remote connection.
    for entry in enabled.iter() {
        entry.validate()?;
        machines.get(&entry.server)?.validate(&entry.server)?;
        for name in entry.clients.iter() {
            machines.get(name)?.validate(name)?;
        }
    }

    std::fs::create_dir_all(&args.result_dir)
        .with_context(|| format!("creating result dir {:?}", &args.result_dir))?;

    for entry in enabled {
        let filename = format!(
            "benchres_{}_{}_{}.json",
            entry.clients.join(","),
            entry.server,
            format_time_filename(unix_now())
        );
        let result_path = Path::new(&args.result_dir).join(filename);

        let mut runner = RemotePointRunner {
            args,
            machines,
            entry,
        };
        run_sweep_entry(
            entry,
            &mut runner,
            &result_path,
            Duration::from_secs_f64(args.point_pause),
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedRunner {
        throughput: f64,
        latency: f64,
        calls: Vec<(u32, u32, u64)>,
    }

    impl PointRunner for CannedRunner {
        fn run_point(&mut self, threads: u32, coros: u32, payload: u64) -> Result<(f64, f64)> {
            self.calls.push((threads, coros, payload));
            Ok((self.throughput, self.latency))
        }
    }

    #[test]
    fn test_clamp_threads() {
        let machine = MachineInfo {
            threads_per_socket: 16,
            nr_sockets: 2,
            ..Default::default()
        };
        assert_eq!(clamp_threads(64, &machine, "client0"), 32);
        assert_eq!(clamp_threads(32, &machine, "client0"), 32);
        assert_eq!(clamp_threads(1, &machine, "client0"), 1);
    }

    #[test]
    fn test_sweep_entry_end_to_end() {
        let entry = ConnectionEntry {
            enable: true,
            server: "server0".into(),
            clients: vec!["client0".into()],
            thread_counts: vec![1, 2],
            coroutine_counts: vec![1],
            payloads: vec![64, 256],
        };

        let dir = tempfile::tempdir().unwrap();
        let result_path = dir.path().join("benchres_test.json");

        let mut runner = CannedRunner {
            throughput: 500000.0,
            latency: 7.5,
            calls: vec![],
        };
        run_sweep_entry(&entry, &mut runner, &result_path, Duration::from_secs(0)).unwrap();

        // Every cross-product point ran exactly once, threads outermost.
        assert_eq!(
            runner.calls,
            vec![(1, 1, 64), (1, 1, 256), (2, 1, 64), (2, 1, 256)]
        );

        // The file is one well-formed JSON array of per-point records.
        let results = EntryResults::load(&result_path).unwrap();
        assert_eq!(results.points.len(), 4);
        for (record, (threads, coros, payload)) in
            results.points.iter().zip(runner.calls.iter())
        {
            assert_eq!(record.throughput, 500000.0);
            assert_eq!(record.latency, 7.5);
            assert_eq!(record.threads, *threads);
            assert_eq!(record.coros, *coros);
            assert_eq!(record.payload, *payload);
            assert_eq!(record.server, "server0");
            assert_eq!(record.clients, vec!["client0".to_string()]);
        }
    }

    #[test]
    fn test_sweep_entry_rejects_empty_clients() {
        let entry = ConnectionEntry {
            enable: true,
            clients: vec![],
            ..Default::default()
        };

        let dir = tempfile::tempdir().unwrap();
        let mut runner = CannedRunner {
            throughput: 0.0,
            latency: 0.0,
            calls: vec![],
        };
        assert!(run_sweep_entry(
            &entry,
            &mut runner,
            &dir.path().join("out.json"),
            Duration::from_secs(0)
        )
        .is_err());
        assert!(runner.calls.is_empty());
    }

    #[test]
    fn test_run_sweep_rejects_placeholder_credentials() {
        // Default machine templates still carry placeholder credentials.
        let machines = MachineFile::default();
        let connections = ConnectionFile {
            entries: vec![ConnectionEntry {
                enable: true,
                ..Default::default()
            }],
        };
        let args = Args::default();

        assert!(run_sweep(&args, &machines, &connections).is_err());
    }
}
