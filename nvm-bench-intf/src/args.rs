// Copyright (c) Facebook, Inc. and its affiliates.
use clap;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use nb_util::*;

const HELP_BODY: &str = "\
NVM/RDMA benchmark sweep driver.

nvm-bench drives the librdpma nvm_server/nvm_client binaries across a fleet
of machines over SSH. For every enabled connection-matrix entry it launches
one server and N clients per configuration point (thread count x coroutine
count x payload size), scrapes the throughput/latency statistics the clients
print to stdout, and writes one JSON array of aggregate results per entry.

Machines and the connection matrix are described by two JSON config files.
On the first run missing config files are generated from templates and the
program exits so they can be filled in. Placeholder credentials are rejected
before any remote connection is attempted.
";

lazy_static! {
    static ref ARGS_STR: String = format!(
        "-m, --machines=[FILE]     'Machine directory config (default: {dfl_machines})'
         -c, --connections=[FILE]  'Connection matrix config (default: {dfl_connections})'
         -r, --result-dir=[DIR]    'Directory for result files (default: {dfl_result_dir})'
         -t, --bench-type=[read|write] 'Experiment mode (default: read)'
             --server-settle=[SECS] 'Wait after server launch (default: {dfl_server_settle})'
             --client-settle=[SECS] 'Wait after each client launch (default: {dfl_client_settle})'
             --point-pause=[SECS]  'Pause between sweep points (default: {dfl_point_pause})'
             --point-deadline=[SECS] 'Abort a point if collection exceeds SECS (default: unbounded)'
             --sudo                'Launch remote binaries through sudo -S'
         -a, --args=[FILE]         'Load base command line arguments from FILE'
         -v...                     'Sets the level of verbosity'",
        dfl_machines = Args::default().machines,
        dfl_connections = Args::default().connections,
        dfl_result_dir = Args::default().result_dir,
        dfl_server_settle = Args::default().server_settle,
        dfl_client_settle = Args::default().client_settle,
        dfl_point_pause = Args::default().point_pause,
    );
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn parse(input: &str) -> Option<Self> {
        match input {
            "read" => Some(Self::Read),
            "write" => Some(Self::Write),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Args {
    pub machines: String,
    pub connections: String,
    pub result_dir: String,
    pub mode: Mode,
    pub server_settle: f64,
    pub client_settle: f64,
    pub point_pause: f64,
    pub point_deadline: Option<u64>,
    pub sudo: bool,

    #[serde(skip)]
    pub verbosity: u32,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            machines: "configs/machines.json".into(),
            connections: "configs/connections.json".into(),
            result_dir: "results".into(),
            mode: Mode::Read,
            server_settle: 5.0,
            client_settle: 0.0,
            point_pause: 3.0,
            point_deadline: None,
            sudo: false,
            verbosity: 0,
        }
    }
}

impl JsonLoad for Args {}
impl JsonSave for Args {}

impl JsonArgs for Args {
    fn match_cmdline() -> clap::ArgMatches<'static> {
        clap::App::new("nvm-bench")
            .version(env!("CARGO_PKG_VERSION"))
            .about(HELP_BODY)
            .args_from_usage(&ARGS_STR)
            .setting(clap::AppSettings::UnifiedHelpMessage)
            .setting(clap::AppSettings::DeriveDisplayOrder)
            .get_matches()
    }

    fn verbosity(matches: &clap::ArgMatches) -> u32 {
        matches.occurrences_of("v") as u32
    }

    fn process_cmdline(&mut self, matches: &clap::ArgMatches) -> bool {
        let dfl = Args::default();
        let mut updated = false;

        if let Some(v) = matches.value_of("machines") {
            self.machines = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.machines.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("connections") {
            self.connections = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.connections.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("result-dir") {
            self.result_dir = if v.len() > 0 {
                v.to_string()
            } else {
                dfl.result_dir.clone()
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("bench-type") {
            self.mode = Mode::parse(v).unwrap_or_else(|| {
                clap::Error::value_validation_auto(format!(
                    "bench-type must be \"read\" or \"write\", got {:?}",
                    v
                ))
                .exit()
            });
            updated = true;
        }
        if let Some(v) = matches.value_of("server-settle") {
            self.server_settle = if v.len() > 0 {
                v.parse::<f64>().unwrap().max(0.0)
            } else {
                dfl.server_settle
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("client-settle") {
            self.client_settle = if v.len() > 0 {
                v.parse::<f64>().unwrap().max(0.0)
            } else {
                dfl.client_settle
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("point-pause") {
            self.point_pause = if v.len() > 0 {
                v.parse::<f64>().unwrap().max(0.0)
            } else {
                dfl.point_pause
            };
            updated = true;
        }
        if let Some(v) = matches.value_of("point-deadline") {
            self.point_deadline = if v.len() > 0 {
                Some(v.parse::<u64>().unwrap())
            } else {
                None
            };
            updated = true;
        }
        if matches.is_present("sudo") {
            self.sudo = true;
            updated = true;
        }

        self.verbosity = Self::verbosity(matches);

        updated
    }
}
