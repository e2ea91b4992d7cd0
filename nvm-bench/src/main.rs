// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{Context, Result};
use log::{error, info};
use std::process::exit;

use nb_util::*;
use nvm_bench_intf::{Args, ConnectionFile, MachineFile};

mod collect;
mod run;
mod session;
mod stats;

/// Generates template config files for any that are missing. Returns true
/// if anything was created so the caller can stop and let the operator
/// fill in credentials.
fn prepare_configs(args: &Args) -> Result<bool> {
    let mut created = MachineFile::maybe_create_dfl(&args.machines)
        .with_context(|| format!("creating {:?}", &args.machines))?;
    if created {
        info!("Created machine config template {:?}", &args.machines);
    }

    let conn_created = ConnectionFile::maybe_create_dfl(&args.connections)
        .with_context(|| format!("creating {:?}", &args.connections))?;
    if conn_created {
        info!("Created connection config template {:?}", &args.connections);
    }
    created |= conn_created;

    Ok(created)
}

fn main() {
    setup_prog_state();

    let args_file = Args::init_args_and_logging().unwrap_or_else(|e| {
        error!("Failed to process args file ({:#})", &e);
        exit(1);
    });
    let args = &args_file.data;

    match prepare_configs(args) {
        Ok(true) => {
            info!("Fill in the generated config files and run again");
            return;
        }
        Ok(false) => {}
        Err(e) => {
            error!("Failed to prepare config files ({:#})", &e);
            exit(1);
        }
    }

    let machines = match JsonConfigFile::<MachineFile>::load(&args.machines) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load {:?} ({:#})", &args.machines, &e);
            exit(1);
        }
    };
    let connections = match JsonConfigFile::<ConnectionFile>::load(&args.connections) {
        Ok(v) => v,
        Err(e) => {
            error!("Failed to load {:?} ({:#})", &args.connections, &e);
            exit(1);
        }
    };

    if let Err(e) = run::run_sweep(args, &machines.data, &connections.data) {
        error!("Benchmark sweep failed ({:#})", &e);
        exit(1);
    }

    info!("All sweeps complete, results are in {:?}", &args.result_dir);
}
