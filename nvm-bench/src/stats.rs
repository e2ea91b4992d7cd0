// Copyright (c) Facebook, Inc. and its affiliates.
use anyhow::{bail, Result};
use log::warn;
use std::collections::BTreeMap;

/// Epochs below this are ramp-up noise and never contribute to results.
pub const WARMUP_EPOCHS: u64 = 5;

lazy_static::lazy_static! {
    // Matches the statistics line the nvm binaries print once per epoch:
    //   [statucs.hh:78] epoch @ 8 1.73391 : thpt: 596948 reqs/sec,
    // Only the four token positions matter, surrounding text is free-form.
    static ref STAT_LINE_RE: regex::Regex = regex::Regex::new(
        r"epoch\s*[:@]?\s*(\d+)\s+([0-9.eE+-]+)\s*:?\s*thpt\s*[:@]?\s*([0-9.eE+-]+)\s+reqs/sec"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatSample {
    pub epoch: u64,
    pub latency: f64,
    pub throughput: f64,
}

/// Scans a buffer line by line for statistics samples. Non-matching lines
/// and unparsable numbers are skipped silently; warm-up epochs are
/// discarded.
pub fn parse_stats(buffer: &str) -> Vec<StatSample> {
    let mut samples = vec![];
    for line in buffer.lines() {
        let caps = match STAT_LINE_RE.captures(line) {
            Some(v) => v,
            None => continue,
        };
        let epoch = match caps[1].parse::<u64>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let latency = match caps[2].parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let throughput = match caps[3].parse::<f64>() {
            Ok(v) => v,
            Err(_) => continue,
        };

        if epoch >= WARMUP_EPOCHS {
            samples.push(StatSample {
                epoch,
                latency,
                throughput,
            });
        }
    }
    samples
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        0.0
    } else {
        vals.iter().sum::<f64>() / vals.len() as f64
    }
}

/// Reduces per-participant buffers to one aggregate pair. Throughput from
/// concurrent clients is additive system capacity, so participant means
/// are summed; latency is a representative per-operation figure, so
/// participant means are averaged. A participant with no retained samples
/// contributes exactly 0.0 to both.
pub fn aggregate(buffers: &BTreeMap<String, String>) -> Result<(f64, f64)> {
    if buffers.is_empty() {
        bail!("no participants to aggregate, the client list is empty");
    }

    let mut thpts = vec![];
    let mut lats = vec![];

    for (name, buffer) in buffers.iter() {
        let samples = parse_stats(buffer);
        if samples.is_empty() {
            warn!("{}: no statistics lines past warm-up, counting as 0.0", name);
        }
        thpts.push(mean(
            &samples.iter().map(|s| s.throughput).collect::<Vec<f64>>(),
        ));
        lats.push(mean(
            &samples.iter().map(|s| s.latency).collect::<Vec<f64>>(),
        ));
    }

    Ok((thpts.iter().sum(), mean(&lats)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stat_line(epoch: u64, latency: f64, thpt: &str) -> String {
        format!(
            "[statucs.hh:78] epoch @ {} {} : thpt: {} reqs/sec,",
            epoch, latency, thpt
        )
    }

    #[test]
    fn test_warmup_epochs_discarded() {
        let mut buf = String::new();
        for epoch in 0..10 {
            buf += &stat_line(epoch, 2.0, "1000000");
            buf += "\n";
        }

        let samples = parse_stats(&buf);
        assert_eq!(samples.len(), 5);
        assert_eq!(samples[0].epoch, 5);
        assert_eq!(samples[0].throughput, 1000000.0);
        assert!(samples.iter().all(|s| s.epoch >= 5));
    }

    #[test]
    fn test_only_warmup_yields_nothing() {
        let mut buf = String::new();
        for epoch in 0..5 {
            buf += &stat_line(epoch, 2.0, "1000000");
            buf += "\n";
        }
        assert!(parse_stats(&buf).is_empty());
    }

    #[test]
    fn test_noise_lines_skipped() {
        let a = stat_line(5, 1.0, "100") + "\n";
        let b = stat_line(6, 2.0, "200") + "\n";
        let noise = "\nstarting up...\n[warn] unrelated 123 line\n\n";

        let plain = parse_stats(&format!("{}{}", a, b));
        let noisy = parse_stats(&format!("{}{}{}", a, noise, b));
        assert_eq!(plain, noisy);
        assert_eq!(noisy.len(), 2);
        assert_eq!(noisy[0].epoch, 5);
        assert_eq!(noisy[1].epoch, 6);
    }

    #[test]
    fn test_scientific_notation() {
        let buf = stat_line(8, 1.73391, "1.41981e+06");
        let samples = parse_stats(&buf);
        assert_eq!(samples.len(), 1);
        assert!((samples[0].throughput - 1.41981e+06).abs() < 1.0);
        assert!((samples[0].latency - 1.73391).abs() < 1e-9);
    }

    #[test]
    fn test_aggregate_sums_thpt_means_latency() {
        let mut buffers = BTreeMap::new();
        // X: thpt mean 100, latency mean 10.
        buffers.insert(
            "x".to_string(),
            format!("{}\n{}\n", stat_line(5, 8.0, "50"), stat_line(6, 12.0, "150")),
        );
        // Y: thpt mean 200, latency mean 20.
        buffers.insert(
            "y".to_string(),
            format!("{}\n{}\n", stat_line(5, 15.0, "250"), stat_line(6, 25.0, "150")),
        );

        let (thpt, lat) = aggregate(&buffers).unwrap();
        assert_eq!(thpt, 300.0);
        assert_eq!(lat, 15.0);
    }

    #[test]
    fn test_aggregate_zero_sample_participant_counts() {
        let mut buffers = BTreeMap::new();
        buffers.insert("x".to_string(), stat_line(5, 10.0, "100"));
        buffers.insert("y".to_string(), "no stats here\n".to_string());

        let (thpt, lat) = aggregate(&buffers).unwrap();
        assert_eq!(thpt, 100.0);
        // The zero participant is averaged in, not excluded.
        assert_eq!(lat, 5.0);
    }

    #[test]
    fn test_aggregate_empty_map_is_error() {
        let buffers = BTreeMap::new();
        assert!(aggregate(&buffers).is_err());
    }
}
