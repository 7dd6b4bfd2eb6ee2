//! Seeded synthetic fleet telemetry for demos and end-to-end tests.

use crate::ingest::{COUNTERS_FILE, LOGS_FILE};
use crate::telemetry::{CounterSample, LogEvent, Metric};
use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal, Poisson};
use std::io::Write;
use std::path::Path;
use tracing::info;

pub const WORKLOADS: [&str; 4] = ["ai_train", "video_transcode", "network_burst", "idle"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    DramEcc,
    PcieAer,
    Thermal,
    NetworkCongestion,
}

impl FailureKind {
    pub const ALL: [FailureKind; 4] = [
        FailureKind::DramEcc,
        FailureKind::PcieAer,
        FailureKind::Thermal,
        FailureKind::NetworkCongestion,
    ];

    /// Log event label emitted while the failure is active.
    pub fn event(&self) -> &'static str {
        match self {
            FailureKind::DramEcc => "DRAM_ECC",
            FailureKind::PcieAer => "PCIE_AER",
            FailureKind::Thermal => "THERMAL",
            FailureKind::NetworkCongestion => "NETWORK_CONGESTION",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub hosts: usize,
    pub duration_sec: u32,
    pub seed: u64,
    pub start: DateTime<Utc>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            hosts: 12,
            duration_sec: 1800,
            seed: 42,
            // 2024-01-01T00:00:00Z
            start: DateTime::<Utc>::UNIX_EPOCH + Duration::days(19_723),
        }
    }
}

/// Ground truth for one simulated host.
#[derive(Debug, Clone, PartialEq)]
pub struct HostProfile {
    pub host: String,
    pub workload: &'static str,
    pub failure: Option<(FailureKind, u32, u32)>,
}

#[derive(Debug, Clone)]
pub struct SimulatedFleet {
    pub profiles: Vec<HostProfile>,
    pub counters: Vec<CounterSample>,
    pub logs: Vec<LogEvent>,
}

/// Per-host sampling distributions for one workload.
struct HostNoise {
    cpu: Normal<f64>,
    mem_bw: Normal<f64>,
    latency: Normal<f64>,
    temp: Normal<f64>,
    freq: Normal<f64>,
    ecc: Poisson<f64>,
    pcie: Poisson<f64>,
    drops: Poisson<f64>,
}

impl HostNoise {
    fn for_workload(workload: &str) -> Result<Self> {
        let (cpu, mem_bw, latency) = match workload {
            "ai_train" => (75.0, 80.0, 90.0),
            "video_transcode" => (65.0, 60.0, 70.0),
            "network_burst" => (40.0, 30.0, 50.0),
            _ => (20.0, 20.0, 30.0),
        };
        Ok(Self {
            cpu: Normal::new(cpu, 5.0)?,
            mem_bw: Normal::new(mem_bw, 8.0)?,
            latency: Normal::new(latency, 10.0)?,
            temp: Normal::new(65.0, 5.0)?,
            freq: Normal::new(2.8, 0.2)?,
            ecc: Poisson::new(1.0)?,
            pcie: Poisson::new(0.2)?,
            drops: Poisson::new(5.0)?,
        })
    }
}

/// Generate one sample per second per host. Each host runs one workload and
/// may suffer one failure lasting 60-180 s, logged once per failing second.
pub fn simulate_fleet(config: &SimulationConfig) -> Result<SimulatedFleet> {
    let mut rng = StdRng::seed_from_u64(config.seed);
    let duration = config.duration_sec;

    let mut profiles = Vec::with_capacity(config.hosts);
    let mut counters = Vec::with_capacity(config.hosts * duration as usize);
    let mut logs = Vec::new();

    for h in 0..config.hosts {
        let host = format!("host_{h:02}");
        let workload = *WORKLOADS.choose(&mut rng).unwrap_or(&"idle");
        let noise = HostNoise::for_workload(workload)?;

        let failure = if rng.gen_range(0..=FailureKind::ALL.len()) < FailureKind::ALL.len() {
            let kind = FailureKind::ALL[rng.gen_range(0..FailureKind::ALL.len())];
            let lo = duration / 6;
            let start = rng.gen_range(lo..=(duration * 2 / 3).max(lo));
            let end = start + rng.gen_range(60..=180);
            Some((kind, start, end))
        } else {
            None
        };

        for i in 0..duration {
            let ts = config.start + Duration::seconds(i64::from(i));
            let cpu = noise.cpu.sample(&mut rng).clamp(0.0, 100.0);
            let mem_bw = noise.mem_bw.sample(&mut rng).clamp(0.0, 100.0);
            let mut latency = noise.latency.sample(&mut rng).clamp(0.0, 200.0);
            let mut ecc = noise.ecc.sample(&mut rng);
            let mut pcie = noise.pcie.sample(&mut rng);
            let mut drops = noise.drops.sample(&mut rng);
            let mut temp = noise.temp.sample(&mut rng).clamp(40.0, 100.0);
            let mut freq = noise.freq.sample(&mut rng).clamp(1.0, 3.5);

            if let Some((kind, start, end)) = failure {
                if (start..=end).contains(&i) {
                    match kind {
                        FailureKind::DramEcc => {
                            ecc += f64::from(rng.gen_range(10..=30u32));
                            latency += f64::from(rng.gen_range(20..=50u32));
                        }
                        FailureKind::PcieAer => pcie += f64::from(rng.gen_range(5..=15u32)),
                        FailureKind::Thermal => {
                            temp += f64::from(rng.gen_range(10..=20u32));
                            freq -= rng.gen_range(0.5..1.0);
                        }
                        FailureKind::NetworkCongestion => {
                            drops += f64::from(rng.gen_range(50..=150u32))
                        }
                    }
                    logs.push(LogEvent {
                        timestamp: ts,
                        host: host.clone(),
                        event: kind.event().to_string(),
                        severity: "WARN".to_string(),
                    });
                }
            }

            counters.push(
                CounterSample::new(ts, host.clone())
                    .with_workload(workload)
                    .with_metric(Metric::CpuUtil, cpu)
                    .with_metric(Metric::MemBw, mem_bw)
                    .with_metric(Metric::MemLatencyP99, latency)
                    .with_metric(Metric::EccCe, ecc)
                    .with_metric(Metric::PcieAer, pcie)
                    .with_metric(Metric::NetDrops, drops)
                    .with_metric(Metric::TempC, temp)
                    .with_metric(Metric::FreqGhz, freq),
            );
        }

        profiles.push(HostProfile {
            host,
            workload,
            failure,
        });
    }

    info!(
        hosts = config.hosts,
        samples = counters.len(),
        logs = logs.len(),
        seed = config.seed,
        "simulated fleet"
    );
    Ok(SimulatedFleet {
        profiles,
        counters,
        logs,
    })
}

/// Write `counters.csv` and `logs.jsonl` into `dir`.
pub fn write_fleet(dir: &Path, fleet: &SimulatedFleet) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;

    let counters_path = dir.join(COUNTERS_FILE);
    let mut writer = csv::Writer::from_path(&counters_path)
        .with_context(|| format!("failed to create {}", counters_path.display()))?;
    let mut header = vec!["timestamp", "host", "workload"];
    header.extend(Metric::ALL.iter().map(|m| m.as_str()));
    writer.write_record(&header)?;
    for s in &fleet.counters {
        let mut record = vec![
            s.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
            s.host.clone(),
            s.workload.clone().unwrap_or_default(),
        ];
        record.extend(
            Metric::ALL
                .iter()
                .map(|m| s.value(*m).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&record)?;
    }
    writer.flush()?;

    let logs_path = dir.join(LOGS_FILE);
    let mut file = std::io::BufWriter::new(
        std::fs::File::create(&logs_path)
            .with_context(|| format!("failed to create {}", logs_path.display()))?,
    );
    for event in &fleet.logs {
        serde_json::to_writer(&mut file, event)?;
        file.write_all(b"\n")?;
    }
    file.flush()?;

    info!(dir = %dir.display(), "fleet telemetry written");
    Ok(())
}
