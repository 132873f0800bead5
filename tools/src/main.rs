//! draw-runner: headless driver for gacha packet draws.
//!
//! Usage:
//!   draw-runner --data-dir ./data --packet daily_basic --report
//!   draw-runner --data-dir ./data --packet daily_basic --draws 100000 --seed 42
//!   draw-runner --data-dir ./data --db gacha.db --ipc-mode

use anyhow::Result;
use gacha_core::{
    config::{GachaConfig, ItemPayload, PacketConfig},
    ledger::Candidate,
    purchase::{MailboxSink, PurchaseService},
    report::{distribution_report, DistributionReport},
    rng::{EntropySource, RandomSource, SeededSource},
    selector::select,
    store::GachaStore,
};
use std::collections::BTreeMap;
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Report {
        packet_id: String,
    },
    Draw {
        packet_id: String,
        count: u64,
    },
    Grant {
        player_id: String,
        currency: String,
        amount: i64,
    },
    Purchase {
        player_id: String,
        packet_id: String,
        quantity: u32,
    },
    Mailbox {
        player_id: String,
    },
    Quit,
}

#[derive(serde::Serialize)]
struct DrawSummary {
    packet_id: String,
    draws: u64,
    failed: u64,
    random_source: String,
    items: Vec<ItemFrequency>,
}

#[derive(serde::Serialize)]
struct ItemFrequency {
    item_id: String,
    configured_percent: String,
    hits: u64,
    observed_percent: f64,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let draws = parse_arg(&args, "--draws", 0u64);
    let seed = args
        .windows(2)
        .find(|w| w[0] == "--seed")
        .and_then(|w| w[1].parse::<u64>().ok());
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let report = args.iter().any(|a| a == "--report") || draws == 0;
    let data_dir = str_arg(&args, "--data-dir").unwrap_or("./data");
    let db = str_arg(&args, "--db").unwrap_or(":memory:");
    let packet_id = str_arg(&args, "--packet");

    let config = GachaConfig::load(data_dir)?;

    if ipc_mode {
        let store = GachaStore::open(db)?;
        store.migrate()?;
        for packet in &config.packets {
            store.upsert_packet(packet)?;
        }
        return run_ipc_loop(&config, &store, seed);
    }

    let packets: Vec<&PacketConfig> = match packet_id {
        Some(id) => vec![config
            .packet(id)
            .ok_or_else(|| anyhow::anyhow!("unknown packet {id}"))?],
        None => config.packets.iter().collect(),
    };

    println!("draw-runner {}", chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!("  data_dir:  {data_dir}");
    println!();

    for packet in packets {
        if report {
            print_report(packet, &build_report(&config, packet));
        }
        if draws > 0 {
            let mut rng = make_rng(seed);
            let summary = simulate(&config, packet, draws, rng.as_mut())?;
            print_summary(&summary);
        }
    }
    Ok(())
}

fn run_ipc_loop(config: &GachaConfig, store: &GachaStore, seed: Option<u64>) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();
    let mut rng = make_rng(seed);
    let service = PurchaseService::new(store, &config.validation)?;

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string(), "status": 400 });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let response = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Report { packet_id } => {
                let candidates = store.active_candidates(&packet_id)?;
                let report = distribution_report(&candidates, &config.rarity_guidelines, rarity);
                serde_json::to_value(report)?
            }
            IpcCommand::Draw { packet_id, count } => {
                let candidates = store.active_candidates(&packet_id)?;
                let summary =
                    tally(&packet_id, &candidates, config, count, rng.as_mut())?;
                serde_json::to_value(summary)?
            }
            IpcCommand::Grant {
                player_id,
                currency,
                amount,
            } => {
                store.credit(&player_id, &currency, amount)?;
                serde_json::json!({ "balance": store.balance(&player_id, &currency)? })
            }
            IpcCommand::Purchase {
                player_id,
                packet_id,
                quantity,
            } => {
                let mut sink = MailboxSink::new(store);
                match service.purchase(&player_id, &packet_id, quantity, rng.as_mut(), &mut sink) {
                    Ok(receipt) => serde_json::to_value(receipt)?,
                    Err(e) => {
                        log::warn!("purchase by {player_id} failed: {e}");
                        serde_json::json!({ "error": e.to_string(), "status": e.http_status() })
                    }
                }
            }
            IpcCommand::Mailbox { player_id } => serde_json::to_value(store.mailbox_for(&player_id)?)?,
        };
        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
    Ok(())
}

fn rarity(payload: &ItemPayload) -> Option<&str> {
    payload.rarity.as_deref()
}

fn build_report(config: &GachaConfig, packet: &PacketConfig) -> DistributionReport {
    let candidates = packet.active_candidates();
    distribution_report(&candidates, &config.rarity_guidelines, rarity)
}

fn simulate(
    config: &GachaConfig,
    packet: &PacketConfig,
    draws: u64,
    rng: &mut dyn RandomSource,
) -> Result<DrawSummary> {
    let candidates = packet.active_candidates();
    tally(&packet.packet_id, &candidates, config, draws, rng)
}

fn tally(
    packet_id: &str,
    candidates: &[Candidate<ItemPayload>],
    config: &GachaConfig,
    draws: u64,
    rng: &mut dyn RandomSource,
) -> Result<DrawSummary> {
    let options = config.validation.to_options()?;
    let mut hits: BTreeMap<usize, u64> = BTreeMap::new();
    let mut failed = 0;

    for _ in 0..draws {
        let result = select(candidates, &options, rng);
        match result.selected_index {
            Some(index) => *hits.entry(index).or_default() += 1,
            None => {
                if failed == 0 {
                    if let Some(failure) = &result.diagnostics.failure {
                        log::error!("{packet_id}: draw failed: {}", failure.message());
                    }
                }
                failed += 1;
            }
        }
    }

    let items = candidates
        .iter()
        .enumerate()
        .map(|(index, candidate)| {
            let count = hits.get(&index).copied().unwrap_or(0);
            ItemFrequency {
                item_id: candidate.id.clone(),
                configured_percent: candidate.probability_text.clone(),
                hits: count,
                observed_percent: if draws == 0 {
                    0.0
                } else {
                    count as f64 * 100.0 / draws as f64
                },
            }
        })
        .collect();

    Ok(DrawSummary {
        packet_id: packet_id.into(),
        draws,
        failed,
        random_source: rng.kind().as_str().into(),
        items,
    })
}

fn print_report(packet: &PacketConfig, report: &DistributionReport) {
    println!("=== {} ({}) ===", packet.label, packet.packet_id);
    println!("  candidates:     {}", report.total_count);
    println!("  stated total:   {:.7}%", report.total_percent);
    println!("  balanced:       {}", report.balanced);
    for stats in &report.rarities {
        println!(
            "  {:<12} {:>3} items  total {:>10.4}%  avg {:>9.4}%",
            stats.rarity, stats.count, stats.total_percent, stats.average_percent
        );
    }
    for warning in &report.warnings {
        println!("  WARN  {warning}");
    }
    for rec in &report.recommendations {
        println!("  TUNE  {rec}");
    }
    println!();
}

fn print_summary(summary: &DrawSummary) {
    println!(
        "--- {} draws ({}), {} failed ---",
        summary.draws, summary.random_source, summary.failed
    );
    for item in &summary.items {
        println!(
            "  {:<16} configured {:>12}%  observed {:>8.4}%  ({} hits)",
            item.item_id, item.configured_percent, item.observed_percent, item.hits
        );
    }
    println!();
}

fn make_rng(seed: Option<u64>) -> Box<dyn RandomSource> {
    match seed {
        Some(seed) => Box::new(SeededSource::new(seed, 0)),
        None => Box::new(EntropySource::new()),
    }
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn str_arg<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2)
        .find(|w| w[0] == flag)
        .map(|w| w[1].as_str())
}
