//! tsae: run and inspect timestamped anti-entropy replicas
//!
//! Usage:
//!   tsae simulate --replicas 4 --ops 50 --rounds 20
//!   tsae inspect message.cbor
//!   tsae check-config replica.json

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use tsae::{
    exchange, OpKind, Replica, ReplicaConfig, ReplicaId, Sequencing, SyncMessage, TsaeError,
};

#[derive(Parser)]
#[command(name = "tsae", about = "Timestamped anti-entropy replication tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run in-process replicas and gossip until they converge
    Simulate {
        /// Number of replicas
        #[arg(long, default_value_t = 3)]
        replicas: usize,

        /// Operations generated by each replica
        #[arg(long, default_value_t = 20)]
        ops: usize,

        /// Pairwise anti-entropy exchanges to run
        #[arg(long, default_value_t = 10)]
        rounds: usize,

        /// RNG seed for peer selection
        #[arg(long)]
        seed: Option<u64>,

        /// Reject sequence gaps instead of tolerating them
        #[arg(long)]
        contiguous: bool,
    },
    /// Decode a CBOR or JSON sync message and print it as JSON
    Inspect { file: PathBuf },
    /// Load and validate a replica config file
    CheckConfig { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate {
            replicas,
            ops,
            rounds,
            seed,
            contiguous,
        } => simulate(replicas, ops, rounds, seed, contiguous).await,
        Command::Inspect { file } => inspect(&file),
        Command::CheckConfig { file } => check_config(&file),
    }
}

async fn simulate(
    count: usize,
    ops: usize,
    rounds: usize,
    seed: Option<u64>,
    contiguous: bool,
) -> Result<()> {
    if count < 2 {
        bail!("need at least two replicas to gossip, got {}", count);
    }

    let sequencing = if contiguous {
        Sequencing::Contiguous
    } else {
        Sequencing::Lax
    };
    let participants: Vec<ReplicaId> = (0..count).map(|i| format!("replica-{}", i)).collect();

    let mut replicas = Vec::with_capacity(count);
    for id in &participants {
        let config = ReplicaConfig::new(id.clone(), participants.clone()).with_sequencing(sequencing);
        replicas.push(Arc::new(Replica::new(&config)?));
    }

    // Every replica issues its local operations concurrently; generation
    // takes blocking locks, so it runs on the blocking pool
    let mut handles = Vec::with_capacity(count);
    for replica in &replicas {
        let replica = Arc::clone(replica);
        handles.push(tokio::task::spawn_blocking(move || -> Result<(), TsaeError> {
            for n in 0..ops {
                let key = format!("{}/key-{}", replica.id(), n % 8);
                if n % 5 == 4 {
                    replica.generate(OpKind::remove(key))?;
                } else {
                    replica.generate(OpKind::put(key, n.to_string()))?;
                }
            }
            Ok(())
        }));
    }
    for handle in handles {
        handle.await.context("operation generator panicked")??;
    }

    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    for round in 0..rounds {
        let i = rng.gen_range(0..count);
        let mut j = rng.gen_range(0..count - 1);
        if j >= i {
            j += 1;
        }
        let (to_a, to_b) = exchange(&replicas[i], &replicas[j])?;
        log::info!(
            "round {}: {} <-> {} ({} / {} new operations)",
            round,
            replicas[i].id(),
            replicas[j].id(),
            to_a,
            to_b
        );
    }

    let mut digests = Vec::with_capacity(count);
    for replica in &replicas {
        let digest = replica.log().digest()?;
        println!("{} ({} operations, digest {})", replica.id(), replica.log().len(), &digest[..16]);
        print!("{}", replica.summary());
        if let Some(stable) = replica.ack().min_timestamp_vector() {
            println!("  acknowledged by all: {:?}", stable.snapshot());
        }
        digests.push(digest);
    }

    let converged = digests.windows(2).all(|w| w[0] == w[1]);
    println!(
        "{}",
        if converged {
            "all replicas converged"
        } else {
            "replicas have not converged yet"
        }
    );
    Ok(())
}

fn inspect(file: &Path) -> Result<()> {
    let data = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;

    let msg = match SyncMessage::from_cbor(&data) {
        Ok(msg) => msg,
        Err(_) => {
            let text = std::str::from_utf8(&data).context("message is neither CBOR nor UTF-8")?;
            SyncMessage::from_json(text).context("message is neither CBOR nor JSON")?
        }
    };

    println!("{}", msg.to_json()?);
    Ok(())
}

fn check_config(file: &Path) -> Result<()> {
    let config = ReplicaConfig::load(file).with_context(|| format!("loading {}", file.display()))?;
    println!(
        "{}: {} participants, sequencing {:?}",
        config.local_id,
        config.participants.len(),
        config.sequencing
    );
    Ok(())
}
