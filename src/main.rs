#![cfg(feature = "cli")]
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};

use rseticket::keys::KeySet;
use rseticket::patch::{patch_ticket_with, KeyGenerationPolicy};
use rseticket::ticket::{resolve_body_offset, SignatureType, TicketRecord};
use rseticket::titlekey::unwrap_title_key;

#[derive(Parser)]
#[command(
    name = "rseticket",
    version,
    about = "Inspect console eTickets, recover title keys, patch to common tickets"
)]
struct Cli {
    #[arg(short = 'd', long = "debug", action = ArgAction::SetTrue)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the parsed record of one or more ticket files.
    Inspect {
        #[arg(required = true)]
        tickets: Vec<PathBuf>,
    },
    /// Recover title keys from ticket files.
    ///
    /// Prints one `rights_id=title_key` line per ticket. Personalized
    /// tickets additionally need the console's device key record.
    TitleKey {
        /// Key file with `master_key_XX = hex` lines.
        #[arg(short = 'k', long = "keys")]
        keys: PathBuf,
        /// 0x240-byte device RSA key record (repeatable).
        #[arg(long = "device-key")]
        device_keys: Vec<PathBuf>,
        #[arg(required = true)]
        tickets: Vec<PathBuf>,
    },
    /// Rewrite tickets as durable, console-independent common tickets.
    Patch {
        /// Key file with `master_key_XX = hex` lines.
        #[arg(short = 'k', long = "keys")]
        keys: PathBuf,
        /// 0x240-byte device RSA key record (repeatable).
        #[arg(long = "device-key")]
        device_keys: Vec<PathBuf>,
        /// Re-encrypt under the newest master-key generation available.
        #[arg(long = "newest", action = ArgAction::SetTrue)]
        newest: bool,
        /// Directory for patched tickets (defaults to rewriting in place).
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
        #[arg(required = true)]
        tickets: Vec<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.debug {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::new().filter_level(level).init();

    match cli.command {
        Commands::Inspect { tickets } => for_each_ticket(&tickets, run_inspect),
        Commands::TitleKey {
            keys,
            device_keys,
            tickets,
        } => {
            let keys = load_keys(&keys, &device_keys)?;
            for_each_ticket(&tickets, |path| run_title_key(path, &keys))
        }
        Commands::Patch {
            keys,
            device_keys,
            newest,
            output,
            tickets,
        } => {
            let keys = load_keys(&keys, &device_keys)?;
            let policy = if newest {
                KeyGenerationPolicy::Newest
            } else {
                KeyGenerationPolicy::KeepRevision
            };
            for_each_ticket(&tickets, |path| {
                run_patch(path, &keys, policy, output.as_deref())
            })
        }
    }
}

/// Apply `op` to every ticket file, continuing past per-file failures.
fn for_each_ticket(
    tickets: &[PathBuf],
    op: impl Fn(&Path) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    let mut failed = 0usize;
    for path in tickets {
        if let Err(err) = op(path) {
            warn!("[-] {}: {err:#}", path.display());
            failed += 1;
        }
    }
    if failed > 0 {
        anyhow::bail!("{failed} of {} tickets failed", tickets.len());
    }
    Ok(())
}

fn load_keys(key_file: &Path, device_key_files: &[PathBuf]) -> anyhow::Result<KeySet> {
    let mut keys = KeySet::new();
    let file = fs::File::open(key_file)
        .with_context(|| format!("Failed to open key file {}", key_file.display()))?;
    keys.load(file).context("Failed to parse key file")?;

    for path in device_key_files {
        let blob = fs::read(path)
            .with_context(|| format!("Failed to read device key {}", path.display()))?;
        keys.load_device_key_blob(&blob)
            .with_context(|| format!("Failed to parse device key {}", path.display()))?;
    }
    Ok(keys)
}

fn read_record(path: &Path) -> anyhow::Result<(Vec<u8>, usize, TicketRecord)> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let offset = resolve_body_offset(&bytes)?;
    let record = TicketRecord::decode(&bytes, offset)?;
    Ok((bytes, offset, record))
}

fn run_inspect(path: &Path) -> anyhow::Result<()> {
    let (bytes, offset, record) = read_record(path)?;
    let tag = u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let signature_type = SignatureType::from_tag(tag)?;

    println!("{}:", path.display());
    println!("  signature type:      {signature_type:?} (record at {offset:#x})");
    println!("  issuer:              {}", record.issuer_str());
    println!("  rights id:           {}", record.rights_id);
    println!("  title id:            {:#018x}", record.rights_id.title_id());
    println!("  title key type:      {:?}", record.title_key_type);
    println!("  master key revision: {}", record.master_key_revision);
    println!("  ticket version:      {}", record.ticket_version);
    println!("  license type:        {}", record.license_type);
    println!("  properties:          {:#06x}", record.properties);
    println!("  temporary:           {}", record.is_temporary());
    println!("  ticket id:           {:#018x}", record.ticket_id);
    println!("  device id:           {:#018x}", record.device_id);
    println!("  account id:          {:#010x}", record.account_id);
    Ok(())
}

fn run_title_key(path: &Path, keys: &KeySet) -> anyhow::Result<()> {
    let (_, _, record) = read_record(path)?;
    let entry = unwrap_title_key(&record, keys)?;
    println!("{entry}");
    Ok(())
}

fn run_patch(
    path: &Path,
    keys: &KeySet,
    policy: KeyGenerationPolicy,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let mut bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let entry = patch_ticket_with(&mut bytes, keys, policy)?;

    let destination = match output {
        Some(dir) => {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            dir.join(format!("{}.tik", entry.rights_id))
        }
        None => path.to_path_buf(),
    };
    fs::write(&destination, &bytes)
        .with_context(|| format!("Failed to write {}", destination.display()))?;

    info!("[+] Patched {} -> {}", path.display(), destination.display());
    Ok(())
}
