//! Command-line surface for the procmem binary

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use procmem::config::{self, Config, ConfigLoader};
use procmem::{
    enumerate_processes, Address, AttachOptions, ByteOrder, ModuleScope, Platform,
    ProcessAttacher, Session, ValueType,
};
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Inspect the memory of a running process
#[derive(Debug, Parser)]
#[command(name = "procmem", version, about)]
pub struct Cli {
    /// Attach by process id
    #[arg(long, global = true, conflicts_with = "name")]
    pub pid: Option<u32>,

    /// Attach to the first process whose image file name matches
    #[arg(long, global = true)]
    pub name: Option<String>,

    /// Configuration file (defaults to ./procmem.toml when present)
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List running process ids
    Processes,
    /// List modules loaded in the target
    Modules {
        /// Only the main executable image
        #[arg(long)]
        main: bool,
    },
    /// List the named exports of a loaded module
    Exports {
        /// Module file name, e.g. kernel32.dll
        module: String,
        /// Only exports whose name contains this substring
        #[arg(long)]
        filter: Option<String>,
    },
    /// Read a value, optionally through a pointer chain
    Read {
        /// Start address (hex with 0x prefix, or decimal)
        address: Address,
        /// Scalar type to decode
        #[arg(long = "type", default_value = "u32")]
        value_type: ValueType,
        /// Treat target memory as opposite-endian
        #[arg(long)]
        swap: bool,
        /// Pointer-chain offset, repeatable
        #[arg(long = "offset", allow_hyphen_values = true, value_parser = parse_offset)]
        offsets: Vec<i64>,
        /// Dump this many raw bytes instead of decoding a value
        #[arg(long)]
        bytes: Option<usize>,
    },
    /// Report whether the target is still running
    Alive,
}

/// Parses a signed offset such as `0x10`, `-0x8` or `24`
pub fn parse_offset(s: &str) -> Result<i64, String> {
    let (negative, digits) = match s.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, s),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16),
        None => digits.parse::<i64>(),
    }
    .map_err(|err| format!("invalid offset {:?}: {}", s, err))?;
    Ok(if negative { -magnitude } else { magnitude })
}

/// Loads and validates configuration for this invocation
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => ConfigLoader::new(path)
            .load()
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => config::load_config().context("failed to load default configuration")?,
    };
    config::validate_config(&config)?;
    Ok(config)
}

fn attach<P: Platform>(platform: P, cli: &Cli, options: AttachOptions) -> Result<Session<P>> {
    let attacher = ProcessAttacher::new(platform).with_options(options);
    let session = match (cli.pid, cli.name.as_deref()) {
        (Some(pid), _) => attacher.attach(pid)?,
        (None, Some(name)) => attacher.attach_by_name(name)?,
        (None, None) => bail!("this command needs --pid or --name"),
    };
    debug!(pid = session.pid(), "attached");
    Ok(session)
}

/// Runs one command against `platform`, writing JSON to `out`
pub fn run<P: Platform, W: Write>(platform: P, cli: &Cli, config: &Config, out: &mut W) -> Result<()> {
    let options = AttachOptions::from(config);

    if let Command::Processes = cli.command {
        let pids = enumerate_processes(&platform, &options.enumeration)?;
        serde_json::to_writer_pretty(&mut *out, &pids)?;
        writeln!(out)?;
        return Ok(());
    }

    let session = attach(platform, cli, options)?;
    let output = match &cli.command {
        Command::Processes => unreachable!("handled before attaching"),
        Command::Modules { main } => {
            let scope = if *main {
                ModuleScope::MainOnly
            } else {
                ModuleScope::All
            };
            let modules: Vec<_> = session.modules(scope)?.collect();
            serde_json::to_value(modules)?
        }
        Command::Exports { module, filter } => {
            let module = session.find_module(module)?;
            let symbols: Vec<_> = session
                .exports(&module)?
                .filter(|symbol| {
                    filter
                        .as_deref()
                        .map_or(true, |needle| symbol.name.contains(needle))
                })
                .collect();
            json!({ "module": module.name, "base": module.base_address, "exports": symbols })
        }
        Command::Read {
            address,
            value_type,
            swap,
            offsets,
            bytes,
        } => {
            let target = match (offsets.is_empty(), *swap) {
                (true, _) => *address,
                (false, false) => session.resolve_pointer(*address, offsets)?,
                (false, true) => session.resolve_pointer_swapped(*address, offsets)?,
            };
            let module = session
                .modules(ModuleScope::All)?
                .find(|module| module.contains_address(target))
                .map(|module| module.name);
            match bytes {
                Some(len) => {
                    let data = session.read_bytes(target, *len)?;
                    json!({ "address": target.to_string(), "module": module, "hex": hex::encode(data) })
                }
                None => {
                    let order = if *swap {
                        ByteOrder::Swapped
                    } else {
                        ByteOrder::Native
                    };
                    let value = session.read_value(target, *value_type, order)?;
                    json!({ "address": target.to_string(), "module": module, "value": value })
                }
            }
        }
        Command::Alive => json!({ "pid": session.pid(), "alive": session.is_alive()? }),
    };

    serde_json::to_writer_pretty(&mut *out, &output)?;
    writeln!(out)?;
    Ok(())
}
