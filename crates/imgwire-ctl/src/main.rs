//! imgwire-ctl — push and pull raw voxel images from the command line.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

use imgwire_core::{Backend, TransferConfig, VoxelType};

mod cmd;

use cmd::raw::{parse_dims, RawSpec};

// ── Arguments ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct Options {
    timeout: Option<u64>,
    dims: Option<String>,
    voxel_type: Option<String>,
    planar: bool,
    name: Option<String>,
    out: Option<PathBuf>,
    positional: Vec<String>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self> {
        let mut opts = Options::default();
        let mut i = 0;
        while i < args.len() {
            let arg = args[i].as_str();
            let mut value = |what: &str| -> Result<String> {
                i += 1;
                args.get(i)
                    .cloned()
                    .with_context(|| format!("{what} requires a value"))
            };
            match arg {
                "--timeout" => {
                    opts.timeout = Some(
                        value("--timeout")?
                            .parse()
                            .context("--timeout must be a number of seconds")?,
                    )
                }
                "--dims" => opts.dims = Some(value("--dims")?),
                "--type" => opts.voxel_type = Some(value("--type")?),
                "--name" => opts.name = Some(value("--name")?),
                "--out" => opts.out = Some(PathBuf::from(value("--out")?)),
                "--planar" => opts.planar = true,
                flag if flag.starts_with("--") => bail!("unknown option {flag}"),
                _ => opts.positional.push(arg.to_string()),
            }
            i += 1;
        }
        Ok(opts)
    }

    fn raw_spec(&self) -> Result<RawSpec> {
        let dims = parse_dims(self.dims.as_deref().context("--dims is required")?)?;
        let voxel_type = VoxelType::from_name(self.voxel_type.as_deref().context("--type is required")?)?;
        Ok(RawSpec {
            dims,
            voxel_type,
            backend: if self.planar { Backend::Planar } else { Backend::Contiguous },
        })
    }

    fn out_dir(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    fn config(&self) -> TransferConfig {
        let config = TransferConfig::load().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "failed to load config, using defaults");
            TransferConfig::default()
        });
        match self.timeout {
            Some(secs) => config.with_timeouts(secs, secs),
            None => config,
        }
    }
}

fn parse_port(text: &str) -> Result<u16> {
    text.parse().with_context(|| format!("'{text}' is not a port number"))
}

fn files(paths: &[&str]) -> Vec<PathBuf> {
    paths.iter().map(PathBuf::from).collect()
}

fn print_usage() {
    println!("Usage: imgwire-ctl [--timeout <secs>] <command>");
    println!();
    println!("Commands:");
    println!("  send <addr> <file.raw>...    Push raw images to a receiver");
    println!("  serve <port> <file.raw>...   Offer raw images to a requester");
    println!("  receive <port>               Wait for pushed images");
    println!("  request <addr>               Pull images from a server");
    println!("  pack <file> <file.raw>...    Write raw images into one image stream file");
    println!("  unpack <file>                Extract every image of a stream file");
    println!("  config                       Write the default config file if missing");
    println!();
    println!("Options:");
    println!("  --dims AxBxC     Shape of the raw input files (send, serve, pack)");
    println!("  --type <voxel>   int8, uint8, int16, uint16, float32, float64");
    println!("  --planar         Transfer as one plane per slice");
    println!("  --name <name>    Image name (single input file only)");
    println!("  --out <dir>      Where received or unpacked images go (default: .)");
    println!("  --timeout <secs> Handshake and continuation timeout");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = Options::parse(&args)?;
    let positional: Vec<&str> = opts.positional.iter().map(String::as_str).collect();

    match positional.as_slice() {
        ["send", addr, paths @ ..] => {
            cmd::send::cmd_send(
                addr,
                &files(paths),
                &opts.raw_spec()?,
                opts.name.as_deref(),
                opts.config(),
            )
            .await
        }
        ["serve", port, paths @ ..] => {
            cmd::send::cmd_serve(
                parse_port(port)?,
                &files(paths),
                &opts.raw_spec()?,
                opts.name.as_deref(),
                opts.config(),
            )
            .await
        }
        ["receive", port] => {
            cmd::receive::cmd_receive(parse_port(port)?, &opts.out_dir(), opts.config()).await
        }
        ["request", addr] => cmd::receive::cmd_request(addr, &opts.out_dir(), opts.config()).await,
        ["pack", target, paths @ ..] => {
            cmd::stream::cmd_pack(
                &PathBuf::from(target),
                &files(paths),
                &opts.raw_spec()?,
                opts.name.as_deref(),
                &opts.config(),
            )
            .await
        }
        ["unpack", source] => {
            cmd::stream::cmd_unpack(&PathBuf::from(source), &opts.out_dir(), &opts.config()).await
        }
        ["config"] => {
            let path = TransferConfig::write_default_if_missing(&TransferConfig::file_path())
                .context("failed to write default config")?;
            println!("{}", path.display());
            Ok(())
        }
        ["help"] | [] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            print_usage();
            std::process::exit(1);
        }
    }
}
