// Thin demo binary exercising `artifact_format::writer::write_artifact_to_path`
// end to end. Argument parsing is deliberately minimal (positional only) --
// a real flag-parsing CLI front end is out of scope for this crate.

use std::process;

use anyhow::{Context, Result};

use artifact_format::compressor::Registry as CompressorRegistry;
use artifact_format::error::exit_code;
use artifact_format::handlers::{Handler, RootfsV1, RootfsV2, RootfsV3};
use artifact_format::script_name::ScriptEntry;
use artifact_format::writer::{write_artifact_to_path, WriteArtifactArgs};

fn usage() -> ! {
    eprintln!("usage: artifact-write <version:1|2|3> <name> <device-type> <payload-path> <output-path>");
    process::exit(1);
}

struct Args {
    version: u32,
    name: String,
    device_type: String,
    payload_path: String,
    output_path: String,
}

fn parse_args() -> Result<Args> {
    let mut args = std::env::args().skip(1);
    let version: u32 = match args.next() {
        Some(v) => v.parse().context("version must be 1, 2, or 3")?,
        None => usage(),
    };
    Ok(Args {
        version,
        name: args.next().unwrap_or_else(|| usage()),
        device_type: args.next().unwrap_or_else(|| usage()),
        payload_path: args.next().unwrap_or_else(|| usage()),
        output_path: args.next().unwrap_or_else(|| usage()),
    })
}

fn build_handler(version: u32, payload_path: &str) -> Result<Box<dyn Handler>> {
    let handler: Box<dyn Handler> = match version {
        1 => Box::new(RootfsV1::new(payload_path).with_context(|| format!("reading payload {payload_path}"))?),
        2 => Box::new(RootfsV2::new(payload_path).with_context(|| format!("reading payload {payload_path}"))?),
        _ => Box::new(RootfsV3::new(payload_path).with_context(|| format!("reading payload {payload_path}"))?),
    };
    Ok(handler)
}

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(1); // §6.4: 1 invalid parameters
        }
    };

    log::info!("building version {} artifact {:?} for device type {:?}", args.version, args.name, args.device_type);

    let handler = match build_handler(args.version, &args.payload_path) {
        Ok(handler) => handler,
        Err(err) => {
            eprintln!("error: {err:#}");
            process::exit(7); // §6.4: 7 system error (reading the local payload file)
        }
    };

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").expect("none is always registered");

    let write_args = WriteArtifactArgs {
        version: args.version,
        name: args.name,
        artifact_group: None,
        devices: vec![args.device_type],
        depends_artifact_name: None,
        depends_artifact_group: None,
        bootstrap: false,
        updates: vec![handler],
        scripts: Vec::<ScriptEntry>::new(),
        compressor,
        signer: None,
        progress: None,
        warn_size: None,
        max_size: None,
    };

    match write_artifact_to_path(&args.output_path, write_args) {
        Ok(written) => {
            println!("wrote {} (version {}, {} bytes) to {}", written.name, written.version, written.size, args.output_path);
        }
        Err(err) => {
            log::error!("write_artifact_to_path failed: {err}");
            eprintln!("error: {err}");
            process::exit(3.max(exit_code(err.kind()))); // §6.4: 3 create failure, at least
        }
    }
}
