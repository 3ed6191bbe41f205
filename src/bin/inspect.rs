// Thin demo binary exercising `artifact_format::reader::ArtifactReader` end
// to end: opens an Artifact, prints its header, then verifies and installs
// every payload, reporting §6.4-style exit codes on failure.

use std::fs::File;
use std::io::BufReader;
use std::process;

use artifact_format::error::exit_code;
use artifact_format::reader::{ArtifactReader, ReadArtifactOptions};

fn usage() -> ! {
    eprintln!("usage: artifact-inspect <artifact-path>");
    process::exit(1);
}

fn print_header(reader: &ArtifactReader<BufReader<File>>) {
    let header = reader.header();
    println!("artifact: {}", header.artifact_name);
    println!("format version: {}", header.info.version);
    if let Some(group) = &header.artifact_group {
        println!("group: {group}");
    }
    println!("compatible devices: {}", header.compatible_devices.join(", "));
    for (i, handler) in reader.handlers().iter().enumerate() {
        println!("payload {i:04}: type = {:?}", handler.update_type());
        for (key, value) in handler.get_provides() {
            println!("    provides {key} = {:?}", value.as_slice());
        }
    }
}

fn main() {
    env_logger::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| usage());

    let file = match File::open(&path) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("error: opening {path}: {err}");
            process::exit(7); // §6.4: 7 system error
        }
    };

    let mut reader = match ArtifactReader::open(BufReader::new(file), ReadArtifactOptions::default()) {
        Ok(r) => r,
        Err(err) => {
            log::error!("failed to open {path}: {err}");
            eprintln!("error: {err}");
            process::exit(4.max(exit_code(err.kind()))); // §6.4: 4 open failure, at least
        }
    };

    print_header(&reader);

    log::info!("verifying and installing {} payload(s)", reader.handlers().len());
    if let Err(err) = reader.install_payloads() {
        log::error!("payload verification failed: {err}");
        eprintln!("error: {err}");
        process::exit(exit_code(err.kind()));
    }

    println!("ok: all payload checksums verified");
}
