//! End-to-end write -> read round trips across the shapes spec.md calls
//! out explicitly: every supported version, signed and unsigned, augmented
//! module-image overlays, and a bootstrap-only artifact.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::io::Write as _;

use artifact_format::compressor::Registry as CompressorRegistry;
use artifact_format::handlers::{AugmentOverlay, BootstrapArtifact, Handler, HandlerRegistry, ModuleImage, RootfsV1, RootfsV2, RootfsV3};
use artifact_format::metadata::StringOrList;
use artifact_format::reader::{self, read_artifact, ReadArtifactOptions};
use artifact_format::signer::pki::PkiSigner;
use artifact_format::writer::{write_artifact, WriteArtifactArgs};

fn payload_file(contents: &[u8]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp payload file");
    file.write_all(contents).expect("write temp payload contents");
    file.flush().expect("flush temp payload file");
    file
}

fn base_args<'a>(version: u32, updates: Vec<Box<dyn Handler>>, compressor: &'a dyn artifact_format::compressor::Codec) -> WriteArtifactArgs<'a> {
    WriteArtifactArgs {
        version,
        name: "release-1.0.0".to_string(),
        artifact_group: None,
        devices: vec!["qemux86-64".to_string()],
        depends_artifact_name: None,
        depends_artifact_group: None,
        bootstrap: false,
        updates,
        scripts: Vec::new(),
        compressor,
        signer: None,
        progress: None,
        warn_size: None,
        max_size: None,
    }
}

#[test]
fn v1_round_trip() {
    let payload = payload_file(b"rootfs v1 contents");
    let handler: Box<dyn Handler> = Box::new(RootfsV1::new(payload.path()).unwrap());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").unwrap();
    let args = base_args(1, vec![handler], compressor);

    let mut buf = Vec::new();
    let written = write_artifact(&mut buf, args).unwrap();
    assert_eq!(written.version, 1);

    let reader = read_artifact(Cursor::new(buf), ReadArtifactOptions::default()).unwrap();
    assert_eq!(reader.header().artifact_name, "release-1.0.0");
    assert_eq!(reader.handlers().len(), 1);
    assert_eq!(reader.handlers()[0].update_type().as_deref(), Some("rootfs-image"));
}

#[test]
fn v2_round_trip_verifies_every_checksum() {
    let payload = payload_file(b"rootfs v2 contents");
    let handler: Box<dyn Handler> = Box::new(RootfsV2::new(payload.path()).unwrap());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("gzip").unwrap();
    let args = base_args(2, vec![handler], compressor);

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let mut reader = read_artifact(Cursor::new(buf), ReadArtifactOptions::default()).unwrap();
    reader.install_payloads().unwrap();
}

#[test]
fn v3_round_trip_with_zstd_exposes_checksum_provide() {
    let payload = payload_file(b"rootfs v3 contents");
    let handler: Box<dyn Handler> = Box::new(RootfsV3::new(payload.path()).unwrap());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("zstd").unwrap();
    let args = base_args(3, vec![handler], compressor);

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let mut reader = read_artifact(Cursor::new(buf), ReadArtifactOptions::default()).unwrap();
    let provides = reader.handlers()[0].get_provides();
    assert!(provides.contains_key("rootfs-image.checksum"));
    reader.install_payloads().unwrap();
}

#[test]
fn v3_signed_artifact_round_trips_with_matching_key() {
    let rsa_key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let pem = {
        use rsa::pkcs8::EncodePrivateKey;
        rsa_key.to_pkcs8_pem(Default::default()).unwrap()
    };
    let signer = PkiSigner::from_private_key_pem(&pem).unwrap();

    let payload = payload_file(b"signed rootfs v3");
    let handler: Box<dyn Handler> = Box::new(RootfsV3::new(payload.path()).unwrap());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").unwrap();
    let mut args = base_args(3, vec![handler], compressor);
    args.signer = Some(&signer);

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let options = ReadArtifactOptions { verify_signature: Some(&signer), ..ReadArtifactOptions::default() };
    let mut reader = read_artifact(Cursor::new(buf), options).unwrap();
    reader.install_payloads().unwrap();
}

#[test]
fn v3_signed_artifact_rejects_when_opened_without_a_verifier() {
    let rsa_key = rsa::RsaPrivateKey::new(&mut rand::rngs::OsRng, 2048).unwrap();
    let pem = {
        use rsa::pkcs8::EncodePrivateKey;
        rsa_key.to_pkcs8_pem(Default::default()).unwrap()
    };
    let signer = PkiSigner::from_private_key_pem(&pem).unwrap();

    let payload = payload_file(b"signed rootfs v3");
    let handler: Box<dyn Handler> = Box::new(RootfsV3::new(payload.path()).unwrap());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").unwrap();
    let mut args = base_args(3, vec![handler], compressor);
    args.signer = Some(&signer);

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let err = read_artifact(Cursor::new(buf), ReadArtifactOptions::default()).unwrap_err();
    assert!(matches!(err, reader::Error::SignedButNoKey));
}

#[test]
fn bootstrap_only_artifact_round_trips_with_no_data_entries() {
    let handler: Box<dyn Handler> = Box::new(BootstrapArtifact::default());

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").unwrap();
    let mut args = base_args(3, vec![handler], compressor);
    args.devices = Vec::new();
    args.bootstrap = true;

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let mut reader = read_artifact(Cursor::new(buf), ReadArtifactOptions::default()).unwrap();
    assert_eq!(reader.handlers()[0].update_type(), None);
    reader.install_payloads().unwrap();
}

#[test]
fn module_image_augment_overlay_merges_provides_on_read() {
    let payload = payload_file(b"module image payload");
    let mut provides = BTreeMap::new();
    provides.insert("rootfs-image.checksum".to_string(), StringOrList::One("deadbeef".to_string()));

    let augment = AugmentOverlay {
        type_override: None,
        artifact_provides: Some({
            let mut m = BTreeMap::new();
            m.insert("data-partition.version".to_string(), StringOrList::One("2".to_string()));
            m
        }),
        artifact_depends: None,
        meta_data: None,
    };

    let handler: Box<dyn Handler> = Box::new(
        ModuleImage::new("rootfs-image.custom", vec![payload.path().to_path_buf()])
            .unwrap()
            .with_provides(provides)
            .with_augment(augment),
    );

    let registry = CompressorRegistry::with_defaults();
    let compressor = registry.by_id("none").unwrap();
    let args = base_args(3, vec![handler], compressor);

    let mut buf = Vec::new();
    write_artifact(&mut buf, args).unwrap();

    let mut read_registry = HandlerRegistry::new();
    read_registry
        .register("rootfs-image.custom", || Box::new(ModuleImage::new("rootfs-image.custom", Vec::new()).unwrap()) as Box<dyn Handler>)
        .unwrap();
    let options = ReadArtifactOptions { registry: Some(read_registry), ..ReadArtifactOptions::default() };

    let mut reader = read_artifact(Cursor::new(buf), options).unwrap();
    let provides = reader.handlers()[0].get_provides();
    assert!(provides.contains_key("rootfs-image.checksum"));
    assert!(provides.contains_key("data-partition.version"));
    reader.install_payloads().unwrap();
}
