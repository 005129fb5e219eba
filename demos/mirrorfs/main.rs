//! `mirrorfs`: a small CLI that wires a [`vfs_core::FileService`] up with an
//! in-memory provider plus one or more disk-backed mirrors, so the service
//! can be exercised against a real filesystem (spec §10.3/§10.4).
//!
//! Grounded on the teacher's example-binary shape (`examples/shadow_fs/main.rs`:
//! a `#[tokio::main]` entry point that builds one provider rooted at a
//! directory) and the `clap::Parser` derive idiom shown across the pack
//! (e.g. `cberner-fuser/examples/hello.rs`).

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Deserialize;
use tracing::info;

use vfs_core::{FileService, ReadOptions, Resource, WriteData, WriteOptions};

mod disk_provider;

use disk_provider::DiskFsProvider;

/// Mount table loaded from an optional `mirrorfs.toml` (spec §10.3): each
/// entry binds a scheme to a directory this process mirrors.
#[derive(Debug, Deserialize, Default)]
struct MirrorConfig {
    #[serde(default)]
    mounts: Vec<MountEntry>,
}

#[derive(Debug, Deserialize)]
struct MountEntry {
    scheme: String,
    root: PathBuf,
}

#[derive(Parser, Debug)]
#[command(version, about = "Mirror one or more directories behind a vfs-core FileService")]
struct Args {
    /// Path to a TOML config naming `[[mounts]]`; if omitted, a single
    /// `disk` mount rooted at `--root` is used.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Root directory for the default `disk` mount, used when `--config`
    /// is not supplied.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Relative path (under the `disk` mount) of a file to write, then read
    /// back, to demonstrate the service end to end.
    #[arg(long, default_value = "mirrorfs-smoke-test.txt")]
    touch: String,
}

fn load_config(args: &Args) -> MirrorConfig {
    match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .unwrap_or_else(|err| panic!("failed to read {path:?}: {err}"));
            toml::from_str(&raw).unwrap_or_else(|err| panic!("invalid config {path:?}: {err}"))
        }
        None => MirrorConfig { mounts: vec![MountEntry { scheme: "disk".to_string(), root: args.root.clone() }] },
    }
}

#[tokio::main]
async fn main() {
    #[cfg(feature = "cli")]
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args);

    let service = FileService::new();
    for mount in &config.mounts {
        let provider = DiskFsProvider::new(mount.scheme.clone(), mount.root.clone())
            .unwrap_or_else(|err| panic!("cannot root a provider at {:?}: {err}", mount.root));
        info!(scheme = %mount.scheme, root = ?provider.root_path(), "mounting provider");
        service
            .register_provider(mount.scheme.clone(), Arc::new(provider))
            .await
            .unwrap_or_else(|err| panic!("failed to register {}: {err}", mount.scheme));
    }

    let Some(first_scheme) = config.mounts.first().map(|m| m.scheme.clone()) else {
        eprintln!("no mounts configured");
        return;
    };

    let resource: Resource = format!("{first_scheme}:///{}", args.touch).parse().expect("valid resource");
    let stat = service
        .write_file(&resource, WriteData::Bytes(b"mirrorfs smoke test\n".to_vec()), &WriteOptions { create: true, overwrite: true, ..Default::default() })
        .await
        .unwrap_or_else(|err| panic!("write_file failed: {err}"));
    info!(size = stat.size, "wrote smoke-test file");

    let (_, data) = service.read_file(&resource, &ReadOptions::default()).await.unwrap_or_else(|err| panic!("read_file failed: {err}"));
    println!("{}", String::from_utf8_lossy(&data));

    service.dispose().await;
}
