//! Generate a flow key pair.
//!
//! Usage: `chatflow-keygen <private-key-path>`
//!
//! Writes the PKCS#8 private key (encrypted when
//! `FLOW_PRIVATE_KEY_PASSPHRASE` is set) and prints the public key PEM to
//! register with the platform.

use chatflow::flow::{export_public_key, generate_keypair};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chatflow=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or("usage: chatflow-keygen <private-key-path>")?;
    let passphrase = std::env::var("FLOW_PRIVATE_KEY_PASSPHRASE").ok();
    if passphrase.is_none() {
        tracing::warn!("FLOW_PRIVATE_KEY_PASSPHRASE not set; private key written unencrypted");
    }

    let keys = generate_keypair()?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    keys.write_private_key(&path, passphrase.as_deref())?;

    let public = export_public_key(&keys)?;
    print!("{}", String::from_utf8(public)?);
    Ok(())
}
