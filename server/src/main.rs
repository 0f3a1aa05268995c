//! Permission snapshot checker.
//!
//! Loads a JSON snapshot of channels, memberships, bindings and overrides and
//! resolves what a user may do in a channel.
//!
//! Usage: `campus-perms <channel_id> <user_id> [CAPABILITY]`

use std::fs;

use anyhow::{bail, Context, Result};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use campus_server::config::Config;
use campus_server::permissions::{
    ChannelPermissions, MemoryPermissionStore, PermissionResolver, StoreSnapshot,
};

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_filter.as_str().into());
    if config.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    let mut args = std::env::args().skip(1);
    let (Some(channel_arg), Some(user_arg)) = (args.next(), args.next()) else {
        bail!("usage: campus-perms <channel_id> <user_id> [CAPABILITY]");
    };
    let channel_id: Uuid = channel_arg
        .parse()
        .with_context(|| format!("invalid channel id {channel_arg:?}"))?;
    let user_id: Uuid = user_arg
        .parse()
        .with_context(|| format!("invalid user id {user_arg:?}"))?;
    let capability = args
        .next()
        .map(|name| {
            ChannelPermissions::from_name(&name)
                .with_context(|| format!("unknown capability {name:?}"))
        })
        .transpose()?;

    let path = config.require_snapshot_path()?;
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read snapshot {}", path.display()))?;
    let snapshot: StoreSnapshot = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse snapshot {}", path.display()))?;
    let store = MemoryPermissionStore::from_snapshot(snapshot).context("invalid snapshot")?;
    info!(snapshot = %path.display(), "Loaded permission snapshot");

    let resolver = PermissionResolver::new(store, &config.permissions);
    let output = if let Some(capability) = capability {
        let allowed = resolver.has_capability(channel_id, user_id, capability)?;
        json!({
            "channel_id": channel_id,
            "user_id": user_id,
            "capability": capability,
            "allowed": allowed,
        })
    } else {
        let capabilities = resolver.effective_capabilities(channel_id, user_id)?;
        json!({
            "channel_id": channel_id,
            "user_id": user_id,
            "capabilities": capabilities.names(),
            "mask": capabilities.as_mask(),
        })
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
