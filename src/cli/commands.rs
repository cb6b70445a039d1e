use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;

use crate::app::{AppContext, LivehubError, Result};
use crate::config::Config;
use crate::daemon::Daemon;
use crate::normalizer::EntryParser;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn serve(ctx: Arc<AppContext>, config: Config) -> Result<()> {
    Daemon::new(ctx, config).run().await
}

pub async fn add_channels(ctx: &AppContext, channel_ids: &[String]) -> Result<()> {
    let added = ctx.pubsub.track_channels(channel_ids)?;
    println!("Tracking {} new channels", added);

    let report = ctx.pubsub.renew_expiring().await?;
    print_json(&report)
}

pub async fn renew(ctx: &AppContext) -> Result<()> {
    let report = ctx.pubsub.renew_expiring().await?;
    print_json(&report)
}

pub async fn clean(ctx: &AppContext) -> Result<()> {
    let report = ctx.pubsub.clean().await?;
    print_json(&report)
}

pub async fn sync(ctx: &AppContext, channel_ids: &[String]) -> Result<()> {
    let mut skipped = Vec::new();
    let streams = ctx.pubsub.get_streams(channel_ids, &mut skipped).await?;

    if !skipped.is_empty() {
        eprintln!("Skipped {} channels (platform lookup failed)", skipped.len());
    }
    print_json(&json!({"streams": streams, "skipped": skipped}))
}

pub async fn unsubscribe(ctx: &AppContext, channel_id: &str) -> Result<()> {
    ctx.pubsub.unsubscribe(channel_id).await?;
    println!("Unsubscribe requested for {}", channel_id);
    Ok(())
}

/// Runs the delivery parser over a saved payload.
pub fn parse_file(path: &Path) -> Result<()> {
    let body = std::fs::read(path)?;
    match EntryParser::new().parse(&body) {
        Ok(entry) => print_json(&entry),
        Err(e) => Err(LivehubError::Other(format!(
            "{}: {} ({})",
            path.display(),
            e,
            e.code()
        ))),
    }
}
