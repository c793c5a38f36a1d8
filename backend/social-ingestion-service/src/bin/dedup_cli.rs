use std::env;
use std::sync::Arc;
use std::time::Duration;

use redis_utils::RedisPool;
use social_ingestion_service::config::{
    dedup_ttl_from_days, DEFAULT_CACHE_OP_TIMEOUT_MS, DEFAULT_DEDUP_TTL_DAYS, MAX_DEDUP_TTL_DAYS,
};
use social_ingestion_service::services::{Fingerprint, RedisDedupStore};
use social_ingestion_service::sources::REGISTERED_SOURCES;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    if args.len() != 4 {
        usage();
    }

    let (cmd, source, post_id) = (args[1].as_str(), args[2].as_str(), args[3].as_str());
    if !REGISTERED_SOURCES.contains(&source) {
        eprintln!(
            "Unknown source `{}` (expected one of: {})",
            source,
            REGISTERED_SOURCES.join(", ")
        );
        std::process::exit(1);
    }

    let redis_url = env::var("REDIS_URL").map_err(|_| anyhow::anyhow!("REDIS_URL must be set"))?;
    let ttl_days: u64 = match env::var("DEDUP_TTL_DAYS") {
        Ok(raw) => raw.trim().parse()?,
        Err(_) => DEFAULT_DEDUP_TTL_DAYS,
    };
    let ttl = dedup_ttl_from_days(ttl_days).ok_or_else(|| {
        anyhow::anyhow!("DEDUP_TTL_DAYS must be between 1 and {}", MAX_DEDUP_TTL_DAYS)
    })?;

    let pool = RedisPool::connect(&redis_url).await?;
    let store = RedisDedupStore::new(
        Arc::new(pool),
        ttl,
        Duration::from_millis(DEFAULT_CACHE_OP_TIMEOUT_MS),
    );

    let fingerprint = Fingerprint::of(source, post_id);
    let key = fingerprint.as_str();

    match cmd {
        "check" => match store.try_remaining_ttl(key).await? {
            Some(secs) => println!("{} seen (expires in {}s)", fingerprint, secs),
            None if store.try_exists(key).await? => println!("{} seen (no expiry)", fingerprint),
            None => println!("{} not seen", fingerprint),
        },
        "mark" => {
            store.try_mark(key).await?;
            println!("{} marked for {} days", fingerprint, ttl_days);
        }
        "forget" => {
            store.try_release(key).await?;
            println!("{} forgotten", fingerprint);
        }
        _ => usage(),
    }

    Ok(())
}

fn usage() -> ! {
    eprintln!("Usage:");
    eprintln!("  dedup-cli check <source> <post_id>");
    eprintln!("  dedup-cli mark <source> <post_id>");
    eprintln!("  dedup-cli forget <source> <post_id>");
    eprintln!();
    eprintln!("Reads REDIS_URL and DEDUP_TTL_DAYS from the environment.");
    std::process::exit(1);
}
