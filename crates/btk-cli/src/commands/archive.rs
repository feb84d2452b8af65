//! `btk archive query`: lists the most recent archived runs for a
//! strategy/symbol pair.

use anyhow::{Context, Result};
use btk_archive::ArchiveStore;

pub struct QueryArgs {
    pub strategy: String,
    pub symbol: String,
    pub limit: i64,
    pub archive_url: String,
}

pub async fn query(args: QueryArgs) -> Result<()> {
    let pool = btk_archive::connect(&args.archive_url).await?;
    btk_archive::migrate(&pool).await?;
    let archive = ArchiveStore::new(pool);

    let reports = archive.query_recent(&args.strategy, &args.symbol, args.limit).await.context("archive query failed")?;

    if reports.is_empty() {
        println!("no archived runs for strategy={} symbol={}", args.strategy, args.symbol);
        return Ok(());
    }

    for report in reports {
        println!(
            "run_id={} created_at={} hit_rate={:.2} profit_factor={:.2} total_pl={}",
            report.run_id,
            report.created_at,
            report.performance.hit_rate,
            report.performance.profit_factor,
            report.performance.total_pl.raw(),
        );
    }

    Ok(())
}
