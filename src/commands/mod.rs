//! CLI command handlers.
//!
//! Each handler calls one gateway operation and prints its envelope as JSON.

use std::io::{self, Write};

use anyhow::Result;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use litgate_core::{Gateway, OperationResult, SearchQuery};

use crate::app::progress;
use crate::app::terminal::TerminalPolicy;
use crate::cli::{Args, Command};

/// Runs the selected command. Returns whether the operation succeeded.
pub async fn run_command(
    gateway: &Gateway,
    args: &Args,
    policy: TerminalPolicy,
    cancel: &CancellationToken,
) -> Result<bool> {
    let pretty = args.pretty;
    match &args.command {
        Command::Search(search) => {
            let query = SearchQuery::new(search.query.clone())
                .with_max_results(search.max_results)
                .with_days_back(search.days_back)
                .with_sort(search.sort);
            emit(&gateway.search(query).await, pretty)
        }
        Command::Fetch(ids) => emit(&gateway.fetch_summaries(&ids.ids).await, pretty),
        Command::FetchFulltext(ids) => {
            emit(&gateway.fetch_with_fulltext(&ids.ids, cancel).await, pretty)
        }
        Command::Detect(ids) => emit(&gateway.detect_fulltext(&ids.ids, cancel).await, pretty),
        Command::Download(download) => emit(
            &gateway
                .download_fulltext(&download.id, download.force, cancel)
                .await,
            pretty,
        ),
        Command::BatchDownload(batch) => {
            let bar = progress::batch_bar(policy.progress, batch.ids.len());
            let result = gateway
                .batch_download_with_progress(&batch.ids, batch.force, cancel, |_, item| {
                    progress::record(&bar, item);
                })
                .await;
            bar.finish_and_clear();
            emit(&result, pretty)
        }
        Command::Export(export) => emit(
            &gateway.export_citations(&export.ids, export.format).await,
            pretty,
        ),
        Command::CacheStatus => emit(&gateway.cache_status().await, pretty),
        Command::CacheClean => emit(&gateway.clean_expired().await, pretty),
        Command::CacheClear(clear) => emit(&gateway.clear_cache(clear.tier).await, pretty),
    }
}

fn emit<T: Serialize>(result: &OperationResult<T>, pretty: bool) -> Result<bool> {
    let json = if pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()?;
    Ok(result.success)
}
