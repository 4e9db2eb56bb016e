//! CLI commands

use crate::api::json::{serialize_fetch, SerializationFormat};
use crate::config::{self, SegmentConfig};
use crate::core::batch::{Compression, RecordBatchBuilder};
use crate::core::offset::Offset;
use crate::storage::reader::IoPriority;
use crate::storage::segment::Segment;
use anyhow::{Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

/// seglog CLI
#[derive(Parser)]
#[command(name = "seglog")]
#[command(about = "Append-only log segment tool")]
pub struct Cli {
    /// JSON segment configuration
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Append generated batches, creating the segment if needed
    Append {
        /// Directory holding the segment files
        #[arg(short, long)]
        dir: PathBuf,
        /// Base offset of the segment
        #[arg(short, long, default_value = "0")]
        base_offset: i64,
        /// Number of batches to append
        #[arg(long, default_value = "1")]
        batches: usize,
        /// Records per batch
        #[arg(long, default_value = "1")]
        records: usize,
        /// Compress batches with zstd
        #[arg(long)]
        zstd: bool,
    },
    /// Print the records of a segment
    Dump {
        #[arg(short, long)]
        dir: PathBuf,
        #[arg(short, long, default_value = "0")]
        base_offset: i64,
        /// First offset to print
        #[arg(short, long)]
        from: Option<i64>,
        /// Print the JSON fetch projection
        #[arg(long)]
        json: bool,
        /// Topic name used in the JSON output
        #[arg(long, default_value = "topic")]
        topic: String,
        /// Partition id used in the JSON output
        #[arg(long, default_value = "0")]
        partition: i32,
    },
    /// Show watermarks and index of a segment
    Inspect {
        #[arg(short, long)]
        dir: PathBuf,
        #[arg(short, long, default_value = "0")]
        base_offset: i64,
    },
}

impl Commands {
    pub async fn run(self, config: &SegmentConfig) -> Result<()> {
        match self {
            Commands::Append {
                dir,
                base_offset,
                batches,
                records,
                zstd,
            } => {
                let compression = if zstd {
                    Compression::Zstd
                } else {
                    Compression::None
                };
                append(dir, Offset::new(base_offset), batches, records, compression, config).await
            }
            Commands::Dump {
                dir,
                base_offset,
                from,
                json,
                topic,
                partition,
            } => {
                let base_offset = Offset::new(base_offset);
                let from = from.map_or(base_offset, Offset::new);
                let format = json.then_some((topic.as_str(), partition));
                dump(dir, base_offset, from, format, config).await
            }
            Commands::Inspect { dir, base_offset } => {
                inspect(dir, Offset::new(base_offset), config).await
            }
        }
    }
}

async fn append(
    dir: PathBuf,
    base_offset: Offset,
    batches: usize,
    records: usize,
    compression: Compression,
    config: &SegmentConfig,
) -> Result<()> {
    let mut segment = if config::log_path(&dir, base_offset).exists() {
        Segment::recover_active(&dir, base_offset, config).await
    } else {
        Segment::create(&dir, base_offset, config).await
    }
    .with_context(|| format!("failed to open segment {base_offset} in {}", dir.display()))?;

    let mut next = segment.dirty_offset().map_or(base_offset, |o| o.next());
    for _ in 0..batches {
        let mut builder = RecordBatchBuilder::new(next).compression(compression);
        for i in 0..records as i64 {
            let offset = next + i;
            builder = builder.add_record(
                Some(Bytes::from(format!("key-{offset}"))),
                Some(Bytes::from(format!("value-{offset}"))),
            );
        }
        let batch = builder.build().context("failed to build batch")?;

        let result = segment
            .append(batch)
            .await
            .with_context(|| format!("failed to append batch at {next}"))?;
        println!("{result}");
        next = result.last_offset.next();
    }

    segment.flush().await.context("failed to flush segment")?;
    info!(segment = %segment, "append done");
    segment.close().await.context("failed to close segment")?;
    Ok(())
}

async fn dump(
    dir: PathBuf,
    base_offset: Offset,
    from: Offset,
    json: Option<(&str, i32)>,
    config: &SegmentConfig,
) -> Result<()> {
    let segment = Segment::recover(&dir, base_offset, config)
        .await
        .with_context(|| format!("failed to recover segment {base_offset} in {}", dir.display()))?;

    let mut stream = segment.offset_data_stream(from, IoPriority::Normal).await?;
    let mut batches = Vec::new();
    if let Some(first) = stream.skip_to(from).await? {
        batches.push(first);
        while let Some(batch) = stream.next_batch().await? {
            batches.push(batch);
        }
    }

    match json {
        Some((topic, partition)) => {
            let rendered = serialize_fetch(topic, partition, &batches, SerializationFormat::Binary)
                .context("failed to render records")?;
            println!("{rendered}");
        }
        None => {
            for batch in &batches {
                println!("{batch}");
                for record in batch.records()? {
                    let offset = batch.base_offset() + record.offset_delta as i64;
                    if offset < from {
                        continue;
                    }
                    println!(
                        "  {offset}: key={} value={}",
                        printable(record.key.as_ref()),
                        printable(record.value.as_ref())
                    );
                }
            }
        }
    }

    segment.close().await?;
    Ok(())
}

fn printable(bytes: Option<&Bytes>) -> String {
    match bytes {
        None => "null".to_string(),
        Some(bytes) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

async fn inspect(dir: PathBuf, base_offset: Offset, config: &SegmentConfig) -> Result<()> {
    let segment = Segment::recover(&dir, base_offset, config)
        .await
        .with_context(|| format!("failed to recover segment {base_offset} in {}", dir.display()))?;

    println!("{segment}");
    println!("size: {} bytes", segment.size_bytes());
    for (offset, position) in segment.index().entries() {
        println!("  index {offset} -> {position}");
    }

    segment.close().await?;
    Ok(())
}
