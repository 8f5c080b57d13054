//! Default processing function for staged results files.

use anyhow::Context;
use async_trait::async_trait;
use tracing::debug;

use courtside_core::CancellationToken;
use courtside_queue::{ProcessReport, ResultProcessor, StagedFile};

/// Reads a staged results file and counts its result rows.
///
/// The first non-blank line is the header. An upload with no rows is an error.
#[derive(Debug, Clone, Default)]
pub struct ResultsFileProcessor;

impl ResultsFileProcessor {
    pub fn new() -> Self {
        Self
    }

    fn count_records(contents: &str) -> u64 {
        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .skip(1)
            .count() as u64
    }
}

#[async_trait]
impl ResultProcessor<StagedFile> for ResultsFileProcessor {
    async fn process(&self, resource: &StagedFile, cancel: &CancellationToken) -> anyhow::Result<ProcessReport> {
        if cancel.is_cancelled() {
            anyhow::bail!("processing cancelled before start");
        }

        let contents = tokio::fs::read_to_string(resource.path())
            .await
            .with_context(|| format!("failed to read {}", resource))?;

        let records = Self::count_records(&contents);
        if records == 0 {
            anyhow::bail!("results file contains no result rows");
        }

        debug!(resource = %resource, records = records, "parsed results file");
        Ok(ProcessReport { records })
    }
}
