//! Level-by-level reduction of chunk summaries into a single summary.
//!
//! Phases:
//! 1. every chunk is summarized into a level-1 summary;
//! 2. while more than one summary remains, either the set is small enough
//!    (aggregate estimate within target and at most
//!    [`FINAL_MERGE_MAX_SUMMARIES`] items) and gets one final merge, or
//! 3. it is partitioned into consecutive batches that are each merged,
//!    producing the next level.
//!
//! Each batch round divides the count by [`MERGE_BATCH_SIZE`], so the loop
//! always reaches a single summary.

use std::time::Duration;

use futures::future::try_join_all;
use tracing::{debug, info};

use crate::context::core::config::{ScheduleConfig, SummaryConfig};
use crate::context::core::errors::{ContextError, ContextResult};
use crate::context::ingest::chunker::Chunk;
use crate::context::summarization::merge::{Summary, SummaryMerger};

/// Largest summary count that may be folded by the final merge.
pub const FINAL_MERGE_MAX_SUMMARIES: usize = 3;

/// Summaries merged per call in the batch phase.
pub const MERGE_BATCH_SIZE: usize = 3;

/// Progress callback. Called in order, return value ignored.
pub type ProgressFn<'a> = &'a (dyn Fn(&str) + Send + Sync);

/// How generation calls are paced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedulePolicy {
    /// Calls started together; the next group starts once the previous one finished.
    pub max_concurrent_calls: usize,
    /// Pause between consecutive groups within one phase.
    pub inter_call_delay: Duration,
}

impl SchedulePolicy {
    /// One call at a time with `delay` between calls.
    #[must_use]
    pub const fn sequential(delay: Duration) -> Self {
        Self {
            max_concurrent_calls: 1,
            inter_call_delay: delay,
        }
    }

    const fn window(&self) -> usize {
        if self.max_concurrent_calls == 0 {
            1
        } else {
            self.max_concurrent_calls
        }
    }

    async fn pause(&self) {
        if !self.inter_call_delay.is_zero() {
            tokio::time::sleep(self.inter_call_delay).await;
        }
    }
}

impl Default for SchedulePolicy {
    fn default() -> Self {
        Self::from(&ScheduleConfig::default())
    }
}

impl From<&ScheduleConfig> for SchedulePolicy {
    fn from(config: &ScheduleConfig) -> Self {
        Self {
            max_concurrent_calls: config.max_concurrent_calls,
            inter_call_delay: config.inter_call_delay(),
        }
    }
}

/// Convergence settings for the reduction loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReducerConfig {
    /// Aggregate estimate under which the final merge happens.
    pub target_summary_tokens: usize,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        Self::from(&SummaryConfig::default())
    }
}

impl From<&SummaryConfig> for ReducerConfig {
    fn from(config: &SummaryConfig) -> Self {
        Self {
            target_summary_tokens: config.target_summary_tokens,
        }
    }
}

/// Orchestrates chunk summarization and batch merging until one summary remains.
pub struct RecursiveReducer {
    merger: SummaryMerger,
    config: ReducerConfig,
    schedule: SchedulePolicy,
}

impl RecursiveReducer {
    /// Create a reducer.
    #[must_use]
    pub const fn new(
        merger: SummaryMerger,
        config: ReducerConfig,
        schedule: SchedulePolicy,
    ) -> Self {
        Self {
            merger,
            config,
            schedule,
        }
    }

    /// Reduce `chunks` to exactly one summary.
    ///
    /// # Errors
    /// Returns [`ContextError::NoChunks`] for empty input, or the first
    /// generation error, which aborts the whole reduction.
    pub async fn reduce(
        &self,
        chunks: &[Chunk],
        progress: Option<ProgressFn<'_>>,
    ) -> ContextResult<Summary> {
        if chunks.is_empty() {
            return Err(ContextError::NoChunks);
        }

        let mut summaries = self.summarize_chunks(chunks, progress).await?;

        let mut level: u32 = 1;
        while summaries.len() > 1 {
            let total_tokens: usize = summaries.iter().map(|s| s.token_estimate).sum();
            debug!(
                level,
                count = summaries.len(),
                total_tokens,
                target = self.config.target_summary_tokens,
                "Convergence check"
            );

            if total_tokens <= self.config.target_summary_tokens
                && summaries.len() <= FINAL_MERGE_MAX_SUMMARIES
            {
                report(
                    progress,
                    &format!("Creating final summary from {} summaries...", summaries.len()),
                );
                let summary = self.merger.summarize_summaries(summaries).await?;
                info!(
                    level = summary.level,
                    tokens = summary.token_estimate,
                    "Reduction complete"
                );
                return Ok(summary);
            }

            summaries = self.merge_level(summaries, level, progress).await?;
            level += 1;
        }

        let summary = summaries.pop().ok_or(ContextError::NoChunks)?;
        info!(
            level = summary.level,
            tokens = summary.token_estimate,
            "Reduction complete"
        );
        Ok(summary)
    }

    async fn summarize_chunks(
        &self,
        chunks: &[Chunk],
        progress: Option<ProgressFn<'_>>,
    ) -> ContextResult<Vec<Summary>> {
        let total = chunks.len();
        let window = self.schedule.window();
        report(progress, &format!("Summarizing {total} chunks..."));

        let mut summaries = Vec::with_capacity(total);
        for (group_idx, group) in chunks.chunks(window).enumerate() {
            if group_idx > 0 {
                self.schedule.pause().await;
            }

            let mut calls = Vec::with_capacity(group.len());
            for (offset, chunk) in group.iter().enumerate() {
                let position = group_idx * window + offset + 1;
                report(progress, &format!("Processing chunk {position}/{total}..."));
                calls.push(self.merger.summarize_chunk(chunk));
            }
            summaries.extend(try_join_all(calls).await?);
        }

        info!(chunks = total, "Chunk summaries ready");
        Ok(summaries)
    }

    async fn merge_level(
        &self,
        summaries: Vec<Summary>,
        level: u32,
        progress: Option<ProgressFn<'_>>,
    ) -> ContextResult<Vec<Summary>> {
        let count = summaries.len();
        let window = self.schedule.window();

        let mut batches: Vec<(usize, Vec<Summary>)> =
            Vec::with_capacity(count.div_ceil(MERGE_BATCH_SIZE));
        let mut remaining = summaries.into_iter().peekable();
        while remaining.peek().is_some() {
            let start = batches.len() * MERGE_BATCH_SIZE;
            batches.push((start, remaining.by_ref().take(MERGE_BATCH_SIZE).collect()));
        }

        let mut merged = Vec::with_capacity(batches.len());
        let mut pending = batches.into_iter().peekable();
        let mut first_group = true;
        while pending.peek().is_some() {
            if !first_group {
                self.schedule.pause().await;
            }
            first_group = false;

            let group: Vec<(usize, Vec<Summary>)> = pending.by_ref().take(window).collect();
            let mut labels = Vec::with_capacity(group.len());
            let mut calls = Vec::with_capacity(group.len());
            for (start, batch) in group {
                let label = format!("{}-{}", start + 1, (start + MERGE_BATCH_SIZE).min(count));
                report(
                    progress,
                    &format!("Merging summaries {label} (level {})...", level + 1),
                );
                labels.push(label);
                calls.push(self.merger.summarize_summaries(batch));
            }

            merged.extend(try_join_all(calls).await?);
            for label in labels {
                report(
                    progress,
                    &format!("Merged summaries {label} into level {}", level + 1),
                );
            }
        }

        info!(
            level = level + 1,
            from = count,
            to = merged.len(),
            "Merge level complete"
        );
        Ok(merged)
    }
}

fn report(progress: Option<ProgressFn<'_>>, message: &str) {
    if let Some(callback) = progress {
        callback(message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Instant;

    use super::*;
    use crate::context::ingest::message::Message;
    use crate::context::summarization::generator::stub::StubGenerator;

    fn chunks(count: usize, tokens: usize) -> Vec<Chunk> {
        (0..count)
            .map(|id| Chunk {
                id,
                messages: vec![Message::user("x".repeat(tokens * 4))],
                token_estimate: tokens,
            })
            .collect()
    }

    fn reducer(stub: &Arc<StubGenerator>, target: usize, schedule: SchedulePolicy) -> RecursiveReducer {
        RecursiveReducer::new(
            SummaryMerger::new(stub.clone(), 4096),
            ReducerConfig {
                target_summary_tokens: target,
            },
            schedule,
        )
    }

    fn no_delay() -> SchedulePolicy {
        SchedulePolicy::sequential(Duration::ZERO)
    }

    #[tokio::test]
    async fn test_empty_input_is_rejected() {
        let stub = Arc::new(StubGenerator::with_tokens(10));
        let result = reducer(&stub, 5000, no_delay()).reduce(&[], None).await;

        assert!(matches!(result, Err(ContextError::NoChunks)));
        assert_eq!(stub.calls(), 0);
    }

    #[tokio::test]
    async fn test_single_chunk_needs_one_call() {
        let stub = Arc::new(StubGenerator::with_tokens(10));
        let log = Mutex::new(Vec::new());
        let progress = |message: &str| {
            if let Ok(mut log) = log.lock() {
                log.push(message.to_string());
            }
        };

        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(1, 100), Some(&progress))
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };
        assert_eq!(stub.calls(), 1);
        assert_eq!(summary.level, 1);
        assert_eq!(summary.source_chunk_ids, vec![0]);
        assert_eq!(
            log.lock().map(|l| l.clone()).unwrap_or_default(),
            vec![
                "Summarizing 1 chunks...".to_string(),
                "Processing chunk 1/1...".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn test_small_set_gets_one_final_merge() {
        let stub = Arc::new(StubGenerator::with_tokens(100));
        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(3, 1000), None)
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };
        assert_eq!(stub.calls(), 4);
        assert_eq!(summary.level, 2);
        assert_eq!(summary.source_chunk_ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn test_ten_chunks_reduce_over_several_levels() {
        let stub = Arc::new(StubGenerator::with_tokens(2000));
        let log = Mutex::new(Vec::new());
        let progress = |message: &str| {
            if let Ok(mut log) = log.lock() {
                log.push(message.to_string());
            }
        };

        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(10, 2000), Some(&progress))
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };

        // 10 chunk calls, 4 merges to level 2, 2 merges to level 3, 1 final merge.
        assert_eq!(stub.calls(), 17);
        assert_eq!(summary.level, 4);
        assert_eq!(summary.source_chunk_ids, (0..10).collect::<Vec<_>>());

        let log = log.lock().map(|l| l.clone()).unwrap_or_default();
        let merges: Vec<&String> = log.iter().filter(|m| m.starts_with("Merging")).collect();
        assert_eq!(
            merges,
            vec![
                "Merging summaries 1-3 (level 2)...",
                "Merging summaries 4-6 (level 2)...",
                "Merging summaries 7-9 (level 2)...",
                "Merging summaries 10-10 (level 2)...",
                "Merging summaries 1-3 (level 3)...",
                "Merging summaries 4-4 (level 3)...",
            ]
        );
        assert_eq!(
            log.last().map(String::as_str),
            Some("Creating final summary from 2 summaries...")
        );
        assert_eq!(
            log.iter().filter(|m| m.starts_with("Processing chunk")).count(),
            10
        );
    }

    #[tokio::test]
    async fn test_large_pair_is_collapsed_by_a_batch() {
        let stub = Arc::new(StubGenerator::with_tokens(4000));
        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(2, 6000), None)
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };
        // Sum 8000 > target, so the pair goes through the batch phase and ends there.
        assert_eq!(stub.calls(), 3);
        assert_eq!(summary.level, 2);
        assert_eq!(summary.source_chunk_ids, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_provenance_has_no_duplicates_or_gaps() {
        let stub = Arc::new(StubGenerator::with_tokens(3000));
        let Ok(summary) = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(29, 10), None)
            .await
        else {
            panic!("reduction failed");
        };

        assert_eq!(summary.source_chunk_ids, (0..29).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_generation_error_aborts_reduction() {
        let stub = Arc::new(StubGenerator::with_tokens(2000).failing_on_call(3));
        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(6, 100), None)
            .await;

        assert!(matches!(result, Err(ContextError::Generation(_))));
        assert_eq!(stub.calls(), 3);
    }

    #[tokio::test]
    async fn test_empty_generations_converge_early() {
        let stub = Arc::new(StubGenerator::with_reply(""));
        let result = reducer(&stub, 5000, no_delay())
            .reduce(&chunks(3, 5000), None)
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };
        assert_eq!(stub.calls(), 4);
        assert!(summary.text.is_empty());
        assert_eq!(summary.token_estimate, 0);
    }

    #[tokio::test]
    async fn test_concurrent_window_preserves_order() {
        let stub = Arc::new(StubGenerator::with_tokens(2000));
        let schedule = SchedulePolicy {
            max_concurrent_calls: 4,
            inter_call_delay: Duration::ZERO,
        };
        let Ok(summary) = reducer(&stub, 5000, schedule)
            .reduce(&chunks(10, 2000), None)
            .await
        else {
            panic!("reduction failed");
        };

        assert_eq!(stub.calls(), 17);
        assert_eq!(summary.source_chunk_ids, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_delay_between_chunk_calls() {
        let stub = Arc::new(StubGenerator::with_tokens(10));
        let delay = Duration::from_millis(20);
        let started = Instant::now();

        let result = reducer(&stub, 5000, SchedulePolicy::sequential(delay))
            .reduce(&chunks(3, 10), None)
            .await;

        assert!(result.is_ok());
        // Two pauses between three chunk calls, none before the final merge.
        assert!(started.elapsed() >= delay * 2);
    }

    #[tokio::test]
    async fn test_delay_between_merge_batches() {
        let stub = Arc::new(StubGenerator::with_tokens(2000));
        let delay = Duration::from_millis(25);
        let started = Instant::now();

        let result = reducer(&stub, 5000, SchedulePolicy::sequential(delay))
            .reduce(&chunks(7, 2000), None)
            .await;

        let Ok(summary) = result else {
            panic!("reduction failed");
        };
        // 7 chunk calls, 3 merges to level 2, 1 merge to level 3.
        assert_eq!(stub.calls(), 11);
        assert_eq!(summary.level, 3);
        // Six pauses in the chunk phase and two between the three level-2 batches.
        assert!(started.elapsed() >= delay * 8);
    }

    #[test]
    fn test_policy_from_config() {
        let policy = SchedulePolicy::from(&ScheduleConfig::default());
        assert_eq!(policy, SchedulePolicy::sequential(Duration::from_millis(500)));
        assert_eq!(SchedulePolicy::default(), policy);
        assert_eq!(
            SchedulePolicy {
                max_concurrent_calls: 0,
                inter_call_delay: Duration::ZERO
            }
            .window(),
            1
        );
    }

    #[test]
    fn test_reducer_config_from_summary_config() {
        let config = ReducerConfig::from(&SummaryConfig {
            target_summary_tokens: 1200,
            ..SummaryConfig::default()
        });
        assert_eq!(config.target_summary_tokens, 1200);
        assert_eq!(ReducerConfig::default().target_summary_tokens, 5000);
    }

    mod reduction_properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            /// Any non-empty input ends in one summary that covers every chunk once, in order.
            #[test]
            fn reduction_terminates_with_full_provenance(
                count in 1usize..40,
                chunk_tokens in 1usize..8_000,
                output_tokens in 0usize..4_000,
                target in 1usize..10_000,
            ) {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                    .map_err(|e| TestCaseError::fail(e.to_string()))?;
                let stub = Arc::new(StubGenerator::with_tokens(output_tokens));

                let result = runtime.block_on(
                    reducer(&stub, target, no_delay()).reduce(&chunks(count, chunk_tokens), None),
                );

                let summary = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                prop_assert_eq!(summary.source_chunk_ids, (0..count).collect::<Vec<_>>());
                prop_assert!(stub.calls() >= count);
                if count == 1 {
                    prop_assert_eq!(stub.calls(), 1);
                    prop_assert_eq!(summary.level, 1);
                } else {
                    prop_assert!(summary.level >= 2);
                }
            }
        }
    }
}
