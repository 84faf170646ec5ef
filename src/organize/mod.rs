//! Batch orchestration of AI tagging over an arbitrary bookmark list.
//!
//! [`Organizer::organize`] returns an [`OrganizeJob`]: a lazy stream of
//! progress snapshots ending in the aggregate result. Nothing is sent until
//! the stream is polled, batches run strictly in order, and a failed batch
//! degrades to empty annotations instead of ending the job.

pub mod estimate;
pub mod parse;
pub mod prompt;
pub mod types;

use std::collections::{HashMap, HashSet};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_util::stream::{self, Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::config::OrganizeSettings;
use crate::dispatch::adapter;
use crate::dispatch::{CallDescription, ChatClient, Credentials};
use crate::error::{BatchError, OrganizeError};
use crate::organize::estimate::estimate_text_tokens;
use crate::organize::parse::{Annotation, TagVocabulary, parse_batch_reply};
use crate::organize::prompt::build_batch_prompt;
use crate::organize::types::{
    BookmarkRecord, OrganizeEvent, OrganizeOptions, OrganizeResult, OrganizedRecord,
    ProgressSnapshot, ProgressStatus,
};

/// Drives organize jobs against one chat client.
pub struct Organizer<C> {
    client: C,
    settings: OrganizeSettings,
}

impl<C: ChatClient> Organizer<C> {
    pub fn new(client: C, settings: OrganizeSettings) -> Self {
        Self { client, settings }
    }

    /// Start a job. The returned stream does no work until polled.
    ///
    /// Cancelling `cancel` stops the job at the next batch boundary; the
    /// stream then ends without a [`OrganizeEvent::Finished`] item.
    pub fn organize(
        &self,
        records: Vec<BookmarkRecord>,
        credentials: Credentials,
        options: OrganizeOptions,
        cancel: CancellationToken,
    ) -> OrganizeJob<'_> {
        let batch_size = options.batch_size.unwrap_or(self.settings.batch_size);
        let vocabulary = TagVocabulary::new(&options.existing_tags);
        let total = records.len();

        let state = JobState {
            client: &self.client,
            settings: &self.settings,
            credentials,
            options,
            cancel,
            batch_size,
            vocabulary,
            total,
            organized: Vec::with_capacity(total),
            records,
            new_tags: Vec::new(),
            new_tag_set: HashSet::new(),
            tokens: 0.0,
            degraded_batches: 0,
            phase: Phase::Start,
        };

        let inner = stream::unfold(state, |mut state| async move {
            let event = state.step().await?;
            Some((event, state))
        });
        OrganizeJob {
            inner: Box::pin(inner),
        }
    }
}

/// Lazy progress stream of one organize run.
pub struct OrganizeJob<'a> {
    inner: Pin<Box<dyn Stream<Item = OrganizeEvent> + Send + 'a>>,
}

impl Stream for OrganizeJob<'_> {
    type Item = OrganizeEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl OrganizeJob<'_> {
    /// Drive the job to the end, handing each snapshot to `on_progress`.
    pub async fn run(
        mut self,
        mut on_progress: impl FnMut(&ProgressSnapshot),
    ) -> Result<OrganizeResult, OrganizeError> {
        let mut failure = None;
        while let Some(event) = self.next().await {
            match event {
                OrganizeEvent::Progress(snapshot) => {
                    if snapshot.status == ProgressStatus::Error {
                        failure = snapshot.message.clone();
                    }
                    on_progress(&snapshot);
                }
                OrganizeEvent::Finished(result) => return Ok(result),
            }
        }
        Err(match failure {
            Some(message) => OrganizeError::Configuration(message),
            None => OrganizeError::Cancelled,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    /// Announce batch `n` before calling out.
    Announce(usize),
    Call(usize),
    Done,
    Finish,
    Exhausted,
}

/// What a successful batch produced.
struct BatchOutcome {
    annotations: HashMap<usize, Annotation>,
    tokens: f64,
}

struct JobState<'a, C> {
    client: &'a C,
    settings: &'a OrganizeSettings,
    credentials: Credentials,
    options: OrganizeOptions,
    cancel: CancellationToken,
    batch_size: usize,
    vocabulary: TagVocabulary,
    total: usize,
    records: Vec<BookmarkRecord>,
    organized: Vec<OrganizedRecord>,
    new_tags: Vec<String>,
    new_tag_set: HashSet<String>,
    tokens: f64,
    degraded_batches: usize,
    phase: Phase,
}

impl<C: ChatClient> JobState<'_, C> {
    fn batch_count(&self) -> usize {
        self.total.div_ceil(self.batch_size)
    }

    fn batch_bounds(&self, n: usize) -> (usize, usize) {
        let start = n * self.batch_size;
        (start, (start + self.batch_size).min(self.total))
    }

    fn completed(&self) -> usize {
        self.organized.len()
    }

    /// Advance to the next event, or `None` when the stream is over.
    async fn step(&mut self) -> Option<OrganizeEvent> {
        loop {
            match self.phase {
                Phase::Start => {
                    if self.total == 0 {
                        self.phase = Phase::Done;
                        continue;
                    }
                    if let Err(message) = self.validate() {
                        tracing::warn!(provider = %self.credentials.provider, "organize setup failed: {message}");
                        self.phase = Phase::Exhausted;
                        return Some(OrganizeEvent::Progress(
                            ProgressSnapshot::new(ProgressStatus::Error, 0, self.total)
                                .with_message(message),
                        ));
                    }
                    tracing::info!(
                        provider = %self.credentials.provider,
                        records = self.total,
                        batches = self.batch_count(),
                        "organize job started"
                    );
                    self.phase = if self.options.generate_tags || self.options.generate_description {
                        Phase::Announce(0)
                    } else {
                        // Nothing to ask for: pass every record through untouched.
                        let records = std::mem::take(&mut self.records);
                        self.organized
                            .extend(records.into_iter().map(OrganizedRecord::untouched));
                        Phase::Done
                    };
                    return Some(OrganizeEvent::Progress(
                        ProgressSnapshot::new(ProgressStatus::Preparing, 0, self.total)
                            .with_message(format!("{} bookmarks to organize", self.total)),
                    ));
                }
                Phase::Announce(n) => {
                    self.phase = Phase::Call(n);
                    return Some(OrganizeEvent::Progress(
                        ProgressSnapshot::new(ProgressStatus::Processing, self.completed(), self.total)
                            .with_message(format!("batch {}/{}", n + 1, self.batch_count())),
                    ));
                }
                Phase::Call(n) => {
                    if self.cancel.is_cancelled() {
                        tracing::info!(batch = n + 1, "organize job cancelled");
                        self.phase = Phase::Exhausted;
                        return None;
                    }
                    let (start, end) = self.batch_bounds(n);
                    let outcome = self.run_batch(&self.records[start..end]).await;
                    // An in-flight call may finish after cancellation; its result is dropped.
                    if self.cancel.is_cancelled() {
                        tracing::info!(batch = n + 1, "organize job cancelled");
                        self.phase = Phase::Exhausted;
                        return None;
                    }
                    self.apply(n, start, end, outcome);
                    self.phase = if n + 1 < self.batch_count() {
                        Phase::Announce(n + 1)
                    } else {
                        Phase::Done
                    };
                }
                Phase::Done => {
                    self.phase = Phase::Finish;
                    let mut snapshot = ProgressSnapshot::new(ProgressStatus::Done, self.total, self.total);
                    if self.degraded_batches > 0 {
                        snapshot = snapshot.with_message(format!(
                            "{} of {} batches returned no usable tags",
                            self.degraded_batches,
                            self.batch_count()
                        ));
                    }
                    return Some(OrganizeEvent::Progress(snapshot));
                }
                Phase::Finish => {
                    self.phase = Phase::Exhausted;
                    let result = OrganizeResult {
                        bookmarks: std::mem::take(&mut self.organized),
                        new_tags: std::mem::take(&mut self.new_tags),
                        tokens_used: self.tokens.round() as u64,
                    };
                    tracing::info!(
                        records = result.bookmarks.len(),
                        new_tags = result.new_tags.len(),
                        tokens_used = result.tokens_used,
                        degraded_batches = self.degraded_batches,
                        "organize job finished"
                    );
                    return Some(OrganizeEvent::Finished(result));
                }
                Phase::Exhausted => return None,
            }
        }
    }

    /// Setup checks that must pass before any call is made.
    fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch size must be at least 1".to_string());
        }
        if self.credentials.api_key.trim().is_empty() {
            return Err(format!("{} requires an API key", self.credentials.provider));
        }
        adapter::resolve_endpoint(self.credentials.provider, self.credentials.api_url())
            .map_err(|e| e.user_message())?;
        if self.credentials.model().is_none() && self.credentials.provider.info().default_model.is_empty() {
            return Err(format!("{} requires an explicit model", self.credentials.provider));
        }
        Ok(())
    }

    async fn run_batch(&self, batch: &[BookmarkRecord]) -> Result<BatchOutcome, BatchError> {
        let prompt = build_batch_prompt(batch, &self.options, self.settings.max_existing_tags);
        let call = CallDescription::new(self.credentials.clone(), prompt)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_tokens);

        let reply = self.client.complete(&call).await?;
        let annotations = parse_batch_reply(&reply.content, batch.len())?;
        Ok(BatchOutcome {
            annotations,
            tokens: estimate_text_tokens(&call.prompt) + estimate_text_tokens(&reply.content),
        })
    }

    /// Merge one batch's outcome into the running result.
    fn apply(
        &mut self,
        n: usize,
        start: usize,
        end: usize,
        outcome: Result<BatchOutcome, BatchError>,
    ) {
        let mut annotations = match outcome {
            Ok(outcome) => {
                self.tokens += outcome.tokens;
                tracing::debug!(batch = n + 1, annotated = outcome.annotations.len(), "batch complete");
                outcome.annotations
            }
            Err(e) => {
                self.degraded_batches += 1;
                tracing::warn!(
                    batch = n + 1,
                    reason = e.reason(),
                    retryable = matches!(&e, BatchError::Call(c) if c.is_retryable()),
                    "batch degraded, records keep no AI tags: {e}"
                );
                HashMap::new()
            }
        };

        for (i, record) in self.records[start..end].iter().enumerate() {
            let mut organized = OrganizedRecord::untouched(record.clone());
            if let Some(annotation) = annotations.remove(&(i + 1)) {
                if self.options.generate_tags {
                    organized.ai_tags = self
                        .vocabulary
                        .clean(&annotation.tags, self.options.normalize_tags);
                }
                if self.options.generate_description {
                    organized.ai_description = annotation.description;
                }
            }
            for tag in &organized.ai_tags {
                if !self.vocabulary.contains(tag) && self.new_tag_set.insert(tag.clone()) {
                    self.new_tags.push(tag.clone());
                }
            }
            self.organized.push(organized);
        }
    }
}
