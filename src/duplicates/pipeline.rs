//! Staged, parallel content hashing.
//!
//! # Overview
//!
//! Every file in every size bucket is checksummed (CRC32) on a bounded
//! rayon pool. Workers never share state: each job reads one file and sends
//! a [`HashMessage`] to the coordinating thread over a crossbeam channel.
//! The coordinator tracks how many results each bucket still waits for.
//! Once a bucket's checksums are all in, only files whose checksum collides
//! within that bucket are queued for the confirmation digest. Once their
//! digests are in, the bucket resolves into [`MatchGroup`]s.
//!
//! Buckets resolve independently and in any order. A bucket that lost a
//! file to cancellation is abandoned rather than grouped from partial data.
//!
//! # Cancellation
//!
//! Jobs check the shutdown flag before opening their file, so cancellation
//! takes effect between files. No new digest work is queued once the flag
//! is set.

use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Sender};
use rayon::ThreadPool;

use super::groups::{MatchGroup, SizeBucket};
use crate::error::EngineError;
use crate::fs::FileSystem;
use crate::scanner::{
    checksum_reader, digest_reader, Checksum, Digest, DigestAlgorithm, FileRecord, ScanWarning,
};

/// Default number of hashing workers: twice the available parallelism,
/// since the work is I/O bound.
#[must_use]
pub fn default_io_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(4)
        .clamp(2, 32)
}

/// Hashing pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Number of worker threads
    pub io_threads: usize,
    /// Confirmation digest algorithm
    pub algorithm: DigestAlgorithm,
    /// Cancellation flag shared with the session
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            io_threads: default_io_threads(),
            algorithm: DigestAlgorithm::default(),
            shutdown_flag: None,
        }
    }
}

impl PipelineConfig {
    /// Set the worker count (minimum 1).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the digest algorithm.
    #[must_use]
    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set the cancellation flag.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }
}

/// Hashing stage a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStage {
    /// CRC32 over every bucket member
    Checksum,
    /// Confirmation digest over checksum collisions
    Digest,
}

/// Result of one hashing job, sent from a worker to the coordinator.
#[derive(Debug)]
pub enum HashMessage {
    /// Checksum computed
    Checksummed {
        /// Bucket index
        bucket: usize,
        /// Member index within the bucket
        index: usize,
        /// CRC32 of the content
        checksum: Checksum,
    },
    /// Digest computed
    Digested {
        /// Bucket index
        bucket: usize,
        /// Member index within the bucket
        index: usize,
        /// Confirmation digest
        digest: Digest,
    },
    /// The file could not be hashed
    Failed {
        /// Bucket index
        bucket: usize,
        /// Member index within the bucket
        index: usize,
        /// Why
        warning: ScanWarning,
    },
    /// The job saw the shutdown flag and did not run
    Skipped {
        /// Bucket index
        bucket: usize,
    },
}

/// Progress notifications delivered on the coordinating thread.
#[derive(Debug)]
pub enum PipelineEvent {
    /// A file finished one hashing stage.
    Hashed {
        /// File path
        path: PathBuf,
        /// Bytes read
        bytes: u64,
        /// Stage that completed
        stage: HashStage,
    },
    /// A file was dropped from consideration.
    Warning(ScanWarning),
    /// A bucket finished. Holds every confirmed group it produced (possibly none).
    BucketResolved(Vec<MatchGroup>),
}

/// What the pipeline did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    /// Buckets that reached a final answer
    pub buckets_resolved: usize,
    /// Buckets dropped because of cancellation
    pub buckets_abandoned: usize,
    /// Files whose checksum was computed
    pub files_checksummed: usize,
    /// Files whose digest was computed
    pub files_digested: usize,
    /// Files that failed to hash
    pub files_failed: usize,
    /// Whether cancellation cut the run short
    pub interrupted: bool,
}

#[derive(Debug)]
struct BucketState {
    size: u64,
    records: Vec<FileRecord>,
    checksums: Vec<Option<Checksum>>,
    digests: Vec<Option<Digest>>,
    stage: HashStage,
    pending: usize,
    skipped: bool,
}

impl BucketState {
    fn new(bucket: SizeBucket) -> Self {
        let n = bucket.records.len();
        Self {
            size: bucket.size,
            records: bucket.records,
            checksums: vec![None; n],
            digests: vec![None; n],
            stage: HashStage::Checksum,
            pending: n,
            skipped: false,
        }
    }

    /// Member indices grouped by checksum, keeping only collisions.
    fn checksum_collisions(&self) -> Vec<(Checksum, Vec<usize>)> {
        let mut by_checksum: BTreeMap<Checksum, Vec<usize>> = BTreeMap::new();
        for (i, checksum) in self.checksums.iter().enumerate() {
            if let Some(checksum) = checksum {
                by_checksum.entry(*checksum).or_default().push(i);
            }
        }
        by_checksum
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .collect()
    }

    /// Resolve the bucket into confirmed groups, releasing its records.
    fn take_match_groups(&mut self) -> Vec<MatchGroup> {
        let mut by_hash: BTreeMap<(Checksum, Digest), Vec<usize>> = BTreeMap::new();
        for (i, (checksum, digest)) in self.checksums.iter().zip(&self.digests).enumerate() {
            if let (Some(checksum), Some(digest)) = (checksum, digest) {
                by_hash.entry((*checksum, *digest)).or_default().push(i);
            }
        }

        let mut matches: Vec<_> = by_hash
            .into_iter()
            .filter(|(_, members)| members.len() >= 2)
            .collect();
        // Discovery order of each group's first member
        matches.sort_by_key(|(_, members)| members[0]);

        let records = std::mem::take(&mut self.records);
        matches
            .into_iter()
            .map(|((checksum, digest), members)| MatchGroup {
                size: self.size,
                checksum,
                digest,
                records: members.iter().map(|&i| records[i].clone()).collect(),
            })
            .collect()
    }
}

/// Parallel two-stage hasher over size buckets.
#[derive(Debug)]
pub struct HashPipeline {
    fs: Arc<dyn FileSystem>,
    config: PipelineConfig,
    pool: ThreadPool,
}

impl HashPipeline {
    /// Create a pipeline with its own worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkerPool`] if the pool cannot be built.
    pub fn new(fs: Arc<dyn FileSystem>, config: PipelineConfig) -> Result<Self, EngineError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.io_threads.max(1))
            .thread_name(|i| format!("dupsweep-hash-{i}"))
            .build()?;
        log::debug!("Hash pipeline using {} worker threads", config.io_threads);
        Ok(Self { fs, config, pool })
    }

    fn is_shutdown_requested(&self) -> bool {
        self.config
            .shutdown_flag
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn spawn_job(
        &self,
        tx: &Sender<HashMessage>,
        stage: HashStage,
        bucket: usize,
        index: usize,
        record: &FileRecord,
    ) {
        let fs = Arc::clone(&self.fs);
        let tx = tx.clone();
        let flag = self.config.shutdown_flag.clone();
        let algorithm = self.config.algorithm;
        let path = record.path.clone();
        let expected = record.size;

        self.pool.spawn(move || {
            let message = if flag.is_some_and(|f| f.load(Ordering::SeqCst)) {
                HashMessage::Skipped { bucket }
            } else {
                // Every job must answer, or the coordinator waits forever.
                panic::catch_unwind(AssertUnwindSafe(|| {
                    hash_one(fs.as_ref(), &path, expected, stage, algorithm, bucket, index)
                }))
                .unwrap_or_else(|payload| {
                    let message = panic_message(payload.as_ref());
                    log::error!("Hashing {} panicked: {}", path.display(), message);
                    HashMessage::Failed {
                        bucket,
                        index,
                        warning: ScanWarning::Io {
                            path: path.clone(),
                            message: format!("hashing panicked: {message}"),
                        },
                    }
                })
            };
            // The coordinator owns a sender too, so this only fails if it panicked.
            let _ = tx.send(message);
        });
    }

    /// Hash every bucket, calling `on_event` on this thread as results arrive.
    pub fn run<F>(&self, buckets: Vec<SizeBucket>, mut on_event: F) -> PipelineOutcome
    where
        F: FnMut(PipelineEvent),
    {
        let mut outcome = PipelineOutcome::default();
        let (tx, rx) = unbounded::<HashMessage>();

        let mut states: Vec<BucketState> = buckets.into_iter().map(BucketState::new).collect();
        let mut outstanding = 0usize;
        for (b, state) in states.iter().enumerate() {
            for (i, record) in state.records.iter().enumerate() {
                self.spawn_job(&tx, HashStage::Checksum, b, i, record);
                outstanding += 1;
            }
        }
        log::debug!(
            "Queued {} checksum jobs across {} buckets",
            outstanding,
            states.len()
        );

        while outstanding > 0 {
            let Ok(message) = rx.recv() else {
                break;
            };
            outstanding -= 1;

            let bucket = match message {
                HashMessage::Checksummed {
                    bucket,
                    index,
                    checksum,
                } => {
                    let state = &mut states[bucket];
                    state.checksums[index] = Some(checksum);
                    outcome.files_checksummed += 1;
                    on_event(PipelineEvent::Hashed {
                        path: state.records[index].path.clone(),
                        bytes: state.size,
                        stage: HashStage::Checksum,
                    });
                    bucket
                }
                HashMessage::Digested {
                    bucket,
                    index,
                    digest,
                } => {
                    let state = &mut states[bucket];
                    state.digests[index] = Some(digest);
                    outcome.files_digested += 1;
                    on_event(PipelineEvent::Hashed {
                        path: state.records[index].path.clone(),
                        bytes: state.size,
                        stage: HashStage::Digest,
                    });
                    bucket
                }
                HashMessage::Failed {
                    bucket,
                    index,
                    warning,
                } => {
                    let state = &mut states[bucket];
                    state.checksums[index] = None;
                    state.digests[index] = None;
                    outcome.files_failed += 1;
                    on_event(PipelineEvent::Warning(warning));
                    bucket
                }
                HashMessage::Skipped { bucket } => {
                    states[bucket].skipped = true;
                    bucket
                }
            };

            let state = &mut states[bucket];
            state.pending -= 1;
            if state.pending > 0 {
                continue;
            }

            if state.skipped {
                log::debug!("Abandoning {} byte bucket after cancellation", state.size);
                outcome.buckets_abandoned += 1;
                continue;
            }

            match state.stage {
                HashStage::Checksum => {
                    let collisions = state.checksum_collisions();
                    if collisions.is_empty() {
                        outcome.buckets_resolved += 1;
                        on_event(PipelineEvent::BucketResolved(Vec::new()));
                        continue;
                    }
                    if self.is_shutdown_requested() {
                        outcome.buckets_abandoned += 1;
                        continue;
                    }

                    state.stage = HashStage::Digest;
                    for (_, members) in &collisions {
                        for &i in members {
                            state.pending += 1;
                            outstanding += 1;
                            self.spawn_job(&tx, HashStage::Digest, bucket, i, &state.records[i]);
                        }
                    }
                }
                HashStage::Digest => {
                    outcome.buckets_resolved += 1;
                    on_event(PipelineEvent::BucketResolved(state.take_match_groups()));
                }
            }
        }

        outcome.interrupted = self.is_shutdown_requested() || outcome.buckets_abandoned > 0;
        log::info!(
            "Hashing complete: {} checksummed, {} digested, {} failed{}",
            outcome.files_checksummed,
            outcome.files_digested,
            outcome.files_failed,
            if outcome.interrupted {
                " (interrupted)"
            } else {
                ""
            }
        );
        outcome
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn hash_one(
    fs: &dyn FileSystem,
    path: &std::path::Path,
    expected: u64,
    stage: HashStage,
    algorithm: DigestAlgorithm,
    bucket: usize,
    index: usize,
) -> HashMessage {
    let failed = |warning| HashMessage::Failed {
        bucket,
        index,
        warning,
    };

    let reader = match fs.open_read(path) {
        Ok(reader) => reader,
        Err(e) => return failed(ScanWarning::from_io(path, &e)),
    };

    let result = match stage {
        HashStage::Checksum => {
            checksum_reader(reader).map(|(c, len)| (HashValue::Checksum(c), len))
        }
        HashStage::Digest => {
            digest_reader(reader, algorithm).map(|(d, len)| (HashValue::Digest(d), len))
        }
    };

    match result {
        Ok((_, len)) if len != expected => failed(ScanWarning::SizeChanged {
            path: path.to_path_buf(),
            expected,
            actual: len,
        }),
        Ok((HashValue::Checksum(checksum), _)) => HashMessage::Checksummed {
            bucket,
            index,
            checksum,
        },
        Ok((HashValue::Digest(digest), _)) => HashMessage::Digested {
            bucket,
            index,
            digest,
        },
        Err(e) => failed(ScanWarning::from_io(path, &e)),
    }
}

enum HashValue {
    Checksum(Checksum),
    Digest(Digest),
}
