use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use burn::data::dataset::Dataset;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::warn;

use crate::config::ReferenceBatch;
use crate::data::provider::ImageDataset;
use crate::data::ImageItem;
use crate::error::{panic_message, Result, TrainError};

/// Epoch-wise batch iteration over a dataset split.
///
/// A shuffled stream draws a fresh permutation every epoch from its own seeded
/// generator and drops the incomplete tail; a sequential stream walks the split
/// in order and keeps it. With workers, items are fetched on a rayon pool by a
/// producer thread that stays at most `workers` batches ahead, always in epoch
/// order.
pub struct BatchStream {
    dataset: ImageDataset,
    batch_size: usize,
    drop_last: bool,
    rng: Option<StdRng>,
    pool: Option<Arc<ThreadPool>>,
    queue_depth: usize,
}

impl BatchStream {
    pub fn shuffled(dataset: ImageDataset, batch_size: usize, seed: u64) -> Self {
        assert!(batch_size > 0, "batch size must be positive");

        Self {
            dataset,
            batch_size,
            drop_last: true,
            rng: Some(StdRng::seed_from_u64(seed)),
            pool: None,
            queue_depth: 0,
        }
    }

    pub fn sequential(dataset: ImageDataset, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch size must be positive");

        Self {
            dataset,
            batch_size,
            drop_last: false,
            rng: None,
            pool: None,
            queue_depth: 0,
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Result<Self> {
        if workers == 0 {
            self.pool = None;
            self.queue_depth = 0;
            return Ok(self);
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|index| format!("batch-worker-{index}"))
            .build()
            .map_err(|err| TrainError::config(format!("cannot start {workers} batch workers: {err}")))?;

        self.pool = Some(Arc::new(pool));
        self.queue_depth = workers;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    pub fn num_batches(&self) -> usize {
        let len = self.dataset.len();

        match self.drop_last {
            true => len / self.batch_size,
            false => len.div_ceil(self.batch_size),
        }
    }

    /// Position of the designated batch within an epoch of this stream.
    pub fn designated_index(&self, which: ReferenceBatch) -> Option<usize> {
        match (which, self.num_batches()) {
            (_, 0) => None,
            (ReferenceBatch::First, _) => Some(0),
            (ReferenceBatch::Last, batches) => Some(batches - 1),
        }
    }

    /// Items of the designated batch, in dataset order.
    pub fn designated(&self, which: ReferenceBatch) -> Result<Vec<ImageItem>> {
        let index = self
            .designated_index(which)
            .ok_or_else(|| TrainError::config("split is too small to form a single batch"))?;

        let start = index * self.batch_size;
        let end = usize::min(start + self.batch_size, self.dataset.len());
        fetch(&self.dataset, &(start..end).collect_vec())
    }

    pub fn epoch(&mut self) -> EpochBatches {
        let mut order = (0..self.dataset.len()).collect_vec();
        if let Some(rng) = self.rng.as_mut() {
            order.shuffle(rng);
        }

        let batches = order
            .chunks(self.batch_size)
            .filter(|chunk| !self.drop_last || chunk.len() == self.batch_size)
            .map(<[usize]>::to_vec)
            .collect_vec();

        let source = match &self.pool {
            None => Source::Inline {
                dataset: self.dataset.clone(),
                batches: batches.into_iter(),
            },
            Some(pool) => spawn_producer(self.dataset.clone(), pool.clone(), batches, self.queue_depth),
        };

        EpochBatches { source }
    }
}

fn fetch(dataset: &ImageDataset, indices: &[usize]) -> Result<Vec<ImageItem>> {
    indices
        .iter()
        .map(|&index| dataset.get(index).ok_or(TrainError::MissingItem { index }))
        .collect()
}

fn spawn_producer(
    dataset: ImageDataset,
    pool: Arc<ThreadPool>,
    batches: Vec<Vec<usize>>,
    queue_depth: usize,
) -> Source {
    let (sender, receiver) = mpsc::sync_channel(queue_depth);
    let remaining = batches.len();

    let producer = thread::spawn(move || {
        for indices in batches {
            let items = pool.install(|| {
                indices
                    .par_iter()
                    .map(|&index| dataset.get(index).ok_or(TrainError::MissingItem { index }))
                    .collect::<Result<Vec<_>>>()
            });

            let failed = items.is_err();
            // the consumer went away or the epoch is broken
            if sender.send(items).is_err() || failed {
                break;
            }
        }
    });

    Source::Prefetch {
        receiver: Some(receiver),
        producer: Some(producer),
        remaining,
    }
}

enum Source {
    Inline {
        dataset: ImageDataset,
        batches: std::vec::IntoIter<Vec<usize>>,
    },
    Prefetch {
        receiver: Option<Receiver<Result<Vec<ImageItem>>>>,
        producer: Option<JoinHandle<()>>,
        /// Batches still owed by the producer.
        remaining: usize,
    },
}

/// One pass over a [`BatchStream`].
pub struct EpochBatches {
    source: Source,
}

impl Iterator for EpochBatches {
    type Item = Result<Vec<ImageItem>>;

    fn next(&mut self) -> Option<Self::Item> {
        match &mut self.source {
            Source::Inline { dataset, batches } => {
                let indices = batches.next()?;
                Some(fetch(dataset, &indices))
            }
            Source::Prefetch {
                receiver,
                producer,
                remaining,
            } => {
                let received = receiver.as_ref()?.recv();
                if let Ok(batch) = received {
                    // a failed batch is the last one the producer sends
                    *remaining = if batch.is_ok() { remaining.saturating_sub(1) } else { 0 };
                    return Some(batch);
                }

                receiver.take();
                match (producer.take().map(JoinHandle::join), *remaining) {
                    (Some(Err(payload)), _) => Some(Err(TrainError::BatchProducer {
                        reason: panic_message(payload.as_ref())
                            .unwrap_or_else(|| "producer thread panicked".to_string()),
                    })),
                    (_, 0) => None,
                    (_, missing) => Some(Err(TrainError::BatchProducer {
                        reason: format!("{missing} batches never arrived"),
                    })),
                }
            }
        }
    }
}

impl Drop for EpochBatches {
    fn drop(&mut self) {
        if let Source::Prefetch { receiver, producer, .. } = &mut self.source {
            // unblocks a producer waiting on a full queue
            drop(receiver.take());
            if let Some(Err(payload)) = producer.take().map(JoinHandle::join) {
                warn!(
                    reason = panic_message(payload.as_ref()).as_deref().unwrap_or("unknown"),
                    "batch producer of an abandoned epoch panicked"
                );
            }
        }
    }
}
