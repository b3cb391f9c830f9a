// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Background sample loading: a worker pool feeding a bounded queue.
//!
//! Workers claim sample indices from a shared window, so the split is read
//! without shuffling and wraps around at the end, like an unbounded epoch
//! queue. The consumer restores index order before handing samples out. No
//! index at or past `next + queue_capacity` is claimed, which bounds both the
//! queue and the reorder buffer.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

use burn::data::dataset::Dataset;
use common::Preprocessing;
use log::debug;
use proto::{ImageSize, Sample};

use crate::dataset::ImageRecord;
use crate::error::EvalError;

/// Queue capacity as a multiple of the batch size.
pub const QUEUE_CAPACITY_FACTOR: usize = 5;

type Message = (usize, Result<Sample, EvalError>);

#[derive(Debug, Default)]
struct Claims {
    /// Next index a worker may claim.
    cursor: usize,
    /// Index the consumer is waiting for.
    next: usize,
}

/// Claimable indices are `[next, next + capacity)`.
struct ClaimWindow {
    claims: Mutex<Claims>,
    advanced: Condvar,
    capacity: usize,
    stop: AtomicBool,
}

impl ClaimWindow {
    fn new(capacity: usize) -> Self {
        Self {
            claims: Mutex::new(Claims::default()),
            advanced: Condvar::new(),
            capacity,
            stop: AtomicBool::new(false),
        }
    }

    /// Blocks until an index fits in the window; `None` once stopped.
    fn claim(&self) -> Option<usize> {
        let mut claims = self.claims.lock().ok()?;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            if claims.cursor < claims.next + self.capacity {
                let index = claims.cursor;
                claims.cursor += 1;
                return Some(index);
            }
            claims = self.advanced.wait(claims).ok()?;
        }
    }

    fn advance(&self, next: usize) {
        if let Ok(mut claims) = self.claims.lock() {
            claims.next = next;
        }
        self.advanced.notify_all();
    }

    fn stop(&self) {
        // Taken under the lock so no worker misses the wakeup between its check and wait.
        let _claims = self.claims.lock();
        self.stop.store(true, Ordering::SeqCst);
        self.advanced.notify_all();
    }
}

#[derive(Clone, Debug)]
pub struct ProviderConfig {
    pub num_threads: usize,
    pub queue_capacity: usize,
    pub labels_offset: usize,
    pub preprocessing: Preprocessing,
    pub image_size: ImageSize,
}

impl ProviderConfig {
    pub fn new(preprocessing: Preprocessing, image_size: ImageSize, batch_size: usize) -> Self {
        Self {
            num_threads: 1,
            queue_capacity: QUEUE_CAPACITY_FACTOR * batch_size,
            labels_offset: 0,
            preprocessing,
            image_size,
        }
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_labels_offset(mut self, labels_offset: usize) -> Self {
        self.labels_offset = labels_offset;
        self
    }
}

pub struct SampleProvider {
    receiver: Option<Receiver<Message>>,
    workers: Vec<thread::JoinHandle<()>>,
    window: Arc<ClaimWindow>,
    pending: BTreeMap<usize, Result<Sample, EvalError>>,
    next: usize,
}

impl SampleProvider {
    /// Spawns the workers; they start filling the queue immediately.
    pub fn start(
        dataset: Arc<dyn Dataset<ImageRecord>>,
        config: ProviderConfig,
    ) -> Result<Self, EvalError> {
        if dataset.len() == 0 {
            return Err(EvalError::NoSamples);
        }
        let capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::sync_channel::<Message>(capacity);
        let window = Arc::new(ClaimWindow::new(capacity));
        let config = Arc::new(config);

        let workers = (0..config.num_threads.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    dataset: dataset.clone(),
                    config: config.clone(),
                    window: window.clone(),
                    sender: sender.clone(),
                };
                thread::spawn(move || worker.run())
            })
            .collect();

        Ok(Self {
            receiver: Some(receiver),
            workers,
            window,
            pending: BTreeMap::new(),
            next: 0,
        })
    }

    /// The next sample in dataset order, blocking until a worker delivers it.
    pub fn next_sample(&mut self) -> Result<Sample, EvalError> {
        loop {
            if let Some(result) = self.pending.remove(&self.next) {
                self.next += 1;
                self.window.advance(self.next);
                return result;
            }
            let receiver = self.receiver.as_ref().ok_or(EvalError::WorkerFailed)?;
            let (index, result) = receiver.recv().map_err(|_| EvalError::WorkerFailed)?;
            self.pending.insert(index, result);
        }
    }

    pub fn next_batch(&mut self, batch_size: usize) -> Result<Vec<Sample>, EvalError> {
        (0..batch_size).map(|_| self.next_sample()).collect()
    }

    /// Signals every worker, unblocks those waiting on a full queue, and joins them all.
    pub fn stop(&mut self) -> Result<(), EvalError> {
        self.window.stop();
        self.receiver.take();
        self.pending.clear();

        let mut panicked = false;
        for handle in self.workers.drain(..) {
            panicked |= handle.join().is_err();
        }
        debug!("Sample provider stopped after {} samples", self.next);

        if panicked {
            Err(EvalError::WorkerFailed)
        } else {
            Ok(())
        }
    }
}

impl Drop for SampleProvider {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            let _ = self.stop();
        }
    }
}

struct Worker {
    id: usize,
    dataset: Arc<dyn Dataset<ImageRecord>>,
    config: Arc<ProviderConfig>,
    window: Arc<ClaimWindow>,
    sender: SyncSender<Message>,
}

impl Worker {
    fn run(self) {
        debug!("Worker {} started", self.id);
        let len = self.dataset.len();
        while let Some(index) = self.window.claim() {
            let result = self.load(index % len);
            if self.sender.send((index, result)).is_err() {
                // The consumer is gone.
                break;
            }
        }
        debug!("Worker {} exiting", self.id);
    }

    fn load(&self, index: usize) -> Result<Sample, EvalError> {
        let record = self.dataset.get(index).ok_or(EvalError::WorkerFailed)?;
        let image = record
            .load()
            .map_err(|source| EvalError::Sample { index, source })?;
        let pixels = self
            .config
            .preprocessing
            .apply(&image, self.config.image_size)
            .map_err(|source| EvalError::Sample { index, source })?;
        Ok(Sample {
            pixels,
            label: record.label as i64 - self.config.labels_offset as i64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ImageSource, SplitDataset};

    fn gray_dataset(labels: &[usize]) -> Arc<dyn Dataset<ImageRecord>> {
        let records = labels
            .iter()
            .map(|&label| ImageRecord {
                source: ImageSource::Gray {
                    width: 2,
                    height: 2,
                    pixels: Arc::from(&[label as u8 * 10; 4][..]),
                },
                label,
            })
            .collect();
        Arc::new(SplitDataset::new("synthetic", "test", 10, records))
    }

    fn config(batch_size: usize) -> ProviderConfig {
        ProviderConfig::new(Preprocessing::LeNet, ImageSize::square(2, 1), batch_size)
    }

    #[test]
    fn many_workers_keep_dataset_order_and_wrap_around() {
        let labels: Vec<usize> = (0..7).collect();
        let mut provider =
            SampleProvider::start(gray_dataset(&labels), config(3).with_num_threads(4)).unwrap();

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.extend(provider.next_batch(3).unwrap().into_iter().map(|s| s.label));
        }
        provider.stop().unwrap();

        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 6, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn labels_offset_is_subtracted() {
        let mut provider =
            SampleProvider::start(gray_dataset(&[1, 5, 0]), config(3).with_labels_offset(1))
                .unwrap();
        let labels: Vec<i64> = provider
            .next_batch(3)
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec![0, 4, -1]);
    }

    #[test]
    fn samples_are_preprocessed() {
        let mut provider = SampleProvider::start(gray_dataset(&[0]), config(1)).unwrap();
        let sample = provider.next_sample().unwrap();
        assert_eq!(sample.pixels, vec![-1.0; 4]);
    }

    #[test]
    fn stop_joins_workers_blocked_on_a_full_queue() {
        let mut provider =
            SampleProvider::start(gray_dataset(&[1, 2]), config(1).with_num_threads(3)).unwrap();
        // Give the workers time to fill the five-slot queue and block.
        thread::sleep(std::time::Duration::from_millis(50));
        provider.stop().unwrap();
        assert!(provider.workers.is_empty());
        assert!(matches!(provider.next_sample(), Err(EvalError::WorkerFailed)));
    }

    /// Stalls the first read of index 0 so the other workers run ahead.
    struct SlowFirst {
        inner: Arc<dyn Dataset<ImageRecord>>,
        stalled: AtomicBool,
    }

    impl Dataset<ImageRecord> for SlowFirst {
        fn get(&self, index: usize) -> Option<ImageRecord> {
            if index == 0 && !self.stalled.swap(true, Ordering::SeqCst) {
                thread::sleep(std::time::Duration::from_millis(300));
            }
            self.inner.get(index)
        }

        fn len(&self) -> usize {
            self.inner.len()
        }
    }

    #[test]
    fn slow_sample_does_not_let_workers_run_ahead() {
        let dataset = Arc::new(SlowFirst {
            inner: gray_dataset(&[1, 2, 3]),
            stalled: AtomicBool::new(false),
        });
        let config = config(2).with_num_threads(4);
        let capacity = config.queue_capacity;
        let mut provider = SampleProvider::start(dataset, config).unwrap();

        assert_eq!(provider.next_sample().unwrap().label, 1);
        assert!(provider.pending.len() <= capacity);

        let labels: Vec<i64> = provider
            .next_batch(5)
            .unwrap()
            .into_iter()
            .map(|s| s.label)
            .collect();
        assert_eq!(labels, vec![2, 3, 1, 2, 3]);
        assert!(provider.pending.len() <= capacity);
        provider.stop().unwrap();
    }

    #[test]
    fn load_failures_surface_with_the_sample_index() {
        let records = vec![ImageRecord {
            source: ImageSource::File("/nowhere/missing.png".into()),
            label: 0,
        }];
        let dataset: Arc<dyn Dataset<ImageRecord>> =
            Arc::new(SplitDataset::new("synthetic", "test", 10, records));
        let mut provider = SampleProvider::start(dataset, config(1)).unwrap();
        assert!(matches!(
            provider.next_sample(),
            Err(EvalError::Sample { index: 0, .. })
        ));
    }
}
