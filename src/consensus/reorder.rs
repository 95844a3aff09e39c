//! Out-of-order completion, in-order delivery.
//!
//! [`ReorderBuffer`] holds results keyed by index and releases the longest
//! ready prefix each time a slot is filled. [`spawn_ordered`] runs indexed
//! tasks on a bounded worker pool and streams their results through such a
//! buffer, so consumers always see index 0, 1, 2, ... regardless of which
//! worker finishes first.

use crate::signal::Quit;
use crossbeam_channel::{bounded, select, unbounded, Receiver};
use std::sync::Arc;
use std::thread;
use tracing::trace;

#[derive(Debug)]
pub struct ReorderBuffer<T> {
    slots: Vec<Option<T>>,
    checked: Vec<bool>,
    next: usize,
}

impl<T> ReorderBuffer<T> {
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| None).collect(),
            checked: vec![false; len],
            next: 0,
        }
    }

    /// Record the result for `index` and return every result that is now
    /// deliverable, in index order. Out-of-range and duplicate indices are
    /// ignored.
    pub fn insert(&mut self, index: usize, value: T) -> Vec<T> {
        if index >= self.slots.len() || self.checked[index] {
            return Vec::new();
        }
        self.checked[index] = true;
        self.slots[index] = Some(value);

        let mut ready = Vec::new();
        while self.next < self.slots.len() && self.checked[self.next] {
            if let Some(value) = self.slots[self.next].take() {
                ready.push(value);
            }
            self.next += 1;
        }
        ready
    }

    /// Index of the oldest result not yet delivered.
    pub fn next_index(&self) -> usize {
        self.next
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.next == self.slots.len()
    }
}

/// Run `task(0..len)` on up to `workers` threads and deliver the results in
/// index order on the returned channel.
///
/// Firing `abort` stops the dispatcher and makes idle workers exit; a worker in
/// the middle of a task finishes it and then discards the result. The returned
/// channel disconnects after the last result or after an abort.
pub fn spawn_ordered<T, F>(len: usize, workers: usize, abort: Quit, task: F) -> Receiver<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let (out_tx, out_rx) = bounded(len.max(1));
    if len == 0 {
        return out_rx;
    }
    let workers = workers.clamp(1, len);
    let task = Arc::new(task);

    let (input_tx, input_rx) = unbounded::<usize>();
    for index in 0..len {
        // The receiver is alive in this scope, so sending cannot fail.
        let _ = input_tx.send(index);
    }
    drop(input_tx);

    let (done_tx, done_rx) = bounded::<(usize, T)>(workers);
    for _ in 0..workers {
        let input_rx = input_rx.clone();
        let done_tx = done_tx.clone();
        let abort = abort.clone();
        let task = Arc::clone(&task);
        thread::spawn(move || {
            for index in input_rx.iter() {
                if abort.is_fired() {
                    break;
                }
                let result = task(index);
                if done_tx.send((index, result)).is_err() {
                    break;
                }
            }
        });
    }
    drop(done_tx);

    thread::spawn(move || {
        let mut buffer = ReorderBuffer::new(len);
        loop {
            select! {
                recv(done_rx) -> msg => match msg {
                    Ok((index, result)) => {
                        for ready in buffer.insert(index, result) {
                            if out_tx.send(ready).is_err() {
                                abort.fire();
                                return;
                            }
                        }
                        if buffer.is_complete() {
                            return;
                        }
                    }
                    Err(_) => return,
                },
                recv(abort.receiver()) -> _ => {
                    trace!(delivered = buffer.next_index(), total = len, "Ordered dispatch aborted");
                    return;
                }
            }
        }
    });

    out_rx
}
