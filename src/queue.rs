//! A FIFO queue of outbound messages.
//!
//! The transmitter's worker thread waits on this queue for work, and returns failed messages to
//! the head so that delivery order is preserved across retries. The lock and condition variable
//! are internal; producers only see `put` and friends.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// A thread-safe FIFO queue with head reinsertion.
#[derive(Debug, Default)]
pub struct MessageQueue<T> {
    jobs: Mutex<VecDeque<T>>,
    available: Condvar,
}

impl<T> MessageQueue<T> {
    /// Creates a new, empty queue.
    ///
    /// # Examples
    ///
    /// ```
    /// let queue: sbd_directip::queue::MessageQueue<u8> = sbd_directip::queue::MessageQueue::new();
    /// assert!(queue.is_empty());
    /// ```
    pub fn new() -> MessageQueue<T> {
        MessageQueue {
            jobs: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
        }
    }

    /// Appends a job to the tail of the queue and notifies one waiter.
    pub fn put(&self, job: T) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push_back(job);
        self.available.notify_one();
    }

    /// Removes and returns the job at the head of the queue.
    pub fn get(&self) -> Option<T> {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.pop_front()
    }

    /// Returns a job to the head of the queue.
    ///
    /// Used to reinsert a job whose processing failed, so that it is retried before anything
    /// that was queued after it.
    pub fn unget(&self, job: T) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.push_front(job);
        self.available.notify_one();
    }

    /// Waits up to `timeout` for the queue to become non-empty.
    ///
    /// Returns true if the queue held a job before the timeout elapsed.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let jobs = self.jobs.lock().unwrap();
        if !jobs.is_empty() {
            return true;
        }
        let (jobs, _) = self.available.wait_timeout(jobs, timeout).unwrap();
        !jobs.is_empty()
    }

    /// Removes every job from the queue.
    pub fn clear(&self) {
        let mut jobs = self.jobs.lock().unwrap();
        jobs.clear();
    }

    /// Returns the number of queued jobs.
    pub fn len(&self) -> usize {
        let jobs = self.jobs.lock().unwrap();
        jobs.len()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn fifo() {
        let queue = MessageQueue::new();
        queue.put(1);
        queue.put(2);
        assert_eq!(2, queue.len());
        assert_eq!(Some(1), queue.get());
        assert_eq!(Some(2), queue.get());
        assert_eq!(None, queue.get());
    }

    #[test]
    fn unget_goes_to_the_head() {
        let queue = MessageQueue::new();
        queue.put(1);
        queue.put(2);
        let job = queue.get().unwrap();
        queue.unget(job);
        assert_eq!(Some(1), queue.get());
    }

    #[test]
    fn clear() {
        let queue = MessageQueue::new();
        queue.put(1);
        queue.clear();
        assert!(queue.is_empty());
    }

    #[test]
    fn wait_for_times_out() {
        let queue: MessageQueue<u8> = MessageQueue::new();
        let start = Instant::now();
        assert!(!queue.wait_for(Duration::from_millis(50)));
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn wait_for_returns_immediately_when_nonempty() {
        let queue = MessageQueue::new();
        queue.put(1);
        let start = Instant::now();
        assert!(queue.wait_for(Duration::from_secs(10)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wait_for_wakes_on_put() {
        let queue = Arc::new(MessageQueue::new());
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_for(Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(50));
        queue.put(1);
        assert!(waiter.join().unwrap());
    }
}
