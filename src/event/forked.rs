//! Joins several asynchronous completions into a single callback.
//!
//! A [`ForkedListener`] is created for a known number of forks. Every fork
//! reports through [`ForkedListener::handle`]; once the last fork reports, the
//! all-done callback runs exactly once with every reported value in call order.

use std::fmt;

use parking_lot::Mutex;
use tracing::trace;

use super::error::EventError;

type EachCallback<T> = Box<dyn Fn(&T) + Send + Sync>;
type AllCallback<T> = Box<dyn FnOnce(Vec<T>) + Send>;

struct ForkState<T> {
    handled: usize,
    values: Vec<T>,
    on_all: Option<AllCallback<T>>,
}

/// Synchronizes N independent completions into one aggregate callback.
///
/// `handle` may be called from any thread; preparation callbacks of several
/// tracks commonly race to report.
pub struct ForkedListener<T> {
    num_forks: usize,
    on_each: EachCallback<T>,
    state: Mutex<ForkState<T>>,
}

impl<T: Send + 'static> ForkedListener<T> {
    /// Creates a listener expecting `num_forks` results.
    ///
    /// `on_each` runs for every handled value; `on_all` runs once after the
    /// last value with all values in call order. A listener created with zero
    /// forks never fires.
    pub fn new<E, A>(num_forks: usize, on_each: E, on_all: A) -> Self
    where
        E: Fn(&T) + Send + Sync + 'static,
        A: FnOnce(Vec<T>) + Send + 'static,
    {
        Self {
            num_forks,
            on_each: Box::new(on_each),
            state: Mutex::new(ForkState {
                handled: 0,
                values: Vec::with_capacity(num_forks),
                on_all: Some(Box::new(on_all)),
            }),
        }
    }

    /// Creates a listener that only reports the aggregate.
    pub fn all<A>(num_forks: usize, on_all: A) -> Self
    where
        A: FnOnce(Vec<T>) + Send + 'static,
    {
        Self::new(num_forks, |_| {}, on_all)
    }

    /// Reports one fork's result.
    ///
    /// # Errors
    ///
    /// Returns [`EventError::ForkOverflow`] if all forks have already reported.
    pub fn handle(&self, value: T) -> Result<(), EventError> {
        let finished = {
            let mut state = self.state.lock();
            if state.handled >= self.num_forks {
                return Err(EventError::ForkOverflow {
                    expected: self.num_forks,
                });
            }

            (self.on_each)(&value);
            state.values.push(value);
            state.handled += 1;
            trace!(handled = state.handled, expected = self.num_forks, "fork reported");

            if state.handled == self.num_forks {
                let values = std::mem::take(&mut state.values);
                state.on_all.take().map(|on_all| (on_all, values))
            } else {
                None
            }
        };

        if let Some((on_all, values)) = finished {
            on_all(values);
        }
        Ok(())
    }

    /// Returns the number of forks this listener waits for.
    #[must_use]
    pub fn num_forks(&self) -> usize {
        self.num_forks
    }

    /// Returns true once every fork has reported.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.state.lock().handled == self.num_forks && self.num_forks > 0
    }
}

impl<T> fmt::Debug for ForkedListener<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForkedListener")
            .field("num_forks", &self.num_forks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collecting(num_forks: usize) -> (ForkedListener<i32>, Arc<Mutex<Vec<Vec<i32>>>>) {
        let output = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&output);
        let fork = ForkedListener::all(num_forks, move |values| sink.lock().push(values));
        (fork, output)
    }

    #[test]
    fn test_no_handles_does_not_fire() {
        let (fork, output) = collecting(1);
        assert!(output.lock().is_empty());
        assert!(!fork.is_complete());
    }

    #[test]
    fn test_one_fork() {
        let (fork, output) = collecting(1);
        fork.handle(1).unwrap();
        assert_eq!(*output.lock(), vec![vec![1]]);
        assert!(fork.is_complete());
    }

    #[test]
    fn test_many_forks_in_order() {
        let (fork, output) = collecting(3);
        fork.handle(1).unwrap();
        fork.handle(2).unwrap();
        assert!(output.lock().is_empty());

        fork.handle(3).unwrap();
        assert_eq!(*output.lock(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_too_many_forks() {
        let (fork, output) = collecting(3);
        fork.handle(1).unwrap();
        fork.handle(2).unwrap();
        fork.handle(3).unwrap();

        let err = fork.handle(4).unwrap_err();
        assert_eq!(err, EventError::ForkOverflow { expected: 3 });
        assert_eq!(output.lock().len(), 1);
    }

    #[test]
    fn test_zero_forks_rejects_handle() {
        let (fork, output) = collecting(0);
        assert!(fork.handle(1).is_err());
        assert!(output.lock().is_empty());
    }

    #[test]
    fn test_each_callback_sees_every_value() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let fork = ForkedListener::new(2, move |v: &i32| sink.lock().push(*v), |_| {});

        fork.handle(7).unwrap();
        fork.handle(8).unwrap();
        assert_eq!(*seen.lock(), vec![7, 8]);
    }

    #[test]
    fn test_concurrent_handles_fire_once() {
        let (fork, output) = collecting(8);
        let fork = Arc::new(fork);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let fork = Arc::clone(&fork);
                std::thread::spawn(move || fork.handle(i).unwrap())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let output = output.lock();
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].len(), 8);
    }
}
