//! Progress sinks for transient status events.

use std::fmt;
use std::sync::Arc;

/// A cheap, cloneable, synchronous sink for progress updates.
///
/// Updates are fire-and-forget: the sink never fails and may drop
/// everything ([`Progress::noop`]).
pub struct Progress<T> {
    sink: Arc<dyn Fn(T) + Send + Sync>,
}

impl<T: 'static> Progress<T> {
    /// Wrap a callback.
    pub fn new(sink: impl Fn(T) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    /// A sink that discards every update.
    pub fn noop() -> Self {
        Self::new(|_| {})
    }

    /// Deliver one update.
    pub fn emit(&self, update: T) {
        (self.sink)(update)
    }

    /// Build a sink for another update type that converts into this one.
    pub fn map<U: 'static>(&self, convert: impl Fn(U) -> T + Send + Sync + 'static) -> Progress<U> {
        let sink = Arc::clone(&self.sink);
        Progress::new(move |update| sink(convert(update)))
    }
}

impl<T> Clone for Progress<T> {
    fn clone(&self) -> Self {
        Self {
            sink: Arc::clone(&self.sink),
        }
    }
}

impl<T: 'static> Default for Progress<T> {
    fn default() -> Self {
        Self::noop()
    }
}

impl<T> fmt::Debug for Progress<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Progress")
    }
}

/// A [`Progress`] sink that forwards into an unbounded tokio channel.
///
/// Handy for consumers that want to `.recv().await` updates; a closed
/// receiver silently drops further updates.
pub fn channel<T: Send + 'static>() -> (Progress<T>, tokio::sync::mpsc::UnboundedReceiver<T>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let progress = Progress::new(move |update| {
        let _ = tx.send(update);
    });
    (progress, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emit_reaches_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = {
            let seen = Arc::clone(&seen);
            Progress::new(move |n: u32| seen.lock().unwrap().push(n))
        };

        sink.emit(1);
        sink.clone().emit(2);
        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn map_converts_before_delivery() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let strings = {
            let seen = Arc::clone(&seen);
            Progress::new(move |s: String| seen.lock().unwrap().push(s))
        };
        let numbers = strings.map(|n: u32| format!("#{n}"));

        numbers.emit(7);
        assert_eq!(*seen.lock().unwrap(), vec!["#7".to_string()]);
    }

    #[test]
    fn noop_accepts_anything() {
        Progress::<String>::noop().emit("ignored".into());
    }

    #[tokio::test]
    async fn channel_sink_delivers_in_order() {
        let (progress, mut rx) = channel::<&'static str>();
        progress.emit("a");
        progress.emit("b");
        drop(progress);

        assert_eq!(rx.recv().await, Some("a"));
        assert_eq!(rx.recv().await, Some("b"));
        assert_eq!(rx.recv().await, None);
    }
}
