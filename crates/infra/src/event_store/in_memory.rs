use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use super::r#trait::{EventStore, EventStoreError};

type Stream<T> = Arc<Mutex<Vec<T>>>;

/// In-memory append-only event store.
///
/// Each stream has its own async mutex, held for the whole check-then-append,
/// so concurrent appends to one stream are serialised while different streams
/// never wait on each other. The outer map lock is only held to look a stream
/// up, insert it or remove it. A stream is only created by an append that
/// passes its version check, and deleting one waits for in-flight appends.
///
/// Intended for tests/dev. Not optimized for performance.
#[derive(Debug)]
pub struct InMemoryEventStore<T> {
    streams: RwLock<HashMap<String, Stream<T>>>,
}

impl<T> Default for InMemoryEventStore<T> {
    fn default() -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
        }
    }
}

impl<T> InMemoryEventStore<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn existing(&self, stream: &str) -> Option<Stream<T>> {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .cloned()
    }

    fn is_current(&self, stream: &str, handle: &Stream<T>) -> bool {
        self.streams
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(stream)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
    }

    fn get_or_create(&self, stream: &str) -> Stream<T> {
        if let Some(existing) = self.existing(stream) {
            return existing;
        }
        let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(streams.entry(stream.to_string()).or_default())
    }
}

#[async_trait]
impl<T> EventStore<T> for InMemoryEventStore<T>
where
    T: Clone + Send + Sync + 'static,
{
    async fn append(
        &self,
        stream: &str,
        entries: Vec<T>,
        expected_version: u64,
    ) -> Result<u64, EventStoreError> {
        loop {
            let handle = match self.existing(stream) {
                Some(handle) => handle,
                None if expected_version != 0 => {
                    return Err(EventStoreError::Concurrency {
                        stream: stream.to_string(),
                        expected: expected_version,
                        actual: 0,
                    });
                }
                None if entries.is_empty() => return Ok(0),
                None => self.get_or_create(stream),
            };
            let mut stored = handle.lock().await;
            if !self.is_current(stream, &handle) {
                // Deleted while we waited for the lock.
                continue;
            }

            let current = stored.len() as u64;
            if current != expected_version {
                return Err(EventStoreError::Concurrency {
                    stream: stream.to_string(),
                    expected: expected_version,
                    actual: current,
                });
            }

            let appended = entries.len();
            stored.extend(entries);
            let version = stored.len() as u64;
            debug!(stream, appended, version, "appended entries");
            return Ok(version);
        }
    }

    async fn load_stream(
        &self,
        stream: &str,
        from_version: Option<u64>,
    ) -> Result<Vec<T>, EventStoreError> {
        let Some(handle) = self.existing(stream) else {
            debug!(stream, "stream not found");
            return Ok(Vec::new());
        };
        let stored = handle.lock().await;

        let skip = from_version.map_or(0, |v| usize::try_from(v).unwrap_or(usize::MAX));
        let entries: Vec<T> = stored.iter().skip(skip).cloned().collect();
        debug!(stream, loaded = entries.len(), "loaded entries");
        Ok(entries)
    }

    async fn stream_exists(&self, stream: &str) -> Result<bool, EventStoreError> {
        match self.existing(stream) {
            Some(handle) => Ok(!handle.lock().await.is_empty()),
            None => Ok(false),
        }
    }

    async fn delete_stream(&self, stream: &str) -> Result<(), EventStoreError> {
        let Some(handle) = self.existing(stream) else {
            debug!(stream, existed = false, "deleted stream");
            return Ok(());
        };
        let mut stored = handle.lock().await;
        {
            let mut streams = self.streams.write().unwrap_or_else(PoisonError::into_inner);
            if streams.get(stream).is_some_and(|current| Arc::ptr_eq(current, &handle)) {
                streams.remove(stream);
            }
        }
        stored.clear();
        debug!(stream, existed = true, "deleted stream");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn append_assigns_versions_and_checks_expected_version() {
        let store = InMemoryEventStore::<&'static str>::new();

        assert_eq!(store.append("s", vec!["a"], 0).await.unwrap(), 1);
        assert_eq!(store.append("s", vec!["b", "c"], 1).await.unwrap(), 3);

        let err = store.append("s", vec!["d"], 1).await.unwrap_err();
        assert_eq!(
            err,
            EventStoreError::Concurrency {
                stream: "s".to_string(),
                expected: 1,
                actual: 3
            }
        );
        assert_eq!(store.load_stream("s", None).await.unwrap(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn expected_version_is_checked_for_new_streams_too() {
        let store = InMemoryEventStore::<u8>::new();
        let err = store.append("fresh", vec![1], 2).await.unwrap_err();
        assert!(err.is_concurrency());
        assert!(!store.stream_exists("fresh").await.unwrap());
    }

    #[tokio::test]
    async fn rejected_or_empty_appends_leave_no_stream_behind() {
        let store = InMemoryEventStore::<u8>::new();
        assert!(store.append("fresh", vec![1], 3).await.is_err());
        assert_eq!(store.append("fresh", vec![], 0).await.unwrap(), 0);
        assert!(store.streams.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_waits_for_in_flight_appends_and_later_appends_conflict() {
        let store = Arc::new(InMemoryEventStore::<u8>::new());
        store.append("s", vec![1], 0).await.unwrap();

        let handle = store.existing("s").unwrap();
        let in_flight = handle.lock().await;

        let deleting = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.delete_stream("s").await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!deleting.is_finished(), "delete takes the stream lock");

        let appending = tokio::spawn({
            let store = Arc::clone(&store);
            async move { store.append("s", vec![2], 1).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        drop(in_flight);
        deleting.await.unwrap().unwrap();
        assert_eq!(
            appending.await.unwrap().unwrap_err(),
            EventStoreError::Concurrency {
                stream: "s".to_string(),
                expected: 1,
                actual: 0
            }
        );
        assert!(!store.stream_exists("s").await.unwrap());
        assert!(store.streams.read().unwrap().is_empty());
    }

    #[tokio::test]
    async fn load_from_version_returns_later_entries_only() {
        let store = InMemoryEventStore::<u8>::new();
        store.append("s", vec![1, 2, 3, 4], 0).await.unwrap();

        assert_eq!(store.load_stream("s", Some(0)).await.unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(store.load_stream("s", Some(2)).await.unwrap(), vec![3, 4]);
        assert!(store.load_stream("s", Some(9)).await.unwrap().is_empty());
        assert!(store.load_stream("missing", None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn streams_are_independent() {
        let store = InMemoryEventStore::<u8>::new();
        store.append("a", vec![1], 0).await.unwrap();
        store.append("b", vec![2], 0).await.unwrap();

        assert_eq!(store.load_stream("a", None).await.unwrap(), vec![1]);
        assert_eq!(store.load_stream("b", None).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn exists_and_delete() {
        let store = InMemoryEventStore::<u8>::new();
        assert!(!store.stream_exists("s").await.unwrap());

        store.append("s", vec![], 0).await.unwrap();
        assert!(!store.stream_exists("s").await.unwrap(), "an empty stream does not exist");

        store.append("s", vec![1], 0).await.unwrap();
        assert!(store.stream_exists("s").await.unwrap());

        store.delete_stream("s").await.unwrap();
        assert!(!store.stream_exists("s").await.unwrap());
        store.delete_stream("s").await.unwrap();
        assert_eq!(store.append("s", vec![7], 0).await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_appends_with_the_same_expected_version_admit_one_winner() {
        let store = Arc::new(InMemoryEventStore::<usize>::new());
        store.append("s", vec![0], 0).await.unwrap();

        let attempts: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.append("s", vec![i], 1).await })
            })
            .collect();

        let mut winners = 0;
        for attempt in attempts {
            match attempt.await.unwrap() {
                Ok(version) => {
                    assert_eq!(version, 2);
                    winners += 1;
                }
                Err(err) => assert!(err.is_concurrency()),
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(store.load_stream("s", None).await.unwrap().len(), 2);
    }
}
