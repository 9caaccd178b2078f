//! Server list that records how the client rates servers.

use std::sync::{Mutex, MutexGuard, PoisonError};

use steamframe::{
    connection::ProtocolTypes,
    discovery::{BasicServerList, ServerEndpoint, ServerList, ServerQuality, ServerRecord},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// A [`BasicServerList`] that keeps a log of marks and replacements.
#[derive(Default)]
pub struct MockServerList {
    inner: BasicServerList,
    marks: Mutex<Vec<(ServerEndpoint, ServerQuality)>>,
    replacements: Mutex<Vec<Vec<ServerRecord>>>,
}

impl MockServerList {
    /// Create a list seeded with `records`.
    pub fn new(records: Vec<ServerRecord>) -> Self {
        Self {
            inner: BasicServerList::new(records),
            ..Self::default()
        }
    }

    /// Every mark requested so far, in order.
    pub fn marks(&self) -> Vec<(ServerEndpoint, ServerQuality)> { lock(&self.marks).clone() }

    /// Marks of the given quality.
    pub fn marked(&self, quality: ServerQuality) -> Vec<ServerEndpoint> {
        lock(&self.marks)
            .iter()
            .filter(|(_, marked)| *marked == quality)
            .map(|(endpoint, _)| endpoint.clone())
            .collect()
    }

    /// Lists passed to `replace_list`, in order.
    pub fn replacements(&self) -> Vec<Vec<ServerRecord>> { lock(&self.replacements).clone() }
}

impl ServerList for MockServerList {
    fn next_candidate(&self, protocols: ProtocolTypes) -> Option<ServerRecord> { self.inner.next_candidate(protocols) }

    fn try_mark(&self, endpoint: &ServerEndpoint, protocols: ProtocolTypes, quality: ServerQuality) -> bool {
        lock(&self.marks).push((endpoint.clone(), quality));
        self.inner.try_mark(endpoint, protocols, quality)
    }

    fn replace_list(&self, records: Vec<ServerRecord>) {
        lock(&self.replacements).push(records.clone());
        self.inner.replace_list(records);
    }

    fn records(&self) -> Vec<ServerRecord> { self.inner.records() }
}
