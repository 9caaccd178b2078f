//! Default in-memory server list.

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::debug;

use super::{ServerEndpoint, ServerList, ServerQuality, ServerRecord};
use crate::connection::ProtocolTypes;

#[derive(Debug)]
struct Candidate {
    record: ServerRecord,
    bad: bool,
}

/// Ordered candidate list.
///
/// Candidates are offered in order, skipping servers marked bad while a
/// good one remains. Marking a server bad moves it to the back; marking it
/// good clears the flag in place.
///
/// ```
/// use steamframe::{
///     connection::ProtocolTypes,
///     discovery::{BasicServerList, ServerList, ServerQuality, ServerRecord},
/// };
///
/// let first = ServerRecord::socket_server("10.0.0.1:27017".parse().expect("addr"));
/// let second = ServerRecord::socket_server("10.0.0.2:27017".parse().expect("addr"));
/// let list = BasicServerList::new(vec![first.clone(), second.clone()]);
///
/// assert_eq!(list.next_candidate(ProtocolTypes::TCP), Some(first.clone()));
/// list.try_mark(first.endpoint(), ProtocolTypes::TCP, ServerQuality::Bad);
/// assert_eq!(list.next_candidate(ProtocolTypes::TCP), Some(second));
/// ```
#[derive(Debug, Default)]
pub struct BasicServerList {
    candidates: Mutex<Vec<Candidate>>,
}

impl BasicServerList {
    /// Create a list seeded with `records`.
    #[must_use]
    pub fn new(records: Vec<ServerRecord>) -> Self {
        let list = Self::default();
        list.replace_list(records);
        list
    }

    fn candidates(&self) -> MutexGuard<'_, Vec<Candidate>> {
        self.candidates.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServerList for BasicServerList {
    fn next_candidate(&self, protocols: ProtocolTypes) -> Option<ServerRecord> {
        let candidates = self.candidates();
        let mut usable = candidates
            .iter()
            .filter(|candidate| candidate.record.protocols().intersects(protocols));
        let first = usable.next()?;
        if !first.bad {
            return Some(first.record.clone());
        }
        let chosen = usable.find(|candidate| !candidate.bad).unwrap_or(first);
        Some(chosen.record.clone())
    }

    fn try_mark(&self, endpoint: &ServerEndpoint, protocols: ProtocolTypes, quality: ServerQuality) -> bool {
        let mut candidates = self.candidates();
        let Some(index) = candidates.iter().position(|candidate| {
            candidate.record.endpoint() == endpoint && candidate.record.protocols().intersects(protocols)
        }) else {
            debug!("cannot mark unknown server {endpoint} ({protocols}) as {quality:?}");
            return false;
        };

        match quality {
            ServerQuality::Good => candidates[index].bad = false,
            ServerQuality::Bad => {
                let mut candidate = candidates.remove(index);
                candidate.bad = true;
                candidates.push(candidate);
            }
        }
        debug!("marked {endpoint} ({protocols}) as {quality:?}");
        true
    }

    fn replace_list(&self, records: Vec<ServerRecord>) {
        let mut candidates = self.candidates();
        candidates.clear();
        for record in records {
            if candidates.iter().all(|existing| existing.record != record) {
                candidates.push(Candidate { record, bad: false });
            }
        }
        debug!("server list replaced with {} candidates", candidates.len());
    }

    fn records(&self) -> Vec<ServerRecord> {
        self.candidates()
            .iter()
            .map(|candidate| candidate.record.clone())
            .collect()
    }
}
