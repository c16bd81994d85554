//! # Client Rate Negotiation
//!
//! Every client interested in a domain records a minimum rate per clock.
//! The rate applied to a clock is the maximum over all clients' requests, or
//! the clock's default rate when no client is registered. Removing a client
//! can therefore only lower or hold a rate.

use arrayvec::ArrayVec;
use hashbrown::HashMap;
use pmdomain_hal::Hertz;

use crate::config::MAX_CLOCKS;

/// Identity of a client of a domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClientId(pub u64);

/// Per-clock rate requests of one client
pub(crate) type RateRequests = ArrayVec<Hertz, MAX_CLOCKS>;

/// Client requests of one domain
#[derive(Debug, Default)]
pub(crate) struct ClientTable {
    entries: HashMap<ClientId, RateRequests>,
}

impl ClientTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a client requesting the default rates; false if already present
    pub fn insert(&mut self, client: ClientId, defaults: &[Hertz]) -> bool {
        if self.entries.contains_key(&client) {
            return false;
        }
        self.entries.insert(client, defaults.iter().copied().collect());
        true
    }

    /// Record a request, registering the client first if needed
    ///
    /// Returns the previous request at `index`, `None` if the client was new.
    pub fn set(
        &mut self,
        client: ClientId,
        index: usize,
        rate: Hertz,
        defaults: &[Hertz],
    ) -> Option<Hertz> {
        let existed = self.entries.contains_key(&client);
        let requests = self
            .entries
            .entry(client)
            .or_insert_with(|| defaults.iter().copied().collect());

        let slot = requests.get_mut(index)?;
        let previous = core::mem::replace(slot, rate);
        existed.then_some(previous)
    }

    /// Undo a `set` that could not be applied
    pub fn restore(&mut self, client: ClientId, index: usize, previous: Option<Hertz>) {
        match previous {
            Some(rate) => {
                if let Some(slot) = self.entries.get_mut(&client).and_then(|r| r.get_mut(index)) {
                    *slot = rate;
                }
            },
            None => {
                self.entries.remove(&client);
            },
        }
    }

    /// Forget a client, handing back its requests
    pub fn remove(&mut self, client: ClientId) -> Option<RateRequests> {
        self.entries.remove(&client)
    }

    /// Put back requests taken by `remove`
    pub fn reinsert(&mut self, client: ClientId, requests: RateRequests) {
        self.entries.insert(client, requests);
    }

    /// A client's request for one clock
    pub fn get(&self, client: ClientId, index: usize) -> Option<Hertz> {
        self.entries.get(&client).and_then(|r| r.get(index).copied())
    }

    /// Rate to apply to clock `index`
    pub fn effective(&self, index: usize, default: Hertz) -> Hertz {
        self.entries
            .values()
            .filter_map(|r| r.get(index).copied())
            .max()
            .unwrap_or(default)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
