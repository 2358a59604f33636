//! Two-party rendez-vous used by the blocking broker.
//!
//! The first side to arrive on a port parks here; the matching side builds
//! the linked channel pair, fulfils the rendez-vous with the parked side's
//! end and returns its own. A matched rendez-vous has already left the port
//! table, so a third joiner is impossible.

use parking_lot::{Condvar, Mutex};

use super::channel::Channel;

/// Which operation is parked on this rendez-vous.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Pending {
    Accept,
    Connect,
}

pub(crate) struct RendezVous {
    side: Pending,
    // broker name of the parked side, for labeling the pair
    origin: String,
    cell: Mutex<Option<Channel>>,
    arrived: Condvar,
}

impl RendezVous {
    pub(crate) fn new(side: Pending, origin: String) -> Self {
        Self {
            side,
            origin,
            cell: Mutex::new(None),
            arrived: Condvar::new(),
        }
    }

    pub(crate) fn has_accept(&self) -> bool {
        self.side == Pending::Accept
    }

    pub(crate) fn origin_name(&self) -> &str {
        &self.origin
    }

    /// Blocks until the matching side fulfils the rendez-vous.
    pub(crate) fn join(&self) -> Channel {
        let mut cell = self.cell.lock();
        loop {
            if let Some(channel) = cell.take() {
                return channel;
            }
            self.arrived.wait(&mut cell);
        }
    }

    /// Hands the parked side its channel and releases it.
    pub(crate) fn fulfil(&self, channel: Channel) {
        let mut cell = self.cell.lock();
        *cell = Some(channel);
        self.arrived.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn join_blocks_until_fulfilled() {
        let rdv = Arc::new(RendezVous::new(Pending::Accept, "a".to_string()));
        let waiter = {
            let rdv = Arc::clone(&rdv);
            thread::spawn(move || rdv.join())
        };
        thread::sleep(Duration::from_millis(50));

        let (channel, _other) = Channel::pair("a", "b", 1, 16);
        rdv.fulfil(channel);
        let channel = waiter.join().unwrap();
        assert_eq!(channel.local_name(), "a");
    }

    #[test]
    fn fulfil_before_join_is_not_lost() {
        let rdv = RendezVous::new(Pending::Connect, "b".to_string());
        let (channel, _other) = Channel::pair("a", "b", 1, 16);
        rdv.fulfil(channel);
        assert_eq!(rdv.join().remote_name(), "b");
    }
}
