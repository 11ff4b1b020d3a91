//! In-memory link between two controllers
//!
//! A [`Link`] yields one [`Endpoint`] per side. Each side publishes its
//! mapped registers; the peer's exchange requests read those published
//! values and queue writes into the side's inbox. Buffering makes the
//! transfer look synchronous to the instruction even though each side
//! steps on its own schedule.
//!
//! Dropping an endpoint severs the link: the surviving side's exchanges
//! report [`ExchangeError::Timeout`] from then on.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;
use tracing::trace;

use relay_engine::{Exchange, ExchangeError};
use relay_model::{HwAddress, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    A,
    B,
}

impl Side {
    fn peer(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::A => 0,
            Side::B => 1,
        }
    }
}

#[derive(Debug, Default)]
struct SideState {
    registers: IndexMap<HwAddress, Value>,
    inbox: Vec<(HwAddress, Value)>,
    live: bool,
}

#[derive(Debug, Default)]
struct LinkState {
    sides: [SideState; 2],
}

/// Constructor for a connected endpoint pair.
pub struct Link;

impl Link {
    pub fn pair() -> (Endpoint, Endpoint) {
        let state = Arc::new(Mutex::new(LinkState {
            sides: [
                SideState {
                    live: true,
                    ..SideState::default()
                },
                SideState {
                    live: true,
                    ..SideState::default()
                },
            ],
        }));
        (
            Endpoint {
                side: Side::A,
                state: Arc::clone(&state),
            },
            Endpoint {
                side: Side::B,
                state,
            },
        )
    }
}

/// One side of a link. Implements [`Exchange`] against the peer's
/// published registers.
pub struct Endpoint {
    side: Side,
    state: Arc<Mutex<LinkState>>,
}

impl Endpoint {
    /// Publish one of this side's registers for the peer to exchange
    /// with. Publishing also defines the register's value kind.
    pub fn expose(&self, address: HwAddress, value: Value) {
        let mut state = self.lock();
        state.sides[self.side.index()].registers.insert(address, value);
    }

    /// Drain writes the peer queued against this side since the last
    /// drain.
    pub fn take_inbox(&self) -> Vec<(HwAddress, Value)> {
        let mut state = self.lock();
        std::mem::take(&mut state.sides[self.side.index()].inbox)
    }

    pub fn peer_live(&self) -> bool {
        self.lock().sides[self.side.peer().index()].live
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LinkState> {
        // A poisoned link mutex means a panic mid-exchange on the other
        // side; the register file itself is still a plain value store.
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        self.lock().sides[self.side.index()].live = false;
    }
}

impl Exchange for Endpoint {
    fn read(&mut self, address: HwAddress) -> Result<Value, ExchangeError> {
        let state = self.lock();
        let peer = &state.sides[self.side.peer().index()];
        if !peer.live {
            return Err(ExchangeError::Timeout(address));
        }
        peer.registers
            .get(&address)
            .copied()
            .ok_or(ExchangeError::Unmapped(address))
    }

    fn write(&mut self, address: HwAddress, value: Value) -> Result<(), ExchangeError> {
        let mut state = self.lock();
        let peer = &mut state.sides[self.side.peer().index()];
        if !peer.live {
            return Err(ExchangeError::Timeout(address));
        }
        let slot = peer
            .registers
            .get_mut(&address)
            .ok_or(ExchangeError::Unmapped(address))?;
        if slot.kind() != value.kind() {
            return Err(ExchangeError::KindMismatch(address));
        }
        *slot = value;
        peer.inbox.push((address, value));
        trace!(%address, %value, "wire write queued");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_model::Region;

    fn addr(index: u16) -> HwAddress {
        HwAddress {
            region: Region::Holding,
            index,
        }
    }

    #[test]
    fn exchange_reaches_the_peer_register_file() {
        let (mut a, b) = Link::pair();
        b.expose(addr(3), Value::U16(0));

        assert_eq!(a.read(addr(3)).unwrap(), Value::U16(0));
        a.write(addr(3), Value::U16(42)).unwrap();
        assert_eq!(a.read(addr(3)).unwrap(), Value::U16(42));
        assert_eq!(b.take_inbox(), vec![(addr(3), Value::U16(42))]);
        assert!(b.take_inbox().is_empty());
    }

    #[test]
    fn unmapped_and_mismatched_exchanges_fail_cleanly() {
        let (mut a, b) = Link::pair();
        b.expose(addr(1), Value::Bool(false));

        assert_eq!(a.read(addr(9)), Err(ExchangeError::Unmapped(addr(9))));
        assert_eq!(
            a.write(addr(1), Value::U16(1)),
            Err(ExchangeError::KindMismatch(addr(1)))
        );
        // The register keeps its value; nothing was queued.
        assert_eq!(a.read(addr(1)).unwrap(), Value::Bool(false));
        assert!(b.take_inbox().is_empty());
    }

    #[test]
    fn dropping_a_side_times_out_the_survivor() {
        let (mut a, b) = Link::pair();
        b.expose(addr(0), Value::Bool(true));
        assert!(a.peer_live());

        drop(b);
        assert!(!a.peer_live());
        assert_eq!(a.read(addr(0)), Err(ExchangeError::Timeout(addr(0))));
        assert_eq!(
            a.write(addr(0), Value::Bool(false)),
            Err(ExchangeError::Timeout(addr(0)))
        );
    }
}
