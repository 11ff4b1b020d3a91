//! Soft controller
//!
//! One driver, its address map, and a link endpoint, stepped as a unit.
//! Each [`SoftController::scan`] drains the inbox into driver patches,
//! runs one scan with the endpoint as the exchange surface, then
//! republishes the mapped registers from the new snapshot.

use tracing::{debug, instrument};

use relay_engine::{Driver, DriverResult, Dt, MonitorEvent, RewindPolicy};
use relay_model::{AddressMap, Program};

use crate::link::Endpoint;

pub struct SoftController {
    driver: Driver,
    map: AddressMap,
    endpoint: Endpoint,
}

impl SoftController {
    pub fn new(
        program: Program,
        policy: RewindPolicy,
        map: AddressMap,
        endpoint: Endpoint,
    ) -> Self {
        let controller = Self {
            driver: Driver::new(program, policy),
            map,
            endpoint,
        };
        controller.publish();
        controller
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver {
        &mut self.driver
    }

    pub fn map(&self) -> &AddressMap {
        &self.map
    }

    /// Apply writes the peer queued since the last scan. Runs
    /// automatically at the start of [`scan`]; callable on its own for
    /// a controller that is paused but still on the wire.
    pub fn poll(&mut self) -> DriverResult<usize> {
        let inbound = self.endpoint.take_inbox();
        let applied = inbound.len();
        for (address, value) in inbound {
            match self.map.tag_at(address) {
                Some(tag) => self.driver.patch(tag, value)?,
                // Register exposed but never mapped; nothing to store into.
                None => debug!(%address, "inbound write to unmapped register dropped"),
            }
        }
        Ok(applied)
    }

    /// One full protocol-aware scan.
    #[instrument(skip_all, fields(scan = self.driver.current().scan_index()))]
    pub fn scan(&mut self, dt: Dt) -> DriverResult<Vec<MonitorEvent>> {
        self.poll()?;
        let events = self.driver.step_with_io(dt, &mut self.endpoint)?;
        self.publish();
        Ok(events)
    }

    /// Mirror mapped tags into this side's register file so peer
    /// exchanges observe the latest snapshot.
    fn publish(&self) {
        for (tag, address) in self.map.iter() {
            if let Ok(value) = self.driver.current().read(tag) {
                self.endpoint.expose(address, value);
            }
        }
    }
}
