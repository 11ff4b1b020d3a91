//! Register-mapped view over one driver
//!
//! Local inspection/HMI surface: reads resolve through the address map
//! to the current snapshot's visible values (forces included); writes
//! become one-shot driver patches, landing with the next scan exactly
//! like in-program writes.

use relay_engine::{Driver, Exchange, ExchangeError};
use relay_model::{AddressMap, HwAddress, Value};

pub struct RegisterSurface<'a> {
    driver: &'a mut Driver,
    map: &'a AddressMap,
}

impl<'a> RegisterSurface<'a> {
    pub fn new(driver: &'a mut Driver, map: &'a AddressMap) -> Self {
        Self { driver, map }
    }
}

impl Exchange for RegisterSurface<'_> {
    fn read(&mut self, address: HwAddress) -> Result<Value, ExchangeError> {
        let tag = self
            .map
            .tag_at(address)
            .ok_or(ExchangeError::Unmapped(address))?;
        self.driver
            .current()
            .read(tag)
            .map_err(|_| ExchangeError::Unmapped(address))
    }

    fn write(&mut self, address: HwAddress, value: Value) -> Result<(), ExchangeError> {
        let tag = self
            .map
            .tag_at(address)
            .ok_or(ExchangeError::Unmapped(address))?;
        self.driver
            .patch(tag, value)
            .map_err(|_| ExchangeError::KindMismatch(address))
    }
}
