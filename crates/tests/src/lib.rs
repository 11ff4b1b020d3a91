//! Integration test harness for the relay workspace.
//!
//! Builds programs from JSON documents or builder closures, owns a
//! driver, and exposes name-keyed accessors so tests read like the
//! scenarios they describe.

use relay_engine::{Driver, Dt, MonitorEvent, RewindPolicy};
use relay_model::{Program, ProgramBuilder, ProgramDoc, TagId, Value};

/// Default scan time used by the harness: 10 ms.
pub const SCAN: Dt = Dt(10_000);

/// Test harness around one driver.
pub struct Harness {
    driver: Driver,
}

impl Harness {
    /// Build from a JSON program document.
    ///
    /// # Panics
    ///
    /// Panics if the document is malformed or fails to build.
    pub fn from_json(source: &str) -> Self {
        let doc = ProgramDoc::from_json(source).expect("malformed program document");
        let program = doc.build().expect("program failed to build");
        Self::from_program(program)
    }

    /// Build from a builder closure.
    pub fn build(f: impl FnOnce(&mut ProgramBuilder)) -> Self {
        let mut builder = ProgramBuilder::new(Default::default());
        f(&mut builder);
        Self::from_program(builder.finish().expect("program failed to build"))
    }

    pub fn from_program(program: Program) -> Self {
        Self::with_policy(program, RewindPolicy::Truncate)
    }

    pub fn with_policy(program: Program, policy: RewindPolicy) -> Self {
        Self {
            driver: Driver::new(program, policy),
        }
    }

    pub fn driver(&self) -> &Driver {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut Driver {
        &mut self.driver
    }

    pub fn tag(&self, name: &str) -> TagId {
        self.driver
            .program()
            .tags()
            .resolve(name)
            .unwrap_or_else(|| panic!("no tag named {name:?}"))
    }

    /// One scan at the default scan time.
    pub fn step(&mut self) -> Vec<MonitorEvent> {
        self.driver.step(SCAN).expect("scan failed")
    }

    pub fn run(&mut self, scans: u64) -> Vec<MonitorEvent> {
        self.driver.run(scans, SCAN).expect("scan failed")
    }

    /// Visible value of a tag by name.
    pub fn value(&self, name: &str) -> Value {
        let tag = self.tag(name);
        self.driver
            .current()
            .read(tag)
            .expect("tag missing from snapshot")
    }

    /// Visible boolean value of a tag by name.
    pub fn bool_tag(&self, name: &str) -> bool {
        match self.value(name) {
            Value::Bool(b) => b,
            other => panic!("{name} is {other}, not a boolean"),
        }
    }

    pub fn patch(&mut self, name: &str, value: Value) {
        let tag = self.tag(name);
        self.driver.patch(tag, value).expect("patch rejected");
    }

    pub fn force(&mut self, name: &str, value: Value) {
        let tag = self.tag(name);
        self.driver.force(tag, value).expect("force rejected");
    }

    pub fn remove_force(&mut self, name: &str) {
        let tag = self.tag(name);
        self.driver.remove_force(tag).expect("remove_force rejected");
    }

    /// Set a boolean input by force (the usual way tests drive
    /// "physical" inputs).
    pub fn set(&mut self, name: &str, on: bool) {
        self.force(name, Value::Bool(on));
    }
}
