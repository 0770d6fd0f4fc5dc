//! Scripted activator shared by the pipeline tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};

use commap_core::model::{ClassRecord, InterfaceRecord};
use commap_core::probe::{ActivatableClass, ActivationError, Activator, ComInstance};
use commap_core::source::{Inventory, InventorySource};
use uuid::Uuid;

pub const IUNKNOWN: &str = "{00000000-0000-0000-C000-000000000046}";
pub const IDISPATCH: &str = "{00020400-0000-0000-C000-000000000046}";
pub const IPERSIST: &str = "{0000010C-0000-0000-C000-000000000046}";

#[derive(Debug, Clone)]
pub enum Behavior {
    Unregistered,
    FailsToInstantiate,
    Supports(BTreeSet<Uuid>),
}

/// Activator driven by a per-class behavior table. Classes missing from the
/// table behave as unregistered.
#[derive(Debug, Clone, Default)]
pub struct ScriptedActivator {
    classes: BTreeMap<Uuid, Behavior>,
}

impl ScriptedActivator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn supports(mut self, clsid: &str, iids: &[&str]) -> Self {
        let set = iids.iter().map(|iid| guid(iid)).collect();
        self.classes.insert(guid(clsid), Behavior::Supports(set));
        self
    }

    pub fn failing(mut self, clsid: &str) -> Self {
        self.classes.insert(guid(clsid), Behavior::FailsToInstantiate);
        self
    }
}

impl Activator for ScriptedActivator {
    fn resolve(&self, clsid: Uuid) -> Result<Box<dyn ActivatableClass>, ActivationError> {
        match self.classes.get(&clsid) {
            None | Some(Behavior::Unregistered) => {
                Err(ActivationError::with_code(0x8004_0154_u32 as i32, "Class not registered"))
            }
            Some(behavior) => Ok(Box::new(ScriptedClass(behavior.clone()))),
        }
    }
}

struct ScriptedClass(Behavior);

impl ActivatableClass for ScriptedClass {
    fn instantiate(&self) -> Result<Box<dyn ComInstance>, ActivationError> {
        match &self.0 {
            Behavior::Supports(set) => Ok(Box::new(ScriptedInstance(set.clone()))),
            _ => Err(ActivationError::new("server refused to create an instance")),
        }
    }
}

struct ScriptedInstance(BTreeSet<Uuid>);

impl ComInstance for ScriptedInstance {
    fn negotiate(&self, iid: Uuid) -> Result<bool, ActivationError> {
        Ok(self.0.contains(&iid))
    }
}

pub fn guid(text: &str) -> Uuid {
    Uuid::parse_str(text.trim_matches(|c| c == '{' || c == '}')).expect("test guid")
}

pub fn standard_interfaces() -> Vec<InterfaceRecord> {
    vec![
        InterfaceRecord::new(IUNKNOWN).with_name(Some("IUnknown".into())),
        InterfaceRecord::new(IDISPATCH).with_name(Some("IDispatch".into())),
        InterfaceRecord::new(IPERSIST).with_name(Some("IPersist".into())),
    ]
}

pub fn inventory(classes: Vec<ClassRecord>) -> InventorySource {
    InventorySource::from_inventory(Inventory { classes, interfaces: standard_interfaces() })
}
