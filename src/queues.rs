//! Queue classes, module identifiers, and the module-to-queue map.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Index, IndexMut};

/// Priority classes scanned by the dispatcher, ordered from most to least
/// critical.
///
/// The ordering is stable so the dispatch loop can rely on integer indexes
/// instead of branching on specific labels. Index 0 is serviced first on
/// every scan pass; adding a class only requires appending it to
/// [`QueueClass::ALL`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QueueClass {
    /// Timer expirations; always drained before anything else.
    Timer,
    /// Low-volume system events (power, firmware notifications).
    System,
    /// Controller messages (connection and session management).
    Control,
    /// Datapath control messages; highest volume, lowest urgency.
    Data,
}

impl QueueClass {
    /// Ordered list of all classes (highest priority first).
    pub const ALL: [QueueClass; 4] = [
        QueueClass::Timer,
        QueueClass::System,
        QueueClass::Control,
        QueueClass::Data,
    ];

    /// Stable index used for class-based arrays.
    pub const fn index(self) -> usize {
        match self {
            QueueClass::Timer => 0,
            QueueClass::System => 1,
            QueueClass::Control => 2,
            QueueClass::Data => 3,
        }
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            QueueClass::Timer => "timer",
            QueueClass::System => "system",
            QueueClass::Control => "control",
            QueueClass::Data => "data",
        };
        write!(f, "{label}")
    }
}

/// Logical modules that post to and are served by the dispatcher.
///
/// Many module ids map onto the small fixed set of physical queues; the
/// mapping is established during handler registration and immutable
/// afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleId {
    Timers,
    Power,
    Mlme,
    Session,
    Firmware,
    Datapath,
    Diag,
}

impl ModuleId {
    /// All module ids, in stable index order.
    pub const ALL: [ModuleId; 7] = [
        ModuleId::Timers,
        ModuleId::Power,
        ModuleId::Mlme,
        ModuleId::Session,
        ModuleId::Firmware,
        ModuleId::Datapath,
        ModuleId::Diag,
    ];

    /// Stable index used by the module map.
    pub const fn index(self) -> usize {
        match self {
            ModuleId::Timers => 0,
            ModuleId::Power => 1,
            ModuleId::Mlme => 2,
            ModuleId::Session => 3,
            ModuleId::Firmware => 4,
            ModuleId::Datapath => 5,
            ModuleId::Diag => 6,
        }
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ModuleId::Timers => "timers",
            ModuleId::Power => "power",
            ModuleId::Mlme => "mlme",
            ModuleId::Session => "session",
            ModuleId::Firmware => "firmware",
            ModuleId::Datapath => "datapath",
            ModuleId::Diag => "diag",
        };
        write!(f, "{label}")
    }
}

/// Helper structure wrapping one value per [`QueueClass`].
///
/// Keeps call sites stable when classes are added: as long as
/// [`QueueClass::ALL`] is updated, the table grows automatically and all
/// iteration happens through the ordered class list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTable<T> {
    values: Vec<T>,
}

impl<T> QueueTable<T> {
    /// Build a table by executing a closure for each class in scan order.
    pub fn from_fn(mut f: impl FnMut(QueueClass) -> T) -> Self {
        let mut values = Vec::with_capacity(QueueClass::ALL.len());
        for class in QueueClass::ALL {
            values.push(f(class));
        }
        QueueTable { values }
    }

    /// Borrow the value for a given class.
    pub fn get(&self, class: QueueClass) -> &T {
        &self.values[class.index()]
    }

    /// Mutably borrow the value for a given class.
    pub fn get_mut(&mut self, class: QueueClass) -> &mut T {
        &mut self.values[class.index()]
    }
}

impl<T> Index<QueueClass> for QueueTable<T> {
    type Output = T;

    fn index(&self, index: QueueClass) -> &Self::Output {
        self.get(index)
    }
}

impl<T> IndexMut<QueueClass> for QueueTable<T> {
    fn index_mut(&mut self, index: QueueClass) -> &mut Self::Output {
        self.get_mut(index)
    }
}

/// Module-to-queue lookup table.
///
/// Entries start unbound (the rejection sentinel) and are written only while
/// the scheduler is being built; steady-state dispatch reads the map without
/// a lock by construction.
#[derive(Debug, Clone)]
pub struct ModuleMap {
    entries: [Option<QueueClass>; ModuleId::ALL.len()],
}

impl ModuleMap {
    pub fn new() -> Self {
        Self {
            entries: [None; ModuleId::ALL.len()],
        }
    }

    /// Bind a module id to a queue class. Later bindings win; this only
    /// happens during registration.
    pub fn bind(&mut self, module: ModuleId, class: QueueClass) {
        self.entries[module.index()] = Some(class);
    }

    /// Resolve a module id, or `None` when the module was never registered.
    pub fn resolve(&self, module: ModuleId) -> Option<QueueClass> {
        self.entries[module.index()]
    }

    /// True when the module has a binding.
    pub fn is_bound(&self, module: ModuleId) -> bool {
        self.entries[module.index()].is_some()
    }
}

impl Default for ModuleMap {
    fn default() -> Self {
        Self::new()
    }
}
