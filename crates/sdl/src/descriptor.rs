//! The read-only descriptor catalog.

use std::collections::HashMap;
use std::sync::Arc;

/// Value type of an SDL variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarKind {
    Bool,
    Byte,
    Short,
    Int,
    Float,
    Double,
    String,
    Time,
    Vector3,
    Point3,
    Quat,
    Rgb8,
    /// Nested state; the name must resolve in the same catalog.
    StateDesc(String),
}

/// Schema of one variable within a state descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct VarDescriptor {
    /// Variable name, unique within its descriptor.
    pub name: String,
    /// Value type.
    pub kind: VarKind,
    /// Fixed element count, or `None` for variable-length arrays.
    pub count: Option<usize>,
    /// Default value as written in the schema, if any. Parsed lazily
    /// with the same coercion rules as remote updates.
    pub default: Option<String>,
}

impl VarDescriptor {
    /// Convenience constructor for a single-element variable.
    pub fn single(name: impl Into<String>, kind: VarKind) -> Self {
        VarDescriptor { name: name.into(), kind, count: Some(1), default: None }
    }

    /// Attaches a schema default.
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }

    /// Number of elements a fresh instance carries.
    pub fn initial_count(&self) -> usize {
        self.count.unwrap_or(0)
    }
}

/// Schema of one age's synchronized state.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDescriptor {
    /// Descriptor name; matches the age filename for age states.
    pub name: String,
    /// Schema version carried in every blob.
    pub version: u16,
    /// Simple (non-nested) variables, in declaration order.
    pub simple_vars: Vec<VarDescriptor>,
    /// Nested state-descriptor variables, in declaration order.
    pub sd_vars: Vec<VarDescriptor>,
}

/// In-memory descriptor catalog, keyed case-insensitively by name.
///
/// Built once at startup and treated as read-only afterwards.
#[derive(Debug, Default)]
pub struct DescriptorDb {
    by_name: HashMap<String, Arc<StateDescriptor>>,
}

impl DescriptorDb {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        DescriptorDb::default()
    }

    /// Registers a descriptor, replacing any previous registration of
    /// the same name.
    pub fn register(&mut self, descriptor: StateDescriptor) {
        self.by_name.insert(descriptor.name.to_lowercase(), Arc::new(descriptor));
    }

    /// Looks up a descriptor by name, case-insensitively.
    pub fn get(&self, name: &str) -> Option<Arc<StateDescriptor>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    /// Number of registered descriptors.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// True when no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut db = DescriptorDb::new();
        db.register(StateDescriptor {
            name: "Neighborhood".to_string(),
            version: 3,
            simple_vars: vec![VarDescriptor::single("nQuabs", VarKind::Int)],
            sd_vars: Vec::new(),
        });

        assert!(db.get("neighborhood").is_some());
        assert!(db.get("NEIGHBORHOOD").is_some());
        assert!(db.get("Teledahn").is_none());
    }

    #[test]
    fn test_register_replaces() {
        let mut db = DescriptorDb::new();
        for version in [1, 2] {
            db.register(StateDescriptor {
                name: "city".to_string(),
                version,
                simple_vars: Vec::new(),
                sd_vars: Vec::new(),
            });
        }
        assert_eq!(db.len(), 1);
        assert_eq!(db.get("city").expect("descriptor").version, 2);
    }
}
