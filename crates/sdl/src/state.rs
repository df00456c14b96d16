//! State instances and the descriptor-guided blob codec.

use std::sync::Arc;

use chrono::Utc;
use snafu::Snafu;

use relto_vault::wire::{read_wire_string, write_wire_string};

use crate::descriptor::{DescriptorDb, StateDescriptor, VarDescriptor, VarKind};

/// Seconds-and-microseconds timestamp used throughout SDL streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UnifiedTime {
    pub secs: u32,
    pub micros: u32,
}

impl UnifiedTime {
    /// The current time.
    pub fn now() -> Self {
        let now = Utc::now();
        UnifiedTime {
            secs: now.timestamp().max(0) as u32,
            micros: now.timestamp_subsec_micros(),
        }
    }
}

/// Errors from blob parsing and variable updates.
#[derive(Debug, Snafu)]
pub enum SdlError {
    /// The catalog has no descriptor with this name.
    #[snafu(display("No descriptor named {name}"))]
    DescriptorNotFound {
        /// The requested descriptor name.
        name: String,
    },

    /// The blob was produced by a different schema version.
    #[snafu(display("Descriptor {name} is version {expected}, blob carries {found}"))]
    VersionMismatch {
        /// Descriptor name.
        name: String,
        /// Catalog version.
        expected: u16,
        /// Version found in the blob.
        found: u16,
    },

    /// The blob ended before the announced content.
    #[snafu(display("State blob truncated at offset {offset}"))]
    Truncated {
        /// Byte offset where more data was expected.
        offset: usize,
    },

    /// A wire string inside the blob was malformed.
    #[snafu(context(false), display("Malformed string in state blob: {source}"))]
    Wire {
        /// The underlying string codec error.
        source: relto_vault::WireError,
    },

    /// No variable with this name exists in the descriptor.
    #[snafu(display("Descriptor has no variable named {name}"))]
    VarNotFound {
        /// The requested variable name.
        name: String,
    },

    /// Remote updates cannot carry this variable's type.
    #[snafu(display("Variable {name} has a type that remote updates cannot carry"))]
    NotSupported {
        /// The variable name.
        name: String,
    },
}

/// Result type for SDL operations.
pub type Result<T> = std::result::Result<T, SdlError>;

/// Typed value storage for one variable.
#[derive(Debug, Clone, PartialEq)]
pub enum Values {
    Bool(Vec<bool>),
    Byte(Vec<i8>),
    Short(Vec<i16>),
    Int(Vec<i32>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    String(Vec<String>),
    Time(Vec<UnifiedTime>),
    Vector3(Vec<[f32; 3]>),
    Point3(Vec<[f32; 3]>),
    Quat(Vec<[f32; 4]>),
    Rgb8(Vec<[u8; 3]>),
    StateDesc(Vec<State>),
}

impl Values {
    /// Number of stored elements.
    pub fn len(&self) -> usize {
        match self {
            Values::Bool(v) => v.len(),
            Values::Byte(v) => v.len(),
            Values::Short(v) => v.len(),
            Values::Int(v) => v.len(),
            Values::Float(v) => v.len(),
            Values::Double(v) => v.len(),
            Values::String(v) => v.len(),
            Values::Time(v) => v.len(),
            Values::Vector3(v) => v.len(),
            Values::Point3(v) => v.len(),
            Values::Quat(v) => v.len(),
            Values::Rgb8(v) => v.len(),
            Values::StateDesc(v) => v.len(),
        }
    }

    /// True when no element is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// One variable instance: descriptor, flags, timestamp, values.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// The schema entry this variable instantiates.
    pub desc: VarDescriptor,
    /// Flag byte; see the associated constants.
    pub flags: u8,
    /// Last-change timestamp, meaningful when `HAS_TIMESTAMP` is set.
    pub timestamp: UnifiedTime,
    /// Element storage, matching `desc.kind`.
    pub values: Values,
}

impl Variable {
    /// The variable carries a timestamp in the stream.
    pub const HAS_TIMESTAMP: u8 = 0x04;
    /// The variable still holds its schema default.
    pub const SAME_AS_DEFAULT: u8 = 0x08;
    /// The variable changed since the state was last persisted.
    pub const DIRTY: u8 = 0x10;
    /// A timestamp should be attached on the next change.
    pub const WANT_TIMESTAMP: u8 = 0x20;

    /// Creates a fresh instance holding the schema default.
    pub fn default_instance(desc: &VarDescriptor, db: &DescriptorDb) -> Result<Self> {
        Ok(Variable {
            desc: desc.clone(),
            flags: Self::SAME_AS_DEFAULT,
            timestamp: UnifiedTime::default(),
            values: default_values(desc, db)?,
        })
    }

    /// Resets the variable to its schema default.
    pub fn set_default(&mut self, db: &DescriptorDb) -> Result<()> {
        self.values = default_values(&self.desc, db)?;
        self.flags |= Self::SAME_AS_DEFAULT;
        Ok(())
    }
}

fn zero_values(kind: &VarKind, count: usize, db: &DescriptorDb) -> Result<Values> {
    Ok(match kind {
        VarKind::Bool => Values::Bool(vec![false; count]),
        VarKind::Byte => Values::Byte(vec![0; count]),
        VarKind::Short => Values::Short(vec![0; count]),
        VarKind::Int => Values::Int(vec![0; count]),
        VarKind::Float => Values::Float(vec![0.0; count]),
        VarKind::Double => Values::Double(vec![0.0; count]),
        VarKind::String => Values::String(vec![String::new(); count]),
        VarKind::Time => Values::Time(vec![UnifiedTime::default(); count]),
        VarKind::Vector3 => Values::Vector3(vec![[0.0; 3]; count]),
        VarKind::Point3 => Values::Point3(vec![[0.0; 3]; count]),
        VarKind::Quat => Values::Quat(vec![[0.0, 0.0, 0.0, 1.0]; count]),
        VarKind::Rgb8 => Values::Rgb8(vec![[0; 3]; count]),
        VarKind::StateDesc(name) => {
            let mut states = Vec::with_capacity(count);
            for _ in 0..count {
                states.push(State::default_instance(db, name)?);
            }
            Values::StateDesc(states)
        }
    })
}

fn default_values(desc: &VarDescriptor, db: &DescriptorDb) -> Result<Values> {
    let count = desc.initial_count();
    let mut values = zero_values(&desc.kind, count, db)?;
    if let Some(default) = &desc.default {
        apply_parsed(&mut values, &desc.kind, default, 0..count);
    }
    Ok(values)
}

/// Parses `text` with the lenient coercion the protocol has always used
/// (unparseable numerics become zero) and assigns it to the given slots.
fn apply_parsed(
    values: &mut Values,
    kind: &VarKind,
    text: &str,
    slots: std::ops::Range<usize>,
) {
    match (values, kind) {
        (Values::Bool(v), VarKind::Bool) => {
            let parsed = matches!(text.trim(), "1" | "true" | "TRUE" | "True");
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::Byte(v), VarKind::Byte) => {
            let parsed = text.trim().parse().unwrap_or(0);
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::Short(v), VarKind::Short) => {
            let parsed = text.trim().parse().unwrap_or(0);
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::Int(v), VarKind::Int) => {
            let parsed = text.trim().parse().unwrap_or(0);
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::Float(v), VarKind::Float) => {
            let parsed = text.trim().parse().unwrap_or(0.0);
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::Double(v), VarKind::Double) => {
            let parsed = text.trim().parse().unwrap_or(0.0);
            for i in slots {
                v[i] = parsed;
            }
        }
        (Values::String(v), VarKind::String) => {
            for i in slots {
                v[i] = text.to_string();
            }
        }
        // Compound defaults are not expressible as a single token; the
        // schema loader never produces them.
        _ => {}
    }
}

/// One instance of a state descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    /// The catalog descriptor this state instantiates.
    pub descriptor: Arc<StateDescriptor>,
    /// Simple variables, in descriptor order.
    pub simple_vars: Vec<Variable>,
    /// Nested state variables, in descriptor order.
    pub sd_vars: Vec<Variable>,
}

impl State {
    /// Creates a default instance of the named descriptor.
    pub fn default_instance(db: &DescriptorDb, name: &str) -> Result<Self> {
        let descriptor = db
            .get(name)
            .ok_or_else(|| SdlError::DescriptorNotFound { name: name.to_string() })?;

        let mut simple_vars = Vec::with_capacity(descriptor.simple_vars.len());
        for desc in &descriptor.simple_vars {
            simple_vars.push(Variable::default_instance(desc, db)?);
        }
        let mut sd_vars = Vec::with_capacity(descriptor.sd_vars.len());
        for desc in &descriptor.sd_vars {
            sd_vars.push(Variable::default_instance(desc, db)?);
        }
        Ok(State { descriptor, simple_vars, sd_vars })
    }

    /// Serializes the state to its persistent blob form.
    pub fn to_blob(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_wire_string(&mut out, &self.descriptor.name);
        out.extend_from_slice(&self.descriptor.version.to_le_bytes());
        out.push(0);
        out.extend_from_slice(&(self.simple_vars.len() as u32).to_le_bytes());
        for var in &self.simple_vars {
            write_variable(&mut out, var);
        }
        out.extend_from_slice(&(self.sd_vars.len() as u32).to_le_bytes());
        for var in &self.sd_vars {
            write_variable(&mut out, var);
        }
        out
    }

    /// Parses a blob against the catalog.
    pub fn from_blob(db: &DescriptorDb, data: &[u8]) -> Result<Self> {
        let mut cursor = Cursor { data, pos: 0 };
        let name = cursor.string()?;
        let descriptor = db
            .get(&name)
            .ok_or_else(|| SdlError::DescriptorNotFound { name: name.clone() })?;
        let version = cursor.u16()?;
        if version != descriptor.version {
            return Err(SdlError::VersionMismatch {
                name,
                expected: descriptor.version,
                found: version,
            });
        }
        cursor.u8()?; // header flag byte, reserved

        let simple_count = cursor.u32()? as usize;
        let mut simple_vars = Vec::with_capacity(simple_count.min(descriptor.simple_vars.len()));
        for desc in descriptor.simple_vars.iter().take(simple_count) {
            simple_vars.push(read_variable(&mut cursor, desc, db)?);
        }
        let sd_count = cursor.u32()? as usize;
        let mut sd_vars = Vec::with_capacity(sd_count.min(descriptor.sd_vars.len()));
        for desc in descriptor.sd_vars.iter().take(sd_count) {
            sd_vars.push(read_variable(&mut cursor, desc, db)?);
        }
        Ok(State { descriptor, simple_vars, sd_vars })
    }

    /// Applies a remote update to the named simple variable.
    ///
    /// Marks the variable timestamped and dirty. An empty value resets
    /// the variable to its schema default; otherwise the value is parsed
    /// per the declared type. Only Bool, Byte, Short, Int, and String can
    /// be carried by remote updates.
    pub fn set_by_name(&mut self, db: &DescriptorDb, name: &str, value: &str) -> Result<()> {
        let var = self
            .simple_vars
            .iter_mut()
            .find(|var| var.desc.name == name)
            .ok_or_else(|| SdlError::VarNotFound { name: name.to_string() })?;

        match var.desc.kind {
            VarKind::Bool
            | VarKind::Byte
            | VarKind::Short
            | VarKind::Int
            | VarKind::String => {}
            _ if !value.is_empty() => {
                return Err(SdlError::NotSupported { name: name.to_string() });
            }
            _ => {}
        }

        var.flags |= Variable::HAS_TIMESTAMP | Variable::DIRTY;
        var.timestamp = UnifiedTime::now();

        if value.is_empty() {
            var.set_default(db)?;
        } else {
            var.flags &= !Variable::SAME_AS_DEFAULT;
            if var.values.is_empty() {
                var.values = zero_values(&var.desc.kind, 1, db)?;
            }
            apply_parsed(&mut var.values, &var.desc.kind, value, 0..1);
        }
        Ok(())
    }
}

// ============================================================================
// Variable codec
// ============================================================================

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(SdlError::Truncated { offset: self.pos }),
        }
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.u32()?))
    }

    fn f64(&mut self) -> Result<f64> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(f64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String> {
        let (value, consumed) = read_wire_string(&self.data[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }

    fn time(&mut self) -> Result<UnifiedTime> {
        Ok(UnifiedTime { secs: self.u32()?, micros: self.u32()? })
    }
}

fn write_variable(out: &mut Vec<u8>, var: &Variable) {
    out.push(var.flags);
    if var.flags & Variable::HAS_TIMESTAMP != 0 {
        out.extend_from_slice(&var.timestamp.secs.to_le_bytes());
        out.extend_from_slice(&var.timestamp.micros.to_le_bytes());
    }
    if var.desc.count.is_none() {
        out.extend_from_slice(&(var.values.len() as u32).to_le_bytes());
    }
    match &var.values {
        Values::Bool(v) => {
            for value in v {
                out.push(u8::from(*value));
            }
        }
        Values::Byte(v) => {
            for value in v {
                out.push(*value as u8);
            }
        }
        Values::Short(v) => {
            for value in v {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Values::Int(v) => {
            for value in v {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Values::Float(v) => {
            for value in v {
                out.extend_from_slice(&value.to_bits().to_le_bytes());
            }
        }
        Values::Double(v) => {
            for value in v {
                out.extend_from_slice(&value.to_le_bytes());
            }
        }
        Values::String(v) => {
            for value in v {
                write_wire_string(out, value);
            }
        }
        Values::Time(v) => {
            for value in v {
                out.extend_from_slice(&value.secs.to_le_bytes());
                out.extend_from_slice(&value.micros.to_le_bytes());
            }
        }
        Values::Vector3(v) | Values::Point3(v) => {
            for value in v {
                for component in value {
                    out.extend_from_slice(&component.to_bits().to_le_bytes());
                }
            }
        }
        Values::Quat(v) => {
            for value in v {
                for component in value {
                    out.extend_from_slice(&component.to_bits().to_le_bytes());
                }
            }
        }
        Values::Rgb8(v) => {
            for value in v {
                out.extend_from_slice(value);
            }
        }
        Values::StateDesc(v) => {
            for state in v {
                let nested = state.to_blob();
                out.extend_from_slice(&(nested.len() as u32).to_le_bytes());
                out.extend_from_slice(&nested);
            }
        }
    }
}

fn read_variable(cursor: &mut Cursor<'_>, desc: &VarDescriptor, db: &DescriptorDb) -> Result<Variable> {
    let flags = cursor.u8()?;
    let timestamp = if flags & Variable::HAS_TIMESTAMP != 0 {
        cursor.time()?
    } else {
        UnifiedTime::default()
    };
    let count = match desc.count {
        Some(count) => count,
        None => cursor.u32()? as usize,
    };
    // Pre-allocation is capped; an absurd count fails at read time.
    let capacity = count.min(64);

    let values = match &desc.kind {
        VarKind::Bool => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.u8()? != 0);
            }
            Values::Bool(v)
        }
        VarKind::Byte => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.u8()? as i8);
            }
            Values::Byte(v)
        }
        VarKind::Short => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.u16()? as i16);
            }
            Values::Short(v)
        }
        VarKind::Int => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.u32()? as i32);
            }
            Values::Int(v)
        }
        VarKind::Float => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.f32()?);
            }
            Values::Float(v)
        }
        VarKind::Double => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.f64()?);
            }
            Values::Double(v)
        }
        VarKind::String => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.string()?);
            }
            Values::String(v)
        }
        VarKind::Time => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push(cursor.time()?);
            }
            Values::Time(v)
        }
        VarKind::Vector3 | VarKind::Point3 => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push([cursor.f32()?, cursor.f32()?, cursor.f32()?]);
            }
            if matches!(desc.kind, VarKind::Vector3) {
                Values::Vector3(v)
            } else {
                Values::Point3(v)
            }
        }
        VarKind::Quat => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                v.push([cursor.f32()?, cursor.f32()?, cursor.f32()?, cursor.f32()?]);
            }
            Values::Quat(v)
        }
        VarKind::Rgb8 => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                let bytes = cursor.take(3)?;
                v.push([bytes[0], bytes[1], bytes[2]]);
            }
            Values::Rgb8(v)
        }
        VarKind::StateDesc(_) => {
            let mut v = Vec::with_capacity(capacity);
            for _ in 0..count {
                let len = cursor.u32()? as usize;
                let nested = cursor.take(len)?;
                v.push(State::from_blob(db, nested)?);
            }
            Values::StateDesc(v)
        }
    };

    Ok(Variable { desc: desc.clone(), flags, timestamp, values })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::descriptor::{StateDescriptor, VarDescriptor, VarKind};

    fn catalog() -> DescriptorDb {
        let mut db = DescriptorDb::new();
        db.register(StateDescriptor {
            name: "Garden".to_string(),
            version: 2,
            simple_vars: vec![
                VarDescriptor::single("bugsVisible", VarKind::Bool).with_default("1"),
                VarDescriptor::single("bugCount", VarKind::Int).with_default("12"),
                VarDescriptor::single("weather", VarKind::String),
                VarDescriptor {
                    name: "rainTimes".to_string(),
                    kind: VarKind::Time,
                    count: None,
                    default: None,
                },
            ],
            sd_vars: Vec::new(),
        });
        db
    }

    #[test]
    fn test_default_instance_carries_schema_defaults() {
        let db = catalog();
        let state = State::default_instance(&db, "garden").expect("default state");
        assert_eq!(state.simple_vars.len(), 4);
        assert_eq!(state.simple_vars[0].values, Values::Bool(vec![true]));
        assert_eq!(state.simple_vars[1].values, Values::Int(vec![12]));
        assert_eq!(state.simple_vars[2].values, Values::String(vec![String::new()]));
        assert!(state.simple_vars[3].values.is_empty());
        for var in &state.simple_vars {
            assert!(var.flags & Variable::SAME_AS_DEFAULT != 0);
        }
    }

    #[test]
    fn test_blob_roundtrip() {
        let db = catalog();
        let mut state = State::default_instance(&db, "Garden").expect("default state");
        state.set_by_name(&db, "bugCount", "77").expect("set bugCount");
        state.set_by_name(&db, "weather", "rainy").expect("set weather");

        let blob = state.to_blob();
        let decoded = State::from_blob(&db, &blob).expect("decode blob");
        assert_eq!(decoded, state);
        assert_eq!(decoded.to_blob(), blob);
    }

    #[test]
    fn test_update_marks_flags() {
        let db = catalog();
        let mut state = State::default_instance(&db, "Garden").expect("default state");
        state.set_by_name(&db, "bugCount", "3").expect("set");

        let var = &state.simple_vars[1];
        assert_eq!(var.values, Values::Int(vec![3]));
        assert!(var.flags & Variable::HAS_TIMESTAMP != 0);
        assert!(var.flags & Variable::DIRTY != 0);
        assert!(var.flags & Variable::SAME_AS_DEFAULT == 0);
        assert!(var.timestamp.secs > 0);
    }

    #[test]
    fn test_empty_value_resets_to_default() {
        let db = catalog();
        let mut state = State::default_instance(&db, "Garden").expect("default state");
        state.set_by_name(&db, "bugCount", "99").expect("set");
        state.set_by_name(&db, "bugCount", "").expect("reset");

        let var = &state.simple_vars[1];
        assert_eq!(var.values, Values::Int(vec![12]));
        assert!(var.flags & Variable::SAME_AS_DEFAULT != 0);
    }

    #[test]
    fn test_unknown_variable() {
        let db = catalog();
        let mut state = State::default_instance(&db, "Garden").expect("default state");
        assert!(matches!(
            state.set_by_name(&db, "lakeLevel", "5"),
            Err(SdlError::VarNotFound { .. })
        ));
    }

    #[test]
    fn test_unsupported_kind() {
        let db = catalog();
        let mut state = State::default_instance(&db, "Garden").expect("default state");
        assert!(matches!(
            state.set_by_name(&db, "rainTimes", "now"),
            Err(SdlError::NotSupported { .. })
        ));
    }

    #[test]
    fn test_version_mismatch() {
        let db = catalog();
        let state = State::default_instance(&db, "Garden").expect("default state");
        let mut blob = state.to_blob();
        // The version lives right after the name string.
        let (_, name_len) = read_wire_string(&blob).expect("name");
        blob[name_len] = 9;
        assert!(matches!(
            State::from_blob(&db, &blob),
            Err(SdlError::VersionMismatch { found: 9, .. })
        ));
    }

    #[test]
    fn test_nested_state_roundtrip() {
        let mut db = catalog();
        db.register(StateDescriptor {
            name: "GardenCloud".to_string(),
            version: 1,
            simple_vars: vec![VarDescriptor::single("height", VarKind::Float).with_default("4.5")],
            sd_vars: Vec::new(),
        });
        db.register(StateDescriptor {
            name: "GardenSky".to_string(),
            version: 1,
            simple_vars: Vec::new(),
            sd_vars: vec![VarDescriptor {
                name: "clouds".to_string(),
                kind: VarKind::StateDesc("GardenCloud".to_string()),
                count: Some(2),
                default: None,
            }],
        });

        let state = State::default_instance(&db, "GardenSky").expect("default state");
        let blob = state.to_blob();
        let decoded = State::from_blob(&db, &blob).expect("decode");
        assert_eq!(decoded, state);
    }
}
