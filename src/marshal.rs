//! Value conventions shared by every native entry point: the value model, the argument stack,
//! composite result shapes and status codes.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::error::{ScriptError, ScriptResult};
use crate::world::{CreatureView, ItemView, Position};

pub const RET_OK: i64 = 0;
pub const RET_ERROR: i64 = -1;
pub const RET_TRUE: i64 = 1;
pub const RET_FALSE: i64 = 0;
pub const RET_NULL: i64 = 0;

/// Script-visible value. Tables keep their keys ordered so rendered output is stable.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScriptValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<ScriptValue>),
    Table(BTreeMap<String, ScriptValue>),
}

impl ScriptValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            ScriptValue::Nil => "nil",
            ScriptValue::Bool(_) => "boolean",
            ScriptValue::Int(_) | ScriptValue::Float(_) => "number",
            ScriptValue::Text(_) => "string",
            ScriptValue::Array(_) => "array",
            ScriptValue::Table(_) => "table",
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            ScriptValue::Int(value) => Some(*value as f64),
            ScriptValue::Float(value) => Some(*value),
            _ => None,
        }
    }

    /// Numeric values compare by value regardless of representation.
    pub fn loosely_equals(&self, other: &ScriptValue) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    pub fn field(&self, key: &str) -> Option<&ScriptValue> {
        match self {
            ScriptValue::Table(table) => table.get(key),
            _ => None,
        }
    }

    pub fn table<I, K>(entries: I) -> ScriptValue
    where
        I: IntoIterator<Item = (K, ScriptValue)>,
        K: Into<String>,
    {
        ScriptValue::Table(entries.into_iter().map(|(key, value)| (key.into(), value)).collect())
    }
}

impl From<i64> for ScriptValue {
    fn from(value: i64) -> Self {
        ScriptValue::Int(value)
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        ScriptValue::Int(i64::from(value))
    }
}

impl From<u32> for ScriptValue {
    fn from(value: u32) -> Self {
        ScriptValue::Int(i64::from(value))
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        ScriptValue::Bool(value)
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        ScriptValue::Text(value.to_string())
    }
}

impl From<String> for ScriptValue {
    fn from(value: String) -> Self {
        ScriptValue::Text(value)
    }
}

impl Position {
    /// Table form `{x, y, z, stackpos}` handed to scripts.
    pub fn to_value(self, stackpos: u32) -> ScriptValue {
        ScriptValue::table([
            ("x", ScriptValue::from(u32::from(self.x))),
            ("y", ScriptValue::from(u32::from(self.y))),
            ("z", ScriptValue::from(u32::from(self.z))),
            ("stackpos", ScriptValue::from(stackpos)),
        ])
    }

    /// Reads `{x, y, z[, stackpos]}`; a missing `stackpos` reads as zero.
    pub fn from_value(value: &ScriptValue) -> ScriptResult<(Position, u32)> {
        let ScriptValue::Table(_) = value else {
            return Err(ScriptError::invalid(format!("expected position table, got {}", value.type_name())));
        };
        let coord = |key: &str| -> ScriptResult<i64> {
            match value.field(key) {
                Some(field) => field
                    .as_number()
                    .map(|number| number as i64)
                    .ok_or_else(|| ScriptError::invalid(format!("position field '{key}' is not a number"))),
                None => Ok(0),
            }
        };
        let pos = Position {
            x: narrow(coord("x")?, "x")?,
            y: narrow(coord("y")?, "y")?,
            z: narrow(coord("z")?, "z")?,
        };
        Ok((pos, narrow(coord("stackpos")?, "stackpos")?))
    }
}

/// Script-visible summary of any object: `{uid, itemid, type, actionid}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ThingDescriptor {
    pub uid: u32,
    pub item_id: u16,
    pub kind: u16,
    pub action_id: u16,
}

impl ThingDescriptor {
    /// Returned when a lookup finds nothing.
    pub const EMPTY: ThingDescriptor = ThingDescriptor { uid: 0, item_id: 0, kind: 0, action_id: 0 };

    pub fn for_item(uid: u32, item: &ItemView) -> Self {
        Self { uid, item_id: item.type_id, kind: item.subtype, action_id: item.action_id }
    }

    /// Creatures report `itemid = 1` and their role tag as `type`.
    pub fn for_creature(uid: u32, creature: &CreatureView) -> Self {
        Self { uid, item_id: 1, kind: creature.role.tag(), action_id: 0 }
    }

    pub fn to_value(self) -> ScriptValue {
        ScriptValue::table([
            ("uid", ScriptValue::from(self.uid)),
            ("itemid", ScriptValue::from(u32::from(self.item_id))),
            ("type", ScriptValue::from(u32::from(self.kind))),
            ("actionid", ScriptValue::from(u32::from(self.action_id))),
        ])
    }
}

/// Declared shape of one entry-point parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Number,
    Text,
    Position,
    Array,
    Table,
    /// A script function, passed by name or as a function pointer.
    Callback,
    Any,
}

impl ArgKind {
    pub fn accepts(self, value: &ScriptValue) -> bool {
        match self {
            ArgKind::Number => matches!(value, ScriptValue::Int(_) | ScriptValue::Float(_) | ScriptValue::Bool(_)),
            ArgKind::Text => matches!(value, ScriptValue::Text(_) | ScriptValue::Int(_) | ScriptValue::Float(_)),
            ArgKind::Position | ArgKind::Table => matches!(value, ScriptValue::Table(_)),
            ArgKind::Array => matches!(value, ScriptValue::Array(_)),
            ArgKind::Callback => matches!(value, ScriptValue::Text(_)),
            ArgKind::Any => true,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ArgKind::Number => "number",
            ArgKind::Text => "string",
            ArgKind::Position => "position",
            ArgKind::Array => "array",
            ArgKind::Table => "table",
            ArgKind::Callback => "function",
            ArgKind::Any => "value",
        }
    }
}

/// Argument/result stack for a single native call. Arguments are pushed left to right and popped
/// right to left.
#[derive(Debug, Clone, Default)]
pub struct ValueStack {
    values: SmallVec<[ScriptValue; 8]>,
}

impl ValueStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_args(args: impl IntoIterator<Item = ScriptValue>) -> Self {
        Self { values: args.into_iter().collect() }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn push(&mut self, value: impl Into<ScriptValue>) {
        self.values.push(value.into());
    }

    pub fn push_position(&mut self, pos: Position, stackpos: u32) {
        self.values.push(pos.to_value(stackpos));
    }

    pub fn push_thing(&mut self, descriptor: ThingDescriptor) {
        self.values.push(descriptor.to_value());
    }

    pub fn pop(&mut self) -> ScriptResult<ScriptValue> {
        self.values.pop().ok_or_else(|| ScriptError::interface("value stack underflow"))
    }

    pub fn pop_int(&mut self) -> ScriptResult<i64> {
        match self.pop()? {
            ScriptValue::Int(value) => Ok(value),
            ScriptValue::Float(value) => Ok(value as i64),
            ScriptValue::Bool(value) => Ok(i64::from(value)),
            other => Err(mismatch(ArgKind::Number, &other)),
        }
    }

    pub fn pop_float(&mut self) -> ScriptResult<f64> {
        match self.pop()? {
            ScriptValue::Int(value) => Ok(value as f64),
            ScriptValue::Float(value) => Ok(value),
            other => Err(mismatch(ArgKind::Number, &other)),
        }
    }

    pub fn pop_u32(&mut self) -> ScriptResult<u32> {
        narrow(self.pop_int()?, "argument")
    }

    pub fn pop_i32(&mut self) -> ScriptResult<i32> {
        narrow(self.pop_int()?, "argument")
    }

    pub fn pop_u16(&mut self) -> ScriptResult<u16> {
        narrow(self.pop_int()?, "argument")
    }

    pub fn pop_u8(&mut self) -> ScriptResult<u8> {
        narrow(self.pop_int()?, "argument")
    }

    pub fn pop_text(&mut self) -> ScriptResult<String> {
        match self.pop()? {
            ScriptValue::Text(text) => Ok(text),
            ScriptValue::Int(value) => Ok(value.to_string()),
            ScriptValue::Float(value) => Ok(value.to_string()),
            other => Err(mismatch(ArgKind::Text, &other)),
        }
    }

    pub fn pop_position(&mut self) -> ScriptResult<(Position, u32)> {
        let value = self.pop()?;
        Position::from_value(&value)
    }

    pub fn pop_array(&mut self) -> ScriptResult<Vec<ScriptValue>> {
        match self.pop()? {
            ScriptValue::Array(items) => Ok(items),
            other => Err(mismatch(ArgKind::Array, &other)),
        }
    }

    /// Removes the top `count` values and returns them in push order.
    pub fn split_top(&mut self, count: usize) -> Vec<ScriptValue> {
        let start = self.values.len().saturating_sub(count);
        self.values.drain(start..).collect()
    }
}

fn narrow<T: TryFrom<i64>>(value: i64, what: &str) -> ScriptResult<T> {
    T::try_from(value).map_err(|_| ScriptError::invalid(format!("{what} {value} is out of range")))
}

fn mismatch(expected: ArgKind, got: &ScriptValue) -> ScriptError {
    ScriptError::invalid(format!("expected {}, got {}", expected.label(), got.type_name()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Stack size changed!")]
pub struct StackImbalance {
    pub expected: usize,
    pub actual: usize,
}

/// Records stack depth around a call so the result count can be verified against what the call
/// consumed and produced.
#[derive(Debug, Clone, Copy)]
pub struct CallFrame {
    depth: usize,
    consumed: usize,
}

impl CallFrame {
    /// `consumed` values on top of `stack` are the call's arguments.
    pub fn enter(stack: &ValueStack, consumed: usize) -> Self {
        Self { depth: stack.len(), consumed }
    }

    pub fn base(&self) -> usize {
        self.depth.saturating_sub(self.consumed)
    }

    pub fn finish(&self, stack: &ValueStack, produced: usize) -> Result<(), StackImbalance> {
        let expected = self.base() + produced;
        if stack.len() == expected {
            Ok(())
        } else {
            Err(StackImbalance { expected, actual: stack.len() })
        }
    }
}

/// Collapses a call's results into the single value a script expression receives.
pub fn collapse_results(mut results: Vec<ScriptValue>) -> ScriptValue {
    match results.len() {
        0 => ScriptValue::Nil,
        1 => results.pop().unwrap_or_default(),
        _ => ScriptValue::Array(results),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::CreatureRole;

    #[test]
    fn arguments_pop_right_to_left() {
        let mut stack = ValueStack::from_args([ScriptValue::Int(7), ScriptValue::from("hello")]);
        assert_eq!(stack.pop_text().unwrap(), "hello");
        assert_eq!(stack.pop_u32().unwrap(), 7);
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_type_mismatch_is_invalid_argument() {
        let mut stack = ValueStack::from_args([ScriptValue::from("abc")]);
        let err = stack.pop_int().unwrap_err();
        assert!(matches!(err, ScriptError::InvalidArgument(_)));
        assert!(err.to_string().contains("expected number"));
    }

    #[test]
    fn underflow_is_interface_fault() {
        let mut stack = ValueStack::new();
        assert!(matches!(stack.pop(), Err(ScriptError::InterfaceFault(_))));
    }

    #[test]
    fn position_table_defaults_missing_stackpos() {
        let value = ScriptValue::table([
            ("x", ScriptValue::Int(100)),
            ("y", ScriptValue::Float(200.0)),
            ("z", ScriptValue::Int(7)),
        ]);
        let (pos, stackpos) = Position::from_value(&value).unwrap();
        assert_eq!(pos, Position::new(100, 200, 7));
        assert_eq!(stackpos, 0);
        assert_eq!(pos.to_value(3).field("stackpos"), Some(&ScriptValue::Int(3)));
    }

    #[test]
    fn narrowing_pops_reject_out_of_range_values() {
        let mut stack = ValueStack::from_args([
            ScriptValue::Int(-1),
            ScriptValue::Int(256),
            ScriptValue::Int(70000),
            ScriptValue::Int(65535),
        ]);
        assert_eq!(stack.pop_u16().unwrap(), 65535);
        let err = stack.pop_u16().unwrap_err();
        assert!(matches!(err, ScriptError::InvalidArgument(_)));
        assert!(err.to_string().contains("70000 is out of range"), "{err}");
        assert!(matches!(stack.pop_u8(), Err(ScriptError::InvalidArgument(_))));
        assert!(matches!(stack.pop_u32(), Err(ScriptError::InvalidArgument(_))));

        let mut stack = ValueStack::from_args([ScriptValue::Int(i64::from(i32::MAX) + 1)]);
        assert!(matches!(stack.pop_i32(), Err(ScriptError::InvalidArgument(_))));
    }

    #[test]
    fn position_table_rejects_coordinates_that_do_not_fit() {
        let wide = ScriptValue::table([("x", ScriptValue::Int(70000)), ("y", ScriptValue::Int(1)), ("z", ScriptValue::Int(7))]);
        let err = Position::from_value(&wide).unwrap_err();
        assert!(matches!(err, ScriptError::InvalidArgument(_)));
        assert!(err.to_string().contains("x 70000 is out of range"), "{err}");

        let deep = ScriptValue::table([("x", ScriptValue::Int(1)), ("y", ScriptValue::Int(1)), ("z", ScriptValue::Int(300))]);
        assert!(matches!(Position::from_value(&deep), Err(ScriptError::InvalidArgument(_))));
        let negative = ScriptValue::table([("x", ScriptValue::Int(1)), ("y", ScriptValue::Int(-1)), ("z", ScriptValue::Int(7))]);
        assert!(matches!(Position::from_value(&negative), Err(ScriptError::InvalidArgument(_))));
    }

    #[test]
    fn creature_descriptor_uses_role_tag() {
        let creature = CreatureView {
            id: 0x1000_0001,
            role: CreatureRole::Monster,
            name: "Rat".into(),
            health: 20,
            max_health: 20,
            position: Position::new(1, 1, 7),
            stack_index: 1,
            player: None,
        };
        let descriptor = ThingDescriptor::for_creature(creature.id, &creature);
        assert_eq!(descriptor.item_id, 1);
        assert_eq!(descriptor.kind, 2);
        assert_eq!(ThingDescriptor::EMPTY.to_value().field("uid"), Some(&ScriptValue::Int(0)));
    }

    #[test]
    fn frame_detects_unbalanced_results() {
        let mut stack = ValueStack::from_args([ScriptValue::Int(1), ScriptValue::Int(2)]);
        let frame = CallFrame::enter(&stack, 2);
        stack.pop_int().unwrap();
        stack.pop_int().unwrap();
        stack.push(RET_OK);
        assert!(frame.finish(&stack, 1).is_ok());

        stack.push(RET_OK);
        let imbalance = frame.finish(&stack, 1).unwrap_err();
        assert_eq!(imbalance.expected, 1);
        assert_eq!(imbalance.actual, 2);
        assert_eq!(imbalance.to_string(), "Stack size changed!");
    }

    #[test]
    fn numbers_compare_loosely() {
        assert!(ScriptValue::Int(3).loosely_equals(&ScriptValue::Float(3.0)));
        assert!(!ScriptValue::Int(3).loosely_equals(&ScriptValue::from("3")));
    }
}
