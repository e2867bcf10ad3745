//! Best-effort coercion of decoded JSON into declared shapes.
//!
//! A [`Shape`] describes what a generated type expects on the wire. Coercing a
//! value against a shape never fails: it returns the best value it can build
//! and scores the match in a [`CoerceState`]. The score is what resolves
//! untagged unions, where several candidate shapes could fit one payload.
//!
//! Strictness lives one level up. [`convert`] is the struct converter: it
//! rejects payloads whose required fields are missing or mismatched, and
//! quietly drops optional fields that do not fit.
//!
//! # Union resolution
//!
//! Candidates are tried in declaration order, each against a fresh state.
//! Fewer `no` wins, then more `yes`, then the earlier candidate. This is a
//! structural best fit, not an exact discriminator: declare the most specific
//! candidates first when payloads can be ambiguous.

use crate::error::ValidationError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Number, Value};

/// Match-quality counters for one coercion pass.
///
/// `yes` counts exact matches, `maybe` lossy but accepted conversions and
/// `no` hard mismatches. Counters only ever grow during a pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoerceState {
    /// Exact type matches.
    pub yes: usize,
    /// Hard mismatches.
    pub no: usize,
    /// Lossy conversions.
    pub maybe: usize,
}

impl CoerceState {
    /// A fresh state with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `self` is a strictly better match than `other`.
    pub fn is_better_than(&self, other: &Self) -> bool {
        self.no < other.no || (self.no == other.no && self.yes > other.yes)
    }

    pub(crate) fn absorb(&mut self, other: Self) {
        self.yes += other.yes;
        self.no += other.no;
        self.maybe += other.maybe;
    }
}

/// A declared data shape, supplied as a constant by generated code.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    /// `true`/`false`.
    Bool,
    /// A whole number.
    Int,
    /// Any number.
    Float,
    /// A string.
    String,
    /// Only `null`.
    Null,
    /// Anything, passed through unchanged.
    Mixed,
    /// An RFC 3339 timestamp string.
    DateTime,
    /// One of a closed set of strings.
    Enum(&'static [&'static str]),
    /// A homogeneous list.
    List(&'static Shape),
    /// A string-keyed map.
    Map(&'static MapShape),
    /// A record with named fields.
    Struct(&'static StructShape),
    /// One of several candidate shapes, in declaration order.
    Union(&'static [Shape]),
}

/// A string-keyed map with optional key renames.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapShape {
    /// Shape of every value.
    pub values: Shape,
    /// `(wire, internal)` key renames.
    pub renames: &'static [(&'static str, &'static str)],
}

/// A record shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StructShape {
    /// Type name, used in error messages.
    pub name: &'static str,
    /// Declared fields.
    pub fields: &'static [FieldShape],
}

/// One field of a [`StructShape`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldShape {
    /// Name in the Rust type.
    pub name: &'static str,
    /// Name on the wire.
    pub wire: &'static str,
    /// Shape of the value.
    pub shape: Shape,
    /// Whether the field must be present.
    pub required: bool,
}

impl StructShape {
    /// Declares a record shape.
    pub const fn new(name: &'static str, fields: &'static [FieldShape]) -> Self {
        Self { name, fields }
    }
}

impl MapShape {
    /// A map whose keys are kept as-is.
    pub const fn of(values: Shape) -> Self {
        Self {
            values,
            renames: &[],
        }
    }
}

impl FieldShape {
    /// A required field whose wire name equals its Rust name.
    pub const fn required(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            wire: name,
            shape,
            required: true,
        }
    }

    /// An optional field whose wire name equals its Rust name.
    pub const fn optional(name: &'static str, shape: Shape) -> Self {
        Self {
            name,
            wire: name,
            shape,
            required: false,
        }
    }

    /// Sets the wire name.
    pub const fn wire(self, wire: &'static str) -> Self {
        Self { wire, ..self }
    }
}

/// A Rust type with a declared wire shape.
///
/// # Examples
///
/// ```
/// use restcore::coerce::{FieldShape, Model, Shape, StructShape};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize, PartialEq)]
/// struct Bucket {
///     name: String,
///     object_count: i64,
/// }
///
/// const BUCKET: StructShape = StructShape::new(
///     "Bucket",
///     &[
///         FieldShape::required("name", Shape::String),
///         FieldShape::required("object_count", Shape::Int).wire("objectCount"),
///     ],
/// );
///
/// impl Model for Bucket {
///     const SHAPE: Shape = Shape::Struct(&BUCKET);
/// }
///
/// let bucket: Bucket =
///     restcore::coerce::from_value(serde_json::json!({"name": "b", "objectCount": "12"})).unwrap();
/// assert_eq!(bucket, Bucket { name: "b".into(), object_count: 12 });
/// ```
pub trait Model: Serialize + DeserializeOwned {
    /// The declared wire shape.
    const SHAPE: Shape;
}

macro_rules! scalar_model {
    ($($ty:ty => $shape:expr),* $(,)?) => {
        $(impl Model for $ty {
            const SHAPE: Shape = $shape;
        })*
    };
}

scalar_model! {
    bool => Shape::Bool,
    i32 => Shape::Int,
    i64 => Shape::Int,
    u32 => Shape::Int,
    u64 => Shape::Int,
    f64 => Shape::Float,
    String => Shape::String,
    Value => Shape::Mixed,
    () => Shape::Null,
}

impl Shape {
    /// Coerces `value` against this shape, recording the match quality.
    ///
    /// Never fails: on a mismatch the value is returned as-is (or as close as
    /// possible) and `state.no` is incremented.
    pub fn coerce(&self, value: Value, state: &mut CoerceState) -> Value {
        match self {
            Shape::Mixed => {
                state.yes += 1;
                value
            }
            Shape::Null => {
                if value.is_null() {
                    state.yes += 1;
                } else {
                    state.maybe += 1;
                }
                Value::Null
            }
            Shape::Bool => {
                if value.is_boolean() {
                    state.yes += 1;
                } else {
                    state.no += 1;
                }
                value
            }
            Shape::Int => coerce_int(value, state),
            Shape::Float => coerce_float(value, state),
            Shape::String => coerce_string(value, state),
            Shape::DateTime => coerce_datetime(value, state),
            Shape::Enum(members) => {
                match &value {
                    Value::String(s) if members.contains(&s.as_str()) => state.yes += 1,
                    _ => state.no += 1,
                }
                value
            }
            Shape::List(inner) => match value {
                Value::Array(items) => {
                    state.yes += 1;
                    Value::Array(
                        items
                            .into_iter()
                            .map(|item| inner.coerce(item, state))
                            .collect(),
                    )
                }
                other => {
                    state.no += 1;
                    other
                }
            },
            Shape::Map(map) => match value {
                Value::Object(entries) => {
                    state.yes += 1;
                    let mut out = Map::new();
                    for (key, item) in entries {
                        let key = rename(map.renames, &key, true);
                        out.insert(key, map.values.coerce(item, state));
                    }
                    Value::Object(out)
                }
                other => {
                    state.no += 1;
                    other
                }
            },
            Shape::Struct(shape) => shape.coerce(value, state),
            Shape::Union(candidates) => {
                let (_, value, best) = best_candidate(candidates, value);
                state.absorb(best);
                value
            }
        }
    }

    /// For a union, the index of the candidate `value` resolves to.
    ///
    /// Returns `None` for non-union shapes.
    pub fn resolve_union(&self, value: &Value) -> Option<usize> {
        match self {
            Shape::Union(candidates) if !candidates.is_empty() => {
                Some(best_candidate(candidates, value.clone()).0)
            }
            _ => None,
        }
    }

    /// A short human readable description, used in validation errors.
    pub fn describe(&self) -> String {
        match self {
            Shape::Bool => "bool".to_string(),
            Shape::Int => "int".to_string(),
            Shape::Float => "float".to_string(),
            Shape::String => "string".to_string(),
            Shape::Null => "null".to_string(),
            Shape::Mixed => "value".to_string(),
            Shape::DateTime => "date-time".to_string(),
            Shape::Enum(members) => format!("one of {:?}", members),
            Shape::List(inner) => format!("list of {}", inner.describe()),
            Shape::Map(map) => format!("map of {}", map.values.describe()),
            Shape::Struct(shape) => shape.name.to_string(),
            Shape::Union(candidates) => candidates
                .iter()
                .map(Shape::describe)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }
}

impl StructShape {
    fn coerce(&self, value: Value, state: &mut CoerceState) -> Value {
        let Value::Object(mut entries) = value else {
            state.no += 1;
            return value;
        };
        state.yes += 1;

        let mut out = Map::new();
        for field in self.fields {
            match entries.remove(field.wire) {
                Some(Value::Null) if !field.required => {
                    state.yes += 1;
                    out.insert(field.name.to_string(), Value::Null);
                }
                Some(item) => {
                    out.insert(field.name.to_string(), field.shape.coerce(item, state));
                }
                None if field.required => state.no += 1,
                None => {}
            }
        }
        for (key, item) in entries {
            out.entry(key).or_insert(item);
        }
        Value::Object(out)
    }

    fn convert(&self, value: Value, path: &str) -> Result<Value, ValidationError> {
        let Value::Object(mut entries) = value else {
            return Err(ValidationError::Incompatible {
                path: path.to_string(),
                expected: self.name.to_string(),
            });
        };

        let mut out = Map::new();
        for field in self.fields {
            let field_path = format!("{}.{}", path, field.wire);
            match entries.remove(field.wire) {
                None if field.required => {
                    return Err(ValidationError::MissingField { path: field_path });
                }
                None => {}
                Some(Value::Null) if !field.required => {
                    out.insert(field.name.to_string(), Value::Null);
                }
                Some(item) if field.required => {
                    out.insert(
                        field.name.to_string(),
                        convert_at(&field.shape, item, &field_path)?,
                    );
                }
                Some(item) => match convert_at(&field.shape, item, &field_path) {
                    Ok(item) => {
                        out.insert(field.name.to_string(), item);
                    }
                    Err(e) => {
                        tracing::debug!(
                            field = field.name,
                            shape = self.name,
                            error = %e,
                            "Dropping optional field that does not match its shape"
                        );
                    }
                },
            }
        }
        for (key, item) in entries {
            out.entry(key).or_insert(item);
        }
        Ok(Value::Object(out))
    }
}

fn coerce_int(value: Value, state: &mut CoerceState) -> Value {
    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => {
            state.yes += 1;
            Value::Number(n)
        }
        Value::Number(n) => match n.as_f64().and_then(truncate) {
            Some(int) => {
                state.maybe += 1;
                int
            }
            None => {
                state.no += 1;
                Value::Number(n)
            }
        },
        Value::String(s) => {
            let trimmed = s.trim();
            let parsed = trimmed
                .parse::<i64>()
                .map(Value::from)
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(truncate));
            match parsed {
                Some(int) => {
                    state.maybe += 1;
                    int
                }
                None => {
                    state.no += 1;
                    Value::String(s)
                }
            }
        }
        other => {
            state.no += 1;
            other
        }
    }
}

fn truncate(f: f64) -> Option<Value> {
    if f.is_finite() && f.trunc() >= i64::MIN as f64 && f.trunc() <= i64::MAX as f64 {
        Some(Value::from(f.trunc() as i64))
    } else {
        None
    }
}

fn coerce_float(value: Value, state: &mut CoerceState) -> Value {
    match value {
        Value::Number(n) => {
            state.yes += 1;
            Value::Number(n)
        }
        Value::String(s) => match s.trim().parse::<f64>().ok().and_then(Number::from_f64) {
            Some(n) => {
                state.maybe += 1;
                Value::Number(n)
            }
            None => {
                state.no += 1;
                Value::String(s)
            }
        },
        other => {
            state.no += 1;
            other
        }
    }
}

fn coerce_string(value: Value, state: &mut CoerceState) -> Value {
    match value {
        Value::String(s) => {
            state.yes += 1;
            Value::String(s)
        }
        Value::Number(n) => {
            state.maybe += 1;
            Value::String(n.to_string())
        }
        // A sequence of string chunks, as produced by draining a stream.
        Value::Array(items) if !items.is_empty() && items.iter().all(Value::is_string) => {
            state.maybe += 1;
            Value::String(items.iter().filter_map(Value::as_str).collect())
        }
        other => {
            state.no += 1;
            other
        }
    }
}

fn coerce_datetime(value: Value, state: &mut CoerceState) -> Value {
    match value {
        Value::String(s) => match chrono::DateTime::parse_from_rfc3339(s.trim()) {
            Ok(parsed) => {
                state.yes += 1;
                Value::String(parsed.to_rfc3339())
            }
            Err(_) => {
                state.no += 1;
                Value::String(s)
            }
        },
        other => {
            state.no += 1;
            other
        }
    }
}

/// Renames a map key. `to_internal` maps wire → internal, otherwise the reverse.
pub(crate) fn rename(
    renames: &[(&'static str, &'static str)],
    key: &str,
    to_internal: bool,
) -> String {
    renames
        .iter()
        .find(|(wire, internal)| if to_internal { *wire == key } else { *internal == key })
        .map(|(wire, internal)| if to_internal { *internal } else { *wire })
        .unwrap_or(key)
        .to_string()
}

fn best_candidate(candidates: &[Shape], value: Value) -> (usize, Value, CoerceState) {
    let mut best: Option<(usize, Value, CoerceState)> = None;
    for (index, candidate) in candidates.iter().enumerate() {
        let mut state = CoerceState::new();
        let coerced = candidate.coerce(value.clone(), &mut state);
        let better = match &best {
            None => true,
            Some((_, _, current)) => state.is_better_than(current),
        };
        if better {
            best = Some((index, coerced, state));
        }
    }
    best.unwrap_or((0, value, CoerceState::new()))
}

/// Coerces `value` against `shape` with a fresh state.
pub fn coerce(shape: &Shape, value: Value) -> (Value, CoerceState) {
    let mut state = CoerceState::new();
    let value = shape.coerce(value, &mut state);
    (value, state)
}

/// Converts `value` into `shape`, failing on required-field mismatches.
///
/// Structs reject missing required fields and required fields that do not
/// fit; unions convert into their best-scoring candidate; lists and maps
/// convert element-wise; scalars must coerce without a hard mismatch.
///
/// # Errors
///
/// Returns a [`ValidationError`] naming the first offending location.
pub fn convert(shape: &Shape, value: Value) -> Result<Value, ValidationError> {
    convert_at(shape, value, "$")
}

fn convert_at(shape: &Shape, value: Value, path: &str) -> Result<Value, ValidationError> {
    match shape {
        Shape::Struct(shape) => shape.convert(value, path),
        Shape::Union(candidates) if !candidates.is_empty() => {
            let (index, _, _) = best_candidate(candidates, value.clone());
            convert_at(&candidates[index], value, path)
        }
        Shape::List(inner) => match value {
            Value::Array(items) => items
                .into_iter()
                .enumerate()
                .map(|(i, item)| convert_at(inner, item, &format!("{}[{}]", path, i)))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            _ => Err(incompatible(shape, path)),
        },
        Shape::Map(map) => match value {
            Value::Object(entries) => {
                let mut out = Map::new();
                for (key, item) in entries {
                    let item = convert_at(&map.values, item, &format!("{}.{}", path, key))?;
                    out.insert(rename(map.renames, &key, true), item);
                }
                Ok(Value::Object(out))
            }
            _ => Err(incompatible(shape, path)),
        },
        _ => {
            let (value, state) = coerce(shape, value);
            if state.no > 0 {
                Err(incompatible(shape, path))
            } else {
                Ok(value)
            }
        }
    }
}

fn incompatible(shape: &Shape, path: &str) -> ValidationError {
    ValidationError::Incompatible {
        path: path.to_string(),
        expected: shape.describe(),
    }
}

/// Converts `value` into `T` using `shape`.
///
/// # Errors
///
/// Returns a validation error if the payload does not fit the shape or the
/// coerced value does not deserialize into `T`.
pub fn from_value_as<T: DeserializeOwned>(shape: &Shape, value: Value) -> crate::Result<T> {
    let value = convert(shape, value)?;
    serde_json::from_value(value)
        .map_err(|e| ValidationError::Deserialize(e.to_string()).into())
}

/// Converts `value` into a model through its declared shape.
///
/// # Errors
///
/// See [`from_value_as`].
pub fn from_value<T: Model>(value: Value) -> crate::Result<T> {
    from_value_as(&T::SHAPE, value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    const A: StructShape = StructShape::new("A", &[FieldShape::required("x", Shape::Int)]);
    const B: StructShape = StructShape::new("B", &[FieldShape::required("y", Shape::Int)]);
    const A_OR_B: &[Shape] = &[Shape::Struct(&A), Shape::Struct(&B)];
    const UNION: Shape = Shape::Union(A_OR_B);

    #[test]
    fn test_scalar_scores() {
        assert_eq!(coerce(&Shape::Int, json!(3)), (json!(3), CoerceState { yes: 1, no: 0, maybe: 0 }));
        assert_eq!(coerce(&Shape::Int, json!("42")).0, json!(42));
        assert_eq!(coerce(&Shape::Int, json!("42")).1.maybe, 1);
        assert_eq!(coerce(&Shape::Int, json!(2.9)).0, json!(2));
        assert_eq!(coerce(&Shape::Int, json!(true)).1.no, 1);
        assert_eq!(coerce(&Shape::Float, json!("1.5")).0, json!(1.5));
        assert_eq!(coerce(&Shape::Float, json!("1.5")).1.maybe, 1);
        assert_eq!(coerce(&Shape::Bool, json!("true")).1.no, 1);
        assert_eq!(coerce(&Shape::String, json!(7)).0, json!("7"));
        assert_eq!(coerce(&Shape::String, json!(7)).1.maybe, 1);
        assert_eq!(coerce(&Shape::String, json!(["ab", "cd"])).0, json!("abcd"));
        assert_eq!(coerce(&Shape::Null, json!(1)), (Value::Null, CoerceState { yes: 0, no: 0, maybe: 1 }));
        assert_eq!(coerce(&Shape::Mixed, json!({"k": 1})).0, json!({"k": 1}));
    }

    #[test]
    fn test_enum_membership() {
        const COLORS: Shape = Shape::Enum(&["red", "green"]);
        assert_eq!(coerce(&COLORS, json!("red")).1.yes, 1);
        assert_eq!(coerce(&COLORS, json!("blue")).1.no, 1);
        assert_eq!(coerce(&COLORS, json!(1)).1.no, 1);
    }

    #[test]
    fn test_list_is_as_good_as_its_worst_element() {
        const INTS: Shape = Shape::List(&Shape::Int);
        let (value, state) = coerce(&INTS, json!([1, "2", "x"]));
        assert_eq!(value, json!([1, 2, "x"]));
        assert_eq!(state, CoerceState { yes: 2, no: 1, maybe: 1 });
    }

    #[test]
    fn test_map_renames_keys() {
        const COUNTS: MapShape = MapShape {
            values: Shape::Int,
            renames: &[("totalCount", "total_count")],
        };
        let (value, state) = coerce(&Shape::Map(&COUNTS), json!({"totalCount": "3", "other": 1}));
        assert_eq!(value, json!({"total_count": 3, "other": 1}));
        assert_eq!(state.no, 0);
    }

    #[test]
    fn test_union_prefers_fewer_mismatches() {
        assert_eq!(UNION.resolve_union(&json!({"y": 1})), Some(1));
        assert_eq!(UNION.resolve_union(&json!({"x": 1})), Some(0));
        assert_eq!(UNION.resolve_union(&json!({})), Some(0));
    }

    #[test]
    fn test_union_tie_goes_to_first_declared() {
        const SAME: &[Shape] = &[Shape::Struct(&A), Shape::Struct(&A)];
        assert_eq!(Shape::Union(SAME).resolve_union(&json!({"x": 1})), Some(0));
    }

    #[test]
    fn test_union_ambiguity_reports_validation_error() {
        assert_eq!(
            convert(&UNION, json!({})),
            Err(ValidationError::MissingField { path: "$.x".to_string() })
        );
        assert_eq!(convert(&UNION, json!({"y": "5"})), Ok(json!({"y": 5})));
    }

    #[test]
    fn test_union_of_scalars_and_structs() {
        const MIXED: &[Shape] = &[Shape::Int, Shape::Struct(&A)];
        assert_eq!(Shape::Union(MIXED).resolve_union(&json!({"x": 1})), Some(1));
        assert_eq!(Shape::Union(MIXED).resolve_union(&json!(4)), Some(0));
    }

    #[test]
    fn test_optional_mismatch_is_dropped() {
        const SHAPE: StructShape = StructShape::new(
            "Item",
            &[
                FieldShape::required("id", Shape::Int),
                FieldShape::optional("size", Shape::Int),
                FieldShape::optional("note", Shape::String),
            ],
        );
        let value = convert(
            &Shape::Struct(&SHAPE),
            json!({"id": 1, "size": "big", "note": null, "extra": true}),
        )
        .unwrap();
        assert_eq!(value, json!({"id": 1, "note": null, "extra": true}));
    }

    #[test]
    fn test_required_mismatch_fails_with_path() {
        const INNER: StructShape = StructShape::new("Inner", &[FieldShape::required("n", Shape::Int)]);
        const INNERS: Shape = Shape::List(&Shape::Struct(&INNER));
        const OUTER: StructShape =
            StructShape::new("Outer", &[FieldShape::required("items", INNERS)]);
        let err = convert(&Shape::Struct(&OUTER), json!({"items": [{"n": 1}, {"n": "x"}]}))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::Incompatible {
                path: "$.items[1].n".to_string(),
                expected: "int".to_string()
            }
        );
    }

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Storage {
        bucket: String,
        #[serde(default)]
        region: Option<String>,
    }

    const STORAGE: StructShape = StructShape::new(
        "Storage",
        &[
            FieldShape::required("bucket", Shape::String).wire("bucketName"),
            FieldShape::optional("region", Shape::String),
        ],
    );

    impl Model for Storage {
        const SHAPE: Shape = Shape::Struct(&STORAGE);
    }

    #[test]
    fn test_typed_model_from_wire_names() {
        let storage: Storage = from_value(json!({"bucketName": "logs"})).unwrap();
        assert_eq!(storage, Storage { bucket: "logs".to_string(), region: None });

        let err = from_value::<Storage>(json!({"bucket": "logs"})).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Validation(ValidationError::MissingField { .. })
        ));
    }

    #[test]
    fn test_state_counters_only_grow() {
        let mut state = CoerceState::new();
        let mut previous = state;
        for value in [json!(1), json!("x"), json!("2"), json!(null)] {
            Shape::Int.coerce(value, &mut state);
            assert!(state.yes >= previous.yes && state.no >= previous.no && state.maybe >= previous.maybe);
            previous = state;
        }
    }
}
