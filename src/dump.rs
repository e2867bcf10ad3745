//! The inverse of coercion: typed values back to their wire representation.
//!
//! Dumping renames fields to their wire names, normalizes timestamps and picks
//! the best-fitting union candidate for each value, scored with the same
//! counters coercion uses.

use crate::coerce::{rename, CoerceState, Model, Shape, StructShape};
use crate::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};

/// Match-quality counters for one dump pass.
pub type DumpState = CoerceState;

impl Shape {
    /// Rewrites `value` from internal names to wire names.
    ///
    /// Like [`Shape::coerce`] this never fails; values that do not match the
    /// shape pass through unchanged and count as mismatches.
    pub fn dump(&self, value: Value, state: &mut DumpState) -> Value {
        match self {
            Shape::Mixed => {
                state.yes += 1;
                value
            }
            Shape::Null => {
                score(state, value.is_null());
                value
            }
            Shape::Bool => {
                score(state, value.is_boolean());
                value
            }
            Shape::Int => {
                score(state, value.is_i64() || value.is_u64());
                value
            }
            Shape::Float => {
                score(state, value.is_number());
                value
            }
            Shape::String => {
                score(state, value.is_string());
                value
            }
            Shape::Enum(members) => {
                score(
                    state,
                    value.as_str().is_some_and(|s| members.contains(&s)),
                );
                value
            }
            Shape::DateTime => match value {
                Value::String(s) => match chrono::DateTime::parse_from_rfc3339(&s) {
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
            },
            Shape::List(inner) => match value {
                Value::Array(items) => {
                    state.yes += 1;
                    Value::Array(items.into_iter().map(|v| inner.dump(v, state)).collect())
                }
                other => {
                    state.no += 1;
                    other
                }
            },
            Shape::Map(map) => match value {
                Value::Object(entries) => {
                    state.yes += 1;
                    Value::Object(
                        entries
                            .into_iter()
                            .map(|(key, v)| (rename(map.renames, &key, false), map.values.dump(v, state)))
                            .collect(),
                    )
                }
                other => {
                    state.no += 1;
                    other
                }
            },
            Shape::Struct(shape) => dump_struct(shape, value, state),
            Shape::Union(candidates) => {
                let mut best: Option<(Value, DumpState)> = None;
                for candidate in candidates.iter() {
                    let mut attempt = DumpState::new();
                    let dumped = candidate.dump(value.clone(), &mut attempt);
                    let better = match &best {
                        None => true,
                        Some((_, current)) => attempt.is_better_than(current),
                    };
                    if better {
                        best = Some((dumped, attempt));
                    }
                }
                match best {
                    Some((dumped, attempt)) => {
                        state.absorb(attempt);
                        dumped
                    }
                    None => value,
                }
            }
        }
    }
}

fn score(state: &mut DumpState, matched: bool) {
    if matched {
        state.yes += 1;
    } else {
        state.no += 1;
    }
}

fn dump_struct(shape: &StructShape, value: Value, state: &mut DumpState) -> Value {
    let Value::Object(mut entries) = value else {
        state.no += 1;
        return value;
    };
    state.yes += 1;

    let mut out = Map::new();
    for field in shape.fields {
        match entries.remove(field.name) {
            Some(Value::Null) if !field.required => {
                state.yes += 1;
                out.insert(field.wire.to_string(), Value::Null);
            }
            Some(item) => {
                out.insert(field.wire.to_string(), field.shape.dump(item, state));
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

/// Dumps `value` against `shape` with a fresh state.
pub fn dump(shape: &Shape, value: Value) -> Value {
    shape.dump(value, &mut DumpState::new())
}

/// Serializes a model and dumps it to its wire representation.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the model cannot be serialized.
pub fn to_value<T: Model>(model: &T) -> Result<Value> {
    to_value_as(&T::SHAPE, model)
}

/// Serializes any value and dumps it against `shape`.
///
/// # Errors
///
/// Returns [`Error::Serialization`] if the value cannot be serialized.
pub fn to_value_as<T: Serialize + ?Sized>(shape: &Shape, value: &T) -> Result<Value> {
    let value = serde_json::to_value(value).map_err(|e| Error::Serialization(e.to_string()))?;
    Ok(dump(shape, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::{convert, FieldShape, MapShape};
    use serde::Deserialize;
    use serde_json::json;

    const FILE: StructShape = StructShape::new(
        "File",
        &[
            FieldShape::required("file_id", Shape::String).wire("fileId"),
            FieldShape::optional("created_at", Shape::DateTime).wire("createdAt"),
            FieldShape::optional("labels", Shape::Map(&LABELS)),
        ],
    );
    const LABELS: MapShape = MapShape {
        values: Shape::String,
        renames: &[("displayName", "display_name")],
    };

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct File {
        file_id: String,
        #[serde(default)]
        created_at: Option<String>,
    }

    impl Model for File {
        const SHAPE: Shape = Shape::Struct(&FILE);
    }

    #[test]
    fn test_struct_fields_get_wire_names() {
        let value = to_value(&File {
            file_id: "f-1".to_string(),
            created_at: None,
        })
        .unwrap();
        assert_eq!(value, json!({"fileId": "f-1", "createdAt": null}));
    }

    #[test]
    fn test_datetime_is_normalized() {
        let value = dump(
            &Shape::Struct(&FILE),
            json!({"file_id": "f", "created_at": "2024-05-01T10:00:00Z"}),
        );
        assert_eq!(value["createdAt"], json!("2024-05-01T10:00:00+00:00"));
    }

    #[test]
    fn test_map_keys_are_renamed_back() {
        let value = dump(
            &Shape::Struct(&FILE),
            json!({"file_id": "f", "labels": {"display_name": "x", "team": "y"}}),
        );
        assert_eq!(value["labels"], json!({"displayName": "x", "team": "y"}));
    }

    #[test]
    fn test_dump_inverts_coerce() {
        let wire = json!({
            "fileId": "f-9",
            "createdAt": "2024-05-01T10:00:00+00:00",
            "labels": {"displayName": "Q3"},
            "unknown": [1, 2]
        });
        let internal = convert(&Shape::Struct(&FILE), wire.clone()).unwrap();
        assert_eq!(internal["file_id"], json!("f-9"));
        assert_eq!(dump(&Shape::Struct(&FILE), internal), wire);
    }

    #[test]
    fn test_union_dumps_with_best_candidate() {
        const SHORT: StructShape =
            StructShape::new("Short", &[FieldShape::required("a", Shape::Int).wire("A")]);
        const LONG: StructShape =
            StructShape::new("Long", &[FieldShape::required("b", Shape::Int).wire("B")]);
        const CANDIDATES: &[Shape] = &[Shape::Struct(&SHORT), Shape::Struct(&LONG)];

        let value = dump(&Shape::Union(CANDIDATES), json!({"b": 2}));
        assert_eq!(value, json!({"B": 2}));
    }

    #[test]
    fn test_union_adds_winner_counts_to_outer_state() {
        const ID: StructShape =
            StructShape::new("Id", &[FieldShape::required("id", Shape::Int)]);
        const NAME: StructShape =
            StructShape::new("Name", &[FieldShape::required("name", Shape::String)]);
        const CANDIDATES: &[Shape] = &[Shape::Struct(&ID), Shape::Struct(&NAME)];

        let mut direct = DumpState::new();
        Shape::Struct(&NAME).dump(json!({"name": "n"}), &mut direct);

        let mut state = DumpState { yes: 1, no: 0, maybe: 0 };
        Shape::Union(CANDIDATES).dump(json!({"name": "n"}), &mut state);
        assert_eq!(state.yes, direct.yes + 1);
        assert_eq!(state.no, direct.no);
        assert_eq!(state.maybe, direct.maybe);
    }
}
