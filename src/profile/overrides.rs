//! CLI profile overrides of the form `dotted.path=value`.
//!
//! Overrides are applied to the raw JSON profile document before it is
//! deserialized into a typed [`Profile`](super::Profile), so any path the
//! document can express is overridable. They apply in the order given;
//! later overrides may revisit a path already touched (last write wins).

use serde_json::{Map, Value};

use crate::error::OverrideError;

/// Apply each `dotted.path=value` override to `cfg` in order.
pub fn apply_overrides(cfg: &mut Value, overrides: &[String]) -> Result<(), OverrideError> {
    for raw in overrides {
        apply_one(cfg, raw)?;
    }
    Ok(())
}

fn apply_one(cfg: &mut Value, raw: &str) -> Result<(), OverrideError> {
    if raw.matches('=').count() != 1 {
        return Err(OverrideError::Syntax(raw.to_owned()));
    }
    let (key, literal) = raw
        .split_once('=')
        .ok_or_else(|| OverrideError::Syntax(raw.to_owned()))?;
    if key.is_empty() || key.chars().any(char::is_whitespace) || literal.starts_with(' ') {
        return Err(OverrideError::Syntax(raw.to_owned()));
    }

    let segments: Vec<&str> = key.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(OverrideError::Syntax(raw.to_owned()));
    }

    let mut current = cfg;
    for (depth, segment) in segments.iter().enumerate() {
        let crumb = || segments[..=depth].join(".");
        let terminal = depth == segments.len() - 1;

        if terminal {
            return assign(current, segment, literal, &crumb());
        }

        current = match current {
            // Missing intermediate keys grow an empty mapping.
            Value::Object(map) => map
                .entry((*segment).to_owned())
                .or_insert_with(|| Value::Object(Map::new())),
            Value::Array(items) => {
                let index = parse_index(segment, &crumb())?;
                let len = items.len();
                items
                    .get_mut(index)
                    .ok_or(OverrideError::IndexOutOfBounds {
                        index,
                        len,
                        path: segments[..=depth].join("."),
                    })?
            }
            _ => {
                return Err(OverrideError::IllegalIndex {
                    segment: (*segment).to_owned(),
                    path: crumb(),
                })
            }
        };
    }

    unreachable!("loop always returns at the terminal segment")
}

fn assign(
    container: &mut Value,
    segment: &str,
    literal: &str,
    path: &str,
) -> Result<(), OverrideError> {
    match container {
        Value::Object(map) => {
            let value = coerce(map.get(segment), literal);
            map.insert(segment.to_owned(), value);
            Ok(())
        }
        Value::Array(items) => {
            let index = parse_index(segment, path)?;
            // Writing at len appends; anything past that is out of bounds.
            if index > items.len() {
                return Err(OverrideError::IndexOutOfBounds {
                    index,
                    len: items.len(),
                    path: path.to_owned(),
                });
            }
            let value = coerce(items.get(index), literal);
            if index == items.len() {
                items.push(value);
            } else {
                items[index] = value;
            }
            Ok(())
        }
        _ => Err(OverrideError::IllegalIndex {
            segment: segment.to_owned(),
            path: path.to_owned(),
        }),
    }
}

fn parse_index(segment: &str, path: &str) -> Result<usize, OverrideError> {
    segment
        .parse::<usize>()
        .map_err(|_| OverrideError::IllegalIndex {
            segment: segment.to_owned(),
            path: path.to_owned(),
        })
}

/// Coerce the literal to the prior value's type when one exists at the
/// path. With no prior value the literal's own shape decides: bool, then
/// integer, then float, else string.
fn coerce(prior: Option<&Value>, literal: &str) -> Value {
    match prior {
        Some(Value::Bool(_)) => literal
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(literal.to_owned())),
        Some(Value::Number(n)) if n.is_f64() => float_or_string(literal),
        Some(Value::Number(_)) => literal
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| float_or_string(literal)),
        Some(Value::Null) | None => infer(literal),
        Some(_) => Value::String(literal.to_owned()),
    }
}

fn infer(literal: &str) -> Value {
    if let Ok(flag) = literal.parse::<bool>() {
        return Value::Bool(flag);
    }
    if let Ok(int) = literal.parse::<i64>() {
        return Value::from(int);
    }
    float_or_string(literal)
}

fn float_or_string(literal: &str) -> Value {
    literal
        .parse::<f64>()
        .ok()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::String(literal.to_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Value {
        json!({
            "instance": {
                "image": "img-000",
                "size": "base-size",
                "security_group": "sg-000",
                "key_name": "base-key",
                "tags": [
                    ["Owner", "BaseOwner"],
                    ["Service", "BaseService"]
                ]
            },
            "notebook": {
                "instance": { "size": "m5.xlarge" }
            }
        })
    }

    #[test]
    fn missing_equals_is_a_syntax_error() {
        let mut cfg = sample();
        let err = apply_overrides(&mut cfg, &["instance.size param-size".into()]).unwrap_err();
        assert!(matches!(err, OverrideError::Syntax(_)));
    }

    #[test]
    fn spaces_around_equals_are_a_syntax_error() {
        let mut cfg = sample();
        let err = apply_overrides(&mut cfg, &["instance.size = param-size".into()]).unwrap_err();
        assert!(matches!(err, OverrideError::Syntax(_)));
    }

    #[test]
    fn double_equals_is_a_syntax_error() {
        let mut cfg = sample();
        let err = apply_overrides(&mut cfg, &["instance.size=a=b".into()]).unwrap_err();
        assert!(matches!(err, OverrideError::Syntax(_)));
    }

    #[test]
    fn non_numeric_segment_against_a_sequence_fails() {
        let mut cfg = sample();
        let err = apply_overrides(&mut cfg, &["instance.tags.a.b=X".into()]).unwrap_err();
        match err {
            OverrideError::IllegalIndex { segment, path } => {
                assert_eq!(segment, "a");
                assert_eq!(path, "instance.tags.a");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn out_of_bounds_index_fails() {
        let mut cfg = json!({
            "instance": { "tags": [["Owner", "BaseOwner"]] }
        });
        let err = apply_overrides(&mut cfg, &["instance.tags.3.3=1".into()]).unwrap_err();
        match err {
            OverrideError::IndexOutOfBounds { index, len, .. } => {
                assert_eq!(index, 3);
                assert_eq!(len, 1);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn writes_scalars_lists_and_nested_paths() {
        let mut cfg = sample();
        apply_overrides(
            &mut cfg,
            &[
                "instance.size=param-size".into(),
                "instance.tags.0.1=ParamOwner".into(),
                "dask.worker.count=2".into(),
            ],
        )
        .unwrap();

        assert_eq!(cfg["instance"]["size"], "param-size");
        assert_eq!(cfg["instance"]["tags"][0][1], "ParamOwner");
        // No prior value: the literal's own shape decides.
        assert_eq!(cfg["dask"]["worker"]["count"], 2);
    }

    #[test]
    fn fresh_paths_carry_typed_scalars() {
        let mut cfg = json!({});
        apply_overrides(
            &mut cfg,
            &[
                "dask.worker.count=2".into(),
                "dask.worker.pinned=true".into(),
                "dask.worker.fraction=0.5".into(),
                "instance.size=m5.large".into(),
            ],
        )
        .unwrap();

        assert_eq!(cfg["dask"]["worker"]["count"], 2);
        assert_eq!(cfg["dask"]["worker"]["pinned"], true);
        assert_eq!(cfg["dask"]["worker"]["fraction"], 0.5);
        assert_eq!(cfg["instance"]["size"], "m5.large");
    }

    #[test]
    fn coerces_to_prior_types() {
        let mut cfg = json!({
            "dask": { "worker": { "count": 1, "fraction": 0.5, "pinned": false } }
        });
        apply_overrides(
            &mut cfg,
            &[
                "dask.worker.count=4".into(),
                "dask.worker.fraction=0.75".into(),
                "dask.worker.pinned=true".into(),
            ],
        )
        .unwrap();

        assert_eq!(cfg["dask"]["worker"]["count"], 4);
        assert_eq!(cfg["dask"]["worker"]["fraction"], 0.75);
        assert_eq!(cfg["dask"]["worker"]["pinned"], true);
    }

    #[test]
    fn repeated_identical_overrides_are_idempotent() {
        let mut once = sample();
        apply_overrides(&mut once, &["instance.size=s".into()]).unwrap();
        let mut twice = sample();
        apply_overrides(&mut twice, &["instance.size=s".into(), "instance.size=s".into()])
            .unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn conflicting_overrides_are_order_sensitive() {
        let mut cfg = sample();
        apply_overrides(
            &mut cfg,
            &["instance.size=first".into(), "instance.size=second".into()],
        )
        .unwrap();
        assert_eq!(cfg["instance"]["size"], "second");
    }

    #[test]
    fn terminal_append_at_len_is_allowed() {
        let mut cfg = json!({ "instance": { "zones": ["a"] } });
        apply_overrides(&mut cfg, &["instance.zones.1=b".into()]).unwrap();
        assert_eq!(cfg["instance"]["zones"][1], "b");

        let err = apply_overrides(&mut cfg, &["instance.zones.5=c".into()]).unwrap_err();
        assert!(matches!(err, OverrideError::IndexOutOfBounds { .. }));
    }
}
