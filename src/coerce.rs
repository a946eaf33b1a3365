//! Scalar coercion for route and query values, and type conformance for
//! deserialized bodies.
//!
//! Everything bound for a grain call travels as a [`serde_json::Value`].
//! Coercion turns raw text into the value shape the declared [`ParamType`]
//! expects; a text that does not parse yields `None`, never a guess.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde_json::{Number, Value};
use uuid::Uuid;

use crate::descriptor::ParamType;
use crate::media::CodecError;

/// Order in which [`ParamType::Any`] tries scalar parses. First success wins.
const ANY_ORDER: [ParamType; 10] = [
    ParamType::Int,
    ParamType::Long,
    ParamType::Decimal,
    ParamType::Double,
    ParamType::Float,
    ParamType::Byte,
    ParamType::Bool,
    ParamType::Guid,
    ParamType::DateTime,
    ParamType::Char,
];

/// Coerces raw text into a value of type `ty`.
pub fn coerce(raw: &str, ty: ParamType) -> Option<Value> {
    match ty {
        ParamType::Int      => raw.trim().parse::<i32>().ok().map(Value::from),
        ParamType::Long     => raw.trim().parse::<i64>().ok().map(Value::from),
        ParamType::Byte     => raw.trim().parse::<u8>().ok().map(Value::from),
        ParamType::Decimal  => parse_decimal(raw.trim()),
        ParamType::Double   => raw.trim().parse::<f64>().ok().and_then(finite),
        ParamType::Float    => raw.trim().parse::<f32>().ok().and_then(|f| finite(f64::from(f))),
        ParamType::Bool     => parse_bool(raw.trim()).map(Value::Bool),
        ParamType::Guid     => Uuid::parse_str(raw.trim()).ok().map(|u| Value::String(u.to_string())),
        ParamType::DateTime => parse_datetime(raw.trim()).map(|dt| {
            Value::String(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true))
        }),
        ParamType::Char     => single_char(raw).map(|c| Value::String(c.to_string())),
        ParamType::String | ParamType::Json => Some(Value::String(raw.to_owned())),
        ParamType::Any      => Some(
            ANY_ORDER
                .iter()
                .find_map(|ty| coerce(raw, *ty))
                .unwrap_or_else(|| Value::String(raw.to_owned())),
        ),
        ParamType::Map      => None,
    }
}

/// Checks a deserialized value against the declared type, coercing string
/// scalars where the body carried e.g. `"42"` for an integer parameter.
pub fn conform(value: Value, ty: ParamType) -> Result<Value, CodecError> {
    let mismatch = |found: &Value| CodecError::TypeMismatch { expected: ty, found: kind(found) };

    match (ty, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ParamType::Json | ParamType::Any, value) => Ok(value),
        (ParamType::Map, Value::Object(map)) => {
            if map.values().all(Value::is_string) {
                Ok(Value::Object(map))
            } else {
                Err(CodecError::TypeMismatch { expected: ty, found: "object with non-string values" })
            }
        }
        (ParamType::Bool, Value::Bool(b)) => Ok(Value::Bool(b)),
        (ParamType::Int, Value::Number(n)) if n.as_i64().is_some_and(|i| i32::try_from(i).is_ok()) => {
            Ok(Value::Number(n))
        }
        (ParamType::Long, Value::Number(n)) if n.is_i64() => Ok(Value::Number(n)),
        (ParamType::Byte, Value::Number(n)) if n.as_u64().is_some_and(|i| i <= u64::from(u8::MAX)) => {
            Ok(Value::Number(n))
        }
        (ParamType::Decimal | ParamType::Double | ParamType::Float, Value::Number(n)) => {
            Ok(Value::Number(n))
        }
        (ParamType::String, Value::String(s)) => Ok(Value::String(s)),
        (_, Value::String(s)) => coerce(&s, ty).ok_or_else(|| mismatch(&Value::String(s))),
        (_, value) => Err(mismatch(&value)),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null      => "null",
        Value::Bool(_)   => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_)  => "array",
        Value::Object(_) => "object",
    }
}

fn finite(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

/// Decimal literals: optional sign, digits, at most one `.`. No exponent.
fn parse_decimal(raw: &str) -> Option<Value> {
    let digits = raw.strip_prefix(['-', '+']).unwrap_or(raw);
    let mut dots = 0;
    let well_formed = !digits.is_empty()
        && digits.chars().all(|c| {
            dots += usize::from(c == '.');
            c.is_ascii_digit() || c == '.'
        })
        && dots <= 1
        && digits != ".";
    if !well_formed {
        return None;
    }
    raw.parse::<f64>().ok().and_then(finite)
}

fn parse_bool(raw: &str) -> Option<bool> {
    if raw.eq_ignore_ascii_case("true") {
        Some(true)
    } else if raw.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn single_char(raw: &str) -> Option<char> {
    let mut chars = raw.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn declared_scalars_parse_or_yield_nothing() {
        assert_eq!(coerce("42", ParamType::Int), Some(json!(42)));
        assert_eq!(coerce("4000000000", ParamType::Int), None);
        assert_eq!(coerce("4000000000", ParamType::Long), Some(json!(4_000_000_000_i64)));
        assert_eq!(coerce("300", ParamType::Byte), None);
        assert_eq!(coerce("TRUE", ParamType::Bool), Some(json!(true)));
        assert_eq!(coerce("x", ParamType::Char), Some(json!("x")));
        assert_eq!(coerce("xy", ParamType::Char), None);
        assert_eq!(coerce("NaN", ParamType::Double), None);
        assert_eq!(coerce("1e3", ParamType::Decimal), None);
        assert_eq!(coerce("-12.50", ParamType::Decimal), Some(json!(-12.5)));
    }

    #[test]
    fn guids_and_dates_are_normalized() {
        assert_eq!(
            coerce("6F9619FF-8B86-D011-B42D-00C04FC964FF", ParamType::Guid),
            Some(json!("6f9619ff-8b86-d011-b42d-00c04fc964ff"))
        );
        assert_eq!(coerce("2024-02-29", ParamType::DateTime), Some(json!("2024-02-29T00:00:00Z")));
        assert_eq!(
            coerce("2024-02-29T10:30:00+02:00", ParamType::DateTime),
            Some(json!("2024-02-29T08:30:00Z"))
        );
        assert_eq!(coerce("not-a-date", ParamType::DateTime), None);
    }

    #[test]
    fn any_tries_each_scalar_in_order_then_passes_text_through() {
        assert_eq!(coerce("7", ParamType::Any), Some(json!(7)));
        assert_eq!(coerce("9999999999", ParamType::Any), Some(json!(9_999_999_999_i64)));
        assert_eq!(coerce("2.5", ParamType::Any), Some(json!(2.5)));
        assert_eq!(coerce("false", ParamType::Any), Some(json!(false)));
        assert_eq!(coerce("hello", ParamType::Any), Some(json!("hello")));
        assert_eq!(coerce("q", ParamType::Any), Some(json!("q")));
    }

    #[test]
    fn conform_accepts_matching_shapes() {
        assert_eq!(conform(json!({"a": 1}), ParamType::Json).unwrap(), json!({"a": 1}));
        assert_eq!(conform(json!(5), ParamType::Int).unwrap(), json!(5));
        assert_eq!(conform(json!("5"), ParamType::Int).unwrap(), json!(5));
        assert_eq!(conform(json!({"k": "v"}), ParamType::Map).unwrap(), json!({"k": "v"}));
        assert_eq!(conform(Value::Null, ParamType::Int).unwrap(), Value::Null);
    }

    #[test]
    fn conform_rejects_mismatches() {
        assert!(matches!(
            conform(json!([1, 2]), ParamType::Int),
            Err(CodecError::TypeMismatch { expected: ParamType::Int, found: "array" })
        ));
        assert!(conform(json!({"k": 1}), ParamType::Map).is_err());
        assert!(conform(json!(1.5), ParamType::Long).is_err());
        assert!(conform(json!("abc"), ParamType::Guid).is_err());
    }
}
