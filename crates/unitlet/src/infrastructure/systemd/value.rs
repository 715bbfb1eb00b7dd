use zbus::zvariant::Value;

use crate::domain::traits::PropertyValue;

/// Converts a scalar bus value. Containers and other non-scalar types give `None`.
pub fn to_property_value(value: &Value<'_>) -> Option<PropertyValue> {
    let converted = match value {
        Value::U8(v) => PropertyValue::Unsigned(u64::from(*v)),
        Value::U16(v) => PropertyValue::Unsigned(u64::from(*v)),
        Value::U32(v) => PropertyValue::Unsigned(u64::from(*v)),
        Value::U64(v) => PropertyValue::Unsigned(*v),
        Value::I16(v) => PropertyValue::Signed(i64::from(*v)),
        Value::I32(v) => PropertyValue::Signed(i64::from(*v)),
        Value::I64(v) => PropertyValue::Signed(*v),
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::Str(v) => PropertyValue::Text(v.to_string()),
        _ => return None,
    };
    Some(converted)
}
