//! Conversions between engine values and [`ScriptValue`].

use rhai::{Array, Dynamic, FnPtr, Map};

use crate::marshal::ScriptValue;

/// Function pointers become their function name so callbacks can be looked up later.
pub fn from_dynamic(value: &Dynamic) -> ScriptValue {
    if value.is_unit() {
        return ScriptValue::Nil;
    }
    if let Ok(flag) = value.as_bool() {
        return ScriptValue::Bool(flag);
    }
    if let Ok(number) = value.as_int() {
        return ScriptValue::Int(number);
    }
    if let Ok(number) = value.as_float() {
        return ScriptValue::Float(number);
    }
    if let Ok(ch) = value.as_char() {
        return ScriptValue::Text(ch.to_string());
    }
    if value.is_string() {
        return ScriptValue::Text(value.clone().into_string().unwrap_or_default());
    }
    if value.is::<Array>() {
        let items = value.clone().try_cast::<Array>().unwrap_or_default();
        return ScriptValue::Array(items.iter().map(from_dynamic).collect());
    }
    if value.is::<Map>() {
        let map = value.clone().try_cast::<Map>().unwrap_or_default();
        return ScriptValue::Table(map.iter().map(|(key, value)| (key.to_string(), from_dynamic(value))).collect());
    }
    if let Some(pointer) = value.clone().try_cast::<FnPtr>() {
        return ScriptValue::Text(pointer.fn_name().to_string());
    }
    ScriptValue::Text(value.to_string())
}

pub fn to_dynamic(value: ScriptValue) -> Dynamic {
    match value {
        ScriptValue::Nil => Dynamic::UNIT,
        ScriptValue::Bool(flag) => Dynamic::from(flag),
        ScriptValue::Int(number) => Dynamic::from(number),
        ScriptValue::Float(number) => Dynamic::from(number),
        ScriptValue::Text(text) => Dynamic::from(text),
        ScriptValue::Array(items) => Dynamic::from_array(items.into_iter().map(to_dynamic).collect()),
        ScriptValue::Table(table) => {
            let map: Map = table.into_iter().map(|(key, value)| (key.into(), to_dynamic(value))).collect();
            Dynamic::from_map(map)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_convert_both_ways() {
        let value = ScriptValue::table([
            ("x", ScriptValue::Int(100)),
            ("name", ScriptValue::from("door")),
            ("list", ScriptValue::Array(vec![ScriptValue::Float(1.5), ScriptValue::Bool(true)])),
        ]);
        let dynamic = to_dynamic(value.clone());
        assert!(dynamic.is::<Map>());
        assert_eq!(from_dynamic(&dynamic), value);
    }

    #[test]
    fn unit_is_nil_and_strings_stay_text() {
        assert_eq!(from_dynamic(&Dynamic::UNIT), ScriptValue::Nil);
        assert_eq!(from_dynamic(&to_dynamic(ScriptValue::from("abc"))), ScriptValue::from("abc"));
        assert_eq!(from_dynamic(&Dynamic::from('x')), ScriptValue::from("x"));
    }

    #[test]
    fn function_pointers_become_names() {
        let pointer = FnPtr::new("onTimer").expect("valid function name");
        assert_eq!(from_dynamic(&Dynamic::from(pointer)), ScriptValue::from("onTimer"));
    }
}
