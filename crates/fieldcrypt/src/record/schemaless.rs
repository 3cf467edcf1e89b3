//! [`Node`] for schemaless records held as `serde_json::Value`.

use serde_json::{Map, Value as Json};

use super::{Children, Node};
use crate::data::{DataError, Value};

impl Node for Json {
    type Shape = ();

    fn children(&self) -> Children<'_, Self> {
        match self {
            Json::Array(items) => Children::List(items),
            Json::Object(map) => Children::Record(map.iter().map(|(k, v)| (k.clone(), v)).collect()),
            _ => Children::Leaf,
        }
    }

    fn type_tag(&self) -> &'static str {
        match self {
            Json::Null => "NULL",
            Json::Bool(_) => "BOOLEAN",
            Json::Number(n) if n.is_f64() => "FLOAT64",
            Json::Number(_) => "INT64",
            Json::String(_) => "STRING",
            Json::Array(_) => "ARRAY",
            Json::Object(_) => "MAP",
        }
    }

    fn to_value(&self) -> Result<Value, DataError> {
        Value::from_json(self)
    }

    fn from_value(value: Value, _shape: &()) -> Result<Self, DataError> {
        Ok(value.to_json())
    }

    fn envelope(text: String) -> Self {
        Json::String(text)
    }

    fn as_envelope(&self) -> Option<&str> {
        self.as_str()
    }

    fn child_shape(_shape: &(), _key: Option<&str>) -> Result<(), DataError> {
        Ok(())
    }

    fn rebuild_list(&self, items: Vec<Self>, _shape: &()) -> Result<Self, DataError> {
        Ok(Json::Array(items))
    }

    fn rebuild_entries(&self, entries: Vec<(String, Self)>, _shape: &()) -> Result<Self, DataError> {
        Ok(Json::Object(entries.into_iter().collect::<Map<_, _>>()))
    }

    fn is_null(&self) -> bool {
        matches!(self, Json::Null)
    }
}
