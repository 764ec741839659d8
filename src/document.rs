//! JSON schema documents: the on-disk input of the CLI.
//!
//! ```json
//! {
//!   "prefix": "// shared helpers",
//!   "schemas": {
//!     "User": { "kind": "object", "shape": {
//!       "name": { "kind": "leaf", "typeName": "ZodString",
//!                 "def": { "checks": [{ "kind": "regex", "regex": "/^[a-z]+$/" }] } },
//!       "tags": { "kind": "array", "element": { "kind": "leaf", "typeName": "ZodString" } }
//!     } }
//!   }
//! }
//! ```
//!
//! A string stored under a `regex` key of a leaf definition and written as
//! `/source/flags` becomes a regex value. Integral floats such as `1.0` are
//! stored as integers, the way the builders store them.
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::ir::{DefValue, Definition, JsRegex, LeafDef, SchemaNode};

#[derive(Debug, Clone, Default)]
pub struct SchemaDocument {
    pub prefix: Option<String>,
    pub schemas: IndexMap<String, Arc<SchemaNode>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    #[serde(default)]
    prefix: Option<String>,
    #[serde(default)]
    schemas: IndexMap<String, RawNode>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RawNode {
    Object {
        shape: IndexMap<String, RawNode>,
    },
    Optional {
        inner: Box<RawNode>,
    },
    Nullable {
        inner: Box<RawNode>,
    },
    Array {
        element: Box<RawNode>,
    },
    Leaf {
        #[serde(rename = "typeName")]
        type_name: String,
        #[serde(default)]
        def: serde_json::Map<String, Value>,
    },
}

impl SchemaDocument {
    pub fn from_json_str(src: &str) -> Result<Self> {
        let raw: RawDocument = crate::path_de::from_str_with_path(src)?;
        let schemas = raw
            .schemas
            .into_iter()
            .map(|(name, node)| -> Result<(String, Arc<SchemaNode>)> { Ok((name, lower_node(node)?)) })
            .collect::<Result<IndexMap<_, _>>>()?;
        Ok(Self { prefix: raw.prefix, schemas })
    }
}

fn lower_node(raw: RawNode) -> Result<Arc<SchemaNode>> {
    let node = match raw {
        RawNode::Object { shape } => SchemaNode::Object(
            shape
                .into_iter()
                .map(|(name, child)| -> Result<(String, Arc<SchemaNode>)> { Ok((name, lower_node(child)?)) })
                .collect::<Result<_>>()?,
        ),
        RawNode::Optional { inner } => SchemaNode::Optional(lower_node(*inner)?),
        RawNode::Nullable { inner } => SchemaNode::Nullable(lower_node(*inner)?),
        RawNode::Array { element } => SchemaNode::Array(lower_node(*element)?),
        RawNode::Leaf { type_name, def } => SchemaNode::Leaf(LeafDef::new(type_name, lower_record(def)?)),
    };
    Ok(Arc::new(node))
}

fn lower_record(map: serde_json::Map<String, Value>) -> Result<Definition> {
    map.into_iter()
        .map(|(key, value)| -> Result<(String, DefValue)> {
            let value = lower_value(&key, value)?;
            Ok((key, value))
        })
        .collect()
}

fn lower_value(key: &str, value: Value) -> Result<DefValue> {
    Ok(match value {
        Value::Null => DefValue::Null,
        Value::Bool(b) => DefValue::Bool(b),
        // `1.0` prints as `1`, same as a number built in code
        Value::Number(n) => match n.as_f64() {
            Some(float) if n.is_f64() => DefValue::from(float),
            _ => DefValue::Number(n),
        },
        Value::String(s) if key == "regex" => match JsRegex::from_literal(&s) {
            Some(re) => DefValue::Regex(re?),
            None => DefValue::String(s),
        },
        Value::String(s) => DefValue::String(s),
        // array elements inherit the key they live under
        Value::Array(xs) => DefValue::Array(
            xs.into_iter().map(|x| lower_value(key, x)).collect::<Result<_>>()?,
        ),
        Value::Object(map) => DefValue::Record(lower_record(map)?),
    })
}
