//! Clone engine: schema tree → zod constructor expression.
//!
//! Object, optional, nullable and array nodes are rebuilt through their
//! `z.*` constructors. Any other node is a leaf: its definition record is
//! dumped as compact JSON and passed to `new z.<Kind>(...)`, after which two
//! spots the JSON dump gets wrong are patched textually:
//!
//! - `"typeName":"ZodX"` becomes `"typeName":z.ZodFirstPartyTypeKind.ZodX`
//! - `"regex":"/src/flags"` becomes the regex literal `"regex":/src/flags`
//!
//! The patches are plain substring rewrites. A definition whose own string
//! data happens to contain `"regex":"/.../"` under a `regex` key is rewritten
//! too; the output is then valid TypeScript with the wrong meaning.
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Serialize, Serializer};

use crate::error::Result;
use crate::ir::{DefValue, Definition, LeafDef, SchemaNode};

/// Output unit header: the zod entry point every expression refers to.
pub const IMPORT_HEADER: &str = "import { z } from \"zod\";\n";

static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""typeName":"(Zod[A-Za-z0-9_]+)""#).expect("typeName pattern compiles")
});

// value is a whole JSON string literal, escapes included
static REGEX_STRING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#""regex":("(?:[^"\\]|\\.)*")"#).expect("regex-field pattern compiles")
});

static REGEX_LITERAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^/.+/[dgimsuvy]*$").expect("regex-literal pattern compiles")
});

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("identifier pattern compiles")
});

// ————————————————————————————————————————————————————————————————————————————
// CODEGEN
// ————————————————————————————————————————————————————————————————————————————

/// Accumulates `export const` declarations for one output unit.
#[derive(Debug, Default)]
pub struct Codegen {
    declarations: Vec<String>,
}

impl Codegen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, node: &SchemaNode, name: &str) -> Result<()> {
        let declaration = clone_declaration(name, node)?;
        tracing::debug!(name, kind = node.kind(), bytes = declaration.len(), "emitted declaration");
        self.declarations.push(declaration);
        Ok(())
    }

    /// Declarations one per line, no trailing newline.
    pub fn into_string(self) -> String {
        self.declarations.join("\n")
    }
}

/// `export const <name> = <expression>;`
///
/// `name` is emitted verbatim; it has to be a valid identifier.
pub fn clone_declaration(name: &str, node: &SchemaNode) -> Result<String> {
    Ok(format!("export const {name} = {};", clone_expression(node)?))
}

/// Expression that rebuilds `node` when evaluated against zod.
///
/// Shared subtrees are expanded again at every occurrence.
pub fn clone_expression(node: &SchemaNode) -> Result<String> {
    match node {
        SchemaNode::Object(shape) => {
            let fields = shape
                .iter()
                .map(|(name, child)| -> Result<String> {
                    Ok(format!("{}: {}", field_key(name)?, clone_expression(child)?))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(format!("z.object({{{}}})", fields.join(",")))
        }
        SchemaNode::Optional(inner) => Ok(format!("z.optional({})", clone_expression(inner)?)),
        SchemaNode::Nullable(inner) => Ok(format!("z.nullable({})", clone_expression(inner)?)),
        SchemaNode::Array(element) => Ok(format!("z.array({})", clone_expression(element)?)),
        SchemaNode::Leaf(leaf) => clone_leaf(leaf),
    }
}

pub fn is_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn clone_leaf(leaf: &LeafDef) -> Result<String> {
    let dumped = serde_json::to_string(&DumpRecord(leaf.definition()))?;
    let stringified = format!("new z.{}({dumped})", leaf.type_name());
    Ok(repair_regex_strings(&repair_type_names(&stringified)))
}

// Bare when it is an identifier, JSON-quoted otherwise.
fn field_key(name: &str) -> Result<String> {
    if is_identifier(name) {
        Ok(name.to_string())
    } else {
        Ok(serde_json::to_string(name)?)
    }
}

fn repair_type_names(text: &str) -> String {
    TYPE_NAME_RE
        .replace_all(text, r#""typeName":z.ZodFirstPartyTypeKind.$1"#)
        .into_owned()
}

fn repair_regex_strings(text: &str) -> String {
    REGEX_STRING_RE
        .replace_all(text, |caps: &Captures| {
            // JSON escaping has to be undone before the text becomes a literal
            match serde_json::from_str::<String>(&caps[1]) {
                Ok(literal) if REGEX_LITERAL_RE.is_match(&literal) => format!("\"regex\":{literal}"),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Structural dump of a definition record. Regex values render as their
/// literal text, which is what the regex repair then picks up.
struct DumpRecord<'a>(&'a Definition);

struct Dump<'a>(&'a DefValue);

impl Serialize for DumpRecord<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, Dump(v))))
    }
}

impl Serialize for Dump<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            DefValue::Null => serializer.serialize_unit(),
            DefValue::Bool(b) => serializer.serialize_bool(*b),
            DefValue::Number(n) => n.serialize(serializer),
            DefValue::String(s) => serializer.serialize_str(s),
            DefValue::Regex(re) => serializer.serialize_str(&re.to_literal()),
            DefValue::Array(xs) => serializer.collect_seq(xs.iter().map(Dump)),
            DefValue::Record(record) => DumpRecord(record).serialize(serializer),
        }
    }
}
