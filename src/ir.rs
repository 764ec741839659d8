//! Schema trees as the clone engine sees them.
//!
//! Four kinds are walked structurally (object, optional, nullable, array).
//! Everything else is a leaf: a kind name plus the full definition record,
//! which codegen dumps verbatim instead of descending into it.
use std::sync::Arc;

use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::error::{CloneError, Result};

/// Key of the kind discriminant inside a leaf definition record.
pub const TYPE_NAME_KEY: &str = "typeName";

/// Flags accepted by JS regex literals.
const JS_REGEX_FLAGS: &str = "dgimsuvy";

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// Field name → child, in declaration order.
pub type Shape = IndexMap<String, Arc<SchemaNode>>;

/// Ordered leaf configuration record (constraints, flags, defaults, ...).
pub type Definition = IndexMap<String, DefValue>;

/// One node of a schema tree.
///
/// Children are shared through `Arc`, so the same subtree may appear under
/// several parents. Nodes are immutable once built, which rules out cycles.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    Object(Shape),
    Optional(Arc<SchemaNode>),
    Nullable(Arc<SchemaNode>),
    Array(Arc<SchemaNode>),
    /// Catch-all for every other kind, known or not.
    Leaf(LeafDef),
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeafDef {
    type_name: String,
    def: Definition,   // always carries TYPE_NAME_KEY == type_name
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Regex(JsRegex),
    Array(Vec<DefValue>),
    Record(Definition),
}

/// A JS regex held in its literal form.
///
/// Cloning only ever prints `/source/flags`, so the pattern is not compiled
/// up front. `is_match` compiles it on first use.
#[derive(Debug, Clone)]
pub struct JsRegex {
    source: String,
    flags: String,
    compiled: OnceCell<std::result::Result<fancy_regex::Regex, String>>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl SchemaNode {
    /// Kind discriminant, named like zod's `ZodFirstPartyTypeKind` members.
    pub fn kind(&self) -> &str {
        match self {
            Self::Object(_) => "ZodObject",
            Self::Optional(_) => "ZodOptional",
            Self::Nullable(_) => "ZodNullable",
            Self::Array(_) => "ZodArray",
            Self::Leaf(leaf) => leaf.type_name(),
        }
    }
}

impl LeafDef {
    /// Builds a leaf; the `typeName` entry of `def` is forced to `type_name`
    /// (kept in place when present, appended otherwise).
    pub fn new(type_name: impl Into<String>, mut def: Definition) -> Self {
        let type_name = type_name.into();
        def.insert(TYPE_NAME_KEY.to_string(), DefValue::String(type_name.clone()));
        Self { type_name, def }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn definition(&self) -> &Definition {
        &self.def
    }

    /// Sets one definition field. `typeName` cannot be changed this way.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<DefValue>) -> Self {
        self.def.insert(key.into(), value.into());
        self.def.insert(TYPE_NAME_KEY.to_string(), DefValue::String(self.type_name.clone()));
        self
    }

    /// Appends `{ kind, ..fields }` to the `checks` list, creating it if needed.
    pub fn with_check<K: Into<String>>(
        mut self,
        kind: &str,
        fields: impl IntoIterator<Item = (K, DefValue)>,
    ) -> Self {
        let mut check = Definition::new();
        check.insert("kind".to_string(), DefValue::from(kind));
        check.extend(fields.into_iter().map(|(k, v)| (k.into(), v)));
        let checks = self
            .def
            .entry("checks".to_string())
            .or_insert_with(|| DefValue::Array(Vec::new()));
        match checks {
            DefValue::Array(xs) => xs.push(DefValue::Record(check)),
            other => *other = DefValue::Array(vec![DefValue::Record(check)]),
        }
        self
    }

    pub fn regex(self, pattern: JsRegex) -> Self {
        self.with_check("regex", [("regex", DefValue::Regex(pattern))])
    }

    /// String length lower bound.
    pub fn min_length(self, value: u64) -> Self {
        self.with_check("min", [("value", DefValue::from(value))])
    }

    /// String length upper bound.
    pub fn max_length(self, value: u64) -> Self {
        self.with_check("max", [("value", DefValue::from(value))])
    }

    /// Inclusive numeric lower bound.
    pub fn gte(self, value: impl Into<DefValue>) -> Self {
        self.with_check("min", [("value", value.into()), ("inclusive", DefValue::Bool(true))])
    }

    /// Inclusive numeric upper bound.
    pub fn lte(self, value: impl Into<DefValue>) -> Self {
        self.with_check("max", [("value", value.into()), ("inclusive", DefValue::Bool(true))])
    }

    pub fn into_node(self) -> Arc<SchemaNode> {
        Arc::new(SchemaNode::Leaf(self))
    }
}

impl JsRegex {
    /// Takes `source` and JS `flags` as written. The stored source is
    /// normalized the way `RegExp.prototype.source` is: `/` outside a class
    /// and line breaks come out escaped, and the empty pattern reads `(?:)`.
    ///
    /// Only the literal form is checked (flags, a dangling backslash, an
    /// open class). Look-around, backreferences and the rest of JS syntax pass
    /// through untouched.
    pub fn new(source: impl AsRef<str>, flags: impl Into<String>) -> Result<Self> {
        let flags = flags.into();
        let invalid = |message: String| CloneError::Regex {
            pattern: source.as_ref().to_string(),
            flags: flags.clone(),
            message,
        };
        if let Some(bad) = flags.chars().find(|c| !JS_REGEX_FLAGS.contains(*c)) {
            return Err(invalid(format!("unsupported flag `{bad}`")));
        }
        if let Some((_, twice)) = flags.char_indices().find(|(i, c)| flags[..*i].contains(*c)) {
            return Err(invalid(format!("duplicate flag `{twice}`")));
        }
        let source = normalize_source(source.as_ref()).map_err(|message| invalid(message.to_string()))?;
        Ok(Self {
            source,
            flags,
            compiled: OnceCell::new(),
        })
    }

    /// Parses the literal form `/source/flags`.
    pub fn from_literal(literal: &str) -> Option<Result<Self>> {
        let body = literal.strip_prefix('/')?;
        let close = body.rfind('/')?;
        let (source, flags) = (&body[..close], &body[close + 1..]);
        if source.is_empty() || !flags.chars().all(|c| c.is_ascii_lowercase()) {
            return None;
        }
        Some(Self::new(source, flags))
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn flags(&self) -> &str {
        &self.flags
    }

    /// Runs the pattern with a backtracking engine, so look-around and
    /// backreferences work. `i`, `m` and `s` apply; the other flags do not
    /// change whether a match exists.
    pub fn is_match(&self, haystack: &str) -> Result<bool> {
        let compiled = self
            .compiled
            .get_or_init(|| compile(&self.source, &self.flags))
            .as_ref()
            .map_err(|message| self.error(message.clone()))?;
        compiled
            .is_match(haystack)
            .map_err(|error| self.error(error.to_string()))
    }

    /// `RegExp.prototype.toString` rendering.
    pub fn to_literal(&self) -> String {
        format!("/{}/{}", self.source, self.flags)
    }

    fn error(&self, message: String) -> CloneError {
        CloneError::Regex {
            pattern: self.source.clone(),
            flags: self.flags.clone(),
            message,
        }
    }
}

impl PartialEq for JsRegex {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source && self.flags == other.flags
    }
}

fn normalize_source(raw: &str) -> std::result::Result<String, &'static str> {
    if raw.is_empty() {
        return Ok("(?:)".to_string());
    }
    let mut out = String::with_capacity(raw.len());
    let mut escaped = false;
    let mut in_class = false;
    for c in raw.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '/' if !escaped && !in_class => out.push_str("\\/"),
            _ => out.push(c),
        }
        if !escaped {
            match c {
                '[' => in_class = true,
                ']' => in_class = false,
                _ => {}
            }
        }
        escaped = c == '\\' && !escaped;
    }
    if escaped {
        return Err("\\ at end of pattern");
    }
    if in_class {
        return Err("unterminated character class");
    }
    Ok(out)
}

// `\/` only exists in the literal form; the engine gets a bare `/`
fn compile(source: &str, flags: &str) -> std::result::Result<fancy_regex::Regex, String> {
    let mut pattern: String = ['i', 'm', 's'].into_iter().filter(|f| flags.contains(*f)).collect();
    if !pattern.is_empty() {
        pattern = format!("(?{pattern})");
    }
    let mut escaped = false;
    for c in source.chars() {
        if escaped {
            if c != '/' {
                pattern.push('\\');
            }
            pattern.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else {
            pattern.push(c);
        }
    }
    fancy_regex::Regex::new(&pattern).map_err(|error| error.to_string())
}

// ————————————————————————————————————————————————————————————————————————————
// CONVERSIONS
// ————————————————————————————————————————————————————————————————————————————

impl From<LeafDef> for SchemaNode {
    fn from(leaf: LeafDef) -> Self {
        Self::Leaf(leaf)
    }
}

impl From<LeafDef> for Arc<SchemaNode> {
    fn from(leaf: LeafDef) -> Self {
        leaf.into_node()
    }
}

impl From<bool> for DefValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for DefValue {
    fn from(value: i32) -> Self {
        Self::Number(value.into())
    }
}

impl From<i64> for DefValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<u64> for DefValue {
    fn from(value: u64) -> Self {
        Self::Number(value.into())
    }
}

/// JS has a single number type: integral values print without a fraction and
/// non-finite values dump as `null`, same as `JSON.stringify`.
impl From<f64> for DefValue {
    fn from(value: f64) -> Self {
        if value.fract() == 0.0 && value.abs() < 9_007_199_254_740_992.0 {
            return Self::Number((value as i64).into());
        }
        serde_json::Number::from_f64(value).map_or(Self::Null, Self::Number)
    }
}

impl From<&str> for DefValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for DefValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<JsRegex> for DefValue {
    fn from(value: JsRegex) -> Self {
        Self::Regex(value)
    }
}

impl From<Vec<DefValue>> for DefValue {
    fn from(value: Vec<DefValue>) -> Self {
        Self::Array(value)
    }
}

impl From<Definition> for DefValue {
    fn from(value: Definition) -> Self {
        Self::Record(value)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// BUILDERS
// ————————————————————————————————————————————————————————————————————————————
//
// Leaf builders reproduce the default definition records zod creates, so
// a tree built here dumps the same way a live zod schema would.

pub fn object<K: Into<String>>(
    fields: impl IntoIterator<Item = (K, Arc<SchemaNode>)>,
) -> Arc<SchemaNode> {
    let shape = fields.into_iter().map(|(k, v)| (k.into(), v)).collect();
    Arc::new(SchemaNode::Object(shape))
}

pub fn optional(inner: impl Into<Arc<SchemaNode>>) -> Arc<SchemaNode> {
    Arc::new(SchemaNode::Optional(inner.into()))
}

pub fn nullable(inner: impl Into<Arc<SchemaNode>>) -> Arc<SchemaNode> {
    Arc::new(SchemaNode::Nullable(inner.into()))
}

pub fn array(element: impl Into<Arc<SchemaNode>>) -> Arc<SchemaNode> {
    Arc::new(SchemaNode::Array(element.into()))
}

pub fn string() -> LeafDef {
    LeafDef::new("ZodString", record([
        ("checks", DefValue::Array(Vec::new())),
        (TYPE_NAME_KEY, DefValue::from("ZodString")),
        ("coerce", DefValue::Bool(false)),
    ]))
}

pub fn number() -> LeafDef {
    LeafDef::new("ZodNumber", record([
        ("checks", DefValue::Array(Vec::new())),
        (TYPE_NAME_KEY, DefValue::from("ZodNumber")),
        ("coerce", DefValue::Bool(false)),
    ]))
}

pub fn boolean() -> LeafDef {
    LeafDef::new("ZodBoolean", record([
        (TYPE_NAME_KEY, DefValue::from("ZodBoolean")),
        ("coerce", DefValue::Bool(false)),
    ]))
}

pub fn enumeration<S: Into<String>>(values: impl IntoIterator<Item = S>) -> LeafDef {
    let values = values.into_iter().map(|s| DefValue::String(s.into())).collect();
    LeafDef::new("ZodEnum", record([
        ("values", DefValue::Array(values)),
        (TYPE_NAME_KEY, DefValue::from("ZodEnum")),
    ]))
}

pub fn literal(value: impl Into<DefValue>) -> LeafDef {
    LeafDef::new("ZodLiteral", record([
        ("value", value.into()),
        (TYPE_NAME_KEY, DefValue::from("ZodLiteral")),
    ]))
}

pub fn record<K: Into<String>>(entries: impl IntoIterator<Item = (K, DefValue)>) -> Definition {
    entries.into_iter().map(|(k, v)| (k.into(), v)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn leaf_keeps_type_name_in_sync() {
        let leaf = LeafDef::new("ZodDate", record([(TYPE_NAME_KEY, DefValue::from("Bogus"))]))
            .with_field(TYPE_NAME_KEY, "AlsoBogus");
        assert_eq!(leaf.type_name(), "ZodDate");
        assert_eq!(leaf.definition()[TYPE_NAME_KEY], DefValue::from("ZodDate"));
        assert_eq!(leaf.definition().len(), 1);
    }

    #[test]
    fn type_name_is_appended_when_missing() {
        let leaf = LeafDef::new("ZodAny", record([("description", DefValue::from("x"))]));
        let keys: Vec<&str> = leaf.definition().keys().map(String::as_str).collect();
        assert_eq!(keys, ["description", TYPE_NAME_KEY]);
    }

    #[test]
    fn checks_accumulate_in_order() {
        let leaf = string().min_length(1).max_length(5);
        let DefValue::Array(checks) = &leaf.definition()["checks"] else {
            panic!("checks should be an array");
        };
        let kinds: Vec<&DefValue> = checks
            .iter()
            .map(|c| match c {
                DefValue::Record(r) => &r["kind"],
                _ => panic!("check should be a record"),
            })
            .collect();
        assert_eq!(kinds, [&DefValue::from("min"), &DefValue::from("max")]);
    }

    #[test]
    fn regex_source_is_normalized_like_js() {
        let re = JsRegex::new("a/b", "").unwrap();
        assert_eq!(re.source(), r"a\/b");
        assert_eq!(re.to_literal(), r"/a\/b/");
        assert!(re.is_match("a/b").unwrap());

        let already = JsRegex::new(r"a\/b", "").unwrap();
        assert_eq!(already, re);

        assert_eq!(JsRegex::new("", "").unwrap().source(), "(?:)");
    }

    #[test]
    fn slash_inside_a_class_is_left_alone() {
        assert_eq!(JsRegex::new("[/]", "").unwrap().source(), "[/]");
        assert_eq!(JsRegex::new(r"[\]/]/", "").unwrap().source(), r"[\]/]\/");
        assert_eq!(JsRegex::new(r"\[/", "").unwrap().source(), r"\[\/");
        assert!(JsRegex::new("^[/a]+$", "").unwrap().is_match("a/a").unwrap());
    }

    #[test]
    fn regex_flags_drive_matching() {
        let re = JsRegex::new("^abc$", "i").unwrap();
        assert!(re.is_match("ABC").unwrap());
        assert_eq!(re.to_literal(), "/^abc$/i");
    }

    #[test]
    fn lookaround_and_backreferences_are_kept() {
        let password = JsRegex::new(r"^(?=.*[A-Z])(?=.*\d).{8,}$", "").unwrap();
        assert_eq!(password.to_literal(), r"/^(?=.*[A-Z])(?=.*\d).{8,}$/");
        assert!(password.is_match("Secret123").unwrap());
        assert!(!password.is_match("secret123").unwrap());

        let doubled = JsRegex::new(r"^(a)\1$", "").unwrap();
        assert!(doubled.is_match("aa").unwrap());
        assert!(!doubled.is_match("ab").unwrap());
    }

    #[test]
    fn engine_failures_surface_only_when_matching() {
        let re = JsRegex::new("(unclosed", "").unwrap();
        assert_eq!(re.to_literal(), "/(unclosed/");
        assert!(matches!(re.is_match("x"), Err(CloneError::Regex { .. })));
    }

    #[test]
    fn regex_rejects_bad_literal_syntax() {
        for (source, flags) in [("x", "q"), ("x", "gg"), ("[a-z", ""), (r"x\", "")] {
            let err = JsRegex::new(source, flags).unwrap_err();
            assert!(matches!(err, CloneError::Regex { .. }), "{source:?} {flags:?}");
        }
    }

    #[test]
    fn regex_literal_parsing() {
        let re = JsRegex::from_literal("/^[a-z]+$/g").unwrap().unwrap();
        assert_eq!(re.source(), "^[a-z]+$");
        assert_eq!(re.flags(), "g");
        assert!(JsRegex::from_literal("not a regex").is_none());
        assert!(JsRegex::from_literal("/x/Y").is_none());
    }

    #[test]
    fn integral_floats_dump_as_integers() {
        assert_eq!(DefValue::from(3.0), DefValue::from(3i64));
        assert_eq!(DefValue::from(f64::NAN), DefValue::Null);
        assert!(matches!(DefValue::from(0.5), DefValue::Number(_)));
    }

    #[test]
    fn kind_names() {
        assert_eq!(object::<&str>([]).kind(), "ZodObject");
        assert_eq!(optional(string()).kind(), "ZodOptional");
        assert_eq!(array(number()).kind(), "ZodArray");
        assert_eq!(SchemaNode::from(boolean()).kind(), "ZodBoolean");
    }
}
