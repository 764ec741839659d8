//! Reads generated source back into schema trees.
//!
//! Understands exactly what codegen writes: the `z.object`, `z.optional`,
//! `z.nullable` and `z.array` constructors, and `new z.<Kind>(...)` over a
//! JSON record extended with regex literals and `z.ZodFirstPartyTypeKind.*`
//! references. Used to check that a clone rebuilds the tree it came from.
use std::sync::Arc;

use crate::error::{CloneError, Result};
use crate::ir::{DefValue, Definition, JsRegex, LeafDef, SchemaNode, Shape};

const DECLARATION_START: &str = "export const ";
const KIND_ENUM_PREFIX: &str = "z.ZodFirstPartyTypeKind.";

/// Parses a single generated expression.
pub fn parse_expression(src: &str) -> Result<SchemaNode> {
    Parser::new(src, 0).complete()
}

/// Parses the `export const NAME = EXPR;` lines of a generated module.
///
/// Codegen writes every declaration after the last blank line. Everything
/// above it (import header, prefix) is free-form text and is skipped, even
/// when the prefix declares `export const` helpers of its own.
pub fn parse_module(src: &str) -> Result<Vec<(String, SchemaNode)>> {
    let body_start = src.trim_end().rfind("\n\n").map_or(0, |blank| blank + 2);
    let mut declarations = Vec::new();
    let mut line_start = body_start;
    for line in src[body_start..].split_inclusive('\n') {
        let start = line_start;
        line_start += line.len();

        let Some(rest) = line.trim_end().strip_prefix(DECLARATION_START) else {
            continue;
        };
        let parse_error = |message: &str| CloneError::Parse { offset: start, message: message.to_string() };
        let (name, expression) = rest
            .split_once(" = ")
            .ok_or_else(|| parse_error("declaration without ` = `"))?;
        let expression = expression
            .strip_suffix(';')
            .ok_or_else(|| parse_error("declaration without trailing `;`"))?;

        let base = start + DECLARATION_START.len() + name.len() + " = ".len();
        let node = Parser::new(expression, base).complete()?;
        tracing::debug!(name, kind = node.kind(), "parsed declaration");
        declarations.push((name.to_string(), node));
    }
    Ok(declarations)
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
    base: usize,   // offset of `src` inside the enclosing text, for errors
}

impl<'a> Parser<'a> {
    fn new(src: &'a str, base: usize) -> Self {
        Self { src, pos: 0, base }
    }

    fn complete(mut self) -> Result<SchemaNode> {
        let node = self.node()?;
        self.skip_ws();
        if self.pos < self.src.len() {
            return Err(self.error("trailing input after expression"));
        }
        Ok(node)
    }

    // ------------------------------ nodes -------------------------------- //

    fn node(&mut self) -> Result<SchemaNode> {
        if self.eat("new") {
            self.expect("z.")?;
            let type_name = self.ident()?;
            self.expect("(")?;
            let def = self.record()?;
            self.expect(")")?;
            return Ok(SchemaNode::Leaf(LeafDef::new(type_name, def)));
        }
        self.expect("z.")?;
        let constructor_at = self.pos;
        match self.ident()? {
            "object" => {
                self.expect("(")?;
                let shape = self.shape()?;
                self.expect(")")?;
                Ok(SchemaNode::Object(shape))
            }
            "optional" => Ok(SchemaNode::Optional(self.wrapped()?)),
            "nullable" => Ok(SchemaNode::Nullable(self.wrapped()?)),
            "array" => Ok(SchemaNode::Array(self.wrapped()?)),
            other => {
                self.pos = constructor_at;
                Err(self.error(format!("unknown constructor `z.{other}`")))
            }
        }
    }

    fn wrapped(&mut self) -> Result<Arc<SchemaNode>> {
        self.expect("(")?;
        let inner = self.node()?;
        self.expect(")")?;
        Ok(Arc::new(inner))
    }

    fn shape(&mut self) -> Result<Shape> {
        self.expect("{")?;
        let mut shape = Shape::new();
        if self.eat("}") {
            return Ok(shape);
        }
        loop {
            self.skip_ws();
            let key = if self.peek() == Some('"') {
                self.string()?
            } else {
                self.ident()?.to_string()
            };
            self.expect(":")?;
            let child = self.node()?;
            shape.insert(key, Arc::new(child));
            if !self.eat(",") {
                self.expect("}")?;
                return Ok(shape);
            }
        }
    }

    // ------------------------------ values ------------------------------- //

    fn record(&mut self) -> Result<Definition> {
        self.expect("{")?;
        let mut record = Definition::new();
        if self.eat("}") {
            return Ok(record);
        }
        loop {
            self.skip_ws();
            if self.peek() != Some('"') {
                return Err(self.error("expected a quoted key"));
            }
            let key = self.string()?;
            self.expect(":")?;
            let value = self.value()?;
            record.insert(key, value);
            if !self.eat(",") {
                self.expect("}")?;
                return Ok(record);
            }
        }
    }

    fn value(&mut self) -> Result<DefValue> {
        self.skip_ws();
        match self.peek() {
            Some('{') => Ok(DefValue::Record(self.record()?)),
            Some('[') => self.array(),
            Some('"') => Ok(DefValue::String(self.string()?)),
            Some('/') => Ok(DefValue::Regex(self.regex_literal()?)),
            Some('-' | '0'..='9') => self.number(),
            _ if self.eat("true") => Ok(DefValue::Bool(true)),
            _ if self.eat("false") => Ok(DefValue::Bool(false)),
            _ if self.eat("null") => Ok(DefValue::Null),
            _ if self.eat(KIND_ENUM_PREFIX) => Ok(DefValue::String(self.ident()?.to_string())),
            _ => Err(self.error("expected a value")),
        }
    }

    fn array(&mut self) -> Result<DefValue> {
        self.expect("[")?;
        let mut items = Vec::new();
        if self.eat("]") {
            return Ok(DefValue::Array(items));
        }
        loop {
            items.push(self.value()?);
            if !self.eat(",") {
                self.expect("]")?;
                return Ok(DefValue::Array(items));
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        let rest = self.rest();
        let mut escaped = false;
        let mut close = None;
        for (i, c) in rest.char_indices().skip(1) {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                close = Some(i);
                break;
            }
        }
        let close = close.ok_or_else(|| self.error("unterminated string"))?;
        let value = serde_json::from_str::<String>(&rest[..=close])
            .map_err(|error| self.error(format!("bad string literal: {error}")))?;
        self.pos += close + 1;
        Ok(value)
    }

    fn number(&mut self) -> Result<DefValue> {
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '-' | '+' | '.' | 'e' | 'E')))
            .unwrap_or(rest.len());
        let number = serde_json::from_str::<serde_json::Number>(&rest[..len])
            .map_err(|error| self.error(format!("bad number: {error}")))?;
        self.pos += len;
        Ok(DefValue::Number(number))
    }

    // `/source/flags`; a `/` inside `[...]` does not close the literal
    fn regex_literal(&mut self) -> Result<JsRegex> {
        let rest = self.rest();
        let mut escaped = false;
        let mut in_class = false;
        let mut close = None;
        for (i, c) in rest.char_indices().skip(1) {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '[' => in_class = true,
                ']' => in_class = false,
                '/' if !in_class => {
                    close = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| self.error("unterminated regex literal"))?;
        let flags_len = rest[close + 1..]
            .find(|c: char| !c.is_ascii_lowercase())
            .unwrap_or(rest.len() - close - 1);
        let source = &rest[1..close];
        let flags = &rest[close + 1..close + 1 + flags_len];
        let regex = JsRegex::new(source, flags)?;
        self.pos += close + 1 + flags_len;
        Ok(regex)
    }

    // ------------------------------ lexing ------------------------------- //

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_ws(&mut self) {
        self.pos = self.src.len() - self.rest().trim_start().len();
    }

    fn eat(&mut self, token: &str) -> bool {
        self.skip_ws();
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &str) -> Result<()> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(self.error(format!("expected `{token}`")))
        }
    }

    fn ident(&mut self) -> Result<&'a str> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '$'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected an identifier"));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    fn error(&self, message: impl Into<String>) -> CloneError {
        CloneError::Parse { offset: self.base + self.pos, message: message.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::clone_expression;
    use crate::ir::{self, record};
    use crate::registry::CloneRegistry;
    use pretty_assertions::assert_eq;

    fn sample() -> Arc<SchemaNode> {
        ir::object([
            ("id", ir::string().regex(JsRegex::new(r"^[a-z]+\d*$", "i").unwrap()).into_node()),
            ("age", ir::optional(ir::number().gte(0).lte(150.5))),
            ("nickname", ir::nullable(ir::string().min_length(1).max_length(32))),
            ("roles", ir::array(ir::enumeration(["admin", "user"]))),
            ("odd key", ir::literal(-3).into_node()),
            ("address", ir::object([
                ("line", ir::array(ir::optional(ir::string()))),
                ("verified", ir::boolean().into_node()),
            ])),
            ("meta", LeafDef::new("ZodRecord", record([("note", DefValue::Null)])).into_node()),
        ])
    }

    fn first_regex(node: &SchemaNode) -> Option<&JsRegex> {
        fn walk(value: &DefValue) -> Option<&JsRegex> {
            match value {
                DefValue::Regex(re) => Some(re),
                DefValue::Array(xs) => xs.iter().find_map(walk),
                DefValue::Record(r) => r.values().find_map(walk),
                _ => None,
            }
        }
        match node {
            SchemaNode::Leaf(leaf) => leaf.definition().values().find_map(walk),
            SchemaNode::Object(shape) => shape.values().find_map(|child| first_regex(child)),
            SchemaNode::Optional(inner) | SchemaNode::Nullable(inner) | SchemaNode::Array(inner) => {
                first_regex(inner)
            }
        }
    }

    #[test]
    fn reconstruction_is_structurally_equal() {
        let original = sample();
        let rebuilt = parse_expression(&clone_expression(&original).unwrap()).unwrap();
        assert_eq!(&rebuilt, original.as_ref());
    }

    #[test]
    fn recloning_is_idempotent() {
        let first = clone_expression(&sample()).unwrap();
        let second = clone_expression(&parse_expression(&first).unwrap()).unwrap();
        assert_eq!(second, first);
    }

    #[test]
    fn reconstructed_regex_still_matches() {
        let node = ir::string().regex(JsRegex::new("^[a-z]+$", "").unwrap()).into_node();
        let src = clone_expression(&node).unwrap();
        assert!(src.contains("/^[a-z]+$/"));

        let rebuilt = parse_expression(&src).unwrap();
        let re = first_regex(&rebuilt).expect("regex survives the round trip");
        assert!(re.is_match("abc").unwrap());
        assert!(!re.is_match("123").unwrap());
    }

    #[test]
    fn regex_class_may_contain_a_slash() {
        let src = r#"new z.ZodString({"checks":[{"kind":"regex","regex":/^[/a]+$/g}],"typeName":z.ZodFirstPartyTypeKind.ZodString})"#;
        let node = parse_expression(src).unwrap();
        let re = first_regex(&node).unwrap();
        assert_eq!(re.flags(), "g");
        assert!(re.is_match("a/a").unwrap());
        assert_eq!(re.to_literal(), "/^[/a]+$/g");
        assert_eq!(clone_expression(&node).unwrap(), src);
    }

    #[test]
    fn lookahead_patterns_round_trip() {
        let password = JsRegex::new(r"^(?=.*[A-Z])(?=.*\d).{8,}$", "").unwrap();
        let node = ir::string().min_length(8).regex(password.clone()).into_node();
        let src = clone_expression(&node).unwrap();
        assert!(src.contains(r#""regex":/^(?=.*[A-Z])(?=.*\d).{8,}$/}"#), "{src}");

        let rebuilt = parse_expression(&src).unwrap();
        assert_eq!(&rebuilt, node.as_ref());
        assert_eq!(clone_expression(&rebuilt).unwrap(), src);
        let re = first_regex(&rebuilt).unwrap();
        assert_eq!(re, &password);
        assert!(re.is_match("Passw0rdOk").unwrap());
        assert!(!re.is_match("password").unwrap());
    }

    #[test]
    fn prefix_declarations_are_not_parsed() {
        let prefix = "export const helper = (s: string) => s;\n\nexport const other = z.string();";
        let mut registry = CloneRegistry::with_prefix(prefix);
        registry.register("User", ir::object([("name", ir::string().into_node())]));
        let rendered = registry.render().unwrap();

        let parsed = parse_module(&rendered).unwrap();
        let names: Vec<&str> = parsed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["User"]);

        // a trailing blank line from an editor does not hide the declarations
        assert_eq!(parse_module(&format!("{rendered}\n\n")).unwrap().len(), 1);
    }

    #[test]
    fn module_round_trip_keeps_order_and_names() {
        let mut registry = CloneRegistry::with_prefix("const shared = 1;\n// export const fake = 1");
        registry.register("Second", ir::array(ir::number()));
        registry.register("First", sample());
        let parsed = parse_module(&registry.render().unwrap()).unwrap();

        let names: Vec<&str> = parsed.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, ["Second", "First"]);
        assert_eq!(&parsed[1].1, sample().as_ref());
    }

    #[test]
    fn unknown_constructor_is_rejected_with_offset() {
        let err = parse_expression("z.tuple([])").unwrap_err();
        let CloneError::Parse { offset, message } = err else {
            panic!("expected a parse error");
        };
        assert_eq!(offset, 2);
        assert!(message.contains("z.tuple"), "{message}");
    }

    #[test]
    fn trailing_input_is_rejected() {
        let err = parse_expression("z.array(new z.ZodAny({})) extra").unwrap_err();
        assert!(matches!(err, CloneError::Parse { offset: 26, .. }), "{err:?}");
    }

    #[test]
    fn module_errors_point_into_the_file() {
        let src = "import { z } from \"zod\";\n\n\nexport const A = z.object({a: z.nope()});";
        let err = parse_module(src).unwrap_err();
        let CloneError::Parse { offset, .. } = err else {
            panic!("expected a parse error");
        };
        assert_eq!(&src[offset..offset + 4], "nope");
    }
}
