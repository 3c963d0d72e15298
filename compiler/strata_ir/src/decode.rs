//! Compiled-artifact decoder.
//!
//! Dispatches on the tag of each `{"^": [tag, ...]}` node through a closed
//! match. Tags this engine does not model decode to
//! [`ExprKind::Unsupported`]; malformed arguments of a recognized tag are a
//! [`ParseError`].

use std::sync::Arc;

use serde_json::Value as Json;

use crate::definition::{Definition, DefinitionKind, Param};
use crate::errors::ParseError;
use crate::expr::{
    AttributeOp, BinaryOp, CaseOption, Expr, ExprId, ExprKind, ResourceBody, ResourceDecl,
    UnaryOp,
};
use crate::value::Value;

/// Every definition found in one compiled artifact.
#[derive(Clone, Debug, Default)]
pub struct Artifact {
    definitions: Vec<Arc<Definition>>,
}

impl Artifact {
    pub fn definitions(&self) -> &[Arc<Definition>] {
        &self.definitions
    }

    /// Find a definition by kind and (case-insensitive) name.
    pub fn find(&self, kind: DefinitionKind, name: &str) -> Option<Arc<Definition>> {
        let name = name.trim_start_matches("::");
        self.definitions
            .iter()
            .find(|d| d.kind == kind && d.name.eq_ignore_ascii_case(name))
            .cloned()
    }
}

/// Decode a whole artifact and collect its definitions.
///
/// The root is either a single definition or a `block` whose statements
/// include definitions; nested class definitions are collected as well.
pub fn decode_artifact(text: &str) -> Result<Artifact, ParseError> {
    let json: Json = serde_json::from_str(text).map_err(|e| ParseError::Json(e.to_string()))?;
    let root = Decoder::default().expr(&json)?;
    let mut definitions = Vec::new();
    collect_definitions(&root, &mut definitions);
    Ok(Artifact { definitions })
}

/// Decode a single expression.
pub fn decode_expr(json: &Json) -> Result<Expr, ParseError> {
    Decoder::default().expr(json)
}

fn collect_definitions(expr: &Expr, out: &mut Vec<Arc<Definition>>) {
    match &expr.kind {
        ExprKind::Class(def) | ExprKind::DefinedType(def) | ExprKind::Function(def) => {
            out.push(Arc::clone(def));
            for stmt in &def.body {
                collect_definitions(stmt, out);
            }
        }
        ExprKind::Block(stmts) => {
            for stmt in stmts {
                collect_definitions(stmt, out);
            }
        }
        _ => {}
    }
}

#[derive(Default)]
struct Decoder {
    next_id: u32,
}

type MapEntries<'a> = Vec<(&'a str, &'a Json)>;

impl Decoder {
    fn alloc(&mut self, kind: ExprKind) -> Expr {
        let id = ExprId::new(self.next_id);
        self.next_id += 1;
        Expr::new(id, kind)
    }

    fn expr(&mut self, json: &Json) -> Result<Expr, ParseError> {
        match json {
            Json::Array(items) => {
                let items = self.list(items)?;
                Ok(self.alloc(ExprKind::List(items)))
            }
            Json::Object(map) if map.len() == 1 => {
                if let Some(call) = map.get("^") {
                    return self.call(call);
                }
                if map.contains_key("#") {
                    let kind = self.hash_literal(json)?;
                    return Ok(self.alloc(kind));
                }
                Ok(self.alloc(ExprKind::Literal(Value::from_json(json))))
            }
            other => Ok(self.alloc(ExprKind::Literal(Value::from_json(other)))),
        }
    }

    fn list(&mut self, items: &[Json]) -> Result<Vec<Expr>, ParseError> {
        items.iter().map(|item| self.expr(item)).collect()
    }

    /// A statement list: an array, or a single expression.
    fn statements(&mut self, json: &Json) -> Result<Vec<Expr>, ParseError> {
        match json {
            Json::Array(items) => self.list(items),
            other => Ok(vec![self.expr(other)?]),
        }
    }

    fn call(&mut self, call: &Json) -> Result<Expr, ParseError> {
        let Json::Array(parts) = call else {
            return Err(shape("call array", call));
        };
        let Some((tag, args)) = parts.split_first() else {
            return Err(ParseError::Shape {
                expected: "call tag",
                found: "empty call".to_string(),
            });
        };
        let Json::String(tag) = tag else {
            return Err(shape("call tag string", tag));
        };
        let kind = self.call_kind(tag, args)?;
        Ok(self.alloc(kind))
    }

    fn call_kind(&mut self, tag: &str, args: &[Json]) -> Result<ExprKind, ParseError> {
        let kind = match tag {
            "array" => ExprKind::List(self.list(args)?),
            "hash" => ExprKind::Hash(
                args.iter()
                    .map(|entry| self.keyed_entry(tag, entry))
                    .collect::<Result<_, _>>()?,
            ),
            "qr" => ExprKind::TypeReference(string_arg(tag, args)?),
            "qn" => ExprKind::QualifiedName(string_arg(tag, args)?),
            "block" => ExprKind::Block(self.list(args)?),
            "class" => ExprKind::Class(self.definition(DefinitionKind::Class, args)?),
            "define" => ExprKind::DefinedType(self.definition(DefinitionKind::DefinedType, args)?),
            "function" => ExprKind::Function(self.definition(DefinitionKind::Function, args)?),
            "$" => ExprKind::Variable(string_arg(tag, args)?),
            "=" => {
                let [target, value] = pair(tag, args)?;
                ExprKind::Assignment {
                    target: Box::new(self.expr(target)?),
                    value: Box::new(self.expr(value)?),
                }
            }
            "access" => {
                let Some((target, keys)) = args.split_first() else {
                    return Err(ParseError::malformed(tag, "missing access target"));
                };
                ExprKind::Access {
                    target: Box::new(self.expr(target)?),
                    keys: self.list(keys)?,
                }
            }
            "call" | "invoke" => self.function_call(tag, args)?,
            "if" | "unless" => self.conditional(tag, args)?,
            "case" => self.case(args)?,
            "?" => self.selector(args)?,
            "concat" => ExprKind::Concat(self.list(args)?),
            "str" => ExprKind::Str(Box::new(self.single(tag, args)?)),
            "heredoc" => {
                let entries = pn_map(tag, first(tag, args)?)?;
                let text = required(&entries, "text", tag)?;
                ExprKind::Heredoc(Box::new(self.expr(text)?))
            }
            "resource" => self.resource(args)?,
            "return" => ExprKind::Return(match args.first() {
                Some(value) => Some(Box::new(self.expr(value)?)),
                None => None,
            }),
            "!" => ExprKind::Unary {
                op: UnaryOp::Not,
                operand: Box::new(self.single(tag, args)?),
            },
            "-" if args.len() == 1 => ExprKind::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(self.single(tag, args)?),
            },
            "paren" => ExprKind::Paren(Box::new(self.single(tag, args)?)),
            "default" => ExprKind::Default,
            "nop" => ExprKind::Nop,
            "regexp" => ExprKind::Regex(string_arg(tag, args)?),
            _ => match BinaryOp::from_tag(tag) {
                Some(op) => {
                    let [left, right] = pair(tag, args)?;
                    ExprKind::Binary {
                        op,
                        left: Box::new(self.expr(left)?),
                        right: Box::new(self.expr(right)?),
                    }
                }
                None => ExprKind::Unsupported {
                    tag: tag.to_string(),
                    args: args.to_vec(),
                },
            },
        };
        Ok(kind)
    }

    fn single(&mut self, tag: &str, args: &[Json]) -> Result<Expr, ParseError> {
        match args {
            [only] => self.expr(only),
            _ => Err(ParseError::malformed(
                tag,
                format!("expected 1 argument, got {}", args.len()),
            )),
        }
    }

    /// `{"#": [...]}` in expression position: a hash with literal keys.
    fn hash_literal(&mut self, json: &Json) -> Result<ExprKind, ParseError> {
        let entries = pn_map("hash", json)?;
        let mut pairs = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            let key = self.alloc(ExprKind::Literal(Value::string(key)));
            pairs.push((key, self.expr(value)?));
        }
        Ok(ExprKind::Hash(pairs))
    }

    /// `{"^": ["=>", key, value]}`.
    fn keyed_entry(&mut self, tag: &str, json: &Json) -> Result<(Expr, Expr), ParseError> {
        let parts = json
            .as_object()
            .and_then(|m| m.get("^"))
            .and_then(Json::as_array);
        match parts.map(Vec::as_slice) {
            Some([Json::String(op), key, value]) if op == "=>" => {
                Ok((self.expr(key)?, self.expr(value)?))
            }
            _ => Err(ParseError::malformed(tag, "expected a '=>' entry")),
        }
    }

    fn definition(
        &mut self,
        kind: DefinitionKind,
        args: &[Json],
    ) -> Result<Arc<Definition>, ParseError> {
        let tag = kind.tag();
        let entries = pn_map(tag, first(tag, args)?)?;
        let name = lookup(&entries, "name")
            .and_then(name_of)
            .ok_or(ParseError::MissingName { kind })?;
        let parent = lookup(&entries, "parent").and_then(name_of);

        let mut params = Vec::new();
        if let Some(declared) = lookup(&entries, "params") {
            for (param_name, spec) in pn_map(tag, declared)? {
                let spec = pn_map("param", spec)?;
                params.push(Param {
                    name: param_name.to_string(),
                    type_expr: lookup(&spec, "type").map(|t| self.expr(t)).transpose()?,
                    default: lookup(&spec, "value").map(|v| self.expr(v)).transpose()?,
                    splat: matches!(lookup(&spec, "splat"), Some(Json::Bool(true))),
                });
            }
        }

        let body = match lookup(&entries, "body") {
            Some(body) => self.statements(body)?,
            None => Vec::new(),
        };
        let returns = lookup(&entries, "returns").map(|r| self.expr(r)).transpose()?;

        Ok(Arc::new(Definition {
            kind,
            name: name.trim_start_matches("::").to_string(),
            params,
            parent: parent.map(|p| p.trim_start_matches("::").to_string()),
            body,
            returns,
        }))
    }

    fn function_call(&mut self, tag: &str, args: &[Json]) -> Result<ExprKind, ParseError> {
        let entries = pn_map(tag, first(tag, args)?)?;
        let name = required(&entries, "functor", tag).and_then(|functor| {
            name_of(functor).ok_or_else(|| ParseError::malformed(tag, "functor is not a name"))
        })?;
        let args = match lookup(&entries, "args") {
            Some(Json::Array(items)) => self.list(items)?,
            Some(other) => return Err(shape("argument list", other)),
            None => Vec::new(),
        };
        Ok(ExprKind::Call { name, args })
    }

    fn conditional(&mut self, tag: &str, args: &[Json]) -> Result<ExprKind, ParseError> {
        let entries = pn_map(tag, first(tag, args)?)?;
        let test = self.expr(required(&entries, "test", tag)?)?;
        let then_branch = match lookup(&entries, "then") {
            Some(stmts) => self.statements(stmts)?,
            None => Vec::new(),
        };
        let else_branch = match lookup(&entries, "else") {
            Some(stmts) => self.statements(stmts)?,
            None => Vec::new(),
        };
        Ok(ExprKind::If {
            test: Box::new(test),
            then_branch,
            else_branch,
            negated: tag == "unless",
        })
    }

    fn case(&mut self, args: &[Json]) -> Result<ExprKind, ParseError> {
        let [test, options] = pair("case", args)?;
        let Json::Array(options) = options else {
            return Err(shape("case options", options));
        };
        let test = self.expr(test)?;
        let mut decoded = Vec::with_capacity(options.len());
        for option in options {
            let entries = pn_map("case", option)?;
            let values = match lookup(&entries, "when") {
                Some(values) => self.statements(values)?,
                None => Vec::new(),
            };
            let body = match lookup(&entries, "then") {
                Some(body) => self.statements(body)?,
                None => Vec::new(),
            };
            decoded.push(CaseOption { values, body });
        }
        Ok(ExprKind::Case {
            test: Box::new(test),
            options: decoded,
        })
    }

    fn selector(&mut self, args: &[Json]) -> Result<ExprKind, ParseError> {
        let [test, entries] = pair("?", args)?;
        let Json::Array(entries) = entries else {
            return Err(shape("selector entries", entries));
        };
        let test = self.expr(test)?;
        let entries = entries
            .iter()
            .map(|entry| self.keyed_entry("?", entry))
            .collect::<Result<_, _>>()?;
        Ok(ExprKind::Selector {
            test: Box::new(test),
            entries,
        })
    }

    fn resource(&mut self, args: &[Json]) -> Result<ExprKind, ParseError> {
        let tag = "resource";
        let entries = pn_map(tag, first(tag, args)?)?;
        let type_name = self.expr(required(&entries, "type", tag)?)?;
        let bodies = match lookup(&entries, "bodies") {
            Some(Json::Array(bodies)) => bodies.as_slice(),
            Some(other) => return Err(shape("resource bodies", other)),
            None => &[],
        };

        let mut decoded = Vec::with_capacity(bodies.len());
        for body in bodies {
            let body = pn_map(tag, body)?;
            let title = self.expr(required(&body, "title", tag)?)?;
            let mut operations = Vec::new();
            if let Some(Json::Array(ops)) = lookup(&body, "ops") {
                for op in ops {
                    operations.push(self.attribute_op(op)?);
                }
            }
            decoded.push(ResourceBody { title, operations });
        }

        Ok(ExprKind::Resource(ResourceDecl {
            type_name: Box::new(type_name),
            bodies: decoded,
        }))
    }

    /// `{"^": ["=>", name, value]}` (or `+>`).
    fn attribute_op(&mut self, json: &Json) -> Result<AttributeOp, ParseError> {
        let parts = json
            .as_object()
            .and_then(|m| m.get("^"))
            .and_then(Json::as_array);
        match parts.map(Vec::as_slice) {
            Some([Json::String(op), name, value]) if op == "=>" || op == "+>" => {
                let name = name_of(name)
                    .ok_or_else(|| ParseError::malformed("resource", "attribute name is not a name"))?;
                Ok(AttributeOp {
                    name,
                    value: self.expr(value)?,
                })
            }
            Some([Json::String(op), ..]) if op == "splat-hash" => Err(ParseError::malformed(
                "resource",
                "attribute splat is not supported",
            )),
            _ => Err(ParseError::malformed("resource", "expected an attribute operation")),
        }
    }
}

fn shape(expected: &'static str, found: &Json) -> ParseError {
    ParseError::Shape {
        expected,
        found: describe(found).to_string(),
    }
}

fn describe(json: &Json) -> &'static str {
    match json {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn first<'a>(tag: &str, args: &'a [Json]) -> Result<&'a Json, ParseError> {
    args.first()
        .ok_or_else(|| ParseError::malformed(tag, "missing argument"))
}

fn pair<'a>(tag: &str, args: &'a [Json]) -> Result<[&'a Json; 2], ParseError> {
    match args {
        [a, b] => Ok([a, b]),
        _ => Err(ParseError::malformed(
            tag,
            format!("expected 2 arguments, got {}", args.len()),
        )),
    }
}

fn string_arg(tag: &str, args: &[Json]) -> Result<String, ParseError> {
    match args.first() {
        Some(Json::String(s)) => Ok(s.clone()),
        Some(other) => Err(ParseError::malformed(
            tag,
            format!("expected a string argument, found {}", describe(other)),
        )),
        None => Err(ParseError::malformed(tag, "missing argument")),
    }
}

/// A name given either as a plain string or as a `qn`/`qr` node.
fn name_of(json: &Json) -> Option<String> {
    match json {
        Json::String(s) => Some(s.clone()),
        Json::Object(map) => match map.get("^").and_then(Json::as_array).map(Vec::as_slice) {
            Some([Json::String(tag), Json::String(name)]) if tag == "qn" || tag == "qr" => {
                Some(name.clone())
            }
            _ => None,
        },
        _ => None,
    }
}

/// Flatten a `{"#": [k1, v1, ...]}` map into key/value pairs.
fn pn_map<'a>(tag: &str, json: &'a Json) -> Result<MapEntries<'a>, ParseError> {
    let Some(Json::Array(flat)) = json.as_object().and_then(|m| m.get("#")) else {
        return Err(ParseError::malformed(tag, "expected a '#' map"));
    };
    if flat.len() % 2 != 0 {
        return Err(ParseError::malformed(tag, "map has an odd number of elements"));
    }
    flat.chunks_exact(2)
        .map(|kv| match (&kv[0], &kv[1]) {
            (Json::String(key), value) => Ok((key.as_str(), value)),
            (other, _) => Err(ParseError::malformed(
                tag,
                format!("map key must be a string, found {}", describe(other)),
            )),
        })
        .collect()
}

fn lookup<'a>(entries: &[(&str, &'a Json)], key: &str) -> Option<&'a Json> {
    entries.iter().find(|(k, _)| *k == key).map(|(_, v)| *v)
}

fn required<'a>(entries: &[(&str, &'a Json)], key: &str, tag: &str) -> Result<&'a Json, ParseError> {
    lookup(entries, key).ok_or_else(|| ParseError::malformed(tag, format!("missing '{key}'")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, reason = "tests use unwrap to panic on unexpected state")]
mod tests;
