//! Tree-walking executor.

use super::ast::{Branch, Command, Node, Operand, OperandKind, Pipeline};
use super::funcs::{self, type_name};
use super::lexer::Pos;
use super::{MissingKeyPolicy, Template};
use crate::value::{Number, Value};

/// Nesting of `{{template}}` calls, control structures and parenthesized
/// pipelines allowed before execution is aborted.
const MAX_DEPTH: usize = 200;

static NULL: Value = Value::Null;

/// An execution failure, located in the template source.
#[derive(Debug)]
pub(crate) struct ExecError {
    /// The template (main or defined) that was executing.
    pub name: String,
    pub pos: Pos,
    /// Source form of the expression being evaluated.
    pub context: String,
    pub message: String,
}

/// Control flow signalled out of a list.
enum Flow {
    Normal,
    Break,
    Continue,
}

type ExecResult<T> = Result<T, ExecError>;

pub(crate) fn execute(template: &Template, data: &Value, out: &mut String) -> ExecResult<()> {
    let mut state = State {
        template,
        name: template.name.clone(),
        vars: vec![("$".to_string(), data.clone())],
        depth: 0,
    };
    let tree = template.trees.get(&template.name).ok_or_else(|| ExecError {
        name: template.name.clone(),
        pos: 0,
        context: template.name.clone(),
        message: "incomplete or empty template".into(),
    })?;
    state.walk_list(data, tree, out)?;
    Ok(())
}

struct State<'t> {
    template: &'t Template,
    name: String,
    /// Variable stack, innermost last. `$` is always at the bottom.
    vars: Vec<(String, Value)>,
    /// Current nesting, shared by template calls, control structures and parentheses.
    depth: usize,
}

impl<'t> State<'t> {
    fn error(&self, pos: Pos, context: impl ToString, message: impl Into<String>) -> ExecError {
        ExecError {
            name: self.name.clone(),
            pos,
            context: context.to_string(),
            message: message.into(),
        }
    }

    /// Run `step` one nesting level deeper.
    fn nested<T>(
        &mut self,
        pos: Pos,
        context: impl ToString,
        step: impl FnOnce(&mut Self) -> ExecResult<T>,
    ) -> ExecResult<T> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(
                pos,
                context,
                format!("exceeded maximum nesting depth ({MAX_DEPTH})"),
            ));
        }
        self.depth += 1;
        let result = step(self);
        self.depth -= 1;
        result
    }

    fn walk_list(&mut self, dot: &Value, list: &[Node], out: &mut String) -> ExecResult<Flow> {
        for node in list {
            match self.walk(dot, node, out)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value, node: &Node, out: &mut String) -> ExecResult<Flow> {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Action(pipe) => {
                let value = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    out.push_str(&value.to_output());
                }
            }
            Node::If(branch) => {
                return self.nested(branch.pos, "if", |s| s.walk_if_or_with(dot, branch, false, out))
            }
            Node::With(branch) => {
                return self.nested(branch.pos, "with", |s| s.walk_if_or_with(dot, branch, true, out))
            }
            Node::Range(branch) => {
                return self.nested(branch.pos, "range", |s| s.walk_range(dot, branch, out))
            }
            Node::Template { pos, name, pipe } => {
                self.walk_template(dot, *pos, name, pipe.as_ref(), out)?
            }
            Node::Break(_) => return Ok(Flow::Break),
            Node::Continue(_) => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    fn walk_if_or_with(
        &mut self,
        dot: &Value,
        branch: &Branch,
        is_with: bool,
        out: &mut String,
    ) -> ExecResult<Flow> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let flow = if value.is_truthy() {
            let inner = if is_with { &value } else { dot };
            self.walk_list(inner, &branch.list, out)?
        } else if let Some(else_list) = &branch.else_list {
            self.walk_list(dot, else_list, out)?
        } else {
            Flow::Normal
        };
        self.vars.truncate(mark);
        Ok(flow)
    }

    fn walk_range(&mut self, dot: &Value, branch: &Branch, out: &mut String) -> ExecResult<Flow> {
        let mark = self.vars.len();
        let value = self.eval_pipeline(dot, &branch.pipe)?;
        let pipe = &branch.pipe;
        // Variables declared in the body live for one iteration.
        let body_mark = self.vars.len();

        let iterated = match &value {
            Value::Sequence(items) if !items.is_empty() => {
                for (i, item) in items.iter().enumerate() {
                    self.bind_range_vars(pipe, Value::Number(Number::Int(i as i64)), item)?;
                    let flow = self.walk_list(item, &branch.list, out)?;
                    self.vars.truncate(body_mark);
                    if let Flow::Break = flow {
                        break;
                    }
                }
                true
            }
            Value::Mapping(map) if !map.is_empty() => {
                for (key, item) in map {
                    self.bind_range_vars(pipe, Value::String(key.clone()), item)?;
                    let flow = self.walk_list(item, &branch.list, out)?;
                    self.vars.truncate(body_mark);
                    if let Flow::Break = flow {
                        break;
                    }
                }
                true
            }
            Value::Number(Number::Int(count)) if *count > 0 => {
                if pipe.decl.len() > 1 {
                    return Err(self.error(
                        pipe.pos,
                        pipe,
                        "can't use two variables when ranging over an integer",
                    ));
                }
                for i in 0..*count {
                    let item = Value::Number(Number::Int(i));
                    if let Some(var) = pipe.decl.first() {
                        self.set_var(var, item.clone());
                    }
                    let flow = self.walk_list(&item, &branch.list, out)?;
                    self.vars.truncate(body_mark);
                    if let Flow::Break = flow {
                        break;
                    }
                }
                true
            }
            Value::Null
            | Value::Sequence(_)
            | Value::Mapping(_)
            | Value::Number(Number::Int(_)) => false,
            other => {
                return Err(self.error(
                    pipe.pos,
                    pipe,
                    format!("range can't iterate over {other}"),
                ))
            }
        };

        if !iterated {
            if let Some(else_list) = &branch.else_list {
                self.walk_list(dot, else_list, out)?;
            }
        }
        self.vars.truncate(mark);
        Ok(Flow::Normal)
    }

    /// One range variable receives the element; two receive key (or index) and element.
    fn bind_range_vars(&mut self, pipe: &Pipeline, key: Value, item: &Value) -> ExecResult<()> {
        match pipe.decl.as_slice() {
            [] => {}
            [elem] => self.set_var(elem, item.clone()),
            [key_var, elem] => {
                self.set_var(key_var, key);
                self.set_var(elem, item.clone());
            }
            _ => {
                return Err(self.error(pipe.pos, pipe, "too many declarations in range"));
            }
        }
        Ok(())
    }

    fn walk_template(
        &mut self,
        dot: &Value,
        pos: Pos,
        name: &str,
        pipe: Option<&Pipeline>,
        out: &mut String,
    ) -> ExecResult<()> {
        let template = self.template;
        let context = format!("{{{{template {name:?}}}}}");
        let tree = template
            .trees
            .get(name)
            .ok_or_else(|| self.error(pos, &context, format!("no such template {name:?}")))?;
        if self.depth >= MAX_DEPTH {
            return Err(self.error(
                pos,
                &context,
                format!("exceeded maximum template depth ({MAX_DEPTH})"),
            ));
        }

        let new_dot = match pipe {
            Some(pipe) => self.eval_pipeline(dot, pipe)?,
            None => Value::Null,
        };
        let saved_vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), new_dot.clone())]);
        let saved_name = std::mem::replace(&mut self.name, name.to_string());
        self.depth += 1;

        let result = self.walk_list(&new_dot, tree, out);

        self.depth -= 1;
        self.name = saved_name;
        self.vars = saved_vars;
        result.map(|_| ())
    }

    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipeline) -> ExecResult<Value> {
        let mut value = None;
        for cmd in &pipe.cmds {
            value = Some(self.eval_command(dot, cmd, value)?);
        }
        let value = value.unwrap_or_default();
        for var in &pipe.decl {
            if pipe.is_assign {
                self.set_var(var, value.clone());
            } else {
                self.vars.push((var.clone(), value.clone()));
            }
        }
        Ok(value)
    }

    /// `last` is the result of the previous pipeline stage, passed as the final argument.
    fn eval_command(&mut self, dot: &Value, cmd: &Command, last: Option<Value>) -> ExecResult<Value> {
        let first = &cmd.args[0];
        let has_args = cmd.args.len() > 1 || last.is_some();
        match &first.kind {
            OperandKind::Function(name) => return self.eval_function(dot, first, name, &cmd.args, last),
            OperandKind::Field(idents) => {
                return self.field_chain(dot, first, idents, has_args).cloned()
            }
            OperandKind::Variable(name, idents) if !idents.is_empty() => {
                let receiver = self.var_value(first.pos, name)?;
                return self.field_chain(receiver, first, idents, has_args).cloned();
            }
            OperandKind::Chain(inner, idents) => {
                let receiver = self.eval_arg(dot, inner)?;
                return self.field_chain(&receiver, first, idents, has_args).cloned();
            }
            OperandKind::Nil => return Err(self.error(first.pos, first, "nil is not a command")),
            _ => {}
        }

        if has_args {
            return Err(self.error(
                first.pos,
                first,
                format!("can't give argument to non-function {first}"),
            ));
        }
        self.eval_arg(dot, first)
    }

    fn eval_function(
        &mut self,
        dot: &Value,
        operand: &Operand,
        name: &str,
        args: &[Operand],
        last: Option<Value>,
    ) -> ExecResult<Value> {
        let rest = &args[1..];
        if name == "and" || name == "or" {
            let count = rest.len() + usize::from(last.is_some());
            if count == 0 {
                return Err(self.error(
                    operand.pos,
                    name,
                    format!("wrong number of args for {name}: want at least 1 got 0"),
                ));
            }
            // `and` stops at the first falsy value, `or` at the first truthy one.
            let stop_when = name == "or";
            let mut result = Value::Null;
            for arg in rest {
                result = self.eval_arg(dot, arg)?;
                if result.is_truthy() == stop_when {
                    return Ok(result);
                }
            }
            return Ok(last.unwrap_or(result));
        }

        let mut values = Vec::with_capacity(rest.len() + 1);
        for arg in rest {
            values.push(self.eval_arg(dot, arg)?);
        }
        values.extend(last);
        funcs::call(name, &values).map_err(|err| self.error(operand.pos, name, err.to_string()))
    }

    fn eval_arg(&mut self, dot: &Value, operand: &Operand) -> ExecResult<Value> {
        match &operand.kind {
            OperandKind::Dot => Ok(dot.clone()),
            OperandKind::Nil => Ok(Value::Null),
            OperandKind::Field(idents) => self.field_chain(dot, operand, idents, false).cloned(),
            OperandKind::Variable(name, idents) => {
                let receiver = self.var_value(operand.pos, name)?;
                self.field_chain(receiver, operand, idents, false).cloned()
            }
            OperandKind::Chain(inner, idents) => {
                let receiver = self.eval_arg(dot, inner)?;
                self.field_chain(&receiver, operand, idents, false).cloned()
            }
            OperandKind::Pipe(pipe) => self.nested(operand.pos, operand, |s| s.eval_pipeline(dot, pipe)),
            OperandKind::Function(name) => {
                self.eval_function(dot, operand, name, std::slice::from_ref(operand), None)
            }
            kind => Ok(kind.constant().unwrap_or_default()),
        }
    }

    /// Resolve `.a.b.c` against `receiver` under the template's missing-key policy.
    fn field_chain<'v>(
        &self,
        receiver: &'v Value,
        operand: &Operand,
        idents: &[String],
        has_args: bool,
    ) -> ExecResult<&'v Value> {
        let strict = self.template.missing_key == MissingKeyPolicy::Error;
        let mut current = receiver;
        for (i, ident) in idents.iter().enumerate() {
            let last = i + 1 == idents.len();
            current = match current {
                Value::Mapping(map) => {
                    if last && has_args {
                        return Err(self.error(
                            operand.pos,
                            operand,
                            format!("{ident} is not a method but has arguments"),
                        ));
                    }
                    match map.get(ident) {
                        Some(value) => value,
                        None if strict => {
                            return Err(self.error(
                                operand.pos,
                                operand,
                                format!("map has no entry for key {ident:?}"),
                            ))
                        }
                        None => &NULL,
                    }
                }
                Value::Null if strict => {
                    return Err(self.error(
                        operand.pos,
                        operand,
                        format!("nil data; no entry for key {ident:?}"),
                    ))
                }
                Value::Null => &NULL,
                other => {
                    return Err(self.error(
                        operand.pos,
                        operand,
                        format!("can't evaluate field {ident} in type {}", type_name(other)),
                    ))
                }
            };
        }
        Ok(current)
    }

    fn var_value(&self, pos: Pos, name: &str) -> ExecResult<&Value> {
        self.vars
            .iter()
            .rev()
            .find(|(var, _)| var == name)
            .map(|(_, value)| value)
            .ok_or_else(|| self.error(pos, name, format!("undefined variable: {name}")))
    }

    /// Overwrite the innermost variable with this name. The parser guarantees it exists.
    fn set_var(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.vars.iter_mut().rev().find(|(var, _)| var == name) {
            slot.1 = value;
        }
    }
}
