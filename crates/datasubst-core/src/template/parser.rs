//! Recursive-descent parser from tokens to [`Node`] trees.
//!
//! Produces one tree per template name: the main body plus every
//! `{{define}}` and `{{block}}` found in the source.

use std::collections::HashMap;

use super::ast::{Branch, Command, Node, Operand, OperandKind, Pipeline};
use super::funcs;
use super::lexer::{tokenize, Keyword, Pos, SyntaxError, Token, TokenKind};
use super::Delimiters;
use crate::value::Number;

pub(crate) type Trees = HashMap<String, Vec<Node>>;

/// Nesting allowed for control structures and parenthesized pipelines combined.
pub(crate) const MAX_NESTING: usize = 100;

pub(crate) fn parse(name: &str, src: &str, delims: &Delimiters) -> Result<Trees, SyntaxError> {
    let tokens = tokenize(src, delims)?;
    let mut parser = Parser {
        tokens,
        index: 0,
        vars: vec!["$".to_string()],
        range_depth: 0,
        nesting: 0,
        trees: HashMap::new(),
    };
    let root = parser.parse_root()?;
    parser.add_tree(name.to_string(), root, 0)?;
    Ok(parser.trees)
}

/// One item of a list: a node, or the `{{end}}`/`{{else}}` that closes the list.
enum Item {
    Node(Node),
    End(Pos),
    /// `{{else}}`, or `{{else if ...}}` / `{{else with ...}}` with the keyword still unread.
    Else(Pos, Option<Keyword>),
}

enum ListEnd {
    End,
    Else(Pos, Option<Keyword>),
}

struct Parser {
    tokens: Vec<Token>,
    index: usize,
    /// Variables in scope, innermost last.
    vars: Vec<String>,
    range_depth: usize,
    nesting: usize,
    trees: Trees,
}

impl Parser {
    fn peek(&self) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[self.index.min(last)]
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        self.index += 1;
        token
    }

    fn backup(&mut self) {
        self.index -= 1;
    }

    fn next_non_space(&mut self) -> Token {
        loop {
            let token = self.next();
            if token.kind != TokenKind::Space {
                return token;
            }
        }
    }

    fn peek_non_space(&mut self) -> Token {
        let token = self.next_non_space();
        self.backup();
        token
    }

    fn expect(&mut self, kind: TokenKind, context: &str) -> Result<Token, SyntaxError> {
        let token = self.next_non_space();
        if token.kind != kind {
            return Err(unexpected(&token, context));
        }
        Ok(token)
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        pos: Pos,
        message: &str,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.nesting >= MAX_NESTING {
            return Err(SyntaxError::new(pos, message));
        }
        self.nesting += 1;
        let parsed = parse(self);
        self.nesting -= 1;
        parsed
    }

    fn parse_root(&mut self) -> Result<Vec<Node>, SyntaxError> {
        let mut root = Vec::new();
        loop {
            let token = self.peek().clone();
            match token.kind {
                TokenKind::Eof => return Ok(root),
                TokenKind::LeftDelim => {
                    let saved = self.index;
                    self.next();
                    if self.next_non_space().kind == TokenKind::Keyword(Keyword::Define) {
                        self.parse_definition(token.pos)?;
                        continue;
                    }
                    self.index = saved;
                }
                _ => {}
            }
            match self.text_or_action()? {
                Item::Node(node) => root.push(node),
                Item::End(pos) => return Err(SyntaxError::new(pos, "unexpected {{end}}")),
                Item::Else(pos, _) => return Err(SyntaxError::new(pos, "unexpected {{else}}")),
            }
        }
    }

    fn item_list(&mut self) -> Result<(Vec<Node>, ListEnd), SyntaxError> {
        let mut list = Vec::new();
        loop {
            if self.peek().kind == TokenKind::Eof {
                return Err(SyntaxError::new(self.peek().pos, "unexpected EOF"));
            }
            match self.text_or_action()? {
                Item::Node(node) => list.push(node),
                Item::End(_) => return Ok((list, ListEnd::End)),
                Item::Else(pos, chained) => return Ok((list, ListEnd::Else(pos, chained))),
            }
        }
    }

    fn text_or_action(&mut self) -> Result<Item, SyntaxError> {
        let token = self.next();
        match token.kind {
            TokenKind::Text => Ok(Item::Node(Node::Text(token.text))),
            TokenKind::LeftDelim => self.action(),
            _ => Err(unexpected(&token, "input")),
        }
    }

    fn action(&mut self) -> Result<Item, SyntaxError> {
        let token = self.next_non_space();
        let pos = token.pos;
        let node = match token.kind {
            TokenKind::Keyword(Keyword::Block) => self.block_control(pos)?,
            TokenKind::Keyword(Keyword::Break) => self.loop_control(pos, Keyword::Break)?,
            TokenKind::Keyword(Keyword::Continue) => self.loop_control(pos, Keyword::Continue)?,
            TokenKind::Keyword(Keyword::Else) => return self.else_control(pos),
            TokenKind::Keyword(Keyword::End) => {
                self.expect(TokenKind::RightDelim, "end")?;
                return Ok(Item::End(pos));
            }
            TokenKind::Keyword(Keyword::If) => Node::If(self.parse_control(Keyword::If, pos)?),
            TokenKind::Keyword(Keyword::Range) => {
                Node::Range(self.parse_control(Keyword::Range, pos)?)
            }
            TokenKind::Keyword(Keyword::With) => {
                Node::With(self.parse_control(Keyword::With, pos)?)
            }
            TokenKind::Keyword(Keyword::Template) => self.template_control(pos)?,
            _ => {
                self.backup();
                Node::Action(self.pipeline("command", TokenKind::RightDelim)?)
            }
        };
        Ok(Item::Node(node))
    }

    fn loop_control(&mut self, pos: Pos, keyword: Keyword) -> Result<Node, SyntaxError> {
        let token = self.next_non_space();
        if token.kind != TokenKind::RightDelim {
            return Err(unexpected(&token, &format!("{{{{{}}}}}", keyword.as_str())));
        }
        if self.range_depth == 0 {
            return Err(SyntaxError::new(
                pos,
                format!("{{{{{}}}}} outside {{{{range}}}}", keyword.as_str()),
            ));
        }
        Ok(match keyword {
            Keyword::Break => Node::Break(pos),
            _ => Node::Continue(pos),
        })
    }

    fn else_control(&mut self, pos: Pos) -> Result<Item, SyntaxError> {
        let next = self.peek_non_space();
        match next.kind {
            TokenKind::Keyword(kw @ (Keyword::If | Keyword::With)) => Ok(Item::Else(pos, Some(kw))),
            _ => {
                self.expect(TokenKind::RightDelim, "else")?;
                Ok(Item::Else(pos, None))
            }
        }
    }

    /// `if`, `with` and `range` share one shape: pipeline, list, optional else list.
    fn parse_control(&mut self, context: Keyword, pos: Pos) -> Result<Branch, SyntaxError> {
        self.nested(pos, "max nesting depth exceeded", |parser| {
            parser.control_body(context, pos)
        })
    }

    fn control_body(&mut self, context: Keyword, pos: Pos) -> Result<Branch, SyntaxError> {
        let mark = self.vars.len();
        let pipe = self.pipeline(context.as_str(), TokenKind::RightDelim)?;

        if context == Keyword::Range {
            self.range_depth += 1;
        }
        let parsed = self.item_list();
        if context == Keyword::Range {
            self.range_depth -= 1;
        }
        let (list, end) = parsed?;

        let else_list = match end {
            ListEnd::End => None,
            ListEnd::Else(_, None) => {
                let (else_list, end) = self.item_list()?;
                if let ListEnd::Else(else_pos, _) = end {
                    return Err(SyntaxError::new(else_pos, "expected end; found {{else}}"));
                }
                Some(else_list)
            }
            ListEnd::Else(_, Some(kw)) if kw == context => {
                // `{{else if}}` / `{{else with}}` nests a new control that consumes the shared `{{end}}`.
                let token = self.next_non_space();
                let nested = self.parse_control(kw, token.pos)?;
                Some(vec![match kw {
                    Keyword::If => Node::If(nested),
                    _ => Node::With(nested),
                }])
            }
            ListEnd::Else(else_pos, Some(kw)) => {
                return Err(SyntaxError::new(
                    else_pos,
                    format!("unexpected <{}> after else in {}", kw.as_str(), context.as_str()),
                ))
            }
        };

        self.vars.truncate(mark);
        Ok(Branch {
            pos,
            pipe,
            list,
            else_list,
        })
    }

    fn template_control(&mut self, pos: Pos) -> Result<Node, SyntaxError> {
        let token = self.next_non_space();
        let name = template_name(&token, "template clause")?;
        let pipe = if self.peek_non_space().kind == TokenKind::RightDelim {
            self.next_non_space();
            None
        } else {
            Some(self.pipeline("template clause", TokenKind::RightDelim)?)
        };
        Ok(Node::Template { pos, name, pipe })
    }

    fn block_control(&mut self, pos: Pos) -> Result<Node, SyntaxError> {
        let token = self.next_non_space();
        let name = template_name(&token, "block clause")?;
        let pipe = self.pipeline("block clause", TokenKind::RightDelim)?;
        let list = self.nested(pos, "max nesting depth exceeded", |parser| {
            parser.definition_body("block clause")
        })?;
        self.add_tree(name.clone(), list, pos)?;
        Ok(Node::Template {
            pos,
            name,
            pipe: Some(pipe),
        })
    }

    fn parse_definition(&mut self, pos: Pos) -> Result<(), SyntaxError> {
        let token = self.next_non_space();
        let name = template_name(&token, "define clause")?;
        self.expect(TokenKind::RightDelim, "define clause")?;
        let list = self.definition_body("define clause")?;
        self.add_tree(name, list, pos)
    }

    /// A definition body starts a fresh variable scope and is closed by `{{end}}`.
    fn definition_body(&mut self, context: &str) -> Result<Vec<Node>, SyntaxError> {
        let saved_vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let saved_depth = std::mem::replace(&mut self.range_depth, 0);
        let parsed = self.item_list();
        self.vars = saved_vars;
        self.range_depth = saved_depth;

        match parsed? {
            (list, ListEnd::End) => Ok(list),
            (_, ListEnd::Else(else_pos, _)) => Err(SyntaxError::new(
                else_pos,
                format!("unexpected {{{{else}}}} in {context}"),
            )),
        }
    }

    fn add_tree(&mut self, name: String, list: Vec<Node>, pos: Pos) -> Result<(), SyntaxError> {
        let new_empty = is_empty_tree(&list);
        match self.trees.get(&name).map(|existing| is_empty_tree(existing)) {
            Some(false) if !new_empty => Err(SyntaxError::new(
                pos,
                format!("multiple definition of template {name:?}"),
            )),
            Some(_) if new_empty => Ok(()),
            _ => {
                self.trees.insert(name, list);
                Ok(())
            }
        }
    }

    fn pipeline(&mut self, context: &str, end: TokenKind) -> Result<Pipeline, SyntaxError> {
        let pos = self.peek_non_space().pos;
        let mut pipe = Pipeline {
            pos,
            is_assign: false,
            decl: Vec::new(),
            cmds: Vec::new(),
        };
        self.declarations(&mut pipe, context)?;

        loop {
            let token = self.next_non_space();
            if token.kind == end {
                check_pipeline(&pipe, context, token.pos)?;
                return Ok(pipe);
            }
            match token.kind {
                TokenKind::Bool
                | TokenKind::Char
                | TokenKind::Dot
                | TokenKind::Field
                | TokenKind::Identifier
                | TokenKind::Number
                | TokenKind::Nil
                | TokenKind::RawString
                | TokenKind::String
                | TokenKind::Variable
                | TokenKind::LeftParen => {
                    self.backup();
                    let cmd = self.command()?;
                    pipe.cmds.push(cmd);
                }
                _ => return Err(unexpected(&token, context)),
            }
        }
    }

    /// `$x :=`, `$x =`, and in `range` also `$i, $e :=`.
    fn declarations(&mut self, pipe: &mut Pipeline, context: &str) -> Result<(), SyntaxError> {
        let saved = self.index;
        let first = self.next_non_space();
        if first.kind != TokenKind::Variable {
            self.index = saved;
            return Ok(());
        }

        let op = self.next_non_space();
        let (names, is_assign) = match op.kind {
            TokenKind::Declare | TokenKind::Assign => (vec![first], op.kind == TokenKind::Assign),
            TokenKind::Comma if context == "range" => {
                let second = self.next_non_space();
                if second.kind != TokenKind::Variable {
                    return Err(unexpected(&second, "range"));
                }
                let op = self.next_non_space();
                if !matches!(op.kind, TokenKind::Declare | TokenKind::Assign) {
                    return Err(unexpected(&op, "range"));
                }
                (vec![first, second], op.kind == TokenKind::Assign)
            }
            TokenKind::Comma => {
                return Err(SyntaxError::new(
                    op.pos,
                    format!("too many declarations in {context}"),
                ))
            }
            _ => {
                self.index = saved;
                return Ok(());
            }
        };

        pipe.is_assign = is_assign;
        for var in names {
            if is_assign {
                self.use_var(&var)?;
            } else {
                self.vars.push(var.text.clone());
            }
            pipe.decl.push(var.text);
        }
        Ok(())
    }

    fn command(&mut self) -> Result<Command, SyntaxError> {
        let pos = self.peek_non_space().pos;
        let mut args = Vec::new();
        loop {
            self.peek_non_space();
            if let Some(operand) = self.operand()? {
                args.push(operand);
            }
            let token = self.next();
            match token.kind {
                TokenKind::Space => continue,
                TokenKind::RightDelim | TokenKind::RightParen => {
                    self.backup();
                    break;
                }
                TokenKind::Pipe => break,
                _ => return Err(unexpected(&token, "operand")),
            }
        }
        if args.is_empty() {
            return Err(SyntaxError::new(pos, "empty command"));
        }
        Ok(Command { pos, args })
    }

    fn operand(&mut self) -> Result<Option<Operand>, SyntaxError> {
        let Some(term) = self.term()? else {
            return Ok(None);
        };
        if self.peek().kind != TokenKind::Field {
            return Ok(Some(term));
        }

        let mut fields = Vec::new();
        while self.peek().kind == TokenKind::Field {
            fields.push(self.next().text[1..].to_string());
        }
        let kind = match term.kind {
            OperandKind::Field(mut idents) => {
                idents.extend(fields);
                OperandKind::Field(idents)
            }
            OperandKind::Variable(name, mut idents) => {
                idents.extend(fields);
                OperandKind::Variable(name, idents)
            }
            OperandKind::Bool(_)
            | OperandKind::String(..)
            | OperandKind::Number(..)
            | OperandKind::Nil
            | OperandKind::Dot => {
                return Err(SyntaxError::new(
                    term.pos,
                    format!("unexpected . after term {:?}", term.to_string()),
                ))
            }
            other => OperandKind::Chain(
                Box::new(Operand {
                    pos: term.pos,
                    kind: other,
                }),
                fields,
            ),
        };
        Ok(Some(Operand {
            pos: term.pos,
            kind,
        }))
    }

    fn term(&mut self) -> Result<Option<Operand>, SyntaxError> {
        let token = self.next_non_space();
        let kind = match token.kind {
            TokenKind::Identifier => {
                if !funcs::is_builtin(&token.text) {
                    return Err(SyntaxError::new(
                        token.pos,
                        format!("function {:?} not defined", token.text),
                    ));
                }
                OperandKind::Function(token.text)
            }
            TokenKind::Dot => OperandKind::Dot,
            TokenKind::Nil => OperandKind::Nil,
            TokenKind::Variable => {
                self.use_var(&token)?;
                OperandKind::Variable(token.text, Vec::new())
            }
            TokenKind::Field => OperandKind::Field(vec![token.text[1..].to_string()]),
            TokenKind::Bool => OperandKind::Bool(token.text == "true"),
            TokenKind::Char => {
                let c = unquote_char(&token.text).ok_or_else(|| {
                    SyntaxError::new(
                        token.pos,
                        format!("malformed character constant: {}", token.text),
                    )
                })?;
                OperandKind::Number(token.text, Number::Int(c as i64))
            }
            TokenKind::Number => {
                let number = parse_number(&token.text)
                    .map_err(|message| SyntaxError::new(token.pos, message))?;
                OperandKind::Number(token.text, number)
            }
            TokenKind::LeftParen => {
                let pipe = self.nested(token.pos, "max expression depth exceeded", |parser| {
                    parser.pipeline("parenthesized pipeline", TokenKind::RightParen)
                })?;
                OperandKind::Pipe(Box::new(pipe))
            }
            TokenKind::String | TokenKind::RawString => {
                let value = unquote(&token.text).ok_or_else(|| {
                    SyntaxError::new(token.pos, format!("malformed string literal: {}", token.text))
                })?;
                OperandKind::String(token.text, value)
            }
            _ => {
                self.backup();
                return Ok(None);
            }
        };
        Ok(Some(Operand {
            pos: token.pos,
            kind,
        }))
    }

    fn use_var(&self, token: &Token) -> Result<(), SyntaxError> {
        if self.vars.iter().any(|v| *v == token.text) {
            Ok(())
        } else {
            Err(SyntaxError::new(
                token.pos,
                format!("undefined variable {:?}", token.text),
            ))
        }
    }
}

fn unexpected(token: &Token, context: &str) -> SyntaxError {
    if token.kind == TokenKind::Eof {
        return SyntaxError::new(token.pos, "unexpected EOF");
    }
    SyntaxError::new(token.pos, format!("unexpected {token} in {context}"))
}

fn template_name(token: &Token, context: &str) -> Result<String, SyntaxError> {
    match token.kind {
        TokenKind::String | TokenKind::RawString => unquote(&token.text).ok_or_else(|| {
            SyntaxError::new(token.pos, format!("malformed string literal: {}", token.text))
        }),
        _ => Err(unexpected(token, context)),
    }
}

fn check_pipeline(pipe: &Pipeline, context: &str, pos: Pos) -> Result<(), SyntaxError> {
    if pipe.cmds.is_empty() {
        return Err(SyntaxError::new(pos, format!("missing value for {context}")));
    }
    for (i, cmd) in pipe.cmds.iter().enumerate().skip(1) {
        let first = &cmd.args[0];
        if matches!(
            first.kind,
            OperandKind::Bool(_)
                | OperandKind::Dot
                | OperandKind::Nil
                | OperandKind::Number(..)
                | OperandKind::String(..)
        ) {
            return Err(SyntaxError::new(
                first.pos,
                format!("non executable command in pipeline stage {}", i + 1),
            ));
        }
    }
    Ok(())
}

/// Whitespace-only bodies do not count as definitions.
fn is_empty_tree(list: &[Node]) -> bool {
    list.iter().all(|node| match node {
        Node::Text(text) => text.trim().is_empty(),
        _ => false,
    })
}

fn unquote(text: &str) -> Option<String> {
    if let Some(raw) = text.strip_prefix('`') {
        return Some(raw.strip_suffix('`')?.replace('\r', ""));
    }
    let inner = text.strip_prefix('"')?.strip_suffix('"')?;
    decode_escapes(inner, '"')
}

fn unquote_char(text: &str) -> Option<char> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let decoded = decode_escapes(inner, '\'')?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

fn decode_escapes(inner: &str, quote: char) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            if c == quote {
                return None;
            }
            out.push(c);
            continue;
        }
        let escaped = match chars.next()? {
            'a' => '\x07',
            'b' => '\x08',
            'f' => '\x0C',
            'n' => '\n',
            'r' => '\r',
            't' => '\t',
            'v' => '\x0B',
            '\\' => '\\',
            q if q == quote => q,
            'x' => hex_char(&mut chars, 2)?,
            'u' => hex_char(&mut chars, 4)?,
            'U' => hex_char(&mut chars, 8)?,
            d @ '0'..='7' => {
                let rest: String = chars.by_ref().take(2).collect();
                let code = u32::from_str_radix(&format!("{d}{rest}"), 8).ok()?;
                if rest.len() != 2 || code > 0xFF {
                    return None;
                }
                char::from_u32(code)?
            }
            _ => return None,
        };
        out.push(escaped);
    }
    Some(out)
}

fn hex_char(chars: &mut std::str::Chars<'_>, digits: usize) -> Option<char> {
    let hex: String = chars.by_ref().take(digits).collect();
    if hex.len() != digits {
        return None;
    }
    char::from_u32(u32::from_str_radix(&hex, 16).ok()?)
}

fn parse_number(text: &str) -> Result<Number, String> {
    let bad = || format!("bad number syntax: {text:?}");
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (negative, body) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, cleaned.strip_prefix('+').unwrap_or(&cleaned)),
    };
    if !body.starts_with(|c: char| c.is_ascii_digit() || c == '.') {
        return Err(bad());
    }

    let lower = body.to_ascii_lowercase();
    let radix = if lower.starts_with("0x") {
        Some((16, &body[2..]))
    } else if lower.starts_with("0o") {
        Some((8, &body[2..]))
    } else if lower.starts_with("0b") {
        Some((2, &body[2..]))
    } else if body.len() > 1 && body.starts_with('0') && body.bytes().all(|b| b.is_ascii_digit()) {
        Some((8, &body[1..]))
    } else {
        None
    };
    if let Some((radix, digits)) = radix {
        let magnitude = i64::from_str_radix(digits, radix).map_err(|_| bad())?;
        return Ok(Number::Int(if negative { -magnitude } else { magnitude }));
    }

    if body.contains(['.', 'e', 'E']) {
        let value: f64 = body.parse().map_err(|_| bad())?;
        return Ok(Number::Float(if negative { -value } else { value }));
    }
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let signed = if negative { format!("-{body}") } else { body.to_string() };
    signed
        .parse::<i64>()
        .map(Number::Int)
        .map_err(|_| format!("{text} overflows int"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_default(src: &str) -> Result<Trees, SyntaxError> {
        parse("t", src, &Delimiters::default())
    }

    fn main_tree(src: &str) -> Vec<Node> {
        parse_default(src).unwrap().remove("t").unwrap()
    }

    fn error(src: &str) -> String {
        parse_default(src).unwrap_err().message
    }

    #[test]
    fn test_text_only() {
        assert_eq!(main_tree("plain"), vec![Node::Text("plain".into())]);
    }

    #[test]
    fn test_action_display_roundtrip() {
        let tree = main_tree(r#"{{ .a.b | printf "%s-%d" $ 3 }}"#);
        let Node::Action(pipe) = &tree[0] else {
            panic!("expected action, got {tree:?}");
        };
        assert_eq!(pipe.to_string(), r#".a.b | printf "%s-%d" $ 3"#);
    }

    #[test]
    fn test_declaration() {
        let tree = main_tree("{{$x := .a}}{{$x}}");
        let Node::Action(pipe) = &tree[0] else {
            panic!("expected action");
        };
        assert_eq!(pipe.decl, vec!["$x".to_string()]);
        assert!(!pipe.is_assign);
    }

    #[test]
    fn test_range_two_variables() {
        let tree = main_tree("{{range $i, $e := .}}{{$i}}{{$e}}{{end}}");
        let Node::Range(branch) = &tree[0] else {
            panic!("expected range");
        };
        assert_eq!(branch.pipe.decl, vec!["$i".to_string(), "$e".to_string()]);
    }

    #[test]
    fn test_else_if_chain_shares_end() {
        let tree = main_tree("{{if .a}}A{{else if .b}}B{{else}}C{{end}}");
        let Node::If(branch) = &tree[0] else {
            panic!("expected if");
        };
        let else_list = branch.else_list.as_ref().unwrap();
        assert!(matches!(else_list.as_slice(), [Node::If(_)]));
    }

    #[test]
    fn test_define_creates_tree() {
        let trees = parse_default(r#"{{define "x"}}X{{end}}body"#).unwrap();
        assert_eq!(trees["x"], vec![Node::Text("X".into())]);
        assert_eq!(trees["t"], vec![Node::Text("body".into())]);
    }

    #[test]
    fn test_block_defines_and_invokes() {
        let trees = parse_default(r#"{{block "b" .}}B{{end}}"#).unwrap();
        assert_eq!(trees["b"], vec![Node::Text("B".into())]);
        assert!(matches!(trees["t"].as_slice(), [Node::Template { name, .. }] if name == "b"));
    }

    #[test]
    fn test_errors() {
        assert_eq!(error("{{end}}"), "unexpected {{end}}");
        assert_eq!(error("{{else}}"), "unexpected {{else}}");
        assert_eq!(error("{{if .a}}x"), "unexpected EOF");
        assert_eq!(error("{{}}"), "missing value for command");
        assert_eq!(error("{{nosuch .a}}"), "function \"nosuch\" not defined");
        assert_eq!(error("{{$y}}"), "undefined variable \"$y\"");
        assert_eq!(error("{{$y = 1}}"), "undefined variable \"$y\"");
        assert_eq!(error("{{break}}"), "{{break}} outside {{range}}");
        assert_eq!(error("{{if .a}}{{else}}{{else}}{{end}}"), "expected end; found {{else}}");
        assert_eq!(error("{{.a | 3}}"), "non executable command in pipeline stage 2");
        assert_eq!(error("{{\"x\".y}}"), "unexpected . after term \"\\\"x\\\"\"");
        assert_eq!(error("{{if .a}}{{define \"x\"}}{{end}}{{end}}"), "unexpected <define> in command");
        assert!(error("{{range .a}}{{else if .b}}{{end}}").starts_with("unexpected <if> after else"));
    }

    #[test]
    fn test_nesting_limit() {
        let nested_ifs = |n: usize| format!("{}x{}", "{{if true}}".repeat(n), "{{end}}".repeat(n));
        assert!(parse_default(&nested_ifs(MAX_NESTING)).is_ok());
        assert_eq!(error(&nested_ifs(MAX_NESTING + 1)), "max nesting depth exceeded");
        assert_eq!(error(&nested_ifs(2000)), "max nesting depth exceeded");

        let nested_ranges = format!("{}x{}", "{{range .}}".repeat(500), "{{end}}".repeat(500));
        assert_eq!(error(&nested_ranges), "max nesting depth exceeded");
    }

    #[test]
    fn test_expression_depth_limit() {
        let parens = |n: usize| format!("{{{{ {}1{} }}}}", "(".repeat(n), ")".repeat(n));
        assert!(parse_default(&parens(MAX_NESTING)).is_ok());
        assert_eq!(error(&parens(500)), "max expression depth exceeded");
    }

    #[test]
    fn test_multiple_definition() {
        let err = error(r#"{{define "x"}}1{{end}}{{define "x"}}2{{end}}"#);
        assert_eq!(err, "multiple definition of template \"x\"");
    }

    #[test]
    fn test_variable_scope_ends_with_control() {
        assert_eq!(error("{{if true}}{{$x := 1}}{{end}}{{$x}}"), "undefined variable \"$x\"");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("42"), Ok(Number::Int(42)));
        assert_eq!(parse_number("-7"), Ok(Number::Int(-7)));
        assert_eq!(parse_number("0x1F"), Ok(Number::Int(31)));
        assert_eq!(parse_number("017"), Ok(Number::Int(15)));
        assert_eq!(parse_number("0b101"), Ok(Number::Int(5)));
        assert_eq!(parse_number("1_000"), Ok(Number::Int(1000)));
        assert_eq!(parse_number("1.5"), Ok(Number::Float(1.5)));
        assert_eq!(parse_number("1e3"), Ok(Number::Float(1000.0)));
        assert!(parse_number("12ab").is_err());
        assert!(parse_number("99999999999999999999").is_err());
    }

    #[test]
    fn test_unquote() {
        assert_eq!(unquote(r#""a\tb\"c""#).as_deref(), Some("a\tb\"c"));
        assert_eq!(unquote(r#""é\x41\101""#).as_deref(), Some("éAA"));
        assert_eq!(unquote("`raw\\n`").as_deref(), Some("raw\\n"));
        assert_eq!(unquote(r#""\q""#), None);
        assert_eq!(unquote_char("'a'"), Some('a'));
        assert_eq!(unquote_char(r"'\n'"), Some('\n'));
        assert_eq!(unquote_char("'ab'"), None);
    }
}
