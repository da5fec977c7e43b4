//! Builtin template functions.
//!
//! `and` and `or` short-circuit, so the executor evaluates them itself;
//! every other builtin receives fully evaluated arguments through [`call`].

use std::cmp::Ordering;

use crate::value::{format_float, Number, Value};

const BUILTINS: &[&str] = &[
    "and", "eq", "ge", "gt", "html", "index", "js", "le", "len", "lt", "ne", "not", "or",
    "print", "printf", "println", "slice", "urlquery",
];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub(crate) enum FuncError {
    #[error("wrong number of args for {name}: want {want} got {got}")]
    Arity {
        name: String,
        want: String,
        got: usize,
    },

    #[error("error calling {name}: {message}")]
    Call { name: String, message: String },
}

fn exactly(name: &str, args: &[Value], want: usize) -> Result<(), FuncError> {
    if args.len() != want {
        return Err(FuncError::Arity {
            name: name.to_string(),
            want: want.to_string(),
            got: args.len(),
        });
    }
    Ok(())
}

fn at_least(name: &str, args: &[Value], min: usize) -> Result<(), FuncError> {
    if args.len() < min {
        return Err(FuncError::Arity {
            name: name.to_string(),
            want: format!("at least {min}"),
            got: args.len(),
        });
    }
    Ok(())
}

fn failure(name: &str, message: impl Into<String>) -> FuncError {
    FuncError::Call {
        name: name.to_string(),
        message: message.into(),
    }
}

pub(crate) fn call(name: &str, args: &[Value]) -> Result<Value, FuncError> {
    match name {
        "not" => {
            exactly(name, args, 1)?;
            Ok(Value::Bool(!args[0].is_truthy()))
        }
        "len" => {
            exactly(name, args, 1)?;
            length(&args[0]).map_err(|m| failure(name, m))
        }
        "index" => {
            at_least(name, args, 1)?;
            index(&args[0], &args[1..]).map_err(|m| failure(name, m))
        }
        "slice" => {
            at_least(name, args, 1)?;
            slice(&args[0], &args[1..]).map_err(|m| failure(name, m))
        }
        "print" => Ok(Value::String(sprint(args))),
        "println" => Ok(Value::String(sprintln(args))),
        "printf" => {
            at_least(name, args, 1)?;
            let format = match &args[0] {
                Value::String(s) => s.as_str(),
                other => {
                    return Err(failure(
                        name,
                        format!("format is a {}, not a string", other.kind_name()),
                    ))
                }
            };
            Ok(Value::String(sprintf(format, &args[1..])))
        }
        "eq" => {
            at_least(name, args, 1)?;
            if args.len() < 2 {
                return Err(failure(name, "missing argument for comparison"));
            }
            for other in &args[1..] {
                if equal(&args[0], other).map_err(|m| failure(name, m))? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        "ne" => {
            exactly(name, args, 2)?;
            let eq = equal(&args[0], &args[1]).map_err(|m| failure(name, m))?;
            Ok(Value::Bool(!eq))
        }
        "lt" | "le" | "gt" | "ge" => {
            exactly(name, args, 2)?;
            let ordering = compare(&args[0], &args[1]).map_err(|m| failure(name, m))?;
            Ok(Value::Bool(match name {
                "lt" => ordering == Ordering::Less,
                "le" => ordering != Ordering::Greater,
                "gt" => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }))
        }
        "html" => Ok(Value::String(html_escape(&escaper_input(args)))),
        "js" => Ok(Value::String(js_escape(&escaper_input(args)))),
        "urlquery" => Ok(Value::String(query_escape(&escaper_input(args)))),
        _ => Err(failure(name, "not a callable function")),
    }
}

fn length(value: &Value) -> Result<Value, String> {
    let n = match value {
        Value::String(s) => s.len(),
        Value::Sequence(items) => items.len(),
        Value::Mapping(map) => map.len(),
        Value::Null => return Err("len of nil pointer".into()),
        other => return Err(format!("len of type {}", other.kind_name())),
    };
    Ok(Value::Number(Number::Int(n as i64)))
}

fn int_index(value: &Value) -> Result<i64, String> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| format!("cannot index slice/array with non-integer {n}")),
        Value::Null => Err("cannot index slice/array with nil".into()),
        other => Err(format!(
            "cannot index slice/array with type {}",
            other.kind_name()
        )),
    }
}

fn checked_index(value: &Value, cap: usize) -> Result<usize, String> {
    let i = int_index(value)?;
    if i < 0 || i as u64 > cap as u64 {
        return Err(format!("index out of range: {i}"));
    }
    Ok(i as usize)
}

fn index(item: &Value, indexes: &[Value]) -> Result<Value, String> {
    let mut current = item.clone();
    for idx in indexes {
        current = match &current {
            Value::Null => return Err("index of untyped nil".into()),
            Value::Sequence(items) => {
                let i = checked_index(idx, items.len())?;
                items
                    .get(i)
                    .cloned()
                    .ok_or_else(|| format!("index out of range: {i}"))?
            }
            Value::String(s) => {
                let i = checked_index(idx, s.len())?;
                let byte = s
                    .as_bytes()
                    .get(i)
                    .ok_or_else(|| format!("index out of range: {i}"))?;
                Value::Number(Number::Int(i64::from(*byte)))
            }
            Value::Mapping(map) => match idx {
                Value::String(key) => map.get(key).cloned().unwrap_or(Value::Null),
                other => {
                    return Err(format!(
                        "value has type {}; should be string",
                        other.kind_name()
                    ))
                }
            },
            other => return Err(format!("can't index item of type {}", other.kind_name())),
        };
    }
    Ok(current)
}

fn slice(item: &Value, indexes: &[Value]) -> Result<Value, String> {
    if indexes.len() > 3 {
        return Err(format!("too many slice indexes: {}", indexes.len()));
    }
    let len = match item {
        Value::Sequence(items) => items.len(),
        Value::String(s) => {
            if indexes.len() == 3 {
                return Err("cannot 3-index slice a string".into());
            }
            s.len()
        }
        Value::Null => return Err("slice of untyped nil".into()),
        other => return Err(format!("can't slice item of type {}", other.kind_name())),
    };

    let bounds = indexes
        .iter()
        .map(|idx| checked_index(idx, len))
        .collect::<Result<Vec<_>, _>>()?;
    let start = bounds.first().copied().unwrap_or(0);
    let end = bounds.get(1).copied().unwrap_or(len);
    if start > end {
        return Err(format!("invalid slice index: {start} > {end}"));
    }
    if let Some(&max) = bounds.get(2) {
        if end > max {
            return Err(format!("invalid slice index: {end} > {max}"));
        }
    }

    Ok(match item {
        Value::String(s) => Value::String(String::from_utf8_lossy(&s.as_bytes()[start..end]).into_owned()),
        Value::Sequence(items) => Value::Sequence(items[start..end].to_vec()),
        _ => Value::Null,
    })
}

/// Equality of basic values. Integers and floats compare numerically.
fn equal(a: &Value, b: &Value) -> Result<bool, String> {
    match (a, b) {
        (Value::Sequence(_) | Value::Mapping(_), _) => {
            Err(format!("non-comparable type {}", a.kind_name()))
        }
        (_, Value::Sequence(_) | Value::Mapping(_)) => {
            Err(format!("non-comparable type {}", b.kind_name()))
        }
        (Value::Null, other) | (other, Value::Null) => Ok(other.is_null()),
        (Value::Bool(x), Value::Bool(y)) => Ok(x == y),
        (Value::Number(x), Value::Number(y)) => Ok(compare_numbers(*x, *y) == Some(Ordering::Equal)),
        (Value::String(x), Value::String(y)) => Ok(x == y),
        _ => Err("incompatible types for comparison".into()),
    }
}

fn compare(a: &Value, b: &Value) -> Result<Ordering, String> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            compare_numbers(*x, *y).ok_or_else(|| "NaN is not ordered".to_string())
        }
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        (Value::Number(_) | Value::String(_), Value::Number(_) | Value::String(_)) => {
            Err("incompatible types for comparison".into())
        }
        _ => Err("invalid type for comparison".into()),
    }
}

fn compare_numbers(x: Number, y: Number) -> Option<Ordering> {
    match (x, y) {
        (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
        _ => x.as_f64().partial_cmp(&y.as_f64()),
    }
}

/// `fmt.Sprint` spacing: a space goes between operands when neither is a string.
pub(crate) fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !matches!(arg, Value::String(_)) && !matches!(args[i - 1], Value::String(_)) {
            out.push(' ');
        }
        out.push_str(&arg.to_string());
    }
    out
}

fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

fn escaper_input(args: &[Value]) -> String {
    match args {
        [Value::String(s)] => s.clone(),
        _ => sprint(args),
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '\'' => out.push_str("&#39;"),
            '"' => out.push_str("&#34;"),
            '\0' => out.push('\u{FFFD}'),
            c => out.push(c),
        }
    }
    out
}

fn js_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            '>' => out.push_str("\\u003E"),
            '&' => out.push_str("\\u0026"),
            '=' => out.push_str("\\u003D"),
            c if c.is_control() => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

fn query_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(char::from(byte))
            }
            b' ' => out.push('+'),
            other => out.push_str(&format!("%{other:02X}")),
        }
    }
    out
}

// --- printf ---

/// Widths and precisions above this are reported as `%!(BADWIDTH)` / `%!(BADPREC)`.
const MAX_WIDTH: usize = 1_000_000;

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    sharp: bool,
    zero: bool,
    space: bool,
    width: Option<usize>,
    precision: Option<usize>,
    verb: char,
}

/// Go type names, as they appear in `%!verb(type=value)` diagnostics.
pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "<nil>",
        Value::Bool(_) => "bool",
        Value::Number(Number::Int(_)) => "int",
        Value::Number(Number::Float(_)) => "float64",
        Value::String(_) => "string",
        Value::Sequence(_) => "[]interface {}",
        Value::Mapping(_) => "map[string]interface {}",
    }
}

fn take_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> Option<usize> {
    let mut n: Option<usize> = None;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        chars.next();
        n = Some(n.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
    }
    n
}

/// `*` consumes an integer argument for width or precision.
fn star_argument(args: &[Value], next_arg: &mut usize) -> Option<i64> {
    let value = args.get(*next_arg)?;
    *next_arg += 1;
    match value {
        Value::Number(Number::Int(i)) => Some(*i),
        _ => None,
    }
}

pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut next_arg = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                '#' => spec.sharp = true,
                '0' => spec.zero = true,
                ' ' => spec.space = true,
                _ => break,
            }
            chars.next();
        }

        if chars.peek() == Some(&'*') {
            chars.next();
            match star_argument(args, &mut next_arg) {
                Some(w) if w.unsigned_abs() <= MAX_WIDTH as u64 => {
                    spec.minus |= w < 0;
                    spec.width = Some(w.unsigned_abs() as usize);
                }
                _ => out.push_str("%!(BADWIDTH)"),
            }
        } else {
            match take_number(&mut chars) {
                Some(w) if w > MAX_WIDTH => out.push_str("%!(BADWIDTH)"),
                width => spec.width = width,
            }
        }

        if chars.peek() == Some(&'.') {
            chars.next();
            if chars.peek() == Some(&'*') {
                chars.next();
                match star_argument(args, &mut next_arg) {
                    Some(p) if (0..=MAX_WIDTH as i64).contains(&p) => spec.precision = Some(p as usize),
                    _ => out.push_str("%!(BADPREC)"),
                }
            } else {
                match take_number(&mut chars).unwrap_or(0) {
                    p if p > MAX_WIDTH => out.push_str("%!(BADPREC)"),
                    p => spec.precision = Some(p),
                }
            }
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        spec.verb = verb;
        if verb == '%' {
            out.push('%');
            continue;
        }
        match args.get(next_arg) {
            Some(arg) => {
                next_arg += 1;
                format_arg(&mut out, &spec, arg);
            }
            None => out.push_str(&format!("%!{verb}(MISSING)")),
        }
    }

    if next_arg < args.len() {
        let extra: Vec<String> = args[next_arg..]
            .iter()
            .map(|arg| match arg {
                Value::Null => "<nil>".to_string(),
                other => format!("{}={other}", type_name(other)),
            })
            .collect();
        out.push_str(&format!("%!(EXTRA {})", extra.join(", ")));
    }
    out
}

fn format_arg(out: &mut String, spec: &Spec, value: &Value) {
    match value {
        Value::Sequence(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                format_arg(out, spec, item);
            }
            out.push(']');
            return;
        }
        Value::Mapping(map) => {
            out.push_str("map[");
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                format_arg(out, spec, &Value::String(key.clone()));
                out.push(':');
                format_arg(out, spec, item);
            }
            out.push(']');
            return;
        }
        _ => {}
    }

    let formatted = match value {
        Value::Null => (spec.verb == 'v').then(|| pad(spec, "<nil>")),
        Value::Bool(b) => matches!(spec.verb, 'v' | 't').then(|| pad(spec, &b.to_string())),
        Value::Number(Number::Int(i)) => format_int(spec, *i),
        Value::Number(Number::Float(f)) => format_float_verb(spec, *f),
        Value::String(s) => format_str(spec, s),
        Value::Sequence(_) | Value::Mapping(_) => None,
    };
    match formatted {
        Some(text) => out.push_str(&text),
        None if value.is_null() => out.push_str(&format!("%!{}(<nil>)", spec.verb)),
        None => out.push_str(&format!("%!{}({}={value})", spec.verb, type_name(value))),
    }
}

fn pad(spec: &Spec, body: &str) -> String {
    let len = body.chars().count();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return body.to_string();
    }
    let fill = width - len;
    if spec.minus {
        format!("{body}{}", " ".repeat(fill))
    } else if spec.zero {
        format!("{}{body}", "0".repeat(fill))
    } else {
        format!("{}{body}", " ".repeat(fill))
    }
}

/// Pad a number, placing zero padding between the sign/prefix and the digits.
fn pad_number(spec: &Spec, sign: &str, prefix: &str, digits: &str, zero_ok: bool) -> String {
    let len = sign.len() + prefix.len() + digits.chars().count();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return format!("{sign}{prefix}{digits}");
    }
    let fill = width - len;
    if spec.minus {
        format!("{sign}{prefix}{digits}{}", " ".repeat(fill))
    } else if spec.zero && zero_ok {
        format!("{sign}{prefix}{}{digits}", "0".repeat(fill))
    } else {
        format!("{}{sign}{prefix}{digits}", " ".repeat(fill))
    }
}

fn sign_for(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn format_int(spec: &Spec, i: i64) -> Option<String> {
    let abs = i.unsigned_abs();
    let (mut digits, prefix) = match spec.verb {
        'd' | 'v' => (abs.to_string(), ""),
        'x' => (format!("{abs:x}"), if spec.sharp { "0x" } else { "" }),
        'X' => (format!("{abs:X}"), if spec.sharp { "0X" } else { "" }),
        'o' => (format!("{abs:o}"), if spec.sharp { "0" } else { "" }),
        'O' => (format!("{abs:o}"), "0o"),
        'b' => (format!("{abs:b}"), if spec.sharp { "0b" } else { "" }),
        'c' => {
            let c = u32::try_from(i).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
            return Some(pad(spec, &c.to_string()));
        }
        'q' => {
            let c = u32::try_from(i).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
            return Some(pad(spec, &quote_char(c)));
        }
        'e' | 'E' | 'f' | 'F' | 'g' | 'G' => return format_float_verb(spec, i as f64),
        _ => return None,
    };
    if let Some(precision) = spec.precision {
        if precision == 0 && i == 0 {
            digits.clear();
        }
        if digits.len() < precision {
            digits = format!("{digits:0>precision$}");
        }
    }
    Some(pad_number(
        spec,
        sign_for(spec, i < 0),
        prefix,
        &digits,
        spec.precision.is_none(),
    ))
}

fn format_float_verb(spec: &Spec, f: f64) -> Option<String> {
    let upper = matches!(spec.verb, 'E' | 'G');
    let negative = f.is_sign_negative() && !f.is_nan();
    let abs = f.abs();

    if f.is_nan() || f.is_infinite() {
        if !matches!(spec.verb, 'v' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G') {
            return None;
        }
        let (sign, body) = if f.is_nan() {
            (if spec.plus { "+" } else { "" }, "NaN")
        } else {
            (if negative { "-" } else { "+" }, "Inf")
        };
        return Some(pad_number(spec, sign, "", body, false));
    }

    let body = match spec.verb {
        'f' | 'F' => format!("{:.*}", spec.precision.unwrap_or(6), abs),
        'e' | 'E' => exponent_form(abs, spec.precision.unwrap_or(6)),
        'g' | 'G' | 'v' => match spec.precision {
            None => format_float(abs),
            Some(p) => general_form(abs, p.max(1)),
        },
        'd' if f.fract() == 0.0 && abs < 9.2e18 => return format_int(spec, f as i64),
        _ => return None,
    };
    let body = if upper { body.to_uppercase() } else { body };
    Some(pad_number(spec, sign_for(spec, negative), "", &body, true))
}

/// Split Rust's `{:e}` output into mantissa and exponent.
fn split_exponent(sci: &str) -> (&str, i32) {
    match sci.split_once('e') {
        Some((mantissa, exp)) => (mantissa, exp.parse().unwrap_or(0)),
        None => (sci, 0),
    }
}

fn go_exponent(mantissa: &str, exp: i32) -> String {
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}e{sign}{:02}", exp.abs())
}

fn exponent_form(abs: f64, precision: usize) -> String {
    let sci = format!("{abs:.precision$e}");
    let (mantissa, exp) = split_exponent(&sci);
    go_exponent(mantissa, exp)
}

/// `%.Ng`: N significant digits, exponent form when the exponent is below -4
/// or at least the precision.
fn general_form(abs: f64, precision: usize) -> String {
    let sci = format!("{:.*e}", precision - 1, abs);
    let (mantissa, exp) = split_exponent(&sci);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let significant = digits.trim_end_matches('0');
    let significant = if significant.is_empty() { "0" } else { significant };

    let nd = significant.len() as i32;
    let dp = exp + 1;
    let mut eprec = precision as i32;
    if eprec > nd && nd >= dp {
        eprec = nd;
    }
    if exp < -4 || exp >= eprec {
        let mantissa = if significant.len() > 1 {
            format!("{}.{}", &significant[..1], &significant[1..])
        } else {
            significant.to_string()
        };
        go_exponent(&mantissa, exp)
    } else {
        let decimals = (nd - dp).max(0) as usize;
        format!("{abs:.decimals$}")
    }
}

fn format_str(spec: &Spec, s: &str) -> Option<String> {
    let truncated: String = match spec.precision {
        Some(p) => s.chars().take(p).collect(),
        None => s.to_string(),
    };
    match spec.verb {
        's' | 'v' => Some(pad(spec, &truncated)),
        'q' => Some(pad(spec, &quote_str(&truncated))),
        'x' => Some(pad(spec, &hex_bytes(&truncated, false))),
        'X' => Some(pad(spec, &hex_bytes(&truncated, true))),
        _ => None,
    }
}

fn hex_bytes(s: &str, upper: bool) -> String {
    s.bytes()
        .map(|b| if upper { format!("{b:02X}") } else { format!("{b:02x}") })
        .collect()
}

fn push_escaped(out: &mut String, c: char, quote: char) {
    match c {
        '\x07' => out.push_str("\\a"),
        '\x08' => out.push_str("\\b"),
        '\x0C' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\x0B' => out.push_str("\\v"),
        '\\' => out.push_str("\\\\"),
        c if c == quote => {
            out.push('\\');
            out.push(c);
        }
        c if (c as u32) < 0x80 && c.is_control() => out.push_str(&format!("\\x{:02x}", c as u32)),
        c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}

fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        push_escaped(&mut out, c, '"');
    }
    out.push('"');
    out
}

fn quote_char(c: char) -> String {
    let mut out = String::from("'");
    push_escaped(&mut out, c, '\'');
    out.push('\'');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &str) -> Value {
        Value::from(v)
    }

    fn i(v: i64) -> Value {
        Value::from(v)
    }

    fn call_ok(name: &str, args: &[Value]) -> Value {
        call(name, args).unwrap()
    }

    #[test]
    fn test_sprintf_verbs() {
        assert_eq!(sprintf("%s-%d", &[s("a"), i(3)]), "a-3");
        assert_eq!(sprintf("%5d|%-5d|%05d", &[i(42), i(42), i(-42)]), "   42|42   |-0042");
        assert_eq!(sprintf("%x %X %#x %o %b", &[i(255), i(255), i(255), i(8), i(5)]), "ff FF 0xff 10 101");
        assert_eq!(sprintf("%.2f", &[Value::from(3.14159)]), "3.14");
        assert_eq!(sprintf("%.2f", &[i(5)]), "5.00");
        assert_eq!(sprintf("%e", &[Value::from(1234.5678)]), "1.234568e+03");
        assert_eq!(sprintf("%g", &[Value::from(0.00001)]), "1e-05");
        assert_eq!(sprintf("%.3g", &[Value::from(1234.5678)]), "1.23e+03");
        assert_eq!(sprintf("%.3g", &[Value::from(12.0)]), "12");
        assert_eq!(sprintf("%q", &[s("a\"b\n")]), "\"a\\\"b\\n\"");
        assert_eq!(sprintf("%t %v", &[Value::from(true), Value::Null]), "true <nil>");
        assert_eq!(sprintf("%c%c", &[i(72), i(105)]), "Hi");
        assert_eq!(sprintf("%.2s|%6s|%-4s|", &[s("abcdef"), s("ab"), s("ab")]), "ab|    ab|ab  |");
        assert_eq!(sprintf("100%%", &[]), "100%");
        assert_eq!(sprintf("%+d %+.1f", &[i(3), Value::from(2.0)]), "+3 +2.0");
        assert_eq!(sprintf("%*d", &[i(4), i(7)]), "   7");
        assert_eq!(sprintf("%x", &[s("hi")]), "6869");
    }

    #[test]
    fn test_sprintf_diagnostics() {
        assert_eq!(sprintf("%d", &[]), "%!d(MISSING)");
        assert_eq!(sprintf("%d", &[s("x")]), "%!d(string=x)");
        assert_eq!(sprintf("%d", &[Value::Null]), "%!d(<nil>)");
        assert_eq!(sprintf("x", &[i(1), s("y")]), "x%!(EXTRA int=1, string=y)");
        assert_eq!(sprintf("%", &[]), "%!(NOVERB)");
    }

    #[test]
    fn test_sprintf_width_and_precision_limits() {
        assert_eq!(sprintf("%999999999999d", &[i(1)]), "%!(BADWIDTH)1");
        assert_eq!(sprintf("%.999999999999f", &[Value::from(1.5)]), "%!(BADPREC)1.500000");
        assert_eq!(sprintf("%*d", &[i(2_000_000), i(1)]), "%!(BADWIDTH)1");
        assert_eq!(sprintf("%.*d", &[i(-2_000_000), i(1)]), "%!(BADPREC)1");
        assert_eq!(sprintf("%.*s", &[i(2_000_000), s("ab")]), "%!(BADPREC)ab");
        assert_eq!(sprintf("%1000000d", &[i(1)]).len(), 1_000_000);
        assert_eq!(sprintf("%.5d", &[i(42)]), "00042");
    }

    #[test]
    fn test_sprintf_composites() {
        let seq = Value::Sequence(vec![i(1), i(2)]);
        assert_eq!(sprintf("%v", &[seq.clone()]), "[1 2]");
        assert_eq!(sprintf("%03d", &[seq]), "[001 002]");
        let map: Value = [("a", 1i64)].into_iter().collect();
        assert_eq!(sprintf("%v", &[map]), "map[a:1]");
    }

    #[test]
    fn test_print_spacing() {
        assert_eq!(sprint(&[i(1), i(2)]), "1 2");
        assert_eq!(sprint(&[s("a"), i(1), s("b")]), "a1b");
        assert_eq!(sprint(&[s("a"), s("b")]), "ab");
        assert_eq!(call_ok("println", &[s("a"), i(1)]), s("a 1\n"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call_ok("eq", &[i(1), i(2), i(1)]), Value::Bool(true));
        assert_eq!(call_ok("eq", &[i(1), Value::from(1.0)]), Value::Bool(true));
        assert_eq!(call_ok("ne", &[s("a"), s("b")]), Value::Bool(true));
        assert_eq!(call_ok("lt", &[i(1), Value::from(1.5)]), Value::Bool(true));
        assert_eq!(call_ok("ge", &[s("b"), s("a")]), Value::Bool(true));
        assert_eq!(call_ok("le", &[i(2), i(2)]), Value::Bool(true));
        assert_eq!(call_ok("eq", &[Value::Null, Value::Null]), Value::Bool(true));
        assert_eq!(call_ok("eq", &[Value::Null, i(0)]), Value::Bool(false));
    }

    #[test]
    fn test_comparison_errors() {
        assert_eq!(
            call("eq", &[i(1), s("1")]).unwrap_err().to_string(),
            "error calling eq: incompatible types for comparison"
        );
        assert_eq!(
            call("lt", &[Value::from(true), Value::from(false)]).unwrap_err().to_string(),
            "error calling lt: invalid type for comparison"
        );
        assert_eq!(
            call("eq", &[i(1)]).unwrap_err().to_string(),
            "error calling eq: missing argument for comparison"
        );
        assert_eq!(
            call("eq", &[Value::Sequence(vec![]), i(1)]).unwrap_err().to_string(),
            "error calling eq: non-comparable type sequence"
        );
    }

    #[test]
    fn test_arity() {
        assert_eq!(
            call("not", &[]).unwrap_err().to_string(),
            "wrong number of args for not: want 1 got 0"
        );
        assert_eq!(
            call("index", &[]).unwrap_err().to_string(),
            "wrong number of args for index: want at least 1 got 0"
        );
    }

    #[test]
    fn test_len_and_index() {
        let seq = Value::Sequence(vec![s("a"), s("b")]);
        let map: Value = [("k", seq.clone())].into_iter().collect();
        assert_eq!(call_ok("len", &[seq.clone()]), i(2));
        assert_eq!(call_ok("len", &[s("héllo")]), i(6));
        assert_eq!(call_ok("index", &[map.clone(), s("k"), i(1)]), s("b"));
        assert_eq!(call_ok("index", &[map.clone(), s("missing")]), Value::Null);
        assert_eq!(call_ok("index", &[s("A")]), s("A"));
        assert_eq!(
            call("index", &[seq, i(5)]).unwrap_err().to_string(),
            "error calling index: index out of range: 5"
        );
        assert_eq!(
            call("len", &[i(3)]).unwrap_err().to_string(),
            "error calling len: len of type int"
        );
    }

    #[test]
    fn test_slice() {
        let seq = Value::Sequence(vec![i(1), i(2), i(3)]);
        assert_eq!(call_ok("slice", &[seq.clone(), i(1)]), Value::Sequence(vec![i(2), i(3)]));
        assert_eq!(call_ok("slice", &[seq.clone(), i(0), i(2)]), Value::Sequence(vec![i(1), i(2)]));
        assert_eq!(call_ok("slice", &[s("hello"), i(1), i(3)]), s("el"));
        assert!(call("slice", &[seq.clone(), i(2), i(1)]).is_err());
        assert!(call("slice", &[s("abc"), i(0), i(1), i(2)]).is_err());
        assert!(call("slice", &[seq, i(4)]).is_err());
    }

    #[test]
    fn test_escapers() {
        assert_eq!(call_ok("html", &[s("<a href='x'>&</a>")]), s("&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;"));
        assert_eq!(call_ok("js", &[s("it's <b>\n")]), s("it\\'s \\u003Cb\\u003E\\u000A"));
        assert_eq!(call_ok("urlquery", &[s("a b&c=d/é")]), s("a+b%26c%3Dd%2F%C3%A9"));
        assert_eq!(call_ok("html", &[i(1), i(2)]), s("1 2"));
    }

    #[test]
    fn test_not() {
        assert_eq!(call_ok("not", &[s("")]), Value::Bool(true));
        assert_eq!(call_ok("not", &[i(1)]), Value::Bool(false));
    }

    #[test]
    fn test_is_builtin() {
        assert!(is_builtin("printf"));
        assert!(is_builtin("and"));
        assert!(!is_builtin("upper"));
    }
}
