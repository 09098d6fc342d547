//! Symptom predicates.
//!
//! Each symptom is one term of a signature document and tests a single
//! aspect of a `CrashInfo`.

use regex::Regex;
use serde_json::{Map, Value};

use crate::crashinfo::CrashInfo;
use crate::error::SignatureSyntaxError;

/// Matches a string either by substring or by regular expression.
///
/// In documents a plain string is a substring match and `/.../` is a regex.
/// The object form `{"value": .., "matchType": "contains" | "pcre"}` is
/// accepted as well.
#[derive(Debug, Clone)]
pub enum StringMatch {
    Contains(String),
    Pattern(Regex),
}

impl StringMatch {
    pub fn parse(field: &'static str, value: &Value) -> Result<Self, SignatureSyntaxError> {
        match value {
            Value::String(s) => Self::from_text(s),
            Value::Object(obj) => {
                let text = obj.get("value").and_then(Value::as_str).ok_or(
                    SignatureSyntaxError::MissingField {
                        field: "value",
                        context: field.to_string(),
                    },
                )?;
                match obj.get("matchType").and_then(Value::as_str) {
                    None | Some("contains") => Ok(Self::Contains(text.to_string())),
                    Some("pcre") => Self::regex(text),
                    Some(other) => Err(SignatureSyntaxError::InvalidValue {
                        field,
                        reason: format!("unknown matchType {:?}", other),
                    }),
                }
            }
            _ => Err(SignatureSyntaxError::InvalidValue {
                field,
                reason: "expected a string or a match object".to_string(),
            }),
        }
    }

    pub fn from_text(text: &str) -> Result<Self, SignatureSyntaxError> {
        if text.len() >= 2 && text.starts_with('/') && text.ends_with('/') {
            Self::regex(&text[1..text.len() - 1])
        } else {
            Ok(Self::Contains(text.to_string()))
        }
    }

    fn regex(pattern: &str) -> Result<Self, SignatureSyntaxError> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| SignatureSyntaxError::InvalidRegex {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn matches(&self, text: &str) -> bool {
        match self {
            Self::Contains(needle) => text.contains(needle.as_str()),
            Self::Pattern(re) => re.is_match(text),
        }
    }
}

/// Numeric comparison: `N`, `< N`, `<= N`, `> N`, `>= N` or `A - B` (inclusive).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberMatch {
    Eq(u64),
    Lt(u64),
    Le(u64),
    Gt(u64),
    Ge(u64),
    Range(u64, u64),
}

impl NumberMatch {
    pub fn parse(field: &'static str, value: &Value) -> Result<Self, SignatureSyntaxError> {
        match value {
            Value::Number(n) => n.as_u64().map(Self::Eq).ok_or_else(|| {
                SignatureSyntaxError::InvalidValue {
                    field,
                    reason: format!("{} is not an unsigned integer", n),
                }
            }),
            Value::String(s) => Self::parse_expr(field, s),
            _ => Err(SignatureSyntaxError::InvalidValue {
                field,
                reason: "expected a number or a comparison string".to_string(),
            }),
        }
    }

    fn parse_expr(field: &'static str, expr: &str) -> Result<Self, SignatureSyntaxError> {
        let expr = expr.trim();
        let number = |text: &str| parse_number(text.trim()).ok_or_else(|| invalid_number(field, text));

        if let Some(rest) = expr.strip_prefix("<=") {
            return Ok(Self::Le(number(rest)?));
        }
        if let Some(rest) = expr.strip_prefix(">=") {
            return Ok(Self::Ge(number(rest)?));
        }
        if let Some(rest) = expr.strip_prefix('<') {
            return Ok(Self::Lt(number(rest)?));
        }
        if let Some(rest) = expr.strip_prefix('>') {
            return Ok(Self::Gt(number(rest)?));
        }
        if let Some((low, high)) = expr.split_once('-') {
            let (low, high) = (number(low)?, number(high)?);
            if low > high {
                return Err(SignatureSyntaxError::InvalidValue {
                    field,
                    reason: format!("empty range {:?}", expr),
                });
            }
            return Ok(Self::Range(low, high));
        }
        Ok(Self::Eq(number(expr)?))
    }

    pub fn matches(&self, value: u64) -> bool {
        match *self {
            Self::Eq(n) => value == n,
            Self::Lt(n) => value < n,
            Self::Le(n) => value <= n,
            Self::Gt(n) => value > n,
            Self::Ge(n) => value >= n,
            Self::Range(low, high) => (low..=high).contains(&value),
        }
    }
}

fn parse_number(text: &str) -> Option<u64> {
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

fn invalid_number(field: &'static str, text: &str) -> SignatureSyntaxError {
    SignatureSyntaxError::InvalidValue {
        field,
        reason: format!("{:?} is not a number", text.trim()),
    }
}

/// Which raw output an `output` symptom looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSource {
    Stdout,
    Stderr,
    CrashData,
}

/// One entry of a `stackFrames` sequence.
#[derive(Debug, Clone)]
pub enum FrameMatch {
    /// `?` matches any single frame.
    Any,
    Function(StringMatch),
}

/// A single signature term.
#[derive(Debug, Clone)]
pub enum Symptom {
    Output {
        source: Option<OutputSource>,
        value: StringMatch,
    },
    StackFrame {
        function: StringMatch,
        frame: Option<NumberMatch>,
    },
    StackFrames(Vec<FrameMatch>),
    CrashAddress(NumberMatch),
    Instruction(StringMatch),
    StackSize(NumberMatch),
}

impl Symptom {
    pub fn parse(value: &Value) -> Result<Self, SignatureSyntaxError> {
        let obj = value.as_object().ok_or(SignatureSyntaxError::InvalidValue {
            field: "symptoms",
            reason: "each symptom must be an object".to_string(),
        })?;
        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or(SignatureSyntaxError::MissingField {
                field: "type",
                context: "symptom".to_string(),
            })?;

        match kind {
            "output" => {
                let source = match obj.get("src").and_then(Value::as_str) {
                    None => None,
                    Some("stdout") => Some(OutputSource::Stdout),
                    Some("stderr") => Some(OutputSource::Stderr),
                    Some("crashdata") => Some(OutputSource::CrashData),
                    Some(other) => {
                        return Err(SignatureSyntaxError::InvalidValue {
                            field: "src",
                            reason: format!("unknown output source {:?}", other),
                        })
                    }
                };
                let value = StringMatch::parse("value", required(obj, "value", kind)?)?;
                Ok(Self::Output { source, value })
            }
            "stackFrame" => {
                let function = StringMatch::parse("functionName", required(obj, "functionName", kind)?)?;
                let frame = obj
                    .get("frameNumber")
                    .map(|v| NumberMatch::parse("frameNumber", v))
                    .transpose()?;
                Ok(Self::StackFrame { function, frame })
            }
            "stackFrames" => {
                let names = required(obj, "functionNames", kind)?.as_array().ok_or(
                    SignatureSyntaxError::InvalidValue {
                        field: "functionNames",
                        reason: "expected an array".to_string(),
                    },
                )?;
                let frames = names
                    .iter()
                    .map(|name| match name {
                        Value::String(s) if s == "?" => Ok(FrameMatch::Any),
                        other => StringMatch::parse("functionNames", other).map(FrameMatch::Function),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Self::StackFrames(frames))
            }
            "crashAddress" => Ok(Self::CrashAddress(NumberMatch::parse(
                "address",
                required(obj, "address", kind)?,
            )?)),
            "instruction" => Ok(Self::Instruction(StringMatch::parse(
                "instructionName",
                required(obj, "instructionName", kind)?,
            )?)),
            "stackSize" => Ok(Self::StackSize(NumberMatch::parse(
                "size",
                required(obj, "size", kind)?,
            )?)),
            other => Err(SignatureSyntaxError::UnknownSymptom(other.to_string())),
        }
    }

    pub fn matches(&self, info: &CrashInfo) -> bool {
        match self {
            Self::Output { source, value } => {
                let sources: Vec<&Vec<String>> = match source {
                    Some(OutputSource::Stdout) => vec![&info.raw_stdout],
                    Some(OutputSource::Stderr) => vec![&info.raw_stderr],
                    Some(OutputSource::CrashData) => vec![&info.raw_crash_data],
                    None => vec![&info.raw_stdout, &info.raw_stderr, &info.raw_crash_data],
                };
                sources
                    .into_iter()
                    .flatten()
                    .any(|line| value.matches(line))
            }
            Self::StackFrame { function, frame } => {
                info.backtrace.iter().enumerate().any(|(idx, name)| {
                    frame.map_or(true, |f| f.matches(idx as u64)) && function.matches(name)
                })
            }
            Self::StackFrames(frames) => {
                frames.len() <= info.backtrace.len()
                    && frames.iter().zip(&info.backtrace).all(|(m, name)| match m {
                        FrameMatch::Any => true,
                        FrameMatch::Function(f) => f.matches(name),
                    })
            }
            Self::CrashAddress(m) => info.crash_address.map_or(false, |addr| m.matches(addr)),
            Self::Instruction(m) => info
                .crash_instruction
                .as_deref()
                .map_or(false, |insn| m.matches(insn)),
            Self::StackSize(m) => m.matches(info.stack_size() as u64),
        }
    }
}

fn required<'a>(
    obj: &'a Map<String, Value>,
    field: &'static str,
    kind: &str,
) -> Result<&'a Value, SignatureSyntaxError> {
    obj.get(field).ok_or_else(|| SignatureSyntaxError::MissingField {
        field,
        context: format!("{} symptom", kind),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_match_forms() {
        assert!(StringMatch::from_text("Shape").unwrap().matches("js::Shape::search"));
        assert!(StringMatch::from_text("/^js::.*search$/").unwrap().matches("js::Shape::search"));
        assert!(!StringMatch::from_text("/^search/").unwrap().matches("js::Shape::search"));

        let pcre = StringMatch::parse("value", &json!({"value": "a+b", "matchType": "pcre"})).unwrap();
        assert!(pcre.matches("aaab"));
        let contains = StringMatch::parse("value", &json!({"value": "a+b"})).unwrap();
        assert!(contains.matches("x a+b y"));
        assert!(!contains.matches("aab"));
    }

    #[test]
    fn test_string_match_bad_regex() {
        let err = StringMatch::from_text("/(unclosed/").unwrap_err();
        assert!(matches!(err, SignatureSyntaxError::InvalidRegex { .. }));
    }

    #[test]
    fn test_number_match_expressions() {
        let parse = |s: &str| NumberMatch::parse("address", &json!(s)).unwrap();
        assert_eq!(parse("0x10"), NumberMatch::Eq(16));
        assert_eq!(parse("< 0x100"), NumberMatch::Lt(256));
        assert_eq!(parse(">=5"), NumberMatch::Ge(5));
        assert_eq!(parse("0x10 - 0x20"), NumberMatch::Range(16, 32));
        assert!(parse("0x10 - 0x20").matches(0x20));
        assert!(!parse("> 3").matches(3));
        assert_eq!(NumberMatch::parse("size", &json!(7)).unwrap(), NumberMatch::Eq(7));
    }

    #[test]
    fn test_number_match_rejects_garbage() {
        assert!(NumberMatch::parse("address", &json!("< banana")).is_err());
        assert!(NumberMatch::parse("address", &json!("0x20 - 0x10")).is_err());
        assert!(NumberMatch::parse("address", &json!(-1)).is_err());
        assert!(NumberMatch::parse("address", &json!(true)).is_err());
    }

    #[test]
    fn test_symptom_parse_errors() {
        assert!(matches!(
            Symptom::parse(&json!({"type": "telepathy"})),
            Err(SignatureSyntaxError::UnknownSymptom(_))
        ));
        assert!(matches!(
            Symptom::parse(&json!({"type": "stackFrame"})),
            Err(SignatureSyntaxError::MissingField { field: "functionName", .. })
        ));
        assert!(Symptom::parse(&json!("output")).is_err());
    }
}
