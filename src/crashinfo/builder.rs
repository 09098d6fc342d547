//! Crash information builder.
//!
//! Recognizes AddressSanitizer reports, GDB backtraces and Breakpad minidump
//! machine-readable output. The crash data field is preferred; when it is
//! empty the builder falls back to stderr.

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};

use super::config::ProgramConfiguration;

/// Frame name used when a frame has no symbol.
pub const UNKNOWN_FRAME: &str = "??";

/// Addresses below this are treated as near-null dereferences in generated signatures.
const NULL_DEREF_LIMIT: u64 = 0x100;

lazy_static! {
    static ref ASAN_ERROR: Regex = Regex::new(
        r"ERROR: AddressSanitizer:?\s*([A-Za-z][\w-]*)(?:.*?\bon (?:unknown )?address (0x[0-9a-fA-F]+))?"
    ).unwrap();
    static ref ASAN_FRAME: Regex =
        Regex::new(r"^\s*#(\d+)\s+0x[0-9a-fA-F]+(?:\s+in\s+(.+))?").unwrap();
    static ref GDB_FRAME: Regex =
        Regex::new(r"^#(\d+)\s+(?:0x[0-9a-fA-F]+\s+in\s+)?(\S+)").unwrap();
    static ref GDB_SIGNAL: Regex = Regex::new(r"received signal (SIG[A-Z0-9]+)").unwrap();
    static ref GDB_REGISTER: Regex =
        Regex::new(r"^\s*([a-z][a-z0-9]{1,3})\s+(0x[0-9a-fA-F]+)\b").unwrap();
    static ref REGISTER_NAME: Regex = Regex::new(
        r"^(?:r(?:[a-d]x|[sd]i|[bs]p|ip|[89]|1[0-5])|e(?:[a-d]x|[sd]i|[bs]p|ip)|pc|sp|lr|fp|x(?:[12]?\d|30))$"
    ).unwrap();
    static ref GDB_INSTRUCTION: Regex =
        Regex::new(r"^=>\s*0x[0-9a-fA-F]+(?:\s+<[^>]*>)?:\s*(.+?)\s*$").unwrap();
    static ref GDB_ACCESS: Regex =
        Regex::new(r"Cannot access memory at address (0x[0-9a-fA-F]+)").unwrap();
    static ref MEMORY_OPERAND: Regex =
        Regex::new(r"(-?0x[0-9a-fA-F]+)?\(%([a-z0-9]+)(?:,%([a-z0-9]+)(?:,(\d))?)?\)").unwrap();
}

/// Which crash format the raw output was recognized as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CrashKind {
    AddressSanitizer,
    Gdb,
    Minidump,
    NoCrash,
}

/// Structured view of one crash.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrashInfo {
    pub configuration: ProgramConfiguration,
    pub kind: CrashKind,
    pub raw_stdout: Vec<String>,
    pub raw_stderr: Vec<String>,
    pub raw_crash_data: Vec<String>,
    /// Function names, innermost frame first.
    pub backtrace: Vec<String>,
    pub crash_address: Option<u64>,
    pub crash_instruction: Option<String>,
    pub registers: BTreeMap<String, u64>,
    /// Signal or sanitizer error type (`SIGSEGV`, `heap-use-after-free`, ...).
    pub failure_reason: Option<String>,
}

impl CrashInfo {
    /// Build crash information from raw output.
    ///
    /// Pure and deterministic: identical inputs always produce an identical
    /// result, and nothing is cached between calls.
    pub fn from_raw_crash_data(
        stdout: &str,
        stderr: &str,
        configuration: ProgramConfiguration,
        crash_data: &str,
    ) -> Self {
        let mut info = Self {
            configuration,
            kind: CrashKind::NoCrash,
            raw_stdout: split_lines(stdout),
            raw_stderr: split_lines(stderr),
            raw_crash_data: split_lines(crash_data),
            backtrace: Vec::new(),
            crash_address: None,
            crash_instruction: None,
            registers: BTreeMap::new(),
            failure_reason: None,
        };

        let source = if info.raw_crash_data.is_empty() {
            info.raw_stderr.clone()
        } else {
            info.raw_crash_data.clone()
        };

        info.kind = detect_kind(&source);
        match info.kind {
            CrashKind::AddressSanitizer => info.parse_asan(&source),
            CrashKind::Gdb => info.parse_gdb(&source),
            CrashKind::Minidump => info.parse_minidump(&source),
            CrashKind::NoCrash => {}
        }
        info
    }

    /// Number of frames in the backtrace.
    pub fn stack_size(&self) -> usize {
        self.backtrace.len()
    }

    /// Crash address formatted for storage, e.g. `0x18`.
    pub fn crash_address_string(&self) -> Option<String> {
        self.crash_address.map(|addr| format!("0x{:x}", addr))
    }

    /// Short human-readable summary, e.g. `AddressSanitizer: SEGV [@ js::foo]`.
    pub fn short_signature(&self) -> String {
        if self.kind == CrashKind::NoCrash {
            return "No crash detected".to_string();
        }

        let prefix = match (&self.kind, &self.failure_reason) {
            (CrashKind::AddressSanitizer, Some(reason)) => Some(format!("AddressSanitizer: {}", reason)),
            (_, Some(reason)) if self.backtrace.is_empty() => Some(reason.clone()),
            _ => None,
        };

        match (prefix, self.backtrace.first()) {
            (Some(prefix), Some(top)) => format!("{} [@ {}]", prefix, top),
            (None, Some(top)) => format!("[@ {}]", top),
            (Some(prefix), None) => prefix,
            (None, None) => "Crash without backtrace".to_string(),
        }
    }

    /// Propose a signature document that matches this crash.
    ///
    /// Uses up to `max_frames` top frames, plus a near-null crash address
    /// range when applicable. Returns `None` when there is nothing to match on.
    pub fn create_signature(&self, max_frames: usize) -> Option<String> {
        let mut symptoms: Vec<Value> = Vec::new();

        let frames: Vec<&String> = self.backtrace.iter().take(max_frames).collect();
        if !frames.is_empty() {
            symptoms.push(json!({"type": "stackFrames", "functionNames": frames}));
        }

        if let Some(address) = self.crash_address {
            if address < NULL_DEREF_LIMIT {
                symptoms.push(json!({
                    "type": "crashAddress",
                    "address": format!("< 0x{:x}", NULL_DEREF_LIMIT),
                }));
            }
        }

        if frames.is_empty() {
            if let (CrashKind::AddressSanitizer, Some(reason)) = (&self.kind, &self.failure_reason) {
                let src = if self.raw_crash_data.is_empty() { "stderr" } else { "crashdata" };
                symptoms.push(json!({
                    "type": "output",
                    "src": src,
                    "value": format!("AddressSanitizer: {}", reason),
                }));
            }
        }

        if symptoms.is_empty() {
            return None;
        }
        Some(json!({ "symptoms": symptoms }).to_string())
    }

    fn parse_asan(&mut self, lines: &[String]) {
        for line in lines {
            if let Some(caps) = ASAN_ERROR.captures(line) {
                self.failure_reason = Some(caps[1].to_string());
                self.crash_address = caps.get(2).and_then(|m| parse_hex(m.as_str()));
                break;
            }
        }

        for line in lines {
            let Some(caps) = ASAN_FRAME.captures(line) else {
                continue;
            };
            // Only the first stack; allocation/free stacks follow it.
            if &caps[1] == "0" && !self.backtrace.is_empty() {
                break;
            }
            let function = caps
                .get(2)
                .map(|m| asan_function_name(m.as_str()))
                .unwrap_or_else(|| UNKNOWN_FRAME.to_string());
            self.backtrace.push(function);
        }
    }

    fn parse_gdb(&mut self, lines: &[String]) {
        let mut access_address = None;

        for line in lines {
            if self.failure_reason.is_none() {
                if let Some(caps) = GDB_SIGNAL.captures(line) {
                    self.failure_reason = Some(caps[1].to_string());
                }
            }
            if access_address.is_none() {
                if let Some(caps) = GDB_ACCESS.captures(line) {
                    access_address = parse_hex(&caps[1]);
                }
            }
            if let Some(caps) = GDB_INSTRUCTION.captures(line) {
                self.crash_instruction = Some(caps[1].to_string());
                continue;
            }
            if let Some(caps) = GDB_REGISTER.captures(line) {
                if REGISTER_NAME.is_match(&caps[1]) {
                    if let Some(value) = parse_hex(&caps[2]) {
                        self.registers.insert(caps[1].to_string(), value);
                    }
                }
            }
        }

        for line in lines {
            let Some(caps) = GDB_FRAME.captures(line) else {
                continue;
            };
            if &caps[1] == "0" && !self.backtrace.is_empty() {
                break;
            }
            self.backtrace.push(strip_gdb_arguments(&caps[2]));
        }

        self.crash_address = access_address.or_else(|| {
            self.crash_instruction
                .as_deref()
                .and_then(|insn| memory_operand_address(insn, &self.registers))
        });
    }

    fn parse_minidump(&mut self, lines: &[String]) {
        let mut crash_thread = 0u64;

        for line in lines {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.first() == Some(&"Crash") && fields.len() >= 4 {
                self.failure_reason = Some(fields[1].to_string()).filter(|r| !r.is_empty());
                self.crash_address = parse_hex(fields[2]);
                crash_thread = fields[3].parse().unwrap_or(0);
                break;
            }
        }

        for line in lines {
            let fields: Vec<&str> = line.split('|').collect();
            if fields.len() < 4 {
                continue;
            }
            let (Ok(thread), Ok(_frame)) = (fields[0].parse::<u64>(), fields[1].parse::<u64>()) else {
                continue;
            };
            if thread != crash_thread {
                continue;
            }
            let function = if fields[3].is_empty() {
                UNKNOWN_FRAME.to_string()
            } else {
                fields[3].to_string()
            };
            self.backtrace.push(function);
        }
    }
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(|l| l.to_string()).collect()
}

fn detect_kind(lines: &[String]) -> CrashKind {
    if lines.iter().any(|l| l.contains("AddressSanitizer")) {
        CrashKind::AddressSanitizer
    } else if lines.iter().any(|l| l.starts_with("OS|") || l.starts_with("Crash|")) {
        CrashKind::Minidump
    } else if lines
        .iter()
        .any(|l| GDB_FRAME.is_match(l) || GDB_SIGNAL.is_match(l))
    {
        CrashKind::Gdb
    } else {
        CrashKind::NoCrash
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let text = text.trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Turn `foo::bar(int) /src/file.cpp:12:3` into `foo::bar`.
fn asan_function_name(frame: &str) -> String {
    let mut name = frame.trim();
    if let Some(idx) = name.rfind(" /") {
        name = &name[..idx];
    } else if name.ends_with(')') {
        if let Some(idx) = name.rfind(" (") {
            name = &name[..idx];
        }
    }
    let name = name.trim();
    let name = strip_trailing_arguments(name.strip_suffix(" const").unwrap_or(name));
    if name.is_empty() {
        UNKNOWN_FRAME.to_string()
    } else {
        name.to_string()
    }
}

/// Drop one trailing balanced `(...)` group, if any.
fn strip_trailing_arguments(name: &str) -> &str {
    if !name.ends_with(')') {
        return name;
    }
    let mut depth = 0usize;
    for (idx, ch) in name.char_indices().rev() {
        match ch {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth == 0 {
                    return if idx == 0 { name } else { &name[..idx] };
                }
            }
            _ => {}
        }
    }
    name
}

fn strip_gdb_arguments(token: &str) -> String {
    if token.starts_with('(') {
        return token.to_string();
    }
    match token.find('(') {
        Some(idx) if idx > 0 => token[..idx].to_string(),
        _ => token.to_string(),
    }
}

/// Resolve an AT&T memory operand like `0x10(%rax,%rbx,8)` against registers.
fn memory_operand_address(instruction: &str, registers: &BTreeMap<String, u64>) -> Option<u64> {
    let caps = MEMORY_OPERAND.captures(instruction)?;
    let base = *registers.get(&caps[2])?;

    let offset: i128 = match caps.get(1) {
        Some(m) => {
            let text = m.as_str();
            let (negative, digits) = match text.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, text),
            };
            let value = i128::from(parse_hex(digits)?);
            if negative {
                -value
            } else {
                value
            }
        }
        None => 0,
    };

    let index: i128 = match caps.get(3) {
        Some(reg) => {
            let scale: i128 = caps.get(4).and_then(|s| s.as_str().parse().ok()).unwrap_or(1);
            i128::from(*registers.get(reg.as_str())?) * scale
        }
        None => 0,
    };

    let address = i128::from(base) + offset + index;
    Some(address.rem_euclid(1i128 << 64) as u64)
}
