//! The instruction stream run by the card's sequencer.
//!
//! A [`Script`] only ever contains two instructions: `generate <waveform>`
//! plays a waveform, `wait <cycles>` holds the last sample for a number of
//! sample clock cycles. The text form is bracketed by `script main` and
//! `end script`.

use regex::Regex;
use std::fmt;

use crate::error::ParseError;

pub const SCRIPT_NAME: &str = "main";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptInstruction {
    Generate(String),
    Wait(u64),
}

impl fmt::Display for ScriptInstruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptInstruction::Generate(name) => write!(f, "generate {name}"),
            ScriptInstruction::Wait(cycles) => write!(f, "wait {cycles}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    pub instructions: Vec<ScriptInstruction>,
}

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, instruction: ScriptInstruction) {
        self.instructions.push(instruction);
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Reads the text form back.
    ///
    /// Blank lines are ignored and surrounding whitespace is trimmed.
    ///
    /// ```
    /// use pulsecompiler_backend::script::*;
    ///
    /// let script = Script::parse("script main\n  generate w0\n  wait 5\nend script\n").unwrap();
    /// assert_eq!(script.instructions, vec![
    ///     ScriptInstruction::Generate("w0".to_string()),
    ///     ScriptInstruction::Wait(5),
    /// ]);
    /// assert_eq!(script.to_string(), "script main\n  generate w0\n  wait 5\nend script\n");
    /// ```
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        let start_re = Regex::new(r"^script\s+\w+$").expect("valid regex");
        let instr_re = Regex::new(r"^(generate|wait)\s+(\S+)$").expect("valid regex");

        let mut lines = text
            .lines()
            .enumerate()
            .map(|(i, line)| (i + 1, line.trim()))
            .filter(|(_, line)| !line.is_empty());

        match lines.next() {
            Some((_, line)) if start_re.is_match(line) => {}
            _ => return Err(ParseError::MissingStart),
        }

        let mut script = Script::new();
        for (line_no, line) in lines {
            if line == "end script" {
                return Ok(script);
            }
            let unknown = || ParseError::UnknownInstruction {
                line: line_no,
                text: line.to_string(),
            };
            let caps = instr_re.captures(line).ok_or_else(unknown)?;
            let instruction = match &caps[1] {
                "generate" => ScriptInstruction::Generate(caps[2].to_string()),
                _ => ScriptInstruction::Wait(caps[2].parse().map_err(|_| unknown())?),
            };
            script.push(instruction);
        }
        Err(ParseError::MissingEnd)
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "script {SCRIPT_NAME}")?;
        for instruction in &self.instructions {
            writeln!(f, "  {instruction}")?;
        }
        writeln!(f, "end script")
    }
}
