//! Assembler for 4004 programs.
//!
//! [`assemble`] translates one instruction. Syntax:
//! ```text
//! MNEMONIC [operand[,operand]]
//!     FIM P1,0x2A      ; pair, 8-bit literal
//!     JCN NZ,0x40      ; condition, 8-bit page offset
//!     JCN 0x40         ; empty condition: always jump
//!     JMS 0x1F0        ; 12-bit address
//!     ADD R3           ; register (P<n> names R<2n>)
//!     LDM 9            ; 4-bit literal
//! ```
//! Operands are separated by commas or whitespace. Literals are decimal,
//! `0x` hex, `0o` octal or `0b` binary.
//!
//! [`assemble_program`] handles whole sources:
//! ```text
//! ; Comment
//!         ORG 0x020       ; set origin (nibble address, even)
//! LOOP:   ISZ R0,LOOP     ; labels may stand for any address operand
//!         JUN START
//! TABLE:  DB 0x12,0x34    ; raw bytes
//! ```

use crate::cpu::decode::{encode, length_of, to_nibbles, Condition, Instruction};
use std::collections::HashMap;
use std::sync::OnceLock;
use thiserror::Error;

/// Builds an instruction from its operand tokens, or explains why not.
type Encoder = fn(&[&str]) -> Result<Instruction, String>;

/// Assemble one instruction to the nibbles it occupies in memory,
/// in ascending address order.
pub fn assemble(text: &str) -> Result<Vec<u8>, AsmError> {
    let instr = assemble_instruction(text)?;
    Ok(to_nibbles(&encode(&instr)))
}

/// Parse one line of assembler text into an [`Instruction`].
pub fn assemble_instruction(text: &str) -> Result<Instruction, AsmError> {
    let text = text.trim();
    let (mnemonic, operands) = match text.split_once(char::is_whitespace) {
        Some((m, rest)) => (m, rest),
        None => (text, ""),
    };

    let syntax = |reason: String| AsmError::Syntax {
        mnemonic: mnemonic.to_string(),
        reason,
    };

    if mnemonic.is_empty() {
        return Err(syntax("empty instruction".into()));
    }

    let encoder = table()
        .get(mnemonic.to_ascii_uppercase().as_str())
        .ok_or_else(|| syntax("unknown mnemonic".into()))?;

    encoder(&split_operands(operands)).map_err(syntax)
}

/// Assemble a complete source into a byte image starting at address 0.
pub fn assemble_program(source: &str) -> Result<Vec<u8>, AsmError> {
    let mut asm = Assembler::new();
    asm.assemble(source)
}

/// The mnemonic table, built on first use.
fn table() -> &'static HashMap<&'static str, Encoder> {
    static TABLE: OnceLock<HashMap<&'static str, Encoder>> = OnceLock::new();

    TABLE.get_or_init(|| {
        let entries: [(&'static str, Encoder); 46] = [
            // Control
            ("NOP", |ops: &[&str]| bare(ops, Instruction::Nop)),
            ("JCN", jcn),
            ("JUN", |ops: &[&str]| {
                let [addr] = exact(ops)?;
                Ok(Instruction::Jun { addr: number(addr, 0xFFF)? as u16 })
            }),
            ("JMS", |ops: &[&str]| {
                let [addr] = exact(ops)?;
                Ok(Instruction::Jms { addr: number(addr, 0xFFF)? as u16 })
            }),
            ("JIN", |ops: &[&str]| single_pair(ops).map(|pair| Instruction::Jin { pair })),
            ("ISZ", |ops: &[&str]| {
                let [reg, addr] = exact(ops)?;
                Ok(Instruction::Isz { reg: register(reg)?, addr: number(addr, 0xFF)? as u8 })
            }),
            ("BBL", |ops: &[&str]| single_literal(ops).map(|data| Instruction::Bbl { data })),
            // Register
            ("FIM", |ops: &[&str]| {
                let [p, data] = exact(ops)?;
                Ok(Instruction::Fim { pair: pair(p)?, data: number(data, 0xFF)? as u8 })
            }),
            ("SRC", |ops: &[&str]| single_pair(ops).map(|pair| Instruction::Src { pair })),
            ("FIN", |ops: &[&str]| single_pair(ops).map(|pair| Instruction::Fin { pair })),
            ("INC", |ops: &[&str]| single_register(ops).map(|reg| Instruction::Inc { reg })),
            ("ADD", |ops: &[&str]| single_register(ops).map(|reg| Instruction::Add { reg })),
            ("SUB", |ops: &[&str]| single_register(ops).map(|reg| Instruction::Sub { reg })),
            ("LD", |ops: &[&str]| single_register(ops).map(|reg| Instruction::Ld { reg })),
            ("XCH", |ops: &[&str]| single_register(ops).map(|reg| Instruction::Xch { reg })),
            ("LDM", |ops: &[&str]| single_literal(ops).map(|data| Instruction::Ldm { data })),
            // RAM / IO
            ("WRM", |ops: &[&str]| bare(ops, Instruction::Wrm)),
            ("WMP", |ops: &[&str]| bare(ops, Instruction::Wmp)),
            ("WRR", |ops: &[&str]| bare(ops, Instruction::Wrr)),
            ("WPM", |ops: &[&str]| bare(ops, Instruction::Wpm)),
            ("WR0", |ops: &[&str]| bare(ops, Instruction::Wr { status: 0 })),
            ("WR1", |ops: &[&str]| bare(ops, Instruction::Wr { status: 1 })),
            ("WR2", |ops: &[&str]| bare(ops, Instruction::Wr { status: 2 })),
            ("WR3", |ops: &[&str]| bare(ops, Instruction::Wr { status: 3 })),
            ("SBM", |ops: &[&str]| bare(ops, Instruction::Sbm)),
            ("RDM", |ops: &[&str]| bare(ops, Instruction::Rdm)),
            ("RDR", |ops: &[&str]| bare(ops, Instruction::Rdr)),
            ("ADM", |ops: &[&str]| bare(ops, Instruction::Adm)),
            ("RD0", |ops: &[&str]| bare(ops, Instruction::Rd { status: 0 })),
            ("RD1", |ops: &[&str]| bare(ops, Instruction::Rd { status: 1 })),
            ("RD2", |ops: &[&str]| bare(ops, Instruction::Rd { status: 2 })),
            ("RD3", |ops: &[&str]| bare(ops, Instruction::Rd { status: 3 })),
            // Accumulator
            ("CLB", |ops: &[&str]| bare(ops, Instruction::Clb)),
            ("CLC", |ops: &[&str]| bare(ops, Instruction::Clc)),
            ("IAC", |ops: &[&str]| bare(ops, Instruction::Iac)),
            ("CMC", |ops: &[&str]| bare(ops, Instruction::Cmc)),
            ("CMA", |ops: &[&str]| bare(ops, Instruction::Cma)),
            ("RAL", |ops: &[&str]| bare(ops, Instruction::Ral)),
            ("RAR", |ops: &[&str]| bare(ops, Instruction::Rar)),
            ("TCC", |ops: &[&str]| bare(ops, Instruction::Tcc)),
            ("DAC", |ops: &[&str]| bare(ops, Instruction::Dac)),
            ("TCS", |ops: &[&str]| bare(ops, Instruction::Tcs)),
            ("STC", |ops: &[&str]| bare(ops, Instruction::Stc)),
            ("DAA", |ops: &[&str]| bare(ops, Instruction::Daa)),
            ("KBP", |ops: &[&str]| bare(ops, Instruction::Kbp)),
            ("DCL", |ops: &[&str]| bare(ops, Instruction::Dcl)),
        ];

        entries.into_iter().collect()
    })
}

/// JCN takes an optional condition: `JCN NZ,0x10` or `JCN 0x10`.
fn jcn(ops: &[&str]) -> Result<Instruction, String> {
    let (name, addr) = match ops {
        [addr] => ("", *addr),
        [name, addr] => (*name, *addr),
        [] => return Err("missing operand".into()),
        _ => return Err(format!("expected at most 2 operands, found {}", ops.len())),
    };

    let cond = Condition::from_name(name)
        .ok_or_else(|| format!("unknown condition '{name}'"))?;
    Ok(Instruction::Jcn { cond, addr: number(addr, 0xFF)? as u8 })
}

fn split_operands(operands: &str) -> Vec<&str> {
    operands
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Exactly `N` operands.
fn exact<'a, const N: usize>(ops: &[&'a str]) -> Result<[&'a str; N], String> {
    <[&'a str; N]>::try_from(ops).map_err(|_| {
        if ops.len() < N {
            "missing operand".to_string()
        } else {
            format!("expected {} operand(s), found {}", N, ops.len())
        }
    })
}

fn bare(ops: &[&str], instr: Instruction) -> Result<Instruction, String> {
    let [] = exact(ops)?;
    Ok(instr)
}

fn single_register(ops: &[&str]) -> Result<u8, String> {
    let [reg] = exact(ops)?;
    register(reg)
}

fn single_pair(ops: &[&str]) -> Result<u8, String> {
    let [p] = exact(ops)?;
    pair(p)
}

fn single_literal(ops: &[&str]) -> Result<u8, String> {
    let [data] = exact(ops)?;
    Ok(number(data, 0xF)? as u8)
}

/// Parse a numeric literal and check it against `max`.
fn number(token: &str, max: u32) -> Result<u32, String> {
    let lower = token.to_ascii_lowercase();
    let (digits, radix) = if let Some(hex) = lower.strip_prefix("0x") {
        (hex, 16)
    } else if let Some(oct) = lower.strip_prefix("0o") {
        (oct, 8)
    } else if let Some(bin) = lower.strip_prefix("0b") {
        (bin, 2)
    } else {
        (lower.as_str(), 10)
    };

    // from_str_radix tolerates a leading '+', the grammar does not.
    if digits.is_empty() || digits.starts_with('+') {
        return Err(format!("invalid numeric literal '{token}'"));
    }

    let value = u32::from_str_radix(digits, radix)
        .map_err(|_| format!("invalid numeric literal '{token}'"))?;
    if value > max {
        return Err(format!("value {token} out of range (max {max})"));
    }
    Ok(value)
}

/// `R<n>` (0..15) or `P<n>` (0..7, meaning R<2n>).
fn register(token: &str) -> Result<u8, String> {
    let index = |digits: &str, count: u8| -> Option<u8> {
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse::<u8>().ok().filter(|n| *n < count)
    };

    let (kind, digits) = token.split_at(token.chars().next().map_or(0, char::len_utf8));
    match kind {
        "R" | "r" => index(digits, 16),
        "P" | "p" => index(digits, 8).map(|p| p * 2),
        _ => None,
    }
    .ok_or_else(|| format!("invalid register '{token}'"))
}

/// A register pair: `P<n>` or an even `R<n>`.
fn pair(token: &str) -> Result<u8, String> {
    let reg = register(token)?;
    if reg % 2 != 0 {
        return Err(format!("odd register '{token}' cannot name a pair"));
    }
    Ok(reg / 2)
}

/// Two-pass program assembler state.
struct Assembler {
    /// Current address (nibbles).
    current_addr: u16,
    /// Symbol table (label -> address).
    symbols: HashMap<String, u16>,
    /// Statements collected in pass 1.
    statements: Vec<Statement>,
}

/// One directive or instruction with the address it assembles at.
struct Statement {
    line: usize,
    addr: u16,
    mnemonic: String,
    operands: Vec<String>,
}

impl Assembler {
    fn new() -> Self {
        Self {
            current_addr: 0,
            symbols: HashMap::new(),
            statements: Vec::new(),
        }
    }

    fn assemble(&mut self, source: &str) -> Result<Vec<u8>, AsmError> {
        // Pass 1: collect labels and lay out addresses
        for (line_num, line) in source.lines().enumerate() {
            self.process_line(line, line_num + 1)?;
        }

        // Pass 2: resolve labels and encode
        let mut image = Vec::new();
        for stmt in &self.statements {
            let bytes = self.encode_statement(stmt)?;
            let start = usize::from(stmt.addr / 2);
            if image.len() < start + bytes.len() {
                image.resize(start + bytes.len(), 0);
            }
            image[start..start + bytes.len()].copy_from_slice(&bytes);
        }

        Ok(image)
    }

    fn process_line(&mut self, line: &str, line_num: usize) -> Result<(), AsmError> {
        // Remove comments
        let line = line.split(';').next().unwrap_or_default().trim();
        if line.is_empty() {
            return Ok(());
        }

        // Check for label definition
        let line = if let Some((label, rest)) = line.split_once(':') {
            self.define_label(label.trim(), line_num)?;
            rest.trim()
        } else {
            line
        };

        if line.is_empty() {
            return Ok(());
        }

        let (mnemonic, operands) = match line.split_once(char::is_whitespace) {
            Some((m, rest)) => (m.to_ascii_uppercase(), split_operands(rest)),
            None => (line.to_ascii_uppercase(), Vec::new()),
        };

        let at_line = |e: AsmError| AsmError::Line { line: line_num, source: Box::new(e) };
        let directive = |reason: &str| AsmError::Syntax {
            mnemonic: mnemonic.clone(),
            reason: reason.to_string(),
        };

        let size = match mnemonic.as_str() {
            // Directives
            "ORG" => {
                let [addr] = exact(&operands).map_err(|r| at_line(directive(&r)))?;
                let addr = number(addr, 0xFFF).map_err(|r| at_line(directive(&r)))? as u16;
                if addr % 2 != 0 {
                    return Err(at_line(directive("origin must be an even nibble address")));
                }
                if addr < self.current_addr {
                    return Err(at_line(directive("origin moves backwards")));
                }
                self.current_addr = addr;
                return Ok(());
            }

            "DB" => {
                if operands.is_empty() {
                    return Err(at_line(directive("missing operand")));
                }
                operands.len() * 2
            }

            // Instructions
            _ => {
                if !table().contains_key(mnemonic.as_str()) {
                    return Err(at_line(directive("unknown mnemonic")));
                }
                mnemonic_length(&mnemonic)
            }
        };

        self.statements.push(Statement {
            line: line_num,
            addr: self.current_addr,
            mnemonic,
            operands: operands.iter().map(|s| s.to_string()).collect(),
        });
        let next = usize::from(self.current_addr).saturating_add(size);
        if next > 0x1000 {
            return Err(at_line(AsmError::Overflow));
        }
        // Bounded by the check above.
        self.current_addr = next as u16;
        Ok(())
    }

    fn define_label(&mut self, label: &str, line_num: usize) -> Result<(), AsmError> {
        if !is_identifier(label) || is_reserved(label) {
            return Err(AsmError::Line {
                line: line_num,
                source: Box::new(AsmError::Syntax {
                    mnemonic: label.to_string(),
                    reason: "invalid label name".into(),
                }),
            });
        }

        let key = label.to_ascii_uppercase();
        if self.symbols.insert(key.clone(), self.current_addr).is_some() {
            return Err(AsmError::DuplicateLabel { line: line_num, label: key });
        }
        Ok(())
    }

    fn encode_statement(&self, stmt: &Statement) -> Result<Vec<u8>, AsmError> {
        let at_line = |e: AsmError| AsmError::Line { line: stmt.line, source: Box::new(e) };

        let mut operands = Vec::with_capacity(stmt.operands.len());
        for token in &stmt.operands {
            operands.push(self.resolve(stmt, token)?);
        }

        if stmt.mnemonic == "DB" {
            return operands
                .iter()
                .map(|t| number(t, 0xFF).map(|b| b as u8))
                .collect::<Result<Vec<u8>, String>>()
                .map_err(|reason| at_line(AsmError::Syntax { mnemonic: "DB".into(), reason }));
        }

        let text = format!("{} {}", stmt.mnemonic, operands.join(","));
        let instr = assemble_instruction(&text).map_err(at_line)?;
        Ok(encode(&instr))
    }

    /// Replace a label operand with its address. Short-address fields
    /// (JCN, ISZ targets and FIM/DB data) take the low byte; JCN and ISZ
    /// labels must lie in the page the jump can reach.
    fn resolve(&self, stmt: &Statement, token: &str) -> Result<String, AsmError> {
        if !is_identifier(token) || is_reserved(token) {
            return Ok(token.to_string());
        }

        let key = token.to_ascii_uppercase();
        let addr = *self.symbols.get(&key).ok_or_else(|| AsmError::UndefinedLabel {
            line: stmt.line,
            label: key.clone(),
        })?;

        let reachable_page = match stmt.mnemonic.as_str() {
            "JCN" if stmt.addr & 0xFF >= 0xFE => Some((stmt.addr + 0x100) & 0xF00),
            "JCN" | "ISZ" => Some(stmt.addr & 0xF00),
            _ => None,
        };

        match stmt.mnemonic.as_str() {
            "JCN" | "ISZ" | "FIM" | "DB" => {
                if let Some(page) = reachable_page {
                    if addr & 0xF00 != page {
                        return Err(AsmError::OutOfPage { line: stmt.line, label: key });
                    }
                }
                Ok(format!("0x{:02X}", addr & 0xFF))
            }
            _ => Ok(format!("0x{addr:03X}")),
        }
    }
}

/// Nibble length an instruction mnemonic will occupy.
fn mnemonic_length(mnemonic: &str) -> usize {
    // Every encoder accepts literal zeros wherever an operand is numeric,
    // so probing with placeholder operands yields the real opcode byte.
    const PROBES: [&str; 4] = ["", "0", "R0", "R0,0"];
    PROBES
        .iter()
        .find_map(|ops| assemble_instruction(&format!("{mnemonic} {ops}")).ok())
        .map_or(2, |instr| length_of(encode(&instr)[0]))
}

fn is_identifier(token: &str) -> bool {
    let mut chars = token.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Names that already mean something as an operand.
fn is_reserved(token: &str) -> bool {
    register(token).is_ok() || Condition::from_name(token).is_some()
}

/// Errors that can occur during assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("syntax error in '{mnemonic}': {reason}")]
    Syntax { mnemonic: String, reason: String },

    #[error("line {line}: {source}")]
    Line { line: usize, source: Box<AsmError> },

    #[error("undefined label on line {line}: {label}")]
    UndefinedLabel { line: usize, label: String },

    #[error("duplicate label on line {line}: {label}")]
    DuplicateLabel { line: usize, label: String },

    #[error("label on line {line} is outside the reachable page: {label}")]
    OutOfPage { line: usize, label: String },

    #[error("program exceeds the 4096-nibble address space")]
    Overflow,
}
