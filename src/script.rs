//! # Script Model
//!
//! In-memory representation of the conditional redeem scripts used by HTLCs.
//! A script is a small tree of nodes; it compiles to bytecode through the
//! `bitcoin` script builder and can be parsed back from either bytecode or its
//! human-readable opcode form:
//!
//! ```text
//! OP_IF
//!     OP_HASH256 <hashlock> OP_EQUALVERIFY
//!     OP_DUP OP_HASH160 <recipient> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ELSE
//!     <sequence> OP_CHECKSEQUENCEVERIFY OP_DROP
//!     OP_DUP OP_HASH160 <sender> OP_EQUALVERIFY OP_CHECKSIG
//! OP_ENDIF
//! ```
//!
//! Bytecode and opcode text are both lowered to the same [`Token`] stream, so
//! the two parse paths cannot disagree.

use crate::error::{SwapError, SwapResult};
use bitcoin::{
    hashes::Hash,
    opcodes::{all::*, Opcode},
    script::{Builder, Instruction, Script},
    PubkeyHash, ScriptBuf,
};
use std::fmt;

/// Opcodes the script model emits, with the names used in opcode text
const NAMED_OPCODES: [(Opcode, &str); 10] = [
    (OP_IF, "OP_IF"),
    (OP_ELSE, "OP_ELSE"),
    (OP_ENDIF, "OP_ENDIF"),
    (OP_DROP, "OP_DROP"),
    (OP_DUP, "OP_DUP"),
    (OP_EQUALVERIFY, "OP_EQUALVERIFY"),
    (OP_HASH160, "OP_HASH160"),
    (OP_HASH256, "OP_HASH256"),
    (OP_CHECKSIG, "OP_CHECKSIG"),
    (OP_CSV, "OP_CHECKSEQUENCEVERIFY"),
];

/// First small-integer opcode (OP_1)
const PUSHNUM_BASE: u8 = 0x50;

/// A single bytecode element: an opcode or a data push
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Op(Opcode),
    Push(Vec<u8>),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Push(data) if data.is_empty() => write!(f, "OP_0"),
            Token::Push(data) => write!(f, "{}", hex::encode(data)),
            Token::Op(op) => match small_int(*op) {
                Some(n) => write!(f, "OP_{}", n),
                None => match NAMED_OPCODES.iter().find(|(named, _)| named == op) {
                    Some((_, name)) => write!(f, "{}", name),
                    None => write!(f, "{}", op),
                },
            },
        }
    }
}

/// Value of an OP_1..OP_16 opcode
fn small_int(op: Opcode) -> Option<u8> {
    match op.to_u8() {
        code @ 0x51..=0x60 => Some(code - PUSHNUM_BASE),
        _ => None,
    }
}

/// Lower raw bytecode into tokens, rejecting non-minimal pushes
pub fn tokenize_bytecode(bytecode: &[u8]) -> SwapResult<Vec<Token>> {
    Script::from_bytes(bytecode)
        .instructions_minimal()
        .map(|instruction| match instruction {
            Ok(Instruction::PushBytes(data)) => Ok(Token::Push(data.as_bytes().to_vec())),
            Ok(Instruction::Op(op)) => Ok(Token::Op(op)),
            Err(e) => Err(SwapError::parse(format!("invalid bytecode: {}", e))),
        })
        .collect()
}

/// Lower whitespace-separated opcode text into tokens
pub fn tokenize_opcode(text: &str) -> SwapResult<Vec<Token>> {
    text.split_whitespace().map(parse_word).collect()
}

fn parse_word(word: &str) -> SwapResult<Token> {
    match word {
        "OP_0" | "OP_FALSE" => return Ok(Token::Push(Vec::new())),
        "OP_TRUE" => return Ok(Token::Op(OP_PUSHNUM_1)),
        "OP_CSV" | "OP_NOP3" => return Ok(Token::Op(OP_CSV)),
        _ => {}
    }
    if let Some((op, _)) = NAMED_OPCODES.iter().find(|(_, name)| *name == word) {
        return Ok(Token::Op(*op));
    }
    if let Some(n) = word.strip_prefix("OP_").and_then(|n| n.parse::<u8>().ok()) {
        if (1..=16).contains(&n) {
            return Ok(Token::Op(Opcode::from(PUSHNUM_BASE + n)));
        }
    }
    match hex::decode(word) {
        Ok(data) if !data.is_empty() => Ok(Token::Push(data)),
        _ => Err(SwapError::parse(format!("unknown opcode or data push '{}'", word))),
    }
}

/// Decode a minimally-encoded script number
fn read_scriptnum(data: &[u8]) -> SwapResult<i64> {
    if data.len() > 5 {
        return Err(SwapError::parse("script number longer than 5 bytes"));
    }
    let Some(&last) = data.last() else {
        return Ok(0);
    };
    if last & 0x7f == 0 && (data.len() == 1 || data[data.len() - 2] & 0x80 == 0) {
        return Err(SwapError::parse("non-minimal script number"));
    }

    let mut value: i64 = 0;
    for (i, byte) in data.iter().enumerate() {
        value |= (*byte as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        value &= !(0x80i64 << (8 * (data.len() - 1)));
        value = -value;
    }
    Ok(value)
}

/// A node of a redeem script tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptNode {
    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    PayToPubkeyHash(PubkeyHash),
    /// `OP_HASH256 <hash> OP_EQUALVERIFY <inner>`
    Hashlock { hash: [u8; 32], inner: Box<ScriptNode> },
    /// `<sequence> OP_CHECKSEQUENCEVERIFY OP_DROP <inner>`
    RelativeTimelock { sequence: u32, inner: Box<ScriptNode> },
    /// `OP_IF <if_branch> OP_ELSE <else_branch> OP_ENDIF`
    IfElse {
        if_branch: Box<ScriptNode>,
        else_branch: Box<ScriptNode>,
    },
}

impl ScriptNode {
    pub fn pay_to(hash: PubkeyHash) -> Self {
        ScriptNode::PayToPubkeyHash(hash)
    }

    pub fn hashlock(hash: [u8; 32], inner: ScriptNode) -> Self {
        ScriptNode::Hashlock {
            hash,
            inner: Box::new(inner),
        }
    }

    pub fn relative_timelock(sequence: u32, inner: ScriptNode) -> Self {
        ScriptNode::RelativeTimelock {
            sequence,
            inner: Box::new(inner),
        }
    }

    pub fn if_else(if_branch: ScriptNode, else_branch: ScriptNode) -> Self {
        ScriptNode::IfElse {
            if_branch: Box::new(if_branch),
            else_branch: Box::new(else_branch),
        }
    }

    /// Compile the tree to bytecode
    pub fn compile(&self) -> ScriptBuf {
        self.append(Builder::new()).into_script()
    }

    fn append(&self, builder: Builder) -> Builder {
        match self {
            ScriptNode::PayToPubkeyHash(hash) => builder
                .push_opcode(OP_DUP)
                .push_opcode(OP_HASH160)
                .push_slice(hash.to_byte_array())
                .push_opcode(OP_EQUALVERIFY)
                .push_opcode(OP_CHECKSIG),
            ScriptNode::Hashlock { hash, inner } => inner.append(
                builder
                    .push_opcode(OP_HASH256)
                    .push_slice(*hash)
                    .push_opcode(OP_EQUALVERIFY),
            ),
            ScriptNode::RelativeTimelock { sequence, inner } => inner.append(
                builder
                    .push_int(*sequence as i64)
                    .push_opcode(OP_CSV)
                    .push_opcode(OP_DROP),
            ),
            ScriptNode::IfElse {
                if_branch,
                else_branch,
            } => {
                let builder = if_branch.append(builder.push_opcode(OP_IF));
                else_branch
                    .append(builder.push_opcode(OP_ELSE))
                    .push_opcode(OP_ENDIF)
            }
        }
    }

    /// Human-readable opcode form of the compiled script
    pub fn opcode(&self) -> String {
        let script = self.compile();
        let mut words = Vec::new();
        for instruction in script.instructions() {
            let token = match instruction {
                Ok(Instruction::PushBytes(data)) => Token::Push(data.as_bytes().to_vec()),
                Ok(Instruction::Op(op)) => Token::Op(op),
                Err(e) => {
                    log::warn!(
                        "Stopped rendering script {} at a bad instruction: {}",
                        hex::encode(script.as_bytes()),
                        e
                    );
                    break;
                }
            };
            words.push(token.to_string());
        }
        words.join(" ")
    }

    /// Parse bytecode into a script tree
    pub fn from_bytecode(bytecode: &[u8]) -> SwapResult<Self> {
        Self::from_tokens(&tokenize_bytecode(bytecode)?)
    }

    /// Parse opcode text into a script tree
    pub fn from_opcode(text: &str) -> SwapResult<Self> {
        Self::from_tokens(&tokenize_opcode(text)?)
    }

    /// Parse a token stream into a script tree; the whole stream must be consumed
    pub fn from_tokens(tokens: &[Token]) -> SwapResult<Self> {
        let mut parser = Parser { tokens, pos: 0 };
        let node = parser.node()?;
        if parser.pos != tokens.len() {
            return Err(SwapError::parse(format!(
                "unexpected trailing tokens after position {}",
                parser.pos
            )));
        }
        Ok(node)
    }
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> SwapResult<&'a Token> {
        let tokens = self.tokens;
        let token = tokens
            .get(self.pos)
            .ok_or_else(|| SwapError::parse("unexpected end of script"))?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, expected: Opcode) -> SwapResult<()> {
        match self.next()? {
            Token::Op(op) if *op == expected => Ok(()),
            other => Err(SwapError::parse(format!(
                "expected {} at position {}, found {}",
                Token::Op(expected),
                self.pos - 1,
                other
            ))),
        }
    }

    fn push<const N: usize>(&mut self) -> SwapResult<[u8; N]> {
        match self.next()? {
            Token::Push(data) => data.as_slice().try_into().map_err(|_| {
                SwapError::parse(format!("expected {}-byte push, found {} bytes", N, data.len()))
            }),
            other => Err(SwapError::parse(format!("expected data push, found {}", other))),
        }
    }

    fn sequence(&mut self) -> SwapResult<u32> {
        let value = match self.next()? {
            Token::Push(data) => read_scriptnum(data)?,
            Token::Op(op) => match small_int(*op) {
                Some(n) => n as i64,
                None => return Err(SwapError::parse(format!("unexpected {}", op))),
            },
        };
        u32::try_from(value).map_err(|_| SwapError::parse(format!("sequence {} out of range", value)))
    }

    fn node(&mut self) -> SwapResult<ScriptNode> {
        let tokens = self.tokens;
        let head = tokens
            .get(self.pos)
            .ok_or_else(|| SwapError::parse("unexpected end of script"))?;

        match head {
            Token::Op(op) if *op == OP_IF => {
                self.pos += 1;
                let if_branch = self.node()?;
                self.expect(OP_ELSE)?;
                let else_branch = self.node()?;
                self.expect(OP_ENDIF)?;
                Ok(ScriptNode::if_else(if_branch, else_branch))
            }
            Token::Op(op) if *op == OP_HASH256 => {
                self.pos += 1;
                let hash = self.push::<32>()?;
                self.expect(OP_EQUALVERIFY)?;
                Ok(ScriptNode::hashlock(hash, self.node()?))
            }
            Token::Op(op) if *op == OP_DUP => {
                self.pos += 1;
                self.expect(OP_HASH160)?;
                let hash = self.push::<20>()?;
                self.expect(OP_EQUALVERIFY)?;
                self.expect(OP_CHECKSIG)?;
                Ok(ScriptNode::pay_to(PubkeyHash::from_byte_array(hash)))
            }
            Token::Push(_) => self.timelock(),
            Token::Op(op) if small_int(*op).is_some() => self.timelock(),
            other => Err(SwapError::parse(format!(
                "unexpected {} at position {}",
                other, self.pos
            ))),
        }
    }

    fn timelock(&mut self) -> SwapResult<ScriptNode> {
        let sequence = self.sequence()?;
        self.expect(OP_CSV)?;
        self.expect(OP_DROP)?;
        Ok(ScriptNode::relative_timelock(sequence, self.node()?))
    }
}
