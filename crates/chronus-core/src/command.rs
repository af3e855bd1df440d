//! Fixed-size control records.
//!
//! Every control message that reaches a worker travels as a 64-byte
//! [`CommandRecord`]: a fixed layout that fits an SPSC ring slot, packs
//! without allocation, and unpacks without allocation. The rings never cross
//! hosts, so the value field uses native endianness.
//!
//! Wire layout:
//!
//! | bytes  | field                                   |
//! |--------|-----------------------------------------|
//! | 0      | opcode (`Set`/`Gate`/`PatchSignal`)     |
//! | 1      | value type (`F64`/`I64`/`Bool`)         |
//! | 2–15   | reserved, zero                          |
//! | 16–31  | module id, NUL-padded `[a-z0-9_]{1,16}` |
//! | 32–47  | parameter name, same constraints        |
//! | 48–55  | value bits, native endian               |
//! | 56–63  | reserved, zero                          |

use core::fmt;

use crate::ident::{Ident, IdentError};

/// Size of a packed command record in bytes.
pub const COMMAND_RECORD_LEN: usize = 64;

/// What a command asks the receiving host to do.
///
/// The type field is informational; semantic routing is by opcode plus
/// module lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Write a target for a named parameter.
    Set = 1,
    /// Set a boolean gate; the parameter name is carried but ignored.
    Gate = 2,
    /// Reserved for patch-plane signalling; hosts count and drop it.
    PatchSignal = 3,
}

impl Opcode {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Set),
            2 => Some(Self::Gate),
            3 => Some(Self::PatchSignal),
            _ => None,
        }
    }
}

/// Typed payload of a command record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CommandValue {
    /// 64-bit float payload.
    Float(f64),
    /// 64-bit signed integer payload.
    Int(i64),
    /// Boolean payload, carried as u64 0/1 on the wire.
    Bool(bool),
}

impl CommandValue {
    const TYPE_F64: u8 = 1;
    const TYPE_I64: u8 = 2;
    const TYPE_BOOL: u8 = 3;

    fn type_byte(self) -> u8 {
        match self {
            Self::Float(_) => Self::TYPE_F64,
            Self::Int(_) => Self::TYPE_I64,
            Self::Bool(_) => Self::TYPE_BOOL,
        }
    }

    fn to_bits(self) -> u64 {
        match self {
            Self::Float(v) => v.to_bits(),
            Self::Int(v) => v as u64,
            Self::Bool(v) => u64::from(v),
        }
    }

    fn from_bits(type_byte: u8, bits: u64) -> Result<Self, RecordError> {
        match type_byte {
            Self::TYPE_F64 => Ok(Self::Float(f64::from_bits(bits))),
            Self::TYPE_I64 => Ok(Self::Int(bits as i64)),
            Self::TYPE_BOOL => match bits {
                0 => Ok(Self::Bool(false)),
                1 => Ok(Self::Bool(true)),
                _ => Err(RecordError::BadBoolBits(bits)),
            },
            other => Err(RecordError::BadValueType(other)),
        }
    }

    /// The payload as an `f32` for parameter application.
    ///
    /// Gates and integer payloads coerce the obvious way.
    #[inline]
    pub fn as_f32(self) -> f32 {
        match self {
            Self::Float(v) => v as f32,
            Self::Int(v) => v as f32,
            Self::Bool(v) => {
                if v {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    /// The payload interpreted as a gate state (non-zero = on).
    #[inline]
    pub fn as_gate(self) -> bool {
        match self {
            Self::Float(v) => v != 0.0,
            Self::Int(v) => v != 0,
            Self::Bool(v) => v,
        }
    }
}

/// Why a packed record was rejected at ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordError {
    /// Unknown opcode byte.
    BadOpcode(u8),
    /// Unknown value-type byte.
    BadValueType(u8),
    /// Bool payload with bits other than 0/1.
    BadBoolBits(u64),
    /// Module-id field failed identifier validation.
    BadModule(IdentError),
    /// Parameter-name field failed identifier validation.
    BadParam(IdentError),
    /// Reserved bytes were not zero.
    BadReserved,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadOpcode(b) => write!(f, "unknown opcode 0x{b:02x}"),
            Self::BadValueType(b) => write!(f, "unknown value type 0x{b:02x}"),
            Self::BadBoolBits(v) => write!(f, "bool payload with bits {v}"),
            Self::BadModule(e) => write!(f, "bad module id: {e}"),
            Self::BadParam(e) => write!(f, "bad parameter name: {e}"),
            Self::BadReserved => write!(f, "reserved bytes are not zero"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for RecordError {}

/// A validated 64-byte control message.
///
/// Construction goes through [`CommandRecord::set`]/[`CommandRecord::gate`]
/// (which take already-validated [`Ident`]s) or [`CommandRecord::unpack`]
/// (which validates the wire form). Either way, a record in hand is
/// known-good and `Copy` — it is the SPSC command ring's element type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CommandRecord {
    /// What to do.
    pub op: Opcode,
    /// Target module.
    pub module: Ident,
    /// Target parameter (ignored for `Gate`).
    pub param: Ident,
    /// Payload.
    pub value: CommandValue,
}

impl CommandRecord {
    /// Builds a `Set` record: write `value` as the target of `module.param`.
    pub fn set(module: Ident, param: Ident, value: CommandValue) -> Self {
        Self {
            op: Opcode::Set,
            module,
            param,
            value,
        }
    }

    /// Builds a `Gate` record for `module`.
    ///
    /// The parameter field is filled with the literal `gate` so the packed
    /// form stays well-formed; receivers ignore it.
    pub fn gate(module: Ident, on: bool) -> Self {
        // "gate" is in-charset and short; this cannot fail.
        let param = Ident::new("gate").unwrap_or(module);
        Self {
            op: Opcode::Gate,
            module,
            param,
            value: CommandValue::Bool(on),
        }
    }

    /// The coalescing key for producer-side latest-wins: `(module, param)`.
    #[inline]
    pub fn key(&self) -> (Ident, Ident) {
        (self.module, self.param)
    }

    /// Serializes into the 64-byte wire form. Does not allocate.
    pub fn pack(&self) -> [u8; COMMAND_RECORD_LEN] {
        let mut out = [0u8; COMMAND_RECORD_LEN];
        out[0] = self.op as u8;
        out[1] = self.value.type_byte();
        out[16..32].copy_from_slice(&self.module.as_padded());
        out[32..48].copy_from_slice(&self.param.as_padded());
        out[48..56].copy_from_slice(&self.value.to_bits().to_ne_bytes());
        out
    }

    /// Parses and validates the 64-byte wire form. Does not allocate.
    ///
    /// Rejects unknown opcode/type bytes, out-of-charset or badly padded
    /// identifier fields, non-zero reserved bytes, and bool payloads other
    /// than 0/1. Every successful unpack re-packs to the identical bytes.
    pub fn unpack(bytes: &[u8; COMMAND_RECORD_LEN]) -> Result<Self, RecordError> {
        let op = Opcode::from_byte(bytes[0]).ok_or(RecordError::BadOpcode(bytes[0]))?;
        if bytes[2..16].iter().any(|&b| b != 0) || bytes[56..64].iter().any(|&b| b != 0) {
            return Err(RecordError::BadReserved);
        }

        let mut field = [0u8; 16];
        field.copy_from_slice(&bytes[16..32]);
        let module = Ident::from_padded(&field).map_err(RecordError::BadModule)?;
        field.copy_from_slice(&bytes[32..48]);
        let param = Ident::from_padded(&field).map_err(RecordError::BadParam)?;

        let mut value_bytes = [0u8; 8];
        value_bytes.copy_from_slice(&bytes[48..56]);
        let value = CommandValue::from_bits(bytes[1], u64::from_ne_bytes(value_bytes))?;

        Ok(Self {
            op,
            module,
            param,
            value,
        })
    }
}
