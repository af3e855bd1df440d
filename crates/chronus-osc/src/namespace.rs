//! Canonical control namespace: address parsing and validation.
//!
//! Everything here is pure — a decoded OSC message goes in, a typed request
//! (or a precise parse error) comes out. The server layer does the I/O and
//! the counting.

use chronus_core::{CommandRecord, CommandValue, Ident};
use chronus_transport::PatchOp;
use rosc::{OscMessage, OscType};
use std::fmt;

/// A validated controller request for the control loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Parameter or gate command, broadcast to both slots.
    Broadcast(CommandRecord),
    /// Structural patch edit for the standby slot.
    Patch(PatchOp),
    /// Prime the standby and stage the switch.
    Commit,
    /// Discard the standby's patch under construction.
    Abort,
}

/// Queries answered by the transport itself, without the control loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Query {
    /// Registry schema snapshot.
    Schema,
    /// Counter snapshot.
    Status,
}

/// Outcome of parsing one message.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed {
    /// Forward to the control loop.
    Request(ControlRequest),
    /// Answer in place.
    Query(Query),
}

/// Why a message was dropped at ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Address matches no canonical form.
    UnknownAddress(String),
    /// An identifier segment failed validation.
    BadIdent(String),
    /// Wrong number of arguments for the address.
    BadArgCount {
        /// Expected argument count.
        expected: usize,
        /// Received argument count.
        got: usize
    },
    /// An argument had an unusable type or value.
    BadArg(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAddress(a) => write!(f, "unknown address {a:?}"),
            Self::BadIdent(s) => write!(f, "invalid identifier {s:?}"),
            Self::BadArgCount { expected, got } => {
                write!(f, "expected {expected} arguments, got {got}")
            }
            Self::BadArg(s) => write!(f, "bad argument: {s}"),
        }
    }
}

impl std::error::Error for ParseError {}

/// Parses one decoded OSC message against the canonical namespace.
pub fn parse_message(msg: &OscMessage) -> Result<Parsed, ParseError> {
    let segments: Vec<&str> = msg.addr.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["mod", module, param] => {
            let module = ident(module)?;
            let param = ident(param)?;
            let value = one_value(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Broadcast(
                CommandRecord::set(module, param, value),
            )))
        }
        ["gate", module] => {
            let module = ident(module)?;
            let on = gate_value(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Broadcast(
                CommandRecord::gate(module, on),
            )))
        }
        ["patch", "create"] => {
            let (id, type_name) = two_strings(&msg.args)?;
            let id = ident(&id)?;
            if !chronus_core::is_valid_ident(&type_name) {
                return Err(ParseError::BadIdent(type_name));
            }
            Ok(Parsed::Request(ControlRequest::Patch(PatchOp::Create {
                id,
                type_name,
            })))
        }
        ["patch", "connect"] => {
            let (src, dst) = two_strings(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Patch(PatchOp::Connect {
                src: ident(&src)?,
                dst: ident(&dst)?,
            })))
        }
        ["patch", "disconnect"] => {
            let (src, dst) = two_strings(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Patch(
                PatchOp::Disconnect {
                    src: ident(&src)?,
                    dst: ident(&dst)?,
                },
            )))
        }
        ["patch", "delete"] => {
            let id = one_string(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Patch(PatchOp::Delete {
                id: ident(&id)?,
            })))
        }
        ["patch", "commit"] => {
            no_args(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Commit))
        }
        ["patch", "abort"] => {
            no_args(&msg.args)?;
            Ok(Parsed::Request(ControlRequest::Abort))
        }
        ["engine", "schema"] => {
            no_args(&msg.args)?;
            Ok(Parsed::Query(Query::Schema))
        }
        ["engine", "status"] => {
            no_args(&msg.args)?;
            Ok(Parsed::Query(Query::Status))
        }
        _ => Err(ParseError::UnknownAddress(msg.addr.clone())),
    }
}

fn ident(s: &str) -> Result<Ident, ParseError> {
    Ident::new(s).map_err(|_| ParseError::BadIdent(s.to_string()))
}

fn one_value(args: &[OscType]) -> Result<CommandValue, ParseError> {
    let [arg] = args else {
        return Err(ParseError::BadArgCount {
            expected: 1,
            got: args.len(),
        });
    };
    match arg {
        OscType::Float(v) => Ok(CommandValue::Float(f64::from(*v))),
        OscType::Double(v) => Ok(CommandValue::Float(*v)),
        OscType::Int(v) => Ok(CommandValue::Int(i64::from(*v))),
        OscType::Long(v) => Ok(CommandValue::Int(*v)),
        OscType::Bool(v) => Ok(CommandValue::Bool(*v)),
        other => Err(ParseError::BadArg(format!("unsupported type {other:?}"))),
    }
}

fn gate_value(args: &[OscType]) -> Result<bool, ParseError> {
    let [arg] = args else {
        return Err(ParseError::BadArgCount {
            expected: 1,
            got: args.len(),
        });
    };
    match arg {
        OscType::Int(0) | OscType::Long(0) => Ok(false),
        OscType::Int(1) | OscType::Long(1) => Ok(true),
        OscType::Float(v) if *v == 0.0 => Ok(false),
        OscType::Float(v) if *v == 1.0 => Ok(true),
        OscType::Bool(v) => Ok(*v),
        other => Err(ParseError::BadArg(format!("gate wants 0|1, got {other:?}"))),
    }
}

fn one_string(args: &[OscType]) -> Result<String, ParseError> {
    let [OscType::String(s)] = args else {
        return Err(ParseError::BadArgCount {
            expected: 1,
            got: args.len(),
        });
    };
    Ok(s.clone())
}

fn two_strings(args: &[OscType]) -> Result<(String, String), ParseError> {
    let [OscType::String(a), OscType::String(b)] = args else {
        return Err(ParseError::BadArgCount {
            expected: 2,
            got: args.len(),
        });
    };
    Ok((a.clone(), b.clone()))
}

fn no_args(args: &[OscType]) -> Result<(), ParseError> {
    if args.is_empty() {
        Ok(())
    } else {
        Err(ParseError::BadArgCount {
            expected: 0,
            got: args.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chronus_core::Opcode;

    fn msg(addr: &str, args: Vec<OscType>) -> OscMessage {
        OscMessage {
            addr: addr.to_string(),
            args,
        }
    }

    #[test]
    fn parses_param_set() {
        let parsed = parse_message(&msg("/mod/osc1/freq", vec![OscType::Float(440.0)])).unwrap();
        let Parsed::Request(ControlRequest::Broadcast(rec)) = parsed else {
            panic!("expected broadcast");
        };
        assert_eq!(rec.op, Opcode::Set);
        assert_eq!(rec.module, "osc1");
        assert_eq!(rec.param, "freq");
        assert_eq!(rec.value, CommandValue::Float(440.0));
    }

    #[test]
    fn parses_int_and_bool_values() {
        let parsed = parse_message(&msg("/mod/env1/attack", vec![OscType::Int(10)])).unwrap();
        let Parsed::Request(ControlRequest::Broadcast(rec)) = parsed else {
            panic!();
        };
        assert_eq!(rec.value, CommandValue::Int(10));

        let parsed = parse_message(&msg("/mod/x/y", vec![OscType::Bool(true)])).unwrap();
        let Parsed::Request(ControlRequest::Broadcast(rec)) = parsed else {
            panic!();
        };
        assert_eq!(rec.value, CommandValue::Bool(true));
    }

    #[test]
    fn parses_gate_forms() {
        for (arg, expected) in [
            (OscType::Int(1), true),
            (OscType::Int(0), false),
            (OscType::Float(1.0), true),
            (OscType::Bool(false), false),
        ] {
            let parsed = parse_message(&msg("/gate/env1", vec![arg])).unwrap();
            let Parsed::Request(ControlRequest::Broadcast(rec)) = parsed else {
                panic!();
            };
            assert_eq!(rec.op, Opcode::Gate);
            assert_eq!(rec.value.as_gate(), expected);
        }
    }

    #[test]
    fn rejects_out_of_range_gate() {
        let err = parse_message(&msg("/gate/env1", vec![OscType::Int(2)])).unwrap_err();
        assert!(matches!(err, ParseError::BadArg(_)));
    }

    #[test]
    fn parses_patch_lifecycle() {
        let parsed = parse_message(&msg(
            "/patch/create",
            vec![
                OscType::String("osc1".into()),
                OscType::String("sine".into()),
            ],
        ))
        .unwrap();
        assert!(matches!(
            parsed,
            Parsed::Request(ControlRequest::Patch(PatchOp::Create { .. }))
        ));

        let parsed = parse_message(&msg(
            "/patch/connect",
            vec![OscType::String("osc1".into()), OscType::String("env1".into())],
        ))
        .unwrap();
        assert!(matches!(
            parsed,
            Parsed::Request(ControlRequest::Patch(PatchOp::Connect { .. }))
        ));

        assert_eq!(
            parse_message(&msg("/patch/commit", vec![])).unwrap(),
            Parsed::Request(ControlRequest::Commit)
        );
        assert_eq!(
            parse_message(&msg("/patch/abort", vec![])).unwrap(),
            Parsed::Request(ControlRequest::Abort)
        );
    }

    #[test]
    fn parses_queries() {
        assert_eq!(
            parse_message(&msg("/engine/schema", vec![])).unwrap(),
            Parsed::Query(Query::Schema)
        );
        assert_eq!(
            parse_message(&msg("/engine/status", vec![])).unwrap(),
            Parsed::Query(Query::Status)
        );
    }

    #[test]
    fn identifier_boundaries_enforced() {
        // Too long (17 chars), bad charset, empty segment.
        for addr in [
            "/mod/seventeen_chars__/freq",
            "/mod/Osc1/freq",
            "/gate/UPPER",
        ] {
            let err = parse_message(&msg(addr, vec![OscType::Float(1.0)])).unwrap_err();
            assert!(matches!(err, ParseError::BadIdent(_)), "{addr}");
        }

        let err = parse_message(&msg(
            "/patch/create",
            vec![
                OscType::String("ok_id".into()),
                OscType::String("Not-A-Type".into()),
            ],
        ))
        .unwrap_err();
        assert!(matches!(err, ParseError::BadIdent(_)));
    }

    #[test]
    fn wrong_arity_rejected() {
        let err = parse_message(&msg("/mod/osc1/freq", vec![])).unwrap_err();
        assert_eq!(err, ParseError::BadArgCount { expected: 1, got: 0 });

        let err = parse_message(&msg(
            "/patch/connect",
            vec![OscType::String("only_one".into())],
        ))
        .unwrap_err();
        assert_eq!(err, ParseError::BadArgCount { expected: 2, got: 1 });

        let err =
            parse_message(&msg("/patch/commit", vec![OscType::Int(1)])).unwrap_err();
        assert_eq!(err, ParseError::BadArgCount { expected: 0, got: 1 });
    }

    #[test]
    fn unknown_addresses_rejected() {
        for addr in ["/bogus", "/mod/osc1", "/patch/rename", "/engine/reboot"] {
            let err = parse_message(&msg(addr, vec![])).unwrap_err();
            assert!(
                matches!(err, ParseError::UnknownAddress(_)),
                "{addr} should be unknown"
            );
        }
    }
}
