//! Script parsing: flat bytes to an operation tree and back
//!
//! Parsing is a single forward pass. Conditionals open a frame and
//! descend; ELSE attaches the alternate branch; ENDIF closes the frame.
//! Serializing the parsed tree reproduces the input byte-for-byte,
//! including the flavor of every push.

use crate::constants::{MAX_SCRIPT_ELEMENT_SIZE, MAX_SCRIPT_SIZE};
use crate::error::{CoreError, Result, ScriptErrorCode};
use crate::opcodes::*;
use crate::script::op::{Operation, PushKind};
use crate::stream::{ByteReader, ByteWriter};

/// A parsed script: an ordered sequence of operations.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script {
    ops: Vec<Operation>,
}

/// How a nested parse ended.
enum BlockEnd {
    Eof,
    Else,
    EndIf,
}

impl Script {
    pub fn new(ops: Vec<Operation>) -> Self {
        Script { ops }
    }

    /// Parse a script, enforcing the 10,000-byte consensus limit.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_SCRIPT_SIZE {
            return Err(CoreError::script(
                ScriptErrorCode::ScriptSize,
                "script exceeds maximum size",
            ));
        }
        Self::parse_unbounded(bytes)
    }

    /// Parse without the size cap. Tapscript leaves are not subject to
    /// the legacy script-size limit.
    pub fn parse_unbounded(bytes: &[u8]) -> Result<Self> {
        let mut reader = ByteReader::new(bytes);
        let (ops, end) = parse_ops(&mut reader, false)?;
        match end {
            BlockEnd::Eof => Ok(Script { ops }),
            // parse_ops only surfaces these at nesting depth > 0
            BlockEnd::Else | BlockEnd::EndIf => unreachable!(),
        }
    }

    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Serialize back to wire bytes, reproducing push flavors.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut writer = ByteWriter::new();
        write_ops(&mut writer, &self.ops);
        writer.into_bytes()
    }

    /// Whether every operation is a push. OP_RESERVED counts as a push
    /// for this check, matching Bitcoin Core's `IsPushOnly`.
    pub fn is_push_only(&self) -> bool {
        self.ops.iter().all(|op| {
            matches!(op, Operation::Push { .. }) || matches!(op, Operation::Reserved(OP_RESERVED))
        })
    }
}

fn parse_ops(reader: &mut ByteReader<'_>, nested: bool) -> Result<(Vec<Operation>, BlockEnd)> {
    let mut ops = Vec::new();
    loop {
        if reader.is_empty() {
            return Ok((ops, BlockEnd::Eof));
        }
        let opcode = reader.read_u8()?;
        match opcode {
            OP_IF | OP_NOTIF => {
                let negate = opcode == OP_NOTIF;
                let (main, end) = parse_ops(reader, true)?;
                let or_else = match end {
                    BlockEnd::EndIf => None,
                    BlockEnd::Else => {
                        let (else_ops, end) = parse_ops(reader, true)?;
                        match end {
                            BlockEnd::EndIf => Some(else_ops),
                            BlockEnd::Else => {
                                return Err(CoreError::script(
                                    ScriptErrorCode::UnbalancedConditional,
                                    "duplicate OP_ELSE",
                                ))
                            }
                            BlockEnd::Eof => {
                                return Err(CoreError::script(
                                    ScriptErrorCode::UnbalancedConditional,
                                    "unterminated OP_ELSE branch",
                                ))
                            }
                        }
                    }
                    BlockEnd::Eof => {
                        return Err(CoreError::script(
                            ScriptErrorCode::UnbalancedConditional,
                            "OP_IF without OP_ENDIF",
                        ))
                    }
                };
                ops.push(Operation::Conditional {
                    negate,
                    main,
                    or_else,
                });
            }
            OP_ELSE => {
                if !nested {
                    return Err(CoreError::script(
                        ScriptErrorCode::UnbalancedConditional,
                        "OP_ELSE without OP_IF",
                    ));
                }
                return Ok((ops, BlockEnd::Else));
            }
            OP_ENDIF => {
                if !nested {
                    return Err(CoreError::script(
                        ScriptErrorCode::UnbalancedConditional,
                        "OP_ENDIF without OP_IF",
                    ));
                }
                return Ok((ops, BlockEnd::EndIf));
            }
            op if is_push(op) => ops.push(read_push(reader, op)?),
            OP_1NEGATE => ops.push(Operation::Push {
                data: vec![0x81],
                kind: PushKind::Num(-1),
            }),
            op if is_small_num_push(op) => {
                let n = op - OP_N_BASE;
                ops.push(Operation::Push {
                    data: vec![n],
                    kind: PushKind::Num(n as i8),
                });
            }
            OP_RETURN => ops.push(Operation::Return),
            op if is_disabled(op) => ops.push(Operation::Disabled(op)),
            op if is_reserved(op) => ops.push(Operation::Reserved(op)),
            op => ops.push(Operation::Simple(op)),
        }
    }
}

const OP_N_BASE: u8 = 0x50;

fn read_push(reader: &mut ByteReader<'_>, opcode: u8) -> Result<Operation> {
    let (length, kind) = match opcode {
        OP_0 => (0usize, PushKind::Empty),
        OP_PUSHDATA1 => (read_push_len(reader, 1)?, PushKind::Data1),
        OP_PUSHDATA2 => (read_push_len(reader, 2)?, PushKind::Data2),
        OP_PUSHDATA4 => (read_push_len(reader, 4)?, PushKind::Data4),
        direct => (direct as usize, PushKind::Direct),
    };
    if length > MAX_SCRIPT_ELEMENT_SIZE {
        return Err(CoreError::script(
            ScriptErrorCode::PushSize,
            "push exceeds maximum element size",
        ));
    }
    let data = reader
        .read_bytes(length)
        .map_err(|_| CoreError::Malformed("truncated push payload".into()))?
        .to_vec();
    Ok(Operation::Push { data, kind })
}

fn read_push_len(reader: &mut ByteReader<'_>, width: usize) -> Result<usize> {
    let bytes = reader
        .read_bytes(width)
        .map_err(|_| CoreError::Malformed("truncated push length".into()))?;
    let mut length = 0usize;
    for (i, byte) in bytes.iter().enumerate() {
        length |= (*byte as usize) << (8 * i);
    }
    Ok(length)
}

fn write_ops(writer: &mut ByteWriter, ops: &[Operation]) {
    for op in ops {
        match op {
            Operation::Push { data, kind } => write_push(writer, data, *kind),
            Operation::Simple(opcode)
            | Operation::Reserved(opcode)
            | Operation::Disabled(opcode) => writer.write_u8(*opcode),
            Operation::Return => writer.write_u8(OP_RETURN),
            Operation::Conditional {
                negate,
                main,
                or_else,
            } => {
                writer.write_u8(if *negate { OP_NOTIF } else { OP_IF });
                write_ops(writer, main);
                if let Some(or_else) = or_else {
                    writer.write_u8(OP_ELSE);
                    write_ops(writer, or_else);
                }
                writer.write_u8(OP_ENDIF);
            }
        }
    }
}

fn write_push(writer: &mut ByteWriter, data: &[u8], kind: PushKind) {
    // A kind inconsistent with the payload length (possible only for
    // hand-built trees) falls back to the shortest length-prefixed form
    let kind = match kind {
        PushKind::Empty if data.is_empty() => kind,
        PushKind::Num(_) if data.len() == 1 => kind,
        PushKind::Direct if (1..=75).contains(&data.len()) => kind,
        PushKind::Data1 if data.len() <= 0xff => kind,
        PushKind::Data2 if data.len() <= 0xffff => kind,
        PushKind::Data4 => kind,
        _ => match data.len() {
            0 => PushKind::Empty,
            1..=75 => PushKind::Direct,
            76..=0xff => PushKind::Data1,
            0x100..=0xffff => PushKind::Data2,
            _ => PushKind::Data4,
        },
    };
    match kind {
        PushKind::Empty => writer.write_u8(OP_0),
        PushKind::Num(-1) => writer.write_u8(OP_1NEGATE),
        PushKind::Num(n) => writer.write_u8(OP_N_BASE + n as u8),
        PushKind::Direct => {
            writer.write_u8(data.len() as u8);
            writer.write_bytes(data);
        }
        PushKind::Data1 => {
            writer.write_u8(OP_PUSHDATA1);
            writer.write_u8(data.len() as u8);
            writer.write_bytes(data);
        }
        PushKind::Data2 => {
            writer.write_u8(OP_PUSHDATA2);
            writer.write_u16(data.len() as u16);
            writer.write_bytes(data);
        }
        PushKind::Data4 => {
            writer.write_u8(OP_PUSHDATA4);
            writer.write_u32(data.len() as u32);
            writer.write_bytes(data);
        }
    }
}

/// Pay-to-script-hash pattern: `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn is_p2sh(script: &[u8]) -> bool {
    script.len() == 23 && script[0] == OP_HASH160 && script[1] == 0x14 && script[22] == OP_EQUAL
}

/// Witness program: a version opcode (OP_0 or OP_1..OP_16) followed by a
/// single direct push of 2 to 40 bytes. Returns the version and program.
pub fn witness_program(script: &[u8]) -> Option<(u8, &[u8])> {
    if script.len() < 4 || script.len() > 42 {
        return None;
    }
    let version = match script[0] {
        OP_0 => 0,
        op if (OP_1..=OP_16).contains(&op) => op - OP_N_BASE,
        _ => return None,
    };
    let push_len = script[1] as usize;
    if push_len != script.len() - 2 || !(2..=40).contains(&push_len) {
        return None;
    }
    Some((version, &script[2..]))
}

/// BIP342: scan a tapscript for OP_SUCCESS opcodes, which make the leaf
/// unconditionally valid. The scan itself fails on truncated pushes.
pub fn has_op_success(script: &[u8]) -> Result<bool> {
    let mut reader = ByteReader::new(script);
    while !reader.is_empty() {
        let opcode = reader.read_u8()?;
        match opcode {
            0x01..=0x4b => {
                reader.read_bytes(opcode as usize)?;
            }
            OP_PUSHDATA1 => {
                let len = read_push_len(&mut reader, 1)?;
                reader.read_bytes(len)?;
            }
            OP_PUSHDATA2 => {
                let len = read_push_len(&mut reader, 2)?;
                reader.read_bytes(len)?;
            }
            OP_PUSHDATA4 => {
                let len = read_push_len(&mut reader, 4)?;
                reader.read_bytes(len)?;
            }
            0x50 | 0x62 | 0x7e..=0x81 | 0x83..=0x86 | 0x89 | 0x8a | 0x8d | 0x8e | 0x95..=0x99
            | 0xbb..=0xfe => return Ok(true),
            _ => {}
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pushes() {
        let script = Script::parse(&[OP_0, 0x02, 0xaa, 0xbb, OP_1, OP_16, OP_1NEGATE]).unwrap();
        assert_eq!(
            script.ops(),
            &[
                Operation::Push {
                    data: vec![],
                    kind: PushKind::Empty
                },
                Operation::Push {
                    data: vec![0xaa, 0xbb],
                    kind: PushKind::Direct
                },
                Operation::Push {
                    data: vec![1],
                    kind: PushKind::Num(1)
                },
                Operation::Push {
                    data: vec![16],
                    kind: PushKind::Num(16)
                },
                Operation::Push {
                    data: vec![0x81],
                    kind: PushKind::Num(-1)
                },
            ]
        );
    }

    #[test]
    fn test_parse_pushdata_flavors() {
        let mut bytes = vec![OP_PUSHDATA1, 3, 1, 2, 3];
        bytes.extend_from_slice(&[OP_PUSHDATA2, 2, 0, 9, 9]);
        bytes.extend_from_slice(&[OP_PUSHDATA4, 1, 0, 0, 0, 7]);
        let script = Script::parse(&bytes).unwrap();
        assert_eq!(
            script.ops(),
            &[
                Operation::Push {
                    data: vec![1, 2, 3],
                    kind: PushKind::Data1
                },
                Operation::Push {
                    data: vec![9, 9],
                    kind: PushKind::Data2
                },
                Operation::Push {
                    data: vec![7],
                    kind: PushKind::Data4
                },
            ]
        );
        // Flavors survive the round trip
        assert_eq!(script.to_bytes(), bytes);
    }

    #[test]
    fn test_round_trip_preserves_bytes() {
        let cases: Vec<Vec<u8>> = vec![
            vec![OP_1, OP_IF, OP_2, OP_ELSE, OP_3, OP_ENDIF],
            vec![OP_DUP, OP_HASH160, 0x03, 1, 2, 3, OP_EQUALVERIFY, OP_CHECKSIG],
            vec![OP_RETURN, 0x02, 0xca, 0xfe],
            vec![OP_NOTIF, OP_NOTIF, OP_ENDIF, OP_ENDIF],
            vec![OP_PUSHDATA1, 0x00],
        ];
        for bytes in cases {
            let script = Script::parse(&bytes).unwrap();
            assert_eq!(script.to_bytes(), bytes, "case {bytes:02x?}");
            // Parse idempotence after normalization
            assert_eq!(Script::parse(&script.to_bytes()).unwrap(), script);
        }
    }

    #[test]
    fn test_conditional_tree_shape() {
        let script =
            Script::parse(&[OP_IF, OP_1, OP_IF, OP_2, OP_ENDIF, OP_ELSE, OP_3, OP_ENDIF]).unwrap();
        let Operation::Conditional {
            negate,
            main,
            or_else,
        } = &script.ops()[0]
        else {
            panic!("expected conditional");
        };
        assert!(!negate);
        assert_eq!(main.len(), 2);
        assert!(matches!(main[1], Operation::Conditional { .. }));
        assert_eq!(or_else.as_ref().unwrap().len(), 1);
    }

    #[test]
    fn test_unbalanced_conditionals() {
        for bytes in [
            vec![OP_IF],                          // dangling IF
            vec![OP_IF, OP_1],                    // dangling IF with body
            vec![OP_ELSE],                        // ELSE without IF
            vec![OP_ENDIF],                       // ENDIF without IF
            vec![OP_IF, OP_ELSE, OP_ELSE, OP_ENDIF], // duplicate ELSE
            vec![OP_IF, OP_ELSE],                 // unterminated ELSE
            vec![OP_IF, OP_IF, OP_ENDIF],         // inner closed, outer dangling
        ] {
            let err = Script::parse(&bytes).unwrap_err();
            assert_eq!(
                err.script_code(),
                Some(ScriptErrorCode::UnbalancedConditional),
                "case {bytes:02x?}"
            );
        }
    }

    #[test]
    fn test_truncated_pushes() {
        assert!(matches!(
            Script::parse(&[0x05, 1, 2]),
            Err(CoreError::Malformed(_))
        ));
        assert!(matches!(
            Script::parse(&[OP_PUSHDATA1]),
            Err(CoreError::Malformed(_))
        ));
        assert!(matches!(
            Script::parse(&[OP_PUSHDATA2, 0xff, 0x00, 1]),
            Err(CoreError::Malformed(_))
        ));
    }

    #[test]
    fn test_oversize_script_rejected() {
        let bytes = vec![OP_NOP; MAX_SCRIPT_SIZE + 1];
        assert_eq!(
            Script::parse(&bytes).unwrap_err().script_code(),
            Some(ScriptErrorCode::ScriptSize)
        );
        assert!(Script::parse_unbounded(&bytes).is_ok());
    }

    #[test]
    fn test_oversize_push_rejected() {
        let mut bytes = vec![OP_PUSHDATA2];
        bytes.extend_from_slice(&(MAX_SCRIPT_ELEMENT_SIZE as u16 + 1).to_le_bytes());
        bytes.extend(vec![0u8; MAX_SCRIPT_ELEMENT_SIZE + 1]);
        assert_eq!(
            Script::parse(&bytes).unwrap_err().script_code(),
            Some(ScriptErrorCode::PushSize)
        );
    }

    #[test]
    fn test_is_push_only() {
        assert!(Script::parse(&[OP_0, 0x01, 0xab, OP_16]).unwrap().is_push_only());
        assert!(!Script::parse(&[OP_DUP]).unwrap().is_push_only());
        assert!(!Script::parse(&[0x01, 0xab, OP_CHECKSIG]).unwrap().is_push_only());
    }

    #[test]
    fn test_p2sh_detection() {
        let mut p2sh = vec![OP_HASH160, 0x14];
        p2sh.extend_from_slice(&[0u8; 20]);
        p2sh.push(OP_EQUAL);
        assert!(is_p2sh(&p2sh));
        assert!(!is_p2sh(&p2sh[..22]));
        assert!(!is_p2sh(&[OP_DUP, OP_HASH160]));
    }

    #[test]
    fn test_witness_program_detection() {
        let mut v0 = vec![OP_0, 0x14];
        v0.extend_from_slice(&[7u8; 20]);
        let (version, program) = witness_program(&v0).unwrap();
        assert_eq!(version, 0);
        assert_eq!(program.len(), 20);

        let mut v1 = vec![OP_1, 0x20];
        v1.extend_from_slice(&[9u8; 32]);
        let (version, program) = witness_program(&v1).unwrap();
        assert_eq!(version, 1);
        assert_eq!(program.len(), 32);

        // Wrong inner length
        let mut bad = vec![OP_0, 0x13];
        bad.extend_from_slice(&[7u8; 20]);
        assert_eq!(witness_program(&bad), None);
        // Not a version opcode
        let mut bad = vec![OP_DUP, 0x14];
        bad.extend_from_slice(&[7u8; 20]);
        assert_eq!(witness_program(&bad), None);
        // P2SH is not a witness program
        let mut p2sh = vec![OP_HASH160, 0x14];
        p2sh.extend_from_slice(&[0u8; 20]);
        p2sh.push(OP_EQUAL);
        assert_eq!(witness_program(&p2sh), None);
    }

    #[test]
    fn test_op_success_scan() {
        assert!(has_op_success(&[OP_1, 0x50]).unwrap());
        assert!(has_op_success(&[0xbb]).unwrap());
        assert!(!has_op_success(&[OP_1, OP_CHECKSIG]).unwrap());
        // Push payloads are not scanned as opcodes
        assert!(!has_op_success(&[0x01, 0x50]).unwrap());
        // Truncated push still fails the scan
        assert!(has_op_success(&[0x02, 0x50]).is_err());
    }
}
