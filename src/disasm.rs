//! Z80 disassembler
//!
//! Decodes exactly one instruction at a byte address and reports its
//! length and mnemonic, for trace output and text-mode debugger
//! front-ends. Decoding mirrors the CPU's instruction boundaries: a DD/FD
//! prefix whose follower it does not modify is reported as a one-byte
//! `DB` pseudo-instruction, the same way the CPU executes it as a one-byte
//! NOP. Any byte sequence decodes; nothing panics.
//!
//! Formats: 16-bit immediates as `$XXXX` (little-endian in memory), 8-bit
//! as `$XX`, displacement bytes as signed decimals with an explicit sign,
//! and JR/DJNZ targets resolved to absolute addresses.

use crate::bus::Memory;

const R8: [&str; 8] = ["B", "C", "D", "E", "H", "L", "(HL)", "A"];
const R16: [&str; 4] = ["BC", "DE", "HL", "SP"];
const R16AF: [&str; 4] = ["BC", "DE", "HL", "AF"];
const CC: [&str; 8] = ["NZ", "Z", "NC", "C", "PO", "PE", "P", "M"];
const ALU: [&str; 8] = ["ADD A,", "ADC A,", "SUB", "SBC A,", "AND", "XOR", "OR", "CP"];
const ROT: [&str; 8] = ["RLC", "RRC", "RL", "RR", "SLA", "SRA", "SLL", "SRL"];

/// One decoded instruction
#[derive(Debug, Clone)]
pub struct Disasm {
    /// Raw opcode bytes as hex (e.g. "DD 7E 05")
    pub bytes: String,
    /// Mnemonic with operands (e.g. "LD A,(IX+5)")
    pub mnemonic: String,
    /// Instruction length in bytes, 1..=4
    pub length: usize,
}

/// Disassemble the instruction at `addr`. Byte reads wrap at the top of
/// the address space.
pub fn disassemble(mem: &Memory, addr: u16) -> Disasm {
    let (mnemonic, length) = decode(mem, addr);
    let bytes = (0..length)
        .map(|i| format!("{:02X}", mem.read(addr.wrapping_add(i as u16))))
        .collect::<Vec<_>>()
        .join(" ");
    Disasm {
        bytes,
        mnemonic,
        length,
    }
}

fn decode(mem: &Memory, addr: u16) -> (String, usize) {
    let op = mem.read(addr);
    match op {
        0xDD | 0xFD => {
            let ixy = if op == 0xDD { "IX" } else { "IY" };
            let next = mem.read(addr.wrapping_add(1));
            match next {
                0xCB => decode_indexed_cb(mem, addr.wrapping_add(2), ixy),
                _ if prefix_applies(next) => decode_main(mem, addr.wrapping_add(1), Some(ixy)),
                // Bare prefix: the CPU runs it as a one-byte NOP
                _ => (format!("DB ${:02X}", op), 1),
            }
        }
        0xED => decode_ed(mem, addr.wrapping_add(1)),
        0xCB => decode_cb(mem.read(addr.wrapping_add(1))),
        _ => decode_main(mem, addr, None),
    }
}

/// Whether a DD/FD prefix modifies the following opcode (it references
/// HL, H, L or (HL)). Mirrors the CPU's rule.
fn prefix_applies(opcode: u8) -> bool {
    let x = opcode >> 6;
    let y = (opcode >> 3) & 0x07;
    let z = opcode & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    match x {
        0 => match z {
            1 => q == 1 || p == 2,
            2 | 3 => p == 2,
            4 | 5 | 6 => (4..=6).contains(&y),
            _ => false,
        },
        1 => {
            if y == 6 && z == 6 {
                false // HALT
            } else {
                (4..=6).contains(&y) || (4..=6).contains(&z)
            }
        }
        2 => (4..=6).contains(&z),
        _ => match z {
            1 => (q == 0 && p == 2) || (q == 1 && p >= 2),
            3 => y == 4,
            5 => q == 0 && p == 2,
            _ => false,
        },
    }
}

/// Register-pair name with HL replaced under a prefix
fn rp_name(idx: u8, ixy: Option<&str>) -> &str {
    match (idx, ixy) {
        (2, Some(ixy)) => ixy,
        _ => R16[idx as usize],
    }
}

/// PUSH/POP register-pair name with HL replaced under a prefix
fn rp2_name(idx: u8, ixy: Option<&str>) -> &str {
    match (idx, ixy) {
        (2, Some(ixy)) => ixy,
        _ => R16AF[idx as usize],
    }
}

/// ALU mnemonic joined with its operand; the two-operand forms in the
/// table already end with "A,"
fn alu_text(y: u8, operand: &str) -> String {
    let name = ALU[y as usize];
    if name.ends_with(',') {
        format!("{}{}", name, operand)
    } else {
        format!("{} {}", name, operand)
    }
}

/// 8-bit register name; under a prefix the H/L halves become IXH/IXL
/// (only used for the non-displaced forms)
fn r8_name(idx: u8, ixy: Option<&str>) -> String {
    match (idx, ixy) {
        (4, Some("IX")) => "IXH".into(),
        (5, Some("IX")) => "IXL".into(),
        (4, Some("IY")) => "IYH".into(),
        (5, Some("IY")) => "IYL".into(),
        _ => R8[idx as usize].into(),
    }
}

/// Main table. `addr` points at the opcode itself; `length` out includes
/// the prefix byte when `ixy` is set.
fn decode_main(mem: &Memory, addr: u16, ixy: Option<&str>) -> (String, usize) {
    let plen = usize::from(ixy.is_some());
    let op = mem.read(addr);
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    let imm8 = |offset: u16| mem.read(addr.wrapping_add(offset));
    let imm16 = |offset: u16| {
        u16::from(mem.read(addr.wrapping_add(offset)))
            | (u16::from(mem.read(addr.wrapping_add(offset + 1))) << 8)
    };
    // JR/DJNZ target, relative to the end of the 2-byte instruction
    let rel_target = || {
        let d = imm8(1) as i8;
        addr.wrapping_add(2).wrapping_add(d as i16 as u16)
    };

    match x {
        0 => match z {
            0 => match y {
                0 => ("NOP".into(), 1),
                1 => ("EX AF,AF'".into(), 1),
                2 => (format!("DJNZ ${:04X}", rel_target()), 2),
                3 => (format!("JR ${:04X}", rel_target()), 2),
                _ => (
                    format!("JR {},${:04X}", CC[(y - 4) as usize], rel_target()),
                    2,
                ),
            },
            1 => {
                if q == 0 {
                    (format!("LD {},${:04X}", rp_name(p, ixy), imm16(1)), 3 + plen)
                } else {
                    (
                        format!("ADD {},{}", rp_name(2, ixy), rp_name(p, ixy)),
                        1 + plen,
                    )
                }
            }
            2 => match y {
                0 => ("LD (BC),A".into(), 1),
                1 => ("LD A,(BC)".into(), 1),
                2 => ("LD (DE),A".into(), 1),
                3 => ("LD A,(DE)".into(), 1),
                4 => (
                    format!("LD (${:04X}),{}", imm16(1), rp_name(2, ixy)),
                    3 + plen,
                ),
                5 => (
                    format!("LD {},(${:04X})", rp_name(2, ixy), imm16(1)),
                    3 + plen,
                ),
                6 => (format!("LD (${:04X}),A", imm16(1)), 3),
                _ => (format!("LD A,(${:04X})", imm16(1)), 3),
            },
            3 => {
                let name = if q == 0 { "INC" } else { "DEC" };
                (format!("{} {}", name, rp_name(p, ixy)), 1 + plen)
            }
            4 | 5 => {
                let name = if z == 4 { "INC" } else { "DEC" };
                if let (Some(ixy), 6) = (ixy, y) {
                    let d = imm8(1) as i8;
                    (format!("{} ({}{:+})", name, ixy, d), 3)
                } else {
                    (format!("{} {}", name, r8_name(y, ixy)), 1 + plen)
                }
            }
            6 => {
                if let (Some(ixy), 6) = (ixy, y) {
                    let d = imm8(1) as i8;
                    (format!("LD ({}{:+}),${:02X}", ixy, d, imm8(2)), 4)
                } else {
                    (format!("LD {},${:02X}", r8_name(y, ixy), imm8(1)), 2 + plen)
                }
            }
            _ => {
                const MISC: [&str; 8] = ["RLCA", "RRCA", "RLA", "RRA", "DAA", "CPL", "SCF", "CCF"];
                (MISC[y as usize].into(), 1)
            }
        },
        1 => {
            if y == 6 && z == 6 {
                return ("HALT".into(), 1);
            }
            if let Some(ixy) = ixy {
                if y == 6 {
                    let d = imm8(1) as i8;
                    return (format!("LD ({}{:+}),{}", ixy, d, R8[z as usize]), 3);
                }
                if z == 6 {
                    let d = imm8(1) as i8;
                    return (format!("LD {},({}{:+})", R8[y as usize], ixy, d), 3);
                }
            }
            (
                format!("LD {},{}", r8_name(y, ixy), r8_name(z, ixy)),
                1 + plen,
            )
        }
        2 => {
            if let (Some(ixy), 6) = (ixy, z) {
                let d = imm8(1) as i8;
                (alu_text(y, &format!("({}{:+})", ixy, d)), 3)
            } else {
                (alu_text(y, &r8_name(z, ixy)), 1 + plen)
            }
        }
        _ => match z {
            0 => (format!("RET {}", CC[y as usize]), 1),
            1 => {
                if q == 0 {
                    (format!("POP {}", rp2_name(p, ixy)), 1 + plen)
                } else {
                    match p {
                        0 => ("RET".into(), 1),
                        1 => ("EXX".into(), 1),
                        2 => (format!("JP ({})", rp_name(2, ixy)), 1 + plen),
                        _ => (format!("LD SP,{}", rp_name(2, ixy)), 1 + plen),
                    }
                }
            }
            2 => (
                format!("JP {},${:04X}", CC[y as usize], imm16(1)),
                3,
            ),
            3 => match y {
                0 => (format!("JP ${:04X}", imm16(1)), 3),
                2 => (format!("OUT (${:02X}),A", imm8(1)), 2),
                3 => (format!("IN A,(${:02X})", imm8(1)), 2),
                4 => (format!("EX (SP),{}", rp_name(2, ixy)), 1 + plen),
                5 => ("EX DE,HL".into(), 1),
                6 => ("DI".into(), 1),
                _ => ("EI".into(), 1),
            },
            4 => (
                format!("CALL {},${:04X}", CC[y as usize], imm16(1)),
                3,
            ),
            5 => {
                if q == 0 {
                    (format!("PUSH {}", rp2_name(p, ixy)), 1 + plen)
                } else {
                    // p == 0 is CALL nn; the other rows are the CB/DD/ED/FD
                    // prefixes, which never reach this table
                    (format!("CALL ${:04X}", imm16(1)), 3)
                }
            }
            6 => (alu_text(y, &format!("${:02X}", imm8(1))), 2),
            _ => (format!("RST ${:02X}", y * 8), 1),
        },
    }
}

/// CB-prefix table (rotates, shifts, bit operations); two bytes total
fn decode_cb(op: u8) -> (String, usize) {
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let reg = R8[z as usize];

    let text = match x {
        0 => format!("{} {}", ROT[y as usize], reg),
        1 => format!("BIT {},{}", y, reg),
        2 => format!("RES {},{}", y, reg),
        _ => format!("SET {},{}", y, reg),
    };
    (text, 2)
}

/// DD CB d op / FD CB d op; `addr` points at the displacement byte. The
/// operation always targets the displaced address, so that is what gets
/// printed, register-index sub-opcodes included. Four bytes total.
fn decode_indexed_cb(mem: &Memory, addr: u16, ixy: &str) -> (String, usize) {
    let d = mem.read(addr) as i8;
    let op = mem.read(addr.wrapping_add(1));
    let x = op >> 6;
    let y = (op >> 3) & 0x07;

    let text = match x {
        0 => format!("{} ({}{:+})", ROT[y as usize], ixy, d),
        1 => format!("BIT {},({}{:+})", y, ixy, d),
        2 => format!("RES {},({}{:+})", y, ixy, d),
        _ => format!("SET {},({}{:+})", y, ixy, d),
    };
    (text, 4)
}

/// ED-prefix table; `addr` points at the byte after ED. Length includes
/// the prefix.
fn decode_ed(mem: &Memory, addr: u16) -> (String, usize) {
    let op = mem.read(addr);
    let x = op >> 6;
    let y = (op >> 3) & 0x07;
    let z = op & 0x07;
    let p = y >> 1;
    let q = y & 0x01;

    if x == 1 {
        return match z {
            0 => {
                if y == 6 {
                    ("IN (C)".into(), 2)
                } else {
                    (format!("IN {},(C)", R8[y as usize]), 2)
                }
            }
            1 => {
                if y == 6 {
                    ("OUT (C),0".into(), 2)
                } else {
                    (format!("OUT (C),{}", R8[y as usize]), 2)
                }
            }
            2 => {
                let name = if q == 0 { "SBC" } else { "ADC" };
                (format!("{} HL,{}", name, R16[p as usize]), 2)
            }
            3 => {
                let nn = u16::from(mem.read(addr.wrapping_add(1)))
                    | (u16::from(mem.read(addr.wrapping_add(2))) << 8);
                if q == 0 {
                    (format!("LD (${:04X}),{}", nn, R16[p as usize]), 4)
                } else {
                    (format!("LD {},(${:04X})", R16[p as usize], nn), 4)
                }
            }
            4 => ("NEG".into(), 2),
            5 => {
                if y == 1 {
                    ("RETI".into(), 2)
                } else {
                    ("RETN".into(), 2)
                }
            }
            6 => {
                const IM: [&str; 8] = ["0", "0/1", "1", "2", "0", "0/1", "1", "2"];
                (format!("IM {}", IM[y as usize]), 2)
            }
            _ => {
                const MISC: [&str; 8] =
                    ["LD I,A", "LD R,A", "LD A,I", "LD A,R", "RRD", "RLD", "NOP", "NOP"];
                (MISC[y as usize].into(), 2)
            }
        };
    }

    if x == 2 && z <= 3 && y >= 4 {
        const BLK: [[&str; 4]; 4] = [
            ["LDI", "CPI", "INI", "OUTI"],
            ["LDD", "CPD", "IND", "OUTD"],
            ["LDIR", "CPIR", "INIR", "OTIR"],
            ["LDDR", "CPDR", "INDR", "OTDR"],
        ];
        return (BLK[(y - 4) as usize][z as usize].into(), 2);
    }

    (format!("DB $ED,${:02X}", op), 2)
}
