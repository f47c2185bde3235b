//! Z80 instruction execution
//!
//! Decode uses the x/y/z/p/q decomposition of the opcode byte:
//! `x` = bits 7-6, `y` = bits 5-3, `z` = bits 2-0, `p` = y >> 1, `q` = y & 1.
//! Each function returns the T-states consumed, matching the documented
//! timing table.
//!
//! - `execute_x0`: relative jumps, 16-bit loads/arithmetic, INC/DEC, misc
//! - `execute_x1`: LD r,r' (0x76 = HALT)
//! - `execute_alu`: 8-bit ALU on registers and (HL)
//! - `execute_x3`: control flow, stack, I/O, prefixes
//! - `execute_cb` / `execute_ed` / `execute_index`: prefixed tables
//!
//! # References
//! - Zilog Z80 CPU User Manual (UM008011)
//! - "The Undocumented Z80 Documented" (Sean Young)

use super::flags;
use super::helpers::{parity, sz53};
use super::Cpu;
use super::InterruptMode;
use crate::bus::Bus;

impl Cpu {
    /// Execute one already-fetched opcode.
    pub(crate) fn execute(&mut self, bus: &mut Bus, opcode: u8) -> u32 {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        match x {
            0 => self.execute_x0(bus, y, z, p, q),
            1 => self.execute_x1(bus, y, z),
            2 => self.execute_alu(bus, y, z),
            _ => self.execute_x3(bus, y, z, p, q),
        }
    }

    fn execute_x0(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => match y {
                0 => 4, // NOP
                1 => {
                    // EX AF,AF'
                    self.ex_af();
                    4
                }
                2 => {
                    // DJNZ d
                    let d = self.fetch_byte(bus) as i8;
                    self.set_b(self.b().wrapping_sub(1));
                    if self.b() != 0 {
                        self.pc = self.pc.wrapping_add(d as i16 as u16);
                        self.wz = self.pc;
                        13
                    } else {
                        8
                    }
                }
                3 => {
                    // JR d
                    let d = self.fetch_byte(bus) as i8;
                    self.pc = self.pc.wrapping_add(d as i16 as u16);
                    self.wz = self.pc;
                    12
                }
                _ => {
                    // JR cc,d
                    let d = self.fetch_byte(bus) as i8;
                    if self.check_cc(y - 4) {
                        self.pc = self.pc.wrapping_add(d as i16 as u16);
                        self.wz = self.pc;
                        12
                    } else {
                        7
                    }
                }
            },
            1 => {
                if q == 0 {
                    // LD rp,nn
                    let nn = self.fetch_word(bus);
                    self.set_rp(p, nn);
                    10
                } else {
                    // ADD HL,rp
                    let rhs = self.get_rp(p);
                    self.hl = self.add16(self.hl, rhs);
                    11
                }
            }
            2 => match (q, p) {
                (0, 0) => {
                    // LD (BC),A
                    bus.write_byte(self.bc, self.a);
                    self.wz = (u16::from(self.a) << 8) | (self.bc.wrapping_add(1) & 0xFF);
                    7
                }
                (0, 1) => {
                    // LD (DE),A
                    bus.write_byte(self.de, self.a);
                    self.wz = (u16::from(self.a) << 8) | (self.de.wrapping_add(1) & 0xFF);
                    7
                }
                (0, 2) => {
                    // LD (nn),HL
                    let nn = self.fetch_word(bus);
                    bus.write_word(nn, self.hl);
                    self.wz = nn.wrapping_add(1);
                    16
                }
                (0, _) => {
                    // LD (nn),A
                    let nn = self.fetch_word(bus);
                    bus.write_byte(nn, self.a);
                    self.wz = (u16::from(self.a) << 8) | (nn.wrapping_add(1) & 0xFF);
                    13
                }
                (_, 0) => {
                    // LD A,(BC)
                    self.a = bus.read_byte(self.bc);
                    self.wz = self.bc.wrapping_add(1);
                    7
                }
                (_, 1) => {
                    // LD A,(DE)
                    self.a = bus.read_byte(self.de);
                    self.wz = self.de.wrapping_add(1);
                    7
                }
                (_, 2) => {
                    // LD HL,(nn)
                    let nn = self.fetch_word(bus);
                    self.hl = bus.read_word(nn);
                    self.wz = nn.wrapping_add(1);
                    16
                }
                _ => {
                    // LD A,(nn)
                    let nn = self.fetch_word(bus);
                    self.a = bus.read_byte(nn);
                    self.wz = nn.wrapping_add(1);
                    13
                }
            },
            3 => {
                // INC rp / DEC rp, no flags
                let val = self.get_rp(p);
                let val = if q == 0 {
                    val.wrapping_add(1)
                } else {
                    val.wrapping_sub(1)
                };
                self.set_rp(p, val);
                6
            }
            4 => {
                // INC r
                let val = self.get_reg8(bus, y);
                let result = self.inc8(val);
                self.set_reg8(bus, y, result);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            5 => {
                // DEC r
                let val = self.get_reg8(bus, y);
                let result = self.dec8(val);
                self.set_reg8(bus, y, result);
                if y == 6 {
                    11
                } else {
                    4
                }
            }
            6 => {
                // LD r,n
                let n = self.fetch_byte(bus);
                self.set_reg8(bus, y, n);
                if y == 6 {
                    10
                } else {
                    7
                }
            }
            _ => match y {
                0..=3 => {
                    // RLCA RRCA RLA RRA
                    self.rotate_a(y);
                    4
                }
                4 => {
                    self.daa();
                    4
                }
                5 => {
                    // CPL
                    self.a = !self.a;
                    self.f = (self.f & (flags::S | flags::Z | flags::PV | flags::C))
                        | flags::H
                        | flags::N
                        | (self.a & (flags::X | flags::Y));
                    4
                }
                6 => {
                    // SCF
                    self.f = (self.f & (flags::S | flags::Z | flags::PV))
                        | flags::C
                        | (self.a & (flags::X | flags::Y));
                    4
                }
                _ => {
                    // CCF: H takes the old carry
                    let carry = self.flag_c();
                    self.f = (self.f & (flags::S | flags::Z | flags::PV))
                        | (self.a & (flags::X | flags::Y));
                    self.set_flag(flags::H, carry);
                    self.set_flag(flags::C, !carry);
                    4
                }
            },
        }
    }

    fn execute_x1(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        if y == 6 && z == 6 {
            // HALT: park PC on the opcode so the CPU re-executes it until
            // an interrupt is accepted
            self.halted = true;
            self.pc = self.pc.wrapping_sub(1);
            return 4;
        }
        // LD r,r'
        let val = self.get_reg8(bus, z);
        self.set_reg8(bus, y, val);
        if y == 6 || z == 6 {
            7
        } else {
            4
        }
    }

    fn execute_alu(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let val = self.get_reg8(bus, z);
        self.apply_alu(y, val);
        if z == 6 {
            7
        } else {
            4
        }
    }

    /// ALU operation by index: ADD ADC SUB SBC AND XOR OR CP
    fn apply_alu(&mut self, op: u8, val: u8) {
        match op {
            0 => self.alu_add(val, false),
            1 => {
                let carry = self.flag_c();
                self.alu_add(val, carry);
            }
            2 => self.alu_sub(val, false),
            3 => {
                let carry = self.flag_c();
                self.alu_sub(val, carry);
            }
            4 => self.alu_and(val),
            5 => self.alu_xor(val),
            6 => self.alu_or(val),
            _ => self.alu_cp(val),
        }
    }

    fn execute_x3(&mut self, bus: &mut Bus, y: u8, z: u8, p: u8, q: u8) -> u32 {
        match z {
            0 => {
                // RET cc
                if self.check_cc(y) {
                    self.pc = self.pop_word(bus);
                    self.wz = self.pc;
                    11
                } else {
                    5
                }
            }
            1 => {
                if q == 0 {
                    // POP rp2
                    let val = self.pop_word(bus);
                    self.set_rp2(p, val);
                    10
                } else {
                    match p {
                        0 => {
                            // RET
                            self.pc = self.pop_word(bus);
                            self.wz = self.pc;
                            10
                        }
                        1 => {
                            self.exx();
                            4
                        }
                        2 => {
                            // JP (HL)
                            self.pc = self.hl;
                            4
                        }
                        _ => {
                            // LD SP,HL
                            self.sp = self.hl;
                            6
                        }
                    }
                }
            }
            2 => {
                // JP cc,nn
                let nn = self.fetch_word(bus);
                self.wz = nn;
                if self.check_cc(y) {
                    self.pc = nn;
                }
                10
            }
            3 => match y {
                0 => {
                    // JP nn
                    let nn = self.fetch_word(bus);
                    self.pc = nn;
                    self.wz = nn;
                    10
                }
                1 => self.execute_cb(bus),
                2 => {
                    // OUT (n),A
                    let n = self.fetch_byte(bus);
                    bus.port_out(n, self.a);
                    self.wz =
                        (u16::from(self.a) << 8) | u16::from(n.wrapping_add(1));
                    11
                }
                3 => {
                    // IN A,(n)
                    let n = self.fetch_byte(bus);
                    self.wz = ((u16::from(self.a) << 8) | u16::from(n)).wrapping_add(1);
                    self.a = bus.port_in(n);
                    11
                }
                4 => {
                    // EX (SP),HL
                    let val = bus.read_word(self.sp);
                    bus.write_word(self.sp, self.hl);
                    self.hl = val;
                    self.wz = val;
                    19
                }
                5 => {
                    self.ex_de_hl();
                    4
                }
                6 => {
                    // DI
                    self.iff1 = false;
                    self.iff2 = false;
                    4
                }
                _ => {
                    // EI: interrupts come on only after the next instruction
                    self.iff_delay = 1;
                    4
                }
            },
            4 => {
                // CALL cc,nn
                let nn = self.fetch_word(bus);
                self.wz = nn;
                if self.check_cc(y) {
                    self.push_word(bus, self.pc);
                    self.pc = nn;
                    17
                } else {
                    10
                }
            }
            5 => {
                if q == 0 {
                    // PUSH rp2
                    let val = self.get_rp2(p);
                    self.push_word(bus, val);
                    11
                } else {
                    match p {
                        0 => {
                            // CALL nn
                            let nn = self.fetch_word(bus);
                            self.wz = nn;
                            self.push_word(bus, self.pc);
                            self.pc = nn;
                            17
                        }
                        1 => self.execute_index(bus, false),
                        2 => self.execute_ed(bus),
                        _ => self.execute_index(bus, true),
                    }
                }
            }
            6 => {
                // ALU n
                let n = self.fetch_byte(bus);
                self.apply_alu(y, n);
                7
            }
            _ => {
                // RST y*8
                let target = u16::from(y) * 8;
                self.push_word(bus, self.pc);
                self.pc = target;
                self.wz = target;
                11
            }
        }
    }

    // ========== CB Prefix ==========

    fn execute_cb(&mut self, bus: &mut Bus) -> u32 {
        self.inc_r();
        let op = self.fetch_byte(bus);
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        match x {
            0 => {
                // Rotate/shift
                let val = self.get_reg8(bus, z);
                let result = self.rotate(y, val);
                self.set_reg8(bus, z, result);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            1 => {
                // BIT y,r
                if z == 6 {
                    let val = bus.read_byte(self.hl);
                    self.wz = self.hl;
                    self.bit(y, val, true);
                    12
                } else {
                    let val = self.get_reg8(bus, z);
                    self.bit(y, val, false);
                    8
                }
            }
            2 => {
                // RES y,r
                let val = self.get_reg8(bus, z) & !(1 << y);
                self.set_reg8(bus, z, val);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
            _ => {
                // SET y,r
                let val = self.get_reg8(bus, z) | (1 << y);
                self.set_reg8(bus, z, val);
                if z == 6 {
                    15
                } else {
                    8
                }
            }
        }
    }

    // ========== ED Prefix ==========

    fn execute_ed(&mut self, bus: &mut Bus) -> u32 {
        self.inc_r();
        let op = self.fetch_byte(bus);
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        if x == 1 {
            match z {
                0 => {
                    // IN r,(C); y == 6 sets flags only
                    let val = bus.port_in(self.c());
                    if y != 6 {
                        self.set_reg8(bus, y, val);
                    }
                    self.f = (self.f & flags::C) | sz53(val);
                    if parity(val) {
                        self.f |= flags::PV;
                    }
                    12
                }
                1 => {
                    // OUT (C),r; y == 6 outputs 0
                    let val = if y == 6 { 0 } else { self.get_reg8(bus, y) };
                    bus.port_out(self.c(), val);
                    12
                }
                2 => {
                    let rhs = self.get_rp(p);
                    if q == 0 {
                        self.sbc16(rhs);
                    } else {
                        self.adc16(rhs);
                    }
                    15
                }
                3 => {
                    // LD (nn),rp / LD rp,(nn)
                    let nn = self.fetch_word(bus);
                    self.wz = nn.wrapping_add(1);
                    if q == 0 {
                        bus.write_word(nn, self.get_rp(p));
                    } else {
                        let val = bus.read_word(nn);
                        self.set_rp(p, val);
                    }
                    20
                }
                4 => {
                    self.neg();
                    8
                }
                5 => {
                    // RETN / RETI: both restore IFF1 from IFF2
                    self.iff1 = self.iff2;
                    self.pc = self.pop_word(bus);
                    self.wz = self.pc;
                    14
                }
                6 => {
                    // IM; the undefined "0/1" rows fall back to mode 0
                    self.im = match y & 0x03 {
                        2 => InterruptMode::Mode1,
                        3 => InterruptMode::Mode2,
                        _ => InterruptMode::Mode0,
                    };
                    8
                }
                _ => match y {
                    0 => {
                        // LD I,A
                        self.i = self.a;
                        9
                    }
                    1 => {
                        // LD R,A
                        self.r = self.a;
                        9
                    }
                    2 => {
                        // LD A,I
                        self.a = self.i;
                        self.ld_a_ir_flags();
                        9
                    }
                    3 => {
                        // LD A,R
                        self.a = self.r;
                        self.ld_a_ir_flags();
                        9
                    }
                    4 => {
                        // RRD
                        let m = bus.read_byte(self.hl);
                        bus.write_byte(self.hl, (self.a << 4) | (m >> 4));
                        self.a = (self.a & 0xF0) | (m & 0x0F);
                        self.rxd_flags();
                        18
                    }
                    5 => {
                        // RLD
                        let m = bus.read_byte(self.hl);
                        bus.write_byte(self.hl, (m << 4) | (self.a & 0x0F));
                        self.a = (self.a & 0xF0) | (m >> 4);
                        self.rxd_flags();
                        18
                    }
                    _ => 8, // ED 77 / ED 7F
                },
            }
        } else if x == 2 && z <= 3 && y >= 4 {
            self.execute_bli(bus, y, z)
        } else {
            // Every other ED page entry is a two-byte NOP
            8
        }
    }

    /// Flags shared by LD A,I and LD A,R; P/V reports IFF2
    fn ld_a_ir_flags(&mut self) {
        self.f = (self.f & flags::C) | sz53(self.a);
        if self.iff2 {
            self.f |= flags::PV;
        }
    }

    /// Flags shared by RRD and RLD
    fn rxd_flags(&mut self) {
        self.wz = self.hl.wrapping_add(1);
        self.f = (self.f & flags::C) | sz53(self.a);
        if parity(self.a) {
            self.f |= flags::PV;
        }
    }

    // ========== Block Instructions ==========

    fn execute_bli(&mut self, bus: &mut Bus, y: u8, z: u8) -> u32 {
        let dec = y & 0x01 == 1; // LDD/CPD/IND/OUTD rows run downward
        let repeat = y >= 6;
        match z {
            0 => {
                // LDI LDD LDIR LDDR
                self.block_ld(bus, dec);
                if repeat && self.bc != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    self.wz = self.pc.wrapping_add(1);
                    21
                } else {
                    16
                }
            }
            1 => {
                // CPI CPD CPIR CPDR
                let found = self.block_cp(bus, dec);
                if repeat && self.bc != 0 && !found {
                    self.pc = self.pc.wrapping_sub(2);
                    self.wz = self.pc.wrapping_add(1);
                    21
                } else {
                    16
                }
            }
            2 => {
                // INI IND INIR INDR
                self.block_in(bus, dec);
                if repeat && self.b() != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
            _ => {
                // OUTI OUTD OTIR OTDR
                self.block_out(bus, dec);
                if repeat && self.b() != 0 {
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }
        }
    }

    fn block_ld(&mut self, bus: &mut Bus, dec: bool) {
        let val = bus.read_byte(self.hl);
        bus.write_byte(self.de, val);
        let step = if dec { 0xFFFFu16 } else { 1 };
        self.hl = self.hl.wrapping_add(step);
        self.de = self.de.wrapping_add(step);
        self.bc = self.bc.wrapping_sub(1);

        // X and Y come from value + A: bit 3 and, oddly, bit 1
        let n = val.wrapping_add(self.a);
        let mut f = self.f & (flags::S | flags::Z | flags::C);
        f |= n & flags::X;
        if n & 0x02 != 0 {
            f |= flags::Y;
        }
        if self.bc != 0 {
            f |= flags::PV;
        }
        self.f = f;
    }

    /// Returns true when the compared byte matched A
    fn block_cp(&mut self, bus: &mut Bus, dec: bool) -> bool {
        let val = bus.read_byte(self.hl);
        let result = self.a.wrapping_sub(val);
        let half = self.a & 0x0F < val & 0x0F;
        let step = if dec { 0xFFFFu16 } else { 1 };
        self.hl = self.hl.wrapping_add(step);
        self.wz = self.wz.wrapping_add(step);
        self.bc = self.bc.wrapping_sub(1);

        let mut f = (self.f & flags::C) | flags::N | (sz53(result) & (flags::S | flags::Z));
        if half {
            f |= flags::H;
        }
        if self.bc != 0 {
            f |= flags::PV;
        }
        let n = result.wrapping_sub(u8::from(half));
        f |= n & flags::X;
        if n & 0x02 != 0 {
            f |= flags::Y;
        }
        self.f = f;
        result == 0
    }

    fn block_in(&mut self, bus: &mut Bus, dec: bool) {
        let val = bus.port_in(self.c());
        bus.write_byte(self.hl, val);
        let step = if dec { 0xFFFFu16 } else { 1 };
        self.wz = self.bc.wrapping_add(step);
        self.hl = self.hl.wrapping_add(step);
        self.set_b(self.b().wrapping_sub(1));

        let c_adj = if dec {
            self.c().wrapping_sub(1)
        } else {
            self.c().wrapping_add(1)
        };
        self.block_io_flags(val, c_adj);
    }

    fn block_out(&mut self, bus: &mut Bus, dec: bool) {
        let val = bus.read_byte(self.hl);
        let step = if dec { 0xFFFFu16 } else { 1 };
        self.hl = self.hl.wrapping_add(step);
        self.set_b(self.b().wrapping_sub(1));
        bus.port_out(self.c(), val);
        self.wz = self.bc.wrapping_add(step);

        self.block_io_flags(val, self.l());
    }

    /// The de-facto block I/O flag rule: S/Z/X/Y track B, N is bit 7 of
    /// the transferred byte, and H/C/P come from `value + adj` overflow
    fn block_io_flags(&mut self, val: u8, adj: u8) {
        let b = self.b();
        let k = u16::from(val) + u16::from(adj);
        let mut f = sz53(b);
        if val & 0x80 != 0 {
            f |= flags::N;
        }
        if k > 0xFF {
            f |= flags::H | flags::C;
        }
        if parity((k as u8 & 0x07) ^ b) {
            f |= flags::PV;
        }
        self.f = f;
    }

    // ========== DD/FD Prefix ==========

    #[inline]
    fn index_reg(&self, use_iy: bool) -> u16 {
        if use_iy {
            self.iy
        } else {
            self.ix
        }
    }

    #[inline]
    fn set_index_reg(&mut self, use_iy: bool, val: u16) {
        if use_iy {
            self.iy = val;
        } else {
            self.ix = val;
        }
    }

    /// 8-bit register by index with H/L replaced by the index halves
    fn get_idx_reg8(&self, bus: &Bus, use_iy: bool, idx: u8) -> u8 {
        match idx {
            4 => (self.index_reg(use_iy) >> 8) as u8,
            5 => self.index_reg(use_iy) as u8,
            _ => self.get_reg8(bus, idx),
        }
    }

    fn set_idx_reg8(&mut self, bus: &mut Bus, use_iy: bool, idx: u8, val: u8) {
        match idx {
            4 => {
                let reg = self.index_reg(use_iy);
                self.set_index_reg(use_iy, (reg & 0x00FF) | (u16::from(val) << 8));
            }
            5 => {
                let reg = self.index_reg(use_iy);
                self.set_index_reg(use_iy, (reg & 0xFF00) | u16::from(val));
            }
            _ => self.set_reg8(bus, idx, val),
        }
    }

    /// Fetch the displacement and form the operand address, recording it
    /// in WZ for the undocumented BIT flags
    fn displaced_addr(&mut self, bus: &Bus, use_iy: bool) -> u16 {
        let d = self.fetch_byte(bus) as i8;
        let addr = self.index_reg(use_iy).wrapping_add(d as i16 as u16);
        self.wz = addr;
        addr
    }

    /// A DD/FD prefix only takes effect when the following opcode
    /// references HL, H, L or (HL). Otherwise the prefix executes as a
    /// 4 T-state NOP and the follower runs on the next step.
    fn index_applies(opcode: u8) -> bool {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        match x {
            0 => match z {
                1 => q == 1 || p == 2, // ADD HL,rp always targets HL
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
                3 => y == 4, // EX (SP),HL
                5 => q == 0 && p == 2,
                _ => false,
            },
        }
    }

    fn execute_index(&mut self, bus: &mut Bus, use_iy: bool) -> u32 {
        let next = bus.read_byte(self.pc);
        match next {
            // Another prefix (or an ED page) supersedes this one; the
            // prefix byte degenerates to a NOP
            0xDD | 0xFD | 0xED => 4,
            0xCB => {
                self.pc = self.pc.wrapping_add(1);
                self.inc_r();
                self.execute_index_cb(bus, use_iy)
            }
            _ if !Self::index_applies(next) => 4,
            _ => {
                self.pc = self.pc.wrapping_add(1);
                self.inc_r();
                self.execute_index_op(bus, use_iy, next)
            }
        }
    }

    fn execute_index_op(&mut self, bus: &mut Bus, use_iy: bool, opcode: u8) -> u32 {
        let x = opcode >> 6;
        let y = (opcode >> 3) & 0x07;
        let z = opcode & 0x07;
        let p = y >> 1;
        let q = y & 0x01;

        match x {
            0 => match z {
                1 => {
                    if q == 0 {
                        // LD IX,nn
                        let nn = self.fetch_word(bus);
                        self.set_index_reg(use_iy, nn);
                        14
                    } else {
                        // ADD IX,rp (rp index 2 names IX itself)
                        let lhs = self.index_reg(use_iy);
                        let rhs = if p == 2 { lhs } else { self.get_rp(p) };
                        let result = self.add16(lhs, rhs);
                        self.set_index_reg(use_iy, result);
                        15
                    }
                }
                2 => {
                    let nn = self.fetch_word(bus);
                    self.wz = nn.wrapping_add(1);
                    if q == 0 {
                        // LD (nn),IX
                        bus.write_word(nn, self.index_reg(use_iy));
                    } else {
                        // LD IX,(nn)
                        let val = bus.read_word(nn);
                        self.set_index_reg(use_iy, val);
                    }
                    20
                }
                3 => {
                    // INC IX / DEC IX
                    let reg = self.index_reg(use_iy);
                    let reg = if q == 0 {
                        reg.wrapping_add(1)
                    } else {
                        reg.wrapping_sub(1)
                    };
                    self.set_index_reg(use_iy, reg);
                    10
                }
                4 | 5 => {
                    if y == 6 {
                        // INC/DEC (IX+d)
                        let addr = self.displaced_addr(bus, use_iy);
                        let val = bus.read_byte(addr);
                        let result = if z == 4 {
                            self.inc8(val)
                        } else {
                            self.dec8(val)
                        };
                        bus.write_byte(addr, result);
                        23
                    } else {
                        // INC/DEC IXH/IXL
                        let val = self.get_idx_reg8(bus, use_iy, y);
                        let result = if z == 4 {
                            self.inc8(val)
                        } else {
                            self.dec8(val)
                        };
                        self.set_idx_reg8(bus, use_iy, y, result);
                        8
                    }
                }
                _ => {
                    // z == 6: LD (IX+d),n or LD IXH/IXL,n
                    if y == 6 {
                        let addr = self.displaced_addr(bus, use_iy);
                        let n = self.fetch_byte(bus);
                        bus.write_byte(addr, n);
                        19
                    } else {
                        let n = self.fetch_byte(bus);
                        self.set_idx_reg8(bus, use_iy, y, n);
                        11
                    }
                }
            },
            1 => {
                if y == 6 {
                    // LD (IX+d),r: the register operand is not remapped
                    let addr = self.displaced_addr(bus, use_iy);
                    let val = self.get_reg8(bus, z);
                    bus.write_byte(addr, val);
                    19
                } else if z == 6 {
                    // LD r,(IX+d)
                    let addr = self.displaced_addr(bus, use_iy);
                    let val = bus.read_byte(addr);
                    self.set_reg8(bus, y, val);
                    19
                } else {
                    // LD with IXH/IXL on both sides
                    let val = self.get_idx_reg8(bus, use_iy, z);
                    self.set_idx_reg8(bus, use_iy, y, val);
                    8
                }
            }
            2 => {
                if z == 6 {
                    // ALU (IX+d)
                    let addr = self.displaced_addr(bus, use_iy);
                    let val = bus.read_byte(addr);
                    self.apply_alu(y, val);
                    19
                } else {
                    // ALU IXH/IXL
                    let val = self.get_idx_reg8(bus, use_iy, z);
                    self.apply_alu(y, val);
                    8
                }
            }
            _ => match z {
                1 => {
                    if q == 0 {
                        // POP IX
                        let val = self.pop_word(bus);
                        self.set_index_reg(use_iy, val);
                        14
                    } else if p == 2 {
                        // JP (IX)
                        self.pc = self.index_reg(use_iy);
                        8
                    } else {
                        // LD SP,IX
                        self.sp = self.index_reg(use_iy);
                        10
                    }
                }
                3 => {
                    // EX (SP),IX
                    let val = bus.read_word(self.sp);
                    bus.write_word(self.sp, self.index_reg(use_iy));
                    self.set_index_reg(use_iy, val);
                    self.wz = val;
                    23
                }
                _ => {
                    // PUSH IX
                    let val = self.index_reg(use_iy);
                    self.push_word(bus, val);
                    15
                }
            },
        }
    }

    /// DD CB d op / FD CB d op: the operation always targets (IX+d); a
    /// non-(HL) register index additionally receives the result
    fn execute_index_cb(&mut self, bus: &mut Bus, use_iy: bool) -> u32 {
        let addr = self.displaced_addr(bus, use_iy);
        let op = self.fetch_byte(bus);
        let x = op >> 6;
        let y = (op >> 3) & 0x07;
        let z = op & 0x07;

        if x == 1 {
            // BIT y,(IX+d): X/Y from the operand address high byte
            let val = bus.read_byte(addr);
            self.bit(y, val, true);
            return 20;
        }

        let val = bus.read_byte(addr);
        let result = match x {
            0 => self.rotate(y, val),
            2 => val & !(1 << y),
            _ => val | (1 << y),
        };
        bus.write_byte(addr, result);
        if z != 6 {
            self.set_reg8(bus, z, result);
        }
        23
    }
}
