//! Zilog Z80 CPU core.
//!
//! Generic over the bus that provides memory decode, the per-T-state hook
//! and interrupt acknowledgement. The implemented subset covers the load,
//! arithmetic, logic, rotate, jump, call and block-transfer groups with
//! standard T-state costs; opcodes outside the subset execute as logged
//! four-cycle no-ops so a stray fetch can never wedge the machine.

use crate::bus::Bus;
use crate::processor::{Processor, ProcessorState, Register, StopFlag};

const FLAG_C: u8 = 0b0000_0001; // Carry
const FLAG_N: u8 = 0b0000_0010; // Add/subtract
const FLAG_PV: u8 = 0b0000_0100; // Parity/overflow
const FLAG_H: u8 = 0b0001_0000; // Half carry
const FLAG_Z: u8 = 0b0100_0000; // Zero
const FLAG_S: u8 = 0b1000_0000; // Sign

/// Interrupt-accept cost: mode 1 jump to 0x0038.
const INT_ACCEPT_TSTATES: u32 = 13;

pub struct Z80<B: Bus> {
    // Main register file
    pub a: u8,
    pub f: u8,
    pub b: u8,
    pub c: u8,
    pub d: u8,
    pub e: u8,
    pub h: u8,
    pub l: u8,

    // Shadow set
    pub a_alt: u8,
    pub f_alt: u8,
    pub b_alt: u8,
    pub c_alt: u8,
    pub d_alt: u8,
    pub e_alt: u8,
    pub h_alt: u8,
    pub l_alt: u8,

    pub ix: u16,
    pub iy: u16,
    pub i: u8,
    pub r: u8,

    pub sp: u16,
    pub pc: u16,

    pub iff1: bool,
    pub iff2: bool,
    pub im: u8,
    pub halted: bool,

    pub state: ProcessorState,
    pub bus: B,
}

impl<B: Bus> Z80<B> {
    pub fn new(bus: B, cycles_per_second: u64) -> Self {
        Self {
            a: 0,
            f: 0,
            b: 0,
            c: 0,
            d: 0,
            e: 0,
            h: 0,
            l: 0,
            a_alt: 0,
            f_alt: 0,
            b_alt: 0,
            c_alt: 0,
            d_alt: 0,
            e_alt: 0,
            h_alt: 0,
            l_alt: 0,
            ix: 0,
            iy: 0,
            i: 0,
            r: 0,
            sp: 0,
            pc: 0,
            iff1: false,
            iff2: false,
            im: 0,
            halted: false,
            state: ProcessorState::new(cycles_per_second),
            bus,
        }
    }

    fn fetch(&mut self) -> u8 {
        let value = self.bus.read_byte(self.pc);
        self.pc = self.pc.wrapping_add(1);
        self.r = (self.r & 0x80) | (self.r.wrapping_add(1) & 0x7F);
        value
    }

    fn fetch_word(&mut self) -> u16 {
        let lo = self.fetch() as u16;
        let hi = self.fetch() as u16;
        lo | (hi << 8)
    }

    fn push_word(&mut self, value: u16) {
        self.sp = self.sp.wrapping_sub(1);
        self.bus.write_byte(self.sp, (value >> 8) as u8);
        self.sp = self.sp.wrapping_sub(1);
        self.bus.write_byte(self.sp, value as u8);
    }

    fn pop_word(&mut self) -> u16 {
        let lo = self.bus.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        let hi = self.bus.read_byte(self.sp) as u16;
        self.sp = self.sp.wrapping_add(1);
        lo | (hi << 8)
    }

    // Register pairs

    pub fn bc(&self) -> u16 {
        ((self.b as u16) << 8) | self.c as u16
    }

    fn set_bc(&mut self, value: u16) {
        self.b = (value >> 8) as u8;
        self.c = value as u8;
    }

    pub fn de(&self) -> u16 {
        ((self.d as u16) << 8) | self.e as u16
    }

    fn set_de(&mut self, value: u16) {
        self.d = (value >> 8) as u8;
        self.e = value as u8;
    }

    pub fn hl(&self) -> u16 {
        ((self.h as u16) << 8) | self.l as u16
    }

    fn set_hl(&mut self, value: u16) {
        self.h = (value >> 8) as u8;
        self.l = value as u8;
    }

    pub fn af(&self) -> u16 {
        ((self.a as u16) << 8) | self.f as u16
    }

    // Operand decode: 0=B 1=C 2=D 3=E 4=H 5=L 6=(HL) 7=A

    fn reg8(&mut self, index: u8) -> u8 {
        match index {
            0 => self.b,
            1 => self.c,
            2 => self.d,
            3 => self.e,
            4 => self.h,
            5 => self.l,
            6 => {
                let addr = self.hl();
                self.bus.read_byte(addr)
            }
            _ => self.a,
        }
    }

    fn set_reg8(&mut self, index: u8, value: u8) {
        match index {
            0 => self.b = value,
            1 => self.c = value,
            2 => self.d = value,
            3 => self.e = value,
            4 => self.h = value,
            5 => self.l = value,
            6 => {
                let addr = self.hl();
                self.bus.write_byte(addr, value);
            }
            _ => self.a = value,
        }
    }

    // Flags

    fn flag(&self, flag: u8) -> bool {
        self.f & flag != 0
    }

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.f |= flag;
        } else {
            self.f &= !flag;
        }
    }

    fn update_sz(&mut self, value: u8) {
        self.set_flag(FLAG_S, value & 0x80 != 0);
        self.set_flag(FLAG_Z, value == 0);
    }

    fn update_szp(&mut self, value: u8) {
        self.update_sz(value);
        self.set_flag(FLAG_PV, value.count_ones() % 2 == 0);
    }

    /// Condition decode: NZ Z NC C PO PE P M.
    fn condition(&self, code: u8) -> bool {
        match code {
            0 => !self.flag(FLAG_Z),
            1 => self.flag(FLAG_Z),
            2 => !self.flag(FLAG_C),
            3 => self.flag(FLAG_C),
            4 => !self.flag(FLAG_PV),
            5 => self.flag(FLAG_PV),
            6 => !self.flag(FLAG_S),
            _ => self.flag(FLAG_S),
        }
    }

    // ALU

    fn add8(&mut self, value: u8, with_carry: bool) {
        let carry = u8::from(with_carry && self.flag(FLAG_C));
        let result = self.a as u16 + value as u16 + carry as u16;
        let r = result as u8;
        self.set_flag(FLAG_H, (self.a & 0x0F) + (value & 0x0F) + carry > 0x0F);
        self.set_flag(FLAG_C, result > 0xFF);
        self.set_flag(FLAG_PV, (!(self.a ^ value) & (self.a ^ r) & 0x80) != 0);
        self.set_flag(FLAG_N, false);
        self.a = r;
        self.update_sz(r);
    }

    fn sub8(&mut self, value: u8, with_carry: bool) -> u8 {
        let carry = u8::from(with_carry && self.flag(FLAG_C));
        let result = self.a as i16 - value as i16 - carry as i16;
        let r = result as u8;
        self.set_flag(
            FLAG_H,
            (self.a & 0x0F) as i16 - (value & 0x0F) as i16 - (carry as i16) < 0,
        );
        self.set_flag(FLAG_C, result < 0);
        self.set_flag(FLAG_PV, ((self.a ^ value) & (self.a ^ r) & 0x80) != 0);
        self.set_flag(FLAG_N, true);
        self.update_sz(r);
        r
    }

    fn and8(&mut self, value: u8) {
        self.a &= value;
        self.f = FLAG_H;
        self.update_szp(self.a);
    }

    fn xor8(&mut self, value: u8) {
        self.a ^= value;
        self.f = 0;
        self.update_szp(self.a);
    }

    fn or8(&mut self, value: u8) {
        self.a |= value;
        self.f = 0;
        self.update_szp(self.a);
    }

    fn alu(&mut self, operation: u8, value: u8) {
        match operation {
            0 => self.add8(value, false),
            1 => self.add8(value, true),
            2 => {
                let r = self.sub8(value, false);
                self.a = r;
            }
            3 => {
                let r = self.sub8(value, true);
                self.a = r;
            }
            4 => self.and8(value),
            5 => self.xor8(value),
            6 => self.or8(value),
            _ => {
                // CP: compare without storing.
                self.sub8(value, false);
            }
        }
    }

    fn inc8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.set_flag(FLAG_H, value & 0x0F == 0x0F);
        self.set_flag(FLAG_PV, value == 0x7F);
        self.set_flag(FLAG_N, false);
        self.update_sz(result);
        result
    }

    fn dec8(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.set_flag(FLAG_H, value & 0x0F == 0);
        self.set_flag(FLAG_PV, value == 0x80);
        self.set_flag(FLAG_N, true);
        self.update_sz(result);
        result
    }

    fn add_hl(&mut self, value: u16) {
        let hl = self.hl();
        let result = hl as u32 + value as u32;
        self.set_flag(FLAG_H, (hl & 0x0FFF) + (value & 0x0FFF) > 0x0FFF);
        self.set_flag(FLAG_C, result > 0xFFFF);
        self.set_flag(FLAG_N, false);
        self.set_hl(result as u16);
    }

    fn daa(&mut self) {
        let before = self.a;
        let mut correction = 0u8;
        let mut carry = self.flag(FLAG_C);
        if self.flag(FLAG_H) || before & 0x0F > 9 {
            correction |= 0x06;
        }
        if carry || before > 0x99 {
            correction |= 0x60;
            carry = true;
        }
        self.a = if self.flag(FLAG_N) {
            before.wrapping_sub(correction)
        } else {
            before.wrapping_add(correction)
        };
        self.set_flag(FLAG_C, carry);
        self.set_flag(FLAG_H, (before ^ self.a) & 0x10 != 0);
        self.update_szp(self.a);
    }

    // CB-prefix rotate/shift helpers; all set SZP, clear H and N.

    fn rlc8(&mut self, value: u8) -> u8 {
        let result = value.rotate_left(1);
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x80 != 0);
        self.update_szp(result);
        result
    }

    fn rrc8(&mut self, value: u8) -> u8 {
        let result = value.rotate_right(1);
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x01 != 0);
        self.update_szp(result);
        result
    }

    fn rl8(&mut self, value: u8) -> u8 {
        let result = (value << 1) | u8::from(self.flag(FLAG_C));
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x80 != 0);
        self.update_szp(result);
        result
    }

    fn rr8(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (u8::from(self.flag(FLAG_C)) << 7);
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x01 != 0);
        self.update_szp(result);
        result
    }

    fn sla8(&mut self, value: u8) -> u8 {
        let result = value << 1;
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x80 != 0);
        self.update_szp(result);
        result
    }

    fn sra8(&mut self, value: u8) -> u8 {
        let result = (value >> 1) | (value & 0x80);
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x01 != 0);
        self.update_szp(result);
        result
    }

    fn sll8(&mut self, value: u8) -> u8 {
        // Undocumented: shift left with bit 0 set.
        let result = (value << 1) | 0x01;
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x80 != 0);
        self.update_szp(result);
        result
    }

    fn srl8(&mut self, value: u8) -> u8 {
        let result = value >> 1;
        self.f = 0;
        self.set_flag(FLAG_C, value & 0x01 != 0);
        self.update_szp(result);
        result
    }

    fn jr(&mut self, displacement: u8) {
        self.pc = self.pc.wrapping_add(displacement as i8 as u16);
    }

    fn accept_interrupt(&mut self) {
        self.halted = false;
        self.iff1 = false;
        self.iff2 = false;
        let pc = self.pc;
        self.push_word(pc);
        self.pc = 0x0038;
        self.state.cycle(&mut self.bus, INT_ACCEPT_TSTATES);
        self.bus.interrupt_acknowledged(&mut self.state);
    }

    fn step_instruction(&mut self) {
        if self.iff1 && self.state.interrupt_pending() != 0 {
            self.accept_interrupt();
        }
        if self.halted {
            self.state.cycle(&mut self.bus, 4);
            return;
        }
        let opcode = self.fetch();
        let tstates = self.execute(opcode);
        self.state.cycle(&mut self.bus, tstates);
    }

    fn execute(&mut self, opcode: u8) -> u32 {
        match opcode {
            // NOP
            0x00 => 4,

            // LD dd,nn
            0x01 => {
                let value = self.fetch_word();
                self.set_bc(value);
                10
            }
            0x11 => {
                let value = self.fetch_word();
                self.set_de(value);
                10
            }
            0x21 => {
                let value = self.fetch_word();
                self.set_hl(value);
                10
            }
            0x31 => {
                self.sp = self.fetch_word();
                10
            }

            // LD (BC)/(DE),A and LD A,(BC)/(DE)
            0x02 => {
                let addr = self.bc();
                self.bus.write_byte(addr, self.a);
                7
            }
            0x12 => {
                let addr = self.de();
                self.bus.write_byte(addr, self.a);
                7
            }
            0x0A => {
                let addr = self.bc();
                self.a = self.bus.read_byte(addr);
                7
            }
            0x1A => {
                let addr = self.de();
                self.a = self.bus.read_byte(addr);
                7
            }

            // INC/DEC ss
            0x03 => {
                self.set_bc(self.bc().wrapping_add(1));
                6
            }
            0x13 => {
                self.set_de(self.de().wrapping_add(1));
                6
            }
            0x23 => {
                self.set_hl(self.hl().wrapping_add(1));
                6
            }
            0x33 => {
                self.sp = self.sp.wrapping_add(1);
                6
            }
            0x0B => {
                self.set_bc(self.bc().wrapping_sub(1));
                6
            }
            0x1B => {
                self.set_de(self.de().wrapping_sub(1));
                6
            }
            0x2B => {
                self.set_hl(self.hl().wrapping_sub(1));
                6
            }
            0x3B => {
                self.sp = self.sp.wrapping_sub(1);
                6
            }

            // INC r / DEC r
            0x04 | 0x0C | 0x14 | 0x1C | 0x24 | 0x2C | 0x34 | 0x3C => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(index);
                let result = self.inc8(value);
                self.set_reg8(index, result);
                if index == 6 {
                    11
                } else {
                    4
                }
            }
            0x05 | 0x0D | 0x15 | 0x1D | 0x25 | 0x2D | 0x35 | 0x3D => {
                let index = (opcode >> 3) & 7;
                let value = self.reg8(index);
                let result = self.dec8(value);
                self.set_reg8(index, result);
                if index == 6 {
                    11
                } else {
                    4
                }
            }

            // LD r,n
            0x06 | 0x0E | 0x16 | 0x1E | 0x26 | 0x2E | 0x36 | 0x3E => {
                let index = (opcode >> 3) & 7;
                let value = self.fetch();
                self.set_reg8(index, value);
                if index == 6 {
                    10
                } else {
                    7
                }
            }

            // Accumulator rotates
            0x07 => {
                let carry = self.a & 0x80 != 0;
                self.a = self.a.rotate_left(1);
                self.set_flag(FLAG_C, carry);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                4
            }
            0x0F => {
                let carry = self.a & 0x01 != 0;
                self.a = self.a.rotate_right(1);
                self.set_flag(FLAG_C, carry);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                4
            }
            0x17 => {
                let carry = self.a & 0x80 != 0;
                self.a = (self.a << 1) | u8::from(self.flag(FLAG_C));
                self.set_flag(FLAG_C, carry);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                4
            }
            0x1F => {
                let carry = self.a & 0x01 != 0;
                self.a = (self.a >> 1) | (u8::from(self.flag(FLAG_C)) << 7);
                self.set_flag(FLAG_C, carry);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                4
            }

            // EX AF,AF'
            0x08 => {
                std::mem::swap(&mut self.a, &mut self.a_alt);
                std::mem::swap(&mut self.f, &mut self.f_alt);
                4
            }

            // ADD HL,ss
            0x09 => {
                self.add_hl(self.bc());
                11
            }
            0x19 => {
                self.add_hl(self.de());
                11
            }
            0x29 => {
                self.add_hl(self.hl());
                11
            }
            0x39 => {
                self.add_hl(self.sp);
                11
            }

            // DJNZ / JR / JR cc
            0x10 => {
                let displacement = self.fetch();
                self.b = self.b.wrapping_sub(1);
                if self.b != 0 {
                    self.jr(displacement);
                    13
                } else {
                    8
                }
            }
            0x18 => {
                let displacement = self.fetch();
                self.jr(displacement);
                12
            }
            0x20 | 0x28 | 0x30 | 0x38 => {
                let displacement = self.fetch();
                if self.condition((opcode >> 3) & 3) {
                    self.jr(displacement);
                    12
                } else {
                    7
                }
            }

            // Direct loads
            0x22 => {
                let addr = self.fetch_word();
                let hl = self.hl();
                self.bus.write_word(addr, hl);
                16
            }
            0x2A => {
                let addr = self.fetch_word();
                let value = self.bus.read_word(addr);
                self.set_hl(value);
                16
            }
            0x32 => {
                let addr = self.fetch_word();
                self.bus.write_byte(addr, self.a);
                13
            }
            0x3A => {
                let addr = self.fetch_word();
                self.a = self.bus.read_byte(addr);
                13
            }

            0x27 => {
                self.daa();
                4
            }
            0x2F => {
                self.a = !self.a;
                self.set_flag(FLAG_H, true);
                self.set_flag(FLAG_N, true);
                4
            }
            0x37 => {
                self.set_flag(FLAG_C, true);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                4
            }
            0x3F => {
                let carry = self.flag(FLAG_C);
                self.set_flag(FLAG_H, carry);
                self.set_flag(FLAG_C, !carry);
                self.set_flag(FLAG_N, false);
                4
            }

            // HALT sits in the middle of the LD block.
            0x76 => {
                self.halted = true;
                4
            }

            // LD r,r'
            0x40..=0x7F => {
                let src = opcode & 7;
                let dst = (opcode >> 3) & 7;
                let value = self.reg8(src);
                self.set_reg8(dst, value);
                if src == 6 || dst == 6 {
                    7
                } else {
                    4
                }
            }

            // ALU A,r
            0x80..=0xBF => {
                let index = opcode & 7;
                let value = self.reg8(index);
                self.alu((opcode >> 3) & 7, value);
                if index == 6 {
                    7
                } else {
                    4
                }
            }

            // RET cc / RET
            0xC0 | 0xC8 | 0xD0 | 0xD8 | 0xE0 | 0xE8 | 0xF0 | 0xF8 => {
                if self.condition((opcode >> 3) & 7) {
                    self.pc = self.pop_word();
                    11
                } else {
                    5
                }
            }
            0xC9 => {
                self.pc = self.pop_word();
                10
            }

            // POP / PUSH
            0xC1 => {
                let value = self.pop_word();
                self.set_bc(value);
                10
            }
            0xD1 => {
                let value = self.pop_word();
                self.set_de(value);
                10
            }
            0xE1 => {
                let value = self.pop_word();
                self.set_hl(value);
                10
            }
            0xF1 => {
                let value = self.pop_word();
                self.a = (value >> 8) as u8;
                self.f = value as u8;
                10
            }
            0xC5 => {
                let value = self.bc();
                self.push_word(value);
                11
            }
            0xD5 => {
                let value = self.de();
                self.push_word(value);
                11
            }
            0xE5 => {
                let value = self.hl();
                self.push_word(value);
                11
            }
            0xF5 => {
                let value = self.af();
                self.push_word(value);
                11
            }

            // JP / JP cc
            0xC3 => {
                self.pc = self.fetch_word();
                10
            }
            0xC2 | 0xCA | 0xD2 | 0xDA | 0xE2 | 0xEA | 0xF2 | 0xFA => {
                let target = self.fetch_word();
                if self.condition((opcode >> 3) & 7) {
                    self.pc = target;
                }
                10
            }

            // CALL / CALL cc
            0xCD => {
                let target = self.fetch_word();
                let ret = self.pc;
                self.push_word(ret);
                self.pc = target;
                17
            }
            0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                let target = self.fetch_word();
                if self.condition((opcode >> 3) & 7) {
                    let ret = self.pc;
                    self.push_word(ret);
                    self.pc = target;
                    17
                } else {
                    10
                }
            }

            // RST p
            0xC7 | 0xCF | 0xD7 | 0xDF | 0xE7 | 0xEF | 0xF7 | 0xFF => {
                let ret = self.pc;
                self.push_word(ret);
                self.pc = (opcode & 0x38) as u16;
                11
            }

            // ALU A,n
            0xC6 | 0xCE | 0xD6 | 0xDE | 0xE6 | 0xEE | 0xF6 | 0xFE => {
                let value = self.fetch();
                self.alu((opcode >> 3) & 7, value);
                7
            }

            // Exchanges and HL jumps
            0xD9 => {
                std::mem::swap(&mut self.b, &mut self.b_alt);
                std::mem::swap(&mut self.c, &mut self.c_alt);
                std::mem::swap(&mut self.d, &mut self.d_alt);
                std::mem::swap(&mut self.e, &mut self.e_alt);
                std::mem::swap(&mut self.h, &mut self.h_alt);
                std::mem::swap(&mut self.l, &mut self.l_alt);
                4
            }
            0xEB => {
                let de = self.de();
                let hl = self.hl();
                self.set_de(hl);
                self.set_hl(de);
                4
            }
            0xE3 => {
                let sp = self.sp;
                let stacked = self.bus.read_word(sp);
                let hl = self.hl();
                self.bus.write_word(sp, hl);
                self.set_hl(stacked);
                19
            }
            0xE9 => {
                self.pc = self.hl();
                4
            }
            0xF9 => {
                self.sp = self.hl();
                6
            }

            // I/O through the port bus
            0xDB => {
                let port = ((self.a as u16) << 8) | self.fetch() as u16;
                self.a = self.state.input(port);
                11
            }
            0xD3 => {
                let port = ((self.a as u16) << 8) | self.fetch() as u16;
                let value = self.a;
                self.state.output(port, value);
                11
            }

            // Interrupt enables
            0xF3 => {
                self.iff1 = false;
                self.iff2 = false;
                4
            }
            0xFB => {
                self.iff1 = true;
                self.iff2 = true;
                4
            }

            0xCB => self.execute_cb(),
            0xED => self.execute_ed(),

            // IX/IY prefixes are outside the implemented subset.
            0xDD | 0xFD => {
                log::debug!(
                    "unimplemented index prefix {:#04x} at {:#06x}",
                    opcode,
                    self.pc
                );
                4
            }
        }
    }

    fn execute_cb(&mut self) -> u32 {
        let opcode = self.fetch();
        let index = opcode & 7;
        let bit = (opcode >> 3) & 7;
        let value = self.reg8(index);
        match opcode >> 6 {
            0 => {
                let result = match bit {
                    0 => self.rlc8(value),
                    1 => self.rrc8(value),
                    2 => self.rl8(value),
                    3 => self.rr8(value),
                    4 => self.sla8(value),
                    5 => self.sra8(value),
                    6 => self.sll8(value),
                    _ => self.srl8(value),
                };
                self.set_reg8(index, result);
            }
            1 => {
                let set = value & (1 << bit) != 0;
                self.set_flag(FLAG_Z, !set);
                self.set_flag(FLAG_PV, !set);
                self.set_flag(FLAG_S, bit == 7 && set);
                self.set_flag(FLAG_H, true);
                self.set_flag(FLAG_N, false);
            }
            2 => self.set_reg8(index, value & !(1 << bit)),
            _ => self.set_reg8(index, value | (1 << bit)),
        }
        if index == 6 {
            if opcode >> 6 == 1 {
                12
            } else {
                15
            }
        } else {
            8
        }
    }

    fn execute_ed(&mut self) -> u32 {
        let opcode = self.fetch();
        match opcode {
            // NEG
            0x44 => {
                let value = self.a;
                self.a = 0;
                let result = self.sub8(value, false);
                self.a = result;
                8
            }

            // RETN / RETI
            0x45 | 0x55 | 0x65 | 0x75 | 0x4D | 0x5D | 0x6D | 0x7D => {
                self.pc = self.pop_word();
                self.iff1 = self.iff2;
                14
            }

            // IM 0/1/2
            0x46 | 0x66 => {
                self.im = 0;
                8
            }
            0x56 | 0x76 => {
                self.im = 1;
                8
            }
            0x5E | 0x7E => {
                self.im = 2;
                8
            }

            // Interrupt/refresh register transfers
            0x47 => {
                self.i = self.a;
                9
            }
            0x4F => {
                self.r = self.a;
                9
            }
            0x57 => {
                self.a = self.i;
                let a = self.a;
                self.update_sz(a);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                let iff2 = self.iff2;
                self.set_flag(FLAG_PV, iff2);
                9
            }
            0x5F => {
                self.a = self.r;
                let a = self.a;
                self.update_sz(a);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                let iff2 = self.iff2;
                self.set_flag(FLAG_PV, iff2);
                9
            }

            // Block transfers: LDI / LDD / LDIR / LDDR
            0xA0 | 0xA8 | 0xB0 | 0xB8 => {
                let hl = self.hl();
                let de = self.de();
                let value = self.bus.read_byte(hl);
                self.bus.write_byte(de, value);
                if opcode & 0x08 == 0 {
                    self.set_hl(hl.wrapping_add(1));
                    self.set_de(de.wrapping_add(1));
                } else {
                    self.set_hl(hl.wrapping_sub(1));
                    self.set_de(de.wrapping_sub(1));
                }
                let bc = self.bc().wrapping_sub(1);
                self.set_bc(bc);
                self.set_flag(FLAG_H, false);
                self.set_flag(FLAG_N, false);
                self.set_flag(FLAG_PV, bc != 0);
                if opcode & 0x10 != 0 && bc != 0 {
                    // Repeat form: rewind over the ED prefix.
                    self.pc = self.pc.wrapping_sub(2);
                    21
                } else {
                    16
                }
            }

            _ => {
                log::debug!("unimplemented ED opcode {:#04x} at {:#06x}", opcode, self.pc);
                8
            }
        }
    }
}

impl<B: Bus> Processor for Z80<B> {
    fn step(&mut self) {
        self.step_instruction();
    }

    fn step_over(&mut self) {
        let opcode = self.bus.read_byte(self.pc);
        let resume = match opcode {
            0xCD | 0xC4 | 0xCC | 0xD4 | 0xDC | 0xE4 | 0xEC | 0xF4 | 0xFC => {
                Some(self.pc.wrapping_add(3))
            }
            op if op & 0xC7 == 0xC7 => Some(self.pc.wrapping_add(1)),
            _ => None,
        };
        match resume {
            Some(address) => self.run_to(address),
            None => self.step_instruction(),
        }
    }

    fn run(&mut self) {
        self.state.stop().clear();
        loop {
            self.step_instruction();
            if self.state.stop_requested() {
                break;
            }
        }
    }

    fn run_to(&mut self, address: u16) {
        self.state.stop().clear();
        loop {
            self.step_instruction();
            if self.state.stop_requested() || self.pc == address {
                break;
            }
        }
    }

    fn reset(&mut self) {
        self.a = 0;
        self.f = 0;
        self.b = 0;
        self.c = 0;
        self.d = 0;
        self.e = 0;
        self.h = 0;
        self.l = 0;
        self.ix = 0;
        self.iy = 0;
        self.i = 0;
        self.r = 0;
        self.sp = 0;
        self.pc = 0;
        self.iff1 = false;
        self.iff2 = false;
        self.im = 0;
        self.halted = false;
        self.state.clear_interrupt(0xFF);
        self.state.reset();
    }

    fn stop_flag(&self) -> StopFlag {
        self.state.stop()
    }

    fn cycles(&self) -> u64 {
        self.state.cycles()
    }

    fn cycles_per_second(&self) -> u64 {
        self.state.cycles_per_second()
    }

    fn set_cycles_per_second(&mut self, value: u64) {
        self.state.set_cycles_per_second(value);
    }

    fn program_counter(&self) -> u16 {
        self.pc
    }

    fn set_program_counter(&mut self, value: u16) {
        self.pc = value;
    }

    fn set_interrupt(&mut self, mask: u8) {
        self.state.set_interrupt(mask);
    }

    fn clear_interrupt(&mut self, mask: u8) {
        self.state.clear_interrupt(mask);
    }

    fn registers(&self) -> Vec<Register> {
        vec![
            Register {
                name: "AF",
                bits: 16,
                value: self.af(),
            },
            Register {
                name: "BC",
                bits: 16,
                value: self.bc(),
            },
            Register {
                name: "DE",
                bits: 16,
                value: self.de(),
            },
            Register {
                name: "HL",
                bits: 16,
                value: self.hl(),
            },
            Register {
                name: "IX",
                bits: 16,
                value: self.ix,
            },
            Register {
                name: "IY",
                bits: 16,
                value: self.iy,
            },
            Register {
                name: "SP",
                bits: 16,
                value: self.sp,
            },
            Register {
                name: "PC",
                bits: 16,
                value: self.pc,
            },
            Register {
                name: "I",
                bits: 8,
                value: self.i as u16,
            },
            Register {
                name: "R",
                bits: 8,
                value: self.r as u16,
            },
            Register {
                name: "IM",
                bits: 8,
                value: self.im as u16,
            },
            Register {
                name: "IFF1",
                bits: 1,
                value: u16::from(self.iff1),
            },
        ]
    }
}
