// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! ARM Debug Port Registers

use crate::arm::register::{DpRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::{register_data_r, register_data_rw, register_data_w};
use core::fmt;

/// IDCODE Register descriptor (read-only)
pub struct IdCodeRegister;

impl RegisterDescriptor for IdCodeRegister {
    const ADDRESS: u8 = 0x00;
    type Value = IdCode;
}

impl ReadableRegister for IdCodeRegister {}
impl DpRegister for IdCodeRegister {}

/// ARM Debug Port IDCODE register data (DPIDR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IdCode(u32);

register_data_r!(IdCode);

impl IdCode {
    pub const fn new(value: u32) -> Self {
        IdCode(value)
    }

    pub fn data(&self) -> u32 {
        self.0
    }

    /// Check if LSB is set (should always be 1 for valid IDCODE)
    pub fn is_valid(&self) -> bool {
        (self.0 & 1) == 1
    }
}

/// ABORT Register descriptor (write-only)
pub struct AbortRegister;

impl RegisterDescriptor for AbortRegister {
    const ADDRESS: u8 = 0x00;
    type Value = Abort;
}

impl WritableRegister for AbortRegister {}
impl DpRegister for AbortRegister {}

/// ARM Debug Port ABORT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Abort(u32);

register_data_w!(Abort);

impl Abort {
    const STKCMPCLR: u32 = 1 << 1;
    const STKERRCLR: u32 = 1 << 2;
    const WDERRCLR: u32 = 1 << 3;
    const ORUNERRCLR: u32 = 1 << 4;

    /// All four sticky error clear bits set (matches the connect sequence's
    /// `ABORT = 0x1E`).
    pub const CLEAR_ALL: Abort = Abort(Self::STKCMPCLR | Self::STKERRCLR | Self::WDERRCLR | Self::ORUNERRCLR);
}

/// CTRL/STAT Register descriptor (read-write)
pub struct CtrlStatRegister;

impl RegisterDescriptor for CtrlStatRegister {
    const ADDRESS: u8 = 0x04;
    type Value = CtrlStat;
}

impl ReadableRegister for CtrlStatRegister {}
impl WritableRegister for CtrlStatRegister {}
impl DpRegister for CtrlStatRegister {}

/// ARM Debug Port CTRL/STAT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CtrlStat(u32);

register_data_rw!(CtrlStat);

impl CtrlStat {
    const ORUNDETECT: u32 = 1 << 0;
    const CDBGPWRUPREQ: u32 = 1 << 28;
    const CDBGPWRUPACK: u32 = 1 << 29;
    const CSYSPWRUPREQ: u32 = 1 << 30;
    const CSYSPWRUPACK: u32 = 1 << 31;

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Get debug power-up acknowledge
    pub fn cdbgpwrupack(&self) -> bool {
        self.0 & Self::CDBGPWRUPACK != 0
    }

    /// Get system power-up acknowledge
    pub fn csyspwrupack(&self) -> bool {
        self.0 & Self::CSYSPWRUPACK != 0
    }

    /// Set overrun detection enable
    pub fn set_orundetect(&mut self, enable: bool) {
        if enable {
            self.0 |= Self::ORUNDETECT;
        } else {
            self.0 &= !Self::ORUNDETECT;
        }
    }

    /// Set debug power-up request
    pub fn set_cdbgpwrupreq(&mut self, enable: bool) {
        if enable {
            self.0 |= Self::CDBGPWRUPREQ;
        } else {
            self.0 &= !Self::CDBGPWRUPREQ;
        }
    }

    /// Set system power-up request
    pub fn set_csyspwrupreq(&mut self, enable: bool) {
        if enable {
            self.0 |= Self::CSYSPWRUPREQ;
        } else {
            self.0 &= !Self::CSYSPWRUPREQ;
        }
    }
}

/// SELECT Register descriptor (read-write)
pub struct SelectRegister;

impl RegisterDescriptor for SelectRegister {
    const ADDRESS: u8 = 0x08;
    type Value = Select;
}

impl ReadableRegister for SelectRegister {}
impl WritableRegister for SelectRegister {}
impl DpRegister for SelectRegister {}

/// ARM Debug Port SELECT register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Select(u32);

register_data_rw!(Select);

impl Select {
    const APSEL_MASK: u32 = 0xFF;
    const APSEL_SHIFT: u32 = 24;

    pub const DPBANKSEL_MASK: u32 = 0xF;
    pub const DPBANKSEL_SHIFT: u32 = 0;

    pub const APBANKSEL_MASK: u32 = 0xF;
    pub const APBANKSEL_SHIFT: u32 = 4;

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Set access port select
    pub fn set_apsel(&mut self, apsel: u8) {
        let apsel = apsel as u32;
        self.0 = (self.0 & !(Self::APSEL_MASK << Self::APSEL_SHIFT))
            | ((apsel & Self::APSEL_MASK) << Self::APSEL_SHIFT);
    }

    /// Set DP bank select
    pub fn set_dpbanksel(&mut self, banksel: u8) {
        let banksel = banksel as u32;
        self.0 = (self.0 & !(Self::DPBANKSEL_MASK << Self::DPBANKSEL_SHIFT))
            | ((banksel & Self::DPBANKSEL_MASK) << Self::DPBANKSEL_SHIFT);
    }

    /// Set AP bank select
    pub fn set_apbanksel(&mut self, banksel: u8) {
        let banksel = banksel as u32;
        self.0 = (self.0 & !(Self::APBANKSEL_MASK << Self::APBANKSEL_SHIFT))
            | ((banksel & Self::APBANKSEL_MASK) << Self::APBANKSEL_SHIFT);
    }

    /// Set DP bank select from a register address byte (bank in bits 7:4)
    pub fn set_dpbanksel_from_addr(&mut self, addr: u8) {
        self.set_dpbanksel((addr >> 4) & 0xF);
    }

    /// Set AP bank select from a register address byte (bank in bits 7:4)
    pub fn set_apbanksel_from_addr(&mut self, addr: u8) {
        self.set_apbanksel((addr >> 4) & 0xF);
    }
}

/// RDBUFF Register descriptor (read-only)
pub struct RdBuffRegister;

impl RegisterDescriptor for RdBuffRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = RdBuff;
}

impl ReadableRegister for RdBuffRegister {}
impl DpRegister for RdBuffRegister {}

/// ARM Debug Port RDBUFF register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RdBuff(u32);

register_data_r!(RdBuff);

impl RdBuff {
    /// Get the buffered data
    pub fn data(&self) -> u32 {
        self.0
    }
}

/// TARGETSEL Register descriptor (write-only, DPv2). Shares address 0x0C
/// with RDBUFF: SWD distinguishes them by read/write direction, not address.
pub struct TargetSelRegister;

impl RegisterDescriptor for TargetSelRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = TargetSel;
}

impl WritableRegister for TargetSelRegister {}
impl DpRegister for TargetSelRegister {}

/// ARM Debug Port TARGETSEL register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetSel(u32);

register_data_w!(TargetSel);

impl TargetSel {
    pub const fn new(value: u32) -> Self {
        TargetSel(value)
    }

    /// Get the buffered data
    pub fn data(&self) -> u32 {
        self.0
    }
}
