// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! ARM Generic Access Port Registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor};
use crate::register_data_r;
use core::fmt;

/// Access Port Identification Register descriptor
pub struct IdrRegister;

impl RegisterDescriptor for IdrRegister {
    const ADDRESS: u8 = 0xFC;
    type Value = Idr;
}

impl ReadableRegister for IdrRegister {}
impl ApRegister for IdrRegister {}

// Standard register data impls
register_data_r!(Idr);

/// Access Port Identification Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Idr(u32);

impl Idr {
    const CLASS_MASK: u32 = 0xF;
    const CLASS_SHIFT: u32 = 13;

    const TYPE_MASK: u32 = 0xF;
    const TYPE_SHIFT: u32 = 0;

    /// Memory Access Port
    pub const CLASS_MEM_AP: u32 = 0x8;

    pub const AP_TYPE_AMBA_APB2_3: u32 = 0x2;

    /// Create a new IDR from a raw value
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Get class field (bits 16:13)
    pub fn class(&self) -> u32 {
        (self.0 >> Self::CLASS_SHIFT) & Self::CLASS_MASK
    }

    /// Get AP type field (bits 3:0)
    pub fn ap_type(&self) -> u32 {
        (self.0 >> Self::TYPE_SHIFT) & Self::TYPE_MASK
    }

    /// True if this IDR describes a Mem-AP of the APB2/APB3 variety — the
    /// only AP type this bridge knows how to talk to.
    pub fn is_apb_mem_ap(&self) -> bool {
        self.class() == Self::CLASS_MEM_AP && self.ap_type() == Self::AP_TYPE_AMBA_APB2_3
    }
}
