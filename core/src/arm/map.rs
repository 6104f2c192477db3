// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! ARM Memory Access Port (Mem-AP) data registers

use crate::arm::register::{ApRegister, ReadableRegister, RegisterDescriptor, WritableRegister};
use crate::register_data_rw;
use core::fmt;

/// Transfer Address Register descriptor (read-write)
pub struct TarRegister;

impl RegisterDescriptor for TarRegister {
    const ADDRESS: u8 = 0x04;
    type Value = Tar;
}

impl ReadableRegister for TarRegister {}
impl WritableRegister for TarRegister {}
impl ApRegister for TarRegister {}

/// Transfer Address Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Tar(u32);

register_data_rw!(Tar);

impl Tar {
    pub fn new(address: u32) -> Self {
        Self(address)
    }

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Data Read/Write Register descriptor (read-write)
pub struct DrwRegister;

impl RegisterDescriptor for DrwRegister {
    const ADDRESS: u8 = 0x0C;
    type Value = Drw;
}

impl ReadableRegister for DrwRegister {}
impl WritableRegister for DrwRegister {}
impl ApRegister for DrwRegister {}

/// Data Read/Write Register data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Drw(u32);

register_data_rw!(Drw);

impl Drw {
    pub fn new(data: u32) -> Self {
        Self(data)
    }

    /// Get raw register value
    pub fn value(&self) -> u32 {
        self.0
    }
}
