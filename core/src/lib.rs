// Copyright (c) 2025 The Project Contributors
//
// MIT License

//! Shared ARM debug register definitions.
//!
//! This crate carries the subset of `vjtag-core`'s ARM register model that
//! the SWD-DMI bridge needs: the Debug Port registers used during bring-up
//! (`IDCODE`, `ABORT`, `CTRL/STAT`, `SELECT`, `RDBUFF`, `TARGETSEL`), the
//! Access Port identification register, and the Mem-AP `TAR`/`DRW` pair used
//! for steady-state DMI traffic. It does not know anything about JTAG, DMI,
//! or any particular target MCU.

#![no_std]

pub mod arm;
