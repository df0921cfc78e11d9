use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

pub trait Bus {
    fn read_u8(&mut self, addr: u32) -> Result<u8>;
    fn read_u16(&mut self, addr: u32) -> Result<u16>;
    fn read_u32(&mut self, addr: u32) -> Result<u32>;
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<()>;
    fn write_u16(&mut self, addr: u32, val: u16) -> Result<()>;
    fn write_u32(&mut self, addr: u32, val: u32) -> Result<()>;
}

/// Flat little-endian byte memory starting at address 0.
#[derive(Clone, Serialize, Deserialize)]
pub struct LinearMemory {
    pub mem: Vec<u8>,
}

impl LinearMemory {
    pub fn new(size: usize) -> Self {
        Self { mem: vec![0; size] }
    }

    pub fn len(&self) -> usize {
        self.mem.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mem.is_empty()
    }

    fn slice(&self, addr: u32, n: usize) -> Result<&[u8]> {
        let off = addr as usize;
        self.mem
            .get(off..off + n)
            .ok_or_else(|| anyhow!("{n}-byte read at {addr:#06x} outside {} bytes", self.mem.len()))
    }

    fn slice_mut(&mut self, addr: u32, n: usize) -> Result<&mut [u8]> {
        let off = addr as usize;
        let len = self.mem.len();
        self.mem
            .get_mut(off..off + n)
            .ok_or_else(|| anyhow!("{n}-byte write at {addr:#06x} outside {len} bytes"))
    }
}

impl Bus for LinearMemory {
    fn read_u8(&mut self, addr: u32) -> Result<u8> {
        Ok(self.slice(addr, 1)?[0])
    }
    fn read_u16(&mut self, addr: u32) -> Result<u16> {
        let b = self.slice(addr, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }
    fn read_u32(&mut self, addr: u32) -> Result<u32> {
        let b = self.slice(addr, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
    fn write_u8(&mut self, addr: u32, val: u8) -> Result<()> {
        self.slice_mut(addr, 1)?[0] = val;
        Ok(())
    }
    fn write_u16(&mut self, addr: u32, val: u16) -> Result<()> {
        self.slice_mut(addr, 2)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }
    fn write_u32(&mut self, addr: u32, val: u32) -> Result<()> {
        self.slice_mut(addr, 4)?.copy_from_slice(&val.to_le_bytes());
        Ok(())
    }
}
