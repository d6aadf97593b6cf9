//! Memory and I/O port bus interface for the 8086 core.
//!
//! The CPU owns no memory of its own. A system embedding the core supplies
//! an implementation of [`Bus`] covering the 1 MiB linear address space,
//! the 64 KiB port space, and the interrupt-service hook used by `INT`.

/// Linear address mask for the 20-bit (1 MiB) address space.
pub const ADDR_MASK: u32 = 0xF_FFFF;

/// Capability set the CPU requires from its host system.
///
/// Word accesses are little-endian; the default implementations compose
/// them from the byte operations and wrap at the top of the address space.
pub trait Bus {
    /// Read a byte from the linear address space.
    fn mem_read_8(&self, addr: u32) -> u8;

    /// Write a byte to the linear address space.
    fn mem_write_8(&mut self, addr: u32, val: u8);

    /// Read a little-endian word from the linear address space.
    fn mem_read_16(&self, addr: u32) -> u16 {
        let lo = self.mem_read_8(addr) as u16;
        let hi = self.mem_read_8(addr.wrapping_add(1) & ADDR_MASK) as u16;
        (hi << 8) | lo
    }

    /// Write a little-endian word to the linear address space.
    fn mem_write_16(&mut self, addr: u32, val: u16) {
        self.mem_write_8(addr, (val & 0xFF) as u8);
        self.mem_write_8(addr.wrapping_add(1) & ADDR_MASK, (val >> 8) as u8);
    }

    /// Read a byte from an I/O port.
    fn port_read_8(&mut self, port: u16) -> u8;

    /// Write a byte to an I/O port.
    fn port_write_8(&mut self, port: u16, val: u8);

    /// Read a little-endian word from consecutive I/O ports.
    fn port_read_16(&mut self, port: u16) -> u16 {
        let lo = self.port_read_8(port) as u16;
        let hi = self.port_read_8(port.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// Write a little-endian word to consecutive I/O ports.
    fn port_write_16(&mut self, port: u16, val: u16) {
        self.port_write_8(port, (val & 0xFF) as u8);
        self.port_write_8(port.wrapping_add(1), (val >> 8) as u8);
    }

    /// Run the host's interrupt-service mechanism for the given vector.
    ///
    /// The core does not build interrupt stack frames or consult a vector
    /// table itself; `INT n` and `INT3` delegate here.
    fn int_call(&mut self, vector: u8);
}

/// Flat 1 MiB memory with a port latch array, for tests and benchmarks.
///
/// Port writes are latched and read back; `int_call` vectors are recorded
/// so tests can assert on interrupt delivery.
pub struct FlatBus {
    mem: Vec<u8>,
    ports: Vec<u8>,
    /// Vectors passed to `int_call`, oldest first.
    pub raised: Vec<u8>,
}

impl FlatBus {
    pub fn new() -> Self {
        Self {
            mem: vec![0; (ADDR_MASK as usize) + 1],
            ports: vec![0; 0x10000],
            raised: Vec::new(),
        }
    }

    /// Copy a blob of bytes into memory at a linear address.
    pub fn load(&mut self, addr: u32, bytes: &[u8]) {
        for (i, &b) in bytes.iter().enumerate() {
            let a = (addr as usize + i) & ADDR_MASK as usize;
            self.mem[a] = b;
        }
    }
}

impl Default for FlatBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for FlatBus {
    fn mem_read_8(&self, addr: u32) -> u8 {
        self.mem[(addr & ADDR_MASK) as usize]
    }

    fn mem_write_8(&mut self, addr: u32, val: u8) {
        self.mem[(addr & ADDR_MASK) as usize] = val;
    }

    fn port_read_8(&mut self, port: u16) -> u8 {
        self.ports[port as usize]
    }

    fn port_write_8(&mut self, port: u16, val: u8) {
        self.ports[port as usize] = val;
    }

    fn int_call(&mut self, vector: u8) {
        self.raised.push(vector);
    }
}
