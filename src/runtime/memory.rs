use crate::runtime::runtime_error::Fault;

/// Size in bytes of one `POKE`/`PEEK` cell.
pub const CELL: usize = 4;

/// Growable, byte-addressed linear memory.
///
/// Cells are little endian. Integer cells hold the low 32 bits of the stored
/// value and sign-extend on load; float cells hold an IEEE-754 single.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Memory {
    bytes: Vec<u8>,
}

impl Memory {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Append `n` zero bytes and return the previous size.
    pub fn grow(&mut self, n: i64) -> Result<usize, Fault> {
        let extra = usize::try_from(n).map_err(|_| Fault::InvalidGrow(n))?;
        let old = self.bytes.len();
        let new = old.checked_add(extra).ok_or(Fault::InvalidGrow(n))?;
        self.bytes
            .try_reserve_exact(extra)
            .map_err(|_| Fault::InvalidGrow(n))?;
        self.bytes.resize(new, 0);
        Ok(old)
    }

    fn cell(&self, addr: i64) -> Result<std::ops::Range<usize>, Fault> {
        let out_of_bounds = || Fault::OutOfBounds {
            addr,
            len: CELL,
            size: self.bytes.len(),
        };
        let start = usize::try_from(addr).map_err(|_| out_of_bounds())?;
        let end = start.checked_add(CELL).ok_or_else(out_of_bounds)?;
        if end > self.bytes.len() {
            return Err(out_of_bounds());
        }
        Ok(start..end)
    }

    fn read(&self, addr: i64) -> Result<[u8; CELL], Fault> {
        let range = self.cell(addr)?;
        let mut raw = [0u8; CELL];
        raw.copy_from_slice(&self.bytes[range]);
        Ok(raw)
    }

    fn write(&mut self, addr: i64, raw: [u8; CELL]) -> Result<(), Fault> {
        let range = self.cell(addr)?;
        self.bytes[range].copy_from_slice(&raw);
        Ok(())
    }

    pub fn load_int(&self, addr: i64) -> Result<i64, Fault> {
        self.read(addr).map(|raw| i64::from(i32::from_le_bytes(raw)))
    }

    pub fn store_int(&mut self, addr: i64, value: i64) -> Result<(), Fault> {
        self.write(addr, (value as i32).to_le_bytes())
    }

    pub fn load_float(&self, addr: i64) -> Result<f64, Fault> {
        self.read(addr).map(|raw| f64::from(f32::from_le_bytes(raw)))
    }

    pub fn store_float(&mut self, addr: i64, value: f64) -> Result<(), Fault> {
        self.write(addr, (value as f32).to_le_bytes())
    }
}
