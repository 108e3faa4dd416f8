/// The value types that may cross the host-function boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValKind {
    I32,
    I64,
}

/// A value crossing the host-function boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WasmVal {
    I32(i32),
    I64(i64),
}

impl WasmVal {
    pub fn kind(&self) -> ValKind {
        match self {
            WasmVal::I32(_) => ValKind::I32,
            WasmVal::I64(_) => ValKind::I64,
        }
    }

    /// The value as i32, accepting an in-range i64.
    pub fn as_i32(&self) -> i32 {
        match self {
            WasmVal::I32(v) => *v,
            WasmVal::I64(v) => *v as i32,
        }
    }

    pub fn as_i64(&self) -> i64 {
        match self {
            WasmVal::I32(v) => *v as i64,
            WasmVal::I64(v) => *v,
        }
    }

    /// The value as an unsigned memory offset.
    pub fn as_ptr(&self) -> u32 {
        self.as_i32() as u32
    }
}

impl From<i32> for WasmVal {
    fn from(v: i32) -> Self {
        WasmVal::I32(v)
    }
}

impl From<i64> for WasmVal {
    fn from(v: i64) -> Self {
        WasmVal::I64(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(WasmVal::from(7i32).as_i64(), 7);
        assert_eq!(WasmVal::from(-1i32).as_ptr(), u32::MAX);
        assert_eq!(WasmVal::from(42i64).as_i32(), 42);
        assert_eq!(WasmVal::I32(5).kind(), ValKind::I32);
    }
}
