//! Core value types shared across the parser: SCNs and transaction ids.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A System Change Number: a 48/64-bit strictly monotonic commit-ordering
/// identifier. Stored widened to 64 bits; the on-disk encoding is a 32-bit
/// low part plus a 16-bit middle part, reassembled by the vector decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Scn(pub u64);

impl Scn {
    pub const ZERO: Scn = Scn(0);

    /// Reassemble a 48-bit SCN from its on-disk low32 + mid16 halves.
    pub fn from_parts(low: u32, mid: u16) -> Self {
        Scn(((mid as u64) << 32) | low as u64)
    }
}

impl fmt::Display for Scn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction identifier: `(usn:16, slt:16, sqn:32)` packed into 64 bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Xid {
    pub usn: u16,
    pub slt: u16,
    pub sqn: u32,
}

impl Xid {
    pub const ZERO: Xid = Xid { usn: 0, slt: 0, sqn: 0 };

    pub fn new(usn: u16, slt: u16, sqn: u32) -> Self {
        Xid { usn, slt, sqn }
    }

    /// The "parent" xid used when only USN/SLT is known, e.g. when matching
    /// a partial-rollback vector that did not carry a full sqn.
    pub fn parent(&self) -> Xid {
        Xid { usn: self.usn, slt: self.slt, sqn: 0 }
    }

    pub fn is_zero(&self) -> bool {
        self.usn == 0 && self.slt == 0 && self.sqn == 0
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.usn, self.slt, self.sqn)
    }
}

/// A 10-byte large-object identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LobId(pub [u8; 10]);

impl fmt::Display for LobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Data-block address: file-relative block locator for a row (`dba`), or
/// the "base dba" of a row's containing block (`bdba`). Both share the
/// same on-disk 4-byte encoding.
pub type Dba = u32;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scn_from_parts_reassembles_low_and_mid() {
        let scn = Scn::from_parts(0x1234_5678, 0x0001);
        assert_eq!(scn.0, (0x0001u64 << 32) | 0x1234_5678);
    }

    #[test]
    fn xid_parent_zeroes_sqn() {
        let xid = Xid::new(1, 2, 3);
        assert_eq!(xid.parent(), Xid::new(1, 2, 0));
    }

    #[test]
    fn xid_zero_detection() {
        assert!(Xid::ZERO.is_zero());
        assert!(!Xid::new(0, 0, 1).is_zero());
    }
}
