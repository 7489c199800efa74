//! Intrinsic scope types: the initial scopes obtainable without splitting
//! from a parent, plus the reserved creation-hint flags carried alongside
//! them.

/// The four scopes a caller can ask for without having split from anything.
///
/// `System` names the whole machine but is never itself constructible as a
/// bound scope (a caller cannot bind outside its own allowed set), so
/// deriving one is rejected rather than silently narrowed to `User`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntrinsicScope {
    System,
    User,
    Job,
    Process,
}

impl IntrinsicScope {
    pub fn to_wire_i32(self) -> i32 {
        match self {
            IntrinsicScope::System => 0,
            IntrinsicScope::User => 1,
            IntrinsicScope::Job => 2,
            IntrinsicScope::Process => 3,
        }
    }

    /// Inverse of [`IntrinsicScope::to_wire_i32`]; unlike `ObjType`'s
    /// tolerant decode, an unrecognized value here is a protocol error
    /// rather than a newer-peer sentinel, since a caller asking for a scope
    /// this peer doesn't recognize cannot be serviced at all.
    pub fn from_wire_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(IntrinsicScope::System),
            1 => Some(IntrinsicScope::User),
            2 => Some(IntrinsicScope::Job),
            3 => Some(IntrinsicScope::Process),
            _ => None,
        }
    }
}

bitflags::bitflags! {
    /// Reserved creation hints for [`IntrinsicScope`] derivation and
    /// `Scope::create`. Unused today — no hint is defined upstream either —
    /// carried purely so the signature doesn't need to change if one is
    /// added later.
    pub struct ScopeCreateHints: u32 {
        const NONE = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_round_trip() {
        for s in [IntrinsicScope::System, IntrinsicScope::User, IntrinsicScope::Job, IntrinsicScope::Process] {
            assert_eq!(IntrinsicScope::from_wire_i32(s.to_wire_i32()), Some(s));
        }
    }

    #[test]
    fn unrecognized_value_is_rejected() {
        assert_eq!(IntrinsicScope::from_wire_i32(99), None);
    }
}
