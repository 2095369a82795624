//! Lock modes, their compatibility matrix, and the upgrade lattice.

/// Multi-granularity lock modes.
///
/// Intention modes are taken on a table to announce locks on records below
/// it: `IntentionShared` for record reads, `IntentionExclusive` for record
/// writes. `SharedIntentionExclusive` combines a table-wide read with the
/// intent to write individual records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// IS: intent to take shared locks on records of this table.
    IntentionShared,
    /// IX: intent to take exclusive locks on records of this table.
    IntentionExclusive,
    /// S: shared lock on the whole object.
    Shared,
    /// SIX: shared lock on the table plus intent to write records.
    SharedIntentionExclusive,
    /// X: exclusive lock on the whole object.
    Exclusive,
}

impl LockMode {
    /// Returns whether two modes held by *different* transactions can
    /// coexist on the same object.
    ///
    /// ```text
    /// held\req  IS   IX   S    SIX  X
    /// IS        ok   ok   ok   ok   -
    /// IX        ok   ok   -    -    -
    /// S         ok   -    ok   -    -
    /// SIX       ok   -    -    -    -
    /// X         -    -    -    -    -
    /// ```
    pub fn compatible_with(self, other: LockMode) -> bool {
        use LockMode::*;
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => false,
            (IntentionShared, _) | (_, IntentionShared) => true,
            (IntentionExclusive, IntentionExclusive) => true,
            (IntentionExclusive, _) | (_, IntentionExclusive) => false,
            (Shared, Shared) => true,
            (Shared, SharedIntentionExclusive) | (SharedIntentionExclusive, Shared) => false,
            (SharedIntentionExclusive, SharedIntentionExclusive) => false,
        }
    }

    /// Combines a held mode with a newly requested mode on the same table
    /// (the least upper bound in the upgrade lattice).
    ///
    /// ```text
    ///        X
    ///        |
    ///       SIX
    ///      /   \
    ///     S     IX
    ///      \   /
    ///       IS
    /// ```
    pub fn join(self, other: LockMode) -> LockMode {
        use LockMode::*;
        match (self, other) {
            (Exclusive, _) | (_, Exclusive) => Exclusive,
            (SharedIntentionExclusive, _) | (_, SharedIntentionExclusive) => {
                SharedIntentionExclusive
            }
            (Shared, IntentionExclusive) | (IntentionExclusive, Shared) => {
                SharedIntentionExclusive
            }
            (Shared, _) | (_, Shared) => Shared,
            (IntentionExclusive, _) | (_, IntentionExclusive) => IntentionExclusive,
            (IntentionShared, IntentionShared) => IntentionShared,
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LockMode::IntentionShared => "IS",
            LockMode::IntentionExclusive => "IX",
            LockMode::Shared => "S",
            LockMode::SharedIntentionExclusive => "SIX",
            LockMode::Exclusive => "X",
        };
        write!(f, "{}", s)
    }
}

#[cfg(test)]
mod tests {
    use super::LockMode::*;
    use super::*;

    const ALL: [LockMode; 5] = [
        IntentionShared,
        IntentionExclusive,
        Shared,
        SharedIntentionExclusive,
        Exclusive,
    ];

    #[test]
    fn test_compatibility_matrix() {
        // Rows = held, columns = requested, in IS/IX/S/SIX/X order
        let expected = [
            [true, true, true, true, false],    // IS
            [true, true, false, false, false],  // IX
            [true, false, true, false, false],  // S
            [true, false, false, false, false], // SIX
            [false, false, false, false, false], // X
        ];
        for (i, held) in ALL.iter().enumerate() {
            for (j, requested) in ALL.iter().enumerate() {
                assert_eq!(
                    held.compatible_with(*requested),
                    expected[i][j],
                    "held {} requested {}",
                    held,
                    requested
                );
            }
        }
    }

    #[test]
    fn test_compatibility_is_symmetric() {
        for a in ALL {
            for b in ALL {
                assert_eq!(a.compatible_with(b), b.compatible_with(a));
            }
        }
    }

    #[test]
    fn test_join_lattice() {
        assert_eq!(IntentionShared.join(Shared), Shared);
        assert_eq!(IntentionShared.join(IntentionExclusive), IntentionExclusive);
        assert_eq!(
            IntentionShared.join(SharedIntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(IntentionShared.join(Exclusive), Exclusive);
        assert_eq!(
            IntentionExclusive.join(Shared),
            SharedIntentionExclusive
        );
        assert_eq!(
            IntentionExclusive.join(SharedIntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(IntentionExclusive.join(Exclusive), Exclusive);
        assert_eq!(
            Shared.join(SharedIntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(Shared.join(Exclusive), Exclusive);
        assert_eq!(
            SharedIntentionExclusive.join(IntentionExclusive),
            SharedIntentionExclusive
        );
        assert_eq!(SharedIntentionExclusive.join(Exclusive), Exclusive);
    }

    #[test]
    fn test_join_is_commutative_and_idempotent() {
        for a in ALL {
            assert_eq!(a.join(a), a);
            for b in ALL {
                assert_eq!(a.join(b), b.join(a));
            }
        }
    }

    #[test]
    fn test_join_absorbs_exclusive() {
        for a in ALL {
            assert_eq!(a.join(Exclusive), Exclusive);
        }
    }
}
