//! GPU architecture family classification.
//!
//! Maps a `gfx*` codename to a hardware generation, both at runtime (from
//! the device-reported codename) and at compile time (from the codename a
//! binary was built for). Kernels select instruction-level code paths by
//! generation, so the two derivations must agree; see the tests at the
//! bottom of this module.

/// A named hardware generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Family {
    Gcn5 = 1 << 0,
    Rdna1 = 1 << 1,
    Rdna2 = 1 << 2,
    Rdna3 = 1 << 3,
    Rdna4 = 1 << 4,
    Cdna1 = 1 << 5,
    Cdna2 = 1 << 6,
    Cdna3 = 1 << 7,
}

impl Family {
    pub fn name(self) -> &'static str {
        match self {
            Self::Gcn5 => "GCN 5",
            Self::Rdna1 => "RDNA 1",
            Self::Rdna2 => "RDNA 2",
            Self::Rdna3 => "RDNA 3",
            Self::Rdna4 => "RDNA 4",
            Self::Cdna1 => "CDNA 1",
            Self::Cdna2 => "CDNA 2",
            Self::Cdna3 => "CDNA 3",
        }
    }
}

const FAMILY_COUNT: u16 = 8;

/// A set of hardware generations.
///
/// Plain bitmask over [`Family`] with no host-only dependencies, so it is
/// usable from const context (and from generated device-side tables).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FamilySet(u16);

impl FamilySet {
    pub const NONE: FamilySet = FamilySet(0);
    pub const ALL: FamilySet = FamilySet((1 << FAMILY_COUNT) - 1);

    pub const fn from_family(family: Family) -> Self {
        FamilySet(family as u16)
    }

    pub const fn union(self, other: Self) -> Self {
        FamilySet(self.0 | other.0)
    }

    pub const fn intersection(self, other: Self) -> Self {
        FamilySet(self.0 & other.0)
    }

    pub const fn symmetric_difference(self, other: Self) -> Self {
        FamilySet(self.0 ^ other.0)
    }

    pub const fn complement(self) -> Self {
        FamilySet(!self.0 & Self::ALL.0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl From<Family> for FamilySet {
    fn from(family: Family) -> Self {
        Self::from_family(family)
    }
}

impl std::ops::BitOr for FamilySet {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl std::ops::BitOrAssign for FamilySet {
    fn bitor_assign(&mut self, rhs: Self) {
        *self = self.union(rhs);
    }
}

impl std::ops::BitAnd for FamilySet {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        self.intersection(rhs)
    }
}

impl std::ops::BitAndAssign for FamilySet {
    fn bitand_assign(&mut self, rhs: Self) {
        *self = self.intersection(rhs);
    }
}

impl std::ops::BitXor for FamilySet {
    type Output = Self;
    fn bitxor(self, rhs: Self) -> Self {
        self.symmetric_difference(rhs)
    }
}

impl std::ops::BitXorAssign for FamilySet {
    fn bitxor_assign(&mut self, rhs: Self) {
        *self = self.symmetric_difference(rhs);
    }
}

impl std::ops::Not for FamilySet {
    type Output = Self;
    fn not(self) -> Self {
        self.complement()
    }
}

impl std::fmt::Debug for FamilySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        const NAMED: [(Family, &str); 8] = [
            (Family::Gcn5, "Gcn5"),
            (Family::Rdna1, "Rdna1"),
            (Family::Rdna2, "Rdna2"),
            (Family::Rdna3, "Rdna3"),
            (Family::Rdna4, "Rdna4"),
            (Family::Cdna1, "Cdna1"),
            (Family::Cdna2, "Cdna2"),
            (Family::Cdna3, "Cdna3"),
        ];
        let mut set = f.debug_set();
        for (family, name) in NAMED {
            if self.contains(FamilySet::from_family(family)) {
                set.entry(&name);
            }
        }
        set.finish()
    }
}

// ── Codename classification ────────────────────────────────────────────

/// Prefix rules, most specific first. First match wins: `gfx90a` must be
/// checked before `gfx9` or every CDNA 2 part would classify as GCN 5.
const RULES: &[(&str, Family)] = &[
    ("gfx90a", Family::Cdna2),
    ("gfx908", Family::Cdna1),
    ("gfx103", Family::Rdna2),
    ("gfx101", Family::Rdna1),
    ("gfx94", Family::Cdna3),
    ("gfx95", Family::Cdna3),
    ("gfx12", Family::Rdna4),
    ("gfx11", Family::Rdna3),
    ("gfx9", Family::Gcn5),
];

const fn has_prefix(name: &[u8], prefix: &[u8]) -> bool {
    if name.len() < prefix.len() {
        return false;
    }
    let mut i = 0;
    while i < prefix.len() {
        if name[i] != prefix[i] {
            return false;
        }
        i += 1;
    }
    true
}

/// Classifies a `gfx*` codename into its generation.
///
/// Returns [`FamilySet::NONE`] for codenames no rule covers. The codename
/// may carry feature suffixes (`gfx90a:sramecc+:xnack-`); only the prefix
/// is inspected.
pub const fn classify(codename: &str) -> FamilySet {
    let name = codename.as_bytes();
    let mut i = 0;
    while i < RULES.len() {
        if has_prefix(name, RULES[i].0.as_bytes()) {
            return FamilySet::from_family(RULES[i].1);
        }
        i += 1;
    }
    FamilySet::NONE
}

/// Codename this binary was built for, baked in at compile time via the
/// `HIPBENCH_TARGET_GFX` environment variable.
pub const TARGET_GFX: Option<&str> = option_env!("HIPBENCH_TARGET_GFX");

/// Generation of the build target, [`FamilySet::NONE`] for generic builds.
pub const BUILT_FAMILY: FamilySet = match TARGET_GFX {
    Some(codename) => classify(codename),
    None => FamilySet::NONE,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_known_codenames() {
        assert_eq!(classify("gfx1031"), Family::Rdna2.into());
        assert_eq!(classify("gfx90a"), Family::Cdna2.into());
        assert_eq!(classify("gfx1100"), Family::Rdna3.into());
        assert_eq!(classify("gfx908"), Family::Cdna1.into());
        assert_eq!(classify("gfx942"), Family::Cdna3.into());
        assert_eq!(classify("gfx950"), Family::Cdna3.into());
        assert_eq!(classify("gfx1201"), Family::Rdna4.into());
        assert_eq!(classify("gfx1010"), Family::Rdna1.into());
        assert_eq!(classify("gfx906"), Family::Gcn5.into());
    }

    #[test]
    fn classify_unknown_is_none() {
        assert_eq!(classify("gfx000"), FamilySet::NONE);
        assert_eq!(classify(""), FamilySet::NONE);
        assert_eq!(classify("sm_90"), FamilySet::NONE);
    }

    #[test]
    fn classify_ignores_feature_suffixes() {
        assert_eq!(classify("gfx90a:sramecc+:xnack-"), Family::Cdna2.into());
    }

    #[test]
    fn specific_prefix_beats_gfx9() {
        // gfx90a and gfx908 extend the gfx9 prefix; ordering matters.
        assert_ne!(classify("gfx90a"), Family::Gcn5.into());
        assert_ne!(classify("gfx908"), Family::Gcn5.into());
        assert_eq!(classify("gfx900"), Family::Gcn5.into());
    }

    #[test]
    fn const_and_runtime_classification_agree() {
        // The table below is evaluated by the compiler; a binary built for
        // any supported codename must land in the same family that a device
        // reporting that codename resolves to at runtime.
        const BUILD_TIME: [(&str, FamilySet); 15] = [
            ("gfx900", classify("gfx900")),
            ("gfx906", classify("gfx906")),
            ("gfx908", classify("gfx908")),
            ("gfx90a", classify("gfx90a")),
            ("gfx942", classify("gfx942")),
            ("gfx950", classify("gfx950")),
            ("gfx1010", classify("gfx1010")),
            ("gfx1012", classify("gfx1012")),
            ("gfx1030", classify("gfx1030")),
            ("gfx1031", classify("gfx1031")),
            ("gfx1100", classify("gfx1100")),
            ("gfx1101", classify("gfx1101")),
            ("gfx1102", classify("gfx1102")),
            ("gfx1200", classify("gfx1200")),
            ("gfx1201", classify("gfx1201")),
        ];
        for (codename, built) in BUILD_TIME {
            assert_eq!(built, classify(codename), "divergent classification for {codename}");
            assert_ne!(built, FamilySet::NONE, "{codename} unclassified");
        }
    }

    #[test]
    fn built_family_matches_target_env() {
        match TARGET_GFX {
            Some(codename) => assert_eq!(BUILT_FAMILY, classify(codename)),
            None => assert_eq!(BUILT_FAMILY, FamilySet::NONE),
        }
    }

    #[test]
    fn set_operations() {
        let rdna: FamilySet =
            FamilySet::from(Family::Rdna1) | Family::Rdna2.into() | Family::Rdna3.into() | Family::Rdna4.into();
        let cdna: FamilySet =
            FamilySet::from(Family::Cdna1) | Family::Cdna2.into() | Family::Cdna3.into();

        assert_eq!(rdna & cdna, FamilySet::NONE);
        assert_eq!((rdna | cdna) | Family::Gcn5.into(), FamilySet::ALL);
        assert_eq!(rdna ^ rdna, FamilySet::NONE);
        assert_eq!(!FamilySet::NONE, FamilySet::ALL);
        assert_eq!(!FamilySet::ALL, FamilySet::NONE);

        assert!(rdna.contains(Family::Rdna2.into()));
        assert!(!rdna.contains(Family::Cdna2.into()));
        assert!(FamilySet::ALL.contains(rdna));
        // NONE is a subset of everything, including itself.
        assert!(rdna.contains(FamilySet::NONE));
        assert!(FamilySet::NONE.contains(FamilySet::NONE));
    }

    #[test]
    fn complement_stays_masked() {
        let set = FamilySet::from(Family::Gcn5);
        let complement = !set;
        assert!(!complement.contains(set));
        assert_eq!(set | complement, FamilySet::ALL);
        assert_eq!(!(set | complement), FamilySet::NONE);
    }
}
