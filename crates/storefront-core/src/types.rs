use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Quality rank carried by every attribute write on an [`crate::App`].
///
/// The rank makes merge precedence explicit and total: a write lands only
/// if the attribute is unset or the incoming rank is strictly higher than
/// the rank recorded for the current value. Ties keep the incumbent, so
/// re-merging the same backend output is a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Quality {
    /// Derived placeholder data, e.g. a name guessed from a package id
    Lowest,
    /// Ordinary backend data
    Normal,
    /// Authoritative data from the primary source for this attribute
    Highest,
}

/// Bitset of attributes a caller wants satisfied on the result entities.
///
/// Each flag has a cheap local satisfaction check on [`crate::App`] used
/// by the refinement engine to skip backend work that is already done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RefineFlags(u64);

impl RefineFlags {
    /// No attributes requested
    pub const NONE: RefineFlags = RefineFlags(0);
    /// Require the long description
    pub const REQUIRE_DESCRIPTION: RefineFlags = RefineFlags(1 << 0);
    /// Require the project license
    pub const REQUIRE_LICENSE: RefineFlags = RefineFlags(1 << 1);
    /// Require the homepage URL
    pub const REQUIRE_URL: RefineFlags = RefineFlags(1 << 2);
    /// Require the installable version
    pub const REQUIRE_VERSION: RefineFlags = RefineFlags(1 << 3);
    /// Require install and download sizes
    pub const REQUIRE_SIZE: RefineFlags = RefineFlags(1 << 4);
    /// Require an icon
    pub const REQUIRE_ICON: RefineFlags = RefineFlags(1 << 5);
    /// Require the aggregate rating percentage
    pub const REQUIRE_RATING: RefineFlags = RefineFlags(1 << 6);
    /// Require the review list
    pub const REQUIRE_REVIEWS: RefineFlags = RefineFlags(1 << 7);
    /// Require the per-star review histogram
    pub const REQUIRE_REVIEW_RATINGS: RefineFlags = RefineFlags(1 << 8);
    /// Require provenance (was this supplied by the OS vendor)
    pub const REQUIRE_PROVENANCE: RefineFlags = RefineFlags(1 << 9);
    /// Require related application identifiers
    pub const REQUIRE_RELATED: RefineFlags = RefineFlags(1 << 10);

    /// Create a flag set from raw bits
    pub const fn from_bits(bits: u64) -> Self {
        RefineFlags(bits)
    }

    /// The raw bits
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether no flags are set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all flags in `other` are set in `self`
    pub const fn contains(self, other: RefineFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether any flag in `other` is set in `self`
    pub const fn intersects(self, other: RefineFlags) -> bool {
        self.0 & other.0 != 0
    }

    /// Set all flags in `other`
    pub fn insert(&mut self, other: RefineFlags) {
        self.0 |= other.0;
    }

    /// Clear all flags in `other`
    pub fn remove(&mut self, other: RefineFlags) {
        self.0 &= !other.0;
    }

    /// Iterate over the individual set bits
    pub fn iter(self) -> impl Iterator<Item = RefineFlags> {
        (0..u64::BITS).filter_map(move |shift| {
            let bit = 1u64 << shift;
            if self.0 & bit != 0 {
                Some(RefineFlags(bit))
            } else {
                None
            }
        })
    }

    /// Short name of a single flag, for logs and events
    pub fn name(self) -> &'static str {
        match self {
            RefineFlags::REQUIRE_DESCRIPTION => "description",
            RefineFlags::REQUIRE_LICENSE => "license",
            RefineFlags::REQUIRE_URL => "url",
            RefineFlags::REQUIRE_VERSION => "version",
            RefineFlags::REQUIRE_SIZE => "size",
            RefineFlags::REQUIRE_ICON => "icon",
            RefineFlags::REQUIRE_RATING => "rating",
            RefineFlags::REQUIRE_REVIEWS => "reviews",
            RefineFlags::REQUIRE_REVIEW_RATINGS => "review-ratings",
            RefineFlags::REQUIRE_PROVENANCE => "provenance",
            RefineFlags::REQUIRE_RELATED => "related",
            _ => "multiple",
        }
    }
}

impl BitOr for RefineFlags {
    type Output = RefineFlags;

    fn bitor(self, rhs: RefineFlags) -> RefineFlags {
        RefineFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for RefineFlags {
    fn bitor_assign(&mut self, rhs: RefineFlags) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for RefineFlags {
    type Output = RefineFlags;

    fn bitand(self, rhs: RefineFlags) -> RefineFlags {
        RefineFlags(self.0 & rhs.0)
    }
}

impl fmt::Display for RefineFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        let names: Vec<&str> = self.iter().map(|flag| flag.name()).collect();
        write!(f, "{}", names.join(","))
    }
}

/// Orthogonal boolean properties of an [`crate::App`].
///
/// Quirks never conflict; merging two views of the same entity unions
/// their quirk sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Quirks(u64);

impl Quirks {
    /// No quirks
    pub const NONE: Quirks = Quirks(0);
    /// The application has no launchable entry point
    pub const NOT_LAUNCHABLE: Quirks = Quirks(1 << 0);
    /// The application is part of the base system and cannot be removed
    pub const COMPULSORY: Quirks = Quirks(1 << 1);
    /// The application must not be updated automatically
    pub const DO_NOT_AUTO_UPDATE: Quirks = Quirks(1 << 2);
    /// A source/origin entry is known for this application
    pub const HAS_SOURCE: Quirks = Quirks(1 << 3);
    /// The application was supplied by the OS vendor
    pub const PROVENANCE: Quirks = Quirks(1 << 4);
    /// Never show this entry in any list
    pub const HIDE_EVERYWHERE: Quirks = Quirks(1 << 5);
    /// The entry stands in for several real applications
    pub const IS_PROXY: Quirks = Quirks(1 << 6);
    /// Placeholder created before authoritative data arrived; replaced
    /// wholesale on first merge with a non-placeholder entity
    pub const PLACEHOLDER: Quirks = Quirks(1 << 7);

    /// The raw bits
    pub const fn bits(self) -> u64 {
        self.0
    }

    /// Whether no quirks are set
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether all quirks in `other` are set in `self`
    pub const fn contains(self, other: Quirks) -> bool {
        self.0 & other.0 == other.0
    }

    /// Set all quirks in `other`
    pub fn insert(&mut self, other: Quirks) {
        self.0 |= other.0;
    }

    /// Clear all quirks in `other`
    pub fn remove(&mut self, other: Quirks) {
        self.0 &= !other.0;
    }

    /// Union of the two quirk sets
    pub const fn union(self, other: Quirks) -> Quirks {
        Quirks(self.0 | other.0)
    }
}

impl BitOr for Quirks {
    type Output = Quirks;

    fn bitor(self, rhs: Quirks) -> Quirks {
        Quirks(self.0 | rhs.0)
    }
}

impl BitOrAssign for Quirks {
    fn bitor_assign(&mut self, rhs: Quirks) {
        self.0 |= rhs.0;
    }
}

/// How a job's raw backend outputs are collapsed into one list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupeFlags(u64);

impl DedupeFlags {
    /// Keep raw per-backend entries, no dedupe
    pub const NONE: DedupeFlags = DedupeFlags(0);
    /// Merge entries sharing an identity key (the default)
    pub const BY_ID: DedupeFlags = DedupeFlags(1 << 0);

    /// Whether identity-key dedupe is requested
    pub const fn dedupes(self) -> bool {
        self.0 & DedupeFlags::BY_ID.0 != 0
    }
}

impl Default for DedupeFlags {
    fn default() -> Self {
        DedupeFlags::BY_ID
    }
}
