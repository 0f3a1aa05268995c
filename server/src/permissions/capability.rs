//! Channel-level capabilities using bitflags.
//!
//! Capabilities are organized into categories:
//! - Visibility (bit 0): The view-gate every other capability depends on
//! - Posts (bits 1-6): Reading, writing and editing posts
//! - Comments (bits 7-10): Reading, writing and removing comments
//! - Management (bits 11-12): Pinning and channel administration
//!
//! Some capabilities imply finer ones (`POST_UPDATE_ANY` implies
//! `POST_UPDATE_OWN`). The implication graph is fixed at compile time and
//! walked by [`ChannelPermissions::expand`].

use bitflags::bitflags;

bitflags! {
    /// Channel capabilities represented as a 64-bit bitfield.
    ///
    /// Collaborator stores that keep masks in signed 64-bit columns use
    /// [`Self::from_db`] and [`Self::to_db`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    #[serde(transparent)]
    pub struct ChannelPermissions: u64 {
        // === Visibility (bit 0) ===
        /// Permission to see the channel at all. Required by every other capability.
        const VIEW_CHANNEL       = 1 << 0;

        // === Posts (bits 1-6) ===
        /// Permission to read posts
        const POST_READ          = 1 << 1;
        /// Permission to create posts
        const POST_WRITE         = 1 << 2;
        /// Permission to edit posts authored by the user
        const POST_UPDATE_OWN    = 1 << 3;
        /// Permission to edit any post in the channel
        const POST_UPDATE_ANY    = 1 << 4;
        /// Permission to delete posts authored by the user
        const POST_DELETE_OWN    = 1 << 5;
        /// Permission to delete any post in the channel
        const POST_DELETE_ANY    = 1 << 6;

        // === Comments (bits 7-10) ===
        /// Permission to read comments
        const COMMENT_READ       = 1 << 7;
        /// Permission to comment on posts
        const COMMENT_WRITE      = 1 << 8;
        /// Permission to delete comments authored by the user
        const COMMENT_DELETE_OWN = 1 << 9;
        /// Permission to delete any comment in the channel
        const COMMENT_DELETE_ANY = 1 << 10;

        // === Management (bits 11-12) ===
        /// Permission to pin and unpin posts
        const POST_PIN           = 1 << 11;
        /// Permission to edit channel settings
        const MANAGE_CHANNEL     = 1 << 12;
    }
}

/// Direct implications, coarse to fine.
///
/// Must stay acyclic. `MANAGE_CHANNEL` reaches `POST_DELETE_OWN` through
/// `POST_DELETE_ANY`, so expansion has to iterate to a fixpoint.
const IMPLICATIONS: &[(ChannelPermissions, ChannelPermissions)] = &[
    (
        ChannelPermissions::POST_UPDATE_ANY,
        ChannelPermissions::POST_UPDATE_OWN,
    ),
    (
        ChannelPermissions::POST_DELETE_ANY,
        ChannelPermissions::POST_DELETE_OWN,
    ),
    (
        ChannelPermissions::COMMENT_DELETE_ANY,
        ChannelPermissions::COMMENT_DELETE_OWN,
    ),
    (
        ChannelPermissions::MANAGE_CHANNEL,
        ChannelPermissions::POST_PIN
            .union(ChannelPermissions::POST_DELETE_ANY)
            .union(ChannelPermissions::COMMENT_DELETE_ANY),
    ),
];

impl ChannelPermissions {
    // === Preset Combinations ===

    /// Typical grant for an ordinary group member.
    pub const MEMBER_DEFAULT: Self = Self::VIEW_CHANNEL
        .union(Self::POST_READ)
        .union(Self::POST_WRITE)
        .union(Self::POST_UPDATE_OWN)
        .union(Self::POST_DELETE_OWN)
        .union(Self::COMMENT_READ)
        .union(Self::COMMENT_WRITE)
        .union(Self::COMMENT_DELETE_OWN);

    /// Typical grant for a channel moderator.
    pub const MODERATOR_DEFAULT: Self = Self::MEMBER_DEFAULT
        .union(Self::POST_UPDATE_ANY)
        .union(Self::POST_DELETE_ANY)
        .union(Self::COMMENT_DELETE_ANY)
        .union(Self::POST_PIN);

    /// The capability that gates every other capability.
    pub const GATE: Self = Self::VIEW_CHANNEL;

    // === Mask Conversion ===

    /// Build a set from a raw mask. Unknown bits are dropped.
    #[must_use]
    pub const fn from_mask(mask: u64) -> Self {
        Self::from_bits_truncate(mask)
    }

    /// Raw mask of this set.
    #[must_use]
    pub const fn as_mask(self) -> u64 {
        self.bits()
    }

    /// Create permissions from a database BIGINT value.
    ///
    /// Reinterprets the i64 bit pattern as u64. Unknown bits are ignored so
    /// rows written by newer releases still load.
    #[must_use]
    pub const fn from_db(value: i64) -> Self {
        Self::from_bits_truncate(value as u64)
    }

    /// Convert permissions to a database BIGINT value.
    #[must_use]
    pub const fn to_db(self) -> i64 {
        self.bits() as i64
    }

    /// Flag names of every capability in the set, lowest bit first.
    #[must_use]
    pub fn names(self) -> Vec<&'static str> {
        self.iter_names().map(|(name, _)| name).collect()
    }

    // === Permission Checking ===

    /// Check if this permission set includes the specified permission(s).
    ///
    /// # Examples
    ///
    /// ```
    /// use campus_server::permissions::ChannelPermissions;
    ///
    /// let perms = ChannelPermissions::VIEW_CHANNEL | ChannelPermissions::POST_READ;
    /// assert!(perms.has(ChannelPermissions::POST_READ));
    /// assert!(!perms.has(ChannelPermissions::POST_WRITE));
    /// ```
    #[must_use]
    pub const fn has(self, permission: Self) -> bool {
        self.contains(permission)
    }

    // === Inheritance ===

    /// Everything implied by the capabilities in `self`, to closure.
    ///
    /// The result does not include `self` unless some bit of `self` is also
    /// implied by another bit.
    #[must_use]
    pub fn implies(self) -> Self {
        let mut implied = Self::empty();
        let mut frontier = self;
        loop {
            let mut next = Self::empty();
            for &(coarse, fine) in IMPLICATIONS {
                if frontier.intersects(coarse) {
                    next |= fine;
                }
            }
            let added = next - implied;
            if added.is_empty() {
                return implied;
            }
            implied |= added;
            frontier = added;
        }
    }

    /// Expand the set through the implication graph until no new bits appear.
    ///
    /// # Examples
    ///
    /// ```
    /// use campus_server::permissions::ChannelPermissions;
    ///
    /// let expanded = ChannelPermissions::POST_DELETE_ANY.expand();
    /// assert!(expanded.has(ChannelPermissions::POST_DELETE_OWN));
    /// assert_eq!(expanded.expand(), expanded);
    /// ```
    #[must_use]
    pub fn expand(self) -> Self {
        let mut mask = self;
        loop {
            let next = mask | mask.implies();
            if next == mask {
                return mask;
            }
            mask = next;
        }
    }

    /// Pairs `(coarse, fine)` where `coarse` is in `self` and directly or
    /// transitively implies `fine`.
    pub(crate) fn implied_pairs(self) -> impl Iterator<Item = (Self, Self)> {
        self.iter().map(|coarse| (coarse, coarse.implies()))
    }
}

impl Default for ChannelPermissions {
    fn default() -> Self {
        Self::empty()
    }
}

impl From<i64> for ChannelPermissions {
    fn from(value: i64) -> Self {
        Self::from_db(value)
    }
}
