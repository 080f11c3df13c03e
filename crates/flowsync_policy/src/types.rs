//! Core type definitions for flowsync policy.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Machine name of a flow (synchronization policy).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(String);

impl FlowId {
    /// Creates a new flow ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the machine name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FlowId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for FlowId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Machine name of a pool (remote channel).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PoolId(String);

impl PoolId {
    /// Creates a new pool ID.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the machine name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PoolId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for PoolId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// How a flow pushes or pulls a given bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Never synchronized.
    #[default]
    Disabled,
    /// Synchronized whenever the entity changes.
    Automatic,
    /// Synchronized only when an editor asks for it.
    Manual,
    /// Synchronized only when referenced by another synchronized entity.
    AsDependency,
}

impl SyncMode {
    /// Returns the reason that this mode answers to, if any.
    #[must_use]
    pub const fn as_reason(self) -> Option<Reason> {
        match self {
            SyncMode::Disabled => None,
            SyncMode::Automatic => Some(Reason::Automatic),
            SyncMode::Manual => Some(Reason::Manual),
            SyncMode::AsDependency => Some(Reason::AsDependency),
        }
    }
}

/// Usage tier of a pool within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolUsage {
    /// The pool is never used.
    #[default]
    Forbid,
    /// The pool is used once an editor opts in.
    Allow,
    /// The pool is always used.
    Force,
}

/// What a pull does when the entity already exists locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportUpdateBehavior {
    /// Always apply remote updates and forbid local editing.
    ForceAndForbidEditing,
    /// Apply remote updates unless the entity was overridden locally.
    ForceUnlessOverridden,
    /// Always apply remote updates.
    #[default]
    Force,
    /// Never apply remote updates to existing entities.
    Ignore,
    /// Create new entities unpublished.
    Unpublished,
}

/// Why a synchronization attempt is happening.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    /// Triggered by an entity change.
    Automatic,
    /// Triggered by an editor.
    Manual,
    /// Triggered because another entity references this one.
    AsDependency,
    /// Forced by an operator, bypassing mode checks where allowed.
    Forced,
    /// Any reason at all.
    Any,
}

impl Reason {
    /// Returns the mode that directly answers to this reason.
    #[must_use]
    pub const fn as_mode(self) -> Option<SyncMode> {
        match self {
            Reason::Automatic => Some(SyncMode::Automatic),
            Reason::Manual => Some(SyncMode::Manual),
            Reason::AsDependency => Some(SyncMode::AsDependency),
            Reason::Forced | Reason::Any => None,
        }
    }

    /// Returns the stable string code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Reason::Automatic => "automatic",
            Reason::Manual => "manual",
            Reason::AsDependency => "as_dependency",
            Reason::Forced => "forced",
            Reason::Any => "any",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Reason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "automatic" => Ok(Reason::Automatic),
            "manual" => Ok(Reason::Manual),
            "as_dependency" | "dependency" => Ok(Reason::AsDependency),
            "forced" => Ok(Reason::Forced),
            "any" => Ok(Reason::Any),
            other => Err(format!("unknown reason: {other}")),
        }
    }
}

/// The write action a synchronization attempt performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// The entity does not exist on the receiving side yet.
    Create,
    /// The entity exists and changes.
    Update,
    /// The entity is removed.
    Delete,
}

impl Action {
    /// Returns the stable string code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(Action::Create),
            "update" => Ok(Action::Update),
            "delete" => Ok(Action::Delete),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// A set of concrete reasons, used when evaluating push eligibility.
///
/// `Any` and `Forced` expand to every concrete reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReasonSet(u8);

impl ReasonSet {
    const AUTOMATIC: u8 = 0b001;
    const MANUAL: u8 = 0b010;
    const AS_DEPENDENCY: u8 = 0b100;

    /// The empty set.
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every concrete reason.
    #[must_use]
    pub const fn all() -> Self {
        Self(Self::AUTOMATIC | Self::MANUAL | Self::AS_DEPENDENCY)
    }

    /// Expands a single reason into a set.
    #[must_use]
    pub const fn expand(reason: Reason) -> Self {
        match reason {
            Reason::Automatic => Self(Self::AUTOMATIC),
            Reason::Manual => Self(Self::MANUAL),
            Reason::AsDependency => Self(Self::AS_DEPENDENCY),
            Reason::Forced | Reason::Any => Self::all(),
        }
    }

    /// Expands several reasons into one set.
    #[must_use]
    pub fn from_reasons(reasons: &[Reason]) -> Self {
        reasons
            .iter()
            .fold(Self::empty(), |set, r| set.union(Self::expand(*r)))
    }

    /// Returns the union of two sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Returns true if the set is empty.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Returns true if a flow running in `mode` answers to this set.
    #[must_use]
    pub const fn admits(self, mode: SyncMode) -> bool {
        let bit = match mode {
            SyncMode::Disabled => return false,
            SyncMode::Automatic => Self::AUTOMATIC,
            SyncMode::Manual => Self::MANUAL,
            SyncMode::AsDependency => Self::AS_DEPENDENCY,
        };
        self.0 & bit != 0
    }
}

impl From<Reason> for ReasonSet {
    fn from(reason: Reason) -> Self {
        Self::expand(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const REASONS: [Reason; 5] = [
        Reason::Automatic,
        Reason::Manual,
        Reason::AsDependency,
        Reason::Forced,
        Reason::Any,
    ];
    const MODES: [SyncMode; 4] = [
        SyncMode::Disabled,
        SyncMode::Automatic,
        SyncMode::Manual,
        SyncMode::AsDependency,
    ];

    fn reason() -> impl Strategy<Value = Reason> {
        prop::sample::select(REASONS.to_vec())
    }

    #[test]
    fn any_and_forced_expand_to_all() {
        assert_eq!(ReasonSet::expand(Reason::Any), ReasonSet::all());
        assert_eq!(ReasonSet::expand(Reason::Forced), ReasonSet::all());
    }

    #[test]
    fn reason_set_admits_matching_mode_only() {
        let set = ReasonSet::expand(Reason::Manual);
        assert!(set.admits(SyncMode::Manual));
        assert!(!set.admits(SyncMode::Automatic));
        assert!(!set.admits(SyncMode::Disabled));
        assert!(!ReasonSet::all().admits(SyncMode::Disabled));
    }

    #[test]
    fn reason_set_from_reasons() {
        let set = ReasonSet::from_reasons(&[Reason::Automatic, Reason::AsDependency]);
        assert!(set.admits(SyncMode::Automatic));
        assert!(set.admits(SyncMode::AsDependency));
        assert!(!set.admits(SyncMode::Manual));
    }

    #[test]
    fn reason_and_action_parse() {
        assert_eq!("as_dependency".parse::<Reason>().unwrap(), Reason::AsDependency);
        assert_eq!("delete".parse::<Action>().unwrap(), Action::Delete);
        assert!("sometimes".parse::<Reason>().is_err());
    }

    #[test]
    fn mode_serializes_snake_case() {
        let json = serde_json::to_string(&SyncMode::AsDependency).unwrap();
        assert_eq!(json, "\"as_dependency\"");
        let behavior: ImportUpdateBehavior =
            serde_json::from_str("\"force_unless_overridden\"").unwrap();
        assert_eq!(behavior, ImportUpdateBehavior::ForceUnlessOverridden);
    }

    proptest! {
        #[test]
        fn reason_set_admits_what_some_reason_admits(
            reasons in prop::collection::vec(reason(), 0..6),
        ) {
            let set = ReasonSet::from_reasons(&reasons);
            prop_assert_eq!(set.is_empty(), reasons.is_empty());
            for mode in MODES {
                let expected = reasons.iter().any(|r| ReasonSet::expand(*r).admits(mode));
                prop_assert_eq!(set.admits(mode), expected);
            }
        }

        #[test]
        fn reason_codes_round_trip(code in reason()) {
            prop_assert_eq!(code.as_str().parse::<Reason>(), Ok(code));
            let json = serde_json::to_string(&code).unwrap();
            prop_assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
