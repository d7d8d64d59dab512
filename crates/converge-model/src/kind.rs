//! Function kinds and the rules attached to each
//!
//! [`FunctionKind`] is the bare discriminant used on the wire and on disk.
//! [`FunctionClass`] is the closed tagged union carrying per-kind payload
//! (only actions carry one: their [`ActionKind`] verb).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// The five kinds of function that can be bound to a schema variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionKind {
    /// Performs a lifecycle verb against a real resource
    Action,
    /// Checks a component and reports pass/fail
    Qualification,
    /// Renders a component into some output format
    CodeGeneration,
    /// Manages other components
    Management,
    /// Supplies credentials
    Authentication,
}

impl FunctionKind {
    /// All kinds, in on-disk scan order
    pub const ALL: [FunctionKind; 5] = [
        FunctionKind::Action,
        FunctionKind::Qualification,
        FunctionKind::CodeGeneration,
        FunctionKind::Management,
        FunctionKind::Authentication,
    ];

    /// Subdirectory name inside a schema directory
    #[inline]
    #[must_use]
    pub fn directory(&self) -> &'static str {
        match self {
            FunctionKind::Action => "actions",
            FunctionKind::Qualification => "qualifications",
            FunctionKind::CodeGeneration => "codeGenerators",
            FunctionKind::Management => "management",
            FunctionKind::Authentication => "authFuncs",
        }
    }

    /// Resolve a kind from its subdirectory name
    #[must_use]
    pub fn from_directory(dir: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.directory() == dir)
    }

    /// Path segment used by the kind-specific binding endpoints
    #[inline]
    #[must_use]
    pub fn endpoint_segment(&self) -> &'static str {
        match self {
            FunctionKind::Action => "action",
            FunctionKind::Qualification => "qualification",
            FunctionKind::CodeGeneration => "codegen",
            FunctionKind::Management => "management",
            FunctionKind::Authentication => "authentication",
        }
    }

    /// Whether functions of this kind must carry an action verb
    #[inline]
    #[must_use]
    pub fn requires_action_kind(&self) -> bool {
        matches!(self, FunctionKind::Action)
    }
}

impl Display for FunctionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let name = match self {
            FunctionKind::Action => "action",
            FunctionKind::Qualification => "qualification",
            FunctionKind::CodeGeneration => "codeGeneration",
            FunctionKind::Management => "management",
            FunctionKind::Authentication => "authentication",
        };
        f.write_str(name)
    }
}

impl FromStr for FunctionKind {
    type Err = KindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_ascii_lowercase();
        let kind = match lowered.as_str() {
            "action" | "actions" => FunctionKind::Action,
            "qualification" | "qualifications" => FunctionKind::Qualification,
            "codegeneration" | "codegen" | "codegenerators" => FunctionKind::CodeGeneration,
            "management" => FunctionKind::Management,
            "authentication" | "auth" | "authfuncs" => FunctionKind::Authentication,
            _ => return Err(KindError::UnknownKind(s.to_string())),
        };
        Ok(kind)
    }
}

/// Lifecycle verb of an action function
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Create,
    Destroy,
    Refresh,
    Update,
    /// Anything that is not one of the four lifecycle verbs
    Manual,
}

impl ActionKind {
    /// Derive the verb from an action file's base name
    ///
    /// `create`, `destroy`, `refresh` and `update` (case-insensitive) map to
    /// their verb; every other name is [`ActionKind::Manual`].
    #[must_use]
    pub fn from_file_stem(stem: &str) -> Self {
        match stem.to_ascii_lowercase().as_str() {
            "create" => ActionKind::Create,
            "destroy" => ActionKind::Destroy,
            "refresh" => ActionKind::Refresh,
            "update" => ActionKind::Update,
            _ => ActionKind::Manual,
        }
    }

    /// Lowercase wire name
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Create => "create",
            ActionKind::Destroy => "destroy",
            ActionKind::Refresh => "refresh",
            ActionKind::Update => "update",
            ActionKind::Manual => "manual",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of a function together with its kind-specific payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FunctionClass {
    Action {
        #[serde(rename = "actionKind")]
        action_kind: ActionKind,
    },
    Qualification,
    CodeGeneration,
    Management,
    Authentication,
}

impl FunctionClass {
    /// Classify a function found on disk
    ///
    /// Actions take their verb from the file's base name.
    #[must_use]
    pub fn classify(kind: FunctionKind, file_stem: &str) -> Self {
        match kind {
            FunctionKind::Action => FunctionClass::Action {
                action_kind: ActionKind::from_file_stem(file_stem),
            },
            FunctionKind::Qualification => FunctionClass::Qualification,
            FunctionKind::CodeGeneration => FunctionClass::CodeGeneration,
            FunctionKind::Management => FunctionClass::Management,
            FunctionKind::Authentication => FunctionClass::Authentication,
        }
    }

    /// Build a class from a kind and an optional verb
    ///
    /// # Errors
    /// Returns [`KindError::MissingActionKind`] for an action without a verb,
    /// and [`KindError::UnexpectedActionKind`] for a verb on any other kind.
    pub fn from_parts(kind: FunctionKind, action_kind: Option<ActionKind>) -> Result<Self, KindError> {
        match (kind.requires_action_kind(), action_kind) {
            (true, Some(action_kind)) => Ok(FunctionClass::Action { action_kind }),
            (true, None) => Err(KindError::MissingActionKind),
            (false, Some(_)) => Err(KindError::UnexpectedActionKind(kind)),
            (false, None) => Ok(Self::classify(kind, "")),
        }
    }

    /// Bare kind discriminant
    #[inline]
    #[must_use]
    pub fn kind(&self) -> FunctionKind {
        match self {
            FunctionClass::Action { .. } => FunctionKind::Action,
            FunctionClass::Qualification => FunctionKind::Qualification,
            FunctionClass::CodeGeneration => FunctionKind::CodeGeneration,
            FunctionClass::Management => FunctionKind::Management,
            FunctionClass::Authentication => FunctionKind::Authentication,
        }
    }

    /// Action verb, if this is an action
    #[inline]
    #[must_use]
    pub fn action_kind(&self) -> Option<ActionKind> {
        match self {
            FunctionClass::Action { action_kind } => Some(*action_kind),
            _ => None,
        }
    }

    /// Whether a remote binding of `kind` (and optional verb) is the same
    /// function class as this one
    ///
    /// Kinds must agree. For actions the verb must also agree when the remote
    /// reports one; a remote without a verb matches any local verb.
    #[must_use]
    pub fn matches_remote(&self, kind: FunctionKind, action_kind: Option<ActionKind>) -> bool {
        if self.kind() != kind {
            return false;
        }
        match (self.action_kind(), action_kind) {
            (Some(local), Some(remote)) => local == remote,
            _ => true,
        }
    }
}

/// Errors related to function classification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KindError {
    /// Unknown kind name
    #[error("unknown function kind: {0}")]
    UnknownKind(String),

    /// Action function without a verb
    #[error("action functions require an action kind")]
    MissingActionKind,

    /// Verb supplied for a non-action function
    #[error("{0} functions do not take an action kind")]
    UnexpectedActionKind(FunctionKind),
}
