use serde::{Deserialize, Serialize};

/// A VCL snippet managed on the edge platform
///
/// Action snippets pair a generated `conditional` with the action body, so
/// the snippet content reads `if ( ... ) { <action> }`. Static snippets have
/// no conditional and are uploaded as-is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Snippet name, unique per service
    pub name: String,

    /// Owning service ID
    pub service_id: String,

    /// Service version the snippet was created in
    pub version: String,

    /// Body executed when the conditional matches
    pub action: String,

    /// Generated guard condition, empty for static snippets
    #[serde(default)]
    pub conditional: String,

    /// VCL subroutine the snippet is placed in
    #[serde(default = "default_kind", rename = "type")]
    pub kind: String,

    /// Whether the snippet can be updated without a new service version
    #[serde(default = "default_dynamic")]
    pub dynamic: bool,

    /// Snippet priority, lower runs first
    #[serde(default = "default_priority")]
    pub priority: u32,

    /// Remote snippet ID, set once the snippet exists
    #[serde(default)]
    pub id: Option<String>,
}

fn default_kind() -> String {
    String::from("recv")
}

const fn default_dynamic() -> bool {
    true
}

const fn default_priority() -> u32 {
    100
}

impl Snippet {
    /// A new action snippet placed in `vcl_recv`
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        service_id: impl Into<String>,
        version: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_id: service_id.into(),
            version: version.into(),
            action: action.into(),
            conditional: String::new(),
            kind: default_kind(),
            dynamic: default_dynamic(),
            priority: default_priority(),
            id: None,
        }
    }

    /// Set the subroutine the snippet is placed in
    #[must_use]
    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = kind.into();
        self
    }

    /// Returns true if the snippet exists remotely
    #[must_use]
    pub const fn is_created(&self) -> bool {
        self.id.is_some()
    }

    /// The VCL uploaded for this snippet
    #[must_use]
    pub fn content(&self) -> String {
        if self.conditional.is_empty() {
            self.action.clone()
        } else {
            format!("{} {{ {} }}", self.conditional, self.action)
        }
    }
}
