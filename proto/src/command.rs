// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CLI command tree's node shape.
//!
//! The tree is built once as a `'static` table of `CommandNode`s and never
//! mutated, so there is no cycle to guard against: child menus are plain
//! `&'static [CommandNode]` slices rather than indices into a separate
//! arena or raw pointers into siblings. Terminal nodes hold a trait object
//! rather than a function pointer so a handler can close over whatever
//! driver state it needs at table-construction time. `user_provides_params`
//! lives on the node itself, not just on terminals, so a parameter like a
//! VLAN id can be modeled as a pass-through menu node that accepts any
//! token and carries a single child toward the eventual terminal.

use crate::role::Role;

/// Invoked when a user reaches a terminal command node with permission to
/// run it. `params` are the tokens collected along the path, already
/// permission-checked by the walker.
pub trait CliHandler: Sync {
    fn invoke(&self, params: &[&str]) -> Result<(), CliError>;
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CliError {
    WrongParamCount,
    InvalidParam,
    DeviceError,
    PermissionDenied,
}

#[derive(Copy, Clone)]
pub enum NodeKind {
    Terminal {
        handler: &'static dyn CliHandler,
        params_required: usize,
        /// Fixed parameter strings offered to the user at this position
        /// (e.g. "enable"/"disable") when the node itself is a literal
        /// match rather than a user-provided one.
        static_params: &'static [&'static str],
    },
    Menu {
        children: &'static [CommandNode],
    },
}

#[derive(Copy, Clone)]
pub struct CommandNode {
    pub text: &'static str,
    pub help: &'static str,
    pub required_permission: Role,
    /// If set, this node matches any token at its position (the token is
    /// captured as a parameter) instead of requiring `text` to match.
    pub user_provides_params: bool,
    pub kind: NodeKind,
}

impl CommandNode {
    pub const fn is_terminal(&self) -> bool {
        matches!(self.kind, NodeKind::Terminal { .. })
    }

    pub fn children(&self) -> &'static [CommandNode] {
        match self.kind {
            NodeKind::Menu { children } => children,
            NodeKind::Terminal { .. } => &[],
        }
    }

    /// A node matches `token` if its text matches case-insensitively, or if
    /// it's a user-provided-parameter node (which matches any token).
    pub fn matches(&self, token: &str) -> bool {
        self.user_provides_params || self.text.eq_ignore_ascii_case(token)
    }

    pub fn find_child(&self, token: &str) -> Option<&'static CommandNode> {
        self.children().iter().find(|c| c.matches(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;
    impl CliHandler for NoopHandler {
        fn invoke(&self, _params: &[&str]) -> Result<(), CliError> {
            Ok(())
        }
    }
    static NOOP: NoopHandler = NoopHandler;

    static LEAF: CommandNode = CommandNode {
        text: "status",
        help: "show status",
        required_permission: Role::ReadOnly,
        user_provides_params: false,
        kind: NodeKind::Terminal { handler: &NOOP, params_required: 0, static_params: &[] },
    };

    static VLAN_ID_PARAM: CommandNode = CommandNode {
        text: "",
        help: "vlan id",
        required_permission: Role::ModifyPorts,
        user_provides_params: true,
        kind: NodeKind::Terminal { handler: &NOOP, params_required: 1, static_params: &[] },
    };

    static ROOT: CommandNode = CommandNode {
        text: "root",
        help: "",
        required_permission: Role::ReadOnly,
        user_provides_params: false,
        kind: NodeKind::Menu { children: &[LEAF, VLAN_ID_PARAM] },
    };

    #[test]
    fn terminal_nodes_have_no_children() {
        assert!(LEAF.is_terminal());
        assert!(LEAF.children().is_empty());
    }

    #[test]
    fn menu_lookup_is_case_insensitive() {
        assert!(!ROOT.is_terminal());
        let found = ROOT.find_child("STATUS").expect("status should resolve");
        assert_eq!(found.text, "status");
    }

    #[test]
    fn user_provided_param_node_matches_any_token() {
        assert!(VLAN_ID_PARAM.matches("4094"));
        assert!(VLAN_ID_PARAM.matches("anything"));
    }

    #[test]
    fn literal_siblings_are_preferred_in_declared_order() {
        // "status" is declared before the param node, so an exact literal
        // match for it must win even though the param node would also
        // "match" via user_provides_params.
        assert_eq!(ROOT.find_child("status").unwrap().text, "status");
    }
}
