// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The CLI interpreter: tokenizer, command-tree walker, and the
//! authentication gate that sits in front of it.

#![cfg_attr(not(test), no_std)]

use heapless::Vec as HVec;
use ringbuf::*;
use switchfw_proto::command::{CliError, CommandNode, NodeKind};
use switchfw_proto::role::Role;
use switchfw_proto::user::UserTable;

pub const MAX_TOKENS: usize = 127;
pub const MAX_PARAMS: usize = 20;
pub const MAX_TREE_DEPTH: usize = 12;
pub const MAX_LINE: usize = 256;

pub type Tokens<'a> = HVec<&'a str, MAX_TOKENS>;
pub type Params<'a> = HVec<&'a str, MAX_PARAMS>;
pub type Line = heapless::String<MAX_LINE>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchOutcome {
    Invoked,
    TooManyParameters,
    Unauthorized,
    CommandNotRecognized,
    IncompleteCommand,
    HandlerFailed(CliError),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Trace {
    None,
    Tokenized(usize),
    Descended,
    Invoked,
    Unauthorized,
    NotRecognized,
    Incomplete,
    LineComplete(usize),
    LineOverflowed,
}
ringbuf!(Trace, 32, Trace::None);

/// Assembles UART RX bytes into lines, one byte at a time. The byte-level
/// transport (baud rate, framing, the actual read) is the board support
/// package's concern; this only knows how to find line boundaries and
/// handle backspace, the same way [`crate`]'s sibling reassembles I2C
/// frames from individual bytes.
pub struct LineReader {
    buf: Line,
    overflowed: bool,
}

impl LineReader {
    pub const fn new() -> Self {
        Self { buf: Line::new(), overflowed: false }
    }

    /// Feeds one byte in. Returns the completed line, with the terminator
    /// stripped, once a CR or LF is seen. A line longer than [`MAX_LINE`]
    /// has its excess bytes dropped rather than panicking or silently
    /// truncating the reported length; the truncated text is still
    /// returned once terminated; so an over-length paste is rejected as
    /// one (likely garbled) command instead of replayed as two.
    pub fn on_byte(&mut self, byte: u8) -> Option<Line> {
        match byte {
            b'\r' | b'\n' => {
                if self.buf.is_empty() && !self.overflowed {
                    return None;
                }
                ringbuf_entry!(Trace::LineComplete(self.buf.len()));
                let line = core::mem::replace(&mut self.buf, Line::new());
                self.overflowed = false;
                Some(line)
            }
            0x08 | 0x7f => {
                self.buf.pop();
                None
            }
            _ => {
                if self.buf.push(byte as char).is_err() {
                    self.overflowed = true;
                    ringbuf_entry!(Trace::LineOverflowed);
                }
                None
            }
        }
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Splits a line on ASCII spaces into at most [`MAX_TOKENS`] tokens,
/// dropping empty tokens produced by repeated spaces. Lines are terminated
/// by the UART reader on CR or LF before reaching here.
pub fn tokenize(line: &str) -> Tokens<'_> {
    let mut tokens = Tokens::new();
    for word in line.split(' ') {
        if word.is_empty() {
            continue;
        }
        if tokens.push(word).is_err() {
            break;
        }
    }
    ringbuf_entry!(Trace::Tokenized(tokens.len()));
    tokens
}

/// Walks `tokens` against the tree rooted at `root`, collecting parameters
/// from user-provided-parameter nodes and static params from terminal
/// nodes, and invoking the terminal's handler if one is reached with
/// sufficient permission.
pub fn dispatch(root: &'static CommandNode, tokens: &[&str], user_role: Role) -> DispatchOutcome {
    let mut node = root;
    let mut params: Params = Params::new();
    let mut depth = 0usize;
    let mut descended = false;

    while depth < tokens.len() && depth < MAX_TREE_DEPTH {
        let token = tokens[depth];
        match node.find_child(token) {
            Some(child) => {
                descended = true;
                if child.user_provides_params {
                    let _ = params.push(token);
                }
                node = child;
                depth += 1;

                if node.is_terminal() {
                    if let NodeKind::Terminal { static_params, .. } = node.kind {
                        for p in static_params {
                            let _ = params.push(p);
                        }
                    }
                    return finish_terminal(node, tokens, depth, user_role, &params);
                }
                ringbuf_entry!(Trace::Descended);
            }
            None => {
                return if descended {
                    ringbuf_entry!(Trace::Incomplete);
                    DispatchOutcome::IncompleteCommand
                } else {
                    ringbuf_entry!(Trace::NotRecognized);
                    DispatchOutcome::CommandNotRecognized
                };
            }
        }
    }

    if node.is_terminal() {
        finish_terminal(node, tokens, depth, user_role, &params)
    } else if descended {
        DispatchOutcome::IncompleteCommand
    } else {
        DispatchOutcome::CommandNotRecognized
    }
}

fn finish_terminal(
    node: &'static CommandNode,
    tokens: &[&str],
    depth: usize,
    user_role: Role,
    params: &Params,
) -> DispatchOutcome {
    if depth < tokens.len() {
        return DispatchOutcome::TooManyParameters;
    }
    if !user_role.satisfies(node.required_permission) {
        ringbuf_entry!(Trace::Unauthorized);
        return DispatchOutcome::Unauthorized;
    }
    let NodeKind::Terminal { handler, .. } = node.kind else {
        unreachable!("finish_terminal only called on terminal nodes");
    };
    ringbuf_entry!(Trace::Invoked);
    match handler.invoke(params.as_slice()) {
        Ok(()) => DispatchOutcome::Invoked,
        Err(e) => DispatchOutcome::HandlerFailed(e),
    }
}

/// Authentication gate: compares clear-text credentials against the user
/// table. Returns the matching slot index on success.
pub fn authenticate(users: &UserTable, username: &str, password: &str) -> Option<usize> {
    let slot = users.find(username)?;
    if users.slot(slot).password.as_str() == password {
        Some(slot)
    } else {
        None
    }
}
