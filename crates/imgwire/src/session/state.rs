//! Session roles and lifecycle states.

use std::fmt;

/// Connection topology of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Connects and pushes images.
    Send,
    /// Binds and waits for pushed images.
    Receive,
    /// Binds and pushes images once asked with `can get`.
    Serve,
    /// Connects, asks with `can get`, then pulls images.
    Request,
}

impl Role {
    /// The pushing roles.
    pub fn is_sending(self) -> bool {
        matches!(self, Role::Send | Role::Serve)
    }

    /// How this side names itself in progress messages.
    pub fn actor(self) -> &'static str {
        match self {
            Role::Send => "sender",
            Role::Serve => "server",
            Role::Receive | Role::Request => "receiver",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::Send => "send",
            Role::Receive => "receive",
            Role::Serve => "serve",
            Role::Request => "request",
        })
    }
}

/// `Idle → Open → Closed`. Closed is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed; no peer yet.
    Idle,
    /// Socket paired with a peer.
    Open,
    /// Socket released. Every further call fails.
    Closed,
}
