//! Room membership tracking.
//!
//! Rooms scope which push events a connection receives. A join requested
//! while the transport is down is parked in a single slot and flushed on
//! the next connect; a newer request replaces an older one. Membership
//! does not survive a dropped link, so the joined room is parked again on
//! disconnect.

use std::fmt;

use super::transport::Frame;

/// A server-side broadcast group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RoomId {
    /// Personal room of a user (students and company accounts alike).
    User(String),
    /// Shared room of a company.
    Company(String),
}

impl RoomId {
    /// Outgoing event name of the join request.
    #[must_use]
    pub const fn join_event(&self) -> &'static str {
        match self {
            Self::User(_) => "join",
            Self::Company(_) => "join_company",
        }
    }

    /// The id inside the room.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::User(id) | Self::Company(id) => id,
        }
    }

    /// The frame that asks the server to join this room.
    #[must_use]
    pub fn join_frame(&self) -> Frame {
        Frame::new(
            self.join_event(),
            serde_json::Value::String(self.id().to_string()),
        )
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(id) => write!(f, "user:{id}"),
            Self::Company(id) => write!(f, "company:{id}"),
        }
    }
}

/// Single-slot pending join plus the last room actually joined.
#[derive(Debug, Default)]
pub struct RoomTracker {
    pending: Option<RoomId>,
    joined: Option<RoomId>,
}

impl RoomTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parks `room` until the next connect. Returns the request it
    /// replaced, if any.
    pub fn defer(&mut self, room: RoomId) -> Option<RoomId> {
        self.pending.replace(room)
    }

    /// Takes the pending request, leaving the slot empty.
    pub fn take_pending(&mut self) -> Option<RoomId> {
        self.pending.take()
    }

    /// Records that a join for `room` was sent.
    pub fn mark_joined(&mut self, room: RoomId) {
        self.joined = Some(room);
    }

    /// After a drop, parks the joined room again unless a newer request is
    /// already waiting. Returns the room that was parked.
    pub fn requeue_joined(&mut self) -> Option<&RoomId> {
        if self.pending.is_none() {
            self.pending = self.joined.take();
        }
        self.pending.as_ref()
    }

    /// Forgets the joined room. The pending request is kept.
    pub fn clear_joined(&mut self) {
        self.joined = None;
    }

    /// The parked request, if any.
    #[must_use]
    pub fn pending(&self) -> Option<&RoomId> {
        self.pending.as_ref()
    }

    /// The last room a join was sent for.
    #[must_use]
    pub fn joined(&self) -> Option<&RoomId> {
        self.joined.as_ref()
    }
}
