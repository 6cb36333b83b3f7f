//! Board registry
//!
//! Last known board set, keyed by port name, and the diff that turns each
//! discovery result into the notifications observers should see.

use std::collections::{BTreeMap, BTreeSet};

use ledboard_core::ListedBoard;
use tracing::debug;

use super::events::BoardEvent;

/// Known boards plus the ports awaiting a forced notification
#[derive(Debug, Default)]
pub struct BoardRegistry {
    boards: BTreeMap<String, ListedBoard>,
    pending_refresh: BTreeSet<String>,
    pending_reboot: BTreeSet<String>,
}

impl BoardRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Diff a discovery result against the known boards.
    ///
    /// Ports seen on both sides emit `BoardChanged` when their availability
    /// flipped, and drain their pending refresh or reboot. A membership
    /// change replaces the whole map and emits a single `BoardsListed`;
    /// pending refreshes and reboots of ports that just appeared are
    /// reported after it.
    pub fn apply(&mut self, discovered: Vec<ListedBoard>) -> Vec<BoardEvent> {
        let current: BTreeMap<String, ListedBoard> = discovered
            .into_iter()
            .map(|board| (board.port.clone(), board))
            .collect();

        let mut events = Vec::new();

        for (port, board) in &current {
            let Some(known) = self.boards.get_mut(port) else {
                continue;
            };

            let flipped = known.available != board.available;
            if flipped {
                *known = board.clone();
                events.push(BoardEvent::BoardChanged(board.clone()));
            }

            // A refresh coincident with a flip is satisfied by that flip
            if self.pending_refresh.remove(port) && !flipped {
                events.push(BoardEvent::BoardChanged(board.clone()));
            }

            if self.pending_reboot.remove(port) {
                events.push(BoardEvent::BoardRebooted(board.clone()));
            }
        }

        if !self.boards.keys().eq(current.keys()) {
            let appeared: Vec<String> = current
                .keys()
                .filter(|port| !self.boards.contains_key(*port))
                .cloned()
                .collect();

            debug!(
                "Board set changed: {} -> {} board(s)",
                self.boards.len(),
                current.len()
            );
            self.boards = current;
            events.push(BoardEvent::BoardsListed(self.boards()));

            for port in appeared {
                let Some(board) = self.boards.get(&port) else {
                    continue;
                };
                if self.pending_refresh.remove(&port) {
                    events.push(BoardEvent::BoardChanged(board.clone()));
                }
                if self.pending_reboot.remove(&port) {
                    events.push(BoardEvent::BoardRebooted(board.clone()));
                }
            }
        }

        events
    }

    /// Force a `BoardChanged` for this port on the next tick that sees it
    pub fn request_refresh(&mut self, port: impl Into<String>) {
        self.pending_refresh.insert(port.into());
    }

    /// Report `BoardRebooted` for this port on the next tick that sees it
    pub fn expect_reboot(&mut self, port: impl Into<String>) {
        self.pending_reboot.insert(port.into());
    }

    pub fn is_refresh_pending(&self, port: &str) -> bool {
        self.pending_refresh.contains(port)
    }

    pub fn is_reboot_pending(&self, port: &str) -> bool {
        self.pending_reboot.contains(port)
    }

    /// Snapshot of the known boards, ordered by port
    pub fn boards(&self) -> Vec<ListedBoard> {
        self.boards.values().cloned().collect()
    }

    pub fn get(&self, port: &str) -> Option<&ListedBoard> {
        self.boards.get(port)
    }

    pub fn len(&self) -> usize {
        self.boards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boards.is_empty()
    }

    /// Forget every board and pending request
    pub fn clear(&mut self) {
        self.boards.clear();
        self.pending_refresh.clear();
        self.pending_reboot.clear();
    }
}
