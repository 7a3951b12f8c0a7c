use std::time::Instant;

use tracing::{debug, info};

use raft_core::codec::{AppendEntriesRequest, Message, Payload, Peer};

use super::{LeaderState, Node, Role, Tick};

impl Node {
    /// Installs the leader role: fresh per-member indices, and a heartbeat
    /// clock backdated so the first batch goes out on the very next tick.
    pub(crate) fn become_leader(&mut self) {
        self.role = Role::Leader(LeaderState::new(&self.members, self.log.len()));
        self.last_heartbeat = Instant::now()
            .checked_sub(self.timing.heartbeat_interval())
            .unwrap_or_else(Instant::now);
    }

    pub(crate) fn tick_leader(&mut self) -> Tick {
        // Commit progress and application happen every tick, replication
        // only on the heartbeat cadence.
        self.advance_commit_index();
        self.apply_committed();

        if self.last_heartbeat.elapsed() >= self.timing.heartbeat_interval() {
            self.last_heartbeat = Instant::now();
            return Tick::Replicate {
                term: self.current_term,
                batches: self.replication_batches(),
            };
        }
        Tick::Idle
    }

    /// Builds one AppendEntries per follower, each starting at that
    /// follower's next index. An up-to-date follower gets an empty batch.
    fn replication_batches(&self) -> Vec<(Peer, Message)> {
        let state = match &self.role {
            Role::Leader(state) => state,
            _ => return Vec::new(),
        };
        let mut batches = Vec::new();
        for member in &self.members {
            if *member == self.id {
                continue;
            }
            let next = state
                .next_index
                .get(&member.id())
                .copied()
                .unwrap_or(self.log.len() as i64);
            let prev_log_index = next - 1;
            let prev_log_term = self.log.term_at(prev_log_index).unwrap_or(0);
            let request = AppendEntriesRequest {
                term: self.current_term,
                leader_id: self.id.id(),
                prev_log_index,
                prev_log_term,
                entries: self.log.entries_from(next),
                leader_commit: self.commit_index,
            };
            batches.push((
                member.clone(),
                Message::new(Payload::AppendEntries(request), self.id.clone()),
            ));
        }
        batches
    }

    /// Folds one follower's reply back into the bookkeeping. Rounds from a
    /// superseded term or role are discarded.
    pub(crate) fn record_append_response(
        &mut self,
        round_term: u64,
        peer: &Peer,
        reply: Option<Message>,
    ) {
        if round_term != self.current_term || !matches!(self.role, Role::Leader(_)) {
            return;
        }
        let resp = match reply {
            Some(Message {
                payload: Payload::AppendResponse(resp),
                ..
            }) => resp,
            // Silence, or some other payload; the next heartbeat retries.
            _ => return,
        };

        if resp.term > self.current_term {
            info!(
                "[{}] follower {} is already in term {}, stepping down",
                self.id, peer, resp.term
            );
            self.become_follower(resp.term);
            return;
        }

        let state = match &mut self.role {
            Role::Leader(state) => state,
            _ => return,
        };
        let id = peer.id();
        if resp.success {
            if resp.match_index >= 0 {
                state.match_index.insert(id.clone(), resp.match_index);
                state.next_index.insert(id, resp.match_index + 1);
            }
        } else {
            // Walk back one entry and retry on the next heartbeat.
            let next = state.next_index.entry(id).or_insert(0);
            if *next > 0 {
                *next -= 1;
            }
        }
    }

    /// Advances the commit index to the highest index replicated on a
    /// majority, counting this node's own log tail, and only for entries
    /// written in the current term.
    fn advance_commit_index(&mut self) {
        let state = match &self.role {
            Role::Leader(state) => state,
            _ => return,
        };
        let mut indices: Vec<i64> = self
            .members
            .iter()
            .map(|member| {
                if *member == self.id {
                    self.log.last_index()
                } else {
                    state.match_index.get(&member.id()).copied().unwrap_or(-1)
                }
            })
            .collect();
        indices.sort_unstable_by(|a, b| b.cmp(a));
        let majority_index = indices[indices.len() / 2];

        if majority_index > self.commit_index
            && self.log.term_at(majority_index) == Some(self.current_term)
        {
            debug!("[{}] commit index advanced to {}", self.id, majority_index);
            self.commit_index = majority_index;
        }
    }
}
