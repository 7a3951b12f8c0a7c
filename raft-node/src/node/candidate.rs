use std::time::Instant;

use tracing::info;

use raft_core::codec::{Message, Payload, Peer, VoteRequest};

use super::{Node, Role, Tick};

/// One round of vote solicitation: the request to fan out, the voters to
/// reach, and the term the round belongs to so that replies landing after
/// a newer round opened can be discarded.
pub(crate) struct Ballot {
    pub(crate) term: u64,
    pub(crate) request: Message,
    pub(crate) voters: Vec<Peer>,
}

impl Node {
    /// Enters (or re-enters) the candidate role and opens a new ballot for
    /// the next term.
    pub(crate) fn start_election(&mut self) -> Ballot {
        self.role = Role::Candidate;
        self.current_term += 1;
        self.voted_for = Some(self.id());
        self.last_election = Instant::now();
        self.election_timeout = self.timing.random_election_timeout();
        info!("[{}] campaigning in term {}", self.id, self.current_term);

        let request = Message::new(
            Payload::VoteRequest(VoteRequest {
                term: self.current_term,
                candidate_id: self.id(),
                last_log_index: self.log.last_index(),
                last_log_term: self.log.last_term(),
            }),
            self.id.clone(),
        );
        let voters = self
            .members
            .iter()
            .filter(|member| **member != self.id)
            .cloned()
            .collect();
        Ballot {
            term: self.current_term,
            request,
            voters,
        }
    }

    pub(crate) fn tick_candidate(&mut self) -> Tick {
        if self.last_election.elapsed() > self.election_timeout {
            info!(
                "[{}] election for term {} timed out, retrying",
                self.id, self.current_term
            );
            return Tick::Election(self.start_election());
        }
        Tick::Idle
    }

    /// Folds the replies of one ballot back in. A round is counted only if
    /// the node is still the same candidate in the same term; anything
    /// observed in a newer term forces an immediate step-down.
    pub(crate) fn tally_votes(&mut self, ballot_term: u64, replies: Vec<Option<Message>>) {
        if ballot_term != self.current_term || !matches!(self.role, Role::Candidate) {
            return;
        }

        let mut granted = 1; // our own vote
        let mut max_term = self.current_term;
        for reply in replies.into_iter().flatten() {
            if let Payload::VoteResponse(resp) = reply.payload {
                if resp.term > max_term {
                    max_term = resp.term;
                }
                if resp.vote_granted && resp.term == self.current_term {
                    granted += 1;
                }
            }
        }

        if max_term > self.current_term {
            info!(
                "[{}] saw term {} during the ballot, standing down",
                self.id, max_term
            );
            self.become_follower(max_term);
            return;
        }

        if granted >= self.majority() {
            info!(
                "[{}] won term {} with {} of {} votes",
                self.id,
                self.current_term,
                granted,
                self.members.len()
            );
            self.become_leader();
        }
    }
}
