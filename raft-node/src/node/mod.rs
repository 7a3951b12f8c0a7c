mod candidate;
mod follower;
mod leader;

pub(crate) use candidate::Ballot;

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use raft_core::codec::{
    AppendEntriesRequest, AppendEntriesResponse, ClientResponse, Message, Payload, Peer,
    StatusResponse, VoteRequest, VoteResponse,
};

use crate::config::{ClusterConfig, Timing};
use crate::log::Log;
use crate::state::{CommitCallback, KvStore, StateMachine};

/// A point-in-time readout of one node.
pub type Status = StatusResponse;

/// Leader-only bookkeeping, rebuilt on every election win.
#[derive(Debug)]
pub(crate) struct LeaderState {
    /// Next log index to send to each member, keyed by member id.
    next_index: HashMap<String, i64>,
    /// Highest log index known replicated on each member.
    match_index: HashMap<String, i64>,
}

impl LeaderState {
    fn new(members: &[Peer], log_len: usize) -> LeaderState {
        let mut state = LeaderState {
            next_index: HashMap::new(),
            match_index: HashMap::new(),
        };
        for member in members {
            state.next_index.insert(member.id(), log_len as i64);
            state.match_index.insert(member.id(), -1);
        }
        state
    }
}

pub(crate) enum Role {
    Follower,
    Candidate,
    Leader(LeaderState),
}

impl Role {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader(_) => "leader",
        }
    }
}

/// What the supervisor should fan out after one tick. Mutations all happen
/// under the node lock; the network I/O described here happens between
/// locks, and the replies are folded back in under the lock again.
pub(crate) enum Tick {
    Idle,
    /// Solicit votes from every other member and tally the replies.
    Election(Ballot),
    /// Send one AppendEntries batch per follower.
    Replicate {
        term: u64,
        batches: Vec<(Peer, Message)>,
    },
}

/// One consensus participant: the whole protocol state plus the handlers
/// that mutate it. Shared behind a mutex between the supervisor loop and
/// the connection handlers; whoever holds the lock is the single writer.
pub struct Node {
    id: Peer,
    members: Vec<Peer>,
    timing: Timing,

    // Persistent in a fault-tolerant build (see Log); memory-only here.
    current_term: u64,
    voted_for: Option<String>,
    log: Log,

    commit_index: i64,
    last_applied: i64,
    role: Role,

    state_machine: Box<dyn StateMachine>,
    on_commit: Option<CommitCallback>,

    election_timeout: Duration,
    last_heartbeat: Instant,
    last_election: Instant,
}

impl Node {
    pub fn new(config: &ClusterConfig) -> Node {
        Node::with_state_machine(config, Box::new(KvStore::new()))
    }

    /// Builds a node around a caller-supplied state machine.
    pub fn with_state_machine(
        config: &ClusterConfig,
        state_machine: Box<dyn StateMachine>,
    ) -> Node {
        Node {
            id: config.listen.clone(),
            members: config.members.clone(),
            election_timeout: config.timing.random_election_timeout(),
            timing: config.timing.clone(),
            current_term: 0,
            voted_for: None,
            log: Log::new(),
            commit_index: -1,
            last_applied: -1,
            role: Role::Follower,
            state_machine,
            on_commit: None,
            last_heartbeat: Instant::now(),
            last_election: Instant::now(),
        }
    }

    /// This node's `"host:port"` identifier.
    pub fn id(&self) -> String {
        self.id.id()
    }

    pub fn set_on_commit(&mut self, callback: CommitCallback) {
        self.on_commit = Some(callback);
    }

    fn majority(&self) -> usize {
        self.members.len() / 2 + 1
    }

    /// Re-arms the election timer with fresh randomness.
    fn reset_election_timer(&mut self) {
        self.last_heartbeat = Instant::now();
        self.election_timeout = self.timing.random_election_timeout();
    }

    /// Adopts `term` if newer and drops back to follower. A term bump while
    /// already following does not touch the election timer, so a stale
    /// candidate cannot keep deferring elections.
    fn become_follower(&mut self, term: u64) {
        if term > self.current_term {
            self.current_term = term;
            self.voted_for = None;
        }
        if !matches!(self.role, Role::Follower) {
            info!("[{}] following in term {}", self.id, self.current_term);
            self.role = Role::Follower;
            self.reset_election_timer();
        }
    }

    /// Advances timers and reports what I/O the supervisor should perform.
    pub(crate) fn tick(&mut self) -> Tick {
        match self.role {
            Role::Follower => self.tick_follower(),
            Role::Candidate => self.tick_candidate(),
            Role::Leader(_) => self.tick_leader(),
        }
    }

    /// Dispatches one inbound request and produces the reply, if any.
    pub(crate) fn handle_message(&mut self, message: Message) -> Option<Message> {
        let reply = match message.payload {
            Payload::VoteRequest(req) => {
                Some(Payload::VoteResponse(self.handle_vote_request(req)))
            }
            Payload::AppendEntries(req) => {
                Some(Payload::AppendResponse(self.handle_append_entries(req)))
            }
            Payload::ClientRequest(req) => Some(Payload::ClientResponse(ClientResponse {
                success: self.submit(&req.command),
            })),
            Payload::StatusRequest(_) => Some(Payload::StatusResponse(self.status())),
            // Responses travel on the connection that carried their
            // request; one arriving as a fresh request is dropped.
            Payload::VoteResponse(_)
            | Payload::AppendResponse(_)
            | Payload::ClientResponse(_)
            | Payload::StatusResponse(_) => {
                warn!(
                    "[{}] dropping unexpected {} from {}",
                    self.id,
                    message.payload.kind(),
                    message.sender
                );
                None
            }
        };
        reply.map(|payload| Message::new(payload, self.id.clone()))
    }

    fn handle_vote_request(&mut self, req: VoteRequest) -> VoteResponse {
        if req.term > self.current_term {
            self.become_follower(req.term);
        }

        let eligible = req.term >= self.current_term
            && (self.voted_for.is_none()
                || self.voted_for.as_deref() == Some(req.candidate_id.as_str()));
        let up_to_date = req.last_log_term > self.log.last_term()
            || (req.last_log_term == self.log.last_term()
                && req.last_log_index >= self.log.last_index());
        let granted = eligible && up_to_date;

        if granted {
            debug!(
                "[{}] voting for {} in term {}",
                self.id, req.candidate_id, self.current_term
            );
            self.voted_for = Some(req.candidate_id);
            self.reset_election_timer();
        } else {
            debug!(
                "[{}] denying vote to {} in term {}",
                self.id, req.candidate_id, self.current_term
            );
        }
        VoteResponse {
            term: self.current_term,
            vote_granted: granted,
        }
    }

    fn handle_append_entries(&mut self, req: AppendEntriesRequest) -> AppendEntriesResponse {
        if req.term > self.current_term {
            self.become_follower(req.term);
        }
        if req.term < self.current_term {
            // A deposed leader; answer with the newer term so it steps down.
            return AppendEntriesResponse {
                term: self.current_term,
                success: false,
                match_index: -1,
            };
        }
        // Valid leader contact for the current term.
        self.reset_election_timer();

        if !self.log.matches(req.prev_log_index, req.prev_log_term) {
            debug!(
                "[{}] rejecting entries after index {} from {}",
                self.id, req.prev_log_index, req.leader_id
            );
            return AppendEntriesResponse {
                term: self.current_term,
                success: false,
                match_index: -1,
            };
        }

        let match_index = self.log.splice(req.prev_log_index, req.entries);
        if req.leader_commit > self.commit_index {
            self.commit_index = req.leader_commit.min(self.log.last_index());
            self.apply_committed();
        }
        AppendEntriesResponse {
            term: self.current_term,
            success: true,
            match_index,
        }
    }

    /// Applies everything committed but not yet applied, in index order.
    fn apply_committed(&mut self) {
        while self.last_applied < self.commit_index {
            self.last_applied += 1;
            if let Some(entry) = self.log.get(self.last_applied) {
                self.state_machine.apply(entry);
                if let Some(callback) = &self.on_commit {
                    callback(entry);
                }
            }
        }
    }

    /// Appends a command to the log. Succeeds only on the leader;
    /// replication to the rest of the cluster follows asynchronously.
    pub fn submit(&mut self, command: &str) -> bool {
        if !matches!(self.role, Role::Leader(_)) {
            debug!("[{}] refusing command, not the leader", self.id);
            return false;
        }
        let index = self.log.append(self.current_term, command);
        info!("[{}] accepted command at index {}", self.id, index);
        true
    }

    pub fn status(&self) -> Status {
        Status {
            state: self.role.name().to_string(),
            term: self.current_term,
            voted_for: self.voted_for.clone(),
            log_length: self.log.len() as u64,
            commit_index: self.commit_index,
            last_applied: self.last_applied,
            state_machine: self.state_machine.snapshot(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use raft_core::codec::Entry;
    use std::sync::mpsc;

    fn cluster(size: u16) -> ClusterConfig {
        let members: Vec<Peer> = (0..size).map(|i| Peer::new("127.0.0.1", 5001 + i)).collect();
        ClusterConfig::new(members[0].clone(), members)
    }

    fn vote_request(term: u64, candidate: &str, last_index: i64, last_term: u64) -> VoteRequest {
        VoteRequest {
            term,
            candidate_id: candidate.to_string(),
            last_log_index: last_index,
            last_log_term: last_term,
        }
    }

    fn append_request(
        term: u64,
        prev_index: i64,
        prev_term: u64,
        entries: Vec<Entry>,
        commit: i64,
    ) -> AppendEntriesRequest {
        AppendEntriesRequest {
            term,
            leader_id: "127.0.0.1:5002".to_string(),
            prev_log_index: prev_index,
            prev_log_term: prev_term,
            entries,
            leader_commit: commit,
        }
    }

    #[test]
    fn test_stale_vote_request_is_rejected_without_timer_reset() {
        let mut node = Node::new(&cluster(3));
        node.current_term = 5;
        let armed = node.last_heartbeat;
        let timeout = node.election_timeout;

        let resp = node.handle_vote_request(vote_request(4, "127.0.0.1:5002", 10, 4));
        assert!(!resp.vote_granted);
        assert_eq!(resp.term, 5);
        assert_eq!(node.last_heartbeat, armed);
        assert_eq!(node.election_timeout, timeout);
        assert_eq!(node.voted_for, None);
    }

    #[test]
    fn test_vote_granted_once_per_term() {
        let mut node = Node::new(&cluster(3));
        let first = node.handle_vote_request(vote_request(1, "127.0.0.1:5002", -1, 0));
        assert!(first.vote_granted);
        // Same candidate may ask again and keep its vote.
        let again = node.handle_vote_request(vote_request(1, "127.0.0.1:5002", -1, 0));
        assert!(again.vote_granted);
        // A different candidate in the same term is refused.
        let other = node.handle_vote_request(vote_request(1, "127.0.0.1:5003", -1, 0));
        assert!(!other.vote_granted);
    }

    #[test]
    fn test_vote_requires_up_to_date_log() {
        let mut node = Node::new(&cluster(3));
        node.log.append(1, "SET a 1");
        node.log.append(2, "SET b 2");
        node.current_term = 2;

        // Shorter log with an equal last term loses.
        let short = node.handle_vote_request(vote_request(3, "127.0.0.1:5002", 0, 2));
        assert!(!short.vote_granted);
        // The higher term was still adopted.
        assert_eq!(node.current_term, 3);
        // Equal length and last term wins.
        let equal = node.handle_vote_request(vote_request(3, "127.0.0.1:5002", 1, 2));
        assert!(equal.vote_granted);
        assert_eq!(node.voted_for, Some("127.0.0.1:5002".to_string()));
    }

    #[test]
    fn test_empty_logs_grant_votes() {
        let mut node = Node::new(&cluster(3));
        let resp = node.handle_vote_request(vote_request(1, "127.0.0.1:5003", -1, 0));
        assert!(resp.vote_granted);
    }

    #[test]
    fn test_append_entries_from_the_past_is_refused() {
        let mut node = Node::new(&cluster(3));
        node.current_term = 3;
        let armed = node.last_heartbeat;
        let resp = node.handle_append_entries(append_request(2, -1, 0, vec![], -1));
        assert!(!resp.success);
        assert_eq!(resp.term, 3);
        assert_eq!(resp.match_index, -1);
        assert_eq!(node.last_heartbeat, armed);
    }

    #[test]
    fn test_append_entries_consistency_check() {
        let mut node = Node::new(&cluster(3));
        // prev_log_index -1 always passes.
        let resp = node.handle_append_entries(append_request(
            1,
            -1,
            0,
            vec![Entry::new(1, 0, "SET a 1")],
            -1,
        ));
        assert!(resp.success);
        assert_eq!(resp.match_index, 0);

        // A gap is refused.
        let resp = node.handle_append_entries(append_request(
            1,
            5,
            1,
            vec![Entry::new(1, 6, "SET b 2")],
            -1,
        ));
        assert!(!resp.success);
        assert_eq!(resp.match_index, -1);

        // A term mismatch at prev_log_index is refused.
        let resp = node.handle_append_entries(append_request(
            1,
            0,
            9,
            vec![Entry::new(1, 1, "SET b 2")],
            -1,
        ));
        assert!(!resp.success);
    }

    #[test]
    fn test_append_entries_replay_is_idempotent() {
        let mut node = Node::new(&cluster(3));
        let batch = vec![Entry::new(1, 0, "SET a 1"), Entry::new(1, 1, "SET b 2")];
        let first = node.handle_append_entries(append_request(1, -1, 0, batch.clone(), 0));
        assert!(first.success);
        assert_eq!(first.match_index, 1);
        let length = node.log.len();
        let commit = node.commit_index;

        let replay = node.handle_append_entries(append_request(1, -1, 0, batch, 0));
        assert!(replay.success);
        assert_eq!(replay.match_index, 1);
        assert_eq!(node.log.len(), length);
        assert_eq!(node.commit_index, commit);
    }

    #[test]
    fn test_append_entries_truncates_conflicts() {
        let mut node = Node::new(&cluster(3));
        node.handle_append_entries(append_request(
            1,
            -1,
            0,
            vec![
                Entry::new(1, 0, "SET a 1"),
                Entry::new(1, 1, "SET stale 1"),
                Entry::new(1, 2, "SET stale 2"),
            ],
            -1,
        ));
        // A leader for term 2 rewrites everything after index 0.
        let resp = node.handle_append_entries(append_request(
            2,
            0,
            1,
            vec![Entry::new(2, 1, "SET b 2")],
            -1,
        ));
        assert!(resp.success);
        assert_eq!(resp.match_index, 1);
        assert_eq!(node.log.len(), 2);
        assert_eq!(node.log.term_at(1), Some(2));
    }

    #[test]
    fn test_commit_index_follows_leader_commit() {
        let mut node = Node::new(&cluster(3));
        let batch = vec![Entry::new(1, 0, "SET a 1"), Entry::new(1, 1, "SET b 2")];
        // Leader commit past our log length is clamped to the tail.
        node.handle_append_entries(append_request(1, -1, 0, batch, 10));
        assert_eq!(node.commit_index, 1);
        assert_eq!(node.last_applied, 1);
        assert_eq!(
            node.status().state_machine.get("b"),
            Some(&"2".to_string())
        );

        // A smaller leader commit never moves it backwards.
        node.handle_append_entries(append_request(1, 1, 1, vec![], 0));
        assert_eq!(node.commit_index, 1);
    }

    #[test]
    fn test_commit_callback_sees_entries_in_order() {
        let mut node = Node::new(&cluster(3));
        let (tx, rx) = mpsc::channel();
        node.set_on_commit(Box::new(move |entry| {
            let _ = tx.send(entry.index);
        }));
        node.handle_append_entries(append_request(
            1,
            -1,
            0,
            vec![
                Entry::new(1, 0, "SET a 1"),
                Entry::new(1, 1, "GET a"),
                Entry::new(1, 2, "SET b 2"),
            ],
            2,
        ));
        let applied: Vec<i64> = rx.try_iter().collect();
        assert_eq!(applied, vec![0, 1, 2]);
    }

    #[test]
    fn test_submit_refused_off_leader() {
        let mut node = Node::new(&cluster(3));
        assert!(!node.submit("SET a 1"));
        node.role = Role::Candidate;
        assert!(!node.submit("SET a 1"));

        node.become_leader();
        assert!(node.submit("SET a 1"));
        assert_eq!(node.log.len(), 1);
        assert_eq!(node.log.term_at(0), Some(0));
    }

    #[test]
    fn test_status_snapshot() {
        let node = Node::new(&cluster(3));
        let status = node.status();
        assert_eq!(status.state, "follower");
        assert_eq!(status.term, 0);
        assert_eq!(status.voted_for, None);
        assert_eq!(status.log_length, 0);
        assert_eq!(status.commit_index, -1);
        assert_eq!(status.last_applied, -1);
        assert!(status.state_machine.is_empty());
    }

    #[test]
    fn test_election_produces_ballot_and_majority_wins() {
        let mut node = Node::new(&cluster(3));
        let ballot = node.start_election();
        assert_eq!(ballot.term, 1);
        assert_eq!(ballot.voters.len(), 2);
        assert_eq!(node.role.name(), "candidate");
        assert_eq!(node.voted_for, Some(node.id()));

        let grant = Message::new(
            Payload::VoteResponse(VoteResponse {
                term: 1,
                vote_granted: true,
            }),
            Peer::new("127.0.0.1", 5002),
        );
        node.tally_votes(ballot.term, vec![Some(grant), None]);
        assert_eq!(node.role.name(), "leader");
    }

    #[test]
    fn test_tally_ignores_stale_ballots() {
        let mut node = Node::new(&cluster(3));
        let stale = node.start_election();
        // A second timeout opens a new ballot before the replies land.
        let _fresh = node.start_election();
        let grant = Message::new(
            Payload::VoteResponse(VoteResponse {
                term: stale.term,
                vote_granted: true,
            }),
            Peer::new("127.0.0.1", 5002),
        );
        node.tally_votes(stale.term, vec![Some(grant)]);
        assert_eq!(node.role.name(), "candidate");
    }

    #[test]
    fn test_tally_steps_down_on_newer_term() {
        let mut node = Node::new(&cluster(3));
        let ballot = node.start_election();
        let refusal = Message::new(
            Payload::VoteResponse(VoteResponse {
                term: 9,
                vote_granted: false,
            }),
            Peer::new("127.0.0.1", 5002),
        );
        node.tally_votes(ballot.term, vec![Some(refusal), None]);
        assert_eq!(node.role.name(), "follower");
        assert_eq!(node.current_term, 9);
        assert_eq!(node.voted_for, None);
    }

    #[test]
    fn test_singleton_wins_with_no_voters() {
        let mut node = Node::new(&cluster(1));
        let ballot = node.start_election();
        assert!(ballot.voters.is_empty());
        node.tally_votes(ballot.term, vec![]);
        assert_eq!(node.role.name(), "leader");
    }

    #[test]
    fn test_leader_advances_commit_on_majority() {
        let mut node = Node::new(&cluster(3));
        let ballot = node.start_election();
        node.tally_votes(
            ballot.term,
            vec![Some(Message::new(
                Payload::VoteResponse(VoteResponse {
                    term: 1,
                    vote_granted: true,
                }),
                Peer::new("127.0.0.1", 5002),
            ))],
        );
        assert!(node.submit("SET a 1"));
        assert!(node.submit("SET b 2"));

        // One follower acknowledging both entries makes a majority together
        // with the leader's own copy.
        let peer = Peer::new("127.0.0.1", 5002);
        let ack = Message::new(
            Payload::AppendResponse(AppendEntriesResponse {
                term: 1,
                success: true,
                match_index: 1,
            }),
            peer.clone(),
        );
        node.record_append_response(1, &peer, Some(ack));
        node.tick();
        assert_eq!(node.commit_index, 1);
        assert_eq!(node.last_applied, 1);

        // Entries from a prior term alone never advance the commit index.
        let mut stale = Node::new(&cluster(3));
        stale.current_term = 1;
        stale.log.append(1, "SET old 1");
        let ballot = stale.start_election();
        stale.tally_votes(
            ballot.term,
            vec![Some(Message::new(
                Payload::VoteResponse(VoteResponse {
                    term: 2,
                    vote_granted: true,
                }),
                Peer::new("127.0.0.1", 5002),
            ))],
        );
        let ack = Message::new(
            Payload::AppendResponse(AppendEntriesResponse {
                term: 2,
                success: true,
                match_index: 0,
            }),
            peer.clone(),
        );
        stale.record_append_response(2, &peer, Some(ack));
        stale.tick();
        assert_eq!(stale.commit_index, -1);
    }

    #[test]
    fn test_leader_steps_down_on_newer_append_response() {
        let mut node = Node::new(&cluster(3));
        let ballot = node.start_election();
        node.tally_votes(
            ballot.term,
            vec![Some(Message::new(
                Payload::VoteResponse(VoteResponse {
                    term: 1,
                    vote_granted: true,
                }),
                Peer::new("127.0.0.1", 5002),
            ))],
        );
        let peer = Peer::new("127.0.0.1", 5003);
        let refusal = Message::new(
            Payload::AppendResponse(AppendEntriesResponse {
                term: 4,
                success: false,
                match_index: -1,
            }),
            peer.clone(),
        );
        node.record_append_response(1, &peer, Some(refusal));
        assert_eq!(node.role.name(), "follower");
        assert_eq!(node.current_term, 4);
    }

    #[test]
    fn test_rejection_walks_next_index_back() {
        let mut node = Node::new(&cluster(3));
        node.log.append(1, "SET a 1");
        node.log.append(1, "SET b 2");
        node.current_term = 1;
        let ballot = node.start_election();
        node.tally_votes(
            ballot.term,
            vec![Some(Message::new(
                Payload::VoteResponse(VoteResponse {
                    term: 2,
                    vote_granted: true,
                }),
                Peer::new("127.0.0.1", 5002),
            ))],
        );
        let peer = Peer::new("127.0.0.1", 5002);
        let nack = Message::new(
            Payload::AppendResponse(AppendEntriesResponse {
                term: 2,
                success: false,
                match_index: -1,
            }),
            peer.clone(),
        );
        node.record_append_response(2, &peer, Some(nack.clone()));
        match &node.role {
            Role::Leader(state) => {
                assert_eq!(state.next_index.get(&peer.id()), Some(&1));
            }
            _ => panic!("expected leader"),
        }
        // The floor is zero, never negative.
        node.record_append_response(2, &peer, Some(nack.clone()));
        node.record_append_response(2, &peer, Some(nack));
        match &node.role {
            Role::Leader(state) => {
                assert_eq!(state.next_index.get(&peer.id()), Some(&0));
            }
            _ => panic!("expected leader"),
        }
    }

    #[test]
    fn test_heartbeat_batches_cover_every_follower() {
        let mut node = Node::new(&cluster(3));
        let ballot = node.start_election();
        node.tally_votes(
            ballot.term,
            vec![Some(Message::new(
                Payload::VoteResponse(VoteResponse {
                    term: 1,
                    vote_granted: true,
                }),
                Peer::new("127.0.0.1", 5002),
            ))],
        );
        node.submit("SET a 1");

        match node.tick() {
            Tick::Replicate { term, batches } => {
                assert_eq!(term, 1);
                assert_eq!(batches.len(), 2);
                for (peer, message) in batches {
                    assert_ne!(peer, node.id);
                    match message.payload {
                        Payload::AppendEntries(req) => {
                            assert_eq!(req.term, 1);
                            assert_eq!(req.prev_log_index, -1);
                            assert_eq!(req.prev_log_term, 0);
                            assert_eq!(req.entries.len(), 1);
                        }
                        other => panic!("unexpected payload {:?}", other),
                    }
                }
            }
            _ => panic!("expected a replication round"),
        }
    }
}
