use tracing::info;

use super::{Node, Tick};

impl Node {
    pub(crate) fn tick_follower(&mut self) -> Tick {
        let silence = self.last_heartbeat.elapsed();
        if silence > self.election_timeout {
            info!(
                "[{}] no leader heard from for {:?}, standing for election",
                self.id, silence
            );
            return Tick::Election(self.start_election());
        }
        Tick::Idle
    }
}
