// Leader/follower mirroring: sample the leader joints, low-pass the samples,
// command the follower. Runs anywhere the codec runs.

use embedded_io::{Read, Write};

use log::{debug, warn};

use crate::{CENTER_POSITION, clamp_position, move_to_position, read_position};

pub const DEFAULT_ALPHA: f32 = 0.2;
/// Follower positions are only read back every n-th step to keep the bus free
/// for goal writes.
pub const FOLLOWER_READBACK_INTERVAL: u32 = 10;

/// Per-joint exponential moving average. The first sample seeds the filter so
/// the follower does not lurch from an arbitrary initial state.
#[derive(Debug, Clone, Copy)]
pub struct Smoother<const N: usize> {
    alpha: f32,
    state: [f32; N],
    primed: bool,
}

impl<const N: usize> Smoother<N> {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            state: [0.0; N],
            primed: false,
        }
    }

    pub fn apply(&mut self, sample: &[u16; N]) -> [u16; N] {
        if !self.primed {
            for (slot, &value) in self.state.iter_mut().zip(sample.iter()) {
                *slot = value as f32;
            }
            self.primed = true;
        } else {
            for (slot, &value) in self.state.iter_mut().zip(sample.iter()) {
                *slot = self.alpha * value as f32 + (1.0 - self.alpha) * *slot;
            }
        }

        let mut out = [0u16; N];
        for (slot, &value) in out.iter_mut().zip(self.state.iter()) {
            *slot = clamp_position((value + 0.5) as i32);
        }
        out
    }

    pub fn reset(&mut self) {
        self.primed = false;
    }
}

/// Command every joint of a pose, returning how many writes failed.
pub fn write_pose<P: Read + Write, const N: usize>(
    port: &mut P,
    buffer: &mut [u8],
    servo_ids: &[u8; N],
    pose: &[u16; N],
) -> usize {
    let mut failures = 0;
    for (&id, &position) in servo_ids.iter().zip(pose.iter()) {
        let position = clamp_position(position as i32);
        if let Err(e) = move_to_position(port, buffer, id, position, None, None) {
            warn!("Failed to command servo {}: {}", id, e);
            failures += 1;
        }
    }
    failures
}

#[derive(Debug)]
pub struct Teleop<const N: usize> {
    pub servo_ids: [u8; N],
    pub leader_positions: [u16; N],
    pub follower_positions: [u16; N],
    pub iterations: u32,
    pub read_failures: u32,
    pub write_failures: u32,
    smoother: Smoother<N>,
    active: bool,
}

impl<const N: usize> Teleop<N> {
    pub fn new(servo_ids: &[u8; N], alpha: f32) -> Self {
        Self {
            servo_ids: *servo_ids,
            leader_positions: [CENTER_POSITION; N],
            follower_positions: [CENTER_POSITION; N],
            iterations: 0,
            read_failures: 0,
            write_failures: 0,
            smoother: Smoother::new(alpha),
            active: true,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        // Re-seed the filter on resume, the leader may have moved meanwhile.
        if active && !self.active {
            self.smoother.reset();
        }
        self.active = active;
    }

    pub fn toggle_active(&mut self) {
        self.set_active(!self.active);
    }

    /// One mirror iteration. A failed joint read keeps its last known value;
    /// errors are counted, never fatal.
    pub fn step<L: Read + Write, F: Read + Write>(
        &mut self,
        leader: &mut L,
        follower: &mut F,
        buffer: &mut [u8],
    ) {
        self.iterations += 1;
        if !self.active {
            return;
        }

        for (index, &id) in self.servo_ids.iter().enumerate() {
            match read_position(leader, buffer, id) {
                Ok(position) => self.leader_positions[index] = position,
                Err(e) => {
                    debug!("Leader read failed for servo {}: {}", id, e);
                    self.read_failures += 1;
                }
            }
        }

        let targets = self.smoother.apply(&self.leader_positions);
        for (index, &id) in self.servo_ids.iter().enumerate() {
            match move_to_position(follower, buffer, id, targets[index], None, None) {
                Ok(()) => self.follower_positions[index] = targets[index],
                Err(e) => {
                    debug!("Follower write failed for servo {}: {}", id, e);
                    self.write_failures += 1;
                }
            }
        }

        if self.iterations % FOLLOWER_READBACK_INTERVAL == 0 {
            for (index, &id) in self.servo_ids.iter().enumerate() {
                if let Ok(position) = read_position(follower, buffer, id) {
                    self.follower_positions[index] = position;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::ScriptedPort;

    #[test]
    fn smoother_seeds_on_first_sample() {
        let mut smoother: Smoother<2> = Smoother::new(DEFAULT_ALPHA);
        assert_eq!(smoother.apply(&[1000, 3000]), [1000, 3000]);
    }

    #[test]
    fn smoother_damps_a_step_change() {
        let mut smoother: Smoother<1> = Smoother::new(DEFAULT_ALPHA);
        smoother.apply(&[2048]);
        let smoothed = smoother.apply(&[2148]);
        // 0.2 * 2148 + 0.8 * 2048 = 2068
        assert_eq!(smoothed, [2068]);
    }

    #[test]
    fn smoother_converges_on_a_constant_input() {
        let mut smoother: Smoother<1> = Smoother::new(DEFAULT_ALPHA);
        smoother.apply(&[0]);
        let mut last = [0u16; 1];
        for _ in 0..100 {
            last = smoother.apply(&[4000]);
        }
        assert!(last[0] >= 3999);
    }

    #[test]
    fn step_mirrors_leader_onto_follower() {
        let ids = [1u8, 2];
        let mut teleop: Teleop<2> = Teleop::new(&ids, DEFAULT_ALPHA);
        let mut buffer = [0u8; 64];

        let mut leader = ScriptedPort::new();
        leader.push_status_reply(1, 0, &1500u16.to_le_bytes());
        leader.push_status_reply(2, 0, &2500u16.to_le_bytes());

        let mut follower = ScriptedPort::new();
        follower.push_status_reply(1, 0, &[]);
        follower.push_status_reply(2, 0, &[]);

        teleop.step(&mut leader, &mut follower, &mut buffer);

        assert_eq!(teleop.leader_positions, [1500, 2500]);
        assert_eq!(teleop.follower_positions, [1500, 2500]);
        assert_eq!(teleop.read_failures, 0);
        assert_eq!(teleop.write_failures, 0);
        // Both goal writes hit the wire: two 9-byte packets, goal only.
        assert_eq!(follower.sent.len(), 18);
    }

    #[test]
    fn step_keeps_last_known_position_on_read_failure() {
        let ids = [1u8];
        let mut teleop: Teleop<1> = Teleop::new(&ids, DEFAULT_ALPHA);
        let mut buffer = [0u8; 64];

        let mut leader = ScriptedPort::new();
        leader.push_status_reply(1, 0, &1200u16.to_le_bytes());
        let mut follower = ScriptedPort::new();
        follower.push_status_reply(1, 0, &[]);
        follower.push_status_reply(1, 0, &[]);

        teleop.step(&mut leader, &mut follower, &mut buffer);
        assert_eq!(teleop.leader_positions, [1200]);

        // Leader has no more replies queued: the read fails, the last
        // sample is reused and the failure is counted.
        teleop.step(&mut leader, &mut follower, &mut buffer);
        assert_eq!(teleop.leader_positions, [1200]);
        assert_eq!(teleop.read_failures, 1);
    }

    #[test]
    fn paused_session_stays_quiet() {
        let ids = [1u8];
        let mut teleop: Teleop<1> = Teleop::new(&ids, DEFAULT_ALPHA);
        let mut buffer = [0u8; 64];

        let mut leader = ScriptedPort::new();
        let mut follower = ScriptedPort::new();

        teleop.set_active(false);
        teleop.step(&mut leader, &mut follower, &mut buffer);

        assert!(follower.sent.is_empty());
        assert_eq!(teleop.read_failures, 0);
    }

    #[test]
    fn write_pose_counts_dead_joints() {
        let mut port = ScriptedPort::new();
        port.push_status_reply(1, 0, &[]);
        // No reply queued for servo 2.
        let mut buffer = [0u8; 64];

        let failures = write_pose(&mut port, &mut buffer, &[1u8, 2], &[2048, 2048]);
        assert_eq!(failures, 1);
    }
}
