//! Shared audio device arbitration
//!
//! One physical device is both microphone and speaker (a Jabra puck on the
//! reference hardware). Capturing while playing feeds the speaker back into
//! the mic and self-triggers the wake word, so exactly one role may hold the
//! device at a time. The arbiter is a three-state machine guarded by a single
//! mutex; requests are synchronous accept/reject with no queueing, and output
//! preempts an in-progress listen.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Role currently holding the audio device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Device free
    Idle,
    /// Microphone claimed
    Listening,
    /// Speaker claimed
    Speaking,
}

struct Inner {
    state: DeviceState,
    /// Set when an output request preempted a listener; the listener must
    /// observe it (via [`AudioArbiter::take_interrupt`]) and abandon capture.
    listen_interrupted: bool,
}

/// Arbitrates exclusive access to the shared microphone/speaker device.
///
/// Constructed once at startup and handed by `Arc` to every adapter that
/// touches the audio hardware. All transitions happen under one lock; state
/// queries take the same lock so a listener can never observe a stale `Idle`
/// just as playback begins.
pub struct AudioArbiter {
    device_name: String,
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl AudioArbiter {
    /// Create an arbiter for the named device
    #[must_use]
    pub fn new(device_name: &str) -> Self {
        tracing::debug!(device = device_name, "audio arbiter initialized");
        Self {
            device_name: device_name.to_string(),
            inner: Mutex::new(Inner {
                state: DeviceState::Idle,
                listen_interrupted: false,
            }),
            changed: Condvar::new(),
        }
    }

    /// Request the device for input (microphone).
    ///
    /// Granted only from `Idle`. Rejected while `Speaking` (listening must
    /// wait for the speaker to release) and while already `Listening`.
    /// Never blocks; the caller owns its retry policy.
    #[must_use]
    pub fn request_input(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            DeviceState::Idle => {
                inner.state = DeviceState::Listening;
                inner.listen_interrupted = false;
                tracing::trace!(device = %self.device_name, "input claim granted");
                true
            }
            DeviceState::Listening | DeviceState::Speaking => {
                tracing::trace!(
                    device = %self.device_name,
                    state = ?inner.state,
                    "input claim rejected"
                );
                false
            }
        }
    }

    /// Request the device for output (speaker).
    ///
    /// Granted from `Idle`. Granted from `Listening` too: output preempts
    /// input, and the interrupted listener is signalled through
    /// [`Self::take_interrupt`]. Rejected while already `Speaking` — the
    /// speech worker is the sole output claimant, so a reentrant request is a
    /// caller bug, not a benign no-op.
    #[must_use]
    pub fn request_output(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            DeviceState::Idle => {
                inner.state = DeviceState::Speaking;
                tracing::trace!(device = %self.device_name, "output claim granted");
                true
            }
            DeviceState::Listening => {
                inner.state = DeviceState::Speaking;
                inner.listen_interrupted = true;
                tracing::debug!(
                    device = %self.device_name,
                    "output preempts in-progress listen"
                );
                true
            }
            DeviceState::Speaking => {
                tracing::trace!(device = %self.device_name, "output claim rejected, already speaking");
                false
            }
        }
    }

    /// Release the device back to `Idle`. Idempotent; legal from any state.
    pub fn release(&self) {
        let mut inner = self.lock();
        let previous = inner.state;
        inner.state = DeviceState::Idle;
        drop(inner);
        if previous != DeviceState::Idle {
            tracing::trace!(device = %self.device_name, from = ?previous, "device released");
        }
        self.changed.notify_all();
    }

    /// Current state (lock-protected read)
    #[must_use]
    pub fn state(&self) -> DeviceState {
        self.lock().state
    }

    /// True while the speaker holds the device. Listeners use this to reset
    /// their silence timeouts; it takes the transition lock, never a racy peek.
    #[must_use]
    pub fn is_speaking(&self) -> bool {
        self.lock().state == DeviceState::Speaking
    }

    /// Consume the pending listen-interrupt flag, if set.
    ///
    /// Returns true exactly once after an output request preempted a
    /// listener; the listener must then abandon its capture cycle.
    #[must_use]
    pub fn take_interrupt(&self) -> bool {
        let mut inner = self.lock();
        std::mem::take(&mut inner.listen_interrupted)
    }

    /// Wait until the device is idle, up to `timeout`. Returns whether the
    /// device was observed idle.
    #[must_use]
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        while inner.state != DeviceState::Idle {
            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return false;
            };
            let (guard, _) = self
                .changed
                .wait_timeout(inner, remaining)
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            inner = guard;
        }
        true
    }

    /// Scoped output claim; releases on drop.
    #[must_use]
    pub fn claim_output(self: &Arc<Self>) -> Option<Claim> {
        self.request_output().then(|| Claim {
            arbiter: Arc::clone(self),
        })
    }

    /// Scoped input claim; releases on drop.
    #[must_use]
    pub fn claim_input(self: &Arc<Self>) -> Option<Claim> {
        self.request_input().then(|| Claim {
            arbiter: Arc::clone(self),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// RAII claim on the audio device. Dropping it releases the device, which
/// keeps the acquire-use-release discipline on every exit path.
pub struct Claim {
    arbiter: Arc<AudioArbiter>,
}

impl Drop for Claim {
    fn drop(&mut self) {
        self.arbiter.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_grants_either_role() {
        let arbiter = AudioArbiter::new("jabra");
        assert!(arbiter.request_input());
        assert_eq!(arbiter.state(), DeviceState::Listening);
        arbiter.release();

        assert!(arbiter.request_output());
        assert_eq!(arbiter.state(), DeviceState::Speaking);
        arbiter.release();
        assert_eq!(arbiter.state(), DeviceState::Idle);
    }

    #[test]
    fn output_preempts_listening_and_signals_listener() {
        let arbiter = AudioArbiter::new("jabra");
        assert!(arbiter.request_input());
        assert!(!arbiter.take_interrupt());

        assert!(arbiter.request_output());
        assert_eq!(arbiter.state(), DeviceState::Speaking);
        assert!(arbiter.take_interrupt());
        // Flag is consumed exactly once
        assert!(!arbiter.take_interrupt());

        arbiter.release();
        assert_eq!(arbiter.state(), DeviceState::Idle);
    }

    #[test]
    fn listening_rejects_second_input() {
        let arbiter = AudioArbiter::new("jabra");
        assert!(arbiter.request_input());
        assert!(!arbiter.request_input());
        assert_eq!(arbiter.state(), DeviceState::Listening);
    }

    #[test]
    fn speaking_rejects_both_requests() {
        let arbiter = AudioArbiter::new("jabra");
        assert!(arbiter.request_output());
        assert!(!arbiter.request_input());
        assert!(!arbiter.request_output());
        assert_eq!(arbiter.state(), DeviceState::Speaking);
    }

    #[test]
    fn release_is_idempotent() {
        let arbiter = AudioArbiter::new("jabra");
        arbiter.release();
        arbiter.release();
        assert_eq!(arbiter.state(), DeviceState::Idle);
    }

    #[test]
    fn claim_releases_on_drop() {
        let arbiter = Arc::new(AudioArbiter::new("jabra"));
        {
            let claim = arbiter.claim_output();
            assert!(claim.is_some());
            assert!(arbiter.is_speaking());
            assert!(arbiter.claim_output().is_none());
        }
        assert_eq!(arbiter.state(), DeviceState::Idle);
    }

    #[test]
    fn wait_until_idle_times_out_while_held() {
        let arbiter = AudioArbiter::new("jabra");
        assert!(arbiter.request_output());
        assert!(!arbiter.wait_until_idle(Duration::from_millis(20)));
        arbiter.release();
        assert!(arbiter.wait_until_idle(Duration::from_millis(20)));
    }

    #[test]
    fn contending_threads_never_share_the_device() {
        const ROUNDS: usize = 500;
        let arbiter = Arc::new(AudioArbiter::new("jabra"));
        let barrier = Arc::new(std::sync::Barrier::new(2));

        // Listener thread races an input request against the output request
        // below, once per round. Barriers bound each round: requests happen
        // between the first two waits, resolution before the third.
        let listener = {
            let arbiter = Arc::clone(&arbiter);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                let mut granted = 0usize;
                for _ in 0..ROUNDS {
                    barrier.wait();
                    if arbiter.request_input() {
                        granted += 1;
                    }
                    barrier.wait();
                    barrier.wait();
                }
                granted
            })
        };

        let mut preempted = 0usize;
        for _ in 0..ROUNDS {
            barrier.wait();
            let output_granted = arbiter.request_output();
            barrier.wait();
            // Whichever request won the race, the speaker role holds the
            // device alone once both have been made
            assert!(output_granted);
            assert_eq!(arbiter.state(), DeviceState::Speaking);
            if arbiter.take_interrupt() {
                preempted += 1;
            }
            arbiter.release();
            barrier.wait();
        }

        // Every listen grant that overlapped the speaker was preempted; a
        // grant without a preemption would mean both roles held the device
        let granted = listener.join().unwrap();
        assert_eq!(granted, preempted);
    }

    #[test]
    fn wait_until_idle_wakes_on_release() {
        let arbiter = Arc::new(AudioArbiter::new("jabra"));
        assert!(arbiter.request_output());

        let waiter = Arc::clone(&arbiter);
        let handle = std::thread::spawn(move || waiter.wait_until_idle(Duration::from_secs(2)));

        std::thread::sleep(Duration::from_millis(30));
        arbiter.release();
        assert!(handle.join().unwrap());
    }
}
