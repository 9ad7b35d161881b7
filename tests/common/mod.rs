// Scripted stand-in for the native canceller
//
// Passes the capture frame through as output, stamps each linear frame with
// its 1-based frame number and counts creations and releases.

#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aec_sync_lib::audio::canceller::{CancellerConfig, CancellerFactory, EchoCanceller};
use aec_sync_lib::audio::AudioBuffer;
use aec_sync_lib::{AecError, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Default)]
pub struct ScriptedFactory {
    /// Fail this frame index with a rejected status
    pub fail_at: Option<usize>,
    /// Refuse to create a canceller at all
    pub fail_create: bool,
    pub created: Arc<AtomicUsize>,
    pub dropped: Arc<AtomicUsize>,
    pub delays: Rc<RefCell<Vec<i32>>>,
    pub configs: RefCell<Vec<CancellerConfig>>,
}

impl ScriptedFactory {
    pub fn failing_at(frame_index: usize) -> Self {
        Self {
            fail_at: Some(frame_index),
            ..Default::default()
        }
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }
}

impl CancellerFactory for ScriptedFactory {
    fn create(&self, config: &CancellerConfig) -> Result<Box<dyn EchoCanceller>> {
        self.configs.borrow_mut().push(*config);
        if self.fail_create {
            return Err(AecError::CreationFailure {
                sample_rate: config.sample_rate,
                channels: config.channels,
                reason: "scripted failure".to_string(),
            });
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedCanceller {
            frame_index: 0,
            fail_at: self.fail_at,
            dropped: Arc::clone(&self.dropped),
            delays: Rc::clone(&self.delays),
        }))
    }
}

pub struct ScriptedCanceller {
    frame_index: usize,
    fail_at: Option<usize>,
    dropped: Arc<AtomicUsize>,
    delays: Rc<RefCell<Vec<i32>>>,
}

impl EchoCanceller for ScriptedCanceller {
    fn process_frame(
        &mut self,
        _reference: &[i16],
        capture: &[i16],
        output: &mut [i16],
        linear_output: Option<&mut [i16]>,
        delay_samples: i32,
    ) -> Result<()> {
        if self.fail_at == Some(self.frame_index) {
            return Err(AecError::FrameRejected { status: -1 });
        }
        self.delays.borrow_mut().push(delay_samples);
        output.copy_from_slice(capture);
        if let Some(linear) = linear_output {
            linear.fill(self.frame_index as i16 + 1);
        }
        self.frame_index += 1;
        Ok(())
    }
}

impl Drop for ScriptedCanceller {
    fn drop(&mut self) {
        self.dropped.fetch_add(1, Ordering::SeqCst);
    }
}

/// Seeded uniform noise in `[-amplitude, amplitude)`
pub fn noise(len: usize, amplitude: i16, seed: u64) -> Vec<i16> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len).map(|_| rng.gen_range(-amplitude..amplitude)).collect()
}

/// Ramp that never repeats within an i16 period, handy for locating samples
pub fn ramp(len: usize, sample_rate: u32, channels: u16) -> AudioBuffer {
    let samples = (0..len).map(|i| (i % 30000) as i16 + 1).collect();
    AudioBuffer::new(samples, sample_rate, channels).unwrap()
}
